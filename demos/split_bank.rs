//! Splitting a large quiz file into importable parts
//!
//! Builds a 25-question bank, splits it into files of at most 10
//! questions each, then merges the parts back into a single document.

use genmq::{merge, split, MergeConfig, SplitConfig, SplitThreshold};
use std::fmt::Write as _;
use std::fs;

fn main() -> genmq::Result<()> {
    let dir = std::env::temp_dir().join("genmq-demo-split");
    let parts = dir.join("parts");
    fs::create_dir_all(&dir).map_err(|e| genmq::Error::io(&dir, e))?;

    // A bank with one category header and 25 questions.
    let mut bank = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<quiz>\n<question type=\"category\">\
         <category><text>$course$/demo</text></category></question>\n",
    );
    for i in 1..=25 {
        writeln!(
            bank,
            "<question type=\"essay\"><name><text>q{i}</text></name>\
             <questiontext format=\"html\"><text>Body {i}</text></questiontext></question>"
        )
        .unwrap();
    }
    bank.push_str("</quiz>\n");

    let input = dir.join("bank.xml");
    fs::write(&input, &bank).map_err(|e| genmq::Error::io(&input, e))?;

    // Split into files of at most 10 questions each.
    let stats = split(
        SplitConfig::new(&input)
            .threshold(SplitThreshold::Questions(10))
            .output_dir(&parts),
    )?;

    // Print summary
    stats.print_summary();

    // Reassemble the parts into one document. The output lands in the
    // same directory and is excluded from its own member list.
    let merged = merge(MergeConfig::new(parts.join("all.xml")).directory(&parts))?;

    println!(
        "\n✓ Split {} questions into {} parts, then merged {} back into {}",
        stats.total_questions, stats.total_batches, merged.questions_written, merged.output_path
    );

    Ok(())
}
