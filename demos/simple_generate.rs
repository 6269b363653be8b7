//! Basic example of using genmq as a library
//!
//! Generates a three-question quiz in simple mode from a template and a
//! database created on the fly, so the example runs without a TeX
//! installation.

use genmq::{GenerateConfig, GeneratePipeline};
use std::fs;

fn main() -> genmq::Result<()> {
    let dir = std::env::temp_dir().join("genmq-demo-generate");
    fs::create_dir_all(&dir).map_err(|e| genmq::Error::io(&dir, e))?;

    // A tiny template and database; the header row names the placeholders.
    let template = dir.join("exam.tex");
    fs::write(&template, "Question: {{a}} + {{b}} = ?")
        .map_err(|e| genmq::Error::io(&template, e))?;

    let database = dir.join("students.csv");
    fs::write(&database, "a,b\n1,2\n3,4\n10,20\n")
        .map_err(|e| genmq::Error::io(&database, e))?;

    // Simple mode skips pdflatex and wraps the substituted text directly.
    let config = GenerateConfig::builder()
        .template(&template)
        .database(&database)
        .simple(true)
        .build()?;

    // Run the pipeline
    let stats = GeneratePipeline::new(config)?.run()?;

    // Print summary
    stats.print_summary();

    println!(
        "\n✓ Generated {} questions into {}",
        stats.questions_written, stats.output_path
    );

    Ok(())
}
