use crate::{
    config::{GenerateConfig, MergeConfig, SplitConfig},
    database::Database,
    error::{Error, Result},
    latex::LatexRunner,
    quiz::{QuizAssembler, RenderedQuestion},
    splitter::{SplitBatch, Splitter},
    template::QuizTemplate,
    writer::Writer,
    xml::{merge_documents, QuizXml},
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

/// Statistics collected during a generation run.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateStats {
    /// Number of data rows processed
    pub rows_processed: usize,

    /// Distinct placeholders in the template
    pub placeholders: usize,

    /// Questions in the written document
    pub questions_written: usize,

    /// True when the external toolchain was skipped
    pub simple_mode: bool,

    /// Path of the written document
    pub output_path: String,

    /// Total execution time
    pub duration: Duration,

    /// Time spent loading template and database
    pub load_duration: Duration,

    /// Time spent substituting rows
    pub render_duration: Duration,

    /// Time spent compiling (or assembling, in simple mode)
    pub compile_duration: Duration,

    /// Time spent writing
    pub write_duration: Duration,
}

impl GenerateStats {
    /// Creates statistics from generation run data.
    #[must_use]
    pub fn new(
        rows_processed: usize,
        placeholders: usize,
        questions_written: usize,
        simple_mode: bool,
        output_path: String,
        duration: Duration,
        load_duration: Duration,
        render_duration: Duration,
        compile_duration: Duration,
        write_duration: Duration,
    ) -> Self {
        Self {
            rows_processed,
            placeholders,
            questions_written,
            simple_mode,
            output_path,
            duration,
            load_duration,
            render_duration,
            compile_duration,
            write_duration,
        }
    }

    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║            Quiz Generation Summary                    ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!(
            "║ Data Rows Processed:  {:>8}                        ║",
            self.rows_processed
        );
        println!(
            "║ Questions Written:    {:>8}                        ║",
            self.questions_written
        );
        println!(
            "║ Placeholders:         {:>8}                        ║",
            self.placeholders
        );
        println!(
            "║ Mode:                 {:>8}                        ║",
            if self.simple_mode { "simple" } else { "compile" }
        );
        println!("║                                                       ║");
        println!("║ Output File:                                          ║");
        println!(
            "║   {}                                              ║",
            self.output_path
        );
        println!("║                                                       ║");
        println!("║ Timing Breakdown:                                     ║");
        println!(
            "║   - Loading:          {:>8.2}s                     ║",
            self.load_duration.as_secs_f64()
        );
        println!(
            "║   - Rendering:        {:>8.2}s                     ║",
            self.render_duration.as_secs_f64()
        );
        println!(
            "║   - Compiling:        {:>8.2}s                     ║",
            self.compile_duration.as_secs_f64()
        );
        println!(
            "║   - Writing:          {:>8.2}s                     ║",
            self.write_duration.as_secs_f64()
        );
        println!(
            "║   - Total:            {:>8.2}s                     ║",
            self.duration.as_secs_f64()
        );
        println!("╚═══════════════════════════════════════════════════════╝\n");
    }

    /// Returns the throughput in questions per second.
    #[must_use]
    pub fn throughput_questions_per_sec(&self) -> f64 {
        self.questions_written as f64 / self.duration.as_secs_f64()
    }
}

/// Statistics collected during a split run.
#[derive(Debug, Clone, Serialize)]
pub struct SplitStats {
    /// Payload questions across all batches
    pub total_questions: usize,

    /// Number of batches formed
    pub total_batches: usize,

    /// Number of files written, manifest included
    pub files_written: usize,

    /// Average questions per batch
    pub avg_batch_questions: usize,

    /// Smallest batch size in questions
    pub min_batch_questions: usize,

    /// Largest batch size in questions
    pub max_batch_questions: usize,

    /// Total bytes across all batch files
    pub total_bytes: usize,

    /// Total execution time
    pub duration: Duration,

    /// Time spent parsing
    pub parse_duration: Duration,

    /// Time spent partitioning
    pub split_duration: Duration,

    /// Time spent writing
    pub write_duration: Duration,

    /// Output directory path
    pub output_directory: String,
}

impl SplitStats {
    /// Creates statistics from split run data.
    #[must_use]
    pub fn new(
        batches: &[SplitBatch],
        files_written: usize,
        duration: Duration,
        parse_duration: Duration,
        split_duration: Duration,
        write_duration: Duration,
        output_directory: String,
    ) -> Self {
        let total_batches = batches.len();
        let total_questions: usize = batches.iter().map(SplitBatch::question_count).sum();

        let avg_batch_questions = if total_batches > 0 {
            total_questions / total_batches
        } else {
            0
        };

        let max_batch_questions = batches
            .iter()
            .map(SplitBatch::question_count)
            .max()
            .unwrap_or(0);

        let min_batch_questions = batches
            .iter()
            .map(SplitBatch::question_count)
            .min()
            .unwrap_or(0);

        let total_bytes: usize = batches.iter().map(|b| b.size).sum();

        Self {
            total_questions,
            total_batches,
            files_written,
            avg_batch_questions,
            min_batch_questions,
            max_batch_questions,
            total_bytes,
            duration,
            parse_duration,
            split_duration,
            write_duration,
            output_directory,
        }
    }

    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║            Quiz Split Summary                         ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!(
            "║ Questions Split:      {:>8}                        ║",
            self.total_questions
        );
        println!(
            "║ Batches Created:      {:>8}                        ║",
            self.total_batches
        );
        println!(
            "║ Avg Questions/Batch:  {:>8}                        ║",
            self.avg_batch_questions
        );
        println!(
            "║ Min Batch Size:       {:>8} questions              ║",
            self.min_batch_questions
        );
        println!(
            "║ Max Batch Size:       {:>8} questions              ║",
            self.max_batch_questions
        );
        println!(
            "║ Total Output Bytes:   {:>8}                        ║",
            self.total_bytes
        );
        println!("║                                                       ║");
        println!(
            "║ Files Written:        {:>8}                        ║",
            self.files_written
        );
        println!("║ Output Directory:                                     ║");
        println!(
            "║   {}                                              ║",
            self.output_directory
        );
        println!("║                                                       ║");
        println!("║ Timing Breakdown:                                     ║");
        println!(
            "║   - Parsing:          {:>8.2}s                     ║",
            self.parse_duration.as_secs_f64()
        );
        println!(
            "║   - Partitioning:     {:>8.2}s                     ║",
            self.split_duration.as_secs_f64()
        );
        println!(
            "║   - Writing:          {:>8.2}s                     ║",
            self.write_duration.as_secs_f64()
        );
        println!(
            "║   - Total:            {:>8.2}s                     ║",
            self.duration.as_secs_f64()
        );
        println!("╚═══════════════════════════════════════════════════════╝\n");
    }

    /// Returns the throughput in questions per second.
    #[must_use]
    pub fn throughput_questions_per_sec(&self) -> f64 {
        self.total_questions as f64 / self.duration.as_secs_f64()
    }
}

/// Statistics collected during a merge run.
#[derive(Debug, Clone, Serialize)]
pub struct MergeStats {
    /// Number of member documents merged
    pub documents_merged: usize,

    /// Questions in the written document
    pub questions_written: usize,

    /// Path of the written document
    pub output_path: String,

    /// Total execution time
    pub duration: Duration,
}

impl MergeStats {
    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║            Quiz Merge Summary                         ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!(
            "║ Documents Merged:     {:>8}                        ║",
            self.documents_merged
        );
        println!(
            "║ Questions Written:    {:>8}                        ║",
            self.questions_written
        );
        println!("║                                                       ║");
        println!("║ Output File:                                          ║");
        println!(
            "║   {}                                              ║",
            self.output_path
        );
        println!("║                                                       ║");
        println!(
            "║ Total Time:           {:>8.2}s                     ║",
            self.duration.as_secs_f64()
        );
        println!("╚═══════════════════════════════════════════════════════╝\n");
    }
}

/// Pipeline orchestrator for generating quiz XML from a template and a
/// variable database.
pub struct GeneratePipeline {
    config: GenerateConfig,
    assembler: QuizAssembler,
}

impl GeneratePipeline {
    /// Creates a new pipeline with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The built-in output template fails to register
    pub fn new(config: GenerateConfig) -> Result<Self> {
        config.validate()?;
        let assembler = QuizAssembler::new()?;

        Ok(Self { config, assembler })
    }

    /// Executes the complete generation run and returns statistics.
    ///
    /// # Process
    ///
    /// 1. **Load**: Reads the template and the CSV database, then checks
    ///    every placeholder against the database columns
    /// 2. **Render**: Substitutes each selected data row into the template
    /// 3. **Compile**: Runs the LaTeX toolchain per variant and merges the
    ///    artifacts (skipped in simple mode, which assembles XML directly)
    /// 4. **Write**: Persists the document atomically
    ///
    /// Nothing is written unless every prior stage succeeded, so a failed
    /// run never leaves a partial document behind.
    ///
    /// # Errors
    ///
    /// Returns an error if any stage fails.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use genmq::{GenerateConfig, GeneratePipeline};
    ///
    /// # fn main() -> genmq::Result<()> {
    /// let config = GenerateConfig::builder()
    ///     .template("exam.tex")
    ///     .database("students.csv")
    ///     .simple(true)
    ///     .build()?;
    ///
    /// let stats = GeneratePipeline::new(config)?.run()?;
    /// stats.print_summary();
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self), fields(template = %self.config.template.display()))]
    pub fn run(self) -> Result<GenerateStats> {
        let start_time = Instant::now();

        info!("Starting quiz generation");

        let output_path = self.config.output_path();
        let output_dir = parent_dir(&output_path);
        let output_name = output_file_name(&output_path)?;

        // Resolve the toolchain before reading any input, so a missing
        // binary fails the run up front.
        let runner = if self.config.simple {
            None
        } else {
            Some(LatexRunner::new(&self.config, &output_dir)?)
        };

        // Stage 1: Loading
        info!("Stage 1/4: Loading template and database...");
        let load_start = Instant::now();
        let template = QuizTemplate::load(&self.config.template)?;
        let database = Database::load(&self.config.database)?.select(self.config.rows)?;
        template.validate_columns(&database)?;
        let load_duration = load_start.elapsed();

        info!(
            "✓ Loaded {} placeholders and {} data rows in {:.2}s",
            template.placeholders().len(),
            database.rows.len(),
            load_duration.as_secs_f64()
        );

        // Stage 2: Rendering
        info!("Stage 2/4: Substituting {} rows...", database.rows.len());
        let render_start = Instant::now();
        let mut variants = Vec::with_capacity(database.rows.len());
        for row in &database.rows {
            let body = template.render_row(&database.headers, row)?;
            let variant = RenderedQuestion::new(template.stem(), row.number, body);
            debug!("Rendered variant '{}'", variant.name);
            variants.push(variant);
        }
        let render_duration = render_start.elapsed();

        info!(
            "✓ Rendered {} variants in {:.2}s",
            variants.len(),
            render_duration.as_secs_f64()
        );

        // Stage 3: Compiling (or direct assembly in simple mode)
        let compile_start = Instant::now();
        let (document, questions_written) = if let Some(runner) = runner {
            info!("Stage 3/4: Compiling {} variants...", variants.len());
            let compiled = match compile_variants(&runner, &variants) {
                Ok(compiled) => compiled,
                Err(err) => {
                    // Honor --keep-temps for the failed run too.
                    runner.abort();
                    return Err(err);
                }
            };
            runner.finish()?;

            let questions: usize = compiled.iter().map(QuizXml::payload_count).sum();
            (merge_documents(&compiled)?, questions)
        } else {
            info!("Stage 3/4: Assembling XML directly (simple mode)");
            let document = self.assembler.render(template.name(), &variants)?;
            (document, variants.len())
        };
        let compile_duration = compile_start.elapsed();

        info!(
            "✓ Produced {} questions in {:.2}s",
            questions_written,
            compile_duration.as_secs_f64()
        );

        // Stage 4: Writing
        info!("Stage 4/4: Writing output...");
        let write_start = Instant::now();
        let writer = Writer::new(&output_dir, self.config.backup_existing);
        let written_path = writer.write_document(&output_name, &document)?;
        let write_duration = write_start.elapsed();

        info!(
            "✓ Wrote {} in {:.2}s",
            written_path.display(),
            write_duration.as_secs_f64()
        );

        let total_duration = start_time.elapsed();

        let stats = GenerateStats::new(
            database.rows.len(),
            template.placeholders().len(),
            questions_written,
            self.config.simple,
            written_path.display().to_string(),
            total_duration,
            load_duration,
            render_duration,
            compile_duration,
            write_duration,
        );

        info!(
            "✓ Generation completed successfully in {:.2}s",
            total_duration.as_secs_f64()
        );

        Ok(stats)
    }
}

/// Pipeline orchestrator for splitting a quiz document into bounded files.
pub struct SplitPipeline {
    config: SplitConfig,
}

impl SplitPipeline {
    /// Creates a new pipeline with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails.
    pub fn new(config: SplitConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self { config })
    }

    /// Executes the complete split run and returns statistics.
    ///
    /// # Process
    ///
    /// 1. **Parse**: Reads and validates the input document
    /// 2. **Partition**: Packs payload questions into threshold-bounded
    ///    batches, preserving document order
    /// 3. **Write**: Persists one file per batch plus a JSON manifest
    ///
    /// # Errors
    ///
    /// Returns an error if any stage fails. A parse failure aborts before
    /// anything is written.
    #[instrument(skip(self), fields(input = %self.config.input.display()))]
    pub fn run(self) -> Result<SplitStats> {
        let start_time = Instant::now();

        info!("Starting quiz split ({})", self.config.threshold);

        // Stage 1: Parsing
        info!("Stage 1/3: Parsing input document...");
        let parse_start = Instant::now();
        let quiz = QuizXml::parse_file(&self.config.input)?;
        let parse_duration = parse_start.elapsed();

        info!(
            "✓ Parsed {} questions in {:.2}s",
            quiz.payload_count(),
            parse_duration.as_secs_f64()
        );

        // Stage 2: Partitioning
        info!("Stage 2/3: Partitioning questions...");
        let split_start = Instant::now();
        let batches = Splitter::new(self.config.threshold).split(&quiz)?;
        let split_duration = split_start.elapsed();

        info!(
            "✓ Formed {} batches in {:.2}s",
            batches.len(),
            split_duration.as_secs_f64()
        );

        // Stage 3: Writing
        info!("Stage 3/3: Writing batch files...");
        let write_start = Instant::now();
        let output_dir = self.config.effective_output_dir();
        let writer = Writer::new(&output_dir, self.config.backup_existing);
        let records = writer.write_batches(&quiz, &batches)?;
        writer.write_manifest(&quiz, self.config.threshold, &records, start_time.elapsed())?;
        let files_written = records.len() + 1; // +1 for the manifest
        let write_duration = write_start.elapsed();

        info!(
            "✓ Wrote {} files in {:.2}s",
            files_written,
            write_duration.as_secs_f64()
        );

        let total_duration = start_time.elapsed();

        let stats = SplitStats::new(
            &batches,
            files_written,
            total_duration,
            parse_duration,
            split_duration,
            write_duration,
            output_dir.display().to_string(),
        );

        info!(
            "✓ Split completed successfully in {:.2}s",
            total_duration.as_secs_f64()
        );

        Ok(stats)
    }
}

/// Pipeline orchestrator for merging a directory of quiz documents.
pub struct MergePipeline {
    config: MergeConfig,
}

impl MergePipeline {
    /// Creates a new pipeline with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails.
    pub fn new(config: MergeConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self { config })
    }

    /// Executes the complete merge run and returns statistics.
    ///
    /// # Process
    ///
    /// 1. **Discover**: Collects the directory's `*.xml` files in name
    ///    order, skipping the output file itself
    /// 2. **Merge**: Parses every member and appends the questions of the
    ///    rest to the first document, whose context is kept
    /// 3. **Write**: Persists the document atomically
    ///
    /// # Errors
    ///
    /// Returns an error if the directory has no members, a member fails to
    /// parse, or writing fails.
    #[instrument(skip(self), fields(directory = %self.config.directory.display()))]
    pub fn run(self) -> Result<MergeStats> {
        let start_time = Instant::now();

        info!("Starting quiz merge");

        let output_dir = parent_dir(&self.config.output);
        let output_name = output_file_name(&self.config.output)?;

        // Stage 1: Discovery
        info!("Stage 1/3: Scanning for member files...");
        let members = discover_members(&self.config.directory, &self.config.output)?;

        info!("✓ Found {} member files", members.len());

        // Stage 2: Parsing and merging
        info!("Stage 2/3: Merging documents...");
        let mut documents = Vec::with_capacity(members.len());
        for member in &members {
            documents.push(QuizXml::parse_file(member)?);
        }
        let questions_written: usize = documents.iter().map(QuizXml::payload_count).sum();
        let document = merge_documents(&documents)?;

        info!(
            "✓ Merged {} questions from {} documents",
            questions_written,
            documents.len()
        );

        // Stage 3: Writing
        info!("Stage 3/3: Writing output...");
        let writer = Writer::new(&output_dir, self.config.backup_existing);
        let written_path = writer.write_document(&output_name, &document)?;

        let duration = start_time.elapsed();

        let stats = MergeStats {
            documents_merged: documents.len(),
            questions_written,
            output_path: written_path.display().to_string(),
            duration,
        };

        info!(
            "✓ Merge completed successfully in {:.2}s",
            duration.as_secs_f64()
        );

        Ok(stats)
    }
}

/// Directory part of an output path; an empty parent means the current
/// directory.
fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Compiles every rendered variant and parses its artifact, in row order.
fn compile_variants(runner: &LatexRunner, variants: &[RenderedQuestion]) -> Result<Vec<QuizXml>> {
    let mut compiled = Vec::with_capacity(variants.len());
    for variant in variants {
        let artifact = runner.compile_variant(&variant.name, &variant.body)?;
        compiled.push(QuizXml::parse_file(&artifact)?);
    }

    Ok(compiled)
}

/// File-name part of an output path.
fn output_file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            Error::config(format!(
                "Output path '{}' has no file name",
                path.display()
            ))
        })
}

/// Collects the `*.xml` members of a merge directory, sorted by name.
///
/// A member whose name equals the output file name is skipped, so a merge
/// into the member directory never consumes an earlier result.
fn discover_members(dir: &Path, output: &Path) -> Result<Vec<PathBuf>> {
    let mut members = Vec::new();

    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();

        let is_xml = path
            .extension()
            .and_then(std::ffi::OsStr::to_str)
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));

        if !path.is_file() || !is_xml || path.file_name() == output.file_name() {
            continue;
        }

        members.push(path);
    }

    if members.is_empty() {
        return Err(Error::config(format!(
            "No .xml files to merge in '{}'",
            dir.display()
        )));
    }

    members.sort();
    debug!("Merge members: {:?}", members);

    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RowSelection, SplitThreshold};
    use assert_fs::prelude::*;
    use std::fmt::Write as _;

    fn bank_xml(count: usize) -> String {
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<quiz>\n<question type=\"category\">\
             <category><text>$course$/bank</text></category></question>\n",
        );
        for i in 1..=count {
            write!(
                xml,
                "<question type=\"essay\"><name><text>q{i}</text></name>\
                 <questiontext format=\"html\"><text>Body {i}</text></questiontext></question>\n"
            )
            .unwrap();
        }
        xml.push_str("</quiz>\n");
        xml
    }

    fn member_xml(names: &[&str]) -> String {
        let mut xml = String::from(
            "<quiz>\n<question type=\"category\"><category><text>$course$/m</text></category>\
             </question>\n",
        );
        for name in names {
            write!(
                xml,
                "<question type=\"essay\"><name><text>{name}</text></name></question>\n"
            )
            .unwrap();
        }
        xml.push_str("</quiz>\n");
        xml
    }

    fn generate_fixture(temp: &assert_fs::TempDir) -> GenerateConfig {
        let template = temp.child("exam.tex");
        template.write_str("Question: {{a}} + {{b}} = ?").unwrap();
        let database = temp.child("vars.csv");
        database.write_str("a,b\n1,2\n3,4\n").unwrap();

        GenerateConfig::builder()
            .template(template.path())
            .database(database.path())
            .simple(true)
            .build()
            .unwrap()
    }

    #[test]
    fn test_generate_simple_end_to_end() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = generate_fixture(&temp);

        let stats = GeneratePipeline::new(config).unwrap().run().unwrap();

        assert_eq!(stats.rows_processed, 2);
        assert_eq!(stats.questions_written, 2);
        assert_eq!(stats.placeholders, 2);
        assert!(stats.simple_mode);

        let output = QuizXml::parse_file(temp.child("exam.xml").path()).unwrap();
        assert_eq!(output.payload_count(), 2);

        let names: Vec<_> = output.payload().filter_map(|q| q.name.clone()).collect();
        assert_eq!(names, ["exam-001", "exam-002"]);
    }

    #[test]
    fn test_generate_variants_follow_row_order() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = generate_fixture(&temp);

        GeneratePipeline::new(config).unwrap().run().unwrap();

        let content = fs::read_to_string(temp.child("exam.xml").path()).unwrap();
        let first = content.find("Question: 1 + 2 = ?").unwrap();
        let second = content.find("Question: 3 + 4 = ?").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_generate_missing_variable_writes_nothing() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template = temp.child("exam.tex");
        template.write_str("{{a}} {{missing}}").unwrap();
        let database = temp.child("vars.csv");
        database.write_str("a\n1\n").unwrap();

        let config = GenerateConfig::builder()
            .template(template.path())
            .database(database.path())
            .simple(true)
            .build()
            .unwrap();

        let err = GeneratePipeline::new(config).unwrap().run().unwrap_err();

        assert!(err.is_missing_variable());
        assert!(err.to_string().contains("'missing'"));
        assert!(!temp.child("exam.xml").exists());
    }

    #[test]
    fn test_generate_header_only_database_errors() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template = temp.child("exam.tex");
        template.write_str("{{a}}").unwrap();
        let database = temp.child("vars.csv");
        database.write_str("a,b\n").unwrap();

        let config = GenerateConfig::builder()
            .template(template.path())
            .database(database.path())
            .simple(true)
            .build()
            .unwrap();

        let err = GeneratePipeline::new(config).unwrap().run().unwrap_err();

        assert!(err.is_config());
        assert!(err.to_string().contains("no data rows"));
        assert!(!temp.child("exam.xml").exists());
    }

    #[test]
    fn test_generate_ragged_row_aborts() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template = temp.child("exam.tex");
        template.write_str("{{a}} {{b}}").unwrap();
        let database = temp.child("vars.csv");
        database.write_str("a,b\n1,2\n3\n").unwrap();

        let config = GenerateConfig::builder()
            .template(template.path())
            .database(database.path())
            .simple(true)
            .build()
            .unwrap();

        let err = GeneratePipeline::new(config).unwrap().run().unwrap_err();

        assert!(err.is_row_format());
        assert!(err.to_string().contains("row 2"));
        assert!(!temp.child("exam.xml").exists());
    }

    #[test]
    fn test_generate_index_selection_keeps_row_number() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template = temp.child("exam.tex");
        template.write_str("{{a}}").unwrap();
        let database = temp.child("vars.csv");
        database.write_str("a\n1\n2\n3\n").unwrap();

        let config = GenerateConfig::builder()
            .template(template.path())
            .database(database.path())
            .rows(RowSelection::Only(2))
            .simple(true)
            .build()
            .unwrap();

        let stats = GeneratePipeline::new(config).unwrap().run().unwrap();

        assert_eq!(stats.rows_processed, 1);
        assert_eq!(stats.questions_written, 1);

        let output = QuizXml::parse_file(temp.child("exam.xml").path()).unwrap();
        let names: Vec<_> = output.payload().filter_map(|q| q.name.clone()).collect();
        assert_eq!(names, ["exam-002"]);
    }

    #[test]
    fn test_generate_rerun_backs_up_previous_output() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = generate_fixture(&temp);

        GeneratePipeline::new(config.clone()).unwrap().run().unwrap();
        GeneratePipeline::new(config).unwrap().run().unwrap();

        let backups = fs::read_dir(temp.path())
            .unwrap()
            .filter_map(std::result::Result::ok)
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with("exam.xml.backup.")
            })
            .count();
        assert_eq!(backups, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_generate_compile_mode_merges_artifacts() {
        use std::os::unix::fs::PermissionsExt;

        let temp = assert_fs::TempDir::new().unwrap();
        let stub = temp.child("fake-pdflatex");
        stub.write_str(
            "#!/bin/sh\nfor last; do :; done\nstem=\"${last%.tex}\"\n\
             printf '<quiz><question type=\"essay\"><name><text>%s</text></name></question></quiz>' \
             \"$stem\" > \"${stem}-moodle.xml\"\n",
        )
        .unwrap();
        fs::set_permissions(stub.path(), fs::Permissions::from_mode(0o755)).unwrap();

        let template = temp.child("exam.tex");
        template
            .write_str("\\usepackage[draft]{moodle}\nQ {{a}}")
            .unwrap();
        let database = temp.child("vars.csv");
        database.write_str("a\n1\n2\n").unwrap();

        let config = GenerateConfig::builder()
            .template(template.path())
            .database(database.path())
            .pdflatex_cmd(stub.path().to_string_lossy().into_owned())
            .pythontex(false)
            .build()
            .unwrap();

        let stats = GeneratePipeline::new(config).unwrap().run().unwrap();

        assert_eq!(stats.questions_written, 2);
        assert!(!stats.simple_mode);

        let output = QuizXml::parse_file(temp.child("exam.xml").path()).unwrap();
        assert_eq!(output.payload_count(), 2);

        let names: Vec<_> = output.payload().filter_map(|q| q.name.clone()).collect();
        assert_eq!(names, ["exam-001", "exam-002"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_generate_failed_compile_keeps_workspace_when_asked() {
        use std::os::unix::fs::PermissionsExt;

        let temp = assert_fs::TempDir::new().unwrap();
        let stub = temp.child("fake-pdflatex");
        stub.write_str("#!/bin/sh\necho 'LaTeX Error: broken'\nexit 1\n")
            .unwrap();
        fs::set_permissions(stub.path(), fs::Permissions::from_mode(0o755)).unwrap();

        let template = temp.child("inspect.tex");
        template.write_str("Q {{a}}").unwrap();
        let database = temp.child("vars.csv");
        database.write_str("a\n1\n").unwrap();

        let config = GenerateConfig::builder()
            .template(template.path())
            .database(database.path())
            .pdflatex_cmd(stub.path().to_string_lossy().into_owned())
            .pythontex(false)
            .keep_temps(true)
            .build()
            .unwrap();

        let err = GeneratePipeline::new(config).unwrap().run().unwrap_err();
        assert!(err.is_compile());
        assert!(!temp.child("inspect.xml").exists());

        // The kept workspace still holds the failing variant's input.
        let kept: Vec<_> = fs::read_dir(std::env::temp_dir())
            .unwrap()
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with("genmq-"))
                    && path.join("inspect-001").join("inspect-001.tex").is_file()
            })
            .collect();
        assert!(!kept.is_empty());

        for dir in kept {
            fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_split_end_to_end() {
        let temp = assert_fs::TempDir::new().unwrap();
        let input = temp.child("bank.xml");
        input.write_str(&bank_xml(10)).unwrap();

        let config = SplitConfig::new(input.path())
            .threshold(SplitThreshold::Questions(4))
            .output_dir(temp.child("parts").path());

        let stats = SplitPipeline::new(config).unwrap().run().unwrap();

        assert_eq!(stats.total_questions, 10);
        assert_eq!(stats.total_batches, 3);
        assert_eq!(stats.files_written, 4);
        assert_eq!(stats.min_batch_questions, 2);
        assert_eq!(stats.max_batch_questions, 4);

        for (file, expected) in [("bank-1.xml", 4), ("bank-2.xml", 4), ("bank-3.xml", 2)] {
            let part = QuizXml::parse_file(temp.child("parts").child(file).path()).unwrap();
            assert_eq!(part.payload_count(), expected);
            // Context is replicated into every part.
            assert_eq!(part.elements().len(), expected + 1);
        }
        assert!(temp.child("parts").child("bank-manifest.json").exists());
    }

    #[test]
    fn test_split_then_merge_round_trip() {
        let temp = assert_fs::TempDir::new().unwrap();
        let input = temp.child("bank.xml");
        input.write_str(&bank_xml(7)).unwrap();
        let parts = temp.child("parts");

        let split = SplitConfig::new(input.path())
            .threshold(SplitThreshold::Questions(3))
            .output_dir(parts.path());
        SplitPipeline::new(split).unwrap().run().unwrap();

        let merge = MergeConfig::new(parts.child("merged.xml").path()).directory(parts.path());
        let stats = MergePipeline::new(merge).unwrap().run().unwrap();

        assert_eq!(stats.documents_merged, 3);
        assert_eq!(stats.questions_written, 7);

        let merged = QuizXml::parse_file(parts.child("merged.xml").path()).unwrap();
        assert_eq!(merged.payload_count(), 7);
        // One replicated category from the first member, not one per member.
        assert_eq!(merged.elements().len(), 8);

        let names: Vec<_> = merged.payload().filter_map(|q| q.name.clone()).collect();
        assert_eq!(names, ["q1", "q2", "q3", "q4", "q5", "q6", "q7"]);
    }

    #[test]
    fn test_split_malformed_input_writes_nothing() {
        let temp = assert_fs::TempDir::new().unwrap();
        let input = temp.child("broken.xml");
        input.write_str("<quiz><question></quiz>").unwrap();

        let config = SplitConfig::new(input.path()).output_dir(temp.child("parts").path());
        let err = SplitPipeline::new(config).unwrap().run().unwrap_err();

        assert!(err.is_parse());
        assert!(!temp.child("parts").exists());
    }

    #[test]
    fn test_merge_empty_directory_is_config_error() {
        let temp = assert_fs::TempDir::new().unwrap();

        let config = MergeConfig::new(temp.path().join("all.xml")).directory(temp.path());
        let err = MergePipeline::new(config).unwrap().run().unwrap_err();

        assert!(err.is_config());
        assert!(err.to_string().contains("No .xml files"));
    }

    #[test]
    fn test_merge_excludes_its_own_output() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.xml").write_str(&member_xml(&["a1", "a2"])).unwrap();
        temp.child("b.xml").write_str(&member_xml(&["b1"])).unwrap();
        temp.child("all.xml").write_str(&member_xml(&["stale"])).unwrap();

        let config = MergeConfig::new(temp.child("all.xml").path()).directory(temp.path());
        let stats = MergePipeline::new(config).unwrap().run().unwrap();

        assert_eq!(stats.documents_merged, 2);
        assert_eq!(stats.questions_written, 3);

        let merged = QuizXml::parse_file(temp.child("all.xml").path()).unwrap();
        let names: Vec<_> = merged.payload().filter_map(|q| q.name.clone()).collect();
        assert_eq!(names, ["a1", "a2", "b1"]);
    }

    #[test]
    fn test_merge_members_sorted_by_name() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("c.xml").write_str(&member_xml(&["c1"])).unwrap();
        temp.child("a.xml").write_str(&member_xml(&["a1"])).unwrap();
        temp.child("b.xml").write_str(&member_xml(&["b1"])).unwrap();

        let output = temp.path().join("out").join("all.xml");
        let config = MergeConfig::new(&output).directory(temp.path());
        let stats = MergePipeline::new(config).unwrap().run().unwrap();

        assert_eq!(stats.documents_merged, 3);

        let merged = QuizXml::parse_file(&output).unwrap();
        let names: Vec<_> = merged.payload().filter_map(|q| q.name.clone()).collect();
        assert_eq!(names, ["a1", "b1", "c1"]);
    }

    #[test]
    fn test_split_stats_calculation() {
        use crate::xml::QuizElement;

        let question = QuizElement {
            xml: "<question/>".to_string(),
            name: None,
            is_context: false,
        };
        let batches = vec![
            SplitBatch::new(0, vec![question.clone(), question.clone()], 120),
            SplitBatch::new(1, vec![question], 80),
        ];

        let stats = SplitStats::new(
            &batches,
            3,
            Duration::from_secs(2),
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(300),
            "/tmp/parts".to_string(),
        );

        assert_eq!(stats.total_questions, 3);
        assert_eq!(stats.total_batches, 2);
        assert_eq!(stats.avg_batch_questions, 1);
        assert_eq!(stats.min_batch_questions, 1);
        assert_eq!(stats.max_batch_questions, 2);
        assert_eq!(stats.total_bytes, 200);
        assert_eq!(stats.throughput_questions_per_sec(), 1.5);
    }
}
