//! # genmq
//!
//! A generator and splitter for Moodle quiz XML.
//!
//! ## Features
//!
//! - Quiz generation from a LaTeX template and a CSV variable database
//! - Placeholder substitution in `{{name}}` and `\VAR{name}` spellings
//! - External pdflatex/pythontex compilation via the moodle.sty package,
//!   or direct XML assembly in simple mode
//! - Splitting of large quiz files under a question-count or byte-size
//!   bound, with context replicated into every part
//! - Merging a directory of quiz files back into one document
//! - Atomic file operations with automatic backups
//!
//! ## Quick Start
//!
//! ```no_run
//! use genmq::{generate, GenerateConfig};
//!
//! # fn main() -> genmq::Result<()> {
//! let config = GenerateConfig::builder()
//!     .template("exam.tex")
//!     .database("students.csv")
//!     .simple(true)
//!     .build()?;
//!
//! let stats = generate(config)?;
//! stats.print_summary();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Each command runs as a staged pipeline:
//! 1. **Template + Database**: Loads inputs and validates placeholders
//!    against columns before any row is rendered
//! 2. **Renderer**: Substitutes one row per question variant
//! 3. **Latex runner**: Compiles variants and collects XML artifacts
//!    (skipped in simple mode)
//! 4. **Splitter**: Packs parsed questions into threshold-bounded batches
//! 5. **Writer**: Persists documents atomically, with backups

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod database;
mod error;
mod latex;
mod pipeline;
mod quiz;
mod splitter;
mod template;
mod writer;
mod xml;

pub use config::{
    GenerateConfig, GenerateConfigBuilder, MergeConfig, RowSelection, SplitConfig, SplitThreshold,
};
pub use database::{Database, VariableRow};
pub use error::{exit_codes, Error, Result};
pub use pipeline::{
    GeneratePipeline, GenerateStats, MergePipeline, MergeStats, SplitPipeline, SplitStats,
};
pub use quiz::RenderedQuestion;
pub use splitter::{SplitBatch, Splitter};
pub use template::QuizTemplate;
pub use xml::{QuizElement, QuizXml};

/// Generates a quiz document from a template and a variable database.
///
/// This is the main entry point for the library.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - The database is empty, ragged, or missing a placeholder column
/// - The LaTeX toolchain is missing or a compilation step fails
/// - File operations fail
///
/// # Examples
///
/// ```no_run
/// use genmq::{generate, GenerateConfig};
///
/// # fn main() -> genmq::Result<()> {
/// let config = GenerateConfig::builder()
///     .template("exam.tex")
///     .database("students.csv")
///     .build()?;
///
/// generate(config)?;
/// # Ok(())
/// # }
/// ```
pub fn generate(config: GenerateConfig) -> Result<GenerateStats> {
    GeneratePipeline::new(config)?.run()
}

/// Splits a quiz document into files bounded by the configured threshold.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - The input fails to parse or contains no questions
/// - File operations fail
///
/// # Examples
///
/// ```no_run
/// use genmq::{split, SplitConfig, SplitThreshold};
///
/// # fn main() -> genmq::Result<()> {
/// let config = SplitConfig::new("bank.xml").threshold(SplitThreshold::Questions(50));
///
/// split(config)?;
/// # Ok(())
/// # }
/// ```
pub fn split(config: SplitConfig) -> Result<SplitStats> {
    SplitPipeline::new(config)?.run()
}

/// Merges a directory of quiz documents into one.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - The directory holds no `*.xml` members
/// - A member fails to parse or file operations fail
///
/// # Examples
///
/// ```no_run
/// use genmq::{merge, MergeConfig};
///
/// # fn main() -> genmq::Result<()> {
/// let config = MergeConfig::new("all.xml").directory("parts");
///
/// merge(config)?;
/// # Ok(())
/// # }
/// ```
pub fn merge(config: MergeConfig) -> Result<MergeStats> {
    MergePipeline::new(config)?.run()
}
