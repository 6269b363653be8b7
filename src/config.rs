use crate::error::{Error, Result};
use std::fmt;
use std::path::PathBuf;

const DEFAULT_PDFLATEX: &str = "pdflatex";
const DEFAULT_PYTHONTEX: &str = "pythontex";
const DEFAULT_MAX_SIZE_MIB: u64 = 20;

/// Which data rows of the database to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowSelection {
    /// Process every data row.
    #[default]
    All,
    /// Process only the first `n` data rows.
    First(usize),
    /// Process only the single data row with this 1-based number.
    Only(usize),
}

/// Configuration for the quiz generation pipeline.
///
/// Use [`GenerateConfig::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct GenerateConfig {
    /// LaTeX template file containing placeholder tokens
    pub template: PathBuf,

    /// CSV database with a header row naming the placeholders
    pub database: PathBuf,

    /// Output XML path; defaults to the template stem with an `.xml` extension
    pub output: Option<PathBuf>,

    /// Skip the external LaTeX toolchain and wrap substituted text directly
    pub simple: bool,

    /// Run pythontex (plus a second pdflatex pass) after the first pdflatex run
    pub pythontex: bool,

    /// Subset of data rows to process
    pub rows: RowSelection,

    /// Keep per-run compile workspaces instead of deleting them
    pub keep_temps: bool,

    /// Write captured LaTeX output to log files next to the output
    pub capture_logs: bool,

    /// pdflatex executable name or path
    pub pdflatex_cmd: String,

    /// pythontex executable name or path
    pub pythontex_cmd: String,

    /// Create backups of existing output files
    pub backup_existing: bool,
}

impl GenerateConfig {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use genmq::GenerateConfig;
    ///
    /// let config = GenerateConfig::builder()
    ///     .template("exam.tex")
    ///     .database("students.csv")
    ///     .simple(true)
    ///     .build()
    ///     .expect("valid configuration");
    /// ```
    #[must_use]
    pub fn builder() -> GenerateConfigBuilder {
        GenerateConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Template or database file doesn't exist
    /// - Row selection is out of range (row numbers are 1-based)
    pub fn validate(&self) -> Result<()> {
        if !self.template.exists() {
            return Err(Error::config(format!(
                "Template file does not exist: {}",
                self.template.display()
            )));
        }

        if !self.template.is_file() {
            return Err(Error::config(format!(
                "Template path is not a file: {}",
                self.template.display()
            )));
        }

        if !self.database.exists() {
            return Err(Error::config(format!(
                "Database file does not exist: {}",
                self.database.display()
            )));
        }

        if !self.database.is_file() {
            return Err(Error::config(format!(
                "Database path is not a file: {}",
                self.database.display()
            )));
        }

        match self.rows {
            RowSelection::First(0) => {
                return Err(Error::config("--number must be at least 1"));
            }
            RowSelection::Only(0) => {
                return Err(Error::config("--index is 1-based; row 0 does not exist"));
            }
            _ => {}
        }

        Ok(())
    }

    /// Returns the effective output path for the generated quiz XML.
    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.template.with_extension("xml"))
    }
}

/// Builder for creating a [`GenerateConfig`].
#[derive(Debug, Default)]
pub struct GenerateConfigBuilder {
    template: Option<PathBuf>,
    database: Option<PathBuf>,
    output: Option<PathBuf>,
    simple: bool,
    pythontex: Option<bool>,
    rows: Option<RowSelection>,
    keep_temps: bool,
    capture_logs: bool,
    pdflatex_cmd: Option<String>,
    pythontex_cmd: Option<String>,
    backup_existing: Option<bool>,
}

impl GenerateConfigBuilder {
    /// Sets the LaTeX template file.
    #[must_use]
    pub fn template(mut self, path: impl Into<PathBuf>) -> Self {
        self.template = Some(path.into());
        self
    }

    /// Sets the CSV database file.
    #[must_use]
    pub fn database(mut self, path: impl Into<PathBuf>) -> Self {
        self.database = Some(path.into());
        self
    }

    /// Sets the output XML path.
    #[must_use]
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Enables or disables simple mode (no external toolchain).
    #[must_use]
    pub fn simple(mut self, enabled: bool) -> Self {
        self.simple = enabled;
        self
    }

    /// Enables or disables the pythontex pass in compile mode.
    #[must_use]
    pub fn pythontex(mut self, enabled: bool) -> Self {
        self.pythontex = Some(enabled);
        self
    }

    /// Restricts which data rows are processed.
    #[must_use]
    pub fn rows(mut self, selection: RowSelection) -> Self {
        self.rows = Some(selection);
        self
    }

    /// Keeps per-run compile workspaces for debugging.
    #[must_use]
    pub fn keep_temps(mut self, enabled: bool) -> Self {
        self.keep_temps = enabled;
        self
    }

    /// Writes captured LaTeX output to log files.
    #[must_use]
    pub fn capture_logs(mut self, enabled: bool) -> Self {
        self.capture_logs = enabled;
        self
    }

    /// Overrides the pdflatex executable.
    #[must_use]
    pub fn pdflatex_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.pdflatex_cmd = Some(cmd.into());
        self
    }

    /// Overrides the pythontex executable.
    #[must_use]
    pub fn pythontex_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.pythontex_cmd = Some(cmd.into());
        self
    }

    /// Enables or disables backup creation for existing outputs.
    #[must_use]
    pub fn backup_existing(mut self, enabled: bool) -> Self {
        self.backup_existing = Some(enabled);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the template or database path is missing, or if
    /// validation fails.
    pub fn build(self) -> Result<GenerateConfig> {
        let template = self
            .template
            .ok_or_else(|| Error::config("A template file is required (--template)"))?;
        let database = self
            .database
            .ok_or_else(|| Error::config("A CSV database file is required (--csv)"))?;

        let config = GenerateConfig {
            template,
            database,
            output: self.output,
            simple: self.simple,
            pythontex: self.pythontex.unwrap_or(true),
            rows: self.rows.unwrap_or_default(),
            keep_temps: self.keep_temps,
            capture_logs: self.capture_logs,
            pdflatex_cmd: self
                .pdflatex_cmd
                .unwrap_or_else(|| DEFAULT_PDFLATEX.to_string()),
            pythontex_cmd: self
                .pythontex_cmd
                .unwrap_or_else(|| DEFAULT_PYTHONTEX.to_string()),
            backup_existing: self.backup_existing.unwrap_or(true),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Upper bound for one split output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitThreshold {
    /// At most this many payload questions per file.
    Questions(usize),
    /// At most this many bytes per file, wrapper overhead included.
    MaxBytes(u64),
}

impl SplitThreshold {
    /// Creates a byte-size threshold from a size in MiB.
    ///
    /// Saturates at [`u64::MAX`] bytes rather than overflowing.
    #[must_use]
    pub const fn max_size_mib(mib: u64) -> Self {
        Self::MaxBytes(mib.saturating_mul(1024 * 1024))
    }
}

impl Default for SplitThreshold {
    fn default() -> Self {
        Self::max_size_mib(DEFAULT_MAX_SIZE_MIB)
    }
}

impl fmt::Display for SplitThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Questions(n) => write!(f, "{n} questions per file"),
            Self::MaxBytes(bytes) => {
                write!(f, "{:.1} MiB per file", *bytes as f64 / f64::from(1 << 20))
            }
        }
    }
}

/// Configuration for splitting a Moodle XML file.
#[derive(Debug, Clone)]
pub struct SplitConfig {
    /// Moodle XML file to split
    pub input: PathBuf,

    /// Per-file bound for the partition
    pub threshold: SplitThreshold,

    /// Directory for the split files; defaults to the input's directory
    pub output_dir: Option<PathBuf>,

    /// Create backups of existing output files
    pub backup_existing: bool,
}

impl SplitConfig {
    /// Creates a split configuration for the given input file.
    #[must_use]
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            threshold: SplitThreshold::default(),
            output_dir: None,
            backup_existing: true,
        }
    }

    /// Sets the per-file threshold.
    #[must_use]
    pub fn threshold(mut self, threshold: SplitThreshold) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the output directory.
    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Enables or disables backup creation for existing outputs.
    #[must_use]
    pub fn backup_existing(mut self, enabled: bool) -> Self {
        self.backup_existing = enabled;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the input file doesn't exist or the threshold is
    /// degenerate.
    pub fn validate(&self) -> Result<()> {
        if !self.input.exists() {
            return Err(Error::config(format!(
                "Input XML file does not exist: {}",
                self.input.display()
            )));
        }

        if !self.input.is_file() {
            return Err(Error::config(format!(
                "Input path is not a file: {}",
                self.input.display()
            )));
        }

        match self.threshold {
            SplitThreshold::Questions(0) => {
                Err(Error::config("--questions must be at least 1"))
            }
            SplitThreshold::MaxBytes(0) => {
                Err(Error::config("--max-size must be greater than 0"))
            }
            _ => Ok(()),
        }
    }

    /// Returns the effective output directory for split files.
    #[must_use]
    pub fn effective_output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| {
            self.input
                .parent()
                .map_or_else(|| PathBuf::from("."), PathBuf::from)
        })
    }
}

/// Configuration for merging Moodle XML files.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Directory searched for `*.xml` member files
    pub directory: PathBuf,

    /// Path of the merged output document
    pub output: PathBuf,

    /// Create a backup if the output file already exists
    pub backup_existing: bool,
}

impl MergeConfig {
    /// Creates a merge configuration writing to the given output path.
    #[must_use]
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            directory: PathBuf::from("."),
            output: output.into(),
            backup_existing: true,
        }
    }

    /// Sets the directory searched for member files.
    #[must_use]
    pub fn directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.directory = dir.into();
        self
    }

    /// Enables or disables backup creation for an existing output.
    #[must_use]
    pub fn backup_existing(mut self, enabled: bool) -> Self {
        self.backup_existing = enabled;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the member directory doesn't exist.
    pub fn validate(&self) -> Result<()> {
        if !self.directory.is_dir() {
            return Err(Error::config(format!(
                "Merge directory does not exist: {}",
                self.directory.display()
            )));
        }

        Ok(())
    }
}
