use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Process exit codes, one per error class.
///
/// The binary maps every [`Error`] to one of these via [`Error::exit_code`],
/// so scripts can distinguish bad invocations from bad data from a broken
/// LaTeX toolchain.
pub mod exit_codes {
    /// Run completed without errors.
    pub const SUCCESS: i32 = 0;
    /// Invalid configuration or usage.
    pub const CONFIG: i32 = 1;
    /// Bad input data: missing placeholder column, malformed CSV row,
    /// unparseable XML.
    pub const DATA: i32 = 2;
    /// The external LaTeX toolchain failed.
    pub const COMPILE: i32 = 3;
    /// File could not be read or written.
    pub const IO: i32 = 4;
    /// Internal failure (template engine, serialization, clock).
    pub const INTERNAL: i32 = 5;
}

/// Comprehensive error types for the genmq library.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// IO error with context about the file path.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Output template rendering error.
    #[error("Failed to render template '{template}': {message}")]
    Template {
        /// Template name
        template: String,
        /// Error message
        message: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// Template placeholder with no matching database column.
    #[error("Placeholder '{name}' in template '{template}' has no matching column in the database")]
    MissingVariable {
        /// Placeholder name as written in the template
        name: String,
        /// Template the placeholder appears in
        template: String,
    },

    /// Malformed CSV data row.
    #[error("Malformed row {row} in '{path}': {message}")]
    RowFormat {
        /// Path to the CSV file
        path: PathBuf,
        /// 1-based data row number
        row: usize,
        /// What was wrong with the row
        message: String,
    },

    /// External LaTeX toolchain failure.
    #[error("LaTeX toolchain failed ({program}): {detail}")]
    Compile {
        /// Program that failed (pdflatex, pythontex)
        program: String,
        /// Captured detail, typically the tail of stderr
        detail: String,
    },

    /// Input XML could not be parsed as a Moodle document.
    #[error("Failed to parse '{path}' as Moodle XML: {message}")]
    Parse {
        /// Path to the XML file
        path: PathBuf,
        /// Parser message with position information
        message: String,
    },

    /// JSON serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },

    /// System time error.
    #[error("System time error: {message}")]
    SystemTime {
        /// Error message
        message: String,
    },
}

impl Error {
    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a template error.
    #[must_use]
    pub fn template(template: impl Into<String>, source: tera::Error) -> Self {
        Self::Template {
            template: template.into(),
            message: source.to_string(),
        }
    }

    /// Creates a missing variable error.
    #[must_use]
    pub fn missing_variable(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self::MissingVariable {
            name: name.into(),
            template: template.into(),
        }
    }

    /// Creates a row format error with its 1-based data row number.
    #[must_use]
    pub fn row_format(path: impl Into<PathBuf>, row: usize, message: impl Into<String>) -> Self {
        Self::RowFormat {
            path: path.into(),
            row,
            message: message.into(),
        }
    }

    /// Creates a compilation error.
    #[must_use]
    pub fn compile(program: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Compile {
            program: program.into(),
            detail: detail.into(),
        }
    }

    /// Creates an XML parse error.
    #[must_use]
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns true if this is an IO error.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Returns true if this is a missing variable error.
    #[must_use]
    pub const fn is_missing_variable(&self) -> bool {
        matches!(self, Self::MissingVariable { .. })
    }

    /// Returns true if this is a row format error.
    #[must_use]
    pub const fn is_row_format(&self) -> bool {
        matches!(self, Self::RowFormat { .. })
    }

    /// Returns true if this is a compilation error.
    #[must_use]
    pub const fn is_compile(&self) -> bool {
        matches!(self, Self::Compile { .. })
    }

    /// Returns true if this is an XML parse error.
    #[must_use]
    pub const fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }

    /// Returns the process exit code for this error class.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => exit_codes::CONFIG,
            Self::MissingVariable { .. } | Self::RowFormat { .. } | Self::Parse { .. } => {
                exit_codes::DATA
            }
            Self::Compile { .. } => exit_codes::COMPILE,
            Self::Io { .. } => exit_codes::IO,
            Self::Template { .. } | Self::Serialization { .. } | Self::SystemTime { .. } => {
                exit_codes::INTERNAL
            }
        }
    }
}

// Conversion implementations for convenient error handling
impl From<std::time::SystemTimeError> for Error {
    fn from(e: std::time::SystemTimeError) -> Self {
        Self::SystemTime {
            message: e.to_string(),
        }
    }
}

impl From<tera::Error> for Error {
    fn from(e: tera::Error) -> Self {
        Self::Template {
            template: "unknown".to_string(),
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}
