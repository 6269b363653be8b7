use crate::{
    database::{Database, VariableRow},
    error::{Error, Result},
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Recognizes both placeholder spellings:
///
/// - `{{name}}` (optionally `{{ name }}`)
/// - `\VAR{name}`, the LaTeX-friendly form that never collides with
///   surrounding TeX braces
///
/// Names are single words: a letter followed by letters or digits. TeX
/// group braces like `\frac{x}{2}` therefore never match; a doubled-brace
/// pair only counts as a placeholder when it wraps a bare identifier.
static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z][A-Za-z0-9]*)\s*\}\}|\\VAR\{([A-Za-z][A-Za-z0-9]*)\}")
        .expect("Invalid placeholder regex")
});

/// Matches the draft option of the moodle.sty package line, e.g.
/// `\usepackage[draft]{moodle}`. With draft set, moodle.sty skips writing
/// the XML artifact, so the option has to go before compilation.
static MOODLE_DRAFT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(\\usepackage\S+)draft(\S+\{moodle\})$").expect("Invalid draft-mode regex")
});

/// A LaTeX quiz template with named placeholders.
///
/// The template text is read once; substitution is a single left-to-right
/// pass, so substituted values are never rescanned for further placeholders.
#[derive(Debug, Clone)]
pub struct QuizTemplate {
    path: PathBuf,
    name: String,
    stem: String,
    source: String,
    placeholders: Vec<String>,
}

impl QuizTemplate {
    /// Loads a template from disk and scans it for placeholders.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        let stem = path
            .file_stem()
            .map_or_else(|| "quiz".to_string(), |s| s.to_string_lossy().into_owned());

        let placeholders = scan_placeholders(&source);
        debug!(
            "Loaded template '{}' with {} distinct placeholders",
            name,
            placeholders.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            name,
            stem,
            source,
            placeholders,
        })
    }

    /// Returns the template's file name, used in error messages.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the template's file stem, used to name outputs.
    #[must_use]
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Returns the template path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the distinct placeholder names in first-appearance order.
    #[must_use]
    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    /// Checks every placeholder against the database columns before any
    /// rendering happens.
    ///
    /// Columns the template never references are tolerated with a warning.
    ///
    /// # Errors
    ///
    /// Returns a missing-variable error naming the first placeholder that
    /// has no column.
    pub fn validate_columns(&self, database: &Database) -> Result<()> {
        for placeholder in &self.placeholders {
            if !database.has_column(placeholder) {
                return Err(Error::missing_variable(placeholder, &self.name));
            }
        }

        for column in &database.headers {
            if !self.placeholders.iter().any(|p| p == column) {
                warn!(
                    "Column '{}' in '{}' is not referenced by template '{}'",
                    column,
                    database.path.display(),
                    self.name
                );
            }
        }

        Ok(())
    }

    /// Substitutes one data row into the template.
    ///
    /// Every occurrence of every placeholder is replaced with the row's
    /// value for that column, verbatim. The pass never re-examines
    /// substituted text, so values containing placeholder-shaped text stay
    /// literal.
    ///
    /// # Errors
    ///
    /// Returns a missing-variable error if a placeholder has no matching
    /// column. [`QuizTemplate::validate_columns`] reports this before any
    /// row is rendered; the check here keeps the pass fail-safe on its own.
    pub fn render_row(&self, headers: &[String], row: &VariableRow) -> Result<String> {
        let bindings: HashMap<&str, &str> = headers
            .iter()
            .map(String::as_str)
            .zip(row.values.iter().map(String::as_str))
            .collect();

        let mut rendered = String::with_capacity(self.source.len());
        let mut last = 0;

        for caps in PLACEHOLDER_RE.captures_iter(&self.source) {
            let Some(whole) = caps.get(0) else { continue };
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map_or("", |m| m.as_str());

            rendered.push_str(&self.source[last..whole.start()]);
            match bindings.get(name) {
                Some(value) => rendered.push_str(value),
                None => return Err(Error::missing_variable(name, &self.name)),
            }
            last = whole.end();
        }
        rendered.push_str(&self.source[last..]);

        trace!("Rendered row {} of '{}'", row.number, self.name);
        Ok(rendered)
    }
}

/// Collects distinct placeholder names in first-appearance order.
fn scan_placeholders(source: &str) -> Vec<String> {
    let mut names = Vec::new();
    for caps in PLACEHOLDER_RE.captures_iter(source) {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map_or("", |m| m.as_str());
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Removes the draft option from the moodle.sty package line so compilation
/// emits the XML artifact.
pub(crate) fn strip_draft_mode(document: &str) -> String {
    let stripped = MOODLE_DRAFT_RE.replace_all(document, "${1}${2}");
    stripped.replace(r"\usepackage[]{moodle}", r"\usepackage{moodle}")
}
