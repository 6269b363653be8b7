use crate::{
    config::RowSelection,
    error::{Error, Result},
};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// One data row of the variable database.
///
/// Values are stored in column order; `number` is the 1-based data row
/// number (the header row is not counted) and survives row selection, so a
/// question generated from row 7 is always named after row 7.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableRow {
    /// 1-based data row number
    pub number: usize,

    /// Field values in header order
    pub values: Vec<String>,
}

/// The parsed CSV database: column names plus ordered data rows.
#[derive(Debug, Clone)]
pub struct Database {
    /// Path the database was loaded from
    pub path: PathBuf,

    /// Column names from the header row
    pub headers: Vec<String>,

    /// Data rows in file order
    pub rows: Vec<VariableRow>,
}

impl Database {
    /// Loads a CSV database from disk.
    ///
    /// The first record is the header row naming the template placeholders.
    /// Every data row must have exactly as many fields as the header.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be opened or read
    /// - The header row is missing
    /// - A data row has the wrong number of fields (reported with its
    ///   1-based row number)
    /// - There are no data rows at all
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let mut reader = csv::Reader::from_reader(file);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| Error::row_format(path, 0, e.to_string()))?
            .iter()
            .map(str::to_string)
            .collect();

        if headers.is_empty() || (headers.len() == 1 && headers[0].is_empty()) {
            return Err(Error::config(format!(
                "Database '{}' has no header row",
                path.display()
            )));
        }

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let number = index + 1;
            let record = record.map_err(|e| describe_record_error(path, number, &e))?;

            trace!("Row {}: {} fields", number, record.len());
            rows.push(VariableRow {
                number,
                values: record.iter().map(str::to_string).collect(),
            });
        }

        if rows.is_empty() {
            return Err(Error::config(format!(
                "Database '{}' contains a header but no data rows; nothing to generate",
                path.display()
            )));
        }

        debug!(
            "Loaded {} data rows with {} columns from {}",
            rows.len(),
            headers.len(),
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            headers,
            rows,
        })
    }

    /// Returns true if the header row names the given column.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    /// Restricts the database to the selected rows.
    ///
    /// `First(n)` keeps the leading `n` rows (all of them when `n` exceeds
    /// the row count); `Only(i)` keeps the single row numbered `i`. Kept
    /// rows retain their original row numbers.
    ///
    /// # Errors
    ///
    /// Returns an error if `Only(i)` names a row past the end of the data.
    pub fn select(mut self, selection: RowSelection) -> Result<Self> {
        match selection {
            RowSelection::All => {}
            RowSelection::First(n) => {
                self.rows.truncate(n);
            }
            RowSelection::Only(i) => {
                if i > self.rows.len() {
                    return Err(Error::config(format!(
                        "--index {} is out of range: '{}' has {} data rows",
                        i,
                        self.path.display(),
                        self.rows.len()
                    )));
                }
                self.rows = vec![self.rows.swap_remove(i - 1)];
            }
        }

        Ok(self)
    }
}

/// Turns a csv crate error into a row-level message a user can act on.
fn describe_record_error(path: &Path, row: usize, e: &csv::Error) -> Error {
    let message = match e.kind() {
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => {
            format!("expected {expected_len} fields, found {len}")
        }
        _ => e.to_string(),
    };
    Error::row_format(path, row, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    fn write_csv(content: &str) -> (assert_fs::TempDir, PathBuf) {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("vars.csv");
        file.write_str(content).unwrap();
        let path = file.path().to_path_buf();
        (temp, path)
    }

    #[test]
    fn test_load_rows_in_file_order() {
        let (_temp, path) = write_csv("a,b\n1,2\n3,4\n");
        let db = Database::load(&path).unwrap();

        assert_eq!(db.headers, vec!["a", "b"]);
        assert_eq!(db.rows.len(), 2);
        assert_eq!(db.rows[0].number, 1);
        assert_eq!(db.rows[0].values, vec!["1", "2"]);
        assert_eq!(db.rows[1].number, 2);
        assert_eq!(db.rows[1].values, vec!["3", "4"]);
    }

    #[test]
    fn test_quoted_fields_keep_commas() {
        let (_temp, path) = write_csv("a,b\n\"1,5\",2\n");
        let db = Database::load(&path).unwrap();

        assert_eq!(db.rows[0].values[0], "1,5");
    }

    #[test]
    fn test_ragged_row_reports_its_number() {
        let (_temp, path) = write_csv("a,b,c\n1,2,3\n4,5\n6,7,8\n");
        let err = Database::load(&path).unwrap_err();

        assert!(err.is_row_format());
        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn test_header_only_is_config_error() {
        let (_temp, path) = write_csv("a,b\n");
        let err = Database::load(&path).unwrap_err();

        assert!(err.is_config());
        assert!(err.to_string().contains("no data rows"));
    }

    #[test]
    fn test_empty_file_is_config_error() {
        let (_temp, path) = write_csv("");
        let err = Database::load(&path).unwrap_err();

        assert!(err.is_config());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let err = Database::load(temp.path().join("absent.csv")).unwrap_err();

        assert!(err.is_io());
    }

    #[test]
    fn test_select_first_n() {
        let (_temp, path) = write_csv("a\n1\n2\n3\n");
        let db = Database::load(&path).unwrap().select(RowSelection::First(2)).unwrap();

        assert_eq!(db.rows.len(), 2);
        assert_eq!(db.rows[1].values, vec!["2"]);
    }

    #[test]
    fn test_select_first_beyond_end_keeps_all() {
        let (_temp, path) = write_csv("a\n1\n2\n");
        let db = Database::load(&path).unwrap().select(RowSelection::First(10)).unwrap();

        assert_eq!(db.rows.len(), 2);
    }

    #[test]
    fn test_select_only_keeps_original_number() {
        let (_temp, path) = write_csv("a\n1\n2\n3\n");
        let db = Database::load(&path).unwrap().select(RowSelection::Only(2)).unwrap();

        assert_eq!(db.rows.len(), 1);
        assert_eq!(db.rows[0].number, 2);
        assert_eq!(db.rows[0].values, vec!["2"]);
    }

    #[test]
    fn test_select_only_out_of_range() {
        let (_temp, path) = write_csv("a\n1\n");
        let err = Database::load(&path)
            .unwrap()
            .select(RowSelection::Only(5))
            .unwrap_err();

        assert!(err.is_config());
        assert!(err.to_string().contains("1 data rows"));
    }
}
