use crate::{
    config::SplitThreshold,
    error::{Error, Result},
    splitter::SplitBatch,
    xml::{QuizElement, QuizXml},
};
use serde::Serialize;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use tracing::{debug, info};

/// Manifest written next to split outputs.
///
/// Records the ordered batch list, so the original question sequence can
/// be reconstructed by reading the files in manifest (equals filename)
/// order.
#[derive(Debug, Serialize)]
pub(crate) struct SplitManifest {
    /// Source document path
    pub source: String,

    /// Threshold the partition was formed under
    pub threshold: String,

    /// Payload questions across all batches
    pub total_questions: usize,

    /// Number of batch files
    pub total_batches: usize,

    /// Execution duration in seconds
    pub duration_secs: f64,

    /// Generation timestamp
    pub generated_at: String,

    /// Ordered batch records
    pub batches: Vec<BatchRecord>,
}

/// One written batch file.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct BatchRecord {
    /// 1-based batch number, also the filename suffix
    pub number: usize,

    /// Output filename
    pub filename: String,

    /// Payload questions in the file
    pub questions: usize,

    /// File size in bytes
    pub bytes: usize,
}

/// Writes output documents with atomic operations and optional backups.
pub(crate) struct Writer {
    output_dir: PathBuf,
    backup_existing: bool,
}

impl Writer {
    /// Creates a writer targeting the given directory.
    pub(crate) fn new(output_dir: impl Into<PathBuf>, backup_existing: bool) -> Self {
        Self {
            output_dir: output_dir.into(),
            backup_existing,
        }
    }

    /// Writes one document under the writer's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the write
    /// fails.
    pub(crate) fn write_document(&self, filename: &str, content: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir).map_err(|e| Error::io(&self.output_dir, e))?;

        let path = self.output_dir.join(filename);
        self.write_file_atomic(&path, content)?;

        info!("Wrote {} ({} bytes)", path.display(), content.len());
        Ok(path)
    }

    /// Writes every batch as `{stem}-{n}.xml`, numbered from 1 in batch
    /// order, and returns the records for the manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the output directory cannot be created or a
    /// file write fails.
    pub(crate) fn write_batches(
        &self,
        quiz: &QuizXml,
        batches: &[SplitBatch],
    ) -> Result<Vec<BatchRecord>> {
        fs::create_dir_all(&self.output_dir).map_err(|e| Error::io(&self.output_dir, e))?;

        info!(
            "Writing {} batch files to {}",
            batches.len(),
            self.output_dir.display()
        );

        let mut records = Vec::with_capacity(batches.len());
        for batch in batches {
            let questions: Vec<&QuizElement> = batch.questions.iter().collect();
            let content = quiz.compose_batch(&questions);
            let filename = batch_filename(quiz.stem(), batch.index);
            let path = self.output_dir.join(&filename);

            self.write_file_atomic(&path, &content)?;

            debug!(
                "Wrote batch {}/{} ({} questions, {} bytes) to {}",
                batch.index + 1,
                batches.len(),
                batch.question_count(),
                content.len(),
                path.display()
            );

            records.push(BatchRecord {
                number: batch.index + 1,
                filename,
                questions: batch.question_count(),
                bytes: content.len(),
            });
        }

        info!("Successfully wrote {} batch files", batches.len());
        Ok(records)
    }

    /// Writes the `{stem}-manifest.json` file describing a finished split.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be written.
    pub(crate) fn write_manifest(
        &self,
        quiz: &QuizXml,
        threshold: SplitThreshold,
        records: &[BatchRecord],
        duration: Duration,
    ) -> Result<PathBuf> {
        let manifest = SplitManifest {
            source: quiz.path().display().to_string(),
            threshold: threshold.to_string(),
            total_questions: records.iter().map(|r| r.questions).sum(),
            total_batches: records.len(),
            duration_secs: duration.as_secs_f64(),
            generated_at: chrono::Local::now()
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            batches: records.to_vec(),
        };

        let path = self.output_dir.join(format!("{}-manifest.json", quiz.stem()));
        let file = fs::File::create(&path).map_err(|e| Error::io(&path, e))?;

        serde_json::to_writer_pretty(file, &manifest).map_err(Error::from)?;

        info!("Wrote manifest to {}", path.display());
        Ok(path)
    }

    /// Writes a file atomically with optional backup.
    ///
    /// # Process
    ///
    /// 1. Creates backup if file exists and backup is enabled
    /// 2. Writes content to temporary file
    /// 3. Syncs temporary file to disk
    /// 4. Atomically renames temporary file to target path
    ///
    /// A failed run therefore never leaves a partial output behind.
    fn write_file_atomic(&self, path: &Path, content: &str) -> Result<()> {
        if path.exists() && self.backup_existing {
            self.backup_file(path)?;
        }

        let temp_path = path.with_extension("tmp");
        let mut temp_file = fs::File::create(&temp_path).map_err(|e| Error::io(&temp_path, e))?;

        temp_file
            .write_all(content.as_bytes())
            .map_err(|e| Error::io(&temp_path, e))?;

        // Ensure data is flushed to disk
        temp_file
            .sync_all()
            .map_err(|e| Error::io(&temp_path, e))?;

        drop(temp_file);

        fs::rename(&temp_path, path).map_err(|e| Error::io(path, e))?;

        Ok(())
    }

    /// Creates a timestamped backup of an existing file.
    fn backup_file(&self, path: &Path) -> Result<()> {
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)?
            .as_nanos();

        let filename = path
            .file_name()
            .ok_or_else(|| Error::config("Invalid file path"))?
            .to_string_lossy();

        let backup_name = format!("{filename}.backup.{timestamp}");
        let backup_path = path
            .parent()
            .ok_or_else(|| Error::config("Invalid file path"))?
            .join(backup_name);

        fs::copy(path, &backup_path).map_err(|e| Error::io(&backup_path, e))?;

        debug!("Created backup: {}", backup_path.display());
        Ok(())
    }
}

/// Filename of the batch with the given 0-based index for an input stem.
fn batch_filename(stem: &str, index: usize) -> String {
    format!("{stem}-{}.xml", index + 1)
}
