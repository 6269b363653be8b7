use crate::{
    config::SplitThreshold,
    error::{Error, Result},
    xml::{QuizElement, QuizXml},
};
use tracing::{debug, warn};

/// One split output file in the making: a contiguous run of payload
/// questions plus the size of the document they will compose.
#[derive(Debug, Clone)]
pub struct SplitBatch {
    /// Sequential batch index (0-based; output filenames are numbered
    /// from 1)
    pub index: usize,

    /// Payload questions in document order
    pub questions: Vec<QuizElement>,

    /// Bytes of the composed output file, wrapper overhead included
    pub size: usize,
}

impl SplitBatch {
    /// Creates a new batch.
    #[must_use]
    pub fn new(index: usize, questions: Vec<QuizElement>, size: usize) -> Self {
        Self {
            index,
            questions,
            size,
        }
    }

    /// Returns the number of payload questions in this batch.
    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    /// Returns true if this batch holds no questions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// Partitions the payload questions of a Moodle document into batches
/// bounded by a question count or an output file size.
pub struct Splitter {
    threshold: SplitThreshold,
}

impl Splitter {
    /// Creates a new splitter for the given threshold.
    #[must_use]
    pub const fn new(threshold: SplitThreshold) -> Self {
        Self { threshold }
    }

    /// Splits a parsed document into batches.
    ///
    /// # Algorithm
    ///
    /// Payload questions are taken strictly in document order; each is
    /// appended to the current batch unless that would exceed the
    /// threshold, in which case the batch is closed and a new one starts.
    /// The partition is deterministic, never reorders, and concatenating
    /// all batches reproduces the payload exactly.
    ///
    /// A question too large for the byte budget on its own still becomes
    /// an oversized single-question batch: question elements are atomic
    /// and never split across files.
    ///
    /// # Errors
    ///
    /// Returns an error if the document has no payload questions.
    pub fn split(&self, quiz: &QuizXml) -> Result<Vec<SplitBatch>> {
        if quiz.payload_count() == 0 {
            return Err(Error::parse(
                quiz.path(),
                "document contains no questions to split",
            ));
        }

        let overhead = quiz.wrapper_overhead();
        let mut batches = Vec::new();
        let mut builder = BatchBuilder::new(0, self.threshold, overhead);

        for question in quiz.payload() {
            if !builder.can_fit(question) {
                let finished = std::mem::replace(
                    &mut builder,
                    BatchBuilder::new(batches.len() + 1, self.threshold, overhead),
                );

                if let Some(batch) = finished.build() {
                    batches.push(batch);
                }
            }

            builder.add(question.clone());

            if builder.question_count() == 1 && builder.over_budget() {
                warn!(
                    "Question '{}' alone overflows the {} budget; it gets its own oversized file",
                    question.name.as_deref().unwrap_or("unnamed"),
                    self.threshold
                );
            }
        }

        // Finalize last batch
        if let Some(batch) = builder.build() {
            batches.push(batch);
        }

        self.log_partition(quiz, &batches);

        Ok(batches)
    }

    /// Logs the shape of the finished partition.
    fn log_partition(&self, quiz: &QuizXml, batches: &[SplitBatch]) {
        if batches.is_empty() {
            return;
        }

        let min_size = batches.iter().map(|b| b.size).min().unwrap_or(0);
        let max_size = batches.iter().map(|b| b.size).max().unwrap_or(0);

        debug!(
            "Partitioned {} questions of '{}' into {} batches ({}..{} bytes, {})",
            quiz.payload_count(),
            quiz.path().display(),
            batches.len(),
            min_size,
            max_size,
            self.threshold
        );
    }
}

/// Builder for accumulating one batch at a time.
struct BatchBuilder {
    index: usize,
    threshold: SplitThreshold,
    questions: Vec<QuizElement>,
    size: usize,
}

impl BatchBuilder {
    /// Creates a builder whose size starts at the wrapper overhead of an
    /// empty output document.
    fn new(index: usize, threshold: SplitThreshold, overhead: usize) -> Self {
        Self {
            index,
            threshold,
            questions: Vec::new(),
            size: overhead,
        }
    }

    /// Checks whether the next question fits under the threshold.
    ///
    /// An empty batch accepts any question: atomic elements are never
    /// split, so the first question always goes in.
    fn can_fit(&self, question: &QuizElement) -> bool {
        if self.questions.is_empty() {
            return true;
        }

        match self.threshold {
            SplitThreshold::Questions(max) => self.questions.len() < max,
            SplitThreshold::MaxBytes(max) => (self.size + cost(question)) as u64 <= max,
        }
    }

    /// Adds a question to the batch.
    fn add(&mut self, question: QuizElement) {
        self.size += cost(&question);
        self.questions.push(question);
    }

    fn question_count(&self) -> usize {
        self.questions.len()
    }

    /// True when a byte budget is already blown; only possible for a
    /// singleton, since `can_fit` guards every later addition.
    fn over_budget(&self) -> bool {
        match self.threshold {
            SplitThreshold::Questions(_) => false,
            SplitThreshold::MaxBytes(max) => self.size as u64 > max,
        }
    }

    /// Builds the final batch if not empty.
    fn build(self) -> Option<SplitBatch> {
        if self.questions.is_empty() {
            None
        } else {
            Some(SplitBatch::new(self.index, self.questions, self.size))
        }
    }
}

/// Bytes one question contributes to a composed document: its element
/// text plus the trailing newline the composer emits.
fn cost(question: &QuizElement) -> usize {
    question.size() + 1
}
