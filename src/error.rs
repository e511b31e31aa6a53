//! Error types for the tagger.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for model construction, data loading and training.
#[derive(Error, Debug)]
pub enum TaggerError {
    /// Adjacent layers disagree about the width passed between them.
    #[error("shape mismatch at layer {layer}: expected input width {expected}, found {found}")]
    ShapeMismatch {
        /// Index of the layer whose input does not match.
        layer: usize,
        /// Width produced by the previous layer.
        expected: usize,
        /// Width the layer declared as its input.
        found: usize,
    },

    /// A network was requested with no layers.
    #[error("network has no layers")]
    EmptyNetwork,

    /// A layer received an activation of the wrong kind (ids vs. dense values).
    #[error("layer {layer} expected {expected} input")]
    UnexpectedInput {
        /// Layer type name.
        layer: String,
        /// Kind of activation the layer consumes.
        expected: &'static str,
    },

    /// A backward pass was handed a context produced by a different layer.
    #[error("layer {0} received a context from another layer")]
    ContextMismatch(String),

    /// The first layer owns no embedding table.
    #[error("first layer ({0}) has no vector table")]
    NoVectorTable(String),

    /// Token and tag sequences of one example differ in length.
    #[error("example has {tokens} tokens but {tags} tags")]
    LengthMismatch {
        /// Number of token ids.
        tokens: usize,
        /// Number of tag ids.
        tags: usize,
    },

    /// Sentence lengths do not add up to the number of rows in a batch.
    #[error("sentence lengths sum to {total} but the batch has {rows} rows")]
    BatchLengths {
        /// Rows in the activation.
        rows: usize,
        /// Sum of the sentence lengths.
        total: usize,
    },

    /// A gold tag lies outside the classifier's output range.
    #[error("tag {tag} is out of range for {nr_class} classes")]
    TagOutOfRange {
        /// Offending tag id.
        tag: usize,
        /// Number of classes the model predicts.
        nr_class: usize,
    },

    /// Dropout rate outside `[0, 1)`.
    #[error("invalid dropout rate {0}: must be in [0, 1)")]
    InvalidDropout(f32),

    /// Configuration values are inconsistent or out of range.
    #[error("configuration error: {0}")]
    Config(String),

    /// A dataset file is malformed.
    #[error("{path}:{line}: {message}")]
    Dataset {
        /// File being read.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// What was wrong with the line.
        message: String,
    },

    /// The validation data uses a tag never seen during training.
    #[error("tag {0:?} does not occur in the training data")]
    UnknownTag(String),

    /// File not found.
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Array shape error from ndarray.
    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// Invalid distribution parameters for initialisation.
    #[error("distribution error: {0}")]
    Distribution(String),
}

/// Result type alias for tagger operations.
pub type Result<T> = std::result::Result<T, TaggerError>;

impl From<rand_distr::NormalError> for TaggerError {
    fn from(e: rand_distr::NormalError) -> Self {
        TaggerError::Distribution(e.to_string())
    }
}

impl From<rand_distr::BernoulliError> for TaggerError {
    fn from(e: rand_distr::BernoulliError) -> Self {
        TaggerError::Distribution(e.to_string())
    }
}
