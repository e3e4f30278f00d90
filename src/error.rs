use thiserror::Error;

/// Error type for the classification pipeline.
///
/// Every variant is fatal for a run: no stage is retried and no partial report is produced.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The dataset id is not one of the five supported datasets.
    #[error("Dataset not recognized: `{0}`")]
    UnknownDataset(String),

    /// The algorithm id is not one of guesser, dense or conv.
    #[error("Algorithm not recognized: `{0}`")]
    UnknownAlgorithm(String),

    /// Two collections that must agree in shape do not.
    #[error("Shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A class label does not fit in the one-hot width of the dataset.
    #[error("Label {label} is out of range for {class_count} classes")]
    LabelOutOfRange { label: usize, class_count: usize },

    /// A split without a single example.
    #[error("Empty split: {0}")]
    EmptySplit(&'static str),

    /// A dense buffer that does not hold exactly one 1 per row.
    #[error("Row {row} is not a one-hot vector")]
    InvalidOneHot { row: usize },

    /// A dataset file that does not follow its binary format.
    #[error("Corrupt dataset file `{file}`: {reason}")]
    Corrupt { file: String, reason: String },

    /// I/O operation error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Tensor data could not be read back from the backend.
    #[error("Tensor data error: {0}")]
    Tensor(String),
}

impl PipelineError {
    pub(crate) fn corrupt(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            file: file.into(),
            reason: reason.into(),
        }
    }
}
