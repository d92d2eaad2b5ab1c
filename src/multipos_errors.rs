use arrow_schema::ArrowError;
use parquet::errors::ParquetError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MultiposError {
    #[error("Unknown system: '{0}' is not registered in the source locations")]
    UnknownSystem(String),

    #[error("Source not found for system '{technology}' at: {location}")]
    SourceNotFound {
        technology: String,
        location: String,
    },

    #[error("Merged index not found at: {0}")]
    MergedIndexNotFound(String),

    #[error("Unsupported encoding: '{0}' (expected one of csv, parquet, binary)")]
    UnsupportedEncoding(String),

    #[error("Column '{column}' not found in the table of system '{technology}'")]
    MissingColumn { technology: String, column: String },

    #[error("Column '{column}' has an unexpected type, expected {expected}")]
    InvalidColumnType { column: String, expected: String },

    #[error("Preprocessing of system '{technology}' failed: {reason}")]
    PreprocessingFailed { technology: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed merged index: {0}")]
    MalformedIndex(String),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    ArrowError(#[from] ArrowError),

    #[error("Parquet error: {0}")]
    ParquetError(#[from] ParquetError),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Binary encoding error: {0}")]
    EncodeError(#[from] bincode::error::EncodeError),

    #[error("Binary decoding error: {0}")]
    DecodeError(#[from] bincode::error::DecodeError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Worker pool error: {0}")]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),
}

impl PartialEq for MultiposError {
    fn eq(&self, other: &Self) -> bool {
        use MultiposError::*;
        match (self, other) {
            (UnknownSystem(a), UnknownSystem(b)) => a == b,
            (
                SourceNotFound {
                    technology: ta,
                    location: la,
                },
                SourceNotFound {
                    technology: tb,
                    location: lb,
                },
            ) => ta == tb && la == lb,
            (MergedIndexNotFound(a), MergedIndexNotFound(b)) => a == b,
            (UnsupportedEncoding(a), UnsupportedEncoding(b)) => a == b,
            (
                MissingColumn {
                    technology: ta,
                    column: ca,
                },
                MissingColumn {
                    technology: tb,
                    column: cb,
                },
            ) => ta == tb && ca == cb,
            (
                InvalidColumnType {
                    column: ca,
                    expected: ea,
                },
                InvalidColumnType {
                    column: cb,
                    expected: eb,
                },
            ) => ca == cb && ea == eb,
            (
                PreprocessingFailed {
                    technology: ta,
                    reason: ra,
                },
                PreprocessingFailed {
                    technology: tb,
                    reason: rb,
                },
            ) => ta == tb && ra == rb,
            (InvalidConfig(a), InvalidConfig(b)) => a == b,
            (MalformedIndex(a), MalformedIndex(b)) => a == b,

            // Foreign errors are not comparable: equal when the variant matches
            (IoError(_), IoError(_)) => true,
            (ArrowError(_), ArrowError(_)) => true,
            (ParquetError(_), ParquetError(_)) => true,
            (CsvError(_), CsvError(_)) => true,
            (EncodeError(_), EncodeError(_)) => true,
            (DecodeError(_), DecodeError(_)) => true,
            (JsonError(_), JsonError(_)) => true,
            (ThreadPoolError(_), ThreadPoolError(_)) => true,

            _ => false,
        }
    }
}

impl MultiposError {
    /// Name of the technology this error is attributed to, when there is one.
    pub fn technology(&self) -> Option<&str> {
        match self {
            MultiposError::UnknownSystem(t) => Some(t),
            MultiposError::SourceNotFound { technology, .. }
            | MultiposError::MissingColumn { technology, .. }
            | MultiposError::PreprocessingFailed { technology, .. } => Some(technology),
            _ => None,
        }
    }
}
