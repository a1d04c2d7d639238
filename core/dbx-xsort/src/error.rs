//! Error types for the DBX external sort.
//!
//! All public APIs return `DbxResult<T>` — no panics in library code.

use smallvec::SmallVec;
use thiserror::Error;

/// Unified error type for all batch group and spill operations.
#[derive(Debug, Error)]
pub enum DbxError {
    /// Spill storage error (stream open/close, file layout, etc.)
    #[error("storage error: {0}")]
    Storage(String),

    /// Schema definition or coercion error
    #[error("schema error: {0}")]
    Schema(String),

    /// Apache Arrow error (RecordBatch and IPC operations)
    #[error("arrow error: {source}")]
    Arrow {
        #[from]
        source: arrow::error::ArrowError,
    },

    /// Standard I/O error
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Type mismatch between expected and actual values
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid operation for the current state
    #[error("invalid operation: {message}\nContext: {context}")]
    InvalidOperation { message: String, context: String },

    /// Invalid arguments
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Operation not supported by this batch group
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Spilled data could not be read back. Fatal to the run.
    #[error("data read error: {message}: {source}")]
    DataRead {
        message: String,
        #[source]
        source: Box<DbxError>,
    },

    /// Engine bug; never caused by user data
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for all DBX operations.
pub type DbxResult<T> = Result<T, DbxError>;

impl DbxError {
    /// Wraps `cause` as the user-facing "failure while reading spilled data" error.
    pub fn data_read(cause: DbxError) -> Self {
        DbxError::DataRead {
            message: "Failure while reading spilled data".to_string(),
            source: Box::new(cause),
        }
    }

    /// `true` for errors caused by data or the environment rather than an engine bug.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, DbxError::Internal(_))
    }
}

// From 구현들
impl From<serde_json::Error> for DbxError {
    fn from(err: serde_json::Error) -> Self {
        DbxError::Serialization(err.to_string())
    }
}

/// Runs every step of a multi-step teardown and keeps only the first failure.
///
/// Later failures are logged and their step names kept in
/// [`FirstError::suppressed`], so they stay visible to diagnostics without
/// replacing the error the caller sees.
#[derive(Debug, Default)]
pub struct FirstError {
    first: Option<(&'static str, DbxError)>,
    suppressed: SmallVec<[&'static str; 4]>,
}

impl FirstError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of one teardown step.
    pub fn record(&mut self, step: &'static str, result: DbxResult<()>) {
        let Err(err) = result else {
            return;
        };
        match &self.first {
            None => self.first = Some((step, err)),
            Some((first_step, _)) => {
                tracing::warn!(
                    target: "xsort",
                    step,
                    first_step = *first_step,
                    error = %err,
                    "suppressed error during close"
                );
                self.suppressed.push(step);
            }
        }
    }

    /// Names of the failed steps whose errors were swallowed.
    pub fn suppressed(&self) -> &[&'static str] {
        &self.suppressed
    }

    pub fn is_ok(&self) -> bool {
        self.first.is_none()
    }

    pub fn into_result(self) -> DbxResult<()> {
        match self.first {
            None => Ok(()),
            Some((_, err)) => Err(err),
        }
    }
}
