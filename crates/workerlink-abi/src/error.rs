//! Error types shared by workers and the marshaling layer

use std::os::raw::c_int;
use thiserror::Error;

/// Errors raised while converting values across the boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AbiError {
    /// A string bound for the host contained an interior NUL byte
    #[error("String contains an interior NUL byte at position {0}")]
    InteriorNul(usize),

    /// The C allocator returned null
    #[error("C allocator failed to allocate {0} bytes")]
    AllocationFailed(usize),

    /// A stream kind value outside the known table
    #[error("Unknown stream kind: {0}")]
    UnknownStreamKind(u32),

    /// A parameter type name outside the known set
    #[error("Unknown parameter type: {0}")]
    UnknownParameterKind(String),

    /// A declared parameter that cannot be published
    #[error("Invalid parameter descriptor '{identifier}': {reason}")]
    InvalidParameter { identifier: String, reason: String },
}

/// Errors a worker returns from its lifecycle operations.
///
/// Each failure maps onto a non-zero return code and a message written to the
/// caller's message slot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// A required job parameter is absent
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    /// A job parameter is present but unusable
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// The host rejected a stream-graph request
    #[error("Stream configuration failed: {0}")]
    StreamConfiguration(String),

    /// Reading or writing data failed
    #[error("I/O error: {0}")]
    Io(String),

    /// Any other processing failure
    #[error("{0}")]
    Processing(String),

    /// Worker code panicked; the panic did not cross the boundary
    #[error("Worker panicked: {0}")]
    Panicked(String),
}

impl WorkerError {
    pub fn processing(message: impl Into<String>) -> Self {
        WorkerError::Processing(message.into())
    }

    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        WorkerError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Non-zero return code reported across the boundary
    pub fn code(&self) -> c_int {
        match self {
            WorkerError::MissingParameter(_) => 1,
            WorkerError::InvalidParameter { .. } => 2,
            WorkerError::StreamConfiguration(_) => 3,
            WorkerError::Io(_) => 4,
            WorkerError::Processing(_) => 5,
            WorkerError::Panicked(_) => 6,
        }
    }
}

impl From<std::io::Error> for WorkerError {
    fn from(error: std::io::Error) -> Self {
        WorkerError::Io(error.to_string())
    }
}

impl From<AbiError> for WorkerError {
    fn from(error: AbiError) -> Self {
        WorkerError::Processing(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_non_zero() {
        let errors = [
            WorkerError::MissingParameter("a".into()),
            WorkerError::invalid_parameter("a", "b"),
            WorkerError::StreamConfiguration("c".into()),
            WorkerError::Io("d".into()),
            WorkerError::processing("e"),
            WorkerError::Panicked("f".into()),
        ];
        assert!(errors.iter().all(|e| e.code() != 0));
    }

    #[test]
    fn test_missing_parameter_message() {
        let error = WorkerError::MissingParameter("source_path".to_string());
        assert_eq!("Missing required parameter: source_path", error.to_string());
    }
}
