use std::fmt;

/// Errors that can occur while executing a pipeline
#[derive(Debug, Clone)]
pub enum SqlError {
    /// Operator execution errors
    ExecutionError {
        message: String,
        query: Option<String>,
    },

    /// Type conversion errors
    TypeError {
        expected: String,
        actual: String,
        value: Option<String>,
    },

    /// Task or channel plumbing errors
    StreamError { task: String, message: String },
}

impl fmt::Display for SqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlError::ExecutionError { message, query } => {
                if let Some(q) = query {
                    write!(f, "Query execution error in '{}': {}", q, message)
                } else {
                    write!(f, "Query execution error: {}", message)
                }
            }
            SqlError::TypeError {
                expected,
                actual,
                value,
            } => {
                if let Some(val) = value {
                    write!(
                        f,
                        "Type error: expected {}, got {} for value '{}'",
                        expected, actual, val
                    )
                } else {
                    write!(f, "Type error: expected {}, got {}", expected, actual)
                }
            }
            SqlError::StreamError { task, message } => {
                write!(f, "Stream error in task '{}': {}", task, message)
            }
        }
    }
}

impl std::error::Error for SqlError {}

impl SqlError {
    /// Create an execution error
    pub fn execution_error(message: impl Into<String>, query: Option<String>) -> Self {
        SqlError::ExecutionError {
            message: message.into(),
            query,
        }
    }

    /// Create a type error
    pub fn type_error(
        expected: impl Into<String>,
        actual: impl Into<String>,
        value: Option<String>,
    ) -> Self {
        SqlError::TypeError {
            expected: expected.into(),
            actual: actual.into(),
            value,
        }
    }

    /// Create a stream error
    pub fn stream_error(task: impl Into<String>, message: impl Into<String>) -> Self {
        SqlError::StreamError {
            task: task.into(),
            message: message.into(),
        }
    }
}

/// Result type for pipeline operations
pub type SqlResult<T> = Result<T, SqlError>;
