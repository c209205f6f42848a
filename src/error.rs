//! Domain errors surfaced to the host

use thiserror::Error;

/// Reasons a mapping file is rejected
///
/// An import either applies completely or not at all; any of these leaves the
/// current slot table untouched.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("missing key {key}")]
    MissingKey { key: String },

    #[error("{key} is not a number: '{value}'")]
    InvalidNumber { key: String, value: String },

    #[error("{key} is out of range: {value}")]
    OutOfRange { key: String, value: i64 },

    #[error("unknown command '{name}'")]
    UnknownCommand { name: String },

    #[error("malformed line {line}: {reason}")]
    Syntax { line: usize, reason: String },

    #[error("failed to read mapping file: {0}")]
    Io(#[from] std::io::Error),

    #[error("surface is not running")]
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_key() {
        let err = ImportError::InvalidNumber {
            key: "SLOT3_NUMBER".into(),
            value: "abc".into(),
        };
        assert_eq!(err.to_string(), "SLOT3_NUMBER is not a number: 'abc'");

        let err = ImportError::UnknownCommand { name: "Transport: Fly".into() };
        assert!(err.to_string().contains("Transport: Fly"));
    }
}
