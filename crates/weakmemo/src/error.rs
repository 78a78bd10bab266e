//! Error types for weakmemo

use std::fmt;

/// Result type alias for weakmemo construction
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building a memoizer
///
/// Calls and invalidations never fail on their own; errors from the wrapped
/// callable are returned unchanged through [`crate::Memoized::try_call`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Options failed validation
    InvalidOptions(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidOptions(msg) => write!(f, "Invalid memoize options: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidOptions("sweep_threshold must be greater than 0".into());
        assert_eq!(
            err.to_string(),
            "Invalid memoize options: sweep_threshold must be greater than 0"
        );
    }
}
