//! Error handling for the fuzzer driver.

use thiserror::Error;

/// Main error type for the fuzzer driver.
#[derive(Debug, Error)]
pub enum FuzzError {
    /// Missing or ill-formed command-line arguments.
    #[error("usage error: {0}")]
    Usage(String),

    /// The interpreter could not reach end-of-file legally while parsing.
    #[error("parse failure: {0}")]
    ParseFailure(String),

    /// A `get_chunk` request's file-byte range did not align with any named chunk.
    #[error("no chunk found for file byte range [{start}, {end}]")]
    ChunkNotFound { start: usize, end: usize },

    /// A replace tried to graft a non-optional chunk onto an optional slot or vice versa.
    #[error("optionality mismatch: target optional={target_optional}, source optional={source_optional}")]
    OptionalityMismatch {
        target_optional: bool,
        source_optional: bool,
    },

    /// A replace tried to graft non-optional chunks of differing type tags.
    #[error("type mismatch: target type `{target}`, source type `{source}`")]
    TypeMismatch { target: String, source: String },

    /// A delete was attempted on a chunk that is not optional, or not followed by one.
    #[error("chunk is not deletable: optional={optional}, following_optional={following_optional}")]
    NotDeletable { optional: bool, following_optional: bool },

    /// The interpreter produced empty output, or aborted, after a splice.
    #[error("generation failed after splice")]
    GenerationFailed,

    /// The decision stream or file buffer would exceed its fixed capacity.
    #[error("capacity exceeded: needed {needed}, capacity {capacity}")]
    CapacityExceeded { needed: usize, capacity: usize },

    /// Propagated I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for fuzzer operations.
pub type Result<T> = std::result::Result<T, FuzzError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            FuzzError::Usage("missing output file".into()).to_string(),
            "usage error: missing output file"
        );
        assert_eq!(
            FuzzError::ChunkNotFound { start: 4, end: 10 }.to_string(),
            "no chunk found for file byte range [4, 10]"
        );
        assert_eq!(
            FuzzError::NotDeletable { optional: false, following_optional: true }.to_string(),
            "chunk is not deletable: optional=false, following_optional=true"
        );
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FuzzError = io_err.into();
        assert!(matches!(err, FuzzError::Io(_)));
        assert_eq!(err.to_string(), "I/O error: file not found");
    }
}
