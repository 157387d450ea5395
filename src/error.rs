//! Error types for flip-batch operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for flip-batch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while comparing renders.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An input image does not exist.
    #[error("File not found: {}", path.display())]
    FileNotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// An input image exists but could not be decoded.
    #[error("Unreadable image: {}: {reason}", path.display())]
    UnreadableImage {
        /// Path to the image that failed to decode.
        path: PathBuf,
        /// Reason reported by the decoder.
        reason: String,
    },

    /// Reference and test images have different dimensions.
    #[error("Dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        /// Reference dimensions (width, height).
        expected: (usize, usize),
        /// Test dimensions (width, height).
        actual: (usize, usize),
    },

    /// A label matched more than one counterpart under a rejecting policy.
    #[error("Ambiguous match for label '{label}': {candidates} candidates")]
    AmbiguousMatch {
        /// Label that matched ambiguously.
        label: String,
        /// Number of competing matches.
        candidates: usize,
    },

    /// A batch produced no reference/test pairs.
    #[error("No pairs matched between {} and {}", reference_dir.display(), test_dir.display())]
    NoPairsMatched {
        /// Reference directory that was scanned.
        reference_dir: PathBuf,
        /// Test directory that was scanned.
        test_dir: PathBuf,
    },

    /// An input directory could not be listed.
    #[error("Cannot read directory {}: {reason}", path.display())]
    DirectoryUnreadable {
        /// Directory path.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Failed to calculate the perceptual metric.
    #[error("Metric calculation failed: {metric}: {reason}")]
    MetricCalculation {
        /// Name of the metric that failed.
        metric: String,
        /// Reason for the failure.
        reason: String,
    },

    /// Configuration is inconsistent or incomplete.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Writing an output image failed.
    #[error("Failed to write {}: {reason}", path.display())]
    ImageWrite {
        /// Destination path.
        path: PathBuf,
        /// Reason for the failure.
        reason: String,
    },

    /// I/O error wrapper.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Coarse classification of an [`Error`], used in failure records and run
/// summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// [`Error::FileNotFound`].
    FileNotFound,
    /// [`Error::UnreadableImage`].
    UnreadableImage,
    /// [`Error::DimensionMismatch`].
    DimensionMismatch,
    /// [`Error::AmbiguousMatch`].
    AmbiguousMatch,
    /// [`Error::NoPairsMatched`].
    NoPairsMatched,
    /// [`Error::DirectoryUnreadable`].
    DirectoryUnreadable,
    /// [`Error::MetricCalculation`].
    MetricCalculation,
    /// [`Error::InvalidConfig`].
    InvalidConfig,
    /// [`Error::ImageWrite`].
    ImageWrite,
    /// [`Error::Io`].
    Io,
    /// [`Error::Json`] or [`Error::Csv`].
    Serialization,
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FileNotFound { .. } => ErrorKind::FileNotFound,
            Self::UnreadableImage { .. } => ErrorKind::UnreadableImage,
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Self::AmbiguousMatch { .. } => ErrorKind::AmbiguousMatch,
            Self::NoPairsMatched { .. } => ErrorKind::NoPairsMatched,
            Self::DirectoryUnreadable { .. } => ErrorKind::DirectoryUnreadable,
            Self::MetricCalculation { .. } => ErrorKind::MetricCalculation,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::ImageWrite { .. } => ErrorKind::ImageWrite,
            Self::Io(_) => ErrorKind::Io,
            Self::Json(_) | Self::Csv(_) => ErrorKind::Serialization,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::FileNotFound => "FileNotFound",
            Self::UnreadableImage => "UnreadableImage",
            Self::DimensionMismatch => "DimensionMismatch",
            Self::AmbiguousMatch => "AmbiguousMatch",
            Self::NoPairsMatched => "NoPairsMatched",
            Self::DirectoryUnreadable => "DirectoryUnreadable",
            Self::MetricCalculation => "MetricCalculation",
            Self::InvalidConfig => "InvalidConfig",
            Self::ImageWrite => "ImageWrite",
            Self::Io => "Io",
            Self::Serialization => "Serialization",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let err = Error::DimensionMismatch {
            expected: (4, 4),
            actual: (8, 4),
        };
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
        assert_eq!(err.kind().to_string(), "DimensionMismatch");

        let err = Error::FileNotFound {
            path: PathBuf::from("missing.png"),
        };
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
        assert!(err.to_string().contains("missing.png"));
    }
}
