//! Error types for metadata assembly and emission.

use crate::merge::Category;
use thiserror::Error;

/// A specialised Result type for metadata operations.
pub type Result<T> = std::result::Result<T, MetadataError>;

/// Errors that can occur while configuring or emitting telemetry metadata.
///
/// Assembly itself never fails: missing inputs are substituted with
/// defaults. Errors only come from configuration and from the telemetry
/// clients the merged metadata is handed to.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Configuration could not be loaded or extracted.
    #[error("configuration error")]
    Config(#[source] Box<figment::Error>),

    /// A merge order did not name each category exactly once.
    #[error("invalid merge order {0:?}: expected static, dynamic and required exactly once")]
    InvalidMergeOrder(Vec<Category>),

    /// A merge order category name was not recognised.
    #[error("unknown metadata category `{0}`")]
    UnknownCategory(String),

    /// A log entry or metric document could not be serialised.
    #[error("failed to serialise telemetry document")]
    Serialize(#[from] serde_json::Error),

    /// A log entry or metric document could not be written.
    #[error("failed to write telemetry document")]
    Io(#[from] std::io::Error),

    /// The embedded metric collector could not be installed as the global
    /// `metrics` recorder.
    #[error("failed to install metrics recorder: {0}")]
    MetricsRecorder(String),
}

impl From<figment::Error> for MetadataError {
    fn from(err: figment::Error) -> Self {
        MetadataError::Config(Box::new(err))
    }
}
