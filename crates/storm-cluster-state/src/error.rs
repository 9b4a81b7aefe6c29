//! Error types for the cluster state coordinator.

use storm_coord::StoreError;
use thiserror::Error;

/// Result type alias for cluster state operations.
pub type ClusterStateResult<T> = Result<T, ClusterStateError>;

/// Closed set of failures a cluster state call can report.
///
/// Absence of an optional record is not an error: reads return `None`
/// or an empty collection instead of [`ClusterStateError::NotFound`].
/// `NotFound` is reserved for mutations that require an existing record.
#[derive(Debug, Error)]
pub enum ClusterStateError {
    /// The coordination store is unreachable; cluster state is unknown.
    #[error("coordination store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("version conflict: {0}")]
    VersionConflict(String),

    #[error("private worker key version {version} already stored for {service}/{topology_id}")]
    DuplicateKeyVersion {
        service: String,
        topology_id: String,
        version: u64,
    },

    #[error("credential digest mismatch for topology {0}")]
    CorruptCredentials(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClusterStateError {
    /// Whether the failure is transient and the caller may retry later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::VersionConflict(_))
    }
}

impl From<StoreError> for ClusterStateError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => Self::StoreUnavailable(msg),
            StoreError::NoNode(path) => Self::NotFound(path),
            StoreError::NodeExists(path) => Self::VersionConflict(format!("{path} already exists")),
            err @ StoreError::BadVersion { .. } => Self::VersionConflict(err.to_string()),
            StoreError::InvalidPath(path) => Self::InvalidPath(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_cluster_kinds() {
        let unavailable: ClusterStateError = StoreError::Unavailable("down".into()).into();
        assert!(matches!(unavailable, ClusterStateError::StoreUnavailable(_)));
        assert!(unavailable.is_transient());

        let missing: ClusterStateError = StoreError::NoNode("/storm/storms/t1".into()).into();
        assert!(matches!(missing, ClusterStateError::NotFound(_)));
        assert!(!missing.is_transient());

        let conflict: ClusterStateError = StoreError::BadVersion {
            path: "/x".into(),
            expected: 1,
            actual: 2,
        }
        .into();
        assert!(matches!(conflict, ClusterStateError::VersionConflict(_)));
    }
}
