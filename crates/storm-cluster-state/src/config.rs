//! Cluster state configuration, read from TOML.
//!
//! ```toml
//! root = "/storm"
//! max_errors_per_component = 10
//!
//! [store]
//! data_path = "/var/lib/storm/cluster-state.redb"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ClusterStateError, ClusterStateResult};

pub const DEFAULT_ROOT: &str = "/storm";
pub const DEFAULT_MAX_ERRORS_PER_COMPONENT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterStateConfig {
    /// Path under which all cluster state lives.
    pub root: String,
    /// Error records kept per (topology, component); older ones are dropped.
    pub max_errors_per_component: usize,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file. When absent the store lives in memory.
    pub data_path: Option<PathBuf>,
}

impl Default for ClusterStateConfig {
    fn default() -> Self {
        Self {
            root: DEFAULT_ROOT.to_string(),
            max_errors_per_component: DEFAULT_MAX_ERRORS_PER_COMPONENT,
            store: StoreConfig::default(),
        }
    }
}

impl ClusterStateConfig {
    pub fn from_file(path: &Path) -> ClusterStateResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClusterStateError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ClusterStateResult<Self> {
        let config: ClusterStateConfig =
            toml::from_str(content).map_err(|e| ClusterStateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ClusterStateResult<String> {
        toml::to_string_pretty(self).map_err(|e| ClusterStateError::Config(e.to_string()))
    }

    pub fn validate(&self) -> ClusterStateResult<()> {
        if self.root == "/" {
            return Err(ClusterStateError::Config(
                "root must not be the tree root".to_string(),
            ));
        }
        storm_coord::path::validate(&self.root)
            .map_err(|_| ClusterStateError::Config(format!("invalid root path {:?}", self.root)))?;
        if self.max_errors_per_component == 0 {
            return Err(ClusterStateError::Config(
                "max_errors_per_component must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_uses_defaults() {
        let config = ClusterStateConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClusterStateConfig::default());
        assert_eq!(config.root, "/storm");
        assert!(config.store.data_path.is_none());
    }

    #[test]
    fn parse_full() {
        let toml_str = r#"
root = "/prod/storm"
max_errors_per_component = 3

[store]
data_path = "/tmp/state.redb"
"#;
        let config = ClusterStateConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.root, "/prod/storm");
        assert_eq!(config.max_errors_per_component, 3);
        assert_eq!(
            config.store.data_path.as_deref(),
            Some(Path::new("/tmp/state.redb"))
        );
    }

    #[test]
    fn rejects_bad_root_and_zero_cap() {
        assert!(matches!(
            ClusterStateConfig::from_toml_str("root = \"storm\""),
            Err(ClusterStateError::Config(_))
        ));
        assert!(matches!(
            ClusterStateConfig::from_toml_str("root = \"/\""),
            Err(ClusterStateError::Config(_))
        ));
        assert!(matches!(
            ClusterStateConfig::from_toml_str("max_errors_per_component = 0"),
            Err(ClusterStateError::Config(_))
        ));
    }

    #[test]
    fn round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster.toml");
        let config = ClusterStateConfig {
            root: "/storm-test".to_string(),
            ..ClusterStateConfig::default()
        };
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        assert_eq!(ClusterStateConfig::from_file(&path).unwrap(), config);
    }
}
