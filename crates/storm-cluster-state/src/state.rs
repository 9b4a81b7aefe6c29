//! StormClusterState — the handle control-plane daemons and workers embed.
//!
//! Operations are grouped by concern in sibling modules (`topology`,
//! `heartbeat`, `vault`, ...), each adding an `impl StormClusterState`
//! block. This module owns construction and the typed read/write helpers
//! they share.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use storm_coord::{CoordinationStore, RedbStore, Version, Watch};
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::codec::{decode, encode};
use crate::config::ClusterStateConfig;
use crate::error::ClusterStateResult;
use crate::paths::{ClusterPaths, decode_segment};
use crate::types::VersionedData;

/// Cluster state coordinator over a [`CoordinationStore`].
///
/// Cheap to clone; clones share the same store connection. Nothing is
/// cached between calls.
#[derive(Clone)]
pub struct StormClusterState {
    store: Arc<dyn CoordinationStore>,
    paths: ClusterPaths,
    config: ClusterStateConfig,
    clock: Arc<dyn Clock>,
}

impl StormClusterState {
    /// Wrap an existing store connection.
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        config: ClusterStateConfig,
    ) -> ClusterStateResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            paths: ClusterPaths::new(config.root.clone()),
            config,
            clock: Arc::new(SystemClock),
        })
    }

    /// Open the embedded store described by `config.store`.
    pub fn open(config: &ClusterStateConfig) -> ClusterStateResult<Self> {
        config.validate()?;
        let store = match &config.store.data_path {
            Some(path) => RedbStore::open(path)?,
            None => RedbStore::open_in_memory()?,
        };
        info!(root = %config.root, path = ?config.store.data_path, "cluster state opened");
        Self::new(Arc::new(store), config.clone())
    }

    /// Default configuration over a fresh in-memory store.
    pub fn open_in_memory() -> ClusterStateResult<Self> {
        Self::open(&ClusterStateConfig::default())
    }

    /// Replace the wall clock used for liveness windows and key expiry.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &ClusterStateConfig {
        &self.config
    }

    pub fn paths(&self) -> &ClusterPaths {
        &self.paths
    }

    /// Close the store connection. Every later call fails with
    /// `StoreUnavailable`, on this handle and all of its clones.
    pub fn disconnect(&self) {
        self.store.close();
        info!("cluster state disconnected");
    }

    /// Stop delivering `watch` for every path it is still armed on.
    pub fn release_watch(&self, watch: &Watch) {
        let dropped = self.store.disarm(watch);
        debug!(watch = watch.id(), dropped, "watch released");
    }

    // ── Shared helpers ─────────────────────────────────────────────

    pub(crate) fn store(&self) -> &dyn CoordinationStore {
        self.store.as_ref()
    }

    pub(crate) fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    pub(crate) fn now_secs(&self) -> u64 {
        self.clock.now_secs()
    }

    pub(crate) fn read_record<T: DeserializeOwned>(
        &self,
        path: &str,
        watch: Option<&Watch>,
    ) -> ClusterStateResult<Option<T>> {
        Ok(self
            .read_versioned(path, watch)?
            .map(|versioned| versioned.data))
    }

    pub(crate) fn read_versioned<T: DeserializeOwned>(
        &self,
        path: &str,
        watch: Option<&Watch>,
    ) -> ClusterStateResult<Option<VersionedData<T>>> {
        match self.store.read(path, watch)? {
            Some(node) => {
                let data = decode(path, &node.data)?;
                Ok(Some(VersionedData::new(data, node.version)))
            }
            None => Ok(None),
        }
    }

    pub(crate) fn write_record<T: Serialize>(
        &self,
        path: &str,
        value: &T,
    ) -> ClusterStateResult<Version> {
        let bytes = encode(value)?;
        Ok(self.store.write(path, &bytes)?)
    }

    pub(crate) fn list(
        &self,
        path: &str,
        watch: Option<&Watch>,
    ) -> ClusterStateResult<Vec<String>> {
        Ok(self.store.children(path, watch)?)
    }

    /// Child names of `path` with segment escaping undone.
    pub(crate) fn list_ids(
        &self,
        path: &str,
        watch: Option<&Watch>,
    ) -> ClusterStateResult<Vec<String>> {
        Ok(self
            .list(path, watch)?
            .iter()
            .map(|encoded| decode_segment(encoded))
            .collect())
    }

    /// Read every child record of `parent`. Children deleted between the
    /// listing and the read are skipped.
    pub(crate) fn read_children<T: DeserializeOwned>(
        &self,
        parent: &str,
    ) -> ClusterStateResult<Vec<(String, T)>> {
        let mut records = Vec::new();
        for name in self.list(parent, None)? {
            let path = storm_coord::path::join(parent, &name);
            match self.read_record(&path, None)? {
                Some(record) => records.push((name, record)),
                None => debug!(%path, "child vanished between list and read"),
            }
        }
        Ok(records)
    }
}

impl fmt::Debug for StormClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StormClusterState")
            .field("root", &self.paths.root())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
