//! Topology & assignment registry.
//!
//! A topology is active exactly while its storm base exists. Assignments
//! are versioned so supervisors can detect a new placement by comparing
//! versions instead of payloads.

use storm_coord::{Version, Watch};
use tracing::{debug, info, warn};

use crate::codec::encode;
use crate::error::{ClusterStateError, ClusterStateResult};
use crate::state::StormClusterState;
use crate::types::{Assignment, LogConfig, StormBase, StormBaseUpdate, VersionedData};

impl StormClusterState {
    // ── Storm bases ────────────────────────────────────────────────

    /// Ids of all active topologies.
    pub fn active_storms(&self) -> ClusterStateResult<Vec<String>> {
        self.list_ids(&self.paths().storms(), None)
    }

    /// The storm base of a topology, or `None` if it is not active.
    pub fn storm_base(
        &self,
        storm_id: &str,
        watch: Option<&Watch>,
    ) -> ClusterStateResult<Option<StormBase>> {
        self.read_record(&self.paths().storm(storm_id), watch)
    }

    /// Mark a topology active by writing its storm base.
    pub fn activate_storm(&self, storm_id: &str, base: &StormBase) -> ClusterStateResult<()> {
        self.write_record(&self.paths().storm(storm_id), base)?;
        info!(%storm_id, name = %base.name, "topology activated");
        Ok(())
    }

    /// Merge `update` into the stored base.
    ///
    /// Uses compare-and-set so concurrent updates are not lost; a lost race
    /// re-reads and re-applies. Fails with `NotFound` if the topology is not
    /// active.
    pub fn update_storm(
        &self,
        storm_id: &str,
        update: &StormBaseUpdate,
    ) -> ClusterStateResult<StormBase> {
        let path = self.paths().storm(storm_id);
        loop {
            let Some(current) = self.read_versioned::<StormBase>(&path, None)? else {
                return Err(ClusterStateError::NotFound(format!("topology {storm_id}")));
            };
            let mut base = current.data;
            base.apply(update);
            match self
                .store()
                .write_if_version(&path, &encode(&base)?, current.version)
            {
                Ok(version) => {
                    debug!(%storm_id, version, "storm base updated");
                    return Ok(base);
                }
                Err(storm_coord::StoreError::BadVersion { .. }) => {
                    warn!(%storm_id, "storm base changed concurrently, retrying update");
                }
                Err(storm_coord::StoreError::NoNode(_)) => {
                    return Err(ClusterStateError::NotFound(format!("topology {storm_id}")));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn remove_storm_base(&self, storm_id: &str) -> ClusterStateResult<()> {
        self.store().delete(&self.paths().storm(storm_id))?;
        info!(%storm_id, "storm base removed");
        Ok(())
    }

    // ── Assignments ────────────────────────────────────────────────

    /// Ids of topologies that currently have an assignment.
    pub fn assignments(&self, watch: Option<&Watch>) -> ClusterStateResult<Vec<String>> {
        self.list_ids(&self.paths().assignments(), watch)
    }

    pub fn assignment_info(
        &self,
        storm_id: &str,
        watch: Option<&Watch>,
    ) -> ClusterStateResult<Option<Assignment>> {
        self.read_record(&self.paths().assignment(storm_id), watch)
    }

    pub fn assignment_info_with_version(
        &self,
        storm_id: &str,
        watch: Option<&Watch>,
    ) -> ClusterStateResult<Option<VersionedData<Assignment>>> {
        self.read_versioned(&self.paths().assignment(storm_id), watch)
    }

    /// Current assignment version without transferring the assignment.
    ///
    /// `Ok(None)` means the assignment was removed; an unreachable store is
    /// reported as `StoreUnavailable`, never as `None`.
    pub fn assignment_version(
        &self,
        storm_id: &str,
        watch: Option<&Watch>,
    ) -> ClusterStateResult<Option<Version>> {
        Ok(self.store().stat(&self.paths().assignment(storm_id), watch)?)
    }

    /// Atomically replace a topology's assignment. Returns its new version.
    pub fn set_assignment(
        &self,
        storm_id: &str,
        assignment: &Assignment,
    ) -> ClusterStateResult<Version> {
        let version = self.write_record(&self.paths().assignment(storm_id), assignment)?;
        info!(%storm_id, version, slots = assignment.slots().len(), "assignment set");
        Ok(version)
    }

    // ── Log config ─────────────────────────────────────────────────

    pub fn set_topology_log_config(
        &self,
        storm_id: &str,
        log_config: &LogConfig,
    ) -> ClusterStateResult<()> {
        self.write_record(&self.paths().log_config(storm_id), log_config)?;
        debug!(%storm_id, loggers = log_config.named_logger_level.len(), "log config set");
        Ok(())
    }

    pub fn topology_log_config(
        &self,
        storm_id: &str,
        watch: Option<&Watch>,
    ) -> ClusterStateResult<Option<LogConfig>> {
        self.read_record(&self.paths().log_config(storm_id), watch)
    }

    // ── Removal ────────────────────────────────────────────────────

    /// Remove everything keyed by a finished topology except heartbeats,
    /// backpressure markers, and errors, which have their own teardown.
    ///
    /// The storm base goes last, so the topology stays visible as active
    /// until the rest of its state is gone.
    pub fn remove_storm(&self, storm_id: &str) -> ClusterStateResult<()> {
        let paths = self.paths();
        self.store().delete(&paths.assignment(storm_id))?;
        self.store().delete(&paths.credentials(storm_id))?;
        self.store().delete(&paths.log_config(storm_id))?;
        self.store().delete(&paths.profiler_root(storm_id))?;
        self.remove_all_private_worker_keys(storm_id)?;
        self.remove_storm_base(storm_id)?;
        info!(%storm_id, "topology state removed");
        Ok(())
    }
}
