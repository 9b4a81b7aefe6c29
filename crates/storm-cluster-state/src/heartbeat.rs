//! Heartbeat & liveness tracker.
//!
//! Workers and supervisors write heartbeats; the orchestrator reads them
//! back and turns timestamps into alive/dead decisions. A peer that
//! crashes is never torn down actively: its heartbeat simply ages out.
//! Backpressure markers follow the same rule, checked against a timeout
//! on every call.

use std::collections::BTreeMap;

use storm_coord::Watch;
use tracing::{debug, info};

use crate::error::ClusterStateResult;
use crate::state::StormClusterState;
use crate::types::{
    ClusterWorkerHeartbeat, ExecutorBeat, ExecutorInfo, NimbusSummary, NodeInfo, SupervisorInfo,
};

impl StormClusterState {
    // ── Worker heartbeats ──────────────────────────────────────────

    /// Create the heartbeat root of a topology before its workers start.
    pub fn setup_heartbeats(&self, storm_id: &str) -> ClusterStateResult<()> {
        self.store().mkdirs(&self.paths().workerbeat_root(storm_id))?;
        debug!(%storm_id, "heartbeat root created");
        Ok(())
    }

    /// Delete every worker heartbeat of a topology and its root.
    /// Safe to call when the root is already gone.
    pub fn teardown_heartbeats(&self, storm_id: &str) -> ClusterStateResult<()> {
        let removed = self.store().delete(&self.paths().workerbeat_root(storm_id))?;
        info!(%storm_id, removed, "heartbeats torn down");
        Ok(())
    }

    /// Topologies that have a heartbeat root.
    pub fn heartbeat_storms(&self) -> ClusterStateResult<Vec<String>> {
        self.list_ids(&self.paths().workerbeats(), None)
    }

    pub fn worker_heartbeat(
        &self,
        storm_id: &str,
        node: &str,
        port: u16,
        heartbeat: &ClusterWorkerHeartbeat,
    ) -> ClusterStateResult<()> {
        self.write_record(&self.paths().workerbeat(storm_id, node, port), heartbeat)?;
        Ok(())
    }

    pub fn get_worker_heartbeat(
        &self,
        storm_id: &str,
        node: &str,
        port: u16,
    ) -> ClusterStateResult<Option<ClusterWorkerHeartbeat>> {
        self.read_record(&self.paths().workerbeat(storm_id, node, port), None)
    }

    pub fn remove_worker_heartbeat(
        &self,
        storm_id: &str,
        node: &str,
        port: u16,
    ) -> ClusterStateResult<()> {
        self.store().delete(&self.paths().workerbeat(storm_id, node, port))?;
        Ok(())
    }

    /// Per-executor beats for the executors in `executor_node_port`.
    ///
    /// Each distinct worker slot is read once. Executors whose worker has
    /// no heartbeat are left out, which callers treat as dead.
    pub fn executor_beats(
        &self,
        storm_id: &str,
        executor_node_port: &BTreeMap<ExecutorInfo, NodeInfo>,
    ) -> ClusterStateResult<BTreeMap<ExecutorInfo, ExecutorBeat>> {
        let mut by_slot: BTreeMap<&NodeInfo, Vec<ExecutorInfo>> = BTreeMap::new();
        for (executor, slot) in executor_node_port {
            by_slot.entry(slot).or_default().push(*executor);
        }

        let mut beats = BTreeMap::new();
        for (slot, executors) in by_slot {
            let Some(heartbeat) = self.get_worker_heartbeat(storm_id, &slot.node, slot.port)?
            else {
                debug!(%storm_id, %slot, "no heartbeat for worker");
                continue;
            };
            for executor in executors {
                beats.insert(
                    executor,
                    ExecutorBeat {
                        time_secs: heartbeat.time_secs,
                        uptime_secs: heartbeat.uptime_secs,
                        stats: heartbeat.executor_stats.get(&executor).copied(),
                    },
                );
            }
        }
        Ok(beats)
    }

    // ── Supervisors & nimbuses ─────────────────────────────────────

    pub fn supervisor_heartbeat(
        &self,
        supervisor_id: &str,
        info: &SupervisorInfo,
    ) -> ClusterStateResult<()> {
        self.write_record(&self.paths().supervisor(supervisor_id), info)?;
        debug!(%supervisor_id, hostname = %info.hostname, "supervisor heartbeat");
        Ok(())
    }

    pub fn supervisors(&self, watch: Option<&Watch>) -> ClusterStateResult<Vec<String>> {
        self.list_ids(&self.paths().supervisors(), watch)
    }

    pub fn supervisor_info(
        &self,
        supervisor_id: &str,
    ) -> ClusterStateResult<Option<SupervisorInfo>> {
        self.read_record(&self.paths().supervisor(supervisor_id), None)
    }

    /// Decommission a supervisor.
    pub fn remove_supervisor(&self, supervisor_id: &str) -> ClusterStateResult<()> {
        self.store().delete(&self.paths().supervisor(supervisor_id))?;
        info!(%supervisor_id, "supervisor removed");
        Ok(())
    }

    pub fn add_nimbus_host(
        &self,
        nimbus_id: &str,
        summary: &NimbusSummary,
    ) -> ClusterStateResult<()> {
        self.write_record(&self.paths().nimbus(nimbus_id), summary)?;
        info!(%nimbus_id, leader = summary.is_leader, "nimbus registered");
        Ok(())
    }

    pub fn nimbuses(&self) -> ClusterStateResult<Vec<NimbusSummary>> {
        Ok(self
            .read_children(&self.paths().nimbuses())?
            .into_iter()
            .map(|(_, summary)| summary)
            .collect())
    }

    // ── Backpressure ───────────────────────────────────────────────

    pub fn setup_backpressure(&self, storm_id: &str) -> ClusterStateResult<()> {
        self.store().mkdirs(&self.paths().backpressure_root(storm_id))?;
        Ok(())
    }

    /// Delete all backpressure markers of a topology and their root.
    pub fn remove_backpressure(&self, storm_id: &str) -> ClusterStateResult<()> {
        self.store().delete(&self.paths().backpressure_root(storm_id))?;
        Ok(())
    }

    /// Record that a worker is backpressured as of `timestamp_millis`.
    /// A zero timestamp clears the marker.
    pub fn worker_backpressure(
        &self,
        storm_id: &str,
        node: &str,
        port: u16,
        timestamp_millis: u64,
    ) -> ClusterStateResult<()> {
        if timestamp_millis == 0 {
            return self.remove_worker_backpressure(storm_id, node, port);
        }
        self.write_record(
            &self.paths().worker_backpressure(storm_id, node, port),
            &timestamp_millis,
        )?;
        debug!(%storm_id, %node, port, timestamp_millis, "worker backpressure set");
        Ok(())
    }

    pub fn remove_worker_backpressure(
        &self,
        storm_id: &str,
        node: &str,
        port: u16,
    ) -> ClusterStateResult<()> {
        self.store().delete(&self.paths().worker_backpressure(storm_id, node, port))?;
        Ok(())
    }

    /// Topologies that have a backpressure root.
    pub fn backpressure_topologies(&self) -> ClusterStateResult<Vec<String>> {
        self.list_ids(&self.paths().backpressure(), None)
    }

    /// Whether any worker of the topology reported backpressure within the
    /// last `timeout_ms`. Always reads fresh markers.
    pub fn topology_backpressure(
        &self,
        storm_id: &str,
        timeout_ms: u64,
        watch: Option<&Watch>,
    ) -> ClusterStateResult<bool> {
        let root = self.paths().backpressure_root(storm_id);
        let workers = self.list(&root, watch)?;
        let cutoff = self.now_millis().saturating_sub(timeout_ms);

        for worker in workers {
            let path = storm_coord::path::join(&root, &worker);
            if let Some(timestamp) = self.read_record::<u64>(&path, None)? {
                if timestamp > cutoff {
                    debug!(%storm_id, %worker, timestamp, "topology under backpressure");
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}
