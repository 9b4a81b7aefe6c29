//! Bounded per-component error log.
//!
//! Each report becomes a sequential record under
//! `errors/<topology>/<component>`; once a component holds more than
//! `max_errors_per_component` records the oldest are dropped.

use std::fmt::Display;

use tracing::{debug, info};

use crate::codec::encode;
use crate::error::ClusterStateResult;
use crate::paths::ERROR_PREFIX;
use crate::state::StormClusterState;
use crate::types::ErrorInfo;

impl StormClusterState {
    /// Record an error raised by `component_id` on worker `node:port`.
    pub fn report_error(
        &self,
        storm_id: &str,
        component_id: &str,
        node: &str,
        port: u16,
        error: impl Display,
    ) -> ClusterStateResult<()> {
        let record = ErrorInfo {
            error: error.to_string(),
            error_time_secs: self.now_secs(),
            host: node.to_string(),
            port,
        };
        let prefix = self.paths().error_record_prefix(storm_id, component_id);
        let created = self.store().create_sequential(&prefix, &encode(&record)?)?;
        debug!(%storm_id, %component_id, path = %created, "error reported");

        self.trim_errors(storm_id, component_id)
    }

    /// Drop the oldest records beyond the configured cap.
    fn trim_errors(&self, storm_id: &str, component_id: &str) -> ClusterStateResult<()> {
        let dir = self.paths().error_component(storm_id, component_id);
        let mut records = error_record_names(self.list(&dir, None)?);
        let cap = self.config().max_errors_per_component;
        if records.len() <= cap {
            return Ok(());
        }

        records.sort();
        let excess = records.len() - cap;
        for name in &records[..excess] {
            self.store().delete(&storm_coord::path::join(&dir, name))?;
        }
        info!(%storm_id, %component_id, dropped = excess, "error log trimmed");
        Ok(())
    }

    /// Recorded errors of a component, newest first.
    pub fn errors(&self, storm_id: &str, component_id: &str) -> ClusterStateResult<Vec<ErrorInfo>> {
        let dir = self.paths().error_component(storm_id, component_id);
        let mut records: Vec<(String, ErrorInfo)> = self
            .read_children::<ErrorInfo>(&dir)?
            .into_iter()
            .filter(|(name, _)| name.starts_with(ERROR_PREFIX))
            .collect();
        // Equal timestamps fall back to creation order.
        records.sort_by(|(a_name, a), (b_name, b)| {
            (b.error_time_secs, b_name).cmp(&(a.error_time_secs, a_name))
        });
        Ok(records.into_iter().map(|(_, info)| info).collect())
    }

    /// The most recent error of a component, if any.
    pub fn last_error(
        &self,
        storm_id: &str,
        component_id: &str,
    ) -> ClusterStateResult<Option<ErrorInfo>> {
        Ok(self.errors(storm_id, component_id)?.into_iter().next())
    }

    /// Topologies with at least one recorded error.
    pub fn error_topologies(&self) -> ClusterStateResult<Vec<String>> {
        self.list_ids(&self.paths().errors(), None)
    }

    /// Components of a topology that have recorded errors.
    pub fn error_components(&self, storm_id: &str) -> ClusterStateResult<Vec<String>> {
        self.list_ids(&self.paths().error_storm(storm_id), None)
    }

    /// Drop the whole error log of a topology.
    pub fn teardown_topology_errors(&self, storm_id: &str) -> ClusterStateResult<()> {
        let removed = self.store().delete(&self.paths().error_storm(storm_id))?;
        debug!(%storm_id, removed, "topology errors torn down");
        Ok(())
    }
}

fn error_record_names(names: Vec<String>) -> Vec<String> {
    names
        .into_iter()
        .filter(|name| name.starts_with(ERROR_PREFIX))
        .collect()
}
