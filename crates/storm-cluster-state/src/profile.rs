//! Pending profiling and diagnostic requests for workers.
//!
//! One request per `(worker, action)`; a newer request for the same pair
//! replaces the old one. Workers poll their own requests and delete them
//! once acted on.

use tracing::debug;

use crate::error::ClusterStateResult;
use crate::state::StormClusterState;
use crate::types::{NodeInfo, ProfileRequest};

impl StormClusterState {
    pub fn set_worker_profile_request(
        &self,
        storm_id: &str,
        request: &ProfileRequest,
    ) -> ClusterStateResult<()> {
        self.write_record(&self.paths().profile_request(storm_id, request), request)?;
        debug!(
            %storm_id,
            worker = %request.node_info,
            action = request.action.as_str(),
            "profile request queued"
        );
        Ok(())
    }

    /// Every pending request of a topology.
    pub fn get_topology_profile_requests(
        &self,
        storm_id: &str,
    ) -> ClusterStateResult<Vec<ProfileRequest>> {
        Ok(self
            .read_children::<ProfileRequest>(&self.paths().profiler_root(storm_id))?
            .into_iter()
            .map(|(_, request)| request)
            .collect())
    }

    /// Pending requests addressed to one worker.
    pub fn get_worker_profile_requests(
        &self,
        storm_id: &str,
        worker: &NodeInfo,
    ) -> ClusterStateResult<Vec<ProfileRequest>> {
        Ok(self
            .get_topology_profile_requests(storm_id)?
            .into_iter()
            .filter(|request| &request.node_info == worker)
            .collect())
    }

    pub fn delete_topology_profile_requests(
        &self,
        storm_id: &str,
        request: &ProfileRequest,
    ) -> ClusterStateResult<()> {
        self.store().delete(&self.paths().profile_request(storm_id, request))?;
        debug!(
            %storm_id,
            worker = %request.node_info,
            action = request.action.as_str(),
            "profile request removed"
        );
        Ok(())
    }
}
