//! Derived aggregates over the registry and heartbeat primitives.
//!
//! Nothing here touches the store directly. Each view enumerates ids and
//! then fetches records one by one, so a record removed in between is
//! left out instead of failing the whole call.

use std::collections::BTreeMap;

use storm_coord::Watch;
use tracing::debug;

use crate::error::ClusterStateResult;
use crate::state::StormClusterState;
use crate::types::{Assignment, StormBase, SupervisorInfo};

impl StormClusterState {
    /// Storm base of every active topology, keyed by topology id.
    pub fn topology_bases(&self) -> ClusterStateResult<BTreeMap<String, StormBase>> {
        let mut bases = BTreeMap::new();
        for storm_id in self.active_storms()? {
            match self.storm_base(&storm_id, None)? {
                Some(base) => {
                    bases.insert(storm_id, base);
                }
                None => debug!(%storm_id, "topology deactivated while listing"),
            }
        }
        Ok(bases)
    }

    /// Assignment of every assigned topology, keyed by topology id.
    pub fn topology_assignments(&self) -> ClusterStateResult<BTreeMap<String, Assignment>> {
        let mut assignments = BTreeMap::new();
        for storm_id in self.assignments(None)? {
            if let Some(assignment) = self.assignment_info(&storm_id, None)? {
                assignments.insert(storm_id, assignment);
            }
        }
        Ok(assignments)
    }

    /// Id of the active topology named `name`.
    pub fn get_topo_id(&self, name: &str) -> ClusterStateResult<Option<String>> {
        for storm_id in self.active_storms()? {
            match self.storm_base(&storm_id, None)? {
                Some(base) if base.name == name => return Ok(Some(storm_id)),
                _ => {}
            }
        }
        Ok(None)
    }

    /// Latest report of every registered supervisor, keyed by supervisor id.
    /// `watch` fires when supervisors join or leave.
    pub fn all_supervisor_info(
        &self,
        watch: Option<&Watch>,
    ) -> ClusterStateResult<BTreeMap<String, SupervisorInfo>> {
        let mut infos = BTreeMap::new();
        for supervisor_id in self.supervisors(watch)? {
            if let Some(info) = self.supervisor_info(&supervisor_id)? {
                infos.insert(supervisor_id, info);
            }
        }
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::types::TopologyStatus;

    fn base(name: &str) -> StormBase {
        StormBase {
            name: name.to_string(),
            status: TopologyStatus::Active,
            num_workers: 1,
            component_executors: BTreeMap::new(),
            launch_time_secs: 0,
            owner: "bob".to_string(),
            prev_status: None,
            component_debug: BTreeMap::new(),
            principal: None,
            topology_version: None,
        }
    }

    fn supervisor(hostname: &str) -> SupervisorInfo {
        SupervisorInfo {
            time_secs: 1,
            hostname: hostname.to_string(),
            assignment_id: None,
            used_ports: vec![],
            meta: vec![6700, 6701],
            scheduler_meta: BTreeMap::new(),
            uptime_secs: 1,
            version: "2.6.0".to_string(),
            resources: BTreeMap::new(),
        }
    }

    #[test]
    fn bases_and_topo_id_track_active_set() {
        let state = StormClusterState::open_in_memory().unwrap();
        state.activate_storm("wc-1-100", &base("wordcount")).unwrap();
        state.activate_storm("rt-2-200", &base("rolling")).unwrap();

        let bases = state.topology_bases().unwrap();
        assert_eq!(bases.len(), 2);
        assert_eq!(bases["wc-1-100"].name, "wordcount");
        assert_eq!(
            state.get_topo_id("wordcount").unwrap().as_deref(),
            Some("wc-1-100")
        );

        state.remove_storm_base("wc-1-100").unwrap();
        assert_eq!(state.get_topo_id("wordcount").unwrap(), None);
        assert_eq!(state.topology_bases().unwrap().len(), 1);
    }

    #[test]
    fn empty_cluster_has_empty_views() {
        let state = StormClusterState::open_in_memory().unwrap();
        assert!(state.topology_bases().unwrap().is_empty());
        assert!(state.topology_assignments().unwrap().is_empty());
        assert!(state.all_supervisor_info(None).unwrap().is_empty());
        assert_eq!(state.get_topo_id("anything").unwrap(), None);
    }

    #[test]
    fn supervisor_ids_with_slashes() {
        let state = StormClusterState::open_in_memory().unwrap();
        state.supervisor_heartbeat("sup-1", &supervisor("host-1")).unwrap();
        state
            .supervisor_heartbeat("rack-a/sup-2", &supervisor("host-2"))
            .unwrap();

        let infos = state.all_supervisor_info(None).unwrap();
        assert_eq!(infos.keys().collect::<Vec<_>>(), vec!["rack-a/sup-2", "sup-1"]);
        state.remove_supervisor("rack-a/sup-2").unwrap();
        assert_eq!(state.supervisors(None).unwrap(), vec!["sup-1"]);
    }

    #[test]
    fn supervisor_view_and_watch() {
        let state = StormClusterState::open_in_memory().unwrap();
        state.supervisor_heartbeat("sup-1", &supervisor("host-1")).unwrap();

        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        let watch = Watch::new(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });
        let infos = state.all_supervisor_info(Some(&watch)).unwrap();
        assert_eq!(infos["sup-1"].hostname, "host-1");

        state.supervisor_heartbeat("sup-2", &supervisor("host-2")).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(state.all_supervisor_info(None).unwrap().len(), 2);
    }
}
