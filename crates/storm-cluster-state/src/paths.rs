//! Layout of cluster state inside the coordination tree.
//!
//! ```text
//! <root>/assignments/<topology>
//! <root>/storms/<topology>
//! <root>/supervisors/<supervisor>
//! <root>/nimbuses/<nimbus>
//! <root>/workerbeats/<topology>/<node>-<port>
//! <root>/backpressure/<topology>/<node>-<port>
//! <root>/errors/<topology>/<component>/e<seq>
//! <root>/blobstore/<key>/<host:port>
//! <root>/secretkeys/<service>/<topology>/<version>
//! <root>/credentials/<topology>
//! <root>/logconfigs/<topology>
//! <root>/profilerconfig/<topology>/<host>_<port>_<action>
//! ```

use storm_coord::path::join;

use crate::types::{NodeInfo, ProfileRequest, WorkerTokenServiceType};

pub const ASSIGNMENTS: &str = "assignments";
pub const STORMS: &str = "storms";
pub const SUPERVISORS: &str = "supervisors";
pub const NIMBUSES: &str = "nimbuses";
pub const WORKERBEATS: &str = "workerbeats";
pub const BACKPRESSURE: &str = "backpressure";
pub const ERRORS: &str = "errors";
pub const BLOBSTORE: &str = "blobstore";
pub const SECRET_KEYS: &str = "secretkeys";
pub const CREDENTIALS: &str = "credentials";
pub const LOGCONFIG: &str = "logconfigs";
pub const PROFILERCONFIG: &str = "profilerconfig";

/// Prefix of sequential error record names.
pub const ERROR_PREFIX: &str = "e";

/// Escape a free-form name so it is a single path segment.
pub fn encode_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            c => out.push(c),
        }
    }
    out
}

/// Reverse of [`encode_segment`]. Unknown escapes are kept verbatim.
pub fn decode_segment(encoded: &str) -> String {
    encoded.replace("%2F", "/").replace("%25", "%")
}

/// Builds absolute store paths under a configured root.
///
/// Every caller-supplied id is escaped with [`encode_segment`], so ids
/// containing `/` still occupy exactly one segment. Listings hand names
/// back through [`decode_segment`].
#[derive(Debug, Clone)]
pub struct ClusterPaths {
    root: String,
}

impl ClusterPaths {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    fn subtree(&self, name: &str) -> String {
        join(&self.root, name)
    }

    pub fn assignments(&self) -> String {
        self.subtree(ASSIGNMENTS)
    }

    pub fn assignment(&self, storm_id: &str) -> String {
        join(&self.assignments(), &encode_segment(storm_id))
    }

    pub fn storms(&self) -> String {
        self.subtree(STORMS)
    }

    pub fn storm(&self, storm_id: &str) -> String {
        join(&self.storms(), &encode_segment(storm_id))
    }

    pub fn supervisors(&self) -> String {
        self.subtree(SUPERVISORS)
    }

    pub fn supervisor(&self, supervisor_id: &str) -> String {
        join(&self.supervisors(), &encode_segment(supervisor_id))
    }

    pub fn nimbuses(&self) -> String {
        self.subtree(NIMBUSES)
    }

    pub fn nimbus(&self, nimbus_id: &str) -> String {
        join(&self.nimbuses(), &encode_segment(nimbus_id))
    }

    pub fn workerbeats(&self) -> String {
        self.subtree(WORKERBEATS)
    }

    pub fn workerbeat_root(&self, storm_id: &str) -> String {
        join(&self.workerbeats(), &encode_segment(storm_id))
    }

    pub fn workerbeat(&self, storm_id: &str, node: &str, port: u16) -> String {
        join(&self.workerbeat_root(storm_id), &slot_segment(node, port))
    }

    pub fn backpressure(&self) -> String {
        self.subtree(BACKPRESSURE)
    }

    pub fn backpressure_root(&self, storm_id: &str) -> String {
        join(&self.backpressure(), &encode_segment(storm_id))
    }

    pub fn worker_backpressure(&self, storm_id: &str, node: &str, port: u16) -> String {
        join(&self.backpressure_root(storm_id), &slot_segment(node, port))
    }

    pub fn errors(&self) -> String {
        self.subtree(ERRORS)
    }

    pub fn error_storm(&self, storm_id: &str) -> String {
        join(&self.errors(), &encode_segment(storm_id))
    }

    pub fn error_component(&self, storm_id: &str, component_id: &str) -> String {
        join(&self.error_storm(storm_id), &encode_segment(component_id))
    }

    /// Prefix handed to sequential creation for new error records.
    pub fn error_record_prefix(&self, storm_id: &str, component_id: &str) -> String {
        join(&self.error_component(storm_id, component_id), ERROR_PREFIX)
    }

    pub fn blobstore(&self) -> String {
        self.subtree(BLOBSTORE)
    }

    pub fn blobstore_key(&self, key: &str) -> String {
        join(&self.blobstore(), &encode_segment(key))
    }

    pub fn blobstore_replica(&self, key: &str, nimbus_host_port: &str) -> String {
        join(&self.blobstore_key(key), &encode_segment(nimbus_host_port))
    }

    pub fn secret_keys(&self, service: WorkerTokenServiceType) -> String {
        join(&self.subtree(SECRET_KEYS), service.as_str())
    }

    pub fn secret_keys_storm(&self, service: WorkerTokenServiceType, storm_id: &str) -> String {
        join(&self.secret_keys(service), &encode_segment(storm_id))
    }

    pub fn secret_key(
        &self,
        service: WorkerTokenServiceType,
        storm_id: &str,
        version: u64,
    ) -> String {
        join(&self.secret_keys_storm(service, storm_id), &version.to_string())
    }

    pub fn credentials(&self, storm_id: &str) -> String {
        join(&self.subtree(CREDENTIALS), &encode_segment(storm_id))
    }

    pub fn log_config(&self, storm_id: &str) -> String {
        join(&self.subtree(LOGCONFIG), &encode_segment(storm_id))
    }

    pub fn profiler_root(&self, storm_id: &str) -> String {
        join(&self.subtree(PROFILERCONFIG), &encode_segment(storm_id))
    }

    pub fn profile_request(&self, storm_id: &str, request: &ProfileRequest) -> String {
        let NodeInfo { node, port } = &request.node_info;
        join(
            &self.profiler_root(storm_id),
            &format!(
                "{}_{}_{}",
                encode_segment(node),
                port,
                request.action.as_str()
            ),
        )
    }
}

fn slot_segment(node: &str, port: u16) -> String {
    format!("{}-{port}", encode_segment(node))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProfileAction;

    #[test]
    fn layout_under_root() {
        let paths = ClusterPaths::new("/storm");
        assert_eq!(paths.assignment("t1"), "/storm/assignments/t1");
        assert_eq!(
            paths.workerbeat("t1", "sup-1", 6700),
            "/storm/workerbeats/t1/sup-1-6700"
        );
        assert_eq!(
            paths.secret_key(WorkerTokenServiceType::Drpc, "t1", 3),
            "/storm/secretkeys/drpc/t1/3"
        );
        assert_eq!(
            paths.blobstore_replica("jar", "nimbus-a:6627"),
            "/storm/blobstore/jar/nimbus-a:6627"
        );
    }

    #[test]
    fn free_form_names_stay_one_segment() {
        let paths = ClusterPaths::new("/storm");
        assert_eq!(
            paths.error_component("t1", "split/sentence"),
            "/storm/errors/t1/split%2Fsentence"
        );
        assert_eq!(decode_segment(&encode_segment("a/b%2Fc")), "a/b%2Fc");
    }

    #[test]
    fn ids_with_slashes_stay_one_segment() {
        let paths = ClusterPaths::new("/storm");
        assert_eq!(paths.storm("team/wc-1"), "/storm/storms/team%2Fwc-1");
        assert_eq!(paths.supervisor("rack/sup-1"), "/storm/supervisors/rack%2Fsup-1");
        assert_eq!(
            paths.secret_key(WorkerTokenServiceType::Nimbus, "a/b", 0),
            "/storm/secretkeys/nimbus/a%2Fb/0"
        );
    }

    #[test]
    fn profile_request_path_includes_action() {
        let paths = ClusterPaths::new("/storm");
        let request = ProfileRequest {
            node_info: NodeInfo::new("host-1", 6701),
            action: ProfileAction::HeapDump,
            timestamp_millis: 0,
        };
        assert_eq!(
            paths.profile_request("t1", &request),
            "/storm/profilerconfig/t1/host-1_6701_heap_dump"
        );
    }
}
