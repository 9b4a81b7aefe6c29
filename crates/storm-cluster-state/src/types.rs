//! Domain types for Storm cluster state.
//!
//! These types represent the records kept in the coordination store:
//! topology bases, assignments, heartbeats, supervisor and nimbus
//! summaries, credentials, worker keys, errors, and profile requests.
//! All of them are serialized to JSON for storage.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::codec::pairs;

/// Unique identifier for a running topology.
pub type TopologyId = String;

/// A payload together with the store version it was read at.
pub type VersionedData<T> = storm_coord::Versioned<T>;

// ── Placement ──────────────────────────────────────────────────────

/// Contiguous range of task ids run by one executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExecutorInfo {
    pub task_start: i32,
    pub task_end: i32,
}

impl ExecutorInfo {
    pub fn new(task_start: i32, task_end: i32) -> Self {
        Self {
            task_start,
            task_end,
        }
    }
}

/// A worker slot: supervisor node id plus port.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node: String,
    pub port: u16,
}

impl NodeInfo {
    pub fn new(node: impl Into<String>, port: u16) -> Self {
        Self {
            node: node.into(),
            port,
        }
    }
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.node, self.port)
    }
}

// ── Topology ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyStatus {
    Active,
    Inactive,
    Rebalancing,
    Killed,
}

/// Per-component event-logger sampling switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugOptions {
    pub enable: bool,
    pub sampling_pct: f64,
}

/// Metadata of an active topology. Its existence defines "active".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StormBase {
    pub name: String,
    pub status: TopologyStatus,
    pub num_workers: u32,
    pub component_executors: BTreeMap<String, u32>,
    /// Unix timestamp (seconds) when the topology was launched.
    pub launch_time_secs: u64,
    pub owner: String,
    pub prev_status: Option<TopologyStatus>,
    #[serde(default)]
    pub component_debug: BTreeMap<String, DebugOptions>,
    pub principal: Option<String>,
    pub topology_version: Option<String>,
}

/// Partial update merged into an existing [`StormBase`].
///
/// Scalar fields replace the stored value when set; map fields are merged
/// key by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StormBaseUpdate {
    pub status: Option<TopologyStatus>,
    pub prev_status: Option<TopologyStatus>,
    pub num_workers: Option<u32>,
    pub owner: Option<String>,
    pub topology_version: Option<String>,
    pub component_executors: BTreeMap<String, u32>,
    pub component_debug: BTreeMap<String, DebugOptions>,
}

impl StormBase {
    pub fn apply(&mut self, update: &StormBaseUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(prev) = update.prev_status {
            self.prev_status = Some(prev);
        }
        if let Some(n) = update.num_workers {
            self.num_workers = n;
        }
        if let Some(owner) = &update.owner {
            self.owner = owner.clone();
        }
        if let Some(version) = &update.topology_version {
            self.topology_version = Some(version.clone());
        }
        self.component_executors.extend(
            update
                .component_executors
                .iter()
                .map(|(k, v)| (k.clone(), *v)),
        );
        self.component_debug.extend(
            update
                .component_debug
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
    }
}

// ── Assignment ─────────────────────────────────────────────────────

/// Placement of a topology's executors onto worker slots.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Assignment {
    pub master_code_dir: String,
    /// Supervisor node id → hostname.
    pub node_host: BTreeMap<String, String>,
    #[serde(with = "pairs")]
    pub executor_node_port: BTreeMap<ExecutorInfo, NodeInfo>,
    /// Start time per executor; orders restarts relative to the assignment.
    #[serde(with = "pairs")]
    pub executor_start_time_secs: BTreeMap<ExecutorInfo, u64>,
    pub owner: Option<String>,
}

impl Assignment {
    /// Distinct worker slots used by this assignment.
    pub fn slots(&self) -> BTreeSet<NodeInfo> {
        self.executor_node_port.values().cloned().collect()
    }

    /// Executors placed on `slot`.
    pub fn executors_on(&self, slot: &NodeInfo) -> Vec<ExecutorInfo> {
        self.executor_node_port
            .iter()
            .filter(|(_, placed)| *placed == slot)
            .map(|(executor, _)| *executor)
            .collect()
    }
}

// ── Heartbeats ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecutorStats {
    pub emitted: u64,
    pub transferred: u64,
    pub acked: u64,
    pub failed: u64,
}

/// Liveness report written by a worker process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterWorkerHeartbeat {
    pub storm_id: TopologyId,
    #[serde(with = "pairs")]
    pub executor_stats: BTreeMap<ExecutorInfo, ExecutorStats>,
    /// Unix timestamp (seconds) of the beat.
    pub time_secs: u64,
    pub uptime_secs: u64,
}

/// Heartbeat of one executor, derived from its worker's heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorBeat {
    pub time_secs: u64,
    pub uptime_secs: u64,
    pub stats: Option<ExecutorStats>,
}

impl ExecutorBeat {
    /// Alive while the beat is no older than `timeout_secs`.
    pub fn is_alive(&self, now_secs: u64, timeout_secs: u64) -> bool {
        now_secs.saturating_sub(self.time_secs) <= timeout_secs
    }
}

/// Liveness and capacity report written by a supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorInfo {
    pub time_secs: u64,
    pub hostname: String,
    pub assignment_id: Option<String>,
    pub used_ports: Vec<u16>,
    /// Ports this supervisor offers.
    pub meta: Vec<u16>,
    #[serde(default)]
    pub scheduler_meta: BTreeMap<String, String>,
    pub uptime_secs: u64,
    pub version: String,
    #[serde(default)]
    pub resources: BTreeMap<String, f64>,
}

// ── Nimbus & blobstore ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NimbusSummary {
    pub host: String,
    pub port: u16,
    pub uptime_secs: u64,
    pub is_leader: bool,
    pub version: String,
}

/// Identity of a nimbus host holding blobs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NimbusInfo {
    pub host: String,
    pub port: u16,
    pub is_leader: bool,
}

impl NimbusInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            is_leader: false,
        }
    }

    /// `host:port`, the name this nimbus is registered under.
    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One nimbus's copy of a blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobReplica {
    /// `host:port` of the nimbus holding the copy.
    pub nimbus: String,
    pub version: u64,
}

// ── Security ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub creds: BTreeMap<String, String>,
}

/// Service a worker token is issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerTokenServiceType {
    Nimbus,
    Drpc,
    Supervisor,
}

impl WorkerTokenServiceType {
    pub const ALL: [WorkerTokenServiceType; 3] = [Self::Nimbus, Self::Drpc, Self::Supervisor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nimbus => "nimbus",
            Self::Drpc => "drpc",
            Self::Supervisor => "supervisor",
        }
    }
}

impl fmt::Display for WorkerTokenServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerTokenServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown worker token service type: {s}"))
    }
}

/// Secret used to validate worker tokens of one key version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateWorkerKey {
    pub key: Vec<u8>,
    pub user_name: String,
    pub created_at_millis: u64,
    pub expiration_time_millis: u64,
}

impl PrivateWorkerKey {
    pub fn is_expired(&self, now_millis: u64) -> bool {
        self.expiration_time_millis < now_millis
    }
}

// ── Diagnostics ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub error: String,
    pub error_time_secs: u64,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileAction {
    ProfileStart,
    ProfileStop,
    ProfileDump,
    HeapDump,
    ThreadDump,
    WorkerRestart,
    Debug,
}

impl ProfileAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProfileStart => "profile_start",
            Self::ProfileStop => "profile_stop",
            Self::ProfileDump => "profile_dump",
            Self::HeapDump => "heap_dump",
            Self::ThreadDump => "thread_dump",
            Self::WorkerRestart => "worker_restart",
            Self::Debug => "debug",
        }
    }
}

/// A diagnostic action queued for a worker to pick up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRequest {
    pub node_info: NodeInfo,
    pub action: ProfileAction,
    pub timestamp_millis: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevelAction {
    Unchanged,
    Update,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLevel {
    pub action: LogLevelAction,
    pub target_log_level: String,
    pub reset_log_level: Option<String>,
    pub reset_log_level_timeout_epoch_millis: Option<u64>,
}

/// Dynamic logger levels for a topology, keyed by logger name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LogConfig {
    pub named_logger_level: BTreeMap<String, LogLevel>,
}
