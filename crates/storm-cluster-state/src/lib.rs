//! storm-cluster-state — cluster state coordinator for Storm.
//!
//! Tracks which topologies are active, where their executors are
//! assigned, whether their workers and supervisors are alive, which
//! blobs each nimbus holds, and which credentials and worker-token keys
//! are valid. All state lives in a [`CoordinationStore`]; this crate
//! holds no authoritative copies and every read is a fresh fetch.
//!
//! # Architecture
//!
//! - **`state`** — [`StormClusterState`], the handle every daemon embeds
//! - **`topology`** — storm bases, versioned assignments, log configs
//! - **`heartbeat`** — worker/supervisor heartbeats and backpressure
//! - **`blobstore`** — per-nimbus blob version index
//! - **`vault`** — topology credentials and private worker keys
//! - **`error_log`** — bounded per-component error records
//! - **`profile`** — pending profiling requests for workers
//! - **`views`** — derived aggregates built only from the above
//!
//! Calls block on the backing store. Embedders running inside an async
//! runtime should wrap them at the boundary (e.g. `spawn_blocking`).

pub mod blobstore;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod error_log;
pub mod heartbeat;
pub mod paths;
pub mod profile;
pub mod state;
pub mod topology;
pub mod types;
pub mod vault;
pub mod views;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClusterStateConfig, StoreConfig};
pub use error::{ClusterStateError, ClusterStateResult};
pub use state::StormClusterState;
pub use storm_coord::{CoordinationStore, RedbStore, Version, Watch, WatchEvent, WatchEventKind};
pub use types::*;
pub use vault::HashAlgorithm;
