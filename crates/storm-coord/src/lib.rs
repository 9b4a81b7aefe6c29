//! storm-coord — versioned coordination tree for Storm cluster state.
//!
//! Backed by [redb](https://docs.rs/redb), provides a hierarchical
//! key/value tree addressed by absolute paths (`/storm/assignments/t-1`).
//! Every write is stamped with a store-wide monotonic version so callers
//! can detect staleness without comparing payloads.
//!
//! # Architecture
//!
//! - **`path`** — path validation and composition helpers
//! - **`store`** — the [`CoordinationStore`] trait and the redb-backed
//!   [`RedbStore`]
//! - **`watch`** — one-shot, best-effort change notifications
//!
//! Payloads are opaque bytes; typed encoding is the caller's concern.
//! `RedbStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across threads.

pub mod error;
pub mod path;
pub mod store;
pub mod tables;
pub mod watch;

pub use error::{StoreError, StoreResult};
pub use store::{CoordinationStore, RedbStore, Version, Versioned};
pub use watch::{Watch, WatchEvent, WatchEventKind};
