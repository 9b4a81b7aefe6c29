//! redb table definitions for the coordination store.
//!
//! Nodes are keyed by their absolute path. Because every ancestor of a
//! node is materialized, the direct children of `/a` are exactly the keys
//! under the `/a/` prefix with no further separator.

use redb::TableDefinition;

/// Node payloads keyed by absolute path: `(version, data)`.
pub const NODES: TableDefinition<&str, (u64, &[u8])> = TableDefinition::new("nodes");

/// Store-wide counters keyed by name.
pub const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Key in [`META`] holding the last version handed out.
pub const REVISION_KEY: &str = "revision";
