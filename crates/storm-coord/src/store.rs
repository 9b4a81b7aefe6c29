//! Coordination store — versioned path tree persisted in redb.
//!
//! [`CoordinationStore`] is the only seam through which cluster state
//! reaches the backing store. [`RedbStore`] implements it on top of a
//! redb database, either on disk or in memory (the latter for testing).
//!
//! Every write event draws a fresh version from a single store-wide
//! counter, so the version of a path strictly increases across rewrites,
//! identical rewrites, and delete/recreate cycles.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use redb::{Database, ReadOnlyTable, ReadableDatabase, ReadableTable, Table};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::path;
use crate::tables::*;
use crate::watch::{Watch, WatchEvent, WatchEventKind, WatchRegistry};

/// Monotonic version stamped on each write.
pub type Version = u64;

/// A value paired with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub data: T,
    pub version: Version,
}

impl<T> Versioned<T> {
    pub fn new(data: T, version: Version) -> Self {
        Self { data, version }
    }

    /// Transform the payload while keeping the version.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Versioned<U> {
        Versioned {
            data: f(self.data),
            version: self.version,
        }
    }
}

/// Consistent hierarchical key/value tree with versions and watches.
///
/// All calls may block on the backing store. Any call that accepts a
/// `watch` arms it on the given path before reading, so a change racing
/// with the read still fires it.
pub trait CoordinationStore: Send + Sync {
    /// Read a node's payload and version. `None` if the node does not exist.
    fn read(&self, path: &str, watch: Option<&Watch>) -> StoreResult<Option<Versioned<Vec<u8>>>>;

    /// Version of a node without transferring its payload.
    fn stat(&self, path: &str, watch: Option<&Watch>) -> StoreResult<Option<Version>>;

    fn exists(&self, path: &str, watch: Option<&Watch>) -> StoreResult<bool> {
        Ok(self.stat(path, watch)?.is_some())
    }

    /// Create or overwrite a node, creating missing ancestors.
    fn write(&self, path: &str, data: &[u8]) -> StoreResult<Version>;

    /// Create a node that must not exist yet.
    fn create(&self, path: &str, data: &[u8]) -> StoreResult<Version>;

    /// Overwrite a node only if its version still equals `expected`.
    fn write_if_version(&self, path: &str, data: &[u8], expected: Version)
    -> StoreResult<Version>;

    /// Create `prefix` + a zero-padded sequence number. Returns the new path.
    fn create_sequential(&self, prefix: &str, data: &[u8]) -> StoreResult<String>;

    /// Delete a node and its whole subtree. Returns the number of nodes removed.
    fn delete(&self, path: &str) -> StoreResult<usize>;

    /// Sorted names of the direct children of `path`.
    fn children(&self, path: &str, watch: Option<&Watch>) -> StoreResult<Vec<String>>;

    /// Create `path` and its ancestors with empty payloads where missing.
    fn mkdirs(&self, path: &str) -> StoreResult<()>;

    /// Release the connection. Later calls fail with `Unavailable`.
    fn close(&self);

    /// Drop every pending arming of `watch` without firing it.
    fn disarm(&self, _watch: &Watch) -> usize {
        0
    }
}

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

type NodeTable<'txn> = Table<'txn, &'static str, (u64, &'static [u8])>;
type MetaTable<'txn> = Table<'txn, &'static str, u64>;

/// Thread-safe coordination store backed by redb.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
    watches: Arc<WatchRegistry>,
    closed: Arc<AtomicBool>,
}

impl RedbStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Unavailable))?;
        let store = Self::from_database(db)?;
        debug!(?path, "coordination store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Unavailable))?;
        let store = Self::from_database(db)?;
        debug!("in-memory coordination store opened");
        Ok(store)
    }

    fn from_database(db: Database) -> StoreResult<Self> {
        let store = Self {
            db: Arc::new(db),
            watches: Arc::new(WatchRegistry::new()),
            closed: Arc::new(AtomicBool::new(false)),
        };
        store.ensure_tables()?;
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Unavailable))?;
        txn.open_table(NODES).map_err(map_err!(Unavailable))?;
        txn.open_table(META).map_err(map_err!(Unavailable))?;
        txn.commit().map_err(map_err!(Unavailable))?;
        Ok(())
    }

    /// The watch registry shared by every clone of this store.
    pub fn watches(&self) -> &WatchRegistry {
        &self.watches
    }

    /// The last version handed out by this store.
    pub fn current_version(&self) -> StoreResult<Version> {
        self.ensure_open()?;
        let txn = self.db.begin_read().map_err(map_err!(Unavailable))?;
        let meta = txn.open_table(META).map_err(map_err!(Unavailable))?;
        let current = meta
            .get(REVISION_KEY)
            .map_err(map_err!(Unavailable))?
            .map(|guard| guard.value())
            .unwrap_or(0);
        Ok(current)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable("store connection closed".to_string()));
        }
        Ok(())
    }

    fn with_nodes<R>(
        &self,
        f: impl FnOnce(&ReadOnlyTable<&'static str, (u64, &'static [u8])>) -> StoreResult<R>,
    ) -> StoreResult<R> {
        self.ensure_open()?;
        let txn = self.db.begin_read().map_err(map_err!(Unavailable))?;
        let table = txn.open_table(NODES).map_err(map_err!(Unavailable))?;
        f(&table)
    }

    /// Run `f` in one write transaction and dispatch its watch events after commit.
    fn mutate<R>(&self, f: impl FnOnce(&mut Mutation<'_>) -> StoreResult<R>) -> StoreResult<R> {
        self.ensure_open()?;
        let txn = self.db.begin_write().map_err(map_err!(Unavailable))?;
        let (result, events) = {
            let mut mutation = Mutation {
                nodes: txn.open_table(NODES).map_err(map_err!(Unavailable))?,
                meta: txn.open_table(META).map_err(map_err!(Unavailable))?,
                events: Vec::new(),
            };
            let result = f(&mut mutation)?;
            (result, mutation.events)
        };
        txn.commit().map_err(map_err!(Unavailable))?;
        self.watches.dispatch(events);
        Ok(result)
    }
}

impl CoordinationStore for RedbStore {
    fn read(&self, path: &str, watch: Option<&Watch>) -> StoreResult<Option<Versioned<Vec<u8>>>> {
        path::validate(path)?;
        self.ensure_open()?;
        if let Some(w) = watch {
            self.watches.arm_data(path, w);
        }
        self.with_nodes(|nodes| {
            Ok(nodes
                .get(path)
                .map_err(map_err!(Unavailable))?
                .map(|guard| {
                    let (version, data) = guard.value();
                    Versioned::new(data.to_vec(), version)
                }))
        })
    }

    fn stat(&self, path: &str, watch: Option<&Watch>) -> StoreResult<Option<Version>> {
        path::validate(path)?;
        self.ensure_open()?;
        if let Some(w) = watch {
            self.watches.arm_data(path, w);
        }
        self.with_nodes(|nodes| {
            Ok(nodes
                .get(path)
                .map_err(map_err!(Unavailable))?
                .map(|guard| guard.value().0))
        })
    }

    fn write(&self, path: &str, data: &[u8]) -> StoreResult<Version> {
        check_writable(path)?;
        let version = self.mutate(|m| m.put(path, data))?;
        debug!(%path, version, "node written");
        Ok(version)
    }

    fn create(&self, path: &str, data: &[u8]) -> StoreResult<Version> {
        check_writable(path)?;
        let version = self.mutate(|m| {
            if m.version_of(path)?.is_some() {
                return Err(StoreError::NodeExists(path.to_string()));
            }
            m.put(path, data)
        })?;
        debug!(%path, version, "node created");
        Ok(version)
    }

    fn write_if_version(
        &self,
        path: &str,
        data: &[u8],
        expected: Version,
    ) -> StoreResult<Version> {
        check_writable(path)?;
        let version = self.mutate(|m| match m.version_of(path)? {
            None => Err(StoreError::NoNode(path.to_string())),
            Some(actual) if actual != expected => Err(StoreError::BadVersion {
                path: path.to_string(),
                expected,
                actual,
            }),
            Some(_) => m.put(path, data),
        })?;
        debug!(%path, expected, version, "node compare-and-set");
        Ok(version)
    }

    fn create_sequential(&self, prefix: &str, data: &[u8]) -> StoreResult<String> {
        check_writable(prefix)?;
        let created = self.mutate(|m| {
            let seq = m.next_version()?;
            let created = format!("{prefix}{seq:020}");
            m.put(&created, data)?;
            Ok(created)
        })?;
        debug!(path = %created, "sequential node created");
        Ok(created)
    }

    fn delete(&self, path: &str) -> StoreResult<usize> {
        check_writable(path)?;
        let removed = self.mutate(|m| m.remove_subtree(path))?;
        if removed > 0 {
            debug!(%path, removed, "subtree deleted");
        }
        Ok(removed)
    }

    fn children(&self, path: &str, watch: Option<&Watch>) -> StoreResult<Vec<String>> {
        path::validate(path)?;
        self.ensure_open()?;
        if let Some(w) = watch {
            self.watches.arm_children(path, w);
        }
        let prefix = path::child_prefix(path);
        self.with_nodes(|nodes| {
            let names = scan_prefix(nodes, &prefix)?
                .into_iter()
                .filter_map(|key| {
                    let rest = &key[prefix.len()..];
                    (!rest.contains('/')).then(|| rest.to_string())
                })
                .collect();
            Ok(names)
        })
    }

    fn mkdirs(&self, path: &str) -> StoreResult<()> {
        check_writable(path)?;
        self.mutate(|m| {
            if m.version_of(path)?.is_none() {
                m.put(path, &[])?;
            }
            Ok(())
        })
    }

    fn disarm(&self, watch: &Watch) -> usize {
        self.watches.disarm(watch)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.watches.clear();
            info!("coordination store closed");
        }
    }
}

fn check_writable(path: &str) -> StoreResult<()> {
    path::validate(path)?;
    if path == path::ROOT {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// All keys starting with `prefix`, in key order.
fn scan_prefix<T>(table: &T, prefix: &str) -> StoreResult<Vec<String>>
where
    T: ReadableTable<&'static str, (u64, &'static [u8])>,
{
    let mut keys = Vec::new();
    for entry in table.range(prefix..).map_err(map_err!(Unavailable))? {
        let (key, _) = entry.map_err(map_err!(Unavailable))?;
        let key = key.value();
        if !key.starts_with(prefix) {
            break;
        }
        keys.push(key.to_string());
    }
    Ok(keys)
}

/// Open tables of one write transaction plus the events it produced.
struct Mutation<'txn> {
    nodes: NodeTable<'txn>,
    meta: MetaTable<'txn>,
    events: Vec<WatchEvent>,
}

impl Mutation<'_> {
    fn next_version(&mut self) -> StoreResult<Version> {
        let current = self
            .meta
            .get(REVISION_KEY)
            .map_err(map_err!(Unavailable))?
            .map(|guard| guard.value())
            .unwrap_or(0);
        let next = current + 1;
        self.meta
            .insert(REVISION_KEY, next)
            .map_err(map_err!(Unavailable))?;
        Ok(next)
    }

    fn version_of(&self, path: &str) -> StoreResult<Option<Version>> {
        Ok(self
            .nodes
            .get(path)
            .map_err(map_err!(Unavailable))?
            .map(|guard| guard.value().0))
    }

    fn emit(&mut self, path: &str, kind: WatchEventKind) {
        self.events.push(WatchEvent {
            path: path.to_string(),
            kind,
        });
    }

    fn emit_child_change(&mut self, path: &str) {
        if let Some(parent) = path::parent(path) {
            self.emit(parent, WatchEventKind::ChildrenChanged);
        }
    }

    fn put(&mut self, path: &str, data: &[u8]) -> StoreResult<Version> {
        for ancestor in path::ancestors(path) {
            if self.version_of(ancestor)?.is_none() {
                let version = self.next_version()?;
                self.nodes
                    .insert(ancestor, (version, &[][..]))
                    .map_err(map_err!(Unavailable))?;
                self.emit(ancestor, WatchEventKind::Created);
                self.emit_child_change(ancestor);
            }
        }

        let existed = self.version_of(path)?.is_some();
        let version = self.next_version()?;
        self.nodes
            .insert(path, (version, data))
            .map_err(map_err!(Unavailable))?;
        if existed {
            self.emit(path, WatchEventKind::DataChanged);
        } else {
            self.emit(path, WatchEventKind::Created);
            self.emit_child_change(path);
        }
        Ok(version)
    }

    fn remove_subtree(&mut self, path: &str) -> StoreResult<usize> {
        let mut doomed = scan_prefix(&self.nodes, &path::child_prefix(path))?;
        let root_existed = self.version_of(path)?.is_some();
        if root_existed {
            doomed.push(path.to_string());
        }
        // Deepest first so child watches see their children go before themselves.
        doomed.sort_by_key(|key| std::cmp::Reverse(key.matches('/').count()));
        for key in &doomed {
            self.nodes
                .remove(key.as_str())
                .map_err(map_err!(Unavailable))?;
            self.emit(key, WatchEventKind::Deleted);
        }
        if root_existed {
            self.emit_child_change(path);
        }
        Ok(doomed.len())
    }
}
