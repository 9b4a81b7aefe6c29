//! Change-notification multiplexer.
//!
//! A [`Watch`] is a re-armable subscription: every read that is handed a
//! watch arms it once on that path. When the path changes the watch fires
//! at most once and is disarmed; callers re-arm by passing it to the next
//! read. Delivery is best-effort, so the store stays the source of truth
//! and a fired watch is only a hint to re-read.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

static NEXT_WATCH_ID: AtomicU64 = AtomicU64::new(1);

/// What happened to a watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    Created,
    DataChanged,
    Deleted,
    ChildrenChanged,
}

/// Notification delivered to a fired [`Watch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: String,
    pub kind: WatchEventKind,
}

type Callback = dyn Fn(&WatchEvent) + Send + Sync;

/// One-shot, re-armable change subscription.
#[derive(Clone)]
pub struct Watch {
    id: u64,
    callback: Arc<Callback>,
}

impl Watch {
    pub fn new(callback: impl Fn(&WatchEvent) + Send + Sync + 'static) -> Self {
        Self {
            id: NEXT_WATCH_ID.fetch_add(1, Ordering::Relaxed),
            callback: Arc::new(callback),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    fn fire(&self, event: &WatchEvent) {
        (self.callback)(event);
    }
}

impl fmt::Debug for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch").field("id", &self.id).finish()
    }
}

#[derive(Default)]
struct Armed {
    data: HashMap<String, Vec<Watch>>,
    children: HashMap<String, Vec<Watch>>,
}

/// Registry of armed watches, shared by every handle of one store.
///
/// An armed watch is held until its path changes, [`WatchRegistry::disarm`]
/// releases it, or the store closes. Long-lived callers that stop caring
/// about a path they keep re-arming should disarm the watch.
#[derive(Default)]
pub struct WatchRegistry {
    armed: Mutex<Armed>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Armed> {
        self.armed.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Arm `watch` for data changes (create, update, delete) of `path`.
    pub fn arm_data(&self, path: &str, watch: &Watch) {
        arm(&mut self.lock().data, path, watch);
    }

    /// Arm `watch` for changes to the child set of `path`.
    pub fn arm_children(&self, path: &str, watch: &Watch) {
        arm(&mut self.lock().children, path, watch);
    }

    /// Release `watch` from every path it is armed on, without firing it.
    /// Returns how many armings were dropped.
    pub fn disarm(&self, watch: &Watch) -> usize {
        let mut armed = self.lock();
        let Armed { data, children } = &mut *armed;
        disarm_in(data, watch.id) + disarm_in(children, watch.id)
    }

    /// Number of paths with at least one armed watch.
    pub fn armed_paths(&self) -> usize {
        let armed = self.lock();
        armed.data.len() + armed.children.len()
    }

    /// Number of watches currently armed on `path`, data and child combined.
    pub fn armed_count(&self, path: &str) -> usize {
        let armed = self.lock();
        armed.data.get(path).map_or(0, Vec::len) + armed.children.get(path).map_or(0, Vec::len)
    }

    /// Drop every armed watch without firing it.
    pub fn clear(&self) {
        let mut armed = self.lock();
        armed.data.clear();
        armed.children.clear();
    }

    /// Fire and disarm the watches matching a committed batch of events.
    ///
    /// A watch fires at most once per path within one batch, no matter how
    /// many events in the batch touched that path.
    pub fn dispatch(&self, events: Vec<WatchEvent>) {
        if events.is_empty() {
            return;
        }
        let mut pending = Vec::new();
        {
            let mut armed = self.lock();
            for event in events {
                let mut hit = Vec::new();
                match event.kind {
                    WatchEventKind::Created | WatchEventKind::DataChanged => {
                        hit.extend(armed.data.remove(&event.path).unwrap_or_default());
                    }
                    WatchEventKind::ChildrenChanged => {
                        hit.extend(armed.children.remove(&event.path).unwrap_or_default());
                    }
                    WatchEventKind::Deleted => {
                        hit.extend(armed.data.remove(&event.path).unwrap_or_default());
                        hit.extend(armed.children.remove(&event.path).unwrap_or_default());
                    }
                }
                if !hit.is_empty() {
                    pending.push((event, hit));
                }
            }
        }

        let mut fired: HashSet<(u64, String)> = HashSet::new();
        for (event, watches) in pending {
            for watch in watches {
                if fired.insert((watch.id, event.path.clone())) {
                    trace!(path = %event.path, kind = ?event.kind, watch = watch.id, "watch fired");
                    watch.fire(&event);
                }
            }
        }
    }
}

fn disarm_in(map: &mut HashMap<String, Vec<Watch>>, id: u64) -> usize {
    let mut dropped = 0;
    map.retain(|_, slot| {
        let before = slot.len();
        slot.retain(|w| w.id != id);
        dropped += before - slot.len();
        !slot.is_empty()
    });
    dropped
}

fn arm(map: &mut HashMap<String, Vec<Watch>>, path: &str, watch: &Watch) {
    let slot = map.entry(path.to_string()).or_default();
    if !slot.iter().any(|w| w.id == watch.id) {
        slot.push(watch.clone());
    }
}
