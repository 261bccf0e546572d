//! Object Catalogue - identity bookkeeping for federated objects.
//!
//! Every federation object handle the federate knows about has exactly one
//! record in one state:
//!
//! ```text
//!                 ┌──────────── reflect (no proxy) ────────────┐
//!                 │                                            ▼
//!  discover ─► DISCOVERED ─────────────────────────────────► PENDING
//!                 │                                            │ required ⊆ received
//!                 │                                 ┌──────────┴──────────┐
//!                 │                                 ▼                     ▼
//!                 │                           MATERIALIZED             LINKED
//!                 │                           (ghost created)   (existing local object)
//!                 ▼                                 │                     │
//!              REMOVED ◄────────── remove ──────────┴─────────────────────┘
//!                 ▲
//!  register ─► TRACKED_LOCAL ── local delete ──┘
//! ```
//!
//! Removed handles are kept as tombstones so late reflections are dropped.
//! Tombstones are capped; the oldest are forgotten first.

use fedbridge_env::{LocalObjectId, ObjectClassHandle, ObjectHandle};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Catalogue shared between the dispatch thread and checkpoint writers.
pub type SharedCatalogue = Arc<Mutex<ObjectCatalogue>>;

/// Default number of tombstones kept.
pub const DEFAULT_TOMBSTONE_LIMIT: usize = 4096;

/// Lifecycle state of an object handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectState {
    /// Known remotely, nothing received yet
    Discovered,
    /// Accumulating attributes until the required set is complete
    Pending,
    /// Remote object with a ghost local representation
    Materialized,
    /// Remote object bound to a pre-existing local object
    Linked,
    /// Local object registered with the federation
    TrackedLocal,
    /// Terminal
    Removed,
}

impl ObjectState {
    /// True for objects whose local side came from the federation.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            ObjectState::Discovered
                | ObjectState::Pending
                | ObjectState::Materialized
                | ObjectState::Linked
        )
    }
}

// ============================================================================
// PENDING PARAMETER SET
// ============================================================================

/// Attributes received for an object that cannot be materialized yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingParameters {
    attributes: BTreeMap<String, Vec<u8>>,
    required: BTreeSet<String>,
}

impl PendingParameters {
    pub fn new(required: BTreeSet<String>) -> Self {
        Self {
            attributes: BTreeMap::new(),
            required,
        }
    }

    /// Records an attribute value; later values replace earlier ones.
    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.attributes.insert(name.into(), bytes);
    }

    /// True once every required attribute has been received.
    pub fn is_ready(&self) -> bool {
        self.required.iter().all(|name| self.attributes.contains_key(name))
    }

    /// Required attributes still missing.
    pub fn missing(&self) -> Vec<&str> {
        self.required
            .iter()
            .filter(|name| !self.attributes.contains_key(*name))
            .map(String::as_str)
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.attributes.get(name).map(Vec::as_slice)
    }

    pub fn attributes(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.attributes
    }

    pub fn required(&self) -> &BTreeSet<String> {
        &self.required
    }

}

// ============================================================================
// RECORDS
// ============================================================================

/// One federation object known to this federate.
#[derive(Debug, Clone)]
pub struct ObjectRecord {
    pub handle: ObjectHandle,
    pub class: ObjectClassHandle,

    /// FOM class name
    pub class_name: String,

    pub instance_name: String,

    /// Local object this handle maps to; the catalogue never owns it
    pub proxy: Option<LocalObjectId>,

    /// Tag assigned at registration (local objects only)
    pub tag: Option<String>,

    pub state: ObjectState,

    pending: Option<PendingParameters>,
}

impl ObjectRecord {
    pub fn pending(&self) -> Option<&PendingParameters> {
        self.pending.as_ref()
    }
}

/// Serializable view of the catalogue for checkpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogueSnapshot {
    pub objects: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub handle: ObjectHandle,
    pub class_name: String,
    pub instance_name: String,
    pub state: ObjectState,
    pub proxy: Option<LocalObjectId>,
    pub tag: Option<String>,
}

// ============================================================================
// CATALOGUE
// ============================================================================

/// Handle records, proxy index and tombstones.
#[derive(Debug)]
pub struct ObjectCatalogue {
    records: HashMap<ObjectHandle, ObjectRecord>,
    by_proxy: HashMap<LocalObjectId, ObjectHandle>,
    removed: HashSet<ObjectHandle>,
    /// Removal order, oldest first
    removal_order: VecDeque<ObjectHandle>,
    tombstone_limit: usize,
}

impl Default for ObjectCatalogue {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
            by_proxy: HashMap::new(),
            removed: HashSet::new(),
            removal_order: VecDeque::new(),
            tombstone_limit: DEFAULT_TOMBSTONE_LIMIT,
        }
    }
}

impl ObjectCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the number of tombstones kept (at least one).
    pub fn with_tombstone_limit(mut self, limit: usize) -> Self {
        self.tombstone_limit = limit.max(1);
        self
    }

    pub fn shared() -> SharedCatalogue {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Records a discovered remote object.
    ///
    /// Returns false when the handle is already known or was removed.
    pub fn discover(
        &mut self,
        handle: ObjectHandle,
        class: ObjectClassHandle,
        class_name: &str,
        instance_name: &str,
    ) -> bool {
        if self.records.contains_key(&handle) || self.removed.contains(&handle) {
            return false;
        }
        self.records.insert(
            handle,
            ObjectRecord {
                handle,
                class,
                class_name: class_name.to_string(),
                instance_name: instance_name.to_string(),
                proxy: None,
                tag: None,
                state: ObjectState::Discovered,
                pending: None,
            },
        );
        true
    }

    /// Records a local object the federation just registered.
    pub fn track_local(
        &mut self,
        handle: ObjectHandle,
        class: ObjectClassHandle,
        class_name: &str,
        proxy: LocalObjectId,
        tag: &str,
    ) {
        self.records.insert(
            handle,
            ObjectRecord {
                handle,
                class,
                class_name: class_name.to_string(),
                instance_name: tag.to_string(),
                proxy: Some(proxy),
                tag: Some(tag.to_string()),
                state: ObjectState::TrackedLocal,
                pending: None,
            },
        );
        self.by_proxy.insert(proxy, handle);
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&ObjectRecord> {
        self.records.get(&handle)
    }

    /// Current state, including tombstones.
    pub fn state(&self, handle: ObjectHandle) -> Option<ObjectState> {
        if self.removed.contains(&handle) {
            return Some(ObjectState::Removed);
        }
        self.records.get(&handle).map(|r| r.state)
    }

    pub fn handle_for_proxy(&self, proxy: LocalObjectId) -> Option<ObjectHandle> {
        self.by_proxy.get(&proxy).copied()
    }

    /// Adds an attribute to the object's pending set, creating it from
    /// `required` on first use.
    ///
    /// Returns whether the set is ready, or `None` for handles that are not
    /// waiting for materialization.
    pub fn accumulate(
        &mut self,
        handle: ObjectHandle,
        name: &str,
        bytes: Vec<u8>,
        required: impl FnOnce() -> BTreeSet<String>,
    ) -> Option<bool> {
        let record = self.records.get_mut(&handle)?;
        match record.state {
            ObjectState::Discovered => {
                record.state = ObjectState::Pending;
                record.pending = Some(PendingParameters::new(required()));
            }
            ObjectState::Pending => {}
            _ => return None,
        }
        let pending = record.pending.get_or_insert_with(PendingParameters::default);
        pending.insert(name, bytes);
        Some(pending.is_ready())
    }

    /// Removes and returns the pending set of an object.
    pub fn take_pending(&mut self, handle: ObjectHandle) -> Option<PendingParameters> {
        self.records.get_mut(&handle)?.pending.take()
    }

    /// Puts back a pending set taken for a materialization that failed.
    pub fn restore_pending(&mut self, handle: ObjectHandle, pending: PendingParameters) {
        if let Some(record) = self.records.get_mut(&handle) {
            if record.state == ObjectState::Pending {
                record.pending = Some(pending);
            }
        }
    }

    /// Binds a remote object to its local representation.
    ///
    /// `state` must be `Materialized` or `Linked`.
    pub fn attach_proxy(&mut self, handle: ObjectHandle, proxy: LocalObjectId, state: ObjectState) {
        debug_assert!(matches!(state, ObjectState::Materialized | ObjectState::Linked));
        if let Some(record) = self.records.get_mut(&handle) {
            record.proxy = Some(proxy);
            record.state = state;
            record.pending = None;
            self.by_proxy.insert(proxy, handle);
        }
    }

    /// Moves a handle to REMOVED and returns its last record.
    pub fn remove(&mut self, handle: ObjectHandle) -> Option<ObjectRecord> {
        let record = self.records.remove(&handle)?;
        if let Some(proxy) = record.proxy {
            self.by_proxy.remove(&proxy);
        }
        self.tombstone(handle);
        Some(record)
    }

    fn tombstone(&mut self, handle: ObjectHandle) {
        if !self.removed.insert(handle) {
            return;
        }
        self.removal_order.push_back(handle);
        while self.removal_order.len() > self.tombstone_limit {
            if let Some(oldest) = self.removal_order.pop_front() {
                self.removed.remove(&oldest);
            }
        }
    }

    /// Handles of tracked local objects.
    pub fn tracked_local(&self) -> Vec<ObjectHandle> {
        let mut handles: Vec<_> = self
            .records
            .values()
            .filter(|r| r.state == ObjectState::TrackedLocal)
            .map(|r| r.handle)
            .collect();
        handles.sort();
        handles
    }

    pub fn count(&self, state: ObjectState) -> usize {
        if state == ObjectState::Removed {
            return self.removed.len();
        }
        self.records.values().filter(|r| r.state == state).count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Forgets everything, tombstones included.
    pub fn clear(&mut self) {
        self.records.clear();
        self.by_proxy.clear();
        self.removed.clear();
        self.removal_order.clear();
    }

    pub fn snapshot(&self) -> CatalogueSnapshot {
        let mut objects: Vec<SnapshotEntry> = self
            .records
            .values()
            .map(|r| SnapshotEntry {
                handle: r.handle,
                class_name: r.class_name.clone(),
                instance_name: r.instance_name.clone(),
                state: r.state,
                proxy: r.proxy,
                tag: r.tag.clone(),
            })
            .collect();
        objects.sort_by_key(|e| e.handle);
        CatalogueSnapshot { objects }
    }
}

// ============================================================================
// TAG GENERATOR
// ============================================================================

/// Issues collision-free object tags (`<prefix>-<n>`).
#[derive(Debug)]
pub struct TagGenerator {
    prefix: String,
    next: u64,
    issued: HashSet<String>,
}

impl TagGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
            issued: HashSet::new(),
        }
    }

    /// Returns a tag that is not currently in use.
    pub fn next_tag(&mut self) -> String {
        loop {
            let tag = format!("{}-{}", self.prefix, self.next);
            self.next += 1;
            if self.issued.insert(tag.clone()) {
                return tag;
            }
        }
    }

    pub fn release(&mut self, tag: &str) {
        self.issued.remove(tag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn required(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn discovered() -> ObjectCatalogue {
        let mut catalogue = ObjectCatalogue::new();
        assert!(catalogue.discover(ObjectHandle(1), ObjectClassHandle(10), "Platform", "tank-1"));
        catalogue
    }

    #[test]
    fn test_pending_until_required_complete() {
        let mut catalogue = discovered();
        let h = ObjectHandle(1);

        let ready = catalogue.accumulate(h, "Position", vec![1], || required(&["Position", "Type"]));
        assert_eq!(ready, Some(false));
        assert_eq!(catalogue.state(h), Some(ObjectState::Pending));
        assert_eq!(catalogue.get(h).unwrap().pending().unwrap().missing(), vec!["Type"]);

        let ready = catalogue.accumulate(h, "Type", vec![2], BTreeSet::new);
        assert_eq!(ready, Some(true));

        let pending = catalogue.take_pending(h).unwrap();
        assert_eq!(pending.get("Position"), Some(&[1u8][..]));
        catalogue.attach_proxy(h, LocalObjectId(5), ObjectState::Materialized);
        assert_eq!(catalogue.state(h), Some(ObjectState::Materialized));
        assert_eq!(catalogue.handle_for_proxy(LocalObjectId(5)), Some(h));
        assert!(catalogue.get(h).unwrap().pending().is_none());
    }

    #[test]
    fn test_restored_pending_set_keeps_attributes() {
        let mut catalogue = discovered();
        let h = ObjectHandle(1);
        catalogue.accumulate(h, "Position", vec![1], || required(&["Position"]));
        let pending = catalogue.take_pending(h).unwrap();
        catalogue.restore_pending(h, pending);

        let ready = catalogue.accumulate(h, "Speed", vec![3], BTreeSet::new);
        assert_eq!(ready, Some(true));
        assert_eq!(catalogue.get(h).unwrap().pending().unwrap().attributes().len(), 2);
    }

    #[test]
    fn test_empty_required_set_is_ready_immediately() {
        let mut catalogue = discovered();
        let ready = catalogue.accumulate(ObjectHandle(1), "Speed", vec![0], BTreeSet::new);
        assert_eq!(ready, Some(true));
    }

    #[test]
    fn test_accumulate_ignores_materialized() {
        let mut catalogue = discovered();
        catalogue.attach_proxy(ObjectHandle(1), LocalObjectId(2), ObjectState::Linked);
        assert_eq!(
            catalogue.accumulate(ObjectHandle(1), "Speed", vec![0], BTreeSet::new),
            None
        );
    }

    #[test]
    fn test_discovered_straight_to_removed() {
        let mut catalogue = discovered();
        let record = catalogue.remove(ObjectHandle(1)).unwrap();
        assert_eq!(record.state, ObjectState::Discovered);
        assert_eq!(catalogue.state(ObjectHandle(1)), Some(ObjectState::Removed));
        assert!(catalogue.get(ObjectHandle(1)).is_none());

        // Tombstoned handles are not rediscovered
        assert!(!catalogue.discover(ObjectHandle(1), ObjectClassHandle(10), "Platform", "x"));
    }

    #[test]
    fn test_remove_clears_proxy_index() {
        let mut catalogue = ObjectCatalogue::new();
        catalogue.track_local(ObjectHandle(4), ObjectClassHandle(1), "Platform", LocalObjectId(9), "fed-1");
        assert_eq!(catalogue.tracked_local(), vec![ObjectHandle(4)]);

        catalogue.remove(ObjectHandle(4));
        assert_eq!(catalogue.handle_for_proxy(LocalObjectId(9)), None);
        assert_eq!(catalogue.count(ObjectState::Removed), 1);
    }

    #[test]
    fn test_duplicate_discover_is_rejected() {
        let mut catalogue = discovered();
        assert!(!catalogue.discover(ObjectHandle(1), ObjectClassHandle(10), "Platform", "tank-1"));
        assert_eq!(catalogue.len(), 1);
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let mut catalogue = ObjectCatalogue::new();
        catalogue.discover(ObjectHandle(7), ObjectClassHandle(1), "Platform", "b");
        catalogue.discover(ObjectHandle(2), ObjectClassHandle(1), "Platform", "a");
        let snapshot = catalogue.snapshot();
        let handles: Vec<_> = snapshot.objects.iter().map(|e| e.handle).collect();
        assert_eq!(handles, vec![ObjectHandle(2), ObjectHandle(7)]);
    }

    #[test]
    fn test_tag_generator_never_repeats() {
        let mut tags = TagGenerator::new("fed-a");
        assert_eq!(tags.next_tag(), "fed-a-1");
        tags.release("fed-a-1");
        assert_eq!(tags.next_tag(), "fed-a-2");
        assert_eq!(tags.next_tag(), "fed-a-3");
    }

    #[test]
    fn test_tombstones_are_capped() {
        let mut catalogue = ObjectCatalogue::new().with_tombstone_limit(2);
        for n in 1..=3 {
            let h = ObjectHandle(n);
            catalogue.discover(h, ObjectClassHandle(10), "Platform", "tank");
            catalogue.remove(h);
        }
        assert_eq!(catalogue.count(ObjectState::Removed), 2);

        // The oldest tombstone is forgotten, the newer ones still block rediscovery
        assert_eq!(catalogue.state(ObjectHandle(1)), None);
        assert_eq!(catalogue.state(ObjectHandle(3)), Some(ObjectState::Removed));
        assert!(!catalogue.discover(ObjectHandle(2), ObjectClassHandle(10), "Platform", "x"));
    }

    proptest! {
        #[test]
        fn prop_readiness_is_order_independent(
            order in Just(vec!["A", "B", "C", "D"]).prop_shuffle()
        ) {
            let mut pending = PendingParameters::new(required(&["A", "B", "C"]));
            let mut ready_after = None;
            for (i, name) in order.iter().enumerate() {
                pending.insert(*name, vec![i as u8]);
                if pending.is_ready() && ready_after.is_none() {
                    ready_after = Some(i);
                }
            }
            let last_required = order
                .iter()
                .enumerate()
                .filter(|(_, n)| **n != "D")
                .map(|(i, _)| i)
                .max()
                .unwrap();
            prop_assert_eq!(ready_after, Some(last_required));
        }
    }
}
