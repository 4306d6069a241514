//! Snapshot cache and query surface.
//!
//! Exactly one snapshot is current at any time; `set_state` swaps the
//! whole `Arc` so no consumer ever observes a half-updated state. The
//! read-once session metadata (type catalog, grouping tables) is owned
//! here as explicit fields built once at session start, never as
//! process-wide singletons.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::watch;

use sim_wire::{
    FactoryState, ObjectState, PlayerState, PrerequisiteGroups, Snapshot, StaticMetadata,
    TypeClass, TypeKind,
};

use crate::error::{ClientError, Result};

/// Static metadata plus the lookup tables derived from it once.
pub struct SessionMetadata {
    pub raw: StaticMetadata,
    pub type_map: HashMap<u64, TypeClass>,
    pub prerequisite_map: HashMap<i32, HashSet<i32>>,
}

impl SessionMetadata {
    pub fn new(raw: StaticMetadata) -> Self {
        let type_map = raw.type_map();
        let prerequisite_map = raw.prerequisite_groups.group_map();
        Self {
            raw,
            type_map,
            prerequisite_map,
        }
    }

    pub fn type_class(&self, handle: u64) -> Option<&TypeClass> {
        self.type_map.get(&handle)
    }

    pub fn prerequisite_groups(&self) -> &PrerequisiteGroups {
        &self.raw.prerequisite_groups
    }
}

pub struct StateCache {
    snapshot: watch::Sender<Arc<Snapshot>>,
    metadata: OnceLock<Arc<SessionMetadata>>,
}

impl Default for StateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCache {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Snapshot::default()));
        Self {
            snapshot,
            metadata: OnceLock::new(),
        }
    }

    /// The current snapshot. Cheap; clones an `Arc`.
    pub fn current(&self) -> Arc<Snapshot> {
        self.snapshot.borrow().clone()
    }

    /// True iff `candidate` differs from the cached snapshot in frame or
    /// stage. Equal (frame, stage) means "unchanged" and downstream
    /// processing is skipped.
    pub fn should_update(&self, candidate: &Snapshot) -> bool {
        let current = self.snapshot.borrow();
        candidate.frame != current.frame || candidate.stage != current.stage
    }

    /// Atomically replace the cached snapshot and notify all waiters.
    pub fn set_state(&self, snapshot: Snapshot) {
        self.snapshot.send_replace(Arc::new(snapshot));
    }

    /// Block until `predicate` holds for the current snapshot, re-checking
    /// on every replacement, or fail with [`ClientError::Timeout`].
    pub async fn wait_state<F>(&self, mut predicate: F, timeout: Duration) -> Result<Arc<Snapshot>>
    where
        F: FnMut(&Snapshot) -> bool,
    {
        let mut rx = self.snapshot.subscribe();
        let result = match tokio::time::timeout(timeout, rx.wait_for(|snap| predicate(snap.as_ref()))).await {
            Err(_) => Err(ClientError::Timeout),
            Ok(Err(_)) => Err(ClientError::Closed),
            Ok(Ok(snap)) => Ok(snap.clone()),
        };
        result
    }

    /// Install the read-once session metadata. Returns false when metadata
    /// was already set; the existing catalog is kept.
    pub fn set_metadata(&self, metadata: StaticMetadata) -> bool {
        self.metadata
            .set(Arc::new(SessionMetadata::new(metadata)))
            .is_ok()
    }

    pub fn metadata(&self) -> Option<Arc<SessionMetadata>> {
        self.metadata.get().cloned()
    }

    pub fn has_metadata(&self) -> bool {
        self.metadata.get().is_some()
    }

    /// Restartable query over the objects of the snapshot current at call
    /// time. Later `set_state` calls do not affect an iterator in flight.
    pub fn query_objects(&self, filter: ObjectFilter) -> ObjectQuery {
        ObjectQuery {
            snapshot: self.current(),
            metadata: self.metadata(),
            filter,
            pos: 0,
        }
    }

    /// Restartable query over the factory rows of the current snapshot.
    pub fn query_factories(&self, owner: Option<u64>) -> FactoryQuery {
        FactoryQuery {
            snapshot: self.current(),
            owner,
            pos: 0,
        }
    }

    /// Type classes whose name contains `pattern`, optionally narrowed by
    /// kind. Empty before metadata arrives.
    pub fn query_type_classes(&self, pattern: &str, kind: Option<TypeKind>) -> Vec<TypeClass> {
        let Some(meta) = self.metadata() else {
            return Vec::new();
        };
        meta.raw
            .type_classes
            .iter()
            .filter(|t| t.name.contains(pattern))
            .filter(|t| kind.map_or(true, |k| t.kind == k))
            .cloned()
            .collect()
    }

    pub fn players(&self) -> Vec<PlayerState> {
        self.current().players.clone()
    }

    /// The participant this session acts as.
    pub fn current_player(&self) -> Option<PlayerState> {
        self.current().players.iter().find(|p| p.current).cloned()
    }
}

/// Owner/type/kind/name filter for object queries.
#[derive(Debug, Clone, Default)]
pub struct ObjectFilter {
    pub owner: Option<u64>,
    pub type_handle: Option<u64>,
    pub kind: Option<TypeKind>,
    pub name_pattern: Option<String>,
}

impl ObjectFilter {
    pub fn owner(mut self, owner: u64) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn type_handle(mut self, handle: u64) -> Self {
        self.type_handle = Some(handle);
        self
    }

    pub fn kind(mut self, kind: TypeKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn name_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.name_pattern = Some(pattern.into());
        self
    }

    fn matches(&self, object: &ObjectState, metadata: Option<&SessionMetadata>) -> bool {
        if self.owner.is_some_and(|o| object.owner != o) {
            return false;
        }
        if self.type_handle.is_some_and(|t| object.type_handle != t) {
            return false;
        }
        if self.kind.is_none() && self.name_pattern.is_none() {
            return true;
        }
        // Kind and name filters need the type catalog; without it nothing
        // can match them.
        let Some(tc) = metadata.and_then(|m| m.type_class(object.type_handle)) else {
            return false;
        };
        if self.kind.is_some_and(|k| tc.kind != k) {
            return false;
        }
        if self
            .name_pattern
            .as_deref()
            .is_some_and(|p| !tc.name.contains(p))
        {
            return false;
        }
        true
    }
}

/// Lazy iterator over one snapshot's objects.
pub struct ObjectQuery {
    snapshot: Arc<Snapshot>,
    metadata: Option<Arc<SessionMetadata>>,
    filter: ObjectFilter,
    pos: usize,
}

impl Iterator for ObjectQuery {
    type Item = ObjectState;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.snapshot.objects.len() {
            let object = &self.snapshot.objects[self.pos];
            self.pos += 1;
            if self.filter.matches(object, self.metadata.as_deref()) {
                return Some(object.clone());
            }
        }
        None
    }
}

/// Lazy iterator over one snapshot's factory rows.
pub struct FactoryQuery {
    snapshot: Arc<Snapshot>,
    owner: Option<u64>,
    pos: usize,
}

impl Iterator for FactoryQuery {
    type Item = FactoryState;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.snapshot.factories.len() {
            let factory = &self.snapshot.factories[self.pos];
            self.pos += 1;
            if self.owner.map_or(true, |o| factory.owner == o) {
                return Some(factory.clone());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_wire::{Coordinates, Stage};

    fn snapshot(frame: u64, stage: Stage) -> Snapshot {
        Snapshot {
            frame,
            stage,
            ..Default::default()
        }
    }

    fn object(handle: u64, type_handle: u64, owner: u64) -> ObjectState {
        ObjectState {
            handle,
            type_handle,
            owner,
            coordinates: Coordinates::default(),
            health: 100,
            deployed: false,
            deploying: false,
        }
    }

    #[test]
    fn should_update_requires_frame_or_stage_change() {
        let cache = StateCache::new();
        cache.set_state(snapshot(10, Stage::Ingame));

        assert!(!cache.should_update(&snapshot(10, Stage::Ingame)));
        assert!(cache.should_update(&snapshot(11, Stage::Ingame)));
        assert!(cache.should_update(&snapshot(10, Stage::Exited)));
    }

    #[test]
    fn metadata_is_set_once() {
        let cache = StateCache::new();
        assert!(cache.set_metadata(StaticMetadata::default()));
        assert!(!cache.set_metadata(StaticMetadata::default()));
        assert!(cache.has_metadata());
    }

    #[tokio::test]
    async fn wait_state_sees_a_later_publish() {
        let cache = Arc::new(StateCache::new());
        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .wait_state(|s| s.frame >= 5, Duration::from_secs(2))
                    .await
            })
        };
        cache.set_state(snapshot(3, Stage::Ingame));
        cache.set_state(snapshot(6, Stage::Ingame));
        let snap = waiter.await.unwrap().unwrap();
        assert_eq!(snap.frame, 6);
    }

    #[tokio::test]
    async fn wait_state_times_out_distinctly() {
        let cache = StateCache::new();
        let started = std::time::Instant::now();
        let err = cache
            .wait_state(|_| false, Duration::from_millis(250))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(250));
        assert!(elapsed < Duration::from_millis(750));
    }

    #[test]
    fn object_query_filters_by_owner_and_type() {
        let cache = StateCache::new();
        let mut snap = snapshot(1, Stage::Ingame);
        snap.objects = vec![object(1, 100, 7), object(2, 100, 8), object(3, 200, 7)];
        cache.set_state(snap);

        let mine: Vec<_> = cache.query_objects(ObjectFilter::default().owner(7)).collect();
        assert_eq!(mine.len(), 2);
        let typed: Vec<_> = cache
            .query_objects(ObjectFilter::default().owner(7).type_handle(100))
            .collect();
        assert_eq!(typed.len(), 1);
        assert_eq!(typed[0].handle, 1);
    }

    #[test]
    fn query_iterates_the_snapshot_current_at_call_time() {
        let cache = StateCache::new();
        let mut snap = snapshot(1, Stage::Ingame);
        snap.objects = vec![object(1, 100, 7)];
        cache.set_state(snap);

        let query = cache.query_objects(ObjectFilter::default());
        // Replacing the state must not affect the running query.
        cache.set_state(snapshot(2, Stage::Ingame));
        assert_eq!(query.count(), 1);
    }

    #[test]
    fn current_player_is_the_session_participant() {
        let cache = StateCache::new();
        let mut snap = snapshot(1, Stage::Ingame);
        snap.players = vec![
            PlayerState {
                handle: 1,
                index: 0,
                name: "alpha".into(),
                current: false,
                credits: 0,
                defeated: false,
            },
            PlayerState {
                handle: 2,
                index: 1,
                name: "beta".into(),
                current: true,
                credits: 0,
                defeated: false,
            },
        ];
        cache.set_state(snap);
        assert_eq!(cache.current_player().unwrap().name, "beta");
    }
}
