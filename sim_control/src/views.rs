//! Live cursors over entities in the snapshot cache.
//!
//! A view wraps the handle captured at construction and re-resolves it
//! against the current snapshot on first use per frame. Once the entity is
//! absent from a snapshot the view is permanently invalid; a later entity
//! that happens to reuse the same handle never resurrects it, because the
//! wire contract offers no generation counter to tell the two apart.
//! Resolution is a linear scan per refresh, accepted at the entity counts
//! and poll rates this client targets.

use std::sync::Arc;

use sim_wire::{FactoryState, ObjectState, TypeClass};

use crate::state::StateCache;

pub struct ObjectView {
    cache: Arc<StateCache>,
    current: ObjectState,
    latest_frame: Option<u64>,
    invalid: bool,
}

impl ObjectView {
    pub fn new(cache: Arc<StateCache>, object: ObjectState) -> Self {
        Self {
            cache,
            current: object,
            latest_frame: None,
            invalid: false,
        }
    }

    pub fn handle(&self) -> u64 {
        self.current.handle
    }

    fn refresh(&mut self) {
        if self.invalid {
            return;
        }
        let snapshot = self.cache.current();
        if self.latest_frame == Some(snapshot.frame) {
            return;
        }
        match snapshot.object(self.current.handle) {
            Some(object) => {
                self.current = object.clone();
                self.latest_frame = Some(snapshot.frame);
            }
            None => self.invalid = true,
        }
    }

    /// Sticky invalidation check; callers test this before dereferencing.
    pub fn invalid(&mut self) -> bool {
        self.refresh();
        self.invalid
    }

    /// Latest data for the entity, or `None` once invalid.
    pub fn get(&mut self) -> Option<&ObjectState> {
        self.refresh();
        if self.invalid {
            None
        } else {
            Some(&self.current)
        }
    }

    /// Type definition of the entity, once metadata is available.
    pub fn type_class(&self) -> Option<TypeClass> {
        self.cache
            .metadata()
            .and_then(|m| m.type_class(self.current.type_handle).cloned())
    }

    /// Health as a fraction of the type's strength.
    pub fn health_ratio(&mut self) -> Option<f64> {
        let tc = self.type_class()?;
        let object = self.get()?;
        if tc.strength == 0 {
            return None;
        }
        Some(f64::from(object.health) / f64::from(tc.strength))
    }
}

/// View over one production queue row, keyed by the object it produces.
pub struct FactoryView {
    cache: Arc<StateCache>,
    current: FactoryState,
    latest_frame: Option<u64>,
    invalid: bool,
}

impl FactoryView {
    pub fn new(cache: Arc<StateCache>, factory: FactoryState) -> Self {
        Self {
            cache,
            current: factory,
            latest_frame: None,
            invalid: false,
        }
    }

    fn refresh(&mut self) {
        if self.invalid {
            return;
        }
        let snapshot = self.cache.current();
        if self.latest_frame == Some(snapshot.frame) {
            return;
        }
        match snapshot.factory_for(self.current.object) {
            Some(factory) => {
                self.current = factory.clone();
                self.latest_frame = Some(snapshot.frame);
            }
            None => self.invalid = true,
        }
    }

    pub fn invalid(&mut self) -> bool {
        self.refresh();
        self.invalid
    }

    pub fn get(&mut self) -> Option<&FactoryState> {
        self.refresh();
        if self.invalid {
            None
        } else {
            Some(&self.current)
        }
    }

    /// View over the object this factory is producing.
    pub fn product(&self) -> ObjectView {
        let object = self
            .cache
            .current()
            .object(self.current.object)
            .cloned()
            .unwrap_or(ObjectState {
                handle: self.current.object,
                type_handle: 0,
                owner: self.current.owner,
                coordinates: Default::default(),
                health: 0,
                deployed: false,
                deploying: false,
            });
        ObjectView::new(self.cache.clone(), object)
    }
}
