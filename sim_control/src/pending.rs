//! Tracking of issued-but-unconfirmed commands.
//!
//! The host acknowledges a command long before its effect lands in the
//! simulation; the only evidence of completion is a later, unrelated
//! snapshot. Each pending action is one variant of a closed set of kinds,
//! carries the frame it was submitted at, a kind-specific completion
//! predicate evaluated against the current snapshot, a dedup key, and a
//! frame-count deadline after which it is force-completed as abandoned.

use std::collections::HashMap;

use tracing::warn;

use sim_wire::{Coordinates, Snapshot, TypeClass, TypeKind};

use crate::state::SessionMetadata;

/// Default deadline in frames before a pending action is abandoned.
pub const DEFAULT_DEADLINE: u64 = 60;

/// Production queue category a type occupies. Two types in the same
/// category share one queue slot per player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProduceCategory {
    Building,
    Defense,
    Infantry,
    Tank,
    Naval,
    Aircraft,
}

impl ProduceCategory {
    pub fn of(tc: &TypeClass) -> Option<Self> {
        match tc.kind {
            TypeKind::Building => {
                if tc.combat_building {
                    Some(Self::Defense)
                } else {
                    Some(Self::Building)
                }
            }
            _ if tc.naval => Some(Self::Naval),
            TypeKind::Infantry => Some(Self::Infantry),
            TypeKind::Vehicle => Some(Self::Tank),
            TypeKind::Aircraft => Some(Self::Aircraft),
            TypeKind::Unknown => None,
        }
    }
}

/// Identity of a pending intent, used to reject duplicate submissions
/// while one with the same key is still outstanding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKey {
    Place { object: u64 },
    Produce { type_handle: u64, player: u64 },
    Deploy { object: u64 },
    Move { object: u64 },
}

#[derive(Debug, Clone)]
enum ActionKind {
    /// Structure built and waiting for placement; complete once no factory
    /// row references the finished object.
    PlaceStructure { object: u64 },
    /// Production request; complete once a factory of the requested
    /// category is busy for the player, or an object of the requested type
    /// is being produced.
    BeginProduction { type_handle: u64, player: u64 },
    /// Deploy order; complete once the object reports deploying/deployed.
    DeployUnit { object: u64 },
    /// Move order; complete once the object halts within one cell of the
    /// target or disappears.
    Move { object: u64, target: Coordinates },
}

#[derive(Debug, Clone)]
pub struct PendingAction {
    kind: ActionKind,
    submitted_frame: u64,
    deadline: u64,
}

impl PendingAction {
    pub fn place_structure(submitted: &Snapshot, object: u64, deadline: u64) -> Self {
        Self {
            kind: ActionKind::PlaceStructure { object },
            submitted_frame: submitted.frame,
            deadline,
        }
    }

    pub fn begin_production(submitted: &Snapshot, type_handle: u64, player: u64) -> Self {
        Self {
            kind: ActionKind::BeginProduction {
                type_handle,
                player,
            },
            submitted_frame: submitted.frame,
            deadline: DEFAULT_DEADLINE,
        }
    }

    pub fn deploy_unit(submitted: &Snapshot, object: u64) -> Self {
        Self {
            kind: ActionKind::DeployUnit { object },
            submitted_frame: submitted.frame,
            deadline: DEFAULT_DEADLINE,
        }
    }

    pub fn move_object(submitted: &Snapshot, object: u64, target: Coordinates) -> Self {
        Self {
            kind: ActionKind::Move { object, target },
            submitted_frame: submitted.frame,
            deadline: DEFAULT_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: u64) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn submitted_frame(&self) -> u64 {
        self.submitted_frame
    }

    pub fn dedup_key(&self) -> ActionKey {
        match self.kind {
            ActionKind::PlaceStructure { object } => ActionKey::Place { object },
            ActionKind::BeginProduction {
                type_handle,
                player,
            } => ActionKey::Produce {
                type_handle,
                player,
            },
            ActionKind::DeployUnit { object } => ActionKey::Deploy { object },
            ActionKind::Move { object, .. } => ActionKey::Move { object },
        }
    }

    /// Identity equality by dedup key; frames and deadlines do not matter.
    pub fn equals(&self, other: &PendingAction) -> bool {
        self.dedup_key() == other.dedup_key()
    }

    /// Evaluate completion against the current snapshot, never the
    /// submission snapshot. An action older than its deadline is
    /// force-completed and treated as abandoned.
    pub fn is_completed(&self, current: &Snapshot, metadata: Option<&SessionMetadata>) -> bool {
        if current.frame.saturating_sub(self.submitted_frame) > self.deadline {
            warn!(
                kind = ?self.kind,
                submitted = self.submitted_frame,
                frame = current.frame,
                "pending action expired, treating as abandoned"
            );
            return true;
        }
        match &self.kind {
            ActionKind::PlaceStructure { object } => current.factory_for(*object).is_none(),
            ActionKind::BeginProduction {
                type_handle,
                player,
            } => production_started(current, metadata, *type_handle, *player),
            ActionKind::DeployUnit { object } => current
                .object(*object)
                .map(|o| o.deploying || o.deployed)
                .unwrap_or(false),
            ActionKind::Move { object, target } => match current.object(*object) {
                Some(o) => within_one_cell(o.coordinates, *target),
                None => true,
            },
        }
    }
}

/// Chebyshev cell distance of at most one; units halt in a neighboring
/// cell when the exact destination is occupied.
fn within_one_cell(position: Coordinates, target: Coordinates) -> bool {
    let (px, py) = position.cell();
    let (tx, ty) = target.cell();
    (px - tx).abs() <= 1 && (py - ty).abs() <= 1
}

fn production_started(
    current: &Snapshot,
    metadata: Option<&SessionMetadata>,
    type_handle: u64,
    player: u64,
) -> bool {
    // Without the type catalog neither the category nor the type identity
    // of queued objects can be resolved.
    let Some(meta) = metadata else {
        return false;
    };
    let Some(requested) = meta.type_class(type_handle) else {
        return false;
    };
    let requested_category = ProduceCategory::of(requested);

    for factory in current.factories.iter().filter(|f| f.owner == player) {
        let Some(tc) = current
            .object(factory.object)
            .and_then(|o| meta.type_class(o.type_handle))
        else {
            continue;
        };
        if requested_category.is_some() && ProduceCategory::of(tc) == requested_category {
            return true;
        }
        if tc.kind == requested.kind && tc.array_index == requested.array_index {
            return true;
        }
    }
    false
}

/// The set of currently outstanding intents, swept once per processed
/// snapshot.
#[derive(Default)]
pub struct ActionTracker {
    actions: Vec<PendingAction>,
}

impl ActionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new intent. Returns false (and drops the action) when one
    /// with the same dedup key is already outstanding.
    pub fn enqueue(&mut self, action: PendingAction) -> bool {
        if self.actions.iter().any(|a| a.equals(&action)) {
            return false;
        }
        self.actions.push(action);
        true
    }

    /// Drop every completed or expired action; retain the rest.
    pub fn sweep(&mut self, current: &Snapshot, metadata: Option<&SessionMetadata>) {
        self.actions
            .retain(|action| !action.is_completed(current, metadata));
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingAction> {
        self.actions.iter()
    }
}

/// Frame-count rate gate so callers do not re-issue an intent every poll
/// cycle.
#[derive(Default)]
pub struct ActionThrottle {
    rules: HashMap<String, u64>,
    last: HashMap<String, u64>,
}

impl ActionThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: impl Into<String>, frames: u64) {
        let key = key.into();
        self.rules.insert(key.clone(), frames);
        self.last.insert(key, 0);
    }

    /// True when at least the registered number of frames passed since the
    /// last time this key proceeded; advances the gate when so.
    pub fn ready(&mut self, key: &str, current_frame: u64) -> bool {
        let Some(&frames) = self.rules.get(key) else {
            return false;
        };
        let last = self.last.get(key).copied().unwrap_or(0);
        if current_frame.saturating_sub(last) > frames {
            self.last.insert(key.to_string(), current_frame);
            return true;
        }
        false
    }
}
