use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Number of leptons (world coordinate units) along one cell edge.
pub const LEPTONS_PER_CELL: i32 = 256;

/// Coarse phase of the simulation session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Stage {
    #[default]
    Unknown,
    Loading,
    Ingame,
    Exited,
}

/// World position in leptons.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Coordinates {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Coordinates {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Cell index of this position (truncating division by the cell size).
    pub fn cell(&self) -> (i32, i32) {
        (self.x / LEPTONS_PER_CELL, self.y / LEPTONS_PER_CELL)
    }

    /// Center of the cell at the given cell index.
    pub fn from_cell(cx: i32, cy: i32) -> Self {
        Self {
            x: cx * LEPTONS_PER_CELL + LEPTONS_PER_CELL / 2,
            y: cy * LEPTONS_PER_CELL + LEPTONS_PER_CELL / 2,
            z: 0,
        }
    }
}

/// One simulation entity as captured in a snapshot.
///
/// `handle` is the raw numeric identity assigned by the host. It is unique
/// within a single snapshot only; a dead entity's handle may be reissued to
/// an unrelated entity later and the wire contract offers no generation
/// counter to tell the two apart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectState {
    pub handle: u64,
    pub type_handle: u64,
    pub owner: u64,
    pub coordinates: Coordinates,
    pub health: u32,
    pub deployed: bool,
    pub deploying: bool,
}

/// One production queue entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FactoryState {
    pub handle: u64,
    /// Handle of the object being produced.
    pub object: u64,
    /// Handle of the owning player.
    pub owner: u64,
    pub progress: u32,
    pub completed: bool,
}

/// One session participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerState {
    pub handle: u64,
    pub index: u32,
    pub name: String,
    /// True for the player this client session acts as.
    pub current: bool,
    pub credits: i64,
    pub defeated: bool,
}

/// Immutable whole-state capture of the simulation at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Snapshot {
    pub frame: u64,
    pub stage: Stage,
    pub objects: Vec<ObjectState>,
    pub factories: Vec<FactoryState>,
    pub players: Vec<PlayerState>,
}

impl Snapshot {
    /// Look up an entity by handle in this snapshot.
    pub fn object(&self, handle: u64) -> Option<&ObjectState> {
        self.objects.iter().find(|o| o.handle == handle)
    }

    /// Look up the factory producing the given object, if any.
    pub fn factory_for(&self, object: u64) -> Option<&FactoryState> {
        self.factories.iter().find(|f| f.object == object)
    }
}

/// Broad classification of an object type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TypeKind {
    #[default]
    Unknown,
    Building,
    Infantry,
    Vehicle,
    Aircraft,
}

/// Immutable type definition fetched once per session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypeClass {
    pub handle: u64,
    pub name: String,
    pub kind: TypeKind,
    pub array_index: u32,
    pub strength: u32,
    pub naval: bool,
    /// Buildings flagged as combat structures occupy the defense queue.
    pub combat_building: bool,
    /// Positive entries are type handles; negative entries name a
    /// prerequisite group (see [`PrerequisiteGroups::group_map`]).
    pub prerequisites: Vec<i32>,
    pub cost: i64,
    pub tech_level: i32,
}

/// Grouping tables for negative prerequisite ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PrerequisiteGroups {
    pub power: Vec<i32>,
    pub factory: Vec<i32>,
    pub barracks: Vec<i32>,
    pub radar: Vec<i32>,
    pub tech: Vec<i32>,
    pub proc: Vec<i32>,
}

impl PrerequisiteGroups {
    /// Map the negative group ids to their member sets.
    pub fn group_map(&self) -> HashMap<i32, HashSet<i32>> {
        let items: [(&Vec<i32>, i32); 6] = [
            (&self.power, -1),
            (&self.factory, -2),
            (&self.barracks, -3),
            (&self.radar, -4),
            (&self.tech, -5),
            (&self.proc, -6),
        ];
        items
            .into_iter()
            .map(|(members, id)| (id, members.iter().copied().collect()))
            .collect()
    }
}

/// Read-once catalog of type definitions and grouping tables.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StaticMetadata {
    pub type_classes: Vec<TypeClass>,
    pub prerequisite_groups: PrerequisiteGroups,
}

impl StaticMetadata {
    /// Index the type catalog by type handle.
    pub fn type_map(&self) -> HashMap<u64, TypeClass> {
        self.type_classes
            .iter()
            .map(|t| (t.handle, t.clone()))
            .collect()
    }
}
