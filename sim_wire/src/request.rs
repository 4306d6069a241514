use serde::{Deserialize, Serialize};

use crate::state::{Coordinates, Snapshot, StaticMetadata};

/// Application command payloads.
///
/// These schemas are owned by the simulation host; the client core treats
/// them as a closed contract and never reinterprets their semantics. The
/// optional `spoof` field on event-like commands submits the action as if
/// it came from another session participant; validation happens entirely
/// server-side and the client passes the value through unmodified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ClientRequest {
    /// Fetch the current state snapshot.
    GetState,
    /// Fetch the read-once type catalog and grouping tables.
    GetInitials,
    Select {
        objects: Vec<u64>,
        spoof: Option<u64>,
    },
    MoveTo {
        objects: Vec<u64>,
        destination: Coordinates,
        spoof: Option<u64>,
    },
    Deploy {
        object: u64,
        spoof: Option<u64>,
    },
    Sell {
        object: u64,
        spoof: Option<u64>,
    },
    Produce {
        player_index: u32,
        type_kind: u32,
        heap_id: u32,
        naval: bool,
        spoof: Option<u64>,
    },
    PlaceQuery {
        type_handle: u64,
        player: u64,
        cells: Vec<Coordinates>,
    },
    PlaceStructure {
        heap_id: u32,
        naval: bool,
        location: Coordinates,
        spoof: Option<u64>,
    },
    AddMessage {
        message: String,
        duration_frames: u32,
    },
}

/// Typed result payloads, mirroring [`ClientRequest`] variants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ClientReply {
    State(Snapshot),
    Initials(StaticMetadata),
    /// Subset of queried cells where placement is allowed.
    PlaceLocations(Vec<Coordinates>),
    /// Command accepted; completion is observable only via later snapshots.
    Done,
}
