//! Typed builders for the application command surface.
//!
//! One explicit builder per request kind; no reflective field assignment.
//! The `spoof` parameter submits the action as if it came from another
//! session participant — the host validates it, the client only forwards.

use sim_wire::{ClientRequest, Coordinates, LEPTONS_PER_CELL};

pub fn get_state() -> ClientRequest {
    ClientRequest::GetState
}

pub fn get_initials() -> ClientRequest {
    ClientRequest::GetInitials
}

pub fn select(objects: Vec<u64>) -> ClientRequest {
    ClientRequest::Select {
        objects,
        spoof: None,
    }
}

pub fn move_to(objects: Vec<u64>, destination: Coordinates) -> ClientRequest {
    ClientRequest::MoveTo {
        objects,
        destination,
        spoof: None,
    }
}

pub fn deploy(object: u64) -> ClientRequest {
    ClientRequest::Deploy {
        object,
        spoof: None,
    }
}

pub fn deploy_as(object: u64, spoof: u64) -> ClientRequest {
    ClientRequest::Deploy {
        object,
        spoof: Some(spoof),
    }
}

pub fn sell(object: u64) -> ClientRequest {
    ClientRequest::Sell {
        object,
        spoof: None,
    }
}

pub fn sell_as(object: u64, spoof: u64) -> ClientRequest {
    ClientRequest::Sell {
        object,
        spoof: Some(spoof),
    }
}

pub fn produce(player_index: u32, type_kind: u32, heap_id: u32, naval: bool) -> ClientRequest {
    ClientRequest::Produce {
        player_index,
        type_kind,
        heap_id,
        naval,
        spoof: None,
    }
}

pub fn place_query(type_handle: u64, player: u64, cells: Vec<Coordinates>) -> ClientRequest {
    ClientRequest::PlaceQuery {
        type_handle,
        player,
        cells,
    }
}

pub fn place_structure(heap_id: u32, naval: bool, location: Coordinates) -> ClientRequest {
    ClientRequest::PlaceStructure {
        heap_id,
        naval,
        location,
        spoof: None,
    }
}

pub fn add_message(message: impl Into<String>, duration_frames: u32) -> ClientRequest {
    ClientRequest::AddMessage {
        message: message.into(),
        duration_frames,
    }
}

/// Candidate cells for a placement query: an `rx` by `ry` grid of cell
/// centers around `center`.
pub fn cell_grid(center: Coordinates, rx: i32, ry: i32) -> Vec<Coordinates> {
    let mut cells = Vec::with_capacity((rx * ry).max(0) as usize);
    for i in 0..rx {
        for j in 0..ry {
            cells.push(Coordinates::new(
                center.x + (i - rx / 2) * LEPTONS_PER_CELL,
                center.y + (j - ry / 2) * LEPTONS_PER_CELL,
                center.z,
            ));
        }
    }
    cells
}
