//! Wire contract for the remote simulation control protocol.
//!
//! This crate owns the data contracts exchanged with the simulation host:
//! the state snapshot model, the command/poll envelope, and the typed
//! application request/reply payloads. It deliberately has no networking of
//! its own; `sim_control` layers transports and client loops on top of the
//! types defined here.

mod codec;
mod envelope;
mod request;
mod state;

pub use codec::{decode, encode, encode_json, WireError};
pub use envelope::{
    Ack, CommandResult, Envelope, EnvelopeKind, PollArgs, PollBatch, ResponseCode, WireResponse,
};
pub use request::{ClientReply, ClientRequest};
pub use state::{
    Coordinates, FactoryState, ObjectState, PlayerState, PrerequisiteGroups, Snapshot, Stage,
    StaticMetadata, TypeClass, TypeKind, LEPTONS_PER_CELL,
};
