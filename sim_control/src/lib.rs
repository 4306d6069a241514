//! Client library for remotely driving and observing a live simulation.
//!
//! The simulation host is an externally owned process reachable only
//! through periodic polling. This crate provides request/response semantics
//! on top of that poll-only transport: framed transports, strict 1:1
//! request/response channels, a dual-channel client with result
//! correlation, a snapshot cache with change notification, live entity
//! views, and a tracker that infers command completion from later
//! snapshots.

pub mod channel;
pub mod client;
pub mod commands;
pub mod error;
pub mod manager;
pub mod pending;
pub mod state;
pub mod store;
pub mod transport;
pub mod views;

pub use client::{DualClient, Endpoint};
pub use error::{ClientError, Result};
pub use manager::{Manager, ManagerConfig, StepFn};
pub use pending::{ActionThrottle, ActionTracker, PendingAction};
pub use state::{FactoryQuery, ObjectFilter, ObjectQuery, SessionMetadata, StateCache};
pub use store::ResultStore;
pub use views::{FactoryView, ObjectView};
