//! Kintree Core Family Graph Layer
//!
//! This crate provides the family graph model, its traversal and mutation
//! engines, a reference-preserving encoding, and the protocol that keeps the
//! graphs of several family members in sync.
//!
//! # Architecture
//!
//! - **Arena Graph**: Members live in an id-keyed map; edges are id lists
//!   written on both endpoints
//! - **Cycle-safe Walks**: Every traversal carries an id-based visited set
//! - **Slot Encoding**: Shared members are emitted once and edges become slot
//!   indices, so cyclic graphs serialize to plain JSON
//! - **Sans-io Sessions**: The client session maps inbound messages to
//!   outbound ones; the hub routes between live connections
//!
//! # Modules
//!
//! - [`models`] - Members, identifiers and the family graph
//! - [`graph`] - Traversal, projection and member attachment
//! - [`codec`] - Encoding for storage and the wire
//! - [`store`] - Blob persistence of the local graph
//! - [`sync`] - Protocol messages, client session and server hub
//! - [`config`] - Sync settings and delivery policies
//! - [`error`] - Error taxonomy

pub mod codec;
pub mod config;
pub mod error;
pub mod graph;
pub mod models;
pub mod store;
pub mod sync;

// Re-export commonly used types
pub use config::{DeclinePolicy, SessionConfig, SyncConfig, UndeliveredPolicy};
pub use error::{FamilyError, Result};
pub use models::*;
pub use sync::{ClientMessage, FamilySession, ServerMessage, SyncHub};
