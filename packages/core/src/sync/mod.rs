//! Family Synchronization
//!
//! - [`protocol`] - Client and server message types
//! - [`session`] - Client-side state machine (join, merge, fan-out)
//! - [`hub`] - Server-side routing, presence and delivery policies
//! - [`directory`] - Account and family repositories used by the hub
//! - [`credentials`] - Password hashing

pub mod credentials;
pub mod directory;
pub mod hub;
pub mod protocol;
pub mod session;

pub use directory::{
    normalize_email, Account, AccountDirectory, FamilyIndex, InMemoryAccountDirectory,
    InMemoryFamilyIndex,
};
pub use hub::{SessionId, SyncHub};
pub use protocol::{
    AuthResponse, ChangeType, ClientMessage, FamilyUpdate, LoginRequest, PresenceStatus,
    ServerMessage, SignupRequest, JOIN_REQUEST_EVENT,
};
pub use session::{FamilySession, MemberAdded, SessionState};
