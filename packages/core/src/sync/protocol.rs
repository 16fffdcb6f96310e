//! Sync Protocol Messages
//!
//! Every message is a JSON object internally tagged by `event`, with
//! camelCase fields merged flat next to the tag:
//!
//! ```json
//! {"event":"requestToJoin","requesterEmail":"b@x.org","targetEmail":"a@x.org"}
//! ```
//!
//! `ClientMessage` flows from a client session to the hub, `ServerMessage`
//! from the hub to a client session. Family graphs always travel in their
//! reference-preserving [`EncodedGraph`] form.

use crate::codec::EncodedGraph;
use crate::models::MemberId;
use serde::{Deserialize, Serialize};

/// Kind of change carried by a `familyUpdate`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeType {
    /// A relative was added by an associated member
    AddMember,
    /// A new account joined through an approved request
    JoinFamily,
}

/// Full-graph update fanned out to the other accounts of a family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyUpdate {
    /// Account email of the sender
    pub from: String,

    /// Account emails to deliver to; never contains `from`
    pub recipients: Vec<String>,

    pub family_data: EncodedGraph,

    #[serde(rename = "type")]
    pub change_type: ChangeType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// Messages sent by a client session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Announce which member this connection belongs to
    #[serde(rename_all = "camelCase")]
    HandleConnection { member_id: MemberId },

    /// Ask for the family graph of an associated member
    #[serde(rename_all = "camelCase")]
    InitialDataRequest { member_id: MemberId },

    /// Bind an account to this connection for presence and routing
    UserOnline { email: String },

    AskForOnlineUsers,

    #[serde(rename_all = "camelCase")]
    RequestToJoin {
        requester_email: String,
        target_email: String,
    },

    /// Approval: send the local graph to the requester
    #[serde(rename_all = "camelCase")]
    ShareFamilyData {
        from: String,
        target: String,
        family_data: EncodedGraph,
    },

    /// Explicit refusal, only sent under the notify decline policy
    DeclineJoin { from: String, target: String },

    FamilyUpdate(FamilyUpdate),

    /// Register a freshly created family with the hub
    #[serde(rename_all = "camelCase")]
    CreateFamily { family_data: EncodedGraph },
}

impl ClientMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::HandleConnection { .. } => "handleConnection",
            Self::InitialDataRequest { .. } => "initialDataRequest",
            Self::UserOnline { .. } => "userOnline",
            Self::AskForOnlineUsers => "askForOnlineUsers",
            Self::RequestToJoin { .. } => "requestToJoin",
            Self::ShareFamilyData { .. } => "shareFamilyData",
            Self::DeclineJoin { .. } => "declineJoin",
            Self::FamilyUpdate(_) => "familyUpdate",
            Self::CreateFamily { .. } => "createFamily",
        }
    }
}

/// Event name of [`ServerMessage::JoinRequest`]
pub const JOIN_REQUEST_EVENT: &str = "joinRequest";

/// Messages sent by the hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    MemberStatus {
        is_associated: bool,
        received_mem_id: MemberId,
    },

    /// Family graph of the member, `null` when there is none
    #[serde(rename_all = "camelCase")]
    InitialData { family_data: Option<EncodedGraph> },

    /// Someone asks to join the recipient's family
    JoinRequest { from: String },

    #[serde(rename_all = "camelCase")]
    ReceiveFamilyData {
        from: String,
        family_data: EncodedGraph,
    },

    FamilyUpdate(FamilyUpdate),

    UserStatusChange {
        email: String,
        status: PresenceStatus,
    },

    OnlineUsersList { users: Vec<String> },

    JoinDeclined { by: String },

    /// A message could not be delivered because the recipient is offline
    #[serde(rename_all = "camelCase")]
    DeliveryFailed {
        recipient: String,
        /// Event name of the undelivered message
        failed_event: String,
    },

    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::MemberStatus { .. } => "memberStatus",
            Self::InitialData { .. } => "initialData",
            Self::JoinRequest { .. } => JOIN_REQUEST_EVENT,
            Self::ReceiveFamilyData { .. } => "receiveFamilyData",
            Self::FamilyUpdate(_) => "familyUpdate",
            Self::UserStatusChange { .. } => "userStatusChange",
            Self::OnlineUsersList { .. } => "onlineUsersList",
            Self::JoinDeclined { .. } => "joinDeclined",
            Self::DeliveryFailed { .. } => "deliveryFailed",
            Self::Error { .. } => "error",
        }
    }

    pub fn error(err: &crate::error::FamilyError) -> Self {
        Self::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// `POST /signup` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

/// `POST /login` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response to signup and login
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub success: bool,
    pub member_id: MemberId,
}
