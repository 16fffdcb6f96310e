//! Client Family Session
//!
//! Sans-io state machine for one signed-in client. Inbound `ServerMessage`s
//! and local user actions go in, outbound `ClientMessage`s come out; the
//! caller owns the transport. Methods take `&mut self` and run to
//! completion, so the local graph is only ever touched from one place.
//!
//! # Join flow
//!
//! 1. `request_to_join(target)` → `requestToJoin`
//! 2. the target's session queues the request; `approve` → `shareFamilyData`
//! 3. `receiveFamilyData` stages the received graph (`staged()`)
//! 4. `complete_join(draft, child_of, parent_of)` attaches the user to the
//!    staged graph, adopts it, persists it and yields `familyUpdate`
//!
//! Persistence failures are logged and never undo an in-memory change.

use crate::codec;
use crate::config::{DeclinePolicy, SessionConfig};
use crate::error::{FamilyError, Result};
use crate::graph::{self, AttachOutcome};
use crate::models::{create_member, FamilyGraph, MemberDraft, MemberId, UserLink, ValidationError};
use crate::store::{self, BlobStore};
use crate::sync::protocol::{
    ChangeType, ClientMessage, FamilyUpdate, PresenceStatus, ServerMessage, JOIN_REQUEST_EVENT,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Connection and association state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    /// Connected, association not yet reported by the hub
    Connected,
    /// Connected, not part of any family
    Unassociated,
    /// Connected and part of a family
    Associated,
}

/// Result of adding a member to a graph
#[derive(Debug, Clone, PartialEq)]
pub struct MemberAdded {
    pub outcome: AttachOutcome,

    /// `familyUpdate` to send to the hub
    pub message: ClientMessage,
}

pub struct FamilySession {
    config: SessionConfig,
    store: Arc<dyn BlobStore>,
    state: SessionState,

    account: Option<String>,
    member_id: Option<MemberId>,

    local: FamilyGraph,
    to_merge: Option<FamilyGraph>,
    staged_from: Option<String>,

    pending_requests: VecDeque<String>,
    online_users: Vec<String>,
    outgoing_request: Option<String>,
    last_error: Option<(String, String)>,
}

impl FamilySession {
    pub fn new(store: Arc<dyn BlobStore>, config: SessionConfig) -> Self {
        Self {
            config,
            store,
            state: SessionState::Disconnected,
            account: None,
            member_id: None,
            local: FamilyGraph::new(),
            to_merge: None,
            staged_from: None,
            pending_requests: VecDeque::new(),
            online_users: Vec::new(),
            outgoing_request: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    pub fn member_id(&self) -> Option<&MemberId> {
        self.member_id.as_ref()
    }

    pub fn family(&self) -> &FamilyGraph {
        &self.local
    }

    /// Graph received through an approved join request, not yet merged
    pub fn staged(&self) -> Option<&FamilyGraph> {
        self.to_merge.as_ref()
    }

    /// Account that shared the staged graph
    pub fn staged_from(&self) -> Option<&str> {
        self.staged_from.as_deref()
    }

    /// Requesters awaiting a decision, oldest first
    pub fn pending_requests(&self) -> impl Iterator<Item = &str> {
        self.pending_requests.iter().map(String::as_str)
    }

    pub fn online_users(&self) -> &[String] {
        &self.online_users
    }

    /// Target of the join request still awaiting an answer
    pub fn outgoing_request(&self) -> Option<&str> {
        self.outgoing_request.as_deref()
    }

    /// Code and message of the last `error` received from the hub
    pub fn last_error(&self) -> Option<(&str, &str)> {
        self.last_error
            .as_ref()
            .map(|(code, msg)| (code.as_str(), msg.as_str()))
    }

    /// Load the persisted graph, if one was saved by an earlier run
    ///
    /// Returns whether a graph was restored.
    pub async fn restore(&mut self) -> Result<bool> {
        match store::load_graph(self.store.as_ref()).await? {
            Some(graph) => {
                info!("📂 Restored family graph with {} members", graph.len());
                self.local = graph;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Record the signed-in account; announces presence to the hub
    pub fn sign_in(&mut self, email: impl Into<String>, member_id: MemberId) -> Vec<ClientMessage> {
        let email = email.into();
        self.account = Some(email.clone());
        self.member_id = Some(member_id);
        vec![
            ClientMessage::UserOnline { email },
            ClientMessage::AskForOnlineUsers,
        ]
    }

    pub fn connect(&mut self, member_id: MemberId) -> ClientMessage {
        self.member_id = Some(member_id.clone());
        self.state = SessionState::Connected;
        ClientMessage::HandleConnection { member_id }
    }

    pub fn disconnect(&mut self) {
        self.state = SessionState::Disconnected;
        self.online_users.clear();
    }

    /// Apply one message from the hub, returning the replies to send
    pub async fn handle(&mut self, message: ServerMessage) -> Result<Vec<ClientMessage>> {
        if self.state == SessionState::Disconnected {
            return Err(FamilyError::protocol(format!(
                "received {} while disconnected",
                message.event_name()
            )));
        }

        match message {
            ServerMessage::MemberStatus {
                is_associated,
                received_mem_id,
            } => {
                if is_associated {
                    self.state = SessionState::Associated;
                    return Ok(vec![ClientMessage::InitialDataRequest {
                        member_id: received_mem_id,
                    }]);
                }
                self.state = SessionState::Unassociated;
            }

            ServerMessage::InitialData { family_data } => {
                if let Some(encoded) = family_data {
                    self.adopt(codec::decode(encoded)?).await;
                }
            }

            ServerMessage::JoinRequest { from } => {
                if !self.pending_requests.contains(&from) {
                    info!("📨 Join request from {}", from);
                    self.pending_requests.push_back(from);
                }
            }

            ServerMessage::ReceiveFamilyData { from, family_data } => {
                let graph = codec::decode(family_data)?;
                debug!("Staged family graph from {} ({} members)", from, graph.len());
                if self.outgoing_request.as_deref() == Some(from.as_str()) {
                    self.outgoing_request = None;
                }
                self.to_merge = Some(graph);
                self.staged_from = Some(from);
            }

            ServerMessage::FamilyUpdate(update) => {
                let graph = codec::decode(update.family_data)?;
                debug!("Family update from {} ({:?})", update.from, update.change_type);
                self.adopt(graph).await;
            }

            ServerMessage::UserStatusChange { email, status } => match status {
                PresenceStatus::Online => {
                    if !self.online_users.contains(&email) {
                        self.online_users.push(email);
                    }
                }
                PresenceStatus::Offline => self.online_users.retain(|e| *e != email),
            },

            ServerMessage::OnlineUsersList { users } => {
                self.online_users = users;
            }

            ServerMessage::JoinDeclined { by } => {
                info!("Join request declined by {}", by);
                if self.outgoing_request.as_deref() == Some(by.as_str()) {
                    self.outgoing_request = None;
                }
            }

            ServerMessage::DeliveryFailed {
                recipient,
                failed_event,
            } => {
                warn!("⚠️ {} to {} was not delivered", failed_event, recipient);
                if failed_event == JOIN_REQUEST_EVENT
                    && self.outgoing_request.as_deref() == Some(recipient.as_str())
                {
                    self.outgoing_request = None;
                }
            }

            ServerMessage::Error { code, message } => {
                warn!("❌ Hub error {}: {}", code, message);
                if code == "NOT_FOUND" {
                    self.outgoing_request = None;
                }
                self.last_error = Some((code, message));
            }
        }

        Ok(Vec::new())
    }

    /// Ask the owner of `target` to share their family
    pub fn request_to_join(&mut self, target: impl Into<String>) -> Result<ClientMessage> {
        let requester_email = self.require_account()?.to_string();
        let target_email = target.into();
        self.outgoing_request = Some(target_email.clone());
        Ok(ClientMessage::RequestToJoin {
            requester_email,
            target_email,
        })
    }

    /// Accept a pending request by sharing the local graph with the requester
    pub fn approve(&mut self, requester: &str) -> Result<ClientMessage> {
        let from = self.require_account()?.to_string();
        self.take_pending(requester)?;
        info!("✅ Sharing family data with {}", requester);
        Ok(ClientMessage::ShareFamilyData {
            from,
            target: requester.to_string(),
            family_data: codec::encode(&self.local),
        })
    }

    /// Refuse a pending request; only tells the requester under `Notify`
    pub fn decline(&mut self, requester: &str) -> Result<Option<ClientMessage>> {
        let from = self.require_account()?.to_string();
        self.take_pending(requester)?;
        match self.config.decline_policy {
            DeclinePolicy::Silent => Ok(None),
            DeclinePolicy::Notify => Ok(Some(ClientMessage::DeclineJoin {
                from,
                target: requester.to_string(),
            })),
        }
    }

    /// Drop the staged graph without merging
    pub fn discard_staged(&mut self) {
        self.to_merge = None;
        self.staged_from = None;
    }

    /// Names the user can relate themselves to in the staged graph
    pub fn candidate_names(&self) -> Vec<String> {
        self.to_merge
            .as_ref()
            .map(graph::member_names)
            .unwrap_or_default()
    }

    /// Join the staged family as a new member
    ///
    /// # Errors
    ///
    /// Session state is unchanged on error:
    /// - `Validation` when no graph is staged or the draft has no name
    /// - `Structural` when both relationship lists are empty
    /// - `NotFound` when no requested name exists in the staged graph
    /// - `Protocol` when no account is signed in
    pub async fn complete_join(
        &mut self,
        draft: MemberDraft,
        child_of: Vec<String>,
        parent_of: Vec<String>,
    ) -> Result<MemberAdded> {
        let mut staged = self
            .to_merge
            .clone()
            .ok_or(ValidationError::NoStagedFamily)?;
        let email = self.require_account()?.to_string();
        let member_id = self
            .member_id
            .clone()
            .ok_or_else(|| FamilyError::protocol("no member id for this session"))?;

        let mut member = create_member(draft);
        member.id = member_id;
        member.user = Some(UserLink::new(email.clone()));

        let outcome = graph::attach(&mut staged, member, child_of, parent_of)?;
        self.warn_unmatched(&outcome);

        self.discard_staged();
        self.adopt(staged).await;
        info!("✅ Joined family as {}", outcome.member_id);

        let message = self.family_update(email, ChangeType::JoinFamily);
        Ok(MemberAdded { outcome, message })
    }

    /// Add a relative without an account to the local family
    ///
    /// # Errors
    ///
    /// Same as [`complete_join`](Self::complete_join), with `Protocol` when
    /// the session is not associated with a family.
    pub async fn add_member(
        &mut self,
        draft: MemberDraft,
        child_of: Vec<String>,
        parent_of: Vec<String>,
    ) -> Result<MemberAdded> {
        let email = self.require_account()?.to_string();
        if self.local.root().is_none() {
            return Err(FamilyError::protocol(
                "cannot add a member before joining or creating a family",
            ));
        }

        let mut member = create_member(draft);
        member.user = None;

        let mut updated = self.local.clone();
        let outcome = graph::attach(&mut updated, member, child_of, parent_of)?;
        self.warn_unmatched(&outcome);
        self.adopt(updated).await;
        info!("✅ Added member {}", outcome.member_id);

        let message = self.family_update(email, ChangeType::AddMember);
        Ok(MemberAdded { outcome, message })
    }

    /// Start a new family with the signed-in user as its root
    pub async fn create_family(&mut self, draft: MemberDraft) -> Result<ClientMessage> {
        let email = self.require_account()?.to_string();
        let member_id = self
            .member_id
            .clone()
            .ok_or_else(|| FamilyError::protocol("no member id for this session"))?;
        if !self.local.is_empty() {
            return Err(FamilyError::conflict("this session already has a family"));
        }

        let mut member = create_member(draft);
        member.id = member_id;
        member.user = Some(UserLink::new(email));
        member.validate()?;

        self.adopt(FamilyGraph::with_root(member)).await;
        info!("🚀 Created a new family");
        Ok(ClientMessage::CreateFamily {
            family_data: codec::encode(&self.local),
        })
    }

    fn require_account(&self) -> Result<&str> {
        self.account
            .as_deref()
            .ok_or_else(|| FamilyError::protocol("no account is signed in"))
    }

    fn take_pending(&mut self, requester: &str) -> Result<String> {
        let pos = self
            .pending_requests
            .iter()
            .position(|r| r == requester)
            .ok_or_else(|| FamilyError::not_found("Join request", requester))?;
        self.pending_requests
            .remove(pos)
            .ok_or_else(|| FamilyError::not_found("Join request", requester))
    }

    fn family_update(&self, from: String, change_type: ChangeType) -> ClientMessage {
        let recipients = graph::accounts(&self.local)
            .into_iter()
            .filter(|email| *email != from)
            .collect();
        ClientMessage::FamilyUpdate(FamilyUpdate {
            from,
            recipients,
            family_data: codec::encode(&self.local),
            change_type,
        })
    }

    fn warn_unmatched(&self, outcome: &AttachOutcome) {
        if !outcome.unmatched_child_of.is_empty() || !outcome.unmatched_parent_of.is_empty() {
            warn!(
                "⚠️ Unmatched relatives: child of {:?}, parent of {:?}",
                outcome.unmatched_child_of, outcome.unmatched_parent_of
            );
        }
    }

    /// Replace the local graph and persist it
    async fn adopt(&mut self, graph: FamilyGraph) {
        self.local = graph;
        if self.state != SessionState::Disconnected {
            self.state = SessionState::Associated;
        }
        if let Err(e) = store::save_graph(self.store.as_ref(), &self.local).await {
            error!("❌ Failed to persist family data: {}", e);
        }
    }
}

// Comprehensive tests in separate module
#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;
