//! Sync Hub - Server-side Message Routing
//!
//! Transport-independent router shared by every connection task as
//! `Arc<SyncHub>`. Each live session owns an unbounded outbound channel;
//! the transport drains it and writes frames. Messages from one sender to
//! one recipient are therefore delivered in order.
//!
//! Sessions are addressed by account email once the client announced
//! itself with `userOnline`. Messages for an account without a live session
//! are dropped, or reported back to the sender under
//! [`UndeliveredPolicy::Report`].

use crate::config::{DeclinePolicy, SyncConfig, UndeliveredPolicy};
use crate::error::{FamilyError, Result};
use crate::models::{MemberId, ValidationError};
use crate::sync::directory::{normalize_email, AccountDirectory, FamilyIndex};
use crate::sync::protocol::{
    AuthResponse, ClientMessage, FamilyUpdate, LoginRequest, PresenceStatus, ServerMessage,
    SignupRequest,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, instrument, warn};

pub type SessionId = u64;

#[derive(Debug)]
struct SessionEntry {
    tx: mpsc::UnboundedSender<ServerMessage>,
    account: Option<String>,
    member_id: Option<MemberId>,
}

#[derive(Debug, Default)]
struct Registry {
    sessions: HashMap<SessionId, SessionEntry>,

    /// Account email -> its live session
    online: HashMap<String, SessionId>,
}

pub struct SyncHub {
    accounts: Arc<dyn AccountDirectory>,
    families: Arc<dyn FamilyIndex>,
    config: SyncConfig,
    registry: RwLock<Registry>,
    next_session: AtomicU64,
}

impl SyncHub {
    pub fn new(
        accounts: Arc<dyn AccountDirectory>,
        families: Arc<dyn FamilyIndex>,
        config: SyncConfig,
    ) -> Self {
        Self {
            accounts,
            families,
            config,
            registry: RwLock::new(Registry::default()),
            next_session: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Register a new connection and return its outbound message stream
    pub async fn open_session(&self) -> (SessionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.registry.write().await.sessions.insert(
            id,
            SessionEntry {
                tx,
                account: None,
                member_id: None,
            },
        );
        debug!("🔌 Session {} opened", id);
        (id, rx)
    }

    /// Forget a connection; its account goes offline for everyone else
    pub async fn close_session(&self, session: SessionId) {
        let went_offline = {
            let mut registry = self.registry.write().await;
            let Some(entry) = registry.sessions.remove(&session) else {
                return;
            };
            match entry.account {
                Some(account) if registry.online.get(&account) == Some(&session) => {
                    registry.online.remove(&account);
                    Some(account)
                }
                _ => None,
            }
        };

        if let Some(account) = went_offline {
            info!("🔌 {} went offline", account);
            self.broadcast(
                None,
                ServerMessage::UserStatusChange {
                    email: account,
                    status: PresenceStatus::Offline,
                },
            )
            .await;
        } else {
            debug!("🔌 Session {} closed", session);
        }
    }

    /// Route one client message; failures are reported to the sender
    pub async fn handle(&self, session: SessionId, message: ClientMessage) {
        let event = message.event_name();
        if let Err(e) = self.route(session, message).await {
            warn!("❌ {} from session {} failed: {}", event, session, e);
            self.reject(session, &e).await;
        }
    }

    /// Tell a session that something it sent could not be processed
    pub async fn reject(&self, session: SessionId, err: &FamilyError) {
        self.send_to(session, ServerMessage::error(err)).await;
    }

    async fn route(&self, session: SessionId, message: ClientMessage) -> Result<()> {
        match message {
            ClientMessage::HandleConnection { member_id } => {
                self.handle_connection(session, member_id).await
            }
            ClientMessage::InitialDataRequest { member_id } => {
                let family_data = self.families.family_graph(&member_id).await?;
                self.send_to(session, ServerMessage::InitialData { family_data })
                    .await;
                Ok(())
            }
            ClientMessage::UserOnline { email } => self.user_online(session, email).await,
            ClientMessage::AskForOnlineUsers => {
                let users = self.online_accounts().await;
                self.send_to(session, ServerMessage::OnlineUsersList { users })
                    .await;
                Ok(())
            }
            ClientMessage::RequestToJoin {
                requester_email,
                target_email,
            } => {
                self.request_to_join(session, requester_email, target_email)
                    .await
            }
            ClientMessage::ShareFamilyData {
                from,
                target,
                family_data,
            } => {
                let from = self.bound_sender(session, &from).await?;
                let message = ServerMessage::ReceiveFamilyData { from, family_data };
                self.deliver(session, &target, message).await;
                Ok(())
            }
            ClientMessage::DeclineJoin { from, target } => {
                let from = self.bound_sender(session, &from).await?;
                match self.config.decline_policy {
                    DeclinePolicy::Notify => {
                        self.deliver(session, &target, ServerMessage::JoinDeclined { by: from })
                            .await;
                    }
                    DeclinePolicy::Silent => {
                        debug!("Suppressed decline notice from {} to {}", from, target);
                    }
                }
                Ok(())
            }
            ClientMessage::FamilyUpdate(update) => self.family_update(session, update).await,
            ClientMessage::CreateFamily { family_data } => {
                if !self.families.register_family(family_data).await? {
                    return Err(FamilyError::conflict("this family has already been created"));
                }
                info!("🚀 Family registered by session {}", session);
                Ok(())
            }
        }
    }

    #[instrument(skip(self))]
    async fn handle_connection(&self, session: SessionId, member_id: MemberId) -> Result<()> {
        let is_associated = self.families.is_associated(&member_id).await?;
        if let Some(entry) = self.registry.write().await.sessions.get_mut(&session) {
            entry.member_id = Some(member_id.clone());
        }
        self.send_to(
            session,
            ServerMessage::MemberStatus {
                is_associated,
                received_mem_id: member_id,
            },
        )
        .await;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn user_online(&self, session: SessionId, email: String) -> Result<()> {
        let email = normalize_email(&email);
        if email.is_empty() {
            return Err(ValidationError::MissingField("email".to_string()).into());
        }

        {
            let mut registry = self.registry.write().await;
            let Some(entry) = registry.sessions.get_mut(&session) else {
                return Ok(());
            };
            let previous = entry.account.replace(email.clone());
            if let Some(previous) = previous.filter(|p| *p != email) {
                if registry.online.get(&previous) == Some(&session) {
                    registry.online.remove(&previous);
                }
            }
            registry.online.insert(email.clone(), session);
        }

        info!("✅ {} is online", email);
        self.broadcast(
            Some(session),
            ServerMessage::UserStatusChange {
                email,
                status: PresenceStatus::Online,
            },
        )
        .await;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn request_to_join(
        &self,
        session: SessionId,
        requester: String,
        target: String,
    ) -> Result<()> {
        let requester = self.bound_sender(session, &requester).await?;
        if self.accounts.find_by_email(&target).await?.is_none() {
            return Err(FamilyError::account_not_found(target));
        }
        self.deliver(session, &target, ServerMessage::JoinRequest { from: requester })
            .await;
        Ok(())
    }

    #[instrument(skip(self, update), fields(from = %update.from, recipients = update.recipients.len()))]
    async fn family_update(&self, session: SessionId, update: FamilyUpdate) -> Result<()> {
        self.families.record_update(update.family_data.clone()).await?;

        let sender = normalize_email(&update.from);
        for recipient in &update.recipients {
            if normalize_email(recipient) == sender {
                continue;
            }
            self.deliver(session, recipient, ServerMessage::FamilyUpdate(update.clone()))
                .await;
        }
        Ok(())
    }

    /// Account bound to `session` by `userOnline`, which must be the one the
    /// message claims to come from
    async fn bound_sender(&self, session: SessionId, claimed: &str) -> Result<String> {
        let bound = self
            .registry
            .read()
            .await
            .sessions
            .get(&session)
            .and_then(|e| e.account.clone());

        match bound {
            Some(account) if account == normalize_email(claimed) => Ok(account),
            Some(account) => Err(FamilyError::protocol(format!(
                "session is signed in as {}, not {}",
                account, claimed
            ))),
            None => Err(FamilyError::protocol(
                "session has not announced its account with userOnline",
            )),
        }
    }

    /// Send to an account's live session, applying the undelivered policy
    async fn deliver(&self, sender: SessionId, account: &str, message: ServerMessage) {
        let target = self
            .registry
            .read()
            .await
            .online
            .get(&normalize_email(account))
            .copied();

        let delivered = match target {
            Some(target) => self.send_to(target, message.clone()).await,
            None => false,
        };
        if delivered {
            return;
        }

        match self.config.undelivered_policy {
            UndeliveredPolicy::Drop => {
                debug!("Dropped {} for offline account {}", message.event_name(), account);
            }
            UndeliveredPolicy::Report => {
                self.send_to(
                    sender,
                    ServerMessage::DeliveryFailed {
                        recipient: account.to_string(),
                        failed_event: message.event_name().to_string(),
                    },
                )
                .await;
            }
        }
    }

    /// Queue a message on one session; false if the session is gone
    async fn send_to(&self, session: SessionId, message: ServerMessage) -> bool {
        match self.registry.read().await.sessions.get(&session) {
            Some(entry) => entry.tx.send(message).is_ok(),
            None => false,
        }
    }

    async fn broadcast(&self, except: Option<SessionId>, message: ServerMessage) {
        let registry = self.registry.read().await;
        for (id, entry) in &registry.sessions {
            if Some(*id) != except {
                let _ = entry.tx.send(message.clone());
            }
        }
    }

    /// Accounts with a live session, sorted
    pub async fn online_accounts(&self) -> Vec<String> {
        let mut accounts: Vec<String> = self.registry.read().await.online.keys().cloned().collect();
        accounts.sort();
        accounts
    }

    pub async fn session_count(&self) -> usize {
        self.registry.read().await.sessions.len()
    }

    /// Member id announced by a session through `handleConnection`
    pub async fn session_member(&self, session: SessionId) -> Option<MemberId> {
        self.registry
            .read()
            .await
            .sessions
            .get(&session)
            .and_then(|e| e.member_id.clone())
    }

    pub async fn signup(&self, request: SignupRequest) -> Result<AuthResponse> {
        let account = self.accounts.register(request).await?;
        info!("✅ Account created for {}", account.email);
        Ok(AuthResponse {
            success: true,
            member_id: account.member_id,
        })
    }

    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse> {
        let account = self
            .accounts
            .authenticate(&request.email, &request.password)
            .await?;
        Ok(AuthResponse {
            success: true,
            member_id: account.member_id,
        })
    }
}

// Comprehensive tests in separate module
#[cfg(test)]
#[path = "hub_test.rs"]
mod hub_test;
