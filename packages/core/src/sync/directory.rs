//! Account directory and family index
//!
//! The hub depends on these two repositories through traits so that storage
//! can change without touching routing. The in-memory implementations guard
//! their maps with one lock each, which makes registration and family
//! updates atomic.

use crate::codec::EncodedGraph;
use crate::error::{FamilyError, Result};
use crate::models::{MemberId, ValidationError};
use crate::sync::credentials::PasswordDigest;
use crate::sync::protocol::SignupRequest;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Registered user account
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub email: String,
    pub first_name: String,
    pub last_name: String,

    /// Member this account is represented by once it belongs to a family
    pub member_id: MemberId,

    password: PasswordDigest,
}

impl Account {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Canonical form of an account email
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Account registration and credential checks
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Create an account with a fresh member id
    ///
    /// # Errors
    ///
    /// - `Validation` if the email or password is empty
    /// - `Conflict` if the email is already registered
    async fn register(&self, request: SignupRequest) -> Result<Account>;

    /// Check credentials, returning the account on success
    ///
    /// Unknown emails and wrong passwords both yield `InvalidCredentials`.
    async fn authenticate(&self, email: &str, password: &str) -> Result<Account>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>>;
}

/// Which members belong to which family, and the latest graph of each family
#[async_trait]
pub trait FamilyIndex: Send + Sync {
    /// Whether the member appears in any registered family graph
    async fn is_associated(&self, member_id: &MemberId) -> Result<bool>;

    /// Latest graph of the member's family
    async fn family_graph(&self, member_id: &MemberId) -> Result<Option<EncodedGraph>>;

    /// Register a new family keyed by its root member
    ///
    /// Returns `false` without changing anything if the root is already part
    /// of a family.
    async fn register_family(&self, graph: EncodedGraph) -> Result<bool>;

    /// Store a newer graph of an existing or new family
    async fn record_update(&self, graph: EncodedGraph) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryAccountDirectory {
    accounts: RwLock<HashMap<String, Account>>,
}

impl InMemoryAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccountDirectory {
    async fn register(&self, request: SignupRequest) -> Result<Account> {
        let email = normalize_email(&request.email);
        if email.is_empty() {
            return Err(ValidationError::MissingField("email".to_string()).into());
        }
        if request.password.is_empty() {
            return Err(ValidationError::MissingField("password".to_string()).into());
        }

        // Checked again under the write lock; digesting happens without it
        if self.accounts.read().await.contains_key(&email) {
            return Err(already_registered(&email));
        }
        let password = PasswordDigest::create_blocking(request.password).await?;

        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&email) {
            return Err(already_registered(&email));
        }

        let account = Account {
            email: email.clone(),
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            member_id: MemberId::generate(),
            password,
        };
        accounts.insert(email, account.clone());
        debug!("Registered account {} as member {}", account.email, account.member_id);
        Ok(account)
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<Account> {
        let account = self
            .accounts
            .read()
            .await
            .get(&normalize_email(email))
            .cloned()
            .ok_or(FamilyError::InvalidCredentials)?;

        if account.password.matches_blocking(password.to_string()).await? {
            Ok(account)
        } else {
            Err(FamilyError::InvalidCredentials)
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        Ok(self
            .accounts
            .read()
            .await
            .get(&normalize_email(email))
            .cloned())
    }
}

fn already_registered(email: &str) -> FamilyError {
    FamilyError::conflict(format!("An account already exists for {}", email))
}

#[derive(Debug, Default)]
struct FamilyTables {
    /// Latest graph per family, keyed by root member
    graphs: HashMap<MemberId, EncodedGraph>,

    /// Member -> root of the family it belongs to
    membership: HashMap<MemberId, MemberId>,
}

impl FamilyTables {
    fn store(&mut self, root: MemberId, graph: EncodedGraph) {
        for member in &graph.members {
            self.membership.insert(member.id.clone(), root.clone());
        }
        self.graphs.insert(root, graph);
    }
}

fn root_id(graph: &EncodedGraph) -> Result<MemberId> {
    graph
        .root
        .and_then(|slot| graph.members.get(slot))
        .map(|m| m.id.clone())
        .ok_or_else(|| FamilyError::structural("family graph has no root member"))
}

#[derive(Debug, Default)]
pub struct InMemoryFamilyIndex {
    tables: RwLock<FamilyTables>,
}

impl InMemoryFamilyIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FamilyIndex for InMemoryFamilyIndex {
    async fn is_associated(&self, member_id: &MemberId) -> Result<bool> {
        Ok(self.tables.read().await.membership.contains_key(member_id))
    }

    async fn family_graph(&self, member_id: &MemberId) -> Result<Option<EncodedGraph>> {
        let tables = self.tables.read().await;
        Ok(tables
            .membership
            .get(member_id)
            .and_then(|root| tables.graphs.get(root))
            .cloned())
    }

    async fn register_family(&self, graph: EncodedGraph) -> Result<bool> {
        let root = root_id(&graph)?;

        let mut tables = self.tables.write().await;
        if tables.membership.contains_key(&root) {
            return Ok(false);
        }
        tables.store(root, graph);
        Ok(true)
    }

    async fn record_update(&self, graph: EncodedGraph) -> Result<()> {
        let root = root_id(&graph)?;
        self.tables.write().await.store(root, graph);
        Ok(())
    }
}
