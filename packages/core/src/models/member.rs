//! Member Data Structures
//!
//! This module defines the `Member` record, the node type of a family graph,
//! together with the factory used to build well-formed members from partial
//! input.
//!
//! # Architecture
//!
//! - **Stable identity**: every member carries a UUID v4 `MemberId` allocated once
//! - **Id-indexed edges**: relationships hold `MemberId`s, never embedded members
//! - **Optional account link**: members that belong to a signed-up user carry a `UserLink`
//!
//! # Examples
//!
//! ```rust
//! use kintree_core::models::{create_member, MemberDraft, UserLink};
//!
//! let alice = create_member(
//!     MemberDraft::named("Alice")
//!         .birthdate("1961-04-02")
//!         .user(UserLink::new("alice@example.com")),
//! );
//!
//! assert_eq!(alice.name, "Alice");
//! assert!(alice.relationships.children.is_empty());
//! assert_eq!(alice.email(), Some("alice@example.com"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Validation errors for Member operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid member ID format: {0}")]
    InvalidId(String),

    #[error("Member already present in family graph: {0}")]
    DuplicateMember(String),

    #[error("Unknown member attribute: {0}")]
    UnknownAttribute(String),

    #[error("No family data has been received to join")]
    NoStagedFamily,

    #[error("New member {0} already carries relationships")]
    AlreadyLinked(String),
}

/// Unique, stable identifier of a family member
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    /// Allocate a fresh identifier (UUID v4)
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an identifier received from the wire or from storage
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MemberId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Link between a member and a signed-up account
///
/// Only the account email and presence data travel with the graph. Credential
/// hashes stay in the server-side account directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLink {
    /// Account email, the key used for routing protocol messages
    pub email: String,

    /// Last known live session of the account, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default)]
    pub online: bool,
}

impl UserLink {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            session_id: None,
            online: false,
        }
    }
}

/// Partner record: a dated relationship to another member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    /// The partner member
    pub partner: MemberId,

    pub start_date: String,

    /// `None` while the relationship is ongoing
    pub end_date: Option<String>,
}

/// Adjacency lists of a member
///
/// `children` and `parents` are kept mirror images of each other across the
/// graph: if `a.children` holds `b`, then `b.parents` holds `a`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationships {
    #[serde(default)]
    pub partner: Vec<Relationship>,

    #[serde(default)]
    pub children: Vec<MemberId>,

    #[serde(default)]
    pub parents: Vec<MemberId>,
}

impl Relationships {
    pub fn is_empty(&self) -> bool {
        self.partner.is_empty() && self.children.is_empty() && self.parents.is_empty()
    }
}

/// One person in a family graph.
///
/// # Fields
///
/// - `id`: Unique identifier, stable for the member's lifetime
/// - `name`: Display name; also the key used by name-based attachment
/// - `birthdate` / `deathdate`: Free-form date strings (birthdate may be empty)
/// - `user`: Optional account link for members who signed up
/// - `relationships`: Partner records plus child/parent edge lists
/// - `created_at`: When the member was created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: MemberId,

    pub name: String,

    #[serde(default)]
    pub birthdate: String,

    #[serde(default)]
    pub deathdate: Option<String>,

    #[serde(default)]
    pub user: Option<UserLink>,

    #[serde(default)]
    pub relationships: Relationships,

    pub created_at: DateTime<Utc>,
}

impl Member {
    /// Account email of the member, if the member is linked to an account
    pub fn email(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.email.as_str())
    }

    pub fn has_child(&self, id: &MemberId) -> bool {
        self.relationships.children.contains(id)
    }

    pub fn has_parent(&self, id: &MemberId) -> bool {
        self.relationships.parents.contains(id)
    }

    pub fn has_partner(&self, id: &MemberId) -> bool {
        self.relationships.partner.iter().any(|r| &r.partner == id)
    }

    /// Validate the member record before it is wired into a graph
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if:
    /// - `id` is empty
    /// - `name` is empty or whitespace only
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.as_str().is_empty() {
            return Err(ValidationError::MissingField("id".to_string()));
        }

        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name".to_string()));
        }

        Ok(())
    }
}

/// Partial input for [`create_member`]
///
/// Every field is optional; missing fields take the factory defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberDraft {
    pub name: Option<String>,
    pub birthdate: Option<String>,
    pub deathdate: Option<String>,
    pub user: Option<UserLink>,
}

impl MemberDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn birthdate(mut self, birthdate: impl Into<String>) -> Self {
        self.birthdate = Some(birthdate.into());
        self
    }

    /// Set the deathdate; an empty string is treated as "still living"
    pub fn deathdate(mut self, deathdate: impl Into<String>) -> Self {
        let deathdate = deathdate.into();
        self.deathdate = if deathdate.is_empty() {
            None
        } else {
            Some(deathdate)
        };
        self
    }

    pub fn user(mut self, user: UserLink) -> Self {
        self.user = Some(user);
        self
    }
}

/// Build a member from partial input, allocating a fresh identifier.
///
/// Defaults: empty name, empty birthdate, no deathdate, no account link and
/// empty relationship collections. Never fails.
pub fn create_member(draft: MemberDraft) -> Member {
    Member {
        id: MemberId::generate(),
        name: draft.name.unwrap_or_default(),
        birthdate: draft.birthdate.unwrap_or_default(),
        deathdate: draft.deathdate,
        user: draft.user,
        relationships: Relationships::default(),
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_create_member_defaults() {
        let member = create_member(MemberDraft::default());

        assert!(!member.id.as_str().is_empty());
        assert_eq!(member.name, "");
        assert_eq!(member.birthdate, "");
        assert_eq!(member.deathdate, None);
        assert!(member.user.is_none());
        assert_eq!(member.relationships, Relationships::default());
    }

    #[test]
    fn test_create_member_allocates_unique_ids() {
        let ids: HashSet<MemberId> = (0..500)
            .map(|_| create_member(MemberDraft::default()).id)
            .collect();

        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn test_create_member_keeps_supplied_fields() {
        let member = create_member(
            MemberDraft::named("Carol")
                .birthdate("1990-01-01")
                .deathdate("")
                .user(UserLink::new("carol@example.com")),
        );

        assert_eq!(member.name, "Carol");
        assert_eq!(member.birthdate, "1990-01-01");
        assert_eq!(member.deathdate, None, "empty deathdate means living");
        assert_eq!(member.email(), Some("carol@example.com"));
    }

    #[test]
    fn test_validate_requires_name() {
        let member = create_member(MemberDraft::named("   "));

        assert_eq!(
            member.validate(),
            Err(ValidationError::MissingField("name".to_string()))
        );
        assert!(create_member(MemberDraft::named("Dan")).validate().is_ok());
    }

    #[test]
    fn test_member_json_uses_camel_case() {
        let member = create_member(MemberDraft::named("Eve").user(UserLink::new("eve@example.com")));
        let json = serde_json::to_value(&member).unwrap();

        assert!(json.get("createdAt").is_some());
        assert_eq!(json["user"]["email"], "eve@example.com");
        assert!(json["user"].get("sessionId").is_none());
        assert!(json["relationships"]["children"].as_array().unwrap().is_empty());
    }
}
