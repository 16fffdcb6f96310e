//! Data Models
//!
//! This module contains the family data structures:
//!
//! - `Member` - One person, with id-indexed parent/child/partner edges
//! - `FamilyGraph` - Arena of members with a designated root
//! - `create_member` - Factory that fills defaults and allocates ids

mod family;
mod member;

pub use family::FamilyGraph;
pub use member::{
    create_member, Member, MemberDraft, MemberId, Relationship, Relationships, UserLink,
    ValidationError,
};
