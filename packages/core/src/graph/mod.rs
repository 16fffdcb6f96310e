//! Graph Engines
//!
//! - [`traversal`] - Cycle-safe depth-first projection and lookups
//! - [`mutation`] - Attaching new members with bidirectional edges

pub mod mutation;
pub mod traversal;

pub use mutation::{attach, attach_member, attach_member_by_id, AttachOutcome};
pub use traversal::{
    accounts, collect_attributes, collect_attributes_from, contains, find_by_email, find_by_name,
    member_names, reachable_ids, MemberAttribute, Projection,
};
