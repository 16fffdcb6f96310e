//! Member Attachment
//!
//! Splices a new member into an existing family graph. The default entry
//! point resolves attachment targets by display name, walking the graph with
//! the same id-based visited guard as the traversal engine. An id-keyed
//! variant is provided for callers that already know the exact targets.
//!
//! Every edge added here is written on both endpoints.

use crate::error::{FamilyError, Result};
use crate::graph::traversal::walk;
use crate::models::{FamilyGraph, Member, MemberId, Relationships, ValidationError};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Attach `new_member` to the members named in `child_of` / `parent_of`.
///
/// - For each visited member whose name equals an entry of `child_of`, the
///   member gains `new_member` as a child and `new_member` gains it as a
///   parent. The first equal entry is removed from `child_of`.
/// - `parent_of` is the mirror case: the visited member becomes a child of
///   `new_member`.
///
/// Each member is visited at most once, so it is attached at most once even
/// when its name is listed twice; the second entry stays in the list. Names
/// still present when the call returns matched nothing. When two members
/// share a name, the first one in traversal order wins.
///
/// If the graph has no root, `new_member` becomes the root. If the graph has
/// a root but no name matched, the graph is left unchanged.
///
/// Edges the new member already carries are dropped: only edges written here
/// reach the graph, and each is written on both endpoints.
///
/// Returns the (possibly new) root. The caller must ensure `new_member` is
/// not already part of the graph.
pub fn attach_member(
    graph: &mut FamilyGraph,
    mut new_member: Member,
    child_of: &mut Vec<String>,
    parent_of: &mut Vec<String>,
) -> Option<MemberId> {
    let new_id = new_member.id.clone();
    if !new_member.relationships.is_empty() {
        warn!("Dropping pre-existing edges of {} before attaching", new_id);
        new_member.relationships = Relationships::default();
    }

    let Some(root) = graph.root().cloned() else {
        debug!("Attaching {} as root of an empty graph", new_id);
        graph.insert(new_member);
        graph.set_root(Some(new_id.clone()));
        return Some(new_id);
    };

    // Collect matches first; the walk borrows the graph immutably
    let mut as_child_of = Vec::new();
    let mut as_parent_of = Vec::new();
    let mut visited = HashSet::from([new_id.clone()]);
    walk(graph, Some(&root), &mut visited, |member| {
        if let Some(pos) = child_of.iter().position(|name| *name == member.name) {
            child_of.remove(pos);
            as_child_of.push(member.id.clone());
        }
        if let Some(pos) = parent_of.iter().position(|name| *name == member.name) {
            parent_of.remove(pos);
            as_parent_of.push(member.id.clone());
        }
    });

    graph.insert(new_member);
    for parent in &as_child_of {
        if let Err(e) = graph.link_parent_child(parent, &new_id) {
            warn!("Skipping parent edge {} -> {}: {}", parent, new_id, e);
        }
    }
    for child in &as_parent_of {
        if let Err(e) = graph.link_parent_child(&new_id, child) {
            warn!("Skipping child edge {} -> {}: {}", new_id, child, e);
        }
    }

    if as_child_of.is_empty() && as_parent_of.is_empty() {
        debug!("No attachment target matched for {}", new_id);
        graph.remove_unlinked(&new_id);
    }

    Some(root)
}

/// Result of a validated attachment
#[derive(Debug, Clone, PartialEq)]
pub struct AttachOutcome {
    /// Root of the graph after the attachment
    pub root: Option<MemberId>,

    /// Id of the attached member
    pub member_id: MemberId,

    /// Requested `child_of` names that matched no member
    pub unmatched_child_of: Vec<String>,

    /// Requested `parent_of` names that matched no member
    pub unmatched_parent_of: Vec<String>,
}

/// Validated form of [`attach_member`] used by the synchronization session.
///
/// # Errors
///
/// Nothing is mutated when an error is returned:
/// - `Structural` if both target lists are empty
/// - `Validation` if the member is malformed, already in the graph, or
///   already carries edges
/// - `NotFound` if the graph has a root and none of the names matched
pub fn attach(
    graph: &mut FamilyGraph,
    new_member: Member,
    mut child_of: Vec<String>,
    mut parent_of: Vec<String>,
) -> Result<AttachOutcome> {
    if child_of.is_empty() && parent_of.is_empty() {
        return Err(FamilyError::structural(
            "a new member must be related to at least one existing member",
        ));
    }
    new_member.validate()?;
    if graph.has_member(&new_member.id) {
        return Err(ValidationError::DuplicateMember(new_member.id.to_string()).into());
    }
    if !new_member.relationships.is_empty() {
        return Err(ValidationError::AlreadyLinked(new_member.id.to_string()).into());
    }

    let member_id = new_member.id.clone();
    let requested = child_of.len() + parent_of.len();
    let had_root = graph.root().is_some();
    let root = attach_member(graph, new_member, &mut child_of, &mut parent_of);

    if had_root && !graph.has_member(&member_id) {
        let mut names = child_of.clone();
        names.extend(parent_of.iter().cloned());
        return Err(FamilyError::not_found("Relative", names.join(", ")));
    }

    debug!(
        "Attached {} ({} of {} targets matched)",
        member_id,
        requested - child_of.len() - parent_of.len(),
        requested
    );

    Ok(AttachOutcome {
        root,
        member_id,
        unmatched_child_of: child_of,
        unmatched_parent_of: parent_of,
    })
}

/// Attach `new_member` to members identified by id rather than by name.
///
/// All ids are resolved before any edge is written, so an unknown id leaves
/// the graph untouched.
///
/// # Errors
///
/// - `Structural` if both id lists are empty
/// - `Validation` if the member is malformed, already in the graph, or
///   already carries edges
/// - `NotFound` for the first id that is not in the graph
pub fn attach_member_by_id(
    graph: &mut FamilyGraph,
    new_member: Member,
    child_of: &[MemberId],
    parent_of: &[MemberId],
) -> Result<Option<MemberId>> {
    if child_of.is_empty() && parent_of.is_empty() {
        return Err(FamilyError::structural(
            "a new member must be related to at least one existing member",
        ));
    }
    new_member.validate()?;
    if graph.has_member(&new_member.id) {
        return Err(ValidationError::DuplicateMember(new_member.id.to_string()).into());
    }
    if !new_member.relationships.is_empty() {
        return Err(ValidationError::AlreadyLinked(new_member.id.to_string()).into());
    }
    if let Some(missing) = child_of
        .iter()
        .chain(parent_of.iter())
        .find(|id| !graph.has_member(id))
    {
        return Err(FamilyError::member_not_found(missing.as_str()));
    }

    let new_id = new_member.id.clone();
    graph.insert(new_member);

    let mut linked = HashSet::new();
    for parent in child_of {
        if linked.insert(("parent", parent.clone())) {
            graph.link_parent_child(parent, &new_id)?;
        }
    }
    for child in parent_of {
        if linked.insert(("child", child.clone())) {
            graph.link_parent_child(&new_id, child)?;
        }
    }

    Ok(graph.root().cloned())
}

// Comprehensive tests in separate module
#[cfg(test)]
#[path = "mutation_test.rs"]
mod mutation_test;
