//! Cycle-safe Traversal and Projection
//!
//! Depth-first, pre-order walk from a root member over `children` then
//! `parents`. A visited set of member ids is checked before a member's
//! neighbours are expanded, so every reachable member is projected exactly
//! once however cyclic the graph is. Partner edges are not followed.
//!
//! The walk uses an explicit stack (deep lineages must not overflow the call
//! stack); popping the stack in LIFO order gives the same visitation order
//! as the recursive formulation.

use crate::error::FamilyError;
use crate::models::{FamilyGraph, Member, MemberId, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::str::FromStr;

/// Attributes that can be projected out of a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemberAttribute {
    Id,
    Name,
    Birthdate,
    Deathdate,
    /// Account email from the member's user link
    Email,
    /// Presence flag from the member's user link
    Online,
}

impl MemberAttribute {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Birthdate => "birthdate",
            Self::Deathdate => "deathdate",
            Self::Email => "email",
            Self::Online => "online",
        }
    }

    fn project(&self, member: &Member) -> Value {
        match self {
            Self::Id => Value::String(member.id.to_string()),
            Self::Name => Value::String(member.name.clone()),
            Self::Birthdate => Value::String(member.birthdate.clone()),
            Self::Deathdate => member
                .deathdate
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
            Self::Email => member
                .email()
                .map(|e| Value::String(e.to_string()))
                .unwrap_or(Value::Null),
            Self::Online => Value::Bool(member.user.as_ref().is_some_and(|u| u.online)),
        }
    }
}

impl FromStr for MemberAttribute {
    type Err = FamilyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(Self::Id),
            "name" => Ok(Self::Name),
            "birthdate" => Ok(Self::Birthdate),
            "deathdate" => Ok(Self::Deathdate),
            "email" | "user" => Ok(Self::Email),
            "online" => Ok(Self::Online),
            other => Err(ValidationError::UnknownAttribute(other.to_string()).into()),
        }
    }
}

/// Requested attributes of one visited member
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    /// Id of the projected member, always present
    pub member_id: MemberId,

    /// Requested attribute values keyed by `MemberAttribute::key`
    pub values: Map<String, Value>,
}

impl Projection {
    pub fn get(&self, attribute: MemberAttribute) -> Option<&Value> {
        self.values.get(attribute.key())
    }

    /// String value of an attribute, `None` when absent or null
    pub fn text(&self, attribute: MemberAttribute) -> Option<&str> {
        self.get(attribute).and_then(Value::as_str)
    }
}

/// Project `attributes` of every member reachable from `root`.
///
/// Returns one record per distinct member in depth-first pre-order. A `None`
/// root, or a root missing from the arena, yields an empty sequence.
pub fn collect_attributes(
    graph: &FamilyGraph,
    root: Option<&MemberId>,
    attributes: &[MemberAttribute],
) -> Vec<Projection> {
    let mut visited = HashSet::new();
    collect_attributes_from(graph, root, attributes, &mut visited)
}

/// Same as [`collect_attributes`] with a caller-owned visited set
///
/// Members already in `visited` contribute nothing and are not expanded. The
/// set is extended with every member visited by this call.
pub fn collect_attributes_from(
    graph: &FamilyGraph,
    root: Option<&MemberId>,
    attributes: &[MemberAttribute],
    visited: &mut HashSet<MemberId>,
) -> Vec<Projection> {
    let mut projections = Vec::new();
    walk(graph, root, visited, |member| {
        let values = attributes
            .iter()
            .map(|attr| (attr.key().to_string(), attr.project(member)))
            .collect();
        projections.push(Projection {
            member_id: member.id.clone(),
            values,
        });
    });
    projections
}

/// Visit members reachable from `root` in pre-order, children before parents
pub(crate) fn walk<'g>(
    graph: &'g FamilyGraph,
    root: Option<&MemberId>,
    visited: &mut HashSet<MemberId>,
    mut visit: impl FnMut(&'g Member),
) {
    let Some(root) = root else {
        return;
    };
    let mut stack = vec![root.clone()];

    while let Some(id) = stack.pop() {
        if visited.contains(&id) {
            continue;
        }
        let Some(member) = graph.get(&id) else {
            continue;
        };
        visited.insert(id);
        visit(member);

        let relationships = &member.relationships;
        for next in relationships
            .children
            .iter()
            .chain(relationships.parents.iter())
            .rev()
        {
            if !visited.contains(next) {
                stack.push(next.clone());
            }
        }
    }
}

/// Ids of all members reachable from the graph root, in traversal order
pub fn reachable_ids(graph: &FamilyGraph) -> Vec<MemberId> {
    let mut ids = Vec::new();
    walk(graph, graph.root(), &mut HashSet::new(), |m| ids.push(m.id.clone()));
    ids
}

/// Whether `id` can be reached from the graph root
pub fn contains(graph: &FamilyGraph, id: &MemberId) -> bool {
    let mut found = false;
    walk(graph, graph.root(), &mut HashSet::new(), |m| {
        found |= &m.id == id;
    });
    found
}

/// Names of all reachable members, for relationship pickers
pub fn member_names(graph: &FamilyGraph) -> Vec<String> {
    collect_attributes(graph, graph.root(), &[MemberAttribute::Name])
        .into_iter()
        .filter_map(|p| p.text(MemberAttribute::Name).map(str::to_string))
        .collect()
}

/// First reachable member whose account email matches
pub fn find_by_email<'g>(graph: &'g FamilyGraph, email: &str) -> Option<&'g Member> {
    collect_attributes(graph, graph.root(), &[MemberAttribute::Email])
        .into_iter()
        .find(|p| p.text(MemberAttribute::Email) == Some(email))
        .and_then(|p| graph.get(&p.member_id))
}

/// First reachable member with the given name, in traversal order
pub fn find_by_name<'g>(graph: &'g FamilyGraph, name: &str) -> Option<&'g Member> {
    collect_attributes(graph, graph.root(), &[MemberAttribute::Name])
        .into_iter()
        .find(|p| p.text(MemberAttribute::Name) == Some(name))
        .and_then(|p| graph.get(&p.member_id))
}

/// Account emails of all reachable members that are linked to an account
///
/// Each email appears once, in traversal order.
pub fn accounts(graph: &FamilyGraph) -> Vec<String> {
    let mut seen = HashSet::new();
    collect_attributes(graph, graph.root(), &[MemberAttribute::Email])
        .into_iter()
        .filter_map(|p| p.text(MemberAttribute::Email).map(str::to_string))
        .filter(|email| seen.insert(email.clone()))
        .collect()
}

// Comprehensive tests in separate module
#[cfg(test)]
#[path = "traversal_test.rs"]
mod traversal_test;
