//! Family Graph Arena
//!
//! `FamilyGraph` owns every member of one family, keyed by `MemberId`, plus a
//! nullable root member that serves as the traversal entry point. Edges are
//! id lists on each member, so cycles (parent <-> child, partners sharing
//! children) never create ownership cycles.

use crate::error::FamilyError;
use crate::models::{Member, MemberId, Relationship};
use std::collections::HashMap;

/// Arena of family members with a designated root
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FamilyGraph {
    members: HashMap<MemberId, Member>,
    root: Option<MemberId>,
}

impl FamilyGraph {
    /// Create an empty graph (no root)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a single-member graph rooted at `member`
    pub fn with_root(member: Member) -> Self {
        let mut graph = Self::new();
        graph.root = Some(member.id.clone());
        graph.members.insert(member.id.clone(), member);
        graph
    }

    pub fn root(&self) -> Option<&MemberId> {
        self.root.as_ref()
    }

    pub fn root_member(&self) -> Option<&Member> {
        self.root.as_ref().and_then(|id| self.members.get(id))
    }

    pub fn get(&self, id: &MemberId) -> Option<&Member> {
        self.members.get(id)
    }

    /// Mutable access for attribute edits
    ///
    /// Edges should be changed through the `link_*` methods so both sides
    /// stay in sync.
    pub fn get_mut(&mut self, id: &MemberId) -> Option<&mut Member> {
        self.members.get_mut(id)
    }

    /// Whether the arena holds `id` (reachable or not)
    pub fn has_member(&self, id: &MemberId) -> bool {
        self.members.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Iterate over all members in arbitrary order
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    pub(crate) fn set_root(&mut self, root: Option<MemberId>) {
        self.root = root;
    }

    pub(crate) fn insert(&mut self, member: Member) -> Option<Member> {
        self.members.insert(member.id.clone(), member)
    }

    /// Drop a member that was inserted but never wired in
    pub(crate) fn remove_unlinked(&mut self, id: &MemberId) -> Option<Member> {
        let linked = self
            .members
            .get(id)
            .is_some_and(|m| !m.relationships.is_empty());
        if linked || self.root.as_ref() == Some(id) {
            return None;
        }
        self.members.remove(id)
    }

    /// Add a parent -> child edge on both endpoints
    pub fn link_parent_child(
        &mut self,
        parent: &MemberId,
        child: &MemberId,
    ) -> Result<(), FamilyError> {
        if parent == child {
            return Err(FamilyError::structural(format!(
                "member {} cannot be its own parent",
                parent
            )));
        }
        if !self.members.contains_key(child) {
            return Err(FamilyError::member_not_found(child.as_str()));
        }
        let parent_member = self
            .members
            .get_mut(parent)
            .ok_or_else(|| FamilyError::member_not_found(parent.as_str()))?;
        parent_member.relationships.children.push(child.clone());

        if let Some(child_member) = self.members.get_mut(child) {
            child_member.relationships.parents.push(parent.clone());
        }
        Ok(())
    }

    /// Record a partnership on both members
    pub fn link_partners(
        &mut self,
        a: &MemberId,
        b: &MemberId,
        start_date: impl Into<String>,
    ) -> Result<(), FamilyError> {
        for id in [a, b] {
            if !self.members.contains_key(id) {
                return Err(FamilyError::member_not_found(id.as_str()));
            }
        }
        let start_date = start_date.into();

        if let Some(member) = self.members.get_mut(a) {
            member.relationships.partner.push(Relationship {
                partner: b.clone(),
                start_date: start_date.clone(),
                end_date: None,
            });
        }
        // A self-partnership is recorded once
        if a != b {
            if let Some(member) = self.members.get_mut(b) {
                member.relationships.partner.push(Relationship {
                    partner: a.clone(),
                    start_date,
                    end_date: None,
                });
            }
        }
        Ok(())
    }

    /// Verify that every edge points at a known member and has its mirror edge
    ///
    /// # Errors
    ///
    /// - `NotFound` when an edge names a member missing from the arena
    /// - `Structural` when a child/parent/partner edge is one-sided
    pub fn check_edges(&self) -> Result<(), FamilyError> {
        if let Some(root) = &self.root {
            if !self.members.contains_key(root) {
                return Err(FamilyError::member_not_found(root.as_str()));
            }
        }

        for member in self.members.values() {
            for child in &member.relationships.children {
                let other = self
                    .members
                    .get(child)
                    .ok_or_else(|| FamilyError::member_not_found(child.as_str()))?;
                if !other.has_parent(&member.id) {
                    return Err(FamilyError::structural(format!(
                        "{} lists {} as child without the matching parent edge",
                        member.id, child
                    )));
                }
            }
            for parent in &member.relationships.parents {
                let other = self
                    .members
                    .get(parent)
                    .ok_or_else(|| FamilyError::member_not_found(parent.as_str()))?;
                if !other.has_child(&member.id) {
                    return Err(FamilyError::structural(format!(
                        "{} lists {} as parent without the matching child edge",
                        member.id, parent
                    )));
                }
            }
            for relationship in &member.relationships.partner {
                let other = self
                    .members
                    .get(&relationship.partner)
                    .ok_or_else(|| FamilyError::member_not_found(relationship.partner.as_str()))?;
                if !other.has_partner(&member.id) {
                    return Err(FamilyError::structural(format!(
                        "{} lists {} as partner without the matching record",
                        member.id, relationship.partner
                    )));
                }
            }
        }
        Ok(())
    }
}
