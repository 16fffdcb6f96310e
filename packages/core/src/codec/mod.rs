//! Reference-preserving Graph Encoding
//!
//! Family graphs are cyclic, so a naive recursive JSON emission would never
//! terminate. The encoding assigns every member a slot index on first
//! encounter and writes every edge as a slot index. A member shared by many
//! edges is therefore emitted exactly once, and decoding rebuilds the same
//! sharing structure.
//!
//! # Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "root": 0,
//!   "members": [
//!     { "id": "…", "name": "Alice", "children": [1], "parents": [], "partner": [] },
//!     { "id": "…", "name": "Bob", "children": [], "parents": [0], "partner": [] }
//!   ]
//! }
//! ```
//!
//! Slots are assigned in depth-first order from the root (children, parents,
//! then partners), followed by any members not reachable from the root in id
//! order, so encoding the same graph twice yields the same document.

use crate::error::{FamilyError, Result};
use crate::models::{FamilyGraph, Member, MemberId, Relationship, Relationships, UserLink};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Current encoding version
pub const FORMAT_VERSION: u32 = 1;

/// Transmittable, acyclic form of a family graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedGraph {
    pub version: u32,

    /// Slot of the root member
    pub root: Option<usize>,

    pub members: Vec<EncodedMember>,
}

impl EncodedGraph {
    /// Encoding of a graph without members
    pub fn empty() -> Self {
        Self {
            version: FORMAT_VERSION,
            root: None,
            members: Vec::new(),
        }
    }

    /// Account emails of every encoded member that has one
    pub fn accounts(&self) -> Vec<String> {
        self.members
            .iter()
            .filter_map(|m| m.user.as_ref().map(|u| u.email.clone()))
            .collect()
    }
}

/// One member with edges replaced by slot indices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedMember {
    pub id: MemberId,
    pub name: String,
    #[serde(default)]
    pub birthdate: String,
    #[serde(default)]
    pub deathdate: Option<String>,
    #[serde(default)]
    pub user: Option<UserLink>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub children: Vec<usize>,
    #[serde(default)]
    pub parents: Vec<usize>,
    #[serde(default)]
    pub partner: Vec<EncodedPartner>,
}

/// Partner record pointing at a slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedPartner {
    pub slot: usize,
    pub start_date: String,
    pub end_date: Option<String>,
}

/// Encode a graph into its slot-indexed form
pub fn encode(graph: &FamilyGraph) -> EncodedGraph {
    let order = slot_order(graph);
    let slots: HashMap<&MemberId, usize> =
        order.iter().enumerate().map(|(slot, id)| (*id, slot)).collect();

    let slot_of = |owner: &MemberId, target: &MemberId| -> Option<usize> {
        let slot = slots.get(target).copied();
        if slot.is_none() {
            warn!("Dropping edge {} -> {}: target not in graph", owner, target);
        }
        slot
    };

    let members = order
        .iter()
        .filter_map(|id| graph.get(id))
        .map(|member| {
            let rel = &member.relationships;
            EncodedMember {
                id: member.id.clone(),
                name: member.name.clone(),
                birthdate: member.birthdate.clone(),
                deathdate: member.deathdate.clone(),
                user: member.user.clone(),
                created_at: member.created_at,
                children: rel
                    .children
                    .iter()
                    .filter_map(|c| slot_of(&member.id, c))
                    .collect(),
                parents: rel
                    .parents
                    .iter()
                    .filter_map(|p| slot_of(&member.id, p))
                    .collect(),
                partner: rel
                    .partner
                    .iter()
                    .filter_map(|r| {
                        slot_of(&member.id, &r.partner).map(|slot| EncodedPartner {
                            slot,
                            start_date: r.start_date.clone(),
                            end_date: r.end_date.clone(),
                        })
                    })
                    .collect(),
            }
        })
        .collect();

    EncodedGraph {
        version: FORMAT_VERSION,
        root: graph.root().and_then(|r| slots.get(r).copied()),
        members,
    }
}

/// First-encounter order: DFS from the root, then unreachable members by id
fn slot_order(graph: &FamilyGraph) -> Vec<&MemberId> {
    let mut order = Vec::with_capacity(graph.len());
    let mut seen: HashSet<&MemberId> = HashSet::with_capacity(graph.len());
    let mut stack: Vec<&MemberId> = graph.root().into_iter().collect();

    while let Some(id) = stack.pop() {
        let Some(member) = graph.get(id) else {
            continue;
        };
        if !seen.insert(&member.id) {
            continue;
        }
        order.push(&member.id);

        let rel = &member.relationships;
        let neighbours = rel
            .children
            .iter()
            .chain(rel.parents.iter())
            .chain(rel.partner.iter().map(|r| &r.partner));
        let pending: Vec<&MemberId> = neighbours.filter(|n| !seen.contains(n)).collect();
        stack.extend(pending.into_iter().rev());
    }

    let mut rest: Vec<&MemberId> = graph
        .members()
        .map(|m| &m.id)
        .filter(|id| !seen.contains(id))
        .collect();
    rest.sort();
    order.extend(rest);
    order
}

/// Rebuild a graph from its slot-indexed form
///
/// # Errors
///
/// - `Codec` for an unknown version, a duplicated member id or a slot index
///   outside the member table
/// - `Structural` if the decoded edges are not mirrored on both endpoints
pub fn decode(encoded: EncodedGraph) -> Result<FamilyGraph> {
    if encoded.version != FORMAT_VERSION {
        return Err(FamilyError::codec(format!(
            "unsupported encoding version {} (expected {})",
            encoded.version, FORMAT_VERSION
        )));
    }

    let count = encoded.members.len();
    let ids: Vec<MemberId> = encoded.members.iter().map(|m| m.id.clone()).collect();
    let mut unique = HashSet::with_capacity(count);
    if let Some(dup) = ids.iter().find(|id| !unique.insert(*id)) {
        return Err(FamilyError::codec(format!("member {} encoded twice", dup)));
    }

    let resolve = |slot: usize| -> Result<MemberId> {
        ids.get(slot).cloned().ok_or_else(|| {
            FamilyError::codec(format!("slot {} out of range ({} members)", slot, count))
        })
    };

    let mut graph = FamilyGraph::new();
    for encoded_member in &encoded.members {
        let relationships = Relationships {
            children: encoded_member
                .children
                .iter()
                .map(|s| resolve(*s))
                .collect::<Result<_>>()?,
            parents: encoded_member
                .parents
                .iter()
                .map(|s| resolve(*s))
                .collect::<Result<_>>()?,
            partner: encoded_member
                .partner
                .iter()
                .map(|p| {
                    Ok(Relationship {
                        partner: resolve(p.slot)?,
                        start_date: p.start_date.clone(),
                        end_date: p.end_date.clone(),
                    })
                })
                .collect::<Result<_>>()?,
        };

        graph.insert(Member {
            id: encoded_member.id.clone(),
            name: encoded_member.name.clone(),
            birthdate: encoded_member.birthdate.clone(),
            deathdate: encoded_member.deathdate.clone(),
            user: encoded_member.user.clone(),
            relationships,
            created_at: encoded_member.created_at,
        });
    }

    let root = encoded.root.map(resolve).transpose()?;
    graph.set_root(root);
    graph.check_edges()?;
    Ok(graph)
}

/// Encode a graph as a JSON string (storage form)
pub fn to_json(graph: &FamilyGraph) -> Result<String> {
    Ok(serde_json::to_string(&encode(graph))?)
}

/// Decode a graph from a JSON string produced by [`to_json`]
pub fn from_json(json: &str) -> Result<FamilyGraph> {
    let encoded: EncodedGraph = serde_json::from_str(json)?;
    decode(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{create_member, MemberDraft};

    /// Two partners sharing two children, one grandchild with a user link
    fn family() -> (FamilyGraph, Vec<MemberId>) {
        let people = ["Ann", "Ben", "Cat", "Dov", "Eli"]
            .iter()
            .map(|n| create_member(MemberDraft::named(*n)))
            .collect::<Vec<_>>();
        let ids: Vec<MemberId> = people.iter().map(|m| m.id.clone()).collect();
        let mut people = people.into_iter();
        let mut graph = FamilyGraph::with_root(people.next().unwrap());
        for member in people {
            graph.insert(member);
        }
        graph.get_mut(&ids[4]).unwrap().user = Some(UserLink::new("eli@example.com"));
        graph.get_mut(&ids[2]).unwrap().deathdate = Some("2020-02-02".to_string());

        graph.link_partners(&ids[0], &ids[1], "1970-05-05").unwrap();
        for parent in [&ids[0], &ids[1]] {
            graph.link_parent_child(parent, &ids[2]).unwrap();
            graph.link_parent_child(parent, &ids[3]).unwrap();
        }
        graph.link_parent_child(&ids[2], &ids[4]).unwrap();
        (graph, ids)
    }

    #[test]
    fn test_round_trip_preserves_cyclic_graph() {
        let (graph, _) = family();

        let decoded = decode(encode(&graph)).unwrap();

        assert_eq!(decoded, graph);
    }

    #[test]
    fn test_shared_members_are_emitted_once() {
        let (graph, ids) = family();

        let encoded = encode(&graph);

        assert_eq!(encoded.members.len(), 5);
        assert_eq!(encoded.root, Some(0));
        let cat_slot = encoded.members.iter().position(|m| m.id == ids[2]).unwrap();
        let ann = &encoded.members[0];
        let ben = encoded.members.iter().find(|m| m.id == ids[1]).unwrap();
        assert!(ann.children.contains(&cat_slot));
        assert!(ben.children.contains(&cat_slot), "both parents point at one slot");
    }

    #[test]
    fn test_decoded_sharing_resolves_to_one_member() {
        let (graph, ids) = family();

        let decoded = from_json(&to_json(&graph).unwrap()).unwrap();

        let via_ann = &decoded.get(&ids[0]).unwrap().relationships.children[0];
        let via_ben = &decoded.get(&ids[1]).unwrap().relationships.children[0];
        assert_eq!(via_ann, via_ben);
        assert_eq!(decoded.len(), 5);
        assert_eq!(decoded.get(via_ann).unwrap().deathdate.as_deref(), Some("2020-02-02"));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let (graph, _) = family();

        assert_eq!(encode(&graph), encode(&graph));
        assert_eq!(encode(&decode(encode(&graph)).unwrap()), encode(&graph));
    }

    #[test]
    fn test_empty_graph_round_trip() {
        let graph = FamilyGraph::new();

        let encoded = encode(&graph);

        assert_eq!(encoded, EncodedGraph::empty());
        assert_eq!(decode(encoded).unwrap(), graph);
    }

    #[test]
    fn test_unreachable_members_are_kept() {
        let (mut graph, _) = family();
        let loner = create_member(MemberDraft::named("Loner"));
        let loner_id = loner.id.clone();
        graph.insert(loner);

        let decoded = decode(encode(&graph)).unwrap();

        assert!(decoded.has_member(&loner_id));
        assert_eq!(decoded, graph);
    }

    #[test]
    fn test_decode_rejects_out_of_range_slot() {
        let (graph, _) = family();
        let mut encoded = encode(&graph);
        encoded.members[0].children.push(99);

        assert!(matches!(decode(encoded), Err(FamilyError::Codec(_))));
    }

    #[test]
    fn test_decode_rejects_one_sided_edge() {
        let (graph, _) = family();
        let mut encoded = encode(&graph);
        let last = encoded.members.len() - 1;
        encoded.members[last].parents.clear();

        assert!(matches!(decode(encoded), Err(FamilyError::Structural(_))));
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let mut encoded = EncodedGraph::empty();
        encoded.version = 7;

        assert!(matches!(decode(encoded), Err(FamilyError::Codec(_))));
    }

    #[test]
    fn test_encoded_accounts() {
        let (graph, _) = family();

        assert_eq!(encode(&graph).accounts(), vec!["eli@example.com"]);
    }
}
