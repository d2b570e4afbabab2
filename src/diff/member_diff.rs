//! Member-level "what logic changed" diff, reported per line of the new text.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tree_sitter::Node;

use crate::diff::tree_diff::structural_hash;
use crate::error::Result;
use crate::indexer::parser::Parser;
use crate::indexer::signature::{declaration_name, member_signature, type_kind, MemberKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffLineKind {
    Unchanged,
    Added,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    /// 1-based
    pub line_number: usize,
    pub text: String,
    pub kind: DiffLineKind,
}

/// A member declaration together with the names of its enclosing types
#[derive(Debug, Clone)]
pub struct MemberSite<'t> {
    pub node: Node<'t>,
    pub kind: MemberKind,
    pub name: String,
    pub signature: String,
    pub containers: Vec<String>,
}

/// Members in source order; types and namespaces are only traversed
pub fn collect_members<'t>(root: &Node<'t>, source: &str) -> Vec<MemberSite<'t>> {
    let mut members = Vec::new();
    let mut containers = Vec::new();
    collect_into(root, source, &mut containers, &mut members);
    members
}

fn collect_into<'t>(
    node: &Node<'t>,
    source: &str,
    containers: &mut Vec<String>,
    members: &mut Vec<MemberSite<'t>>,
) {
    if let Some(kind) = MemberKind::from_node(node) {
        if node.kind() == "local_function_statement" {
            return;
        }
        if let (Some(name), Some(signature)) =
            (declaration_name(node, source), member_signature(node, source))
        {
            members.push(MemberSite {
                node: *node,
                kind,
                name,
                signature,
                containers: containers.clone(),
            });
        }
        return;
    }

    let pushed = match type_kind(node) {
        Some(_) => {
            containers.push(declaration_name(node, source).unwrap_or_default());
            true
        }
        None => false,
    };
    let mut cursor = node.walk();
    let children: Vec<Node> = node.named_children(&mut cursor).collect();
    for child in children {
        collect_into(&child, source, containers, members);
    }
    if pushed {
        containers.pop();
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MemberDiffer;

impl MemberDiffer {
    pub fn new() -> Self {
        Self
    }

    /// One line record per line of `new`
    ///
    /// A member's lines are `Added` when the old text has no member with the
    /// same identity or the matching member is not structurally equal.
    pub fn compute_semantic_diff(&self, old: &str, new: &str) -> Result<Vec<DiffLine>> {
        let parser = Parser::default();
        let old_parsed = parser.parse_text(old)?;
        let new_parsed = parser.parse_text(new)?;

        let old_members = collect_members(&old_parsed.root_node(), old);
        let new_members = collect_members(&new_parsed.root_node(), new);

        let mut by_identity: HashMap<(&[String], &str), &MemberSite> = HashMap::new();
        let mut by_signature: HashMap<&str, Vec<&MemberSite>> = HashMap::new();
        for member in &old_members {
            by_identity
                .entry((member.containers.as_slice(), member.signature.as_str()))
                .or_insert(member);
            by_signature.entry(member.signature.as_str()).or_default().push(member);
        }

        let mut added_rows = vec![false; new.lines().count()];
        for member in &new_members {
            let counterpart = by_identity
                .get(&(member.containers.as_slice(), member.signature.as_str()))
                .copied()
                .or_else(|| match by_signature.get(member.signature.as_str()) {
                    Some(candidates) if candidates.len() == 1 => Some(candidates[0]),
                    _ => None,
                });

            let unchanged = counterpart.is_some_and(|old_member| {
                structural_hash(&old_member.node, old) == structural_hash(&member.node, new)
            });
            if unchanged {
                continue;
            }

            tracing::debug!("Member {} changed", member.signature);
            let first = member.node.start_position().row;
            let last = member.node.end_position().row;
            for row in first..=last {
                if let Some(flag) = added_rows.get_mut(row) {
                    *flag = true;
                }
            }
        }

        Ok(new
            .lines()
            .enumerate()
            .map(|(row, text)| DiffLine {
                line_number: row + 1,
                text: text.to_string(),
                kind: if added_rows[row] {
                    DiffLineKind::Added
                } else {
                    DiffLineKind::Unchanged
                },
            })
            .collect())
    }
}
