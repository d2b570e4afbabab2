//! Merge rewrite of fragment members into a target type.
//!
//! Each fragment member replaces the member with the same identity (exact
//! signature, then kind and name) or is appended before the type's closing
//! brace. Bytes outside the replaced ranges are copied unchanged.

use serde::{Deserialize, Serialize};
use tree_sitter::Node;

use crate::diff::member_diff::{collect_members, MemberSite};
use crate::error::Result;
use crate::indexer::parser::Parser;
use crate::indexer::signature::{declaration_name, named_children, type_kind};
use crate::patch::inference::{Fragment, PatchTarget};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchStatus {
    /// Signatures of members replaced in place
    pub replaced: Vec<String>,
    /// Signatures of members added to the type
    pub appended: Vec<String>,
}

impl PatchStatus {
    pub fn is_empty(&self) -> bool {
        self.replaced.is_empty() && self.appended.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedPatch {
    pub file_path: String,
    pub original_text: String,
    pub new_text: String,
    pub status: PatchStatus,
}

struct Edit {
    start: usize,
    end: usize,
    text: String,
}

/// Merges `fragment`'s members into `target`'s declaration inside `original`.
/// Returns `None` when the target type is not found or nothing changes.
pub fn merge_members(
    original: &str,
    target: &PatchTarget,
    fragment: &Fragment,
) -> Result<Option<(String, PatchStatus)>> {
    let parsed = Parser::default().parse_text(original)?;
    let Some(class) = find_type(&parsed.root_node(), original, target) else {
        tracing::debug!("Type {} not found in {}", target.type_name, target.file_path);
        return Ok(None);
    };
    let Some(body) = class.child_by_field_name("body") else {
        return Ok(None);
    };

    let existing: Vec<MemberSite> = collect_members(&class, original)
        .into_iter()
        .filter(|m| m.containers.len() == 1)
        .collect();
    let mut used = vec![false; existing.len()];

    let mut status = PatchStatus::default();
    let mut edits: Vec<Edit> = Vec::new();
    let mut appended: Vec<String> = Vec::new();

    for member in fragment.members() {
        let leading = leading_comment_start(&member.node);
        let (text_start, text_end) = (leading.unwrap_or(member.node.start_byte()), member.node.end_byte());
        let fragment_text = &fragment.source()[text_start..text_end];
        let fragment_indent = indentation_at(fragment.source(), text_start);

        match find_counterpart(&existing, &used, &member) {
            Some(idx) => {
                used[idx] = true;
                let old = &existing[idx];
                let start = if leading.is_some() {
                    leading_comment_start(&old.node).unwrap_or(old.node.start_byte())
                } else {
                    old.node.start_byte()
                };
                let indent = indentation_at(original, start);
                edits.push(Edit {
                    start,
                    end: old.node.end_byte(),
                    text: reindent(fragment_text, fragment_indent, indent),
                });
                status.replaced.push(member.signature.clone());
            }
            None => {
                let indent = member_indent(original, &existing, &body);
                appended.push(reindent(fragment_text, fragment_indent, &indent));
                status.appended.push(member.signature.clone());
            }
        }
    }

    if !appended.is_empty() {
        if let Some(edit) = append_edit(original, &body, &existing, &appended) {
            edits.push(edit);
        }
    }
    if edits.is_empty() {
        return Ok(None);
    }

    edits.sort_by_key(|e| e.start);
    let mut out = String::with_capacity(original.len());
    let mut pos = 0;
    for edit in &edits {
        if edit.start < pos {
            continue;
        }
        out.push_str(&original[pos..edit.start]);
        out.push_str(&edit.text);
        pos = edit.end;
    }
    out.push_str(&original[pos..]);

    if out == original {
        return Ok(None);
    }
    Ok(Some((out, status)))
}

/// Type declaration named like the target, preferring the one at the indexed offset
fn find_type<'t>(root: &Node<'t>, source: &str, target: &PatchTarget) -> Option<Node<'t>> {
    let mut candidates = Vec::new();
    let mut stack = vec![*root];
    while let Some(node) = stack.pop() {
        if type_kind(&node).is_some()
            && declaration_name(&node, source).as_deref() == Some(target.type_name.as_str())
        {
            candidates.push(node);
        }
        stack.extend(named_children(&node));
    }
    candidates.sort_by_key(|n| n.start_byte());
    candidates
        .iter()
        .find(|n| n.start_byte() == target.start)
        .or_else(|| candidates.first())
        .copied()
}

fn find_counterpart(existing: &[MemberSite], used: &[bool], member: &MemberSite) -> Option<usize> {
    let free = |idx: &usize| !used[*idx];
    (0..existing.len())
        .filter(free)
        .find(|&i| existing[i].kind == member.kind && existing[i].signature == member.signature)
        .or_else(|| {
            (0..existing.len())
                .filter(free)
                .find(|&i| existing[i].kind == member.kind && existing[i].name == member.name)
        })
}

/// Start of the comment block directly above `node`, if any
fn leading_comment_start(node: &Node) -> Option<usize> {
    let mut start = None;
    let mut current = node.prev_sibling();
    while let Some(sibling) = current {
        if sibling.kind() != "comment" {
            break;
        }
        start = Some(sibling.start_byte());
        current = sibling.prev_sibling();
    }
    start
}

/// Whitespace between the start of the line and `offset`, when only whitespace precedes it
fn indentation_at(text: &str, offset: usize) -> &str {
    let line_start = text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let prefix = &text[line_start..offset];
    if prefix.chars().all(|c| c == ' ' || c == '\t') {
        prefix
    } else {
        ""
    }
}

/// Moves lines after the first from `from` indentation to `to`
fn reindent(text: &str, from: &str, to: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, line) in text.split_inclusive('\n').enumerate() {
        if i == 0 || line.trim().is_empty() {
            out.push_str(if i == 0 { line } else { line.trim_start_matches([' ', '\t']) });
            continue;
        }
        let rest = line.strip_prefix(from).unwrap_or_else(|| line.trim_start_matches([' ', '\t']));
        out.push_str(to);
        out.push_str(rest);
    }
    out
}

fn member_indent(original: &str, existing: &[MemberSite], body: &Node) -> String {
    if let Some(last) = existing.last() {
        return indentation_at(original, last.node.start_byte()).to_string();
    }
    let close = body.end_byte().saturating_sub(1);
    format!("{}    ", indentation_at(original, close))
}

fn append_edit(original: &str, body: &Node, existing: &[MemberSite], members: &[String]) -> Option<Edit> {
    let close = body.end_byte().checked_sub(1)?;
    if original.as_bytes().get(close) != Some(&b'}') {
        return None;
    }
    let indent = member_indent(original, existing, body);
    let line_start = original[..close].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let brace_alone = original[line_start..close].trim().is_empty();

    let mut text = String::new();
    for member in members {
        if !existing.is_empty() || !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&indent);
        text.push_str(member);
        text.push('\n');
    }

    if brace_alone {
        Some(Edit {
            start: line_start,
            end: line_start,
            text,
        })
    } else {
        Some(Edit {
            start: close,
            end: close,
            text: format!("\n{}{}", text, indentation_at(original, line_start)),
        })
    }
}
