//! Textual cleanup passes applied to whole-file context sections.
//!
//! Each pass removes one syntactic category (comments, `using` directives,
//! namespace wrappers, surplus blank lines), so the passes commute.

use once_cell::sync::Lazy;
use regex::Regex;
use tree_sitter::Node;

use crate::indexer::parser::Parser;
use crate::indexer::signature::named_children;

static BLANK_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)(?:^[ \t]*\r?\n){3,}").expect("valid blank line regex"));

/// Removes `//`, `///` and `/* */` comments; text inside literals is untouched
pub fn strip_comments(text: &str) -> String {
    let ranges = collect_ranges(text, &|node| node.kind() == "comment");
    remove_ranges(text, ranges)
}

/// Removes `using` and `extern alias` directives
pub fn strip_usings(text: &str) -> String {
    let ranges = collect_ranges(text, &|node| {
        matches!(node.kind(), "using_directive" | "extern_alias_directive")
    });
    remove_ranges(text, ranges)
}

/// Unwraps namespace declarations
///
/// A block-scoped namespace loses its header and closing brace and its body
/// moves out one indentation level; a file-scoped declaration line is removed.
pub fn strip_namespaces(text: &str) -> String {
    let parser = Parser::default();
    let mut current = text.to_string();

    loop {
        let Ok(parsed) = parser.parse_text(&current) else {
            return current;
        };
        let Some(namespace) = find_outermost_namespace(&parsed.root_node()) else {
            return current;
        };

        let next = if namespace.kind() == "file_scoped_namespace_declaration" {
            let end = header_end(&namespace);
            remove_ranges(&current, vec![(namespace.start_byte(), end)])
        } else {
            match unwrap_block_namespace(&current, &namespace) {
                Some(next) => next,
                None => return current,
            }
        };

        if next == current {
            return current;
        }
        current = next;
    }
}

/// Collapses runs of three or more blank lines to two
pub fn collapse_blank_lines(text: &str) -> String {
    BLANK_RUN_RE.replace_all(text, "\n\n").into_owned()
}

fn collect_ranges(text: &str, accept: &dyn Fn(&Node) -> bool) -> Vec<(usize, usize)> {
    let Ok(parsed) = Parser::default().parse_text(text) else {
        return Vec::new();
    };
    let mut ranges = Vec::new();
    let mut stack = vec![parsed.root_node()];
    while let Some(node) = stack.pop() {
        if accept(&node) {
            ranges.push((node.start_byte(), node.end_byte()));
            continue;
        }
        stack.extend(named_children(&node));
    }
    ranges
}

fn find_outermost_namespace<'t>(node: &Node<'t>) -> Option<Node<'t>> {
    for child in named_children(node) {
        if matches!(
            child.kind(),
            "namespace_declaration" | "file_scoped_namespace_declaration"
        ) {
            return Some(child);
        }
        if child.kind() == "ERROR" {
            if let Some(found) = find_outermost_namespace(&child) {
                return Some(found);
            }
        }
    }
    None
}

/// End of `namespace A.B;`, excluding any declarations the grammar nests under it
fn header_end(namespace: &Node) -> usize {
    let mut cursor = namespace.walk();
    let semicolon = namespace
        .children(&mut cursor)
        .find(|c| c.kind() == ";")
        .map(|c| c.end_byte());
    semicolon.unwrap_or_else(|| namespace.end_byte())
}

fn unwrap_block_namespace(text: &str, namespace: &Node) -> Option<String> {
    let body = namespace.child_by_field_name("body")?;
    let open = body.start_byte();
    let close = body.end_byte().checked_sub(1)?;
    if text.as_bytes().get(open) != Some(&b'{') || text.as_bytes().get(close) != Some(&b'}') {
        return None;
    }

    let inner = &text[open + 1..close];
    let inner = inner
        .strip_prefix("\r\n")
        .or_else(|| inner.strip_prefix('\n'))
        .unwrap_or(inner.trim_start_matches([' ', '\t']));
    let inner = match inner.rfind('\n') {
        Some(idx) if inner[idx + 1..].trim().is_empty() => &inner[..idx + 1],
        _ => inner,
    };

    let mut prefix = &text[..namespace.start_byte()];
    let line_start = prefix.rfind('\n').map(|i| i + 1).unwrap_or(0);
    if prefix[line_start..].trim().is_empty() {
        prefix = &prefix[..line_start];
    }
    let mut suffix = &text[body.end_byte()..];
    let body_text = unindent(inner);
    if body_text.ends_with('\n') {
        suffix = suffix
            .strip_prefix("\r\n")
            .or_else(|| suffix.strip_prefix('\n'))
            .unwrap_or(suffix);
    }

    Some(format!("{}{}{}", prefix, body_text, suffix))
}

/// Removes the indentation shared by all non-blank lines
fn unindent(text: &str) -> String {
    let common = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        if line.trim().is_empty() {
            out.push_str(line.trim_start_matches([' ', '\t']));
        } else {
            out.push_str(&line[common.min(line.len())..]);
        }
    }
    out
}

/// Deletes byte ranges; a range that is alone on its lines takes those lines with it
fn remove_ranges(text: &str, mut ranges: Vec<(usize, usize)>) -> String {
    if ranges.is_empty() {
        return text.to_string();
    }

    let mut expanded: Vec<(usize, usize)> = ranges
        .drain(..)
        .map(|(start, end)| {
            let line_start = text[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
            let line_end = text[end..].find('\n').map(|i| end + i).unwrap_or(text.len());
            let before = &text[line_start..start];
            let after = &text[end..line_end];
            if before.trim().is_empty() && after.trim().is_empty() {
                (line_start, (line_end + 1).min(text.len()))
            } else if after.trim().is_empty() {
                let trimmed = before.trim_end_matches([' ', '\t']).len();
                (line_start + trimmed, end)
            } else {
                (start, end)
            }
        })
        .collect();
    expanded.sort();

    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    for (start, end) in expanded {
        if start > pos {
            out.push_str(&text[pos..start]);
        }
        pos = pos.max(end);
    }
    out.push_str(&text[pos.min(text.len())..]);
    out
}
