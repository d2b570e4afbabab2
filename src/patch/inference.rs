//! Finding the project type a free-form code fragment belongs to.
//!
//! Strategies run in order and the first `Found` wins:
//! an explicitly declared container, then (for bare member lists) a
//! constructor's name, then the unique owner of one of the fragment's
//! method names.

use std::collections::BTreeSet;

use crate::diff::member_diff::{collect_members, MemberSite};
use crate::error::Result;
use crate::index::{SymbolGraph, SymbolKind, SymbolNode};
use crate::indexer::parser::{ParsedFile, Parser};
use crate::indexer::signature::{declaration_name, named_children, type_kind, MemberKind};

/// Name of the synthetic class bare member lists are wrapped in
pub const FRAGMENT_HOST: &str = "__FragmentHost__";

/// A project type chosen as the destination of a fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchTarget {
    pub type_id: String,
    pub type_name: String,
    pub file_path: String,
    pub start: usize,
}

impl PatchTarget {
    fn from_node(node: &SymbolNode) -> Self {
        Self {
            type_id: node.id.clone(),
            type_name: node.name.clone(),
            file_path: node.file_path.clone(),
            start: node.start,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inference {
    Found(PatchTarget),
    Ambiguous,
    NotFound,
}

/// Parsed fragment: either as written (it declares a type) or wrapped in a host class
pub struct Fragment {
    parsed: ParsedFile,
    container: Option<String>,
}

impl Fragment {
    pub fn parse(text: &str) -> Result<Self> {
        let parser = Parser::default();
        let parsed = parser.parse_text(text)?;
        if let Some(container) = find_container(&parsed.root_node(), &parsed.source) {
            return Ok(Self {
                parsed,
                container: Some(container),
            });
        }

        let wrapped = format!("class {}\n{{\n{}\n}}\n", FRAGMENT_HOST, text);
        Ok(Self {
            parsed: parser.parse_text(&wrapped)?,
            container: None,
        })
    }

    /// Type name declared by the fragment itself
    pub fn container(&self) -> Option<&str> {
        self.container.as_deref()
    }

    pub fn source(&self) -> &str {
        &self.parsed.source
    }

    pub fn parsed(&self) -> &ParsedFile {
        &self.parsed
    }

    /// Members directly inside the declared container (or the host class)
    pub fn members(&self) -> Vec<MemberSite<'_>> {
        let owner = self.container.as_deref().unwrap_or(FRAGMENT_HOST);
        collect_members(&self.parsed.root_node(), &self.parsed.source)
            .into_iter()
            .filter(|m| m.containers.len() == 1 && m.containers[0] == owner)
            .collect()
    }
}

/// Outermost type declaration, looking through namespaces and error nodes
fn find_container(node: &tree_sitter::Node, source: &str) -> Option<String> {
    for child in named_children(node) {
        if type_kind(&child).is_some() {
            return declaration_name(&child, source);
        }
        if matches!(
            child.kind(),
            "namespace_declaration" | "file_scoped_namespace_declaration" | "declaration_list" | "ERROR"
        ) {
            if let Some(found) = find_container(&child, source) {
                return Some(found);
            }
        }
    }
    None
}

type Strategy = fn(&Fragment, &SymbolGraph) -> Inference;

const STRATEGIES: &[(&str, Strategy)] = &[
    ("declared container", declared_container),
    ("constructor name", constructor_name),
    ("unique method owner", unique_method_owner),
];

/// Runs the strategies in order
pub fn infer_target(fragment: &Fragment, graph: &SymbolGraph) -> Option<PatchTarget> {
    for (name, strategy) in STRATEGIES {
        match strategy(fragment, graph) {
            Inference::Found(target) => {
                tracing::debug!("Fragment target {} found by {}", target.type_id, name);
                return Some(target);
            }
            Inference::Ambiguous => tracing::debug!("Fragment target ambiguous by {}", name),
            Inference::NotFound => {}
        }
    }
    None
}

/// Unique project type with the given simple name
///
/// Parts of one partial type (`App.Repo`, `App.Repo#2`) count as one type;
/// the part that already declares one of the fragment's members wins,
/// otherwise the first part.
fn type_by_name(graph: &SymbolGraph, name: &str, fragment: &Fragment) -> Inference {
    let types: Vec<_> = graph
        .find_by_name(name, None)
        .into_iter()
        .filter(|n| n.kind.is_type())
        .collect();
    let Some(first) = types.first() else {
        return Inference::NotFound;
    };
    let root = part_root(&first.id);
    if types.iter().any(|t| part_root(&t.id) != root) {
        return Inference::Ambiguous;
    }

    let wanted: Vec<String> = fragment.members().into_iter().map(|m| m.name).collect();
    let declares_wanted = |part: &SymbolNode| {
        graph.nodes_in_file(&part.file_path).iter().any(|n| {
            n.kind.is_declaration()
                && !n.kind.is_type()
                && wanted.contains(&n.name)
                && graph.declaring_type(n).is_some_and(|t| t.id == part.id)
        })
    };
    let part = types
        .iter()
        .find(|t| declares_wanted(t))
        .or_else(|| types.iter().find(|t| t.id == root))
        .unwrap_or(first);
    Inference::Found(PatchTarget::from_node(part))
}

/// Type id without the `#N` suffix given to later declarations of the same id
fn part_root(id: &str) -> &str {
    match id.rsplit_once('#') {
        Some((root, n)) if !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) => root,
        _ => id,
    }
}

pub fn declared_container(fragment: &Fragment, graph: &SymbolGraph) -> Inference {
    match fragment.container() {
        Some(name) => type_by_name(graph, name, fragment),
        None => Inference::NotFound,
    }
}

pub fn constructor_name(fragment: &Fragment, graph: &SymbolGraph) -> Inference {
    if fragment.container().is_some() {
        return Inference::NotFound;
    }
    let constructor = fragment
        .members()
        .into_iter()
        .find(|m| m.kind == MemberKind::Constructor);
    match constructor {
        Some(ctor) => type_by_name(graph, &ctor.name, fragment),
        None => Inference::NotFound,
    }
}

pub fn unique_method_owner(fragment: &Fragment, graph: &SymbolGraph) -> Inference {
    if fragment.container().is_some() {
        return Inference::NotFound;
    }

    let mut saw_ambiguous = false;
    for member in fragment.members() {
        if member.kind != MemberKind::Method {
            continue;
        }
        let owners: BTreeSet<&str> = graph
            .find_by_name(&member.name, Some(SymbolKind::Method))
            .into_iter()
            .filter_map(|m| graph.declaring_type(m))
            .map(|t| t.id.as_str())
            .collect();
        match owners.len() {
            1 => {
                let owner = owners
                    .into_iter()
                    .next()
                    .and_then(|id| graph.node(id));
                if let Some(owner) = owner {
                    return Inference::Found(PatchTarget::from_node(owner));
                }
            }
            0 => {}
            _ => saw_ambiguous = true,
        }
    }

    if saw_ambiguous {
        Inference::Ambiguous
    } else {
        Inference::NotFound
    }
}
