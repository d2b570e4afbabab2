//! Structural added/removed/modified diff between two syntax trees.
//!
//! Every node gets a content hash: leaves hash their kind and text, inner
//! nodes hash their kind and their children's hashes. Comments and missing
//! nodes are left out of both the hashes and the reports, so reformatting and
//! comment edits produce an empty diff.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tree_sitter::Node;
use xxhash_rust::xxh3::Xxh3;

use crate::error::Result;
use crate::indexer::parser::{ParsedFile, Parser};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeChangeType {
    KindMismatch,
    ContentChanged,
    InternalStructureChanged,
}

/// A syntax node located in one of the two texts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeChange {
    pub kind: String,
    pub start: usize,
    pub end: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
}

impl TreeChange {
    fn from_node(node: &Node, source: &str) -> Self {
        Self {
            kind: node.kind().to_string(),
            start: node.start_byte(),
            end: node.end_byte(),
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
            text: source.get(node.byte_range()).unwrap_or("").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifiedChange {
    pub old: TreeChange,
    pub new: TreeChange,
    pub change_type: TreeChangeType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeDiff {
    pub added: Vec<TreeChange>,
    pub removed: Vec<TreeChange>,
    pub modified: Vec<ModifiedChange>,
}

impl TreeDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Nodes that never take part in hashing or reporting
pub fn is_trivia(node: &Node) -> bool {
    node.kind() == "comment" || node.is_missing()
}

/// Formatting- and comment-insensitive hash of the subtree under `node`
pub fn structural_hash(node: &Node, source: &str) -> u64 {
    let mut hashes = HashMap::new();
    hash_subtree(node, source, &mut hashes)
}

fn hash_subtree(node: &Node, source: &str, hashes: &mut HashMap<usize, u64>) -> u64 {
    let mut hasher = Xxh3::new();
    hasher.update(node.kind().as_bytes());
    if node.child_count() == 0 {
        hasher.update(&[0]);
        hasher.update(source.get(node.byte_range()).unwrap_or("").as_bytes());
    } else {
        hasher.update(&[1]);
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).filter(|c| !is_trivia(c)).collect();
        for child in children {
            let child_hash = hash_subtree(&child, source, hashes);
            hasher.update(&child_hash.to_le_bytes());
        }
    }
    let hash = hasher.digest();
    hashes.insert(node.id(), hash);
    hash
}

/// Concatenated leaf texts, without comments or whitespace
fn flattened_text(node: &Node, source: &str) -> String {
    let mut out = String::new();
    let mut stack = vec![*node];
    while let Some(current) = stack.pop() {
        if is_trivia(&current) {
            continue;
        }
        if current.child_count() == 0 {
            out.push_str(source.get(current.byte_range()).unwrap_or(""));
            continue;
        }
        let mut cursor = current.walk();
        let children: Vec<Node> = current.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    out
}

/// Hashes and lookups of one side of the comparison
struct HashedTree<'t> {
    source: &'t str,
    root: Node<'t>,
    hashes: HashMap<usize, u64>,
    present: HashSet<(&'static str, u64)>,
}

impl<'t> HashedTree<'t> {
    fn new(parsed: &'t ParsedFile) -> Self {
        let root = parsed.root_node();
        let source = parsed.source.as_str();
        let mut hashes = HashMap::new();
        hash_subtree(&root, source, &mut hashes);

        let mut present = HashSet::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if is_trivia(&node) {
                continue;
            }
            if let Some(&hash) = hashes.get(&node.id()) {
                present.insert((node.kind(), hash));
            }
            let mut cursor = node.walk();
            stack.extend(node.children(&mut cursor));
        }

        Self {
            source,
            root,
            hashes,
            present,
        }
    }

    fn hash(&self, node: &Node) -> u64 {
        self.hashes.get(&node.id()).copied().unwrap_or_default()
    }

    fn contains(&self, node: &Node, other: &HashedTree) -> bool {
        self.present.contains(&(node.kind(), other.hash(node)))
    }

    /// Pre-order node lists keyed by `(grammar_name, start_byte)`
    fn positions(&self) -> HashMap<(&'static str, usize), Vec<Node<'t>>> {
        let mut positions: HashMap<(&'static str, usize), Vec<Node<'t>>> = HashMap::new();
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            if is_trivia(&node) {
                continue;
            }
            positions
                .entry((node.grammar_name(), node.start_byte()))
                .or_default()
                .push(node);
            let mut cursor = node.walk();
            let children: Vec<Node> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
        positions
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TreeDiffer;

impl TreeDiffer {
    pub fn new() -> Self {
        Self
    }

    pub fn compare_text(&self, old: &str, new: &str) -> Result<TreeDiff> {
        let parser = Parser::default();
        let old = parser.parse_text(old)?;
        let new = parser.parse_text(new)?;
        Ok(self.compare(&old, &new))
    }

    pub fn compare(&self, old: &ParsedFile, new: &ParsedFile) -> TreeDiff {
        let old_tree = HashedTree::new(old);
        let new_tree = HashedTree::new(new);

        // Positional counterparts: the k-th old node at a (kind, start) pairs
        // with the k-th new node at the same key
        let old_positions = old_tree.positions();
        let mut pairs: HashMap<usize, Node> = HashMap::new();
        let mut paired_old: HashSet<usize> = HashSet::new();
        for (key, new_nodes) in new_tree.positions() {
            if let Some(old_nodes) = old_positions.get(&key) {
                for (new_node, old_node) in new_nodes.iter().zip(old_nodes) {
                    pairs.insert(new_node.id(), *old_node);
                    paired_old.insert(old_node.id());
                }
            }
        }

        let mut diff = TreeDiff::default();
        collect_new_side(&new_tree.root, &new_tree, &old_tree, &pairs, &mut diff);
        collect_removed(&old_tree.root, &old_tree, &new_tree, &paired_old, &mut diff.removed);
        diff
    }
}

fn collect_new_side(
    node: &Node,
    new_tree: &HashedTree,
    old_tree: &HashedTree,
    pairs: &HashMap<usize, Node>,
    diff: &mut TreeDiff,
) {
    if is_trivia(node) || old_tree.contains(node, new_tree) {
        return;
    }

    match pairs.get(&node.id()) {
        Some(old_node) => {
            if node.is_named() {
                let old_flat = flattened_text(old_node, old_tree.source);
                let new_flat = flattened_text(node, new_tree.source);
                let change_type = if old_node.kind() != node.kind() {
                    TreeChangeType::KindMismatch
                } else if old_flat != new_flat {
                    TreeChangeType::ContentChanged
                } else {
                    TreeChangeType::InternalStructureChanged
                };
                diff.modified.push(ModifiedChange {
                    old: TreeChange::from_node(old_node, old_tree.source),
                    new: TreeChange::from_node(node, new_tree.source),
                    change_type,
                });
            }
            let mut cursor = node.walk();
            let children: Vec<Node> = node.children(&mut cursor).collect();
            for child in children {
                collect_new_side(&child, new_tree, old_tree, pairs, diff);
            }
        }
        None => {
            if node.is_named() {
                diff.added.push(TreeChange::from_node(node, new_tree.source));
            }
        }
    }
}

fn collect_removed(
    node: &Node,
    old_tree: &HashedTree,
    new_tree: &HashedTree,
    paired_old: &HashSet<usize>,
    removed: &mut Vec<TreeChange>,
) {
    if is_trivia(node) || new_tree.contains(node, old_tree) {
        return;
    }
    if paired_old.contains(&node.id()) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        for child in children {
            collect_removed(&child, old_tree, new_tree, paired_old, removed);
        }
    } else if node.is_named() {
        removed.push(TreeChange::from_node(node, old_tree.source));
    }
}
