//! Scope Builder for constructing per-file containment trees
//!
//! Types, members and control-flow constructs become scope nodes; the tree
//! is built from one syntax tree only and never consults other files.

use tree_sitter::Node;

use crate::index::{ScopeId, ScopeNode, ScopeTree, SymbolKind};
use crate::indexer::parser::ParsedFile;
use crate::indexer::signature::{control_flow_keyword, declaration_name, named_children, type_kind, MemberKind};

/// Builder for constructing scope trees from a syntax tree
#[derive(Default)]
pub struct ScopeBuilder;

impl ScopeBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Builds the scope tree of a parsed file
    pub fn build(&self, parsed: &ParsedFile, file_path: &str) -> ScopeTree {
        let mut tree = ScopeTree {
            file_path: file_path.to_string(),
            ..ScopeTree::default()
        };
        self.build_recursive(&parsed.root_node(), &parsed.source, None, &mut tree);
        tracing::debug!("Built {} scopes for {}", tree.len(), file_path);
        tree
    }

    fn build_recursive(&self, node: &Node, source: &str, parent: Option<ScopeId>, tree: &mut ScopeTree) {
        let parent = match node_to_scope(node, source) {
            Some((kind, name)) => Some(push_scope(tree, kind, name, node.start_byte(), node.end_byte(), parent)),
            None => parent,
        };

        if node.kind() == "if_statement" {
            return self.build_if(node, source, parent, tree);
        }

        for child in named_children(node) {
            self.build_recursive(&child, source, parent, tree);
        }
    }

    /// `else` wraps the alternative branch unless it is an `else if`
    fn build_if(&self, node: &Node, source: &str, parent: Option<ScopeId>, tree: &mut ScopeTree) {
        let alternative = node.child_by_field_name("alternative");
        for child in named_children(node) {
            if Some(child) != alternative {
                self.build_recursive(&child, source, parent, tree);
            }
        }

        let Some(alternative) = alternative else {
            return;
        };
        if alternative.kind() == "if_statement" {
            return self.build_recursive(&alternative, source, parent, tree);
        }

        let mut cursor = node.walk();
        let else_start = node
            .children(&mut cursor)
            .find(|c| c.kind() == "else")
            .map(|c| c.start_byte())
            .unwrap_or_else(|| alternative.start_byte());
        let else_scope = push_scope(
            tree,
            SymbolKind::ControlFlow,
            "else".to_string(),
            else_start,
            alternative.end_byte(),
            parent,
        );
        self.build_recursive(&alternative, source, Some(else_scope), tree);
    }
}

fn node_to_scope(node: &Node, source: &str) -> Option<(SymbolKind, String)> {
    if let Some(kind) = type_kind(node) {
        return Some((kind, declaration_name(node, source).unwrap_or_default()));
    }
    if let Some(keyword) = control_flow_keyword(node) {
        return Some((SymbolKind::ControlFlow, keyword.to_string()));
    }
    match MemberKind::from_node(node)? {
        MemberKind::Method | MemberKind::Destructor | MemberKind::Operator => {
            Some((SymbolKind::Method, declaration_name(node, source).unwrap_or_default()))
        }
        MemberKind::Constructor => {
            Some((SymbolKind::Constructor, declaration_name(node, source).unwrap_or_default()))
        }
        MemberKind::Property | MemberKind::Indexer => {
            Some((SymbolKind::Property, declaration_name(node, source).unwrap_or_default()))
        }
        MemberKind::Field | MemberKind::Event => None,
    }
}

fn push_scope(
    tree: &mut ScopeTree,
    kind: SymbolKind,
    name: String,
    start: usize,
    end: usize,
    parent: Option<ScopeId>,
) -> ScopeId {
    let id = ScopeId(tree.nodes.len());
    tree.nodes.push(ScopeNode {
        id,
        name,
        kind,
        file_path: tree.file_path.clone(),
        start,
        length: end - start,
        parent,
        children: Vec::new(),
    });
    match parent.and_then(|p| tree.nodes.get_mut(p.0)) {
        Some(parent) => parent.children.push(id),
        None => tree.roots.push(id),
    }
    id
}

/// Finds the innermost scope containing a given offset
pub fn scope_at_offset(tree: &ScopeTree, offset: usize) -> Option<&ScopeNode> {
    tree.nodes
        .iter()
        .filter(|s| s.contains(offset))
        .min_by_key(|s| s.length)
}

/// Scopes containing `offset`, innermost first
pub fn scope_chain(tree: &ScopeTree, offset: usize) -> Vec<&ScopeNode> {
    let mut chain = Vec::new();
    let mut current = scope_at_offset(tree, offset);
    while let Some(scope) = current {
        chain.push(scope);
        current = scope.parent.and_then(|p| tree.get(p));
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::parser::Parser;

    fn build(source: &str) -> ScopeTree {
        let parsed = Parser::default().parse_text(source).unwrap();
        ScopeBuilder::new().build(&parsed, "Test.cs")
    }

    fn names(tree: &ScopeTree) -> Vec<(SymbolKind, String)> {
        tree.nodes.iter().map(|n| (n.kind, n.name.clone())).collect()
    }

    const SOURCE: &str = r#"
namespace App
{
    public class Worker
    {
        public int Count { get; set; }

        public Worker() { }

        public void Run(int x)
        {
            if (x > 0)
            {
                for (var i = 0; i < x; i++) { }
            }
            else if (x < -5)
            {
            }
            else
            {
                while (true) { }
            }

            try { } catch (Exception) { } finally { }
        }
    }

    interface IWorker { void Run(int x); }
}
"#;

    #[test]
    fn test_flat_list_in_appearance_order() {
        let tree = build(SOURCE);
        let expected = vec![
            (SymbolKind::Class, "Worker"),
            (SymbolKind::Property, "Count"),
            (SymbolKind::Constructor, "Worker"),
            (SymbolKind::Method, "Run"),
            (SymbolKind::ControlFlow, "if"),
            (SymbolKind::ControlFlow, "for"),
            (SymbolKind::ControlFlow, "if"),
            (SymbolKind::ControlFlow, "else"),
            (SymbolKind::ControlFlow, "while"),
            (SymbolKind::ControlFlow, "try"),
            (SymbolKind::ControlFlow, "catch"),
            (SymbolKind::ControlFlow, "finally"),
            (SymbolKind::Interface, "IWorker"),
            (SymbolKind::Method, "Run"),
        ];
        let expected: Vec<(SymbolKind, String)> =
            expected.into_iter().map(|(k, n)| (k, n.to_string())).collect();
        assert_eq!(names(&tree), expected);
    }

    #[test]
    fn test_hierarchy() {
        let tree = build(SOURCE);
        let roots: Vec<&str> = tree.root_nodes().map(|n| n.name.as_str()).collect();
        assert_eq!(roots, vec!["Worker", "IWorker"]);

        let run = tree.nodes.iter().find(|n| n.name == "Run" && n.kind == SymbolKind::Method).unwrap();
        let run_children: Vec<&str> = tree.children(run.id).map(|n| n.name.as_str()).collect();
        assert_eq!(run_children, vec!["if", "try"]);

        // else-if nests under the outer if, the final else under the inner one
        let outer_if = tree.children(run.id).next().unwrap();
        let inner: Vec<&str> = tree.children(outer_if.id).map(|n| n.name.as_str()).collect();
        assert_eq!(inner, vec!["for", "if"]);
        let else_if = tree.children(outer_if.id).nth(1).unwrap();
        let else_scope = tree.children(else_if.id).next().unwrap();
        assert_eq!(else_scope.name, "else");
        assert!(else_scope.start > else_if.start && else_scope.end() == else_if.end());
        assert_eq!(tree.children(else_scope.id).next().unwrap().name, "while");
    }

    #[test]
    fn test_parent_spans_contain_children() {
        let tree = build(SOURCE);
        for node in &tree.nodes {
            if let Some(parent) = tree.parent(node.id) {
                assert!(parent.start <= node.start && node.end() <= parent.end());
            }
            assert_eq!(node.file_path, "Test.cs");
        }
    }

    #[test]
    fn test_scope_lookup() {
        let tree = build(SOURCE);
        let offset = SOURCE.find("while").unwrap() + 2;

        let inner = scope_at_offset(&tree, offset).unwrap();
        assert_eq!(inner.name, "while");

        let chain: Vec<&str> = scope_chain(&tree, offset).iter().map(|s| s.name.as_str()).collect();
        assert_eq!(chain, vec!["while", "else", "if", "if", "Run", "Worker"]);

        assert!(scope_at_offset(&tree, 0).is_none());
    }

    #[test]
    fn test_empty_and_broken_input() {
        assert!(build("").is_empty());
        let broken = "class Broken { void M( { if (";
        let tree = build(broken);
        for node in &tree.nodes {
            assert!(node.end() <= broken.len());
        }
    }
}
