//! In-memory cross-file symbol graph.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use super::models::{normalize_path, LinkKind, SymbolKind, SymbolNode};

/// Resolved symbols of one project plus the typed edges between them.
///
/// Every node listed in `file_index` is the same `Arc` as the one stored in
/// `nodes`; per-file lists are ordered by `start`.
#[derive(Debug, Clone, Default)]
pub struct SymbolGraph {
    pub nodes: HashMap<String, Arc<SymbolNode>>,
    pub file_index: HashMap<String, Vec<Arc<SymbolNode>>>,
    pub interface_implementations: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphStats {
    pub files: usize,
    pub nodes: usize,
    pub declarations: usize,
    pub links: usize,
    pub links_by_kind: HashMap<String, usize>,
    pub interfaces_implemented: usize,
}

impl SymbolGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node into both maps. Call [`SymbolGraph::finish_all`] once every file is in.
    pub fn insert(&mut self, node: SymbolNode) -> Arc<SymbolNode> {
        let node = Arc::new(node);
        let key = normalize_path(&node.file_path);
        self.nodes.insert(node.id.clone(), Arc::clone(&node));
        self.file_index.entry(key).or_default().push(Arc::clone(&node));
        node
    }

    pub fn add_implementation(&mut self, interface_id: &str, implementer_id: &str) {
        let implementers = self
            .interface_implementations
            .entry(interface_id.to_string())
            .or_default();
        if !implementers.iter().any(|i| i == implementer_id) {
            implementers.push(implementer_id.to_string());
        }
    }

    /// Restores `start` ordering of every file's node list, outer nodes first
    pub fn finish_all(&mut self) {
        for list in self.file_index.values_mut() {
            list.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| b.length.cmp(&a.length)));
        }
    }

    pub fn node(&self, id: &str) -> Option<&Arc<SymbolNode>> {
        self.nodes.get(id)
    }

    pub fn nodes_in_file(&self, path: &str) -> &[Arc<SymbolNode>] {
        self.file_index
            .get(&normalize_path(path))
            .map(|v| v.as_slice())
            .unwrap_or_default()
    }

    /// All nodes with the given simple name, optionally restricted to one kind
    pub fn find_by_name(&self, name: &str, kind: Option<SymbolKind>) -> Vec<&Arc<SymbolNode>> {
        let mut found: Vec<_> = self
            .nodes
            .values()
            .filter(|n| n.name == name && kind.map_or(true, |k| n.kind == k))
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }

    pub fn implementers(&self, interface_id: &str) -> &[String] {
        self.interface_implementations
            .get(interface_id)
            .map(|v| v.as_slice())
            .unwrap_or_default()
    }

    /// Innermost type declaration enclosing `node` in the same file
    pub fn declaring_type(&self, node: &SymbolNode) -> Option<&Arc<SymbolNode>> {
        self.nodes_in_file(&node.file_path)
            .iter()
            .filter(|n| {
                n.kind.is_type()
                    && n.id != node.id
                    && n.start <= node.start
                    && node.end() <= n.end()
            })
            .min_by_key(|n| n.length)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn stats(&self) -> GraphStats {
        let mut links_by_kind: HashMap<String, usize> = HashMap::new();
        let mut links = 0;
        for node in self.nodes.values() {
            for link in &node.outgoing_links {
                links += 1;
                *links_by_kind.entry(link_kind_name(link.kind).to_string()).or_default() += 1;
            }
        }

        GraphStats {
            files: self.file_index.len(),
            nodes: self.nodes.len(),
            declarations: self.nodes.values().filter(|n| n.kind.is_declaration()).count(),
            links,
            links_by_kind,
            interfaces_implemented: self.interface_implementations.len(),
        }
    }
}

fn link_kind_name(kind: LinkKind) -> &'static str {
    match kind {
        LinkKind::Inherits => "inherits",
        LinkKind::Implements => "implements",
        LinkKind::Calls => "calls",
        LinkKind::Accesses => "accesses",
        LinkKind::UsesType => "uses_type",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::models::SymbolLink;

    fn node(id: &str, name: &str, kind: SymbolKind, start: usize, length: usize) -> SymbolNode {
        SymbolNode::new(id, name, kind, "src/Foo.cs", start, length)
    }

    #[test]
    fn test_insert_shares_node_between_maps() {
        let mut graph = SymbolGraph::new();
        let inserted = graph.insert(node("App.Foo", "Foo", SymbolKind::Class, 0, 50));

        let by_id = graph.node("App.Foo").unwrap();
        let by_file = &graph.nodes_in_file("src/Foo.cs")[0];
        assert!(Arc::ptr_eq(&inserted, by_id));
        assert!(Arc::ptr_eq(by_id, by_file));
    }

    #[test]
    fn test_finish_all_orders_by_start() {
        let mut graph = SymbolGraph::new();
        graph.insert(node("App.Foo.B()", "B", SymbolKind::Method, 30, 5));
        graph.insert(node("App.Foo.A()", "A", SymbolKind::Method, 0, 5));
        graph.insert(node("App.Foo", "Foo", SymbolKind::Class, 0, 50));
        graph.finish_all();

        let ids: Vec<&str> = graph.nodes_in_file("src\\Foo.cs").iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["App.Foo", "App.Foo.A()", "App.Foo.B()"]);
    }

    #[test]
    fn test_declaring_type() {
        let mut graph = SymbolGraph::new();
        graph.insert(node("App.Foo", "Foo", SymbolKind::Class, 0, 100));
        graph.insert(node("App.Foo.Inner", "Inner", SymbolKind::Class, 20, 50));
        let method = graph.insert(node("App.Foo.Inner.Run()", "Run", SymbolKind::Method, 30, 10));
        graph.finish_all();

        assert_eq!(graph.declaring_type(&method).unwrap().id, "App.Foo.Inner");
    }

    #[test]
    fn test_stats_and_implementations() {
        let mut graph = SymbolGraph::new();
        let mut class = node("App.Foo", "Foo", SymbolKind::Class, 0, 100);
        class.link(SymbolLink::new("App.IFoo", LinkKind::Implements, 12, 4));
        graph.insert(class);
        graph.insert(node("App.IFoo", "IFoo", SymbolKind::Interface, 110, 20));
        graph.add_implementation("App.IFoo", "App.Foo");
        graph.add_implementation("App.IFoo", "App.Foo");

        let stats = graph.stats();
        assert_eq!(stats.nodes, 2);
        assert_eq!(stats.links, 1);
        assert_eq!(stats.links_by_kind.get("implements"), Some(&1));
        assert_eq!(graph.implementers("App.IFoo"), &["App.Foo".to_string()]);
        assert!(graph.implementers("App.Missing").is_empty());
    }

    #[test]
    fn test_find_by_name() {
        let mut graph = SymbolGraph::new();
        graph.insert(node("App.Foo.Run()", "Run", SymbolKind::Method, 0, 5));
        graph.insert(node("App.Bar.Run()", "Run", SymbolKind::Method, 10, 5));
        graph.insert(node("App.Run", "Run", SymbolKind::Class, 20, 5));

        assert_eq!(graph.find_by_name("Run", Some(SymbolKind::Method)).len(), 2);
        assert_eq!(graph.find_by_name("Run", None).len(), 3);
    }
}
