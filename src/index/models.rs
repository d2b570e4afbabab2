use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of a graph or scope vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Class,
    Interface,
    Method,
    Property,
    Field,
    Constructor,
    LocalVariable,
    Parameter,
    ControlFlow,
    Statement,
    Keyword,
    StringLiteral,
    NumericLiteral,
}

impl SymbolKind {
    /// Declarations carry a stable, signature-based id
    pub fn is_declaration(&self) -> bool {
        matches!(
            self,
            SymbolKind::Class
                | SymbolKind::Interface
                | SymbolKind::Method
                | SymbolKind::Property
                | SymbolKind::Field
                | SymbolKind::Constructor
        )
    }

    pub fn is_type(&self) -> bool {
        matches!(self, SymbolKind::Class | SymbolKind::Interface)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, SymbolKind::Method | SymbolKind::Constructor)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Method => "method",
            SymbolKind::Property => "property",
            SymbolKind::Field => "field",
            SymbolKind::Constructor => "constructor",
            SymbolKind::LocalVariable => "local_variable",
            SymbolKind::Parameter => "parameter",
            SymbolKind::ControlFlow => "control_flow",
            SymbolKind::Statement => "statement",
            SymbolKind::Keyword => "keyword",
            SymbolKind::StringLiteral => "string_literal",
            SymbolKind::NumericLiteral => "numeric_literal",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a directed edge between two symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    Inherits,
    Implements,
    Calls,
    Accesses,
    UsesType,
}

impl LinkKind {
    /// Deep links are followed transitively by the dependency tracker
    pub fn is_deep(&self) -> bool {
        matches!(self, LinkKind::Calls | LinkKind::Implements)
    }
}

/// A typed edge; `start`/`length` locate the reference site, not the target
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolLink {
    pub target_id: String,
    pub kind: LinkKind,
    pub start: usize,
    pub length: usize,
}

impl SymbolLink {
    pub fn new(target_id: impl Into<String>, kind: LinkKind, start: usize, length: usize) -> Self {
        Self {
            target_id: target_id.into(),
            kind,
            start,
            length,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolNode {
    pub id: String,
    pub name: String,
    pub kind: SymbolKind,
    pub file_path: String,
    pub start: usize,
    pub length: usize,
    pub outgoing_links: BTreeSet<SymbolLink>,
}

impl SymbolNode {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: SymbolKind,
        file_path: impl Into<String>,
        start: usize,
        length: usize,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            file_path: file_path.into(),
            start,
            length,
            outgoing_links: BTreeSet::new(),
        }
    }

    pub fn end(&self) -> usize {
        self.start + self.length
    }

    /// Adds an edge unless it points back at this node
    pub fn link(&mut self, link: SymbolLink) -> bool {
        if link.target_id == self.id {
            return false;
        }
        self.outgoing_links.insert(link)
    }

    /// Exact source slice of this node in `text`, if the span is still valid
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.get(self.start..self.end())
    }
}

/// Index into [`ScopeTree::nodes`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeNode {
    pub id: ScopeId,
    pub name: String,
    pub kind: SymbolKind,
    pub file_path: String,
    pub start: usize,
    pub length: usize,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
}

impl ScopeNode {
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset <= self.end()
    }
}

/// Containment tree of one file. `nodes` is the flat list in appearance order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeTree {
    pub file_path: String,
    pub nodes: Vec<ScopeNode>,
    pub roots: Vec<ScopeId>,
}

impl ScopeTree {
    pub fn get(&self, id: ScopeId) -> Option<&ScopeNode> {
        self.nodes.get(id.0)
    }

    pub fn children(&self, id: ScopeId) -> impl Iterator<Item = &ScopeNode> {
        self.get(id)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|c| self.get(*c))
    }

    pub fn root_nodes(&self) -> impl Iterator<Item = &ScopeNode> {
        self.roots.iter().filter_map(|r| self.get(*r))
    }

    pub fn parent(&self, id: ScopeId) -> Option<&ScopeNode> {
        self.get(id).and_then(|n| n.parent).and_then(|p| self.get(p))
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// Normalizes a path for use as a file index key
pub fn normalize_path(path: &str) -> String {
    let mut normalized = path.replace('\\', "/");
    while normalized.contains("//") {
        normalized = normalized.replace("//", "/");
    }
    if let Some(stripped) = normalized.strip_prefix("./") {
        normalized = stripped.to_string();
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_drops_self_reference() {
        let mut node = SymbolNode::new("App.Foo.Run()", "Run", SymbolKind::Method, "Foo.cs", 0, 10);
        assert!(!node.link(SymbolLink::new("App.Foo.Run()", LinkKind::Calls, 3, 3)));
        assert!(node.link(SymbolLink::new("App.Bar.Go()", LinkKind::Calls, 3, 2)));
        assert!(!node.link(SymbolLink::new("App.Bar.Go()", LinkKind::Calls, 3, 2)));
        assert_eq!(node.outgoing_links.len(), 1);
    }

    #[test]
    fn test_slice() {
        let node = SymbolNode::new("x", "x", SymbolKind::Field, "a.cs", 6, 3);
        assert_eq!(node.slice("class Foo {}"), Some("Foo"));
        assert_eq!(node.slice("short"), None);
    }

    #[test]
    fn test_declaration_kinds() {
        assert!(SymbolKind::Constructor.is_declaration());
        assert!(!SymbolKind::LocalVariable.is_declaration());
        assert!(SymbolKind::Interface.is_type());
        assert!(LinkKind::Calls.is_deep());
        assert!(LinkKind::Implements.is_deep());
        assert!(!LinkKind::UsesType.is_deep());
        assert!(!LinkKind::Accesses.is_deep());
        assert!(!LinkKind::Inherits.is_deep());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("src\\Models\\Order.cs"), "src/Models/Order.cs");
        assert_eq!(normalize_path("./src//Order.cs"), "src/Order.cs");
        assert_eq!(normalize_path("/abs/path/A.cs"), "/abs/path/A.cs");
    }

    #[test]
    fn test_scope_tree_navigation() {
        let tree = ScopeTree {
            file_path: "a.cs".to_string(),
            nodes: vec![
                ScopeNode {
                    id: ScopeId(0),
                    name: "Foo".to_string(),
                    kind: SymbolKind::Class,
                    file_path: "a.cs".to_string(),
                    start: 0,
                    length: 100,
                    parent: None,
                    children: vec![ScopeId(1)],
                },
                ScopeNode {
                    id: ScopeId(1),
                    name: "Run".to_string(),
                    kind: SymbolKind::Method,
                    file_path: "a.cs".to_string(),
                    start: 10,
                    length: 50,
                    parent: Some(ScopeId(0)),
                    children: Vec::new(),
                },
            ],
            roots: vec![ScopeId(0)],
        };

        assert_eq!(tree.root_nodes().count(), 1);
        assert_eq!(tree.children(ScopeId(0)).next().unwrap().name, "Run");
        assert_eq!(tree.parent(ScopeId(1)).unwrap().name, "Foo");
        assert!(tree.parent(ScopeId(0)).is_none());
    }
}
