//! Integration tests for project indexing and dependency closure.

use std::path::Path;

use tempfile::TempDir;

use code_context::index::normalize_path;
use code_context::indexer::signature::{declaration_name, member_signature, type_kind};
use code_context::{
    get_deep_dependencies, GraphBuilder, IndexerError, LinkKind, Parser, SymbolGraph, SymbolKind,
};

const MODELS: &str = r#"using System.Collections.Generic;

namespace App.Models
{
    public interface IEntity { int Id { get; } }

    public class Entity : IEntity
    {
        public int Id { get; set; }
    }

    public class Order : Entity
    {
        public decimal Total { get; set; }
        private List<Line> _lines = new List<Line>();

        public Order(int id) { Id = id; }

        public void AddLine(Line line)
        {
            _lines.Add(line);
            Recalculate();
        }

        public void Recalculate()
        {
            Total = 0;
        }
    }

    public class Line
    {
        public decimal Price { get; set; }
    }
}
"#;

const SERVICE: &str = r#"using App.Models;

namespace App.Services;

public class OrderService
{
    public Order Create(int id)
    {
        var order = new Order(id);
        order.AddLine(new Line { Price = 3 });
        return order;
    }
}
"#;

fn project() -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    std::fs::create_dir_all(dir.path().join("Models")).unwrap();
    std::fs::create_dir_all(dir.path().join("Services")).unwrap();
    std::fs::write(dir.path().join("Models/Order.cs"), MODELS).unwrap();
    std::fs::write(dir.path().join("Services/OrderService.cs"), SERVICE).unwrap();
    std::fs::write(dir.path().join("README.md"), "# not code\n").unwrap();
    dir
}

fn index(dir: &Path) -> SymbolGraph {
    GraphBuilder::default().index_project(dir).expect("Failed to index")
}

#[test]
fn test_cross_file_edges() {
    let dir = project();
    let graph = index(dir.path());

    let create = graph.node("App.Services.OrderService.Create(int)").expect("Create indexed");
    let has = |target: &str, kind: LinkKind| {
        create
            .outgoing_links
            .iter()
            .any(|l| l.target_id == target && l.kind == kind)
    };
    assert!(has("App.Models.Order..ctor(int)", LinkKind::Calls));
    assert!(has("App.Models.Order.AddLine(Line)", LinkKind::Calls));
    assert!(has("App.Models.Line.Price", LinkKind::Accesses));
    assert!(has("App.Models.Order", LinkKind::UsesType));
    assert_eq!(graph.implementers("App.Models.IEntity"), &["App.Models.Entity".to_string()]);
}

#[test]
fn test_link_sites_point_at_references() {
    let dir = project();
    let graph = index(dir.path());
    let create = graph.node("App.Services.OrderService.Create(int)").unwrap();

    for link in &create.outgoing_links {
        let site = &SERVICE[link.start..link.start + link.length];
        match link.kind {
            LinkKind::Calls if link.target_id.ends_with("AddLine(Line)") => assert_eq!(site, "AddLine"),
            LinkKind::Accesses => assert_eq!(site, "Price"),
            _ => {}
        }
    }
}

#[test]
fn test_declaration_spans_round_trip() {
    let dir = project();
    let graph = index(dir.path());
    let parser = Parser::default();

    let mut checked = 0;
    for (path, nodes) in &graph.file_index {
        let text = std::fs::read_to_string(path).expect("indexed file is readable");
        for node in nodes.iter().filter(|n| n.kind.is_declaration()) {
            let slice = node.slice(&text).expect("span inside file");
            let wrapped = if node.kind.is_type() {
                slice.to_string()
            } else {
                format!("class Host\n{{\n{}\n}}\n", slice)
            };
            let parsed = parser.parse_text(&wrapped).unwrap();

            let mut stack = vec![parsed.root_node()];
            let mut found = false;
            while let Some(n) = stack.pop() {
                let matches = if node.kind.is_type() {
                    type_kind(&n).is_some()
                        && declaration_name(&n, &parsed.source).as_deref() == Some(node.name.as_str())
                } else {
                    member_signature(&n, &parsed.source)
                        .is_some_and(|sig| node.id.ends_with(&format!(".{}", sig)))
                };
                if matches {
                    found = true;
                    break;
                }
                let mut cursor = n.walk();
                stack.extend(n.named_children(&mut cursor));
            }
            assert!(found, "{} did not re-parse from its span", node.id);
            checked += 1;
        }
    }
    assert!(checked >= 12);
}

#[test]
fn test_file_index_is_normalized_and_sorted() {
    let dir = project();
    let graph = index(dir.path());
    assert_eq!(graph.file_index.len(), 2);
    for (path, nodes) in &graph.file_index {
        assert_eq!(path, &normalize_path(path));
        assert!(nodes.windows(2).all(|w| w[0].start <= w[1].start));
        for node in nodes {
            assert!(std::sync::Arc::ptr_eq(node, graph.node(&node.id).unwrap()));
        }
    }
}

#[test]
fn test_unparseable_file_does_not_abort_the_batch() {
    let dir = project();
    std::fs::write(dir.path().join("Broken.cs"), "class { void ( {{{ ;;").unwrap();
    let graph = index(dir.path());
    assert!(graph.node("App.Models.Order").is_some());
    assert!(graph.node("App.Services.OrderService").is_some());
}

#[test]
fn test_unreadable_root_is_an_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing");
    let err = GraphBuilder::default().index_project(&missing).unwrap_err();
    assert!(matches!(err, IndexerError::ProjectRoot(_)));
}

#[test]
fn test_deep_dependencies_stop_at_shallow_edges() {
    let dir = project();
    let graph = index(dir.path());
    let deps = get_deep_dependencies(&graph, "App.Services.OrderService.Create(int)");

    for id in [
        "App.Services.OrderService.Create(int)",
        "App.Models.Order..ctor(int)",
        "App.Models.Order.AddLine(Line)",
        "App.Models.Order.Recalculate()",
        "App.Models.Order.Total",
        "App.Models.Order",
        "App.Models.Line.Price",
    ] {
        assert!(deps.contains(id), "missing {}", id);
    }
    // only reachable through Order's Inherits edge, which is never expanded
    assert!(!deps.contains("App.Models.Entity"));
    assert!(deps
        .iter()
        .all(|id| graph.node(id).map_or(true, |n| n.kind != SymbolKind::Parameter)));
}
