//! Integration tests for building prompt context from a selection.

use tempfile::TempDir;

use code_context::{AnalysisEngine, ContextFlags, SelectionItem};

const ORDER: &str = r#"using System;
using System.Linq;

namespace Shop.Models
{
    /// <summary>An order.</summary>
    public class Order
    {
        // running total
        public decimal Total { get; set; }



        public void Clear()
        {
            Total = 0; /* reset */
        }
    }
}
"#;

const CART: &str = r#"namespace Shop;

public class Cart
{
    public int Count { get; set; }

    public void Add(int n)
    {
        Count += n;
    }

    public void Remove(int n)
    {
        Count -= n;
    }
}
"#;

fn project() -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    std::fs::create_dir_all(dir.path().join("Models")).unwrap();
    std::fs::write(dir.path().join("Models/Order.cs"), ORDER).unwrap();
    std::fs::write(dir.path().join("Cart.cs"), CART).unwrap();
    dir
}

#[tokio::test]
async fn test_whole_file_cleanup() {
    let dir = project();
    let engine = AnalysisEngine::default();
    let selection = vec![SelectionItem::whole_file("Models/Order.cs")];

    let text = engine
        .build_context(&selection, dir.path(), &ContextFlags::default())
        .await
        .unwrap();
    assert_eq!(
        text,
        "// File: Models/Order.cs\npublic class Order\n{\n    public decimal Total { get; set; }\n\n\n    public void Clear()\n    {\n        Total = 0;\n    }\n}\n"
    );
    // whole-file selections never need the graph
    assert!(engine.current_graph().await.is_none());
}

#[tokio::test]
async fn test_flags_off_keeps_text_verbatim() {
    let dir = project();
    let engine = AnalysisEngine::default();
    let selection = vec![SelectionItem::whole_file("Cart.cs")];
    let text = engine
        .build_context(&selection, dir.path(), &ContextFlags::none())
        .await
        .unwrap();
    assert_eq!(text, format!("// File: Cart.cs\n{}", CART));
}

#[tokio::test]
async fn test_partial_selection_is_sorted_exact_slices() {
    let dir = project();
    let engine = AnalysisEngine::default();
    let selection = vec![
        SelectionItem::declaration("Cart.cs", "Shop.Cart.Remove(int)"),
        SelectionItem {
            file_path: "Cart.cs::Shop.Cart.Add(int)".to_string(),
            declaration_id: None,
            is_whole_file: false,
        },
    ];

    let text = engine
        .build_context(&selection, dir.path(), &ContextFlags::default())
        .await
        .unwrap();
    assert_eq!(
        text,
        "// File: Cart.cs\npublic void Add(int n)\n    {\n        Count += n;\n    }\n\npublic void Remove(int n)\n    {\n        Count -= n;\n    }\n"
    );
}

#[tokio::test]
async fn test_sections_follow_first_appearance() {
    let dir = project();
    let engine = AnalysisEngine::default();
    let selection = vec![
        SelectionItem::declaration("Cart.cs", "Shop.Cart.Count"),
        SelectionItem::whole_file("Missing.cs"),
        SelectionItem::whole_file("Models/Order.cs"),
    ];

    let text = engine
        .build_context(&selection, dir.path(), &ContextFlags::default())
        .await
        .unwrap();
    let cart = text.find("// File: Cart.cs").unwrap();
    let order = text.find("// File: Models/Order.cs").unwrap();
    assert!(cart < order);
    assert!(!text.contains("Missing.cs"));
    assert!(text.starts_with("// File: Cart.cs\npublic int Count { get; set; }\n\n// File: Models/Order.cs\n"));
}
