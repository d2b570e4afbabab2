//! Declaration classification and normalized signatures for C# syntax nodes.
//!
//! Signatures identify "the same" member across files and across two
//! versions of a file: `Name(T1, T2)` for methods, `.ctor(T1)` for
//! constructors and the bare name for properties and fields.

use tree_sitter::Node;

use crate::index::SymbolKind;

pub const CONSTRUCTOR_NAME: &str = ".ctor";

/// Member categories that can be matched between two syntax trees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Method,
    Constructor,
    Destructor,
    Property,
    Indexer,
    Field,
    Event,
    Operator,
}

impl MemberKind {
    pub fn from_node(node: &Node) -> Option<Self> {
        match node.kind() {
            "method_declaration" | "local_function_statement" => Some(MemberKind::Method),
            "constructor_declaration" => Some(MemberKind::Constructor),
            "destructor_declaration" => Some(MemberKind::Destructor),
            "property_declaration" => Some(MemberKind::Property),
            "indexer_declaration" => Some(MemberKind::Indexer),
            "field_declaration" => Some(MemberKind::Field),
            "event_declaration" | "event_field_declaration" => Some(MemberKind::Event),
            "operator_declaration" | "conversion_operator_declaration" => Some(MemberKind::Operator),
            _ => None,
        }
    }

    pub fn symbol_kind(&self) -> SymbolKind {
        match self {
            MemberKind::Method | MemberKind::Destructor | MemberKind::Operator => SymbolKind::Method,
            MemberKind::Constructor => SymbolKind::Constructor,
            MemberKind::Property | MemberKind::Indexer => SymbolKind::Property,
            MemberKind::Field | MemberKind::Event => SymbolKind::Field,
        }
    }
}

/// Class/struct/record/enum map to `Class`, interfaces to `Interface`
pub fn type_kind(node: &Node) -> Option<SymbolKind> {
    match node.kind() {
        "class_declaration"
        | "struct_declaration"
        | "record_declaration"
        | "record_struct_declaration"
        | "enum_declaration" => Some(SymbolKind::Class),
        "interface_declaration" => Some(SymbolKind::Interface),
        _ => None,
    }
}

/// Whether the declaration carries `modifier` (e.g. `partial`, `static`)
pub fn has_modifier(node: &Node, source: &str, modifier: &str) -> bool {
    named_children(node)
        .iter()
        .any(|c| c.kind() == "modifier" && node_text(c, source) == modifier)
}

pub fn is_namespace(node: &Node) -> bool {
    matches!(
        node.kind(),
        "namespace_declaration" | "file_scoped_namespace_declaration"
    )
}

/// Keyword naming a control-flow construct, if `node` is one
pub fn control_flow_keyword(node: &Node) -> Option<&'static str> {
    match node.kind() {
        "if_statement" => Some("if"),
        "for_statement" => Some("for"),
        "foreach_statement" => Some("foreach"),
        "while_statement" => Some("while"),
        "do_statement" => Some("do"),
        "switch_statement" => Some("switch"),
        "try_statement" => Some("try"),
        "catch_clause" => Some("catch"),
        "finally_clause" => Some("finally"),
        _ => None,
    }
}

pub fn named_children<'t>(node: &Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    let children = node.named_children(&mut cursor).collect();
    children
}

/// Named children paired with the field they occupy in `node`
pub fn children_with_fields<'t>(node: &Node<'t>) -> Vec<(Option<&'static str>, Node<'t>)> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    if cursor.goto_first_child() {
        loop {
            let child = cursor.node();
            if child.is_named() {
                out.push((cursor.field_name(), child));
            }
            if !cursor.goto_next_sibling() {
                break;
            }
        }
    }
    out
}

pub fn node_text<'a>(node: &Node, source: &'a str) -> &'a str {
    source.get(node.byte_range()).unwrap_or("")
}

pub fn field_text<'a>(node: &Node, field: &str, source: &'a str) -> Option<&'a str> {
    node.child_by_field_name(field).map(|n| node_text(&n, source))
}

pub fn first_identifier<'t>(node: &Node<'t>) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    let found = node.named_children(&mut cursor).find(|c| c.kind() == "identifier");
    found
}

/// Variable declarators of a field/event/local declaration, in order
pub fn declarators<'t>(node: &Node<'t>) -> Vec<Node<'t>> {
    let mut out = Vec::new();
    collect_declarators(node, &mut out);
    out
}

fn collect_declarators<'t>(node: &Node<'t>, out: &mut Vec<Node<'t>>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "variable_declarator" => out.push(child),
            "variable_declaration" => collect_declarators(&child, out),
            _ => {}
        }
    }
}

/// Identifier node naming a variable declarator
pub fn declarator_name<'t>(declarator: &Node<'t>) -> Option<Node<'t>> {
    declarator
        .child_by_field_name("name")
        .or_else(|| first_identifier(declarator))
}

/// Declared type of a field/event/local declaration
pub fn declaration_type<'t>(node: &Node<'t>) -> Option<Node<'t>> {
    if let Some(ty) = node.child_by_field_name("type") {
        return Some(ty);
    }
    let mut cursor = node.walk();
    let declaration = node
        .named_children(&mut cursor)
        .find(|c| c.kind() == "variable_declaration");
    declaration.and_then(|d| d.child_by_field_name("type"))
}

/// Return type of a method or local function
pub fn return_type<'t>(node: &Node<'t>) -> Option<Node<'t>> {
    node.child_by_field_name("returns")
        .or_else(|| node.child_by_field_name("type"))
}

/// Simple name of a type or member declaration
pub fn declaration_name(node: &Node, source: &str) -> Option<String> {
    if let Some(kind) = MemberKind::from_node(node) {
        return match kind {
            MemberKind::Field | MemberKind::Event if node.child_by_field_name("name").is_none() => {
                let names: Vec<&str> = declarators(node)
                    .iter()
                    .filter_map(declarator_name)
                    .map(|n| node_text(&n, source))
                    .collect();
                if names.is_empty() {
                    None
                } else {
                    Some(names.join(", "))
                }
            }
            MemberKind::Indexer => Some("this".to_string()),
            MemberKind::Operator => Some(operator_name(node, source)),
            MemberKind::Destructor => field_text(node, "name", source)
                .or_else(|| first_identifier(node).map(|n| node_text(&n, source)))
                .map(|n| format!("~{}", n)),
            _ => field_text(node, "name", source)
                .or_else(|| first_identifier(node).map(|n| node_text(&n, source)))
                .map(str::to_string),
        };
    }

    if type_kind(node).is_some() || is_namespace(node) {
        return field_text(node, "name", source).map(str::to_string);
    }

    None
}

fn operator_name(node: &Node, source: &str) -> String {
    if let Some(op) = field_text(node, "operator", source) {
        return format!("operator {}", op);
    }
    if let Some(ty) = field_text(node, "type", source) {
        return format!("operator {}", normalize_type_text(ty));
    }
    "operator".to_string()
}

/// Normalized parameter type list of a callable
pub fn parameter_types(node: &Node, source: &str) -> Vec<String> {
    let Some(params) = node
        .child_by_field_name("parameters")
        .or_else(|| child_of_kind(node, "parameter_list"))
        .or_else(|| child_of_kind(node, "bracketed_parameter_list"))
    else {
        return Vec::new();
    };

    let mut cursor = params.walk();
    params
        .named_children(&mut cursor)
        .filter(|p| p.kind() == "parameter")
        .map(|p| {
            p.child_by_field_name("type")
                .map(|t| normalize_type_text(node_text(&t, source)))
                .unwrap_or_else(|| "?".to_string())
        })
        .collect()
}

pub fn child_of_kind<'t>(node: &Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    let found = node.named_children(&mut cursor).find(|c| c.kind() == kind);
    found
}

/// Normalized member signature, independent of enclosing types
pub fn member_signature(node: &Node, source: &str) -> Option<String> {
    let kind = MemberKind::from_node(node)?;
    let name = declaration_name(node, source)?;
    Some(match kind {
        MemberKind::Method | MemberKind::Operator | MemberKind::Destructor => {
            format!("{}({})", name, parameter_types(node, source).join(", "))
        }
        MemberKind::Constructor => {
            format!("{}({})", CONSTRUCTOR_NAME, parameter_types(node, source).join(", "))
        }
        MemberKind::Indexer => format!("this[{}]", parameter_types(node, source).join(", ")),
        MemberKind::Property | MemberKind::Field | MemberKind::Event => name,
    })
}

/// Collapses whitespace inside a type reference: `Dictionary< string ,int >` → `Dictionary<string, int>`
pub fn normalize_type_text(text: &str) -> String {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    compact.replace(',', ", ")
}

/// Bare type name used for lookups: `global::A.B.List<int>[]?` → `List`
pub fn simple_type_name(text: &str) -> String {
    let mut name = text.trim();
    if let Some(idx) = name.rfind("::") {
        name = &name[idx + 2..];
    }
    let name = match name.find('<') {
        Some(idx) => &name[..idx],
        None => name,
    };
    let name = name.trim_end_matches(['?', '*', ']', '[']).trim_end_matches("[]");
    let name = name.split('[').next().unwrap_or(name);
    name.rsplit('.').next().unwrap_or(name).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::parser::Parser;

    fn members(source: &str) -> Vec<String> {
        let parsed = Parser::default().parse_text(source).unwrap();
        let mut out = Vec::new();
        let mut stack = vec![parsed.root_node()];
        while let Some(node) = stack.pop() {
            if let Some(sig) = member_signature(&node, &parsed.source) {
                out.push(sig);
            }
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                stack.push(child);
            }
        }
        out.sort();
        out
    }

    #[test]
    fn test_member_signatures() {
        let sigs = members(
            r#"
class Order {
    private int _count, _total;
    public string Name { get; set; }
    public Order(int id, string name) { }
    public void Add(List<Item> items, int  qty) { }
    public T Get<T>(Dictionary<string,  int> map) { return default; }
}
"#,
        );
        assert_eq!(
            sigs,
            vec![
                ".ctor(int, string)".to_string(),
                "Add(List<Item>, int)".to_string(),
                "Get(Dictionary<string, int>)".to_string(),
                "Name".to_string(),
                "_count, _total".to_string(),
            ]
        );
    }

    #[test]
    fn test_type_names() {
        assert_eq!(simple_type_name("List<Order>"), "List");
        assert_eq!(simple_type_name("global::App.Models.Order"), "Order");
        assert_eq!(simple_type_name("Order[]"), "Order");
        assert_eq!(simple_type_name("Order?"), "Order");
        assert_eq!(simple_type_name("App.Models.Order<int>[]"), "Order");
        assert_eq!(normalize_type_text("Dictionary< string ,int >"), "Dictionary<string, int>");
    }

    #[test]
    fn test_type_kind() {
        let parsed = Parser::default()
            .parse_text("interface IRepo {} class Repo : IRepo {} struct P {}")
            .unwrap();
        let root = parsed.root_node();
        let mut cursor = root.walk();
        let kinds: Vec<_> = root.named_children(&mut cursor).filter_map(|n| type_kind(&n)).collect();
        assert_eq!(kinds, vec![SymbolKind::Interface, SymbolKind::Class, SymbolKind::Class]);
    }
}
