//! Leaf-token stream of a C# text, classified for token-level diffing.
//!
//! Names declared inside a member (parameters, locals) carry a binding
//! ordinal: the order in which the member declared them. Two occurrences of
//! differently spelled names with the same ordinal refer to the same
//! variable in their respective versions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tree_sitter::Node;

use crate::error::Result;
use crate::indexer::parser::Parser;
use crate::indexer::signature::{type_kind, MemberKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Keyword,
    Identifier,
    TypeName,
    MethodName,
    LocalVariable,
    Parameter,
    StringLiteral,
    NumericLiteral,
    Punctuation,
    Operator,
}

impl TokenKind {
    /// Kinds whose spelling may change without changing meaning
    pub fn is_renamable(&self) -> bool {
        matches!(self, TokenKind::LocalVariable | TokenKind::Parameter | TokenKind::MethodName)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub start: usize,
    pub length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding: Option<usize>,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            kind,
            length: text.len(),
            text,
            start: 0,
            binding: None,
        }
    }

    pub fn with_binding(mut self, ordinal: usize) -> Self {
        self.binding = Some(ordinal);
        self
    }
}

const LITERAL_KINDS: &[&str] = &[
    "string_literal",
    "verbatim_string_literal",
    "raw_string_literal",
    "character_literal",
    "interpolated_string_expression",
];

const KEYWORD_LEAVES: &[&str] = &[
    "predefined_type",
    "implicit_type",
    "boolean_literal",
    "null_literal",
    "this_expression",
    "base_expression",
    "this",
    "base",
    "modifier",
];

const PUNCTUATION: &[&str] = &["(", ")", "{", "}", "[", "]", ";", ",", ".", ":", "::"];

/// Tokenizes `source`; comments are skipped
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let parsed = Parser::default().parse_text(source)?;
    let mut state = TokenizerState {
        source,
        tokens: Vec::new(),
        bindings: HashMap::new(),
        next_ordinal: 0,
    };
    state.walk(parsed.root_node());
    Ok(state.tokens)
}

struct TokenizerState<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    bindings: HashMap<String, (TokenKind, usize)>,
    next_ordinal: usize,
}

impl<'s> TokenizerState<'s> {
    fn walk(&mut self, node: Node) {
        let kind = node.kind();
        if kind == "comment" || node.is_missing() {
            return;
        }

        let is_member = MemberKind::from_node(&node).is_some() && kind != "local_function_statement";
        if is_member || type_kind(&node).is_some() {
            let saved = (std::mem::take(&mut self.bindings), self.next_ordinal);
            self.next_ordinal = 0;
            self.walk_children(node);
            self.bindings = saved.0;
            self.next_ordinal = saved.1;
            return;
        }

        if LITERAL_KINDS.contains(&kind) {
            return self.push(&node, TokenKind::StringLiteral, None);
        }
        if matches!(kind, "integer_literal" | "real_literal") {
            return self.push(&node, TokenKind::NumericLiteral, None);
        }
        if node.child_count() > 0 {
            return self.walk_children(node);
        }

        if kind == "identifier" {
            let (kind, binding) = self.classify_identifier(&node);
            return self.push(&node, kind, binding);
        }
        let token_kind = if KEYWORD_LEAVES.contains(&kind)
            || (!node.is_named() && kind.chars().all(|c| c.is_ascii_alphabetic() || c == '_'))
        {
            TokenKind::Keyword
        } else if PUNCTUATION.contains(&kind) {
            TokenKind::Punctuation
        } else if node.is_named() {
            TokenKind::Identifier
        } else {
            TokenKind::Operator
        };
        self.push(&node, token_kind, None);
    }

    fn walk_children(&mut self, node: Node) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        for child in children {
            self.walk(child);
        }
    }

    fn push(&mut self, node: &Node, kind: TokenKind, binding: Option<usize>) {
        let text = self.source.get(node.byte_range()).unwrap_or("");
        if text.is_empty() {
            return;
        }
        self.tokens.push(Token {
            kind,
            text: text.to_string(),
            start: node.start_byte(),
            length: text.len(),
            binding,
        });
    }

    fn declare(&mut self, name: &str, kind: TokenKind) -> (TokenKind, Option<usize>) {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        self.bindings.insert(name.to_string(), (kind, ordinal));
        (kind, Some(ordinal))
    }

    fn classify_identifier(&mut self, node: &Node) -> (TokenKind, Option<usize>) {
        let text = self.source.get(node.byte_range()).unwrap_or("");
        let Some(parent) = node.parent() else {
            return (TokenKind::Identifier, None);
        };
        let in_field = |field: &str| parent.child_by_field_name(field) == Some(*node);

        match parent.kind() {
            "parameter" if in_field("name") => return self.declare(text, TokenKind::Parameter),
            "variable_declarator" => {
                let is_member_field = parent
                    .parent()
                    .and_then(|d| d.parent())
                    .is_some_and(|m| matches!(m.kind(), "field_declaration" | "event_field_declaration"));
                if !is_member_field {
                    return self.declare(text, TokenKind::LocalVariable);
                }
                return (TokenKind::Identifier, None);
            }
            "foreach_statement" if in_field("left") => {
                return self.declare(text, TokenKind::LocalVariable)
            }
            "catch_declaration" if in_field("name") => {
                return self.declare(text, TokenKind::LocalVariable)
            }
            "single_variable_designation" => return self.declare(text, TokenKind::LocalVariable),
            "method_declaration" | "local_function_statement" if in_field("name") => {
                return (TokenKind::MethodName, None)
            }
            _ if type_kind(&parent).is_some() && in_field("name") => return (TokenKind::TypeName, None),
            "constructor_declaration" | "destructor_declaration" => return (TokenKind::TypeName, None),
            _ => {}
        }

        let is_member_name = parent.kind() == "member_access_expression" && in_field("name");
        if !is_member_name {
            if let Some(&(kind, ordinal)) = self.bindings.get(text) {
                return (kind, Some(ordinal));
            }
        }

        if is_invoked(node) {
            return (TokenKind::MethodName, None);
        }
        if is_type_position(node, &parent) {
            return (TokenKind::TypeName, None);
        }
        (TokenKind::Identifier, None)
    }
}

/// `Foo()`, `x.Foo()`, `Foo<T>()`
fn is_invoked(node: &Node) -> bool {
    let mut current = *node;
    if let Some(parent) = current.parent() {
        if parent.kind() == "generic_name" {
            current = parent;
        }
    }
    let Some(parent) = current.parent() else {
        return false;
    };
    match parent.kind() {
        "invocation_expression" => parent.child_by_field_name("function") == Some(current),
        "member_access_expression" => {
            parent.child_by_field_name("name") == Some(current)
                && parent
                    .parent()
                    .is_some_and(|g| g.kind() == "invocation_expression" && g.child_by_field_name("function") == Some(parent))
        }
        _ => false,
    }
}

fn is_type_position(node: &Node, parent: &Node) -> bool {
    if matches!(parent.child_by_field_name("type"), Some(t) if t == *node)
        || matches!(parent.child_by_field_name("returns"), Some(t) if t == *node)
    {
        return true;
    }
    matches!(
        parent.kind(),
        "generic_name"
            | "qualified_name"
            | "base_list"
            | "type_argument_list"
            | "array_type"
            | "nullable_type"
            | "type_parameter"
            | "type_parameter_constraint"
            | "primary_constructor_base_type"
    )
}
