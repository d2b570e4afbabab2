//! Whole-project declaration table used for cross-file symbol resolution.
//!
//! Declarations from every parsed file are collected into one table before
//! any reference is resolved, so a reference in one file can bind to a
//! declaration in another. Resolution is name based with receiver-type
//! inference; anything that cannot be bound unambiguously resolves to `None`.

use std::collections::{HashMap, HashSet};

use tree_sitter::Node;

use crate::index::SymbolKind;
use crate::indexer::parser::ParsedFile;
use crate::indexer::signature::{
    self, declaration_name, declaration_type, declarators, declarator_name, has_modifier,
    is_namespace, member_signature, node_text, return_type, type_kind, MemberKind,
};

/// Standard library names that never produce graph edges
pub const BUILTIN_TYPES: &[&str] = &[
    "Object", "String", "Int16", "Int32", "Int64", "UInt16", "UInt32", "UInt64", "Byte", "SByte",
    "Boolean", "Char", "Single", "Double", "Decimal", "DateTime", "DateTimeOffset", "TimeSpan",
    "Guid", "Uri", "Type", "Array", "Enum", "Nullable", "Lazy", "Tuple", "ValueTuple",
    "Task", "ValueTask", "CancellationToken", "Exception", "ArgumentException",
    "ArgumentNullException", "InvalidOperationException", "NotImplementedException",
    "NotSupportedException", "List", "IList", "IReadOnlyList", "ICollection",
    "IReadOnlyCollection", "IEnumerable", "IEnumerator", "IAsyncEnumerable", "Dictionary",
    "IDictionary", "IReadOnlyDictionary", "HashSet", "ISet", "Queue", "Stack", "KeyValuePair",
    "Func", "Action", "Predicate", "EventHandler", "EventArgs", "IDisposable",
    "IAsyncDisposable", "IComparable", "IEquatable", "Span", "ReadOnlySpan", "Memory",
    "ReadOnlyMemory", "StringBuilder", "Console", "Math", "Enumerable", "Stream", "Regex",
    "Attribute", "Environment", "Encoding",
];

/// One type or member declaration
#[derive(Debug, Clone)]
pub struct Declaration {
    pub id: String,
    pub name: String,
    /// Individually addressable names (several for `int a, b;`)
    pub names: Vec<String>,
    pub kind: SymbolKind,
    pub member_kind: Option<MemberKind>,
    pub file_path: String,
    pub start: usize,
    pub length: usize,
    pub namespace: String,
    /// Enclosing type, as an index into the owning table
    pub parent: Option<usize>,
    /// Declared type of a field/property or return type of a method
    pub value_type: Option<String>,
    /// Base list entries of a type, as written
    pub base_types: Vec<String>,
    pub param_count: usize,
    /// Type declared `partial`; its parts share one canonical declaration
    pub is_partial: bool,
}

/// Declarations of a single file; `parent` indexes into `decls`
#[derive(Debug, Default)]
pub struct FileDeclarations {
    pub file_path: String,
    pub decls: Vec<Declaration>,
}

/// Collects type and member declarations of one parsed file
pub fn collect_declarations(parsed: &ParsedFile, file_path: &str) -> FileDeclarations {
    let mut out = FileDeclarations {
        file_path: file_path.to_string(),
        decls: Vec::new(),
    };
    collect_children(&parsed.root_node(), &parsed.source, file_path, "", None, &mut out.decls);
    out
}

fn collect_children(
    node: &Node,
    source: &str,
    file_path: &str,
    namespace: &str,
    parent: Option<usize>,
    out: &mut Vec<Declaration>,
) {
    let mut namespace = namespace.to_string();
    let mut cursor = node.walk();
    let children: Vec<Node> = node.named_children(&mut cursor).collect();
    for child in children {
        // A file-scoped namespace applies to every following sibling
        if child.kind() == "file_scoped_namespace_declaration" {
            if let Some(name) = declaration_name(&child, source) {
                namespace = join_name(&namespace, &name);
            }
            collect_children(&child, source, file_path, &namespace, parent, out);
            continue;
        }
        collect_node(&child, source, file_path, &namespace, parent, out);
    }
}

fn collect_node(
    node: &Node,
    source: &str,
    file_path: &str,
    namespace: &str,
    parent: Option<usize>,
    out: &mut Vec<Declaration>,
) {
    if is_namespace(node) {
        let name = declaration_name(node, source).unwrap_or_default();
        let inner = join_name(namespace, &name);
        if let Some(body) = node.child_by_field_name("body") {
            collect_children(&body, source, file_path, &inner, parent, out);
        }
        return;
    }

    if let Some(kind) = type_kind(node) {
        let Some(name) = declaration_name(node, source) else {
            return;
        };
        let id = match parent {
            Some(p) => format!("{}.{}", out[p].id, name),
            None => join_name(namespace, &name),
        };
        out.push(Declaration {
            id,
            names: vec![name.clone()],
            name,
            kind,
            member_kind: None,
            file_path: file_path.to_string(),
            start: node.start_byte(),
            length: node.end_byte() - node.start_byte(),
            namespace: namespace.to_string(),
            parent,
            value_type: None,
            base_types: base_type_texts(node, source),
            param_count: 0,
            is_partial: has_modifier(node, source, "partial"),
        });
        let idx = out.len() - 1;
        if let Some(body) = node.child_by_field_name("body") {
            collect_children(&body, source, file_path, namespace, Some(idx), out);
        }
        return;
    }

    if let (Some(member_kind), Some(p)) = (MemberKind::from_node(node), parent) {
        if node.kind() == "local_function_statement" {
            return;
        }
        let (Some(name), Some(sig)) = (declaration_name(node, source), member_signature(node, source)) else {
            return;
        };
        let names = match member_kind {
            MemberKind::Field | MemberKind::Event if node.child_by_field_name("name").is_none() => {
                declarators(node)
                    .iter()
                    .filter_map(declarator_name)
                    .map(|n| node_text(&n, source).to_string())
                    .collect()
            }
            _ => vec![name.clone()],
        };
        let value_type = match member_kind {
            MemberKind::Method | MemberKind::Operator => return_type(node),
            MemberKind::Constructor | MemberKind::Destructor => None,
            _ => declaration_type(node),
        }
        .map(|t| node_text(&t, source).to_string());

        out.push(Declaration {
            id: format!("{}.{}", out[p].id, sig),
            name,
            names,
            kind: member_kind.symbol_kind(),
            member_kind: Some(member_kind),
            file_path: file_path.to_string(),
            start: node.start_byte(),
            length: node.end_byte() - node.start_byte(),
            namespace: namespace.to_string(),
            parent: Some(p),
            value_type,
            base_types: Vec::new(),
            param_count: signature::parameter_types(node, source).len(),
            is_partial: false,
        });
    }
}

fn base_type_texts(node: &Node, source: &str) -> Vec<String> {
    base_type_nodes(node)
        .iter()
        .map(|n| node_text(n, source).to_string())
        .collect()
}

/// Type nodes listed in a declaration's base list
pub fn base_type_nodes<'t>(node: &Node<'t>) -> Vec<Node<'t>> {
    let Some(bases) = signature::child_of_kind(node, "base_list") else {
        return Vec::new();
    };
    let mut cursor = bases.walk();
    let children: Vec<Node<'t>> = bases.named_children(&mut cursor).collect();
    children
        .into_iter()
        .filter_map(|child| match child.kind() {
            "primary_constructor_base_type" => child
                .child_by_field_name("type")
                .or_else(|| child.named_child(0)),
            "argument_list" | "comment" => None,
            _ => Some(child),
        })
        .collect()
}

fn join_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else if name.is_empty() {
        prefix.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// Project-wide declaration lookup
#[derive(Debug, Default)]
pub struct DeclarationTable {
    decls: Vec<Declaration>,
    by_location: HashMap<(String, usize), usize>,
    types_by_name: HashMap<String, Vec<usize>>,
    members_by_parent: HashMap<usize, Vec<usize>>,
    callables_by_name: HashMap<String, Vec<usize>>,
    /// Later parts of a partial type, mapped to its first part
    partial_parts: HashMap<usize, usize>,
    builtins: HashSet<String>,
}

impl DeclarationTable {
    /// Merges per-file declarations, suffixing colliding ids with `#N`
    ///
    /// Parts of a `partial` type keep their own nodes (`Repo`, `Repo#2`) but
    /// resolve as one type: only the first part is registered by name, the
    /// other parts' members and base types are attached to it, and their
    /// members are named under the unsuffixed type id.
    pub fn from_files(files: Vec<FileDeclarations>, extra_builtins: &[String]) -> Self {
        let mut table = Self {
            builtins: BUILTIN_TYPES
                .iter()
                .map(|s| s.to_string())
                .chain(extra_builtins.iter().cloned())
                .collect(),
            ..Self::default()
        };
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut first_partial: HashMap<String, usize> = HashMap::new();

        for file in files {
            let offset = table.decls.len();
            let original_ids: Vec<String> = file.decls.iter().map(|d| d.id.clone()).collect();
            // Prefix under which each declaration's children are named
            let mut prefixes: Vec<String> = Vec::with_capacity(original_ids.len());

            for (local, mut decl) in file.decls.into_iter().enumerate() {
                // Parents precede children, so a parent's prefix is already final
                if let Some(parent_local) = decl.parent {
                    let segment = &original_ids[local][original_ids[parent_local].len()..];
                    decl.id = format!("{}{}", prefixes[parent_local], segment);
                    decl.parent = Some(parent_local + offset);
                }
                let idx = table.decls.len();
                let unsuffixed = decl.id.clone();

                let count = seen.entry(decl.id.clone()).or_insert(0);
                *count += 1;
                let duplicate = *count > 1;
                if duplicate {
                    decl.id = format!("{}#{}", decl.id, count);
                }

                let first_part = if decl.is_partial {
                    first_partial.get(&unsuffixed).copied()
                } else {
                    None
                };
                match first_part {
                    Some(first) => {
                        table.partial_parts.insert(idx, first);
                        for base in &decl.base_types {
                            if !table.decls[first].base_types.contains(base) {
                                table.decls[first].base_types.push(base.clone());
                            }
                        }
                        prefixes.push(unsuffixed);
                    }
                    None => {
                        if duplicate {
                            tracing::debug!("Duplicate declaration id {} in {}", unsuffixed, decl.file_path);
                        } else if decl.is_partial {
                            first_partial.insert(unsuffixed, idx);
                        }
                        if decl.kind.is_type() {
                            table.types_by_name.entry(decl.name.clone()).or_default().push(idx);
                        }
                        prefixes.push(decl.id.clone());
                    }
                }

                table
                    .by_location
                    .insert((decl.file_path.clone(), decl.start), idx);
                if let Some(p) = decl.parent {
                    let owner = table.canonical(p);
                    table.members_by_parent.entry(owner).or_default().push(idx);
                }
                if decl.kind.is_callable() {
                    table.callables_by_name.entry(decl.name.clone()).or_default().push(idx);
                }
                table.decls.push(decl);
            }
        }

        table
    }

    /// First part of a partial type, or `idx` itself
    pub fn canonical(&self, idx: usize) -> usize {
        self.partial_parts.get(&idx).copied().unwrap_or(idx)
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn get(&self, idx: usize) -> &Declaration {
        &self.decls[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.decls.iter()
    }

    /// Declaration whose node starts at `start` in `file_path`
    pub fn at(&self, file_path: &str, start: usize) -> Option<usize> {
        self.by_location.get(&(file_path.to_string(), start)).copied()
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtins.contains(name)
    }

    /// Resolves a type reference as written in `namespace`
    pub fn resolve_type(&self, text: &str, namespace: &str) -> Option<usize> {
        let name = signature::simple_type_name(text);
        if name.is_empty() || self.is_builtin(&name) {
            return None;
        }
        let candidates = self.types_by_name.get(&name)?;
        if candidates.len() == 1 {
            return Some(candidates[0]);
        }

        let qualified = qualified_without_generics(text);
        if qualified.contains('.') {
            if let Some(found) = candidates
                .iter()
                .find(|&&c| self.decls[c].id == qualified || self.decls[c].id.ends_with(&format!(".{}", qualified)))
            {
                return Some(*found);
            }
        }

        let same_ns: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&c| self.decls[c].namespace == namespace)
            .collect();
        if same_ns.len() == 1 {
            return Some(same_ns[0]);
        }

        let enclosing: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&c| {
                let ns = &self.decls[c].namespace;
                !ns.is_empty() && namespace.starts_with(ns.as_str())
            })
            .collect();
        if enclosing.len() == 1 {
            return Some(enclosing[0]);
        }

        None
    }

    /// Type and its base types, nearest first, cycle safe
    pub fn type_chain(&self, type_idx: usize) -> Vec<usize> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut pending = vec![self.canonical(type_idx)];
        while let Some(idx) = pending.pop() {
            if !visited.insert(idx) {
                continue;
            }
            chain.push(idx);
            let decl = &self.decls[idx];
            for base in decl.base_types.iter().rev() {
                if let Some(b) = self.resolve_type(base, &decl.namespace) {
                    pending.push(b);
                }
            }
        }
        chain
    }

    /// First base type of `type_idx` that is a class
    pub fn base_class(&self, type_idx: usize) -> Option<usize> {
        let decl = &self.decls[self.canonical(type_idx)];
        decl.base_types
            .iter()
            .filter_map(|b| self.resolve_type(b, &decl.namespace))
            .find(|&b| self.decls[b].kind == SymbolKind::Class)
    }

    /// Member named `name` on the type or its bases, matching `accept`
    pub fn find_member(
        &self,
        type_idx: usize,
        name: &str,
        accept: impl Fn(&Declaration) -> bool,
    ) -> Vec<usize> {
        for owner in self.type_chain(type_idx) {
            let found: Vec<usize> = self
                .members_by_parent
                .get(&owner)
                .map(|members| {
                    members
                        .iter()
                        .copied()
                        .filter(|&m| {
                            let d = &self.decls[m];
                            d.names.iter().any(|n| n == name) && accept(d)
                        })
                        .collect()
                })
                .unwrap_or_default();
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    /// Resolves an invocation of `name` with `arg_count` arguments
    ///
    /// `receiver` is the inferred type of an explicit receiver: the call
    /// binds to one of its methods or to nothing. Without a receiver the
    /// call is an implicit `this` call from `context_type`, falling back to
    /// a project-unique method name.
    pub fn resolve_call(
        &self,
        name: &str,
        receiver: Option<usize>,
        context_type: Option<usize>,
        arg_count: usize,
    ) -> Option<usize> {
        let is_method = |d: &Declaration| d.kind == SymbolKind::Method;
        if let Some(receiver) = receiver {
            let found = self.find_member(receiver, name, is_method);
            return self.pick_overload(&found, arg_count);
        }
        if let Some(owner) = context_type {
            let found = self.find_member(owner, name, is_method);
            if let Some(best) = self.pick_overload(&found, arg_count) {
                return Some(best);
            }
        }

        let global: Vec<usize> = self
            .callables_by_name
            .get(name)
            .map(|c| c.iter().copied().filter(|&i| is_method(&self.decls[i])).collect())
            .unwrap_or_default();
        let owners: HashSet<Option<usize>> = global
            .iter()
            .map(|&i| self.decls[i].parent.map(|p| self.canonical(p)))
            .collect();
        if owners.len() == 1 {
            return self.pick_overload(&global, arg_count);
        }
        None
    }

    /// Constructor of `type_idx` taking `arg_count` arguments
    pub fn resolve_constructor(&self, type_idx: usize, arg_count: usize) -> Option<usize> {
        let ctors: Vec<usize> = self
            .members_by_parent
            .get(&self.canonical(type_idx))
            .map(|m| {
                m.iter()
                    .copied()
                    .filter(|&i| self.decls[i].kind == SymbolKind::Constructor)
                    .collect()
            })
            .unwrap_or_default();
        ctors
            .iter()
            .copied()
            .find(|&c| self.decls[c].param_count == arg_count)
    }

    /// Property or field named `name` visible on `type_idx`
    pub fn resolve_data_member(&self, type_idx: usize, name: &str) -> Option<usize> {
        self.find_member(type_idx, name, |d| {
            matches!(d.kind, SymbolKind::Property | SymbolKind::Field)
        })
        .first()
        .copied()
    }

    /// Type of the value produced by reading a field/property or calling a method
    pub fn value_type_of(&self, decl_idx: usize) -> Option<usize> {
        let decl = &self.decls[decl_idx];
        let text = decl.value_type.as_deref()?;
        self.resolve_type(text, &decl.namespace)
    }

    fn pick_overload(&self, candidates: &[usize], arg_count: usize) -> Option<usize> {
        match candidates {
            [] => None,
            [only] => Some(*only),
            many => many
                .iter()
                .copied()
                .find(|&c| self.decls[c].param_count == arg_count)
                .or_else(|| many.first().copied()),
        }
    }
}

fn qualified_without_generics(text: &str) -> String {
    let mut out = String::new();
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            c if depth == 0 && !c.is_whitespace() && c != '?' && c != '[' && c != ']' => out.push(c),
            _ => {}
        }
    }
    match out.rfind("::") {
        Some(idx) => out[idx + 2..].to_string(),
        None => out,
    }
}
