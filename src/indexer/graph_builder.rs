//! Two-phase construction of the project symbol graph.
//!
//! Phase one parses every file in parallel and collects declarations into a
//! [`DeclarationTable`]. Phase two walks each file again against the
//! read-only table and records typed edges; the per-file contributions are
//! then merged into a [`SymbolGraph`] by a single writer.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tree_sitter::Node;
use uuid::Uuid;

use crate::error::Result;
use crate::index::{normalize_path, LinkKind, SymbolGraph, SymbolKind, SymbolLink, SymbolNode};
use crate::indexer::parser::{ParsedFile, Parser};
use crate::indexer::progress::IndexingProgress;
use crate::indexer::resolver::{base_type_nodes, collect_declarations, DeclarationTable};
use crate::indexer::signature::{
    child_of_kind, children_with_fields, control_flow_keyword, declarator_name, field_text,
    first_identifier, is_namespace, named_children, node_text, type_kind, MemberKind,
};
use crate::indexer::walker::FileWalker;

#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Also emit parameter, local, literal, keyword and control-flow nodes
    pub include_granular_nodes: bool,
    pub extra_builtin_types: Vec<String>,
}

pub struct GraphBuilder {
    options: IndexOptions,
    progress: IndexingProgress,
}

impl GraphBuilder {
    pub fn new(options: IndexOptions) -> Self {
        Self {
            options,
            progress: IndexingProgress::new(),
        }
    }

    pub fn with_progress(mut self, progress: IndexingProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn progress(&self) -> &IndexingProgress {
        &self.progress
    }

    pub fn index_project(&self, root: &Path) -> Result<SymbolGraph> {
        let files = FileWalker::default().walk(root)?;
        tracing::info!("Found {} files to index under {}", files.len(), root.display());
        Ok(self.build(&files))
    }

    pub fn build(&self, files: &[PathBuf]) -> SymbolGraph {
        self.progress.start(files.len());

        // Each rayon worker gets its own parser
        let parsed: Vec<(String, ParsedFile)> = files
            .par_iter()
            .filter_map(|file| match Parser::default().parse_file(file) {
                Ok(parsed) => {
                    tracing::debug!("Parsed {}", file.display());
                    self.progress.inc_parsed();
                    Some((normalize_path(&file.to_string_lossy()), parsed))
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", file.display(), e);
                    self.progress.inc_error();
                    None
                }
            })
            .collect();

        self.build_parsed(parsed)
    }

    /// Builds a graph from in-memory `(path, text)` pairs
    pub fn build_sources(&self, sources: &[(String, String)]) -> SymbolGraph {
        self.progress.start(sources.len());
        let parsed: Vec<(String, ParsedFile)> = sources
            .par_iter()
            .filter_map(|(path, text)| match Parser::default().parse_text(text) {
                Ok(parsed) => {
                    self.progress.inc_parsed();
                    Some((normalize_path(path), parsed))
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", path, e);
                    self.progress.inc_error();
                    None
                }
            })
            .collect();

        self.build_parsed(parsed)
    }

    fn build_parsed(&self, parsed: Vec<(String, ParsedFile)>) -> SymbolGraph {
        let declarations = parsed
            .par_iter()
            .map(|(path, file)| collect_declarations(file, path))
            .collect();
        let table = DeclarationTable::from_files(declarations, &self.options.extra_builtin_types);
        tracing::debug!("Collected {} declarations", table.len());

        let include_granular = self.options.include_granular_nodes;
        let contributions: Vec<FileContribution> = parsed
            .par_iter()
            .map(|(path, file)| FileWalk::new(&table, file, path, include_granular).run())
            .collect();

        let graph = merge(&table, contributions);
        self.progress.add_nodes(graph.nodes.len());
        self.progress.finish();

        let stats = graph.stats();
        tracing::info!(
            "Indexed {} nodes and {} links from {} files",
            stats.nodes,
            stats.links,
            parsed.len()
        );
        graph
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new(IndexOptions::default())
    }
}

/// Edges and granular nodes found in one file
#[derive(Default)]
struct FileContribution {
    links: HashMap<usize, BTreeSet<SymbolLink>>,
    implementations: Vec<(String, String)>,
    granular: Vec<SymbolNode>,
}

fn merge(table: &DeclarationTable, contributions: Vec<FileContribution>) -> SymbolGraph {
    let mut links: HashMap<usize, BTreeSet<SymbolLink>> = HashMap::new();
    let mut implementations = Vec::new();
    let mut granular = Vec::new();
    for contribution in contributions {
        for (idx, set) in contribution.links {
            links.entry(idx).or_default().extend(set);
        }
        implementations.extend(contribution.implementations);
        granular.extend(contribution.granular);
    }

    let mut graph = SymbolGraph::new();
    for (idx, decl) in table.iter().enumerate() {
        let mut node = SymbolNode::new(
            decl.id.clone(),
            decl.name.clone(),
            decl.kind,
            decl.file_path.clone(),
            decl.start,
            decl.length,
        );
        for link in links.remove(&idx).unwrap_or_default() {
            node.link(link);
        }
        graph.insert(node);
    }
    for node in granular {
        graph.insert(node);
    }
    for (interface, implementer) in implementations {
        graph.add_implementation(&interface, &implementer);
    }
    graph.finish_all();
    graph
}

/// Position of the walk: the node edges are attributed to, the enclosing
/// type and the namespace used for type lookups
#[derive(Debug, Clone, Default)]
struct WalkContext {
    node: Option<usize>,
    type_idx: Option<usize>,
    namespace: String,
}

/// Names bound inside the current member, mapped to their inferred type
type Locals = HashMap<String, Option<usize>>;

struct FileWalk<'a> {
    table: &'a DeclarationTable,
    parsed: &'a ParsedFile,
    file_path: &'a str,
    include_granular: bool,
    out: FileContribution,
}

impl<'a> FileWalk<'a> {
    fn new(
        table: &'a DeclarationTable,
        parsed: &'a ParsedFile,
        file_path: &'a str,
        include_granular: bool,
    ) -> Self {
        Self {
            table,
            parsed,
            file_path,
            include_granular,
            out: FileContribution::default(),
        }
    }

    fn run(mut self) -> FileContribution {
        let parsed = self.parsed;
        let root = parsed.root_node();
        self.visit_children(root, &WalkContext::default(), &mut Locals::new());
        self.out
    }

    fn text(&self, node: &Node) -> &'a str {
        let parsed: &'a ParsedFile = self.parsed;
        node_text(node, &parsed.source)
    }

    fn emit(&mut self, ctx: &WalkContext, target: usize, kind: LinkKind, site: &Node) {
        let Some(from) = ctx.node else {
            return;
        };
        if self.table.canonical(from) == self.table.canonical(target) {
            return;
        }
        let link = SymbolLink::new(
            self.table.get(target).id.clone(),
            kind,
            site.start_byte(),
            site.end_byte() - site.start_byte(),
        );
        self.out.links.entry(from).or_default().insert(link);
    }

    fn granular(&mut self, kind: SymbolKind, name: &str, node: &Node) {
        if !self.include_granular {
            return;
        }
        self.out.granular.push(SymbolNode::new(
            Uuid::new_v4().to_string(),
            name,
            kind,
            self.file_path,
            node.start_byte(),
            node.end_byte() - node.start_byte(),
        ));
    }

    fn visit_children(&mut self, node: Node, ctx: &WalkContext, locals: &mut Locals) {
        let mut scoped: Option<WalkContext> = None;
        for child in named_children(&node) {
            if child.kind() == "file_scoped_namespace_declaration" {
                let mut inner = scoped.clone().unwrap_or_else(|| ctx.clone());
                if let Some(name) = field_text(&child, "name", &self.parsed.source) {
                    inner.namespace = join_namespace(&inner.namespace, name);
                }
                self.visit_namespace_body(child, &inner, locals);
                scoped = Some(inner);
                continue;
            }
            let current = scoped.clone().unwrap_or_else(|| ctx.clone());
            self.visit(child, &current, locals);
        }
    }

    fn visit_namespace_body(&mut self, node: Node, ctx: &WalkContext, locals: &mut Locals) {
        for (field, child) in children_with_fields(&node) {
            if field == Some("name") {
                continue;
            }
            if child.kind() == "declaration_list" {
                self.visit_children(child, ctx, locals);
            } else {
                self.visit(child, ctx, locals);
            }
        }
    }

    fn visit(&mut self, node: Node, ctx: &WalkContext, locals: &mut Locals) {
        if node.kind() == "namespace_declaration" {
            let mut inner = ctx.clone();
            if let Some(name) = field_text(&node, "name", &self.parsed.source) {
                inner.namespace = join_namespace(&ctx.namespace, name);
            }
            self.visit_namespace_body(node, &inner, locals);
            return;
        }
        if is_namespace(&node) {
            return self.visit_children(node, ctx, locals);
        }
        if type_kind(&node).is_some() {
            return self.visit_type_declaration(node, ctx, locals);
        }
        if let Some(member_kind) = MemberKind::from_node(&node) {
            return self.visit_member(node, member_kind, ctx, locals);
        }
        if let Some(keyword) = control_flow_keyword(&node) {
            self.granular(SymbolKind::ControlFlow, keyword, &node);
        }

        match node.kind() {
            "comment" | "using_directive" | "extern_alias_directive" | "attribute_list"
            | "type_parameter_list" | "type_parameter_constraints_clause" | "name_colon"
            | "name_equals" | "member_binding_expression" | "goto_statement"
            | "predefined_type" | "implicit_type" => {}
            "invocation_expression" => self.visit_invocation(node, ctx, locals),
            "member_access_expression" => self.visit_member_access(node, ctx, locals),
            "object_creation_expression" => self.visit_object_creation(node, ctx, locals),
            "identifier" => self.visit_identifier(node, ctx, locals),
            "generic_name" | "qualified_name" | "alias_qualified_name" | "array_type"
            | "nullable_type" | "tuple_type" | "pointer_type" | "type_argument_list" => {
                self.visit_type(node, ctx)
            }
            "variable_declaration" => self.visit_variable_declaration(node, ctx, locals, true),
            "parameter_list" | "bracketed_parameter_list" => {
                self.declare_parameters(node, ctx, locals)
            }
            "lambda_expression" | "anonymous_method_expression" => {
                let mut inner = locals.clone();
                for (field, child) in children_with_fields(&node) {
                    match child.kind() {
                        "implicit_parameter" | "identifier" if field == Some("parameters") => {
                            inner.insert(self.text(&child).to_string(), None);
                        }
                        "implicit_parameter" => {
                            inner.insert(self.text(&child).to_string(), None);
                        }
                        _ => self.visit(child, ctx, &mut inner),
                    }
                }
            }
            "foreach_statement" => self.visit_foreach(node, ctx, locals),
            "catch_declaration" => {
                if let Some(ty) = node.child_by_field_name("type") {
                    self.visit_type(ty, ctx);
                    let resolved = self.table.resolve_type(self.text(&ty), &ctx.namespace);
                    if let Some(name) = node.child_by_field_name("name") {
                        locals.insert(self.text(&name).to_string(), resolved);
                    }
                }
            }
            "declaration_expression" | "declaration_pattern" | "recursive_pattern" => {
                let ty = node.child_by_field_name("type");
                let resolved = ty.and_then(|t| self.table.resolve_type(self.text(&t), &ctx.namespace));
                for (field, child) in children_with_fields(&node) {
                    match (field, child.kind()) {
                        (Some("type"), _) => self.visit_type(child, ctx),
                        (Some("name"), _) | (_, "single_variable_designation") => {
                            locals.insert(self.text(&child).to_string(), resolved);
                            self.granular(SymbolKind::LocalVariable, self.text(&child), &child);
                        }
                        _ => self.visit(child, ctx, locals),
                    }
                }
            }
            "cast_expression" | "typeof_expression" | "default_expression"
            | "sizeof_expression" => {
                for (field, child) in children_with_fields(&node) {
                    if field == Some("type") {
                        self.visit_type(child, ctx);
                    } else {
                        self.visit(child, ctx, locals);
                    }
                }
            }
            "as_expression" | "is_expression" => {
                for (field, child) in children_with_fields(&node) {
                    if field == Some("right") && is_type_node(&child) {
                        self.visit_type(child, ctx);
                    } else {
                        self.visit(child, ctx, locals);
                    }
                }
            }
            "enum_member_declaration" => {
                if let Some(value) = node.child_by_field_name("value") {
                    self.visit(value, ctx, locals);
                }
            }
            "accessor_declaration" | "labeled_statement" => {
                for (field, child) in children_with_fields(&node) {
                    if field != Some("name") && child.kind() != "identifier" {
                        self.visit(child, ctx, locals);
                    }
                }
            }
            "return_statement" | "throw_statement" | "yield_statement" => {
                let name = node.kind().trim_end_matches("_statement").to_string();
                self.granular(SymbolKind::Statement, &name, &node);
                self.visit_children(node, ctx, locals);
            }
            "string_literal" | "verbatim_string_literal" | "raw_string_literal"
            | "character_literal" | "interpolated_string_expression" => {
                self.granular(SymbolKind::StringLiteral, self.text(&node), &node);
                self.visit_children(node, ctx, locals);
            }
            "integer_literal" | "real_literal" => {
                self.granular(SymbolKind::NumericLiteral, self.text(&node), &node);
            }
            "this_expression" | "base_expression" | "null_literal" | "boolean_literal"
            | "this" | "base" => {
                self.granular(SymbolKind::Keyword, self.text(&node), &node);
            }
            _ => self.visit_children(node, ctx, locals),
        }
    }

    fn visit_type_declaration(&mut self, node: Node, ctx: &WalkContext, locals: &mut Locals) {
        let Some(idx) = self.table.at(self.file_path, node.start_byte()) else {
            return;
        };
        let type_ctx = WalkContext {
            node: Some(idx),
            type_idx: Some(idx),
            namespace: ctx.namespace.clone(),
        };

        for base in base_type_nodes(&node) {
            self.visit_base_type(base, &type_ctx);
        }

        let mut type_locals = locals.clone();
        if let Some(params) = node
            .child_by_field_name("parameters")
            .or_else(|| child_of_kind(&node, "parameter_list"))
        {
            self.declare_parameters(params, &type_ctx, &mut type_locals);
        }
        if let Some(bases) = child_of_kind(&node, "base_list") {
            for child in named_children(&bases) {
                if child.kind() == "primary_constructor_base_type" {
                    if let Some(args) = child_of_kind(&child, "argument_list") {
                        self.visit(args, &type_ctx, &mut type_locals);
                    }
                }
            }
        }
        if let Some(body) = node.child_by_field_name("body") {
            for member in named_children(&body) {
                self.visit(member, &type_ctx, &mut type_locals);
            }
        }
    }

    fn visit_base_type(&mut self, base: Node, ctx: &WalkContext) {
        let site = match base.kind() {
            "generic_name" => first_identifier(&base).unwrap_or(base),
            _ => base,
        };
        if let Some(target) = self.table.resolve_type(self.text(&base), &ctx.namespace) {
            let target_decl = self.table.get(target);
            if target_decl.kind == SymbolKind::Interface {
                self.emit(ctx, target, LinkKind::Implements, &site);
                if let Some(me) = ctx.type_idx.map(|me| self.table.canonical(me)).filter(|&me| me != target) {
                    self.out
                        .implementations
                        .push((target_decl.id.clone(), self.table.get(me).id.clone()));
                }
            } else {
                self.emit(ctx, target, LinkKind::Inherits, &site);
            }
        }
        for arg in generic_arguments(&base) {
            self.visit_type(arg, ctx);
        }
    }

    fn visit_member(
        &mut self,
        node: Node,
        member_kind: MemberKind,
        ctx: &WalkContext,
        locals: &mut Locals,
    ) {
        let is_local_function = node.kind() == "local_function_statement";
        if is_local_function {
            if let Some(name) = node.child_by_field_name("name") {
                locals.insert(self.text(&name).to_string(), None);
            }
        }

        let idx = if is_local_function {
            None
        } else {
            self.table.at(self.file_path, node.start_byte())
        };
        let member_ctx = WalkContext {
            node: idx.or(ctx.node),
            type_idx: ctx.type_idx,
            namespace: ctx.namespace.clone(),
        };
        let mut member_locals = locals.clone();
        if matches!(member_kind, MemberKind::Property | MemberKind::Indexer | MemberKind::Event) {
            let value_type = idx.and_then(|i| self.table.value_type_of(i));
            member_locals.insert("value".to_string(), value_type);
        }

        for (field, child) in children_with_fields(&node) {
            match (field, child.kind()) {
                (Some("name"), _) => {}
                (_, "attribute_list" | "modifier" | "explicit_interface_specifier")
                | (_, "type_parameter_list" | "type_parameter_constraints_clause") => {}
                (Some("returns" | "type"), _) => self.visit_type(child, &member_ctx),
                (_, "parameter_list" | "bracketed_parameter_list") => {
                    self.declare_parameters(child, &member_ctx, &mut member_locals)
                }
                (_, "variable_declaration") => {
                    self.visit_variable_declaration(child, &member_ctx, &mut member_locals, false)
                }
                _ => self.visit(child, &member_ctx, &mut member_locals),
            }
        }
    }

    fn declare_parameters(&mut self, params: Node, ctx: &WalkContext, locals: &mut Locals) {
        for param in named_children(&params) {
            if param.kind() != "parameter" {
                self.visit(param, ctx, locals);
                continue;
            }
            let ty = param.child_by_field_name("type");
            if let Some(ty) = ty {
                self.visit_type(ty, ctx);
            }
            let resolved = ty.and_then(|t| self.table.resolve_type(self.text(&t), &ctx.namespace));
            if let Some(name) = param.child_by_field_name("name") {
                locals.insert(self.text(&name).to_string(), resolved);
                self.granular(SymbolKind::Parameter, self.text(&name), &param);
            }
            for (field, child) in children_with_fields(&param) {
                if field.is_none() && child.kind() != "attribute_list" && child.kind() != "modifier" {
                    self.visit(child, ctx, locals);
                }
            }
        }
    }

    fn visit_variable_declaration(
        &mut self,
        node: Node,
        ctx: &WalkContext,
        locals: &mut Locals,
        is_local: bool,
    ) {
        let ty = node.child_by_field_name("type");
        let declared = ty
            .filter(|t| t.kind() != "implicit_type")
            .and_then(|t| self.table.resolve_type(self.text(&t), &ctx.namespace));
        if let Some(ty) = ty {
            self.visit_type(ty, ctx);
        }

        for declarator in named_children(&node) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            let name = declarator_name(&declarator);
            let mut inferred = None;
            for child in named_children(&declarator) {
                if Some(child) == name {
                    continue;
                }
                if inferred.is_none() {
                    inferred = self.infer_type(child, ctx, locals);
                }
                self.visit(child, ctx, locals);
            }
            if is_local {
                if let Some(name) = name {
                    locals.insert(self.text(&name).to_string(), declared.or(inferred));
                    self.granular(SymbolKind::LocalVariable, self.text(&name), &declarator);
                }
            }
        }
    }

    fn visit_foreach(&mut self, node: Node, ctx: &WalkContext, locals: &mut Locals) {
        let mut inner = locals.clone();
        let ty = node.child_by_field_name("type");
        let resolved = ty
            .filter(|t| t.kind() != "implicit_type")
            .and_then(|t| self.table.resolve_type(self.text(&t), &ctx.namespace));
        for (field, child) in children_with_fields(&node) {
            match field {
                Some("type") => self.visit_type(child, ctx),
                Some("left") => {
                    inner.insert(self.text(&child).to_string(), resolved);
                    self.granular(SymbolKind::LocalVariable, self.text(&child), &child);
                }
                _ => self.visit(child, ctx, &mut inner),
            }
        }
    }

    fn visit_invocation(&mut self, node: Node, ctx: &WalkContext, locals: &mut Locals) {
        if let Some((target, site)) = self.resolve_invocation(node, ctx, locals) {
            self.emit(ctx, target, LinkKind::Calls, &site);
        }

        if let Some(function) = node.child_by_field_name("function") {
            match function.kind() {
                "identifier" => {}
                "generic_name" => {
                    for arg in generic_arguments(&function) {
                        self.visit_type(arg, ctx);
                    }
                }
                "member_access_expression" => {
                    if let Some(name) = function.child_by_field_name("name") {
                        for arg in generic_arguments(&name) {
                            self.visit_type(arg, ctx);
                        }
                    }
                    if let Some(expr) = function.child_by_field_name("expression") {
                        self.visit(expr, ctx, locals);
                    }
                }
                _ => self.visit(function, ctx, locals),
            }
        }
        if let Some(args) = node.child_by_field_name("arguments") {
            self.visit(args, ctx, locals);
        }
    }

    /// Target method of an invocation and the name node it was found at
    fn resolve_invocation<'t>(
        &self,
        node: Node<'t>,
        ctx: &WalkContext,
        locals: &Locals,
    ) -> Option<(usize, Node<'t>)> {
        let function = node.child_by_field_name("function")?;
        let arg_count = node
            .child_by_field_name("arguments")
            .map(|args| named_children(&args).iter().filter(|a| a.kind() == "argument").count())
            .unwrap_or(0);

        match function.kind() {
            "identifier" | "generic_name" => {
                let site = simple_name_site(function);
                let name = self.text(&site);
                if locals.contains_key(name) {
                    return None;
                }
                self.table
                    .resolve_call(name, None, ctx.type_idx, arg_count)
                    .map(|t| (t, site))
            }
            "member_access_expression" => {
                let name_node = function.child_by_field_name("name")?;
                let site = simple_name_site(name_node);
                // An explicit receiver of unknown or built-in type binds nothing
                let receiver = function
                    .child_by_field_name("expression")
                    .and_then(|e| self.infer_type(e, ctx, locals))?;
                self.table
                    .resolve_call(self.text(&site), Some(receiver), None, arg_count)
                    .map(|t| (t, site))
            }
            "member_binding_expression" => {
                let name_node = function.child_by_field_name("name")?;
                let site = simple_name_site(name_node);
                let receiver = conditional_receiver(node)
                    .and_then(|e| self.infer_type(e, ctx, locals))?;
                self.table
                    .resolve_call(self.text(&site), Some(receiver), None, arg_count)
                    .map(|t| (t, site))
            }
            "conditional_access_expression" => {
                let binding = named_children(&function)
                    .into_iter()
                    .rev()
                    .find(|c| c.kind() == "member_binding_expression")?;
                let site = simple_name_site(binding.child_by_field_name("name")?);
                let condition = function
                    .child_by_field_name("condition")
                    .or_else(|| function.named_child(0))?;
                let receiver = self.infer_type(condition, ctx, locals)?;
                self.table
                    .resolve_call(self.text(&site), Some(receiver), None, arg_count)
                    .map(|t| (t, site))
            }
            _ => None,
        }
    }

    fn visit_member_access(&mut self, node: Node, ctx: &WalkContext, locals: &mut Locals) {
        let expr = node.child_by_field_name("expression");
        let name = node.child_by_field_name("name");

        let receiver = expr.and_then(|e| self.infer_type(e, ctx, locals));
        match receiver {
            Some(receiver) => {
                if let Some(name) = name {
                    let site = simple_name_site(name);
                    if let Some(member) = self.table.resolve_data_member(receiver, self.text(&site)) {
                        self.emit(ctx, member, LinkKind::Accesses, &site);
                    }
                }
            }
            None => {
                // `App.Models.Order` written out in expression position
                if let Some(target) = self.qualified_type(node, ctx, locals) {
                    self.emit(ctx, target, LinkKind::UsesType, &node);
                    return;
                }
            }
        }

        if let Some(name) = name {
            for arg in generic_arguments(&name) {
                self.visit_type(arg, ctx);
            }
        }
        if let Some(expr) = expr {
            self.visit(expr, ctx, locals);
        }
    }

    fn visit_object_creation(&mut self, node: Node, ctx: &WalkContext, locals: &mut Locals) {
        let ty = node.child_by_field_name("type");
        if let Some(ty) = ty {
            self.visit_type(ty, ctx);
        }
        let created = ty.and_then(|t| self.table.resolve_type(self.text(&t), &ctx.namespace));
        let args = node.child_by_field_name("arguments");

        if let (Some(created), Some(ty)) = (created, ty) {
            let arg_count = args
                .map(|a| named_children(&a).iter().filter(|c| c.kind() == "argument").count())
                .unwrap_or(0);
            if let Some(ctor) = self.table.resolve_constructor(created, arg_count) {
                self.emit(ctx, ctor, LinkKind::Calls, &ty);
            }
        }
        if let Some(args) = args {
            self.visit(args, ctx, locals);
        }

        let initializer = node
            .child_by_field_name("initializer")
            .or_else(|| child_of_kind(&node, "initializer_expression"));
        let Some(initializer) = initializer else {
            return;
        };
        for entry in named_children(&initializer) {
            if entry.kind() != "assignment_expression" {
                self.visit(entry, ctx, locals);
                continue;
            }
            let left = entry.child_by_field_name("left");
            let target = match (created, left) {
                (Some(created), Some(left)) if left.kind() == "identifier" => {
                    self.table.resolve_data_member(created, self.text(&left))
                }
                _ => None,
            };
            if let (Some(member), Some(left)) = (target, left) {
                self.emit(ctx, member, LinkKind::Accesses, &left);
            } else if let Some(left) = left.filter(|l| l.kind() != "identifier") {
                self.visit(left, ctx, locals);
            }
            if let Some(right) = entry.child_by_field_name("right") {
                self.visit(right, ctx, locals);
            }
        }
    }

    fn visit_identifier(&mut self, node: Node, ctx: &WalkContext, locals: &mut Locals) {
        let name = self.text(&node);
        if locals.contains_key(name) {
            return;
        }
        if let Some(owner) = ctx.type_idx {
            if let Some(member) = self.table.resolve_data_member(owner, name) {
                self.emit(ctx, member, LinkKind::Accesses, &node);
                return;
            }
        }
        if let Some(target) = self.table.resolve_type(name, &ctx.namespace) {
            self.emit(ctx, target, LinkKind::UsesType, &node);
        }
    }

    /// Emits `UsesType` for every project type named in a type position
    fn visit_type(&mut self, node: Node, ctx: &WalkContext) {
        match node.kind() {
            "predefined_type" | "implicit_type" | "array_rank_specifier" | "comment" => {}
            "identifier" => {
                if let Some(target) = self.table.resolve_type(self.text(&node), &ctx.namespace) {
                    self.emit(ctx, target, LinkKind::UsesType, &node);
                }
            }
            "generic_name" => {
                let site = simple_name_site(node);
                if let Some(target) = self.table.resolve_type(self.text(&node), &ctx.namespace) {
                    self.emit(ctx, target, LinkKind::UsesType, &site);
                }
                for arg in generic_arguments(&node) {
                    self.visit_type(arg, ctx);
                }
            }
            "qualified_name" | "alias_qualified_name" => {
                if let Some(target) = self.table.resolve_type(self.text(&node), &ctx.namespace) {
                    self.emit(ctx, target, LinkKind::UsesType, &node);
                }
                for arg in generic_arguments(&node) {
                    self.visit_type(arg, ctx);
                }
            }
            "tuple_element" => {
                if let Some(ty) = node.child_by_field_name("type") {
                    self.visit_type(ty, ctx);
                }
            }
            _ => {
                for child in named_children(&node) {
                    self.visit_type(child, ctx);
                }
            }
        }
    }

    /// Type named by a dotted expression such as `App.Models.Order`
    fn qualified_type(&self, node: Node, ctx: &WalkContext, locals: &Locals) -> Option<usize> {
        let text = self.text(&node);
        let dotted = text
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c.is_whitespace());
        let head = text.split('.').next().unwrap_or_default().trim();
        if !dotted || locals.contains_key(head) {
            return None;
        }
        self.table.resolve_type(text, &ctx.namespace)
    }

    /// Best-effort static type of an expression, as a table index
    fn infer_type(&self, node: Node, ctx: &WalkContext, locals: &Locals) -> Option<usize> {
        match node.kind() {
            "identifier" => {
                let name = self.text(&node);
                if let Some(local) = locals.get(name) {
                    return *local;
                }
                if let Some(owner) = ctx.type_idx {
                    if let Some(member) = self.table.resolve_data_member(owner, name) {
                        return self.table.value_type_of(member);
                    }
                }
                self.table.resolve_type(name, &ctx.namespace)
            }
            "this_expression" | "this" => ctx.type_idx,
            "base_expression" | "base" => ctx.type_idx.and_then(|t| self.table.base_class(t)),
            "member_access_expression" => {
                let expr = node.child_by_field_name("expression")?;
                let name = node.child_by_field_name("name")?;
                match self.infer_type(expr, ctx, locals) {
                    Some(receiver) => self
                        .table
                        .resolve_data_member(receiver, self.text(&simple_name_site(name)))
                        .and_then(|m| self.table.value_type_of(m)),
                    None => self.qualified_type(node, ctx, locals),
                }
            }
            "invocation_expression" => self
                .resolve_invocation(node, ctx, locals)
                .and_then(|(target, _)| self.table.value_type_of(target)),
            "object_creation_expression" => node
                .child_by_field_name("type")
                .and_then(|t| self.table.resolve_type(self.text(&t), &ctx.namespace)),
            "cast_expression" => node
                .child_by_field_name("type")
                .and_then(|t| self.table.resolve_type(self.text(&t), &ctx.namespace)),
            "as_expression" => node
                .child_by_field_name("right")
                .and_then(|t| self.table.resolve_type(self.text(&t), &ctx.namespace)),
            "generic_name" | "qualified_name" => self.table.resolve_type(self.text(&node), &ctx.namespace),
            "parenthesized_expression" | "equals_value_clause" | "await_expression"
            | "postfix_unary_expression" => named_children(&node)
                .into_iter()
                .next()
                .and_then(|inner| self.infer_type(inner, ctx, locals)),
            _ => None,
        }
    }
}

/// Receiver of `a?.M()`: the condition of the enclosing conditional access
fn conditional_receiver<'t>(invocation: Node<'t>) -> Option<Node<'t>> {
    let mut current = invocation.parent();
    while let Some(node) = current {
        if node.kind() == "conditional_access_expression" {
            return node
                .child_by_field_name("condition")
                .or_else(|| node.named_child(0));
        }
        current = node.parent();
    }
    None
}

fn join_namespace(outer: &str, name: &str) -> String {
    if outer.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", outer, name)
    }
}

fn is_type_node(node: &Node) -> bool {
    matches!(
        node.kind(),
        "identifier"
            | "generic_name"
            | "qualified_name"
            | "predefined_type"
            | "array_type"
            | "nullable_type"
            | "tuple_type"
    )
}

/// Identifier part of a simple or generic name
fn simple_name_site(node: Node) -> Node {
    match node.kind() {
        "generic_name" => first_identifier(&node).unwrap_or(node),
        _ => node,
    }
}

/// Top-level type arguments of `List<T>` or `A.B<T>`
fn generic_arguments<'t>(node: &Node<'t>) -> Vec<Node<'t>> {
    let generic = match node.kind() {
        "generic_name" => Some(*node),
        "qualified_name" | "alias_qualified_name" => node
            .child_by_field_name("name")
            .filter(|n| n.kind() == "generic_name"),
        _ => None,
    };
    generic
        .and_then(|g| child_of_kind(&g, "type_argument_list"))
        .map(|list| named_children(&list))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(files: &[(&str, &str)]) -> SymbolGraph {
        let sources: Vec<(String, String)> = files
            .iter()
            .map(|(p, s)| (p.to_string(), s.to_string()))
            .collect();
        GraphBuilder::default().build_sources(&sources)
    }

    fn links_of(graph: &SymbolGraph, id: &str) -> Vec<(String, LinkKind)> {
        graph
            .node(id)
            .unwrap_or_else(|| panic!("missing node {}", id))
            .outgoing_links
            .iter()
            .map(|l| (l.target_id.clone(), l.kind))
            .collect()
    }

    fn has_link(graph: &SymbolGraph, from: &str, to: &str, kind: LinkKind) -> bool {
        links_of(graph, from).iter().any(|(t, k)| t == to && *k == kind)
    }

    const MODELS: &str = r#"
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

        public Order() { }
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

    const SERVICE: &str = r#"
using App.Models;

namespace App.Services
{
    public class OrderService
    {
        private readonly Order _current;

        public Order Create(int id)
        {
            var order = new Order(id);
            order.AddLine(new Line { Price = 3 });
            return order;
        }

        public decimal Sum(Order order)
        {
            order.Recalculate();
            return order.Total + _current.Total;
        }
    }
}
"#;

    #[test]
    fn test_declarations_have_signature_ids() {
        let graph = build(&[("Models.cs", MODELS)]);
        for id in [
            "App.Models.IEntity",
            "App.Models.IEntity.Id",
            "App.Models.Order",
            "App.Models.Order..ctor()",
            "App.Models.Order..ctor(int)",
            "App.Models.Order.AddLine(Line)",
            "App.Models.Order._lines",
            "App.Models.Line.Price",
        ] {
            assert!(graph.node(id).is_some(), "missing {}", id);
        }
        assert_eq!(graph.node("App.Models.Order").unwrap().kind, SymbolKind::Class);
        assert_eq!(graph.node("App.Models.IEntity").unwrap().kind, SymbolKind::Interface);
    }

    #[test]
    fn test_inheritance_and_implementation() {
        let graph = build(&[("Models.cs", MODELS)]);
        assert!(has_link(&graph, "App.Models.Entity", "App.Models.IEntity", LinkKind::Implements));
        assert!(has_link(&graph, "App.Models.Order", "App.Models.Entity", LinkKind::Inherits));
        assert_eq!(graph.implementers("App.Models.IEntity"), &["App.Models.Entity".to_string()]);
    }

    #[test]
    fn test_calls_accesses_and_type_uses_within_file() {
        let graph = build(&[("Models.cs", MODELS)]);
        let add_line = "App.Models.Order.AddLine(Line)";
        assert!(has_link(&graph, add_line, "App.Models.Order.Recalculate()", LinkKind::Calls));
        assert!(has_link(&graph, add_line, "App.Models.Order._lines", LinkKind::Accesses));
        assert!(has_link(&graph, add_line, "App.Models.Line", LinkKind::UsesType));
        assert!(has_link(&graph, "App.Models.Order.Recalculate()", "App.Models.Order.Total", LinkKind::Accesses));
        // inherited property through the base chain
        assert!(has_link(&graph, "App.Models.Order..ctor(int)", "App.Models.Entity.Id", LinkKind::Accesses));
    }

    #[test]
    fn test_cross_file_resolution() {
        let graph = build(&[("Models.cs", MODELS), ("Service.cs", SERVICE)]);
        let create = "App.Services.OrderService.Create(int)";
        assert!(has_link(&graph, create, "App.Models.Order..ctor(int)", LinkKind::Calls));
        assert!(has_link(&graph, create, "App.Models.Order.AddLine(Line)", LinkKind::Calls));
        assert!(has_link(&graph, create, "App.Models.Line.Price", LinkKind::Accesses));
        assert!(has_link(&graph, create, "App.Models.Order", LinkKind::UsesType));

        let sum = "App.Services.OrderService.Sum(Order)";
        assert!(has_link(&graph, sum, "App.Models.Order.Recalculate()", LinkKind::Calls));
        assert!(has_link(&graph, sum, "App.Models.Order.Total", LinkKind::Accesses));
        assert!(has_link(&graph, sum, "App.Services.OrderService._current", LinkKind::Accesses));
    }

    #[test]
    fn test_builtins_produce_no_edges() {
        let graph = build(&[(
            "A.cs",
            "class A { string Name; List<int> Items; void Run(int x) { var s = new StringBuilder(); } }",
        )]);
        for node in graph.nodes.values() {
            assert!(node.outgoing_links.is_empty(), "unexpected links on {}", node.id);
        }
    }

    #[test]
    fn test_generic_arguments_and_generic_calls() {
        let graph = build(&[(
            "A.cs",
            r#"
class Item { }
class Box {
    public T Get<T>() { return default; }
    public Dictionary<string, List<Item>> Index() {
        var x = Get<Item>();
        var y = Get<int>();
        return null;
    }
}
"#,
        )]);
        let index = "Box.Index()";
        assert!(has_link(&graph, index, "Box.Get()", LinkKind::Calls));
        assert!(has_link(&graph, index, "Item", LinkKind::UsesType));
        let call_targets: BTreeSet<String> = links_of(&graph, index)
            .into_iter()
            .filter(|(_, k)| *k == LinkKind::Calls)
            .map(|(t, _)| t)
            .collect();
        assert_eq!(call_targets.into_iter().collect::<Vec<_>>(), vec!["Box.Get()".to_string()]);

        let uses: Vec<_> = graph
            .node(index)
            .unwrap()
            .outgoing_links
            .iter()
            .filter(|l| l.target_id == "Item")
            .collect();
        // one per reference site
        assert_eq!(uses.len(), 2);
    }

    #[test]
    fn test_self_links_are_dropped() {
        let graph = build(&[("A.cs", "class A { void Loop() { Loop(); } A Me() { return this; } }")]);
        assert!(links_of(&graph, "A.Loop()").is_empty());
        assert!(!has_link(&graph, "A", "A", LinkKind::UsesType));
    }

    #[test]
    fn test_overloads_by_argument_count() {
        let graph = build(&[(
            "A.cs",
            r#"
class A {
    void Log(string m) { }
    void Log(string m, int level) { }
    void Run() { Log("x", 1); }
}
"#,
        )]);
        assert!(has_link(&graph, "A.Run()", "A.Log(string, int)", LinkKind::Calls));
        assert!(!has_link(&graph, "A.Run()", "A.Log(string)", LinkKind::Calls));
    }

    #[test]
    fn test_builtin_receivers_do_not_bind_project_methods() {
        let graph = build(&[(
            "A.cs",
            r#"
class Cart { public void Add(int n) { } public void WriteLine(string s) { } }
class Svc {
    System.Collections.Generic.List<int> xs;
    Cart cart;
    void Run(string name) {
        xs.Add(1);
        Console.WriteLine("x");
        name.Trim();
        Unknown.Thing().Add(2);
    }
    void Fill() { cart.Add(3); cart?.WriteLine("y"); }
}
"#,
        )]);
        let calls: Vec<String> = links_of(&graph, "Svc.Run(string)")
            .into_iter()
            .filter(|(_, k)| *k == LinkKind::Calls)
            .map(|(t, _)| t)
            .collect();
        assert!(calls.is_empty(), "unexpected calls {:?}", calls);

        assert!(has_link(&graph, "Svc.Fill()", "Cart.Add(int)", LinkKind::Calls));
        assert!(has_link(&graph, "Svc.Fill()", "Cart.WriteLine(string)", LinkKind::Calls));
    }

    #[test]
    fn test_implicit_calls_still_use_unique_names() {
        let graph = build(&[(
            "A.cs",
            "static class Util { public static void Flush() { } } class B { void Run() { Flush(); } }",
        )]);
        assert!(has_link(&graph, "B.Run()", "Util.Flush()", LinkKind::Calls));
    }

    #[test]
    fn test_partial_type_resolves_across_files() {
        let graph = build(&[
            (
                "A.cs",
                "namespace App { public interface IRepo { } public partial class Repo : IRepo { public void Load() { Save(); } } }",
            ),
            ("B.cs", "namespace App { public partial class Repo { public void Save() { } } }"),
            (
                "C.cs",
                "namespace App { class Svc { Repo repo; void Run() { repo.Load(); repo.Save(); } } }",
            ),
        ]);

        assert!(graph.node("App.Repo").is_some());
        assert!(graph.node("App.Repo#2").is_some());
        assert!(graph.node("App.Repo.Save()").is_some());

        assert!(has_link(&graph, "App.Svc.repo", "App.Repo", LinkKind::UsesType));
        assert!(has_link(&graph, "App.Svc.Run()", "App.Repo.Load()", LinkKind::Calls));
        assert!(has_link(&graph, "App.Svc.Run()", "App.Repo.Save()", LinkKind::Calls));
        // a call between parts of the same type
        assert!(has_link(&graph, "App.Repo.Load()", "App.Repo.Save()", LinkKind::Calls));
        assert_eq!(graph.implementers("App.IRepo"), &["App.Repo".to_string()]);
    }

    #[test]
    fn test_locals_shadow_members() {
        let graph = build(&[(
            "A.cs",
            "class A { int count; void Run() { int count = 1; count++; } void Go() { count++; } }",
        )]);
        assert!(!has_link(&graph, "A.Run()", "A.count", LinkKind::Accesses));
        assert!(has_link(&graph, "A.Go()", "A.count", LinkKind::Accesses));
    }

    #[test]
    fn test_span_round_trip() {
        let text = MODELS;
        let graph = build(&[("Models.cs", text)]);
        for node in graph.nodes_in_file("Models.cs") {
            let slice = node.slice(text).expect("span in range");
            assert!(slice.contains(&node.name), "{} not in slice of {}", node.name, node.id);
            for link in &node.outgoing_links {
                assert!(link.start >= node.start && link.start + link.length <= node.end());
            }
        }
    }

    #[test]
    fn test_span_reparses_to_same_signature() {
        use crate::indexer::signature::{declaration_name, member_signature};

        let graph = build(&[("Models.cs", MODELS), ("Service.cs", SERVICE)]);
        let parser = Parser::default();
        for (path, text) in [("Models.cs", MODELS), ("Service.cs", SERVICE)] {
            for node in graph.nodes_in_file(path) {
                let wrapped = format!("class Host {{\n{}\n}}", node.slice(text).unwrap());
                let parsed = parser.parse_text(&wrapped).unwrap();

                let mut stack = vec![parsed.root_node()];
                let mut found = None;
                while let Some(current) = stack.pop() {
                    let is_host = current.kind() == "class_declaration"
                        && declaration_name(&current, &parsed.source).as_deref() == Some("Host");
                    if !is_host {
                        if type_kind(&current).is_some() {
                            found = declaration_name(&current, &parsed.source);
                        } else if MemberKind::from_node(&current).is_some() {
                            found = member_signature(&current, &parsed.source);
                        }
                        if found.is_some() {
                            break;
                        }
                    }
                    let mut children = named_children(&current);
                    children.reverse();
                    stack.extend(children);
                }

                let signature = found.unwrap_or_else(|| panic!("no declaration in slice of {}", node.id));
                assert!(node.id.ends_with(&signature), "{} vs {}", node.id, signature);
            }
        }
    }

    #[test]
    fn test_file_index_is_sorted() {
        let graph = build(&[("Models.cs", MODELS)]);
        let starts: Vec<usize> = graph.nodes_in_file("Models.cs").iter().map(|n| n.start).collect();
        let mut sorted = starts.clone();
        sorted.sort();
        assert_eq!(starts, sorted);
    }

    #[test]
    fn test_granular_nodes_opt_in() {
        let source = r#"
class A {
    int Run(int x) {
        var total = 0;
        if (x > 1) { total = 42; }
        return total + "s".Length;
    }
}
"#;
        let plain = build(&[("A.cs", source)]);
        assert!(plain.nodes.values().all(|n| n.kind.is_declaration()));

        let builder = GraphBuilder::new(IndexOptions {
            include_granular_nodes: true,
            ..IndexOptions::default()
        });
        let graph = builder.build_sources(&[("A.cs".to_string(), source.to_string())]);
        let kinds: BTreeSet<SymbolKind> = graph.nodes.values().map(|n| n.kind).collect();
        for kind in [
            SymbolKind::Parameter,
            SymbolKind::LocalVariable,
            SymbolKind::ControlFlow,
            SymbolKind::Statement,
            SymbolKind::NumericLiteral,
            SymbolKind::StringLiteral,
        ] {
            assert!(kinds.contains(&kind), "missing {:?}", kind);
        }
        for node in graph.nodes.values() {
            assert_eq!(node.slice(source).map(|s| s.len()), Some(node.length));
        }
    }

    #[test]
    fn test_file_scoped_namespace() {
        let graph = build(&[
            ("A.cs", "namespace App.Core;\npublic class Repo { }\n"),
            ("B.cs", "namespace App.Core;\npublic class Svc { Repo repo; }\n"),
        ]);
        assert!(has_link(&graph, "App.Core.Svc.repo", "App.Core.Repo", LinkKind::UsesType));
    }

    #[test]
    fn test_index_project_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Models.cs"), MODELS).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let builder = GraphBuilder::default();
        let graph = builder.index_project(dir.path()).unwrap();
        assert!(graph.node("App.Models.Order").is_some());
        assert_eq!(builder.progress().snapshot().files_parsed, 1);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(GraphBuilder::default().index_project(&missing).is_err());
    }
}
