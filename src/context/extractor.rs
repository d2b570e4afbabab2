use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::cleanup;
use crate::index::{normalize_path, SymbolGraph, SymbolNode};

/// Separator between a physical path and a declaration id in composite selections
pub const COMPOSITE_SEPARATOR: &str = "::";

/// One selected file or declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionItem {
    pub file_path: String,
    #[serde(default)]
    pub declaration_id: Option<String>,
    #[serde(default)]
    pub is_whole_file: bool,
}

impl SelectionItem {
    pub fn whole_file(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            declaration_id: None,
            is_whole_file: true,
        }
    }

    pub fn declaration(file_path: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            declaration_id: Some(id.into()),
            is_whole_file: false,
        }
    }

    /// Path part of a `path::id` composite
    pub fn physical_path(&self) -> &str {
        match self.file_path.find(COMPOSITE_SEPARATOR) {
            Some(idx) => &self.file_path[..idx],
            None => &self.file_path,
        }
    }

    pub fn target_id(&self) -> Option<&str> {
        self.declaration_id.as_deref().or_else(|| {
            self.file_path
                .find(COMPOSITE_SEPARATOR)
                .map(|idx| &self.file_path[idx + COMPOSITE_SEPARATOR.len()..])
                .filter(|id| !id.is_empty())
        })
    }

    pub fn selects_whole_file(&self) -> bool {
        self.is_whole_file || self.target_id().is_none()
    }
}

/// Cleanup passes applied to whole-file sections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextFlags {
    pub omit_imports: bool,
    pub omit_namespaces: bool,
    pub omit_comments: bool,
    pub omit_blank_lines: bool,
}

impl Default for ContextFlags {
    fn default() -> Self {
        Self {
            omit_imports: true,
            omit_namespaces: true,
            omit_comments: true,
            omit_blank_lines: true,
        }
    }
}

impl ContextFlags {
    pub fn none() -> Self {
        Self {
            omit_imports: false,
            omit_namespaces: false,
            omit_comments: false,
            omit_blank_lines: false,
        }
    }
}

/// Turns a selection into one text block, one section per file
pub struct ContextExtractor<'g> {
    graph: Option<&'g SymbolGraph>,
}

impl<'g> ContextExtractor<'g> {
    /// Without a graph, declaration selections resolve to nothing
    pub fn new(graph: Option<&'g SymbolGraph>) -> Self {
        Self { graph }
    }

    pub fn build_context(&self, selection: &[SelectionItem], root: &Path, flags: &ContextFlags) -> String {
        let mut sections = Vec::new();
        for (path, items) in group_by_file(selection) {
            let full_path = resolve_path(root, path);
            let content = match std::fs::read_to_string(&full_path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::debug!("Skipping {} in context: {}", full_path.display(), e);
                    continue;
                }
            };

            let body = if items.iter().any(|i| i.selects_whole_file()) {
                clean_whole_file(&content, flags)
            } else {
                let ids: Vec<&str> = items.iter().filter_map(|i| i.target_id()).collect();
                match self.extract_declarations(&ids, &full_path, &content) {
                    Some(body) => body,
                    None => continue,
                }
            };

            sections.push(format!(
                "// File: {}\n{}\n",
                display_path(root, &full_path),
                body.trim_start_matches(['\r', '\n']).trim_end_matches(['\r', '\n'])
            ));
        }
        sections.join("\n")
    }

    /// Exact slices of the selected declarations, in source order
    fn extract_declarations(&self, ids: &[&str], full_path: &Path, content: &str) -> Option<String> {
        let graph = self.graph?;
        let file_key = normalize_path(&full_path.to_string_lossy());

        let mut nodes: Vec<&Arc<SymbolNode>> = Vec::new();
        for id in ids {
            let Some(node) = graph.node(id) else {
                tracing::debug!("Unknown declaration {} in selection", id);
                continue;
            };
            if !same_file(&normalize_path(&node.file_path), &file_key) {
                continue;
            }
            if !nodes.iter().any(|n| n.id == node.id) {
                nodes.push(node);
            }
        }
        nodes.sort_by_key(|n| n.start);

        let slices: Vec<&str> = nodes.iter().filter_map(|n| n.slice(content)).collect();
        if slices.is_empty() {
            None
        } else {
            Some(slices.join("\n\n"))
        }
    }
}

fn group_by_file(selection: &[SelectionItem]) -> Vec<(&str, Vec<&SelectionItem>)> {
    let mut order: Vec<(&str, Vec<&SelectionItem>)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for item in selection {
        let path = item.physical_path();
        match index.get(path) {
            Some(&i) => order[i].1.push(item),
            None => {
                index.insert(path, order.len());
                order.push((path, vec![item]));
            }
        }
    }
    order
}

fn clean_whole_file(content: &str, flags: &ContextFlags) -> String {
    let mut text = content.to_string();
    if flags.omit_comments {
        text = cleanup::strip_comments(&text);
    }
    if flags.omit_imports {
        text = cleanup::strip_usings(&text);
    }
    if flags.omit_namespaces {
        text = cleanup::strip_namespaces(&text);
    }
    if flags.omit_blank_lines {
        text = cleanup::collapse_blank_lines(&text);
    }
    text
}

fn resolve_path(root: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn display_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    normalize_path(&relative.to_string_lossy())
}

fn same_file(a: &str, b: &str) -> bool {
    a == b || a.ends_with(&format!("/{}", b)) || b.ends_with(&format!("/{}", a))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_paths() {
        let item = SelectionItem {
            file_path: "src/Order.cs::App.Order.Run()".to_string(),
            declaration_id: None,
            is_whole_file: false,
        };
        assert_eq!(item.physical_path(), "src/Order.cs");
        assert_eq!(item.target_id(), Some("App.Order.Run()"));
        assert!(!item.selects_whole_file());

        let plain = SelectionItem::whole_file("src/Order.cs");
        assert_eq!(plain.physical_path(), "src/Order.cs");
        assert!(plain.selects_whole_file());
    }

    #[test]
    fn test_grouping_keeps_first_appearance_order() {
        let selection = vec![
            SelectionItem::declaration("b.cs", "B.X"),
            SelectionItem::whole_file("a.cs"),
            SelectionItem::declaration("b.cs::B.Y", "B.Y"),
        ];
        let groups = group_by_file(&selection);
        let paths: Vec<&str> = groups.iter().map(|(p, _)| *p).collect();
        assert_eq!(paths, vec!["b.cs", "a.cs"]);
        assert_eq!(groups[0].1.len(), 2);
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("A.cs"), "class A { }\n").unwrap();
        let selection = vec![
            SelectionItem::whole_file("Gone.cs"),
            SelectionItem::whole_file("A.cs"),
        ];
        let text = ContextExtractor::new(None).build_context(&selection, dir.path(), &ContextFlags::none());
        assert_eq!(text, "// File: A.cs\nclass A { }\n");
    }
}
