use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use code_context::context::{ContextFlags, SelectionItem};
use code_context::diff::{DiffLineKind, TokenChange};
use code_context::index::{ScopeId, ScopeTree};
use code_context::{AnalysisConfig, AnalysisEngine};

#[derive(Parser)]
#[command(name = "code-context")]
#[command(about = "Symbol graph, context extraction and semantic diffs for C# projects")]
#[command(version)]
#[command(after_long_help = r#"
EXAMPLES:
    # Index a project and show graph statistics
    code-context index ./src

    # Everything a method transitively calls
    code-context deps "Shop.Cart.Add(int)" --path ./src

    # Prompt context: one whole file plus one member of another
    code-context context ./src --select Models/Order.cs --select "Services/Cart.cs::Shop.Cart.Add(int)"

    # Which lines of the new version changed logic
    code-context diff semantic Cart.old.cs Cart.cs

    # Propose merging a pasted fragment into its owning file
    code-context patch ./src fragment.cs
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to <project>/.code-context.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the symbol graph of a project
    Index {
        /// Project root
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Transitive dependency closure of a declaration
    Deps {
        /// Declaration id, e.g. `Shop.Cart.Add(int)`
        symbol: String,

        /// Project root
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },

    /// Scope tree of one file
    Scopes {
        /// Source file
        file: PathBuf,
    },

    /// Concatenate selected files and declarations into one context block
    Context {
        /// Project root
        #[arg(default_value = ".")]
        path: PathBuf,

        /// `file` for a whole file or `file::declaration-id` for one declaration
        #[arg(long = "select", required = true)]
        select: Vec<String>,

        /// Keep `using` directives
        #[arg(long)]
        keep_imports: bool,

        /// Keep namespace wrappers
        #[arg(long)]
        keep_namespaces: bool,

        /// Keep comments
        #[arg(long)]
        keep_comments: bool,

        /// Keep runs of blank lines
        #[arg(long)]
        keep_blank_lines: bool,
    },

    /// Compare two versions of a file
    Diff {
        #[command(subcommand)]
        command: DiffCommands,
    },

    /// Propose merging a code fragment into its owning file (never writes)
    Patch {
        /// Project root
        path: PathBuf,

        /// Fragment file, `-` for stdin
        fragment: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum DiffCommands {
    /// Token-level LCS diff
    Tokens { old: PathBuf, new: PathBuf },

    /// Added/removed/modified syntax nodes
    Tree { old: PathBuf, new: PathBuf },

    /// Lines of the new version whose member changed
    Semantic { old: PathBuf, new: PathBuf },
}

/// Engine configured from `--config`, or from the project's own config file
pub fn engine_for(config: Option<&Path>, project: &Path) -> anyhow::Result<AnalysisEngine> {
    let config = match config {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AnalysisConfig::discover(project)
            .with_context(|| format!("Failed to load config under {}", project.display()))?,
    };
    Ok(AnalysisEngine::new(config))
}

fn read_text(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn index_project(engine: &AnalysisEngine, path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let graph = engine.index_project(path).await?;
    let stats = graph.stats();

    if format == OutputFormat::Json {
        return print_json(&stats);
    }

    let progress = engine.progress().snapshot();
    println!("Index Statistics:");
    println!("  Files: {}", stats.files);
    if progress.files_failed > 0 {
        println!("  Skipped files: {}", progress.files_failed);
    }
    println!("  Nodes: {}", stats.nodes);
    println!("  Declarations: {}", stats.declarations);
    println!("  Links: {}", stats.links);
    if !stats.links_by_kind.is_empty() {
        let mut kinds: Vec<_> = stats.links_by_kind.iter().collect();
        kinds.sort();
        println!("\n  Links by kind:");
        for (kind, count) in kinds {
            println!("    {}: {}", kind, count);
        }
    }
    println!("  Implemented interfaces: {}", stats.interfaces_implemented);
    Ok(())
}

pub async fn deep_dependencies(
    engine: &AnalysisEngine,
    symbol: &str,
    path: &Path,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let graph = engine.index_project(path).await?;
    if graph.node(symbol).is_none() {
        anyhow::bail!("Unknown declaration: {}", symbol);
    }

    let mut ids: Vec<String> = engine.get_deep_dependencies(&graph, symbol).into_iter().collect();
    ids.sort();

    if format == OutputFormat::Json {
        return print_json(&ids);
    }
    for id in ids {
        match graph.node(&id) {
            Some(node) => println!("{} ({}) - {}:{}", id, node.kind, node.file_path, node.start),
            None => println!("{}", id),
        }
    }
    Ok(())
}

pub fn scopes(engine: &AnalysisEngine, file: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let text = read_text(file)?;
    let tree = engine.build_scope_tree(&text, &file.to_string_lossy());

    if format == OutputFormat::Json {
        return print_json(&tree);
    }
    for root in &tree.roots {
        print_scope(&tree, *root, 0);
    }
    Ok(())
}

fn print_scope(tree: &ScopeTree, id: ScopeId, depth: usize) {
    let Some(node) = tree.get(id) else {
        return;
    };
    println!(
        "{}{} {} [{}..{}]",
        "  ".repeat(depth),
        node.kind,
        node.name,
        node.start,
        node.end()
    );
    for child in &node.children {
        print_scope(tree, *child, depth + 1);
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn context(
    engine: &AnalysisEngine,
    path: &Path,
    select: &[String],
    keep_imports: bool,
    keep_namespaces: bool,
    keep_comments: bool,
    keep_blank_lines: bool,
) -> anyhow::Result<()> {
    let defaults = engine.config().context;
    let flags = ContextFlags {
        omit_imports: defaults.omit_imports && !keep_imports,
        omit_namespaces: defaults.omit_namespaces && !keep_namespaces,
        omit_comments: defaults.omit_comments && !keep_comments,
        omit_blank_lines: defaults.omit_blank_lines && !keep_blank_lines,
    };
    let selection: Vec<SelectionItem> = select
        .iter()
        .map(|s| match s.split_once("::") {
            Some((file, id)) if !id.is_empty() => SelectionItem::declaration(file, id),
            _ => SelectionItem::whole_file(s.as_str()),
        })
        .collect();

    let text = engine.build_context(&selection, path, &flags).await?;
    print!("{}", text);
    Ok(())
}

pub fn diff(engine: &AnalysisEngine, command: &DiffCommands, format: OutputFormat) -> anyhow::Result<()> {
    match command {
        DiffCommands::Tokens { old, new } => {
            let source = engine.tokenize(&read_text(old)?);
            let target = engine.tokenize(&read_text(new)?);
            let changes = engine.compute_token_diff(&source, &target);
            if format == OutputFormat::Json {
                return print_json(&changes);
            }
            for change in changes {
                match change {
                    TokenChange::Unchanged { target, .. } => println!("  {}", target.text),
                    TokenChange::Inserted { token } => println!("+ {}", token.text),
                    TokenChange::Removed { token } => println!("- {}", token.text),
                    TokenChange::Modified {
                        source_count,
                        target_count,
                        ..
                    } => println!(
                        "~ inputs too large to compare ({} x {} tokens)",
                        source_count, target_count
                    ),
                }
            }
        }
        DiffCommands::Tree { old, new } => {
            let diff = engine.compute_tree_diff(&read_text(old)?, &read_text(new)?);
            if format == OutputFormat::Json {
                return print_json(&diff);
            }
            for node in &diff.added {
                println!("+ {} lines {}-{}", node.kind, node.start_line, node.end_line);
            }
            for node in &diff.removed {
                println!("- {} lines {}-{}", node.kind, node.start_line, node.end_line);
            }
            for change in &diff.modified {
                println!(
                    "~ {} lines {}-{} ({:?})",
                    change.new.kind, change.new.start_line, change.new.end_line, change.change_type
                );
            }
        }
        DiffCommands::Semantic { old, new } => {
            let lines = engine.compute_semantic_diff(&read_text(old)?, &read_text(new)?);
            if format == OutputFormat::Json {
                return print_json(&lines);
            }
            for line in lines {
                let marker = match line.kind {
                    DiffLineKind::Added => '+',
                    DiffLineKind::Unchanged => ' ',
                };
                println!("{}{:>5} {}", marker, line.line_number, line.text);
            }
        }
    }
    Ok(())
}

pub async fn patch(
    engine: &AnalysisEngine,
    path: &Path,
    fragment: &Path,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let fragment = read_text(fragment)?;
    let Some(patch) = engine.patch(&fragment, path).await? else {
        eprintln!("No patch: owner not found or nothing to change");
        return Ok(());
    };

    if format == OutputFormat::Json {
        return print_json(&patch);
    }
    eprintln!(
        "{}: {} replaced, {} appended",
        patch.file_path,
        patch.status.replaced.len(),
        patch.status.appended.len()
    );
    print!("{}", patch.new_text);
    Ok(())
}
