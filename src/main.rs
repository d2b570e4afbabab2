mod cli;

use std::path::Path;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "code_context=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();
    let format = cli.format;

    match &cli.command {
        Commands::Index { path } => {
            let engine = cli::engine_for(config, path)?;
            cli::index_project(&engine, path, format).await?;
        }
        Commands::Deps { symbol, path } => {
            let engine = cli::engine_for(config, path)?;
            cli::deep_dependencies(&engine, symbol, path, format).await?;
        }
        Commands::Scopes { file } => {
            let project = file.parent().unwrap_or(Path::new("."));
            let engine = cli::engine_for(config, project)?;
            cli::scopes(&engine, file, format)?;
        }
        Commands::Context {
            path,
            select,
            keep_imports,
            keep_namespaces,
            keep_comments,
            keep_blank_lines,
        } => {
            let engine = cli::engine_for(config, path)?;
            cli::context(
                &engine,
                path,
                select,
                *keep_imports,
                *keep_namespaces,
                *keep_comments,
                *keep_blank_lines,
            )
            .await?;
        }
        Commands::Diff { command } => {
            let engine = cli::engine_for(config, Path::new("."))?;
            cli::diff(&engine, command, format)?;
        }
        Commands::Patch { path, fragment } => {
            let engine = cli::engine_for(config, path)?;
            cli::patch(&engine, path, fragment, format).await?;
        }
    }

    Ok(())
}
