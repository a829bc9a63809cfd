use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tapestry_app::{NavigationSession, SessionSettings};
use tapestry_core::{InMemoryModelSource, NavNodeId};
use tapestry_nav::{NavTree, StopTarget};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect saved navigation state", long_about = None)]
struct Args {
    /// JSON description of the models the navigation state refers to
    #[arg(short, long, global = true)]
    models: Option<PathBuf>,

    /// Session settings file
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the navigation tree
    Tree { file: PathBuf },
    /// List user tree paths and their stops
    Paths { file: PathBuf },
    /// Print the cross-platform model tree as JSON
    Xplat { file: PathBuf },
    /// Report dangling references; exits non-zero on problems
    Check { file: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let source = match &args.models {
        Some(path) => load_models(path)?,
        None => InMemoryModelSource::new(),
    };
    let settings = args
        .settings
        .as_deref()
        .map(SessionSettings::load)
        .unwrap_or_default();
    let mut session = NavigationSession::new(source, settings);

    match &args.command {
        Command::Tree { file } => {
            session.load(file)?;
            print_tree(session.tree());
        }
        Command::Paths { file } => {
            session.load(file)?;
            print_paths(&session);
        }
        Command::Xplat { file } => {
            session.load(file)?;
            let json = serde_json::to_string_pretty(&session.xplat_tree())
                .context("Failed to serialize model tree")?;
            println!("{json}");
        }
        Command::Check { file } => {
            session.load(file)?;
            let problems = session.check();
            if problems.is_empty() {
                println!("No problems found.");
            } else {
                for problem in &problems {
                    println!("{problem}");
                }
                bail!("{} problem(s) in {}", problems.len(), file.display());
            }
        }
    }
    Ok(())
}

fn load_models(path: &Path) -> Result<InMemoryModelSource> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read models from {}", path.display()))?;
    let source = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse models in {}", path.display()))?;
    tracing::info!("Loaded models from {}", path.display());
    Ok(source)
}

fn print_tree(tree: &NavTree) {
    if tree.is_empty() {
        println!("(empty)");
        return;
    }
    for id in tree.preorder() {
        let Some(contents) = tree.contents(&id) else {
            continue;
        };
        let indent = "  ".repeat(tree.depth(&id).saturating_sub(1));
        let label = contents
            .name
            .as_deref()
            .or(contents.model_id.as_deref())
            .or(contents.proxy_id.as_deref())
            .unwrap_or("?");
        println!("{indent}{label} [{}] ({id})", contents.kind);
    }
}

fn print_paths(session: &NavigationSession) {
    let manager = session.paths().manager();
    if manager.is_empty() {
        println!("(no paths)");
        return;
    }
    for path in manager.paths() {
        println!("{} ({} stops)", path.name(), path.len());
        for (i, stop) in path.stops().iter().enumerate() {
            let target = match stop.target() {
                StopTarget::Model(model_id) => format!("model {model_id}"),
                StopTarget::Node { node_id, .. } => node_label(session.tree(), node_id),
            };
            match stop.overlay() {
                Some(overlay) => println!(
                    "  {}. {target} overlay {overlay} modules {:?}",
                    i + 1,
                    stop.modules()
                ),
                None => println!("  {}. {target}", i + 1),
            }
        }
    }
}

fn node_label(tree: &NavTree, id: &NavNodeId) -> String {
    match tree.contents(id).and_then(|c| c.name.clone()) {
        Some(name) => format!("node {id} '{name}'"),
        None => format!("node {id}"),
    }
}
