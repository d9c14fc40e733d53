use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use stylegraph::errors::Result;
use stylegraph::graph::NodeId;
use stylegraph::project::Project;
use tracing_subscriber::EnvFilter;

/// Import graphs for Sass stylesheets.
#[derive(Parser)]
#[command(name = "stylegraph", about = "Import graphs for Sass stylesheets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration
    Init {
        /// Project path (default: current directory)
        path: Option<String>,
    },
    /// Print every stylesheet with its imports and importers
    Graph {
        /// Project path (default: current directory)
        path: Option<String>,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
    /// Print everything a stylesheet loads, directly or indirectly
    Deps {
        /// Stylesheet, relative to the project root
        file: String,
        /// Project path
        #[arg(short, long)]
        path: Option<String>,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
    /// Print everything that must be recompiled when a stylesheet changes
    Dependents {
        /// Stylesheet, relative to the project root
        file: String,
        /// Project path
        #[arg(short, long)]
        path: Option<String>,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
    /// Show graph statistics
    Status {
        /// Project path (default: current directory)
        path: Option<String>,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("STYLEGRAPH_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { path } => {
            let project_path = resolve_path(path);
            Project::init(&project_path)?;
            println!("Initialized stylegraph at {}", project_path.display());
        }
        Commands::Graph { path, json } => {
            let project = open_indexed(path)?;
            let graph = project.graph();
            let summaries: Vec<_> = graph
                .nodes()
                .iter()
                .filter_map(|node| graph.summary(node.id()))
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                for summary in &summaries {
                    println!("{} ({})", summary.display_url, summary.syntax.as_str());
                    for url in &summary.upstream {
                        println!("  -> {}", url);
                    }
                    for url in &summary.downstream {
                        println!("  <- {}", url);
                    }
                }
            }
        }
        Commands::Deps { file, path, json } => {
            let mut project = open_indexed(path)?;
            let url = project.canonical_url(&file)?;
            let graph = project.graph();
            let ids = graph
                .node_id(&url)
                .map(|id| graph.transitive_upstream(id))
                .unwrap_or_default();
            print_urls(&project, &ids, json)?;
        }
        Commands::Dependents { file, path, json } => {
            let mut project = open_indexed(path)?;
            let url = project.canonical_url(&file)?;
            let graph = project.graph();
            let ids = graph
                .node_id(&url)
                .map(|id| graph.transitive_downstream(id))
                .unwrap_or_default();
            print_urls(&project, &ids, json)?;
        }
        Commands::Status { path, json } => {
            let project = open_indexed(path)?;
            let stats = project.graph().stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("stylegraph status");
                println!("  Stylesheets: {}", stats.node_count);
                println!("  Imports:     {}", stats.edge_count);
                println!("  Roots:       {}", stats.root_count);
                println!("  Leaves:      {}", stats.leaf_count);
            }
        }
    }
    Ok(())
}

/// Opens the project and builds its graph, reporting files that failed.
fn open_indexed(path: Option<String>) -> Result<Project> {
    let project_path = resolve_path(path);
    let mut project = Project::open(&project_path)?;
    let result = project.index_all()?;
    for (file, reason) in &result.failures {
        eprintln!("warning: {}: {}", file, reason);
    }
    Ok(project)
}

fn print_urls(project: &Project, ids: &[NodeId], json: bool) -> Result<()> {
    let urls: Vec<String> = ids
        .iter()
        .filter_map(|id| project.graph().get(*id))
        .map(|node| node.stylesheet().url().to_string())
        .collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&urls)?);
    } else if urls.is_empty() {
        println!("(none)");
    } else {
        for url in &urls {
            println!("{}", url);
        }
    }
    Ok(())
}

/// Resolves an optional path argument to a `PathBuf`.
///
/// Defaults to the current working directory if no path is provided.
fn resolve_path(path: Option<String>) -> PathBuf {
    match path {
        Some(p) => PathBuf::from(p),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
