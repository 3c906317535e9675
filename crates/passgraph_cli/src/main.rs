// SPDX-License-Identifier: MIT OR Apache-2.0
//! `passgraph` command line tool.
//!
//! Loads saved pass graphs (XML or RON, chosen by file extension) against
//! the built-in node library.

use clap::{Parser, Subcommand};
use passgraph_engine::config::CONFIG_FILE_NAME;
use passgraph_engine::{
    create_pass_library, EngineConfig, Graph, GraphDocument, GraphError, NodeId, NodeRegistry, Result,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Inspect, check and convert pass graph files
#[derive(Parser, Debug)]
#[command(name = "passgraph", author, version, about, long_about = None)]
struct Args {
    /// Engine configuration file (RON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log engine activity at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the node tree of a graph file
    Inspect {
        /// Graph file
        file: PathBuf,
    },
    /// Convert between the XML and RON formats
    Convert {
        /// Source graph file
        input: PathBuf,
        /// Destination graph file
        output: PathBuf,
    },
    /// Print slot signatures of every node, or of one node
    Signatures {
        /// Graph file
        file: PathBuf,
        /// Only this node id
        #[arg(long)]
        node: Option<u32>,
    },
    /// Verify that link tables and slot caches agree
    Check {
        /// Graph file
        file: PathBuf,
    },
    /// Run the tasks of the top-level graph for a number of frames
    Execute {
        /// Graph file
        file: PathBuf,
        /// Frames to run
        #[arg(long, default_value_t = 1)]
        frames: u64,
    },
    /// Write the default engine configuration
    InitConfig {
        /// Destination file
        #[arg(default_value = CONFIG_FILE_NAME)]
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Xml,
    Ron,
}

impl Format {
    fn of(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("xml") => Ok(Self::Xml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(GraphError::Malformed(format!(
                "{} has no .xml or .ron extension",
                path.display()
            ))),
        }
    }
}

fn read_document(path: &Path) -> Result<GraphDocument> {
    let text = std::fs::read_to_string(path)?;
    match Format::of(path)? {
        Format::Xml => GraphDocument::from_xml(&text),
        Format::Ron => GraphDocument::from_ron(&text),
    }
}

fn load_graph(path: &Path, config: &EngineConfig, registry: &NodeRegistry) -> Result<Graph> {
    let document = read_document(path)?;
    let mut graph = Graph::with_config(config.clone())?;
    graph.load_document(&document, registry)?;
    tracing::info!(
        "loaded {} ({} nodes, {} links)",
        path.display(),
        graph.node_count() - 1,
        graph.link_count()
    );
    Ok(graph)
}

fn print_tree(graph: &Graph, container: NodeId, depth: usize) {
    for id in graph.children(container) {
        let Some(node) = graph.node(id) else {
            continue;
        };
        println!(
            "{}{} '{}' [{}] {} in / {} out",
            "  ".repeat(depth),
            id,
            node.name,
            node.node_type,
            node.inputs().count(),
            node.outputs().count()
        );
        if node.is_graph() {
            print_tree(graph, id, depth + 1);
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let registry = create_pass_library();

    match args.command {
        Command::Inspect { file } => {
            let graph = load_graph(&file, &config, &registry)?;
            print_tree(&graph, graph.root(), 0);
            println!("{} links, {} slots", graph.link_count(), graph.slot_count());
        }
        Command::Convert { input, output } => {
            let graph = load_graph(&input, &config, &registry)?;
            let text = match Format::of(&output)? {
                Format::Xml => graph.to_xml()?,
                Format::Ron => graph.to_document().to_ron()?,
            };
            std::fs::write(&output, text)?;
            tracing::info!("wrote {}", output.display());
        }
        Command::Signatures { file, node } => {
            let graph = load_graph(&file, &config, &registry)?;
            let nodes = match node {
                Some(raw) => vec![NodeId(raw)],
                None => graph.descendants(graph.root()),
            };
            let pretty = ron::ser::PrettyConfig::default();
            for id in nodes {
                let Some(found) = graph.node(id) else {
                    return Err(GraphError::NodeNotFound(id));
                };
                let signatures = graph.slot_signatures(id);
                println!("{} '{}':", id, found.name);
                println!("{}", ron::ser::to_string_pretty(&signatures, pretty.clone())?);
            }
        }
        Command::Check { file } => {
            let graph = load_graph(&file, &config, &registry)?;
            let issues = graph.check_consistency();
            if !issues.is_empty() {
                for issue in &issues {
                    println!("{issue}");
                }
                return Ok(ExitCode::FAILURE);
            }

            // Saving and reloading must not lose anything
            let mut reloaded = Graph::with_config(config.clone())?;
            reloaded.load_xml(&graph.to_xml()?, &registry)?;
            let before = (graph.node_count(), graph.slot_count(), graph.link_count());
            let after = (reloaded.node_count(), reloaded.slot_count(), reloaded.link_count());
            if before != after {
                println!("reload changed (nodes, slots, links) from {before:?} to {after:?}");
                return Ok(ExitCode::FAILURE);
            }
            println!("ok");
        }
        Command::Execute { file, frames } => {
            let mut graph = load_graph(&file, &config, &registry)?;
            let root = graph.root();
            for frame in 1..=frames {
                let report = graph.execute_graph(root, frame);
                println!(
                    "frame {}: {} executed, {} skipped, {} failed",
                    frame,
                    report.executed.len(),
                    report.skipped.len(),
                    report.failed.len()
                );
                if !report.success() {
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Command::InitConfig { path } => {
            config.save(&path)?;
            tracing::info!("wrote {}", path.display());
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("passgraph_engine={level},passgraph={level}")));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("passgraph failed: {e}");
            ExitCode::FAILURE
        }
    }
}
