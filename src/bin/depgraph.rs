use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use depgraph::{Config, DependencyGraph, OpenMode, PackageLoader};

#[derive(Parser)]
#[command(name = "depgraph", about = "Persistent package dependency graph store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load package files (or a JSONL dataset manifest) into a store.
    Load {
        /// Store directory (created if missing).
        #[arg(long)]
        store: PathBuf,
        /// JSONL manifest of {"path": ...} entries.
        #[arg(long, conflicts_with = "files")]
        dataset: Option<PathBuf>,
        /// Package files to load directly.
        files: Vec<PathBuf>,
        /// Staging-buffer flush threshold in bytes.
        #[arg(long)]
        memory_limit: Option<usize>,
    },
    /// Expand a package's dependencies and print the result as JSON.
    Query {
        /// Store directory.
        #[arg(long)]
        store: PathBuf,
        /// Root package name.
        name: String,
        /// Restrict the initial frontier to this version string.
        #[arg(long, default_value = "")]
        version: String,
        /// Restrict the initial frontier to this architecture.
        #[arg(long, default_value = "")]
        arch: String,
        /// Expansion depth (number of levels).
        #[arg(long, default_value_t = 1)]
        depth: usize,
        /// Query through the device snapshot instead of the CPU path.
        #[arg(long)]
        device: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> depgraph::Result<()> {
    match cli.command {
        Command::Load {
            store,
            dataset,
            files,
            memory_limit,
        } => {
            let mut config = Config::default();
            if let Some(limit) = memory_limit {
                config.memory_limit = limit;
            }
            let mut graph = DependencyGraph::open(&store, OpenMode::LoadOrCreate, config)?;
            {
                let mut loader = PackageLoader::new(&mut graph);
                if let Some(manifest) = dataset {
                    loader.load_dataset(&manifest)?;
                } else {
                    for file in &files {
                        loader.load_file(file)?;
                    }
                }
            }
            graph.close()
        }
        Command::Query {
            store,
            name,
            version,
            arch,
            depth,
            device,
        } => {
            let mut graph = DependencyGraph::open(&store, OpenMode::Load, Config::default())?;
            if device {
                graph.sync_to_device()?;
            }
            let result = graph.query_dependencies(&name, &version, &arch, depth, device)?;
            let json = serde_json::to_string_pretty(&result)
                .expect("query results always serialize");
            println!("{json}");
            Ok(())
        }
    }
}
