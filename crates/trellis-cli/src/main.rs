//! CLI entry point for the Trellis project graph.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use trellis_core::config::{LogConfig, TrellisConfig};
use trellis_graph::GraphStore;

use trellis_cli::commands::{self, Command};

#[derive(Parser)]
#[command(name = "trellis")]
#[command(about = "Typed project graph: ingest, query and maintain nodes and edges")]
struct Cli {
    /// Config file prefix (default: trellis).
    #[arg(short, long, default_value = "trellis")]
    config: String,

    /// Database path, overriding store.path from config.
    #[arg(long)]
    db: Option<String>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = TrellisConfig::load(&cli.config)?;
    init_tracing(&config.log);

    if let Some(db) = cli.db {
        config.store.path = db;
    }

    let mut store = GraphStore::open(&config.store)?;
    let stdout = io::stdout();
    let result = commands::run(&mut store, cli.command, cli.json, &mut stdout.lock());
    store.close()?;

    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) if e.is_rejected_write() => {
            eprintln!("error: {e}");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e.into()),
    }
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = fmt().with_env_filter(filter).with_writer(io::stderr);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
