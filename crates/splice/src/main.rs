mod cli; // Command handlers

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use splice_core::plugin_system::LoadPhase;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

/// Splice: load native plugin artifacts in dependency order and call into them
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Configuration file (json, yaml or toml); falls back to $SPLICE_CONFIG
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Stub index to load instead of the configured one
    #[arg(short, long, global = true)]
    pub index: Option<PathBuf>,

    /// Log level (off, error, warn, info, debug, trace); RUST_LOG is used when absent
    #[arg(short, long, global = true)]
    pub log_level: Option<LevelFilter>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the load operations needed to bring a plugin up
    Plan {
        /// Plugin id, e.g. demo.leaf
        plugin: String,
        /// Stop planning after this phase
        #[arg(long, value_enum, default_value_t = PhaseArg::Final)]
        until: PhaseArg,
    },
    /// Load a plugin in a fresh worker process and call one of its functions
    Run {
        /// Plugin id; defaults to execute.plugin from the configuration
        plugin: Option<String>,
        /// Function name; defaults to execute.function from the configuration
        function: Option<String>,
    },
    /// Serve a controller listening at the given address (started by `run` and the daemon)
    Worker {
        #[arg(long)]
        connect: SocketAddr,
    },
    /// Run the executer daemon until interrupted
    Daemon,
    /// Send an execute request to a running daemon
    Submit {
        plugin: Option<String>,
        function: Option<String>,
        /// Daemon control address; defaults to daemon.bind_host and daemon.base_port
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseArg {
    InMemory,
    Inited,
    Final,
}

impl From<PhaseArg> for LoadPhase {
    fn from(phase: PhaseArg) -> Self {
        match phase {
            PhaseArg::InMemory => LoadPhase::InMemory,
            PhaseArg::Inited => LoadPhase::Inited,
            PhaseArg::Final => LoadPhase::Final,
        }
    }
}

fn init_logging(level: Option<LevelFilter>) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if let Some(level) = level {
        builder.filter_level(level);
    }
    if let Err(e) = builder.format_timestamp_millis().try_init() {
        eprintln!("Failed to initialize env_logger: {}", e);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_logging(args.log_level);

    match cli::dispatch(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
