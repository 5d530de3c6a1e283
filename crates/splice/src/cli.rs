use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::LevelFilter;
use splice_core::artifact::DynamicLibraryOpener;
use splice_core::config::SpliceConfig;
use splice_core::daemon::{submit, Controller, DaemonContext, ExecuterMinion};
use splice_core::ipc::{CancellationFlag, ExecuteRequest, ExecuteResponse};
use splice_core::kernel::constants::CONTROL_REQUEST_TIMEOUT_MS;
use splice_core::kernel::error::{Error, Result};
use splice_core::plugin_system::{BuilderRegistry, DependencyGraph, LoadPhase, LoadPlan, LoadPlanBuilder, PluginId, StubIndex, StubSource};
use splice_core::worker::{connect_and_serve, ProcessLauncher, WorkerOutcome};

use crate::{CliArgs, Commands};

/// Resolve configuration, apply flag overrides and run the chosen command
pub async fn dispatch(args: CliArgs) -> Result<()> {
    let (mut config, config_path) = SpliceConfig::resolve(args.config.as_deref()).await?;
    if let Some(index) = args.index {
        config.index = index;
    }
    let forwarded = forwarded_args(config_path.as_deref(), args.log_level);

    match args.command {
        Commands::Plan { plugin, until } => plan(&config, PluginId::new(plugin), until.into()).await,
        Commands::Run { plugin, function } => run(&config, &forwarded, plugin, function).await,
        Commands::Worker { connect } => worker(&config, connect).await,
        Commands::Daemon => daemon(&config, &forwarded).await,
        Commands::Submit { plugin, function, addr } => submit_request(&config, plugin, function, addr).await,
    }
}

/// Flags a worker child needs to see the same configuration and log level
fn forwarded_args(config_path: Option<&Path>, log_level: Option<LevelFilter>) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(path) = config_path {
        args.push("--config".to_string());
        args.push(path.display().to_string());
    }
    if let Some(level) = log_level {
        args.push("--log-level".to_string());
        args.push(level.to_string());
    }
    args
}

async fn load_graph(config: &SpliceConfig) -> Result<Arc<DependencyGraph>> {
    let index = StubIndex::load(&config.index).await?;
    Ok(Arc::new(index.graph()?))
}

fn worker_launcher(config: &SpliceConfig, forwarded: &[String]) -> Result<ProcessLauncher> {
    let launcher = match &config.daemon.worker_executable {
        Some(program) => ProcessLauncher::new(program),
        None => ProcessLauncher::current_exe()?,
    };
    Ok(launcher.with_args(forwarded.iter().cloned()))
}

/// Check that every artifact the plan touches has been built
fn ensure_built(graph: &DependencyGraph, plan: &LoadPlan) -> Result<()> {
    let targets: HashSet<&Path> = plan.iter().map(|op| op.target.as_path()).collect();
    BuilderRegistry::prebuilt().build_all(graph.stubs().filter(|stub| targets.contains(stub.artifact_path())))?;
    Ok(())
}

async fn banish_on_interrupt(cancel: CancellationFlag) {
    if tokio::signal::ctrl_c().await.is_ok() {
        log::warn!("Interrupted; banishing in-flight work");
        cancel.banish();
    }
}

async fn plan(config: &SpliceConfig, plugin: PluginId, until: LoadPhase) -> Result<()> {
    let graph = load_graph(config).await?;
    let plan = LoadPlanBuilder::new(&graph).build_until(&plugin, until)?;

    println!("Load plan for '{}' ({} operations):", plugin, plan.len());
    for (position, operation) in plan.iter().enumerate() {
        println!("{:>4}. {}", position + 1, operation);
    }
    Ok(())
}

async fn run(config: &SpliceConfig, forwarded: &[String], plugin: Option<String>, function: Option<String>) -> Result<()> {
    let graph = load_graph(config).await?;
    let cancel = CancellationFlag::new();
    let controller = Controller::new(Arc::clone(&graph), cancel.clone(), config.daemon.poll_interval()).with_role("run");

    let plugin = plugin.map(PluginId::new).or_else(|| config.execute.plugin.clone());
    let function = function.or_else(|| config.execute.function.clone());
    let target = controller.prepare(plugin.as_ref(), function.as_deref())?;
    ensure_built(&graph, &target.plan)?;

    let launcher = worker_launcher(config, forwarded)?;
    let bind = SocketAddr::new(config.daemon.bind_ip()?, 0);
    let interrupt = tokio::spawn(banish_on_interrupt(cancel));
    let result = controller.run(&target, &launcher, bind).await;
    interrupt.abort();
    result?;

    println!("Called '{}' from '{}'", target.function, target.stub.id);
    Ok(())
}

async fn worker(config: &SpliceConfig, connect: SocketAddr) -> Result<()> {
    match connect_and_serve(DynamicLibraryOpener, connect, config.daemon.poll_interval()).await? {
        WorkerOutcome::Executed { target, index } => {
            log::info!("WORKER: function {} of {} returned", index, target.display())
        }
        WorkerOutcome::Disconnected => log::warn!("WORKER: controller hung up before execute"),
    }
    Ok(())
}

async fn daemon(config: &SpliceConfig, forwarded: &[String]) -> Result<()> {
    let graph = load_graph(config).await?;
    let launcher = Arc::new(worker_launcher(config, forwarded)?);
    let context = Arc::new(DaemonContext::new(config, graph, launcher)?);
    let minion = Arc::new(ExecuterMinion::new(Arc::clone(&context)));
    context.start(minion.clone()).await?;

    if let Some(addr) = minion.local_addr() {
        println!("splice daemon listening on {}", addr);
    }
    let waited = tokio::signal::ctrl_c()
        .await
        .map_err(|e| Error::io(e, "wait_for_signal", PathBuf::new()));
    log::info!("Shutting down daemon");
    context.shutdown().await?;
    waited
}

async fn submit_request(
    config: &SpliceConfig,
    plugin: Option<String>,
    function: Option<String>,
    addr: Option<SocketAddr>,
) -> Result<()> {
    let addr = match addr {
        Some(addr) => addr,
        None if config.daemon.base_port == 0 => {
            return Err(Error::config(None, "daemon.base_port is 0, so the control port is ephemeral; pass --addr"));
        }
        None => SocketAddr::new(config.daemon.bind_ip()?, config.daemon.base_port),
    };
    let request = ExecuteRequest {
        plugin: plugin.map(PluginId::new),
        function,
    };

    let response = submit(
        addr,
        &request,
        config.daemon.poll_interval(),
        Duration::from_millis(CONTROL_REQUEST_TIMEOUT_MS),
    )
    .await?;
    match response {
        ExecuteResponse::Accepted { request_id } => {
            println!("Accepted as request #{}", request_id);
            Ok(())
        }
        ExecuteResponse::Rejected { message } => Err(Error::Other(format!("daemon rejected request: {}", message))),
    }
}
