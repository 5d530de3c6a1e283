use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::{DaemonSettings, ExecuteSettings, SpliceConfig};
use crate::kernel::component::{ComponentRegistry, KernelComponent};
use crate::kernel::error::{Error, Result};
use crate::plugin_system::graph::DependencyGraph;
use crate::worker::WorkerLauncher;

/// Port plan of one daemon: `base` is its control port, request bootstrap
/// ports cycle through `base + 1 ..= base + span`.
///
/// A base of `0` always yields `0`, leaving the choice to the OS.
#[derive(Debug)]
pub struct PortAllocator {
    host: IpAddr,
    base: u16,
    span: u16,
    next: AtomicU32,
}

impl PortAllocator {
    pub fn new(host: IpAddr, base: u16, span: u16) -> Self {
        Self {
            host,
            base,
            span: span.max(1),
            next: AtomicU32::new(0),
        }
    }

    /// Reserved for the executer's control port, never handed out by [`next_port`](Self::next_port)
    pub fn control_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.base)
    }

    pub fn next_port(&self) -> u16 {
        if self.base == 0 {
            return 0;
        }
        let offset = self.next.fetch_add(1, Ordering::Relaxed) % u32::from(self.span);
        (u32::from(self.base) + 1 + offset).min(u32::from(u16::MAX)) as u16
    }

    pub fn next_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.next_port())
    }

    /// How many distinct request ports there are to try
    pub fn candidates(&self) -> usize {
        if self.base == 0 { 1 } else { usize::from(self.span) }
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }
}

/// State shared by everything running inside one daemon instance.
///
/// Built once from the configuration and handed to each minion as
/// `Arc<DaemonContext>`. `start` registers and starts minions, `shutdown`
/// stops them in reverse order.
pub struct DaemonContext {
    daemon: DaemonSettings,
    execute: ExecuteSettings,
    ports: PortAllocator,
    graph: Arc<DependencyGraph>,
    launcher: Arc<dyn WorkerLauncher>,
    minions: Mutex<ComponentRegistry>,
    running: AtomicBool,
}

impl fmt::Debug for DaemonContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DaemonContext")
            .field("daemon", &self.daemon)
            .field("execute", &self.execute)
            .field("plugins", &self.graph.len())
            .field("launcher", &self.launcher)
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish()
    }
}

impl DaemonContext {
    pub fn new(config: &SpliceConfig, graph: Arc<DependencyGraph>, launcher: Arc<dyn WorkerLauncher>) -> Result<Self> {
        config.validate()?;
        let host = config.daemon.bind_ip()?;
        Ok(Self {
            daemon: config.daemon.clone(),
            execute: config.execute.clone(),
            ports: PortAllocator::new(host, config.daemon.base_port, config.daemon.port_span),
            graph,
            launcher,
            minions: Mutex::new(ComponentRegistry::new()),
            running: AtomicBool::new(false),
        })
    }

    pub fn settings(&self) -> &DaemonSettings {
        &self.daemon
    }

    pub fn execute_defaults(&self) -> &ExecuteSettings {
        &self.execute
    }

    pub fn poll_interval(&self) -> Duration {
        self.daemon.poll_interval()
    }

    pub fn ports(&self) -> &PortAllocator {
        &self.ports
    }

    pub fn graph(&self) -> Arc<DependencyGraph> {
        Arc::clone(&self.graph)
    }

    pub fn launcher(&self) -> Arc<dyn WorkerLauncher> {
        Arc::clone(&self.launcher)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start `minion` and keep it registered until shutdown
    pub async fn start(&self, minion: Arc<dyn KernelComponent>) -> Result<()> {
        let mut minions = self.minions.lock().await;
        if minions.get(minion.name()).is_some() {
            return Err(Error::Other(format!("minion '{}' is already running", minion.name())));
        }
        minion.start().await?;
        log::info!("DAEMON[{}]: started", minion.name());
        minions.register(minion);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn active_minions(&self) -> Vec<&'static str> {
        self.minions.lock().await.names()
    }

    /// Stop every minion, newest first. All are stopped even if some fail; the first error is returned.
    pub async fn shutdown(&self) -> Result<()> {
        let drained = self.minions.lock().await.drain();
        let mut first_error = None;
        for minion in drained.into_iter().rev() {
            match minion.stop().await {
                Ok(()) => log::info!("DAEMON[{}]: stopped", minion.name()),
                Err(e) => {
                    log::error!("DAEMON[{}]: failed to stop: {}", minion.name(), e);
                    first_error.get_or_insert(e);
                }
            }
        }
        self.running.store(false, Ordering::SeqCst);
        first_error.map_or(Ok(()), Err)
    }
}
