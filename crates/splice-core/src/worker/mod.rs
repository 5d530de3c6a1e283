//! # Splice Core Worker
//!
//! The process-side half of the controller/worker protocol. A [`Worker`] owns
//! one [`ArtifactLoader`] and one channel. It applies `LoadArtifact` operations
//! strictly in the order received, acknowledging each one or replying with the
//! error text. `Execute` is answered the same way once the function returns,
//! after which the worker stops. It also stops when the controller hangs up.
//!
//! [`WorkerLauncher`] is how a controller obtains a worker to talk to:
//! [`ProcessLauncher`] starts `splice worker --connect <addr>` as a child
//! process, [`InProcessLauncher`] runs the same loop as a tokio task.
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::artifact::loader::ArtifactLoader;
use crate::artifact::native::ModuleOpener;
use crate::ipc::channel::{recv_with_retry, send_with_retry, CancellationFlag, Channel, FramedChannel};
use crate::ipc::error::ChannelError;
use crate::ipc::message::{ControlMessage, WorkerReply};
use crate::kernel::error::{Error, Result};

/// How a worker's serve loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The requested function ran
    Executed { target: PathBuf, index: usize },
    /// The controller closed the channel first
    Disconnected,
}

pub struct Worker<O: ModuleOpener, C: Channel> {
    loader: ArtifactLoader<O>,
    channel: C,
    cancel: CancellationFlag,
    poll_interval: Duration,
}

impl<O: ModuleOpener, C: Channel> fmt::Debug for Worker<O, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("loader", &self.loader)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl<O: ModuleOpener, C: Channel> Worker<O, C> {
    pub fn new(opener: O, channel: C, poll_interval: Duration) -> Self {
        Self {
            loader: ArtifactLoader::new(opener),
            channel,
            cancel: CancellationFlag::new(),
            poll_interval,
        }
    }

    /// Share an externally controlled cancellation flag
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn loader(&self) -> &ArtifactLoader<O> {
        &self.loader
    }

    /// Process messages until `Execute` or disconnect
    pub async fn serve(&mut self) -> Result<WorkerOutcome> {
        loop {
            let message: ControlMessage = match recv_with_retry(&mut self.channel, &self.cancel, self.poll_interval).await
            {
                Ok(message) => message,
                Err(ChannelError::Closed) => {
                    log::info!("WORKER: controller closed the channel");
                    return Ok(WorkerOutcome::Disconnected);
                }
                Err(e) => return Err(e.into()),
            };
            log::trace!("WORKER: received {}", message);

            match message {
                ControlMessage::LoadArtifact(operation) => {
                    let reply = match self.loader.apply(&operation) {
                        Ok(()) => WorkerReply::Ack,
                        Err(e) => {
                            log::error!("WORKER: {} failed: {}", operation, e);
                            WorkerReply::Error { message: e.to_string() }
                        }
                    };
                    send_with_retry(&mut self.channel, &reply, &self.cancel, self.poll_interval).await?;
                }
                ControlMessage::Execute {
                    target,
                    index,
                    table_len,
                } => {
                    let result = self.loader.function_pointer(&target, index, table_len).and_then(|function| {
                        log::info!("WORKER: calling function {} of {}", index, target.display());
                        function.invoke()
                    });
                    let reply = match &result {
                        Ok(()) => WorkerReply::Ack,
                        Err(e) => {
                            log::error!("WORKER: execute of {}[{}] failed: {}", target.display(), index, e);
                            WorkerReply::Error { message: e.to_string() }
                        }
                    };
                    // The controller may already be gone; the outcome below still stands
                    if let Err(e) = send_with_retry(&mut self.channel, &reply, &self.cancel, self.poll_interval).await {
                        log::debug!("WORKER: could not report execute outcome: {}", e);
                    }
                    result?;
                    return Ok(WorkerOutcome::Executed { target, index });
                }
            }
        }
    }
}

/// Connect to a controller at `addr` and serve it until done
pub async fn connect_and_serve<O: ModuleOpener>(
    opener: O,
    addr: SocketAddr,
    poll_interval: Duration,
) -> Result<WorkerOutcome> {
    let channel = FramedChannel::connect(addr).await?;
    log::debug!("WORKER: connected to controller at {}", addr);
    Worker::new(opener, channel, poll_interval).serve().await
}

/// A started worker, either a child process or an in-process task
#[derive(Debug)]
pub enum WorkerHandle {
    Process { child: Child, program: PathBuf },
    /// Empty once the task's result has been collected
    Task(Option<JoinHandle<Result<WorkerOutcome>>>),
}

impl WorkerHandle {
    /// True once the worker is gone, successfully or not
    pub fn has_exited(&mut self) -> bool {
        match self {
            WorkerHandle::Process { child, .. } => !matches!(child.try_wait(), Ok(None)),
            WorkerHandle::Task(handle) => handle.as_ref().is_none_or(JoinHandle::is_finished),
        }
    }

    /// Wait for the worker to finish, polling so that `cancel` is honoured.
    ///
    /// When cancelled the worker is terminated before returning.
    pub async fn wait(&mut self, cancel: &CancellationFlag, poll_interval: Duration) -> Result<()> {
        loop {
            if self.has_exited() {
                return self.collect().await;
            }
            if cancel.is_banished() {
                self.terminate().await;
                return Err(ChannelError::cancelled("wait_worker").into());
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Kill the worker and reap it. Does nothing once the worker has been collected.
    pub async fn terminate(&mut self) {
        match self {
            WorkerHandle::Process { child, program } => {
                if matches!(child.try_wait(), Ok(Some(_))) {
                    return;
                }
                if let Err(e) = child.kill().await {
                    log::warn!("Failed to kill worker process {}: {}", program.display(), e);
                }
            }
            WorkerHandle::Task(slot) => {
                if let Some(handle) = slot.take() {
                    handle.abort();
                    let _ = handle.await;
                }
            }
        }
    }

    async fn collect(&mut self) -> Result<()> {
        match self {
            WorkerHandle::Process { child, program } => {
                let status = child.wait().await.map_err(|e| Error::io(e, "wait_worker", program.as_path()))?;
                if status.success() {
                    Ok(())
                } else {
                    Err(Error::WorkerExited { status })
                }
            }
            WorkerHandle::Task(slot) => match slot.take() {
                Some(handle) => match handle.await {
                    Ok(result) => result.map(|_| ()),
                    Err(e) => Err(Error::Other(format!("worker task failed: {}", e))),
                },
                None => Ok(()),
            },
        }
    }
}

/// Starts a worker that will connect back to `addr`
#[async_trait]
pub trait WorkerLauncher: Send + Sync + fmt::Debug {
    async fn launch(&self, addr: SocketAddr) -> Result<WorkerHandle>;
}

/// Runs `<program> [args..] worker --connect <addr>` as a child process
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Launcher for the currently running executable
    pub fn current_exe() -> Result<Self> {
        let program = std::env::current_exe().map_err(|e| Error::io(e, "current_exe", PathBuf::new()))?;
        Ok(Self::new(program))
    }

    /// Arguments placed before the `worker` subcommand
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self, addr: SocketAddr) -> Result<WorkerHandle> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg("worker")
            .arg("--connect")
            .arg(addr.to_string())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::io(e, "spawn_worker", self.program.as_path()))?;
        log::debug!("Spawned worker process {:?} for {}", child.id(), addr);
        Ok(WorkerHandle::Process {
            child,
            program: self.program.clone(),
        })
    }
}

/// Runs the worker loop as a tokio task with a fresh loader built from `opener`
#[derive(Debug, Clone)]
pub struct InProcessLauncher<O> {
    opener: O,
    poll_interval: Duration,
}

impl<O> InProcessLauncher<O> {
    pub fn new(opener: O, poll_interval: Duration) -> Self {
        Self { opener, poll_interval }
    }
}

#[async_trait]
impl<O> WorkerLauncher for InProcessLauncher<O>
where
    O: ModuleOpener + Clone + Sync + fmt::Debug + 'static,
{
    async fn launch(&self, addr: SocketAddr) -> Result<WorkerHandle> {
        let opener = self.opener.clone();
        let poll_interval = self.poll_interval;
        let handle = tokio::spawn(async move { connect_and_serve(opener, addr, poll_interval).await });
        Ok(WorkerHandle::Task(Some(handle)))
    }
}

#[cfg(test)]
mod tests;
