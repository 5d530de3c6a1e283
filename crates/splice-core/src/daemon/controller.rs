use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::ipc::channel::{recv_with_retry, send_with_retry, CancellationFlag, Channel, FramedChannel};
use crate::ipc::error::ChannelError;
use crate::ipc::message::{ControlMessage, WorkerReply};
use crate::kernel::error::{Error, Result};
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::graph::DependencyGraph;
use crate::plugin_system::plan::{LoadPlan, LoadPlanBuilder};
use crate::plugin_system::stub::{PluginId, PluginStub};
use crate::worker::{WorkerHandle, WorkerLauncher};

/// A validated execute request: which function of which stub, and the plan to get there
#[derive(Debug, Clone)]
pub struct ExecutionTarget {
    pub stub: Arc<PluginStub>,
    pub function: String,
    pub index: usize,
    pub table_len: usize,
    pub plan: LoadPlan,
}

impl ExecutionTarget {
    fn execute_message(&self) -> ControlMessage {
        ControlMessage::Execute {
            target: self.stub.artifact.clone(),
            index: self.index,
            table_len: self.table_len,
        }
    }
}

/// Drives one worker through a load plan in lock-step.
///
/// Every wait is a poll on the shared [`CancellationFlag`]; once it is banished
/// the controller stops at its next poll and tears its worker down.
#[derive(Debug, Clone)]
pub struct Controller {
    graph: Arc<DependencyGraph>,
    cancel: CancellationFlag,
    poll_interval: Duration,
    role: String,
}

impl Controller {
    pub fn new(graph: Arc<DependencyGraph>, cancel: CancellationFlag, poll_interval: Duration) -> Self {
        Self {
            graph,
            cancel,
            poll_interval,
            role: "controller".to_string(),
        }
    }

    /// Name used as the log prefix, e.g. the owning minion's identity
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn cancellation(&self) -> &CancellationFlag {
        &self.cancel
    }

    /// Resolve and check the target, then plan its load
    pub fn prepare(&self, plugin: Option<&PluginId>, function: Option<&str>) -> Result<ExecutionTarget> {
        let plugin = plugin.ok_or_else(|| PluginSystemError::Configuration {
            plugin_id: "<none>".to_string(),
            message: "no plugin to execute; pass one or set execute.plugin".to_string(),
        })?;
        let stub = Arc::clone(self.graph.resolve(plugin)?);

        if !stub.executable {
            log::error!("DAEMON[{}] cannot execute {}: executable flag not set", self.role, stub.id);
            return Err(PluginSystemError::NotExecutable {
                plugin_id: stub.id.to_string(),
            }
            .into());
        }

        let function = function.ok_or_else(|| PluginSystemError::Configuration {
            plugin_id: stub.id.to_string(),
            message: "no function to execute; pass one or set execute.function".to_string(),
        })?;
        let index = stub
            .function_index(function)
            .ok_or_else(|| PluginSystemError::UnknownFunction {
                plugin_id: stub.id.to_string(),
                function: function.to_string(),
            })?;

        let plan = LoadPlanBuilder::new(&self.graph).build(&stub.id)?;
        log::debug!(
            "DAEMON[{}] Loading plugins for '{}' targeting function '{}' ({} operations)",
            self.role,
            stub.id,
            function,
            plan.len()
        );
        Ok(ExecutionTarget {
            table_len: stub.function_table_len(),
            stub,
            function: function.to_string(),
            index,
            plan,
        })
    }

    /// Send every planned operation and wait for its reply, then send `Execute` and wait for its outcome.
    ///
    /// Any error reply aborts the request before the next operation is sent.
    pub async fn drive<C: Channel>(&self, channel: &mut C, target: &ExecutionTarget) -> Result<()> {
        for operation in target.plan.iter() {
            if self.cancel.is_banished() {
                return Err(ChannelError::cancelled("load").into());
            }
            let message = ControlMessage::LoadArtifact(operation.clone());
            send_with_retry(channel, &message, &self.cancel, self.poll_interval).await?;

            let reply: WorkerReply = recv_with_retry(channel, &self.cancel, self.poll_interval).await?;
            if let WorkerReply::Error { message } = reply {
                log::error!(
                    "DAEMON[{}] Encountered problem loading {}:\n\t{}",
                    self.role,
                    target.stub.id,
                    message
                );
                return Err(Error::RemoteFailure {
                    target: operation.target.clone(),
                    message,
                });
            }
            log::trace!("DAEMON[{}] {} acknowledged", self.role, operation);
        }

        log::info!(
            "DAEMON[{}] Calling function '{}' from plugin '{}'",
            self.role,
            target.function,
            target.stub.id
        );
        send_with_retry(channel, &target.execute_message(), &self.cancel, self.poll_interval).await?;

        match recv_with_retry(channel, &self.cancel, self.poll_interval).await {
            Ok(WorkerReply::Ack) => Ok(()),
            Ok(WorkerReply::Error { message }) => {
                log::error!(
                    "DAEMON[{}] Function '{}' from plugin '{}' failed:\n\t{}",
                    self.role,
                    target.function,
                    target.stub.id,
                    message
                );
                Err(Error::RemoteFailure {
                    target: target.stub.artifact.clone(),
                    message,
                })
            }
            // The worker died mid-call; its exit status tells the rest
            Err(ChannelError::Closed) => {
                log::warn!("DAEMON[{}] worker hung up while running '{}'", self.role, target.function);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Run `target` in a fresh worker started by `launcher`, listening on `bind`.
    ///
    /// Returns once the worker has exited. On failure or cancellation the worker is killed.
    pub async fn run(&self, target: &ExecutionTarget, launcher: &dyn WorkerLauncher, bind: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(bind).await.map_err(ChannelError::from)?;
        self.run_on(target, launcher, listener).await
    }

    /// Like [`run`](Self::run), with the bootstrap port already bound
    pub async fn run_on(&self, target: &ExecutionTarget, launcher: &dyn WorkerLauncher, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr().map_err(ChannelError::from)?;
        log::debug!("DAEMON[{}] bootstrap port {} open for '{}'", self.role, addr, target.stub.id);

        let mut worker = launcher.launch(addr).await?;
        let driven = match self.accept(&listener, &mut worker).await {
            Ok(mut channel) => self.drive(&mut channel, target).await,
            Err(e) => Err(e),
        };
        // The channel is dropped here; a worker that never got Execute sees the hang-up

        match driven {
            Ok(()) => {
                worker.wait(&self.cancel, self.poll_interval).await?;
                log::info!("DAEMON[{}] Completed '{}'", self.role, target.stub.id);
                Ok(())
            }
            Err(e) => {
                worker.terminate().await;
                Err(e)
            }
        }
    }

    async fn accept(&self, listener: &TcpListener, worker: &mut WorkerHandle) -> Result<FramedChannel> {
        loop {
            if self.cancel.is_banished() {
                return Err(ChannelError::cancelled("accept").into());
            }
            if let Ok(accepted) = tokio::time::timeout(self.poll_interval, listener.accept()).await {
                let (stream, peer) = accepted.map_err(ChannelError::from)?;
                stream.set_nodelay(true).map_err(ChannelError::from)?;
                log::debug!("DAEMON[{}] worker connected from {}", self.role, peer);
                return Ok(FramedChannel::new(stream));
            }
            if worker.has_exited() {
                // Surface the worker's own failure if it has one
                worker.wait(&self.cancel, self.poll_interval).await?;
                return Err(Error::Other("worker exited before connecting".to_string()));
            }
        }
    }
}
