use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::daemon::context::DaemonContext;
use crate::daemon::controller::Controller;
use crate::ipc::channel::{recv_with_retry, send_with_retry, CancellationFlag, FramedChannel};
use crate::ipc::error::ChannelError;
use crate::ipc::message::{ExecuteRequest, ExecuteResponse};
use crate::kernel::component::KernelComponent;
use crate::kernel::constants::CONTROL_REQUEST_TIMEOUT_MS;
use crate::kernel::error::{Error, Result};

/// Identity of the executer minion, used in logs and the minion registry
pub const EXECUTER_IDENTITY: &str = "execute";

#[derive(Debug)]
struct ExecuterShared {
    context: Arc<DaemonContext>,
    cancel: CancellationFlag,
    next_request: AtomicU64,
    requests: Mutex<Vec<JoinHandle<()>>>,
}

impl ExecuterShared {
    async fn handle_request(&self, request: ExecuteRequest) -> ExecuteResponse {
        let defaults = self.context.execute_defaults();
        let plugin = request.plugin.or_else(|| defaults.plugin.clone());
        let function = request.function.or_else(|| defaults.function.clone());

        let controller = Controller::new(self.context.graph(), self.cancel.clone(), self.context.poll_interval())
            .with_role(EXECUTER_IDENTITY);
        let target = match controller.prepare(plugin.as_ref(), function.as_deref()) {
            Ok(target) => target,
            Err(e) => {
                log::error!("DAEMON[{}] cannot execute: {}", EXECUTER_IDENTITY, e);
                return ExecuteResponse::Rejected { message: e.to_string() };
            }
        };

        // Bound before answering so an accepted request always has its port
        let listener = match self.bind_bootstrap().await {
            Ok(listener) => listener,
            Err(e) => {
                log::error!("DAEMON[{}] no bootstrap port for '{}': {}", EXECUTER_IDENTITY, target.stub.id, e);
                return ExecuteResponse::Rejected { message: e.to_string() };
            }
        };

        let request_id = self.next_request.fetch_add(1, Ordering::SeqCst) + 1;
        log::info!(
            "DAEMON[{}] Starting execute #{} of '{} {}'",
            EXECUTER_IDENTITY,
            request_id,
            target.stub.id,
            target.function
        );

        let launcher = self.context.launcher();
        let handle = tokio::spawn(async move {
            match controller.run_on(&target, launcher.as_ref(), listener).await {
                Ok(()) => log::info!("DAEMON[{}] Completed execute #{}", EXECUTER_IDENTITY, request_id),
                Err(e) if e.is_cancellation() => {
                    log::warn!("DAEMON[{}] Execute #{} cancelled", EXECUTER_IDENTITY, request_id)
                }
                Err(e) => log::error!(
                    "DAEMON[{}] Failed on execute #{} of '{}':\n\t{}",
                    EXECUTER_IDENTITY,
                    request_id,
                    target.stub.id,
                    e
                ),
            }
        });

        let mut requests = self.requests.lock().await;
        requests.retain(|h| !h.is_finished());
        requests.push(handle);
        ExecuteResponse::Accepted { request_id }
    }

    /// First free port of the request range, trying each candidate once
    async fn bind_bootstrap(&self) -> Result<TcpListener> {
        let ports = self.context.ports();
        let mut last_error = None;
        for _ in 0..ports.candidates() {
            let addr = ports.next_addr();
            match TcpListener::bind(addr).await {
                Ok(listener) => return Ok(listener),
                Err(e) => {
                    log::debug!("DAEMON[{}] bootstrap port {} unavailable: {}", EXECUTER_IDENTITY, addr, e);
                    last_error = Some(e);
                }
            }
        }
        Err(match last_error {
            Some(e) => ChannelError::from(e).into(),
            None => Error::Other("no bootstrap port to try".to_string()),
        })
    }

    /// Accept one client at a time until banished; each client sends one request
    async fn control_loop(self: Arc<Self>, listener: TcpListener) {
        let poll = self.context.poll_interval();
        while !self.cancel.is_banished() {
            let (stream, peer) = match tokio::time::timeout(poll, listener.accept()).await {
                Err(_) => continue,
                Ok(Err(e)) => {
                    log::warn!("DAEMON[{}] accept failed: {}", EXECUTER_IDENTITY, e);
                    continue;
                }
                Ok(Ok(accepted)) => accepted,
            };
            log::debug!("DAEMON[{}] control connection from {}", EXECUTER_IDENTITY, peer);
            if let Err(e) = self.serve_client(FramedChannel::new(stream), poll).await {
                if e.is_cancellation() {
                    break;
                }
                log::warn!("DAEMON[{}] control request from {} failed: {}", EXECUTER_IDENTITY, peer, e);
            }
        }
        log::debug!("DAEMON[{}] control loop finished", EXECUTER_IDENTITY);
    }

    async fn serve_client(&self, mut channel: FramedChannel, poll: Duration) -> Result<()> {
        let request: ExecuteRequest = tokio::time::timeout(
            Duration::from_millis(CONTROL_REQUEST_TIMEOUT_MS),
            recv_with_retry(&mut channel, &self.cancel, poll),
        )
        .await
        .map_err(|_| Error::Other("client sent no request in time".to_string()))??;

        let response = self.handle_request(request).await;
        send_with_retry(&mut channel, &response, &self.cancel, poll).await?;
        Ok(())
    }
}

/// Daemon component that turns execute requests into controller/worker runs.
///
/// It listens on the control port reserved by the [`DaemonContext`] allocator.
/// A request is only accepted once a bootstrap port from the request range is
/// bound for it; it then gets its own task and worker process.
/// [`banish`](Self::banish) stops the control loop and all in-flight requests
/// at their next poll.
#[derive(Debug)]
pub struct ExecuterMinion {
    shared: Arc<ExecuterShared>,
    control: Mutex<Option<JoinHandle<()>>>,
    local_addr: std::sync::Mutex<Option<SocketAddr>>,
}

impl ExecuterMinion {
    pub fn new(context: Arc<DaemonContext>) -> Self {
        Self {
            shared: Arc::new(ExecuterShared {
                context,
                cancel: CancellationFlag::new(),
                next_request: AtomicU64::new(0),
                requests: Mutex::new(Vec::new()),
            }),
            control: Mutex::new(None),
            local_addr: std::sync::Mutex::new(None),
        }
    }

    /// Address of the control port once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.lock().ok().and_then(|addr| *addr)
    }

    pub fn banish(&self) {
        log::info!("DAEMON[{}] banished", EXECUTER_IDENTITY);
        self.shared.cancel.banish();
    }

    pub fn is_banished(&self) -> bool {
        self.shared.cancel.is_banished()
    }

    /// Validate `request` and start it without going through the control port
    pub async fn execute(&self, request: ExecuteRequest) -> ExecuteResponse {
        self.shared.handle_request(request).await
    }

    /// Number of requests whose task is still running
    pub async fn active_requests(&self) -> usize {
        self.shared.requests.lock().await.iter().filter(|h| !h.is_finished()).count()
    }
}

#[async_trait]
impl KernelComponent for ExecuterMinion {
    fn name(&self) -> &'static str {
        EXECUTER_IDENTITY
    }

    async fn start(&self) -> Result<()> {
        let mut control = self.control.lock().await;
        if control.is_some() {
            return Err(Error::Other(format!("minion '{}' already started", EXECUTER_IDENTITY)));
        }
        if self.is_banished() {
            return Err(Error::Other(format!("minion '{}' was banished", EXECUTER_IDENTITY)));
        }

        let bind = self.shared.context.ports().control_addr();
        let listener = TcpListener::bind(bind).await.map_err(ChannelError::from)?;
        let addr = listener.local_addr().map_err(ChannelError::from)?;
        if let Ok(mut slot) = self.local_addr.lock() {
            *slot = Some(addr);
        }
        log::info!("DAEMON[{}] listening on {}", EXECUTER_IDENTITY, addr);

        *control = Some(tokio::spawn(Arc::clone(&self.shared).control_loop(listener)));
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.banish();
        if let Some(handle) = self.control.lock().await.take() {
            handle
                .await
                .map_err(|e| Error::Other(format!("executer control loop failed: {}", e)))?;
        }
        let requests: Vec<JoinHandle<()>> = self.shared.requests.lock().await.drain(..).collect();
        for handle in requests {
            if let Err(e) = handle.await {
                log::warn!("DAEMON[{}] request task failed: {}", EXECUTER_IDENTITY, e);
            }
        }
        Ok(())
    }
}
