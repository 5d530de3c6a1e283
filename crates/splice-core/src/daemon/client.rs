use std::net::SocketAddr;
use std::time::Duration;

use crate::ipc::channel::{recv_with_retry, send_with_retry, CancellationFlag, FramedChannel};
use crate::ipc::message::{ExecuteRequest, ExecuteResponse};
use crate::kernel::error::{Error, Result};

/// Send one execute request to a running daemon and wait for its answer.
///
/// The daemon answers as soon as the request is validated; the function itself
/// runs afterwards in a worker owned by the daemon. Gives up after `timeout`.
pub async fn submit(
    addr: SocketAddr,
    request: &ExecuteRequest,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<ExecuteResponse> {
    let exchange = async {
        let mut channel = FramedChannel::connect(addr).await?;
        let cancel = CancellationFlag::new();
        send_with_retry(&mut channel, request, &cancel, poll_interval).await?;
        let response: ExecuteResponse = recv_with_retry(&mut channel, &cancel, poll_interval).await?;
        Ok::<_, Error>(response)
    };

    let response = tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| Error::Other(format!("daemon at {} did not answer within {:?}", addr, timeout)))??;
    match &response {
        ExecuteResponse::Accepted { request_id } => log::info!("Daemon accepted request #{}", request_id),
        ExecuteResponse::Rejected { message } => log::warn!("Daemon rejected request: {}", message),
    }
    Ok(response)
}
