#![cfg(test)]

use crate::artifact::error::ArtifactError;
use crate::artifact::state::ArtifactPhase;
use crate::artifact::tests::fixtures::{self, count, path, LEAF, MID, START_CALLS};
use crate::ipc::channel::{recv_with_retry, send_with_retry, CancellationFlag, FramedChannel};
use crate::ipc::message::{ControlMessage, WorkerReply};
use crate::kernel::error::Error;
use crate::plugin_system::plan::{LoadOperation, LoadPhase};
use crate::worker::{InProcessLauncher, Worker, WorkerLauncher, WorkerOutcome};
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;

const POLL: Duration = Duration::from_millis(2);

async fn loopback_pair() -> (FramedChannel, FramedChannel) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (connected, accepted) = tokio::join!(FramedChannel::connect(addr), listener.accept());
    (FramedChannel::new(accepted.unwrap().0), connected.unwrap())
}

async fn request(controller: &mut FramedChannel, op: LoadOperation) -> WorkerReply {
    let cancel = CancellationFlag::new();
    send_with_retry(controller, &ControlMessage::LoadArtifact(op), &cancel, POLL)
        .await
        .unwrap();
    recv_with_retry(controller, &cancel, POLL).await.unwrap()
}

fn op(phase: LoadPhase, target: &str, requires: &[&str]) -> LoadOperation {
    LoadOperation::new(phase, target, requires.iter().map(PathBuf::from).collect())
}

#[tokio::test]
async fn test_worker_loads_and_executes() {
    let (mut controller, worker_end) = loopback_pair().await;
    let mut worker = Worker::new(fixtures::opener(), worker_end, POLL);

    let drive = async move {
        for operation in [
            op(LoadPhase::InMemory, LEAF, &[]),
            op(LoadPhase::InMemory, MID, &[]),
            op(LoadPhase::Inited, LEAF, &[]),
            op(LoadPhase::Inited, MID, &[LEAF]),
            op(LoadPhase::Final, LEAF, &[]),
            op(LoadPhase::Final, MID, &[]),
        ] {
            assert_eq!(request(&mut controller, operation).await, WorkerReply::Ack);
        }
        let execute = ControlMessage::Execute {
            target: path(LEAF),
            index: 0,
            table_len: 1,
        };
        send_with_retry(&mut controller, &execute, &CancellationFlag::new(), POLL)
            .await
            .unwrap();
        let reply: WorkerReply = recv_with_retry(&mut controller, &CancellationFlag::new(), POLL)
            .await
            .unwrap();
        assert_eq!(reply, WorkerReply::Ack);
    };

    let (outcome, ()) = tokio::join!(worker.serve(), drive);
    assert_eq!(
        outcome.unwrap(),
        WorkerOutcome::Executed {
            target: path(LEAF),
            index: 0
        }
    );
    assert_eq!(count(&START_CALLS), 1);
    assert_eq!(worker.loader().phase(&path(MID)), ArtifactPhase::Final);
}

#[tokio::test]
async fn test_worker_replies_with_error_and_keeps_serving() {
    let (mut controller, worker_end) = loopback_pair().await;
    let mut worker = Worker::new(fixtures::opener(), worker_end, POLL);

    let drive = async move {
        assert_eq!(request(&mut controller, op(LoadPhase::InMemory, LEAF, &[])).await, WorkerReply::Ack);
        match request(&mut controller, op(LoadPhase::Final, LEAF, &[])).await {
            WorkerReply::Error { message } => assert!(message.contains("requires"), "{}", message),
            other => panic!("Expected error reply, got {:?}", other),
        }
        // The worker is still answering
        assert_eq!(request(&mut controller, op(LoadPhase::Inited, LEAF, &[])).await, WorkerReply::Ack);
        drop(controller);
    };

    let (outcome, ()) = tokio::join!(worker.serve(), drive);
    assert_eq!(outcome.unwrap(), WorkerOutcome::Disconnected);
    assert_eq!(worker.loader().phase(&path(LEAF)), ArtifactPhase::Inited);
}

#[tokio::test]
async fn test_execute_with_bad_index_fails_worker() {
    let (mut controller, worker_end) = loopback_pair().await;
    let mut worker = Worker::new(fixtures::opener(), worker_end, POLL);

    let drive = async move {
        for operation in [
            op(LoadPhase::InMemory, LEAF, &[]),
            op(LoadPhase::Inited, LEAF, &[]),
            op(LoadPhase::Final, LEAF, &[]),
        ] {
            assert_eq!(request(&mut controller, operation).await, WorkerReply::Ack);
        }
        let execute = ControlMessage::Execute {
            target: path(LEAF),
            index: 1,
            table_len: 1,
        };
        send_with_retry(&mut controller, &execute, &CancellationFlag::new(), POLL)
            .await
            .unwrap();
        // The failure is reported over the channel before the worker gives up
        recv_with_retry::<_, WorkerReply>(&mut controller, &CancellationFlag::new(), POLL)
            .await
            .unwrap()
    };

    let (outcome, reply) = tokio::join!(worker.serve(), drive);
    assert!(matches!(
        outcome,
        Err(Error::Artifact(ArtifactError::InvalidFunctionIndex { index: 1, .. }))
    ));
    match reply {
        WorkerReply::Error { message } => assert!(message.contains("outside the function table"), "{}", message),
        other => panic!("Expected error reply, got {:?}", other),
    }
}

#[tokio::test]
async fn test_banished_worker_stops_waiting() {
    let (_controller, worker_end) = loopback_pair().await;
    let cancel = CancellationFlag::new();
    let mut worker = Worker::new(fixtures::opener(), worker_end, POLL).with_cancellation(cancel.clone());
    cancel.banish();

    let result = worker.serve().await;
    assert!(result.unwrap_err().is_cancellation());
}

#[tokio::test]
async fn test_in_process_launcher_connects_back() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let launcher = InProcessLauncher::new(fixtures::opener(), POLL);
    let mut handle = launcher.launch(listener.local_addr().unwrap()).await.unwrap();

    let (stream, _) = listener.accept().await.unwrap();
    let mut controller = FramedChannel::new(stream);
    assert_eq!(request(&mut controller, op(LoadPhase::InMemory, LEAF, &[])).await, WorkerReply::Ack);
    drop(controller);

    handle.wait(&CancellationFlag::new(), POLL).await.unwrap();
    assert!(handle.has_exited());
}

#[tokio::test]
async fn test_collected_task_can_still_be_terminated() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let launcher = InProcessLauncher::new(fixtures::opener(), POLL);
    let mut handle = launcher.launch(listener.local_addr().unwrap()).await.unwrap();

    let (stream, _) = listener.accept().await.unwrap();
    drop(FramedChannel::new(stream));

    handle.wait(&CancellationFlag::new(), POLL).await.unwrap();
    // Reaping twice must not poll the finished task again
    handle.terminate().await;
    handle.wait(&CancellationFlag::new(), POLL).await.unwrap();
    assert!(handle.has_exited());
}
