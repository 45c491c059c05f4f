//! Dispatcher tests: sequential and pooled modes over the in-memory store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use tokio_util::sync::CancellationToken;
use vigil_core::job::JobStatus;
use vigil_worker::store::memory::Operation;
use vigil_worker::store::MemoryBackend;
use vigil_worker::{DispatchError, DispatchMode, Dispatcher, ExecutorError, JobExecutor};

use common::{executor, wait_until, Behaviour, FakeInference, RecordingNotifier};

const POLL: Duration = Duration::from_millis(10);

fn dispatcher(
    backend: &MemoryBackend,
    executor: Arc<JobExecutor>,
    mode: DispatchMode,
) -> Dispatcher<MemoryBackend> {
    Dispatcher::new(Arc::new(backend.clone()), executor, mode).with_poll_interval(POLL)
}

fn all_terminal(backend: &MemoryBackend) -> bool {
    backend.jobs().iter().all(|j| j.status.is_terminal())
}

// ---------------------------------------------------------------------------
// Sequential
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sequential_mode_drains_the_queue_on_one_connection() {
    let backend = MemoryBackend::new();
    for n in 0..3 {
        backend.submit(serde_json::json!({ "n": n }));
    }
    let inference = Arc::new(FakeInference::succeeding());
    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = dispatcher(&backend, executor(&inference, &notifier), DispatchMode::Sequential);

    let cancel = CancellationToken::new();
    let run = tokio::spawn({
        let cancel = cancel.clone();
        async move { dispatcher.run(cancel).await }
    });

    wait_until(|| all_terminal(&backend)).await;
    cancel.cancel();
    run.await.unwrap().unwrap();

    assert!(backend.jobs().iter().all(|j| j.status == JobStatus::Completed));
    assert_eq!(inference.calls(), 3);
    assert_eq!(inference.max_in_flight(), 1);
    assert_eq!(backend.connections_opened(), 1);
}

#[tokio::test]
async fn sequential_mode_stops_when_a_job_is_stuck() {
    let backend = MemoryBackend::new();
    let id = backend.submit(serde_json::json!({}));
    backend.fail_next(Operation::MarkFailed, 2);
    let inference = Arc::new(FakeInference::new(Behaviour::Fail("boom".into())));
    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = dispatcher(&backend, executor(&inference, &notifier), DispatchMode::Sequential);

    let err = tokio::time::timeout(Duration::from_secs(5), dispatcher.run(CancellationToken::new()))
        .await
        .unwrap()
        .unwrap_err();

    assert_matches!(
        err,
        DispatchError::Executor(ExecutorError::StuckRunning { job_id, .. }) if job_id == id
    );
    assert_eq!(backend.get(id).unwrap().status, JobStatus::Running);
}

#[tokio::test]
async fn sequential_mode_survives_store_errors() {
    let backend = MemoryBackend::new();
    let first = backend.submit(serde_json::json!({}));
    let second = backend.submit(serde_json::json!({}));
    backend.fail_next(Operation::MarkCompleting, 1);
    let inference = Arc::new(FakeInference::succeeding());
    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = dispatcher(&backend, executor(&inference, &notifier), DispatchMode::Sequential);

    let cancel = CancellationToken::new();
    let run = tokio::spawn({
        let cancel = cancel.clone();
        async move { dispatcher.run(cancel).await }
    });

    wait_until(|| backend.get(second).unwrap().status == JobStatus::Completed).await;
    cancel.cancel();
    run.await.unwrap().unwrap();

    // The interrupted job stays running; the loop reconnected and went on.
    assert_eq!(backend.get(first).unwrap().status, JobStatus::Running);
    assert_eq!(backend.connections_opened(), 2);
}

// ---------------------------------------------------------------------------
// Pooled
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pooled_mode_never_exceeds_max_workers() {
    let backend = MemoryBackend::new();
    for n in 0..6 {
        backend.submit(serde_json::json!({ "n": n }));
    }
    let inference = Arc::new(FakeInference::succeeding().with_delay(Duration::from_millis(50)));
    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = dispatcher(
        &backend,
        executor(&inference, &notifier),
        DispatchMode::Pooled { max_workers: 2 },
    );

    let cancel = CancellationToken::new();
    let run = tokio::spawn({
        let cancel = cancel.clone();
        async move { dispatcher.run(cancel).await }
    });

    wait_until(|| all_terminal(&backend)).await;
    cancel.cancel();
    run.await.unwrap().unwrap();

    assert!(backend.jobs().iter().all(|j| j.status == JobStatus::Completed));
    assert_eq!(inference.calls(), 6);
    assert!(inference.max_in_flight() <= 2);
    // One claim connection plus one per job.
    assert_eq!(backend.connections_opened(), 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_cancels_running_jobs_and_waits_for_workers() {
    let backend = MemoryBackend::new();
    let running: Vec<_> = (0..2).map(|_| backend.submit(serde_json::json!({}))).collect();
    let waiting = backend.submit(serde_json::json!({}));
    let inference = Arc::new(FakeInference::new(Behaviour::Block));
    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = dispatcher(
        &backend,
        executor(&inference, &notifier),
        DispatchMode::Pooled { max_workers: 2 },
    );

    let cancel = CancellationToken::new();
    let run = tokio::spawn({
        let cancel = cancel.clone();
        async move { dispatcher.run(cancel).await }
    });

    wait_until(|| inference.in_flight() == 2).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    for id in running {
        assert_eq!(backend.get(id).unwrap().status, JobStatus::Cancelled);
    }
    // No permit was free, so the third job was never claimed.
    assert_eq!(backend.get(waiting).unwrap().status, JobStatus::Pending);
    assert_eq!(inference.in_flight(), 0);
}

#[tokio::test]
async fn stuck_worker_does_not_stop_the_pool() {
    let backend = MemoryBackend::new();
    let stuck = backend.submit(serde_json::json!({}));
    let next = backend.submit(serde_json::json!({}));
    backend.fail_next(Operation::MarkFailed, 2);
    let inference = Arc::new(FakeInference::new(Behaviour::Fail("boom".into())));
    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = dispatcher(
        &backend,
        executor(&inference, &notifier),
        DispatchMode::Pooled { max_workers: 1 },
    );

    let cancel = CancellationToken::new();
    let run = tokio::spawn({
        let cancel = cancel.clone();
        async move { dispatcher.run(cancel).await }
    });

    wait_until(|| backend.get(next).unwrap().status == JobStatus::Failed).await;
    cancel.cancel();
    run.await.unwrap().unwrap();

    assert_eq!(backend.get(stuck).unwrap().status, JobStatus::Running);
}

#[tokio::test]
async fn worker_connection_is_retried_once() {
    let backend = MemoryBackend::new();
    let inference = Arc::new(FakeInference::succeeding());
    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = dispatcher(
        &backend,
        executor(&inference, &notifier),
        DispatchMode::Pooled { max_workers: 1 },
    );

    let cancel = CancellationToken::new();
    let run = tokio::spawn({
        let cancel = cancel.clone();
        async move { dispatcher.run(cancel).await }
    });

    // Let the claim loop open its connection before faults are armed.
    wait_until(|| backend.connections_opened() == 1).await;
    backend.fail_next(Operation::Connect, 1);
    let id = backend.submit(serde_json::json!({}));

    wait_until(|| backend.get(id).unwrap().status == JobStatus::Completed).await;
    cancel.cancel();
    run.await.unwrap().unwrap();
    assert_eq!(backend.connections_opened(), 2);
}

#[tokio::test]
async fn pooled_mode_needs_a_worker() {
    let backend = MemoryBackend::new();
    let inference = Arc::new(FakeInference::succeeding());
    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = dispatcher(
        &backend,
        executor(&inference, &notifier),
        DispatchMode::Pooled { max_workers: 0 },
    );

    assert_matches!(
        dispatcher.run(CancellationToken::new()).await,
        Err(DispatchError::NoWorkers)
    );
}
