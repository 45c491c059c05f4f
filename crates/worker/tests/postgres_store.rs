//! Executor scenarios against PostgreSQL.

mod common;

use std::sync::Arc;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use vigil_core::job::{ErrorCode, JobStatus};
use vigil_db::models::job::SubmitJob;
use vigil_db::repositories::JobRepo;
use vigil_worker::store::{JobStore, PgJobStore};
use vigil_worker::JobOutcome;

use common::{executor, input_with_webhook, Behaviour, FakeInference, RecordingNotifier};

async fn store(pool: &PgPool) -> PgJobStore {
    let conn = pool.acquire().await.unwrap().detach();
    PgJobStore::from_connection(conn)
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn completed_job_keeps_output(pool: PgPool) {
    let submitted = JobRepo::submit(&pool, &SubmitJob { input: input_with_webhook() })
        .await
        .unwrap();
    let inference = Arc::new(FakeInference::succeeding());
    let notifier = Arc::new(RecordingNotifier::default());
    let executor = executor(&inference, &notifier);

    let mut store = store(&pool).await;
    let job = store.claim_next().await.unwrap().unwrap();
    assert_eq!(job.id, submitted.id);

    let outcome = executor
        .execute(&mut store, job, &CancellationToken::new())
        .await
        .unwrap();
    store.close().await.unwrap();

    assert_eq!(outcome, JobOutcome::Completed);
    let row = JobRepo::find_by_id(&pool, submitted.id).await.unwrap().unwrap();
    assert_eq!(row.job_status().unwrap(), JobStatus::Completed);
    assert!(row.output.is_some());
    assert!(row.job_error().is_none());
    assert_eq!(notifier.deliveries().len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn inference_error_is_persisted(pool: PgPool) {
    let submitted = JobRepo::submit(&pool, &SubmitJob { input: serde_json::json!({}) })
        .await
        .unwrap();
    let inference = Arc::new(FakeInference::new(Behaviour::Fail("model unavailable".into())));
    let notifier = Arc::new(RecordingNotifier::default());
    let executor = executor(&inference, &notifier);

    let mut store = store(&pool).await;
    let job = store.claim_next().await.unwrap().unwrap();
    let outcome = executor
        .execute(&mut store, job, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, JobOutcome::Failed(ErrorCode::InferenceError));
    let row = JobRepo::find_by_id(&pool, submitted.id).await.unwrap().unwrap();
    assert_eq!(row.job_status().unwrap(), JobStatus::Failed);
    let error = row.job_error().unwrap();
    assert_eq!(error.code, 100);
    assert_eq!(error.message, "Ollama API error (500): model unavailable");
}
