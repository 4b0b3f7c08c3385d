//! Claim / resolve / activate protocol against the SQLite store

use std::time::Duration;

use outbox_core::application::{GetNextParams, ResolveParams};
use outbox_core::domain::{Disposition, DomainError, JobPayload, JobStatus, NewJob};
use outbox_core::error::AppError;
use outbox_infra_sqlite::SqliteJobStore;
use outbox_integration_tests::{TestDb, T0};
use serde_json::json;

const KEY: &str = "k";

fn one_minute() -> GetNextParams {
    GetNextParams::new(KEY).timeout(Duration::from_secs(60))
}

#[tokio::test]
async fn test_claim_five_of_ten() {
    let (db, _clock) = TestDb::with_manual_clock().await;
    db.seed(KEY, 10).await;

    let jobs = db.service.get_next(&one_minute().count(5)).await.unwrap();
    assert_eq!(jobs.iter().map(|j| j.id).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
    for job in &jobs {
        assert_eq!(job.attempt_count, 1);
        assert!(job.receipt.is_some());
        assert!(job.next_visible_at.unwrap() >= T0);
    }

    let rows = db.rows(KEY).await;
    assert_eq!(rows.iter().filter(|j| j.next_visible_at.is_some()).count(), 5);
    assert!(rows[5..].iter().all(|j| j.next_visible_at.is_none() && j.receipt.is_none()));

    println!("✅ Claimed exactly the five lowest ids");
}

#[tokio::test]
async fn test_peek_never_mutates() {
    let (db, _clock) = TestDb::with_manual_clock().await;
    db.seed(KEY, 6).await;
    // One row already leased once
    db.service.get_next(&GetNextParams::new(KEY)).await.unwrap();
    let before = db.rows(KEY).await;

    for count in [1, 3, 6, 50] {
        let peeked = db
            .service
            .get_next(&GetNextParams::new(KEY).count(count).peek())
            .await
            .unwrap();
        assert!(peeked.iter().all(|j| j.receipt.is_none()));
        assert_eq!(db.rows(KEY).await, before);
    }
}

#[tokio::test]
async fn test_resolve_dispositions() {
    let (db, clock) = TestDb::with_manual_clock().await;
    db.seed(KEY, 3).await;
    let jobs = db.service.get_next(&one_minute().count(3)).await.unwrap();
    clock.advance(Duration::from_secs(1));
    let now = T0 + 1_000;

    let completed = db
        .service
        .resolve(jobs[0].id, ResolveParams::new(Disposition::Complete, jobs[0].receipt.clone()))
        .await
        .unwrap();
    assert_eq!(completed.status, Some(JobStatus::Success));
    assert_eq!(completed.completed_at, Some(now));

    let update = Disposition::Update(Some(JobPayload::new(json!({"cursor": 42}))));
    let updated = db
        .service
        .resolve(jobs[1].id, ResolveParams::new(update, jobs[1].receipt.clone()))
        .await
        .unwrap();
    assert_eq!(updated.status, None);
    assert_eq!(updated.completed_at, None);
    assert_eq!(updated.metadata, Some(JobPayload::new(json!({"cursor": 42}))));
    assert_eq!(updated.next_visible_at, jobs[1].next_visible_at);

    let failed = db
        .service
        .resolve(jobs[2].id, ResolveParams::new(Disposition::Error, jobs[2].receipt.clone()))
        .await
        .unwrap();
    assert_eq!(failed.status, Some(JobStatus::Error));
    assert_eq!(failed.completed_at, Some(now));

    // Terminal rows are never claimed again
    clock.advance(Duration::from_secs(120));
    let again = db.service.get_next(&one_minute().count(10)).await.unwrap();
    assert_eq!(again.iter().map(|j| j.id).collect::<Vec<_>>(), vec![jobs[1].id]);
}

#[tokio::test]
async fn test_stale_resolve_leaves_row_unchanged() {
    let (db, _clock) = TestDb::with_manual_clock().await;
    db.seed(KEY, 1).await;
    let job = db.service.get_next(&one_minute()).await.unwrap().remove(0);
    let before = db.row(job.id).await;

    let forged = outbox_core::domain::Receipt::new("ffffffffffffffffffffffffffffffff");
    let err = db
        .service
        .resolve(job.id, ResolveParams::new(Disposition::Complete, Some(forged)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Domain(DomainError::StaleResolve { .. })));
    assert_eq!(db.row(job.id).await, before);

    let err = db
        .service
        .resolve(job.id, ResolveParams::new(Disposition::Complete, None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Domain(DomainError::UnauthorizedResolve(_))));
    assert_eq!(db.row(job.id).await, before);
}

#[tokio::test]
async fn test_unknown_keeps_job_retryable() {
    let (db, clock) = TestDb::with_manual_clock().await;
    db.seed(KEY, 1).await;
    let job = db.service.get_next(&one_minute()).await.unwrap().remove(0);

    let resolved = db
        .service
        .resolve(job.id, ResolveParams::new(Disposition::Unknown, job.receipt.clone()))
        .await
        .unwrap();
    assert_eq!(resolved.status, None);
    assert_eq!(resolved.receipt, None);

    // Still hidden until the lease deadline passes
    assert!(db.service.get_next(&one_minute()).await.unwrap().is_empty());
    clock.advance(Duration::from_secs(60));
    let retried = db.service.get_next(&one_minute()).await.unwrap().remove(0);
    assert_eq!(retried.id, job.id);
    assert_eq!(retried.attempt_count, 2);
}

#[tokio::test]
async fn test_reclaim_after_lease_expiry() {
    let (db, clock) = TestDb::with_manual_clock().await;
    db.seed(KEY, 1).await;

    let first = db.service.get_next(&one_minute()).await.unwrap().remove(0);
    clock.advance(Duration::from_secs(61));
    let second = db.service.get_next(&one_minute()).await.unwrap().remove(0);

    assert_eq!(second.id, first.id);
    assert_eq!(second.attempt_count, 2);
    assert_ne!(second.receipt, first.receipt);

    // The first holder lost its lease
    let err = db
        .service
        .resolve(first.id, ResolveParams::new(Disposition::Complete, first.receipt))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(db.row(first.id).await.status, None);
}

#[tokio::test]
async fn test_activate_protocol() {
    let (db, _clock) = TestDb::with_manual_clock().await;
    db.seed(KEY, 2).await;

    let leased = db.service.get_next(&one_minute()).await.unwrap().remove(0);
    let before = db.row(leased.id).await;
    let err = db
        .service
        .activate(leased.id, Some(Duration::from_secs(60)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Domain(DomainError::AlreadyLeased(id)) if id == leased.id));
    assert_eq!(db.row(leased.id).await, before);

    let peeked = db
        .service
        .get_next(&GetNextParams::new(KEY).peek())
        .await
        .unwrap()
        .remove(0);
    assert_eq!(peeked.id, 2);
    let activated = db
        .service
        .activate(peeked.id, Some(Duration::from_secs(60)))
        .await
        .unwrap();
    assert_eq!(activated.attempt_count, peeked.attempt_count + 1);
    assert!(activated.receipt.is_some());
    assert_eq!(activated.next_visible_at, Some(T0 + 60_000));

    db.service
        .resolve(activated.id, ResolveParams::new(Disposition::Complete, activated.receipt))
        .await
        .unwrap();
    assert_eq!(db.row(2).await.status, Some(JobStatus::Success));
}

#[tokio::test]
async fn test_enqueue_validation() {
    let (db, _clock) = TestDb::with_manual_clock().await;

    let err = db
        .service
        .enqueue(outbox_core::application::EnqueueRequest::new("", json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(db.rows("").await.is_empty());
}

#[tokio::test]
async fn test_transactional_enqueue_follows_business_write() {
    let (db, _clock) = TestDb::with_manual_clock().await;
    sqlx::query("CREATE TABLE orders (id INTEGER PRIMARY KEY, total INTEGER NOT NULL)")
        .execute(&db.pool)
        .await
        .unwrap();

    // Rolled back: neither the order nor its job exist
    let mut tx = db.pool.begin().await.unwrap();
    sqlx::query("INSERT INTO orders (total) VALUES (100)")
        .execute(&mut *tx)
        .await
        .unwrap();
    SqliteJobStore::insert_with(&mut *tx, &NewJob::new("orders", json!({"order": 1})), T0)
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(orders, 0);
    assert!(db.rows("orders").await.is_empty());

    // Committed: both visible, and the job is claimable
    let mut tx = db.pool.begin().await.unwrap();
    sqlx::query("INSERT INTO orders (total) VALUES (250)")
        .execute(&mut *tx)
        .await
        .unwrap();
    let job = SqliteJobStore::insert_with(&mut *tx, &NewJob::new("orders", json!({"order": 2})), T0)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let claimed = db
        .service
        .get_next(&GetNextParams::new("orders"))
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, job.id);
}

#[tokio::test]
async fn test_jobs_survive_reopen() {
    let (db, clock) = TestDb::with_manual_clock().await;
    db.seed(KEY, 4).await;
    let leased = db.service.get_next(&one_minute()).await.unwrap().remove(0);
    let path = db.path().to_path_buf();
    db.close_keeping_file().await;

    let reopened = TestDb::open(&path, clock).await;
    let rows = reopened.rows(KEY).await;
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].receipt, leased.receipt);

    // Lease still honoured across the restart
    let next = reopened.service.get_next(&one_minute().count(10)).await.unwrap();
    assert_eq!(next.iter().map(|j| j.id).collect::<Vec<_>>(), vec![2, 3, 4]);

    println!("✅ Jobs and leases persisted across reopen");
}
