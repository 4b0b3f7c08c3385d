//! Shared fixtures for the integration tests: a throwaway SQLite database
//! in WAL mode with the outbox schema applied.

use outbox_core::application::{EnqueueRequest, QueueService};
use outbox_core::domain::{Job, JobId};
use outbox_core::port::{ManualTimeProvider, SystemTimeProvider, TimeProvider};
use outbox_infra_sqlite::{create_pool, run_migrations, SqliteJobStore};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const T0: i64 = 1_700_000_000_000;

pub struct TestDb {
    pub pool: SqlitePool,
    pub store: Arc<SqliteJobStore>,
    pub service: Arc<QueueService>,
    path: PathBuf,
    keep_file: bool,
}

impl TestDb {
    /// Fresh database driven by a manual clock starting at [`T0`]
    pub async fn with_manual_clock() -> (Self, Arc<ManualTimeProvider>) {
        let clock = Arc::new(ManualTimeProvider::new(T0));
        let db = Self::open(&temp_db_path(), clock.clone()).await;
        (db, clock)
    }

    /// Fresh database driven by the wall clock
    pub async fn with_system_clock() -> Self {
        Self::open(&temp_db_path(), Arc::new(SystemTimeProvider)).await
    }

    /// Open (or reopen) the database at `path`
    pub async fn open(path: &Path, time_provider: Arc<dyn TimeProvider>) -> Self {
        let pool = create_pool(&format!("sqlite://{}", path.display()))
            .await
            .expect("pool");
        run_migrations(&pool).await.expect("migrations");

        let store = Arc::new(SqliteJobStore::new(pool.clone()));
        let service = Arc::new(QueueService::new(store.clone(), time_provider));
        Self {
            pool,
            store,
            service,
            path: path.to_path_buf(),
            keep_file: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Leave the file in place on drop so a test can reopen it
    pub async fn close_keeping_file(mut self) {
        self.keep_file = true;
        self.pool.close().await;
    }

    pub async fn seed(&self, key: &str, count: usize) -> Vec<Job> {
        let mut jobs = Vec::with_capacity(count);
        for n in 0..count {
            let job = self
                .service
                .enqueue(EnqueueRequest::new(key, serde_json::json!({ "n": n })))
                .await
                .expect("enqueue");
            jobs.push(job);
        }
        jobs
    }

    pub async fn row(&self, id: JobId) -> Job {
        self.service
            .find(id)
            .await
            .expect("find")
            .expect("row exists")
    }

    pub async fn rows(&self, key: &str) -> Vec<Job> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM outbox_jobs WHERE key = ? ORDER BY id")
            .bind(key)
            .fetch_all(&self.pool)
            .await
            .expect("ids");
        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            jobs.push(self.row(id).await);
        }
        jobs
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        if self.keep_file {
            return;
        }
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", self.path.display(), suffix));
        }
    }
}

pub fn temp_db_path() -> PathBuf {
    std::env::temp_dir().join(format!("outbox-it-{}.db", uuid::Uuid::new_v4()))
}
