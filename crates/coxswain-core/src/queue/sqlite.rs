//! SQLite-backed job queue.
//!
//! Jobs describe units of work handed to agents. The queue hands out
//! pending jobs by priority, then creation time, and stamps lifecycle
//! timestamps as status changes come in.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use tokio::sync::Mutex;
use tracing::debug;

use crate::agent::hooks::JobSink;
use crate::error::AgentError;
use crate::models::job::{Job, JobStatus};

pub struct SqliteJobQueue {
    conn: Mutex<Connection>,
}

impl SqliteJobQueue {
    /// Open (or create) the queue database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory queue for tests and ephemeral agents
    pub fn open_in_memory() -> Result<Self, AgentError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), AgentError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                type TEXT NOT NULL,
                status TEXT NOT NULL,
                priority INTEGER DEFAULT 1,
                payload TEXT NOT NULL,
                parent_job_id TEXT,
                agent_id TEXT,
                context_id TEXT,
                result TEXT,
                error TEXT,
                retry_count INTEGER DEFAULT 0,
                max_retries INTEGER DEFAULT 3,
                created_at TEXT NOT NULL,
                claimed_at TEXT,
                started_at TEXT,
                completed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_status ON jobs(status);
            CREATE INDEX IF NOT EXISTS idx_priority ON jobs(priority DESC);
            CREATE INDEX IF NOT EXISTS idx_parent ON jobs(parent_job_id);",
        )?;
        Ok(())
    }

    /// Insert a new job
    pub async fn push(&self, job: &Job) -> Result<(), AgentError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO jobs (
                id, type, status, priority, payload, parent_job_id, agent_id,
                context_id, result, error, retry_count, max_retries,
                created_at, claimed_at, started_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                job.id,
                job.job_type,
                job.status.as_str(),
                job.priority,
                job.payload.to_string(),
                job.parent_job_id,
                job.agent_id,
                job.context_id,
                job.result,
                job.error,
                job.retry_count,
                job.max_retries,
                job.created_at.to_rfc3339(),
                job.claimed_at.map(|t| t.to_rfc3339()),
                job.started_at.map(|t| t.to_rfc3339()),
                job.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        debug!(job_id = %job.id, job_type = %job.job_type, "Pushed job");
        Ok(())
    }

    /// Claim the highest-priority pending job for `agent_id`.
    ///
    /// Ties break on creation time, oldest first.
    pub async fn claim(&self, agent_id: &str) -> Result<Option<Job>, AgentError> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT * FROM jobs WHERE status = ?1
                 ORDER BY priority DESC, created_at ASC LIMIT 1",
                params![JobStatus::Pending.as_str()],
                JobRow::read,
            )
            .optional()?;

        let Some(raw) = row else {
            return Ok(None);
        };
        let mut job = raw.into_job()?;

        let claimed_at = Utc::now();
        conn.execute(
            "UPDATE jobs SET status = ?1, agent_id = ?2, claimed_at = ?3 WHERE id = ?4",
            params![
                JobStatus::Claimed.as_str(),
                agent_id,
                claimed_at.to_rfc3339(),
                job.id
            ],
        )?;

        job.status = JobStatus::Claimed;
        job.agent_id = Some(agent_id.to_string());
        job.claimed_at = Some(claimed_at);
        debug!(job_id = %job.id, agent_id, "Claimed job");
        Ok(Some(job))
    }

    /// Update a job's status, stamping lifecycle timestamps.
    ///
    /// `started_at` is stamped on the transition to in_progress and
    /// `completed_at` on any terminal status. `result` and `error` are
    /// written only when given.
    pub async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        result: Option<&str>,
        error: Option<&str>,
    ) -> Result<(), AgentError> {
        let conn = self.conn.lock().await;
        let now = Utc::now().to_rfc3339();

        let mut updates = vec!["status = ?"];
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(status.as_str())];

        if status == JobStatus::InProgress {
            updates.push("started_at = ?");
            values.push(Box::new(now.clone()));
        }
        if status.is_terminal() {
            updates.push("completed_at = ?");
            values.push(Box::new(now.clone()));
        }
        if let Some(result) = result {
            updates.push("result = ?");
            values.push(Box::new(result.to_string()));
        }
        if let Some(error) = error {
            updates.push("error = ?");
            values.push(Box::new(error.to_string()));
        }
        values.push(Box::new(job_id.to_string()));

        let sql = format!("UPDATE jobs SET {} WHERE id = ?", updates.join(", "));
        conn.execute(&sql, rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())))?;
        debug!(job_id, status = status.as_str(), "Updated job status");
        Ok(())
    }

    pub async fn get(&self, job_id: &str) -> Result<Option<Job>, AgentError> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row("SELECT * FROM jobs WHERE id = ?1", params![job_id], JobRow::read)
            .optional()?;
        row.map(JobRow::into_job).transpose()
    }

    /// Children of a parent job, oldest first
    pub async fn get_children(&self, parent_job_id: &str) -> Result<Vec<Job>, AgentError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM jobs WHERE parent_job_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![parent_job_id], JobRow::read)?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row?.into_job()?);
        }
        Ok(jobs)
    }

    /// Cancel a job that is still pending; returns whether anything changed
    pub async fn cancel(&self, job_id: &str) -> Result<bool, AgentError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE jobs SET status = ?1, completed_at = ?2 WHERE id = ?3 AND status = ?4",
            params![
                JobStatus::Cancelled.as_str(),
                Utc::now().to_rfc3339(),
                job_id,
                JobStatus::Pending.as_str()
            ],
        )?;
        Ok(changed > 0)
    }

    /// Number of jobs in a given status, for diagnostics
    pub async fn count_by_status(&self, status: JobStatus) -> Result<i64, AgentError> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[async_trait::async_trait]
impl JobSink for SqliteJobQueue {
    async fn job_created(&self, job: &Job) -> anyhow::Result<()> {
        Ok(self.push(job).await?)
    }

    async fn job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        result: Option<&str>,
        error: Option<&str>,
    ) -> anyhow::Result<()> {
        Ok(self.update_status(job_id, status, result, error).await?)
    }
}

/// Raw row image; parsing into a Job happens outside the rusqlite mapper
struct JobRow {
    id: String,
    job_type: String,
    status: String,
    priority: i64,
    payload: String,
    parent_job_id: Option<String>,
    agent_id: Option<String>,
    context_id: Option<String>,
    result: Option<String>,
    error: Option<String>,
    retry_count: i64,
    max_retries: i64,
    created_at: String,
    claimed_at: Option<String>,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl JobRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            job_type: row.get("type")?,
            status: row.get("status")?,
            priority: row.get("priority")?,
            payload: row.get("payload")?,
            parent_job_id: row.get("parent_job_id")?,
            agent_id: row.get("agent_id")?,
            context_id: row.get("context_id")?,
            result: row.get("result")?,
            error: row.get("error")?,
            retry_count: row.get("retry_count")?,
            max_retries: row.get("max_retries")?,
            created_at: row.get("created_at")?,
            claimed_at: row.get("claimed_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
        })
    }

    fn into_job(self) -> Result<Job, AgentError> {
        let status = JobStatus::parse(&self.status).ok_or_else(|| {
            AgentError::CorruptRecord(format!("unknown job status '{}'", self.status))
        })?;

        Ok(Job {
            id: self.id,
            job_type: self.job_type,
            status,
            priority: self.priority,
            payload: serde_json::from_str(&self.payload)?,
            parent_job_id: self.parent_job_id,
            agent_id: self.agent_id,
            context_id: self.context_id,
            result: self.result,
            error: self.error,
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            created_at: parse_timestamp(&self.created_at)?,
            claimed_at: parse_optional_timestamp(self.claimed_at)?,
            started_at: parse_optional_timestamp(self.started_at)?,
            completed_at: parse_optional_timestamp(self.completed_at)?,
        })
    }
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, AgentError> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AgentError::CorruptRecord(format!("bad timestamp '{}': {}", text, e)))
}

fn parse_optional_timestamp(text: Option<String>) -> Result<Option<DateTime<Utc>>, AgentError> {
    text.as_deref().map(parse_timestamp).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn push_then_get_round_trips() {
        let queue = SqliteJobQueue::open_in_memory().unwrap();
        let job = Job::new("task", json!({"prompt": "hello"}));
        queue.push(&job).await.unwrap();

        let loaded = queue.get(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, job.id);
        assert_eq!(loaded.job_type, "task");
        assert_eq!(loaded.status, JobStatus::Pending);
        assert_eq!(loaded.payload, json!({"prompt": "hello"}));
        assert_eq!(loaded.created_at.timestamp(), job.created_at.timestamp());
    }

    #[tokio::test]
    async fn claim_prefers_priority_then_age() {
        let queue = SqliteJobQueue::open_in_memory().unwrap();
        let low = Job::new("task", json!({"n": 1}));
        let high = Job::new("task", json!({"n": 2})).with_priority(5);
        queue.push(&low).await.unwrap();
        queue.push(&high).await.unwrap();

        let first = queue.claim("agent-1").await.unwrap().unwrap();
        assert_eq!(first.id, high.id);
        assert_eq!(first.status, JobStatus::Claimed);
        assert_eq!(first.agent_id.as_deref(), Some("agent-1"));
        assert!(first.claimed_at.is_some());

        let second = queue.claim("agent-1").await.unwrap().unwrap();
        assert_eq!(second.id, low.id);

        assert!(queue.claim("agent-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_status_stamps_lifecycle_timestamps() {
        let queue = SqliteJobQueue::open_in_memory().unwrap();
        let job = Job::new("task", json!({}));
        queue.push(&job).await.unwrap();

        queue
            .update_status(&job.id, JobStatus::InProgress, None, None)
            .await
            .unwrap();
        let running = queue.get(&job.id).await.unwrap().unwrap();
        assert_eq!(running.status, JobStatus::InProgress);
        assert!(running.started_at.is_some());
        assert!(running.completed_at.is_none());

        queue
            .update_status(&job.id, JobStatus::Completed, Some("all done"), None)
            .await
            .unwrap();
        let finished = queue.get(&job.id).await.unwrap().unwrap();
        assert_eq!(finished.status, JobStatus::Completed);
        assert_eq!(finished.result.as_deref(), Some("all done"));
        assert!(finished.completed_at.is_some());
        // started_at survives the later update
        assert!(finished.started_at.is_some());
    }

    #[tokio::test]
    async fn failed_jobs_keep_their_error() {
        let queue = SqliteJobQueue::open_in_memory().unwrap();
        let job = Job::new("task", json!({}));
        queue.push(&job).await.unwrap();

        queue
            .update_status(&job.id, JobStatus::Failed, None, Some("backend unreachable"))
            .await
            .unwrap();
        let failed = queue.get(&job.id).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("backend unreachable"));
    }

    #[tokio::test]
    async fn children_are_listed_oldest_first() {
        let queue = SqliteJobQueue::open_in_memory().unwrap();
        let parent = Job::new("task", json!({}));
        queue.push(&parent).await.unwrap();

        let mut first = Job::new("subtask", json!({"n": 1})).with_parent(parent.id.clone());
        first.created_at = parent.created_at - chrono::Duration::seconds(2);
        let second = Job::new("subtask", json!({"n": 2})).with_parent(parent.id.clone());
        queue.push(&second).await.unwrap();
        queue.push(&first).await.unwrap();

        let children = queue.get_children(&parent.id).await.unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].id, first.id);
        assert_eq!(children[1].id, second.id);
    }

    #[tokio::test]
    async fn cancel_only_touches_pending_jobs() {
        let queue = SqliteJobQueue::open_in_memory().unwrap();
        let job = Job::new("task", json!({}));
        queue.push(&job).await.unwrap();

        assert!(queue.cancel(&job.id).await.unwrap());
        let cancelled = queue.get(&job.id).await.unwrap().unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);

        // a second cancel has nothing pending to change
        assert!(!queue.cancel(&job.id).await.unwrap());

        let missing = queue.cancel("no-such-job").await.unwrap();
        assert!(!missing);
    }

    #[tokio::test]
    async fn count_by_status_counts() {
        let queue = SqliteJobQueue::open_in_memory().unwrap();
        for i in 0..3 {
            queue.push(&Job::new("task", json!({"n": i}))).await.unwrap();
        }
        queue.claim("agent-1").await.unwrap();

        assert_eq!(queue.count_by_status(JobStatus::Pending).await.unwrap(), 2);
        assert_eq!(queue.count_by_status(JobStatus::Claimed).await.unwrap(), 1);
        assert_eq!(queue.count_by_status(JobStatus::Failed).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn queue_persists_to_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");

        let job = Job::new("task", json!({"prompt": "persisted"}));
        {
            let queue = SqliteJobQueue::open(&path).unwrap();
            queue.push(&job).await.unwrap();
        }

        let reopened = SqliteJobQueue::open(&path).unwrap();
        let loaded = reopened.get(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.payload, json!({"prompt": "persisted"}));
    }
}
