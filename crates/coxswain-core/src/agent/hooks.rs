//! Side-channel observers for the agent loop.
//!
//! Sinks are best-effort: the runner logs their failures and keeps going,
//! so persistence trouble never corrupts a running conversation.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::job::{Job, JobStatus};
use crate::models::message::Message;

/// Observes every message the loop appends to the transcript
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn persist(&self, message: &Message) -> Result<()>;
}

/// Observes job lifecycle transitions around `run()`
#[async_trait]
pub trait JobSink: Send + Sync {
    async fn job_created(&self, job: &Job) -> Result<()>;

    async fn job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        result: Option<&str>,
        error: Option<&str>,
    ) -> Result<()>;
}
