//! The agent execution loop.
//!
//! Drives a multi-turn conversation: request a completion, execute any tool
//! calls it carries, feed the results back, repeat. The loop ends when the
//! model answers without tool calls, or when an iteration cap, wall-clock
//! timeout, stop request, or the circuit breaker cuts it short. All of
//! those endings produce a descriptive final answer; only completion-client
//! failures surface as errors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::dispatch::execute_tool_calls;
use crate::agent::hooks::{JobSink, MessageSink};
use crate::agent::tracker::{RetryTracker, TrackerStats};
use crate::config::AgentConfig;
use crate::context::compressor;
use crate::context::manager::{ContextManager, ContextStats};
use crate::error::AgentError;
use crate::llm::client::CompletionClient;
use crate::llm::fallback;
use crate::models::job::{Job, JobStatus};
use crate::models::message::{Message, Role};
use crate::tools::registry::{ToolRegistry, ToolSchema};

/// Cloneable handle that requests cooperative cancellation.
///
/// The flag is checked at iteration boundaries; a running completion or
/// tool call finishes first.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    fn is_set(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    fn clear(&self) {
        self.flag.store(false, Ordering::Relaxed);
    }
}

/// A tool-augmented conversation driver
pub struct Agent {
    config: AgentConfig,
    client: Arc<dyn CompletionClient>,
    registry: Arc<ToolRegistry>,
    context_manager: ContextManager,
    tracker: RetryTracker,
    messages: Vec<Message>,
    stop: StopHandle,
    agent_id: String,
    message_sink: Option<Arc<dyn MessageSink>>,
    job_sink: Option<Arc<dyn JobSink>>,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        client: Arc<dyn CompletionClient>,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        let context_manager = ContextManager::new(
            config.context_max_tokens,
            config.context_compression_threshold,
        );
        let tracker = RetryTracker::new(config.max_tool_retries, config.failure_limit);

        Self {
            config,
            client,
            registry,
            context_manager,
            tracker,
            messages: Vec::new(),
            stop: StopHandle::default(),
            agent_id: Uuid::new_v4().to_string(),
            message_sink: None,
            job_sink: None,
        }
    }

    /// Persist every appended message through `sink`
    pub fn with_message_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.message_sink = Some(sink);
        self
    }

    /// Record job lifecycle transitions through `sink`
    pub fn with_job_sink(mut self, sink: Arc<dyn JobSink>) -> Self {
        self.job_sink = Some(sink);
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Handle for requesting a stop from another task
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    /// Run one task to completion.
    ///
    /// Appends the prompt as a user message and drives the loop until a
    /// final answer. Terminal conditions (iteration cap, timeout, stop
    /// request, circuit breaker) come back as descriptive answers, not
    /// errors; only completion-client failures are `Err`.
    pub async fn run(&mut self, prompt: &str) -> Result<String, AgentError> {
        self.stop.clear();
        self.tracker.reset();

        self.append_message(Message::user(prompt)).await;

        let job = Job::new("task", json!({ "prompt": prompt })).with_agent(self.agent_id.clone());
        let job_id = job.id.clone();
        info!(job_id = %job_id, "Starting task");
        self.notify_job_created(&job).await;
        self.notify_job_status(&job_id, JobStatus::InProgress, None, None).await;

        match self.agent_loop().await {
            Ok(response) => {
                self.notify_job_status(&job_id, JobStatus::Completed, Some(&response), None)
                    .await;
                Ok(response)
            }
            Err(error) => {
                warn!(job_id = %job_id, error = %error, "Task failed");
                self.notify_job_status(&job_id, JobStatus::Failed, None, Some(&error.to_string()))
                    .await;
                Err(error)
            }
        }
    }

    async fn agent_loop(&mut self) -> Result<String, AgentError> {
        let started = Instant::now();
        let timeout = self.config.task_timeout_secs.map(Duration::from_secs);

        for iteration in 1..=self.config.max_iterations {
            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    warn!(iteration, elapsed_secs = started.elapsed().as_secs(), "Task timed out");
                    return Ok(format!(
                        "Task timed out after {} seconds. Task may be incomplete.",
                        started.elapsed().as_secs()
                    ));
                }
            }

            if self.stop.is_set() {
                info!(iteration, "Stop requested, ending task");
                return Ok("Stopped by user request. Task may be incomplete.".to_string());
            }

            debug!(iteration, max_iterations = self.config.max_iterations, "Agent loop iteration");

            if self.context_manager.should_compress(&self.messages) {
                let before = self.messages.len();
                self.messages =
                    compressor::compress(&self.messages, self.config.keep_recent_messages, true);
                info!(before, after = self.messages.len(), "Compressed conversation context");
            }

            // Fallback mode offers no schemas; the model is instructed
            // through the system prompt instead.
            let schemas = if self.config.fallback_mode {
                None
            } else {
                Some(self.registry.schemas().await)
            };

            let mut response = self.request_completion(schemas.as_deref()).await?;

            if self.config.fallback_mode {
                let (cleaned, calls) = fallback::parse(&response.content);
                response.content = cleaned;
                if !calls.is_empty() {
                    response.tool_calls = Some(calls);
                }
            }

            let content = response.content.clone();
            let tool_calls = response.tool_calls.clone();
            self.append_message(response).await;

            let Some(calls) = tool_calls.filter(|calls| !calls.is_empty()) else {
                info!(iteration, "Task complete");
                return Ok(content);
            };

            debug!(iteration, count = calls.len(), "Executing tool calls");
            let outcome = execute_tool_calls(
                &self.registry,
                &mut self.tracker,
                &calls,
                self.config.parallel_tool_calls,
            )
            .await;

            for (call, result) in calls.iter().zip(&outcome.results) {
                let content = if result.success {
                    result.output.clone()
                } else {
                    format!(
                        "Error: {}\n{}",
                        result.error.as_deref().unwrap_or("tool execution failed"),
                        result.output
                    )
                };
                self.append_message(Message::tool(content, &call.id, &call.name)).await;
            }

            if let Some(reason) = outcome.stop_reason {
                return Ok(reason);
            }
        }

        warn!(max_iterations = self.config.max_iterations, "Maximum iterations reached");
        Ok("Maximum iterations reached. Task may be incomplete.".to_string())
    }

    async fn request_completion(
        &self,
        schemas: Option<&[ToolSchema]>,
    ) -> Result<Message, AgentError> {
        // Streaming is only usable when the backend is offered no tools.
        let stream = self.config.streaming && schemas.map_or(true, |s| s.is_empty());

        if stream {
            let mut rx = self
                .client
                .generate_stream(&self.messages, schemas)
                .await
                .map_err(AgentError::Completion)?;

            let mut content = String::new();
            while let Some(chunk) = rx.recv().await {
                content.push_str(&chunk);
            }
            Ok(Message::assistant(content))
        } else {
            self.client
                .generate(&self.messages, schemas)
                .await
                .map_err(AgentError::Completion)
        }
    }

    /// Set or extend the system prompt.
    ///
    /// In fallback mode the tool-format instructions are appended first.
    /// Merges into an existing leading system message; otherwise inserts
    /// one at the front.
    pub fn add_system_message(&mut self, content: &str) {
        let content = if self.config.fallback_mode {
            fallback::inject_instructions(content)
        } else {
            content.to_string()
        };

        match self.messages.first_mut() {
            Some(first) if first.role == Role::System => {
                first.content.push_str("\n\n");
                first.content.push_str(&content);
            }
            _ => self.messages.insert(0, Message::system(content)),
        }
    }

    pub fn conversation_history(&self) -> &[Message] {
        &self.messages
    }

    pub fn clear_history(&mut self) {
        self.messages.clear();
    }

    pub fn context_stats(&self) -> ContextStats {
        self.context_manager.stats(&self.messages)
    }

    pub fn tracker_stats(&self) -> TrackerStats {
        self.tracker.stats()
    }

    async fn append_message(&mut self, message: Message) {
        if let Some(sink) = &self.message_sink {
            if let Err(error) = sink.persist(&message).await {
                warn!(error = %error, "Message sink failed");
            }
        }
        self.messages.push(message);
    }

    async fn notify_job_created(&self, job: &Job) {
        if let Some(sink) = &self.job_sink {
            if let Err(error) = sink.job_created(job).await {
                warn!(error = %error, "Job sink failed");
            }
        }
    }

    async fn notify_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        result: Option<&str>,
        error: Option<&str>,
    ) {
        if let Some(sink) = &self.job_sink {
            if let Err(sink_error) = sink.job_status(job_id, status, result, error).await {
                warn!(error = %sink_error, "Job sink failed");
            }
        }
    }
}
