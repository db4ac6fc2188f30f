//! Completion backend seam.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::models::message::Message;
use crate::tools::registry::ToolSchema;

/// A completion backend the agent loop can drive.
///
/// Implementations own transport, authentication, and wire formats. The
/// loop only needs a transcript in and an assistant message out; failures
/// here are the one class of error `run()` propagates to its caller.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// One-shot completion over the full transcript.
    ///
    /// `tools` carries the schemas offered for native tool calling; `None`
    /// means the backend is not offered any (fallback mode does this and
    /// relies on text markers instead).
    async fn generate(&self, messages: &[Message], tools: Option<&[ToolSchema]>) -> Result<Message>;

    /// Streaming completion; the receiver yields text chunks in order.
    ///
    /// Only used when no tool schemas are offered, since tool-call deltas
    /// cannot be assembled incrementally here.
    async fn generate_stream(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
    ) -> Result<mpsc::UnboundedReceiver<String>>;
}
