//! Tool dispatch policy.
//!
//! Every call is checked against the retry tracker first; blocked calls
//! become failed results without reaching the tool. Mutating tools run
//! exactly once. Everything else goes through the recovery engine.

use futures::future::join_all;
use tracing::{debug, warn};

use crate::agent::tracker::RetryTracker;
use crate::models::message::{ToolCall, ToolResult};
use crate::recovery::engine::execute_with_recovery;
use crate::tools::registry::{tool_category, ToolCategory, ToolRegistry};

/// Outcome of one batch of tool calls
pub struct DispatchOutcome {
    /// One result per call, in request order
    pub results: Vec<ToolResult>,
    /// Circuit-breaker message when the task must stop
    pub stop_reason: Option<String>,
}

/// Execute a batch of tool calls.
///
/// Calls fan out concurrently when `parallel` is set, the batch has more
/// than one call, and none of them is interactive. Results always come back
/// in request order regardless of completion order, so the transcript stays
/// deterministic.
pub async fn execute_tool_calls(
    registry: &ToolRegistry,
    tracker: &mut RetryTracker,
    calls: &[ToolCall],
    parallel: bool,
) -> DispatchOutcome {
    // Tracker consultation happens up front and sequentially, so concurrent
    // futures never touch tracker state.
    let blocked: Vec<Option<String>> = calls
        .iter()
        .map(|call| tracker.check_should_execute(&call.name, &call.parameters))
        .collect();

    let has_interactive = calls
        .iter()
        .any(|call| tool_category(&call.name) == ToolCategory::Interactive);
    let fan_out = parallel && calls.len() > 1 && !has_interactive;

    let results: Vec<ToolResult> = if fan_out {
        debug!(count = calls.len(), "Executing tool calls in parallel");
        let futures: Vec<_> = calls
            .iter()
            .zip(&blocked)
            .map(|(call, reason)| run_one(registry, call, reason.clone()))
            .collect();
        join_all(futures).await
    } else {
        let mut sequential = Vec::with_capacity(calls.len());
        for (call, reason) in calls.iter().zip(&blocked) {
            sequential.push(run_one(registry, call, reason.clone()).await);
        }
        sequential
    };

    // Outcomes are recorded in request order; the first breaker trip wins.
    let mut stop_reason = None;
    for (call, result) in calls.iter().zip(&results) {
        if result.success {
            tracker.record_success();
        } else if let Some(reason) = tracker.record_failure() {
            if stop_reason.is_none() {
                warn!(tool = %call.name, "Circuit breaker tripped");
                stop_reason = Some(reason);
            }
        }
    }

    DispatchOutcome {
        results,
        stop_reason,
    }
}

async fn run_one(registry: &ToolRegistry, call: &ToolCall, blocked: Option<String>) -> ToolResult {
    if let Some(reason) = blocked {
        warn!(tool = %call.name, reason = %reason, "Tool call blocked");
        return ToolResult::error(reason);
    }

    let category = tool_category(&call.name);
    debug!(tool = %call.name, id = %call.id, ?category, "Dispatching tool call");

    let outcome = match category {
        ToolCategory::Mutating => registry.execute(&call.name, call.parameters.clone()).await,
        ToolCategory::ReadOnly | ToolCategory::Interactive => {
            execute_with_recovery(&call.name, || {
                registry.execute(&call.name, call.parameters.clone())
            })
            .await
        }
    };

    match outcome {
        Ok(result) => result,
        Err(error) => ToolResult::error(format!("Tool execution failed: {}", error)),
    }
}
