//! Agent loop, tool dispatch, and loop prevention.

pub mod dispatch;
pub mod hooks;
pub mod runner;
pub mod tracker;

pub use dispatch::{execute_tool_calls, DispatchOutcome};
pub use hooks::{JobSink, MessageSink};
pub use runner::{Agent, StopHandle};
pub use tracker::{RetryTracker, TrackerStats};
