//! Run and node failures
//!
//! `execute` never returns these to the caller. They are rendered into
//! `RunResult::error` as stable codes.

use thiserror::Error;

/// Failure raised while dispatching a single node
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    /// A parameter the handler cannot work without
    #[error("node '{node_id}' missing param '{key}'")]
    MissingParam { node_id: String, key: String },

    /// The handler panicked
    #[error("node_failed")]
    Panicked,
}

/// Reason a run did not complete
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("rate_limited")]
    RateLimited,

    #[error("step_limit_exceeded")]
    StepLimitExceeded,

    #[error("missing_node:{0}")]
    MissingNode(String),

    #[error(transparent)]
    Node(#[from] NodeError),
}
