//! Per-execution context handed to every operation.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Execution-scoped data: an optional operation key for log fields and the
/// cancellation token the operation should observe.
///
/// Cloning is cheap. Timeout policies hand their operation a child context
/// whose token fires at the deadline or when the parent token fires.
#[derive(Debug, Clone, Default)]
pub struct Context {
    operation_key: Option<Arc<str>>,
    cancellation: CancellationToken,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label executions in log output.
    pub fn with_operation_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.operation_key = Some(key.into());
        self
    }

    /// Use an external cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn operation_key(&self) -> Option<&str> {
        self.operation_key.as_deref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Same key, with a token that is cancelled along with this one but can
    /// also be cancelled on its own.
    pub(crate) fn child(&self) -> Self {
        Self {
            operation_key: self.operation_key.clone(),
            cancellation: self.cancellation.child_token(),
        }
    }
}
