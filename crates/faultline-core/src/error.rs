//! Build-time errors and the synthetic faults raised by the engine itself.

use std::time::Duration;

use thiserror::Error;

use crate::policy::TimeoutStrategy;

/// Errors raised while constructing a policy.
///
/// These are only ever produced at build time; `execute` never returns one.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A retry policy was built without any fault or result predicate.
    #[error("policy has no handled predicates")]
    NoPredicates,

    /// The retry schedule (or the backoff config behind it) is invalid.
    #[error("invalid retry schedule: {0}")]
    InvalidSchedule(String),

    /// The timeout duration is unusable.
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),

    /// A wrap needs an outer and an inner policy at minimum.
    #[error("policy wrap needs at least two policies, got {0}")]
    WrapTooShort(usize),

    /// A `PolicyConfig` configured neither a retry nor a timeout.
    #[error("policy config defines neither retry nor timeout")]
    EmptyConfig,

    /// Policy configuration could not be parsed (including negative counts
    /// or durations).
    #[error("invalid policy config: {0}")]
    Config(#[from] serde_json::Error),
}

/// Synthetic fault produced when an operation overruns its timeout.
///
/// Match it from an outer retry policy with `handle::<TimeoutRejected>()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation timed out after {}ms ({strategy} timeout)", .timeout.as_millis())]
pub struct TimeoutRejected {
    /// The configured timeout that was exceeded.
    pub timeout: Duration,
    /// Strategy of the policy that rejected the call.
    pub strategy: TimeoutStrategy,
}

/// The caller's cancellation token fired before the execution completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("execution cancelled")]
pub struct ExecutionCancelled;
