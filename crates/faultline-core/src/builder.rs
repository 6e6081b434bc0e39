//! Fluent builders that collect handled predicates and produce retry policies.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use faultline_core::{handle_result, RetrySchedule};
//!
//! let policy = handle_result(|status: &u16| *status != 200)
//!     .or::<std::io::Error>()
//!     .retry_with(
//!         RetrySchedule::durations([
//!             Duration::from_secs(1),
//!             Duration::from_secs(2),
//!             Duration::from_secs(3),
//!         ]),
//!         |_, wait, retry, _ctx| println!("retry {retry} in {}ms", wait.as_millis()),
//!     )
//!     .unwrap();
//! ```

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use crate::context::Context;
use crate::error::BuildError;
use crate::fault::Fault;
use crate::outcome::Outcome;
use crate::policy::{ResultRetryPolicy, RetryPolicy, RetrySchedule};
use crate::predicate::{FaultPredicate, FaultPredicateSet, HandledPredicateSet};

/// Start a fault-only builder handling any fault of type `E`.
pub fn handle<E>() -> PolicyBuilder
where
    E: StdError + Send + Sync + 'static,
{
    PolicyBuilder::new().or::<E>()
}

/// Start a fault-only builder handling faults of type `E` that match.
pub fn handle_where<E, F>(predicate: F) -> PolicyBuilder
where
    E: StdError + Send + Sync + 'static,
    F: Fn(&E) -> bool + Send + Sync + 'static,
{
    PolicyBuilder::new().or_where(predicate)
}

/// Start a fault-only builder from an arbitrary fault predicate.
pub fn handle_fault<F>(predicate: F) -> PolicyBuilder
where
    F: Fn(&Fault) -> bool + Send + Sync + 'static,
{
    PolicyBuilder::new().handle_fault(predicate)
}

/// Start a value-aware builder treating matching values as handleable.
pub fn handle_result<T, F>(predicate: F) -> ResultPolicyBuilder<T>
where
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    ResultPolicyBuilder::new().or_result(predicate)
}

fn of_type<E>() -> FaultPredicate
where
    E: StdError + Send + Sync + 'static,
{
    Arc::new(|fault: &Fault| fault.is::<E>())
}

fn of_type_where<E, F>(predicate: F) -> FaultPredicate
where
    E: StdError + Send + Sync + 'static,
    F: Fn(&E) -> bool + Send + Sync + 'static,
{
    Arc::new(move |fault: &Fault| fault.downcast_ref::<E>().map_or(false, &predicate))
}

/// Builder for policies that only inspect faults.
#[derive(Debug, Clone, Default)]
pub struct PolicyBuilder {
    faults: FaultPredicateSet,
}

impl PolicyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fault predicate.
    pub fn handle_fault<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Fault) -> bool + Send + Sync + 'static,
    {
        self.faults.push(Arc::new(predicate));
        self
    }

    /// Alias of [`handle_fault`](Self::handle_fault) for chaining.
    pub fn or_fault<F>(self, predicate: F) -> Self
    where
        F: Fn(&Fault) -> bool + Send + Sync + 'static,
    {
        self.handle_fault(predicate)
    }

    /// Also handle any fault of type `E`.
    pub fn or<E>(mut self) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.faults.push(of_type::<E>());
        self
    }

    /// Also handle faults of type `E` that match `predicate`.
    pub fn or_where<E, F>(mut self, predicate: F) -> Self
    where
        E: StdError + Send + Sync + 'static,
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.faults.push(of_type_where(predicate));
        self
    }

    /// Switch to a value-aware builder, keeping the fault predicates.
    pub fn into_result_builder<T>(self) -> ResultPolicyBuilder<T> {
        ResultPolicyBuilder {
            predicates: HandledPredicateSet::from_faults(self.faults),
        }
    }

    /// Switch to a value-aware builder and register a result predicate.
    pub fn handle_result<T, F>(self, predicate: F) -> ResultPolicyBuilder<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.into_result_builder().or_result(predicate)
    }

    pub fn or_result<T, F>(self, predicate: F) -> ResultPolicyBuilder<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.handle_result(predicate)
    }

    pub fn retry(self, schedule: RetrySchedule) -> Result<RetryPolicy, BuildError> {
        RetryPolicy::new(self.faults, schedule, None)
    }

    /// Build a retry policy that reports each retry to `on_retry` as
    /// `(fault, wait, retry, context)`, with `retry` counting from 1.
    pub fn retry_with<F>(
        self,
        schedule: RetrySchedule,
        on_retry: F,
    ) -> Result<RetryPolicy, BuildError>
    where
        F: Fn(&Fault, Duration, u32, &Context) + Send + Sync + 'static,
    {
        RetryPolicy::new(self.faults, schedule, Some(Arc::new(on_retry)))
    }
}

/// Builder for policies that inspect both faults and produced values.
pub struct ResultPolicyBuilder<T> {
    predicates: HandledPredicateSet<T>,
}

impl<T> ResultPolicyBuilder<T> {
    pub fn new() -> Self {
        Self {
            predicates: HandledPredicateSet::new(),
        }
    }

    /// Register a result predicate.
    pub fn handle_result<F>(self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.or_result(predicate)
    }

    pub fn or_result<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.predicates.push_result(Arc::new(predicate));
        self
    }

    pub fn or_fault<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Fault) -> bool + Send + Sync + 'static,
    {
        self.predicates.push_fault(Arc::new(predicate));
        self
    }

    pub fn or<E>(mut self) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.predicates.push_fault(of_type::<E>());
        self
    }

    pub fn or_where<E, F>(mut self, predicate: F) -> Self
    where
        E: StdError + Send + Sync + 'static,
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.predicates.push_fault(of_type_where(predicate));
        self
    }

    pub fn retry(self, schedule: RetrySchedule) -> Result<ResultRetryPolicy<T>, BuildError> {
        ResultRetryPolicy::new(self.predicates, schedule, None)
    }

    /// Build a retry policy that reports each retry to `on_retry` as
    /// `(outcome, wait, retry, context)`, with `retry` counting from 1.
    pub fn retry_with<F>(
        self,
        schedule: RetrySchedule,
        on_retry: F,
    ) -> Result<ResultRetryPolicy<T>, BuildError>
    where
        F: Fn(&Outcome<T>, Duration, u32, &Context) + Send + Sync + 'static,
    {
        ResultRetryPolicy::new(self.predicates, schedule, Some(Arc::new(on_retry)))
    }
}

impl<T> Default for ResultPolicyBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ResultPolicyBuilder<T> {
    fn clone(&self) -> Self {
        Self {
            predicates: self.predicates.clone(),
        }
    }
}

impl<T> std::fmt::Debug for ResultPolicyBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultPolicyBuilder")
            .field("predicates", &self.predicates)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    use crate::outcome::Termination;

    #[derive(Debug, thiserror::Error)]
    #[error("status {0}")]
    struct StatusError(u16);

    #[test]
    fn empty_builders_fail_to_build() {
        assert!(matches!(
            PolicyBuilder::new().retry(RetrySchedule::immediate(1)),
            Err(BuildError::NoPredicates)
        ));
        assert!(matches!(
            ResultPolicyBuilder::<u16>::new().retry(RetrySchedule::immediate(1)),
            Err(BuildError::NoPredicates)
        ));
        assert!(matches!(
            PolicyBuilder::new()
                .into_result_builder::<u16>()
                .retry(RetrySchedule::immediate(1)),
            Err(BuildError::NoPredicates)
        ));
    }

    #[test]
    fn typed_handle_matches_only_that_type() {
        let policy = handle::<io::Error>()
            .retry(RetrySchedule::immediate(2))
            .unwrap();

        let mut calls = 0;
        let _ = policy.execute(|| -> Result<(), Fault> {
            calls += 1;
            Err(io::Error::new(io::ErrorKind::TimedOut, "slow").into())
        });
        assert_eq!(calls, 3);

        calls = 0;
        let _ = policy.execute(|| -> Result<(), Fault> {
            calls += 1;
            Err(StatusError(500).into())
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn handle_where_inspects_the_typed_error() {
        let policy = handle_where(|e: &StatusError| e.0 >= 500)
            .retry(RetrySchedule::immediate(1))
            .unwrap();

        let captured = policy.execute_and_capture(|| Err::<(), _>(StatusError(503).into()));
        assert_eq!(captured.attempts, 2);

        let captured = policy.execute_and_capture(|| Err::<(), _>(StatusError(404).into()));
        assert_eq!(captured.attempts, 1);
        assert_eq!(captured.termination, Termination::UnhandledFault);
    }

    #[test]
    fn fault_predicates_survive_the_transition() {
        let policy = handle::<io::Error>()
            .or_result(|status: &u16| *status == 503)
            .retry(RetrySchedule::immediate(1))
            .unwrap();

        let captured = policy.execute_and_capture(|| {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe").into())
        });
        assert_eq!(captured.attempts, 2);

        let captured = policy.execute_and_capture(|| Ok(503));
        assert_eq!(captured.attempts, 2);
        assert_eq!(captured.termination, Termination::ExhaustedHandleable);
        assert_eq!(captured.into_result().unwrap(), 503);
    }

    #[test]
    fn result_builder_accepts_faults_too() {
        let policy = handle_result(|status: &u16| *status >= 500)
            .or_fault(|f| f.to_string().contains("reset"))
            .or::<StatusError>()
            .retry(RetrySchedule::immediate(1))
            .unwrap();

        let captured = policy.execute_and_capture(|| Err(Fault::msg("connection reset")));
        assert_eq!(captured.attempts, 2);
        let captured = policy.execute_and_capture(|| Err(StatusError(418).into()));
        assert_eq!(captured.attempts, 2);
        let captured = policy.execute_and_capture(|| Err(Fault::msg("bad request")));
        assert_eq!(captured.attempts, 1);
    }
}
