//! Retry policies driven by a predicate set and a wait schedule.
//!
//! Each execution walks a small state machine:
//! - `Attempting` → `Terminated`: outcome not handleable, or schedule exhausted
//! - `Attempting` → `Waiting`:    outcome handleable and a retry remains
//! - `Waiting` → `Attempting`:    the wait elapsed
//! - any → `Terminated(Cancelled)`: the context's token fired

use std::future::Future;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{async_operation, call_guarded, AsyncOperation, AsyncPolicy, RetrySchedule, SyncPolicy};
use crate::context::Context;
use crate::error::{BuildError, ExecutionCancelled};
use crate::fault::Fault;
use crate::outcome::{Outcome, PolicyResult, Termination};
use crate::predicate::{Classify, FaultPredicateSet, HandledPredicateSet};

/// How often a blocking wait checks the cancellation token.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Retry callback of a value-aware policy: `(outcome, wait, retry, context)`.
pub type OnRetry<T> = Arc<dyn Fn(&Outcome<T>, Duration, u32, &Context) + Send + Sync>;

/// Retry callback of a fault-only policy: `(fault, wait, retry, context)`.
pub type OnFaultRetry = Arc<dyn Fn(&Fault, Duration, u32, &Context) + Send + Sync>;

/// Where an execution is in its attempt sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// About to invoke the operation for the `attempt`-th time (1-based).
    Attempting { attempt: u32 },
    /// Sleeping before retry number `retry` (1-based).
    Waiting { retry: u32, delay: Duration },
    Terminated(Termination),
}

impl RetryState {
    /// Decide what follows the `attempt`-th attempt.
    fn after_attempt<T, C>(
        attempt: u32,
        outcome: &Outcome<T>,
        classifier: &C,
        schedule: &RetrySchedule,
        ctx: &Context,
    ) -> Self
    where
        C: Classify<T> + ?Sized,
    {
        if !classifier.handles(outcome) {
            return Self::Terminated(if outcome.is_success() {
                Termination::Success
            } else {
                Termination::UnhandledFault
            });
        }
        if ctx.is_cancelled() {
            return Self::Terminated(Termination::Cancelled);
        }
        match schedule.delay(attempt) {
            Some(delay) => Self::Waiting {
                retry: attempt,
                delay,
            },
            None => Self::Terminated(Termination::ExhaustedHandleable),
        }
    }
}

impl std::fmt::Display for RetryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Attempting { attempt } => write!(f, "attempting #{attempt}"),
            Self::Waiting { retry, delay } => {
                write!(f, "waiting {}ms before retry #{retry}", delay.as_millis())
            }
            Self::Terminated(termination) => write!(f, "terminated ({termination})"),
        }
    }
}

// ─── Engine ───────────────────────────────────────────────────────────────────

fn run_blocking<T, C>(
    schedule: &RetrySchedule,
    classifier: &C,
    notify: &dyn Fn(&Outcome<T>, Duration, u32, &Context),
    ctx: &Context,
    op: &mut dyn FnMut(&Context) -> Result<T, Fault>,
) -> PolicyResult<T>
where
    C: Classify<T> + ?Sized,
{
    let mut attempts = 0;
    let mut last = None;
    let mut state = RetryState::Attempting { attempt: 1 };
    loop {
        state = match state {
            RetryState::Attempting { attempt } if ctx.is_cancelled() => {
                tracing::debug!(attempt, "cancelled before attempt");
                RetryState::Terminated(Termination::Cancelled)
            }
            RetryState::Attempting { attempt } => {
                attempts = attempt;
                let outcome = Outcome::from(op(ctx));
                let next = RetryState::after_attempt(attempt, &outcome, classifier, schedule, ctx);
                if let RetryState::Waiting { retry, delay } = next {
                    log_retry(ctx, &outcome, retry, delay);
                    call_guarded("on_retry", || notify(&outcome, delay, retry, ctx));
                }
                last = Some(outcome);
                next
            }
            RetryState::Waiting { retry, delay } => {
                if wait_blocking(delay, ctx) {
                    RetryState::Attempting { attempt: retry + 1 }
                } else {
                    tracing::debug!(retry, "cancelled while waiting");
                    RetryState::Terminated(Termination::Cancelled)
                }
            }
            RetryState::Terminated(termination) => {
                return finish(ctx, last, attempts, termination);
            }
        };
    }
}

async fn run_async<T, C>(
    schedule: &RetrySchedule,
    classifier: &C,
    notify: &(dyn Fn(&Outcome<T>, Duration, u32, &Context) + Send + Sync),
    ctx: &Context,
    op: &AsyncOperation<T>,
) -> PolicyResult<T>
where
    T: Send + 'static,
    C: Classify<T> + Sync + ?Sized,
{
    let mut attempts = 0;
    let mut last = None;
    let mut state = RetryState::Attempting { attempt: 1 };
    loop {
        state = match state {
            RetryState::Attempting { attempt } if ctx.is_cancelled() => {
                tracing::debug!(attempt, "cancelled before attempt");
                RetryState::Terminated(Termination::Cancelled)
            }
            RetryState::Attempting { attempt } => {
                attempts = attempt;
                let attempt_result = tokio::select! {
                    biased;
                    _ = ctx.cancellation().cancelled() => None,
                    result = op(ctx.clone()) => Some(result),
                };
                match attempt_result {
                    None => {
                        tracing::debug!(attempt, "cancelled during attempt");
                        RetryState::Terminated(Termination::Cancelled)
                    }
                    Some(result) => {
                        let outcome = Outcome::from(result);
                        let next =
                            RetryState::after_attempt(attempt, &outcome, classifier, schedule, ctx);
                        if let RetryState::Waiting { retry, delay } = next {
                            log_retry(ctx, &outcome, retry, delay);
                            call_guarded("on_retry", || notify(&outcome, delay, retry, ctx));
                        }
                        last = Some(outcome);
                        next
                    }
                }
            }
            RetryState::Waiting { retry, delay } => {
                let completed = tokio::select! {
                    biased;
                    _ = ctx.cancellation().cancelled() => false,
                    _ = tokio::time::sleep(delay) => true,
                };
                if completed {
                    RetryState::Attempting { attempt: retry + 1 }
                } else {
                    tracing::debug!(retry, "cancelled while waiting");
                    RetryState::Terminated(Termination::Cancelled)
                }
            }
            RetryState::Terminated(termination) => {
                return finish(ctx, last, attempts, termination);
            }
        };
    }
}

/// Sleep for `delay` unless the token fires first. Returns `false` on cancel.
///
/// A delay too large to represent as a deadline waits for cancellation only.
fn wait_blocking(delay: Duration, ctx: &Context) -> bool {
    let deadline = Instant::now().checked_add(delay);
    loop {
        if ctx.is_cancelled() {
            return false;
        }
        let remaining = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return true;
                }
                deadline - now
            }
            None => CANCEL_POLL_INTERVAL,
        };
        thread::sleep(remaining.min(CANCEL_POLL_INTERVAL));
    }
}

fn log_retry<T>(ctx: &Context, outcome: &Outcome<T>, retry: u32, delay: Duration) {
    let operation = ctx.operation_key().unwrap_or("-");
    let delay_ms = delay.as_millis() as u64;
    match outcome.fault() {
        Some(fault) => tracing::warn!(
            retry,
            delay_ms,
            error = %fault,
            operation,
            "retrying operation"
        ),
        None => tracing::warn!(
            retry,
            delay_ms,
            operation,
            "retrying operation after handled result"
        ),
    }
}

fn finish<T>(
    ctx: &Context,
    last: Option<Outcome<T>>,
    attempts: u32,
    termination: Termination,
) -> PolicyResult<T> {
    let outcome = match (termination, last) {
        (Termination::Cancelled, _) | (_, None) => {
            return PolicyResult {
                outcome: Outcome::Faulted(Fault::new(ExecutionCancelled)),
                attempts,
                termination: Termination::Cancelled,
            };
        }
        (_, Some(outcome)) => outcome,
    };
    if termination == Termination::ExhaustedHandleable {
        tracing::warn!(
            attempts,
            operation = ctx.operation_key().unwrap_or("-"),
            "retries exhausted"
        );
    }
    PolicyResult {
        outcome,
        attempts,
        termination,
    }
}

// ─── Fault-only policy ────────────────────────────────────────────────────────

/// Retries operations whose fault matches a predicate.
///
/// Successful values always pass through, so one policy serves operations
/// of any value type.
#[derive(Clone)]
pub struct RetryPolicy {
    predicates: FaultPredicateSet,
    schedule: RetrySchedule,
    on_retry: Option<OnFaultRetry>,
}

impl RetryPolicy {
    pub(crate) fn new(
        predicates: FaultPredicateSet,
        schedule: RetrySchedule,
        on_retry: Option<OnFaultRetry>,
    ) -> Result<Self, BuildError> {
        if predicates.is_empty() {
            return Err(BuildError::NoPredicates);
        }
        Ok(Self {
            predicates,
            schedule,
            on_retry,
        })
    }

    pub fn schedule(&self) -> &RetrySchedule {
        &self.schedule
    }

    /// Run `op` until it succeeds, fails unhandled, or the schedule runs out.
    pub fn execute<T, F>(&self, mut op: F) -> Result<T, Fault>
    where
        F: FnMut() -> Result<T, Fault>,
    {
        self.execute_with(&Context::new(), |_| op())
    }

    pub fn execute_with<T, F>(&self, ctx: &Context, op: F) -> Result<T, Fault>
    where
        F: FnMut(&Context) -> Result<T, Fault>,
    {
        self.execute_and_capture_with(ctx, op).into_result()
    }

    /// Like [`execute`](Self::execute), but returns the final outcome as data.
    pub fn execute_and_capture<T, F>(&self, mut op: F) -> PolicyResult<T>
    where
        F: FnMut() -> Result<T, Fault>,
    {
        self.execute_and_capture_with(&Context::new(), |_| op())
    }

    pub fn execute_and_capture_with<T, F>(&self, ctx: &Context, mut op: F) -> PolicyResult<T>
    where
        F: FnMut(&Context) -> Result<T, Fault>,
    {
        let notify = |outcome: &Outcome<T>, delay: Duration, retry: u32, ctx: &Context| {
            self.notify(outcome, delay, retry, ctx)
        };
        run_blocking(&self.schedule, &self.predicates, &notify, ctx, &mut op)
    }

    pub async fn execute_async<T, F, Fut>(&self, op: F) -> Result<T, Fault>
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, Fault>> + Send + 'static,
    {
        self.execute_async_with(Context::new(), async_operation(move |_| op()))
            .await
    }

    pub async fn execute_async_with<T>(
        &self,
        ctx: Context,
        op: AsyncOperation<T>,
    ) -> Result<T, Fault>
    where
        T: Send + 'static,
    {
        self.execute_and_capture_async(ctx, op).await.into_result()
    }

    pub async fn execute_and_capture_async<T>(
        &self,
        ctx: Context,
        op: AsyncOperation<T>,
    ) -> PolicyResult<T>
    where
        T: Send + 'static,
    {
        let notify = |outcome: &Outcome<T>, delay: Duration, retry: u32, ctx: &Context| {
            self.notify(outcome, delay, retry, ctx)
        };
        run_async(&self.schedule, &self.predicates, &notify, &ctx, &op).await
    }

    fn notify<T>(&self, outcome: &Outcome<T>, delay: Duration, retry: u32, ctx: &Context) {
        if let (Some(on_retry), Some(fault)) = (&self.on_retry, outcome.fault()) {
            on_retry(fault, delay, retry, ctx);
        }
    }
}

impl<T> SyncPolicy<T> for RetryPolicy {
    fn invoke(
        &self,
        ctx: &Context,
        op: &mut dyn FnMut(&Context) -> Result<T, Fault>,
    ) -> Result<T, Fault> {
        self.execute_with(ctx, op)
    }
}

#[async_trait]
impl<T: Send + 'static> AsyncPolicy<T> for RetryPolicy {
    async fn invoke_async(&self, ctx: Context, op: AsyncOperation<T>) -> Result<T, Fault> {
        self.execute_async_with(ctx, op).await
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("predicates", &self.predicates)
            .field("schedule", &self.schedule)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

// ─── Value-aware policy ───────────────────────────────────────────────────────

/// Retries operations producing `T` whose fault or value matches a predicate.
///
/// A handled value that survives exhaustion is returned as `Ok`; the engine
/// never turns an unacceptable value into a fault.
pub struct ResultRetryPolicy<T> {
    predicates: HandledPredicateSet<T>,
    schedule: RetrySchedule,
    on_retry: Option<OnRetry<T>>,
}

impl<T> ResultRetryPolicy<T> {
    pub(crate) fn new(
        predicates: HandledPredicateSet<T>,
        schedule: RetrySchedule,
        on_retry: Option<OnRetry<T>>,
    ) -> Result<Self, BuildError> {
        if predicates.is_empty() {
            return Err(BuildError::NoPredicates);
        }
        Ok(Self {
            predicates,
            schedule,
            on_retry,
        })
    }

    pub fn schedule(&self) -> &RetrySchedule {
        &self.schedule
    }

    pub fn execute<F>(&self, mut op: F) -> Result<T, Fault>
    where
        F: FnMut() -> Result<T, Fault>,
    {
        self.execute_with(&Context::new(), |_| op())
    }

    pub fn execute_with<F>(&self, ctx: &Context, op: F) -> Result<T, Fault>
    where
        F: FnMut(&Context) -> Result<T, Fault>,
    {
        self.execute_and_capture_with(ctx, op).into_result()
    }

    pub fn execute_and_capture<F>(&self, mut op: F) -> PolicyResult<T>
    where
        F: FnMut() -> Result<T, Fault>,
    {
        self.execute_and_capture_with(&Context::new(), |_| op())
    }

    pub fn execute_and_capture_with<F>(&self, ctx: &Context, mut op: F) -> PolicyResult<T>
    where
        F: FnMut(&Context) -> Result<T, Fault>,
    {
        let notify = |outcome: &Outcome<T>, delay: Duration, retry: u32, ctx: &Context| {
            self.notify(outcome, delay, retry, ctx)
        };
        run_blocking(&self.schedule, &self.predicates, &notify, ctx, &mut op)
    }

    fn notify(&self, outcome: &Outcome<T>, delay: Duration, retry: u32, ctx: &Context) {
        if let Some(on_retry) = &self.on_retry {
            on_retry(outcome, delay, retry, ctx);
        }
    }
}

impl<T: Send + 'static> ResultRetryPolicy<T> {
    pub async fn execute_async<F, Fut>(&self, op: F) -> Result<T, Fault>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, Fault>> + Send + 'static,
    {
        self.execute_async_with(Context::new(), async_operation(move |_| op()))
            .await
    }

    pub async fn execute_async_with(
        &self,
        ctx: Context,
        op: AsyncOperation<T>,
    ) -> Result<T, Fault> {
        self.execute_and_capture_async(ctx, op).await.into_result()
    }

    pub async fn execute_and_capture_async(
        &self,
        ctx: Context,
        op: AsyncOperation<T>,
    ) -> PolicyResult<T> {
        let notify = |outcome: &Outcome<T>, delay: Duration, retry: u32, ctx: &Context| {
            self.notify(outcome, delay, retry, ctx)
        };
        run_async(&self.schedule, &self.predicates, &notify, &ctx, &op).await
    }
}

impl<T> SyncPolicy<T> for ResultRetryPolicy<T> {
    fn invoke(
        &self,
        ctx: &Context,
        op: &mut dyn FnMut(&Context) -> Result<T, Fault>,
    ) -> Result<T, Fault> {
        self.execute_with(ctx, op)
    }
}

#[async_trait]
impl<T: Send + 'static> AsyncPolicy<T> for ResultRetryPolicy<T> {
    async fn invoke_async(&self, ctx: Context, op: AsyncOperation<T>) -> Result<T, Fault> {
        self.execute_async_with(ctx, op).await
    }
}

impl<T> Clone for ResultRetryPolicy<T> {
    fn clone(&self) -> Self {
        Self {
            predicates: self.predicates.clone(),
            schedule: self.schedule.clone(),
            on_retry: self.on_retry.clone(),
        }
    }
}

impl<T> std::fmt::Debug for ResultRetryPolicy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultRetryPolicy")
            .field("predicates", &self.predicates)
            .field("schedule", &self.schedule)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}
