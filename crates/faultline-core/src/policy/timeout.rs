//! Timeout policy: bound the wall-clock time of a single operation call.
//!
//! - `Cooperative`: the operation's context token fires at the deadline.
//!   Async callers get `TimeoutRejected` at once while the spawned task winds
//!   down on its own; blocking callers get it when the operation yields.
//! - `Preemptive`: async futures are dropped at the deadline. A blocking
//!   call cannot be interrupted, so an overrunning result is discarded.

use std::future::Future;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{async_operation, call_guarded, AsyncOperation, AsyncPolicy, SyncPolicy};
use crate::context::Context;
use crate::error::{BuildError, ExecutionCancelled, TimeoutRejected};
use crate::fault::Fault;

/// How a timeout is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutStrategy {
    /// Signal the operation's cancellation token and rely on it to stop.
    #[default]
    Cooperative,
    /// Abandon the operation without its cooperation.
    Preemptive,
}

impl std::fmt::Display for TimeoutStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cooperative => write!(f, "cooperative"),
            Self::Preemptive => write!(f, "preemptive"),
        }
    }
}

/// Called with the execution context and the configured timeout when a
/// call is rejected.
pub type OnTimeout = Arc<dyn Fn(&Context, Duration) + Send + Sync>;

/// Shorthand for [`TimeoutPolicy::new`].
pub fn timeout(timeout: Duration, strategy: TimeoutStrategy) -> Result<TimeoutPolicy, BuildError> {
    TimeoutPolicy::new(timeout, strategy)
}

/// Races each call against a deadline.
#[derive(Clone)]
pub struct TimeoutPolicy {
    timeout: Duration,
    strategy: TimeoutStrategy,
    on_timeout: Option<OnTimeout>,
}

impl TimeoutPolicy {
    pub fn new(timeout: Duration, strategy: TimeoutStrategy) -> Result<Self, BuildError> {
        if timeout.is_zero() {
            return Err(BuildError::InvalidTimeout(
                "timeout must be greater than zero".into(),
            ));
        }
        Ok(Self {
            timeout,
            strategy,
            on_timeout: None,
        })
    }

    pub fn cooperative(timeout: Duration) -> Result<Self, BuildError> {
        Self::new(timeout, TimeoutStrategy::Cooperative)
    }

    pub fn preemptive(timeout: Duration) -> Result<Self, BuildError> {
        Self::new(timeout, TimeoutStrategy::Preemptive)
    }

    /// Invoke `callback` whenever a call is rejected.
    pub fn with_on_timeout<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Context, Duration) + Send + Sync + 'static,
    {
        self.on_timeout = Some(Arc::new(callback));
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn strategy(&self) -> TimeoutStrategy {
        self.strategy
    }

    pub fn execute<T, F>(&self, op: F) -> Result<T, Fault>
    where
        F: FnOnce() -> Result<T, Fault>,
    {
        self.execute_with(&Context::new(), |_| op())
    }

    /// Run `op` on the calling thread.
    ///
    /// Any call that runs for the full timeout or longer yields
    /// `TimeoutRejected`, whatever it returned.
    pub fn execute_with<T, F>(&self, ctx: &Context, op: F) -> Result<T, Fault>
    where
        F: FnOnce(&Context) -> Result<T, Fault>,
    {
        let timed = ctx.child();
        let watchdog = match self.strategy {
            TimeoutStrategy::Cooperative => {
                Some(Watchdog::arm(self.timeout, timed.cancellation().clone()))
            }
            TimeoutStrategy::Preemptive => None,
        };

        let started = Instant::now();
        let result = op(&timed);
        let fired = watchdog.map_or(false, Watchdog::disarm);

        if fired || started.elapsed() >= self.timeout {
            return Err(self.reject(ctx));
        }
        result
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
        let timed = ctx.child();
        match self.strategy {
            TimeoutStrategy::Preemptive => {
                match tokio::time::timeout(self.timeout, op(timed.clone())).await {
                    Ok(result) => result,
                    Err(_elapsed) => {
                        timed.cancellation().cancel();
                        Err(self.reject(&ctx))
                    }
                }
            }
            TimeoutStrategy::Cooperative => {
                // Dropping the handle on timeout detaches the task.
                let mut task = tokio::spawn(op(timed.clone()));
                tokio::select! {
                    joined = &mut task => match joined {
                        Ok(result) => result,
                        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                        Err(_) => Err(Fault::new(ExecutionCancelled)),
                    },
                    _ = tokio::time::sleep(self.timeout) => {
                        timed.cancellation().cancel();
                        Err(self.reject(&ctx))
                    }
                }
            }
        }
    }

    fn reject(&self, ctx: &Context) -> Fault {
        tracing::warn!(
            timeout_ms = self.timeout.as_millis() as u64,
            strategy = %self.strategy,
            operation = ctx.operation_key().unwrap_or("-"),
            "operation timed out"
        );
        if let Some(on_timeout) = &self.on_timeout {
            call_guarded("on_timeout", || on_timeout(ctx, self.timeout));
        }
        Fault::new(TimeoutRejected {
            timeout: self.timeout,
            strategy: self.strategy,
        })
    }
}

impl<T> SyncPolicy<T> for TimeoutPolicy {
    fn invoke(
        &self,
        ctx: &Context,
        op: &mut dyn FnMut(&Context) -> Result<T, Fault>,
    ) -> Result<T, Fault> {
        self.execute_with(ctx, op)
    }
}

#[async_trait]
impl<T: Send + 'static> AsyncPolicy<T> for TimeoutPolicy {
    async fn invoke_async(&self, ctx: Context, op: AsyncOperation<T>) -> Result<T, Fault> {
        self.execute_async_with(ctx, op).await
    }
}

impl std::fmt::Debug for TimeoutPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutPolicy")
            .field("timeout", &self.timeout)
            .field("strategy", &self.strategy)
            .field("on_timeout", &self.on_timeout.is_some())
            .finish()
    }
}

/// Cancels a token unless disarmed before the deadline.
struct Watchdog {
    disarm: mpsc::Sender<()>,
    handle: thread::JoinHandle<bool>,
}

impl Watchdog {
    fn arm(timeout: Duration, token: CancellationToken) -> Self {
        let (disarm, armed) = mpsc::channel::<()>();
        let handle = thread::spawn(move || match armed.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                token.cancel();
                true
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
        });
        Self { disarm, handle }
    }

    /// Returns `true` if the deadline passed first.
    fn disarm(self) -> bool {
        drop(self.disarm);
        self.handle.join().unwrap_or(false)
    }
}
