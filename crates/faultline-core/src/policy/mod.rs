//! Policy engine: composable wrappers around fallible operations.
//!
//! A wrap nests policies outer-to-inner:
//! ```text
//! execute(op) → [RetryPolicy] → [TimeoutPolicy] → op
//! ```
//!
//! Every policy runs synchronously through [`SyncPolicy`] and on tokio
//! through [`AsyncPolicy`].

pub mod retry;
pub mod schedule;
pub mod timeout;
pub mod wrap;

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};

use crate::context::Context;
use crate::fault::Fault;

pub use retry::{ResultRetryPolicy, RetryPolicy, RetryState};
pub use schedule::{BackoffConfig, DelayProvider, RetrySchedule};
pub use timeout::{timeout, TimeoutPolicy, TimeoutStrategy};
pub use wrap::{AsyncPolicyWrap, AsyncWrapExt, PolicyWrap, WrapExt};

/// An async operation as the engine stores it: callable any number of
/// times, each call producing an owned future.
pub type AsyncOperation<T> =
    Arc<dyn Fn(Context) -> BoxFuture<'static, Result<T, Fault>> + Send + Sync>;

/// Box a closure returning a future into an [`AsyncOperation`].
pub fn async_operation<T, F, Fut>(f: F) -> AsyncOperation<T>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, Fault>> + Send + 'static,
{
    Arc::new(move |ctx| f(ctx).boxed())
}

/// A policy that runs an operation on the calling thread.
///
/// # Thread Safety
/// Implementations hold no per-call state, so one instance may serve
/// concurrent executions.
pub trait SyncPolicy<T>: Send + Sync {
    fn invoke(
        &self,
        ctx: &Context,
        op: &mut dyn FnMut(&Context) -> Result<T, Fault>,
    ) -> Result<T, Fault>;
}

/// The async counterpart of [`SyncPolicy`].
///
/// The trait is object-safe and can be stored as `Arc<dyn AsyncPolicy<T>>`.
#[async_trait]
pub trait AsyncPolicy<T: Send + 'static>: Send + Sync {
    async fn invoke_async(&self, ctx: Context, op: AsyncOperation<T>) -> Result<T, Fault>;
}

/// Run a user callback, logging instead of unwinding if it panics.
pub(crate) fn call_guarded(callback: &str, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::warn!(callback, "policy callback panicked; ignoring");
    }
}
