//! Policy composition: nest policies outer-to-inner into one pipeline.
//!
//! `PolicyWrap[p0, p1, p2].execute(op)` runs
//! `p0.execute(|| p1.execute(|| p2.execute(op)))`, so the outermost policy
//! sees faults raised by inner policies as faults of the operation itself.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};

use super::{AsyncOperation, AsyncPolicy, SyncPolicy};
use crate::context::Context;
use crate::error::BuildError;
use crate::fault::Fault;

/// An ordered, outer-to-inner sequence of blocking policies.
pub struct PolicyWrap<T> {
    policies: Vec<Arc<dyn SyncPolicy<T>>>,
}

impl<T> PolicyWrap<T> {
    /// Wrap `policies`, the first being outermost.
    pub fn new(policies: Vec<Arc<dyn SyncPolicy<T>>>) -> Result<Self, BuildError> {
        if policies.len() < 2 {
            return Err(BuildError::WrapTooShort(policies.len()));
        }
        Ok(Self { policies })
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn execute<F>(&self, mut op: F) -> Result<T, Fault>
    where
        F: FnMut() -> Result<T, Fault>,
    {
        self.execute_with(&Context::new(), |_| op())
    }

    pub fn execute_with<F>(&self, ctx: &Context, mut op: F) -> Result<T, Fault>
    where
        F: FnMut(&Context) -> Result<T, Fault>,
    {
        nest(&self.policies, ctx, &mut op)
    }
}

fn nest<T>(
    policies: &[Arc<dyn SyncPolicy<T>>],
    ctx: &Context,
    op: &mut dyn FnMut(&Context) -> Result<T, Fault>,
) -> Result<T, Fault> {
    match policies.split_first() {
        Some((outer, inner)) => {
            outer.invoke(ctx, &mut |ctx: &Context| nest(inner, ctx, &mut *op))
        }
        None => op(ctx),
    }
}

impl<T> SyncPolicy<T> for PolicyWrap<T> {
    fn invoke(
        &self,
        ctx: &Context,
        op: &mut dyn FnMut(&Context) -> Result<T, Fault>,
    ) -> Result<T, Fault> {
        nest(&self.policies, ctx, op)
    }
}

impl<T> Clone for PolicyWrap<T> {
    fn clone(&self) -> Self {
        Self {
            policies: self.policies.clone(),
        }
    }
}

impl<T> std::fmt::Debug for PolicyWrap<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyWrap")
            .field("policies", &self.policies.len())
            .finish()
    }
}

/// `outer.wrap(inner)` for any blocking policy.
pub trait WrapExt<T>: SyncPolicy<T> + Sized + 'static {
    fn wrap<P>(self, inner: P) -> PolicyWrap<T>
    where
        P: SyncPolicy<T> + 'static,
    {
        PolicyWrap {
            policies: vec![Arc::new(self), Arc::new(inner)],
        }
    }
}

impl<T, P> WrapExt<T> for P where P: SyncPolicy<T> + 'static {}

// ─── Async ────────────────────────────────────────────────────────────────────

/// The async counterpart of [`PolicyWrap`].
pub struct AsyncPolicyWrap<T: Send + 'static> {
    policies: Arc<[Arc<dyn AsyncPolicy<T>>]>,
}

impl<T: Send + 'static> AsyncPolicyWrap<T> {
    pub fn new(policies: Vec<Arc<dyn AsyncPolicy<T>>>) -> Result<Self, BuildError> {
        if policies.len() < 2 {
            return Err(BuildError::WrapTooShort(policies.len()));
        }
        Ok(Self {
            policies: policies.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub async fn execute_async<F, Fut>(&self, op: F) -> Result<T, Fault>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<T, Fault>> + Send + 'static,
    {
        self.execute_async_with(Context::new(), super::async_operation(move |_| op()))
            .await
    }

    pub async fn execute_async_with(
        &self,
        ctx: Context,
        op: AsyncOperation<T>,
    ) -> Result<T, Fault> {
        nest_async(self.policies.clone(), 0, ctx, op).await
    }
}

fn nest_async<T: Send + 'static>(
    policies: Arc<[Arc<dyn AsyncPolicy<T>>]>,
    depth: usize,
    ctx: Context,
    op: AsyncOperation<T>,
) -> BoxFuture<'static, Result<T, Fault>> {
    let Some(outer) = policies.get(depth).cloned() else {
        return op(ctx);
    };
    let inner: AsyncOperation<T> =
        Arc::new(move |ctx: Context| nest_async(policies.clone(), depth + 1, ctx, op.clone()));
    async move { outer.invoke_async(ctx, inner).await }.boxed()
}

#[async_trait]
impl<T: Send + 'static> AsyncPolicy<T> for AsyncPolicyWrap<T> {
    async fn invoke_async(&self, ctx: Context, op: AsyncOperation<T>) -> Result<T, Fault> {
        nest_async(self.policies.clone(), 0, ctx, op).await
    }
}

impl<T: Send + 'static> Clone for AsyncPolicyWrap<T> {
    fn clone(&self) -> Self {
        Self {
            policies: self.policies.clone(),
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for AsyncPolicyWrap<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncPolicyWrap")
            .field("policies", &self.policies.len())
            .finish()
    }
}

/// `outer.wrap_async(inner)` for any async policy.
pub trait AsyncWrapExt<T: Send + 'static>: AsyncPolicy<T> + Sized + 'static {
    fn wrap_async<P>(self, inner: P) -> AsyncPolicyWrap<T>
    where
        P: AsyncPolicy<T> + 'static,
    {
        AsyncPolicyWrap {
            policies: Arc::from(vec![
                Arc::new(self) as Arc<dyn AsyncPolicy<T>>,
                Arc::new(inner) as Arc<dyn AsyncPolicy<T>>,
            ]),
        }
    }
}

impl<T, P> AsyncWrapExt<T> for P
where
    T: Send + 'static,
    P: AsyncPolicy<T> + 'static,
{
}
