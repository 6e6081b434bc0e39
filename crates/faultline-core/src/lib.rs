//! faultline-core — retry, timeout and composition policies for fallible
//! operations.
//!
//! # Overview
//!
//! A policy wraps any operation returning `Result<T, Fault>` and decides,
//! attempt by attempt, whether to hand the outcome back or try again.
//!
//! - [`handle_fault`] / [`handle_result`] / [`handle`] — fluent builders
//!   that register which outcomes are handleable
//! - [`RetryPolicy`] / [`ResultRetryPolicy`] — re-run an operation per a
//!   [`RetrySchedule`]
//! - [`TimeoutPolicy`] — bound one call, cooperatively or preemptively
//! - [`PolicyWrap`] / [`AsyncPolicyWrap`] — nest policies outer-to-inner
//! - [`PolicyConfig`] — the same pipeline loaded from JSON
//!
//! # Architecture
//!
//! ```text
//!   handle_result(pred).retry(schedule) ──► ResultRetryPolicy ─┐
//!   TimeoutPolicy::new(d, strategy) ──────────────────────────┤
//!                                                             ▼
//!   caller ──► PolicyWrap[retry, timeout].execute(op) ──► retry ──► timeout ──► op
//! ```

pub mod builder;
pub mod config;
pub mod context;
pub mod error;
pub mod fault;
pub mod outcome;
pub mod policy;
pub mod predicate;

pub use builder::{
    handle, handle_fault, handle_result, handle_where, PolicyBuilder, ResultPolicyBuilder,
};
pub use config::{PolicyConfig, ScheduleConfig, TimeoutConfig};
pub use context::Context;
pub use error::{BuildError, ExecutionCancelled, TimeoutRejected};
pub use fault::Fault;
pub use outcome::{Classification, Outcome, PolicyResult, Termination};
pub use policy::{
    async_operation, timeout, AsyncOperation, AsyncPolicy, AsyncPolicyWrap, AsyncWrapExt,
    BackoffConfig, DelayProvider, PolicyWrap, ResultRetryPolicy, RetryPolicy, RetrySchedule,
    RetryState, SyncPolicy, TimeoutPolicy, TimeoutStrategy, WrapExt,
};
pub use predicate::{
    Classify, FaultPredicate, FaultPredicateSet, HandledPredicateSet, ResultPredicate,
};
