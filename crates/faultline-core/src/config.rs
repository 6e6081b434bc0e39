//! Declarative policy configuration.
//!
//! Durations are whole milliseconds. Counts and durations are unsigned, so
//! a negative value fails to parse and surfaces as [`BuildError::Config`].
//!
//! ```json
//! {
//!   "retry":   { "kind": "fixed", "wait_ms": [1000, 2000, 3000] },
//!   "timeout": { "timeout_ms": 500, "strategy": "preemptive" }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::builder::PolicyBuilder;
use crate::error::BuildError;
use crate::policy::{
    AsyncPolicy, AsyncPolicyWrap, BackoffConfig, PolicyWrap, RetryPolicy, RetrySchedule,
    SyncPolicy, TimeoutPolicy, TimeoutStrategy,
};

/// A retry schedule as configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleConfig {
    /// One explicit wait per retry.
    Fixed { wait_ms: Vec<u64> },
    /// `retries` retries with the same wait.
    Constant { retries: u32, wait_ms: u64 },
    /// Capped exponential backoff.
    Exponential {
        max_retries: u32,
        initial_backoff_ms: u64,
        max_backoff_ms: u64,
        #[serde(default = "default_multiplier")]
        multiplier: f64,
        #[serde(default)]
        jitter_fraction: f64,
    },
}

fn default_multiplier() -> f64 {
    2.0
}

impl ScheduleConfig {
    pub fn build(&self) -> Result<RetrySchedule, BuildError> {
        match self {
            Self::Fixed { wait_ms } => Ok(RetrySchedule::durations(
                wait_ms.iter().copied().map(Duration::from_millis),
            )),
            Self::Constant { retries, wait_ms } => Ok(RetrySchedule::constant(
                *retries,
                Duration::from_millis(*wait_ms),
            )),
            Self::Exponential {
                max_retries,
                initial_backoff_ms,
                max_backoff_ms,
                multiplier,
                jitter_fraction,
            } => RetrySchedule::exponential(BackoffConfig {
                max_retries: *max_retries,
                initial_backoff: Duration::from_millis(*initial_backoff_ms),
                max_backoff: Duration::from_millis(*max_backoff_ms),
                multiplier: *multiplier,
                jitter_fraction: *jitter_fraction,
            }),
        }
    }
}

/// A timeout as configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub timeout_ms: u64,
    /// Defaults to cooperative.
    #[serde(default)]
    pub strategy: TimeoutStrategy,
}

impl TimeoutConfig {
    pub fn build(&self) -> Result<TimeoutPolicy, BuildError> {
        TimeoutPolicy::new(Duration::from_millis(self.timeout_ms), self.strategy)
    }
}

/// Retry and timeout settings for one pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub retry: Option<ScheduleConfig>,
    #[serde(default)]
    pub timeout: Option<TimeoutConfig>,
}

impl PolicyConfig {
    pub fn from_json(json: &str) -> Result<Self, BuildError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn retry_schedule(&self) -> Result<Option<RetrySchedule>, BuildError> {
        self.retry.as_ref().map(ScheduleConfig::build).transpose()
    }

    pub fn timeout_policy(&self) -> Result<Option<TimeoutPolicy>, BuildError> {
        self.timeout.as_ref().map(TimeoutConfig::build).transpose()
    }

    fn parts(&self, builder: PolicyBuilder) -> Result<Parts, BuildError> {
        let retry = match self.retry_schedule()? {
            Some(schedule) => Some(builder.retry(schedule)?),
            None => None,
        };
        let timeout = self.timeout_policy()?;
        if retry.is_none() && timeout.is_none() {
            return Err(BuildError::EmptyConfig);
        }
        Ok(Parts { retry, timeout })
    }

    /// Build a blocking pipeline: retry (with `builder`'s predicates) outside
    /// the timeout, or whichever of the two is configured.
    pub fn build_pipeline<T: 'static>(
        &self,
        builder: PolicyBuilder,
    ) -> Result<Arc<dyn SyncPolicy<T>>, BuildError> {
        let pipeline: Arc<dyn SyncPolicy<T>> = match self.parts(builder)? {
            Parts {
                retry: Some(retry),
                timeout: Some(timeout),
            } => Arc::new(PolicyWrap::new(vec![
                Arc::new(retry) as Arc<dyn SyncPolicy<T>>,
                Arc::new(timeout),
            ])?),
            Parts {
                retry: Some(retry),
                ..
            } => Arc::new(retry),
            Parts {
                timeout: Some(timeout),
                ..
            } => Arc::new(timeout),
            Parts { .. } => return Err(BuildError::EmptyConfig),
        };
        Ok(pipeline)
    }

    /// The async counterpart of [`build_pipeline`](Self::build_pipeline).
    pub fn build_async_pipeline<T: Send + 'static>(
        &self,
        builder: PolicyBuilder,
    ) -> Result<Arc<dyn AsyncPolicy<T>>, BuildError> {
        let pipeline: Arc<dyn AsyncPolicy<T>> = match self.parts(builder)? {
            Parts {
                retry: Some(retry),
                timeout: Some(timeout),
            } => Arc::new(AsyncPolicyWrap::new(vec![
                Arc::new(retry) as Arc<dyn AsyncPolicy<T>>,
                Arc::new(timeout),
            ])?),
            Parts {
                retry: Some(retry),
                ..
            } => Arc::new(retry),
            Parts {
                timeout: Some(timeout),
                ..
            } => Arc::new(timeout),
            Parts { .. } => return Err(BuildError::EmptyConfig),
        };
        Ok(pipeline)
    }
}

struct Parts {
    retry: Option<RetryPolicy>,
    timeout: Option<TimeoutPolicy>,
}
