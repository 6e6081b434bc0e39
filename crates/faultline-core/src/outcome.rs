//! Attempt outcomes and how an execution ended.

use crate::fault::Fault;

/// The result of one attempt: a produced value or a captured fault.
#[derive(Debug)]
pub enum Outcome<T> {
    Success(T),
    Faulted(Fault),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self, Self::Faulted(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Faulted(_) => None,
        }
    }

    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Self::Success(_) => None,
            Self::Faulted(fault) => Some(fault),
        }
    }

    pub fn into_result(self) -> Result<T, Fault> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Faulted(fault) => Err(fault),
        }
    }
}

impl<T> From<Result<T, Fault>> for Outcome<T> {
    fn from(result: Result<T, Fault>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(fault) => Self::Faulted(fault),
        }
    }
}

/// How a predicate set judged an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// No predicate matched; the outcome is final.
    Unhandled,
    /// A fault predicate matched.
    HandledFault,
    /// A result predicate matched a successfully produced value.
    HandledResult,
}

impl Classification {
    pub fn is_handled(self) -> bool {
        !matches!(self, Self::Unhandled)
    }
}

/// Why a retry execution stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// A value no result predicate objected to.
    Success,
    /// A fault no fault predicate matched.
    UnhandledFault,
    /// The schedule ran out while the outcome was still handleable.
    ExhaustedHandleable,
    /// The caller's cancellation token fired.
    Cancelled,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::UnhandledFault => write!(f, "unhandled-fault"),
            Self::ExhaustedHandleable => write!(f, "exhausted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A whole execution, captured as data instead of raised.
#[derive(Debug)]
pub struct PolicyResult<T> {
    /// The final outcome.
    pub outcome: Outcome<T>,
    /// Number of times the operation was invoked.
    pub attempts: u32,
    pub termination: Termination,
}

impl<T> PolicyResult<T> {
    /// Convert to the `execute` contract: faults become `Err`, values
    /// (including handled-but-exhausted ones) become `Ok`.
    pub fn into_result(self) -> Result<T, Fault> {
        self.outcome.into_result()
    }
}
