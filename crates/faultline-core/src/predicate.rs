//! Handled-outcome predicates and their OR-combination.

use std::sync::Arc;

use crate::fault::Fault;
use crate::outcome::{Classification, Outcome};

/// Decides whether a captured fault is handleable.
pub type FaultPredicate = Arc<dyn Fn(&Fault) -> bool + Send + Sync>;

/// Decides whether a successfully produced value is unacceptable.
pub type ResultPredicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Anything that can judge an attempt's outcome.
pub trait Classify<T> {
    fn classify(&self, outcome: &Outcome<T>) -> Classification;

    fn handles(&self, outcome: &Outcome<T>) -> bool {
        self.classify(outcome).is_handled()
    }
}

/// Ordered fault predicates, OR-combined.
#[derive(Clone, Default)]
pub struct FaultPredicateSet {
    predicates: Vec<FaultPredicate>,
}

impl FaultPredicateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, predicate: FaultPredicate) {
        self.predicates.push(predicate);
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Returns `true` if any predicate matches.
    pub fn matches(&self, fault: &Fault) -> bool {
        self.predicates.iter().any(|p| p(fault))
    }
}

/// A fault-only set never objects to a value, whatever its type.
impl<T> Classify<T> for FaultPredicateSet {
    fn classify(&self, outcome: &Outcome<T>) -> Classification {
        match outcome {
            Outcome::Faulted(fault) if self.matches(fault) => Classification::HandledFault,
            _ => Classification::Unhandled,
        }
    }
}

impl std::fmt::Debug for FaultPredicateSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultPredicateSet")
            .field("predicates", &self.predicates.len())
            .finish()
    }
}

/// Fault predicates plus result predicates for values of type `T`.
///
/// An outcome is handleable iff any predicate of the matching kind returns
/// `true`.
pub struct HandledPredicateSet<T> {
    faults: FaultPredicateSet,
    results: Vec<ResultPredicate<T>>,
}

impl<T> HandledPredicateSet<T> {
    pub fn new() -> Self {
        Self::from_faults(FaultPredicateSet::new())
    }

    /// Start from an existing fault-only set.
    pub fn from_faults(faults: FaultPredicateSet) -> Self {
        Self {
            faults,
            results: Vec::new(),
        }
    }

    pub fn push_fault(&mut self, predicate: FaultPredicate) {
        self.faults.push(predicate);
    }

    pub fn push_result(&mut self, predicate: ResultPredicate<T>) {
        self.results.push(predicate);
    }

    /// Total number of registered predicates of both kinds.
    pub fn len(&self) -> usize {
        self.faults.len() + self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Classify<T> for HandledPredicateSet<T> {
    fn classify(&self, outcome: &Outcome<T>) -> Classification {
        match outcome {
            Outcome::Success(value) if self.results.iter().any(|p| p(value)) => {
                Classification::HandledResult
            }
            Outcome::Success(_) => Classification::Unhandled,
            Outcome::Faulted(fault) if self.faults.matches(fault) => Classification::HandledFault,
            Outcome::Faulted(_) => Classification::Unhandled,
        }
    }
}

impl<T> Default for HandledPredicateSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for HandledPredicateSet<T> {
    fn clone(&self) -> Self {
        Self {
            faults: self.faults.clone(),
            results: self.results.clone(),
        }
    }
}

impl<T> std::fmt::Debug for HandledPredicateSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandledPredicateSet")
            .field("faults", &self.faults.len())
            .field("results", &self.results.len())
            .finish()
    }
}
