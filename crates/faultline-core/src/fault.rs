//! Opaque capture of a failed attempt.

use std::error::Error as StdError;
use std::fmt;

use crate::error::{ExecutionCancelled, TimeoutRejected};

/// Whatever went wrong during one attempt.
///
/// A `Fault` owns the original error unchanged. Predicates classify it by
/// concrete type (`is`, `downcast_ref`), and callers get the original back
/// with `downcast`. Any `std::error::Error + Send + Sync + 'static` converts
/// into a `Fault` with `?` or `.into()`.
pub struct Fault {
    inner: anyhow::Error,
}

impl Fault {
    /// Capture an error value.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            inner: anyhow::Error::new(error),
        }
    }

    /// Capture an ad-hoc message with no underlying error type.
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self {
            inner: anyhow::Error::msg(message),
        }
    }

    /// Adopt an `anyhow::Error` produced elsewhere.
    pub fn from_anyhow(error: anyhow::Error) -> Self {
        Self { inner: error }
    }

    /// Returns `true` if the captured error is of type `E`.
    pub fn is<E>(&self) -> bool
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.inner.is::<E>()
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.inner.downcast_ref::<E>()
    }

    /// Recover the original error, or get the fault back if it is not an `E`.
    pub fn downcast<E>(self) -> Result<E, Self>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.inner.downcast::<E>().map_err(|inner| Self { inner })
    }

    /// Returns `true` if this fault was raised by a timeout policy.
    pub fn is_timeout(&self) -> bool {
        self.is::<TimeoutRejected>()
    }

    /// Returns `true` if the caller's cancellation token ended the execution.
    pub fn is_cancelled(&self) -> bool {
        self.is::<ExecutionCancelled>()
    }

    /// Borrow the captured error, e.g. to walk its `source()` chain.
    pub fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        AsRef::<dyn StdError + Send + Sync>::as_ref(&self.inner)
    }

    /// Hand the fault back to `anyhow`, keeping any attached context.
    pub fn into_anyhow(self) -> anyhow::Error {
        self.inner
    }
}

impl<E> From<E> for Fault
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl From<Fault> for Box<dyn StdError + Send + Sync + 'static> {
    fn from(fault: Fault) -> Self {
        fault.inner.into()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::time::Duration;

    use crate::policy::TimeoutStrategy;

    #[test]
    fn keeps_original_error() {
        let fault = Fault::from(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(fault.is::<io::Error>());
        assert_eq!(fault.to_string(), "reset");

        let original = fault.downcast::<io::Error>().unwrap();
        assert_eq!(original.kind(), io::ErrorKind::ConnectionReset);
    }

    #[test]
    fn downcast_to_wrong_type_returns_fault() {
        let fault = Fault::msg("boom");
        let fault = fault.downcast::<io::Error>().unwrap_err();
        assert_eq!(fault.to_string(), "boom");
    }

    #[test]
    fn classifies_engine_faults() {
        let timeout = Fault::new(TimeoutRejected {
            timeout: Duration::from_millis(5),
            strategy: TimeoutStrategy::Preemptive,
        });
        assert!(timeout.is_timeout());
        assert!(!timeout.is_cancelled());
        assert!(Fault::new(ExecutionCancelled).is_cancelled());
    }

    #[test]
    fn anyhow_context_survives_the_round_trip() {
        let cause = io::Error::new(io::ErrorKind::TimedOut, "node slow");
        let fault = Fault::from_anyhow(anyhow::Error::new(cause).context("fetching block 12"));
        assert_eq!(fault.to_string(), "fetching block 12");
        assert!(fault.is::<io::Error>());

        let source = fault.as_error().source().unwrap();
        assert_eq!(source.to_string(), "node slow");

        let error = fault.into_anyhow();
        assert_eq!(error.chain().count(), 2);
        assert_eq!(error.root_cause().to_string(), "node slow");
    }

    #[test]
    fn converts_into_boxed_error() {
        let boxed: Box<dyn StdError + Send + Sync> = Fault::new(ExecutionCancelled).into();
        assert_eq!(boxed.to_string(), "execution cancelled");
    }
}
