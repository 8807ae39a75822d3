//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

// == Load Error ==
/// Failure reported by a loader while computing a value.
///
/// The collaborator's error is kept behind an `Arc` so one failure can be
/// handed to every waiter of a coalesced computation.
#[derive(Clone)]
pub struct LoadError {
    inner: Arc<anyhow::Error>,
}

impl LoadError {
    /// Wraps any error produced by a loader.
    pub fn new<E>(error: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self {
            inner: Arc::new(error.into()),
        }
    }

    /// Creates a load error from a plain message.
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self::new(anyhow::Error::msg(message))
    }

    /// Returns the underlying collaborator error.
    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }
}

impl From<anyhow::Error> for LoadError {
    fn from(error: anyhow::Error) -> Self {
        Self::new(error)
    }
}

impl fmt::Debug for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.inner, f)
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.inner, f)
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

// == Cache Error Enum ==
/// Unified error type for the cache engine.
///
/// `Clone` so that a single failure can resolve every waiter of a shared load.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// The loader failed to produce a value
    #[error("Load failed: {0}")]
    Load(#[from] LoadError),

    /// Invalid configuration detected while building a cache
    #[error("Invalid cache configuration: {0}")]
    CapacityConfig(String),

    /// The computation went away before producing a result
    #[error("Computation cancelled before completion")]
    Cancelled,
}

impl CacheError {
    /// Returns the loader failure, if this error carries one.
    pub fn as_load_error(&self) -> Option<&LoadError> {
        match self {
            CacheError::Load(error) => Some(error),
            _ => None,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_display_passes_through() {
        let error = LoadError::msg("database unavailable");
        assert_eq!(error.to_string(), "database unavailable");

        let wrapped = CacheError::from(error);
        assert_eq!(wrapped.to_string(), "Load failed: database unavailable");
    }

    #[test]
    fn test_load_error_clones_share_source() {
        let error = LoadError::new(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "row missing",
        ));
        let copy = error.clone();

        assert!(Arc::ptr_eq(&error.inner, &copy.inner));
        assert!(copy.inner().downcast_ref::<std::io::Error>().is_some());
    }

    #[test]
    fn test_as_load_error() {
        let error = CacheError::Load(LoadError::msg("boom"));
        assert!(error.as_load_error().is_some());
        assert!(CacheError::Cancelled.as_load_error().is_none());
        assert!(CacheError::CapacityConfig("bad".into())
            .as_load_error()
            .is_none());
    }
}
