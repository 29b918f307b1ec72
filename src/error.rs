//! Error taxonomy for the reconciliation engine.
//!
//! Library code returns [`Error`]; the binary entry point converts these
//! into `anyhow::Error` at the CLI boundary.
use std::fmt;

use thiserror::Error;

/// The four fatal-or-degrading error kinds the engine can raise, plus a
/// `Many` variant used to report several independent failures at once
/// (see [`ErrorBag`]).
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP transport failure: non-2xx status or connection failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Unexpected JSON shape, or an unsupported cluster major version.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Unknown cluster reference, unparseable regex, or other
    /// configuration mistake. Fatal for the whole task.
    #[error("config error: {0}")]
    Config(String),

    /// Degraded data (empty mapping, missing `properties`); callers are
    /// expected to fall back rather than abort.
    #[error("data error: {0}")]
    Data(String),

    /// A worker panicked; the payload (if a string) is included.
    #[error("panic recovered: {0}")]
    Panic(String),

    /// Several independent errors collected from concurrent workers.
    #[error("{0}")]
    Many(ErrorBag),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Protocol(err.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Append-only accumulator of errors, for operations that keep going
/// after a partial failure (e.g. `sync_diff`'s three independent passes,
/// or the orchestrator's per-pair fan-out).
///
/// Mirrors the original `utils.Errs` type: `ret()`/`into_result()` yields
/// `None`/`Ok(())` iff nothing was ever added.
#[derive(Debug, Default)]
pub struct ErrorBag {
    errors: Vec<Error>,
}

impl ErrorBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: Error) {
        self.errors.push(err);
    }

    /// Absorbs another bag's errors into this one.
    pub fn extend(&mut self, other: ErrorBag) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Error> {
        self.errors.iter()
    }

    /// Returns `Ok(())` if empty, else `Err(Error::Many(self))`.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Many(self))
        }
    }

    /// True if any collected error matches the given predicate.
    pub fn contains(&self, pred: impl Fn(&Error) -> bool) -> bool {
        self.errors.iter().any(pred)
    }
}

impl fmt::Display for ErrorBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        write!(f, "{} error(s): {}", parts.len(), parts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bag_is_ok() {
        let bag = ErrorBag::new();
        assert!(bag.into_result().is_ok());
    }

    #[test]
    fn nonempty_bag_is_err() {
        let mut bag = ErrorBag::new();
        bag.push(Error::Data("missing properties".into()));
        assert_eq!(bag.len(), 1);
        assert!(bag.into_result().is_err());
    }

    #[test]
    fn contains_finds_matching_variant() {
        let mut bag = ErrorBag::new();
        bag.push(Error::Transport("boom".into()));
        assert!(bag.contains(|e| matches!(e, Error::Transport(_))));
        assert!(!bag.contains(|e| matches!(e, Error::Config(_))));
    }
}
