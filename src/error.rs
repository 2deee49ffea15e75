//! Error types for the collector.

use thiserror::Error;

/// Result type alias for collector operations.
pub type Result<T> = std::result::Result<T, CollectError>;

/// Main error type for the collection pipeline.
///
/// The variants map to how the pipeline reacts: `Config` and `Fatal` stop the
/// run before or during collection, `RetriesExhausted` degrades a single
/// producer while its siblings keep going.
#[derive(Error, Debug)]
pub enum CollectError {
    /// Misconfigured run, rejected before any listing call is made.
    #[error("configuration error: {0}")]
    Config(String),

    /// A broken pipeline primitive. The run cannot produce safe results and
    /// must stop rather than emit partial accounting data.
    #[error("fatal: {0}")]
    Fatal(String),

    /// A listing call that used up its whole retry budget.
    #[error("listing {kind} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        kind: &'static str,
        attempts: u32,
        last_error: anyhow::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CollectError {
    /// Whether this error must abort the whole run instead of degrading a
    /// single producer.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CollectError::Fatal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_class_is_limited_to_fatal_variant() {
        assert!(CollectError::Fatal("broken limiter".into()).is_fatal());
        assert!(!CollectError::Config("both window styles".into()).is_fatal());
        assert!(!CollectError::RetriesExhausted {
            kind: "images",
            attempts: 3,
            last_error: anyhow::anyhow!("boom"),
        }
        .is_fatal());
    }

    #[test]
    fn retries_exhausted_reports_kind_and_budget() {
        let err = CollectError::RetriesExhausted {
            kind: "shares",
            attempts: 3,
            last_error: anyhow::anyhow!("API request failed: 503"),
        };
        let msg = err.to_string();
        assert!(msg.contains("shares"));
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("503"));
    }
}
