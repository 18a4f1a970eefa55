//! Admission decisions and the rejection contract.

/// Default HTTP status served to throttled callers.
pub const DEFAULT_STATUS_CODE: u16 = 429;

/// Name of the response header carrying the advisory wait time.
pub const RETRY_AFTER_HEADER: &str = "Retry-After";

/// The outcome of one admission evaluation.
///
/// Produced per evaluation and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed.
    Admitted,
    /// The request must be rejected.
    Rejected {
        /// Whole seconds until the current window elapses
        retry_after_secs: u64,
    },
}

impl Decision {
    /// Whether the request was admitted.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted)
    }

    /// The advisory wait time, present iff rejected.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Decision::Admitted => None,
            Decision::Rejected { retry_after_secs } => Some(*retry_after_secs),
        }
    }
}

/// What the pipeline serves for a rejected request: the configured status
/// code, a `Retry-After` header, and an empty body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    /// Response status code
    pub status_code: u16,
    /// Whole seconds until the caller may retry
    pub retry_after_secs: u64,
}

impl Rejection {
    /// The `Retry-After` header name/value pair.
    pub fn retry_after_header(&self) -> (&'static str, String) {
        (RETRY_AFTER_HEADER, self.retry_after_secs.to_string())
    }
}
