//! Maps the application `code` of an envelope to a retry decision.

use std::fmt;

/// Page-level congestion; retry the identical request after the configured interval.
pub const CODE_PAGE_CONGESTED: i64 = -3100;
/// High concurrent load; retry at once.
pub const CODE_CROWDED: i64 = -3000;
/// High concurrent load (second variant); retry at once.
pub const CODE_CROWDED_ALT: i64 = -3001;

/// What the executor should do with a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    RetryAfterDelay { code: i64 },
    RetryImmediately { code: i64 },
    RetryCapped { code: i64 },
}

/// Classify an application code. Pure.
pub fn classify(code: i64) -> Classification {
    match code {
        0 => Classification::Success,
        CODE_PAGE_CONGESTED => Classification::RetryAfterDelay { code },
        CODE_CROWDED | CODE_CROWDED_ALT => Classification::RetryImmediately { code },
        code => Classification::RetryCapped { code },
    }
}

impl Classification {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "Success"),
            Self::RetryAfterDelay { code } => write!(f, "RetryAfterDelay({})", code),
            Self::RetryImmediately { code } => write!(f, "RetryImmediately({})", code),
            Self::RetryCapped { code } => write!(f, "RetryCapped({})", code),
        }
    }
}
