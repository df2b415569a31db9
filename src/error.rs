//! Error types for the racing engine
use std::fmt;

use crate::config::ConfigError;

/// Failure to obtain any application-level reply from the remote service.
///
/// Covers network errors, non-2xx statuses and bodies that are not a valid
/// envelope. These are never retried by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    /// HTTP status, when the service answered at all.
    pub status: Option<u16>,
    pub message: String,
}

impl TransportError {
    pub fn network(message: impl Into<String>) -> Self {
        Self { status: None, message: message.into() }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self { status: Some(status), message: body.into() }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "statusCode: {}, body: {}", status, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for TransportError {}

/// Outcome of a request the retrying executor gave up on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecuteError {
    /// The service could not be reached or did not reply with an envelope.
    #[error("request failed: {0}")]
    RequestFailed(#[source] TransportError),
    /// The service kept replying with codes the classifier does not know.
    #[error("unrecognized status code {code} after {attempts} attempts: {body}")]
    UnrecognizedStatus { code: i64, attempts: u32, body: String },
    /// A successful envelope carried no `data` where one was required.
    #[error("successful response carried no payload")]
    MissingPayload,
}

impl ExecuteError {
    /// True when the service was reachable but kept answering with unknown codes.
    pub fn is_unrecognized(&self) -> bool {
        matches!(self, Self::UnrecognizedStatus { .. })
    }

    pub fn is_request_failed(&self) -> bool {
        matches!(self, Self::RequestFailed(_))
    }
}

/// Errors raised by session preparation and the cycle runner.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The remote cart has no selected, purchasable item.
    #[error("no valid product in cart")]
    NoValidProduct,
    /// No delivery slot is currently bookable.
    #[error("no reservable delivery time")]
    NoReserveTime,
    #[error("failed to fetch user: {0}")]
    FetchUser(#[source] ExecuteError),
    #[error("failed to fetch addresses: {0}")]
    FetchAddresses(#[source] ExecuteError),
    #[error("account has no delivery address")]
    NoAddress,
    /// Several addresses exist and none (or an unknown one) was configured.
    #[error("cannot choose delivery address {requested:?} among {available:?}")]
    AddressSelection { requested: Option<String>, available: Vec<String> },
    #[error("failed to select all cart items: {0}")]
    SelectCart(#[source] ExecuteError),
    #[error("failed to fetch cart: {0}")]
    FetchCart(#[source] ExecuteError),
    #[error("failed to fetch reservable times: {0}")]
    FetchSlots(#[source] ExecuteError),
    #[error("failed to check order: {0}")]
    Pricing(#[source] ExecuteError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    /// Errors the cycle runner answers with a wait-and-retry instead of a log line.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NoValidProduct | Self::NoReserveTime)
    }
}
