//! Status-driven retry executor
//!
//! Retries one logical request based on the application `code` of each reply
//! rather than on transport errors.
//!
//! Semantics:
//! - `0` returns the envelope at once.
//! - `-3100` sleeps `interval` and retries. These retries are not counted;
//!   congestion is expected and may last as long as it likes.
//! - `-3000`/`-3001` retry with no delay and bump the attempt counter.
//! - Any other code bumps the counter too; once the counter has passed `cap`
//!   the call fails with `ExecuteError::UnrecognizedStatus`.
//! - A transport failure returns `ExecuteError::RequestFailed` without retry.
//!
//! Invariants:
//! - The loop is explicit; sustained congestion never grows the stack.
//! - Retry state lives inside each `execute` call, so one policy can be
//!   shared by any number of concurrent callers.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use slotrace::{Envelope, InstantSleeper, StatusRetryPolicy};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let policy = StatusRetryPolicy::builder()
//!     .interval(Duration::from_millis(100))
//!     .with_sleeper(InstantSleeper)
//!     .build();
//! let reply = policy.execute(|| async { Ok(Envelope::ok(42u32)) }).await.unwrap();
//! assert_eq!(reply.into_payload().unwrap(), 42);
//! # });
//! ```

use crate::classify::{classify, Classification};
use crate::envelope::Envelope;
use crate::error::{ExecuteError, TransportError};
use crate::{Sleeper, TokioSleeper};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower_layer::Layer;
use tower_service::Service;

/// Default number of counted retries tolerated before unknown codes are fatal.
pub const DEFAULT_RETRY_CAP: u32 = 15;
/// Default congestion back-off.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// Retry executor keyed on application status codes.
#[derive(Clone)]
pub struct StatusRetryPolicy {
    interval: Duration,
    cap: u32,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for StatusRetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusRetryPolicy")
            .field("interval", &self.interval)
            .field("cap", &self.cap)
            .field("sleeper", &self.sleeper)
            .finish()
    }
}

impl Default for StatusRetryPolicy {
    fn default() -> Self {
        StatusRetryPolicyBuilder::new().build()
    }
}

impl StatusRetryPolicy {
    pub fn builder() -> StatusRetryPolicyBuilder {
        StatusRetryPolicyBuilder::new()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }

    pub fn sleeper(&self) -> Arc<dyn Sleeper> {
        self.sleeper.clone()
    }

    /// Issue `operation` until it succeeds, the cap is passed, or transport fails.
    pub async fn execute<T, Fut, Op>(&self, mut operation: Op) -> Result<Envelope<T>, ExecuteError>
    where
        T: Send,
        Fut: Future<Output = Result<Envelope<T>, TransportError>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        let mut attempt: u32 = 1;
        loop {
            let reply = operation().await.map_err(ExecuteError::RequestFailed)?;
            match self.next_step(&reply, &mut attempt)? {
                None => return Ok(reply),
                Some(delay) if delay.is_zero() => {}
                Some(delay) => self.sleeper.sleep(delay).await,
            }
        }
    }

    /// Apply the classifier to one reply. `Ok(None)` means done, `Ok(Some(d))`
    /// means retry after `d`.
    fn next_step<T>(
        &self,
        reply: &Envelope<T>,
        attempt: &mut u32,
    ) -> Result<Option<Duration>, ExecuteError> {
        match classify(reply.code) {
            Classification::Success => Ok(None),
            Classification::RetryAfterDelay { code } => {
                tracing::warn!(code, body = %reply.body, "page congested");
                tracing::warn!(interval_ms = self.interval.as_millis() as u64, "retrying after interval");
                Ok(Some(self.interval))
            }
            Classification::RetryImmediately { code } => {
                tracing::warn!(code, body = %reply.body, "service crowded, retrying");
                *attempt += 1;
                Ok(Some(Duration::ZERO))
            }
            Classification::RetryCapped { code } => {
                if *attempt > self.cap {
                    return Err(ExecuteError::UnrecognizedStatus {
                        code,
                        attempts: *attempt,
                        body: reply.body.clone(),
                    });
                }
                tracing::warn!(attempt = *attempt, code, body = %reply.body, "unrecognized status code");
                *attempt += 1;
                Ok(Some(Duration::ZERO))
            }
        }
    }

    /// Wrap this policy as a tower layer.
    pub fn into_layer(self) -> StatusRetryLayer {
        StatusRetryLayer { policy: self }
    }
}

/// Builder for `StatusRetryPolicy`.
pub struct StatusRetryPolicyBuilder {
    interval: Duration,
    cap: u32,
    sleeper: Arc<dyn Sleeper>,
}

impl StatusRetryPolicyBuilder {
    pub fn new() -> Self {
        Self { interval: DEFAULT_INTERVAL, cap: DEFAULT_RETRY_CAP, sleeper: Arc::new(TokioSleeper) }
    }

    /// Back-off applied to page-congestion replies.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Counted retries tolerated before an unknown code is fatal.
    pub fn cap(mut self, cap: u32) -> Self {
        self.cap = cap;
        self
    }

    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn with_shared_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn build(self) -> StatusRetryPolicy {
        StatusRetryPolicy { interval: self.interval, cap: self.cap, sleeper: self.sleeper }
    }
}

impl Default for StatusRetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Tower layer applying `StatusRetryPolicy` to an endpoint service.
#[derive(Clone, Debug)]
pub struct StatusRetryLayer {
    policy: StatusRetryPolicy,
}

impl StatusRetryLayer {
    pub fn new(policy: StatusRetryPolicy) -> Self {
        Self { policy }
    }
}

impl<S> Layer<S> for StatusRetryLayer {
    type Service = StatusRetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        StatusRetryService { inner, policy: self.policy.clone() }
    }
}

/// Service produced by `StatusRetryLayer`.
#[derive(Clone, Debug)]
pub struct StatusRetryService<S> {
    inner: S,
    policy: StatusRetryPolicy,
}

impl<S, Request, T> Service<Request> for StatusRetryService<S>
where
    Request: Clone + Send + 'static,
    S: Service<Request, Response = Envelope<T>, Error = TransportError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    T: Send + 'static,
{
    type Response = Envelope<T>;
    type Error = ExecuteError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(ExecuteError::RequestFailed)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let policy = self.policy.clone();
        let mut inner = self.inner.clone();
        // take the service that was driven to readiness
        std::mem::swap(&mut self.inner, &mut inner);
        Box::pin(async move {
            let mut attempt: u32 = 1;
            let mut first = true;
            loop {
                if !first {
                    futures::future::poll_fn(|cx| inner.poll_ready(cx))
                        .await
                        .map_err(ExecuteError::RequestFailed)?;
                }
                first = false;
                let reply = inner.call(req.clone()).await.map_err(ExecuteError::RequestFailed)?;
                match policy.next_step(&reply, &mut attempt)? {
                    None => return Ok(reply),
                    Some(delay) if delay.is_zero() => {}
                    Some(delay) => policy.sleeper.sleep(delay).await,
                }
            }
        })
    }
}
