//! Operator-facing events and the sinks that receive them.
//!
//! The engine reports notable moments (a window opening or closing, a race
//! finishing, an order being placed) as [`EngineEvent`]s. Sinks are plain
//! `tower::Service<EngineEvent>` values so they compose with tower
//! combinators; delivery is always best-effort and never affects the outcome
//! of a cycle.
//!
//! ```rust
//! use slotrace::events::{EngineEvent, MemorySink};
//! use tower::Service;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut sink = MemorySink::new();
//! sink.call(EngineEvent::WindowOpened { window: 0 }).await.unwrap();
//! assert_eq!(sink.events().len(), 1);
//! # }
//! ```

use std::convert::Infallible;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

/// A sink that consumes engine events.
pub trait EventSink:
    tower::Service<EngineEvent, Response = (), Error = Self::SinkError, Future = Self::SinkFuture>
    + Clone
    + Send
    + Sync
    + 'static
{
    type SinkError: std::error::Error + Send + Sync + 'static;
    type SinkFuture: std::future::Future<Output = Result<(), Self::SinkError>> + Send + 'static;
}

/// Best-effort emit helper that honors `poll_ready` and swallows errors.
pub async fn emit_best_effort<S>(sink: S, event: EngineEvent)
where
    S: tower::Service<EngineEvent, Response = ()> + Send + Clone + 'static,
    S::Error: std::error::Error + Send + 'static,
    S::Future: Send + 'static,
{
    use tower::ServiceExt;

    match sink.ready_oneshot().await {
        Ok(mut ready) => {
            if let Err(e) = ready.call(event).await {
                tracing::warn!(error = %e, "operator notification failed");
            }
        }
        Err(e) => tracing::warn!(error = %e, "operator notification sink not ready"),
    }
}

/// Notable moments in the life of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The scheduler activated a cycle runner for window `window`.
    WindowOpened { window: usize },
    /// Window `window` ended; its runner was told to stop.
    WindowClosed { window: usize },
    /// A cycle iteration failed and will be retried.
    CycleFailed { reason: String },
    /// A race joined all its branches.
    RaceFinished { branches: usize, winners: usize },
    /// At least one order was created. `winners > 1` means duplicate orders.
    OrderPlaced { winners: usize },
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEvent::WindowOpened { window } => write!(f, "WindowOpened(#{})", window),
            EngineEvent::WindowClosed { window } => write!(f, "WindowClosed(#{})", window),
            EngineEvent::CycleFailed { reason } => write!(f, "CycleFailed({})", reason),
            EngineEvent::RaceFinished { branches, winners } => {
                write!(f, "RaceFinished({}/{} won)", winners, branches)
            }
            EngineEvent::OrderPlaced { winners } => write!(f, "OrderPlaced(orders={})", winners),
        }
    }
}

type SinkFut<E> = Pin<Box<dyn std::future::Future<Output = Result<(), E>> + Send>>;

/// A sink that discards all events.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl Service<EngineEvent> for NullSink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFut<Infallible>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _event: EngineEvent) -> Self::Future {
        Box::pin(async { Ok(()) })
    }
}

impl EventSink for NullSink {
    type SinkError = Infallible;
    type SinkFuture = SinkFut<Infallible>;
}

/// A sink that logs events with `tracing` at INFO level.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl Service<EngineEvent> for LogSink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFut<Infallible>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: EngineEvent) -> Self::Future {
        tracing::info!(event = %event, "engine_event");
        Box::pin(async { Ok(()) })
    }
}

impl EventSink for LogSink {
    type SinkError = Infallible;
    type SinkFuture = SinkFut<Infallible>;
}

/// Bounded in-memory sink; oldest events are evicted past capacity.
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<EngineEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    /// Default cap: 1,000 events.
    pub fn new() -> Self {
        Self::with_capacity(1_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<EngineEvent> for MemorySink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFut<Infallible>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: EngineEvent) -> Self::Future {
        if let Ok(mut events) = self.events.lock() {
            if events.len() >= self.capacity {
                events.remove(0);
                self.evicted.fetch_add(1, Ordering::Relaxed);
            }
            events.push(event);
        }
        Box::pin(async { Ok(()) })
    }
}

impl EventSink for MemorySink {
    type SinkError = Infallible;
    type SinkFuture = SinkFut<Infallible>;
}

/// Error from a composed sink.
#[derive(Debug)]
pub struct ComposedSinkError(Box<dyn std::error::Error + Send + Sync>);

impl fmt::Display for ComposedSinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink error: {}", self.0)
    }
}

impl std::error::Error for ComposedSinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.0)
    }
}

/// Delivers every event to both sinks concurrently.
#[derive(Clone, Debug)]
pub struct MulticastSink<A, B> {
    sink_a: A,
    sink_b: B,
}

impl<A, B> MulticastSink<A, B> {
    pub fn new(sink_a: A, sink_b: B) -> Self {
        Self { sink_a, sink_b }
    }
}

impl<A, B> Service<EngineEvent> for MulticastSink<A, B>
where
    A: EventSink,
    B: EventSink,
{
    type Response = ();
    type Error = ComposedSinkError;
    type Future = SinkFut<ComposedSinkError>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: EngineEvent) -> Self::Future {
        let mut sink_a = self.sink_a.clone();
        let mut sink_b = self.sink_b.clone();
        let event_b = event.clone();

        Box::pin(async move {
            let (res_a, res_b) = tokio::join!(sink_a.call(event), sink_b.call(event_b));
            res_a.map_err(|e| ComposedSinkError(Box::new(e)))?;
            res_b.map_err(|e| ComposedSinkError(Box::new(e)))?;
            Ok(())
        })
    }
}

impl<A, B> EventSink for MulticastSink<A, B>
where
    A: EventSink,
    B: EventSink,
{
    type SinkError = ComposedSinkError;
    type SinkFuture = SinkFut<ComposedSinkError>;
}
