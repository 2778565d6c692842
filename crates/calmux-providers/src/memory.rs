//! An in-memory [`CalendarBackend`].
//!
//! [`StaticBackend`] serves a fixed set of raw sources and events. Failures
//! and latency can be injected per backend or per source, and every call is
//! counted, which makes it the workhorse of the engine tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::debug;

use calmux_core::{BackendKind, CalendarSource};

use crate::backend::{BoxFuture, CalendarBackend, FetchOptions};
use crate::error::{ProviderError, ProviderErrorCode, ProviderResult};
use crate::raw::{RawEvent, RawSource};

/// Per-method call counters.
#[derive(Debug, Default)]
pub struct CallCounts {
    sources: AtomicUsize,
    events: AtomicUsize,
    search: AtomicUsize,
    health: AtomicUsize,
}

impl CallCounts {
    /// Number of `fetch_sources` calls.
    pub fn sources(&self) -> usize {
        self.sources.load(Ordering::SeqCst)
    }

    /// Number of `fetch_events` calls.
    pub fn events(&self) -> usize {
        self.events.load(Ordering::SeqCst)
    }

    /// Number of `search_events` calls.
    pub fn search(&self) -> usize {
        self.search.load(Ordering::SeqCst)
    }

    /// Number of `fetch_health` calls.
    pub fn health(&self) -> usize {
        self.health.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
struct Failure {
    code: ProviderErrorCode,
    message: String,
}

#[derive(Debug, Default)]
struct State {
    sources: Vec<RawSource>,
    events: Vec<RawEvent>,
    failure: Option<Failure>,
    source_failures: HashMap<String, Failure>,
    latency: Option<Duration>,
    source_latency: HashMap<String, Duration>,
}

/// A backend that serves raw records from memory.
#[derive(Debug)]
pub struct StaticBackend {
    kind: BackendKind,
    name: String,
    state: RwLock<State>,
    calls: Arc<CallCounts>,
}

impl StaticBackend {
    /// Creates an empty backend of the given family.
    pub fn new(kind: BackendKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            state: RwLock::new(State::default()),
            calls: Arc::new(CallCounts::default()),
        }
    }

    /// Builder method to add a source.
    pub fn with_source(mut self, source: RawSource) -> Self {
        self.state.get_mut().sources.push(source);
        self
    }

    /// Builder method to add an event.
    pub fn with_event(mut self, event: RawEvent) -> Self {
        self.state.get_mut().events.push(event);
        self
    }

    /// Builder method to add several events.
    pub fn with_events(mut self, events: impl IntoIterator<Item = RawEvent>) -> Self {
        self.state.get_mut().events.extend(events);
        self
    }

    /// Builder method to delay every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.state.get_mut().latency = Some(latency);
        self
    }

    /// Shared handle to the call counters.
    pub fn calls(&self) -> Arc<CallCounts> {
        Arc::clone(&self.calls)
    }

    /// Makes every subsequent call fail with `code`.
    pub async fn fail_with(&self, code: ProviderErrorCode, message: impl Into<String>) {
        self.state.write().await.failure = Some(Failure {
            code,
            message: message.into(),
        });
    }

    /// Makes event fetches for one source (by native id) fail with `code`.
    pub async fn fail_source(
        &self,
        native_id: impl Into<String>,
        code: ProviderErrorCode,
        message: impl Into<String>,
    ) {
        self.state.write().await.source_failures.insert(
            native_id.into(),
            Failure {
                code,
                message: message.into(),
            },
        );
    }

    /// Delays event fetches for one source (by native id).
    pub async fn delay_source(&self, native_id: impl Into<String>, latency: Duration) {
        self.state
            .write()
            .await
            .source_latency
            .insert(native_id.into(), latency);
    }

    /// Clears every injected failure.
    pub async fn recover(&self) {
        let mut state = self.state.write().await;
        state.failure = None;
        state.source_failures.clear();
    }

    /// Replaces the served events.
    pub async fn set_events(&self, events: Vec<RawEvent>) {
        self.state.write().await.events = events;
    }

    /// Adds a source after construction.
    pub async fn add_source(&self, source: RawSource) {
        self.state.write().await.sources.push(source);
    }

    fn error(&self, failure: &Failure) -> ProviderError {
        ProviderError::new(failure.code, failure.message.clone()).with_backend(&self.name)
    }

    async fn pause(latency: Option<Duration>) {
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl CalendarBackend for StaticBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_sources(&self) -> BoxFuture<'_, ProviderResult<Vec<RawSource>>> {
        Box::pin(async move {
            self.calls.sources.fetch_add(1, Ordering::SeqCst);
            let (latency, result) = {
                let state = self.state.read().await;
                let result = match &state.failure {
                    Some(failure) => Err(self.error(failure)),
                    None => Ok(state.sources.clone()),
                };
                (state.latency, result)
            };
            Self::pause(latency).await;
            result
        })
    }

    fn fetch_events<'a>(
        &'a self,
        source: &'a CalendarSource,
        options: FetchOptions,
    ) -> BoxFuture<'a, ProviderResult<Vec<RawEvent>>> {
        Box::pin(async move {
            self.calls.events.fetch_add(1, Ordering::SeqCst);
            let (latency, result) = {
                let state = self.state.read().await;
                let latency = state
                    .source_latency
                    .get(&source.native_id)
                    .copied()
                    .or(state.latency);
                let failure = state
                    .failure
                    .as_ref()
                    .or_else(|| state.source_failures.get(&source.native_id));
                let result = match failure {
                    Some(failure) => Err(self.error(failure)),
                    None => {
                        let mut events: Vec<RawEvent> = state
                            .events
                            .iter()
                            .filter(|e| e.source_id == source.native_id)
                            .filter(|e| in_window(e, &options))
                            .cloned()
                            .collect();
                        if let Some(max) = options.max_results {
                            events.truncate(max);
                        }
                        Ok(events)
                    }
                };
                (latency, result)
            };
            Self::pause(latency).await;
            debug!(
                backend = %self.name,
                source_id = %source.id,
                ok = result.is_ok(),
                "Served events from memory"
            );
            result
        })
    }

    fn search_events<'a>(
        &'a self,
        sources: &'a [CalendarSource],
        query: &'a str,
        max_results: usize,
    ) -> BoxFuture<'a, ProviderResult<Vec<RawEvent>>> {
        Box::pin(async move {
            self.calls.search.fetch_add(1, Ordering::SeqCst);
            let needle = query.to_lowercase();
            let (latency, result) = {
                let state = self.state.read().await;
                let result = match &state.failure {
                    Some(failure) => Err(self.error(failure)),
                    None => Ok(state
                        .events
                        .iter()
                        .filter(|e| sources.iter().any(|s| s.native_id == e.source_id))
                        .filter(|e| matches_query(e, &needle))
                        .take(max_results)
                        .cloned()
                        .collect()),
                };
                (state.latency, result)
            };
            Self::pause(latency).await;
            result
        })
    }

    fn fetch_health(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            self.calls.health.fetch_add(1, Ordering::SeqCst);
            self.state.read().await.failure.is_none()
        })
    }
}

fn in_window(event: &RawEvent, options: &FetchOptions) -> bool {
    let Some(window) = options.time_window else {
        return true;
    };
    let start = event.start.to_utc();
    if event.recurrence.is_some() {
        return start < window.end;
    }
    let end = event.end.to_utc().max(start);
    if start == end {
        return window.contains(start);
    }
    window.overlaps(start, end)
}

fn matches_query(event: &RawEvent, needle: &str) -> bool {
    let title = event.title.as_deref().unwrap_or_default().to_lowercase();
    let description = event.description.as_deref().unwrap_or_default().to_lowercase();
    title.contains(needle) || description.contains(needle)
}
