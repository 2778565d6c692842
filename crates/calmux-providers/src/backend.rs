//! The seam between the engine and a backend family.
//!
//! A [`CalendarBackend`] is one backend family (list-based or
//! mailbox-based). It discovers sources, reads raw events for one source at
//! a time and answers free-text searches. Everything it returns is raw:
//! normalization and recurrence expansion happen above it.

use std::future::Future;
use std::pin::Pin;

use calmux_core::{BackendKind, CalendarSource, TimeWindow};

use crate::error::{ProviderError, ProviderResult};
use crate::raw::{RawEvent, RawSource};

/// Options for fetching events from a single source.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Only events overlapping this window; series masters starting
    /// before the window end are always returned.
    pub time_window: Option<TimeWindow>,
    /// Maximum number of raw records to return.
    pub max_results: Option<usize>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time_window(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }
}

/// Return type of the trait's async methods; keeps `dyn CalendarBackend` usable.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The abstraction over one backend family.
///
/// # Implementation Notes
///
/// - Implementations must be `Send + Sync`; calls for different sources run
///   concurrently
/// - `fetch_events` receives the canonical source so adapters can reach the
///   native id and container
/// - Errors should carry a [`ProviderErrorCode`](crate::ProviderErrorCode) the
///   aggregation layer can report per source
pub trait CalendarBackend: Send + Sync {
    /// Which backend family this is.
    fn kind(&self) -> BackendKind;

    /// Human-readable name used in logs and error reports.
    fn name(&self) -> &str;

    /// Discovers every calendar container the backend exposes.
    fn fetch_sources(&self) -> BoxFuture<'_, ProviderResult<Vec<RawSource>>>;

    /// Reads raw events of one source.
    ///
    /// Fails with the backend's own error code; the engine records it
    /// against this source and keeps the others.
    fn fetch_events<'a>(
        &'a self,
        source: &'a CalendarSource,
        options: FetchOptions,
    ) -> BoxFuture<'a, ProviderResult<Vec<RawEvent>>>;

    /// Searches titles and descriptions across the given sources.
    ///
    /// Backends without server-side search report `NotFound`; callers treat
    /// that like any other per-backend failure.
    fn search_events<'a>(
        &'a self,
        sources: &'a [CalendarSource],
        query: &'a str,
        max_results: usize,
    ) -> BoxFuture<'a, ProviderResult<Vec<RawEvent>>> {
        let _ = (sources, query, max_results);
        let error = ProviderError::not_found("search is not supported by this backend")
            .with_backend(self.name());
        Box::pin(async move { Err(error) })
    }

    /// Returns whether the backend answered a liveness probe.
    fn fetch_health(&self) -> BoxFuture<'_, bool>;
}

/// A backend that always returns an error.
///
/// Stands in for a backend that failed to initialize, so the rest of the
/// engine keeps serving the other family.
#[derive(Debug)]
pub struct ErrorBackend {
    kind: BackendKind,
    name: String,
    error: ProviderError,
}

impl ErrorBackend {
    /// Creates a new error backend.
    pub fn new(kind: BackendKind, name: impl Into<String>, error: ProviderError) -> Self {
        Self {
            kind,
            name: name.into(),
            error,
        }
    }

    fn error(&self) -> ProviderError {
        self.error.detached().with_backend(&self.name)
    }
}

impl CalendarBackend for ErrorBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_sources(&self) -> BoxFuture<'_, ProviderResult<Vec<RawSource>>> {
        let error = self.error();
        Box::pin(async move { Err(error) })
    }

    fn fetch_events<'a>(
        &'a self,
        _source: &'a CalendarSource,
        _options: FetchOptions,
    ) -> BoxFuture<'a, ProviderResult<Vec<RawEvent>>> {
        let error = self.error();
        Box::pin(async move { Err(error) })
    }

    fn search_events<'a>(
        &'a self,
        _sources: &'a [CalendarSource],
        _query: &'a str,
        _max_results: usize,
    ) -> BoxFuture<'a, ProviderResult<Vec<RawEvent>>> {
        let error = self.error();
        Box::pin(async move { Err(error) })
    }

    fn fetch_health(&self) -> BoxFuture<'_, bool> {
        Box::pin(async { false })
    }
}
