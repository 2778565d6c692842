//! Fan-out aggregation over calendar sources.
//!
//! Every query follows the same shape:
//!
//! 1. validate arguments (the only errors a caller ever sees, besides the
//!    aggregate timeout)
//! 2. look up the merged answer under a key derived from the sorted source ids
//! 3. on a miss, fetch every source concurrently; each fetch settles on its
//!    own and a failure becomes a [`SourceFailure`] with an empty contribution
//! 4. merge: sort by start, dedupe, truncate, and cache the merged list when
//!    no source failed
//!
//! The whole fan-out races against `aggregate_timeout`; losing that race
//! fails the call instead of returning partial data.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use calmux_core::{CalendarEvent, CalendarSource, TimeWindow};
use calmux_providers::{
    Expansion, FetchOptions, ProviderError, ProviderResult, normalize_event, normalize_events,
};

use crate::cache::{CacheStore, CachedValue};
use crate::config::{AggregationSettings, CacheSettings};
use crate::conflicts::{ConflictReport, find_conflicts};
use crate::error::{EngineError, EngineResult, SourceFailure};
use crate::merge::{
    dedupe, finish, per_source_limit, rank_search, sort_by_start, source_key, unique_sources,
};
use crate::registry::{SourceRegistry, is_well_formed_source_id};

/// Merged events plus the sources that could not contribute.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateReport {
    /// Sorted, deduplicated, truncated events.
    pub events: Vec<CalendarEvent>,
    /// One entry per failed source (or backend, for search).
    pub failures: Vec<SourceFailure>,
    /// Whether the merged list came straight from the cache.
    pub from_cache: bool,
}

impl AggregateReport {
    fn cached(events: Vec<CalendarEvent>) -> Self {
        Self {
            events,
            failures: Vec::new(),
            from_cache: true,
        }
    }

    /// Returns true if every source answered.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Parameters of one per-source fetch.
#[derive(Debug, Clone, Copy)]
struct SourceQuery {
    window: Option<TimeWindow>,
    expansion: Expansion,
    limit: usize,
}

/// Concurrent, failure-isolating event aggregation.
#[derive(Debug)]
pub struct EventAggregator {
    registry: Arc<SourceRegistry>,
    cache: Arc<CacheStore<CachedValue>>,
    cache_settings: CacheSettings,
    settings: AggregationSettings,
    include_mailbox_backed: bool,
}

impl EventAggregator {
    /// Creates an aggregator that resolves backends through `registry`.
    pub fn new(
        registry: Arc<SourceRegistry>,
        cache: Arc<CacheStore<CachedValue>>,
        cache_settings: CacheSettings,
        settings: AggregationSettings,
    ) -> Self {
        Self {
            registry,
            cache,
            cache_settings,
            settings,
            include_mailbox_backed: true,
        }
    }

    /// Builder: whether [`Self::get_all_events`] includes mailbox-based sources.
    pub fn with_include_mailbox_backed(mut self, include: bool) -> Self {
        self.include_mailbox_backed = include;
        self
    }

    /// Upcoming events of `sources`, at most `max_events`.
    ///
    /// Series are expanded from now over the configured horizon.
    pub async fn get_events(
        &self,
        sources: &[CalendarSource],
        max_events: usize,
    ) -> EngineResult<Vec<CalendarEvent>> {
        Ok(self.get_events_report(sources, max_events).await?.events)
    }

    /// Like [`Self::get_events`], also reporting failed sources.
    pub async fn get_events_report(
        &self,
        sources: &[CalendarSource],
        max_events: usize,
    ) -> EngineResult<AggregateReport> {
        validate_limit("max_events", max_events)?;
        validate_sources(sources)?;

        let sources = unique_sources(sources);
        if sources.is_empty() {
            return Ok(AggregateReport::default());
        }

        let key = format!("events:{}:{}", source_key(&sources), max_events);
        if let Some(CachedValue::Events(events)) = self.cache.get(&key) {
            debug!(key = %key, count = events.len(), "Events served from cache");
            return Ok(AggregateReport::cached(events));
        }

        let horizon = TimeWindow::from_duration(Utc::now(), self.settings.default_horizon());
        let query = SourceQuery {
            window: None,
            expansion: Expansion::new(horizon, self.settings.max_occurrences),
            limit: per_source_limit(max_events, sources.len()),
        };

        let (events, failures) = self.fan_out(&sources, query).await?;
        let events = finish(events, max_events);
        self.store(&key, &events, &failures, self.cache_settings.events_ttl());

        info!(
            sources = sources.len(),
            count = events.len(),
            failed = failures.len(),
            "Aggregated events"
        );
        Ok(AggregateReport {
            events,
            failures,
            from_cache: false,
        })
    }

    /// Events of `sources` overlapping `[start, end)`, at most `max_events`.
    pub async fn get_events_for_range(
        &self,
        sources: &[CalendarSource],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_events: usize,
    ) -> EngineResult<Vec<CalendarEvent>> {
        Ok(self
            .get_events_for_range_report(sources, start, end, max_events)
            .await?
            .events)
    }

    /// Like [`Self::get_events_for_range`], also reporting failed sources.
    pub async fn get_events_for_range_report(
        &self,
        sources: &[CalendarSource],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_events: usize,
    ) -> EngineResult<AggregateReport> {
        let window = TimeWindow::new(start, end)
            .map_err(|e| EngineError::validation(e.to_string()))?;
        validate_limit("max_events", max_events)?;
        validate_sources(sources)?;

        let sources = unique_sources(sources);
        if sources.is_empty() || window.is_empty() {
            return Ok(AggregateReport::default());
        }

        let key = format!(
            "range:{}:{}:{}",
            source_key(&sources),
            window.cache_fragment(),
            max_events
        );
        if let Some(CachedValue::Events(events)) = self.cache.get(&key) {
            debug!(key = %key, count = events.len(), "Range served from cache");
            return Ok(AggregateReport::cached(events));
        }

        let query = SourceQuery {
            window: Some(window),
            expansion: Expansion::new(window, self.settings.max_occurrences),
            limit: per_source_limit(max_events, sources.len()),
        };

        let (events, failures) = self.fan_out(&sources, query).await?;
        let events = finish(events, max_events);
        self.store(&key, &events, &failures, self.cache_settings.range_ttl());

        info!(
            sources = sources.len(),
            start = %window.start,
            end = %window.end,
            count = events.len(),
            failed = failures.len(),
            "Aggregated events for range"
        );
        Ok(AggregateReport {
            events,
            failures,
            from_cache: false,
        })
    }

    /// Upcoming events of every enabled source the registry knows.
    pub async fn get_all_events(&self, max_events: usize) -> EngineResult<AggregateReport> {
        let sources = self
            .registry
            .enabled_sources(self.include_mailbox_backed)
            .await;
        self.get_events_report(&sources, max_events).await
    }

    /// Free-text search over titles and descriptions.
    ///
    /// Hits whose title contains the query come first; each group is
    /// ordered by start. Series are not expanded.
    pub async fn search(
        &self,
        sources: &[CalendarSource],
        query: &str,
        max_results: usize,
    ) -> EngineResult<Vec<CalendarEvent>> {
        Ok(self.search_report(sources, query, max_results).await?.events)
    }

    /// Like [`Self::search`], also reporting failed backends.
    pub async fn search_report(
        &self,
        sources: &[CalendarSource],
        query: &str,
        max_results: usize,
    ) -> EngineResult<AggregateReport> {
        let query = query.trim();
        if query.is_empty() {
            return Err(EngineError::validation("search query must not be empty"));
        }
        validate_limit("max_results", max_results)?;
        validate_sources(sources)?;

        let sources = unique_sources(sources);
        if sources.is_empty() {
            return Ok(AggregateReport::default());
        }

        let key = format!(
            "search:{}:{}:{}",
            source_key(&sources),
            query.to_lowercase(),
            max_results
        );
        if let Some(CachedValue::Events(events)) = self.cache.get(&key) {
            debug!(key = %key, count = events.len(), "Search served from cache");
            return Ok(AggregateReport::cached(events));
        }

        let (groups, mut failures) = self
            .within_deadline(self.group_by_owner(&sources))
            .await?;

        let searches = groups
            .iter()
            .map(|(index, group)| self.search_group(*index, group, query, max_results));
        let results = self.within_deadline(join_all(searches)).await?;

        let mut events = Vec::new();
        for result in results {
            match result {
                Ok(found) => events.extend(found),
                Err(failure) => failures.push(failure),
            }
        }

        rank_search(&mut events, query);
        let events = {
            let mut events = dedupe(events);
            events.truncate(max_results);
            events
        };
        self.store(&key, &events, &failures, self.cache_settings.search_ttl());

        info!(
            query = %query,
            count = events.len(),
            failed = failures.len(),
            "Search completed"
        );
        Ok(AggregateReport {
            events,
            failures,
            from_cache: false,
        })
    }

    /// Overlapping timed events of `sources` inside `[start, end)`.
    pub async fn detect_conflicts(
        &self,
        sources: &[CalendarSource],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> EngineResult<ConflictReport> {
        let window = TimeWindow::new(start, end)
            .map_err(|e| EngineError::validation(e.to_string()))?;
        let events = self
            .get_events_for_range(sources, start, end, self.settings.conflict_max_events)
            .await?;

        let conflicts = find_conflicts(&events);
        if !conflicts.is_empty() {
            info!(count = conflicts.len(), "Detected scheduling conflicts");
        }
        Ok(ConflictReport { window, conflicts })
    }

    /// Drops every cached answer that involves `source_id`.
    pub fn invalidate_source(&self, source_id: &str) -> usize {
        let removed = self.cache.invalidate_by_substring(source_id);
        debug!(source_id = %source_id, removed, "Invalidated cached events");
        removed
    }

    /// Fetches every source concurrently under the aggregate ceiling.
    async fn fan_out(
        &self,
        sources: &[CalendarSource],
        query: SourceQuery,
    ) -> EngineResult<(Vec<CalendarEvent>, Vec<SourceFailure>)> {
        let fetches = sources.iter().map(|source| self.fetch_source(source, query));
        let results = self.within_deadline(join_all(fetches)).await?;

        let mut events = Vec::new();
        let mut failures = Vec::new();
        for (source, result) in sources.iter().zip(results) {
            match result {
                Ok(found) => events.extend(found),
                Err(e) => {
                    warn!(source_id = %source.id, error = %e, "Source failed, skipping");
                    failures.push(SourceFailure::new(&source.id, &e));
                }
            }
        }
        Ok((events, failures))
    }

    async fn within_deadline<T>(&self, work: impl Future<Output = T>) -> EngineResult<T> {
        let limit = self.settings.aggregate_timeout();
        match tokio::time::timeout(limit, work).await {
            Ok(value) => Ok(value),
            Err(_) => {
                warn!(timeout_secs = limit.as_secs(), "Aggregate call timed out");
                Err(EngineError::timeout(limit))
            }
        }
    }

    /// Events of one source, normalized and expanded.
    async fn fetch_source(
        &self,
        source: &CalendarSource,
        query: SourceQuery,
    ) -> ProviderResult<Vec<CalendarEvent>> {
        let window_key = query
            .window
            .map_or_else(|| "open".to_string(), |w| w.cache_fragment());
        let key = format!("calendar:{}:{}:{}", source.id, window_key, query.limit);
        if let Some(CachedValue::Events(events)) = self.cache.get(&key) {
            return Ok(events);
        }

        let backend = self
            .registry
            .backend_for_source(source)
            .await
            .ok_or_else(|| unowned_source_error(source))?;

        let mut options = FetchOptions::new().with_max_results(query.limit);
        if let Some(window) = query.window {
            options = options.with_time_window(window);
        }

        let raws = self
            .with_source_timeout(backend.fetch_events(source, options))
            .await?;

        let mut events = normalize_events(&raws, source, Some(&query.expansion));
        if let Some(window) = query.window {
            events.retain(|e| in_window(e, &window));
        }
        sort_by_start(&mut events);
        events.truncate(query.limit);

        debug!(
            source_id = %source.id,
            raw = raws.len(),
            count = events.len(),
            "Fetched source events"
        );
        self.cache.set(
            key,
            CachedValue::Events(events.clone()),
            self.cache_settings.calendar_ttl(),
        );
        Ok(events)
    }

    /// Splits `sources` by owning backend; unowned sources become failures.
    async fn group_by_owner(
        &self,
        sources: &[CalendarSource],
    ) -> (BTreeMap<usize, Vec<CalendarSource>>, Vec<SourceFailure>) {
        let owners = join_all(sources.iter().map(|s| self.registry.owner_of(s))).await;

        let mut groups: BTreeMap<usize, Vec<CalendarSource>> = BTreeMap::new();
        let mut failures = Vec::new();
        for (source, owner) in sources.iter().zip(owners) {
            match owner {
                Some(index) => groups.entry(index).or_default().push(source.clone()),
                None => {
                    let error = unowned_source_error(source);
                    warn!(source_id = %source.id, error = %error, "Source has no backend, skipping");
                    failures.push(SourceFailure::new(&source.id, &error));
                }
            }
        }
        (groups, failures)
    }

    /// One backend-side search for all sources that backend owns.
    async fn search_group(
        &self,
        index: usize,
        group: &[CalendarSource],
        query: &str,
        max_results: usize,
    ) -> Result<Vec<CalendarEvent>, SourceFailure> {
        let Some(backend) = self.registry.backend_at(index) else {
            let error = ProviderError::configuration(format!("no backend at position {index}"));
            let first = group.first().map_or("", |s| s.id.as_str());
            return Err(SourceFailure::new(first, &error));
        };

        let raws = self
            .with_source_timeout(backend.search_events(group, query, max_results))
            .await
            .map_err(|e| {
                warn!(backend = %backend.name(), error = %e, "Search failed, skipping");
                SourceFailure::new(backend.name(), &e)
            })?;

        let by_native: HashMap<&str, &CalendarSource> =
            group.iter().map(|s| (s.native_id.as_str(), s)).collect();
        Ok(raws
            .iter()
            .filter_map(|raw| {
                by_native
                    .get(raw.source_id.as_str())
                    .map(|source| normalize_event(raw, source, None))
            })
            .flatten()
            .collect())
    }

    /// Caches a merged list unless some source failed.
    fn store(
        &self,
        key: &str,
        events: &[CalendarEvent],
        failures: &[SourceFailure],
        ttl: Duration,
    ) {
        if failures.is_empty() {
            self.cache
                .set(key, CachedValue::Events(events.to_vec()), ttl);
        } else {
            debug!(key = %key, failed = failures.len(), "Not caching partial result");
        }
    }

    async fn with_source_timeout<T>(
        &self,
        call: impl Future<Output = ProviderResult<T>>,
    ) -> ProviderResult<T> {
        match self.settings.source_timeout() {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or_else(|_| Err(source_timeout_error(limit))),
            None => call.await,
        }
    }
}

fn unowned_source_error(source: &CalendarSource) -> ProviderError {
    ProviderError::configuration(format!(
        "no {} backend serves source {}",
        source.backend_kind, source.id
    ))
}

fn source_timeout_error(limit: Duration) -> ProviderError {
    ProviderError::timeout(format!("no answer within {limit:?}"))
}

/// Half-open overlap; normalized events always satisfy `start < end`.
fn in_window(event: &CalendarEvent, window: &TimeWindow) -> bool {
    window.overlaps(event.start, event.end)
}

fn validate_limit(name: &str, value: usize) -> EngineResult<()> {
    if value == 0 {
        return Err(EngineError::validation(format!("{name} must be positive")));
    }
    Ok(())
}

fn validate_sources(sources: &[CalendarSource]) -> EngineResult<()> {
    match sources.iter().find(|s| !is_well_formed_source_id(&s.id)) {
        Some(bad) => Err(EngineError::validation(format!(
            "ill-formed source id {:?}",
            bad.id
        ))),
        None => Ok(()),
    }
}
