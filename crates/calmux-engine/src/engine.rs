//! The assembled engine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use calmux_core::{CalendarEvent, CalendarSource};
use calmux_providers::CalendarBackend;

use crate::aggregator::{AggregateReport, EventAggregator};
use crate::cache::{CacheStats, CacheStore, CachedValue};
use crate::config::EngineConfig;
use crate::conflicts::ConflictReport;
use crate::error::EngineResult;
use crate::registry::{BackendHealth, SourceRegistry};

/// One cache, one registry and one aggregator wired together.
///
/// Nothing here is global: build as many engines as needed, each with its
/// own backends and cache.
#[derive(Debug)]
pub struct CalendarEngine {
    config: EngineConfig,
    cache: Arc<CacheStore<CachedValue>>,
    registry: Arc<SourceRegistry>,
    aggregator: EventAggregator,
}

impl CalendarEngine {
    /// Builds an engine over `backends`.
    pub fn new(config: EngineConfig, backends: Vec<Arc<dyn CalendarBackend>>) -> Self {
        let cache = Arc::new(CacheStore::new(config.cache.max_entries));
        let registry = Arc::new(SourceRegistry::new(
            backends,
            Arc::clone(&cache),
            config.cache.source_ttl(),
        ));
        let aggregator = EventAggregator::new(
            Arc::clone(&registry),
            Arc::clone(&cache),
            config.cache.clone(),
            config.aggregation.clone(),
        )
        .with_include_mailbox_backed(config.registry.include_mailbox_backed);

        info!(
            max_entries = config.cache.max_entries,
            aggregate_timeout_secs = config.aggregation.aggregate_timeout_secs,
            "Calendar engine ready"
        );

        Self {
            config,
            cache,
            registry,
            aggregator,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn aggregator(&self) -> &EventAggregator {
        &self.aggregator
    }

    /// Lists sources; see [`SourceRegistry::list_sources`].
    pub async fn list_sources(&self, include_mailbox_backed: bool) -> Vec<CalendarSource> {
        self.registry.list_sources(include_mailbox_backed).await
    }

    /// See [`EventAggregator::get_events`].
    pub async fn get_events(
        &self,
        sources: &[CalendarSource],
        max_events: usize,
    ) -> EngineResult<Vec<CalendarEvent>> {
        self.aggregator.get_events(sources, max_events).await
    }

    /// See [`EventAggregator::get_events_for_range`].
    pub async fn get_events_for_range(
        &self,
        sources: &[CalendarSource],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_events: usize,
    ) -> EngineResult<Vec<CalendarEvent>> {
        self.aggregator
            .get_events_for_range(sources, start, end, max_events)
            .await
    }

    /// See [`EventAggregator::get_all_events`].
    pub async fn get_all_events(&self, max_events: usize) -> EngineResult<AggregateReport> {
        self.aggregator.get_all_events(max_events).await
    }

    /// See [`EventAggregator::search`].
    pub async fn search(
        &self,
        sources: &[CalendarSource],
        query: &str,
        max_results: usize,
    ) -> EngineResult<Vec<CalendarEvent>> {
        self.aggregator.search(sources, query, max_results).await
    }

    /// See [`EventAggregator::detect_conflicts`].
    pub async fn detect_conflicts(
        &self,
        sources: &[CalendarSource],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> EngineResult<ConflictReport> {
        self.aggregator.detect_conflicts(sources, start, end).await
    }

    /// Probes every backend.
    pub async fn health(&self) -> Vec<BackendHealth> {
        self.registry.check_health().await
    }

    /// Drops cached answers and source lists that involve `source_id`.
    pub fn invalidate_source(&self, source_id: &str) {
        self.registry.invalidate_source(source_id);
        self.aggregator.invalidate_source(source_id);
    }

    /// Empties the cache.
    pub fn invalidate_all(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
