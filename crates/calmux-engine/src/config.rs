//! Engine configuration.
//!
//! Settings are grouped the way they appear in `calmux.toml`:
//!
//! ```toml
//! [cache]
//! max_entries = 100
//! search_ttl_secs = 60
//!
//! [aggregation]
//! aggregate_timeout_secs = 30
//! source_timeout_secs = 10
//!
//! [registry]
//! include_mailbox_backed = true
//! ```
//!
//! Every field has a default, so an empty file is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Longest accepted window-less expansion horizon, about a century.
pub const MAX_HORIZON_DAYS: i64 = 36_600;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Cache capacity and TTLs.
    pub cache: CacheSettings,
    /// Fan-out ceilings and expansion limits.
    pub aggregation: AggregationSettings,
    /// Source discovery defaults.
    pub registry: RegistrySettings,
}

/// Cache capacity and per-purpose TTLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Entry count above which the oldest quarter is evicted.
    pub max_entries: usize,
    /// Source lists.
    pub source_ttl_secs: u64,
    /// Event lists of a single calendar.
    pub calendar_ttl_secs: u64,
    /// Merged window-less event lists.
    pub events_ttl_secs: u64,
    /// Merged range queries.
    pub range_ttl_secs: u64,
    /// Search results.
    pub search_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: 100,
            source_ttl_secs: 300,
            calendar_ttl_secs: 300,
            events_ttl_secs: 300,
            range_ttl_secs: 300,
            search_ttl_secs: 60,
        }
    }
}

impl CacheSettings {
    pub fn source_ttl(&self) -> Duration {
        Duration::from_secs(self.source_ttl_secs)
    }

    pub fn calendar_ttl(&self) -> Duration {
        Duration::from_secs(self.calendar_ttl_secs)
    }

    pub fn events_ttl(&self) -> Duration {
        Duration::from_secs(self.events_ttl_secs)
    }

    pub fn range_ttl(&self) -> Duration {
        Duration::from_secs(self.range_ttl_secs)
    }

    pub fn search_ttl(&self) -> Duration {
        Duration::from_secs(self.search_ttl_secs)
    }
}

/// Fan-out and expansion settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationSettings {
    /// Ceiling for a whole aggregate call.
    pub aggregate_timeout_secs: u64,
    /// Optional ceiling for each per-source call.
    pub source_timeout_secs: Option<u64>,
    /// Per-series occurrence cap.
    pub max_occurrences: usize,
    /// Expansion horizon of window-less queries.
    pub default_horizon_days: i64,
    /// Event limit of the range query behind conflict detection.
    pub conflict_max_events: usize,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            aggregate_timeout_secs: 30,
            source_timeout_secs: None,
            max_occurrences: 100,
            default_horizon_days: 90,
            conflict_max_events: 500,
        }
    }
}

impl AggregationSettings {
    pub fn aggregate_timeout(&self) -> Duration {
        Duration::from_secs(self.aggregate_timeout_secs)
    }

    pub fn source_timeout(&self) -> Option<Duration> {
        self.source_timeout_secs.map(Duration::from_secs)
    }

    /// The horizon, clamped to `0..=MAX_HORIZON_DAYS`.
    pub fn default_horizon(&self) -> chrono::Duration {
        chrono::Duration::days(self.default_horizon_days.clamp(0, MAX_HORIZON_DAYS))
    }
}

/// Source discovery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Whether mailbox-based sources take part in "all enabled sources".
    pub include_mailbox_backed: bool,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            include_mailbox_backed: true,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| EngineError::config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the engine cannot work with.
    pub fn validate(&self) -> EngineResult<()> {
        let days = self.aggregation.default_horizon_days;
        if !(0..=MAX_HORIZON_DAYS).contains(&days) {
            return Err(EngineError::config(format!(
                "default_horizon_days must be between 0 and {MAX_HORIZON_DAYS}, got {days}"
            )));
        }
        Ok(())
    }

    /// Loads a configuration file.
    pub fn load_from(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Builder: set cache capacity.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.cache.max_entries = max;
        self
    }

    /// Builder: set the search result TTL.
    pub fn with_search_ttl(mut self, ttl: Duration) -> Self {
        self.cache.search_ttl_secs = ttl.as_secs();
        self
    }

    /// Builder: set the TTL of every event-list cache line.
    pub fn with_events_ttl(mut self, ttl: Duration) -> Self {
        let secs = ttl.as_secs();
        self.cache.calendar_ttl_secs = secs;
        self.cache.events_ttl_secs = secs;
        self.cache.range_ttl_secs = secs;
        self
    }

    /// Builder: set the source list TTL.
    pub fn with_source_ttl(mut self, ttl: Duration) -> Self {
        self.cache.source_ttl_secs = ttl.as_secs();
        self
    }

    /// Builder: set the aggregate ceiling.
    pub fn with_aggregate_timeout(mut self, timeout: Duration) -> Self {
        self.aggregation.aggregate_timeout_secs = timeout.as_secs();
        self
    }

    /// Builder: set the per-source ceiling.
    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.aggregation.source_timeout_secs = Some(timeout.as_secs());
        self
    }

    /// Builder: set the per-series occurrence cap.
    pub fn with_max_occurrences(mut self, max: usize) -> Self {
        self.aggregation.max_occurrences = max;
        self
    }

    /// Builder: set the window-less expansion horizon.
    pub fn with_default_horizon_days(mut self, days: i64) -> Self {
        self.aggregation.default_horizon_days = days;
        self
    }

    /// Builder: choose whether mailbox-backed sources are enabled by default.
    pub fn with_include_mailbox_backed(mut self, include: bool) -> Self {
        self.registry.include_mailbox_backed = include;
        self
    }
}
