//! Aggregation engine: cache store, source registry, event aggregator.
//!
//! This crate turns a set of [`CalendarBackend`](calmux_providers::CalendarBackend)s
//! into one calendar:
//! - [`SourceRegistry`] discovers and validates sources across backends
//! - [`EventAggregator`] fans out per-source fetches, merges, dedupes and
//!   ranks the results, and finds conflicts
//! - [`CacheStore`] is the TTL cache both share
//! - [`CalendarEngine`] wires them together from an [`EngineConfig`]
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use calmux_core::BackendKind;
//! use calmux_engine::{CalendarEngine, EngineConfig};
//! use calmux_providers::{CalendarBackend, StaticBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let lists: Arc<dyn CalendarBackend> =
//!         Arc::new(StaticBackend::new(BackendKind::ListBased, "lists"));
//!     let engine = CalendarEngine::new(EngineConfig::default(), vec![lists]);
//!
//!     let report = engine.get_all_events(50).await?;
//!     for event in report.events {
//!         println!("{} {}", event.start, event.title);
//!     }
//!     Ok(())
//! }
//! ```

mod aggregator;
mod cache;
mod config;
mod conflicts;
mod engine;
mod error;
mod merge;
mod registry;

pub use aggregator::{AggregateReport, EventAggregator};
pub use cache::{CacheStats, CacheStore, CachedValue, DEFAULT_MAX_ENTRIES};
pub use config::{
    AggregationSettings, CacheSettings, EngineConfig, MAX_HORIZON_DAYS, RegistrySettings,
};
pub use conflicts::{ConflictReport, EventConflict, find_conflicts, overlap_minutes};
pub use engine::CalendarEngine;
pub use error::{EngineError, EngineResult, SourceFailure};
pub use merge::{dedup_key, dedupe, per_source_limit, rank_search};
pub use registry::{BackendHealth, SourceRegistry, color_for_title, is_well_formed_source_id};
