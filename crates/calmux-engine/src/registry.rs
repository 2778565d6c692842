//! Source discovery across backends.
//!
//! The [`SourceRegistry`] asks every backend for its calendar containers,
//! validates and enriches what comes back, and caches the result twice:
//! the merged list under `sources:all` and each backend family's subset
//! under `sources:kind:<kind>`.
//!
//! A failing backend is logged and left out. Its sources are missing from
//! the answer, and the merged list is not cached so the next call retries.
//!
//! Discovery also records which backend owns each source id, so event and
//! search calls reach the right backend when several share a family.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use std::time::Duration;

use futures_util::future::join_all;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use url::Url;

use calmux_core::{BackendKind, CalendarSource};
use calmux_providers::{CalendarBackend, ProviderResult, RawSource};

use crate::cache::{CacheStore, CachedValue};

const ALL_SOURCES_KEY: &str = "sources:all";
const SOURCES_PREFIX: &str = "sources:";

static NATIVE_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._:@{}=+/\-]{1,512}$").expect("Invalid native id regex")
});

static GLOBAL_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(list|mbox)_[A-Za-z0-9._:@{}=+/\-]{1,512}$").expect("Invalid global id regex")
});

static HEX_COLOR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("Invalid color regex"));

/// Colors handed out to sources that arrive without one.
const PALETTE: [&str; 12] = [
    "#3366cc", "#dc3912", "#ff9900", "#109618", "#990099", "#0099c6", "#dd4477", "#66aa00",
    "#b82e2e", "#316395", "#994499", "#22aa99",
];

/// Returns true if `id` looks like a synthesized global source id.
pub fn is_well_formed_source_id(id: &str) -> bool {
    GLOBAL_ID_REGEX.is_match(id)
}

/// Deterministic color for a title.
pub fn color_for_title(title: &str) -> &'static str {
    let digest = Sha256::digest(title.trim().as_bytes());
    PALETTE[usize::from(digest[0]) % PALETTE.len()]
}

/// Liveness of one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendHealth {
    /// Backend name.
    pub name: String,
    /// Backend family.
    pub kind: BackendKind,
    /// Whether the probe succeeded.
    pub healthy: bool,
}

/// Discovers, validates and caches calendar sources.
pub struct SourceRegistry {
    backends: Vec<Arc<dyn CalendarBackend>>,
    cache: Arc<CacheStore<CachedValue>>,
    ttl: Duration,
    /// Global source id to index in `backends`.
    owners: RwLock<HashMap<String, usize>>,
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field(
                "backends",
                &self.backends.iter().map(|b| b.name()).collect::<Vec<_>>(),
            )
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl SourceRegistry {
    /// Creates a registry over `backends` sharing `cache`.
    pub fn new(
        backends: Vec<Arc<dyn CalendarBackend>>,
        cache: Arc<CacheStore<CachedValue>>,
        ttl: Duration,
    ) -> Self {
        Self {
            backends,
            cache,
            ttl,
            owners: RwLock::new(HashMap::new()),
        }
    }

    /// The backend that owns `source`.
    ///
    /// Sources seen during discovery go to the backend that reported them.
    /// An unseen source goes to the only backend of its family; with several
    /// candidates they are asked for their sources first. `None` when no
    /// backend of the family claims it.
    pub async fn backend_for_source(
        &self,
        source: &CalendarSource,
    ) -> Option<Arc<dyn CalendarBackend>> {
        let index = self.owner_of(source).await?;
        self.backends.get(index).cloned()
    }

    pub(crate) async fn owner_of(&self, source: &CalendarSource) -> Option<usize> {
        if let Some(index) = self.known_owner(&source.id) {
            return Some(index);
        }

        let candidates: Vec<usize> = self
            .backends
            .iter()
            .enumerate()
            .filter(|(_, b)| b.kind() == source.backend_kind)
            .map(|(index, _)| index)
            .collect();
        match candidates.as_slice() {
            [] => None,
            [only] => Some(*only),
            _ => {
                debug!(
                    source_id = %source.id,
                    candidates = candidates.len(),
                    "Looking up the owner of an unseen source"
                );
                let results = join_all(candidates.iter().map(|&i| self.fetch_backend(i))).await;
                for (&index, result) in candidates.iter().zip(results) {
                    if let Err(e) = result {
                        warn!(
                            backend = %self.backends[index].name(),
                            error = %e,
                            "Source discovery failed"
                        );
                    }
                }
                self.known_owner(&source.id)
            }
        }
    }

    pub(crate) fn backend_at(&self, index: usize) -> Option<&Arc<dyn CalendarBackend>> {
        self.backends.get(index)
    }

    fn known_owner(&self, id: &str) -> Option<usize> {
        self.owners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .copied()
    }

    fn record_owners(&self, index: usize, sources: &[CalendarSource]) {
        let mut owners = self.owners.write().unwrap_or_else(PoisonError::into_inner);
        for source in sources {
            match owners.get(&source.id) {
                Some(&owner) if owner != index => {
                    warn!(
                        source_id = %source.id,
                        kept = %self.backends[owner.min(index)].name(),
                        other = %self.backends[owner.max(index)].name(),
                        "Source id reported by two backends"
                    );
                    owners.insert(source.id.clone(), owner.min(index));
                }
                _ => {
                    owners.insert(source.id.clone(), index);
                }
            }
        }
    }

    /// Lists every valid source.
    ///
    /// With `include_mailbox_backed == false` only list-based sources are
    /// returned. Never fails: unreachable backends just contribute nothing.
    pub async fn list_sources(&self, include_mailbox_backed: bool) -> Vec<CalendarSource> {
        if !include_mailbox_backed {
            return self.sources_by_kind(BackendKind::ListBased).await;
        }

        if let Some(CachedValue::Sources(sources)) = self.cache.get(ALL_SOURCES_KEY) {
            debug!(count = sources.len(), "Source list served from cache");
            return sources;
        }

        let results = join_all((0..self.backends.len()).map(|i| self.fetch_backend(i))).await;

        let mut merged = Vec::new();
        let mut per_kind: HashMap<BackendKind, Vec<CalendarSource>> = HashMap::new();
        let mut failed_kinds = Vec::new();
        for (backend, result) in self.backends.iter().zip(results) {
            match result {
                Ok(sources) => {
                    per_kind
                        .entry(backend.kind())
                        .or_default()
                        .extend(sources.iter().cloned());
                    merged.extend(sources);
                }
                Err(e) => {
                    warn!(backend = %backend.name(), error = %e, "Source discovery failed");
                    failed_kinds.push(backend.kind());
                }
            }
        }

        for (kind, sources) in per_kind {
            if !failed_kinds.contains(&kind) {
                self.cache
                    .set(kind_key(kind), CachedValue::Sources(sources), self.ttl);
            }
        }
        if failed_kinds.is_empty() {
            self.cache.set(
                ALL_SOURCES_KEY,
                CachedValue::Sources(merged.clone()),
                self.ttl,
            );
        }

        info!(
            count = merged.len(),
            failed_backends = failed_kinds.len(),
            "Discovered calendar sources"
        );
        merged
    }

    /// Lists the valid sources of one backend family.
    pub async fn sources_by_kind(&self, kind: BackendKind) -> Vec<CalendarSource> {
        let key = kind_key(kind);
        if let Some(CachedValue::Sources(sources)) = self.cache.get(&key) {
            return sources;
        }

        let indices: Vec<usize> = (0..self.backends.len())
            .filter(|&i| self.backends[i].kind() == kind)
            .collect();
        let results = join_all(indices.iter().map(|&i| self.fetch_backend(i))).await;

        let mut sources = Vec::new();
        let mut failed = false;
        for (&index, result) in indices.iter().zip(results) {
            match result {
                Ok(found) => sources.extend(found),
                Err(e) => {
                    warn!(
                        backend = %self.backends[index].name(),
                        error = %e,
                        "Source discovery failed"
                    );
                    failed = true;
                }
            }
        }

        if !failed {
            self.cache
                .set(key, CachedValue::Sources(sources.clone()), self.ttl);
        }
        sources
    }

    /// Lists sources that take part in aggregation.
    pub async fn enabled_sources(&self, include_mailbox_backed: bool) -> Vec<CalendarSource> {
        self.list_sources(include_mailbox_backed)
            .await
            .into_iter()
            .filter(|s| s.is_enabled)
            .collect()
    }

    /// Looks a source up by global id.
    pub async fn find_source(&self, id: &str) -> Option<CalendarSource> {
        self.list_sources(true).await.into_iter().find(|s| s.id == id)
    }

    /// Drops every cached source list.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_by_substring(SOURCES_PREFIX);
    }

    /// Drops cached source lists that contain `id`.
    pub fn invalidate_source(&self, id: &str) {
        for key in self.cache.keys() {
            if !key.starts_with(SOURCES_PREFIX) {
                continue;
            }
            if let Some(CachedValue::Sources(sources)) = self.cache.get(&key)
                && sources.iter().any(|s| s.id == id)
            {
                self.cache.delete(&key);
            }
        }
    }

    /// Probes every backend.
    pub async fn check_health(&self) -> Vec<BackendHealth> {
        let probes = join_all(self.backends.iter().map(|b| b.fetch_health())).await;
        self.backends
            .iter()
            .zip(probes)
            .map(|(backend, healthy)| {
                if !healthy {
                    warn!(backend = %backend.name(), "Backend health probe failed");
                }
                BackendHealth {
                    name: backend.name().to_string(),
                    kind: backend.kind(),
                    healthy,
                }
            })
            .collect()
    }

    async fn fetch_backend(&self, index: usize) -> ProviderResult<Vec<CalendarSource>> {
        let backend = &self.backends[index];
        let raws = backend.fetch_sources().await?;
        let kind = backend.kind();
        let sources: Vec<CalendarSource> = raws
            .into_iter()
            .filter_map(|raw| build_source(kind, raw))
            .collect();
        self.record_owners(index, &sources);
        Ok(sources)
    }
}

fn kind_key(kind: BackendKind) -> String {
    format!("{}kind:{}", SOURCES_PREFIX, kind.as_str())
}

/// Validates a raw source and turns it into a canonical one.
fn build_source(kind: BackendKind, raw: RawSource) -> Option<CalendarSource> {
    let title = raw.title.trim();
    if title.is_empty() {
        warn!(native_id = %raw.id, "Dropping source without a title");
        return None;
    }
    if !NATIVE_ID_REGEX.is_match(&raw.id) {
        warn!(native_id = %raw.id, title = %title, "Dropping source with ill-formed id");
        return None;
    }
    if !is_valid_container(kind, &raw.container) {
        warn!(
            native_id = %raw.id,
            container = %raw.container,
            "Dropping source with ill-formed container"
        );
        return None;
    }

    let color = match raw.color.as_deref().map(str::trim) {
        Some(color) if HEX_COLOR_REGEX.is_match(color) => color.to_ascii_lowercase(),
        _ => color_for_title(title).to_string(),
    };

    let mut source = CalendarSource::new(kind, &raw.id, title, raw.container.trim())
        .with_color(color)
        .with_enabled(!raw.is_hidden)
        .with_permissions(raw.can_edit, raw.can_share);
    if let Some(count) = raw.item_count {
        source = source.with_item_count(count);
    }
    Some(source)
}

fn is_valid_container(kind: BackendKind, container: &str) -> bool {
    let container = container.trim();
    match kind {
        BackendKind::ListBased => Url::parse(container)
            .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
            .unwrap_or(false),
        BackendKind::MailboxBased => {
            container == "me"
                || container
                    .split_once('@')
                    .is_some_and(|(user, domain)| !user.is_empty() && !domain.is_empty())
        }
    }
}
