mod common;

use std::io::Write;
use std::time::Duration;

use chrono::Utc;

use calmux_core::BackendKind;
use calmux_engine::{CalendarEngine, EngineConfig, color_for_title};
use calmux_providers::{ErrorBackend, ProviderError, ProviderErrorCode, RawSource, StaticBackend};

use common::*;

/// Backends whose events sit in the next few hours.
fn upcoming() -> (std::sync::Arc<StaticBackend>, std::sync::Arc<StaticBackend>, CalendarEngine) {
    upcoming_with(EngineConfig::default())
}

fn upcoming_with(
    config: EngineConfig,
) -> (std::sync::Arc<StaticBackend>, std::sync::Arc<StaticBackend>, CalendarEngine) {
    let now = Utc::now();
    let lists = StaticBackend::new(BackendKind::ListBased, "lists")
        .with_source(
            RawSource::new("team", "Team", "https://example.com/sites/team").with_color("#1A2B3C"),
        )
        .with_source(
            RawSource::new("archive", "Archive", "https://example.com/sites/archive")
                .with_hidden(true),
        )
        .with_source(RawSource::new("broken", "Broken", "not a url"))
        .with_events([
            timed("a", "team", now + chrono::Duration::hours(1), 30).with_title("Standup"),
            timed("b", "archive", now + chrono::Duration::hours(2), 30).with_title("Old stuff"),
        ]);
    let mailbox = StaticBackend::new(BackendKind::MailboxBased, "mailbox")
        .with_source(RawSource::new("AAMk", "Calendar", "me"))
        .with_source(RawSource::new("AAMz", "Shared", "someone"))
        .with_events([timed("m", "AAMk", now + chrono::Duration::hours(3), 60).with_title("Lunch")]);

    let (lists_handle, lists) = shared(lists);
    let (mailbox_handle, mbox) = shared(mailbox);
    let engine = engine_with(config, vec![lists, mbox]);
    (lists_handle, mailbox_handle, engine)
}

mod sources {
    use super::*;

    #[tokio::test]
    async fn discovery_validates_and_colors() {
        let (_, _, engine) = upcoming();

        let sources = engine.list_sources(true).await;
        let ids: Vec<_> = sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["list_team", "list_archive", "mbox_AAMk"]);

        assert_eq!(sources[0].color, "#1a2b3c");
        assert!(!sources[1].is_enabled);
        assert_eq!(sources[2].color, color_for_title("Calendar"));
    }

    #[tokio::test]
    async fn list_only_discovery_skips_mailboxes() {
        let (_, mailbox, engine) = upcoming();

        let sources = engine.list_sources(false).await;

        assert!(sources.iter().all(|s| s.backend_kind == BackendKind::ListBased));
        assert_eq!(mailbox.calls().sources(), 0);
    }

    #[tokio::test]
    async fn discovery_is_cached_until_invalidated() {
        let (lists, _, engine) = upcoming();

        engine.list_sources(true).await;
        engine.list_sources(true).await;
        assert_eq!(lists.calls().sources(), 1);

        engine.invalidate_source("list_team");
        engine.list_sources(true).await;
        assert_eq!(lists.calls().sources(), 2);
    }

    #[tokio::test]
    async fn failed_discovery_is_retried() {
        let (_, mailbox, engine) = upcoming();
        mailbox
            .fail_with(ProviderErrorCode::AuthenticationFailed, "token expired")
            .await;

        let partial = engine.list_sources(true).await;
        assert_eq!(partial.len(), 2);

        mailbox.recover().await;
        let full = engine.list_sources(true).await;
        assert_eq!(full.len(), 3);
        assert_eq!(mailbox.calls().sources(), 2);
    }

    #[tokio::test]
    async fn find_source_by_global_id() {
        let (_, _, engine) = upcoming();

        let found = engine.registry().find_source("mbox_AAMk").await.unwrap();
        assert_eq!(found.container, "me");
        assert!(engine.registry().find_source("mbox_AAMz").await.is_none());
    }
}

mod upcoming_events {
    use super::*;

    #[tokio::test]
    async fn all_enabled_sources_are_aggregated() {
        let (_, _, engine) = upcoming();

        let report = engine.get_all_events(10).await.unwrap();

        let titles: Vec<_> = report.events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, ["Standup", "Lunch"]);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn mailbox_sources_can_be_left_out() {
        let config = EngineConfig::default().with_include_mailbox_backed(false);
        let (_, mailbox, engine) = upcoming_with(config);

        let report = engine.get_all_events(10).await.unwrap();

        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].title, "Standup");
        assert_eq!(mailbox.calls().events(), 0);
    }

    #[tokio::test]
    async fn second_call_hits_the_cache() {
        let (lists, mailbox, engine) = upcoming();

        engine.get_all_events(10).await.unwrap();
        let again = engine.get_all_events(10).await.unwrap();

        assert!(again.from_cache);
        assert_eq!(lists.calls().events(), 1);
        assert_eq!(mailbox.calls().events(), 1);
    }

    #[tokio::test]
    async fn explicit_sources_skip_discovery() {
        let (lists, _, engine) = upcoming();

        let events = engine.get_events(&[team()], 5).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(lists.calls().sources(), 0);
    }
}

mod operations {
    use super::*;

    #[tokio::test]
    async fn health_reflects_backend_state() {
        let (_, mailbox, engine) = upcoming();
        mailbox
            .fail_with(ProviderErrorCode::NetworkError, "unreachable")
            .await;

        let health = engine.health().await;

        let states: Vec<_> = health.iter().map(|h| (h.name.as_str(), h.healthy)).collect();
        assert_eq!(states, [("lists", true), ("mailbox", false)]);
    }

    #[tokio::test]
    async fn error_backend_is_never_healthy() {
        let broken: std::sync::Arc<dyn calmux_providers::CalendarBackend> =
            std::sync::Arc::new(ErrorBackend::new(
                BackendKind::MailboxBased,
                "mailbox",
                ProviderError::authentication("no credentials configured"),
            ));
        let engine = engine_with(EngineConfig::default(), vec![broken]);

        assert!(!engine.health().await[0].healthy);
        assert!(engine.list_sources(true).await.is_empty());

        let report = engine
            .aggregator()
            .get_events_report(&[mailbox()], 5)
            .await
            .unwrap();
        assert_eq!(report.failures[0].code, ProviderErrorCode::AuthenticationFailed);
    }

    #[tokio::test]
    async fn cache_stats_and_full_invalidation() {
        let (lists, _, engine) = upcoming();
        assert_eq!(engine.cache_stats().total_entries, 0);

        engine.get_all_events(10).await.unwrap();
        let stats = engine.cache_stats();
        assert!(stats.total_entries > 0);
        assert!(stats.approx_bytes > 0);
        assert_eq!(stats.expired_entries, 0);

        engine.invalidate_all();
        assert_eq!(engine.cache_stats().total_entries, 0);

        engine.get_all_events(10).await.unwrap();
        assert_eq!(lists.calls().sources(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn search_ttl_is_honored() {
        let config = EngineConfig::default().with_search_ttl(Duration::from_secs(60));
        let (lists, _, engine) = upcoming_with(config);

        engine.search(&[team()], "standup", 5).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        engine.search(&[team()], "standup", 5).await.unwrap();
        assert_eq!(lists.calls().search(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        engine.search(&[team()], "standup", 5).await.unwrap();
        assert_eq!(lists.calls().search(), 2);
    }
}

#[test]
fn engine_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[cache]
max_entries = 20
search_ttl_secs = 15

[aggregation]
aggregate_timeout_secs = 5
source_timeout_secs = 2

[registry]
include_mailbox_backed = false
"#
    )
    .unwrap();

    let config = EngineConfig::load_from(file.path()).unwrap();
    let engine = CalendarEngine::new(config, Vec::new());

    assert_eq!(engine.config().cache.max_entries, 20);
    assert_eq!(engine.config().cache.search_ttl(), Duration::from_secs(15));
    assert_eq!(
        engine.config().aggregation.source_timeout(),
        Some(Duration::from_secs(2))
    );
    assert!(!engine.config().registry.include_mailbox_backed);
}
