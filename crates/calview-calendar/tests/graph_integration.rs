//! Integration tests for GraphClient, RetryingFetcher and EventSource using wiremock.
//!
//! Retry-After is always 0 and jitter disabled so the retry loop runs in real time.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use calview_calendar::{
    CalendarError, DataOrigin, EventSource, FetchError, GraphClient, NoticeLevel, Provider,
    RateLimiter, RetryPolicy, RetryingFetcher,
};
use calview_core::EventsConfig;
use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn focus() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
}

/// Helper to create a Graph event payload
fn graph_event(id: &str, subject: &str, teams: bool) -> serde_json::Value {
    let provider = if teams { "teamsForBusiness" } else { "unknown" };
    serde_json::json!({
        "id": id,
        "subject": subject,
        "start": {"dateTime": "2024-06-17T14:00:00.0000000", "timeZone": "UTC"},
        "end": {"dateTime": "2024-06-17T15:00:00.0000000", "timeZone": "UTC"},
        "isOnlineMeeting": teams,
        "onlineMeetingProvider": provider
    })
}

fn fetcher(max_requests: u32) -> RetryingFetcher {
    let limiter = Arc::new(RateLimiter::new(max_requests, Duration::from_secs(60)));
    let policy = RetryPolicy {
        jitter_max: Duration::ZERO,
        ..RetryPolicy::default()
    };
    RetryingFetcher::new(limiter, policy)
}

fn event_source(server: &MockServer) -> EventSource<GraphClient> {
    EventSource::new(
        GraphClient::with_base_url(&server.uri()),
        fetcher(30),
        &EventsConfig::default(),
    )
}

#[tokio::test]
async fn test_recovers_after_throttling() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/me/calendarView"))
        .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "0"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/me/calendarView"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [graph_event("evt1", "Standup", true)]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = GraphClient::with_base_url(&mock_server.uri());
    let fetcher = fetcher(30);
    let (start, end) = (focus(), focus() + chrono::Duration::days(7));

    let events = fetcher
        .fetch(&CancellationToken::new(), || {
            client.list_calendar_view("token", start, end)
        })
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].source, Provider::Teams);
    assert_eq!(fetcher.limiter().remaining(), 27);
}

#[tokio::test]
async fn test_gives_up_after_three_attempts() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/me/calendarView"))
        .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "0"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = GraphClient::with_base_url(&mock_server.uri());
    let (start, end) = (focus(), focus() + chrono::Duration::days(7));

    let err = fetcher(30)
        .fetch(&CancellationToken::new(), || {
            client.list_calendar_view("token", start, end)
        })
        .await
        .unwrap_err();

    assert!(err.is_rate_limit_exhausted());
    assert!(matches!(err, FetchError::RetryExhausted { attempts: 3, .. }));
}

#[tokio::test]
async fn test_unauthorized_is_sent_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/me/calendarView"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = GraphClient::with_base_url(&mock_server.uri());
    let (start, end) = (focus(), focus() + chrono::Duration::days(7));

    let err = fetcher(30)
        .fetch(&CancellationToken::new(), || {
            client.list_calendar_view("expired", start, end)
        })
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Fatal(CalendarError::Unauthorized)));
}

#[tokio::test]
async fn test_local_quota_blocks_network_calls() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/me/calendarView"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": []})))
        .expect(0)
        .mount(&mock_server)
        .await;

    let limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(60)));
    limiter.check_and_consume().unwrap();
    let fetcher = RetryingFetcher::new(
        limiter,
        RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        },
    );
    let client = GraphClient::with_base_url(&mock_server.uri());
    let (start, end) = (focus(), focus() + chrono::Duration::days(7));

    let err = fetcher
        .fetch(&CancellationToken::new(), || {
            client.list_calendar_view("token", start, end)
        })
        .await
        .unwrap_err();

    match err {
        FetchError::RetryExhausted { last_error, .. } => assert!(matches!(
            *last_error,
            CalendarError::RateLimited { local: true, retry_after: Some(secs) } if secs <= 60
        )),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_event_source_loads_live_then_cached() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/me/calendarView"))
        .and(header("Authorization", "Bearer live_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [
                graph_event("evt1", "Standup", true),
                graph_event("evt2", "Lunch", false),
            ]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let source = event_source(&mock_server);
    let cancel = CancellationToken::new();

    let live = source
        .load(focus(), Some("live_token"), &cancel)
        .await
        .unwrap();
    assert_eq!(live.origin, DataOrigin::Live);
    assert_eq!(
        live.notice.unwrap().message,
        "Loaded 2 events from Microsoft (1 Teams meetings)"
    );

    let cached = source
        .load(focus(), Some("live_token"), &cancel)
        .await
        .unwrap();
    assert_eq!(cached.origin, DataOrigin::Cached);
    assert_eq!(cached.events.len(), 2);
}

#[tokio::test]
async fn test_event_source_falls_back_when_throttled() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/me/calendarView"))
        .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "0"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let source = event_source(&mock_server);
    let loaded = source
        .load(focus(), Some("token"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(loaded.origin, DataOrigin::Placeholder);
    assert_eq!(loaded.events.len(), 20);
    assert_eq!(loaded.notice.unwrap().level, NoticeLevel::Warning);
}

#[tokio::test]
async fn test_event_source_surfaces_forbidden() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/me/calendarView"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&mock_server)
        .await;

    let source = event_source(&mock_server);
    let result = source
        .load(focus(), Some("token"), &CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(FetchError::Fatal(CalendarError::Forbidden))
    ));
}
