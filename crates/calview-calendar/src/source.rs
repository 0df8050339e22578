//! Event loading for the calendar views, with placeholder fallback.
//!
//! [`EventSource`] asks the [`RetryingFetcher`] for live events around a
//! focused date and decides what the user sees when that fails:
//! - no credential: placeholder events, silently
//! - retries exhausted or the service misbehaving: placeholder events plus a warning
//! - 401/403: the error itself, never hidden behind placeholder data

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Months, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use calview_core::EventsConfig;

use crate::client::CalendarProvider;
use crate::error::FetchError;
use crate::fetcher::RetryingFetcher;
use crate::mock::generate_mock_events;
use crate::types::{CalendarEvent, Provider};

/// Where the returned events came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOrigin {
    Live,
    Cached,
    Placeholder,
}

/// Severity of a [`Notice`]. `Error` is reserved for failures the user has to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Status line for the user-facing layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    /// Notice for a load or refresh that returned an error.
    ///
    /// 401/403 become `Error` notices asking the user to sign in again.
    pub fn for_error(error: &FetchError) -> Self {
        match error {
            FetchError::Cancelled => Self::new(NoticeLevel::Info, error.user_message()),
            e if e.is_rate_limit_exhausted() => Self::new(NoticeLevel::Warning, e.user_message()),
            e => Self::new(NoticeLevel::Error, e.user_message()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedEvents {
    pub events: Vec<CalendarEvent>,
    pub origin: DataOrigin,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub notice: Option<Notice>,
}

/// Last live result, tagged with a hash of the credential that loaded it.
#[derive(Debug, Clone)]
struct CachedRange {
    owner: u64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    events: Vec<CalendarEvent>,
}

impl CachedRange {
    fn covers(&self, owner: u64, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.owner == owner && self.start <= start && end <= self.end
    }
}

fn credential_key(token: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    hasher.finish()
}

pub struct EventSource<P> {
    provider: P,
    fetcher: RetryingFetcher,
    range_months: u32,
    placeholder_count: usize,
    cache: Mutex<Option<CachedRange>>,
}

impl<P: CalendarProvider> EventSource<P> {
    pub fn new(provider: P, fetcher: RetryingFetcher, config: &EventsConfig) -> Self {
        Self {
            provider,
            fetcher,
            range_months: config.range_months,
            placeholder_count: config.placeholder_count,
            cache: Mutex::new(None),
        }
    }

    /// Range loaded for `focus`: `range_months` on either side.
    pub fn range_for(&self, focus: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let months = Months::new(self.range_months);
        let start = focus.checked_sub_months(months).unwrap_or(focus);
        let end = focus.checked_add_months(months).unwrap_or(focus);
        (start, end)
    }

    /// Events around `focus`, served from cache when the same credential
    /// already loaded the range.
    #[tracing::instrument(skip(self, credential, cancel), level = "info")]
    pub async fn load(
        &self,
        focus: DateTime<Utc>,
        credential: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<LoadedEvents, FetchError> {
        let (start, end) = self.range_for(focus);

        let Some(token) = credential else {
            tracing::debug!("No credential, showing placeholder events");
            return Ok(self.placeholder(focus, start, end, None));
        };

        let owner = credential_key(token);
        if let Some(events) = self.cached(owner, start, end) {
            tracing::debug!("Serving {} events from cache", events.len());
            return Ok(LoadedEvents {
                events,
                origin: DataOrigin::Cached,
                start,
                end,
                notice: None,
            });
        }

        match self.fetch_live(token, start, end, cancel).await {
            Ok(events) if events.is_empty() => {
                tracing::info!("No live events in range, showing placeholder events");
                Ok(self.placeholder(
                    focus,
                    start,
                    end,
                    Some(Notice::new(
                        NoticeLevel::Info,
                        "No Microsoft events found for this time period. Showing mock data.",
                    )),
                ))
            }
            Ok(events) => {
                let notice = Notice::new(NoticeLevel::Success, loaded_message("Loaded", &events));
                self.store(owner, start, end, &events);
                Ok(LoadedEvents {
                    events,
                    origin: DataOrigin::Live,
                    start,
                    end,
                    notice: Some(notice),
                })
            }
            Err(e) if e.is_auth_failure() || matches!(e, FetchError::Cancelled) => Err(e),
            Err(e) => {
                tracing::warn!("Falling back to placeholder events: {}", e);
                let message = if e.is_rate_limit_exhausted() {
                    "Microsoft Graph is rate limiting requests. Showing mock data instead."
                } else {
                    "Failed to load Microsoft events. Showing mock data instead."
                };
                Ok(self.placeholder(
                    focus,
                    start,
                    end,
                    Some(Notice::new(NoticeLevel::Warning, message)),
                ))
            }
        }
    }

    /// Reload from the API regardless of the cache.
    ///
    /// Failures are returned as errors. An empty live result keeps whatever
    /// this credential had cached before, or shows placeholder events when
    /// nothing was cached.
    #[tracing::instrument(skip(self, credential, cancel), level = "info")]
    pub async fn refresh(
        &self,
        focus: DateTime<Utc>,
        credential: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<LoadedEvents, FetchError> {
        let (start, end) = self.range_for(focus);

        let Some(token) = credential else {
            return Ok(self.placeholder(focus, start, end, None));
        };

        let owner = credential_key(token);
        let events = self.fetch_live(token, start, end, cancel).await?;

        if events.is_empty() {
            return Ok(match self.cached(owner, start, end) {
                Some(previous) => LoadedEvents {
                    events: previous,
                    origin: DataOrigin::Cached,
                    start,
                    end,
                    notice: Some(Notice::new(
                        NoticeLevel::Info,
                        "No Microsoft events found for this time period.",
                    )),
                },
                None => self.placeholder(
                    focus,
                    start,
                    end,
                    Some(Notice::new(
                        NoticeLevel::Info,
                        "No Microsoft events found for this time period. Showing mock data.",
                    )),
                ),
            });
        }

        let notice = Notice::new(NoticeLevel::Success, loaded_message("Refreshed", &events));
        self.store(owner, start, end, &events);
        Ok(LoadedEvents {
            events,
            origin: DataOrigin::Live,
            start,
            end,
            notice: Some(notice),
        })
    }

    /// Drop cached live events, e.g. on sign-out.
    pub fn clear_cache(&self) {
        *self.cache.lock() = None;
    }

    async fn fetch_live(
        &self,
        token: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Vec<CalendarEvent>, FetchError> {
        self.fetcher
            .fetch(cancel, || self.provider.fetch_events(token, start, end))
            .await
    }

    fn cached(
        &self,
        owner: u64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<Vec<CalendarEvent>> {
        let cache = self.cache.lock();
        let range = cache.as_ref().filter(|r| r.covers(owner, start, end))?;
        Some(
            range
                .events
                .iter()
                .filter(|e| e.overlaps(start, end))
                .cloned()
                .collect(),
        )
    }

    fn store(&self, owner: u64, start: DateTime<Utc>, end: DateTime<Utc>, events: &[CalendarEvent]) {
        *self.cache.lock() = Some(CachedRange {
            owner,
            start,
            end,
            events: events.to_vec(),
        });
    }

    fn placeholder(
        &self,
        focus: DateTime<Utc>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        notice: Option<Notice>,
    ) -> LoadedEvents {
        LoadedEvents {
            events: generate_mock_events(focus.date_naive(), self.placeholder_count),
            origin: DataOrigin::Placeholder,
            start,
            end,
            notice,
        }
    }
}

fn loaded_message(verb: &str, events: &[CalendarEvent]) -> String {
    let teams = events
        .iter()
        .filter(|e| e.source == Provider::Teams)
        .count();
    format!(
        "{} {} events from Microsoft ({} Teams meetings)",
        verb,
        events.len(),
        teams
    )
}
