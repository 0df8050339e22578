//! Microsoft Graph calendar client.

use async_trait::async_trait;
use calview_core::GraphConfig;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::instrument;

use crate::error::CalendarError;
use crate::types::{CalendarEvent, GraphEventList};

const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";
const OUTLOOK_TIMEZONE_HEADER: &str = r#"outlook.timezone="UTC""#;
const EVENT_FIELDS: &str = "id,subject,organizer,start,end,location,bodyPreview,isOnlineMeeting,onlineMeetingUrl,onlineMeetingProvider,isAllDay,attendees";
const PAGE_SIZE: u32 = 100;

/// Anything that can list calendar events for a time range.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn fetch_events(
        &self,
        access_token: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CalendarError>;
}

pub struct GraphClient {
    client: reqwest::Client,
    base_url: String,
}

impl GraphClient {
    pub fn new() -> Self {
        Self::with_base_url(GRAPH_API_BASE)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &GraphConfig) -> Self {
        Self::with_base_url(&config.base_url)
    }

    /// List events (with recurrences expanded) between `start` and `end`.
    ///
    /// Returns the first page only (`$top=100`). Entries with unparseable
    /// timestamps are skipped.
    #[instrument(skip(self, access_token), level = "info")]
    pub async fn list_calendar_view(
        &self,
        access_token: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let url = format!(
            "{}/me/calendarView?startDateTime={}&endDateTime={}&$select={}&$top={}",
            self.base_url,
            urlencoding::encode(&start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            urlencoding::encode(&end.to_rfc3339_opts(SecondsFormat::Secs, true)),
            EVENT_FIELDS,
            PAGE_SIZE,
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .header("Prefer", OUTLOOK_TIMEZONE_HEADER)
            .send()
            .await?;

        let page: GraphEventList = self.handle_response(response).await?;
        if page.next_link.is_some() {
            tracing::debug!("Calendar view has more than {} events; later pages ignored", PAGE_SIZE);
        }

        let events = page
            .value
            .into_iter()
            .filter_map(|api_event| {
                let id = api_event.id.clone();
                match CalendarEvent::try_from(api_event) {
                    Ok(event) => Some(event),
                    Err(e) => {
                        tracing::warn!(event_id = %id, "Skipping event: {}", e);
                        None
                    }
                }
            })
            .collect::<Vec<_>>();

        let teams = events
            .iter()
            .filter(|e| e.source == crate::types::Provider::Teams)
            .count();
        tracing::debug!(
            "Fetched {} events from Graph ({} Teams meetings)",
            events.len(),
            teams
        );
        Ok(events)
    }

    /// Helper to handle API responses and errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, CalendarError> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| CalendarError::ApiError(format!("JSON parse error: {}", e)))
        } else if status.as_u16() == 401 {
            Err(CalendarError::Unauthorized)
        } else if status.as_u16() == 403 {
            Err(CalendarError::Forbidden)
        } else if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse().ok());
            Err(CalendarError::RateLimited {
                retry_after,
                local: false,
            })
        } else if status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            Err(CalendarError::Server {
                status: status.as_u16(),
                message: text,
            })
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(CalendarError::ApiError(format!("{}: {}", status, text)))
        }
    }
}

impl Default for GraphClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CalendarProvider for GraphClient {
    async fn fetch_events(
        &self,
        access_token: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        self.list_calendar_view(access_token, start, end).await
    }
}
