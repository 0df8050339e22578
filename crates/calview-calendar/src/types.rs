//! Calendar event types and the Microsoft Graph wire format.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CalendarError;

/// Where an event came from; also decides its display colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Teams,
    Outlook,
    Google,
    Manual,
}

impl Provider {
    pub fn color(&self) -> &'static str {
        match self {
            Provider::Teams => "#7b83eb",
            Provider::Outlook => "#71afe5",
            Provider::Google => "#4285f4",
            Provider::Manual => "#3aa0f3",
        }
    }
}

/// Calendar event as handed to the views. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub is_virtual: bool,
    pub is_all_day: bool,
    pub source: Provider,
    pub color: Option<String>,
    pub attendees: Vec<Attendee>,
}

/// Event attendee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub name: String,
    pub email: String,
    pub response: AttendeeResponse,
}

/// Attendee response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendeeResponse {
    Accepted,
    Declined,
    Tentative,
    #[default]
    None,
}

impl CalendarEvent {
    /// True when the event intersects `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && self.end > start
    }
}

// Graph Response Types

/// `GET /me/calendarView` response page.
#[derive(Debug, Deserialize)]
pub struct GraphEventList {
    #[serde(default)]
    pub value: Vec<GraphEvent>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEvent {
    pub id: String,
    pub subject: Option<String>,
    pub body_preview: Option<String>,
    pub start: GraphDateTime,
    pub end: GraphDateTime,
    pub location: Option<GraphLocation>,
    #[serde(default)]
    pub is_online_meeting: bool,
    pub online_meeting_url: Option<String>,
    pub online_meeting_provider: Option<String>,
    #[serde(default)]
    pub is_all_day: bool,
    #[serde(default)]
    pub attendees: Vec<GraphAttendee>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDateTime {
    pub date_time: String,
    pub time_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphLocation {
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphAttendee {
    pub email_address: GraphEmailAddress,
    pub status: Option<GraphResponseStatus>,
}

#[derive(Debug, Deserialize)]
pub struct GraphEmailAddress {
    pub name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GraphResponseStatus {
    pub response: Option<String>,
}

impl GraphEvent {
    /// Online meeting hosted on Teams, judged by provider, join URL, or body text.
    pub fn is_teams_meeting(&self) -> bool {
        if !self.is_online_meeting {
            return false;
        }
        self.online_meeting_provider.as_deref() == Some("teamsForBusiness")
            || self
                .online_meeting_url
                .as_deref()
                .is_some_and(|url| url.contains("teams.microsoft.com"))
            || self
                .body_preview
                .as_deref()
                .is_some_and(|body| body.to_lowercase().contains("teams"))
    }
}

impl TryFrom<GraphEvent> for CalendarEvent {
    type Error = CalendarError;

    fn try_from(api: GraphEvent) -> Result<Self, Self::Error> {
        let start = parse_graph_datetime(&api.start.date_time)?;
        let end = parse_graph_datetime(&api.end.date_time)?;
        let source = if api.is_teams_meeting() {
            Provider::Teams
        } else {
            Provider::Outlook
        };

        let attendees = api
            .attendees
            .into_iter()
            .filter_map(|a| {
                let email = a.email_address.address?;
                let response = match a.status.and_then(|s| s.response).as_deref() {
                    Some("accepted") | Some("organizer") => AttendeeResponse::Accepted,
                    Some("declined") => AttendeeResponse::Declined,
                    Some("tentativelyAccepted") => AttendeeResponse::Tentative,
                    _ => AttendeeResponse::None,
                };
                Some(Attendee {
                    name: a.email_address.name.unwrap_or_else(|| email.clone()),
                    email,
                    response,
                })
            })
            .collect();

        Ok(Self {
            id: api.id,
            title: api
                .subject
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "Untitled Event".to_string()),
            start,
            end,
            description: api.body_preview.filter(|s| !s.is_empty()),
            location: api
                .location
                .and_then(|l| l.display_name)
                .filter(|s| !s.is_empty()),
            is_virtual: api.is_online_meeting,
            is_all_day: api.is_all_day,
            source,
            color: Some(source.color().to_string()),
            attendees,
        })
    }
}

/// Parse a Graph `dateTime`. With `Prefer: outlook.timezone="UTC"` these come
/// back without an offset (`2024-02-01T10:00:00.0000000`).
fn parse_graph_datetime(value: &str) -> Result<DateTime<Utc>, CalendarError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| CalendarError::InvalidEventData(format!("bad dateTime {:?}: {}", value, e)))
}
