//! Microsoft Graph calendar integration for CalView.
//!
//! Provides the Graph client, a shared request quota, retrying fetches with
//! backoff, and an event source that falls back to placeholder events.

pub mod client;
pub mod error;
pub mod fetcher;
pub mod grid;
pub mod mock;
pub mod rate_limit;
pub mod source;
pub mod types;

pub use client::{CalendarProvider, GraphClient};
pub use error::{CalendarError, ErrorClass, FetchError};
pub use fetcher::{RetryPolicy, RetryState, RetryingFetcher};
pub use mock::generate_mock_events;
pub use rate_limit::{RateLimitExceeded, RateLimiter, RateWindow};
pub use source::{DataOrigin, EventSource, LoadedEvents, Notice, NoticeLevel};
pub use types::{Attendee, AttendeeResponse, CalendarEvent, Provider};
