//! Placeholder events shown when live calendar data is unavailable.

use chrono::{Duration, NaiveDate, NaiveTime};
use rand::Rng;

use crate::grid::{days_in_month, first_of_month};
use crate::types::{CalendarEvent, Provider};

const MOCK_SOURCES: [Provider; 3] = [Provider::Teams, Provider::Outlook, Provider::Manual];

/// `count` events on random days of `base`'s month.
pub fn generate_mock_events(base: NaiveDate, count: usize) -> Vec<CalendarEvent> {
    generate_mock_events_with(&mut rand::rng(), base, count)
}

/// Same as [`generate_mock_events`] with a caller-supplied RNG.
///
/// Events start on the hour between 9:00 and 16:00 and last one to three hours.
pub fn generate_mock_events_with<R: Rng + ?Sized>(
    rng: &mut R,
    base: NaiveDate,
    count: usize,
) -> Vec<CalendarEvent> {
    let first = first_of_month(base);
    let days = days_in_month(base);

    (0..count)
        .map(|i| {
            let day = first + Duration::days(i64::from(rng.random_range(0..days)));
            let start_hour = rng.random_range(9..17);
            let duration_hours = rng.random_range(1..=3);
            let source = MOCK_SOURCES[rng.random_range(0..MOCK_SOURCES.len())];

            let start = (day.and_time(NaiveTime::MIN) + Duration::hours(start_hour)).and_utc();
            let end = start + Duration::hours(duration_hours);

            CalendarEvent {
                id: format!("event-{}", i),
                title: format!("Event {}", i + 1),
                start,
                end,
                description: Some(format!("Description for event {}", i + 1)),
                location: None,
                is_virtual: rng.random_bool(0.5),
                is_all_day: false,
                source,
                color: Some(source.color().to_string()),
                attendees: Vec::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use chrono::{Datelike, Timelike};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generates_requested_count_in_month() {
        let base = NaiveDate::from_ymd_opt(2024, 2, 14).unwrap();
        let events = generate_mock_events(base, 20);

        assert_eq!(events.len(), 20);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.id, format!("event-{}", i));
            assert_eq!(event.title, format!("Event {}", i + 1));
            assert_eq!(event.start.year(), 2024);
            assert_eq!(event.start.month(), 2);
            assert!((9..=16).contains(&event.start.hour()));
            let hours = (event.end - event.start).num_hours();
            assert!((1..=3).contains(&hours));
            assert_ne!(event.source, Provider::Google);
            assert_eq!(event.color.as_deref(), Some(event.source.color()));
        }
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let base = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let a = generate_mock_events_with(&mut StdRng::seed_from_u64(7), base, 10);
        let b = generate_mock_events_with(&mut StdRng::seed_from_u64(7), base, 10);
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_count() {
        let base = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        assert!(generate_mock_events(base, 0).is_empty());
    }
}
