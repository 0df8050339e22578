//! Date grids and event grouping for the month/week/day/agenda views.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

use crate::types::{CalendarEvent, Provider};

/// Cells shown by the month view: six Sunday-first weeks.
pub const MONTH_GRID_DAYS: usize = 42;

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.day0()))
}

pub fn days_in_month(date: NaiveDate) -> u32 {
    match date.month() {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ => {
            if NaiveDate::from_ymd_opt(date.year(), 2, 29).is_some() {
                29
            } else {
                28
            }
        }
    }
}

/// 42 consecutive days starting on the Sunday on or before the 1st of
/// `date`'s month; leading and trailing cells come from the adjacent months.
pub fn month_grid(date: NaiveDate) -> Vec<NaiveDate> {
    let first = first_of_month(date);
    let start = first - Duration::days(i64::from(first.weekday().num_days_from_sunday()));
    start.iter_days().take(MONTH_GRID_DAYS).collect()
}

/// Sunday through Saturday of the week containing `date`.
pub fn week_days(date: NaiveDate) -> Vec<NaiveDate> {
    let start = date - Duration::days(i64::from(date.weekday().num_days_from_sunday()));
    start.iter_days().take(7).collect()
}

pub fn is_current_month(day: NaiveDate, focus: NaiveDate) -> bool {
    day.year() == focus.year() && day.month() == focus.month()
}

/// Events starting on `day`, in start order.
pub fn events_for_day(events: &[CalendarEvent], day: NaiveDate) -> Vec<&CalendarEvent> {
    let mut matching: Vec<&CalendarEvent> = events
        .iter()
        .filter(|e| e.start.date_naive() == day)
        .collect();
    matching.sort_by_key(|e| e.start);
    matching
}

/// Events grouped by start day, for the agenda view.
pub fn agenda(events: &[CalendarEvent]) -> BTreeMap<NaiveDate, Vec<&CalendarEvent>> {
    let mut days: BTreeMap<NaiveDate, Vec<&CalendarEvent>> = BTreeMap::new();
    for event in events {
        days.entry(event.start.date_naive()).or_default().push(event);
    }
    for day in days.values_mut() {
        day.sort_by_key(|e| e.start);
    }
    days
}

pub fn filter_by_source(events: &[CalendarEvent], source: Provider) -> Vec<CalendarEvent> {
    events
        .iter()
        .filter(|e| e.source == source)
        .cloned()
        .collect()
}

/// `9:00 AM` style time label.
pub fn format_event_time(time: DateTime<Utc>) -> String {
    time.format("%-I:%M %p").to_string()
}
