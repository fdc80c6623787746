use time::{OffsetDateTime, UtcOffset};

const MINUTES_PER_DAY: u32 = 1440;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDayMatch {
    pub matches: bool,
    /// Smallest wrap-around distance, in minutes, between any visit and now.
    pub closest_minutes: Option<u32>,
    pub visits_in_window: usize,
}

/// Minute of the day (0..1440) at which `timestamp_ms` falls in `offset`.
pub fn minute_of_day(timestamp_ms: i64, offset: UtcOffset) -> Option<u32> {
    let at = OffsetDateTime::from_unix_timestamp_nanos(timestamp_ms as i128 * 1_000_000).ok()?;
    let local = at.to_offset(offset);
    Some(local.hour() as u32 * 60 + local.minute() as u32)
}

/// Distance between two minutes of the day, wrapping across midnight.
pub fn circular_distance(a: u32, b: u32) -> u32 {
    let diff = a.abs_diff(b) % MINUTES_PER_DAY;
    diff.min(MINUTES_PER_DAY - diff)
}

/// Whether any visit falls within `window_minutes` of the clock time of `now`.
/// Visits are read in `now`'s offset.
pub fn match_time_of_day(visits: &[i64], now: OffsetDateTime, window_minutes: u32) -> TimeOfDayMatch {
    let current = now.hour() as u32 * 60 + now.minute() as u32;
    let distances: Vec<u32> = visits
        .iter()
        .filter_map(|visit| minute_of_day(*visit, now.offset()))
        .map(|minute| circular_distance(minute, current))
        .collect();
    let visits_in_window = distances.iter().filter(|d| **d <= window_minutes).count();
    TimeOfDayMatch {
        matches: visits_in_window > 0,
        closest_minutes: distances.iter().copied().min(),
        visits_in_window,
    }
}
