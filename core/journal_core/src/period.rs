//! Calendar windows and window totals.
//!
//! All boundaries are computed in the offset carried by the input
//! `OffsetDateTime`, which stands in for the user's local calendar.

use time::{Duration, OffsetDateTime, Time, UtcOffset};

use crate::model::{ChartDataPoint, Entry};

pub const TZ_OFFSET_MINUTES_MIN: i32 = -14 * 60;
pub const TZ_OFFSET_MINUTES_MAX: i32 = 14 * 60;

pub fn normalize_tz_offset_minutes(v: Option<i32>) -> i32 {
    v.unwrap_or(0)
        .clamp(TZ_OFFSET_MINUTES_MIN, TZ_OFFSET_MINUTES_MAX)
}

pub fn tz_offset_from_minutes(minutes: i32) -> UtcOffset {
    UtcOffset::from_whole_seconds(minutes.saturating_mul(60)).unwrap_or(UtcOffset::UTC)
}

pub fn from_millis(ms: i64, offset: UtcOffset) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
        .to_offset(offset)
}

pub fn to_millis(dt: OffsetDateTime) -> i64 {
    (dt.unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn start_of_day(dt: OffsetDateTime) -> OffsetDateTime {
    dt.replace_time(Time::MIDNIGHT)
}

/// 23:59:59.999 on the same calendar day.
pub fn end_of_day(dt: OffsetDateTime) -> OffsetDateTime {
    start_of_day(dt) + Duration::days(1) - Duration::milliseconds(1)
}

/// Monday of the week containing `dt`, at midnight.
///
/// With Sunday as day 0 the shift is `-dow + 1`, except Sunday itself which
/// goes back six days: Sunday closes a week rather than opening one.
pub fn start_of_week(dt: OffsetDateTime) -> OffsetDateTime {
    let dow = i64::from(dt.weekday().number_days_from_sunday());
    let shift = -dow + if dow == 0 { -6 } else { 1 };
    start_of_day(dt + Duration::days(shift))
}

pub fn end_of_week(dt: OffsetDateTime) -> OffsetDateTime {
    end_of_day(start_of_week(dt) + Duration::days(6))
}

pub fn start_of_month(dt: OffsetDateTime) -> OffsetDateTime {
    start_of_day(dt - Duration::days(i64::from(dt.day()) - 1))
}

pub fn end_of_month(dt: OffsetDateTime) -> OffsetDateTime {
    let last = dt.month().length(dt.year());
    end_of_day(dt + Duration::days(i64::from(last) - i64::from(dt.day())))
}

/// First instant of the month `months` calendar months before the one containing `dt`.
pub fn months_back(dt: OffsetDateTime, months: u32) -> OffsetDateTime {
    let mut first = start_of_month(dt);
    for _ in 0..months {
        first = start_of_month(first - Duration::days(1));
    }
    first
}

/// Sums every entry with `start <= timestamp <= end` (both in epoch millis).
pub fn aggregate(
    entries: &[Entry],
    start: OffsetDateTime,
    end: OffsetDateTime,
    label: impl Into<String>,
) -> ChartDataPoint {
    let start_ms = to_millis(start);
    let end_ms = to_millis(end);

    let mut point = ChartDataPoint {
        name: label.into(),
        calories: 0.0,
        fat: 0.0,
        sugar: 0.0,
    };
    for e in entries
        .iter()
        .filter(|e| e.timestamp >= start_ms && e.timestamp <= end_ms)
    {
        point.calories += e.nutrition.calories;
        point.fat += e.nutrition.fat;
        point.sugar += e.nutrition.sugar;
    }
    point
}
