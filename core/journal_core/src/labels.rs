//! Indonesian (`id-ID`) calendar names for chart labels and entry dates.

use time::{Month, OffsetDateTime, UtcOffset, Weekday};

use crate::period::from_millis;

pub fn weekday_short(w: Weekday) -> &'static str {
    match w {
        Weekday::Sunday => "Min",
        Weekday::Monday => "Sen",
        Weekday::Tuesday => "Sel",
        Weekday::Wednesday => "Rab",
        Weekday::Thursday => "Kam",
        Weekday::Friday => "Jum",
        Weekday::Saturday => "Sab",
    }
}

pub fn month_short(m: Month) -> &'static str {
    match m {
        Month::January => "Jan",
        Month::February => "Feb",
        Month::March => "Mar",
        Month::April => "Apr",
        Month::May => "Mei",
        Month::June => "Jun",
        Month::July => "Jul",
        Month::August => "Agu",
        Month::September => "Sep",
        Month::October => "Okt",
        Month::November => "Nov",
        Month::December => "Des",
    }
}

pub fn month_long(m: Month) -> &'static str {
    match m {
        Month::January => "Januari",
        Month::February => "Februari",
        Month::March => "Maret",
        Month::April => "April",
        Month::May => "Mei",
        Month::June => "Juni",
        Month::July => "Juli",
        Month::August => "Agustus",
        Month::September => "September",
        Month::October => "Oktober",
        Month::November => "November",
        Month::December => "Desember",
    }
}

/// "Sab 17"
pub fn day_label(dt: OffsetDateTime) -> String {
    format!("{} {}", weekday_short(dt.weekday()), dt.day())
}

/// "12 Okt - 18 Okt"
pub fn week_label(start: OffsetDateTime, end: OffsetDateTime) -> String {
    format!(
        "{} {} - {} {}",
        start.day(),
        month_short(start.month()),
        end.day(),
        month_short(end.month())
    )
}

/// "Oktober 2026"
pub fn month_label(dt: OffsetDateTime) -> String {
    format!("{} {}", month_long(dt.month()), dt.year())
}

/// "17 Oktober 2026"
pub fn format_date(timestamp_ms: i64, offset: UtcOffset) -> String {
    let dt = from_millis(timestamp_ms, offset);
    format!("{} {} {}", dt.day(), month_long(dt.month()), dt.year())
}

/// "17 Okt 2026, 14.05"
pub fn format_date_time(timestamp_ms: i64, offset: UtcOffset) -> String {
    let dt = from_millis(timestamp_ms, offset);
    format!(
        "{} {} {}, {:02}.{:02}",
        dt.day(),
        month_short(dt.month()),
        dt.year(),
        dt.hour(),
        dt.minute()
    )
}
