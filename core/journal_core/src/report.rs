use time::{Duration, OffsetDateTime};

use crate::labels::{day_label, month_label, week_label};
use crate::model::{ChartDataPoint, Entry, ReportPeriod, Summary};
use crate::period::{
    aggregate, end_of_day, end_of_month, end_of_week, months_back, start_of_day, start_of_month,
    start_of_week,
};

pub const DAILY_POINTS: u32 = 7;
pub const WEEKLY_POINTS: u32 = 4;
pub const MONTHLY_POINTS: u32 = 6;

/// Chart series for `period`, oldest point first. `now` carries the local offset.
pub fn build(period: ReportPeriod, entries: &[Entry], now: OffsetDateTime) -> Vec<ChartDataPoint> {
    match period {
        ReportPeriod::Daily => daily(entries, now, DAILY_POINTS),
        ReportPeriod::Weekly => weekly(entries, now, WEEKLY_POINTS),
        ReportPeriod::Monthly => monthly(entries, now, MONTHLY_POINTS),
    }
}

pub fn daily(entries: &[Entry], now: OffsetDateTime, days: u32) -> Vec<ChartDataPoint> {
    let mut out = Vec::with_capacity(days as usize);
    for i in 0..days {
        let date = now - Duration::days(i64::from(i));
        out.push(aggregate(
            entries,
            start_of_day(date),
            end_of_day(date),
            day_label(date),
        ));
    }
    out.reverse();
    out
}

pub fn weekly(entries: &[Entry], now: OffsetDateTime, weeks: u32) -> Vec<ChartDataPoint> {
    let mut out = Vec::with_capacity(weeks as usize);
    for i in 0..weeks {
        let date = now - Duration::days(i64::from(i) * 7);
        let start = start_of_week(date);
        let end = end_of_week(date);
        out.push(aggregate(entries, start, end, week_label(start, end)));
    }
    out.reverse();
    out
}

pub fn monthly(entries: &[Entry], now: OffsetDateTime, months: u32) -> Vec<ChartDataPoint> {
    let mut out = Vec::with_capacity(months as usize);
    for i in 0..months {
        let start = months_back(now, i);
        out.push(aggregate(
            entries,
            start,
            end_of_month(start),
            month_label(start),
        ));
    }
    out.reverse();
    out
}

/// Running totals for the current day, week and month. Partial periods are not extrapolated.
pub fn summary(entries: &[Entry], now: OffsetDateTime) -> Summary {
    Summary {
        today: aggregate(entries, start_of_day(now), end_of_day(now), "Today"),
        this_week: aggregate(entries, start_of_week(now), end_of_week(now), "This Week"),
        this_month: aggregate(entries, start_of_month(now), end_of_month(now), "This Month"),
    }
}
