//! Business-time and SLA computation.
//!
//! An alert's "business time" age is computed over an 8-hour business day
//! (06:00-18:00 site local) on non-holiday weekdays, rather than wall-clock
//! elapsed time. This keeps SLA timers from ticking overnight or over a
//! holiday weekend.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

const BUSINESS_DAY_START_HOUR: u32 = 6;
const BUSINESS_DAY_END_HOUR: u32 = 18;

/// A holiday rule, evaluated per calendar year.
#[derive(Debug, Clone, Copy)]
enum HolidayRule {
    /// A fixed month/day, e.g. Independence Day (7, 4).
    FixedDate { month: u32, day: u32 },
    /// The Nth occurrence of a weekday in a month. `ordinal` is 1-based
    /// from the start of the month, or negative to count from the end
    /// (`-1` = last occurrence).
    WeekdayOfMonth {
        month: u32,
        weekday: Weekday,
        ordinal: i32,
    },
    /// A fixed number of days after another rule resolves, e.g. "the
    /// Friday after Thanksgiving".
    DaysAfter {
        base: &'static HolidayRule,
        days: i64,
    },
}

const THANKSGIVING: HolidayRule = HolidayRule::WeekdayOfMonth {
    month: 11,
    weekday: Weekday::Thu,
    ordinal: 4,
};

const HOLIDAY_RULES: &[HolidayRule] = &[
    HolidayRule::FixedDate { month: 1, day: 1 },   // New Year's Day
    HolidayRule::WeekdayOfMonth {
        month: 5,
        weekday: Weekday::Mon,
        ordinal: -1,
    }, // Memorial Day
    HolidayRule::FixedDate { month: 7, day: 4 },   // Independence Day
    HolidayRule::WeekdayOfMonth {
        month: 9,
        weekday: Weekday::Mon,
        ordinal: 1,
    }, // Labor Day
    THANKSGIVING,
    HolidayRule::DaysAfter {
        base: &THANKSGIVING,
        days: 1,
    }, // Day after Thanksgiving
    HolidayRule::FixedDate { month: 12, day: 24 }, // Christmas Eve
    HolidayRule::FixedDate { month: 12, day: 25 }, // Christmas Day
];

fn resolve_rule(rule: &HolidayRule, year: i32) -> Option<NaiveDate> {
    match rule {
        HolidayRule::FixedDate { month, day } => NaiveDate::from_ymd_opt(year, *month, *day),
        HolidayRule::WeekdayOfMonth {
            month,
            weekday,
            ordinal,
        } => nth_weekday_of_month(year, *month, *weekday, *ordinal),
        HolidayRule::DaysAfter { base, days } => {
            resolve_rule(base, year).map(|d| d + Duration::days(*days))
        }
    }
}

fn nth_weekday_of_month(year: i32, month: u32, weekday: Weekday, ordinal: i32) -> Option<NaiveDate> {
    if ordinal > 0 {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let offset = (7 + weekday.num_days_from_monday() as i64 - first.weekday().num_days_from_monday() as i64) % 7;
        let day = 1 + offset + 7 * (ordinal as i64 - 1);
        NaiveDate::from_ymd_opt(year, month, day as u32)
    } else {
        let next_month_first = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        let last_day = next_month_first - Duration::days(1);
        let offset = (7 + last_day.weekday().num_days_from_monday() as i64
            - weekday.num_days_from_monday() as i64)
            % 7;
        let day = last_day - Duration::days(offset + 7 * (ordinal.unsigned_abs() as i64 - 1));
        Some(day)
    }
}

/// The set of observed holiday dates for `year`, including weekend-shifted
/// observances. A holiday falling on Saturday is also observed the
/// preceding Friday; one falling on Sunday is also observed the following
/// Monday. Both the actual and the observed date count as holidays.
fn holidays_for_year(year: i32) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    for rule in HOLIDAY_RULES {
        let Some(actual) = resolve_rule(rule, year) else {
            continue;
        };
        dates.push(actual);
        match actual.weekday() {
            Weekday::Sat => dates.push(actual - Duration::days(1)),
            Weekday::Sun => dates.push(actual + Duration::days(1)),
            _ => {}
        }
    }
    dates
}

fn is_holiday(date: NaiveDate) -> bool {
    holidays_for_year(date.year()).contains(&date)
}

/// A weekday (Mon-Fri) that is not an observed holiday.
pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !is_holiday(date)
}

/// Business-time seconds elapsed between `start` and `end` (order-
/// independent: returns the absolute value), counting only the
/// intersection of each business day's 06:00-18:00 window with the
/// `[start, end]` span.
pub fn business_seconds_between(start: NaiveDateTime, end: NaiveDateTime) -> i64 {
    let (start, end) = if start <= end { (start, end) } else { (end, start) };

    let mut total = 0i64;
    let mut date = start.date();
    while date <= end.date() {
        if is_business_day(date) {
            let window_start = date
                .and_time(NaiveTime::from_hms_opt(BUSINESS_DAY_START_HOUR, 0, 0).unwrap_or_default());
            let window_end = date
                .and_time(NaiveTime::from_hms_opt(BUSINESS_DAY_END_HOUR, 0, 0).unwrap_or_default());

            let overlap_start = start.max(window_start);
            let overlap_end = end.min(window_end);
            if overlap_start < overlap_end {
                total += (overlap_end - overlap_start).num_seconds();
            }
        }
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }
    total
}

/// Renders a business-time duration as `"N days, M hours"` (or `"M hours"`
/// when under a day), matching the original's human-readable rendering.
pub fn business_time_str(seconds: i64) -> String {
    let hours_total = seconds / 3600;
    let days = hours_total / 8;
    let hours = hours_total % 8;
    if days > 0 {
        format!("{days} day{}, {hours} hour{}", plural(days), plural(hours))
    } else {
        format!("{hours} hour{}", plural(hours))
    }
}

fn plural(n: i64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_new_years_day_is_holiday() {
        assert!(is_holiday(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()));
    }

    #[test]
    fn test_independence_day_on_saturday_observed_friday() {
        // July 4, 2026 is a Saturday.
        let actual = NaiveDate::from_ymd_opt(2026, 7, 4).unwrap();
        assert_eq!(actual.weekday(), Weekday::Sat);
        assert!(is_holiday(actual));
        assert!(is_holiday(actual - Duration::days(1)));
    }

    #[test]
    fn test_thanksgiving_and_day_after() {
        let thanksgiving = NaiveDate::from_ymd_opt(2026, 11, 26).unwrap();
        assert_eq!(thanksgiving.weekday(), Weekday::Thu);
        assert!(is_holiday(thanksgiving));
        assert!(is_holiday(thanksgiving + Duration::days(1)));
    }

    #[test]
    fn test_weekend_is_not_business_day() {
        let saturday = NaiveDate::from_ymd_opt(2026, 7, 25).unwrap();
        assert_eq!(saturday.weekday(), Weekday::Sat);
        assert!(!is_business_day(saturday));
    }

    #[test]
    fn test_business_seconds_within_single_day() {
        let start = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap().and_hms_opt(8, 0, 0).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap().and_hms_opt(10, 0, 0).unwrap();
        assert_eq!(business_seconds_between(start, end), 2 * 3600);
    }

    #[test]
    fn test_business_seconds_outside_window_is_zero() {
        let start = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap().and_hms_opt(20, 0, 0).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap().and_hms_opt(23, 0, 0).unwrap();
        assert_eq!(business_seconds_between(start, end), 0);
    }

    #[test]
    fn test_business_seconds_spans_weekend() {
        // Friday 17:00 to Monday 07:00: 1 hour Friday + 1 hour Monday.
        let friday = NaiveDate::from_ymd_opt(2026, 7, 24).unwrap();
        assert_eq!(friday.weekday(), Weekday::Fri);
        let start = friday.and_hms_opt(17, 0, 0).unwrap();
        let end = (friday + Duration::days(3)).and_hms_opt(7, 0, 0).unwrap();
        assert_eq!(business_seconds_between(start, end), 2 * 3600);
    }

    #[test]
    fn test_business_time_str_formatting() {
        assert_eq!(business_time_str(3600), "1 hour");
        assert_eq!(business_time_str(2 * 3600), "2 hours");
        assert_eq!(business_time_str(8 * 3600), "1 day, 0 hours");
        assert_eq!(business_time_str(10 * 3600), "1 day, 2 hours");
    }
}
