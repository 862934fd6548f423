use std::collections::BTreeSet;

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

pub const PRE_TERM_WEEK: i32 = 0;
pub const LUNAR_BREAK_WEEK: i32 = -1;
pub const PRE_TERM_LABEL: &str = "pre-term";
pub const LUNAR_BREAK_LABEL: &str = "lunar new year break";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Both endpoints are part of the range.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarConfig {
    pub term_start: NaiveDate,
    #[serde(default)]
    pub lunar_break: Option<DateRange>,
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        let day = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default();
        Self {
            term_start: day(2025, 9, 7),
            lunar_break: Some(DateRange {
                start: day(2026, 2, 9),
                end: day(2026, 2, 22),
            }),
            holidays: vec![
                day(2025, 9, 2),
                day(2026, 1, 1),
                day(2026, 4, 26),
                day(2026, 4, 30),
                day(2026, 5, 1),
            ],
        }
    }
}

/// Where a date sits in the school year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekInfo {
    pub week_index: i32,
    pub week_label: String,
    /// Last day of the week; only set for teaching weeks (index >= 1).
    pub week_end_date: Option<NaiveDate>,
    pub report_month_label: String,
    pub is_holiday: bool,
    /// `year * 1000 + week`, with the lunar break sorted after every week of its year.
    pub sort_key: i64,
}

#[derive(Debug, Clone)]
pub struct CalendarResolver {
    config: CalendarConfig,
    holidays: BTreeSet<NaiveDate>,
}

impl Default for CalendarResolver {
    fn default() -> Self {
        let config = CalendarConfig::default();
        let holidays = config.holidays.iter().copied().collect();
        Self { config, holidays }
    }
}

impl CalendarResolver {
    pub fn new(config: CalendarConfig) -> Result<Self> {
        if let Some(range) = &config.lunar_break {
            if range.start > range.end {
                return Err(LedgerError::InvalidCalendar(format!(
                    "lunar break starts {} after it ends {}",
                    range.start, range.end
                )));
            }
        }
        let holidays = config.holidays.iter().copied().collect();
        Ok(Self { config, holidays })
    }

    pub fn config(&self) -> &CalendarConfig {
        &self.config
    }

    pub fn resolve(&self, date: NaiveDate) -> WeekInfo {
        let report_month_label = report_month_label(date);
        let year_key = i64::from(date.year()) * 1000;

        if let Some(range) = &self.config.lunar_break {
            if range.contains(date) {
                return WeekInfo {
                    week_index: LUNAR_BREAK_WEEK,
                    week_label: LUNAR_BREAK_LABEL.to_string(),
                    week_end_date: None,
                    report_month_label,
                    is_holiday: true,
                    sort_key: year_key + 999,
                };
            }
        }

        let is_holiday = self.holidays.contains(&date);

        if date < self.config.term_start {
            return WeekInfo {
                week_index: PRE_TERM_WEEK,
                week_label: PRE_TERM_LABEL.to_string(),
                week_end_date: None,
                report_month_label,
                is_holiday,
                sort_key: year_key,
            };
        }

        let offset = (date - self.config.term_start).num_days();
        let week_index = i32::try_from(offset / 7 + 1).unwrap_or(i32::MAX);
        let (start, end) = self
            .span_from_offset(offset)
            .unwrap_or((date, NaiveDate::MAX));

        WeekInfo {
            week_index,
            week_label: week_label(week_index, start, end),
            week_end_date: Some(end),
            report_month_label,
            is_holiday,
            sort_key: year_key + i64::from(week_index),
        }
    }

    pub fn resolve_str(&self, raw: &str) -> Result<WeekInfo> {
        parse_date(raw).map(|date| self.resolve(date))
    }

    /// First and last day of a teaching week.
    pub fn week_bounds(&self, week_index: i32) -> Option<(NaiveDate, NaiveDate)> {
        if week_index < 1 {
            return None;
        }
        let offset = i64::from(week_index - 1) * 7;
        self.span_from_offset(offset)
    }

    /// Week containing `offset` days after term start. `None` when the week
    /// starts past the last representable date; its end saturates there.
    fn span_from_offset(&self, offset: i64) -> Option<(NaiveDate, NaiveDate)> {
        let whole_weeks = u64::try_from(offset / 7 * 7).ok()?;
        let start = self.config.term_start.checked_add_days(Days::new(whole_weeks))?;
        let end = start
            .checked_add_days(Days::new(6))
            .unwrap_or(NaiveDate::MAX);
        Some((start, end))
    }
}

fn week_label(week_index: i32, start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "Week {} ({} - {})",
        week_index,
        start.format("%d/%m"),
        end.format("%d/%m")
    )
}

pub fn report_month_label(date: NaiveDate) -> String {
    format!("{}/{}", date.month(), date.year())
}

/// Orders `"m/yyyy"` labels as `(year, month)`.
pub fn month_sort_key(label: &str) -> Option<(i32, u32)> {
    let (month, year) = label.trim().split_once('/')?;
    let month: u32 = month.parse().ok()?;
    let year: i32 = year.parse().ok()?;
    (1..=12).contains(&month).then_some((year, month))
}

/// Parses a day/month/year date such as `5/9/2025` or `05/09/2025`.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let unparseable = || LedgerError::UnparseableDate(raw.to_string());
    let parts: Vec<&str> = raw.trim().split('/').collect();
    let [day, month, year] = parts.as_slice() else {
        return Err(unparseable());
    };

    let numeric = |part: &str, min: usize, max: usize| {
        let len = part.len();
        (min..=max).contains(&len) && part.bytes().all(|b| b.is_ascii_digit())
    };
    if !numeric(*day, 1, 2) || !numeric(*month, 1, 2) || !numeric(*year, 4, 4) {
        return Err(unparseable());
    }

    let day: u32 = day.parse().map_err(|_| unparseable())?;
    let month: u32 = month.parse().map_err(|_| unparseable())?;
    let year: i32 = year.parse().map_err(|_| unparseable())?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(unparseable)
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn term_start_is_week_one() {
        let resolver = CalendarResolver::default();
        let info = resolver.resolve(day(2025, 9, 7));
        assert_eq!(info.week_index, 1);
        assert_eq!(info.week_label, "Week 1 (07/09 - 13/09)");
        assert_eq!(info.week_end_date, Some(day(2025, 9, 13)));
        assert!(!info.is_holiday);
    }

    #[test]
    fn day_before_term_is_pre_term() {
        let resolver = CalendarResolver::default();
        let info = resolver.resolve(day(2025, 9, 6));
        assert_eq!(info.week_index, PRE_TERM_WEEK);
        assert_eq!(info.week_label, PRE_TERM_LABEL);
        assert_eq!(info.week_end_date, None);
    }

    #[test]
    fn seventh_day_starts_week_two() {
        let resolver = CalendarResolver::default();
        assert_eq!(resolver.resolve(day(2025, 9, 13)).week_index, 1);
        assert_eq!(resolver.resolve(day(2025, 9, 14)).week_index, 2);
    }

    #[test]
    fn lunar_break_is_inclusive_on_both_ends() {
        let resolver = CalendarResolver::default();
        for date in [day(2026, 2, 9), day(2026, 2, 17), day(2026, 2, 22)] {
            let info = resolver.resolve(date);
            assert_eq!(info.week_index, LUNAR_BREAK_WEEK);
            assert_eq!(info.week_label, LUNAR_BREAK_LABEL);
            assert!(info.is_holiday);
        }
        assert!(resolver.resolve(day(2026, 2, 8)).week_index > 0);
        assert!(resolver.resolve(day(2026, 2, 23)).week_index > 0);
    }

    #[test]
    fn holiday_keeps_its_week() {
        let resolver = CalendarResolver::default();
        let info = resolver.resolve(day(2026, 1, 1));
        assert!(info.is_holiday);
        assert_eq!(info.week_index, 17);

        let pre_term_holiday = resolver.resolve(day(2025, 9, 2));
        assert!(pre_term_holiday.is_holiday);
        assert_eq!(pre_term_holiday.week_index, PRE_TERM_WEEK);
    }

    #[test]
    fn report_month_follows_the_date_not_the_week() {
        let resolver = CalendarResolver::default();
        // Week 4 runs 28/09 - 04/10.
        let end_of_september = resolver.resolve(day(2025, 9, 30));
        let start_of_october = resolver.resolve(day(2025, 10, 2));
        assert_eq!(end_of_september.week_index, start_of_october.week_index);
        assert_eq!(end_of_september.report_month_label, "9/2025");
        assert_eq!(start_of_october.report_month_label, "10/2025");
    }

    #[test]
    fn resolving_twice_is_identical() {
        let resolver = CalendarResolver::default();
        let date = day(2025, 11, 20);
        assert_eq!(resolver.resolve(date), resolver.resolve(date));
    }

    #[test]
    fn sort_key_places_break_last_in_its_year() {
        let resolver = CalendarResolver::default();
        let before = resolver.resolve(day(2026, 2, 2));
        let during = resolver.resolve(day(2026, 2, 10));
        let after = resolver.resolve(day(2026, 3, 2));
        assert!(during.sort_key > after.sort_key);
        assert!(after.sort_key > before.sort_key);
    }

    #[test]
    fn week_bounds_match_resolved_labels() {
        let resolver = CalendarResolver::default();
        assert_eq!(resolver.week_bounds(0), None);
        assert_eq!(
            resolver.week_bounds(3),
            Some((day(2025, 9, 21), day(2025, 9, 27)))
        );
    }

    #[test]
    fn rejects_inverted_break() {
        let config = CalendarConfig {
            term_start: day(2025, 9, 7),
            lunar_break: Some(DateRange {
                start: day(2026, 2, 22),
                end: day(2026, 2, 9),
            }),
            holidays: Vec::new(),
        };
        assert!(matches!(
            CalendarResolver::new(config),
            Err(LedgerError::InvalidCalendar(_))
        ));
    }

    #[test]
    fn parses_day_month_year() {
        assert_eq!(parse_date("5/9/2025").unwrap(), day(2025, 9, 5));
        assert_eq!(parse_date(" 05/09/2025 ").unwrap(), day(2025, 9, 5));
        assert_eq!(format_date(day(2025, 9, 5)), "05/09/2025");
    }

    #[test]
    fn unparseable_dates_fail_fast() {
        for raw in ["", "2025-09-05", "31/02/2025", "5/9/25", "a/b/cccc", "1/2/3/2025"] {
            assert!(
                matches!(parse_date(raw), Err(LedgerError::UnparseableDate(_))),
                "{raw:?} should not parse"
            );
        }
        let resolver = CalendarResolver::default();
        assert!(resolver.resolve_str("13/13/2025").is_err());
    }

    #[test]
    fn month_labels_sort_by_year_then_month() {
        assert_eq!(month_sort_key("9/2025"), Some((2025, 9)));
        assert!(month_sort_key("1/2026") > month_sort_key("12/2025"));
        assert_eq!(month_sort_key("13/2025"), None);
    }

    #[test]
    fn weeks_at_the_end_of_the_date_range_saturate() {
        let term_start = NaiveDate::MAX - Days::new(3);
        let resolver = CalendarResolver::new(CalendarConfig {
            term_start,
            lunar_break: None,
            holidays: Vec::new(),
        })
        .unwrap();

        let info = resolver.resolve(NaiveDate::MAX);
        assert_eq!(info.week_index, 1);
        assert_eq!(info.week_end_date, Some(NaiveDate::MAX));
        assert_eq!(resolver.week_bounds(1), Some((term_start, NaiveDate::MAX)));
        assert_eq!(resolver.week_bounds(2), None);

        let default = CalendarResolver::default();
        assert!(default.resolve(NaiveDate::MAX).week_index > 1);
        assert_eq!(default.week_bounds(i32::MAX), None);
    }
}
