use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::{month_sort_key, CalendarResolver};
use crate::models::{Event, Student, Viewer};

/// A system-wide time bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    Week(i32),
    Month(String),
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Week(index) => write!(f, "week {index}"),
            Period::Month(label) => write!(f, "month {label}"),
        }
    }
}

/// Read-only event selection by class and calendar bucket. Buckets are always
/// recomputed from each event's date, never cached on the event.
#[derive(Debug, Clone, Copy)]
pub struct PeriodAggregator<'c> {
    calendar: &'c CalendarResolver,
}

impl<'c> PeriodAggregator<'c> {
    pub fn new(calendar: &'c CalendarResolver) -> Self {
        Self { calendar }
    }

    pub fn calendar(&self) -> &'c CalendarResolver {
        self.calendar
    }

    pub fn by_class<'e, S: AsRef<str>>(&self, events: &'e [Event], classes: &[S]) -> Vec<&'e Event> {
        events
            .iter()
            .filter(|event| contains(classes, &event.class_name))
            .collect()
    }

    pub fn by_class_and_weeks<'e, S: AsRef<str>>(
        &self,
        events: &'e [Event],
        classes: &[S],
        weeks: &[i32],
    ) -> Vec<&'e Event> {
        events
            .iter()
            .filter(|event| {
                contains(classes, &event.class_name)
                    && weeks.contains(&self.calendar.resolve(event.date).week_index)
            })
            .collect()
    }

    pub fn by_week<'e>(&self, events: &'e [Event], week_index: i32) -> Vec<&'e Event> {
        events
            .iter()
            .filter(|event| self.calendar.resolve(event.date).week_index == week_index)
            .collect()
    }

    pub fn by_report_month<'e>(&self, events: &'e [Event], label: &str) -> Vec<&'e Event> {
        events
            .iter()
            .filter(|event| self.calendar.resolve(event.date).report_month_label == label)
            .collect()
    }

    pub fn by_week_label<'e>(&self, events: &'e [Event], label: &str) -> Vec<&'e Event> {
        events
            .iter()
            .filter(|event| self.calendar.resolve(event.date).week_label == label)
            .collect()
    }

    pub fn by_period<'e>(&self, events: &'e [Event], period: &Period) -> Vec<&'e Event> {
        events
            .iter()
            .filter(|event| self.matches(event, period))
            .collect()
    }

    pub fn matches(&self, event: &Event, period: &Period) -> bool {
        let info = self.calendar.resolve(event.date);
        match period {
            Period::Week(index) => info.week_index == *index,
            Period::Month(label) => info.report_month_label == *label,
        }
    }

    /// Distinct report months, newest first, always including `today`'s.
    pub fn report_months(&self, events: &[Event], today: NaiveDate) -> Vec<String> {
        let mut labels: BTreeSet<String> = events
            .iter()
            .map(|event| self.calendar.resolve(event.date).report_month_label)
            .collect();
        labels.insert(self.calendar.resolve(today).report_month_label);

        let mut labels: Vec<String> = labels.into_iter().collect();
        labels.sort_by(|a, b| month_sort_key(b).cmp(&month_sort_key(a)));
        labels
    }

    /// Distinct labels of teaching weeks (positive, not holidays), newest first.
    pub fn week_labels(&self, events: &[Event], today: NaiveDate) -> Vec<String> {
        let mut weeks: BTreeMap<String, i64> = BTreeMap::new();
        for date in events.iter().map(|event| event.date).chain(Some(today)) {
            let info = self.calendar.resolve(date);
            if info.week_index > 0 && !info.is_holiday {
                weeks.insert(info.week_label, info.sort_key);
            }
        }

        let mut labels: Vec<(String, i64)> = weeks.into_iter().collect();
        labels.sort_by(|a, b| b.1.cmp(&a.1));
        labels.into_iter().map(|(label, _)| label).collect()
    }
}

pub fn visible_events<'e>(events: &'e [Event], viewer: &Viewer) -> Vec<&'e Event> {
    events.iter().filter(|event| viewer.can_see_event(event)).collect()
}

pub fn visible_students<'s>(students: &'s [Student], viewer: &Viewer) -> Vec<&'s Student> {
    students
        .iter()
        .filter(|student| viewer.can_see_student(student))
        .collect()
}

fn contains<S: AsRef<str>>(values: &[S], needle: &str) -> bool {
    values.iter().any(|value| value.as_ref() == needle)
}
