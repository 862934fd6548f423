use tracing::{info, warn};

use crate::calendar::CalendarResolver;
use crate::error::{LedgerError, Result};
use crate::ledger::Ledger;
use crate::models::{Applied, Event};
use crate::period::{Period, PeriodAggregator};

/// Selection plus deletion as one step. Every bulk action refuses to run on
/// an empty selection so callers can tell "nothing to delete" apart from a
/// deletion that happened to change no score.
///
/// Callers own confirmation; nothing here asks before deleting.
pub struct Reconciler<'a> {
    ledger: &'a mut Ledger,
    periods: PeriodAggregator<'a>,
}

impl<'a> Reconciler<'a> {
    pub fn new(ledger: &'a mut Ledger, calendar: &'a CalendarResolver) -> Self {
        Self {
            ledger,
            periods: PeriodAggregator::new(calendar),
        }
    }

    pub fn delete_by_ids<S: AsRef<str>>(&mut self, event_ids: &[S]) -> Result<Applied> {
        let selected: Vec<String> = self
            .ledger
            .events()
            .iter()
            .filter(|event| event_ids.iter().any(|id| id.as_ref() == event.id))
            .map(|event| event.id.clone())
            .collect();
        self.commit(selected, || format!("{} selected records", event_ids.len()))
    }

    pub fn delete_by_classes<S: AsRef<str>>(&mut self, classes: &[S]) -> Result<Applied> {
        let selected = ids(self.periods.by_class(self.ledger.events(), classes));
        self.commit(selected, || format!("classes {}", join(classes)))
    }

    pub fn delete_by_class_and_weeks<S: AsRef<str>>(
        &mut self,
        classes: &[S],
        weeks: &[i32],
    ) -> Result<Applied> {
        let selected = ids(
            self.periods
                .by_class_and_weeks(self.ledger.events(), classes, weeks),
        );
        self.commit(selected, || {
            let weeks: Vec<String> = weeks.iter().map(i32::to_string).collect();
            format!("classes {} in weeks {}", join(classes), weeks.join(", "))
        })
    }

    pub fn delete_by_class_and_week(&mut self, class_name: &str, week: i32) -> Result<Applied> {
        let selected = ids(
            self.periods
                .by_class_and_weeks(self.ledger.events(), &[class_name], &[week]),
        );
        self.commit(selected, || format!("class {class_name} in week {week}"))
    }

    /// Deletes a whole week or report month across every class.
    pub fn delete_by_period(&mut self, period: &Period) -> Result<Applied> {
        let selected = ids(self.periods.by_period(self.ledger.events(), period));
        self.commit(selected, || period.to_string())
    }

    pub fn full_reset(&mut self) -> Applied {
        self.ledger.reset()
    }

    fn commit(&mut self, selected: Vec<String>, scope: impl FnOnce() -> String) -> Result<Applied> {
        if selected.is_empty() {
            let scope = scope();
            warn!(%scope, "nothing to delete");
            return Err(LedgerError::EmptySelection { scope });
        }
        let applied = self.ledger.delete_many(&selected)?;
        info!(
            events = applied.events,
            students = applied.scores.len(),
            "reconciled deletion"
        );
        Ok(applied)
    }
}

fn ids(events: Vec<&Event>) -> Vec<String> {
    events.into_iter().map(|event| event.id.clone()).collect()
}

fn join<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(|value| value.as_ref())
        .collect::<Vec<&str>>()
        .join(", ")
}
