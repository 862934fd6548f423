use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::models::{
    Applied, Archival, ClassRemark, Event, MonthlyRemark, Notification, ScoreUpdate, Student,
    BASELINE_SCORE,
};

const DEFAULT_PARENT_NAME: &str = "Parent";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPolicy {
    /// Refuse events whose owner is not on the roster instead of recording them unscored.
    #[serde(default)]
    pub reject_unresolved_owners: bool,
}

/// In-memory authoritative store of students, point events and the side
/// records (remarks, parent notifications) that live alongside them.
///
/// Every mutation computes its full effect before touching state, so a call
/// either applies both the event change and the score change or neither.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    policy: LedgerPolicy,
    students: Vec<Student>,
    events: Vec<Event>,
    monthly_remarks: Vec<MonthlyRemark>,
    class_remarks: Vec<ClassRemark>,
    notifications: Vec<Notification>,
}

impl Ledger {
    pub fn new(policy: LedgerPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Rebuilds a ledger from previously mirrored state. The scores must
    /// already agree with the events.
    pub fn from_parts(
        students: Vec<Student>,
        events: Vec<Event>,
        policy: LedgerPolicy,
    ) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for student in &students {
            if !seen.insert(student.id.as_str()) {
                return Err(LedgerError::DuplicateStudent(student.id.clone()));
            }
        }
        let mut seen = BTreeSet::new();
        for event in &events {
            if !seen.insert(event.id.as_str()) {
                return Err(LedgerError::DuplicateEvent(event.id.clone()));
            }
        }

        let ledger = Self {
            policy,
            students,
            events,
            ..Self::default()
        };
        ledger.check_invariant()?;
        Ok(ledger)
    }

    pub fn policy(&self) -> LedgerPolicy {
        self.policy
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn student(&self, student_id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == student_id)
    }

    pub fn event(&self, event_id: &str) -> Option<&Event> {
        self.events.iter().find(|e| e.id == event_id)
    }

    pub fn events_for<'a>(&'a self, student_id: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.events.iter().filter(move |e| e.student_id == student_id)
    }

    pub fn add_student(&mut self, mut student: Student) -> Result<&Student> {
        if self.student(&student.id).is_some() {
            return Err(LedgerError::DuplicateStudent(student.id));
        }
        let recorded: i64 = self.events_for(&student.id).map(|e| i64::from(e.points)).sum();
        student.score = i32::try_from(i64::from(BASELINE_SCORE) + recorded).map_err(|_| {
            LedgerError::ScoreOverflow {
                student_id: student.id.clone(),
            }
        })?;
        debug!(student_id = %student.id, score = student.score, "student added");
        self.students.push(student);
        Ok(&self.students[self.students.len() - 1])
    }

    /// Replaces name, class and parent. The score stays derived from events.
    pub fn update_student_profile(
        &mut self,
        student_id: &str,
        name: impl Into<String>,
        class_name: impl Into<String>,
        parent_name: Option<String>,
    ) -> Result<&Student> {
        let student = self
            .students
            .iter_mut()
            .find(|s| s.id == student_id)
            .ok_or_else(|| LedgerError::StudentNotFound(student_id.to_string()))?;
        student.name = name.into();
        student.class_name = class_name.into();
        student.parent_name = parent_name;
        Ok(student)
    }

    pub fn archive_student(
        &mut self,
        student_id: &str,
        archive: bool,
        reason: Option<String>,
        on: NaiveDate,
    ) -> Result<&Student> {
        let student = self
            .students
            .iter_mut()
            .find(|s| s.id == student_id)
            .ok_or_else(|| LedgerError::StudentNotFound(student_id.to_string()))?;
        student.archived = archive;
        student.archival = archive.then(|| Archival {
            archived_at: on,
            reason,
        });
        info!(student_id, archive, "student archival changed");
        Ok(student)
    }

    pub fn insert(&mut self, event: Event) -> Result<Applied> {
        if self.event(&event.id).is_some() {
            return Err(LedgerError::DuplicateEvent(event.id));
        }
        self.guard_owner(&event.student_id)?;

        let mut deltas = BTreeMap::new();
        deltas.insert(event.student_id.clone(), i64::from(event.points));
        let applied = self.plan(deltas, 1)?;

        if !event.is_collective {
            if let Some(owner) = self.student(&event.student_id) {
                let notification = Notification {
                    id: Uuid::new_v4(),
                    student_name: owner.name.clone(),
                    parent_name: owner
                        .parent_name
                        .clone()
                        .unwrap_or_else(|| DEFAULT_PARENT_NAME.to_string()),
                    kind: event.kind.clone(),
                    created_at: Utc::now(),
                };
                self.notifications.insert(0, notification);
            }
        }

        debug!(event_id = %event.id, student_id = %event.student_id, points = event.points, "event inserted");
        self.events.push(event);
        self.commit(&applied);
        Ok(applied)
    }

    /// Replaces the event stored under `event_id`. The id is kept even if
    /// `replacement` carries another one.
    pub fn update(&mut self, event_id: &str, mut replacement: Event) -> Result<Applied> {
        let Some(position) = self.events.iter().position(|e| e.id == event_id) else {
            warn!(event_id, "update skipped, event not found");
            return Err(LedgerError::NotFound {
                event_id: event_id.to_string(),
            });
        };
        self.guard_owner(&replacement.student_id)?;
        replacement.id = event_id.to_string();

        let previous = &self.events[position];
        let mut deltas = BTreeMap::new();
        *deltas.entry(previous.student_id.clone()).or_insert(0) -= i64::from(previous.points);
        *deltas.entry(replacement.student_id.clone()).or_insert(0) += i64::from(replacement.points);
        let applied = self.plan(deltas, 1)?;

        debug!(
            event_id,
            from = self.events[position].points,
            to = replacement.points,
            "event updated"
        );
        self.events[position] = replacement;
        self.commit(&applied);
        Ok(applied)
    }

    pub fn delete_one(&mut self, event_id: &str) -> Result<Applied> {
        let Some(position) = self.events.iter().position(|e| e.id == event_id) else {
            warn!(event_id, "delete skipped, event not found");
            return Err(LedgerError::NotFound {
                event_id: event_id.to_string(),
            });
        };

        let target = &self.events[position];
        let mut deltas = BTreeMap::new();
        deltas.insert(target.student_id.clone(), -i64::from(target.points));
        let applied = self.plan(deltas, 1)?;

        let removed = self.events.remove(position);
        debug!(event_id, points = removed.points, "event deleted");
        self.commit(&applied);
        Ok(applied)
    }

    /// Removes every event whose id is listed. Reverted points are summed per
    /// owner first and applied once per student. Unknown ids are ignored, so a
    /// call matching nothing returns an empty [`Applied`].
    pub fn delete_many<S: AsRef<str>>(&mut self, event_ids: &[S]) -> Result<Applied> {
        let targets: BTreeSet<&str> = event_ids.iter().map(|id| id.as_ref()).collect();
        let mut deltas: BTreeMap<String, i64> = BTreeMap::new();
        let mut removed = 0usize;

        for event in self.events.iter().filter(|e| targets.contains(e.id.as_str())) {
            *deltas.entry(event.student_id.clone()).or_insert(0) -= i64::from(event.points);
            removed += 1;
        }
        let applied = self.plan(deltas, removed)?;

        self.events
            .retain(|event| !targets.contains(event.id.as_str()));
        info!(requested = targets.len(), removed, "batch delete applied");
        self.commit(&applied);
        Ok(applied)
    }

    /// Empties the event log and the side records, returns every student to
    /// the baseline and lifts every archival.
    pub fn reset(&mut self) -> Applied {
        let removed = self.events.len();
        self.events.clear();
        self.monthly_remarks.clear();
        self.class_remarks.clear();
        self.notifications.clear();

        let mut scores: Vec<ScoreUpdate> = self
            .students
            .iter_mut()
            .map(|student| {
                let previous = student.score;
                student.score = BASELINE_SCORE;
                student.archived = false;
                student.archival = None;
                ScoreUpdate {
                    student_id: student.id.clone(),
                    previous,
                    current: BASELINE_SCORE,
                }
            })
            .collect();
        scores.sort_by(|a, b| a.student_id.cmp(&b.student_id));

        info!(removed, students = scores.len(), "ledger reset");
        Applied {
            scores,
            unresolved: Vec::new(),
            events: removed,
        }
    }

    /// Verifies `score == baseline + sum(points)` for every student.
    pub fn check_invariant(&self) -> Result<()> {
        let mut totals: HashMap<&str, i64> = HashMap::new();
        for event in &self.events {
            *totals.entry(event.student_id.as_str()).or_insert(0) += i64::from(event.points);
        }

        for student in &self.students {
            let expected =
                i64::from(BASELINE_SCORE) + totals.get(student.id.as_str()).copied().unwrap_or(0);
            if i64::from(student.score) != expected {
                return Err(LedgerError::InvariantViolation {
                    student_id: student.id.clone(),
                    expected,
                    actual: student.score,
                });
            }
        }
        Ok(())
    }

    pub fn upsert_monthly_remark(&mut self, remark: MonthlyRemark) {
        match self
            .monthly_remarks
            .iter_mut()
            .find(|r| r.student_id == remark.student_id && r.month_label == remark.month_label)
        {
            Some(existing) => *existing = remark,
            None => self.monthly_remarks.push(remark),
        }
    }

    pub fn upsert_class_remark(&mut self, remark: ClassRemark) {
        match self
            .class_remarks
            .iter_mut()
            .find(|r| r.class_name == remark.class_name && r.period == remark.period)
        {
            Some(existing) => *existing = remark,
            None => self.class_remarks.push(remark),
        }
    }

    pub fn monthly_remarks(&self) -> &[MonthlyRemark] {
        &self.monthly_remarks
    }

    pub fn class_remarks(&self) -> &[ClassRemark] {
        &self.class_remarks
    }

    /// Newest first.
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn push_notification(
        &mut self,
        student_name: impl Into<String>,
        parent_name: impl Into<String>,
        kind: impl Into<String>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.notifications.insert(
            0,
            Notification {
                id,
                student_name: student_name.into(),
                parent_name: parent_name.into(),
                kind: kind.into(),
                created_at: Utc::now(),
            },
        );
        id
    }

    /// Appends a previously persisted notification, keeping its id and time.
    /// Callers restore in newest-first order.
    pub fn restore_notification(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    pub fn dismiss_notification(&mut self, id: Uuid) -> bool {
        let before = self.notifications.len();
        self.notifications.retain(|n| n.id != id);
        self.notifications.len() != before
    }

    fn guard_owner(&self, student_id: &str) -> Result<()> {
        if self.policy.reject_unresolved_owners && self.student(student_id).is_none() {
            warn!(student_id, "event rejected, owner not on roster");
            return Err(LedgerError::UnresolvableOwner {
                student_id: student_id.to_string(),
            });
        }
        Ok(())
    }

    /// Computes every score a change would produce without touching state.
    /// Fails if any resulting score leaves the `i32` range.
    fn plan(&self, deltas: BTreeMap<String, i64>, events: usize) -> Result<Applied> {
        let mut applied = Applied {
            events,
            ..Applied::default()
        };

        for (student_id, delta) in deltas {
            match self.student(&student_id) {
                Some(student) => {
                    let current = i32::try_from(i64::from(student.score) + delta)
                        .map_err(|_| LedgerError::ScoreOverflow {
                            student_id: student_id.clone(),
                        })?;
                    applied.scores.push(ScoreUpdate {
                        student_id,
                        previous: student.score,
                        current,
                    });
                }
                None => applied.unresolved.push(student_id),
            }
        }

        Ok(applied)
    }

    fn commit(&mut self, applied: &Applied) {
        for update in &applied.scores {
            if let Some(student) = self.students.iter_mut().find(|s| s.id == update.student_id) {
                student.score = update.current;
            }
        }
        for student_id in &applied.unresolved {
            warn!(%student_id, "event owner not on roster, score not reconciled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, d).unwrap()
    }

    fn roster() -> Ledger {
        let mut ledger = Ledger::default();
        let mut avery = Student::new("s1", "Avery Lee", "10A1");
        avery.parent_name = Some("Morgan Lee".to_string());
        ledger.add_student(avery).unwrap();
        ledger
            .add_student(Student::new("s2", "Jules Moreno", "10A2"))
            .unwrap();
        ledger
    }

    fn event_for(ledger: &Ledger, student_id: &str, points: i32) -> Event {
        let student = ledger.student(student_id).unwrap().clone();
        Event::new(&student, day(6), "Late", points)
    }

    #[test]
    fn insert_then_update_applies_difference() {
        let mut ledger = roster();
        let event = event_for(&ledger, "s1", -10);
        let id = event.id.clone();

        let applied = ledger.insert(event.clone()).unwrap();
        assert_eq!(applied.score_of("s1"), Some(190));

        let applied = ledger.update(&id, Event { points: -5, ..event }).unwrap();
        assert_eq!(applied.scores[0].delta(), 5);
        assert_eq!(ledger.student("s1").unwrap().score, 195);
        ledger.check_invariant().unwrap();
    }

    #[test]
    fn update_moves_points_between_owners() {
        let mut ledger = roster();
        let event = event_for(&ledger, "s1", -10);
        let id = event.id.clone();
        ledger.insert(event).unwrap();

        let moved = event_for(&ledger, "s2", -4);
        let applied = ledger.update(&id, moved).unwrap();

        assert_eq!(applied.score_of("s1"), Some(200));
        assert_eq!(applied.score_of("s2"), Some(196));
        assert_eq!(ledger.event(&id).unwrap().student_id, "s2");
        ledger.check_invariant().unwrap();
    }

    #[test]
    fn missing_event_is_not_found() {
        let mut ledger = roster();
        let event = event_for(&ledger, "s1", -10);
        assert!(matches!(
            ledger.update("nope", event),
            Err(LedgerError::NotFound { .. })
        ));
        assert!(matches!(
            ledger.delete_one("nope"),
            Err(LedgerError::NotFound { .. })
        ));
        assert_eq!(ledger.student("s1").unwrap().score, BASELINE_SCORE);
    }

    #[test]
    fn insert_then_delete_restores_score() {
        let mut ledger = roster();
        let event = event_for(&ledger, "s2", 25);
        let id = event.id.clone();
        ledger.insert(event).unwrap();
        assert_eq!(ledger.student("s2").unwrap().score, 225);

        let applied = ledger.delete_one(&id).unwrap();
        assert_eq!(applied.score_of("s2"), Some(200));
        assert!(ledger.events().is_empty());
    }

    #[test]
    fn batch_delete_reverts_once_per_student() {
        let mut ledger = roster();
        let first = event_for(&ledger, "s1", -10);
        let second = event_for(&ledger, "s1", 20);
        let ids = vec![first.id.clone(), second.id.clone()];
        ledger.insert(first).unwrap();
        ledger.insert(second).unwrap();
        assert_eq!(ledger.student("s1").unwrap().score, 210);

        let applied = ledger.delete_many(&ids).unwrap();
        assert_eq!(applied.events, 2);
        assert_eq!(applied.scores.len(), 1);
        assert_eq!(applied.scores[0].previous, 210);
        assert_eq!(applied.scores[0].current, 200);
    }

    #[test]
    fn batch_delete_of_unknown_ids_is_empty() {
        let mut ledger = roster();
        let applied = ledger.delete_many(&["ghost"]).unwrap();
        assert_eq!(applied, Applied::default());
    }

    #[test]
    fn dangling_owner_is_recorded_but_unscored() {
        let mut ledger = roster();
        let ghost = Student::new("s9", "Kiara Patel", "10A3");
        let event = Event::new(&ghost, day(7), "Uniform", -5);

        let applied = ledger.insert(event).unwrap();
        assert!(applied.scores.is_empty());
        assert_eq!(applied.unresolved, vec!["s9".to_string()]);
        assert_eq!(ledger.events().len(), 1);

        // The owner joining later picks up the recorded points.
        let joined = ledger.add_student(ghost).unwrap();
        assert_eq!(joined.score, 195);
        ledger.check_invariant().unwrap();
    }

    #[test]
    fn strict_policy_rejects_dangling_owner() {
        let mut ledger = Ledger::new(LedgerPolicy {
            reject_unresolved_owners: true,
        });
        let ghost = Student::new("s9", "Kiara Patel", "10A3");
        let result = ledger.insert(Event::new(&ghost, day(7), "Uniform", -5));
        assert!(matches!(result, Err(LedgerError::UnresolvableOwner { .. })));
        assert!(ledger.events().is_empty());
    }

    #[test]
    fn strict_policy_rejects_update_to_dangling_owner() {
        let mut ledger = roster();
        ledger.policy = LedgerPolicy {
            reject_unresolved_owners: true,
        };
        let event = event_for(&ledger, "s1", -10);
        let id = event.id.clone();
        ledger.insert(event.clone()).unwrap();

        let ghost = Student::new("ghost", "Kiara Patel", "10A3");
        let result = ledger.update(&id, Event::new(&ghost, day(7), "Uniform", -5));

        assert!(matches!(
            result,
            Err(LedgerError::UnresolvableOwner { ref student_id }) if student_id == "ghost"
        ));
        assert_eq!(ledger.event(&id), Some(&event));
        assert_eq!(ledger.student("s1").unwrap().score, 190);
    }

    #[test]
    fn update_to_dangling_owner_reverts_old_owner() {
        let mut ledger = roster();
        let event = event_for(&ledger, "s1", -10);
        let id = event.id.clone();
        ledger.insert(event).unwrap();

        let ghost = Student::new("ghost", "Kiara Patel", "10A3");
        let applied = ledger
            .update(&id, Event::new(&ghost, day(7), "Uniform", -5))
            .unwrap();

        assert_eq!(applied.score_of("s1"), Some(200));
        assert_eq!(applied.unresolved, vec!["ghost".to_string()]);
        assert_eq!(ledger.event(&id).unwrap().student_id, "ghost");
        ledger.check_invariant().unwrap();
    }

    #[test]
    fn out_of_range_score_is_rejected_without_change() {
        let mut ledger = roster();
        let result = ledger.insert(event_for(&ledger, "s1", i32::MAX));

        assert!(matches!(
            result,
            Err(LedgerError::ScoreOverflow { ref student_id }) if student_id == "s1"
        ));
        assert!(ledger.events().is_empty());
        assert!(ledger.notifications().is_empty());
        assert_eq!(ledger.student("s1").unwrap().score, BASELINE_SCORE);
        ledger.check_invariant().unwrap();
    }

    #[test]
    fn deleting_a_subset_that_would_overflow_changes_nothing() {
        let mut ledger = roster();
        let high = event_for(&ledger, "s1", i32::MAX - BASELINE_SCORE);
        let low = event_for(&ledger, "s1", -1000);
        let back = event_for(&ledger, "s1", 1000);
        let low_id = low.id.clone();
        ledger.insert(high).unwrap();
        ledger.insert(low).unwrap();
        ledger.insert(back).unwrap();
        assert_eq!(ledger.student("s1").unwrap().score, i32::MAX);

        assert!(matches!(
            ledger.delete_one(&low_id),
            Err(LedgerError::ScoreOverflow { .. })
        ));
        assert!(matches!(
            ledger.delete_many(&[low_id.as_str()]),
            Err(LedgerError::ScoreOverflow { .. })
        ));
        assert_eq!(ledger.events().len(), 3);
        assert_eq!(ledger.student("s1").unwrap().score, i32::MAX);
        ledger.check_invariant().unwrap();
    }

    #[test]
    fn invariant_check_handles_extreme_totals() {
        let mut student = Student::new("s1", "Avery Lee", "10A1");
        student.score = i32::MAX;
        let events = vec![
            Event::new(&student, day(6), "Good deed", i32::MAX),
            Event::new(&student, day(7), "Good deed", i32::MAX),
        ];
        let result = Ledger::from_parts(vec![student], events, LedgerPolicy::default());
        assert!(matches!(
            result,
            Err(LedgerError::InvariantViolation { actual: i32::MAX, .. })
        ));
    }

    #[test]
    fn restored_notifications_keep_order_and_ids() {
        let mut ledger = roster();
        ledger.insert(event_for(&ledger, "s1", -2)).unwrap();
        ledger.push_notification("Jules Moreno", "Parent", "Uniform");
        let persisted = ledger.notifications().to_vec();

        let mut reloaded = roster();
        for notification in persisted.iter().cloned() {
            reloaded.restore_notification(notification);
        }
        assert_eq!(reloaded.notifications(), persisted.as_slice());
        assert_eq!(reloaded.notifications()[0].student_name, "Jules Moreno");
    }

    #[test]
    fn duplicate_event_id_is_rejected() {
        let mut ledger = roster();
        let event = event_for(&ledger, "s1", -2);
        ledger.insert(event.clone()).unwrap();
        assert!(matches!(
            ledger.insert(event),
            Err(LedgerError::DuplicateEvent(_))
        ));
        assert_eq!(ledger.student("s1").unwrap().score, 198);
    }

    #[test]
    fn individual_events_notify_parents() {
        let mut ledger = roster();
        ledger.insert(event_for(&ledger, "s1", -2)).unwrap();
        let mut collective = event_for(&ledger, "s2", -2);
        collective.is_collective = true;
        ledger.insert(collective).unwrap();

        assert_eq!(ledger.notifications().len(), 1);
        let notification = &ledger.notifications()[0];
        assert_eq!(notification.parent_name, "Morgan Lee");
        assert!(ledger.dismiss_notification(notification.id));
        assert!(ledger.notifications().is_empty());
    }

    #[test]
    fn reset_clears_everything_and_is_idempotent() {
        let mut ledger = roster();
        ledger.insert(event_for(&ledger, "s1", -30)).unwrap();
        ledger
            .archive_student("s2", true, Some("transferred".to_string()), day(9))
            .unwrap();
        ledger.upsert_class_remark(ClassRemark {
            class_name: "10A1".to_string(),
            period: "10/2025".to_string(),
            text: "Tidy classroom".to_string(),
        });

        let first = ledger.reset();
        assert_eq!(first.events, 1);
        let second = ledger.reset();
        assert_eq!(second.events, 0);

        assert!(ledger.events().is_empty());
        assert!(ledger.class_remarks().is_empty());
        assert!(ledger.notifications().is_empty());
        for student in ledger.students() {
            assert_eq!(student.score, BASELINE_SCORE);
            assert!(!student.archived);
            assert!(student.archival.is_none());
        }
    }

    #[test]
    fn remarks_upsert_by_key() {
        let mut ledger = roster();
        let remark = |text: &str| MonthlyRemark {
            student_id: "s1".to_string(),
            month_label: "10/2025".to_string(),
            text: text.to_string(),
        };
        ledger.upsert_monthly_remark(remark("needs focus"));
        ledger.upsert_monthly_remark(remark("improving"));
        assert_eq!(ledger.monthly_remarks().len(), 1);
        assert_eq!(ledger.monthly_remarks()[0].text, "improving");
    }

    #[test]
    fn profile_update_keeps_score() {
        let mut ledger = roster();
        ledger.insert(event_for(&ledger, "s1", -10)).unwrap();
        let student = ledger
            .update_student_profile("s1", "Avery J. Lee", "10A3", None)
            .unwrap();
        assert_eq!(student.score, 190);
        assert_eq!(student.class_name, "10A3");
    }

    #[test]
    fn from_parts_rejects_inconsistent_scores() {
        let mut student = Student::new("s1", "Avery Lee", "10A1");
        student.score = 150;
        let result = Ledger::from_parts(vec![student], Vec::new(), LedgerPolicy::default());
        assert!(matches!(
            result,
            Err(LedgerError::InvariantViolation { expected: 200, actual: 150, .. })
        ));
    }
}
