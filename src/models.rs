use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

/// Score every student starts from, and returns to on reset.
pub const BASELINE_SCORE: i32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Teacher,
    Taskforce,
    Parent,
    Monitor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Teacher => "TEACHER",
            Role::Taskforce => "TASKFORCE",
            Role::Parent => "PARENT",
            Role::Monitor => "MONITOR",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "TEACHER" => Ok(Role::Teacher),
            "TASKFORCE" => Ok(Role::Taskforce),
            "PARENT" => Ok(Role::Parent),
            "MONITOR" => Ok(Role::Monitor),
            other => Err(LedgerError::Config(format!("unknown role {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archival {
    pub archived_at: NaiveDate,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub class_name: String,
    pub score: i32,
    pub parent_name: Option<String>,
    pub archived: bool,
    pub archival: Option<Archival>,
}

impl Student {
    pub fn new(id: impl Into<String>, name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            class_name: class_name.into(),
            score: BASELINE_SCORE,
            parent_name: None,
            archived: false,
            archival: None,
        }
    }

    pub fn tier(&self) -> ScoreTier {
        ScoreTier::from_score(self.score)
    }
}

/// A violation (negative points) or commendation (positive points).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub class_name: String,
    pub date: NaiveDate,
    pub kind: String,
    pub points: i32,
    pub is_collective: bool,
    pub recorded_by: String,
    pub recorded_role: Role,
    pub note: String,
}

impl Event {
    /// Builds an event for `student` with a fresh id. Provenance defaults to a
    /// teacher entry and can be overwritten on the returned value.
    pub fn new(student: &Student, date: NaiveDate, kind: impl Into<String>, points: i32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            student_id: student.id.clone(),
            student_name: student.name.clone(),
            class_name: student.class_name.clone(),
            date,
            kind: kind.into(),
            points,
            is_collective: false,
            recorded_by: String::new(),
            recorded_role: Role::Teacher,
            note: String::new(),
        }
    }

    pub fn is_violation(&self) -> bool {
        self.points < 0
    }

    pub fn is_commendation(&self) -> bool {
        self.points > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScoreTier {
    Fail,
    Pass,
    Fair,
    Good,
}

impl ScoreTier {
    pub fn from_score(score: i32) -> Self {
        match score {
            s if s >= 200 => ScoreTier::Good,
            s if s >= 180 => ScoreTier::Fair,
            s if s >= 150 => ScoreTier::Pass,
            _ => ScoreTier::Fail,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScoreTier::Good => "good (>= 200)",
            ScoreTier::Fair => "fair (180-199)",
            ScoreTier::Pass => "pass (150-179)",
            ScoreTier::Fail => "fail (< 150)",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyRemark {
    pub student_id: String,
    pub month_label: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRemark {
    pub class_name: String,
    pub period: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub student_name: String,
    pub parent_name: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreUpdate {
    pub student_id: String,
    pub previous: i32,
    pub current: i32,
}

impl ScoreUpdate {
    pub fn delta(&self) -> i32 {
        self.current - self.previous
    }
}

/// Outcome of a ledger mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Applied {
    /// One entry per student whose score was touched, ordered by student id.
    pub scores: Vec<ScoreUpdate>,
    /// Owner ids referenced by the touched events that are not on the roster.
    pub unresolved: Vec<String>,
    /// Number of events added, replaced or removed.
    pub events: usize,
}

impl Applied {
    pub fn score_of(&self, student_id: &str) -> Option<i32> {
        self.scores
            .iter()
            .find(|update| update.student_id == student_id)
            .map(|update| update.current)
    }
}

/// Who is looking at the ledger, for class-scoped views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    pub role: Role,
    pub assigned_class: Option<String>,
    pub student_id: Option<String>,
}

impl Viewer {
    pub fn admin() -> Self {
        Self {
            role: Role::Admin,
            assigned_class: None,
            student_id: None,
        }
    }

    pub fn can_see_event(&self, event: &Event) -> bool {
        match (self.role, &self.assigned_class, &self.student_id) {
            (Role::Teacher | Role::Monitor, Some(class_name), _) => &event.class_name == class_name,
            (Role::Parent, _, Some(student_id)) => &event.student_id == student_id,
            (Role::Parent, _, None) => false,
            _ => true,
        }
    }

    pub fn can_see_student(&self, student: &Student) -> bool {
        match (self.role, &self.assigned_class, &self.student_id) {
            (Role::Teacher | Role::Monitor, Some(class_name), _) => &student.class_name == class_name,
            (Role::Parent, _, Some(student_id)) => &student.id == student_id,
            (Role::Parent, _, None) => false,
            _ => true,
        }
    }
}
