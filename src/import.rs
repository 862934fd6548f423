use std::io::Read;

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::calendar::parse_date;
use crate::error::{LedgerError, Result};
use crate::ledger::Ledger;
use crate::models::{Event, Role, Student};

#[derive(Debug, Deserialize)]
struct StudentRow {
    id: String,
    name: String,
    class_name: String,
    #[serde(default)]
    parent_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventRow {
    #[serde(default)]
    id: Option<String>,
    student_id: String,
    student_name: String,
    class_name: String,
    date: String,
    kind: String,
    points: i32,
    #[serde(default)]
    is_collective: bool,
    #[serde(default)]
    recorded_by: String,
    #[serde(default)]
    recorded_role: Option<String>,
    #[serde(default)]
    note: String,
}

/// Adds every roster row. Ids already on the roster are skipped.
pub fn import_students<R: Read>(ledger: &mut Ledger, reader: R) -> Result<usize> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut added = 0usize;

    for result in reader.deserialize::<StudentRow>() {
        let row = result?;
        if ledger.student(&row.id).is_some() {
            continue;
        }
        let mut student = Student::new(row.id, row.name, row.class_name);
        student.parent_name = row.parent_name.filter(|name| !name.trim().is_empty());
        ledger.add_student(student)?;
        added += 1;
    }

    info!(added, "roster imported");
    Ok(added)
}

/// Records every event row through [`Ledger::insert`]. Rows repeating an
/// existing id are skipped; dates are day/month/year.
pub fn import_events<R: Read>(ledger: &mut Ledger, reader: R) -> Result<usize> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut inserted = 0usize;

    for result in reader.deserialize::<EventRow>() {
        let row = result?;
        let id = row
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));
        if ledger.event(&id).is_some() {
            continue;
        }

        let recorded_role = match row.recorded_role.as_deref() {
            Some(role) if !role.trim().is_empty() => role.parse::<Role>()?,
            _ => Role::Teacher,
        };
        let event = Event {
            id,
            student_id: row.student_id,
            student_name: row.student_name,
            class_name: row.class_name,
            date: parse_date(&row.date)?,
            kind: row.kind,
            points: row.points,
            is_collective: row.is_collective,
            recorded_by: row.recorded_by,
            recorded_role,
            note: row.note,
        };

        match ledger.insert(event) {
            Ok(_) => inserted += 1,
            Err(LedgerError::DuplicateEvent(_)) => continue,
            Err(err) => return Err(err),
        }
    }

    info!(inserted, "events imported");
    Ok(inserted)
}
