use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};

use crate::ledger::{Ledger, LedgerPolicy};
use crate::models::{Archival, ClassRemark, Event, MonthlyRemark, Notification, Role, Student};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Seeds a small roster with a few records, going through the ledger so the
/// mirrored scores agree with the events.
pub async fn seed(pool: &PgPool, policy: LedgerPolicy) -> anyhow::Result<Ledger> {
    let mut ledger = load(pool, policy).await?;

    let roster = [
        ("hs-001", "Avery Lee", "10A1", Some("Morgan Lee")),
        ("hs-002", "Jules Moreno", "10A1", None),
        ("hs-003", "Kiara Patel", "10A2", Some("Priya Patel")),
    ];
    for (id, name, class_name, parent) in roster {
        if ledger.student(id).is_none() {
            let mut student = Student::new(id, name, class_name);
            student.parent_name = parent.map(str::to_string);
            ledger.add_student(student)?;
        }
    }

    let records = [
        ("seed-001", "hs-001", (2025, 9, 8), "Late to class", -5, "Missed roll call"),
        ("seed-002", "hs-002", (2025, 9, 16), "No uniform", -10, "Wore sports kit"),
        ("seed-003", "hs-003", (2025, 10, 1), "Good deed", 20, "Returned a lost wallet"),
    ];
    for (event_id, student_id, (y, m, d), kind, points, note) in records {
        if ledger.event(event_id).is_some() {
            continue;
        }
        let student = ledger
            .student(student_id)
            .cloned()
            .with_context(|| format!("seed student {student_id} missing"))?;
        let date = NaiveDate::from_ymd_opt(y, m, d).context("invalid date")?;
        let mut event = Event::new(&student, date, kind, points);
        event.id = event_id.to_string();
        event.recorded_by = "seed".to_string();
        event.recorded_role = Role::Admin;
        event.note = note.to_string();
        ledger.insert(event)?;
    }

    save(pool, &ledger).await?;
    Ok(ledger)
}

pub async fn load(pool: &PgPool, policy: LedgerPolicy) -> anyhow::Result<Ledger> {
    let student_rows = sqlx::query(
        r#"
        SELECT id, full_name, class_name, score, parent_name, archived, archived_at, archived_reason
        FROM discipline_ledger.students
        ORDER BY position
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut students = Vec::with_capacity(student_rows.len());
    for row in student_rows {
        let archived_at: Option<NaiveDate> = row.get("archived_at");
        students.push(Student {
            id: row.get("id"),
            name: row.get("full_name"),
            class_name: row.get("class_name"),
            score: row.get("score"),
            parent_name: row.get("parent_name"),
            archived: row.get("archived"),
            archival: archived_at.map(|archived_at| Archival {
                archived_at,
                reason: row.get("archived_reason"),
            }),
        });
    }

    let event_rows = sqlx::query(
        r#"
        SELECT id, student_id, student_name, class_name, occurred_on, kind, points,
               is_collective, recorded_by, recorded_role, note
        FROM discipline_ledger.events
        ORDER BY position
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut events = Vec::with_capacity(event_rows.len());
    for row in event_rows {
        let role: String = row.get("recorded_role");
        events.push(Event {
            id: row.get("id"),
            student_id: row.get("student_id"),
            student_name: row.get("student_name"),
            class_name: row.get("class_name"),
            date: row.get("occurred_on"),
            kind: row.get("kind"),
            points: row.get("points"),
            is_collective: row.get("is_collective"),
            recorded_by: row.get("recorded_by"),
            recorded_role: role.parse()?,
            note: row.get("note"),
        });
    }

    let mut ledger = Ledger::from_parts(students, events, policy)
        .context("mirrored scores disagree with mirrored events")?;

    let remarks = sqlx::query(
        "SELECT student_id, month_label, body FROM discipline_ledger.monthly_remarks",
    )
    .fetch_all(pool)
    .await?;
    for row in remarks {
        ledger.upsert_monthly_remark(MonthlyRemark {
            student_id: row.get("student_id"),
            month_label: row.get("month_label"),
            text: row.get("body"),
        });
    }

    let remarks = sqlx::query("SELECT class_name, period, body FROM discipline_ledger.class_remarks")
        .fetch_all(pool)
        .await?;
    for row in remarks {
        ledger.upsert_class_remark(ClassRemark {
            class_name: row.get("class_name"),
            period: row.get("period"),
            text: row.get("body"),
        });
    }

    let notifications = sqlx::query(
        r#"
        SELECT id, student_name, parent_name, kind, created_at
        FROM discipline_ledger.notifications
        ORDER BY position
        "#,
    )
    .fetch_all(pool)
    .await?;
    for row in notifications {
        ledger.restore_notification(Notification {
            id: row.get("id"),
            student_name: row.get("student_name"),
            parent_name: row.get("parent_name"),
            kind: row.get("kind"),
            created_at: row.get("created_at"),
        });
    }

    Ok(ledger)
}

/// Replaces the mirrored tables with the ledger's current state in one transaction.
pub async fn save(pool: &PgPool, ledger: &Ledger) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;

    for table in [
        "events",
        "students",
        "monthly_remarks",
        "class_remarks",
        "notifications",
    ] {
        sqlx::query(&format!("DELETE FROM discipline_ledger.{table}"))
            .execute(&mut *tx)
            .await?;
    }

    for (position, student) in ledger.students().iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO discipline_ledger.students
            (id, position, full_name, class_name, score, parent_name, archived, archived_at, archived_reason)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&student.id)
        .bind(position as i64)
        .bind(&student.name)
        .bind(&student.class_name)
        .bind(student.score)
        .bind(&student.parent_name)
        .bind(student.archived)
        .bind(student.archival.as_ref().map(|a| a.archived_at))
        .bind(student.archival.as_ref().and_then(|a| a.reason.clone()))
        .execute(&mut *tx)
        .await?;
    }

    for (position, event) in ledger.events().iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO discipline_ledger.events
            (id, position, student_id, student_name, class_name, occurred_on, kind, points,
             is_collective, recorded_by, recorded_role, note)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&event.id)
        .bind(position as i64)
        .bind(&event.student_id)
        .bind(&event.student_name)
        .bind(&event.class_name)
        .bind(event.date)
        .bind(&event.kind)
        .bind(event.points)
        .bind(event.is_collective)
        .bind(&event.recorded_by)
        .bind(event.recorded_role.as_str())
        .bind(&event.note)
        .execute(&mut *tx)
        .await?;
    }

    for remark in ledger.monthly_remarks() {
        sqlx::query(
            "INSERT INTO discipline_ledger.monthly_remarks (student_id, month_label, body) VALUES ($1, $2, $3)",
        )
        .bind(&remark.student_id)
        .bind(&remark.month_label)
        .bind(&remark.text)
        .execute(&mut *tx)
        .await?;
    }

    for remark in ledger.class_remarks() {
        sqlx::query(
            "INSERT INTO discipline_ledger.class_remarks (class_name, period, body) VALUES ($1, $2, $3)",
        )
        .bind(&remark.class_name)
        .bind(&remark.period)
        .bind(&remark.text)
        .execute(&mut *tx)
        .await?;
    }

    for (position, notification) in ledger.notifications().iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO discipline_ledger.notifications
            (id, position, student_name, parent_name, kind, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(notification.id)
        .bind(position as i64)
        .bind(&notification.student_name)
        .bind(&notification.parent_name)
        .bind(&notification.kind)
        .bind(notification.created_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}
