use std::fs::File;
use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::Local;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use discipline_ledger::calendar::{format_date, parse_date};
use discipline_ledger::config::AppConfig;
use discipline_ledger::models::{Applied, Event, Role, Viewer};
use discipline_ledger::period::{visible_events, visible_students, Period, PeriodAggregator};
use discipline_ledger::{db, import, logging, report, Ledger, Reconciler};

#[derive(Parser)]
#[command(name = "discipline-ledger")]
#[command(about = "Discipline points ledger and school week calendar", long_about = None)]
struct Cli {
    /// JSON file with calendar and policy settings
    #[arg(long, global = true, env = "DISCIPLINE_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a sample roster and a few records
    Seed,
    /// Import a roster and/or records from CSV files
    Import {
        #[arg(long)]
        students: Option<PathBuf>,
        #[arg(long)]
        events: Option<PathBuf>,
    },
    /// Record a violation (negative points) or commendation (positive points)
    Record {
        #[arg(long)]
        student: String,
        /// Day/month/year
        #[arg(long)]
        date: String,
        #[arg(long)]
        kind: String,
        #[arg(long, allow_hyphen_values = true)]
        points: i32,
        #[arg(long)]
        collective: bool,
        #[arg(long, default_value = "")]
        recorded_by: String,
        #[arg(long, default_value = "TEACHER")]
        role: String,
        #[arg(long, default_value = "")]
        note: String,
    },
    /// Change an existing record
    Amend {
        #[arg(long)]
        id: String,
        #[arg(long, allow_hyphen_values = true)]
        points: Option<i32>,
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Delete records by id
    Delete {
        #[arg(long = "id", required = true)]
        ids: Vec<String>,
        #[arg(long)]
        yes: bool,
    },
    /// Delete every record of the given classes
    PurgeClasses {
        #[arg(long = "class", required = true)]
        classes: Vec<String>,
        #[arg(long)]
        yes: bool,
    },
    /// Delete the given classes' records in the given school weeks
    PurgeWeeks {
        #[arg(long = "class", required = true)]
        classes: Vec<String>,
        #[arg(long = "week", required = true, allow_hyphen_values = true)]
        weeks: Vec<i32>,
        #[arg(long)]
        yes: bool,
    },
    /// Delete a whole week or report month across all classes
    #[command(group(
        ArgGroup::new("period")
            .args(["week", "month"])
            .required(true)
            .multiple(false)
    ))]
    PurgePeriod {
        #[arg(long, allow_hyphen_values = true)]
        week: Option<i32>,
        /// Report month as month/year, e.g. 10/2025
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        yes: bool,
    },
    /// Remove every record and return all scores to the baseline
    Reset {
        #[arg(long)]
        yes: bool,
    },
    /// Show where a date falls in the school calendar
    Week {
        /// Day/month/year; defaults to today
        date: Option<String>,
    },
    /// List students by score
    Ranking {
        #[arg(long)]
        class: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Generate a markdown report
    #[command(group(
        ArgGroup::new("range")
            .args(["week", "month"])
            .multiple(false)
    ))]
    Report {
        #[arg(long)]
        class: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        week: Option<i32>,
        #[arg(long)]
        month: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// List pending parent notifications, newest first
    Notifications,
    /// Dismiss a parent notification
    Dismiss {
        #[arg(long)]
        id: Uuid,
    },
    /// Check that every score equals the baseline plus its records
    Verify,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    let calendar = config.resolver()?;

    if let Commands::Week { date } = &cli.command {
        let date = match date {
            Some(raw) => parse_date(raw)?,
            None => Local::now().date_naive(),
        };
        let info = calendar.resolve(date);
        println!("{}: {}", format_date(date), info.week_label);
        println!("Report month {}", info.report_month_label);
        if info.is_holiday {
            println!("Holiday");
        }
        return Ok(());
    }

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    let policy = config.policy();

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let ledger = db::seed(&pool, policy).await?;
            println!(
                "Seed data ready: {} students, {} records.",
                ledger.students().len(),
                ledger.events().len()
            );
        }
        Commands::Import { students, events } => {
            if students.is_none() && events.is_none() {
                bail!("pass --students and/or --events");
            }
            let mut ledger = db::load(&pool, policy).await?;
            if let Some(path) = students {
                let file = File::open(&path)
                    .with_context(|| format!("unable to open {}", path.display()))?;
                let added = import::import_students(&mut ledger, file)?;
                println!("Added {added} students from {}.", path.display());
            }
            if let Some(path) = events {
                let file = File::open(&path)
                    .with_context(|| format!("unable to open {}", path.display()))?;
                let inserted = import::import_events(&mut ledger, file)?;
                println!("Recorded {inserted} records from {}.", path.display());
            }
            db::save(&pool, &ledger).await?;
        }
        Commands::Record {
            student,
            date,
            kind,
            points,
            collective,
            recorded_by,
            role,
            note,
        } => {
            let mut ledger = db::load(&pool, policy).await?;
            let owner = ledger
                .student(&student)
                .cloned()
                .with_context(|| format!("student {student} is not on the roster"))?;
            let mut event = Event::new(&owner, parse_date(&date)?, kind, points);
            event.is_collective = collective;
            event.recorded_by = recorded_by;
            event.recorded_role = role.parse::<Role>()?;
            event.note = note;
            let id = event.id.clone();

            let applied = ledger.insert(event)?;
            db::save(&pool, &ledger).await?;
            println!("Recorded {id}.");
            print_scores(&applied);
        }
        Commands::Amend {
            id,
            points,
            kind,
            date,
            note,
        } => {
            let mut ledger = db::load(&pool, policy).await?;
            let mut replacement = ledger
                .event(&id)
                .cloned()
                .with_context(|| format!("record {id} not found"))?;
            if let Some(points) = points {
                replacement.points = points;
            }
            if let Some(kind) = kind {
                replacement.kind = kind;
            }
            if let Some(raw) = date {
                replacement.date = parse_date(&raw)?;
            }
            if let Some(note) = note {
                replacement.note = note;
            }

            let applied = ledger.update(&id, replacement)?;
            db::save(&pool, &ledger).await?;
            println!("Amended {id}.");
            print_scores(&applied);
        }
        Commands::Delete { ids, yes } => {
            confirm(yes, &format!("delete {} records", ids.len()))?;
            let mut ledger = db::load(&pool, policy).await?;
            let applied = match ids.as_slice() {
                [id] => ledger.delete_one(id)?,
                _ => Reconciler::new(&mut ledger, &calendar).delete_by_ids(&ids)?,
            };
            finish_deletion(&pool, &ledger, &applied).await?;
        }
        Commands::PurgeClasses { classes, yes } => {
            confirm(yes, &format!("delete every record of {}", classes.join(", ")))?;
            let mut ledger = db::load(&pool, policy).await?;
            let applied = Reconciler::new(&mut ledger, &calendar).delete_by_classes(&classes)?;
            finish_deletion(&pool, &ledger, &applied).await?;
        }
        Commands::PurgeWeeks {
            classes,
            weeks,
            yes,
        } => {
            confirm(yes, "delete the selected class weeks")?;
            let mut ledger = db::load(&pool, policy).await?;
            let applied = match (classes.as_slice(), weeks.as_slice()) {
                ([class_name], [week]) => Reconciler::new(&mut ledger, &calendar)
                    .delete_by_class_and_week(class_name, *week)?,
                _ => Reconciler::new(&mut ledger, &calendar)
                    .delete_by_class_and_weeks(&classes, &weeks)?,
            };
            finish_deletion(&pool, &ledger, &applied).await?;
        }
        Commands::PurgePeriod { week, month, yes } => {
            let period = match (week, month) {
                (Some(week), _) => Period::Week(week),
                (None, Some(month)) => Period::Month(month),
                (None, None) => bail!("pass --week or --month"),
            };
            confirm(yes, &format!("delete {period} for every class"))?;
            let mut ledger = db::load(&pool, policy).await?;
            let applied = Reconciler::new(&mut ledger, &calendar).delete_by_period(&period)?;
            finish_deletion(&pool, &ledger, &applied).await?;
        }
        Commands::Reset { yes } => {
            confirm(yes, "erase every record and reset all scores")?;
            let mut ledger = db::load(&pool, policy).await?;
            let applied = Reconciler::new(&mut ledger, &calendar).full_reset();
            db::save(&pool, &ledger).await?;
            println!(
                "Removed {} records; {} students back at the baseline.",
                applied.events,
                applied.scores.len()
            );
        }
        // Answered above without a database.
        Commands::Week { .. } => {}
        Commands::Ranking { class, limit } => {
            let ledger = db::load(&pool, policy).await?;
            let viewer = class_viewer(class);
            let mut students = visible_students(ledger.students(), &viewer);
            students.retain(|student| !student.archived);
            students.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));

            if students.is_empty() {
                println!("No students found.");
                return Ok(());
            }

            println!("Students by score:");
            for student in students.iter().take(limit) {
                println!(
                    "- {} ({}, {}) score {} [{}]",
                    student.name,
                    student.id,
                    student.class_name,
                    student.score,
                    student.tier().label()
                );
            }
        }
        Commands::Report {
            class,
            week,
            month,
            out,
        } => {
            let ledger = db::load(&pool, policy).await?;
            let viewer = class_viewer(class.clone());
            let students = visible_students(ledger.students(), &viewer);
            let events = visible_events(ledger.events(), &viewer);
            let period = match (week, month) {
                (Some(week), _) => Some(Period::Week(week)),
                (None, Some(month)) => Some(Period::Month(month)),
                (None, None) => None,
            };
            let events: Vec<&Event> = match &period {
                Some(period) => {
                    let periods = PeriodAggregator::new(&calendar);
                    events
                        .into_iter()
                        .filter(|event| periods.matches(event, period))
                        .collect()
                }
                None => events,
            };

            let scope = match (&class, &period) {
                (Some(class), Some(period)) => Some(format!("{class}, {period}")),
                (Some(class), None) => Some(class.clone()),
                (None, Some(period)) => Some(period.to_string()),
                (None, None) => None,
            };
            let report = report::build_report(&calendar, scope.as_deref(), &students, &events);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Notifications => {
            let ledger = db::load(&pool, policy).await?;
            if ledger.notifications().is_empty() {
                println!("No pending notifications.");
                return Ok(());
            }
            for notification in ledger.notifications() {
                println!(
                    "- {} [{}] to {} about {}: {}",
                    notification.id,
                    notification.created_at.format("%d/%m/%Y %H:%M"),
                    notification.parent_name,
                    notification.student_name,
                    notification.kind
                );
            }
        }
        Commands::Dismiss { id } => {
            let mut ledger = db::load(&pool, policy).await?;
            if !ledger.dismiss_notification(id) {
                bail!("notification {id} not found");
            }
            db::save(&pool, &ledger).await?;
            println!("Dismissed {id}.");
        }
        Commands::Verify => {
            let ledger = db::load(&pool, policy).await?;
            ledger.check_invariant()?;
            println!(
                "All {} scores agree with {} records.",
                ledger.students().len(),
                ledger.events().len()
            );
        }
    }

    Ok(())
}

fn confirm(yes: bool, action: &str) -> anyhow::Result<()> {
    if !yes {
        bail!("refusing to {action} without --yes");
    }
    Ok(())
}

fn class_viewer(class: Option<String>) -> Viewer {
    match class {
        Some(class_name) => Viewer {
            role: Role::Teacher,
            assigned_class: Some(class_name),
            student_id: None,
        },
        None => Viewer::admin(),
    }
}

async fn finish_deletion(pool: &PgPool, ledger: &Ledger, applied: &Applied) -> anyhow::Result<()> {
    db::save(pool, ledger).await?;
    info!(events = applied.events, "deletion mirrored");
    println!("Deleted {} records.", applied.events);
    print_scores(applied);
    Ok(())
}

fn print_scores(applied: &Applied) {
    for update in &applied.scores {
        println!(
            "- {}: {} -> {} ({:+})",
            update.student_id,
            update.previous,
            update.current,
            update.delta()
        );
    }
    for student_id in &applied.unresolved {
        println!("- {student_id}: not on the roster, score not reconciled");
    }
}
