use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

use crate::calendar::{format_date, CalendarResolver};
use crate::models::{Event, ScoreTier, Student};

#[derive(Debug, Clone, PartialEq)]
pub struct ViolationTypeSummary {
    pub kind: String,
    pub count: usize,
    pub avg_points: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassStanding {
    pub class_name: String,
    pub avg_score: f64,
    pub students: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekTrend {
    pub week_index: i32,
    pub week_label: String,
    pub violations: usize,
    pub commendations: usize,
    sort_key: i64,
}

pub fn summarize_by_type(events: &[&Event]) -> Vec<ViolationTypeSummary> {
    let mut map: HashMap<&str, (usize, i32)> = HashMap::new();

    for event in events.iter().filter(|event| event.is_violation()) {
        let entry = map.entry(event.kind.as_str()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += event.points;
    }

    let mut summaries: Vec<ViolationTypeSummary> = map
        .into_iter()
        .map(|(kind, (count, total_points))| ViolationTypeSummary {
            kind: kind.to_string(),
            count,
            avg_points: if count == 0 {
                0.0
            } else {
                f64::from(total_points) / count as f64
            },
        })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.kind.cmp(&b.kind)));
    summaries
}

/// Classes ordered by average student score, best first.
pub fn class_standings(students: &[&Student]) -> Vec<ClassStanding> {
    let mut totals: BTreeMap<&str, (i64, usize)> = BTreeMap::new();
    for student in students {
        let entry = totals.entry(student.class_name.as_str()).or_insert((0, 0));
        entry.0 += i64::from(student.score);
        entry.1 += 1;
    }

    let mut standings: Vec<ClassStanding> = totals
        .into_iter()
        .map(|(class_name, (total, count))| ClassStanding {
            class_name: class_name.to_string(),
            avg_score: total as f64 / count as f64,
            students: count,
        })
        .collect();

    standings.sort_by(|a, b| {
        b.avg_score
            .partial_cmp(&a.avg_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    standings
}

pub fn tier_distribution(students: &[&Student]) -> BTreeMap<ScoreTier, usize> {
    let mut distribution: BTreeMap<ScoreTier, usize> = [
        ScoreTier::Fail,
        ScoreTier::Pass,
        ScoreTier::Fair,
        ScoreTier::Good,
    ]
    .into_iter()
    .map(|tier| (tier, 0))
    .collect();

    for student in students {
        *distribution.entry(student.tier()).or_insert(0) += 1;
    }
    distribution
}

/// Violations and commendations per resolved week, in calendar order.
pub fn weekly_trend(calendar: &CalendarResolver, events: &[&Event]) -> Vec<WeekTrend> {
    let mut weeks: HashMap<String, WeekTrend> = HashMap::new();

    for event in events {
        let info = calendar.resolve(event.date);
        let entry = weeks
            .entry(info.week_label.clone())
            .or_insert_with(|| WeekTrend {
                week_index: info.week_index,
                week_label: info.week_label.clone(),
                violations: 0,
                commendations: 0,
                sort_key: info.sort_key,
            });
        if event.is_violation() {
            entry.violations += 1;
        } else if event.is_commendation() {
            entry.commendations += 1;
        }
    }

    let mut trend: Vec<WeekTrend> = weeks.into_values().collect();
    trend.sort_by_key(|week| week.sort_key);
    trend
}

pub fn build_report(
    calendar: &CalendarResolver,
    scope: Option<&str>,
    students: &[&Student],
    events: &[&Event],
) -> String {
    let summaries = summarize_by_type(events);
    let standings = class_standings(students);
    let tiers = tier_distribution(students);
    let trend = weekly_trend(calendar, events);

    let mut output = String::new();
    let scope_label = scope.unwrap_or("all classes");

    let _ = writeln!(output, "# Discipline Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} records, {} students)",
        scope_label,
        events.len(),
        students.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Violation Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No violations recorded for this selection.");
    } else {
        for summary in summaries.iter().take(8) {
            let _ = writeln!(
                output,
                "- {}: {} records (avg {:.1} points)",
                summary.kind, summary.count, summary.avg_points
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Class Standings");

    if standings.is_empty() {
        let _ = writeln!(output, "No students in this selection.");
    } else {
        for (rank, standing) in standings.iter().enumerate() {
            let _ = writeln!(
                output,
                "{}. {} average {:.1} across {} students",
                rank + 1,
                standing.class_name,
                standing.avg_score,
                standing.students
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Score Tiers");
    for (tier, count) in tiers.iter().rev() {
        let _ = writeln!(output, "- {}: {}", tier.label(), count);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Weekly Trend");

    if trend.is_empty() {
        let _ = writeln!(output, "No records in this selection.");
    } else {
        for week in &trend {
            let _ = writeln!(
                output,
                "- {}: {} violations, {} commendations",
                week.week_label, week.violations, week.commendations
            );
        }
    }

    let mut recent: Vec<&Event> = events.to_vec();
    recent.sort_by(|a, b| b.date.cmp(&a.date));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Notes");

    if recent.is_empty() {
        let _ = writeln!(output, "No records in this selection.");
    } else {
        for event in recent.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} ({}, {:+}) on {}: {}",
                event.student_name,
                event.kind,
                event.points,
                format_date(event.date),
                event.note
            );
        }
    }

    output
}
