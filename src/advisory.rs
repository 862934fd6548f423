use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::config::AdvisoryWindow;
use crate::ledger::Ledger;
use crate::models::{Event, Viewer};
use crate::period::{visible_events, visible_students};

pub const MAX_ACTIONS: usize = 4;
const CHAT_FALLBACK: &str = "The advisor is unavailable right now. Please try again later.";
const INSIGHT_FALLBACK: &str = "Unable to analyse the data right now.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: String,
    pub name: String,
    pub class_name: String,
    pub score: i32,
}

/// Read-only slice of the ledger handed to an advisor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryContext {
    pub roster: Vec<RosterEntry>,
    pub recent_events: Vec<Event>,
}

impl AdvisoryContext {
    /// Roster visible to `viewer` and its last `window` events in insertion order.
    pub fn snapshot(ledger: &Ledger, viewer: &Viewer, window: usize) -> Self {
        let roster = visible_students(ledger.students(), viewer)
            .into_iter()
            .map(|student| RosterEntry {
                id: student.id.clone(),
                name: student.name.clone(),
                class_name: student.class_name.clone(),
                score: student.score,
            })
            .collect();

        let events = visible_events(ledger.events(), viewer);
        let skip = events.len().saturating_sub(window);
        let recent_events = events.into_iter().skip(skip).cloned().collect();

        Self {
            roster,
            recent_events,
        }
    }

    pub fn for_chat(ledger: &Ledger, viewer: &Viewer, window: &AdvisoryWindow) -> Self {
        Self::snapshot(ledger, viewer, window.chat_events)
    }

    pub fn for_insights(ledger: &Ledger, viewer: &Viewer, window: &AdvisoryWindow) -> Self {
        Self::snapshot(ledger, viewer, window.insight_events)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    RemindClass,
    RemindStudent,
    PraiseClass,
    PraiseStudent,
    MeetingRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub target: String,
    pub reason: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insights {
    pub summary: String,
    #[serde(default)]
    pub actions: Vec<AdvisoryAction>,
}

/// An opaque advisory service. It only ever sees a snapshot.
#[async_trait]
pub trait Advisor: Send + Sync {
    async fn chat(&self, prompt: &str, history: &[ChatTurn], context: &AdvisoryContext)
        -> Result<String>;

    async fn insights(&self, context: &AdvisoryContext) -> Result<Insights>;
}

/// Parses an advisor's JSON answer, keeping at most [`MAX_ACTIONS`] actions.
pub fn parse_insights(raw: &str) -> Insights {
    match serde_json::from_str::<Insights>(raw) {
        Ok(mut insights) => {
            insights.actions.truncate(MAX_ACTIONS);
            insights
        }
        Err(err) => {
            warn!(%err, "discarding malformed advisor insights");
            Insights {
                summary: INSIGHT_FALLBACK.to_string(),
                actions: Vec::new(),
            }
        }
    }
}

pub async fn chat_or_fallback(
    advisor: &dyn Advisor,
    prompt: &str,
    history: &[ChatTurn],
    context: &AdvisoryContext,
) -> String {
    match advisor.chat(prompt, history, context).await {
        Ok(answer) => answer,
        Err(err) => {
            warn!(error = %err, "advisor chat failed");
            CHAT_FALLBACK.to_string()
        }
    }
}

pub async fn insights_or_fallback(advisor: &dyn Advisor, context: &AdvisoryContext) -> Insights {
    match advisor.insights(context).await {
        Ok(mut insights) => {
            insights.actions.truncate(MAX_ACTIONS);
            insights
        }
        Err(err) => {
            warn!(error = %err, "advisor insights failed");
            Insights {
                summary: INSIGHT_FALLBACK.to_string(),
                actions: Vec::new(),
            }
        }
    }
}

/// Turns an accepted action into a parent notification. Never touches scores.
pub fn notify_from_action(ledger: &mut Ledger, action: &AdvisoryAction) -> Uuid {
    ledger.push_notification(action.target.clone(), "Parent", action.reason.clone())
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use chrono::NaiveDate;

    use super::*;
    use crate::models::{Role, Student};

    struct Canned;

    #[async_trait]
    impl Advisor for Canned {
        async fn chat(
            &self,
            prompt: &str,
            history: &[ChatTurn],
            context: &AdvisoryContext,
        ) -> Result<String> {
            Ok(format!(
                "{prompt} ({} turns, {} events)",
                history.len(),
                context.recent_events.len()
            ))
        }

        async fn insights(&self, _context: &AdvisoryContext) -> Result<Insights> {
            Ok(parse_insights(
                r#"{"summary":"Mostly calm","actions":[
                    {"type":"PRAISE_CLASS","target":"10A2","reason":"No violations","label":"Praise 10A2"},
                    {"type":"REMIND_STUDENT","target":"Avery Lee","reason":"Late twice","label":"Remind Avery"}
                ]}"#,
            ))
        }
    }

    struct Offline;

    #[async_trait]
    impl Advisor for Offline {
        async fn chat(&self, _: &str, _: &[ChatTurn], _: &AdvisoryContext) -> Result<String> {
            Err(anyhow!("connection refused"))
        }

        async fn insights(&self, _: &AdvisoryContext) -> Result<Insights> {
            Err(anyhow!("connection refused"))
        }
    }

    fn ledger_with_events(count: usize) -> Ledger {
        let mut ledger = Ledger::default();
        let avery = Student::new("s1", "Avery Lee", "10A1");
        let jules = Student::new("s2", "Jules Moreno", "10A2");
        ledger.add_student(avery.clone()).unwrap();
        ledger.add_student(jules).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 10, 6).unwrap();
        for n in 0..count {
            let mut event = Event::new(&avery, date, "Late", -2);
            event.note = format!("entry {n}");
            ledger.insert(event).unwrap();
        }
        ledger
    }

    #[test]
    fn snapshot_keeps_the_latest_window() {
        let ledger = ledger_with_events(20);
        let context = AdvisoryContext::snapshot(&ledger, &Viewer::admin(), 15);
        assert_eq!(context.roster.len(), 2);
        assert_eq!(context.recent_events.len(), 15);
        assert_eq!(context.recent_events[0].note, "entry 5");
        assert_eq!(context.recent_events[14].note, "entry 19");
    }

    #[test]
    fn snapshot_respects_viewer_scope() {
        let ledger = ledger_with_events(3);
        let viewer = Viewer {
            role: Role::Teacher,
            assigned_class: Some("10A2".to_string()),
            student_id: None,
        };
        let context = AdvisoryContext::snapshot(&ledger, &viewer, 30);
        assert_eq!(context.roster.len(), 1);
        assert!(context.recent_events.is_empty());
    }

    #[test]
    fn configured_windows_size_the_context() {
        let ledger = ledger_with_events(40);
        let window = AdvisoryWindow::default();
        let chat = AdvisoryContext::for_chat(&ledger, &Viewer::admin(), &window);
        let insights = AdvisoryContext::for_insights(&ledger, &Viewer::admin(), &window);
        assert_eq!(chat.recent_events.len(), 15);
        assert_eq!(insights.recent_events.len(), 30);
        assert_eq!(insights.recent_events[29].note, "entry 39");

        let narrow = AdvisoryWindow {
            chat_events: 3,
            insight_events: 5,
        };
        let chat = AdvisoryContext::for_chat(&ledger, &Viewer::admin(), &narrow);
        assert_eq!(chat.recent_events.len(), 3);
    }

    #[test]
    fn malformed_insights_fall_back() {
        let insights = parse_insights("not json");
        assert_eq!(insights.summary, INSIGHT_FALLBACK);
        assert!(insights.actions.is_empty());
    }

    #[test]
    fn insights_are_capped() {
        let action = r#"{"type":"MEETING_REQUEST","target":"10A1","reason":"r","label":"l"}"#;
        let raw = format!(
            r#"{{"summary":"busy week","actions":[{action},{action},{action},{action},{action}]}}"#
        );
        assert_eq!(parse_insights(&raw).actions.len(), MAX_ACTIONS);
    }

    #[tokio::test]
    async fn advisor_answers_pass_through() {
        let ledger = ledger_with_events(2);
        let context = AdvisoryContext::snapshot(&ledger, &Viewer::admin(), 15);
        let history = vec![ChatTurn {
            role: ChatRole::User,
            text: "hello".to_string(),
        }];

        let answer = chat_or_fallback(&Canned, "Who is late?", &history, &context).await;
        assert_eq!(answer, "Who is late? (1 turns, 2 events)");

        let insights = insights_or_fallback(&Canned, &context).await;
        assert_eq!(insights.actions.len(), 2);
        assert_eq!(insights.actions[0].kind, ActionKind::PraiseClass);
    }

    #[tokio::test]
    async fn advisor_failures_never_propagate() {
        let context = AdvisoryContext::default();
        assert_eq!(
            chat_or_fallback(&Offline, "hi", &[], &context).await,
            CHAT_FALLBACK
        );
        let insights = insights_or_fallback(&Offline, &context).await;
        assert_eq!(insights.summary, INSIGHT_FALLBACK);
    }

    #[test]
    fn accepted_action_becomes_a_notification_only() {
        let mut ledger = ledger_with_events(1);
        let before = ledger.notifications().len();
        let action = AdvisoryAction {
            kind: ActionKind::RemindStudent,
            target: "Avery Lee".to_string(),
            reason: "Late twice".to_string(),
            label: "Remind Avery".to_string(),
        };
        notify_from_action(&mut ledger, &action);
        assert_eq!(ledger.notifications().len(), before + 1);
        assert_eq!(ledger.student("s1").unwrap().score, 198);
    }
}
