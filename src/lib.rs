//! Discipline points ledger: per-student scores kept consistent with a log of
//! violations and commendations, plus the school calendar that buckets those
//! records into teaching weeks and report months.

pub mod advisory;
pub mod calendar;
pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod period;
pub mod reconcile;
pub mod report;
pub mod shared;

pub use calendar::{CalendarConfig, CalendarResolver, WeekInfo};
pub use error::{LedgerError, Result};
pub use ledger::{Ledger, LedgerPolicy};
pub use models::{Applied, Event, Role, ScoreUpdate, Student, Viewer, BASELINE_SCORE};
pub use period::{Period, PeriodAggregator};
pub use reconcile::Reconciler;
pub use shared::SharedLedger;
