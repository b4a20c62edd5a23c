//! Class reminders: the notification service contract, the reconciliation
//! pass that keeps scheduled reminders in line with the timetable, and a
//! file-backed service for hosts without a platform scheduler.

pub mod queue;
pub mod scheduler;

pub use queue::{QueuedReminder, ReminderQueue};
pub use scheduler::{
    DesiredReminder, NotificationScheduler, ReconcileSummary, ReminderFailure, ReminderPlan, ReminderPolicy,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NotifyError;
use crate::session::NormalizedSession;
use crate::time_codec::Locale;

/// Prefix of every notification identifier this engine owns.
pub const IDENTIFIER_PREFIX: &str = "class-reminder:";

/// Platform identifier for a session's reminder.
pub fn reminder_identifier(session_id: &str) -> String {
    format!("{IDENTIFIER_PREFIX}{session_id}")
}

/// Session id behind an identifier, or `None` if the engine does not own it.
pub fn session_id_of(identifier: &str) -> Option<&str> {
    identifier.strip_prefix(IDENTIFIER_PREFIX)
}

/// What the platform shows when a reminder fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderPayload {
    pub session_id: String,
    pub title: String,
    pub body: String,
}

impl ReminderPayload {
    pub fn for_session(session: &NormalizedSession, locale: Locale) -> Self {
        let subject = session.subject_or(locale);
        let title = match locale {
            Locale::Vi => format!("{subject} sắp bắt đầu"),
            Locale::En => format!("{subject} starts soon"),
        };
        let room_label = match locale {
            Locale::Vi => "Phòng",
            Locale::En => "Room",
        };
        Self {
            session_id: session.id.clone(),
            title,
            body: format!(
                "{} - {} · {} {}",
                session.start_time_formatted,
                session.end_time_formatted,
                room_label,
                session.room_or(locale)
            ),
        }
    }
}

/// One entry of the platform's currently scheduled set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledReminder {
    pub identifier: String,
    pub trigger_instant: DateTime<Utc>,
}

/// A reminder the engine asked the platform to schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRecord {
    pub session_id: String,
    pub trigger_instant: DateTime<Utc>,
    pub notification_handle: String,
}

/// Platform notification scheduler.
///
/// Calls are not assumed to be transactional: any single call may fail while
/// others succeed, and `list_scheduled` is only a snapshot.
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Schedule a reminder; returns the platform's handle.
    async fn schedule(
        &self,
        identifier: &str,
        trigger: DateTime<Utc>,
        payload: &ReminderPayload,
    ) -> Result<String, NotifyError>;

    /// Cancel every reminder scheduled under `identifier`.
    async fn cancel(&self, identifier: &str) -> Result<(), NotifyError>;

    /// Everything currently scheduled, including reminders owned by others.
    async fn list_scheduled(&self) -> Result<Vec<ScheduledReminder>, NotifyError>;
}
