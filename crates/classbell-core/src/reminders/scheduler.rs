//! Reconciliation of platform reminders against the current timetable.
//!
//! Each pass:
//! 1. snapshots what the platform has scheduled,
//! 2. derives the desired set (`start - lead`, future triggers only, nearest
//!    `max_pending` kept),
//! 3. cancels owned reminders that are no longer desired,
//! 4. leaves matching reminders alone, reschedules moved ones and schedules
//!    new ones.
//!
//! Running a pass twice with the same inputs makes no schedule or cancel
//! calls the second time.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{reminder_identifier, session_id_of, NotificationService, ReminderPayload, ReminderRecord};
use crate::error::NotifyError;
use crate::session::NormalizedSession;
use crate::time_codec::Locale;

/// Default minutes before class start at which a reminder fires.
pub const DEFAULT_LEAD_MINUTES: i64 = 15;

/// Failure identifier used when the platform listing itself failed.
pub const LIST_SCHEDULED: &str = "list_scheduled";

/// Default cap on outstanding reminders owned by the engine.
pub const DEFAULT_MAX_PENDING: usize = 64;

/// What the reminder pass should aim for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPolicy {
    /// When false every owned reminder is cancelled.
    pub enabled: bool,
    pub lead_minutes: i64,
    /// Maximum reminders outstanding at the platform at once.
    pub max_pending: usize,
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            lead_minutes: DEFAULT_LEAD_MINUTES,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

impl ReminderPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_lead_minutes(mut self, minutes: i64) -> Self {
        self.lead_minutes = minutes;
        self
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Lead as a duration, saturating at the representable range.
    pub fn lead(&self) -> Duration {
        Duration::try_minutes(self.lead_minutes).unwrap_or(if self.lead_minutes < 0 {
            Duration::MIN
        } else {
            Duration::MAX
        })
    }
}

/// A reminder that should exist after the pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredReminder {
    pub session_id: String,
    pub trigger: DateTime<Utc>,
    pub payload: ReminderPayload,
}

/// The desired set plus what was left out of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReminderPlan {
    /// Ordered by trigger, ties in session order.
    pub desired: Vec<DesiredReminder>,
    /// Future sessions whose trigger is already at or before `now`.
    pub too_late: usize,
    /// Sessions beyond the `max_pending` nearest.
    pub dropped_over_cap: usize,
}

/// A single schedule or cancel call that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReminderFailure {
    pub identifier: String,
    pub message: String,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileSummary {
    /// Newly scheduled (or rescheduled) reminders.
    pub scheduled: Vec<ReminderRecord>,
    /// Desired reminders that were already scheduled correctly.
    pub kept: usize,
    /// Session ids whose reminders were cancelled as stale.
    pub cancelled: Vec<String>,
    pub too_late: usize,
    pub dropped_over_cap: usize,
    pub failures: Vec<ReminderFailure>,
}

impl ReconcileSummary {
    /// Summary of a pass that could not start because the scheduled set
    /// could not be listed. Nothing was changed at the platform.
    pub fn listing_failed(err: &NotifyError) -> Self {
        Self {
            failures: vec![ReminderFailure {
                identifier: LIST_SCHEDULED.to_string(),
                message: err.to_string(),
            }],
            ..Self::default()
        }
    }

    /// Whether the pass changed anything at the platform.
    pub fn has_changes(&self) -> bool {
        !self.scheduled.is_empty() || !self.cancelled.is_empty()
    }

    pub fn message(&self) -> String {
        let mut msg = format!(
            "{} scheduled, {} kept, {} cancelled",
            self.scheduled.len(),
            self.kept,
            self.cancelled.len()
        );
        if self.too_late > 0 {
            msg.push_str(&format!(", {} too late", self.too_late));
        }
        if self.dropped_over_cap > 0 {
            msg.push_str(&format!(", {} over cap", self.dropped_over_cap));
        }
        if !self.failures.is_empty() {
            msg.push_str(&format!(", {} failed", self.failures.len()));
        }
        msg
    }
}

/// Keeps platform reminders consistent with the future sessions.
#[derive(Debug, Clone, Default)]
pub struct NotificationScheduler {
    policy: ReminderPolicy,
    locale: Locale,
}

impl NotificationScheduler {
    pub fn new(policy: ReminderPolicy, locale: Locale) -> Self {
        Self { policy, locale }
    }

    pub fn policy(&self) -> &ReminderPolicy {
        &self.policy
    }

    /// Compute the desired reminder set. Pure; no service calls.
    pub fn plan(&self, sessions: &[NormalizedSession], now: DateTime<Utc>) -> ReminderPlan {
        if !self.policy.enabled {
            return ReminderPlan::default();
        }

        let mut plan = ReminderPlan::default();
        let mut seen = HashSet::new();
        for session in sessions.iter().filter(|s| s.start_time >= now) {
            if !seen.insert(session.id.as_str()) {
                continue;
            }
            let trigger = match session.start_time.checked_sub_signed(self.policy.lead()) {
                Some(trigger) if trigger > now => trigger,
                _ => {
                    plan.too_late += 1;
                    continue;
                }
            };
            plan.desired.push(DesiredReminder {
                session_id: session.id.clone(),
                trigger,
                payload: ReminderPayload::for_session(session, self.locale),
            });
        }

        plan.desired.sort_by_key(|d| d.trigger);
        if plan.desired.len() > self.policy.max_pending {
            plan.dropped_over_cap = plan.desired.len() - self.policy.max_pending;
            plan.desired.truncate(self.policy.max_pending);
        }
        plan
    }

    /// Run one reconciliation pass against `service`.
    ///
    /// # Errors
    ///
    /// Only a failed `list_scheduled` aborts the pass, before any change is
    /// made. Individual schedule/cancel failures are recorded in the summary.
    pub async fn reconcile<N: NotificationService + ?Sized>(
        &self,
        service: &N,
        sessions: &[NormalizedSession],
        now: DateTime<Utc>,
    ) -> Result<ReconcileSummary, NotifyError> {
        let snapshot = service.list_scheduled().await?;

        // Owned reminders by session id; a session may show up more than once
        // if an earlier pass was interrupted.
        let mut existing: BTreeMap<String, Vec<DateTime<Utc>>> = BTreeMap::new();
        for reminder in &snapshot {
            if let Some(session_id) = session_id_of(&reminder.identifier) {
                existing
                    .entry(session_id.to_string())
                    .or_default()
                    .push(reminder.trigger_instant);
            }
        }

        let plan = self.plan(sessions, now);
        let mut summary = ReconcileSummary {
            too_late: plan.too_late,
            dropped_over_cap: plan.dropped_over_cap,
            ..ReconcileSummary::default()
        };
        if plan.dropped_over_cap > 0 {
            debug!(
                dropped = plan.dropped_over_cap,
                cap = self.policy.max_pending,
                "reminder cap reached; skipping the most distant sessions"
            );
        }

        let desired_ids: HashSet<&str> = plan.desired.iter().map(|d| d.session_id.as_str()).collect();
        for session_id in existing.keys().filter(|id| !desired_ids.contains(id.as_str())) {
            let identifier = reminder_identifier(session_id);
            match service.cancel(&identifier).await {
                Ok(()) => summary.cancelled.push(session_id.clone()),
                Err(e) => record_failure(&mut summary, identifier, e),
            }
        }

        for desired in &plan.desired {
            let identifier = reminder_identifier(&desired.session_id);
            match existing.get(&desired.session_id) {
                Some(triggers) if triggers.as_slice() == [desired.trigger] => {
                    summary.kept += 1;
                    continue;
                }
                Some(_) => {
                    if let Err(e) = service.cancel(&identifier).await {
                        record_failure(&mut summary, identifier, e);
                        continue;
                    }
                }
                None => {}
            }

            match service.schedule(&identifier, desired.trigger, &desired.payload).await {
                Ok(handle) => summary.scheduled.push(ReminderRecord {
                    session_id: desired.session_id.clone(),
                    trigger_instant: desired.trigger,
                    notification_handle: handle,
                }),
                Err(e) => record_failure(&mut summary, identifier, e),
            }
        }

        if summary.has_changes() || !summary.failures.is_empty() {
            info!(outcome = %summary.message(), "reconciled class reminders");
        } else {
            debug!(kept = summary.kept, "class reminders already up to date");
        }
        Ok(summary)
    }
}

fn record_failure(summary: &mut ReconcileSummary, identifier: String, err: NotifyError) {
    warn!(%identifier, error = %err, "reminder call failed; continuing");
    summary.failures.push(ReminderFailure {
        identifier,
        message: err.to_string(),
    });
}
