//! Reload orchestration.
//!
//! A reload fetches the raw timetable, normalizes it, persists the session
//! set together with the reload instant and then runs a reminder pass. Only
//! one reload runs at a time. Every reload takes a sequence number on entry;
//! if a newer reload (or [`ReloadCoordinator::supersede`]) has bumped the
//! sequence by the time this one holds the guard or has its payload, it
//! returns [`ReloadOutcome::Superseded`] and applies nothing.
//!
//! ## Usage
//! ```rust,ignore
//! let coordinator = ReloadCoordinator::new(config, Box::new(db), source, queue)?;
//! match coordinator.reload(Utc::now()).await? {
//!     ReloadOutcome::Applied(report) => println!("{}", report.message()),
//!     other => println!("{other:?}"),
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ReloadError, Result, StoreError};
use crate::grouper::ScheduleGrouper;
use crate::normalizer::{NormalizationSummary, SessionNormalizer};
use crate::reminders::{NotificationScheduler, NotificationService, ReconcileSummary};
use crate::session::{NormalizedSession, ScheduleSection};
use crate::source::TimetableSource;
use crate::storage::{Config, ScheduleStore};
use crate::upcoming::find_upcoming;

/// What an applied reload produced.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadReport {
    pub sequence: u64,
    pub normalization: NormalizationSummary,
    pub reminders: ReconcileSummary,
}

impl ReloadReport {
    /// The session set now in effect.
    pub fn sessions(&self) -> &[NormalizedSession] {
        &self.normalization.sessions
    }

    pub fn message(&self) -> String {
        format!("{} Reminders: {}.", self.normalization.message(), self.reminders.message())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReloadOutcome {
    Applied(ReloadReport),
    /// A newer reload or a supersede call won; nothing was applied.
    Superseded { sequence: u64 },
    /// The last reload is recent enough; nothing was fetched.
    Fresh { last_reload_at: DateTime<Utc> },
}

/// Result of a lead time change.
#[derive(Debug, Clone, Serialize)]
pub struct LeadTimeChange {
    pub requested: i64,
    /// The value after snapping to the step and clamping to the bounds.
    pub applied: i64,
    pub reminders: ReconcileSummary,
}

/// Owns the stored timetable and keeps reminders in line with it.
pub struct ReloadCoordinator<S, N> {
    config: Config,
    store: Mutex<Box<dyn ScheduleStore>>,
    source: S,
    notifier: N,
    normalizer: SessionNormalizer,
    grouper: ScheduleGrouper,
    sequence: AtomicU64,
    in_flight: tokio::sync::Mutex<()>,
}

impl<S: TimetableSource, N: NotificationService> ReloadCoordinator<S, N> {
    /// # Errors
    ///
    /// Returns an error if `config` does not validate.
    pub fn new(config: Config, store: Box<dyn ScheduleStore>, source: S, notifier: N) -> Result<Self, ConfigError> {
        config.validate()?;
        let codec = config.codec()?;
        Ok(Self {
            config,
            store: Mutex::new(store),
            source,
            notifier,
            normalizer: SessionNormalizer::new(codec),
            grouper: ScheduleGrouper::new(codec),
            sequence: AtomicU64::new(0),
            in_flight: tokio::sync::Mutex::new(()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Sequence number of the most recent reload or supersede call.
    pub fn current_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Invalidate any reload in flight (logout, account switch).
    pub fn supersede(&self) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(sequence, "superseded in-flight reloads");
        sequence
    }

    /// Fetch, normalize, persist and reschedule.
    ///
    /// # Errors
    ///
    /// A source failure leaves stored sessions, the last reload instant and
    /// reminders untouched. A failure to list scheduled reminders does not
    /// fail the reload: the new session set stays applied, the failure is
    /// recorded in the report's reminder summary and [`Self::reschedule`] can
    /// be retried on its own.
    pub async fn reload(&self, now: DateTime<Utc>) -> Result<ReloadOutcome> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = self.in_flight.lock().await;
        if self.current_sequence() != sequence {
            debug!(sequence, "reload superseded before fetch");
            return Ok(ReloadOutcome::Superseded { sequence });
        }

        debug!(sequence, source = %self.source.describe(), "reload started");
        let payload = self.source.fetch().await?;
        if self.current_sequence() != sequence {
            debug!(sequence, "reload superseded after fetch; discarding payload");
            return Ok(ReloadOutcome::Superseded { sequence });
        }

        let normalization = self.normalizer.normalize(&payload);
        self.store()?.replace_sessions(&normalization.sessions, now)?;
        let reminders = self.degraded_reminder_pass(&normalization.sessions, now).await?;

        let report = ReloadReport {
            sequence,
            normalization,
            reminders,
        };
        info!(sequence, outcome = %report.message(), "reload applied");
        Ok(ReloadOutcome::Applied(report))
    }

    /// Reload unless the last one is younger than `reload.min_interval_minutes`.
    pub async fn reload_if_stale(&self, now: DateTime<Utc>) -> Result<ReloadOutcome> {
        if let Some(last) = self.last_reload_at()? {
            let interval = Duration::try_minutes(self.config.reload.min_interval_minutes).unwrap_or(Duration::MAX);
            let age = now.signed_duration_since(last);
            if age < Duration::zero() {
                debug!(%last, %now, "last reload is in the future; treating timetable as stale");
            } else if age < interval {
                debug!(%last, "timetable is fresh; skipping reload");
                return Ok(ReloadOutcome::Fresh { last_reload_at: last });
            }
        }
        self.reload(now).await
    }

    /// Date sections of the stored sessions starting at or after `now`.
    pub fn sections(&self, now: DateTime<Utc>) -> Result<Vec<ScheduleSection>> {
        let sessions = self.store()?.load_sessions()?;
        Ok(self.grouper.group(&sessions, now))
    }

    /// The stored session starting soonest after `now`.
    pub fn upcoming(&self, now: DateTime<Utc>) -> Result<Option<NormalizedSession>> {
        let sessions = self.store()?.load_sessions()?;
        Ok(find_upcoming(&sessions, now).cloned())
    }

    pub fn sessions(&self) -> Result<Vec<NormalizedSession>> {
        Ok(self.store()?.load_sessions()?)
    }

    pub fn last_reload_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.store()?.last_reload_at()?)
    }

    /// The lead time in effect: the stored choice, else the configured
    /// default, snapped into bounds either way.
    pub fn lead_minutes(&self) -> Result<i64> {
        let stored = self.store()?.lead_minutes()?;
        let minutes = stored.unwrap_or(self.config.reminders.lead_minutes);
        Ok(self.config.lead_bounds().snap(minutes))
    }

    /// Store a new lead time and move every reminder to match it.
    ///
    /// # Errors
    ///
    /// Non-positive values are rejected; anything else is snapped to the
    /// step and clamped to the configured bounds.
    pub async fn set_lead_minutes(&self, minutes: i64, now: DateTime<Utc>) -> Result<LeadTimeChange> {
        if minutes <= 0 {
            return Err(ReloadError::InvalidLeadTime(minutes).into());
        }
        let applied = self.config.lead_bounds().snap(minutes);

        let _guard = self.in_flight.lock().await;
        self.store()?.set_lead_minutes(applied)?;
        let sessions = self.store()?.load_sessions()?;
        let reminders = self.degraded_reminder_pass(&sessions, now).await?;
        info!(requested = minutes, applied, "lead time changed");
        Ok(LeadTimeChange {
            requested: minutes,
            applied,
            reminders,
        })
    }

    /// Reminder pass over the stored sessions.
    pub async fn reschedule(&self, now: DateTime<Utc>) -> Result<ReconcileSummary> {
        let _guard = self.in_flight.lock().await;
        let sessions = self.store()?.load_sessions()?;
        self.reminder_pass(&sessions, now).await
    }

    async fn reminder_pass(&self, sessions: &[NormalizedSession], now: DateTime<Utc>) -> Result<ReconcileSummary> {
        let scheduler = self.scheduler()?;
        Ok(scheduler.reconcile(&self.notifier, sessions, now).await?)
    }

    /// Reminder pass after a committed change: a failed listing is reported
    /// in the summary instead of failing the caller.
    async fn degraded_reminder_pass(
        &self,
        sessions: &[NormalizedSession],
        now: DateTime<Utc>,
    ) -> Result<ReconcileSummary> {
        let scheduler = self.scheduler()?;
        match scheduler.reconcile(&self.notifier, sessions, now).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                warn!(error = %e, "could not list scheduled reminders; reminders left as they were");
                Ok(ReconcileSummary::listing_failed(&e))
            }
        }
    }

    fn scheduler(&self) -> Result<NotificationScheduler> {
        let policy = self.config.reminder_policy(self.lead_minutes()?);
        Ok(NotificationScheduler::new(policy, self.config.locale))
    }

    fn store(&self) -> Result<MutexGuard<'_, Box<dyn ScheduleStore>>, StoreError> {
        self.store.lock().map_err(|_| StoreError::Locked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::reminders::ReminderQueue;
    use crate::storage::Database;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::{json, Value};

    struct StaticSource(Value);

    #[async_trait]
    impl TimetableSource for StaticSource {
        async fn fetch(&self) -> Result<Value, SourceError> {
            Ok(self.0.clone())
        }

        fn describe(&self) -> String {
            "static".into()
        }
    }

    fn coordinator(payload: Value) -> ReloadCoordinator<StaticSource, ReminderQueue> {
        ReloadCoordinator::new(
            Config::default(),
            Box::new(Database::open_memory().unwrap()),
            StaticSource(payload),
            ReminderQueue::in_memory(),
        )
        .unwrap()
    }

    fn local(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, minute, 0).unwrap() - Duration::hours(7)
    }

    fn payload() -> Value {
        json!([
            {"subject": "Math", "date": "10-03-2025", "start": "07:00", "end": "09:00"},
            {"subject": "Art", "date": "10-03-2025", "start": "13:00", "end": "15:00"},
        ])
    }

    #[tokio::test]
    async fn reload_then_read_views() {
        let c = coordinator(payload());
        let outcome = c.reload(local(6, 0)).await.unwrap();
        let ReloadOutcome::Applied(report) = outcome else {
            panic!("expected applied reload");
        };
        assert_eq!(report.sessions().len(), 2);
        assert_eq!(report.reminders.scheduled.len(), 2);

        assert_eq!(c.upcoming(local(6, 0)).unwrap().unwrap().subject_name.as_deref(), Some("Math"));
        assert_eq!(c.sections(local(8, 0)).unwrap()[0].sessions.len(), 1);
        assert_eq!(c.last_reload_at().unwrap(), Some(local(6, 0)));
    }

    #[tokio::test]
    async fn supersede_before_reload_is_not_sticky() {
        let c = coordinator(payload());
        c.supersede();
        assert!(matches!(c.reload(local(6, 0)).await.unwrap(), ReloadOutcome::Applied(_)));
    }

    #[tokio::test]
    async fn reload_if_stale_respects_interval() {
        let c = coordinator(payload());
        c.reload(local(6, 0)).await.unwrap();
        assert!(matches!(
            c.reload_if_stale(local(6, 30)).await.unwrap(),
            ReloadOutcome::Fresh { .. }
        ));
        assert!(matches!(
            c.reload_if_stale(local(7, 0)).await.unwrap(),
            ReloadOutcome::Applied(_)
        ));
    }

    #[tokio::test]
    async fn lead_change_is_snapped_clamped_and_rescheduled() {
        let c = coordinator(payload());
        c.reload(local(6, 0)).await.unwrap();

        let change = c.set_lead_minutes(28, local(6, 0)).await.unwrap();
        assert_eq!(change.applied, 30);
        assert_eq!(change.reminders.scheduled.len(), 2);
        assert_eq!(c.lead_minutes().unwrap(), 30);
        let pending = c.notifier().pending().unwrap();
        assert_eq!(pending[0].trigger_instant, local(6, 30));

        assert_eq!(c.set_lead_minutes(999, local(6, 0)).await.unwrap().applied, 120);
        assert_eq!(c.set_lead_minutes(i64::MAX, local(6, 0)).await.unwrap().applied, 120);
        assert!(c.set_lead_minutes(0, local(6, 0)).await.is_err());
    }

    #[tokio::test]
    async fn reload_if_stale_with_maximum_interval_stays_fresh() {
        let mut config = Config::default();
        config.set("reload.min_interval_minutes", &crate::storage::RELOAD_INTERVAL_LIMIT.to_string()).unwrap();
        let c = ReloadCoordinator::new(
            config,
            Box::new(Database::open_memory().unwrap()),
            StaticSource(payload()),
            ReminderQueue::in_memory(),
        )
        .unwrap();
        c.reload(local(6, 0)).await.unwrap();
        assert!(matches!(
            c.reload_if_stale(local(6, 0) + Duration::days(6)).await.unwrap(),
            ReloadOutcome::Fresh { .. }
        ));
    }

    #[tokio::test]
    async fn reload_if_stale_reloads_when_clock_went_backwards() {
        let c = coordinator(payload());
        c.reload(local(6, 0)).await.unwrap();
        let outcome = c.reload_if_stale(local(5, 30)).await.unwrap();
        assert!(matches!(outcome, ReloadOutcome::Applied(_)));
        assert_eq!(c.last_reload_at().unwrap(), Some(local(5, 30)));
    }
}
