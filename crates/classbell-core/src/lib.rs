//! # Classbell Core Library
//!
//! Timetable engine for a student portal: it turns the loosely typed
//! timetable payload into dated class sessions, answers "what is next" and
//! "what is left, by day", and keeps class reminders scheduled a configurable
//! lead time before each session.
//!
//! ## Architecture
//!
//! - **Time codec**: date/time parsing and localized formatting in the
//!   institution's time zone
//! - **Normalizer**: raw payload to [`NormalizedSession`]s with absolute instants
//! - **Views**: [`find_upcoming`] and [`ScheduleGrouper`]
//! - **Reminders**: [`NotificationScheduler`] reconciles the platform's
//!   scheduled set against the timetable
//! - **Coordinator**: [`ReloadCoordinator`] runs fetch, normalize, persist and
//!   reschedule with a single in-flight reload
//! - **Storage**: SQLite timetable store and TOML configuration

pub mod coordinator;
pub mod error;
pub mod grouper;
pub mod normalizer;
pub mod reminders;
pub mod session;
pub mod source;
pub mod storage;
pub mod time_codec;
pub mod upcoming;

pub use coordinator::{LeadTimeChange, ReloadCoordinator, ReloadOutcome, ReloadReport};
pub use error::{ConfigError, CoreError, NotifyError, ReloadError, SourceError, StoreError};
pub use grouper::ScheduleGrouper;
pub use normalizer::{NormalizationSummary, SessionNormalizer, SkipReason, SkippedEntry};
pub use reminders::{
    NotificationScheduler, NotificationService, ReconcileSummary, ReminderPayload, ReminderPolicy, ReminderQueue,
    ReminderRecord, ScheduledReminder,
};
pub use session::{NormalizedSession, RawTimetableEntry, ScheduleSection};
pub use source::{FileTimetableSource, HttpTimetableSource, TimetableSource};
pub use storage::{Config, Database, ScheduleStore};
pub use time_codec::{Locale, TimeCodec};
pub use upcoming::find_upcoming;
