pub mod config;
pub mod lead;
pub mod reload;
pub mod reminders;
pub mod schedule;

use chrono::{DateTime, Utc};
use classbell_core::{
    Config, Database, HttpTimetableSource, NormalizedSession, ReloadCoordinator, ReminderQueue, TimetableSource,
};
use tracing::debug;

pub type Coordinator = ReloadCoordinator<Box<dyn TimetableSource>, ReminderQueue>;

/// Build the coordinator over the on-disk store and reminder queue.
///
/// Without an explicit source, the configured endpoint is used with whatever
/// token is in `CLASSBELL_TOKEN`.
pub fn open_coordinator(source: Option<Box<dyn TimetableSource>>) -> Result<Coordinator, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let source: Box<dyn TimetableSource> = match source {
        Some(source) => source,
        None => Box::new(HttpTimetableSource::new(
            config.endpoint()?,
            std::env::var("CLASSBELL_TOKEN").ok(),
            config.timeout(),
        )?),
    };
    debug!(source = %source.describe(), "opening coordinator");
    let db = Database::open()?;
    let queue = ReminderQueue::open()?;
    Ok(ReloadCoordinator::new(config, Box::new(db), source, queue)?)
}

/// `--at` override for "now", RFC 3339.
pub fn resolve_now(at: Option<&str>) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    match at {
        Some(text) => Ok(DateTime::parse_from_rfc3339(text)
            .map_err(|e| format!("invalid --at '{text}': {e}"))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

pub fn session_line(session: &NormalizedSession, config: &Config) -> String {
    let locale = config.locale;
    format!(
        "{} - {}  {}  [{}] {}",
        session.start_time_formatted,
        session.end_time_formatted,
        session.subject_or(locale),
        session.room_or(locale),
        session.teacher_or(locale),
    )
}
