//! Conversion of the raw timetable payload into [`NormalizedSession`]s.
//!
//! A malformed entry is skipped and reported in the returned
//! [`NormalizationSummary`]; it never fails the batch. A payload that is not a
//! JSON array normalizes to nothing.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::session::{NormalizedSession, RawTimetableEntry};
use crate::time_codec::{date_key, TimeCodec};

/// Why an entry was left out of the normalized set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    NotAnObject,
    MissingDate,
    InvalidDate(String),
    MissingStart,
    InvalidStart(String),
    MissingEnd,
    InvalidEnd(String),
    EndNotAfterStart,
    DuplicateId(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "entry is not an object"),
            Self::MissingDate => write!(f, "missing date"),
            Self::InvalidDate(d) => write!(f, "unparsable date '{d}'"),
            Self::MissingStart => write!(f, "missing start time"),
            Self::InvalidStart(t) => write!(f, "unparsable start time '{t}'"),
            Self::MissingEnd => write!(f, "missing end time"),
            Self::InvalidEnd(t) => write!(f, "unparsable end time '{t}'"),
            Self::EndNotAfterStart => write!(f, "end time is not after start time"),
            Self::DuplicateId(id) => write!(f, "duplicate session id '{id}'"),
        }
    }
}

/// A dropped payload element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    /// Position in the payload array.
    pub index: usize,
    pub reason: SkipReason,
}

/// Result of one normalization pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NormalizationSummary {
    /// Number of elements in the payload array.
    pub total: usize,
    /// Sessions in payload order.
    pub sessions: Vec<NormalizedSession>,
    pub skipped: Vec<SkippedEntry>,
}

impl NormalizationSummary {
    pub fn has_skipped(&self) -> bool {
        !self.skipped.is_empty()
    }

    pub fn message(&self) -> String {
        if self.skipped.is_empty() {
            format!("Normalized {} session(s).", self.sessions.len())
        } else {
            format!(
                "Normalized {} of {} entries ({} skipped).",
                self.sessions.len(),
                self.total,
                self.skipped.len()
            )
        }
    }
}

/// Turns raw timetable entries into dated sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionNormalizer {
    codec: TimeCodec,
}

impl SessionNormalizer {
    pub fn new(codec: TimeCodec) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &TimeCodec {
        &self.codec
    }

    /// Normalize a whole payload.
    pub fn normalize(&self, payload: &Value) -> NormalizationSummary {
        let Some(items) = payload.as_array() else {
            warn!(kind = json_kind(payload), "timetable payload is not an array; nothing to normalize");
            return NormalizationSummary::default();
        };

        let mut summary = NormalizationSummary {
            total: items.len(),
            sessions: Vec::with_capacity(items.len()),
            skipped: Vec::new(),
        };
        let mut seen_ids = HashSet::new();

        for (index, item) in items.iter().enumerate() {
            let outcome = RawTimetableEntry::from_value(item)
                .ok_or(SkipReason::NotAnObject)
                .and_then(|raw| self.normalize_entry(&raw));

            match outcome {
                Ok(session) if !seen_ids.insert(session.id.clone()) => {
                    warn!(index, id = %session.id, "skipping timetable entry with duplicate id");
                    summary.skipped.push(SkippedEntry {
                        index,
                        reason: SkipReason::DuplicateId(session.id),
                    });
                }
                Ok(session) => summary.sessions.push(session),
                Err(reason) => {
                    warn!(index, %reason, "skipping malformed timetable entry");
                    summary.skipped.push(SkippedEntry { index, reason });
                }
            }
        }

        debug!(
            total = summary.total,
            normalized = summary.sessions.len(),
            skipped = summary.skipped.len(),
            "normalized timetable payload"
        );
        summary
    }

    /// Normalize one entry, or explain why it cannot be.
    pub fn normalize_entry(&self, raw: &RawTimetableEntry) -> Result<NormalizedSession, SkipReason> {
        let date_text = raw.date.as_deref().ok_or(SkipReason::MissingDate)?;
        let date = self
            .codec
            .parse_any_date(date_text)
            .ok_or_else(|| SkipReason::InvalidDate(date_text.to_string()))?;

        let start_text = raw.start.as_deref().ok_or(SkipReason::MissingStart)?;
        let start_time = self
            .resolve(date, start_text)
            .ok_or_else(|| SkipReason::InvalidStart(start_text.to_string()))?;

        let end_text = raw.end.as_deref().ok_or(SkipReason::MissingEnd)?;
        let end_time = self
            .resolve(date, end_text)
            .ok_or_else(|| SkipReason::InvalidEnd(end_text.to_string()))?;

        if start_time >= end_time {
            return Err(SkipReason::EndNotAfterStart);
        }

        let key = date_key(date);
        let start_time_formatted = self.codec.format_time(start_time);
        let id = match &raw.id {
            Some(id) => id.clone(),
            None => synthesize_id(raw.subject_key(), &key, &start_time_formatted),
        };

        Ok(NormalizedSession {
            id,
            subject_name: raw.subject_name.clone(),
            teacher_name: raw.teacher_name.clone(),
            room_name: raw.room_name.clone(),
            day_of_week: self.codec.weekday_label(date),
            date: key,
            start_time,
            end_time,
            start_time_formatted,
            end_time_formatted: self.codec.format_time(end_time),
        })
    }

    /// A time field is either a wall-clock time on `date` or a full instant.
    fn resolve(&self, date: NaiveDate, text: &str) -> Option<DateTime<Utc>> {
        if let Some(instant) = self.codec.parse_instant(text) {
            return Some(instant);
        }
        let time = self.codec.parse_time(text)?;
        self.codec.resolve_local(date.and_time(time))
    }
}

/// Stable id for an entry the portal sent without one.
pub fn synthesize_id(subject: Option<&str>, date_key: &str, start: &str) -> String {
    format!("{}-{}-{}", subject.unwrap_or("unknown"), date_key, start)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
