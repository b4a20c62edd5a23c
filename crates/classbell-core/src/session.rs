//! Timetable data model.
//!
//! [`RawTimetableEntry`] is the loosely-typed record read from the portal
//! payload; [`NormalizedSession`] is the strict record every later stage works
//! with. Nothing downstream of the normalizer ever sees a raw entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::time_codec::Locale;

/// One class meeting as delivered by the portal, fields possibly absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTimetableEntry {
    pub id: Option<String>,
    pub subject_code: Option<String>,
    pub subject_name: Option<String>,
    pub teacher_name: Option<String>,
    pub room_name: Option<String>,
    pub date: Option<String>,
    pub day_of_week: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl RawTimetableEntry {
    /// Read an entry from one element of the payload array.
    ///
    /// Returns `None` only when the element is not a JSON object. Field lookups
    /// try several key spellings because the portal's shape is not fixed.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }

        Some(Self {
            id: first_text(value, &["id"], true),
            subject_code: first_text(value, &["subjectCode", "subject.subjectCode", "subject.code"], false),
            subject_name: first_text(
                value,
                &["subjectName", "subject.subjectName", "subject.name", "subject"],
                false,
            ),
            teacher_name: first_text(
                value,
                &["teacherName", "teacher.displayName", "teacher.name", "teacher"],
                false,
            ),
            room_name: first_text(value, &["roomName", "room.name", "room"], false),
            date: first_text(value, &["date", "dateString", "studyDate"], false),
            day_of_week: first_text(value, &["dayOfWeek", "weekIndex"], true),
            start: first_text(
                value,
                &["start", "startTime", "startString", "startHour.startString"],
                false,
            ),
            end: first_text(value, &["end", "endTime", "endString", "endHour.endString"], false),
        })
    }

    /// Subject code if present, otherwise the subject name.
    pub fn subject_key(&self) -> Option<&str> {
        self.subject_code.as_deref().or(self.subject_name.as_deref())
    }
}

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

/// First non-empty string found under any of `paths`.
///
/// Numbers count only when `allow_numbers` is set (ids, weekday indices).
fn first_text(root: &Value, paths: &[&str], allow_numbers: bool) -> Option<String> {
    paths.iter().find_map(|path| match lookup(root, path)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) if allow_numbers => Some(n.to_string()),
        _ => None,
    })
}

/// A dated class session with resolved instants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedSession {
    pub id: String,
    pub subject_name: Option<String>,
    pub teacher_name: Option<String>,
    pub room_name: Option<String>,
    /// Grouping key, `dd-MM-yyyy`.
    pub date: String,
    pub day_of_week: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub start_time_formatted: String,
    pub end_time_formatted: String,
}

impl NormalizedSession {
    pub fn subject_or(&self, locale: Locale) -> &str {
        self.subject_name.as_deref().unwrap_or(locale.not_available())
    }

    pub fn teacher_or(&self, locale: Locale) -> &str {
        self.teacher_name.as_deref().unwrap_or(locale.not_available())
    }

    pub fn room_or(&self, locale: Locale) -> &str {
        self.room_name.as_deref().unwrap_or(locale.not_available())
    }
}

/// Sessions sharing one date key, ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSection {
    pub title: String,
    pub date_sort_key: String,
    pub sessions: Vec<NormalizedSession>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_flat_entry() {
        let raw = RawTimetableEntry::from_value(&json!({
            "subject": "Math",
            "date": "10-03-2025",
            "start": "07:00",
            "end": "09:00",
        }))
        .unwrap();
        assert_eq!(raw.subject_name.as_deref(), Some("Math"));
        assert_eq!(raw.subject_code, None);
        assert_eq!(raw.start.as_deref(), Some("07:00"));
        assert_eq!(raw.subject_key(), Some("Math"));
    }

    #[test]
    fn reads_nested_portal_entry() {
        let raw = RawTimetableEntry::from_value(&json!({
            "id": 42,
            "subject": {"subjectCode": "MATH101", "subjectName": "Giải tích"},
            "teacher": {"displayName": "Nguyễn Văn A"},
            "room": {"name": "A2-301"},
            "dateString": "10/03/2025",
            "dayOfWeek": 2,
            "startHour": {"startString": "07:00"},
            "endHour": {"endString": "09:00"},
        }))
        .unwrap();
        assert_eq!(raw.id.as_deref(), Some("42"));
        assert_eq!(raw.subject_code.as_deref(), Some("MATH101"));
        assert_eq!(raw.subject_name.as_deref(), Some("Giải tích"));
        assert_eq!(raw.teacher_name.as_deref(), Some("Nguyễn Văn A"));
        assert_eq!(raw.room_name.as_deref(), Some("A2-301"));
        assert_eq!(raw.date.as_deref(), Some("10/03/2025"));
        assert_eq!(raw.day_of_week.as_deref(), Some("2"));
        assert_eq!(raw.subject_key(), Some("MATH101"));
    }

    #[test]
    fn non_string_fields_count_as_absent() {
        let raw = RawTimetableEntry::from_value(&json!({
            "date": 20250310,
            "start": ["07:00"],
            "end": "",
            "room": null,
        }))
        .unwrap();
        assert_eq!(raw.date, None);
        assert_eq!(raw.start, None);
        assert_eq!(raw.end, None);
        assert_eq!(raw.room_name, None);
    }

    #[test]
    fn non_objects_are_rejected() {
        assert!(RawTimetableEntry::from_value(&json!("Math")).is_none());
        assert!(RawTimetableEntry::from_value(&json!(null)).is_none());
    }

    #[test]
    fn absent_display_fields_render_placeholder() {
        let session = NormalizedSession {
            id: "x".into(),
            subject_name: None,
            teacher_name: None,
            room_name: Some("B1".into()),
            date: "10-03-2025".into(),
            day_of_week: "Thứ Hai".into(),
            start_time: Utc::now(),
            end_time: Utc::now(),
            start_time_formatted: "07:00".into(),
            end_time_formatted: "09:00".into(),
        };
        assert_eq!(session.subject_or(Locale::Vi), "Chưa có");
        assert_eq!(session.teacher_or(Locale::En), "N/A");
        assert_eq!(session.room_or(Locale::En), "B1");
    }

    #[test]
    fn session_serializes_camel_case() {
        let session = NormalizedSession {
            id: "x".into(),
            subject_name: Some("Math".into()),
            teacher_name: None,
            room_name: None,
            date: "10-03-2025".into(),
            day_of_week: "Thứ Hai".into(),
            start_time: Utc::now(),
            end_time: Utc::now(),
            start_time_formatted: "07:00".into(),
            end_time_formatted: "09:00".into(),
        };
        let json = serde_json::to_value(&session).unwrap();
        assert!(json.get("startTimeFormatted").is_some());
        assert!(json.get("dayOfWeek").is_some());
    }
}
