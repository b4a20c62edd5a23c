//! Chronological, date-sectioned view of the remaining sessions.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::session::{NormalizedSession, ScheduleSection};
use crate::time_codec::{TimeCodec, DATE_KEY_FORMAT};

/// Builds display sections from normalized sessions.
#[derive(Debug, Clone, Default)]
pub struct ScheduleGrouper {
    codec: TimeCodec,
}

impl ScheduleGrouper {
    pub fn new(codec: TimeCodec) -> Self {
        Self { codec }
    }

    /// Drop sessions starting before `reference`, then section the rest by
    /// date key.
    ///
    /// Sections are ordered by the calendar date their key denotes; keys that
    /// do not parse go last in first-seen order. Sessions inside a section are
    /// ordered by start time, ties in input order.
    pub fn group(&self, sessions: &[NormalizedSession], reference: DateTime<Utc>) -> Vec<ScheduleSection> {
        let mut sections: Vec<ScheduleSection> = Vec::new();
        let mut by_key: HashMap<&str, usize> = HashMap::new();

        for session in sessions.iter().filter(|s| s.start_time >= reference) {
            let idx = *by_key.entry(session.date.as_str()).or_insert_with(|| {
                sections.push(ScheduleSection {
                    title: self.codec.section_title(&session.date),
                    date_sort_key: session.date.clone(),
                    sessions: Vec::new(),
                });
                sections.len() - 1
            });
            sections[idx].sessions.push(session.clone());
        }

        sections.sort_by_cached_key(|section| section_order(&self.codec, &section.date_sort_key));
        for section in &mut sections {
            section.sessions.sort_by_key(|s| s.start_time);
        }
        sections
    }
}

/// Parsable dates first, ascending; unparsable keys compare equal after them.
fn section_order(codec: &TimeCodec, key: &str) -> (bool, Option<NaiveDate>) {
    let date = codec.parse_date(key, DATE_KEY_FORMAT);
    (date.is_none(), date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    use crate::normalizer::SessionNormalizer;

    fn raw_session(id: &str, date: &str, start: DateTime<Utc>) -> NormalizedSession {
        NormalizedSession {
            id: id.to_string(),
            subject_name: Some(id.to_string()),
            teacher_name: None,
            room_name: None,
            date: date.to_string(),
            day_of_week: String::new(),
            start_time: start,
            end_time: start + Duration::hours(1),
            start_time_formatted: String::new(),
            end_time_formatted: String::new(),
        }
    }

    fn local(date: &str, time: &str) -> DateTime<Utc> {
        TimeCodec::default().combine_date_and_time(date, time).unwrap()
    }

    fn sample() -> Vec<NormalizedSession> {
        SessionNormalizer::default()
            .normalize(&serde_json::json!([
                {"subject": "Math", "date": "10-03-2025", "start": "07:00", "end": "09:00"},
                {"subject": "Art", "date": "10-03-2025", "start": "13:00", "end": "15:00"},
            ]))
            .sessions
    }

    #[test]
    fn single_day_keeps_chronological_order() {
        let sections = ScheduleGrouper::default().group(&sample(), local("10-03-2025", "06:00"));
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].date_sort_key, "10-03-2025");
        assert_eq!(sections[0].title, "Thứ Hai, 10/03/2025");
        let subjects: Vec<_> = sections[0].sessions.iter().map(|s| s.subject_name.as_deref().unwrap()).collect();
        assert_eq!(subjects, vec!["Math", "Art"]);
    }

    #[test]
    fn in_progress_session_is_dropped() {
        let sections = ScheduleGrouper::default().group(&sample(), local("10-03-2025", "08:00"));
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].sessions.len(), 1);
        assert_eq!(sections[0].sessions[0].subject_name.as_deref(), Some("Art"));
    }

    #[test]
    fn session_starting_at_reference_is_kept() {
        let sections = ScheduleGrouper::default().group(&sample(), local("10-03-2025", "07:00"));
        assert_eq!(sections[0].sessions.len(), 2);
    }

    #[test]
    fn everything_past_yields_no_sections() {
        assert!(ScheduleGrouper::default()
            .group(&sample(), local("11-03-2025", "00:00"))
            .is_empty());
    }

    #[test]
    fn sections_sort_by_calendar_date_not_string() {
        // "02-04-2025" < "15-03-2025" as strings, but April comes later.
        let sessions = vec![
            raw_session("apr", "02-04-2025", local("02-04-2025", "07:00")),
            raw_session("mar", "15-03-2025", local("15-03-2025", "07:00")),
            raw_session("jan26", "01-01-2026", local("01-01-2026", "07:00")),
        ];
        let keys: Vec<_> = ScheduleGrouper::default()
            .group(&sessions, local("01-03-2025", "00:00"))
            .into_iter()
            .map(|s| s.date_sort_key)
            .collect();
        assert_eq!(keys, vec!["15-03-2025", "02-04-2025", "01-01-2026"]);
    }

    #[test]
    fn unparsable_keys_go_last_in_first_seen_order() {
        let t = local("10-03-2025", "07:00");
        let sessions = vec![
            raw_session("x", "someday", t),
            raw_session("a", "11-03-2025", t),
            raw_session("y", "later", t),
            raw_session("b", "10-03-2025", t),
        ];
        let sections = ScheduleGrouper::default().group(&sessions, local("01-03-2025", "00:00"));
        let keys: Vec<_> = sections.iter().map(|s| s.date_sort_key.as_str()).collect();
        assert_eq!(keys, vec!["10-03-2025", "11-03-2025", "someday", "later"]);
        assert_eq!(sections[2].title, "someday");
    }

    #[test]
    fn equal_start_times_keep_input_order() {
        let t = local("10-03-2025", "07:00");
        let sessions = vec![
            raw_session("late", "10-03-2025", t + Duration::hours(2)),
            raw_session("first", "10-03-2025", t),
            raw_session("second", "10-03-2025", t),
        ];
        let ids: Vec<_> = ScheduleGrouper::default()
            .group(&sessions, t - Duration::hours(1))
            .remove(0)
            .sessions
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["first", "second", "late"]);
    }

    #[test]
    fn grouping_is_deterministic() {
        let grouper = ScheduleGrouper::default();
        let reference = local("10-03-2025", "06:00");
        assert_eq!(grouper.group(&sample(), reference), grouper.group(&sample(), reference));
    }

    proptest! {
        #[test]
        fn sections_ascend_and_sessions_do_not_decrease(
            entries in prop::collection::vec((0i64..20, 0i64..(24 * 60)), 0..40),
            now_offset in 0i64..(20 * 24 * 60),
        ) {
            let base = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
            let codec = TimeCodec::default();
            let sessions: Vec<_> = entries
                .iter()
                .enumerate()
                .map(|(i, (day, minute))| {
                    let start = base + Duration::days(*day) + Duration::minutes(*minute);
                    raw_session(&format!("s{i}"), &codec.format_date_key(start), start)
                })
                .collect();
            let reference = base + Duration::minutes(now_offset);

            let sections = ScheduleGrouper::new(codec).group(&sessions, reference);

            let dates: Vec<_> = sections
                .iter()
                .map(|s| codec.parse_date(&s.date_sort_key, DATE_KEY_FORMAT).unwrap())
                .collect();
            prop_assert!(dates.windows(2).all(|w| w[0] < w[1]));
            for section in &sections {
                prop_assert!(!section.sessions.is_empty());
                prop_assert!(section.sessions.windows(2).all(|w| w[0].start_time <= w[1].start_time));
                prop_assert!(section.sessions.iter().all(|s| s.start_time >= reference && s.date == section.date_sort_key));
            }
            let retained: usize = sections.iter().map(|s| s.sessions.len()).sum();
            prop_assert_eq!(retained, sessions.iter().filter(|s| s.start_time >= reference).count());
        }
    }
}
