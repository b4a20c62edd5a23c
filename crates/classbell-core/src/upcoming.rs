//! Selection of the next session to attend.

use chrono::{DateTime, Utc};

use crate::session::NormalizedSession;

/// The session with the earliest start strictly after `reference`.
///
/// A session that starts exactly at `reference`, or is already in progress,
/// is not upcoming. Ties keep the first one in input order. Single pass; the
/// input does not need to be sorted.
pub fn find_upcoming(sessions: &[NormalizedSession], reference: DateTime<Utc>) -> Option<&NormalizedSession> {
    let mut best: Option<&NormalizedSession> = None;
    for session in sessions {
        if session.start_time <= reference {
            continue;
        }
        match best {
            Some(current) if current.start_time <= session.start_time => {}
            _ => best = Some(session),
        }
    }
    best
}
