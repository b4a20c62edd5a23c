//! Date and time parsing/formatting shared by every stage of the engine.
//!
//! All instants are stored as `DateTime<Utc>` and compared as such. The
//! institution time zone is only used to resolve wall-clock timetable values
//! into instants and to render them back for display; the locale only affects
//! display strings.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Format of the date key sessions are grouped by (`10-03-2025`).
pub const DATE_KEY_FORMAT: &str = "%d-%m-%Y";

/// Display format for times of day.
pub const TIME_FORMAT: &str = "%H:%M";

/// Date layouts accepted from timetable payloads, tried in order.
const INPUT_DATE_FORMATS: [&str; 3] = [DATE_KEY_FORMAT, "%d/%m/%Y", "%Y-%m-%d"];

const INPUT_TIME_FORMATS: [&str; 2] = ["%H:%M", "%H:%M:%S"];

const TITLE_DATE_FORMAT: &str = "%d/%m/%Y";

/// Display language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Vi,
    En,
}

impl Locale {
    pub fn code(self) -> &'static str {
        match self {
            Self::Vi => "vi",
            Self::En => "en",
        }
    }

    pub fn weekday_name(self, weekday: Weekday) -> &'static str {
        match self {
            Self::Vi => match weekday {
                Weekday::Mon => "Thứ Hai",
                Weekday::Tue => "Thứ Ba",
                Weekday::Wed => "Thứ Tư",
                Weekday::Thu => "Thứ Năm",
                Weekday::Fri => "Thứ Sáu",
                Weekday::Sat => "Thứ Bảy",
                Weekday::Sun => "Chủ Nhật",
            },
            Self::En => match weekday {
                Weekday::Mon => "Monday",
                Weekday::Tue => "Tuesday",
                Weekday::Wed => "Wednesday",
                Weekday::Thu => "Thursday",
                Weekday::Fri => "Friday",
                Weekday::Sat => "Saturday",
                Weekday::Sun => "Sunday",
            },
        }
    }

    /// Placeholder rendered for absent display fields.
    pub fn not_available(self) -> &'static str {
        match self {
            Self::Vi => "Chưa có",
            Self::En => "N/A",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vi" | "vi-vn" => Ok(Self::Vi),
            "en" | "en-us" | "en-gb" => Ok(Self::En),
            other => Err(format!("unsupported locale: {other}")),
        }
    }
}

/// Stateless codec bound to a time zone and a display locale.
#[derive(Debug, Clone, Copy)]
pub struct TimeCodec {
    tz: Tz,
    locale: Locale,
}

impl Default for TimeCodec {
    fn default() -> Self {
        Self::new(chrono_tz::Asia::Ho_Chi_Minh, Locale::Vi)
    }
}

impl TimeCodec {
    pub fn new(tz: Tz, locale: Locale) -> Self {
        Self { tz, locale }
    }

    pub fn time_zone(&self) -> Tz {
        self.tz
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Parse a calendar date with an explicit chrono format.
    ///
    /// Returns `None` instead of failing; callers check before use.
    pub fn parse_date(&self, text: &str, format: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(text.trim(), format).ok()
    }

    /// Parse a date in any of the layouts timetable payloads use.
    pub fn parse_any_date(&self, text: &str) -> Option<NaiveDate> {
        INPUT_DATE_FORMATS
            .iter()
            .find_map(|format| self.parse_date(text, format))
    }

    /// Parse a wall-clock time of day (`07:00` or `07:00:00`).
    pub fn parse_time(&self, text: &str) -> Option<NaiveTime> {
        let text = text.trim();
        INPUT_TIME_FORMATS
            .iter()
            .find_map(|format| NaiveTime::parse_from_str(text, format).ok())
    }

    /// Parse an RFC 3339 instant (`2025-03-10T07:00:00+07:00`).
    pub fn parse_instant(&self, text: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(text.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Build an absolute instant from separate date and time-of-day strings,
    /// interpreted in the institution time zone.
    pub fn combine_date_and_time(&self, date_text: &str, time_text: &str) -> Option<DateTime<Utc>> {
        let date = self.parse_any_date(date_text)?;
        let time = self.parse_time(time_text)?;
        self.resolve_local(date.and_time(time))
    }

    /// Resolve a local wall-clock value. A repeated hour resolves to its
    /// earlier occurrence; a skipped hour does not resolve.
    pub fn resolve_local(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self.tz.from_local_datetime(&naive) {
            LocalResult::Single(t) => Some(t.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
            LocalResult::None => None,
        }
    }

    /// Calendar date of an instant in the institution time zone.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }

    /// Localized weekday name of an instant.
    pub fn format_weekday(&self, instant: DateTime<Utc>) -> String {
        self.weekday_label(self.local_date(instant))
    }

    pub fn weekday_label(&self, date: NaiveDate) -> String {
        self.locale.weekday_name(date.weekday()).to_string()
    }

    pub fn format_time(&self, instant: DateTime<Utc>) -> String {
        instant.with_timezone(&self.tz).format(TIME_FORMAT).to_string()
    }

    pub fn format_date_key(&self, instant: DateTime<Utc>) -> String {
        date_key(self.local_date(instant))
    }

    /// Section heading for a date key, e.g. `Thứ Hai, 10/03/2025`.
    ///
    /// Falls back to the raw key when it does not parse.
    pub fn section_title(&self, key: &str) -> String {
        match self.parse_date(key, DATE_KEY_FORMAT) {
            Some(date) => format!(
                "{}, {}",
                self.weekday_label(date),
                date.format(TITLE_DATE_FORMAT)
            ),
            None => key.to_string(),
        }
    }
}

/// Render a calendar date as a grouping key.
pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}
