//! TOML-based application configuration.
//!
//! Stores:
//! - Institution time zone and display locale
//! - Timetable source endpoint
//! - Reminder lead time bounds and cap
//! - Reload staleness interval
//!
//! Configuration is stored at `~/.config/classbell/config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use url::Url;

use super::data_dir;
use crate::error::ConfigError;
use crate::reminders::ReminderPolicy;
use crate::time_codec::{Locale, TimeCodec};

pub const DEFAULT_ENDPOINT: &str = "https://scheduleapi-khaki.vercel.app/api/schedule";

/// Upper bound for any lead time setting: one day.
pub const LEAD_MINUTES_LIMIT: i64 = 24 * 60;

/// Upper bound for `reload.min_interval_minutes`: one week.
pub const RELOAD_INTERVAL_LIMIT: i64 = 7 * 24 * 60;

/// Timetable source configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Reminder configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemindersConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Lead time used until the user picks one; the chosen value lives in the
    /// database.
    #[serde(default = "default_lead_minutes")]
    pub lead_minutes: i64,
    #[serde(default = "default_min_lead_minutes")]
    pub min_lead_minutes: i64,
    #[serde(default = "default_max_lead_minutes")]
    pub max_lead_minutes: i64,
    #[serde(default = "default_lead_step_minutes")]
    pub lead_step_minutes: i64,
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadConfig {
    #[serde(default = "default_min_interval_minutes")]
    pub min_interval_minutes: i64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/classbell/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// IANA zone the institution's wall-clock times are written in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub locale: Locale,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub reminders: RemindersConfig,
    #[serde(default)]
    pub reload: ReloadConfig,
}

fn default_timezone() -> String {
    "Asia/Ho_Chi_Minh".into()
}
fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_lead_minutes() -> i64 {
    15
}
fn default_min_lead_minutes() -> i64 {
    5
}
fn default_max_lead_minutes() -> i64 {
    120
}
fn default_lead_step_minutes() -> i64 {
    5
}
fn default_max_pending() -> usize {
    64
}
fn default_min_interval_minutes() -> i64 {
    60
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lead_minutes: default_lead_minutes(),
            min_lead_minutes: default_min_lead_minutes(),
            max_lead_minutes: default_max_lead_minutes(),
            lead_step_minutes: default_lead_step_minutes(),
            max_pending: default_max_pending(),
        }
    }
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            min_interval_minutes: default_min_interval_minutes(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            locale: Locale::default(),
            source: SourceConfig::default(),
            reminders: RemindersConfig::default(),
            reload: ReloadConfig::default(),
        }
    }
}

/// Allowed lead times: `[min, max]` in multiples of `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeadBounds {
    pub min: i64,
    pub max: i64,
    pub step: i64,
}

impl LeadBounds {
    /// Round to the nearest step (halves up), then clamp into `[min, max]`.
    pub fn snap(&self, minutes: i64) -> i64 {
        let step = self.step.max(1);
        let bounded = minutes.max(self.min).min(self.max);
        let rounded = bounded
            .saturating_mul(2)
            .saturating_add(step)
            .div_euclid(step.saturating_mul(2))
            .saturating_mul(step);
        rounded.max(self.min).min(self.max)
    }
}

impl Config {
    fn get_json_value_by_path<'a>(root: &'a serde_json::Value, key: &str) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(root: &mut serde_json::Value, key: &str, value: &str) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = current.get_mut(part).ok_or_else(unknown)?;
                continue;
            }

            let obj = current.as_object_mut().ok_or_else(unknown)?;
            let new_value = match obj.get(part).ok_or_else(unknown)? {
                serde_json::Value::Bool(_) => {
                    serde_json::Value::Bool(value.parse::<bool>().map_err(|e| invalid(e.to_string()))?)
                }
                serde_json::Value::Number(_) => value
                    .parse::<i64>()
                    .map(|n| serde_json::Value::Number(n.into()))
                    .map_err(|_| invalid(format!("cannot parse '{value}' as integer")))?,
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => return Err(unknown()),
                _ => serde_json::Value::String(value.into()),
            };
            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(unknown())
    }

    /// Default location of the config file.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the data directory, writing defaults on first use.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed or fails
    /// validation, or if the default config cannot be written.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the data directory.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| failed(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| failed(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(_) => None,
            other => Some(other.to_string()),
        }
    }

    /// Every leaf key with its current value, in file order.
    pub fn entries(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
            match value {
                serde_json::Value::Object(map) => {
                    for (k, v) in map {
                        let key = if prefix.is_empty() { k.clone() } else { format!("{prefix}.{k}") };
                        walk(&key, v, out);
                    }
                }
                serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }

        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            walk("", &json, &mut out);
        }
        out
    }

    /// Set a value by dot-separated key. The change is validated but not
    /// saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the resulting config is invalid. `self` is unchanged on error.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        self.time_zone()?;
        self.endpoint()?;
        if self.source.timeout_secs == 0 {
            return Err(invalid("source.timeout_secs", "must be at least 1".into()));
        }
        let r = &self.reminders;
        if r.min_lead_minutes <= 0 {
            return Err(invalid("reminders.min_lead_minutes", "must be positive".into()));
        }
        if r.lead_step_minutes <= 0 {
            return Err(invalid("reminders.lead_step_minutes", "must be positive".into()));
        }
        if r.lead_step_minutes > LEAD_MINUTES_LIMIT {
            return Err(invalid(
                "reminders.lead_step_minutes",
                format!("must be at most {LEAD_MINUTES_LIMIT}"),
            ));
        }
        if r.max_lead_minutes < r.min_lead_minutes {
            return Err(invalid(
                "reminders.max_lead_minutes",
                format!("must not be below min_lead_minutes ({})", r.min_lead_minutes),
            ));
        }
        if r.max_lead_minutes > LEAD_MINUTES_LIMIT {
            return Err(invalid(
                "reminders.max_lead_minutes",
                format!("must be at most {LEAD_MINUTES_LIMIT}"),
            ));
        }
        if !(r.min_lead_minutes..=r.max_lead_minutes).contains(&r.lead_minutes) {
            return Err(invalid(
                "reminders.lead_minutes",
                format!("must be between {} and {}", r.min_lead_minutes, r.max_lead_minutes),
            ));
        }
        if !(0..=RELOAD_INTERVAL_LIMIT).contains(&self.reload.min_interval_minutes) {
            return Err(invalid(
                "reload.min_interval_minutes",
                format!("must be between 0 and {RELOAD_INTERVAL_LIMIT}"),
            ));
        }
        Ok(())
    }

    pub fn time_zone(&self) -> Result<Tz, ConfigError> {
        self.timezone.parse::<Tz>().map_err(|e| ConfigError::InvalidValue {
            key: "timezone".into(),
            message: e.to_string(),
        })
    }

    pub fn codec(&self) -> Result<TimeCodec, ConfigError> {
        Ok(TimeCodec::new(self.time_zone()?, self.locale))
    }

    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.source.endpoint).map_err(|e| ConfigError::InvalidValue {
            key: "source.endpoint".into(),
            message: e.to_string(),
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.source.timeout_secs)
    }

    pub fn lead_bounds(&self) -> LeadBounds {
        LeadBounds {
            min: self.reminders.min_lead_minutes,
            max: self.reminders.max_lead_minutes,
            step: self.reminders.lead_step_minutes,
        }
    }

    /// Reminder policy for the given (already snapped) lead time.
    pub fn reminder_policy(&self, lead_minutes: i64) -> ReminderPolicy {
        ReminderPolicy::new()
            .with_enabled(self.reminders.enabled)
            .with_lead_minutes(lead_minutes)
            .with_max_pending(self.reminders.max_pending)
    }
}
