//! File-backed reminder queue.
//!
//! Stands in for a platform notification scheduler on hosts that have none
//! (the CLI). Reminders are kept by identifier and written to a JSON file on
//! every change; `due` hands back and removes the ones whose trigger passed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{NotificationService, ReminderPayload, ScheduledReminder};
use crate::error::NotifyError;
use crate::storage::data_dir;

const QUEUE_FILE: &str = "reminders.json";

/// A reminder waiting in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedReminder {
    pub identifier: String,
    pub handle: String,
    pub trigger_instant: DateTime<Utc>,
    pub payload: ReminderPayload,
}

pub struct ReminderQueue {
    entries: Mutex<BTreeMap<String, QueuedReminder>>,
    /// `None` keeps the queue in memory only.
    queue_file: Option<PathBuf>,
}

impl ReminderQueue {
    /// Open the queue in the data directory.
    pub fn open() -> Result<Self, NotifyError> {
        let dir = data_dir().map_err(|e| NotifyError::Storage(e.to_string()))?;
        Self::new_with_path(dir.join(QUEUE_FILE))
    }

    /// Open (or create on first write) a queue at `path`.
    pub fn new_with_path(path: impl Into<PathBuf>) -> Result<Self, NotifyError> {
        let path = path.into();
        let entries = load(&path)?;
        debug!(path = %path.display(), pending = entries.len(), "opened reminder queue");
        Ok(Self {
            entries: Mutex::new(entries),
            queue_file: Some(path),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            queue_file: None,
        }
    }

    /// Everything queued, nearest trigger first.
    pub fn pending(&self) -> Result<Vec<QueuedReminder>, NotifyError> {
        let mut all: Vec<_> = self.lock()?.values().cloned().collect();
        all.sort_by_key(|r| r.trigger_instant);
        Ok(all)
    }

    /// Remove and return reminders whose trigger is at or before `now`.
    pub fn due(&self, now: DateTime<Utc>) -> Result<Vec<QueuedReminder>, NotifyError> {
        let mut entries = self.lock()?;
        let due_ids: Vec<String> = entries
            .values()
            .filter(|r| r.trigger_instant <= now)
            .map(|r| r.identifier.clone())
            .collect();
        if due_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut remaining = entries.clone();
        let mut fired: Vec<_> = due_ids.iter().filter_map(|id| remaining.remove(id)).collect();
        fired.sort_by_key(|r| r.trigger_instant);
        self.commit(&mut entries, remaining)?;
        Ok(fired)
    }

    /// Write `updated` to disk, then make it the in-memory state. On a failed
    /// write memory keeps matching the file.
    fn commit(
        &self,
        entries: &mut MutexGuard<'_, BTreeMap<String, QueuedReminder>>,
        updated: BTreeMap<String, QueuedReminder>,
    ) -> Result<(), NotifyError> {
        self.persist(&updated)?;
        **entries = updated;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, QueuedReminder>>, NotifyError> {
        self.entries
            .lock()
            .map_err(|_| NotifyError::Storage("reminder queue lock poisoned".into()))
    }

    fn persist(&self, entries: &BTreeMap<String, QueuedReminder>) -> Result<(), NotifyError> {
        let Some(path) = &self.queue_file else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| NotifyError::Storage(e.to_string()))?;
        }
        let data = serde_json::to_string_pretty(entries).map_err(|e| NotifyError::Storage(e.to_string()))?;
        std::fs::write(path, data).map_err(|e| NotifyError::Storage(format!("{}: {e}", path.display())))
    }
}

fn load(path: &Path) -> Result<BTreeMap<String, QueuedReminder>, NotifyError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let content =
        std::fs::read_to_string(path).map_err(|e| NotifyError::Storage(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&content).map_err(|e| NotifyError::Storage(format!("{}: {e}", path.display())))
}

#[async_trait]
impl NotificationService for ReminderQueue {
    async fn schedule(
        &self,
        identifier: &str,
        trigger: DateTime<Utc>,
        payload: &ReminderPayload,
    ) -> Result<String, NotifyError> {
        let mut entries = self.lock()?;
        let handle = uuid::Uuid::new_v4().to_string();
        let mut updated = entries.clone();
        updated.insert(
            identifier.to_string(),
            QueuedReminder {
                identifier: identifier.to_string(),
                handle: handle.clone(),
                trigger_instant: trigger,
                payload: payload.clone(),
            },
        );
        self.commit(&mut entries, updated)?;
        Ok(handle)
    }

    async fn cancel(&self, identifier: &str) -> Result<(), NotifyError> {
        let mut entries = self.lock()?;
        if entries.contains_key(identifier) {
            let mut updated = entries.clone();
            updated.remove(identifier);
            self.commit(&mut entries, updated)?;
        }
        Ok(())
    }

    async fn list_scheduled(&self) -> Result<Vec<ScheduledReminder>, NotifyError> {
        Ok(self
            .lock()?
            .values()
            .map(|r| ScheduledReminder {
                identifier: r.identifier.clone(),
                trigger_instant: r.trigger_instant,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn payload(id: &str) -> ReminderPayload {
        ReminderPayload {
            session_id: id.to_string(),
            title: format!("{id} starts soon"),
            body: String::new(),
        }
    }

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn schedule_replaces_same_identifier() {
        let queue = ReminderQueue::in_memory();
        let first = queue.schedule("class-reminder:a", t(1), &payload("a")).await.unwrap();
        let second = queue.schedule("class-reminder:a", t(2), &payload("a")).await.unwrap();
        assert_ne!(first, second);

        let listed = queue.list_scheduled().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].trigger_instant, t(2));
    }

    #[tokio::test]
    async fn cancel_unknown_identifier_is_ok() {
        let queue = ReminderQueue::in_memory();
        queue.cancel("class-reminder:missing").await.unwrap();
        assert!(queue.pending().unwrap().is_empty());
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("reminders.json");

        let queue = ReminderQueue::new_with_path(&path).unwrap();
        queue.schedule("class-reminder:a", t(3), &payload("a")).await.unwrap();
        queue.schedule("class-reminder:b", t(1), &payload("b")).await.unwrap();
        queue.cancel("class-reminder:a").await.unwrap();
        drop(queue);

        let reopened = ReminderQueue::new_with_path(&path).unwrap();
        let pending = reopened.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].identifier, "class-reminder:b");
        assert_eq!(pending[0].payload.title, "b starts soon");
    }

    #[tokio::test]
    async fn due_drains_only_passed_triggers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reminders.json");
        let queue = ReminderQueue::new_with_path(&path).unwrap();
        queue.schedule("class-reminder:late", t(9), &payload("late")).await.unwrap();
        queue.schedule("class-reminder:b", t(2), &payload("b")).await.unwrap();
        queue.schedule("class-reminder:a", t(1), &payload("a")).await.unwrap();

        let fired = queue.due(t(2)).unwrap();
        let ids: Vec<_> = fired.iter().map(|r| r.payload.session_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(queue.due(t(2) + Duration::minutes(1)).unwrap().is_empty());

        let reopened = ReminderQueue::new_with_path(&path).unwrap();
        assert_eq!(reopened.pending().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_matching_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reminders.json");
        let queue = ReminderQueue::new_with_path(&path).unwrap();
        queue.schedule("class-reminder:a", t(1), &payload("a")).await.unwrap();

        // A directory in place of the file makes every write fail.
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(matches!(
            queue.schedule("class-reminder:b", t(2), &payload("b")).await,
            Err(NotifyError::Storage(_))
        ));
        assert!(matches!(queue.due(t(5)), Err(NotifyError::Storage(_))));
        assert!(matches!(queue.cancel("class-reminder:a").await, Err(NotifyError::Storage(_))));

        let pending = queue.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].identifier, "class-reminder:a");
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reminders.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(ReminderQueue::new_with_path(&path), Err(NotifyError::Storage(_))));
    }
}
