//! In-memory registry of download tasks, shared between the background
//! workers that update it and the request handlers that poll it.
//!
//! Every access takes the lock for the whole read or write, so a reader sees
//! either the old or the new record, never a half-written one. Readers get
//! clones; nothing outside the registry holds a mutable task.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::progress::{ProgressEvent, UNKNOWN_FIELD};
use crate::url_model::normalize_source_url;

/// Task identifier: lowercase hex SHA-256 of the normalized source URL.
pub type TaskId = String;

/// Deterministic id for a submitted URL; resubmitting the same URL maps to the same task.
pub fn task_id_for(url: &str) -> TaskId {
    let digest = Sha256::digest(normalize_source_url(url).as_bytes());
    hex::encode(digest)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Downloading,
    Finished,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Error)
    }
}

/// Snapshot of one task as returned to pollers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadTask {
    pub id: TaskId,
    pub status: TaskStatus,
    /// Percentage in [0, 100].
    pub progress: f64,
    pub speed: String,
    pub eta: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadTask {
    /// Fresh `Pending, 0%` record.
    pub fn pending(id: impl Into<TaskId>) -> Self {
        Self {
            id: id.into(),
            status: TaskStatus::Pending,
            progress: 0.0,
            speed: UNKNOWN_FIELD.to_string(),
            eta: UNKNOWN_FIELD.to_string(),
            error: None,
        }
    }
}

/// Change applied to a task by the worker.
#[derive(Debug, Clone)]
pub enum TaskUpdate {
    Progress(ProgressEvent),
    Finished,
    Failed(String),
}

#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, DownloadTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or resets) the task in `Pending`. Last submission wins.
    pub fn create(&self, id: &str) -> DownloadTask {
        let task = DownloadTask::pending(id);
        self.tasks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string(), task.clone());
        task
    }

    /// Applies `update`. Progress on a task already in a terminal state is ignored.
    pub fn update(&self, id: &str, update: TaskUpdate) {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        let task = tasks
            .entry(id.to_string())
            .or_insert_with(|| DownloadTask::pending(id));
        match update {
            TaskUpdate::Progress(event) => {
                if task.status.is_terminal() {
                    return;
                }
                task.status = TaskStatus::Downloading;
                task.progress = event.percent();
                task.speed = event.speed_or_unknown().to_string();
                task.eta = event.eta_or_unknown().to_string();
            }
            TaskUpdate::Finished => {
                task.status = TaskStatus::Finished;
                task.progress = 100.0;
                task.speed = UNKNOWN_FIELD.to_string();
                task.eta = UNKNOWN_FIELD.to_string();
                task.error = None;
            }
            TaskUpdate::Failed(message) => {
                task.status = TaskStatus::Error;
                task.speed = UNKNOWN_FIELD.to_string();
                task.eta = UNKNOWN_FIELD.to_string();
                task.error = Some(message);
            }
        }
    }

    /// Snapshot of the task, or a `Pending, 0%` record if it was never created.
    pub fn get(&self, id: &str) -> DownloadTask {
        self.tasks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .unwrap_or_else(|| DownloadTask::pending(id))
    }

    pub fn len(&self) -> usize {
        self.tasks.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn task_id_is_deterministic_hex() {
        let a = task_id_for("https://example.com/watch?v=1");
        let b = task_id_for(" https://EXAMPLE.com/watch?v=1 ");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, task_id_for("https://example.com/watch?v=2"));
    }

    #[test]
    fn get_before_create_is_pending() {
        let reg = TaskRegistry::new();
        let task = reg.get("nope");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, 0.0);
        assert_eq!(task.speed, "--");
        assert!(reg.is_empty());
    }

    #[test]
    fn lifecycle_pending_downloading_finished() {
        let reg = TaskRegistry::new();
        reg.create("t");
        reg.update(
            "t",
            TaskUpdate::Progress(ProgressEvent {
                percent: Some("12.5%".into()),
                speed: Some("1.0MiB/s".into()),
                ..Default::default()
            }),
        );
        let mid = reg.get("t");
        assert_eq!(mid.status, TaskStatus::Downloading);
        assert_eq!(mid.progress, 12.5);
        assert_eq!(mid.speed, "1.0MiB/s");
        assert_eq!(mid.eta, "--");

        reg.update("t", TaskUpdate::Finished);
        let done = reg.get("t");
        assert_eq!(done.status, TaskStatus::Finished);
        assert_eq!(done.progress, 100.0);
    }

    #[test]
    fn terminal_state_ignores_late_progress_until_recreated() {
        let reg = TaskRegistry::new();
        reg.create("t");
        reg.update("t", TaskUpdate::Failed("boom".into()));
        reg.update("t", TaskUpdate::Progress(ProgressEvent::reported("50%")));
        let task = reg.get("t");
        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.error.as_deref(), Some("boom"));

        reg.create("t");
        assert_eq!(reg.get("t"), DownloadTask::pending("t"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn serializes_lowercase_status_and_skips_empty_error() {
        let json = serde_json::to_value(DownloadTask::pending("abc")).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["progress"], 0.0);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn concurrent_readers_see_whole_snapshots() {
        let reg = Arc::new(TaskRegistry::new());
        reg.create("t");
        let writer = {
            let reg = Arc::clone(&reg);
            std::thread::spawn(move || {
                for i in 0..=100 {
                    let ev = ProgressEvent {
                        percent: Some(format!("{i}%")),
                        speed: Some(format!("{i}B/s")),
                        ..Default::default()
                    };
                    reg.update("t", TaskUpdate::Progress(ev));
                }
            })
        };
        for _ in 0..200 {
            let task = reg.get("t");
            if task.status == TaskStatus::Downloading {
                assert_eq!(task.speed, format!("{}B/s", task.progress as u32));
            }
        }
        writer.join().unwrap();
        assert_eq!(reg.get("t").progress, 100.0);
    }
}
