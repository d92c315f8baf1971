use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// Notifications kept in memory; older ones are dropped first.
pub const MAX_ENTRIES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub at: DateTime<Local>,
}

/// Sink for messages the user should see.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NotificationLevel, message: &str);

    fn error(&self, message: &str) {
        self.notify(NotificationLevel::Error, message);
    }

    fn info(&self, message: &str) {
        self.notify(NotificationLevel::Info, message);
    }
}

/// Keeps the most recent notifications in memory and optionally appends
/// every one of them to a log file.
#[derive(Default)]
pub struct NotificationLog {
    entries: Mutex<VecDeque<Notification>>,
    file: Option<PathBuf>,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(MAX_ENTRIES)),
            file: Some(path.into()),
        }
    }

    pub fn entries(&self) -> Vec<Notification> {
        self.entries
            .lock()
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|n| n.level == NotificationLevel::Error)
            .map(|n| n.message)
            .collect()
    }

    fn append_to_file(&self, notification: &Notification) {
        let Some(path) = &self.file else {
            return;
        };
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(
                file,
                "{} - {:?} - {}",
                notification.at.to_rfc3339(),
                notification.level,
                notification.message
            );
        }
    }
}

impl Notifier for NotificationLog {
    fn notify(&self, level: NotificationLevel, message: &str) {
        match level {
            NotificationLevel::Error => tracing::error!("{message}"),
            NotificationLevel::Info => tracing::info!("{message}"),
        }
        let notification = Notification {
            level,
            message: message.to_owned(),
            at: Local::now(),
        };
        self.append_to_file(&notification);
        if let Ok(mut entries) = self.entries.lock() {
            if entries.len() >= MAX_ENTRIES {
                entries.pop_front();
            }
            entries.push_back(notification);
        }
    }
}
