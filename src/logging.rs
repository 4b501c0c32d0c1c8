//! Operational log: structured entries kept in a bounded ring buffer,
//! optionally persisted as JSONL and always mirrored to `tracing`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

const MAX_LOG_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl LogEntry {
    pub fn new(level: LogLevel, component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            component: component.into(),
            request_id: None,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, ctx: serde_json::Value) -> Self {
        self.context = Some(ctx);
        self
    }

    fn emit_tracing(&self) {
        let request_id = self.request_id.as_deref().unwrap_or("-");
        let context = self
            .context
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        match self.level {
            LogLevel::Debug => {
                tracing::debug!(component = %self.component, request_id, %context, "{}", self.message);
            }
            LogLevel::Info => {
                tracing::info!(component = %self.component, request_id, %context, "{}", self.message);
            }
            LogLevel::Warn => {
                tracing::warn!(component = %self.component, request_id, %context, "{}", self.message);
            }
            LogLevel::Error => {
                tracing::error!(component = %self.component, request_id, %context, "{}", self.message);
            }
        }
    }
}

/// Ring-buffer logger, persisted to JSONL when a file is configured.
/// The buffer backs `recent` and `for_request`, which tests use to inspect a
/// running relay.
pub struct Logger {
    entries: VecDeque<LogEntry>,
    writer: Option<BufWriter<File>>,
}

impl Logger {
    pub fn in_memory() -> Self {
        Self {
            entries: VecDeque::new(),
            writer: None,
        }
    }

    /// Open (or create) a JSONL log file in append mode. The buffer only holds
    /// entries from this process.
    pub fn new(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file_path = file_path.as_ref();

        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;

        Ok(Self {
            entries: VecDeque::new(),
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn log(&mut self, entry: LogEntry) {
        if let Some(ref mut writer) = self.writer {
            if let Ok(json) = serde_json::to_string(&entry) {
                let _ = writeln!(writer, "{}", json);
                let _ = writer.flush();
            }
        }
        if self.entries.len() >= MAX_LOG_ENTRIES {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }
}

#[derive(Clone)]
pub struct SharedLogger(Arc<Mutex<Logger>>);

impl SharedLogger {
    pub fn new(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self(Arc::new(Mutex::new(Logger::new(file_path)?))))
    }

    pub fn in_memory() -> Self {
        Self(Arc::new(Mutex::new(Logger::in_memory())))
    }

    pub fn log(&self, entry: LogEntry) {
        entry.emit_tracing();
        if let Ok(mut logger) = self.0.lock() {
            logger.log(entry);
        }
    }

    pub fn info(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Info, component, message));
    }

    pub fn error(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Error, component, message));
    }

    /// Log a line tied to one inbound request.
    pub fn request(
        &self,
        level: LogLevel,
        component: impl Into<String>,
        request_id: &str,
        message: impl Into<String>,
    ) {
        self.log(LogEntry::new(level, component, message).with_request_id(request_id));
    }

    pub fn request_with_context(
        &self,
        level: LogLevel,
        component: impl Into<String>,
        request_id: &str,
        message: impl Into<String>,
        context: serde_json::Value,
    ) {
        self.log(
            LogEntry::new(level, component, message)
                .with_request_id(request_id)
                .with_context(context),
        );
    }

    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.0.lock().map(|l| l.recent(limit)).unwrap_or_default()
    }

    /// All buffered entries for one request, oldest first.
    pub fn for_request(&self, request_id: &str) -> Vec<LogEntry> {
        self.0
            .lock()
            .map(|l| {
                l.entries
                    .iter()
                    .filter(|e| e.request_id.as_deref() == Some(request_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
