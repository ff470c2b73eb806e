//! Append-only JSONL activity log, one file per run.
//!
//! Credentials and tokens are never written here.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct ActivityLog {
    pub path: Option<PathBuf>,
    run_id: String,
    file: RefCell<Option<File>>,
}

#[derive(Serialize)]
struct Event<'a> {
    ts: DateTime<Utc>,
    run_id: &'a str,
    #[serde(rename = "type")]
    event_type: &'a str,
    #[serde(flatten)]
    data: serde_json::Value,
}

impl ActivityLog {
    pub fn new(path: &Path, run_id: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open activity log {}", path.display()))?;

        Ok(Self {
            path: Some(path.to_path_buf()),
            run_id: run_id.to_string(),
            file: RefCell::new(Some(file)),
        })
    }

    /// A log that drops every event.
    pub fn disabled() -> Self {
        Self {
            path: None,
            run_id: String::new(),
            file: RefCell::new(None),
        }
    }

    pub fn log(&self, event_type: &str, data: serde_json::Value) -> Result<()> {
        let mut guard = self.file.borrow_mut();
        let Some(file) = guard.as_mut() else {
            return Ok(());
        };
        let event = Event {
            ts: Utc::now(),
            run_id: &self.run_id,
            event_type,
            data,
        };
        let line = serde_json::to_string(&event)?;
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }

    pub fn request(&self, method: &str, path: &str, status: u16, duration_ms: u64) -> Result<()> {
        self.log(
            "request",
            json!({
                "method": method,
                "path": path,
                "status": status,
                "duration_ms": duration_ms,
            }),
        )
    }

    pub fn request_failed(&self, method: &str, path: &str, error: &str) -> Result<()> {
        self.log(
            "request_failed",
            json!({ "method": method, "path": path, "error": error }),
        )
    }

    pub fn session(&self, event: &str) -> Result<()> {
        self.log(event, json!({}))
    }

    /// Log an auth outcome. Only the email is recorded.
    pub fn auth(&self, action: &str, email: &str, error: Option<&str>) -> Result<()> {
        match error {
            None => self.log("auth_ok", json!({ "action": action, "email": email })),
            Some(err) => self.log(
                "auth_error",
                json!({ "action": action, "email": email, "error": err }),
            ),
        }
    }

    pub fn mutation(&self, action: &str, id: Option<&str>, ok: bool) -> Result<()> {
        self.log(
            "mutation",
            json!({ "action": action, "id": id, "ok": ok }),
        )
    }
}
