//! Session token storage and the session service built on it.
//!
//! The token lives in a small key-value JSON file under a fixed key. Absence
//! of the key means logged out. `Session` is the only writer; everything else
//! reads through it and reacts to its events.

use crate::activity::ActivityLog;
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};

pub const DEFAULT_TOKEN_KEY: &str = "token";

/// Persistent home of the session token.
pub trait TokenStore {
    fn get(&self) -> Result<Option<String>>;
    fn set(&mut self, token: &str) -> Result<()>;
    fn remove(&mut self) -> Result<()>;
}

/// Key-value JSON file, shared with any other entries already in it.
pub struct FileTokenStore {
    path: PathBuf,
    key: String,
}

impl FileTokenStore {
    pub fn new(path: &Path, key: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            key: key.to_string(),
        }
    }

    fn read_map(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&content)
            .with_context(|| format!("Corrupt storage file {}", self.path.display()))?
        {
            Value::Object(map) => Ok(map),
            _ => Err(anyhow::anyhow!(
                "Storage file {} is not a JSON object",
                self.path.display()
            )),
        }
    }

    fn write_map(&self, map: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(map)?)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Result<Option<String>> {
        let map = self.read_map()?;
        Ok(map
            .get(&self.key)
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    fn set(&mut self, token: &str) -> Result<()> {
        let mut map = self.read_map().unwrap_or_default();
        map.insert(self.key.clone(), Value::String(token.to_string()));
        self.write_map(&map)
    }

    fn remove(&mut self) -> Result<()> {
        match self.read_map() {
            Ok(mut map) => {
                if map.remove(&self.key).is_some() {
                    self.write_map(&map)?;
                }
            }
            // Unreadable storage holds no usable token; start over
            Err(_) => self.write_map(&Map::new())?,
        }
        Ok(())
    }
}

/// In-process store, used when persistence is not wanted.
#[derive(Debug, Default, Clone)]
pub struct MemoryTokenStore {
    token: Option<String>,
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Result<Option<String>> {
        Ok(self.token.clone())
    }

    fn set(&mut self, token: &str) -> Result<()> {
        self.token = Some(token.to_string());
        Ok(())
    }

    fn remove(&mut self) -> Result<()> {
        self.token = None;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    LoggedOut,
    /// The server rejected the token; it has been removed.
    Expired,
}

pub struct Session {
    store: RefCell<Box<dyn TokenStore>>,
    subscribers: RefCell<Vec<Sender<SessionEvent>>>,
    log: Rc<ActivityLog>,
}

impl Session {
    pub fn new(store: Box<dyn TokenStore>, log: Rc<ActivityLog>) -> Self {
        Self {
            store: RefCell::new(store),
            subscribers: RefCell::new(Vec::new()),
            log,
        }
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::new(
            Box::new(MemoryTokenStore::default()),
            Rc::new(ActivityLog::disabled()),
        )
    }

    /// Current token. Unreadable storage reads as logged out.
    pub fn token(&self) -> Option<String> {
        match self.store.borrow().get() {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                let _ = self
                    .log
                    .log("storage_error", serde_json::json!({ "error": e.to_string() }));
                None
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    /// Replace any stored token with `token`.
    pub fn store(&self, token: &str) -> Result<()> {
        self.store.borrow_mut().set(token)?;
        let _ = self.log.session("session_stored");
        self.emit(SessionEvent::LoggedIn);
        Ok(())
    }

    /// Explicit logout.
    pub fn clear(&self) -> Result<()> {
        self.store.borrow_mut().remove()?;
        let _ = self.log.session("session_cleared");
        self.emit(SessionEvent::LoggedOut);
        Ok(())
    }

    /// Drop the token after the server rejected it. Never fails: a token
    /// that cannot be removed is still treated as expired by subscribers.
    pub fn expire(&self) {
        if let Err(e) = self.store.borrow_mut().remove() {
            let _ = self.log.log(
                "storage_error",
                serde_json::json!({ "error": e.to_string() }),
            );
        }
        let _ = self.log.session("session_expired");
        self.emit(SessionEvent::Expired);
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.borrow_mut().push(tx);
        rx
    }

    fn emit(&self, event: SessionEvent) {
        // Dropped receivers unsubscribe themselves
        self.subscribers
            .borrow_mut()
            .retain(|tx| tx.send(event).is_ok());
    }
}
