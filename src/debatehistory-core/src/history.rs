//! Session history persistence.
//!
//! Sessions are kept as a most-recently-used list under a single key of a
//! key-value store. Storage failures are logged and swallowed: the in-memory
//! list is always the source of truth.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DebateError;
use crate::participant::HistoricalFigure;
use crate::settings::{AgeGroup, DebateSettings, UserVoice};
use crate::transcript::Transcript;

/// Key the history document lives under.
pub const HISTORY_KEY: &str = "debate_history";

/// Default number of sessions kept.
pub const DEFAULT_MAX_RECORDS: usize = 20;

const HISTORY_VERSION: u32 = 1;

/// Minimal persistence seam.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, DebateError>;
    fn set(&self, key: &str, value: &str) -> Result<(), DebateError>;
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, DebateError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DebateError::Storage(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), DebateError> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            DebateError::Storage(format!(
                "Failed to create directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        // Write then rename so a crash never leaves a half-written document.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|e| {
                DebateError::Storage(format!("Failed to write {}: {}", path.display(), e))
            })
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, DebateError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| DebateError::Storage("memory store poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), DebateError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| DebateError::Storage("memory store poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A saved session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub topic: String,
    pub age_group: AgeGroup,
    pub participants: Vec<HistoricalFigure>,
    #[serde(default)]
    pub user_gender: UserVoice,
    #[serde(default)]
    pub messages: Transcript,
    /// Last update, milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl SessionRecord {
    pub fn new(id: impl Into<String>, settings: &DebateSettings, transcript: &Transcript) -> Self {
        Self {
            id: id.into(),
            topic: settings.topic.clone(),
            age_group: settings.age_group,
            participants: settings.participants.clone(),
            user_gender: settings.user_voice,
            messages: transcript.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Settings as they were saved.
    pub fn settings(&self) -> DebateSettings {
        DebateSettings {
            topic: self.topic.clone(),
            age_group: self.age_group,
            participants: self.participants.clone(),
            user_voice: self.user_gender,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct HistoryDocument {
    version: u32,
    records: Vec<SessionRecord>,
}

/// Bounded, most-recently-used list of saved sessions.
pub struct SessionHistory {
    store: Box<dyn KeyValueStore>,
    records: Vec<SessionRecord>,
    max_records: usize,
}

impl SessionHistory {
    /// Load history from the store. Unreadable history starts empty.
    pub fn open(store: Box<dyn KeyValueStore>, max_records: usize) -> Self {
        let records = match store.get(HISTORY_KEY) {
            Ok(Some(content)) => parse_document(&content),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "failed to load session history");
                Vec::new()
            }
        };

        let mut history = Self {
            store,
            records,
            max_records: max_records.max(1),
        };
        history.records.truncate(history.max_records);
        history
    }

    /// Records, most recent first.
    pub fn records(&self) -> &[SessionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&SessionRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn get_at(&self, position: usize) -> Option<&SessionRecord> {
        self.records.get(position)
    }

    /// Insert or replace a record and move it to the front. Records beyond
    /// the cap are dropped.
    pub fn upsert(&mut self, mut record: SessionRecord) {
        record.timestamp = chrono::Utc::now().timestamp_millis();
        if let Some(pos) = self.records.iter().position(|r| r.id == record.id) {
            self.records.remove(pos);
        }
        self.records.insert(0, record);
        self.records.truncate(self.max_records);
        self.persist();
    }

    /// Delete by position in the most-recent-first list.
    pub fn delete_at(&mut self, position: usize) -> Option<SessionRecord> {
        if position >= self.records.len() {
            return None;
        }
        let removed = self.records.remove(position);
        self.persist();
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.persist();
    }

    fn persist(&self) {
        let document = HistoryDocument {
            version: HISTORY_VERSION,
            records: self.records.clone(),
        };
        let result = serde_json::to_string(&document)
            .map_err(DebateError::from)
            .and_then(|json| self.store.set(HISTORY_KEY, &json));
        if let Err(e) = result {
            warn!(error = %e, "failed to save session history");
        }
    }
}

/// Parse the versioned document, falling back to the legacy bare array.
fn parse_document(content: &str) -> Vec<SessionRecord> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    if let Ok(document) = serde_json::from_str::<HistoryDocument>(content) {
        if document.version > HISTORY_VERSION {
            debug!(version = document.version, "history written by a newer version");
        }
        return document.records;
    }

    match serde_json::from_str::<Vec<SessionRecord>>(content) {
        Ok(records) => {
            debug!(count = records.len(), "loaded legacy unversioned history");
            records
        }
        Err(e) => {
            warn!(error = %e, "session history is corrupt, starting empty");
            Vec::new()
        }
    }
}
