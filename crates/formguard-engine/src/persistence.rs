//! Validation State Persistence
//!
//! One record per form instance. Removal is a status change; records are
//! only deleted by an explicit prune.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use formguard_dom::NodeId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Persistence error
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("State store unavailable: {0}")]
    Unavailable(String),

    #[error("State file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Validation lifecycle of a form
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    #[default]
    None,
    Applied,
    Removed,
}

/// Persisted validation state of one form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStateRecord {
    pub scope_key: String,
    pub form_id: NodeId,
    pub has_validation: bool,
    pub applied_at: Option<DateTime<Utc>>,
    pub status: ValidationStatus,
}

impl ValidationStateRecord {
    pub fn applied(scope_key: &str, form_id: &NodeId, applied_at: DateTime<Utc>) -> Self {
        Self {
            scope_key: scope_key.to_string(),
            form_id: form_id.clone(),
            has_validation: true,
            applied_at: Some(applied_at),
            status: ValidationStatus::Applied,
        }
    }

    pub fn removed(scope_key: &str, form_id: &NodeId) -> Self {
        Self {
            scope_key: scope_key.to_string(),
            form_id: form_id.clone(),
            has_validation: false,
            applied_at: None,
            status: ValidationStatus::Removed,
        }
    }

    pub fn is_applied(&self) -> bool {
        self.status == ValidationStatus::Applied
    }
}

/// Persistence service
#[async_trait]
pub trait StateStore: Send + Sync {
    /// All records of a scope
    async fn get_validation_states(&self, scope_key: &str) -> Result<Vec<ValidationStateRecord>, StoreError>;

    /// Create or overwrite the record of `record.form_id`
    async fn put_validation_state(&self, record: ValidationStateRecord) -> Result<(), StoreError>;

    /// Delete the record of a form (absent records are not an error)
    async fn delete_validation_state(&self, form_id: &NodeId) -> Result<(), StoreError>;
}

fn upsert(records: &mut Vec<ValidationStateRecord>, record: ValidationStateRecord) {
    match records.iter_mut().find(|r| r.form_id == record.form_id) {
        Some(existing) => *existing = record,
        None => records.push(record),
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<ValidationStateRecord>,
    fail_reads: bool,
    fail_writes: bool,
}

/// In-memory store with fault injection
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: RwLock<MemoryState>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record
    pub fn records(&self) -> Vec<ValidationStateRecord> {
        self.state.read().records.clone()
    }

    pub fn record(&self, form_id: &NodeId) -> Option<ValidationStateRecord> {
        self.state.read().records.iter().find(|r| &r.form_id == form_id).cloned()
    }

    /// Make reads fail
    pub fn fail_reads(&self, fail: bool) {
        self.state.write().fail_reads = fail;
    }

    /// Make puts and deletes fail
    pub fn fail_writes(&self, fail: bool) {
        self.state.write().fail_writes = fail;
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get_validation_states(&self, scope_key: &str) -> Result<Vec<ValidationStateRecord>, StoreError> {
        let state = self.state.read();
        if state.fail_reads {
            return Err(StoreError::Unavailable("injected read fault".to_string()));
        }
        Ok(state.records.iter().filter(|r| r.scope_key == scope_key).cloned().collect())
    }

    async fn put_validation_state(&self, record: ValidationStateRecord) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if state.fail_writes {
            return Err(StoreError::Unavailable("injected write fault".to_string()));
        }
        upsert(&mut state.records, record);
        Ok(())
    }

    async fn delete_validation_state(&self, form_id: &NodeId) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if state.fail_writes {
            return Err(StoreError::Unavailable("injected write fault".to_string()));
        }
        state.records.retain(|r| &r.form_id != form_id);
        Ok(())
    }
}

/// Records kept as one JSON array in a file
#[derive(Debug)]
pub struct JsonFileStateStore {
    path: PathBuf,
    lock: smol::lock::Mutex<()>,
}

impl JsonFileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: smol::lock::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<ValidationStateRecord>, StoreError> {
        match smol::fs::read_to_string(&self.path).await {
            Ok(json) if json.trim().is_empty() => Ok(Vec::new()),
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, records: &[ValidationStateRecord]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(records)?;
        smol::fs::write(&self.path, json).await?;
        tracing::debug!("Saved {} records to {}", records.len(), self.path.display());
        Ok(())
    }

    /// Read-modify-write under the lock
    async fn update<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Vec<ValidationStateRecord>) + Send,
    {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        change(&mut records);
        self.save(&records).await
    }
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn get_validation_states(&self, scope_key: &str) -> Result<Vec<ValidationStateRecord>, StoreError> {
        let records = self.load().await?;
        Ok(records.into_iter().filter(|r| r.scope_key == scope_key).collect())
    }

    async fn put_validation_state(&self, record: ValidationStateRecord) -> Result<(), StoreError> {
        self.update(move |records| upsert(records, record)).await
    }

    async fn delete_validation_state(&self, form_id: &NodeId) -> Result<(), StoreError> {
        self.update(|records| records.retain(|r| &r.form_id != form_id)).await
    }
}
