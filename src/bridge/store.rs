//! Canonical Record Store
//!
//! Single source of truth every orchestrator reads back from before it
//! reports success or failure. Records are keyed by their primary hash,
//! only ever inserted or moved forward, and never deleted.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use super::error::BridgeError;
use super::types::{
    BridgeRecord, Deposit, DepositStatus, RecordKind, Transfer, Withdrawal, WithdrawalStatus,
};

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, hash: &str) -> Option<BridgeRecord>;

    async fn get_deposit(&self, hash: &str) -> Option<Deposit> {
        match self.get(hash).await {
            Some(BridgeRecord::Deposit(d)) => Some(d),
            _ => None,
        }
    }

    async fn get_withdrawal(&self, initialize_hash: &str) -> Option<Withdrawal> {
        match self.get(initialize_hash).await {
            Some(BridgeRecord::Withdrawal(w)) => Some(w),
            _ => None,
        }
    }

    async fn get_transfer(&self, hash: &str) -> Option<Transfer> {
        match self.get(hash).await {
            Some(BridgeRecord::Transfer(t)) => Some(t),
            _ => None,
        }
    }

    /// Insert, or merge into the stored record without regressing it.
    /// Returns the canonical record after the write.
    async fn upsert(&self, record: BridgeRecord) -> Result<BridgeRecord, BridgeError>;

    /// Returns false if the deposit was already at or past `status`
    async fn advance_deposit(&self, hash: &str, status: DepositStatus)
    -> Result<bool, BridgeError>;

    /// Returns false if the withdrawal was already at or past `status`
    async fn advance_withdrawal(
        &self,
        initialize_hash: &str,
        status: WithdrawalStatus,
    ) -> Result<bool, BridgeError>;

    /// Returns false if a finalize hash was already attached
    async fn attach_finalize_hash(
        &self,
        initialize_hash: &str,
        finalize_hash: &str,
    ) -> Result<bool, BridgeError>;

    async fn list_pending(&self, kind: RecordKind) -> Vec<BridgeRecord>;

    async fn list_all(&self) -> Vec<BridgeRecord>;
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot format error: {0}")]
    Format(#[from] serde_json::Error),
}

/// In-process store over a concurrent map, with JSON snapshots
#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<String, BridgeRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot written by [`MemoryStore::save_snapshot`]; a missing
    /// file yields an empty store
    pub fn load_snapshot(path: &Path) -> Result<Self, SnapshotError> {
        let store = Self::new();
        if !path.exists() {
            debug!(path = %path.display(), "No snapshot found, starting empty");
            return Ok(store);
        }

        let content = std::fs::read_to_string(path)?;
        let records: Vec<BridgeRecord> = serde_json::from_str(&content)?;
        for record in records {
            store.records.insert(record.key().to_string(), record);
        }
        info!(path = %path.display(), count = store.len(), "Loaded record snapshot");
        Ok(store)
    }

    pub fn save_snapshot(&self, path: &Path) -> Result<(), SnapshotError> {
        let mut records: Vec<BridgeRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(record_timestamp);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write-then-rename so a crash never leaves a torn snapshot
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&records)?)?;
        std::fs::rename(&tmp, path)?;

        info!(path = %path.display(), count = records.len(), "Saved record snapshot");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn record_timestamp(record: &BridgeRecord) -> i64 {
    match record {
        BridgeRecord::Deposit(d) => d.timestamp,
        BridgeRecord::Withdrawal(w) => w.timestamp,
        BridgeRecord::Transfer(t) => t.timestamp,
    }
}

/// Fold `incoming` into `stored`: status only moves forward, identity
/// fields stay as first recorded, finalize hash is set at most once
fn merge(stored: &BridgeRecord, incoming: BridgeRecord) -> Result<BridgeRecord, BridgeError> {
    match (stored.clone(), incoming) {
        (BridgeRecord::Deposit(mut s), BridgeRecord::Deposit(i)) => {
            s.advance(i.status);
            Ok(BridgeRecord::Deposit(s))
        }
        (BridgeRecord::Withdrawal(mut s), BridgeRecord::Withdrawal(i)) => {
            s.advance(i.status);
            if let Some(hash) = i.finalize_hash {
                s.set_finalize_hash(hash);
            }
            Ok(BridgeRecord::Withdrawal(s))
        }
        (BridgeRecord::Transfer(mut s), BridgeRecord::Transfer(i)) => {
            if s.status.can_advance_to(i.status) {
                s.status = i.status;
            }
            Ok(BridgeRecord::Transfer(s))
        }
        (s, i) => Err(BridgeError::InvalidStateTransition(format!(
            "hash {} is a {:?}, cannot store a {:?}",
            s.key(),
            s.kind(),
            i.kind()
        ))),
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, hash: &str) -> Option<BridgeRecord> {
        self.records.get(hash).map(|r| r.value().clone())
    }

    async fn upsert(&self, record: BridgeRecord) -> Result<BridgeRecord, BridgeError> {
        match self.records.entry(record.key().to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(record)
            }
            Entry::Occupied(mut slot) => {
                let merged = merge(slot.get(), record)?;
                slot.insert(merged.clone());
                Ok(merged)
            }
        }
    }

    async fn advance_deposit(
        &self,
        hash: &str,
        status: DepositStatus,
    ) -> Result<bool, BridgeError> {
        let mut entry = self
            .records
            .get_mut(hash)
            .ok_or_else(|| BridgeError::RecordNotFound(hash.to_string()))?;
        match entry.value_mut() {
            BridgeRecord::Deposit(d) => Ok(d.advance(status)),
            _ => Err(BridgeError::RecordNotFound(hash.to_string())),
        }
    }

    async fn advance_withdrawal(
        &self,
        initialize_hash: &str,
        status: WithdrawalStatus,
    ) -> Result<bool, BridgeError> {
        let mut entry = self
            .records
            .get_mut(initialize_hash)
            .ok_or_else(|| BridgeError::RecordNotFound(initialize_hash.to_string()))?;
        match entry.value_mut() {
            BridgeRecord::Withdrawal(w) => Ok(w.advance(status)),
            _ => Err(BridgeError::RecordNotFound(initialize_hash.to_string())),
        }
    }

    async fn attach_finalize_hash(
        &self,
        initialize_hash: &str,
        finalize_hash: &str,
    ) -> Result<bool, BridgeError> {
        let mut entry = self
            .records
            .get_mut(initialize_hash)
            .ok_or_else(|| BridgeError::RecordNotFound(initialize_hash.to_string()))?;
        match entry.value_mut() {
            BridgeRecord::Withdrawal(w) => Ok(w.set_finalize_hash(finalize_hash)),
            _ => Err(BridgeError::RecordNotFound(initialize_hash.to_string())),
        }
    }

    async fn list_pending(&self, kind: RecordKind) -> Vec<BridgeRecord> {
        self.records
            .iter()
            .filter(|r| r.kind() == kind && r.is_pending())
            .map(|r| r.value().clone())
            .collect()
    }

    async fn list_all(&self) -> Vec<BridgeRecord> {
        self.records.iter().map(|r| r.value().clone()).collect()
    }
}
