//! Bridge Engine
//!
//! Entry point for the host. Each intent runs as an independent task;
//! tasks share nothing but the record store. Long-running status watches
//! are registered by hash so they can be cancelled, and are never started
//! twice for the same hash.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::context::{Collaborators, EventSink};
use super::deposit::DepositOrchestrator;
use super::error::{BridgeError, ImportError};
use super::import::{ImportOutcome, WithdrawalImporter};
use super::oracle::ChainStateOracle;
use super::store::RecordStore;
use super::sync::{CancelHandle, CancelToken, PollConfig, cancel_pair};
use super::transfer::TransferOrchestrator;
use super::types::{BridgeEvent, BridgeRecord, Deposit, RecordKind, Transfer, Withdrawal};
use super::withdrawal::WithdrawalOrchestrator;

const EVENT_CAPACITY: usize = 1024;

struct EngineInner {
    deposits: DepositOrchestrator,
    withdrawals: WithdrawalOrchestrator,
    importer: WithdrawalImporter,
    transfers: TransferOrchestrator,
    store: Arc<dyn RecordStore>,
    poll: PollConfig,
    events: EventSink,
    watches: DashMap<String, WatchSlot>,
    next_watch_id: AtomicU64,
}

/// A registered watch. The id tells a finishing task apart from a newer
/// watch registered under the same hash after a cancel.
struct WatchSlot {
    id: u64,
    handle: CancelHandle,
}

impl EngineInner {
    /// Drop the registration for `hash` only if it still belongs to watch `id`
    fn release_watch(&self, hash: &str, id: u64) {
        if self.watches.remove_if(hash, |_, slot| slot.id == id).is_none() {
            debug!(hash = %hash, watch_id = id, "Watch slot already released");
        }
    }
}

#[derive(Clone)]
pub struct BridgeEngine {
    inner: Arc<EngineInner>,
}

impl BridgeEngine {
    pub fn new(collaborators: Collaborators, poll: PollConfig) -> Self {
        let events = EventSink::new(EVENT_CAPACITY);
        let oracle = Arc::new(ChainStateOracle::new(
            collaborators.root.clone(),
            collaborators.child.clone(),
            collaborators.checkpoints.clone(),
            &collaborators.contracts.state_receiver,
        ));

        let inner = EngineInner {
            deposits: DepositOrchestrator::new(&collaborators, oracle.clone(), events.clone()),
            withdrawals: WithdrawalOrchestrator::new(&collaborators, oracle, events.clone()),
            importer: WithdrawalImporter::new(&collaborators, events.clone()),
            transfers: TransferOrchestrator::new(&collaborators, events.clone()),
            store: collaborators.store.clone(),
            poll,
            events,
            watches: DashMap::new(),
            next_watch_id: AtomicU64::new(0),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.inner.events.subscribe()
    }

    pub fn store(&self) -> Arc<dyn RecordStore> {
        self.inner.store.clone()
    }

    // ========================================================================
    // Intents
    // ========================================================================

    /// Submit a deposit and start watching it
    pub async fn deposit(&self, amount: Decimal) -> Result<Deposit, BridgeError> {
        let deposit = self.inner.deposits.submit(amount).await?;
        self.watch_deposit(&deposit.hash);
        Ok(deposit)
    }

    pub async fn allowance(&self) -> Result<Decimal, BridgeError> {
        self.inner.deposits.allowance().await
    }

    pub async fn approve(&self, amount: Decimal) -> Result<String, BridgeError> {
        self.inner.deposits.approve(amount).await
    }

    /// Initiate a withdrawal and start watching for its checkpoint
    pub async fn withdraw(&self, amount: Decimal) -> Result<Withdrawal, BridgeError> {
        let withdrawal = self.inner.withdrawals.initiate(amount).await?;
        self.watch_withdrawal(&withdrawal.initialize_hash);
        Ok(withdrawal)
    }

    pub async fn finalize(&self, withdrawal: &Withdrawal) -> Result<Withdrawal, BridgeError> {
        self.inner.withdrawals.finalize(withdrawal).await
    }

    pub async fn transfer(
        &self,
        network: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<Transfer, BridgeError> {
        self.inner.transfers.send(network, to, amount).await
    }

    /// Import an external burn and start watching for its checkpoint
    pub async fn import_withdrawal(&self, tx_hash: &str) -> Result<ImportOutcome, ImportError> {
        let outcome = self.inner.importer.import(tx_hash).await?;
        self.watch_withdrawal(&outcome.withdrawal.initialize_hash);
        Ok(outcome)
    }

    // ========================================================================
    // Spawned intents
    // ========================================================================

    pub fn spawn_deposit(&self, amount: Decimal) -> JoinHandle<Result<Deposit, BridgeError>> {
        let engine = self.clone();
        tokio::spawn(async move { engine.deposit(amount).await })
    }

    pub fn spawn_approve(&self, amount: Decimal) -> JoinHandle<Result<String, BridgeError>> {
        let engine = self.clone();
        tokio::spawn(async move { engine.approve(amount).await })
    }

    pub fn spawn_withdraw(&self, amount: Decimal) -> JoinHandle<Result<Withdrawal, BridgeError>> {
        let engine = self.clone();
        tokio::spawn(async move { engine.withdraw(amount).await })
    }

    pub fn spawn_finalize(
        &self,
        withdrawal: Withdrawal,
    ) -> JoinHandle<Result<Withdrawal, BridgeError>> {
        let engine = self.clone();
        tokio::spawn(async move { engine.finalize(&withdrawal).await })
    }

    pub fn spawn_transfer(
        &self,
        network: String,
        to: String,
        amount: Decimal,
    ) -> JoinHandle<Result<Transfer, BridgeError>> {
        let engine = self.clone();
        tokio::spawn(async move { engine.transfer(&network, &to, amount).await })
    }

    pub fn spawn_import(&self, tx_hash: String) -> JoinHandle<Result<ImportOutcome, ImportError>> {
        let engine = self.clone();
        tokio::spawn(async move { engine.import_withdrawal(&tx_hash).await })
    }

    // ========================================================================
    // Watches
    // ========================================================================

    /// Watch a deposit until COMPLETE. `None` if already watched.
    pub fn watch_deposit(&self, hash: &str) -> Option<JoinHandle<()>> {
        let (id, token) = self.register_watch(hash)?;
        let inner = self.inner.clone();
        let hash = hash.to_string();
        Some(tokio::spawn(async move {
            let result = inner.deposits.watch(&hash, &inner.poll, token).await;
            inner.release_watch(&hash, id);
            if let Err(e) = result {
                warn!(hash = %hash, error = %e, "Deposit watch aborted");
                inner.events.emit(BridgeEvent::WatchAborted { hash, error: e });
            }
        }))
    }

    /// Watch a withdrawal until CHECKPOINT. `None` if already watched.
    pub fn watch_withdrawal(&self, initialize_hash: &str) -> Option<JoinHandle<()>> {
        let (id, token) = self.register_watch(initialize_hash)?;
        let inner = self.inner.clone();
        let hash = initialize_hash.to_string();
        Some(tokio::spawn(async move {
            let result = inner.withdrawals.watch(&hash, &inner.poll, token).await;
            inner.release_watch(&hash, id);
            if let Err(e) = result {
                warn!(hash = %hash, error = %e, "Withdrawal watch aborted");
                inner.events.emit(BridgeEvent::WatchAborted { hash, error: e });
            }
        }))
    }

    fn register_watch(&self, hash: &str) -> Option<(u64, CancelToken)> {
        match self.inner.watches.entry(hash.to_string()) {
            Entry::Occupied(_) => {
                debug!(hash = %hash, "Already watching");
                None
            }
            Entry::Vacant(vacant) => {
                let id = self.inner.next_watch_id.fetch_add(1, Ordering::Relaxed);
                let (handle, token) = cancel_pair();
                vacant.insert(WatchSlot { id, handle });
                Some((id, token))
            }
        }
    }

    /// Re-start watches for every PENDING deposit and withdrawal in the
    /// store, e.g. after a wallet reconnect or a restart
    pub async fn resume_pending(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        for record in self.inner.store.list_pending(RecordKind::Deposit).await {
            if let BridgeRecord::Deposit(d) = record
                && let Some(handle) = self.watch_deposit(&d.hash)
            {
                handles.push(handle);
            }
        }
        for record in self.inner.store.list_pending(RecordKind::Withdrawal).await {
            if let BridgeRecord::Withdrawal(w) = record
                && let Some(handle) = self.watch_withdrawal(&w.initialize_hash)
            {
                handles.push(handle);
            }
        }

        info!(count = handles.len(), "Resumed pending watches");
        handles
    }

    /// Stop the watch for `hash`. Returns false if none was running.
    pub fn cancel_watch(&self, hash: &str) -> bool {
        match self.inner.watches.remove(hash) {
            Some((_, slot)) => {
                info!(hash = %hash, watch_id = slot.id, "Cancelling watch");
                slot.handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn active_watches(&self) -> usize {
        self.inner.watches.len()
    }

    /// Cancel every running watch
    pub fn shutdown(&self) {
        let hashes: Vec<String> = self
            .inner
            .watches
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for hash in hashes {
            self.cancel_watch(&hash);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::mock::{Harness, fast_poll};
    use crate::bridge::sync::SyncError;
    use crate::bridge::types::{DepositStatus, WithdrawalStatus};
    use std::time::Duration;

    #[tokio::test]
    async fn test_watch_registered_once() {
        let h = Harness::new();
        h.child.push_next_hash("0xbb");
        let engine = BridgeEngine::new(h.collaborators(), fast_poll());

        engine.withdraw(Decimal::from(50)).await.unwrap();
        assert_eq!(engine.active_watches(), 1);
        assert!(engine.watch_withdrawal("0xbb").is_none());
        assert_eq!(engine.active_watches(), 1);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_cancel_watch_reports_abort() {
        let h = Harness::new();
        h.root.push_next_hash("0xaa");
        let engine = BridgeEngine::new(h.collaborators(), fast_poll());
        let mut rx = engine.subscribe();

        engine.deposit(Decimal::from(100)).await.unwrap();
        assert!(engine.cancel_watch("0xaa"));
        assert!(!engine.cancel_watch("0xaa"));

        let aborted = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let BridgeEvent::WatchAborted { hash, error } = rx.recv().await.unwrap() {
                    return (hash, error);
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(aborted.0, "0xaa");
        assert!(matches!(aborted.1, BridgeError::Sync(SyncError::Cancelled)));

        // Record stays PENDING for a later resume
        let d = engine.store().get_deposit("0xaa").await.unwrap();
        assert_eq!(d.status, DepositStatus::Pending);
    }

    #[tokio::test]
    async fn test_rewatch_after_cancel_survives_old_task_exit() {
        let h = Harness::new();
        h.root.push_next_hash("0xaa");
        let engine = BridgeEngine::new(h.collaborators(), fast_poll());

        engine.deposit(Decimal::from(100)).await.unwrap();
        assert!(engine.cancel_watch("0xaa"));
        let second = engine.watch_deposit("0xaa");
        assert!(second.is_some());

        // Cancelled task finishes after the new registration
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.active_watches(), 1);
        assert!(engine.watch_deposit("0xaa").is_none());

        assert!(engine.cancel_watch("0xaa"));
        assert_eq!(engine.active_watches(), 0);
    }

    #[tokio::test]
    async fn test_bounded_poll_aborts_watch() {
        let h = Harness::new();
        h.child.push_next_hash("0xbb");
        let poll = PollConfig {
            max_attempts: Some(3),
            ..fast_poll()
        };
        let engine = BridgeEngine::new(h.collaborators(), poll);
        let mut rx = engine.subscribe();

        engine.withdraw(Decimal::from(50)).await.unwrap();
        let error = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let BridgeEvent::WatchAborted { error, .. } = rx.recv().await.unwrap() {
                    return error;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(error.code(), "SYNC_EXHAUSTED");
        assert_eq!(engine.active_watches(), 0);
    }

    #[tokio::test]
    async fn test_resume_pending_restarts_watches() {
        let h = Harness::new();
        h.store
            .upsert(Deposit::pending("0xaa", "0xabc", Decimal::from(1)).into())
            .await
            .unwrap();
        h.store
            .upsert(Withdrawal::pending("0xbb", "0xabc", Decimal::from(2)).into())
            .await
            .unwrap();
        let mut done = Withdrawal::pending("0xb2", "0xabc", Decimal::from(3));
        done.status = WithdrawalStatus::Checkpoint;
        h.store.upsert(done.into()).await.unwrap();

        h.root.set_receipt(crate::bridge::mock::deposit_receipt("0xaa", 5, 9));
        h.child.set_last_state_id(9);
        h.mine_burn("0xbb", 100);
        h.index.set_latest_end(200);

        let engine = BridgeEngine::new(h.collaborators(), fast_poll());
        let handles = engine.resume_pending().await;
        assert_eq!(handles.len(), 2);
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .unwrap()
                .unwrap();
        }

        let store = engine.store();
        assert_eq!(
            store.get_deposit("0xaa").await.unwrap().status,
            DepositStatus::Complete
        );
        assert_eq!(
            store.get_withdrawal("0xbb").await.unwrap().status,
            WithdrawalStatus::Checkpoint
        );
        assert_eq!(engine.active_watches(), 0);
    }
}
