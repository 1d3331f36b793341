//! Withdrawal Orchestrator
//!
//! `(none) -> PENDING -> CHECKPOINT -> COMPLETE`.
//!
//! Finalize hands the exit client a `oneshot` sender. The root-chain hash
//! it reports at broadcast time is written onto the stored record while
//! the exit call is still running, so a crash mid-exit never loses it.
//! Every outcome is reported against the record re-read from the store.

use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::abi;
use super::context::{Collaborators, Contracts, EventSink};
use super::error::BridgeError;
use super::exit::ExitClient;
use super::oracle::ChainStateOracle;
use super::rpc::{ChainRpc, TxRequest};
use super::store::RecordStore;
use super::sync::{CancelToken, PollConfig, wait_for_sync};
use super::types::{BridgeEvent, Withdrawal, WithdrawalStatus};
use super::wallet::{WalletRefresher, WalletSession};
use crate::money::to_minimal_units;

pub struct WithdrawalOrchestrator {
    child: Arc<dyn ChainRpc>,
    oracle: Arc<ChainStateOracle>,
    exit: Arc<dyn ExitClient>,
    store: Arc<dyn RecordStore>,
    wallet: Arc<dyn WalletSession>,
    refresher: Arc<dyn WalletRefresher>,
    contracts: Contracts,
    events: EventSink,
}

impl WithdrawalOrchestrator {
    pub fn new(c: &Collaborators, oracle: Arc<ChainStateOracle>, events: EventSink) -> Self {
        Self {
            child: c.child.clone(),
            oracle,
            exit: c.exit.clone(),
            store: c.store.clone(),
            wallet: c.wallet.clone(),
            refresher: c.refresher.clone(),
            contracts: c.contracts.clone(),
            events,
        }
    }

    /// Burn `amount` on the child chain and record the PENDING withdrawal
    pub async fn initiate(&self, amount: Decimal) -> Result<Withdrawal, BridgeError> {
        match self.try_initiate(amount).await {
            Ok(withdrawal) => {
                info!(
                    hash = %withdrawal.initialize_hash,
                    amount = %amount,
                    "Withdrawal initiated"
                );
                self.events
                    .emit(BridgeEvent::WithdrawalInitiated(withdrawal.clone()));
                Ok(withdrawal)
            }
            Err(e) => {
                warn!(amount = %amount, error = %e, "Withdrawal failed");
                self.events.emit(BridgeEvent::WithdrawalFailed {
                    amount,
                    error: e.clone(),
                });
                Err(e)
            }
        }
    }

    async fn try_initiate(&self, amount: Decimal) -> Result<Withdrawal, BridgeError> {
        if amount <= Decimal::ZERO {
            return Err(BridgeError::InvalidAmount);
        }
        let units = to_minimal_units(amount)?;
        let from = self.wallet.address().ok_or(BridgeError::NotConnected)?;

        let hash = self
            .child
            .send_transaction(TxRequest {
                from: from.clone(),
                to: self.contracts.child_token.clone(),
                data: abi::encode_withdraw(&units),
            })
            .await?;

        let withdrawal = Withdrawal::pending(hash, from, amount);
        self.store.upsert(withdrawal.clone().into()).await?;
        Ok(withdrawal)
    }

    /// Poll until a checkpoint covers the burn, then move to CHECKPOINT
    pub async fn watch(
        &self,
        initialize_hash: &str,
        config: &PollConfig,
        cancel: CancelToken,
    ) -> Result<Withdrawal, BridgeError> {
        let oracle = &self.oracle;
        let attempts = wait_for_sync(
            initialize_hash,
            move |h| async move { oracle.is_withdrawal_synced(&h).await },
            config,
            cancel,
        )
        .await?;

        if self
            .store
            .advance_withdrawal(initialize_hash, WithdrawalStatus::Checkpoint)
            .await?
        {
            info!(hash = %initialize_hash, attempts, "Withdrawal checkpointed");
            self.events.emit(BridgeEvent::WithdrawalStatusChanged {
                hash: initialize_hash.to_string(),
                status: WithdrawalStatus::Checkpoint,
            });
        }

        self.canonical(initialize_hash).await
    }

    /// Exit the withdrawal on the root chain.
    ///
    /// `withdrawal` may be a stale copy; only its hash is trusted.
    pub async fn finalize(&self, withdrawal: &Withdrawal) -> Result<Withdrawal, BridgeError> {
        let hash = withdrawal.initialize_hash.as_str();
        let current = self.canonical(hash).await?;
        if current.status != WithdrawalStatus::Checkpoint {
            let e = BridgeError::InvalidStateTransition(format!(
                "cannot finalize {} in status {}",
                hash, current.status
            ));
            warn!(hash = %hash, status = %current.status, "Finalize rejected");
            self.events.emit(BridgeEvent::FinalizeFailed {
                withdrawal: current,
                error: e.clone(),
            });
            return Err(e);
        }

        match self.run_exit(hash).await {
            Ok(finalize_hash) => self.complete(hash, &finalize_hash).await,
            Err(e) => {
                let canonical = self.canonical(hash).await?;
                warn!(
                    hash = %hash,
                    finalize_hash = ?canonical.finalize_hash,
                    error = %e,
                    "Finalize failed"
                );
                self.events.emit(BridgeEvent::FinalizeFailed {
                    withdrawal: canonical,
                    error: e.clone(),
                });
                Err(e)
            }
        }
    }

    /// Drive the exit call, persisting the broadcast hash as soon as it
    /// arrives
    async fn run_exit(&self, hash: &str) -> Result<String, BridgeError> {
        let from = self.wallet.address().ok_or(BridgeError::NotConnected)?;
        let (tx, mut rx) = oneshot::channel::<String>();
        let mut exit = self.exit.exit_erc20(hash, &from, tx);
        let mut broadcast_seen = false;

        let result = loop {
            tokio::select! {
                biased;
                broadcast = &mut rx, if !broadcast_seen => {
                    broadcast_seen = true;
                    match broadcast {
                        Ok(finalize_hash) => self.attach(hash, &finalize_hash).await?,
                        Err(_) => debug!(hash = %hash, "Exit client dropped broadcast channel"),
                    }
                }
                result = &mut exit => break result,
            }
        };

        // Broadcast and resolution can land in the same poll
        if !broadcast_seen && let Ok(finalize_hash) = rx.try_recv() {
            self.attach(hash, &finalize_hash).await?;
        }

        Ok(result?)
    }

    async fn attach(&self, hash: &str, finalize_hash: &str) -> Result<(), BridgeError> {
        if self.store.attach_finalize_hash(hash, finalize_hash).await? {
            info!(hash = %hash, finalize_hash = %finalize_hash, "Exit broadcast");
            self.events.emit(BridgeEvent::FinalizeHashAttached {
                initialize_hash: hash.to_string(),
                finalize_hash: finalize_hash.to_string(),
            });
        }
        Ok(())
    }

    async fn complete(&self, hash: &str, finalize_hash: &str) -> Result<Withdrawal, BridgeError> {
        self.attach(hash, finalize_hash).await?;
        let advanced = self
            .store
            .advance_withdrawal(hash, WithdrawalStatus::Complete)
            .await?;
        let canonical = self.canonical(hash).await?;

        if advanced {
            info!(
                hash = %hash,
                finalize_hash = ?canonical.finalize_hash,
                "Withdrawal complete"
            );
            self.events
                .emit(BridgeEvent::WithdrawalFinalized(canonical.clone()));
            self.refresher.refresh();
        }
        Ok(canonical)
    }

    async fn canonical(&self, hash: &str) -> Result<Withdrawal, BridgeError> {
        self.store
            .get_withdrawal(hash)
            .await
            .ok_or_else(|| BridgeError::RecordNotFound(hash.to_string()))
    }
}
