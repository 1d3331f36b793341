//! Deposit Orchestrator
//!
//! `(none) -> PENDING -> COMPLETE`. A deposit is recorded only after the
//! root chain accepted the `depositFor` call; any failure before that
//! leaves no record behind.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use super::abi;
use super::context::{Collaborators, Contracts, EventSink};
use super::error::BridgeError;
use super::oracle::ChainStateOracle;
use super::rpc::{ChainRpc, TxRequest};
use super::store::RecordStore;
use super::sync::{CancelToken, PollConfig, wait_for_sync};
use super::types::{BridgeEvent, Deposit, DepositStatus};
use super::wallet::{WalletRefresher, WalletSession};
use crate::money::{from_minimal_units, parse_hex_uint, to_minimal_units};

pub struct DepositOrchestrator {
    root: Arc<dyn ChainRpc>,
    oracle: Arc<ChainStateOracle>,
    store: Arc<dyn RecordStore>,
    wallet: Arc<dyn WalletSession>,
    refresher: Arc<dyn WalletRefresher>,
    contracts: Contracts,
    events: EventSink,
}

impl DepositOrchestrator {
    pub fn new(c: &Collaborators, oracle: Arc<ChainStateOracle>, events: EventSink) -> Self {
        Self {
            root: c.root.clone(),
            oracle,
            store: c.store.clone(),
            wallet: c.wallet.clone(),
            refresher: c.refresher.clone(),
            contracts: c.contracts.clone(),
            events,
        }
    }

    /// Submit `depositFor` on the root chain and record the PENDING deposit
    pub async fn submit(&self, amount: Decimal) -> Result<Deposit, BridgeError> {
        match self.try_submit(amount).await {
            Ok(deposit) => {
                info!(hash = %deposit.hash, amount = %amount, "Deposit submitted");
                self.events.emit(BridgeEvent::DepositSubmitted(deposit.clone()));
                Ok(deposit)
            }
            Err(e) => {
                warn!(amount = %amount, error = %e, "Deposit failed");
                self.events.emit(BridgeEvent::DepositFailed {
                    amount,
                    error: e.clone(),
                });
                Err(e)
            }
        }
    }

    async fn try_submit(&self, amount: Decimal) -> Result<Deposit, BridgeError> {
        if amount <= Decimal::ZERO {
            return Err(BridgeError::InvalidAmount);
        }
        let units = to_minimal_units(amount)?;
        let from = self.wallet.address().ok_or(BridgeError::NotConnected)?;

        let data = abi::encode_deposit_for(&from, &self.contracts.root_token, &units)?;
        let hash = self
            .root
            .send_transaction(TxRequest {
                from: from.clone(),
                to: self.contracts.root_chain_manager.clone(),
                data,
            })
            .await?;

        let deposit = Deposit::pending(hash, from, amount);
        self.store.upsert(deposit.clone().into()).await?;
        Ok(deposit)
    }

    /// Poll until the child chain has processed the deposit's state sync,
    /// then mark it COMPLETE. Returns the canonical record.
    pub async fn watch(
        &self,
        hash: &str,
        config: &PollConfig,
        cancel: CancelToken,
    ) -> Result<Deposit, BridgeError> {
        let oracle = &self.oracle;
        let attempts = wait_for_sync(
            hash,
            move |h| async move { oracle.is_deposit_synced(&h).await },
            config,
            cancel,
        )
        .await?;

        if self
            .store
            .advance_deposit(hash, DepositStatus::Complete)
            .await?
        {
            info!(hash = %hash, attempts, "Deposit complete");
            self.events.emit(BridgeEvent::DepositStatusChanged {
                hash: hash.to_string(),
                status: DepositStatus::Complete,
            });
            self.refresher.refresh();
        }

        self.store
            .get_deposit(hash)
            .await
            .ok_or_else(|| BridgeError::RecordNotFound(hash.to_string()))
    }

    /// Current root-token allowance granted to the bridge predicate
    pub async fn allowance(&self) -> Result<Decimal, BridgeError> {
        let owner = self.wallet.address().ok_or(BridgeError::NotConnected)?;
        let data = abi::encode_allowance(&owner, &self.contracts.erc20_predicate)?;
        let result = self.root.call(&self.contracts.root_token, &data).await?;
        let units = parse_hex_uint(&result)?;
        Ok(from_minimal_units(&units)?)
    }

    /// Approve the bridge predicate to pull `amount` root tokens
    pub async fn approve(&self, amount: Decimal) -> Result<String, BridgeError> {
        match self.try_approve(amount).await {
            Ok(hash) => {
                info!(hash = %hash, amount = %amount, "Approve submitted");
                self.events.emit(BridgeEvent::ApproveSubmitted {
                    amount,
                    hash: hash.clone(),
                });
                Ok(hash)
            }
            Err(e) => {
                warn!(amount = %amount, error = %e, "Approve failed");
                self.events.emit(BridgeEvent::ApproveFailed {
                    amount,
                    error: e.clone(),
                });
                Err(e)
            }
        }
    }

    async fn try_approve(&self, amount: Decimal) -> Result<String, BridgeError> {
        let units = to_minimal_units(amount)?;
        let from = self.wallet.address().ok_or(BridgeError::NotConnected)?;
        let data = abi::encode_approve(&self.contracts.erc20_predicate, &units)?;
        let hash = self
            .root
            .send_transaction(TxRequest {
                from,
                to: self.contracts.root_token.clone(),
                data,
            })
            .await?;
        Ok(hash)
    }
}
