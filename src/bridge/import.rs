//! Withdrawal Import
//!
//! Re-admits a child-chain burn made outside this client into the
//! withdrawal state machine. Checks run in order and stop at the first
//! failure, each with its own [`ImportError`] tag:
//!
//! 1. active address resolvable            else `Other`
//! 2. transaction exists on the child chain else `NotFound`
//! 3. input carries the `withdraw` selector else `NotWithdrawal`
//! 4. sent by, or on behalf of, the user    else `NotOwnTransaction`
//! 5. exit not processed on the root chain  else `AlreadyProcessed`
//!
//! A failed processed-check does not block the import, but the outcome
//! says the answer was unknown.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use super::abi::{self, WITHDRAW_SELECTOR};
use super::context::{Collaborators, EventSink};
use super::error::ImportError;
use super::exit::{ExitCheck, ExitClient, check_exit};
use super::rpc::{ChainRpc, RawTransaction};
use super::store::RecordStore;
use super::types::{BridgeEvent, Network, Withdrawal};
use super::wallet::{TrackRequest, TrackedAction, TransactionTracker, WalletSession};
use crate::money::from_minimal_units;

/// Result of a successful import
#[derive(Debug, Clone, PartialEq)]
pub struct ImportOutcome {
    pub withdrawal: Withdrawal,
    /// What the exit client said about the exit
    pub exit_check: ExitCheck,
}

pub struct WithdrawalImporter {
    child: Arc<dyn ChainRpc>,
    exit: Arc<dyn ExitClient>,
    store: Arc<dyn RecordStore>,
    wallet: Arc<dyn WalletSession>,
    tracker: Arc<dyn TransactionTracker>,
    events: EventSink,
}

impl WithdrawalImporter {
    pub fn new(c: &Collaborators, events: EventSink) -> Self {
        Self {
            child: c.child.clone(),
            exit: c.exit.clone(),
            store: c.store.clone(),
            wallet: c.wallet.clone(),
            tracker: c.tracker.clone(),
            events,
        }
    }

    pub async fn import(&self, tx_hash: &str) -> Result<ImportOutcome, ImportError> {
        match self.try_import(tx_hash).await {
            Ok(outcome) => {
                info!(
                    hash = %tx_hash,
                    amount = %outcome.withdrawal.amount,
                    exit_check = ?outcome.exit_check,
                    "Withdrawal imported"
                );
                self.events
                    .emit(BridgeEvent::WithdrawalImported(outcome.withdrawal.clone()));
                Ok(outcome)
            }
            Err(e) => {
                warn!(hash = %tx_hash, code = e.code(), error = %e, "Import rejected");
                self.events.emit(BridgeEvent::ImportFailed {
                    tx_hash: tx_hash.to_string(),
                    error: e.clone(),
                });
                Err(e)
            }
        }
    }

    async fn try_import(&self, tx_hash: &str) -> Result<ImportOutcome, ImportError> {
        let address = self
            .wallet
            .address()
            .ok_or_else(|| ImportError::Other("Could not get the active wallet address".into()))?;

        let tx = self
            .child
            .get_transaction(tx_hash)
            .await?
            .ok_or(ImportError::NotFound)?;

        let selector_at =
            abi::find_selector(&tx.input, WITHDRAW_SELECTOR).ok_or(ImportError::NotWithdrawal)?;

        if !is_own_transaction(&tx, &address) {
            return Err(ImportError::NotOwnTransaction);
        }

        let exit_check = check_exit(self.exit.as_ref(), tx_hash).await;
        if exit_check.is_processed() {
            return Err(ImportError::AlreadyProcessed);
        }

        if self.store.get(tx_hash).await.is_some() {
            return Err(ImportError::Other(format!(
                "Transaction {} is already tracked",
                tx_hash
            )));
        }

        let amount = decode_amount(&tx.input, selector_at)?;
        let withdrawal = Withdrawal::pending(tx_hash, address.clone(), amount);
        self.store
            .upsert(withdrawal.clone().into())
            .await
            .map_err(|e| ImportError::Other(e.to_string()))?;

        self.tracker.track(TrackRequest {
            address,
            hash: tx_hash.to_string(),
            network: Network::Child,
            action: TrackedAction::InitiateWithdrawal {
                amount,
                chain_id: self.child.chain_id(),
            },
        });

        Ok(ImportOutcome {
            withdrawal,
            exit_check,
        })
    }
}

/// Sender match, or the address inside the payload for relayed calls
fn is_own_transaction(tx: &RawTransaction, address: &str) -> bool {
    tx.from.eq_ignore_ascii_case(address) || abi::input_mentions_address(&tx.input, address)
}

/// `withdraw(uint256)` argument, at full precision
fn decode_amount(input: &str, selector_at: usize) -> Result<Decimal, ImportError> {
    let units = abi::decode_word_after(input, selector_at, WITHDRAW_SELECTOR.len())
        .ok_or_else(|| ImportError::Other("Withdrawal amount missing from input".into()))?;
    Ok(from_minimal_units(&units)?)
}
