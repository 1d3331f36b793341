//! Transfer Orchestrator
//!
//! Plain ERC20 `transfer` on either chain, no bridging. The record is
//! CONFIRMED as soon as the chain hands back a hash.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use super::abi;
use super::context::{Collaborators, Contracts, EventSink};
use super::error::BridgeError;
use super::rpc::{ChainRpc, TxRequest};
use super::store::RecordStore;
use super::types::{BridgeEvent, Network, Transfer, TransferStatus, now_millis};
use super::wallet::{WalletRefresher, WalletSession};
use crate::money::to_minimal_units;

pub struct TransferOrchestrator {
    root: Arc<dyn ChainRpc>,
    child: Arc<dyn ChainRpc>,
    store: Arc<dyn RecordStore>,
    wallet: Arc<dyn WalletSession>,
    refresher: Arc<dyn WalletRefresher>,
    contracts: Contracts,
    events: EventSink,
}

impl TransferOrchestrator {
    pub fn new(c: &Collaborators, events: EventSink) -> Self {
        Self {
            root: c.root.clone(),
            child: c.child.clone(),
            store: c.store.clone(),
            wallet: c.wallet.clone(),
            refresher: c.refresher.clone(),
            contracts: c.contracts.clone(),
            events,
        }
    }

    /// Send `amount` tokens to `to` on `network` (`root` / `child` or an alias)
    pub async fn send(
        &self,
        network: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<Transfer, BridgeError> {
        match self.try_send(network, to, amount).await {
            Ok(transfer) => {
                info!(
                    hash = %transfer.hash,
                    network = %transfer.network,
                    to = %to,
                    amount = %amount,
                    "Transfer confirmed"
                );
                self.events
                    .emit(BridgeEvent::TransferConfirmed(transfer.clone()));
                Ok(transfer)
            }
            Err(e) => {
                warn!(network, to, amount = %amount, error = %e, "Transfer failed");
                self.events.emit(BridgeEvent::TransferFailed {
                    to: to.to_string(),
                    amount,
                    network: network.to_string(),
                    error: e.clone(),
                });
                Err(e)
            }
        }
    }

    async fn try_send(
        &self,
        network: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<Transfer, BridgeError> {
        let network: Network = network.parse()?;
        if !abi::is_valid_address(to) {
            return Err(BridgeError::InvalidAddress(to.to_string()));
        }
        if amount <= Decimal::ZERO {
            return Err(BridgeError::InvalidAmount);
        }
        let units = to_minimal_units(amount)?;
        let data = abi::encode_transfer(to, &units)?;
        let from = self.wallet.address().ok_or(BridgeError::NotConnected)?;

        let (rpc, token) = match network {
            Network::Root => (&self.root, &self.contracts.root_token),
            Network::Child => (&self.child, &self.contracts.child_token),
        };
        let hash = rpc
            .send_transaction(TxRequest {
                from,
                to: token.clone(),
                data,
            })
            .await?;

        let transfer = Transfer {
            hash,
            network,
            chain_id: rpc.chain_id(),
            amount,
            to: to.to_string(),
            status: TransferStatus::Confirmed,
            timestamp: now_millis(),
        };
        self.store.upsert(transfer.clone().into()).await?;
        self.refresher.refresh();
        Ok(transfer)
    }
}
