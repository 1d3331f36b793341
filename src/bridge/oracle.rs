//! Chain State Oracle
//!
//! Side-effect-free checks for "has this bridge transaction reached the
//! other chain yet?". Both predicates are monotonic: the counters and
//! checkpoints they compare against never move backwards.

use num_bigint::BigUint;
use std::sync::Arc;
use tracing::debug;

use super::abi;
use super::checkpoint::CheckpointIndex;
use super::error::ChainError;
use super::rpc::{ChainRpc, TxReceipt};
use crate::money::parse_hex_uint;

/// Position of the StateSynced event among the deposit receipt's logs
pub const STATE_SYNC_LOG_INDEX: usize = 2;
/// Topic holding the state-sync counter inside that log
pub const STATE_SYNC_ID_TOPIC: usize = 1;

pub struct ChainStateOracle {
    root: Arc<dyn ChainRpc>,
    child: Arc<dyn ChainRpc>,
    checkpoints: Arc<dyn CheckpointIndex>,
    state_receiver: String,
}

impl ChainStateOracle {
    pub fn new(
        root: Arc<dyn ChainRpc>,
        child: Arc<dyn ChainRpc>,
        checkpoints: Arc<dyn CheckpointIndex>,
        state_receiver: &str,
    ) -> Self {
        Self {
            root,
            child,
            checkpoints,
            state_receiver: state_receiver.to_string(),
        }
    }

    /// Root-chain deposit has been relayed to the child chain
    pub async fn is_deposit_synced(&self, root_hash: &str) -> Result<bool, ChainError> {
        let receipt = match self.root.get_transaction_receipt(root_hash).await? {
            Some(r) if r.block_number.is_some() => r,
            _ => return Ok(false),
        };

        let root_counter = state_sync_counter(&receipt)?;
        let child_counter = self.last_state_id().await?;

        debug!(
            hash = %root_hash,
            root_counter = %root_counter,
            child_counter = %child_counter,
            "Deposit sync check"
        );
        Ok(child_counter >= root_counter)
    }

    /// Child-chain burn is covered by a checkpoint on the root chain
    pub async fn is_withdrawal_synced(&self, child_hash: &str) -> Result<bool, ChainError> {
        let block = match self.child.get_transaction_receipt(child_hash).await? {
            Some(TxReceipt {
                block_number: Some(block),
                ..
            }) => block,
            _ => return Ok(false),
        };

        let checkpoint = self.checkpoints.first_checkpoint_after(block).await?;
        debug!(
            hash = %child_hash,
            block,
            checkpoint = ?checkpoint.as_ref().map(|c| &c.id),
            "Withdrawal sync check"
        );
        Ok(checkpoint.is_some())
    }

    /// Latest state id processed by the child-chain state receiver
    async fn last_state_id(&self) -> Result<BigUint, ChainError> {
        let result = self
            .child
            .call(&self.state_receiver, &abi::encode_last_state_id())
            .await?;
        parse_hex_uint(&result).map_err(|e| ChainError::Parse(format!("lastStateId: {}", e)))
    }
}

/// State-sync counter the deposit emitted on the root chain
fn state_sync_counter(receipt: &TxReceipt) -> Result<BigUint, ChainError> {
    let topic = receipt
        .logs
        .get(STATE_SYNC_LOG_INDEX)
        .and_then(|log| log.topics.get(STATE_SYNC_ID_TOPIC))
        .ok_or_else(|| ChainError::MissingLog(receipt.transaction_hash.clone()))?;
    parse_hex_uint(topic).map_err(|e| ChainError::Parse(format!("state sync id: {}", e)))
}
