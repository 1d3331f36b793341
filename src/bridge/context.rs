//! Collaborators shared by every orchestrator

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use super::checkpoint::CheckpointIndex;
use super::exit::ExitClient;
use super::rpc::ChainRpc;
use super::store::RecordStore;
use super::types::BridgeEvent;
use super::wallet::{TransactionTracker, WalletRefresher, WalletSession};

pub const DEFAULT_STATE_RECEIVER: &str = "0x0000000000000000000000000000000000001001";

fn default_state_receiver() -> String {
    DEFAULT_STATE_RECEIVER.to_string()
}

/// Bridge contract addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contracts {
    /// ERC20 on the root chain
    pub root_token: String,
    /// Mapped ERC20 on the child chain
    pub child_token: String,
    /// Root-chain entry point for `depositFor`
    pub root_chain_manager: String,
    /// Spender the root token must be approved for
    pub erc20_predicate: String,
    /// Child-chain contract exposing `lastStateId()`
    #[serde(default = "default_state_receiver")]
    pub state_receiver: String,
}

/// Everything the engine talks to
#[derive(Clone)]
pub struct Collaborators {
    pub root: Arc<dyn ChainRpc>,
    pub child: Arc<dyn ChainRpc>,
    pub checkpoints: Arc<dyn CheckpointIndex>,
    pub exit: Arc<dyn ExitClient>,
    pub store: Arc<dyn RecordStore>,
    pub wallet: Arc<dyn WalletSession>,
    pub refresher: Arc<dyn WalletRefresher>,
    pub tracker: Arc<dyn TransactionTracker>,
    pub contracts: Contracts,
}

/// Fan-out of [`BridgeEvent`]s to any number of subscribers
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<BridgeEvent>,
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: BridgeEvent) {
        if self.tx.send(event).is_err() {
            debug!("Bridge event dropped: no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::types::{Deposit, DepositStatus};
    use rust_decimal::Decimal;

    #[test]
    fn test_state_receiver_default() {
        let contracts: Contracts = serde_json::from_str(
            r#"{
                "root_token": "0x1",
                "child_token": "0x2",
                "root_chain_manager": "0x3",
                "erc20_predicate": "0x4"
            }"#,
        )
        .unwrap();
        assert_eq!(contracts.state_receiver, DEFAULT_STATE_RECEIVER);
    }

    #[tokio::test]
    async fn test_event_sink_fan_out() {
        let sink = EventSink::new(8);
        // No subscriber yet: must not panic
        sink.emit(BridgeEvent::DepositStatusChanged {
            hash: "0x0".into(),
            status: DepositStatus::Pending,
        });

        let mut a = sink.subscribe();
        let mut b = sink.subscribe();
        sink.emit(BridgeEvent::DepositSubmitted(Deposit::pending(
            "0xaa",
            "0xabc",
            Decimal::from(1),
        )));

        assert!(matches!(a.recv().await.unwrap(), BridgeEvent::DepositSubmitted(_)));
        assert!(matches!(b.recv().await.unwrap(), BridgeEvent::DepositSubmitted(_)));
    }
}
