//! Wallet-side collaborators: the active session, the balance-refresh
//! signal and the transaction-history tracker.

use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::debug;

use super::types::Network;

/// Connected wallet session
pub trait WalletSession: Send + Sync {
    /// Active address, `None` while disconnected
    fn address(&self) -> Option<String>;
}

/// Fire-and-forget "balances changed" notification
pub trait WalletRefresher: Send + Sync {
    fn refresh(&self);
}

/// What a tracked transaction did, for the generic history log
#[derive(Debug, Clone, PartialEq)]
pub enum TrackedAction {
    InitiateWithdrawal { amount: Decimal, chain_id: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackRequest {
    pub address: String,
    pub hash: String,
    pub network: Network,
    pub action: TrackedAction,
}

/// Asynchronous request to follow a transaction in the history log
pub trait TransactionTracker: Send + Sync {
    fn track(&self, request: TrackRequest);
}

/// Session with a fixed address
#[derive(Debug, Clone, Default)]
pub struct StaticWallet {
    address: Option<String>,
}

impl StaticWallet {
    pub fn new(address: Option<String>) -> Self {
        Self { address }
    }
}

impl WalletSession for StaticWallet {
    fn address(&self) -> Option<String> {
        self.address.clone()
    }
}

/// Refresh signal delivered over an unbounded channel
#[derive(Debug, Clone)]
pub struct RefreshChannel {
    tx: mpsc::UnboundedSender<()>,
}

pub fn refresh_channel() -> (RefreshChannel, mpsc::UnboundedReceiver<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RefreshChannel { tx }, rx)
}

impl WalletRefresher for RefreshChannel {
    fn refresh(&self) {
        if self.tx.send(()).is_err() {
            debug!("Wallet refresh dropped: no listener");
        }
    }
}

/// Track requests delivered over an unbounded channel
#[derive(Debug, Clone)]
pub struct TrackingChannel {
    tx: mpsc::UnboundedSender<TrackRequest>,
}

pub fn tracking_channel() -> (TrackingChannel, mpsc::UnboundedReceiver<TrackRequest>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TrackingChannel { tx }, rx)
}

impl TransactionTracker for TrackingChannel {
    fn track(&self, request: TrackRequest) {
        if let Err(e) = self.tx.send(request) {
            debug!(hash = %e.0.hash, "Track request dropped: no listener");
        }
    }
}
