//! Cross-chain token bridge orchestration
//!
//! Drives deposits (root -> child), withdrawals (child burn, checkpoint,
//! root exit), withdrawal import and plain transfers against two chains.
//!
//! # Architecture
//!
//! ```text
//! BridgeEngine ──spawn──> DepositOrchestrator ──┐
//!      │                  WithdrawalOrchestrator ├──> RecordStore (canonical)
//!      │                  WithdrawalImporter     │
//!      │                  TransferOrchestrator ──┘
//!      │                         │
//!      │                   wait_for_sync ──> ChainStateOracle ──> ChainRpc x2
//!      │                                                     └──> CheckpointIndex
//!      └── broadcast<BridgeEvent> ──> host
//! ```
//!
//! Chains, the checkpoint index, the exit client and the wallet are all
//! trait seams; the engine owns none of their state.

pub mod abi;
pub mod checkpoint;
pub mod context;
pub mod deposit;
pub mod engine;
pub mod error;
pub mod exit;
pub mod import;
pub mod oracle;
pub mod rpc;
pub mod store;
pub mod sync;
pub mod transfer;
pub mod types;
pub mod wallet;
pub mod withdrawal;

#[cfg(test)]
pub(crate) mod mock;

pub use checkpoint::{Checkpoint, CheckpointIndex, SubgraphCheckpointIndex};
pub use context::{Collaborators, Contracts, EventSink};
pub use engine::BridgeEngine;
pub use error::{BridgeError, ChainError, ImportError};
pub use exit::{ExitCheck, ExitClient, UnconfiguredExitClient};
pub use import::ImportOutcome;
pub use oracle::ChainStateOracle;
pub use rpc::{ChainRpc, JsonRpcProvider};
pub use store::{MemoryStore, RecordStore};
pub use sync::{PollConfig, SyncError, wait_for_sync};
pub use types::{
    BridgeEvent, BridgeRecord, Deposit, DepositStatus, Network, RecordKind, Transfer,
    TransferStatus, Withdrawal, WithdrawalStatus,
};
