//! PoS Bridge - root/child chain token bridge engine
//!
//! Tracks deposits, withdrawals and transfers between a root chain and a
//! checkpointed child chain, polling each bridge transaction until the
//! other side has caught up.
//!
//! # Modules
//!
//! - [`money`] - Decimal amounts and 18-decimal minimal units
//! - [`bridge`] - Orchestrators, chain state oracle, sync poller, record store
//! - [`config`] - YAML application config
//! - [`logging`] - tracing subscriber setup

pub mod bridge;
pub mod config;
pub mod logging;
pub mod money;

pub use bridge::{
    BridgeEngine, BridgeError, BridgeEvent, Collaborators, Deposit, ImportError, Network,
    PollConfig, Transfer, Withdrawal,
};
pub use money::{MoneyError, from_minimal_units, to_minimal_units};
