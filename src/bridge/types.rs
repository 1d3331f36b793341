//! Bridge Record Types
//!
//! Deposit, Withdrawal and Transfer records plus their status machines.
//! Status enums only ever move forward; `can_advance_to` is the single
//! place that rule lives.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::{BridgeError, ImportError};

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ============================================================================
// Network
// ============================================================================

/// Which side of the bridge a call targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Base ledger funds originate from (e.g. Ethereum)
    Root,
    /// Checkpointed ledger (e.g. Polygon)
    Child,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Root => "root",
            Network::Child => "child",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Network {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "root" | "ethereum" => Ok(Network::Root),
            "child" | "matic" | "polygon" => Ok(Network::Child),
            _ => Err(BridgeError::InvalidNetwork(s.to_string())),
        }
    }
}

// ============================================================================
// Status machines
// ============================================================================

/// Deposit: PENDING -> COMPLETE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepositStatus {
    Pending,
    Complete,
}

impl DepositStatus {
    #[inline]
    pub fn rank(&self) -> u8 {
        match self {
            DepositStatus::Pending => 0,
            DepositStatus::Complete => 1,
        }
    }

    #[inline]
    pub fn can_advance_to(&self, next: DepositStatus) -> bool {
        next.rank() > self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DepositStatus::Pending => "PENDING",
            DepositStatus::Complete => "COMPLETE",
        }
    }
}

impl fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Withdrawal: PENDING -> CHECKPOINT -> COMPLETE
///
/// A failed finalize leaves the record in CHECKPOINT so it can be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    /// Burn broadcast on the child chain, waiting for a checkpoint
    Pending,
    /// Covered by a checkpoint, exit may be finalized on the root chain
    Checkpoint,
    /// Exit executed on the root chain
    Complete,
}

impl WithdrawalStatus {
    #[inline]
    pub fn rank(&self) -> u8 {
        match self {
            WithdrawalStatus::Pending => 0,
            WithdrawalStatus::Checkpoint => 1,
            WithdrawalStatus::Complete => 2,
        }
    }

    #[inline]
    pub fn can_advance_to(&self, next: WithdrawalStatus) -> bool {
        next.rank() > self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "PENDING",
            WithdrawalStatus::Checkpoint => "CHECKPOINT",
            WithdrawalStatus::Complete => "COMPLETE",
        }
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Pending,
    Confirmed,
}

impl TransferStatus {
    #[inline]
    pub fn rank(&self) -> u8 {
        match self {
            TransferStatus::Pending => 0,
            TransferStatus::Confirmed => 1,
        }
    }

    #[inline]
    pub fn can_advance_to(&self, next: TransferStatus) -> bool {
        next.rank() > self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Confirmed => "CONFIRMED",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Records
// ============================================================================

/// Root-chain deposit into the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deposit {
    /// Root-chain transaction hash
    pub hash: String,
    pub from: String,
    pub amount: Decimal,
    pub status: DepositStatus,
    pub timestamp: i64,
}

impl Deposit {
    pub fn pending(hash: impl Into<String>, from: impl Into<String>, amount: Decimal) -> Self {
        Self {
            hash: hash.into(),
            from: from.into(),
            amount,
            status: DepositStatus::Pending,
            timestamp: now_millis(),
        }
    }

    /// Move forward to `next`; returns false (and changes nothing) otherwise
    pub fn advance(&mut self, next: DepositStatus) -> bool {
        if self.status.can_advance_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }
}

/// Child-chain burn plus its root-chain exit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withdrawal {
    /// Child-chain burn transaction hash
    pub initialize_hash: String,
    /// Root-chain exit transaction hash, set once at broadcast
    pub finalize_hash: Option<String>,
    pub from: String,
    pub amount: Decimal,
    pub status: WithdrawalStatus,
    pub timestamp: i64,
}

impl Withdrawal {
    pub fn pending(
        initialize_hash: impl Into<String>,
        from: impl Into<String>,
        amount: Decimal,
    ) -> Self {
        Self {
            initialize_hash: initialize_hash.into(),
            finalize_hash: None,
            from: from.into(),
            amount,
            status: WithdrawalStatus::Pending,
            timestamp: now_millis(),
        }
    }

    pub fn advance(&mut self, next: WithdrawalStatus) -> bool {
        if self.status.can_advance_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    /// Attach the exit hash. Only the first hash sticks.
    pub fn set_finalize_hash(&mut self, hash: impl Into<String>) -> bool {
        if self.finalize_hash.is_some() {
            return false;
        }
        self.finalize_hash = Some(hash.into());
        true
    }
}

/// Direct token transfer on one chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub hash: String,
    pub network: Network,
    pub chain_id: u64,
    pub amount: Decimal,
    pub to: String,
    pub status: TransferStatus,
    pub timestamp: i64,
}

// ============================================================================
// Tagged record union
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Deposit,
    Withdrawal,
    Transfer,
}

/// One canonical record, keyed by its primary hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BridgeRecord {
    Deposit(Deposit),
    Withdrawal(Withdrawal),
    Transfer(Transfer),
}

impl BridgeRecord {
    pub fn key(&self) -> &str {
        match self {
            BridgeRecord::Deposit(d) => &d.hash,
            BridgeRecord::Withdrawal(w) => &w.initialize_hash,
            BridgeRecord::Transfer(t) => &t.hash,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            BridgeRecord::Deposit(_) => RecordKind::Deposit,
            BridgeRecord::Withdrawal(_) => RecordKind::Withdrawal,
            BridgeRecord::Transfer(_) => RecordKind::Transfer,
        }
    }

    pub fn is_pending(&self) -> bool {
        match self {
            BridgeRecord::Deposit(d) => d.status == DepositStatus::Pending,
            BridgeRecord::Withdrawal(w) => w.status == WithdrawalStatus::Pending,
            BridgeRecord::Transfer(t) => t.status == TransferStatus::Pending,
        }
    }
}

impl From<Deposit> for BridgeRecord {
    fn from(d: Deposit) -> Self {
        BridgeRecord::Deposit(d)
    }
}

impl From<Withdrawal> for BridgeRecord {
    fn from(w: Withdrawal) -> Self {
        BridgeRecord::Withdrawal(w)
    }
}

impl From<Transfer> for BridgeRecord {
    fn from(t: Transfer) -> Self {
        BridgeRecord::Transfer(t)
    }
}

// ============================================================================
// Events
// ============================================================================

/// Everything the engine reports to its host.
///
/// Failure variants carry the original request parameters so the caller
/// can retry the same intent.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    DepositSubmitted(Deposit),
    DepositFailed { amount: Decimal, error: BridgeError },
    DepositStatusChanged { hash: String, status: DepositStatus },

    ApproveSubmitted { amount: Decimal, hash: String },
    ApproveFailed { amount: Decimal, error: BridgeError },

    WithdrawalInitiated(Withdrawal),
    WithdrawalFailed { amount: Decimal, error: BridgeError },
    WithdrawalStatusChanged { hash: String, status: WithdrawalStatus },
    FinalizeHashAttached { initialize_hash: String, finalize_hash: String },
    WithdrawalFinalized(Withdrawal),
    FinalizeFailed { withdrawal: Withdrawal, error: BridgeError },

    WithdrawalImported(Withdrawal),
    ImportFailed { tx_hash: String, error: ImportError },

    TransferConfirmed(Transfer),
    TransferFailed {
        to: String,
        amount: Decimal,
        network: String,
        error: BridgeError,
    },

    /// A status watch stopped without reaching its target state
    WatchAborted { hash: String, error: BridgeError },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_parsing() {
        assert_eq!("root".parse::<Network>().unwrap(), Network::Root);
        assert_eq!("ETHEREUM".parse::<Network>().unwrap(), Network::Root);
        assert_eq!("matic".parse::<Network>().unwrap(), Network::Child);
        assert_eq!("polygon".parse::<Network>().unwrap(), Network::Child);

        let err = "solana".parse::<Network>().unwrap_err();
        assert!(matches!(err, BridgeError::InvalidNetwork(ref n) if n == "solana"));
    }

    #[test]
    fn test_withdrawal_status_never_regresses() {
        let mut w = Withdrawal::pending("0xbb", "0xabc", Decimal::from(50));

        assert!(w.advance(WithdrawalStatus::Checkpoint));
        assert!(!w.advance(WithdrawalStatus::Pending));
        assert!(!w.advance(WithdrawalStatus::Checkpoint));
        assert_eq!(w.status, WithdrawalStatus::Checkpoint);

        assert!(w.advance(WithdrawalStatus::Complete));
        assert!(!w.advance(WithdrawalStatus::Checkpoint));
        assert_eq!(w.status, WithdrawalStatus::Complete);
    }

    #[test]
    fn test_status_sequence_is_prefix_of_forward_order() {
        let events = [
            WithdrawalStatus::Checkpoint,
            WithdrawalStatus::Pending,
            WithdrawalStatus::Complete,
            WithdrawalStatus::Checkpoint,
        ];
        let mut w = Withdrawal::pending("0xbb", "0xabc", Decimal::from(50));
        let mut observed = vec![w.status];
        for e in events {
            if w.advance(e) {
                observed.push(w.status);
            }
        }
        assert_eq!(
            observed,
            vec![
                WithdrawalStatus::Pending,
                WithdrawalStatus::Checkpoint,
                WithdrawalStatus::Complete
            ]
        );
    }

    #[test]
    fn test_finalize_hash_set_once() {
        let mut w = Withdrawal::pending("0xbb", "0xabc", Decimal::from(50));
        assert!(w.set_finalize_hash("0xcc"));
        assert!(!w.set_finalize_hash("0xdd"));
        assert_eq!(w.finalize_hash.as_deref(), Some("0xcc"));
    }

    #[test]
    fn test_deposit_advance() {
        let mut d = Deposit::pending("0xaa", "0xabc", Decimal::from(100));
        assert!(d.advance(DepositStatus::Complete));
        assert!(!d.advance(DepositStatus::Pending));
        assert_eq!(d.status.to_string(), "COMPLETE");
    }

    #[test]
    fn test_transfer_status_forward_only() {
        assert!(TransferStatus::Pending.can_advance_to(TransferStatus::Confirmed));
        assert!(!TransferStatus::Confirmed.can_advance_to(TransferStatus::Pending));
        assert!(!TransferStatus::Confirmed.can_advance_to(TransferStatus::Confirmed));
    }

    #[test]
    fn test_record_tagged_serialization() {
        let record = BridgeRecord::from(Deposit::pending("0xaa", "0xabc", Decimal::from(100)));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "deposit");
        assert_eq!(json["status"], "PENDING");

        let back: BridgeRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.key(), "0xaa");
        assert!(back.is_pending());
    }
}
