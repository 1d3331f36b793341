use thiserror::Error;

use super::sync::SyncError;
use crate::money::MoneyError;

/// Errors from chain-facing collaborators (RPC provider, checkpoint index,
/// bridge-exit client)
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("RPC connection failed: {0}")]
    RpcConnection(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed response: {0}")]
    Parse(String),

    #[error("Expected log missing from receipt: {0}")]
    MissingLog(String),

    #[error("No provider for chain: {0}")]
    NoProvider(String),

    #[error("Exit client error: {0}")]
    Exit(String),
}

impl ChainError {
    pub fn code(&self) -> &'static str {
        match self {
            ChainError::RpcConnection(_) => "RPC_CONNECTION",
            ChainError::Rpc { .. } => "RPC_ERROR",
            ChainError::Parse(_) => "PARSE_ERROR",
            ChainError::MissingLog(_) => "MISSING_LOG",
            ChainError::NoProvider(_) => "NO_PROVIDER",
            ChainError::Exit(_) => "EXIT_ERROR",
        }
    }
}

/// Orchestration errors
///
/// Validation errors are reported before any chain call is made.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    // === Input Errors ===
    #[error("Invalid network \"{0}\"")]
    InvalidNetwork(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Amount must be greater than zero")]
    InvalidAmount,

    // === Connectivity Errors ===
    #[error("Could not get the active wallet address")]
    NotConnected,

    // === Chain / Conversion Errors ===
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Amount conversion failed: {0}")]
    Money(#[from] MoneyError),

    #[error("Sync aborted: {0}")]
    Sync(#[from] SyncError),

    // === Record Errors ===
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

impl BridgeError {
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::InvalidNetwork(_) => "INVALID_NETWORK",
            BridgeError::InvalidAddress(_) => "INVALID_ADDRESS",
            BridgeError::InvalidAmount => "INVALID_AMOUNT",
            BridgeError::NotConnected => "NOT_CONNECTED",
            BridgeError::Chain(e) => e.code(),
            BridgeError::Money(e) => e.code(),
            BridgeError::Sync(e) => e.code(),
            BridgeError::RecordNotFound(_) => "RECORD_NOT_FOUND",
            BridgeError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
        }
    }

    /// Input errors never reached the chain; retrying unchanged is pointless
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            BridgeError::InvalidNetwork(_)
                | BridgeError::InvalidAddress(_)
                | BridgeError::InvalidAmount
                | BridgeError::Money(_)
        )
    }
}

/// Import failures, one tag per rejection reason
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    #[error("Transaction not found")]
    NotFound,

    #[error("Transaction is not a withdrawal")]
    NotWithdrawal,

    #[error("Transaction does not belong to the active address")]
    NotOwnTransaction,

    #[error("Withdrawal exit already processed")]
    AlreadyProcessed,

    #[error("{0}")]
    Other(String),
}

impl ImportError {
    /// Tag the presentation layer localizes
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::NotFound => "notFound",
            ImportError::NotWithdrawal => "notWithdrawal",
            ImportError::NotOwnTransaction => "notOwnTransaction",
            ImportError::AlreadyProcessed => "alreadyProcessed",
            ImportError::Other(_) => "other",
        }
    }
}

impl From<ChainError> for ImportError {
    fn from(e: ChainError) -> Self {
        ImportError::Other(e.to_string())
    }
}

impl From<MoneyError> for ImportError {
    fn from(e: MoneyError) -> Self {
        ImportError::Other(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(BridgeError::NotConnected.code(), "NOT_CONNECTED");
        assert_eq!(
            BridgeError::Chain(ChainError::RpcConnection("down".into())).code(),
            "RPC_CONNECTION"
        );
        assert_eq!(
            BridgeError::Money(MoneyError::NegativeAmount).code(),
            "NEGATIVE_AMOUNT"
        );
    }

    #[test]
    fn test_import_error_tags() {
        assert_eq!(ImportError::NotFound.code(), "notFound");
        assert_eq!(ImportError::NotWithdrawal.code(), "notWithdrawal");
        assert_eq!(ImportError::NotOwnTransaction.code(), "notOwnTransaction");
        assert_eq!(ImportError::AlreadyProcessed.code(), "alreadyProcessed");
        assert_eq!(ImportError::Other("boom".into()).code(), "other");
    }

    #[test]
    fn test_chain_error_into_import_other() {
        let err: ImportError = ChainError::RpcConnection("timeout".into()).into();
        assert_eq!(
            err,
            ImportError::Other("RPC connection failed: timeout".to_string())
        );
    }

    #[test]
    fn test_input_errors() {
        assert!(BridgeError::InvalidNetwork("solana".into()).is_input_error());
        assert!(BridgeError::InvalidAmount.is_input_error());
        assert!(!BridgeError::NotConnected.is_input_error());
    }
}
