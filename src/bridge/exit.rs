//! Bridge-exit client seam.
//!
//! Building the checkpoint inclusion proof and the root-chain exit call is
//! the exit client's job; the engine only drives it.

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::warn;

use super::error::ChainError;

#[async_trait]
pub trait ExitClient: Send + Sync {
    /// Submit the ERC20 exit for `burn_hash` from `from`.
    ///
    /// The root-chain hash must be sent on `on_broadcast` as soon as the exit
    /// transaction is broadcast, before it is mined. Resolves with the same
    /// hash once the exit call completes.
    async fn exit_erc20(
        &self,
        burn_hash: &str,
        from: &str,
        on_broadcast: oneshot::Sender<String>,
    ) -> Result<String, ChainError>;

    /// Whether the exit for `burn_hash` has already been processed on the
    /// root chain
    async fn is_exit_processed(&self, burn_hash: &str) -> Result<bool, ChainError>;
}

/// Outcome of asking the exit client whether an exit was processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitCheck {
    Processed,
    NotProcessed,
    /// The query failed; nothing is known
    Unknown(String),
}

impl ExitCheck {
    pub fn is_processed(&self) -> bool {
        matches!(self, ExitCheck::Processed)
    }
}

/// Stand-in for hosts that only watch: finalize and processed checks fail
#[derive(Debug, Default)]
pub struct UnconfiguredExitClient;

#[async_trait]
impl ExitClient for UnconfiguredExitClient {
    async fn exit_erc20(
        &self,
        _burn_hash: &str,
        _from: &str,
        _on_broadcast: oneshot::Sender<String>,
    ) -> Result<String, ChainError> {
        Err(ChainError::NoProvider("bridge exit client".to_string()))
    }

    async fn is_exit_processed(&self, _burn_hash: &str) -> Result<bool, ChainError> {
        Err(ChainError::NoProvider("bridge exit client".to_string()))
    }
}

/// Query the exit client, keeping a failed query distinct from a "no"
pub async fn check_exit(client: &dyn ExitClient, burn_hash: &str) -> ExitCheck {
    match client.is_exit_processed(burn_hash).await {
        Ok(true) => ExitCheck::Processed,
        Ok(false) => ExitCheck::NotProcessed,
        Err(e) => {
            warn!(hash = %burn_hash, error = %e, "Exit processed check failed");
            ExitCheck::Unknown(e.to_string())
        }
    }
}
