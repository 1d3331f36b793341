//! Checkpoint Index
//!
//! Answers "has a checkpoint covering child block N been submitted to the
//! root chain yet?" by querying a root-chain checkpoint subgraph.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::error::ChainError;

/// A committed child-chain block range
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

#[async_trait]
pub trait CheckpointIndex: Send + Sync {
    /// Earliest checkpoint whose end block is greater than `block`
    async fn first_checkpoint_after(&self, block: u64) -> Result<Option<Checkpoint>, ChainError>;
}

#[derive(Serialize)]
struct GraphQlRequest {
    query: String,
}

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<CheckpointsData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct CheckpointsData {
    checkpoints: Vec<Checkpoint>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

/// GraphQL client for the root-chain checkpoint subgraph
pub struct SubgraphCheckpointIndex {
    url: String,
    client: reqwest::Client,
}

impl SubgraphCheckpointIndex {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ChainError::RpcConnection(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            url: url.to_string(),
            client,
        })
    }

    fn query_for(block: u64) -> String {
        format!(
            "{{ checkpoints(first: 1, where: {{ end_gt: {} }}) {{ id start end }} }}",
            block
        )
    }
}

fn first_checkpoint(response: GraphQlResponse) -> Result<Option<Checkpoint>, ChainError> {
    if let Some(err) = response.errors.first() {
        return Err(ChainError::Rpc {
            code: 0,
            message: err.message.clone(),
        });
    }
    let data = response
        .data
        .ok_or_else(|| ChainError::Parse("No data in subgraph response".to_string()))?;
    Ok(data.checkpoints.into_iter().next())
}

#[async_trait]
impl CheckpointIndex for SubgraphCheckpointIndex {
    async fn first_checkpoint_after(&self, block: u64) -> Result<Option<Checkpoint>, ChainError> {
        debug!(block, "Querying checkpoint index");

        let response = self
            .client
            .post(&self.url)
            .json(&GraphQlRequest {
                query: Self::query_for(block),
            })
            .send()
            .await
            .map_err(|e| ChainError::RpcConnection(format!("Subgraph request failed: {}", e)))?;

        let body: GraphQlResponse = response
            .json()
            .await
            .map_err(|e| ChainError::Parse(format!("Failed to parse subgraph response: {}", e)))?;

        first_checkpoint(body)
    }
}
