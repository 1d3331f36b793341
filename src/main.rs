//! PoS Bridge watcher
//!
//! Resumes every PENDING deposit and withdrawal found in the record
//! snapshot and polls them until the other chain catches up.
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────┐    ┌──────────┐
//! │  Config  │───▶│ Snapshot │───▶│  Engine  │───▶│ Snapshot │
//! │  (YAML)  │    │  (load)  │    │ (watch)  │    │  (save)  │
//! └──────────┘    └──────────┘    └──────────┘    └──────────┘
//! ```

use anyhow::Context;
use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use pos_bridge::bridge::wallet::{StaticWallet, refresh_channel, tracking_channel};
use pos_bridge::bridge::{
    BridgeEngine, BridgeEvent, Collaborators, JsonRpcProvider, MemoryStore, RecordStore,
    SubgraphCheckpointIndex, UnconfiguredExitClient,
};
use pos_bridge::config::AppConfig;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

fn log_event(event: &BridgeEvent) {
    match event {
        BridgeEvent::DepositStatusChanged { hash, status } => {
            tracing::info!(hash = %hash, status = %status, "Deposit status changed")
        }
        BridgeEvent::WithdrawalStatusChanged { hash, status } => {
            tracing::info!(hash = %hash, status = %status, "Withdrawal status changed")
        }
        BridgeEvent::WatchAborted { hash, error } => {
            tracing::warn!(hash = %hash, code = error.code(), error = %error, "Watch aborted")
        }
        other => tracing::debug!(event = ?other, "Bridge event"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env).with_context(|| format!("loading config for {}", env))?;
    let _log_guard = pos_bridge::logging::init_logging(&config);

    tracing::info!("Starting PoS bridge watcher in {} mode", env);

    let root = JsonRpcProvider::new(
        &config.root.rpc_url,
        config.root.chain_id,
        config.root.timeout(),
    )?;
    let child = JsonRpcProvider::new(
        &config.child.rpc_url,
        config.child.chain_id,
        config.child.timeout(),
    )?;
    let checkpoints = SubgraphCheckpointIndex::new(
        &config.checkpoint_index.url,
        std::time::Duration::from_secs(config.checkpoint_index.timeout_secs),
    )?;

    let store = match &config.store.snapshot_path {
        Some(path) => MemoryStore::load_snapshot(Path::new(path))?,
        None => MemoryStore::new(),
    };
    let store = Arc::new(store);

    let (refresher, mut refresh_rx) = refresh_channel();
    let (tracker, mut track_rx) = tracking_channel();
    tokio::spawn(async move {
        while refresh_rx.recv().await.is_some() {
            tracing::info!("Wallet balances changed");
        }
    });
    tokio::spawn(async move {
        while let Some(request) = track_rx.recv().await {
            tracing::info!(hash = %request.hash, network = %request.network, "Tracking transaction");
        }
    });

    let collaborators = Collaborators {
        root: Arc::new(root),
        child: Arc::new(child),
        checkpoints: Arc::new(checkpoints),
        exit: Arc::new(UnconfiguredExitClient),
        store: store.clone(),
        wallet: Arc::new(StaticWallet::new(config.wallet_address.clone())),
        refresher: Arc::new(refresher),
        tracker: Arc::new(tracker),
        contracts: config.contracts.clone(),
    };
    let engine = BridgeEngine::new(collaborators, config.poll_config());

    let mut events = engine.subscribe();
    let reporter = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "Event reporter lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let watches = engine.resume_pending().await;
    tokio::select! {
        _ = join_all(watches) => {
            tracing::info!("All watches settled");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, cancelling watches");
            engine.shutdown();
        }
    }

    let pending = store.list_all().await.iter().filter(|r| r.is_pending()).count();
    tracing::info!(records = store.len(), pending, "Watcher stopped");

    if let Some(path) = &config.store.snapshot_path {
        store.save_snapshot(Path::new(path))?;
    }
    drop(engine);
    reporter.abort();

    Ok(())
}
