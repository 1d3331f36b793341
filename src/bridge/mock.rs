//! Mock collaborators for testing

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

use super::abi;
use super::checkpoint::{Checkpoint, CheckpointIndex};
use super::context::{Collaborators, Contracts, DEFAULT_STATE_RECEIVER};
use super::error::ChainError;
use super::exit::ExitClient;
use super::oracle::ChainStateOracle;
use super::rpc::{ChainRpc, Log, RawTransaction, TxReceipt, TxRequest};
use super::store::MemoryStore;
use super::sync::PollConfig;
use super::wallet::{TrackRequest, TransactionTracker, WalletRefresher, WalletSession};

pub const USER: &str = "0xd8da6bf26964af9d7eed9e03e53415d37aa96045";
pub const OTHER_USER: &str = "0x1111111111111111111111111111111111111111";

/// Receipt with the StateSynced event at log index 2
pub fn deposit_receipt(hash: &str, block: u64, counter: u64) -> TxReceipt {
    let log = |topics: Vec<String>| Log {
        address: "0x28e4f3a7f651294b9564800b2d01f35189a5bfbe".to_string(),
        topics,
        data: "0x".to_string(),
    };
    TxReceipt {
        transaction_hash: hash.to_string(),
        block_number: Some(block),
        logs: vec![
            log(vec!["0xapproval".to_string()]),
            log(vec!["0xlocked".to_string()]),
            log(vec![
                "0x103fed9db65eac19c4d870f49ab7520fe03b99f1838e5996caf47e9e43308392".to_string(),
                format!("0x{:064x}", counter),
            ]),
        ],
    }
}

// ============================================================================
// Chain
// ============================================================================

pub struct MockChain {
    chain_id: u64,
    receipts: Mutex<HashMap<String, TxReceipt>>,
    transactions: Mutex<HashMap<String, RawTransaction>>,
    last_state_id: Mutex<String>,
    call_results: Mutex<HashMap<String, String>>,
    next_hashes: Mutex<VecDeque<String>>,
    sent: Mutex<Vec<TxRequest>>,
    fail_send: AtomicBool,
    fail_queries: AtomicBool,
    send_count: AtomicUsize,
}

impl MockChain {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            receipts: Mutex::new(HashMap::new()),
            transactions: Mutex::new(HashMap::new()),
            last_state_id: Mutex::new(format!("0x{:064x}", 0)),
            call_results: Mutex::new(HashMap::new()),
            next_hashes: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            fail_send: AtomicBool::new(false),
            fail_queries: AtomicBool::new(false),
            send_count: AtomicUsize::new(0),
        }
    }

    pub fn set_receipt(&self, receipt: TxReceipt) {
        self.receipts
            .lock()
            .unwrap()
            .insert(receipt.transaction_hash.clone(), receipt);
    }

    pub fn set_transaction(&self, tx: RawTransaction) {
        self.transactions.lock().unwrap().insert(tx.hash.clone(), tx);
    }

    pub fn set_last_state_id(&self, id: u64) {
        self.set_last_state_id_hex(format!("0x{:064x}", id));
    }

    pub fn set_last_state_id_hex(&self, hex: String) {
        *self.last_state_id.lock().unwrap() = hex;
    }

    pub fn set_call_result(&self, data: &str, result: &str) {
        self.call_results
            .lock()
            .unwrap()
            .insert(data.to_string(), result.to_string());
    }

    /// Hash returned by the next `send_transaction`
    pub fn push_next_hash(&self, hash: &str) {
        self.next_hashes.lock().unwrap().push_back(hash.to_string());
    }

    pub fn set_fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn send_count(&self) -> usize {
        self.send_count.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<TxRequest> {
        self.sent.lock().unwrap().clone()
    }

    fn check_queries(&self) -> Result<(), ChainError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            Err(ChainError::RpcConnection("mock node unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ChainRpc for MockChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn get_transaction_receipt(
        &self,
        hash: &str,
    ) -> Result<Option<TxReceipt>, ChainError> {
        self.check_queries()?;
        Ok(self.receipts.lock().unwrap().get(hash).cloned())
    }

    async fn get_transaction(&self, hash: &str) -> Result<Option<RawTransaction>, ChainError> {
        self.check_queries()?;
        Ok(self.transactions.lock().unwrap().get(hash).cloned())
    }

    async fn call(&self, _to: &str, data: &str) -> Result<String, ChainError> {
        self.check_queries()?;
        if data == abi::encode_last_state_id() {
            return Ok(self.last_state_id.lock().unwrap().clone());
        }
        self.call_results
            .lock()
            .unwrap()
            .get(data)
            .cloned()
            .ok_or_else(|| ChainError::Rpc {
                code: -32000,
                message: "execution reverted".to_string(),
            })
    }

    async fn send_transaction(&self, tx: TxRequest) -> Result<String, ChainError> {
        let n = self.send_count.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(ChainError::Rpc {
                code: 4001,
                message: "User denied transaction signature".to_string(),
            });
        }
        self.sent.lock().unwrap().push(tx);
        let hash = self
            .next_hashes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| format!("0x{:064x}", n));
        Ok(hash)
    }
}

// ============================================================================
// Checkpoint index
// ============================================================================

pub struct MockCheckpointIndex {
    latest_end: Mutex<Option<u64>>,
    failing: AtomicBool,
}

impl MockCheckpointIndex {
    pub fn new() -> Self {
        Self {
            latest_end: Mutex::new(None),
            failing: AtomicBool::new(false),
        }
    }

    /// End block of the newest submitted checkpoint
    pub fn set_latest_end(&self, end: u64) {
        *self.latest_end.lock().unwrap() = Some(end);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl CheckpointIndex for MockCheckpointIndex {
    async fn first_checkpoint_after(&self, block: u64) -> Result<Option<Checkpoint>, ChainError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChainError::RpcConnection("subgraph down".to_string()));
        }
        Ok(match *self.latest_end.lock().unwrap() {
            Some(end) if end > block => Some(Checkpoint {
                id: "cp-1".to_string(),
                start: Some("0".to_string()),
                end: Some(end.to_string()),
            }),
            _ => None,
        })
    }
}

// ============================================================================
// Exit client
// ============================================================================

/// How `MockExitClient::exit_erc20` interleaves the broadcast with its result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitMode {
    /// Broadcast, yield a few times, then resolve
    BroadcastThenYield,
    /// Broadcast and resolve without yielding in between
    SamePoll,
    /// Drop the broadcast sender unused, then resolve
    NoBroadcast,
}

pub struct MockExitClient {
    finalize_hash: String,
    mode: Mutex<ExitMode>,
    processed: AtomicBool,
    processed_error: Mutex<Option<String>>,
    /// Broadcast the hash, then fail the exit with this message
    exit_error: Mutex<Option<String>>,
    exit_calls: AtomicUsize,
}

impl MockExitClient {
    pub fn new(finalize_hash: &str) -> Self {
        Self {
            finalize_hash: finalize_hash.to_string(),
            mode: Mutex::new(ExitMode::BroadcastThenYield),
            processed: AtomicBool::new(false),
            processed_error: Mutex::new(None),
            exit_error: Mutex::new(None),
            exit_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_processed(&self, processed: bool) {
        self.processed.store(processed, Ordering::SeqCst);
    }

    pub fn set_processed_error(&self, error: Option<&str>) {
        *self.processed_error.lock().unwrap() = error.map(str::to_string);
    }

    pub fn set_exit_mode(&self, mode: ExitMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn set_exit_error(&self, error: Option<&str>) {
        *self.exit_error.lock().unwrap() = error.map(str::to_string);
    }

    pub fn exit_calls(&self) -> usize {
        self.exit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExitClient for MockExitClient {
    async fn exit_erc20(
        &self,
        _burn_hash: &str,
        _from: &str,
        on_broadcast: oneshot::Sender<String>,
    ) -> Result<String, ChainError> {
        self.exit_calls.fetch_add(1, Ordering::SeqCst);
        let mode = *self.mode.lock().unwrap();
        match mode {
            ExitMode::BroadcastThenYield => {
                let _ = on_broadcast.send(self.finalize_hash.clone());
                // Let the orchestrator observe the broadcast before resolving
                for _ in 0..3 {
                    tokio::task::yield_now().await;
                }
            }
            ExitMode::SamePoll => {
                let _ = on_broadcast.send(self.finalize_hash.clone());
            }
            ExitMode::NoBroadcast => {
                drop(on_broadcast);
                tokio::task::yield_now().await;
            }
        }

        let exit_error = self.exit_error.lock().unwrap().clone();
        match exit_error {
            Some(message) => Err(ChainError::Exit(message)),
            None => Ok(self.finalize_hash.clone()),
        }
    }

    async fn is_exit_processed(&self, _burn_hash: &str) -> Result<bool, ChainError> {
        let processed_error = self.processed_error.lock().unwrap().clone();
        if let Some(message) = processed_error {
            return Err(ChainError::Exit(message));
        }
        Ok(self.processed.load(Ordering::SeqCst))
    }
}

// ============================================================================
// Wallet collaborators
// ============================================================================

pub struct MockWallet {
    address: Mutex<Option<String>>,
}

impl MockWallet {
    pub fn connected(address: &str) -> Self {
        Self {
            address: Mutex::new(Some(address.to_string())),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            address: Mutex::new(None),
        }
    }
}

impl WalletSession for MockWallet {
    fn address(&self) -> Option<String> {
        self.address.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct MockRefresher {
    count: AtomicUsize,
}

impl MockRefresher {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl WalletRefresher for MockRefresher {
    fn refresh(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockTracker {
    requests: Mutex<Vec<TrackRequest>>,
}

impl MockTracker {
    pub fn requests(&self) -> Vec<TrackRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl TransactionTracker for MockTracker {
    fn track(&self, request: TrackRequest) {
        self.requests.lock().unwrap().push(request);
    }
}

// ============================================================================
// Harness
// ============================================================================

pub const ROOT_TOKEN: &str = "0x655f2166b0709cd575202630952d71e2bb0d61af";
pub const CHILD_TOKEN: &str = "0xfe4f5145f6e09952a5ba9e956ed0c25e3fa4c7f1";
pub const ROOT_CHAIN_MANAGER: &str = "0xbbd7cbfa79faee899eaf900f13c9065bf03b1a74";
pub const ERC20_PREDICATE: &str = "0xdd6596f2029e6233deffaca316e6a95217d4dc34";

pub fn contracts() -> Contracts {
    Contracts {
        root_token: ROOT_TOKEN.to_string(),
        child_token: CHILD_TOKEN.to_string(),
        root_chain_manager: ROOT_CHAIN_MANAGER.to_string(),
        erc20_predicate: ERC20_PREDICATE.to_string(),
        state_receiver: DEFAULT_STATE_RECEIVER.to_string(),
    }
}

pub fn fast_poll() -> PollConfig {
    PollConfig::with_interval(Duration::from_millis(5))
}

/// Full set of mocks wired the way the engine expects them
pub struct Harness {
    pub root: Arc<MockChain>,
    pub child: Arc<MockChain>,
    pub index: Arc<MockCheckpointIndex>,
    pub exit: Arc<MockExitClient>,
    pub store: Arc<MemoryStore>,
    pub wallet: Arc<MockWallet>,
    pub refresher: Arc<MockRefresher>,
    pub tracker: Arc<MockTracker>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_wallet(MockWallet::connected(USER))
    }

    pub fn disconnected() -> Self {
        Self::with_wallet(MockWallet::disconnected())
    }

    fn with_wallet(wallet: MockWallet) -> Self {
        Self {
            root: Arc::new(MockChain::new(1)),
            child: Arc::new(MockChain::new(137)),
            index: Arc::new(MockCheckpointIndex::new()),
            exit: Arc::new(MockExitClient::new("0xcc")),
            store: Arc::new(MemoryStore::new()),
            wallet: Arc::new(wallet),
            refresher: Arc::new(MockRefresher::default()),
            tracker: Arc::new(MockTracker::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            root: self.root.clone(),
            child: self.child.clone(),
            checkpoints: self.index.clone(),
            exit: self.exit.clone(),
            store: self.store.clone(),
            wallet: self.wallet.clone(),
            refresher: self.refresher.clone(),
            tracker: self.tracker.clone(),
            contracts: contracts(),
        }
    }

    pub fn oracle(&self) -> Arc<ChainStateOracle> {
        Arc::new(ChainStateOracle::new(
            self.root.clone(),
            self.child.clone(),
            self.index.clone(),
            DEFAULT_STATE_RECEIVER,
        ))
    }

    /// Mined child-chain burn at `block`
    pub fn mine_burn(&self, hash: &str, block: u64) {
        self.child.set_receipt(TxReceipt {
            transaction_hash: hash.to_string(),
            block_number: Some(block),
            logs: vec![],
        });
    }
}
