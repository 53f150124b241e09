//! In-memory stand-ins for chains, signers and adapters used across unit tests

use crate::chain::ethereum::{EvmNode, Payment, SendOutcome};
use crate::chain::neo::{Broadcast, NeoNode};
use crate::chain::ChainAdapter;
use crate::error::{BridgeError, BridgeResult};
use crate::native::{NativeChain, NativeTxStatus};
use crate::oracle::BlockSource;
use crate::signer::{SignRequest, SignedTransaction, TransactionSigner};
use crate::state::SwapRepository;
use crate::types::{
    ChainSwap, DeliveryStatus, Hash, InteropBlock, InteropTransaction, InteropTransfer,
    PendingSwap, TokenAmount,
};

use async_trait::async_trait;
use ethers::types::{H256, U256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn deposit(from: &str, to: &str, interop: &str, value: u64) -> InteropTransfer {
    InteropTransfer {
        source_address: from.to_string(),
        destination_address: to.to_string(),
        interop_address: interop.to_string(),
        amount: TokenAmount::new("SOUL", U256::from(value), 8),
    }
}

fn sequential_hash(tag: u8, n: u64) -> Hash {
    let mut bytes = [tag; 32];
    bytes[24..].copy_from_slice(&n.to_be_bytes());
    Hash(bytes)
}

#[derive(Default)]
struct ChainData {
    blocks: HashMap<u64, Vec<Hash>>,
    transactions: HashMap<Hash, Vec<InteropTransfer>>,
    failures: HashMap<u64, u32>,
    fetches: HashMap<u64, u32>,
}

/// Scripted foreign chain behind the oracle
pub struct FakeBlockSource {
    platform: String,
    data: Mutex<ChainData>,
}

impl FakeBlockSource {
    pub fn new(platform: &str) -> Self {
        Self {
            platform: platform.to_string(),
            data: Mutex::new(ChainData::default()),
        }
    }

    pub fn add_block(&self, height: u64, transactions: Vec<Hash>) {
        self.data.lock().unwrap().blocks.insert(height, transactions);
    }

    pub fn add_transaction(&self, hash: Hash, transfers: Vec<InteropTransfer>) {
        self.data.lock().unwrap().transactions.insert(hash, transfers);
    }

    /// Make the next `times` fetches of `height` fail
    pub fn fail_block(&self, height: u64, times: u32) {
        self.data.lock().unwrap().failures.insert(height, times);
    }

    pub fn block_fetches(&self, height: u64) -> u32 {
        self.data
            .lock()
            .unwrap()
            .fetches
            .get(&height)
            .copied()
            .unwrap_or(0)
    }

    fn unavailable(&self, message: String) -> BridgeError {
        BridgeError::Oracle {
            platform: self.platform.clone(),
            message,
        }
    }
}

#[async_trait]
impl BlockSource for FakeBlockSource {
    async fn fetch_block(&self, height: u64) -> BridgeResult<InteropBlock> {
        let mut data = self.data.lock().unwrap();
        *data.fetches.entry(height).or_default() += 1;

        if let Some(remaining) = data.failures.get_mut(&height) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(self.unavailable(format!("block {} unavailable", height)));
            }
        }

        let transactions = data
            .blocks
            .get(&height)
            .cloned()
            .ok_or_else(|| self.unavailable(format!("block {} not produced", height)))?;
        Ok(InteropBlock {
            platform: self.platform.clone(),
            height,
            hash: sequential_hash(0xb0, height),
            transactions,
        })
    }

    async fn fetch_transaction(&self, hash: &Hash) -> BridgeResult<InteropTransaction> {
        let transfers = self
            .data
            .lock()
            .unwrap()
            .transactions
            .get(hash)
            .cloned()
            .ok_or_else(|| self.unavailable(format!("transaction {} not found", hash)))?;
        Ok(InteropTransaction {
            platform: self.platform.clone(),
            hash: *hash,
            transfers,
        })
    }
}

/// Signing service returning sequential hashes; `raw` is the hash itself
pub struct FakeSigner {
    address: String,
    signed: AtomicU64,
    last: Mutex<Option<Hash>>,
    requests: Mutex<Vec<SignRequest>>,
}

impl FakeSigner {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            signed: AtomicU64::new(0),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn last_hash(&self) -> Option<Hash> {
        *self.last.lock().unwrap()
    }

    pub fn requests(&self) -> Vec<SignRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionSigner for FakeSigner {
    async fn address(&self, _platform: &str, _key: &str) -> BridgeResult<String> {
        Ok(self.address.clone())
    }

    async fn sign(
        &self,
        _platform: &str,
        _key: &str,
        request: &SignRequest,
    ) -> BridgeResult<SignedTransaction> {
        let n = self.signed.fetch_add(1, Ordering::SeqCst) + 1;
        let hash = sequential_hash(0x5e, n);
        *self.last.lock().unwrap() = Some(hash);
        self.requests.lock().unwrap().push(request.clone());
        Ok(SignedTransaction {
            hash,
            raw: hash.to_string(),
        })
    }
}

#[derive(Default)]
struct NeoChainState {
    height: u64,
    included: HashMap<Hash, u64>,
    mempools: HashMap<String, HashSet<Hash>>,
    broadcasts: usize,
    include_on_broadcast: bool,
    lose_replies: bool,
    refuse: bool,
}

/// Neo RPC double; a broadcast always lands on `http://seed1:10332`
pub struct FakeNeoNode {
    state: Mutex<NeoChainState>,
}

impl FakeNeoNode {
    pub const ENDPOINT: &'static str = "http://seed1:10332";

    pub fn new() -> Self {
        Self {
            state: Mutex::new(NeoChainState {
                height: 1000,
                ..NeoChainState::default()
            }),
        }
    }

    /// Include broadcast transactions in the next block immediately
    pub fn include_on_broadcast(&self, include: bool) {
        self.state.lock().unwrap().include_on_broadcast = include;
    }

    pub fn confirm(&self, hash: Hash, height: u64) {
        self.state.lock().unwrap().included.insert(hash, height);
    }

    pub fn add_to_mempool(&self, endpoint: &str, hash: Hash) {
        self.state
            .lock()
            .unwrap()
            .mempools
            .entry(endpoint.to_string())
            .or_default()
            .insert(hash);
    }

    /// Accept broadcasts but drop the reply, as a timed-out request would
    pub fn lose_replies(&self, lose: bool) {
        self.state.lock().unwrap().lose_replies = lose;
    }

    /// Answer every broadcast with a refusal
    pub fn refuse_broadcasts(&self, refuse: bool) {
        self.state.lock().unwrap().refuse = refuse;
    }

    /// Transactions the node took in
    pub fn broadcasts(&self) -> usize {
        self.state.lock().unwrap().broadcasts
    }
}

#[async_trait]
impl NeoNode for FakeNeoNode {
    async fn block_count(&self) -> BridgeResult<u64> {
        Ok(self.state.lock().unwrap().height + 1)
    }

    async fn transaction_height(&self, hash: &Hash) -> BridgeResult<Option<u64>> {
        Ok(self.state.lock().unwrap().included.get(hash).copied())
    }

    async fn mempool(&self, endpoint: &str) -> BridgeResult<Vec<Hash>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .mempools
            .get(endpoint)
            .map(|pool| pool.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn broadcast(&self, raw: &str) -> Broadcast {
        let Ok(hash) = raw.parse::<Hash>() else {
            return Broadcast::Refused;
        };
        let mut state = self.state.lock().unwrap();
        if state.refuse {
            return Broadcast::Refused;
        }
        state.broadcasts += 1;
        if state.include_on_broadcast {
            let height = state.height + 1;
            state.included.insert(hash, height);
        } else {
            state
                .mempools
                .entry(Self::ENDPOINT.to_string())
                .or_default()
                .insert(hash);
        }
        if state.lose_replies {
            Broadcast::Unconfirmed(Self::ENDPOINT.to_string())
        } else {
            Broadcast::Accepted(Self::ENDPOINT.to_string())
        }
    }
}

#[derive(Default)]
struct EvmState {
    height: u64,
    receipt: Option<bool>,
    payments: Vec<Payment>,
    last_tx: Option<H256>,
    fail_sends: bool,
    lose_replies: bool,
}

/// Ethereum node double recording every payment it is asked to send
#[derive(Default)]
pub struct FakeEvmNode {
    state: Mutex<EvmState>,
}

impl FakeEvmNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receipt status reported for every transaction
    pub fn set_receipt(&self, success: bool) {
        self.state.lock().unwrap().receipt = Some(success);
    }

    pub fn payments(&self) -> Vec<Payment> {
        self.state.lock().unwrap().payments.clone()
    }

    pub fn last_tx(&self) -> Option<H256> {
        self.state.lock().unwrap().last_tx
    }

    pub fn fail_sends(&self) {
        self.state.lock().unwrap().fail_sends = true;
    }

    /// Take payments into the mempool without acknowledging them
    pub fn lose_replies(&self) {
        self.state.lock().unwrap().lose_replies = true;
    }
}

#[async_trait]
impl EvmNode for FakeEvmNode {
    async fn block_number(&self) -> BridgeResult<u64> {
        Ok(self.state.lock().unwrap().height)
    }

    async fn send_payment(&self, payment: &Payment) -> BridgeResult<SendOutcome> {
        let mut state = self.state.lock().unwrap();
        if state.fail_sends {
            return Err(BridgeError::Transaction("replacement underpriced".to_string()));
        }
        state.payments.push(payment.clone());
        let tx = H256::from(sequential_hash(0xe7, state.payments.len() as u64));
        state.last_tx = Some(tx);
        if state.lose_replies {
            Ok(SendOutcome::Unconfirmed(tx))
        } else {
            Ok(SendOutcome::Accepted(tx))
        }
    }

    async fn receipt_status(&self, _tx_hash: H256) -> BridgeResult<Option<bool>> {
        Ok(self.state.lock().unwrap().receipt)
    }
}

#[derive(Default)]
struct Script {
    scans: VecDeque<BridgeResult<Vec<PendingSwap>>>,
    delivery: Option<DeliveryStatus>,
    verification: Option<DeliveryStatus>,
    verification_for: HashMap<String, DeliveryStatus>,
    first_verify_delay: Option<Duration>,
    resyncs: Vec<u64>,
    deliveries: Vec<(Hash, String)>,
}

/// Adapter whose scan results and delivery outcomes are set by the test
pub struct ScriptedAdapter {
    platform: String,
    address: String,
    repository: Option<Arc<dyn SwapRepository>>,
    delay: Duration,
    script: Mutex<Script>,
    scans: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new(platform: &str, address: &str) -> Self {
        Self {
            platform: platform.to_string(),
            address: address.to_string(),
            repository: None,
            delay: Duration::ZERO,
            script: Mutex::new(Script::default()),
            scans: AtomicUsize::new(0),
        }
    }

    /// Record broadcast payments in `inprogress` the way real adapters do
    pub fn with_repository(mut self, repository: Arc<dyn SwapRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Time each delivery spends on the wire
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push_scan(&self, result: BridgeResult<Vec<PendingSwap>>) {
        self.script.lock().unwrap().scans.push_back(result);
    }

    pub fn set_delivery(&self, status: DeliveryStatus) {
        self.script.lock().unwrap().delivery = Some(status);
    }

    pub fn set_verification(&self, status: DeliveryStatus) {
        self.script.lock().unwrap().verification = Some(status);
    }

    /// Verification outcome for one recorded transaction
    pub fn set_verification_for(&self, foreign_tx: &str, status: DeliveryStatus) {
        self.script
            .lock()
            .unwrap()
            .verification_for
            .insert(foreign_tx.to_string(), status);
    }

    /// Hold the next verification for `delay` before answering
    pub fn slow_first_verification(&self, delay: Duration) {
        self.script.lock().unwrap().first_verify_delay = Some(delay);
    }

    /// (source hash, destination) of every payment sent
    pub fn deliveries(&self) -> Vec<(Hash, String)> {
        self.script.lock().unwrap().deliveries.clone()
    }

    pub fn resyncs(&self) -> Vec<u64> {
        self.script.lock().unwrap().resyncs.clone()
    }

    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainAdapter for ScriptedAdapter {
    fn platform(&self) -> &str {
        &self.platform
    }

    fn local_address(&self) -> &str {
        &self.address
    }

    async fn resolve_local_address(&self, _key: &str) -> BridgeResult<String> {
        Ok(self.address.clone())
    }

    async fn scan(&self) -> BridgeResult<Vec<PendingSwap>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().scans.pop_front();
        next.unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn request_resync(&self, height: u64) {
        self.script.lock().unwrap().resyncs.push(height);
    }

    async fn deliver(
        &self,
        source_hash: &Hash,
        destination: &str,
        _amount: &TokenAmount,
    ) -> BridgeResult<DeliveryStatus> {
        if let Some(repository) = &self.repository {
            if let Some(Some(tx)) = repository.in_progress(source_hash).await? {
                return self.verify_delivery(source_hash, &tx).await;
            }
        }

        let (status, sent) = {
            let mut script = self.script.lock().unwrap();
            script
                .deliveries
                .push((*source_hash, destination.to_string()));
            let sent = sequential_hash(0xa0, script.deliveries.len() as u64);
            (script.delivery.unwrap_or(DeliveryStatus::NotBroadcast), sent)
        };
        tokio::time::sleep(self.delay).await;

        let recorded = match status {
            DeliveryStatus::NotBroadcast => None,
            DeliveryStatus::Confirmed(tx) | DeliveryStatus::Dropped(tx) => Some(tx),
            DeliveryStatus::Pending | DeliveryStatus::Rejected => Some(sent),
        };
        if let (Some(repository), Some(tx)) = (&self.repository, recorded) {
            repository
                .set_in_progress(source_hash, &tx.to_string())
                .await?;
        }
        Ok(status)
    }

    async fn verify_delivery(
        &self,
        _source_hash: &Hash,
        foreign_tx: &str,
    ) -> BridgeResult<DeliveryStatus> {
        let (scripted, delay) = {
            let mut script = self.script.lock().unwrap();
            let scripted = script
                .verification_for
                .get(foreign_tx)
                .copied()
                .or(script.verification);
            (scripted, script.first_verify_delay.take())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match scripted {
            Some(status) => Ok(status),
            None => Ok(DeliveryStatus::Confirmed(foreign_tx.parse()?)),
        }
    }
}

#[derive(Default)]
struct NativeState {
    settlements: HashMap<Hash, Hash>,
    swaps: HashMap<Hash, ChainSwap>,
    interop_settled: Vec<Hash>,
    fee_settled: Vec<(Hash, Hash)>,
    fail_interop: bool,
}

/// Native chain double that settles everything it is asked to
#[derive(Default)]
pub struct FakeNativeChain {
    state: Mutex<NativeState>,
}

impl FakeNativeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_swap(&self, swap: ChainSwap) {
        self.state
            .lock()
            .unwrap()
            .swaps
            .insert(swap.source_hash, swap);
    }

    pub fn add_settlement(&self, source: Hash, settlement: Hash) {
        self.state
            .lock()
            .unwrap()
            .settlements
            .insert(source, settlement);
    }

    pub fn fail_interop(&self) {
        self.state.lock().unwrap().fail_interop = true;
    }

    pub fn interop_settled(&self) -> Vec<Hash> {
        self.state.lock().unwrap().interop_settled.clone()
    }
}

#[async_trait]
impl NativeChain for FakeNativeChain {
    async fn settlement(&self, _source_platform: &str, source_hash: &Hash) -> BridgeResult<Option<Hash>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .settlements
            .get(source_hash)
            .copied())
    }

    async fn swap(&self, source_hash: &Hash) -> BridgeResult<Option<ChainSwap>> {
        Ok(self.state.lock().unwrap().swaps.get(source_hash).cloned())
    }

    async fn swaps_for_address(&self, address: &str) -> BridgeResult<Vec<ChainSwap>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .swaps
            .values()
            .filter(|s| s.source_address == address || s.destination_address == address)
            .cloned()
            .collect())
    }

    async fn settle_interop(&self, _source_platform: &str, source_hash: &Hash) -> BridgeResult<Hash> {
        let mut state = self.state.lock().unwrap();
        if state.fail_interop {
            return Err(BridgeError::Transaction("interop settlement rejected".to_string()));
        }
        state.interop_settled.push(*source_hash);
        let settlement = sequential_hash(0x1a, state.interop_settled.len() as u64);
        state.settlements.insert(*source_hash, settlement);
        Ok(settlement)
    }

    async fn settle_fee(&self, source_hash: &Hash, destination_hash: &Hash) -> BridgeResult<Hash> {
        let mut state = self.state.lock().unwrap();
        state.fee_settled.push((*source_hash, *destination_hash));
        Ok(sequential_hash(0xfe, state.fee_settled.len() as u64))
    }

    async fn transaction_status(&self, _hash: &Hash) -> BridgeResult<NativeTxStatus> {
        Ok(NativeTxStatus::Confirmed)
    }
}
