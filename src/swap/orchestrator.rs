//! Swap orchestrator: pending-swap index, per-platform scan tasks and settlement

use super::fees::FeeSettler;
use super::index::SwapIndex;
use crate::chain::{AdapterRegistry, ChainAdapter, Route};
use crate::clock::Clock;
use crate::error::{BridgeError, BridgeResult};
use crate::metrics;
use crate::native::NativeChain;
use crate::state::SwapRepository;
use crate::types::{ChainSwap, DeliveryStatus, FeeStatus, Hash, PendingFee, PendingSwap};

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type ScanTask = JoinHandle<BridgeResult<Vec<PendingSwap>>>;

/// At most one scan in flight per platform
enum ScanSlot {
    Idle,
    Running(ScanTask),
}

pub struct SwapOrchestrator {
    registry: AdapterRegistry,
    native: Arc<dyn NativeChain>,
    repository: Arc<dyn SwapRepository>,
    fees: FeeSettler,
    /// Guards the index and every check-then-act sequence on the repository
    index: Mutex<SwapIndex>,
    scans: DashMap<String, ScanSlot>,
}

impl SwapOrchestrator {
    pub fn new(
        registry: AdapterRegistry,
        native: Arc<dyn NativeChain>,
        repository: Arc<dyn SwapRepository>,
        clock: Arc<dyn Clock>,
        fee_cooldown: chrono::Duration,
    ) -> Self {
        let fees = FeeSettler::new(native.clone(), repository.clone(), clock, fee_cooldown);
        let scans = registry
            .platforms()
            .into_iter()
            .map(|platform| (platform, ScanSlot::Idle))
            .collect();

        Self {
            registry,
            native,
            repository,
            fees,
            index: Mutex::new(SwapIndex::new()),
            scans,
        }
    }

    pub fn native_platform(&self) -> &str {
        self.registry.native()
    }

    pub fn platforms(&self) -> Vec<String> {
        self.registry.platforms()
    }

    /// One driver step: advance fees, collect finished scans, start idle ones
    pub async fn tick(&self) {
        if let Err(e) = self.advance_fees().await {
            error!("Fee settlement pass failed: {}", e);
        }
        self.collect_scans().await;
        self.start_scans();
    }

    async fn advance_fees(&self) -> BridgeResult<()> {
        let mut index = self.index.lock().await;
        for fee in self.repository.pending_fees().await? {
            match self.fees.advance(&fee).await {
                Ok(FeeStatus::Finished) => {
                    index.remove(&fee.source_hash);
                }
                Ok(_) => {}
                Err(e) => warn!("Advancing fee for {} failed: {}", fee.source_hash, e),
            }
        }
        Ok(())
    }

    async fn collect_scans(&self) {
        let finished: Vec<String> = self
            .scans
            .iter()
            .filter(|slot| matches!(slot.value(), ScanSlot::Running(task) if task.is_finished()))
            .map(|slot| slot.key().clone())
            .collect();

        for platform in finished {
            let Some(ScanSlot::Running(task)) = self.scans.insert(platform.clone(), ScanSlot::Idle)
            else {
                continue;
            };
            match task.await {
                Ok(Ok(swaps)) => self.merge(&platform, swaps).await,
                Ok(Err(e)) => {
                    error!("Scan of {} failed: {}", platform, e);
                    metrics::record_scan_fault(&platform);
                }
                Err(e) => {
                    error!("Scan task for {} aborted: {}", platform, e);
                    metrics::record_scan_fault(&platform);
                }
            }
        }
    }

    fn start_scans(&self) {
        for adapter in self.registry.adapters() {
            let mut slot = self
                .scans
                .entry(adapter.platform().to_string())
                .or_insert(ScanSlot::Idle);
            if matches!(*slot, ScanSlot::Idle) {
                let adapter = Arc::clone(adapter);
                *slot = ScanSlot::Running(tokio::spawn(async move { adapter.scan().await }));
            }
        }
    }

    async fn merge(&self, platform: &str, swaps: Vec<PendingSwap>) {
        let mut index = self.index.lock().await;
        for swap in swaps {
            if index.contains(&swap.source_hash) {
                continue;
            }
            match self.repository.settled(&swap.source_hash).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                // listing re-checks `settled`, so keeping it is harmless
                Err(e) => warn!("Settlement lookup for {} failed: {}", swap.source_hash, e),
            }
            info!(
                "Detected {} swap {} of {} {} for {}",
                platform, swap.source_hash, swap.amount.value, swap.amount.symbol,
                swap.destination_address
            );
            metrics::record_swap_detected(platform);
            index.insert(swap);
        }
    }

    /// Resolve one swap, delivering it if nobody has yet.
    ///
    /// `None` means unresolved for now; callers retry later.
    pub async fn settle_swap(
        &self,
        source_platform: &str,
        destination_platform: &str,
        source_hash: &Hash,
    ) -> BridgeResult<Option<Hash>> {
        let native = self.registry.native();
        if (source_platform == native) == (destination_platform == native) {
            return Err(BridgeError::InvalidPairing {
                source_platform: source_platform.to_string(),
                destination_platform: destination_platform.to_string(),
            });
        }
        self.registry.route(source_platform)?;
        let destination = self.registry.route(destination_platform)?;

        let index = self.index.lock().await;
        match self.repository.in_progress(source_hash).await? {
            Some(None) => {
                debug!("Swap {} is already being settled", source_hash);
                return Ok(None);
            }
            Some(Some(tx)) => {
                drop(index);
                let Route::Foreign(adapter) = destination else {
                    return Ok(None);
                };
                let status = adapter.verify_delivery(source_hash, &tx).await?;
                return self.apply_delivery(adapter.as_ref(), source_hash, status).await;
            }
            None => {}
        }

        if let Some(settled) = self.settle_hash(source_platform, source_hash).await? {
            return Ok(Some(settled));
        }

        if !self.repository.claim(source_hash).await? {
            return Ok(None);
        }
        drop(index);

        match destination {
            Route::Native => self.settle_on_native(source_platform, source_hash).await,
            Route::Foreign(adapter) => self.deliver_foreign(adapter.as_ref(), source_hash).await,
        }
    }

    /// Settlement already known locally, queued for its fee leg, or recorded on the native chain
    async fn settle_hash(&self, source_platform: &str, source_hash: &Hash) -> BridgeResult<Option<Hash>> {
        if let Some(settled) = self.repository.settled(source_hash).await? {
            return Ok(Some(settled));
        }
        let pending = self.repository.pending_fees().await?;
        if let Some(fee) = pending.iter().find(|fee| fee.source_hash == *source_hash) {
            return Ok(Some(fee.destination_hash));
        }
        self.native.settlement(source_platform, source_hash).await
    }

    async fn settle_on_native(&self, source_platform: &str, source_hash: &Hash) -> BridgeResult<Option<Hash>> {
        let native = self.registry.native().to_string();
        match self.native.settle_interop(source_platform, source_hash).await {
            Ok(settlement) => {
                let mut index = self.index.lock().await;
                self.repository.finish_swap(source_hash, &settlement).await?;
                index.remove(source_hash);
                metrics::record_delivery(&native, DeliveryStatus::Confirmed(settlement).name());
                info!("Settled {} swap {} as {}", source_platform, source_hash, settlement);
                Ok(Some(settlement))
            }
            Err(e) => {
                warn!("Native settlement of {} failed: {}", source_hash, e);
                metrics::record_delivery(&native, DeliveryStatus::NotBroadcast.name());
                self.release(source_hash, None).await?;
                Ok(None)
            }
        }
    }

    async fn deliver_foreign(&self, adapter: &dyn ChainAdapter, source_hash: &Hash) -> BridgeResult<Option<Hash>> {
        let swap = match self.native.swap(source_hash).await {
            Ok(Some(swap)) => swap,
            Ok(None) => {
                self.release(source_hash, None).await?;
                return Err(BridgeError::SwapNotFound(source_hash.to_string()));
            }
            Err(e) => {
                warn!("Native swap lookup for {} failed: {}", source_hash, e);
                self.release(source_hash, None).await?;
                return Ok(None);
            }
        };

        match adapter
            .deliver(source_hash, &swap.destination_address, &swap.amount)
            .await
        {
            Ok(status) => self.apply_delivery(adapter, source_hash, status).await,
            Err(e) => {
                // the payment may be on the wire; keep the claim so nothing resends it
                error!(
                    "Delivery of {} on {} ended in an unknown state: {}",
                    source_hash,
                    adapter.platform(),
                    e
                );
                Ok(None)
            }
        }
    }

    async fn apply_delivery(
        &self,
        adapter: &dyn ChainAdapter,
        source_hash: &Hash,
        status: DeliveryStatus,
    ) -> BridgeResult<Option<Hash>> {
        metrics::record_delivery(adapter.platform(), status.name());
        match status {
            DeliveryStatus::Confirmed(tx) => {
                let _index = self.index.lock().await;
                let queued = self
                    .repository
                    .pending_fees()
                    .await?
                    .iter()
                    .any(|fee| fee.source_hash == *source_hash);
                if !queued && self.repository.settled(source_hash).await?.is_none() {
                    let fee = PendingFee::new(*source_hash, tx, self.fees.now());
                    self.repository.push_pending_fee(&fee).await?;
                    info!(
                        "Delivered {} on {} as {}, fee settlement queued",
                        source_hash,
                        adapter.platform(),
                        tx
                    );
                }
                Ok(Some(tx))
            }
            DeliveryStatus::Pending | DeliveryStatus::Rejected => Ok(None),
            DeliveryStatus::Dropped(tx) => {
                self.release(source_hash, Some(&tx.to_string())).await?;
                Ok(None)
            }
            DeliveryStatus::NotBroadcast => {
                self.release(source_hash, None).await?;
                Ok(None)
            }
        }
    }

    /// Drop the in-progress record if it is still the one this caller acted on
    async fn release(&self, source_hash: &Hash, expected: Option<&str>) -> BridgeResult<()> {
        let _index = self.index.lock().await;
        if !self
            .repository
            .clear_in_progress_if(source_hash, expected)
            .await?
        {
            debug!(
                "In-progress record for {} changed meanwhile, keeping it",
                source_hash
            );
        }
        Ok(())
    }

    /// Unsettled swaps touching `address`, from the scan index and the native chain
    pub async fn get_pending_swaps(&self, address: &str) -> BridgeResult<Vec<ChainSwap>> {
        let native = self.registry.native().to_string();
        let mut seen = HashSet::new();
        let mut result = Vec::new();

        let pending = {
            let index = self.index.lock().await;
            for swap in index.for_address(address) {
                if self.repository.settled(&swap.source_hash).await?.is_some() {
                    continue;
                }
                seen.insert(swap.source_hash);
                result.push(ChainSwap {
                    source_platform: swap.platform.clone(),
                    source_hash: swap.source_hash,
                    source_address: swap.source_address.clone(),
                    destination_platform: native.clone(),
                    destination_address: swap.destination_address.clone(),
                    destination_hash: None,
                    amount: swap.amount.clone(),
                });
            }
            self.repository.pending_fees().await?
        };

        for mut swap in self.native.swaps_for_address(address).await? {
            if !seen.insert(swap.source_hash)
                || self.repository.settled(&swap.source_hash).await?.is_some()
            {
                continue;
            }
            swap.destination_hash = pending
                .iter()
                .find(|fee| fee.source_hash == swap.source_hash)
                .map(|fee| fee.destination_hash);
            result.push(swap);
        }

        Ok(result)
    }

    pub async fn request_resync(&self, platform: &str, height: u64) -> BridgeResult<()> {
        let adapter = self.registry.adapter(platform)?;
        adapter.request_resync(height).await;
        Ok(())
    }

    pub async fn health_check(&self) -> BridgeResult<()> {
        self.repository.health_check().await
    }

    #[cfg(test)]
    fn scans_running(&self) -> bool {
        self.scans
            .iter()
            .any(|slot| matches!(slot.value(), ScanSlot::Running(task) if !task.is_finished()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::native::{MockNativeChain, NativeTxStatus};
    use crate::state::MemoryStore;
    use crate::testing::{FakeNativeChain, ScriptedAdapter};
    use crate::types::{test_hash, TokenAmount};
    use ethers::types::U256;
    use std::time::Duration;

    const NATIVE: &str = "native";

    fn start() -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn orchestrator(
        adapters: Vec<Arc<ScriptedAdapter>>,
        native: Arc<dyn NativeChain>,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
    ) -> SwapOrchestrator {
        let mut registry = AdapterRegistry::new(NATIVE);
        for adapter in adapters {
            registry.register(adapter).unwrap();
        }
        SwapOrchestrator::new(registry, native, store, clock, chrono::Duration::seconds(60))
    }

    fn incoming(n: u8) -> PendingSwap {
        PendingSwap {
            platform: "neo".to_string(),
            source_hash: test_hash(n),
            source_address: "Auser".to_string(),
            destination_address: "Pdest".to_string(),
            amount: TokenAmount::new("SOUL", U256::from(700u64), 8),
        }
    }

    fn outgoing(n: u8) -> ChainSwap {
        ChainSwap {
            source_platform: NATIVE.to_string(),
            source_hash: test_hash(n),
            source_address: "Psender".to_string(),
            destination_platform: "neo".to_string(),
            destination_address: "Arecipient".to_string(),
            destination_hash: None,
            amount: TokenAmount::new("SOUL", U256::from(500u64), 8),
        }
    }

    /// Tick until every spawned scan has been collected
    async fn run_scans(orchestrator: &SwapOrchestrator) {
        orchestrator.tick().await;
        while orchestrator.scans_running() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        orchestrator.tick().await;
    }

    #[tokio::test]
    async fn test_scanned_swap_is_listed_then_settled() {
        let store = Arc::new(MemoryStore::new());
        let native = Arc::new(FakeNativeChain::new());
        let neo = Arc::new(ScriptedAdapter::new("neo", "AbridgeNeoAddress"));
        neo.push_scan(Ok(vec![incoming(1)]));
        let orchestrator = orchestrator(
            vec![neo.clone()],
            native.clone(),
            store.clone(),
            Arc::new(ManualClock::new(start())),
        );

        run_scans(&orchestrator).await;
        let listed = orchestrator.get_pending_swaps("Auser").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].source_hash, test_hash(1));
        assert_eq!(listed[0].destination_platform, NATIVE);
        assert_eq!(listed[0].destination_hash, None);

        let settled = orchestrator
            .settle_swap("neo", NATIVE, &test_hash(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(store.settled(&test_hash(1)).await.unwrap(), Some(settled));
        assert_eq!(store.in_progress(&test_hash(1)).await.unwrap(), None);
        assert!(orchestrator.get_pending_swaps("Auser").await.unwrap().is_empty());

        // later calls resolve from the settlement record
        assert_eq!(
            orchestrator.settle_swap("neo", NATIVE, &test_hash(1)).await.unwrap(),
            Some(settled)
        );
        assert_eq!(native.interop_settled(), vec![test_hash(1)]);
    }

    #[tokio::test]
    async fn test_rescanned_swap_is_not_indexed_twice() {
        let store = Arc::new(MemoryStore::new());
        let neo = Arc::new(ScriptedAdapter::new("neo", "AbridgeNeoAddress"));
        neo.push_scan(Ok(vec![incoming(1)]));
        neo.push_scan(Ok(vec![incoming(1), incoming(2)]));
        let orchestrator = orchestrator(
            vec![neo.clone()],
            Arc::new(FakeNativeChain::new()),
            store,
            Arc::new(ManualClock::new(start())),
        );

        run_scans(&orchestrator).await;
        run_scans(&orchestrator).await;
        assert!(neo.scan_count() >= 2);
        assert_eq!(orchestrator.get_pending_swaps("Auser").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_faulted_scan_does_not_stop_other_platforms() {
        let store = Arc::new(MemoryStore::new());
        let neo = Arc::new(ScriptedAdapter::new("neo", "AbridgeNeoAddress"));
        let ethereum = Arc::new(ScriptedAdapter::new("ethereum", "0x1111"));
        neo.push_scan(Err(BridgeError::Internal("decoder crashed".to_string())));
        let mut from_ethereum = incoming(3);
        from_ethereum.platform = "ethereum".to_string();
        ethereum.push_scan(Ok(vec![from_ethereum]));
        let orchestrator = orchestrator(
            vec![neo.clone(), ethereum],
            Arc::new(FakeNativeChain::new()),
            store,
            Arc::new(ManualClock::new(start())),
        );

        run_scans(&orchestrator).await;
        let listed = orchestrator.get_pending_swaps("Auser").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].source_platform, "ethereum");

        // the faulted slot is idle again and gets a fresh scan
        run_scans(&orchestrator).await;
        assert!(neo.scan_count() >= 2);
    }

    #[tokio::test]
    async fn test_concurrent_settles_deliver_once() {
        let store = Arc::new(MemoryStore::new());
        let native = Arc::new(FakeNativeChain::new());
        native.add_swap(outgoing(1));
        let neo = Arc::new(
            ScriptedAdapter::new("neo", "AbridgeNeoAddress")
                .with_repository(store.clone())
                .with_delay(Duration::from_millis(50)),
        );
        neo.set_delivery(DeliveryStatus::Confirmed(test_hash(0xd1)));
        let orchestrator = orchestrator(
            vec![neo.clone()],
            native,
            store.clone(),
            Arc::new(ManualClock::new(start())),
        );

        let hash = test_hash(1);
        let (a, b) = tokio::join!(
            orchestrator.settle_swap(NATIVE, "neo", &hash),
            orchestrator.settle_swap(NATIVE, "neo", &hash),
        );
        let mut results = vec![a.unwrap(), b.unwrap()];
        results.sort();
        assert_eq!(results, vec![None, Some(test_hash(0xd1))]);
        assert_eq!(neo.deliveries(), vec![(hash, "Arecipient".to_string())]);

        let fees = store.pending_fees().await.unwrap();
        assert_eq!(fees.len(), 1);
        assert_eq!(fees[0].destination_hash, test_hash(0xd1));
        assert_eq!(fees[0].status, FeeStatus::Settle);

        // a retry verifies the recorded payment instead of paying again
        assert_eq!(
            orchestrator.settle_swap(NATIVE, "neo", &hash).await.unwrap(),
            Some(test_hash(0xd1))
        );
        assert_eq!(neo.deliveries().len(), 1);
        assert_eq!(store.pending_fees().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_delivery_is_retried_fresh() {
        let store = Arc::new(MemoryStore::new());
        let native = Arc::new(FakeNativeChain::new());
        native.add_swap(outgoing(1));
        let neo = Arc::new(
            ScriptedAdapter::new("neo", "AbridgeNeoAddress").with_repository(store.clone()),
        );
        neo.set_delivery(DeliveryStatus::Dropped(test_hash(0xd1)));
        let orchestrator = orchestrator(
            vec![neo.clone()],
            native,
            store.clone(),
            Arc::new(ManualClock::new(start())),
        );

        let hash = test_hash(1);
        assert_eq!(orchestrator.settle_swap(NATIVE, "neo", &hash).await.unwrap(), None);
        assert_eq!(store.in_progress(&hash).await.unwrap(), None);

        neo.set_delivery(DeliveryStatus::Pending);
        assert_eq!(orchestrator.settle_swap(NATIVE, "neo", &hash).await.unwrap(), None);
        assert_eq!(neo.deliveries().len(), 2);
        // pending keeps the claim
        assert!(store.in_progress(&hash).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stale_dropped_verdict_keeps_newer_delivery() {
        let store = Arc::new(MemoryStore::new());
        let native = Arc::new(FakeNativeChain::new());
        native.add_swap(outgoing(1));
        let neo = Arc::new(
            ScriptedAdapter::new("neo", "AbridgeNeoAddress").with_repository(store.clone()),
        );
        let hash = test_hash(1);
        let old_tx = test_hash(0x99).to_string();
        store.claim(&hash).await.unwrap();
        store.set_in_progress(&hash, &old_tx).await.unwrap();
        neo.set_delivery(DeliveryStatus::Pending);
        neo.set_verification(DeliveryStatus::Pending);
        neo.set_verification_for(&old_tx, DeliveryStatus::Dropped(test_hash(0x99)));
        neo.slow_first_verification(Duration::from_millis(100));
        let orchestrator = orchestrator(
            vec![neo.clone()],
            native,
            store.clone(),
            Arc::new(ManualClock::new(start())),
        );

        let (slow, fresh) = tokio::join!(orchestrator.settle_swap(NATIVE, "neo", &hash), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            // a fast verifier of the old payment releases it ...
            let released = orchestrator.settle_swap(NATIVE, "neo", &hash).await.unwrap();
            assert_eq!(store.in_progress(&hash).await.unwrap(), None);
            // ... and the next caller pays afresh
            let delivered = orchestrator.settle_swap(NATIVE, "neo", &hash).await.unwrap();
            (released, delivered)
        });
        assert_eq!(slow.unwrap(), None);
        assert_eq!(fresh, (None, None));

        let live = store.in_progress(&hash).await.unwrap();
        assert!(matches!(&live, Some(Some(tx)) if *tx != old_tx));
        assert_eq!(orchestrator.settle_swap(NATIVE, "neo", &hash).await.unwrap(), None);
        assert_eq!(neo.deliveries().len(), 1);
        assert_eq!(store.in_progress(&hash).await.unwrap(), live);
    }

    #[tokio::test]
    async fn test_native_settlement_record_resolves_without_delivery() {
        let store = Arc::new(MemoryStore::new());
        let native = Arc::new(FakeNativeChain::new());
        native.add_swap(outgoing(1));
        native.add_settlement(test_hash(1), test_hash(0x5e));
        let neo = Arc::new(ScriptedAdapter::new("neo", "AbridgeNeoAddress"));
        let orchestrator = orchestrator(
            vec![neo.clone()],
            native,
            store.clone(),
            Arc::new(ManualClock::new(start())),
        );

        assert_eq!(
            orchestrator.settle_swap(NATIVE, "neo", &test_hash(1)).await.unwrap(),
            Some(test_hash(0x5e))
        );
        assert!(neo.deliveries().is_empty());
        assert_eq!(store.in_progress(&test_hash(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_native_swap_releases_claim() {
        let store = Arc::new(MemoryStore::new());
        let neo = Arc::new(ScriptedAdapter::new("neo", "AbridgeNeoAddress"));
        let orchestrator = orchestrator(
            vec![neo.clone()],
            Arc::new(FakeNativeChain::new()),
            store.clone(),
            Arc::new(ManualClock::new(start())),
        );

        let result = orchestrator.settle_swap(NATIVE, "neo", &test_hash(4)).await;
        assert!(matches!(result, Err(BridgeError::SwapNotFound(_))));
        assert_eq!(store.in_progress(&test_hash(4)).await.unwrap(), None);
        assert!(neo.deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_failed_native_settlement_releases_claim() {
        let store = Arc::new(MemoryStore::new());
        let native = Arc::new(FakeNativeChain::new());
        native.fail_interop();
        let neo = Arc::new(ScriptedAdapter::new("neo", "AbridgeNeoAddress"));
        let orchestrator = orchestrator(
            vec![neo],
            native,
            store.clone(),
            Arc::new(ManualClock::new(start())),
        );

        assert_eq!(
            orchestrator.settle_swap("neo", NATIVE, &test_hash(1)).await.unwrap(),
            None
        );
        assert_eq!(store.in_progress(&test_hash(1)).await.unwrap(), None);
        assert_eq!(store.settled(&test_hash(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_pairings_must_involve_the_native_platform() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = orchestrator(
            vec![
                Arc::new(ScriptedAdapter::new("neo", "AbridgeNeoAddress")),
                Arc::new(ScriptedAdapter::new("ethereum", "0x1111")),
            ],
            Arc::new(FakeNativeChain::new()),
            store,
            Arc::new(ManualClock::new(start())),
        );

        let hash = test_hash(1);
        assert!(matches!(
            orchestrator.settle_swap("neo", "ethereum", &hash).await,
            Err(BridgeError::InvalidPairing { .. })
        ));
        assert!(matches!(
            orchestrator.settle_swap(NATIVE, NATIVE, &hash).await,
            Err(BridgeError::InvalidPairing { .. })
        ));
        assert!(matches!(
            orchestrator.settle_swap("tron", NATIVE, &hash).await,
            Err(BridgeError::UnknownPlatform(_))
        ));
    }

    #[tokio::test]
    async fn test_fee_waits_for_cooldown_then_confirms() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start()));
        let mut native = MockNativeChain::new();
        native
            .expect_settle_fee()
            .times(1)
            .returning(|_, _| Ok(test_hash(0xfe)));
        native
            .expect_transaction_status()
            .times(1)
            .returning(|_| Ok(NativeTxStatus::Confirmed));
        let orchestrator = orchestrator(vec![], Arc::new(native), store.clone(), clock.clone());

        let source = test_hash(1);
        store.claim(&source).await.unwrap();
        store
            .set_in_progress(&source, &test_hash(0xd1).to_string())
            .await
            .unwrap();
        store
            .push_pending_fee(&PendingFee::new(source, test_hash(0xd1), start()))
            .await
            .unwrap();

        clock.advance(59);
        orchestrator.tick().await;
        assert_eq!(store.pending_fees().await.unwrap()[0].status, FeeStatus::Settle);

        clock.advance(2);
        orchestrator.tick().await;
        let fees = store.pending_fees().await.unwrap();
        assert_eq!(fees[0].status, FeeStatus::Confirm);
        assert_eq!(fees[0].settle_hash, Some(test_hash(0xfe)));

        orchestrator.tick().await;
        assert!(store.pending_fees().await.unwrap().is_empty());
        assert_eq!(store.in_progress(&source).await.unwrap(), None);
        assert_eq!(store.settled(&source).await.unwrap(), Some(test_hash(0xd1)));
    }

    #[tokio::test]
    async fn test_native_swaps_carry_delivery_hash() {
        let store = Arc::new(MemoryStore::new());
        let native = Arc::new(FakeNativeChain::new());
        native.add_swap(outgoing(1));
        native.add_swap(outgoing(2));
        store
            .push_pending_fee(&PendingFee::new(test_hash(1), test_hash(0xd1), start()))
            .await
            .unwrap();
        store.finish_swap(&test_hash(2), &test_hash(0xd2)).await.unwrap();
        let orchestrator = orchestrator(
            vec![Arc::new(ScriptedAdapter::new("neo", "AbridgeNeoAddress"))],
            native,
            store,
            Arc::new(ManualClock::new(start())),
        );

        let listed = orchestrator.get_pending_swaps("Arecipient").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].source_hash, test_hash(1));
        assert_eq!(listed[0].destination_hash, Some(test_hash(0xd1)));
    }

    #[tokio::test]
    async fn test_resync_routes_to_adapter() {
        let neo = Arc::new(ScriptedAdapter::new("neo", "AbridgeNeoAddress"));
        let orchestrator = orchestrator(
            vec![neo.clone()],
            Arc::new(FakeNativeChain::new()),
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(start())),
        );

        orchestrator.request_resync("neo", 4521).await.unwrap();
        assert_eq!(neo.resyncs(), vec![4521]);
        assert!(matches!(
            orchestrator.request_resync(NATIVE, 1).await,
            Err(BridgeError::UnknownPlatform(_))
        ));
    }
}
