//! Refresh Orchestrator
//!
//! Rebuilds the campaign list from the chain and mirrors it to the store.
//!
//! # Architecture
//!
//! ```text
//! Idle → FetchingAddresses → FetchingDetails{0..total} → Idle
//!              │                      │
//!   deployedContracts()     per campaign: info, milestones, donors
//!                                     │
//!                        build view → [write lock] list + store
//! ```
//!
//! Every pass takes a generation number. A pass only applies results while
//! its generation is still the newest; once a newer pass starts, the older
//! one stops and reports itself as superseded.

use crate::campaign::builder::ViewModelBuilder;
use crate::campaign::types::CampaignView;
use crate::chain::types::Address;
use crate::gateway::{ChainGateway, GatewayError};
use crate::store::{MirrorStore, StoreError};
use crate::wallet::WalletError;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{watch, RwLock, RwLockWriteGuard};

/// Errors that abort a whole refresh pass
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Clock error: {0}")]
    Clock(#[from] WalletError),
}

/// Where the orchestrator is in a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RefreshPhase {
    Idle,
    FetchingAddresses,
    FetchingDetails { index: usize, total: usize },
}

impl RefreshPhase {
    /// The loading flag
    pub fn is_busy(&self) -> bool {
        !matches!(self, RefreshPhase::Idle)
    }
}

/// A campaign that could not be refreshed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignFailure {
    pub address: Address,
    pub error: String,
}

/// Outcome of one refresh pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    pub generation: u64,
    /// Campaigns the factory reported
    pub total: usize,
    /// Campaigns rebuilt and applied
    pub updated: usize,
    pub failures: Vec<CampaignFailure>,
    /// Entries dropped because their campaign is no longer deployed
    pub pruned: usize,
    /// A newer pass started before this one finished
    pub superseded: bool,
    pub duration_ms: u64,
}

/// Orchestrates refresh passes over the campaign list
pub struct CampaignRefresher {
    gateway: Arc<ChainGateway>,
    builder: ViewModelBuilder,
    store: Arc<MirrorStore>,
    campaigns: RwLock<Vec<CampaignView>>,
    generation: AtomicU64,
    phase_tx: watch::Sender<RefreshPhase>,
}

impl CampaignRefresher {
    pub fn new(gateway: Arc<ChainGateway>, builder: ViewModelBuilder, store: Arc<MirrorStore>) -> Self {
        let (phase_tx, _) = watch::channel(RefreshPhase::Idle);
        Self {
            gateway,
            builder,
            store,
            campaigns: RwLock::new(Vec::new()),
            generation: AtomicU64::new(0),
            phase_tx,
        }
    }

    /// Snapshot of the in-memory list
    pub async fn campaigns(&self) -> Vec<CampaignView> {
        self.campaigns.read().await.clone()
    }

    pub async fn campaign(&self, address: Address) -> Option<CampaignView> {
        self.campaigns
            .read()
            .await
            .iter()
            .find(|c| c.campaign_address == address)
            .cloned()
    }

    /// Watch the current phase
    pub fn subscribe_phase(&self) -> watch::Receiver<RefreshPhase> {
        self.phase_tx.subscribe()
    }

    pub fn phase(&self) -> RefreshPhase {
        *self.phase_tx.borrow()
    }

    /// Seed the in-memory list from the mirror store
    pub async fn load_from_store(&self) -> Result<usize, RefreshError> {
        let stored = self.store.all()?;
        let count = stored.len();
        *self.campaigns.write().await = stored;
        tracing::debug!(count, "Loaded campaigns from mirror store");
        Ok(count)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn set_phase(&self, generation: u64, phase: RefreshPhase) {
        if self.is_current(generation) {
            self.phase_tx.send_replace(phase);
        }
    }

    /// Write lock on the list, only while `generation` is still the newest
    async fn lock_current(&self, generation: u64) -> Option<RwLockWriteGuard<'_, Vec<CampaignView>>> {
        let guard = self.campaigns.write().await;
        self.is_current(generation).then_some(guard)
    }

    /// Run one full refresh pass
    pub async fn refresh(&self) -> Result<RefreshReport, RefreshError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let start = Instant::now();
        let mut report = RefreshReport {
            generation,
            ..RefreshReport::default()
        };

        self.set_phase(generation, RefreshPhase::FetchingAddresses);
        let addresses = match self.gateway.get_deployed_contracts().await {
            Ok(addresses) => addresses,
            Err(e) => {
                tracing::error!(generation, error = %e, "Failed to fetch deployed campaigns");
                self.set_phase(generation, RefreshPhase::Idle);
                return Err(e.into());
            }
        };
        report.total = addresses.len();

        for (index, &address) in addresses.iter().enumerate() {
            if !self.is_current(generation) {
                return Ok(self.superseded(report, start));
            }
            self.set_phase(
                generation,
                RefreshPhase::FetchingDetails {
                    index,
                    total: addresses.len(),
                },
            );

            let view = match self.fetch_campaign(address).await {
                Ok(view) => view,
                Err(e) => {
                    tracing::warn!(campaign = %address, error = %e, "Failed to refresh campaign");
                    report.failures.push(CampaignFailure {
                        address,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let mut list = match self.lock_current(generation).await {
                Some(list) => list,
                None => return Ok(self.superseded(report, start)),
            };

            // Store first; the list only moves once the mirror has the same entry
            if let Err(e) = self.store.put_object(&view) {
                tracing::warn!(campaign = %address, error = %e, "Failed to mirror campaign");
                report.failures.push(CampaignFailure {
                    address,
                    error: e.to_string(),
                });
                continue;
            }

            match list.iter_mut().find(|c| c.campaign_address == address) {
                Some(existing) => *existing = view,
                None => list.push(view),
            }
            report.updated += 1;
        }

        {
            let mut list = match self.lock_current(generation).await {
                Some(list) => list,
                None => return Ok(self.superseded(report, start)),
            };

            let before = list.len();
            list.retain(|c| addresses.contains(&c.campaign_address));
            list.sort_by_key(|c| addresses.iter().position(|a| *a == c.campaign_address));
            let pruned_list = before - list.len();

            let pruned_store = match self.store.retain_only(&addresses) {
                Ok(n) => n,
                Err(e) => {
                    self.set_phase(generation, RefreshPhase::Idle);
                    return Err(e.into());
                }
            };
            report.pruned = pruned_list.max(pruned_store);
        }

        self.set_phase(generation, RefreshPhase::Idle);
        report.duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            generation,
            total = report.total,
            updated = report.updated,
            failed = report.failures.len(),
            pruned = report.pruned,
            duration_ms = report.duration_ms,
            "Campaign refresh completed"
        );
        Ok(report)
    }

    fn superseded(&self, mut report: RefreshReport, start: Instant) -> RefreshReport {
        report.superseded = true;
        report.duration_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(generation = report.generation, "Refresh superseded by a newer pass");
        report
    }

    /// Fetch and build one campaign
    pub async fn fetch_campaign(&self, address: Address) -> Result<CampaignView, RefreshError> {
        let info = self.gateway.get_campaign_details(address).await?;
        let milestones = self.gateway.get_milestones(address).await?;
        let donors = self
            .gateway
            .get_campaign_donors(address, &info.donors)
            .await?;
        Ok(self.builder.build(address, info, milestones, donors).await?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::chain::abi::Token;
    use crate::chain::contracts::{campaign, factory, RawCampaignInfo};
    use crate::chain::mock::MockProvider;
    use crate::chain::provider::WalletProvider;
    use crate::gateway::GatewayConfig;
    use crate::wallet::{ChainClock, WalletConfig, WalletConnector};
    use primitive_types::U256;

    pub(crate) const FACTORY: Address = Address([0xfa; 20]);
    pub(crate) const OWNER: Address = Address([0x01; 20]);
    pub(crate) const DONOR: Address = Address([0x02; 20]);

    pub(crate) fn campaign_info(target_wei: U256) -> RawCampaignInfo {
        RawCampaignInfo {
            owner: OWNER,
            duration: U256::from(1_700_000_600u64),
            target_amount: target_wei,
            funding_cid: "QmCid".to_string(),
            no_of_donors: U256::one(),
            received_donation: U256::exp10(15),
            has_campaign_ended: false,
            completed_milestones: U256::zero(),
            balance: U256::exp10(15),
            donors: vec![DONOR],
        }
    }

    pub(crate) fn script_deployed(provider: &MockProvider, campaigns: &[Address]) {
        provider.on_call(
            FACTORY,
            &factory::deployed_contracts(),
            &[],
            &[Token::Array(campaigns.iter().copied().map(Token::Address).collect())],
        );
    }

    /// A campaign with no milestones and one donor
    pub(crate) fn script_campaign(provider: &MockProvider, address: Address, target_wei: U256) {
        provider.on_call(
            address,
            &campaign::get_campaign_info(),
            &[],
            &campaign_info(target_wei).to_tokens(),
        );
        provider.on_call(
            address,
            &campaign::milestone_counter(),
            &[],
            &[Token::Uint(U256::zero())],
        );
        provider.on_call(
            address,
            &campaign::donors(),
            &[Token::Address(DONOR)],
            &[Token::Uint(U256::exp10(15))],
        );
    }

    pub(crate) fn build_refresher(provider: Arc<MockProvider>, store: Arc<MirrorStore>) -> CampaignRefresher {
        let dyn_provider: Arc<dyn WalletProvider> = provider;
        let gateway = ChainGateway::new(
            dyn_provider.clone(),
            GatewayConfig {
                factory_address: FACTORY,
                ..GatewayConfig::default()
            },
        );
        let clock: Arc<dyn ChainClock> =
            Arc::new(WalletConnector::new(Some(dyn_provider), WalletConfig::default()));
        CampaignRefresher::new(Arc::new(gateway), ViewModelBuilder::new(clock, 3), store)
    }

    fn setup() -> (CampaignRefresher, Arc<MockProvider>, Arc<MirrorStore>) {
        let provider = Arc::new(MockProvider::new());
        let store = Arc::new(MirrorStore::open_in_memory().unwrap());
        (build_refresher(provider.clone(), store.clone()), provider, store)
    }

    #[tokio::test]
    async fn test_empty_factory_fetches_no_campaigns() {
        let (refresher, provider, store) = setup();
        script_deployed(&provider, &[]);

        let report = refresher.refresh().await.unwrap();
        assert_eq!(report.total, 0);
        assert!(refresher.campaigns().await.is_empty());
        assert_eq!(store.count().unwrap(), 0);
        // Only deployedContracts was called
        assert_eq!(provider.count("eth_call"), 1);
        assert_eq!(provider.calls_to(FACTORY), 1);
        assert_eq!(refresher.phase(), RefreshPhase::Idle);
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let (refresher, provider, store) = setup();
        let a = Address([0xaa; 20]);
        let b = Address([0xbb; 20]);
        script_deployed(&provider, &[a, b]);
        script_campaign(&provider, a, U256::exp10(18));
        script_campaign(&provider, b, U256::exp10(17));

        let first = refresher.refresh().await.unwrap();
        assert_eq!(first.updated, 2);
        let list_after_first = refresher.campaigns().await;
        let store_after_first = store.all().unwrap();

        let second = refresher.refresh().await.unwrap();
        assert_eq!(second.updated, 2);
        assert_eq!(refresher.campaigns().await, list_after_first);
        assert_eq!(store.all().unwrap(), store_after_first);
        assert_eq!(list_after_first, store_after_first);

        assert_eq!(list_after_first[0].campaign_address, a);
        assert_eq!(list_after_first[0].campaign_target_amount, "1.0 ETH");
        assert_eq!(list_after_first[1].campaign_target_amount, "0.1 ETH");
        assert_eq!(list_after_first[0].donors_list[0].amount, "0.001 ETH");
    }

    #[tokio::test]
    async fn test_failed_campaign_does_not_abort_pass() {
        let (refresher, provider, _) = setup();
        let broken = Address([0xaa; 20]);
        let good = Address([0xbb; 20]);
        script_deployed(&provider, &[broken, good]);
        script_campaign(&provider, good, U256::exp10(18));

        let report = refresher.refresh().await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].address, broken);

        let list = refresher.campaigns().await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].campaign_address, good);
    }

    #[tokio::test]
    async fn test_undeployed_campaigns_are_pruned() {
        let (refresher, provider, store) = setup();
        let a = Address([0xaa; 20]);
        let b = Address([0xbb; 20]);
        script_deployed(&provider, &[a, b]);
        script_campaign(&provider, a, U256::exp10(18));
        script_campaign(&provider, b, U256::exp10(18));
        refresher.refresh().await.unwrap();

        script_deployed(&provider, &[b]);
        let report = refresher.refresh().await.unwrap();
        assert_eq!(report.pruned, 1);
        assert_eq!(refresher.campaigns().await.len(), 1);
        assert_eq!(store.get_object(a).unwrap(), None);
        assert!(store.get_object(b).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_superseded_pass_applies_nothing() {
        let provider = Arc::new(MockProvider::new());
        let store = Arc::new(MirrorStore::open_in_memory().unwrap());
        let refresher = Arc::new(build_refresher(provider.clone(), store.clone()));
        let a = Address([0xaa; 20]);
        script_deployed(&provider, &[a]);
        script_campaign(&provider, a, U256::exp10(18));

        // First pass parks on getCampaignInfo holding the old target
        let (reached, release) = provider.gate_next_call_to(a);
        let stale = {
            let refresher = refresher.clone();
            tokio::spawn(async move { refresher.refresh().await })
        };
        reached.notified().await;

        // Chain state changes and a newer pass completes
        script_campaign(&provider, a, U256::exp10(17) * U256::from(5u64));
        let fresh = refresher.refresh().await.unwrap();
        assert!(!fresh.superseded);

        release.notify_one();
        let stale = stale.await.unwrap().unwrap();
        assert!(stale.superseded);
        assert_eq!(stale.updated, 0);

        let list = refresher.campaigns().await;
        assert_eq!(list[0].campaign_target_amount, "0.5 ETH");
        assert_eq!(
            store.get_object(a).unwrap().unwrap().campaign_target_amount,
            "0.5 ETH"
        );
    }

    #[tokio::test]
    async fn test_store_write_failure_keeps_list_and_store_together() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider::new());
        let store = Arc::new(MirrorStore::open(dir.path()).unwrap());
        let refresher = build_refresher(provider.clone(), store.clone());
        let a = Address([0xaa; 20]);
        script_deployed(&provider, &[a]);
        script_campaign(&provider, a, U256::exp10(18));
        refresher.refresh().await.unwrap();

        // Reject every later write to the mirror
        let conn = rusqlite::Connection::open(dir.path().join(crate::store::DB_FILE)).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER reject_update BEFORE UPDATE ON campaigns
             BEGIN SELECT RAISE(ABORT, 'disk'); END;",
        )
        .unwrap();

        script_campaign(&provider, a, U256::exp10(17) * U256::from(5u64));
        let report = refresher.refresh().await.unwrap();
        assert_eq!(report.updated, 0);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].address, a);
        assert!(report.failures[0].error.contains("disk"));

        let listed = refresher.campaign(a).await.unwrap();
        let stored = store.get_object(a).unwrap().unwrap();
        assert_eq!(listed.campaign_target_amount, "1.0 ETH");
        assert_eq!(listed, stored);
    }

    #[tokio::test]
    async fn test_phase_returns_to_idle_on_failure() {
        let (refresher, _, _) = setup();
        let mut phases = refresher.subscribe_phase();

        // Factory not scripted: deployedContracts reverts
        assert!(matches!(
            refresher.refresh().await,
            Err(RefreshError::Gateway(_))
        ));
        assert_eq!(*phases.borrow_and_update(), RefreshPhase::Idle);
        assert!(!refresher.phase().is_busy());
    }

    #[tokio::test]
    async fn test_load_from_store() {
        let (refresher, provider, store) = setup();
        let a = Address([0xaa; 20]);
        script_deployed(&provider, &[a]);
        script_campaign(&provider, a, U256::exp10(18));
        refresher.refresh().await.unwrap();

        let offline = build_refresher(Arc::new(MockProvider::new()), store.clone());
        assert_eq!(offline.load_from_store().await.unwrap(), 1);
        assert_eq!(offline.campaign(a).await.unwrap().campaign_target_amount, "1.0 ETH");
    }
}
