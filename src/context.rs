//! Application wiring
//!
//! Builds the provider, wallet, store, gateway, refresher and actions from a
//! [`Config`]. Chain services exist only when both an RPC endpoint and a
//! factory address are configured; everything else works offline.

use crate::campaign::{CampaignActions, CampaignRefresher, ViewModelBuilder};
use crate::chain::provider::{HttpProvider, HttpProviderConfig, ProviderError, WalletProvider};
use crate::config::{Config, ConfigError};
use crate::gateway::{ChainGateway, GatewayConfig};
use crate::store::{MirrorStore, StoreError};
use crate::wallet::{ChainClock, WalletConfig, WalletConnector};
use std::sync::Arc;
use thiserror::Error;

/// Errors while assembling the application
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Chain access unavailable: {0}")]
    ChainUnavailable(String),
}

/// Services that need a node and a factory contract
pub struct ChainServices {
    pub gateway: Arc<ChainGateway>,
    pub refresher: Arc<CampaignRefresher>,
    pub actions: CampaignActions,
}

/// Everything a command needs
pub struct AppContext {
    pub config: Config,
    pub wallet: Arc<WalletConnector>,
    pub store: Arc<MirrorStore>,
    chain: Result<ChainServices, String>,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self, ContextError> {
        let provider: Option<Arc<dyn WalletProvider>> = match &config.chain.rpc_url {
            Some(url) => {
                let provider = HttpProvider::new(HttpProviderConfig {
                    url: url.clone(),
                    request_timeout_ms: config.chain.request_timeout_ms,
                    max_retries: config.chain.max_retries,
                })?;
                tracing::debug!(url = %url, "Using HTTP provider");
                let provider: Arc<dyn WalletProvider> = Arc::new(provider);
                Some(provider)
            }
            None => None,
        };

        let wallet = Arc::new(WalletConnector::new(
            provider.clone(),
            WalletConfig {
                account_poll_interval_ms: config.chain.account_poll_interval_ms,
                ..WalletConfig::default()
            },
        ));

        let data_path = config.store.data_path();
        let store = Arc::new(MirrorStore::open(&data_path)?);
        tracing::debug!(path = ?data_path, "Opened mirror store");

        let chain = match provider {
            Some(provider) => Self::chain_services(&config, provider, wallet.clone(), store.clone()),
            None => Err("no RPC endpoint configured (set chain.rpc_url or CROWDFUND_RPC_URL)".to_string()),
        };

        if let Err(reason) = &chain {
            tracing::debug!(reason = %reason, "Running without chain access");
        }

        Ok(Self {
            config,
            wallet,
            store,
            chain,
        })
    }

    fn chain_services(
        config: &Config,
        provider: Arc<dyn WalletProvider>,
        wallet: Arc<WalletConnector>,
        store: Arc<MirrorStore>,
    ) -> Result<ChainServices, String> {
        let factory_address = config.chain.factory_address().map_err(|e| e.to_string())?;

        let gateway = Arc::new(ChainGateway::new(
            provider,
            GatewayConfig {
                factory_address,
                gas: config.gas,
                confirmations: config.chain.confirmations,
                receipt_poll_interval_ms: config.chain.receipt_poll_interval_ms,
                receipt_timeout_ms: config.chain.receipt_timeout_secs.saturating_mul(1000),
                milestone_probe_slots: config.refresh.milestone_probe_slots,
            },
        ));

        let clock: Arc<dyn ChainClock> = wallet;
        let builder = ViewModelBuilder::new(clock, config.refresh.planned_milestones);
        let refresher = Arc::new(CampaignRefresher::new(gateway.clone(), builder, store.clone()));
        let actions = CampaignActions::new(gateway.clone(), refresher.clone(), store);

        Ok(ChainServices {
            gateway,
            refresher,
            actions,
        })
    }

    /// Chain services, or why they are unavailable
    pub fn chain(&self) -> Result<&ChainServices, ContextError> {
        self.chain
            .as_ref()
            .map_err(|reason| ContextError::ChainUnavailable(reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.store.data_dir = dir.to_string_lossy().to_string();
        config
    }

    #[tokio::test]
    async fn test_offline_context() {
        let dir = tempdir().unwrap();
        let ctx = AppContext::new(config(dir.path())).unwrap();

        assert!(matches!(ctx.chain(), Err(ContextError::ChainUnavailable(_))));
        assert!(ctx.wallet.provider().is_err());
        assert_eq!(ctx.store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_factory_keeps_wallet() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path());
        config.chain.rpc_url = Some("http://127.0.0.1:1".to_string());

        let ctx = AppContext::new(config).unwrap();
        assert!(ctx.wallet.provider().is_ok());
        match ctx.chain() {
            Err(ContextError::ChainUnavailable(reason)) => {
                assert!(reason.contains("chain.factory_address"))
            }
            _ => panic!("expected chain to be unavailable"),
        }
    }

    #[tokio::test]
    async fn test_full_context() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path());
        config.chain.rpc_url = Some("http://127.0.0.1:1".to_string());
        config.chain.factory_address = Some(format!("0x{}", "fa".repeat(20)));

        let ctx = AppContext::new(config).unwrap();
        let chain = ctx.chain().unwrap();
        assert_eq!(chain.gateway.config().receipt_timeout_ms, 120_000);
        assert_eq!(chain.gateway.factory_address().to_string(), format!("0x{}", "fa".repeat(20)));
    }
}
