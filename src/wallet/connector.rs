//! Wallet Connector
//!
//! Wraps the wallet provider: connects, checks the authorized account,
//! converts units, reads the chain clock, and publishes the selected account
//! on a broadcast channel.

use crate::chain::provider::{ProviderError, ProviderExt, WalletProvider};
use crate::chain::types::Address;
use crate::chain::units::{self, UnitError};
use async_trait::async_trait;
use primitive_types::U256;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

/// Receiver side of the account channel
pub type AccountStream = broadcast::Receiver<Option<Address>>;

/// Errors from the wallet layer
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("No wallet provider found. Configure an RPC endpoint or install a wallet.")]
    ProviderUnavailable,

    #[error("Wallet returned no accounts")]
    NoAccounts,

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] UnitError),
}

/// Configuration for the wallet connector
#[derive(Debug, Clone)]
pub struct WalletConfig {
    /// Poll interval for providers that cannot push account changes
    pub account_poll_interval_ms: u64,
    /// Capacity of the account broadcast channel
    pub channel_capacity: usize,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            account_poll_interval_ms: 2000,
            channel_capacity: 16,
        }
    }
}

/// Capability to submit transactions as one account
///
/// Passed explicitly into every gateway write.
#[derive(Clone)]
pub struct Signer {
    account: Address,
    provider: Arc<dyn WalletProvider>,
}

impl Signer {
    pub fn new(account: Address, provider: Arc<dyn WalletProvider>) -> Self {
        Self { account, provider }
    }

    /// The account transactions are sent from
    pub fn address(&self) -> Address {
        self.account
    }

    pub fn provider(&self) -> &Arc<dyn WalletProvider> {
        &self.provider
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("account", &self.account)
            .field("provider", &self.provider.name())
            .finish()
    }
}

/// Source of the authoritative "now" for expiry computations
#[async_trait]
pub trait ChainClock: Send + Sync {
    /// Current chain time, unix seconds
    async fn now(&self) -> Result<u64, WalletError>;
}

/// Wallet connection and account publishing
pub struct WalletConnector {
    provider: Option<Arc<dyn WalletProvider>>,
    selected: RwLock<Option<Address>>,
    account_tx: broadcast::Sender<Option<Address>>,
    config: WalletConfig,
}

impl WalletConnector {
    /// Create a connector; `None` means no wallet is present
    pub fn new(provider: Option<Arc<dyn WalletProvider>>, config: WalletConfig) -> Self {
        let (account_tx, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            provider,
            selected: RwLock::new(None),
            account_tx,
            config,
        }
    }

    /// The underlying provider
    pub fn provider(&self) -> Result<&Arc<dyn WalletProvider>, WalletError> {
        self.provider.as_ref().ok_or(WalletError::ProviderUnavailable)
    }

    /// Subscribe to selected-account changes
    pub fn subscribe(&self) -> AccountStream {
        self.account_tx.subscribe()
    }

    /// Last published account
    pub async fn selected_account(&self) -> Option<Address> {
        *self.selected.read().await
    }

    /// Signer for the last published account, if any
    pub async fn current_signer(&self) -> Option<Signer> {
        let account = self.selected_account().await?;
        let provider = self.provider.clone()?;
        Some(Signer::new(account, provider))
    }

    /// Request account access and publish the first account
    pub async fn connect_wallet(&self) -> Result<Signer, WalletError> {
        let provider = match self.provider.as_ref() {
            Some(provider) => provider,
            None => {
                tracing::warn!("No wallet provider found");
                return Err(WalletError::ProviderUnavailable);
            }
        };

        let accounts = provider.request_accounts().await.map_err(|e| {
            tracing::error!(error = %e, "Error connecting wallet");
            WalletError::Provider(e)
        })?;

        let account = accounts.first().copied().ok_or(WalletError::NoAccounts)?;
        self.publish(Some(account)).await;

        tracing::info!(account = %account, provider = provider.name(), "Wallet connected");
        Ok(Signer::new(account, Arc::clone(provider)))
    }

    /// Publish the first already-authorized account, or `None`
    pub async fn check_wallet_connected(&self) -> Result<Option<Address>, WalletError> {
        let provider = self.provider()?;
        let accounts = provider.accounts().await.map_err(|e| {
            tracing::error!(error = %e, "Error checking wallet connection");
            WalletError::Provider(e)
        })?;

        let account = accounts.first().copied();
        self.publish(account).await;
        Ok(account)
    }

    /// Wei → ether string
    pub fn convert_to_ether(&self, value: U256) -> String {
        units::format_ether(value)
    }

    /// Ether string → wei
    pub fn convert_to_wei(&self, value: &str) -> Result<U256, WalletError> {
        Ok(units::parse_ether(value)?)
    }

    /// Timestamp of the latest block, unix seconds
    pub async fn latest_block_timestamp(&self) -> Result<u64, WalletError> {
        Ok(self.provider()?.latest_block_timestamp().await?)
    }

    async fn publish(&self, account: Option<Address>) {
        *self.selected.write().await = account;
        // No subscribers is fine
        let _ = self.account_tx.send(account);
    }

    /// Re-check and publish only when the first account differs
    async fn poll_accounts(&self) -> Result<(), WalletError> {
        let accounts = self.provider()?.accounts().await?;
        let account = accounts.first().copied();

        if self.selected_account().await != account {
            tracing::info!(account = ?account, "Wallet account changed");
            self.publish(account).await;
        }
        Ok(())
    }

    /// Follow wallet-initiated account changes in the background
    ///
    /// Providers that push `accountsChanged` are listened to; others are
    /// polled. Returns `None` when there is no provider.
    pub fn spawn_account_listener(self: Arc<Self>) -> Option<JoinHandle<()>> {
        let provider = self.provider.clone()?;

        if let Some(mut events) = provider.account_events() {
            tracing::debug!(provider = provider.name(), "Listening for account changes");
            return Some(tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                            if let Err(e) = self.check_wallet_connected().await {
                                tracing::warn!(error = %e, "Account re-check failed");
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }));
        }

        let interval = std::time::Duration::from_millis(self.config.account_poll_interval_ms.max(1));
        tracing::debug!(
            interval_ms = self.config.account_poll_interval_ms,
            "Polling for account changes"
        );

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Skip the first immediate tick
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if let Err(e) = self.poll_accounts().await {
                    tracing::warn!(error = %e, "Account poll failed");
                }
            }
        }))
    }
}

#[async_trait]
impl ChainClock for WalletConnector {
    async fn now(&self) -> Result<u64, WalletError> {
        self.latest_block_timestamp().await
    }
}
