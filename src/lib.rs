//! # Crowdfund
//!
//! Client for a crowdfunding application backed by on-chain contracts: a
//! factory that deploys one contract per campaign, with milestone-based
//! fund release voted on by donors.
//!
//! ## Features
//!
//! - **Wallet connection**: EIP-1193 style provider boundary, account change tracking
//! - **Contract access**: built-in Solidity ABI codec, read queries and confirmed writes
//! - **Local mirror**: SQLite cache of campaign view models for offline listing
//! - **Safe refresh**: generation-tokened passes that never apply stale results
//!
//! ## Modules
//!
//! - [`chain`]: addresses, units, ABI codec, contract interfaces, providers
//! - [`wallet`]: wallet connector and signer context
//! - [`gateway`]: chain gateway for reads and writes
//! - [`store`]: local mirror store
//! - [`campaign`]: view models, builder, refresh orchestration, actions
//! - [`config`], [`logging`], [`context`]: ambient setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use crowdfund::{AppContext, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ctx = AppContext::new(Config::load_default())?;
//!     let chain = ctx.chain()?;
//!
//!     // Rebuild the campaign list from the chain
//!     let report = chain.refresher.refresh().await?;
//!     println!("{} campaigns refreshed", report.updated);
//!
//!     // Donate to the first campaign as the connected account
//!     let signer = ctx.wallet.connect_wallet().await?;
//!     if let Some(first) = chain.refresher.campaigns().await.first() {
//!         let outcome = chain.actions.donate(&signer, first.campaign_address, "0.01").await?;
//!         println!("Confirmed in block {}", outcome.receipt.block_number);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod campaign;
pub mod chain;
pub mod config;
pub mod context;
pub mod gateway;
pub mod logging;
pub mod store;
pub mod wallet;

// Re-export top-level types for convenience
pub use campaign::{
    ActionError, ActionOutcome, CampaignActions, CampaignRefresher, CampaignView,
    CreateCampaignRequest, MilestoneStatus, MilestoneView, RefreshError, RefreshPhase,
    RefreshReport, ViewModelBuilder,
};

pub use chain::{Address, HttpProvider, ProviderError, TxReceipt, WalletProvider};

pub use config::{Config, ConfigError, LoggingConfig};

pub use context::{AppContext, ChainServices, ContextError};

pub use gateway::{ChainGateway, GatewayConfig, GatewayError, TxError, TxErrorKind};

pub use store::{MirrorStore, StoreError, StoreResult};

pub use wallet::{Signer, WalletConnector, WalletError};
