//! Wallet layer
//!
//! Connects to the user's wallet provider and tracks the selected account.
//! Writes never read ambient wallet state: they take an explicit [`Signer`]
//! obtained from [`WalletConnector::connect_wallet`] or
//! [`WalletConnector::current_signer`].

pub mod connector;

pub use connector::{AccountStream, ChainClock, Signer, WalletConfig, WalletConnector, WalletError};
