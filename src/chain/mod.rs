//! Chain access
//!
//! Everything below the wallet and gateway layers:
//!
//! - **types**: addresses, transaction requests, receipts, hex quantities
//! - **units**: wei/ether fixed-point conversion
//! - **abi**: Solidity ABI encoder/decoder and function selectors
//! - **contracts**: factory and campaign contract interfaces
//! - **provider**: the wallet provider boundary and its HTTP implementation

pub mod abi;
pub mod contracts;
pub mod provider;
pub mod types;
pub mod units;

#[cfg(test)]
pub(crate) mod mock;

pub use abi::{AbiError, Function, ParamType, Token};
pub use contracts::{RawCampaignInfo, RawDonor, RawMilestone, RawVote};
pub use provider::{HttpProvider, HttpProviderConfig, ProviderError, ProviderExt, WalletProvider};
pub use types::{Address, InvalidAddress, LogEntry, TransactionRequest, TxReceipt};
pub use units::{eth_label, format_ether, parse_ether, UnitError};
