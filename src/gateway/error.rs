//! Gateway error types
//!
//! Reads fail with [`GatewayError`]. Writes fail with [`TxError`], a kind
//! plus the provider's detail text.

use crate::chain::abi::AbiError;
use crate::chain::provider::ProviderError;
use crate::chain::types::Address;
use std::fmt;
use thiserror::Error;

/// Errors from read-only contract queries
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Call arguments did not match the function's inputs
    #[error("Failed to encode {call}: {source}")]
    Encode {
        call: &'static str,
        #[source]
        source: AbiError,
    },

    /// The provider could not answer the call
    #[error("{call} on {target} failed: {source}")]
    ReadFailure {
        call: &'static str,
        target: Address,
        #[source]
        source: ProviderError,
    },

    /// Return data did not match the function's outputs
    #[error("Failed to decode {call} return data: {source}")]
    Decode {
        call: &'static str,
        #[source]
        source: AbiError,
    },
}

impl GatewayError {
    /// The call executed and reverted
    pub fn is_revert(&self) -> bool {
        matches!(self, GatewayError::ReadFailure { source, .. } if source.is_revert())
    }
}

/// Result type alias for gateway reads
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Why a write failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxErrorKind {
    /// The user declined in the wallet
    UserRejected,
    /// The node refused the transaction (insufficient funds, bad nonce...)
    Rejected,
    /// Execution reverted, at estimation or in the mined receipt
    Reverted,
    /// Transport failure reaching the provider
    Network,
    /// No receipt within the confirmation timeout
    Timeout,
    /// The provider answered with something unusable
    InvalidResponse,
    /// Call arguments could not be encoded
    Encoding,
}

impl fmt::Display for TxErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TxErrorKind::UserRejected => "user rejected",
            TxErrorKind::Rejected => "rejected",
            TxErrorKind::Reverted => "reverted",
            TxErrorKind::Network => "network error",
            TxErrorKind::Timeout => "timed out",
            TxErrorKind::InvalidResponse => "invalid response",
            TxErrorKind::Encoding => "encoding error",
        };
        f.write_str(label)
    }
}

/// A failed write
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Transaction {kind}: {detail}")]
pub struct TxError {
    pub kind: TxErrorKind,
    pub detail: String,
}

impl TxError {
    pub fn new(kind: TxErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Classify a provider failure
    pub fn from_provider(err: &ProviderError) -> Self {
        let kind = if err.is_user_rejection() {
            TxErrorKind::UserRejected
        } else if err.is_revert() {
            TxErrorKind::Reverted
        } else {
            match err {
                ProviderError::Unavailable
                | ProviderError::Request(_)
                | ProviderError::Http { .. }
                | ProviderError::Timeout => TxErrorKind::Network,
                ProviderError::Rpc { .. } => TxErrorKind::Rejected,
                ProviderError::InvalidResponse(_) => TxErrorKind::InvalidResponse,
            }
        };

        let detail = match err {
            ProviderError::Rpc { message, .. } => message.clone(),
            other => other.to_string(),
        };

        Self::new(kind, detail)
    }
}

impl From<ProviderError> for TxError {
    fn from(err: ProviderError) -> Self {
        TxError::from_provider(&err)
    }
}

impl From<AbiError> for TxError {
    fn from(err: AbiError) -> Self {
        TxError::new(TxErrorKind::Encoding, err.to_string())
    }
}

/// Result type alias for gateway writes
pub type TxResult<T> = Result<T, TxError>;
