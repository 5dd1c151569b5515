//! Chain Gateway
//!
//! Builds, submits and decodes calls to the crowdfunding contracts.
//!
//! - **client**: [`ChainGateway`] with the read queries and the six writes
//! - **error**: [`GatewayError`] for reads, [`TxError`] for writes
//!
//! # Architecture
//!
//! ```text
//! Read:   ChainGateway → eth_call → ABI decode → Raw* tuple
//! Write:  Signer → eth_sendTransaction → poll receipt → TxReceipt | TxError
//! ```

pub mod client;
pub mod error;

pub use client::{ChainGateway, GasLimits, GatewayConfig};
pub use error::{GatewayError, GatewayResult, TxError, TxErrorKind, TxResult};
