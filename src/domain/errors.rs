//! # Domain Errors
//!
//! Error types for the confidential ledger client.

use thiserror::Error;

/// Ledger client error types.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A record has a malformed shape. Fatal on an explicit `put`,
    /// degraded to a cache miss on read.
    #[error("Malformed record: {0}")]
    Validation(String),

    /// No bytecode at the target contract address.
    #[error("Contract not found at {address}")]
    NotDeployed {
        /// The address that was probed.
        address: String,
    },

    /// The signer rejected or failed the authorization request.
    #[error("Decryption authorization denied")]
    AuthorizationDenied,

    /// Network failure while talking to the ledger or engine.
    #[error("Network error: {0}")]
    Network(String),

    /// Contract call reverted or returned malformed data.
    #[error("Contract call failed: {0}")]
    Contract(String),

    /// Durable store failure.
    #[error("Store error: {0}")]
    Store(String),
}
