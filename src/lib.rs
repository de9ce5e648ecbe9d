//! # Confidential Ledger Client
//!
//! Client-side state synchronization for a smart contract that stores
//! values in encrypted form. The client tracks encrypted handles,
//! obtains one-time authorization to decrypt them, and keeps its local
//! view consistent despite slow, failable asynchronous network and
//! signing operations.
//!
//! ## What makes this non-trivial
//!
//! - Operations overlap: a user can switch the active chain or signing
//!   identity while a call is suspended mid-flight. Every operation
//!   snapshots the session context and discards its own results if the
//!   context changed before completion.
//! - Decryption authorizations are signed by the user and cached with a
//!   time-bounded validity window; a valid cached grant must never
//!   trigger a second signature prompt.
//! - One in-flight operation per kind: re-entrant refreshes, decrypts,
//!   and submissions are rejected, not queued.
//!
//! ## Module Structure
//!
//! ```text
//! confidential-ledger/
//! ├── domain/           # Handles, addresses, the ledger view, errors
//! ├── ports/            # Outbound dependency traits + mocks
//! ├── cache             # Durable per-authority key/parameter cache
//! ├── authorization     # Decryption authorization manager
//! ├── guard             # Operation guards + staleness detector
//! ├── application/      # LedgerService orchestrating everything
//! ├── adapters/         # In-memory material store
//! └── config            # ClientConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod application;
pub mod authorization;
pub mod cache;
pub mod config;
pub mod domain;
pub mod guard;
pub mod ports;

// Re-exports
pub use adapters::MemoryMaterialStore;
pub use application::LedgerService;
pub use authorization::{AuthorizationManager, DEFAULT_AUTHORIZATION_DURATION_DAYS};
pub use cache::{CachedMaterial, MaterialCache};
pub use config::ClientConfig;
pub use domain::{
    outcome_label, Address, AuthorizationPayload, CachedKeyMaterial, CachedParams, ChainTarget,
    ClearValue, DecryptionAuthorization, Handle, LedgerError, LedgerView, OpStatus,
    SessionContext,
};
pub use guard::{ContextSnapshot, OpFlag, OpGuards, OpKind, OpPermit};
pub use ports::{
    AuthorizationSigner, ConfidentialEngine, DecryptTarget, EngineKeypair, LedgerContract,
    MaterialStore, PendingReceipt, RecordGroup, SessionProvider,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
