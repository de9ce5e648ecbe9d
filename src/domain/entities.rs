//! # Domain Entities
//!
//! The in-memory ledger view and the cached cryptographic records.

use super::value_objects::{Address, ClearValue, Handle};
use serde::{Deserialize, Serialize};

/// Public key material cached per authority. Key and id are always
/// written together; an entry is overwritten wholesale on refresh.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedKeyMaterial {
    /// Opaque key identifier.
    pub key_id: String,
    /// The public key blob.
    pub bytes: Vec<u8>,
}

/// Public parameters cached per authority, stored independently from
/// the key material.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedParams {
    /// Opaque parameter-set identifier.
    pub params_id: String,
    /// The public parameters blob.
    pub bytes: Vec<u8>,
}

/// A signed, time-bounded permission to decrypt handles under a set of
/// authorities for one user. Immutable once created.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecryptionAuthorization {
    /// Ephemeral private key generated by the engine.
    pub private_key: Vec<u8>,
    /// Matching public key, covered by the signature.
    pub public_key: Vec<u8>,
    /// Signature produced by the user's signer.
    pub signature: Vec<u8>,
    /// Sorted, deduplicated authority addresses the grant covers.
    pub authority_addresses: Vec<Address>,
    /// The signing identity the grant belongs to.
    pub user_address: Address,
    /// Unix timestamp at which validity starts.
    pub start_timestamp: u64,
    /// Validity window length in days.
    pub duration_days: u64,
}

impl DecryptionAuthorization {
    /// Still within the validity window at `now`?
    pub fn is_valid(&self, now: u64) -> bool {
        now < self.start_timestamp + self.duration_days * 86_400
    }
}

/// Unsigned authorization payload handed to the signer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizationPayload {
    /// Public key the signature will cover.
    pub public_key: Vec<u8>,
    /// Sorted, deduplicated authority addresses.
    pub authority_addresses: Vec<Address>,
    /// The requesting user.
    pub user_address: Address,
    /// Unix timestamp at which validity starts.
    pub start_timestamp: u64,
    /// Validity window length in days.
    pub duration_days: u64,
}

/// The client's local view of on-chain state.
///
/// Superseded wholesale on every refresh; cached clear values are only
/// meaningful while their handle still matches the slot's current handle.
#[derive(Clone, Debug, Default)]
pub struct LedgerView {
    /// Caller's encrypted balance handle.
    pub balance_handle: Option<Handle>,
    /// Caller's last-outcome handle.
    pub outcome_handle: Option<Handle>,
    /// Aggregate purchases counter handle.
    pub total_purchased_handle: Option<Handle>,
    /// Aggregate opens counter handle.
    pub total_opened_handle: Option<Handle>,
    /// Plain pool balance in wei.
    pub pool_balance_wei: Option<u128>,
    /// Plain owner address.
    pub owner: Option<Address>,
    /// Decrypted balance, keyed by the handle it came from.
    pub balance_clear: Option<ClearValue>,
    /// Decrypted last outcome, keyed by the handle it came from.
    pub outcome_clear: Option<ClearValue>,
    /// Whether bytecode was present at the last probe. `None` = unknown.
    pub deployed: Option<bool>,
    /// Last user-visible message.
    pub message: String,
}

impl LedgerView {
    /// Fresh empty view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all cached handles and plain values, e.g. when the contract
    /// turns out not to be deployed or no contract is resolved.
    pub fn clear_handles(&mut self) {
        self.balance_handle = None;
        self.outcome_handle = None;
        self.total_purchased_handle = None;
        self.total_opened_handle = None;
        self.pool_balance_wei = None;
        self.owner = None;
    }

    /// Record a user-visible message.
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }

    /// Decrypted balance, or `None` if absent or stale (the clear value's
    /// handle no longer matches the slot).
    pub fn current_balance_clear(&self) -> Option<u64> {
        self.balance_clear
            .filter(|c| Some(c.handle) == self.balance_handle)
            .map(|c| c.value)
    }

    /// Decrypted last outcome, with the same staleness rule.
    pub fn current_outcome_clear(&self) -> Option<u64> {
        self.outcome_clear
            .filter(|c| Some(c.handle) == self.outcome_handle)
            .map(|c| c.value)
    }

    /// Has the current outcome handle been decrypted?
    pub fn is_outcome_decrypted(&self) -> bool {
        self.current_outcome_clear().is_some()
    }
}
