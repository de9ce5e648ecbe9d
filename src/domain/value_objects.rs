//! # Domain Value Objects
//!
//! Immutable value types for the confidential ledger client.

use super::errors::LedgerError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque reference to a ciphertext slot on the ledger.
///
/// The all-zero handle is a sentinel meaning "no ciphertext / value 0"
/// and must never be sent for decryption.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Handle(pub [u8; 32]);

impl Handle {
    /// The zero sentinel.
    pub const ZERO: Handle = Handle([0u8; 32]);

    /// Is this the zero sentinel?
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Parse from `0x`-prefixed hex. Accepts mixed case.
    pub fn from_hex(s: &str) -> Result<Self, LedgerError> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw)
            .map_err(|e| LedgerError::Validation(format!("bad handle hex: {e}")))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| LedgerError::Validation("handle must be 32 bytes".to_string()))?;
        Ok(Handle(arr))
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// 20-byte account or contract address.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Parse from `0x`-prefixed hex. Accepts mixed case.
    pub fn from_hex(s: &str) -> Result<Self, LedgerError> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw)
            .map_err(|e| LedgerError::Validation(format!("bad address hex: {e}")))?;
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| LedgerError::Validation("address must be 20 bytes".to_string()))?;
        Ok(Address(arr))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// A decrypted handle/value pairing.
///
/// Valid only while `handle` still matches the handle the ledger view
/// currently holds for that slot.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClearValue {
    /// The handle this value was decrypted from.
    pub handle: Handle,
    /// The clear value.
    pub value: u64,
}

/// Known chain identifiers, plus an explicit unresolved case.
///
/// Lookup sites match exhaustively; there is no string-keyed fallback.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChainTarget {
    /// Local hardhat devnet (chain id 31337).
    Hardhat,
    /// Sepolia testnet (chain id 11155111).
    Sepolia,
    /// A chain the client has no deployment for, or no chain at all.
    Unresolved,
}

impl ChainTarget {
    /// Resolve a raw chain id reported by the session provider.
    pub fn from_id(id: Option<u64>) -> Self {
        match id {
            Some(31337) => ChainTarget::Hardhat,
            Some(11155111) => ChainTarget::Sepolia,
            _ => ChainTarget::Unresolved,
        }
    }

    /// The numeric chain id, if resolved.
    pub fn id(&self) -> Option<u64> {
        match self {
            ChainTarget::Hardhat => Some(31337),
            ChainTarget::Sepolia => Some(11155111),
            ChainTarget::Unresolved => None,
        }
    }
}

/// Session context captured at the start of every asynchronous operation
/// and compared against the live context before results are applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionContext {
    /// Active chain.
    pub chain: ChainTarget,
    /// Active signing identity, if any.
    pub signer: Option<Address>,
    /// Contract address resolved for the active chain, if any.
    pub contract: Option<Address>,
}

/// Outcome of a guarded ledger operation.
///
/// Staleness and re-entry rejection are statuses, not errors: a failed
/// refresh or decrypt never crashes the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpStatus {
    /// The operation completed and its results were applied.
    Applied,
    /// Another operation of the same kind was already in flight.
    Busy,
    /// The session context changed mid-flight; results were discarded.
    Stale,
    /// Preconditions were not met; nothing was attempted.
    Skipped,
    /// The operation failed; a message was recorded, no retry.
    Failed,
}

/// Map an outcome clear value to its fixed reward label.
///
/// Values outside {0, 1, 2} have no label and are silently skipped.
pub fn outcome_label(value: u64) -> Option<&'static str> {
    match value {
        0 => Some("Reward 0 = 0.0001 ETH"),
        1 => Some("Reward 1 = 0.0005 ETH"),
        2 => Some("Reward 2 = 0.001 ETH"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_handle_sentinel() {
        assert!(Handle::ZERO.is_zero());
        assert!(!Handle([1u8; 32]).is_zero());
    }

    #[test]
    fn test_handle_hex_mixed_case() {
        let lower = Handle::from_hex(&format!("0x{}", "ab".repeat(32))).unwrap();
        let upper = Handle::from_hex(&format!("0x{}", "AB".repeat(32))).unwrap();
        assert_eq!(lower, upper);
    }

    #[test]
    fn test_handle_hex_rejects_bad_width() {
        assert!(Handle::from_hex("0x1234").is_err());
    }

    #[test]
    fn test_handle_display_roundtrip() {
        let h = Handle([0x5a; 32]);
        assert_eq!(Handle::from_hex(&h.to_string()).unwrap(), h);
    }

    #[test]
    fn test_address_hex() {
        let a = Address::from_hex(&format!("0x{}", "cd".repeat(20))).unwrap();
        assert_eq!(a.to_string(), format!("0x{}", "cd".repeat(20)));
    }

    #[test]
    fn test_chain_target_from_id() {
        assert_eq!(ChainTarget::from_id(Some(31337)), ChainTarget::Hardhat);
        assert_eq!(ChainTarget::from_id(Some(11155111)), ChainTarget::Sepolia);
        assert_eq!(ChainTarget::from_id(Some(1)), ChainTarget::Unresolved);
        assert_eq!(ChainTarget::from_id(None), ChainTarget::Unresolved);
    }

    #[test]
    fn test_chain_target_id_roundtrip() {
        assert_eq!(ChainTarget::Hardhat.id(), Some(31337));
        assert_eq!(ChainTarget::Unresolved.id(), None);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(outcome_label(0), Some("Reward 0 = 0.0001 ETH"));
        assert_eq!(outcome_label(1), Some("Reward 1 = 0.0005 ETH"));
        assert_eq!(outcome_label(2), Some("Reward 2 = 0.001 ETH"));
        assert_eq!(outcome_label(3), None);
    }
}
