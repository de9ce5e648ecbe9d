//! # Client Configuration
//!
//! Configuration for the ledger client: deployment addresses per chain,
//! the purchase price, and the authorization duration policy.

use crate::authorization::DEFAULT_AUTHORIZATION_DURATION_DAYS;
use crate::domain::{Address, ChainTarget};
use serde::{Deserialize, Serialize};

/// Ledger client configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Contract deployment on the hardhat devnet, if any.
    pub hardhat_contract: Option<Address>,
    /// Contract deployment on Sepolia, if any.
    pub sepolia_contract: Option<Address>,
    /// Price of one purchase, in wei (0.0002 ETH by default).
    pub purchase_price_wei: u128,
    /// Validity window of new decryption authorizations, in days.
    pub authorization_duration_days: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hardhat_contract: None,
            sepolia_contract: None,
            purchase_price_wei: 200_000_000_000_000,
            authorization_duration_days: DEFAULT_AUTHORIZATION_DURATION_DAYS,
        }
    }
}

impl ClientConfig {
    /// The deployed contract address for a chain, if known.
    pub fn contract_for(&self, chain: ChainTarget) -> Option<Address> {
        match chain {
            ChainTarget::Hardhat => self.hardhat_contract,
            ChainTarget::Sepolia => self.sepolia_contract,
            ChainTarget::Unresolved => None,
        }
    }

    /// Config for tests: a hardhat deployment and a short
    /// authorization window.
    pub fn for_testing(contract: Address) -> Self {
        Self {
            hardhat_contract: Some(contract),
            sepolia_contract: None,
            purchase_price_wei: 200_000_000_000_000,
            authorization_duration_days: 1,
        }
    }
}
