//! # Outbound Ports
//!
//! Traits for external dependencies: the confidential ledger contract,
//! the confidential-computation engine, the user's signer, the session
//! context provider, and the durable material store.

use crate::domain::{
    Address, AuthorizationPayload, CachedKeyMaterial, CachedParams, ChainTarget,
    DecryptionAuthorization, Handle, LedgerError,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// A handle/contract pair submitted for batched decryption.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecryptTarget {
    /// The ciphertext handle. Never the zero sentinel.
    pub handle: Handle,
    /// The contract the ciphertext belongs to.
    pub contract: Address,
}

/// A submitted state-changing request whose finalization must be
/// awaited before any follow-up refresh.
#[async_trait]
pub trait PendingReceipt: Send {
    /// Await finalization of the submitted request.
    async fn confirmed(self: Box<Self>) -> Result<(), LedgerError>;
}

/// Confidential ledger contract - outbound port.
#[async_trait]
pub trait LedgerContract: Send + Sync {
    /// Is there bytecode at the target address?
    async fn bytecode_present(&self) -> Result<bool, LedgerError>;

    /// Caller's encrypted balance handle.
    async fn balance_handle(&self) -> Result<Handle, LedgerError>;

    /// Caller's last-outcome handle.
    async fn last_outcome_handle(&self) -> Result<Handle, LedgerError>;

    /// Aggregate purchases counter handle.
    async fn total_purchased_handle(&self) -> Result<Handle, LedgerError>;

    /// Aggregate opens counter handle.
    async fn total_opened_handle(&self) -> Result<Handle, LedgerError>;

    /// Plain pool balance in wei.
    async fn pool_balance(&self) -> Result<u128, LedgerError>;

    /// Plain owner address.
    async fn owner(&self) -> Result<Address, LedgerError>;

    /// Submit a value-bearing purchase.
    async fn submit_buy(&self, value_wei: u128) -> Result<Box<dyn PendingReceipt>, LedgerError>;

    /// Submit an open request.
    async fn submit_open(&self) -> Result<Box<dyn PendingReceipt>, LedgerError>;

    /// Submit a claim request.
    async fn submit_claim(&self) -> Result<Box<dyn PendingReceipt>, LedgerError>;

    /// Submit a value-bearing pool funding.
    async fn submit_fund(&self, value_wei: u128) -> Result<Box<dyn PendingReceipt>, LedgerError>;
}

/// Ephemeral keypair generated by the engine for one authorization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineKeypair {
    /// Private half, kept inside the authorization.
    pub private_key: Vec<u8>,
    /// Public half, covered by the user's signature.
    pub public_key: Vec<u8>,
}

/// Confidential-computation engine - outbound port.
///
/// The engine performs the actual key management and ciphertext math;
/// the client only calls through this narrow surface.
#[async_trait]
pub trait ConfidentialEngine: Send + Sync {
    /// Generate an ephemeral keypair for a decryption authorization.
    fn generate_keypair(&self) -> EngineKeypair;

    /// Current public key material for an authority.
    async fn public_key(&self, authority: Address) -> Result<CachedKeyMaterial, LedgerError>;

    /// Current public parameters for an authority.
    async fn public_params(&self, authority: Address) -> Result<CachedParams, LedgerError>;

    /// Batched user decryption of the given targets under a valid
    /// authorization. Returns clear values keyed by handle.
    async fn user_decrypt(
        &self,
        targets: &[DecryptTarget],
        authorization: &DecryptionAuthorization,
    ) -> Result<HashMap<Handle, u64>, LedgerError>;
}

/// External signer - outbound port. May reject.
#[async_trait]
pub trait AuthorizationSigner: Send + Sync {
    /// Address of the signing identity.
    fn address(&self) -> Address;

    /// Produce a signature over a structured authorization payload.
    async fn sign_authorization(
        &self,
        payload: &AuthorizationPayload,
    ) -> Result<Vec<u8>, LedgerError>;
}

/// Session context provider - outbound port.
///
/// Reports the live chain and signing identity; the staleness detector
/// compares these against captured snapshots.
pub trait SessionProvider: Send + Sync {
    /// The active chain.
    fn chain(&self) -> ChainTarget;

    /// The active signing identity, if any.
    fn signer(&self) -> Option<Address>;
}

/// Record group in the durable material store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordGroup {
    /// Public key material records.
    PublicKey,
    /// Public parameter records.
    PublicParams,
}

/// Durable keyed store for per-authority material - outbound port.
///
/// Two independent record groups, both keyed by authority address; each
/// record is an opaque encoded blob.
#[async_trait]
pub trait MaterialStore: Send + Sync {
    /// Load the record for an authority, if present.
    async fn load(
        &self,
        group: RecordGroup,
        authority: Address,
    ) -> Result<Option<Vec<u8>>, LedgerError>;

    /// Store (or overwrite) the record for an authority.
    async fn store(
        &self,
        group: RecordGroup,
        authority: Address,
        record: Vec<u8>,
    ) -> Result<(), LedgerError>;
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// Mutable state behind [`MockLedgerContract`].
#[derive(Clone, Debug)]
pub struct MockLedgerState {
    /// Bytecode present at the address?
    pub deployed: bool,
    /// Balance handle returned to the caller.
    pub balance_handle: Handle,
    /// Last-outcome handle returned to the caller.
    pub outcome_handle: Handle,
    /// Aggregate purchases handle.
    pub total_purchased_handle: Handle,
    /// Aggregate opens handle.
    pub total_opened_handle: Handle,
    /// Pool balance in wei.
    pub pool_balance: u128,
    /// Owner address.
    pub owner: Address,
    /// Fail all read calls?
    pub fail_reads: bool,
    /// Fail receipt finalization?
    pub fail_writes: bool,
}

impl Default for MockLedgerState {
    fn default() -> Self {
        Self {
            deployed: true,
            balance_handle: Handle::ZERO,
            outcome_handle: Handle::ZERO,
            total_purchased_handle: Handle::ZERO,
            total_opened_handle: Handle::ZERO,
            pool_balance: 0,
            owner: Address([0u8; 20]),
            fail_reads: false,
            fail_writes: false,
        }
    }
}

/// Mock ledger contract for testing, with call counters and an optional
/// gate that holds the bytecode probe open until released.
#[derive(Default)]
pub struct MockLedgerContract {
    state: Mutex<MockLedgerState>,
    gate: Mutex<Option<Arc<tokio::sync::Notify>>>,
    /// Number of read calls observed.
    pub read_calls: AtomicUsize,
    /// Number of write submissions observed.
    pub write_calls: AtomicUsize,
}

impl MockLedgerContract {
    /// Mock with the given initial state.
    pub fn with_state(state: MockLedgerState) -> Self {
        Self {
            state: Mutex::new(state),
            ..Default::default()
        }
    }

    /// Mutate the mock state.
    pub fn update<F: FnOnce(&mut MockLedgerState)>(&self, f: F) {
        f(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner));
    }

    /// Install a gate: the next bytecode probes will wait until
    /// [`tokio::sync::Notify::notify_one`] is called on the returned handle.
    pub fn install_gate(&self) -> Arc<tokio::sync::Notify> {
        let notify = Arc::new(tokio::sync::Notify::new());
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(notify.clone());
        notify
    }

    /// Remove the gate so later probes run ungated.
    pub fn clear_gate(&self) {
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn snapshot(&self) -> MockLedgerState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn count_read(&self) -> Result<MockLedgerState, LedgerError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.snapshot();
        if state.fail_reads {
            return Err(LedgerError::Network("mock read failure".to_string()));
        }
        Ok(state)
    }

    fn submit(&self) -> Result<Box<dyn PendingReceipt>, LedgerError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let fail = self.snapshot().fail_writes;
        Ok(Box::new(MockReceipt { fail }))
    }
}

/// Mock receipt that finalizes immediately.
pub struct MockReceipt {
    fail: bool,
}

#[async_trait]
impl PendingReceipt for MockReceipt {
    async fn confirmed(self: Box<Self>) -> Result<(), LedgerError> {
        if self.fail {
            return Err(LedgerError::Contract("mock write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerContract for MockLedgerContract {
    async fn bytecode_present(&self) -> Result<bool, LedgerError> {
        let gate = self
            .gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(notify) = gate {
            notify.notified().await;
        }
        Ok(self.count_read()?.deployed)
    }

    async fn balance_handle(&self) -> Result<Handle, LedgerError> {
        Ok(self.count_read()?.balance_handle)
    }

    async fn last_outcome_handle(&self) -> Result<Handle, LedgerError> {
        Ok(self.count_read()?.outcome_handle)
    }

    async fn total_purchased_handle(&self) -> Result<Handle, LedgerError> {
        Ok(self.count_read()?.total_purchased_handle)
    }

    async fn total_opened_handle(&self) -> Result<Handle, LedgerError> {
        Ok(self.count_read()?.total_opened_handle)
    }

    async fn pool_balance(&self) -> Result<u128, LedgerError> {
        Ok(self.count_read()?.pool_balance)
    }

    async fn owner(&self) -> Result<Address, LedgerError> {
        Ok(self.count_read()?.owner)
    }

    async fn submit_buy(&self, _value_wei: u128) -> Result<Box<dyn PendingReceipt>, LedgerError> {
        self.submit()
    }

    async fn submit_open(&self) -> Result<Box<dyn PendingReceipt>, LedgerError> {
        self.submit()
    }

    async fn submit_claim(&self) -> Result<Box<dyn PendingReceipt>, LedgerError> {
        self.submit()
    }

    async fn submit_fund(&self, _value_wei: u128) -> Result<Box<dyn PendingReceipt>, LedgerError> {
        self.submit()
    }
}

/// Mock confidential-computation engine.
#[derive(Default)]
pub struct MockEngine {
    results: Mutex<HashMap<Handle, u64>>,
    gate: Mutex<Option<Arc<tokio::sync::Notify>>>,
    /// Fail decrypt calls?
    pub fail_decrypt: AtomicBool,
    /// Number of decrypt calls observed.
    pub decrypt_calls: AtomicUsize,
    /// Number of keypairs generated.
    pub keypair_calls: AtomicUsize,
}

impl MockEngine {
    /// Set the clear value the engine will return for a handle.
    pub fn set_clear(&self, handle: Handle, value: u64) {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, value);
    }

    /// Install a gate: decrypt calls wait until notified.
    pub fn install_gate(&self) -> Arc<tokio::sync::Notify> {
        let notify = Arc::new(tokio::sync::Notify::new());
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(notify.clone());
        notify
    }
}

#[async_trait]
impl ConfidentialEngine for MockEngine {
    fn generate_keypair(&self) -> EngineKeypair {
        self.keypair_calls.fetch_add(1, Ordering::SeqCst);
        EngineKeypair {
            private_key: vec![0x11; 32],
            public_key: vec![0x22; 32],
        }
    }

    async fn public_key(&self, authority: Address) -> Result<CachedKeyMaterial, LedgerError> {
        Ok(CachedKeyMaterial {
            key_id: format!("mock-key-{authority}"),
            bytes: vec![1, 2, 3],
        })
    }

    async fn public_params(&self, authority: Address) -> Result<CachedParams, LedgerError> {
        Ok(CachedParams {
            params_id: format!("mock-params-{authority}"),
            bytes: vec![4, 5, 6],
        })
    }

    async fn user_decrypt(
        &self,
        targets: &[DecryptTarget],
        _authorization: &DecryptionAuthorization,
    ) -> Result<HashMap<Handle, u64>, LedgerError> {
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self
            .gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(notify) = gate {
            notify.notified().await;
        }
        if self.fail_decrypt.load(Ordering::SeqCst) {
            return Err(LedgerError::Network("mock decrypt failure".to_string()));
        }
        debug_assert!(
            targets.iter().all(|t| !t.handle.is_zero()),
            "zero sentinel must never reach the engine"
        );
        let results = self
            .results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Ok(targets
            .iter()
            .filter_map(|t| results.get(&t.handle).map(|v| (t.handle, *v)))
            .collect())
    }
}

/// Mock signer with a rejection toggle and an invocation counter.
pub struct MockSigner {
    addr: Address,
    gate: Mutex<Option<Arc<tokio::sync::Notify>>>,
    /// Reject signature requests?
    pub reject: AtomicBool,
    /// Number of signature requests observed.
    pub sign_calls: AtomicUsize,
}

impl MockSigner {
    /// Mock signer with the given identity.
    pub fn new(addr: Address) -> Self {
        Self {
            addr,
            gate: Mutex::new(None),
            reject: AtomicBool::new(false),
            sign_calls: AtomicUsize::new(0),
        }
    }

    /// Install a gate: signature requests wait until notified.
    pub fn install_gate(&self) -> Arc<tokio::sync::Notify> {
        let notify = Arc::new(tokio::sync::Notify::new());
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(notify.clone());
        notify
    }
}

#[async_trait]
impl AuthorizationSigner for MockSigner {
    fn address(&self) -> Address {
        self.addr
    }

    async fn sign_authorization(
        &self,
        payload: &AuthorizationPayload,
    ) -> Result<Vec<u8>, LedgerError> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self
            .gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(notify) = gate {
            notify.notified().await;
        }
        if self.reject.load(Ordering::SeqCst) {
            return Err(LedgerError::AuthorizationDenied);
        }
        // Deterministic stand-in signature over the payload shape.
        let mut sig = vec![0xab; 4];
        sig.extend_from_slice(&payload.start_timestamp.to_be_bytes());
        Ok(sig)
    }
}

/// Mock session provider whose chain and signer can be switched
/// mid-flight to exercise staleness detection.
pub struct MockSession {
    inner: Mutex<(ChainTarget, Option<Address>)>,
}

impl MockSession {
    /// Session pinned to a chain and signer.
    pub fn new(chain: ChainTarget, signer: Option<Address>) -> Self {
        Self {
            inner: Mutex::new((chain, signer)),
        }
    }

    /// Switch the active chain.
    pub fn set_chain(&self, chain: ChainTarget) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .0 = chain;
    }

    /// Switch the active signing identity.
    pub fn set_signer(&self, signer: Option<Address>) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .1 = signer;
    }
}

impl SessionProvider for MockSession {
    fn chain(&self) -> ChainTarget {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).0
    }

    fn signer(&self) -> Option<Address> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).1
    }
}
