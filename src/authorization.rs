//! # Decryption Authorization Manager
//!
//! Builds, signs, and caches the time-bounded authorizations that allow
//! decryption of handles under a given authority set and user identity.
//!
//! Cache key = (sorted deduplicated authorities, signer address), which
//! structurally prevents a signature from ever being reused across a
//! different authority set or signer. A hit that is still inside its
//! validity window is returned unchanged; everything else requires a
//! fresh signature.

use crate::domain::{Address, AuthorizationPayload, DecryptionAuthorization};
use crate::ports::{AuthorizationSigner, ConfidentialEngine};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::{debug, warn};

/// Default validity window for a new authorization.
pub const DEFAULT_AUTHORIZATION_DURATION_DAYS: u64 = 365;

static SHARED: OnceLock<Arc<AuthorizationManager>> = OnceLock::new();

/// Cache key: sorted deduplicated authorities plus the signer identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct AuthKey {
    authorities: Vec<Address>,
    user: Address,
}

impl AuthKey {
    fn new(authorities: &[Address], user: Address) -> Self {
        let mut authorities = authorities.to_vec();
        authorities.sort();
        authorities.dedup();
        Self { authorities, user }
    }
}

/// Process-wide manager of decryption authorizations.
pub struct AuthorizationManager {
    cache: Mutex<HashMap<AuthKey, DecryptionAuthorization>>,
    duration_days: u64,
}

impl AuthorizationManager {
    /// Manager issuing authorizations valid for `duration_days`.
    pub fn new(duration_days: u64) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            duration_days,
        }
    }

    /// The process-wide manager, created on first access with the
    /// default duration policy.
    pub fn shared() -> Arc<AuthorizationManager> {
        SHARED
            .get_or_init(|| Arc::new(AuthorizationManager::new(DEFAULT_AUTHORIZATION_DURATION_DAYS)))
            .clone()
    }

    /// Return a cached, unexpired authorization for the authority set and
    /// signer identity, or build and sign a new one.
    ///
    /// `None` means "authorization unavailable" (the signer rejected, or
    /// the engine failed); callers abort the dependent operation without
    /// raising a fatal error.
    pub async fn load_or_sign(
        &self,
        engine: &dyn ConfidentialEngine,
        signer: &dyn AuthorizationSigner,
        authorities: &[Address],
        now: u64,
    ) -> Option<DecryptionAuthorization> {
        let key = AuthKey::new(authorities, signer.address());

        if let Some(existing) = self.lookup(&key) {
            if existing.is_valid(now) {
                debug!(user = %key.user, "reusing cached decryption authorization");
                return Some(existing);
            }
            debug!(user = %key.user, "cached authorization expired, re-signing");
        }

        // Make sure the engine holds current key material for every
        // authority before asking the user for a signature.
        for authority in &key.authorities {
            if let Err(e) = engine.public_key(*authority).await {
                warn!(%authority, "engine key material unavailable: {e}");
                return None;
            }
        }

        let keypair = engine.generate_keypair();
        let payload = AuthorizationPayload {
            public_key: keypair.public_key.clone(),
            authority_addresses: key.authorities.clone(),
            user_address: key.user,
            start_timestamp: now,
            duration_days: self.duration_days,
        };

        let signature = match signer.sign_authorization(&payload).await {
            Ok(signature) => signature,
            Err(e) => {
                warn!(user = %key.user, "signature request failed: {e}");
                return None;
            }
        };

        let authorization = DecryptionAuthorization {
            private_key: keypair.private_key,
            public_key: keypair.public_key,
            signature,
            authority_addresses: key.authorities.clone(),
            user_address: key.user,
            start_timestamp: now,
            duration_days: self.duration_days,
        };
        self.insert(key, authorization.clone());
        Some(authorization)
    }

    fn lookup(&self, key: &AuthKey) -> Option<DecryptionAuthorization> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn insert(&self, key: AuthKey, authorization: DecryptionAuthorization) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, authorization);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{MockEngine, MockSigner};
    use std::sync::atomic::Ordering;

    fn authority(byte: u8) -> Address {
        Address([byte; 20])
    }

    #[tokio::test]
    async fn test_sign_then_cache_hit_skips_signer() {
        let engine = MockEngine::default();
        let signer = MockSigner::new(authority(0xaa));
        let manager = AuthorizationManager::new(10);

        let first = manager
            .load_or_sign(&engine, &signer, &[authority(1)], 1_000)
            .await
            .unwrap();
        assert_eq!(signer.sign_calls.load(Ordering::SeqCst), 1);

        let second = manager
            .load_or_sign(&engine, &signer, &[authority(1)], 2_000)
            .await
            .unwrap();
        assert_eq!(signer.sign_calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_expired_entry_is_replaced_with_one_signature() {
        let engine = MockEngine::default();
        let signer = MockSigner::new(authority(0xaa));
        let manager = AuthorizationManager::new(1);

        let first = manager
            .load_or_sign(&engine, &signer, &[authority(1)], 1_000)
            .await
            .unwrap();

        // Past start + 1 day: the cached entry is discarded and re-signed.
        let later = 1_000 + 86_400;
        let second = manager
            .load_or_sign(&engine, &signer, &[authority(1)], later)
            .await
            .unwrap();
        assert_eq!(signer.sign_calls.load(Ordering::SeqCst), 2);
        assert_eq!(second.start_timestamp, later);
        assert_ne!(first.start_timestamp, second.start_timestamp);

        // The replacement is now the cached entry.
        manager
            .load_or_sign(&engine, &signer, &[authority(1)], later + 10)
            .await
            .unwrap();
        assert_eq!(signer.sign_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_authority_order_does_not_split_cache() {
        let engine = MockEngine::default();
        let signer = MockSigner::new(authority(0xaa));
        let manager = AuthorizationManager::new(10);

        manager
            .load_or_sign(&engine, &signer, &[authority(2), authority(1)], 1_000)
            .await
            .unwrap();
        manager
            .load_or_sign(&engine, &signer, &[authority(1), authority(2)], 1_001)
            .await
            .unwrap();
        assert_eq!(signer.sign_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_signer_gets_own_entry() {
        let engine = MockEngine::default();
        let alice = MockSigner::new(authority(0xaa));
        let bob = MockSigner::new(authority(0xbb));
        let manager = AuthorizationManager::new(10);

        let a = manager
            .load_or_sign(&engine, &alice, &[authority(1)], 1_000)
            .await
            .unwrap();
        let b = manager
            .load_or_sign(&engine, &bob, &[authority(1)], 1_000)
            .await
            .unwrap();
        assert_eq!(alice.sign_calls.load(Ordering::SeqCst), 1);
        assert_eq!(bob.sign_calls.load(Ordering::SeqCst), 1);
        assert_ne!(a.user_address, b.user_address);
    }

    #[tokio::test]
    async fn test_rejection_yields_none_and_caches_nothing() {
        let engine = MockEngine::default();
        let signer = MockSigner::new(authority(0xaa));
        signer.reject.store(true, Ordering::SeqCst);
        let manager = AuthorizationManager::new(10);

        let denied = manager
            .load_or_sign(&engine, &signer, &[authority(1)], 1_000)
            .await;
        assert!(denied.is_none());

        // A later accepted request signs fresh.
        signer.reject.store(false, Ordering::SeqCst);
        let granted = manager
            .load_or_sign(&engine, &signer, &[authority(1)], 1_000)
            .await;
        assert!(granted.is_some());
        assert_eq!(signer.sign_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_shared_returns_same_instance() {
        let a = AuthorizationManager::shared();
        let b = AuthorizationManager::shared();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
