//! # Ledger Service
//!
//! Application service orchestrating reads, writes, and decryption
//! against the confidential ledger, under the concurrency guards and
//! the staleness detector.
//!
//! Every operation snapshots the session context up front, re-validates
//! it after each suspension point, and applies results to the local view
//! only while the snapshot still matches. Failures never propagate out
//! of an operation; they are recorded on the message surface and the
//! view keeps its last-known-good state.

use crate::authorization::AuthorizationManager;
use crate::config::ClientConfig;
use crate::domain::{
    outcome_label, Address, ClearValue, LedgerError, LedgerView, OpStatus, SessionContext,
};
use crate::guard::{ContextSnapshot, OpGuards, OpKind};
use crate::ports::{
    AuthorizationSigner, ConfidentialEngine, DecryptTarget, LedgerContract, SessionProvider,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, warn};

/// A state-changing request kind.
enum WriteOp {
    Buy,
    Open,
    Claim,
    Fund(u128),
}

impl WriteOp {
    fn name(&self) -> &'static str {
        match self {
            WriteOp::Buy => "buy",
            WriteOp::Open => "open",
            WriteOp::Claim => "claim",
            WriteOp::Fund(_) => "fund",
        }
    }
}

/// Ledger Service - issues guarded operations against the confidential
/// ledger and keeps the local view synchronized.
pub struct LedgerService {
    config: ClientConfig,
    contract: Arc<dyn LedgerContract>,
    engine: Arc<dyn ConfidentialEngine>,
    signer: Arc<dyn AuthorizationSigner>,
    session: Arc<dyn SessionProvider>,
    authorizations: Arc<AuthorizationManager>,
    guards: OpGuards,
    view: Mutex<LedgerView>,
}

impl LedgerService {
    /// Create a service with its own authorization manager, configured
    /// from the client's duration policy.
    pub fn new(
        config: ClientConfig,
        contract: Arc<dyn LedgerContract>,
        engine: Arc<dyn ConfidentialEngine>,
        signer: Arc<dyn AuthorizationSigner>,
        session: Arc<dyn SessionProvider>,
    ) -> Self {
        let authorizations = Arc::new(AuthorizationManager::new(
            config.authorization_duration_days,
        ));
        Self::with_authorizations(config, contract, engine, signer, session, authorizations)
    }

    /// Create a service sharing an existing authorization manager, e.g.
    /// the process-wide [`AuthorizationManager::shared`] instance.
    pub fn with_authorizations(
        config: ClientConfig,
        contract: Arc<dyn LedgerContract>,
        engine: Arc<dyn ConfidentialEngine>,
        signer: Arc<dyn AuthorizationSigner>,
        session: Arc<dyn SessionProvider>,
        authorizations: Arc<AuthorizationManager>,
    ) -> Self {
        Self {
            config,
            contract,
            engine,
            signer,
            session,
            authorizations,
            guards: OpGuards::default(),
            view: Mutex::new(LedgerView::new()),
        }
    }

    /// A copy of the current local view.
    pub fn view(&self) -> LedgerView {
        self.view_mut().clone()
    }

    /// The last user-visible message.
    pub fn message(&self) -> String {
        self.view_mut().message.clone()
    }

    /// Whether bytecode was present at the last probe. `None` = unknown.
    pub fn is_deployed(&self) -> Option<bool> {
        self.view_mut().deployed
    }

    /// Is an operation of this kind currently in flight?
    pub fn is_in_flight(&self, kind: OpKind) -> bool {
        self.guards.flag(kind).is_running()
    }

    /// Refresh the whole local view from the ledger.
    ///
    /// Rejected while another refresh is in flight. With no contract
    /// resolved for the active chain the handles are cleared and nothing
    /// is fetched. An address without bytecode clears the view and
    /// records a "not deployed" message. Otherwise all reads are fetched
    /// concurrently and applied atomically, gated by the staleness check.
    pub async fn refresh_all(&self) -> OpStatus {
        let Some(_permit) = self.guards.refreshing.try_begin() else {
            debug!("refresh already in flight, rejecting");
            return OpStatus::Busy;
        };
        let snapshot = ContextSnapshot::capture(self.live_context());
        let Some(address) = snapshot.context().contract else {
            self.view_mut().clear_handles();
            return OpStatus::Skipped;
        };
        self.run_refresh(&snapshot, address).await
    }

    async fn run_refresh(&self, snapshot: &ContextSnapshot, address: Address) -> OpStatus {
        match self.contract.bytecode_present().await {
            Ok(true) => {}
            Ok(false) => {
                if !snapshot.is_current(&self.live_context()) {
                    return OpStatus::Stale;
                }
                warn!(%address, "no bytecode at contract address");
                let mut view = self.view_mut();
                view.clear_handles();
                view.deployed = Some(false);
                view.set_message(format!(
                    "Contract not found at {address}. Deploy and regenerate addresses."
                ));
                return OpStatus::Failed;
            }
            Err(e) => {
                error!("refresh failed: {e}");
                self.view_mut().set_message(format!("refresh failed: {e}"));
                return OpStatus::Failed;
            }
        }

        let (balance, outcome, purchased, opened, pool, owner) = tokio::join!(
            self.contract.balance_handle(),
            self.contract.last_outcome_handle(),
            self.contract.total_purchased_handle(),
            self.contract.total_opened_handle(),
            self.contract.pool_balance(),
            self.contract.owner(),
        );
        let fetched = (|| {
            Ok::<_, LedgerError>((balance?, outcome?, purchased?, opened?, pool?, owner?))
        })();

        match fetched {
            Ok((balance, outcome, purchased, opened, pool, owner)) => {
                if !snapshot.is_current(&self.live_context()) {
                    debug!("session changed mid-refresh, discarding results");
                    return OpStatus::Stale;
                }
                let mut view = self.view_mut();
                view.balance_handle = Some(balance);
                view.outcome_handle = Some(outcome);
                view.total_purchased_handle = Some(purchased);
                view.total_opened_handle = Some(opened);
                view.pool_balance_wei = Some(pool);
                view.owner = Some(owner);
                view.deployed = Some(true);
                OpStatus::Applied
            }
            Err(e) => {
                error!("refresh failed: {e}");
                self.view_mut().set_message(format!("refresh failed: {e}"));
                OpStatus::Failed
            }
        }
    }

    /// Decrypt the trackable handles the view currently holds.
    ///
    /// Zero-sentinel handles resolve to clear value 0 locally and are
    /// never sent to the engine. Remaining handles ride one batched
    /// request under a single authorization; returned clear values are
    /// applied only for handles that still match the view's slots at
    /// completion time.
    pub async fn decrypt_pending(&self) -> OpStatus {
        let Some(_permit) = self.guards.decrypting.try_begin() else {
            debug!("decrypt already in flight, rejecting");
            return OpStatus::Busy;
        };
        let snapshot = ContextSnapshot::capture(self.live_context());
        let Some(contract_address) = snapshot.context().contract else {
            return OpStatus::Skipped;
        };

        let (balance_handle, outcome_handle) = {
            let view = self.view_mut();
            (view.balance_handle, view.outcome_handle)
        };
        if balance_handle.is_none() && outcome_handle.is_none() {
            return OpStatus::Skipped;
        }

        let mut targets = Vec::new();
        {
            let mut view = self.view_mut();
            if let Some(handle) = balance_handle {
                if handle.is_zero() {
                    view.balance_clear = Some(ClearValue { handle, value: 0 });
                } else {
                    targets.push(DecryptTarget {
                        handle,
                        contract: contract_address,
                    });
                }
            }
            if let Some(handle) = outcome_handle {
                if handle.is_zero() {
                    view.outcome_clear = Some(ClearValue { handle, value: 0 });
                } else {
                    targets.push(DecryptTarget {
                        handle,
                        contract: contract_address,
                    });
                }
            }
        }
        if targets.is_empty() {
            return OpStatus::Applied;
        }

        let authorization = self
            .authorizations
            .load_or_sign(
                self.engine.as_ref(),
                self.signer.as_ref(),
                &[contract_address],
                unix_now(),
            )
            .await;
        let Some(authorization) = authorization else {
            self.view_mut()
                .set_message("Unable to build decryption signature");
            return OpStatus::Failed;
        };
        if !snapshot.is_current(&self.live_context()) {
            self.view_mut().set_message("Ignore decrypt");
            return OpStatus::Stale;
        }

        let results = match self.engine.user_decrypt(&targets, &authorization).await {
            Ok(results) => results,
            Err(e) => {
                error!("decrypt failed: {e}");
                self.view_mut().set_message(format!("decrypt failed: {e}"));
                return OpStatus::Failed;
            }
        };
        if !snapshot.is_current(&self.live_context()) {
            self.view_mut().set_message("Ignore decrypt");
            return OpStatus::Stale;
        }

        let mut view = self.view_mut();
        let mut balance_value = None;
        if let Some(handle) = balance_handle.filter(|h| !h.is_zero()) {
            if view.balance_handle == Some(handle) {
                if let Some(value) = results.get(&handle) {
                    view.balance_clear = Some(ClearValue {
                        handle,
                        value: *value,
                    });
                    balance_value = Some(*value);
                }
            }
        }
        let mut outcome_value = None;
        if let Some(handle) = outcome_handle.filter(|h| !h.is_zero()) {
            if view.outcome_handle == Some(handle) {
                if let Some(value) = results.get(&handle) {
                    view.outcome_clear = Some(ClearValue {
                        handle,
                        value: *value,
                    });
                    outcome_value = Some(*value);
                }
            }
        }

        if let Some(label) = outcome_value.and_then(outcome_label) {
            let message = match balance_value {
                Some(balance) => format!("{label} | Keys = {balance}"),
                None => label.to_string(),
            };
            view.set_message(message);
        } else if let Some(balance) = balance_value {
            view.set_message(format!("Keys = {balance}"));
        }
        OpStatus::Applied
    }

    /// Purchase one key at the configured price.
    pub async fn buy(&self) -> OpStatus {
        self.submit(WriteOp::Buy).await
    }

    /// Open a box.
    pub async fn open(&self) -> OpStatus {
        self.submit(WriteOp::Open).await
    }

    /// Claim the last reward. Requires an outcome handle in the view.
    pub async fn claim(&self) -> OpStatus {
        self.submit(WriteOp::Claim).await
    }

    /// Fund the reward pool. Restricted to the pool owner.
    pub async fn fund(&self, amount_wei: u128) -> OpStatus {
        self.submit(WriteOp::Fund(amount_wei)).await
    }

    async fn submit(&self, op: WriteOp) -> OpStatus {
        let Some(permit) = self.guards.submitting.try_begin() else {
            debug!("{} rejected, a submission is in flight", op.name());
            return OpStatus::Busy;
        };
        let snapshot = ContextSnapshot::capture(self.live_context());
        if snapshot.context().contract.is_none() {
            return OpStatus::Skipped;
        }

        match op {
            WriteOp::Claim => {
                if self.view_mut().outcome_handle.is_none() {
                    return OpStatus::Skipped;
                }
            }
            WriteOp::Fund(_) => {
                let owner = self.view_mut().owner;
                if owner.is_none() || owner != snapshot.context().signer {
                    self.view_mut()
                        .set_message("fund is restricted to the pool owner");
                    return OpStatus::Skipped;
                }
            }
            _ => {}
        }

        let result = self.submit_and_wait(&op).await;
        // Release the submission guard before the follow-up refresh,
        // which runs under its own guard.
        drop(permit);

        match result {
            Ok(()) => {
                self.refresh_all().await;
                OpStatus::Applied
            }
            Err(e) => {
                error!("{} failed: {e}", op.name());
                self.view_mut()
                    .set_message(format!("{} failed: {e}", op.name()));
                OpStatus::Failed
            }
        }
    }

    async fn submit_and_wait(&self, op: &WriteOp) -> Result<(), LedgerError> {
        let receipt = match op {
            WriteOp::Buy => {
                self.contract
                    .submit_buy(self.config.purchase_price_wei)
                    .await?
            }
            WriteOp::Open => self.contract.submit_open().await?,
            WriteOp::Claim => self.contract.submit_claim().await?,
            WriteOp::Fund(amount) => self.contract.submit_fund(*amount).await?,
        };
        receipt.confirmed().await
    }

    fn live_context(&self) -> SessionContext {
        let chain = self.session.chain();
        SessionContext {
            chain,
            signer: self.session.signer(),
            contract: self.config.contract_for(chain),
        }
    }

    fn view_mut(&self) -> MutexGuard<'_, LedgerView> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChainTarget, Handle};
    use crate::ports::{MockEngine, MockLedgerContract, MockSession, MockSigner};
    use std::sync::atomic::Ordering;

    fn service_with(
        contract: Arc<MockLedgerContract>,
        session: Arc<MockSession>,
    ) -> LedgerService {
        let signer = Arc::new(MockSigner::new(Address([0xaa; 20])));
        LedgerService::new(
            ClientConfig::for_testing(Address([0x11; 20])),
            contract,
            Arc::new(MockEngine::default()),
            signer,
            session,
        )
    }

    #[tokio::test]
    async fn test_refresh_skipped_without_contract() {
        let contract = Arc::new(MockLedgerContract::default());
        let session = Arc::new(MockSession::new(
            ChainTarget::Unresolved,
            Some(Address([0xaa; 20])),
        ));
        let service = service_with(contract.clone(), session);

        assert_eq!(service.refresh_all().await, OpStatus::Skipped);
        assert_eq!(contract.read_calls.load(Ordering::SeqCst), 0);
        assert!(service.view().balance_handle.is_none());
    }

    #[tokio::test]
    async fn test_claim_requires_outcome_handle() {
        let contract = Arc::new(MockLedgerContract::default());
        let session = Arc::new(MockSession::new(
            ChainTarget::Hardhat,
            Some(Address([0xaa; 20])),
        ));
        let service = service_with(contract.clone(), session);

        assert_eq!(service.claim().await, OpStatus::Skipped);
        assert_eq!(contract.write_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fund_rejected_for_non_owner() {
        let contract = Arc::new(MockLedgerContract::default());
        contract.update(|s| s.owner = Address([0xbb; 20]));
        let session = Arc::new(MockSession::new(
            ChainTarget::Hardhat,
            Some(Address([0xaa; 20])),
        ));
        let service = service_with(contract.clone(), session);
        service.refresh_all().await;

        assert_eq!(service.fund(1_000).await, OpStatus::Skipped);
        assert_eq!(contract.write_calls.load(Ordering::SeqCst), 0);
        assert!(service.message().contains("restricted"));
    }

    #[tokio::test]
    async fn test_decrypt_skipped_without_handles() {
        let contract = Arc::new(MockLedgerContract::default());
        let session = Arc::new(MockSession::new(
            ChainTarget::Hardhat,
            Some(Address([0xaa; 20])),
        ));
        let service = service_with(contract, session);

        assert_eq!(service.decrypt_pending().await, OpStatus::Skipped);
    }

    #[tokio::test]
    async fn test_in_flight_flag_visible() {
        let contract = Arc::new(MockLedgerContract::default());
        let gate = contract.install_gate();
        let session = Arc::new(MockSession::new(
            ChainTarget::Hardhat,
            Some(Address([0xaa; 20])),
        ));
        let service = Arc::new(service_with(contract, session));

        let task = tokio::spawn({
            let service = service.clone();
            async move { service.refresh_all().await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(service.is_in_flight(OpKind::Refreshing));
        assert!(!service.is_in_flight(OpKind::Decrypting));

        gate.notify_one();
        assert_eq!(task.await.unwrap(), OpStatus::Applied);
        assert!(!service.is_in_flight(OpKind::Refreshing));
    }

    #[test]
    fn test_zero_handle_never_targeted() {
        // Covered end to end in the integration tests; the domain rule
        // itself lives on Handle.
        assert!(Handle::ZERO.is_zero());
    }
}
