//! # Concurrency Guard & Staleness Detector
//!
//! One small `Idle -> Running -> Idle` state machine per operation kind,
//! and a reusable context snapshot applied before every mutation of the
//! local view.
//!
//! There is no queuing and no cancellation: a second invocation of an
//! in-flight kind is rejected, and "cancellation" is emulated purely by
//! discarding results whose captured context no longer matches the live
//! one. A hung call leaves its kind Running until it settles; that is an
//! accepted limitation.

use crate::domain::SessionContext;
use std::sync::atomic::{AtomicU8, Ordering};

/// Kinds of guarded asynchronous operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    /// A full view refresh.
    Refreshing,
    /// A batched decryption request.
    Decrypting,
    /// A state-changing submission.
    Submitting,
}

const IDLE: u8 = 0;
const RUNNING: u8 = 1;

/// Per-kind operation state machine with atomic transitions.
#[derive(Debug, Default)]
pub struct OpFlag {
    state: AtomicU8,
}

impl OpFlag {
    /// New flag in the Idle state.
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
        }
    }

    /// Attempt the `Idle -> Running` transition. Returns a permit on
    /// success, or `None` if an operation of this kind is in flight.
    pub fn try_begin(&self) -> Option<OpPermit<'_>> {
        self.state
            .compare_exchange(IDLE, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| OpPermit { flag: self })
    }

    /// Is an operation of this kind in flight?
    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::SeqCst) == RUNNING
    }
}

/// RAII permit for a running operation. Dropping it restores Idle,
/// including on error paths, so a failed operation never locks its kind
/// out permanently.
#[derive(Debug)]
pub struct OpPermit<'a> {
    flag: &'a OpFlag,
}

impl Drop for OpPermit<'_> {
    fn drop(&mut self) {
        self.flag.state.store(IDLE, Ordering::SeqCst);
    }
}

/// The three guards the ledger client runs under.
#[derive(Debug, Default)]
pub struct OpGuards {
    /// Guard for view refreshes.
    pub refreshing: OpFlag,
    /// Guard for decryption requests.
    pub decrypting: OpFlag,
    /// Guard for state-changing submissions.
    pub submitting: OpFlag,
}

impl OpGuards {
    /// The flag for an operation kind.
    pub fn flag(&self, kind: OpKind) -> &OpFlag {
        match kind {
            OpKind::Refreshing => &self.refreshing,
            OpKind::Decrypting => &self.decrypting,
            OpKind::Submitting => &self.submitting,
        }
    }
}

/// Session context captured at operation start.
///
/// After every suspension point, compare against the live context before
/// applying results; a mismatch in chain, signer, or contract address
/// means the results belong to a session that no longer exists.
#[derive(Clone, Copy, Debug)]
pub struct ContextSnapshot {
    ctx: SessionContext,
}

impl ContextSnapshot {
    /// Capture a snapshot of the given context.
    pub fn capture(ctx: SessionContext) -> Self {
        Self { ctx }
    }

    /// The captured context.
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Does the captured context still match the live one?
    pub fn is_current(&self, live: &SessionContext) -> bool {
        self.ctx == *live
    }
}
