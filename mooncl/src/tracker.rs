//! Lifecycle of the transaction submitted through one gateway.
//!
//! ```text
//! Idle ──write──▶ Submitting ──hash──▶ PendingConfirmation ──receipt──▶ Confirmed
//!                     │                        │
//!                     └──error──▶ Failed ◀─────┘ (revert, timeout, dropped)
//! ```
//!
//! Every transition goes through [`TransactionRecord::apply`], a pure function
//! of the current record and a [`TrackerEvent`]. Events produced by background
//! work carry the [`Epoch`] they were started in; once the record has moved to
//! a newer epoch (a new write or a [`TransactionTracker::reset`]) they no
//! longer apply.

use std::sync::{Mutex, PoisonError};

use alloy_primitives::TxHash;
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::chain::ChainId;
use crate::error::CallError;

/// Generation counter of a transaction record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(u64);

impl Epoch {
    /// Returns the raw counter value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Phase of the tracked transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TxPhase {
    /// Nothing submitted.
    #[default]
    Idle,
    /// A write is being encoded, signed or broadcast.
    Submitting,
    /// Broadcast; waiting for a receipt.
    PendingConfirmation,
    /// Included with a successful status.
    Confirmed,
    /// Submission failed, the transaction reverted, or the watch gave up.
    Failed,
}

impl TxPhase {
    /// Returns `true` for [`Confirmed`](Self::Confirmed) and [`Failed`](Self::Failed).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }
}

/// Confirmation artifact of an included transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Hash of the included transaction.
    pub transaction_hash: TxHash,
    /// Block the transaction was included in.
    pub block_number: Option<u64>,
    /// Execution status.
    pub success: bool,
    /// Gas consumed by execution.
    pub gas_used: u64,
}

/// Snapshot of the tracked transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionRecord {
    /// Transaction hash, once the ledger accepted the transaction.
    pub hash: Option<TxHash>,
    /// Chain the transaction targets.
    pub chain_id: Option<ChainId>,
    /// Current phase.
    pub phase: TxPhase,
    /// Failure cause, set only in [`TxPhase::Failed`].
    pub error: Option<CallError>,
    /// Receipt, once one was observed.
    pub receipt: Option<Receipt>,
    /// Generation of this record.
    pub epoch: Epoch,
}

/// Input of the tracker transition function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    /// A new write begins. Refused while another write is submitting.
    WriteStarted {
        /// Resolved target chain, when known.
        chain_id: Option<ChainId>,
    },
    /// The ledger accepted the transaction.
    Submitted {
        /// Epoch of the write.
        epoch: Epoch,
        /// Transaction hash.
        hash: TxHash,
    },
    /// Submission failed before a hash was obtained.
    SubmitFailed {
        /// Epoch of the write.
        epoch: Epoch,
        /// Failure cause.
        error: CallError,
    },
    /// A receipt was observed.
    Confirmed {
        /// Epoch of the watch.
        epoch: Epoch,
        /// The receipt.
        receipt: Receipt,
    },
    /// The confirmation watch failed.
    WatchFailed {
        /// Epoch of the watch.
        epoch: Epoch,
        /// Failure cause.
        error: CallError,
    },
    /// The confirmation watch is restarted for the current hash.
    Rewatch {
        /// Epoch of the record being re-watched.
        epoch: Epoch,
    },
    /// Back to idle, superseding everything in flight.
    Reset,
}

impl TransactionRecord {
    /// Computes the record that results from `event`.
    ///
    /// Returns `None` when the event does not apply: it belongs to an older
    /// epoch, or is not valid in the current phase.
    #[must_use]
    pub fn apply(&self, event: TrackerEvent) -> Option<Self> {
        match event {
            TrackerEvent::Reset => Some(Self {
                epoch: self.epoch.next(),
                ..Self::default()
            }),
            TrackerEvent::WriteStarted { chain_id } => {
                (self.phase != TxPhase::Submitting).then(|| Self {
                    chain_id,
                    phase: TxPhase::Submitting,
                    epoch: self.epoch.next(),
                    ..Self::default()
                })
            }
            TrackerEvent::Submitted { epoch, hash } => {
                self.accepts(epoch, TxPhase::Submitting).then(|| Self {
                    hash: Some(hash),
                    phase: TxPhase::PendingConfirmation,
                    ..self.clone()
                })
            }
            TrackerEvent::SubmitFailed { epoch, error } => {
                self.accepts(epoch, TxPhase::Submitting).then(|| Self {
                    phase: TxPhase::Failed,
                    error: Some(error),
                    ..self.clone()
                })
            }
            TrackerEvent::Confirmed { epoch, receipt } => {
                if !self.accepts(epoch, TxPhase::PendingConfirmation)
                    || self.hash != Some(receipt.transaction_hash)
                {
                    return None;
                }
                let (phase, error) = if receipt.success {
                    (TxPhase::Confirmed, None)
                } else {
                    (TxPhase::Failed, Some(CallError::Reverted { reason: None }))
                };
                Some(Self {
                    phase,
                    error,
                    receipt: Some(receipt),
                    ..self.clone()
                })
            }
            TrackerEvent::WatchFailed { epoch, error } => {
                self.accepts(epoch, TxPhase::PendingConfirmation).then(|| Self {
                    phase: TxPhase::Failed,
                    error: Some(error),
                    ..self.clone()
                })
            }
            TrackerEvent::Rewatch { epoch } => {
                let rewatchable = matches!(
                    self.phase,
                    TxPhase::PendingConfirmation | TxPhase::Confirmed | TxPhase::Failed
                );
                (epoch == self.epoch && rewatchable && self.hash.is_some()).then(|| Self {
                    phase: TxPhase::PendingConfirmation,
                    error: None,
                    receipt: None,
                    ..self.clone()
                })
            }
        }
    }

    fn accepts(&self, epoch: Epoch, phase: TxPhase) -> bool {
        self.epoch == epoch && self.phase == phase
    }

    /// A write is being submitted.
    #[must_use]
    pub fn is_writing(&self) -> bool {
        self.phase == TxPhase::Submitting
    }

    /// Waiting for the receipt.
    #[must_use]
    pub fn is_confirming(&self) -> bool {
        self.phase == TxPhase::PendingConfirmation
    }

    /// Confirmed successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.phase == TxPhase::Confirmed
    }

    /// Failed at any stage.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.phase == TxPhase::Failed
    }

    /// Terminal or idle: nothing more will happen without a new event from the owner.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.phase == TxPhase::Idle || self.phase.is_terminal()
    }
}

/// Owns the record of at most one in-flight transaction and its confirmation watch.
///
/// Observers subscribe through a [`watch`] channel; every accepted event
/// publishes a new snapshot.
#[derive(Debug)]
pub struct TransactionTracker {
    state: watch::Sender<TransactionRecord>,
    watch_task: Mutex<Option<AbortHandle>>,
}

impl Default for TransactionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionTracker {
    /// Creates an idle tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: watch::Sender::new(TransactionRecord::default()),
            watch_task: Mutex::new(None),
        }
    }

    /// Returns a copy of the current record.
    #[must_use]
    pub fn snapshot(&self) -> TransactionRecord {
        self.state.borrow().clone()
    }

    /// Subscribes to record changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TransactionRecord> {
        self.state.subscribe()
    }

    /// Applies an event. Returns whether the record changed.
    pub fn dispatch(&self, event: TrackerEvent) -> bool {
        #[cfg(feature = "telemetry")]
        let label = event_label(&event);
        let applied = self.state.send_if_modified(|record| match record.apply(event) {
            Some(next) => {
                *record = next;
                true
            }
            None => false,
        });
        #[cfg(feature = "telemetry")]
        {
            let record = self.state.borrow();
            if applied {
                tracing::debug!(event = label, phase = ?record.phase, epoch = record.epoch.get(), tx = ?record.hash, "Transaction record updated");
            } else {
                tracing::trace!(event = label, epoch = record.epoch.get(), "Stale tracker event ignored");
            }
        }
        applied
    }

    /// Moves to [`TxPhase::Submitting`] in a new epoch.
    ///
    /// Any confirmation watch of the previous write is aborted.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::WriteInFlight`] while another write is submitting.
    pub fn begin_write(&self, chain_id: Option<ChainId>) -> Result<Epoch, CallError> {
        if !self.dispatch(TrackerEvent::WriteStarted { chain_id }) {
            return Err(CallError::WriteInFlight);
        }
        self.abort_watch();
        Ok(self.state.borrow().epoch)
    }

    /// Registers the confirmation watch task of `epoch`.
    ///
    /// If the record already moved past `epoch`, the task is aborted right away.
    pub fn attach_watch(&self, epoch: Epoch, task: AbortHandle) {
        let mut slot = self
            .watch_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.state.borrow().epoch != epoch {
            task.abort();
            return;
        }
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    fn abort_watch(&self) {
        let task = self
            .watch_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }

    /// Forces the record back to idle and cancels the confirmation watch.
    ///
    /// Settlements of the superseded transaction are discarded.
    pub fn reset(&self) {
        self.abort_watch();
        self.dispatch(TrackerEvent::Reset);
    }

    /// Waits until the record is idle, confirmed or failed, and returns it.
    pub async fn wait_settled(&self) -> TransactionRecord {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        match rx.wait_for(TransactionRecord::is_settled).await {
            Ok(record) => record.clone(),
            Err(_) => self.snapshot(),
        }
    }

    /// See [`TransactionRecord::is_writing`].
    #[must_use]
    pub fn is_writing(&self) -> bool {
        self.state.borrow().is_writing()
    }

    /// See [`TransactionRecord::is_confirming`].
    #[must_use]
    pub fn is_confirming(&self) -> bool {
        self.state.borrow().is_confirming()
    }

    /// See [`TransactionRecord::is_success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state.borrow().is_success()
    }

    /// See [`TransactionRecord::is_error`].
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.state.borrow().is_error()
    }
}

#[cfg(feature = "telemetry")]
const fn event_label(event: &TrackerEvent) -> &'static str {
    match event {
        TrackerEvent::WriteStarted { .. } => "write_started",
        TrackerEvent::Submitted { .. } => "submitted",
        TrackerEvent::SubmitFailed { .. } => "submit_failed",
        TrackerEvent::Confirmed { .. } => "confirmed",
        TrackerEvent::WatchFailed { .. } => "watch_failed",
        TrackerEvent::Rewatch { .. } => "rewatch",
        TrackerEvent::Reset => "reset",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(byte: u8) -> TxHash {
        TxHash::repeat_byte(byte)
    }

    fn receipt(byte: u8, success: bool) -> Receipt {
        Receipt {
            transaction_hash: hash(byte),
            block_number: Some(10),
            success,
            gas_used: 21_000,
        }
    }

    fn pending(byte: u8) -> TransactionRecord {
        let started = TransactionRecord::default()
            .apply(TrackerEvent::WriteStarted { chain_id: Some(1) })
            .unwrap();
        started
            .apply(TrackerEvent::Submitted {
                epoch: started.epoch,
                hash: hash(byte),
            })
            .unwrap()
    }

    #[test]
    fn test_happy_path_transitions() {
        let record = pending(1);
        assert!(record.is_confirming());
        assert_eq!(record.hash, Some(hash(1)));

        let done = record
            .apply(TrackerEvent::Confirmed {
                epoch: record.epoch,
                receipt: receipt(1, true),
            })
            .unwrap();
        assert!(done.is_success());
        assert!(!done.is_error());
        assert_eq!(done.receipt.unwrap().block_number, Some(10));
    }

    #[test]
    fn test_reverted_receipt_settles_failed() {
        let record = pending(1);
        let failed = record
            .apply(TrackerEvent::Confirmed {
                epoch: record.epoch,
                receipt: receipt(1, false),
            })
            .unwrap();
        assert!(failed.is_error());
        assert_eq!(failed.error, Some(CallError::Reverted { reason: None }));
        assert_eq!(failed.hash, Some(hash(1)));
    }

    #[test]
    fn test_receipt_for_other_hash_is_ignored() {
        let record = pending(1);
        assert!(
            record
                .apply(TrackerEvent::Confirmed {
                    epoch: record.epoch,
                    receipt: receipt(2, true),
                })
                .is_none()
        );
    }

    #[test]
    fn test_submit_failure_has_no_hash() {
        let started = TransactionRecord::default()
            .apply(TrackerEvent::WriteStarted { chain_id: None })
            .unwrap();
        let failed = started
            .apply(TrackerEvent::SubmitFailed {
                epoch: started.epoch,
                error: CallError::Rejected,
            })
            .unwrap();
        assert!(failed.is_error());
        assert_eq!(failed.hash, None);
        assert_eq!(failed.error, Some(CallError::Rejected));
    }

    #[test]
    fn test_second_write_refused_while_submitting() {
        let started = TransactionRecord::default()
            .apply(TrackerEvent::WriteStarted { chain_id: None })
            .unwrap();
        assert!(
            started
                .apply(TrackerEvent::WriteStarted { chain_id: None })
                .is_none()
        );
    }

    #[test]
    fn test_write_while_pending_supersedes() {
        let first = pending(1);
        let second = first
            .apply(TrackerEvent::WriteStarted { chain_id: Some(1) })
            .unwrap();
        assert!(second.is_writing());
        assert!(second.epoch > first.epoch);
        assert!(
            second
                .apply(TrackerEvent::Confirmed {
                    epoch: first.epoch,
                    receipt: receipt(1, true),
                })
                .is_none()
        );
    }

    #[test]
    fn test_reset_discards_late_settlement() {
        let record = pending(1);
        let idle = record.apply(TrackerEvent::Reset).unwrap();
        assert_eq!(idle.phase, TxPhase::Idle);
        assert!(!idle.is_success() && !idle.is_error());
        assert!(
            idle.apply(TrackerEvent::Confirmed {
                epoch: record.epoch,
                receipt: receipt(1, true),
            })
            .is_none()
        );
        assert!(
            idle.apply(TrackerEvent::WatchFailed {
                epoch: record.epoch,
                error: CallError::Dropped,
            })
            .is_none()
        );
    }

    #[test]
    fn test_rewatch_only_with_hash() {
        let record = pending(1);
        let failed = record
            .apply(TrackerEvent::WatchFailed {
                epoch: record.epoch,
                error: CallError::Transport("timeout".into()),
            })
            .unwrap();
        let again = failed
            .apply(TrackerEvent::Rewatch {
                epoch: failed.epoch,
            })
            .unwrap();
        assert!(again.is_confirming());
        assert_eq!(again.error, None);
        assert_eq!(again.epoch, record.epoch);

        let idle = TransactionRecord::default();
        assert!(idle.apply(TrackerEvent::Rewatch { epoch: idle.epoch }).is_none());
    }

    #[tokio::test]
    async fn test_tracker_publishes_and_settles() {
        let tracker = TransactionTracker::new();
        let mut rx = tracker.subscribe();
        let epoch = tracker.begin_write(Some(1)).unwrap();
        assert!(tracker.is_writing());
        assert_eq!(tracker.begin_write(Some(1)), Err(CallError::WriteInFlight));
        assert!(rx.has_changed().unwrap());

        assert!(tracker.dispatch(TrackerEvent::Submitted {
            epoch,
            hash: hash(3)
        }));
        assert!(tracker.is_confirming());
        assert!(tracker.dispatch(TrackerEvent::Confirmed {
            epoch,
            receipt: receipt(3, true)
        }));
        let settled = tracker.wait_settled().await;
        assert!(settled.is_success());
        assert!(tracker.is_success());
    }

    #[tokio::test]
    async fn test_reset_aborts_watch_task() {
        let tracker = TransactionTracker::new();
        let epoch = tracker.begin_write(Some(1)).unwrap();
        tracker.dispatch(TrackerEvent::Submitted {
            epoch,
            hash: hash(4),
        });
        let task = tokio::spawn(std::future::pending::<()>());
        tracker.attach_watch(epoch, task.abort_handle());
        tracker.reset();
        assert!(task.await.unwrap_err().is_cancelled());
        assert_eq!(tracker.snapshot().phase, TxPhase::Idle);
        assert!(!tracker.is_error());
    }

    #[tokio::test]
    async fn test_attach_watch_for_stale_epoch_aborts_immediately() {
        let tracker = TransactionTracker::new();
        let stale = tracker.begin_write(None).unwrap();
        tracker.reset();
        let task = tokio::spawn(std::future::pending::<()>());
        tracker.attach_watch(stale, task.abort_handle());
        assert!(task.await.unwrap_err().is_cancelled());
    }
}
