//! Monotonic request sequencing.
//!
//! Several fetches for the same entity may be in flight at once; only the
//! result of the most recently issued one may be applied. A [`RequestSequence`]
//! hands out [`RequestToken`]s and answers whether a token is still the latest.
//! [`Latest`] couples a sequence with the slot the winning result is stored in.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Identifies one issued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    /// Returns the raw sequence number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Issues strictly increasing request tokens.
#[derive(Debug, Default)]
pub struct RequestSequence {
    latest: AtomicU64,
}

impl RequestSequence {
    /// Creates a sequence with no request issued yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            latest: AtomicU64::new(0),
        }
    }

    /// Issues a new token, superseding every earlier one.
    pub fn issue(&self) -> RequestToken {
        RequestToken(self.latest.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Returns `true` if no token was issued after `token`.
    #[must_use]
    pub fn is_latest(&self, token: RequestToken) -> bool {
        self.latest.load(Ordering::Acquire) == token.0
    }

    /// Makes every outstanding token stale without issuing a usable one.
    pub fn invalidate(&self) {
        self.latest.fetch_add(1, Ordering::AcqRel);
    }
}

/// A value slot that only accepts results of the latest request.
#[derive(Debug)]
pub struct Latest<T> {
    sequence: RequestSequence,
    value: Mutex<Option<T>>,
}

impl<T> Default for Latest<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Latest<T> {
    /// Creates an empty slot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sequence: RequestSequence::new(),
            value: Mutex::new(None),
        }
    }

    /// Starts a new request, superseding the previous ones.
    pub fn begin(&self) -> RequestToken {
        self.sequence.issue()
    }

    /// Returns `true` if `token` is still the latest request.
    #[must_use]
    pub fn is_current(&self, token: RequestToken) -> bool {
        self.sequence.is_latest(token)
    }

    /// Stores `value` if `token` is still the latest request.
    ///
    /// Returns whether the value was applied.
    pub fn apply(&self, token: RequestToken, value: T) -> bool {
        let mut slot = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        // Checked under the lock so a concurrent `begin` + `apply` cannot interleave.
        if !self.sequence.is_latest(token) {
            return false;
        }
        *slot = Some(value);
        true
    }

    /// Empties the slot if `token` is still the latest request.
    ///
    /// Used when the latest request failed and the stale value must not linger.
    pub fn discard(&self, token: RequestToken) -> bool {
        let mut slot = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.sequence.is_latest(token) {
            return false;
        }
        *slot = None;
        true
    }

    /// Clears the slot and invalidates all outstanding requests.
    pub fn clear(&self) {
        let mut slot = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        self.sequence.invalidate();
        *slot = None;
    }
}

impl<T: Clone> Latest<T> {
    /// Returns a copy of the stored value.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
