//! In-memory doubles for the ledger and the wallet session.
//!
//! Available in this crate's tests and, with the `test-utils` feature, to
//! downstream crates.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use alloy_primitives::{Address, Bytes, TxHash};
use alloy_sol_types::SolValue;
use tokio::sync::watch;

use crate::chain::ChainId;
use crate::error::CallError;
use crate::gateway::{Ledger, LedgerRequest};
use crate::tracker::Receipt;
use crate::wallet::{WalletError, WalletSession};

/// How the next watched transaction settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// Included with a successful status.
    Success,
    /// Included with a failed status.
    Reverted,
    /// The receipt lookup fails.
    Error(CallError),
}

#[derive(Debug, Default)]
struct LedgerState {
    chain_id: Option<ChainId>,
    account: Option<Address>,
    call_results: HashMap<[u8; 4], Result<Bytes, CallError>>,
    simulation_error: Option<CallError>,
    sends: VecDeque<Result<TxHash, CallError>>,
    settlements: VecDeque<Settlement>,
    calls: Vec<LedgerRequest>,
    simulations: Vec<LedgerRequest>,
    sent: Vec<LedgerRequest>,
}

/// Scriptable in-memory [`Ledger`].
///
/// - View calls answer from a per-selector table ([`MockLedger::set_call_result`]).
/// - Sends pop scripted outcomes, or mint a fresh hash when none is queued.
/// - Receipts pop scripted [`Settlement`]s, defaulting to success, and can be
///   held back with [`MockLedger::hold_receipts`].
#[derive(Debug)]
pub struct MockLedger {
    state: Mutex<LedgerState>,
    next_hash: AtomicU64,
    held: watch::Sender<bool>,
}

impl MockLedger {
    fn with_chain(chain_id: Option<ChainId>, account: Option<Address>) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                chain_id,
                account,
                ..LedgerState::default()
            }),
            next_hash: AtomicU64::new(1),
            held: watch::Sender::new(false),
        }
    }

    /// A ledger with a signer connected to `chain_id`.
    #[must_use]
    pub fn connected(chain_id: ChainId) -> Self {
        Self::with_chain(Some(chain_id), Some(Address::repeat_byte(0x11)))
    }

    /// A ledger without chain or account.
    #[must_use]
    pub fn disconnected() -> Self {
        Self::with_chain(None, None)
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Switches the connected chain.
    pub fn switch_chain(&self, chain_id: Option<ChainId>) {
        self.state().chain_id = chain_id;
    }

    /// Sets what view calls and simulations of `selector` return.
    pub fn set_call_result<T: SolValue>(&self, selector: [u8; 4], result: Result<T, CallError>) {
        let encoded = result.map(|value| Bytes::from(value.abi_encode()));
        self.state().call_results.insert(selector, encoded);
    }

    /// Makes every simulation fail with `error`.
    pub fn fail_simulation(&self, error: CallError) {
        self.state().simulation_error = Some(error);
    }

    /// Queues the outcome of the next send.
    pub fn push_send(&self, outcome: Result<TxHash, CallError>) {
        self.state().sends.push_back(outcome);
    }

    /// Queues how the next watched transaction settles.
    pub fn push_settlement(&self, settlement: Settlement) {
        self.state().settlements.push_back(settlement);
    }

    /// Holds back (or releases) every pending receipt.
    pub fn hold_receipts(&self, held: bool) {
        self.held.send_replace(held);
    }

    /// View calls received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<LedgerRequest> {
        self.state().calls.clone()
    }

    /// Simulations received so far.
    #[must_use]
    pub fn simulations(&self) -> Vec<LedgerRequest> {
        self.state().simulations.clone()
    }

    /// Transactions sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<LedgerRequest> {
        self.state().sent.clone()
    }

    fn lookup(state: &LedgerState, request: &LedgerRequest) -> Result<Bytes, CallError> {
        let selector: Option<[u8; 4]> = request
            .input
            .get(..4)
            .and_then(|prefix| prefix.try_into().ok());
        selector
            .and_then(|selector| state.call_results.get(&selector).cloned())
            .unwrap_or_else(|| Ok(Bytes::new()))
    }
}

impl Ledger for MockLedger {
    fn connected_chain(&self) -> Option<ChainId> {
        self.state().chain_id
    }

    fn connected_account(&self) -> Option<Address> {
        self.state().account
    }

    fn call(&self, request: LedgerRequest) -> impl Future<Output = Result<Bytes, CallError>> + Send {
        let result = {
            let mut state = self.state();
            let result = Self::lookup(&state, &request);
            state.calls.push(request);
            result
        };
        async move {
            tokio::task::yield_now().await;
            result
        }
    }

    fn simulate(
        &self,
        request: LedgerRequest,
    ) -> impl Future<Output = Result<Bytes, CallError>> + Send {
        let result = {
            let mut state = self.state();
            let result = match &state.simulation_error {
                Some(error) => Err(error.clone()),
                None => Self::lookup(&state, &request),
            };
            state.simulations.push(request);
            result
        };
        async move {
            tokio::task::yield_now().await;
            result
        }
    }

    fn send(
        &self,
        request: LedgerRequest,
    ) -> impl Future<Output = Result<TxHash, CallError>> + Send {
        async move {
            tokio::task::yield_now().await;
            let mut state = self.state();
            if let Some(connected) = state.chain_id
                && request.chain_id != connected
            {
                return Err(CallError::WrongChain {
                    requested: request.chain_id,
                    connected,
                });
            }
            let outcome = state.sends.pop_front().unwrap_or_else(|| {
                let n = self.next_hash.fetch_add(1, Ordering::Relaxed);
                Ok(TxHash::left_padding_from(&n.to_be_bytes()))
            });
            if outcome.is_ok() {
                state.sent.push(request);
            }
            outcome
        }
    }

    fn wait_for_receipt(
        &self,
        _chain_id: ChainId,
        hash: TxHash,
    ) -> impl Future<Output = Result<Receipt, CallError>> + Send {
        let mut held = self.held.subscribe();
        async move {
            let _ = held.wait_for(|held| !*held).await;
            tokio::task::yield_now().await;
            let settlement = self
                .state()
                .settlements
                .pop_front()
                .unwrap_or(Settlement::Success);
            let success = match settlement {
                Settlement::Success => true,
                Settlement::Reverted => false,
                Settlement::Error(error) => return Err(error),
            };
            Ok(Receipt {
                transaction_hash: hash,
                block_number: Some(1),
                success,
                gas_used: 21_000,
            })
        }
    }
}

/// Scriptable in-memory [`WalletSession`].
#[derive(Debug)]
pub struct MockWallet {
    connected: AtomicBool,
    chain_id: Mutex<Option<ChainId>>,
    approve_connect: AtomicBool,
    connect_attempts: AtomicUsize,
}

impl MockWallet {
    /// A wallet connected on `chain_id`.
    #[must_use]
    pub fn connected(chain_id: ChainId) -> Self {
        Self {
            connected: AtomicBool::new(true),
            chain_id: Mutex::new(Some(chain_id)),
            approve_connect: AtomicBool::new(true),
            connect_attempts: AtomicUsize::new(0),
        }
    }

    /// A wallet that is not connected and refuses to connect.
    #[must_use]
    pub fn disconnected() -> Self {
        Self {
            connected: AtomicBool::new(false),
            chain_id: Mutex::new(None),
            approve_connect: AtomicBool::new(false),
            connect_attempts: AtomicUsize::new(0),
        }
    }

    /// Whether the next connection request is approved.
    pub fn approve_connect(&self, approve: bool) {
        self.approve_connect.store(approve, Ordering::SeqCst);
    }

    /// Switches the wallet's chain.
    pub fn switch_chain(&self, chain_id: Option<ChainId>) {
        *self.chain_id.lock().unwrap_or_else(PoisonError::into_inner) = chain_id;
    }

    /// Number of connection requests received.
    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }
}

impl WalletSession for MockWallet {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn account(&self) -> Option<Address> {
        self.is_connected().then(|| Address::repeat_byte(0x11))
    }

    fn chain_id(&self) -> Option<ChainId> {
        *self.chain_id.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn connect(&self) -> impl Future<Output = Result<(), WalletError>> + Send {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let approved = self.approve_connect.load(Ordering::SeqCst);
        if approved {
            self.connected.store(true, Ordering::SeqCst);
        }
        async move {
            if approved {
                Ok(())
            } else {
                Err(WalletError::Rejected)
            }
        }
    }
}
