//! Typed access to one deployed contract.
//!
//! A [`ContractGateway`] is bound to an address, a Solidity interface and
//! optionally a chain. It encodes [`CallDescriptor`]s, hands them to a
//! [`Ledger`] and decodes the results. Writes are tracked by the gateway's
//! [`TransactionTracker`], which also owns the background confirmation watch.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_sol_types::{SolCall, SolInterface};
#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::chain::ChainId;
use crate::error::{CallError, SimulationError};
use crate::tracker::{Epoch, Receipt, TrackerEvent, TransactionTracker};

/// A fully resolved request handed to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRequest {
    /// Contract address.
    pub to: Address,
    /// ABI-encoded calldata.
    pub input: Bytes,
    /// Native value attached to the call.
    pub value: U256,
    /// Sender, when known.
    pub from: Option<Address>,
    /// Target chain.
    pub chain_id: ChainId,
}

/// Backend that executes calls against a chain.
///
/// Implemented over JSON-RPC by `mooncl-evm`, and in memory by
/// `testing::MockLedger` for tests.
pub trait Ledger: Send + Sync {
    /// Chain the signer is connected to, if any.
    fn connected_chain(&self) -> Option<ChainId>;

    /// Account the signer sends from, if any.
    fn connected_account(&self) -> Option<Address>;

    /// Executes a view call and returns the raw return data.
    fn call(&self, request: LedgerRequest) -> impl Future<Output = Result<Bytes, CallError>> + Send;

    /// Dry-runs a state-changing call and returns the raw return data.
    fn simulate(
        &self,
        request: LedgerRequest,
    ) -> impl Future<Output = Result<Bytes, CallError>> + Send;

    /// Signs and broadcasts a transaction, returning its hash.
    fn send(&self, request: LedgerRequest)
    -> impl Future<Output = Result<TxHash, CallError>> + Send;

    /// Waits until the transaction is included and returns its receipt.
    fn wait_for_receipt(
        &self,
        chain_id: ChainId,
        hash: TxHash,
    ) -> impl Future<Output = Result<Receipt, CallError>> + Send;
}

impl<T: Ledger> Ledger for Arc<T> {
    fn connected_chain(&self) -> Option<ChainId> {
        self.as_ref().connected_chain()
    }

    fn connected_account(&self) -> Option<Address> {
        self.as_ref().connected_account()
    }

    fn call(&self, request: LedgerRequest) -> impl Future<Output = Result<Bytes, CallError>> + Send {
        self.as_ref().call(request)
    }

    fn simulate(
        &self,
        request: LedgerRequest,
    ) -> impl Future<Output = Result<Bytes, CallError>> + Send {
        self.as_ref().simulate(request)
    }

    fn send(
        &self,
        request: LedgerRequest,
    ) -> impl Future<Output = Result<TxHash, CallError>> + Send {
        self.as_ref().send(request)
    }

    fn wait_for_receipt(
        &self,
        chain_id: ChainId,
        hash: TxHash,
    ) -> impl Future<Output = Result<Receipt, CallError>> + Send {
        self.as_ref().wait_for_receipt(chain_id, hash)
    }
}

/// One contract call: the typed function call plus payment and routing overrides.
///
/// The call type fixes the function name and the arity and order of its
/// arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallDescriptor<C> {
    /// Typed call.
    pub call: C,
    /// Native value to attach.
    pub value: U256,
    /// Sender override.
    pub account: Option<Address>,
    /// Chain override.
    pub chain_id: Option<ChainId>,
}

impl<C> CallDescriptor<C> {
    /// Creates a descriptor with no value and no overrides.
    pub const fn new(call: C) -> Self {
        Self {
            call,
            value: U256::ZERO,
            account: None,
            chain_id: None,
        }
    }

    /// Attaches a native value.
    #[must_use]
    pub const fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    /// Overrides the sender.
    #[must_use]
    pub const fn with_account(mut self, account: Option<Address>) -> Self {
        self.account = account;
        self
    }

    /// Overrides the target chain.
    #[must_use]
    pub const fn on_chain(mut self, chain_id: Option<ChainId>) -> Self {
        self.chain_id = chain_id;
        self
    }
}

impl<C> From<C> for CallDescriptor<C> {
    fn from(call: C) -> Self {
        Self::new(call)
    }
}

/// Confirmation policy of a gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Give up waiting for a receipt after this long. `None` waits until reset.
    pub confirmation_timeout: Option<Duration>,
}

/// Read, simulate and write access to one `(address, interface, chain)` binding.
///
/// `I` is the interface's call enum generated by `sol!` (e.g.
/// `IAiTextNft::IAiTextNftCalls`); only calls belonging to it are accepted.
#[derive(Debug)]
pub struct ContractGateway<L, I> {
    ledger: Arc<L>,
    address: Address,
    chain_id: Option<ChainId>,
    tracker: Arc<TransactionTracker>,
    config: GatewayConfig,
    _interface: PhantomData<fn() -> I>,
}

impl<L, I> ContractGateway<L, I>
where
    L: Ledger + 'static,
    I: SolInterface,
{
    /// Creates a gateway bound to `address`, following the connected chain.
    pub fn new(ledger: Arc<L>, address: Address) -> Self {
        Self {
            ledger,
            address,
            chain_id: None,
            tracker: Arc::new(TransactionTracker::new()),
            config: GatewayConfig::default(),
            _interface: PhantomData,
        }
    }

    /// Binds the gateway to a chain.
    #[must_use]
    pub const fn with_chain(mut self, chain_id: Option<ChainId>) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Sets the confirmation policy.
    #[must_use]
    pub const fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Points the gateway at another deployment.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::WriteInFlight`] while a transaction is submitting
    /// or awaiting confirmation.
    pub fn rebind(&mut self, address: Address, chain_id: Option<ChainId>) -> Result<(), CallError> {
        if self.tracker.is_writing() || self.tracker.is_confirming() {
            return Err(CallError::WriteInFlight);
        }
        self.address = address;
        self.chain_id = chain_id;
        Ok(())
    }

    /// Bound contract address.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Bound chain, if any.
    #[must_use]
    pub const fn chain_id(&self) -> Option<ChainId> {
        self.chain_id
    }

    /// The tracker of this gateway's writes.
    #[must_use]
    pub const fn tracker(&self) -> &Arc<TransactionTracker> {
        &self.tracker
    }

    /// The underlying ledger.
    #[must_use]
    pub const fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    /// Resolves the target chain: explicit, then bound, then connected.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::NoChain`] when none of the three is known.
    pub fn resolve_chain(&self, requested: Option<ChainId>) -> Result<ChainId, CallError> {
        requested
            .or(self.chain_id)
            .or_else(|| self.ledger.connected_chain())
            .ok_or(CallError::NoChain)
    }

    fn prepare<C: SolCall>(&self, call: &CallDescriptor<C>) -> Result<LedgerRequest, CallError> {
        Ok(LedgerRequest {
            to: self.address,
            input: call.call.abi_encode().into(),
            value: call.value,
            from: call.account.or_else(|| self.ledger.connected_account()),
            chain_id: self.resolve_chain(call.chain_id)?,
        })
    }

    /// Executes a view call and decodes its return value. Nothing is tracked.
    ///
    /// # Errors
    ///
    /// Returns a [`CallError`] if the chain cannot be resolved, the ledger
    /// fails, or the return data does not decode.
    #[cfg_attr(feature = "telemetry", instrument(name = "gateway.read", skip_all, err, fields(function = C::SIGNATURE, contract = %self.address)))]
    pub async fn read<C>(&self, call: CallDescriptor<C>) -> Result<C::Return, CallError>
    where
        C: SolCall + Into<I>,
    {
        let request = self.prepare(&call)?;
        let output = self.ledger.call(request).await?;
        C::abi_decode_returns(&output).map_err(|e| CallError::Decode(e.to_string()))
    }

    /// Dry-runs a call and decodes what it would return. Nothing is tracked.
    ///
    /// # Errors
    ///
    /// Returns a [`SimulationError`] carrying the revert reason, when the node
    /// reported one.
    #[cfg_attr(feature = "telemetry", instrument(name = "gateway.simulate", skip_all, err, fields(function = C::SIGNATURE, contract = %self.address)))]
    pub async fn simulate<C>(&self, call: CallDescriptor<C>) -> Result<C::Return, SimulationError>
    where
        C: SolCall + Into<I>,
    {
        let request = self.prepare(&call)?;
        let output = self.ledger.simulate(request).await?;
        C::abi_decode_returns(&output)
            .map_err(|e| CallError::Decode(e.to_string()).into())
    }

    /// Submits a state-changing call and returns the transaction hash.
    ///
    /// The tracker moves to `Submitting` as soon as this method is called,
    /// before the returned future is first polled. When the ledger returns a
    /// hash, the record moves to `PendingConfirmation` and a background task
    /// watches for the receipt. On failure the record moves to `Failed`; the
    /// same happens if the returned future is dropped before completion.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::WriteInFlight`] if another write is submitting,
    /// [`CallError::Cancelled`] if the tracker was reset while submitting, or
    /// the ledger's failure.
    pub fn write<C>(
        &self,
        call: CallDescriptor<C>,
    ) -> impl Future<Output = Result<TxHash, CallError>> + Send + '_
    where
        C: SolCall + Into<I>,
    {
        let prepared = self.prepare(&call);
        let chain_id = prepared.as_ref().ok().map(|request| request.chain_id);
        let guard = self
            .tracker
            .begin_write(chain_id)
            .map(|epoch| SubmitGuard::new(Arc::clone(&self.tracker), epoch));
        #[cfg(feature = "telemetry")]
        let span = tracing::info_span!("gateway.write", function = C::SIGNATURE, contract = %self.address, chain = ?chain_id);

        let fut = async move {
            let mut guard = guard?;
            let request = match prepared {
                Ok(request) => request,
                Err(error) => return Err(guard.fail(error)),
            };
            let chain_id = request.chain_id;
            match self.ledger.send(request).await {
                Ok(hash) => {
                    if !guard.submitted(hash) {
                        return Err(CallError::Cancelled);
                    }
                    #[cfg(feature = "telemetry")]
                    tracing::info!(tx = %hash, "Transaction submitted");
                    self.spawn_watch(guard.epoch, chain_id, hash);
                    Ok(hash)
                }
                Err(error) => {
                    #[cfg(feature = "telemetry")]
                    tracing::warn!(%error, "Transaction submission failed");
                    Err(guard.fail(error))
                }
            }
        };
        #[cfg(feature = "telemetry")]
        let fut = tracing::Instrument::instrument(fut, span);
        fut
    }

    /// Re-runs the confirmation watch for the current transaction hash.
    ///
    /// Returns `false` when there is no submitted transaction to re-watch.
    pub fn refetch_receipt(&self) -> bool {
        let record = self.tracker.snapshot();
        let (Some(hash), Some(chain_id)) = (record.hash, record.chain_id) else {
            return false;
        };
        if !self.tracker.dispatch(TrackerEvent::Rewatch {
            epoch: record.epoch,
        }) {
            return false;
        }
        self.spawn_watch(record.epoch, chain_id, hash);
        true
    }

    fn spawn_watch(&self, epoch: Epoch, chain_id: ChainId, hash: TxHash) {
        let ledger = Arc::clone(&self.ledger);
        let tracker = Arc::clone(&self.tracker);
        let timeout = self.config.confirmation_timeout;
        let task = tokio::spawn(async move {
            let receipt = ledger.wait_for_receipt(chain_id, hash);
            let outcome = match timeout {
                Some(limit) => tokio::time::timeout(limit, receipt)
                    .await
                    .unwrap_or(Err(CallError::ConfirmationTimeout(hash))),
                None => receipt.await,
            };
            let event = match outcome {
                Ok(receipt) => TrackerEvent::Confirmed { epoch, receipt },
                Err(error) => TrackerEvent::WatchFailed { epoch, error },
            };
            tracker.dispatch(event);
        });
        self.tracker.attach_watch(epoch, task.abort_handle());
    }
}

/// Fails the write's record if the submission is abandoned midway.
struct SubmitGuard {
    tracker: Arc<TransactionTracker>,
    epoch: Epoch,
    armed: bool,
}

impl SubmitGuard {
    const fn new(tracker: Arc<TransactionTracker>, epoch: Epoch) -> Self {
        Self {
            tracker,
            epoch,
            armed: true,
        }
    }

    fn fail(&mut self, error: CallError) -> CallError {
        self.armed = false;
        self.tracker.dispatch(TrackerEvent::SubmitFailed {
            epoch: self.epoch,
            error: error.clone(),
        });
        error
    }

    fn submitted(&mut self, hash: TxHash) -> bool {
        self.armed = false;
        self.tracker.dispatch(TrackerEvent::Submitted {
            epoch: self.epoch,
            hash,
        })
    }
}

impl Drop for SubmitGuard {
    fn drop(&mut self) {
        if self.armed {
            self.tracker.dispatch(TrackerEvent::SubmitFailed {
                epoch: self.epoch,
                error: CallError::Dropped,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{IAiLaunchpad, IAiTextNft};
    use crate::testing::{MockLedger, Settlement};
    use crate::tracker::TxPhase;

    type NftGateway = ContractGateway<MockLedger, IAiTextNft::IAiTextNftCalls>;
    type LaunchpadGateway = ContractGateway<MockLedger, IAiLaunchpad::IAiLaunchpadCalls>;

    const NFT: Address = Address::repeat_byte(0xAA);

    fn fee() -> U256 {
        U256::from(1_000_000_000_000_000u64)
    }

    #[tokio::test]
    async fn test_read_decodes_return_value() {
        let ledger = Arc::new(MockLedger::connected(42220));
        ledger.set_call_result(IAiTextNft::mintFeeCall::SELECTOR, Ok(fee()));
        let gateway = NftGateway::new(Arc::clone(&ledger), NFT);

        let value = gateway
            .read(IAiTextNft::mintFeeCall {}.into())
            .await
            .unwrap();
        assert_eq!(value, fee());
        assert_eq!(gateway.tracker().snapshot().phase, TxPhase::Idle);
        assert_eq!(ledger.calls()[0].chain_id, 42220);
    }

    #[tokio::test]
    async fn test_chain_priority() {
        let ledger = Arc::new(MockLedger::connected(42220));
        let unbound = NftGateway::new(Arc::clone(&ledger), NFT);
        assert_eq!(unbound.resolve_chain(None), Ok(42220));
        assert_eq!(unbound.resolve_chain(Some(7)), Ok(7));

        let bound = NftGateway::new(Arc::clone(&ledger), NFT).with_chain(Some(11_142_220));
        assert_eq!(bound.resolve_chain(None), Ok(11_142_220));
        assert_eq!(bound.resolve_chain(Some(7)), Ok(7));

        let disconnected = NftGateway::new(Arc::new(MockLedger::disconnected()), NFT);
        assert_eq!(disconnected.resolve_chain(None), Err(CallError::NoChain));
    }

    #[tokio::test]
    async fn test_simulate_surfaces_revert_reason() {
        let ledger = Arc::new(MockLedger::connected(42220));
        ledger.fail_simulation(CallError::Reverted {
            reason: Some("insufficient fee".into()),
        });
        let gateway = NftGateway::new(ledger, NFT);
        let err = gateway
            .simulate(
                IAiTextNft::mintCall {
                    content: "x".into(),
                }
                .into(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Some("insufficient fee"));
        assert_eq!(gateway.tracker().snapshot().phase, TxPhase::Idle);
    }

    #[tokio::test]
    async fn test_write_marks_submitting_before_first_poll() {
        let ledger = Arc::new(MockLedger::connected(42220));
        ledger.push_send(Ok(TxHash::repeat_byte(1)));
        let gateway = LaunchpadGateway::new(Arc::clone(&ledger), NFT);
        let call = || {
            CallDescriptor::new(IAiLaunchpad::buyCall {
                listingId: U256::from(5u8),
            })
            .with_value(fee())
        };

        let pending = gateway.write(call());
        assert!(gateway.tracker().is_writing());
        assert_eq!(gateway.write(call()).await, Err(CallError::WriteInFlight));

        let hash = pending.await.unwrap();
        assert_eq!(hash, TxHash::repeat_byte(1));
        let record = gateway.tracker().wait_settled().await;
        assert!(record.is_success());
        assert_eq!(record.chain_id, Some(42220));
        let sent = ledger.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].value, fee());
        assert_eq!(sent[0].to, NFT);
    }

    #[tokio::test]
    async fn test_write_failure_leaves_failed_without_hash() {
        let ledger = Arc::new(MockLedger::connected(42220));
        ledger.push_send(Err(CallError::Rejected));
        let gateway = LaunchpadGateway::new(ledger, NFT);
        let err = gateway
            .write(
                IAiLaunchpad::buyCall {
                    listingId: U256::from(1u8),
                }
                .into(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, CallError::Rejected);
        let record = gateway.tracker().snapshot();
        assert!(record.is_error());
        assert_eq!(record.hash, None);
        assert_eq!(record.error, Some(CallError::Rejected));
    }

    #[tokio::test]
    async fn test_write_without_chain_fails_record() {
        let gateway = LaunchpadGateway::new(Arc::new(MockLedger::disconnected()), NFT);
        let err = gateway
            .write(
                IAiLaunchpad::buyCall {
                    listingId: U256::from(1u8),
                }
                .into(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, CallError::NoChain);
        assert!(gateway.tracker().is_error());
    }

    #[tokio::test]
    async fn test_dropped_write_future_fails_record() {
        let ledger = Arc::new(MockLedger::connected(42220));
        let gateway = LaunchpadGateway::new(ledger, NFT);
        let fut = gateway.write(
            IAiLaunchpad::buyCall {
                listingId: U256::from(1u8),
            }
            .into(),
        );
        assert!(gateway.tracker().is_writing());
        drop(fut);
        let record = gateway.tracker().snapshot();
        assert!(record.is_error());
        assert_eq!(record.error, Some(CallError::Dropped));
    }

    #[tokio::test]
    async fn test_reverted_receipt_and_refetch() {
        let ledger = Arc::new(MockLedger::connected(42220));
        let hash = TxHash::repeat_byte(9);
        ledger.push_send(Ok(hash));
        ledger.push_settlement(Settlement::Error(CallError::Transport(
            "node unavailable".into(),
        )));
        let gateway = LaunchpadGateway::new(Arc::clone(&ledger), NFT);
        gateway
            .write(
                IAiLaunchpad::buyCall {
                    listingId: U256::from(1u8),
                }
                .into(),
            )
            .await
            .unwrap();

        let failed = gateway.tracker().wait_settled().await;
        assert_eq!(
            failed.error,
            Some(CallError::Transport("node unavailable".into()))
        );

        assert!(gateway.refetch_receipt());
        let confirmed = gateway.tracker().wait_settled().await;
        assert!(confirmed.is_success());
        assert_eq!(confirmed.hash, Some(hash));
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_timeout() {
        let ledger = Arc::new(MockLedger::connected(42220));
        let hash = TxHash::repeat_byte(2);
        ledger.push_send(Ok(hash));
        ledger.hold_receipts(true);
        let gateway = LaunchpadGateway::new(ledger, NFT).with_config(GatewayConfig {
            confirmation_timeout: Some(Duration::from_secs(30)),
        });
        gateway
            .write(
                IAiLaunchpad::buyCall {
                    listingId: U256::from(1u8),
                }
                .into(),
            )
            .await
            .unwrap();
        let record = gateway.tracker().wait_settled().await;
        assert_eq!(record.error, Some(CallError::ConfirmationTimeout(hash)));
    }

    #[tokio::test]
    async fn test_rebind_refused_while_confirming() {
        let ledger = Arc::new(MockLedger::connected(42220));
        ledger.push_send(Ok(TxHash::repeat_byte(1)));
        ledger.hold_receipts(true);
        let mut gateway = LaunchpadGateway::new(ledger, NFT);
        gateway
            .write(
                IAiLaunchpad::buyCall {
                    listingId: U256::from(1u8),
                }
                .into(),
            )
            .await
            .unwrap();
        assert_eq!(
            gateway.rebind(Address::ZERO, None),
            Err(CallError::WriteInFlight)
        );
        gateway.tracker().reset();
        assert_eq!(gateway.rebind(Address::ZERO, Some(1)), Ok(()));
        assert_eq!(gateway.address(), Address::ZERO);
    }
}
