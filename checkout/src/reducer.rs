//! The checkout transition function.
//!
//! `Submit` walks the decision tree: the two escape hatches, the single-flight
//! guard, then connect → resolve → submit. Collaborator results come back as
//! actions carrying the attempt or submission they belong to. The bridge
//! rules (pending on acceptance, polling, success on receipt) are arms of the
//! same function.
//!
//! ```text
//! Submit ──► connect ──► WalletConnected ──► resolve ──► ContractsResolved
//!   │                                          ▲              │
//!   └──────────── wallet already known ────────┘              ▼
//!                                     insufficient? ──► error(insufficient_balance)
//!                                     no calls?     ──► error(contracts_unavailable)
//!                                     calls         ──► submit ──► SubmissionAccepted
//!                                                                       │
//!                            transactionPending ◄───────────────────────┘
//!                                   │
//!                 poll ──► SubmissionStatusReported ──(pending)──► poll again
//!                                   │ included
//!                                   ▼
//!                        wait ──► ReceiptConfirmed ──► success([receipt])
//! ```
//!
//! A failed poll or receipt wait is retried after the poll interval.

use crate::status_store::StatusStore;
use charge_checkout_core::config::CheckoutConfig;
use charge_checkout_core::context::{AttemptId, OrchestrationContext};
use charge_checkout_core::effect::Effect;
use charge_checkout_core::environment::{
    BatchSubmitter, ContractResolver, LinkOpener, OpenLinkRequest, ReceiptWatcher,
    SubmissionStatusPoller, WalletConnector,
};
use charge_checkout_core::error::{CheckoutError, CollaboratorError, Step};
use charge_checkout_core::reducer::Reducer;
use charge_checkout_core::status::{ErrorCode, LifecycleStatus};
use charge_checkout_core::types::{
    Address, CallsStatus, ContractCall, Receipt, Resolution, SubmissionId, TransactionHash,
};
use charge_checkout_core::{SmallVec, smallvec};
use std::sync::Arc;

/// Reducer state: the status plus the orchestration context
#[derive(Debug, Clone)]
pub struct CheckoutState {
    /// Current lifecycle status, shared with observers
    pub status: StatusStore,
    /// Per-instance context
    pub context: OrchestrationContext,
}

impl CheckoutState {
    /// State for a fresh checkout
    #[must_use]
    pub const fn new(status: StatusStore, context: OrchestrationContext) -> Self {
        Self { status, context }
    }
}

/// Every input to the checkout transition function
#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutAction {
    /// The caller pressed pay
    Submit,

    /// The wallet prompt succeeded
    WalletConnected {
        /// Attempt that asked for the connection
        attempt: AttemptId,
        /// Connected account
        address: Address,
    },

    /// The resolver answered
    ContractsResolved {
        /// Attempt that asked for the resolution
        attempt: AttemptId,
        /// Calls and balance verdict
        resolution: Resolution,
    },

    /// The wallet accepted the batch
    SubmissionAccepted {
        /// Attempt that submitted the batch
        attempt: AttemptId,
        /// Identifier assigned by the wallet
        submission_id: SubmissionId,
    },

    /// A step of the attempt failed
    AttemptFailed {
        /// Attempt that failed
        attempt: AttemptId,
        /// Classified failure
        error: CheckoutError,
    },

    /// Time to poll the submission again
    PollSubmission {
        /// Submission to poll
        submission_id: SubmissionId,
    },

    /// The poller answered
    SubmissionStatusReported {
        /// Submission that was polled
        submission_id: SubmissionId,
        /// Pending or included
        status: CallsStatus,
    },

    /// Time to wait for the receipt again
    WatchReceipt {
        /// Submission whose transaction is watched
        submission_id: SubmissionId,
    },

    /// The receipt for the including transaction arrived
    ReceiptConfirmed {
        /// Submission the receipt belongs to
        submission_id: SubmissionId,
        /// Hash the watcher was asked about
        transaction_hash: TransactionHash,
        /// The receipt
        receipt: Receipt,
    },

    /// Polling or receipt watching failed
    ObservationFailed {
        /// Submission being observed
        submission_id: SubmissionId,
        /// The failure
        error: CollaboratorError,
    },

    /// The host reported an account switch or a disconnect
    WalletAccountChanged {
        /// New account, `None` when disconnected
        address: Option<Address>,
    },
}

/// Injected collaborators and configuration
#[derive(Clone)]
pub struct CheckoutEnvironment {
    /// Wallet connection
    pub wallet: Arc<dyn WalletConnector>,
    /// Charge resolution
    pub resolver: Arc<dyn ContractResolver>,
    /// Batch submission
    pub submitter: Arc<dyn BatchSubmitter>,
    /// Submission status
    pub poller: Arc<dyn SubmissionStatusPoller>,
    /// Receipt confirmation
    pub receipts: Arc<dyn ReceiptWatcher>,
    /// Opens receipt and funding references
    pub links: Arc<dyn LinkOpener>,
    /// Configuration
    pub config: CheckoutConfig,
}

impl CheckoutEnvironment {
    /// Environment with default configuration
    #[must_use]
    pub fn new(
        wallet: Arc<dyn WalletConnector>,
        resolver: Arc<dyn ContractResolver>,
        submitter: Arc<dyn BatchSubmitter>,
        poller: Arc<dyn SubmissionStatusPoller>,
        receipts: Arc<dyn ReceiptWatcher>,
        links: Arc<dyn LinkOpener>,
    ) -> Self {
        Self {
            wallet,
            resolver,
            submitter,
            poller,
            receipts,
            links,
            config: CheckoutConfig::default(),
        }
    }

    /// Replace the configuration
    #[must_use]
    pub fn with_config(mut self, config: CheckoutConfig) -> Self {
        self.config = config;
        self
    }
}

impl std::fmt::Debug for CheckoutEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutEnvironment")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Reducer for one charge checkout
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckoutReducer;

type Effects = SmallVec<[Effect<CheckoutAction>; 4]>;

impl Reducer for CheckoutReducer {
    type State = CheckoutState;
    type Action = CheckoutAction;
    type Environment = CheckoutEnvironment;

    fn reduce(
        &self,
        state: &mut CheckoutState,
        action: CheckoutAction,
        env: &CheckoutEnvironment,
    ) -> Effects {
        match action {
            CheckoutAction::Submit => Self::submit(state, env),

            CheckoutAction::WalletConnected { attempt, address } => {
                // The wallet is connected whether or not the attempt is
                // still current.
                state.context.address = Some(address.clone());
                if !state.context.is_current_attempt(attempt) {
                    tracing::debug!(%attempt, "Ignoring connection for superseded attempt");
                    return smallvec![Effect::None];
                }
                tracing::debug!(%attempt, %address, "Wallet connected");
                smallvec![resolve(env, &state.context, attempt, address)]
            },

            CheckoutAction::ContractsResolved {
                attempt,
                resolution,
            } => {
                if !state.context.is_current_attempt(attempt) {
                    tracing::debug!(%attempt, "Ignoring resolution for superseded attempt");
                    return smallvec![Effect::None];
                }
                state
                    .context
                    .record_resolution(resolution.calls, resolution.insufficient_balance);

                if state.context.take_insufficient_balance() {
                    return Self::fail(state, attempt, &CheckoutError::InsufficientBalance);
                }
                match state.context.resolved_calls.clone() {
                    Some(calls) => {
                        tracing::debug!(%attempt, calls = calls.len(), "Submitting batch");
                        smallvec![submit_batch(env, attempt, calls)]
                    },
                    None => Self::fail(state, attempt, &CheckoutError::ContractsUnavailable),
                }
            },

            CheckoutAction::SubmissionAccepted {
                attempt,
                submission_id,
            } => {
                if !state.context.is_current_attempt(attempt) {
                    tracing::debug!(%attempt, %submission_id, "Ignoring acceptance for superseded attempt");
                    return smallvec![Effect::None];
                }
                tracing::info!(%attempt, %submission_id, "Batch accepted");
                state.context.finish_attempt();
                state.context.submission_id = Some(submission_id.clone());
                state.context.transaction_hash = None;
                state.status.set(LifecycleStatus::TransactionPending);
                smallvec![poll(env, submission_id)]
            },

            CheckoutAction::AttemptFailed { attempt, error } => {
                if !state.context.is_current_attempt(attempt) {
                    tracing::debug!(%attempt, %error, "Ignoring failure for superseded attempt");
                    return smallvec![Effect::None];
                }
                Self::fail(state, attempt, &error)
            },

            CheckoutAction::PollSubmission { submission_id } => {
                if !state.context.is_current_submission(&submission_id) {
                    return smallvec![Effect::None];
                }
                smallvec![poll(env, submission_id)]
            },

            CheckoutAction::SubmissionStatusReported {
                submission_id,
                status,
            } => {
                if !state.context.is_current_submission(&submission_id) {
                    tracing::debug!(%submission_id, "Ignoring status of superseded submission");
                    return smallvec![Effect::None];
                }
                match status {
                    CallsStatus::Pending => smallvec![Effect::delay(
                        env.config.poll_interval,
                        CheckoutAction::PollSubmission { submission_id },
                    )],
                    CallsStatus::Included { transaction_hash } => {
                        tracing::debug!(%submission_id, %transaction_hash, "Batch included");
                        state.context.transaction_hash = Some(transaction_hash);
                        smallvec![watch_receipt(env, &state.context, submission_id)]
                    },
                }
            },

            CheckoutAction::WatchReceipt { submission_id } => {
                if !state.context.is_current_submission(&submission_id) {
                    return smallvec![Effect::None];
                }
                smallvec![watch_receipt(env, &state.context, submission_id)]
            },

            CheckoutAction::ReceiptConfirmed {
                submission_id,
                transaction_hash,
                receipt,
            } => {
                // Keyed on the hash handed to the watcher; the receipt's own
                // copy may be formatted differently.
                let for_current = state.context.is_current_submission(&submission_id)
                    && state.context.transaction_hash.as_ref() == Some(&transaction_hash);
                if !for_current {
                    tracing::debug!(%submission_id, "Ignoring receipt of superseded submission");
                    return smallvec![Effect::None];
                }
                tracing::info!(
                    %submission_id,
                    transaction_hash = %receipt.transaction_hash,
                    block_number = receipt.block_number,
                    "Payment confirmed"
                );
                state.status.set(LifecycleStatus::success(receipt));
                smallvec![Effect::None]
            },

            CheckoutAction::ObservationFailed {
                submission_id,
                error,
            } => {
                tracing::warn!(%submission_id, %error, "Observation failed");
                if !state.context.is_current_submission(&submission_id) {
                    return smallvec![Effect::None];
                }
                let retry = if state.context.transaction_hash.is_some() {
                    CheckoutAction::WatchReceipt { submission_id }
                } else {
                    CheckoutAction::PollSubmission { submission_id }
                };
                smallvec![Effect::delay(env.config.poll_interval, retry)]
            },

            CheckoutAction::WalletAccountChanged { address } => {
                tracing::info!(
                    address = address.as_ref().map(Address::as_str),
                    "Wallet account changed"
                );
                state.context.reset();
                state.context.address = address;
                smallvec![Effect::None]
            },
        }
    }
}

impl CheckoutReducer {
    fn submit(state: &mut CheckoutState, env: &CheckoutEnvironment) -> Effects {
        metrics::counter!("checkout.submit.total").increment(1);
        let status = state.status.get();

        if status.is_success() {
            let url = env.config.receipt_url(&state.context.charge_id);
            tracing::debug!(%url, "Opening receipt");
            env.links.open(&OpenLinkRequest::isolated(url));
            return smallvec![Effect::None];
        }

        if status.is_error_with(ErrorCode::InsufficientBalance) {
            tracing::debug!(url = %env.config.funding_url, "Opening funding page");
            env.links
                .open(&OpenLinkRequest::isolated(env.config.funding_url.clone()));
            return smallvec![Effect::None];
        }

        let attempt = match status {
            LifecycleStatus::TransactionPending => None,
            _ => state.context.begin_attempt(),
        };
        let Some(attempt) = attempt else {
            tracing::warn!(
                %status,
                in_flight = ?state.context.in_flight(),
                "Rejected overlapping submit"
            );
            metrics::counter!("checkout.submit.rejected_overlapping").increment(1);
            return smallvec![Effect::None];
        };

        match state.context.address.clone() {
            Some(address) => {
                tracing::debug!(%attempt, "Starting attempt with connected wallet");
                smallvec![resolve(env, &state.context, attempt, address)]
            },
            None => {
                tracing::debug!(%attempt, "Starting attempt, connecting wallet");
                smallvec![connect(env, attempt)]
            },
        }
    }

    fn fail(state: &mut CheckoutState, attempt: AttemptId, error: &CheckoutError) -> Effects {
        state.context.error_message = Some(error.user_message().to_string());
        state.context.clear_submission();
        state.context.finish_attempt();

        match error.status() {
            Some(status) => {
                tracing::warn!(%attempt, %error, code = %status.code, "Attempt failed");
                metrics::counter!("checkout.failures", "code" => status.code.as_str())
                    .increment(1);
                state.status.set(LifecycleStatus::Error(status));
            },
            None => {
                tracing::info!(%attempt, %error, "Attempt declined by the wallet holder");
            },
        }
        smallvec![Effect::None]
    }
}

fn connect(env: &CheckoutEnvironment, attempt: AttemptId) -> Effect<CheckoutAction> {
    let wallet = Arc::clone(&env.wallet);
    let hint = env.config.preferred_connector.clone();
    Effect::future(async move {
        Some(match wallet.connect(hint.as_deref()).await {
            Ok(address) => CheckoutAction::WalletConnected { attempt, address },
            Err(error) => CheckoutAction::AttemptFailed {
                attempt,
                error: CheckoutError::classify(Step::Connect, error),
            },
        })
    })
}

fn resolve(
    env: &CheckoutEnvironment,
    context: &OrchestrationContext,
    attempt: AttemptId,
    address: Address,
) -> Effect<CheckoutAction> {
    let resolver = Arc::clone(&env.resolver);
    let charge_id = context.charge_id.clone();
    Effect::future(async move {
        Some(match resolver.resolve(&address, &charge_id).await {
            Ok(resolution) => CheckoutAction::ContractsResolved {
                attempt,
                resolution,
            },
            Err(error) => CheckoutAction::AttemptFailed {
                attempt,
                error: CheckoutError::classify(Step::Resolve, error),
            },
        })
    })
}

fn submit_batch(
    env: &CheckoutEnvironment,
    attempt: AttemptId,
    calls: Vec<ContractCall>,
) -> Effect<CheckoutAction> {
    let submitter = Arc::clone(&env.submitter);
    Effect::future(async move {
        Some(match submitter.submit(calls).await {
            Ok(submission_id) => CheckoutAction::SubmissionAccepted {
                attempt,
                submission_id,
            },
            Err(error) => CheckoutAction::AttemptFailed {
                attempt,
                error: CheckoutError::classify(Step::Submit, error),
            },
        })
    })
}

fn poll(env: &CheckoutEnvironment, submission_id: SubmissionId) -> Effect<CheckoutAction> {
    let poller = Arc::clone(&env.poller);
    Effect::future(async move {
        Some(match poller.poll(&submission_id).await {
            Ok(status) => CheckoutAction::SubmissionStatusReported {
                submission_id,
                status,
            },
            Err(error) => CheckoutAction::ObservationFailed {
                submission_id,
                error,
            },
        })
    })
}

fn watch_receipt(
    env: &CheckoutEnvironment,
    context: &OrchestrationContext,
    submission_id: SubmissionId,
) -> Effect<CheckoutAction> {
    let Some(transaction_hash) = context.transaction_hash.clone() else {
        return Effect::None;
    };
    let receipts = Arc::clone(&env.receipts);
    Effect::future(async move {
        Some(match receipts.wait_for_receipt(&transaction_hash).await {
            Ok(receipt) => CheckoutAction::ReceiptConfirmed {
                submission_id,
                transaction_hash,
                receipt,
            },
            Err(error) => CheckoutAction::ObservationFailed {
                submission_id,
                error,
            },
        })
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use charge_checkout_core::status::{ErrorStatus, USER_REJECTED_MESSAGE};
    use charge_checkout_testing::mocks::{
        MockBatchSubmitter, MockContractResolver, MockReceiptWatcher,
        MockSubmissionStatusPoller, MockWalletConnector, RecordingLinkOpener,
    };
    use charge_checkout_testing::{ReducerTest, assertions, fixtures};
    use proptest::prelude::*;
    use std::time::Duration;

    struct Harness {
        links: Arc<RecordingLinkOpener>,
        env: CheckoutEnvironment,
    }

    fn harness() -> Harness {
        let links = Arc::new(RecordingLinkOpener::new());
        let env = CheckoutEnvironment::new(
            Arc::new(MockWalletConnector::connecting(fixtures::payer())),
            Arc::new(MockContractResolver::resolving(fixtures::payable())),
            Arc::new(MockBatchSubmitter::accepting(fixtures::submission_id())),
            Arc::new(MockSubmissionStatusPoller::included_after(
                0,
                fixtures::transaction_hash(),
            )),
            Arc::new(MockReceiptWatcher::confirming_at(1)),
            links.clone(),
        )
        .with_config(
            CheckoutConfig::new("pay.example.com").with_poll_interval(Duration::from_millis(250)),
        );
        Harness { links, env }
    }

    fn context() -> OrchestrationContext {
        OrchestrationContext::new(fixtures::chain_id(), fixtures::charge_id())
    }

    fn state_with(status: LifecycleStatus, context: OrchestrationContext) -> CheckoutState {
        let store = StatusStore::new();
        store.set(status);
        CheckoutState::new(store, context)
    }

    /// Context with `attempt` in flight
    fn in_flight() -> (OrchestrationContext, AttemptId) {
        let mut ctx = context();
        let attempt = ctx.begin_attempt().unwrap();
        (ctx, attempt)
    }

    /// Context whose current submission is pending inclusion
    fn submitted() -> OrchestrationContext {
        let mut ctx = context();
        ctx.submission_id = Some(fixtures::submission_id());
        ctx
    }

    #[test]
    fn submit_from_success_opens_the_receipt_and_keeps_status() {
        let Harness { links, env } = harness();
        let success = LifecycleStatus::success(fixtures::receipt(fixtures::transaction_hash()));

        ReducerTest::new(CheckoutReducer)
            .with_env(env)
            .given_state(state_with(success.clone(), context()))
            .when_actions([CheckoutAction::Submit, CheckoutAction::Submit])
            .then_state(move |state| {
                assert_eq!(state.status.get(), success);
                assert!(state.context.in_flight().is_none());
            })
            .then_effects(assertions::assert_no_effects)
            .run();

        let opened = links.opened();
        assert_eq!(opened.len(), 2);
        assert_eq!(
            opened[0].url,
            format!("https://pay.example.com/pay/{}/receipt", fixtures::charge_id())
        );
        assert_eq!(opened[0].target, "_blank");
        assert_eq!(opened[0].features, "noopener,noreferrer");
    }

    #[test]
    fn submit_from_insufficient_balance_opens_the_funding_page() {
        let Harness { links, env } = harness();
        let insufficient = LifecycleStatus::Error(ErrorStatus::insufficient_balance());

        ReducerTest::new(CheckoutReducer)
            .with_env(env)
            .given_state(state_with(insufficient.clone(), context()))
            .when_action(CheckoutAction::Submit)
            .then_state(move |state| assert_eq!(state.status.get(), insufficient))
            .then_effects(assertions::assert_no_effects)
            .run();

        assert_eq!(links.urls(), vec!["https://keys.coinbase.com/fund"]);
    }

    #[test]
    fn submit_from_other_errors_starts_a_new_attempt() {
        let Harness { links, env } = harness();
        let unavailable = LifecycleStatus::Error(ErrorStatus::contracts_unavailable());

        ReducerTest::new(CheckoutReducer)
            .with_env(env)
            .given_state(state_with(unavailable, context()))
            .when_action(CheckoutAction::Submit)
            .then_state(|state| assert!(state.context.in_flight().is_some()))
            .then_effects(assertions::assert_has_future_effect)
            .run();

        assert!(links.opened().is_empty());
    }

    #[test]
    fn submit_while_an_attempt_is_in_flight_is_rejected() {
        let (ctx, attempt) = in_flight();

        ReducerTest::new(CheckoutReducer)
            .with_env(harness().env)
            .given_state(state_with(LifecycleStatus::Init, ctx))
            .when_action(CheckoutAction::Submit)
            .then_state(move |state| {
                assert_eq!(state.context.in_flight(), Some(attempt));
                assert_eq!(state.status.get(), LifecycleStatus::Init);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn submit_while_pending_is_rejected() {
        ReducerTest::new(CheckoutReducer)
            .with_env(harness().env)
            .given_state(state_with(LifecycleStatus::TransactionPending, submitted()))
            .when_action(CheckoutAction::Submit)
            .then_state(|state| {
                assert!(state.context.in_flight().is_none());
                assert_eq!(state.status.get(), LifecycleStatus::TransactionPending);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn insufficient_balance_becomes_an_error_status() {
        let (ctx, attempt) = in_flight();

        ReducerTest::new(CheckoutReducer)
            .with_env(harness().env)
            .given_state(state_with(LifecycleStatus::Init, ctx))
            .when_action(CheckoutAction::ContractsResolved {
                attempt,
                resolution: Resolution::insufficient(vec![fixtures::call_x()]),
            })
            .then_state(|state| {
                assert!(state.status.get().is_error_with(ErrorCode::InsufficientBalance));
                assert!(!state.context.insufficient_balance);
                assert!(state.context.resolved_calls.is_none());
                assert!(state.context.in_flight().is_none());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn empty_resolution_means_contracts_unavailable() {
        let (ctx, attempt) = in_flight();

        ReducerTest::new(CheckoutReducer)
            .with_env(harness().env)
            .given_state(state_with(LifecycleStatus::Init, ctx))
            .when_action(CheckoutAction::ContractsResolved {
                attempt,
                resolution: Resolution::default(),
            })
            .then_state(|state| {
                let status = state.status.get();
                assert!(status.is_error_with(ErrorCode::ContractsUnavailable));
                assert_eq!(
                    status.error().unwrap().message,
                    "Something went wrong. Please try again."
                );
            })
            .run();
    }

    #[test]
    fn resolved_calls_are_submitted() {
        let (ctx, attempt) = in_flight();

        ReducerTest::new(CheckoutReducer)
            .with_env(harness().env)
            .given_state(state_with(LifecycleStatus::Init, ctx))
            .when_action(CheckoutAction::ContractsResolved {
                attempt,
                resolution: fixtures::payable(),
            })
            .then_state(|state| {
                assert_eq!(
                    state.context.resolved_calls,
                    Some(vec![fixtures::call_x()])
                );
                assert_eq!(state.status.get(), LifecycleStatus::Init);
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn user_rejection_sets_only_the_side_channel() {
        let (ctx, attempt) = in_flight();

        ReducerTest::new(CheckoutReducer)
            .with_env(harness().env)
            .given_state(state_with(LifecycleStatus::Init, ctx))
            .when_action(CheckoutAction::AttemptFailed {
                attempt,
                error: CheckoutError::UserRejected { step: Step::Submit },
            })
            .then_state(|state| {
                assert_eq!(state.status.get(), LifecycleStatus::Init);
                assert_eq!(
                    state.context.error_message.as_deref(),
                    Some(USER_REJECTED_MESSAGE)
                );
                assert!(state.context.submission_id.is_none());
                assert!(state.context.in_flight().is_none());
            })
            .run();
    }

    #[test]
    fn unclassified_failure_records_the_step() {
        let (ctx, attempt) = in_flight();

        ReducerTest::new(CheckoutReducer)
            .with_env(harness().env)
            .given_state(state_with(LifecycleStatus::Init, ctx))
            .when_action(CheckoutAction::AttemptFailed {
                attempt,
                error: CheckoutError::classify(
                    Step::Resolve,
                    CollaboratorError::network("connection reset"),
                ),
            })
            .then_state(|state| {
                let status = state.status.get();
                let error = status.error().unwrap();
                assert_eq!(error.code, ErrorCode::UnclassifiedFailure);
                assert!(error.error.contains("\"step\":\"resolve\""));
            })
            .run();
    }

    #[test]
    fn results_for_a_superseded_attempt_are_ignored() {
        let mut ctx = context();
        let stale = ctx.begin_attempt().unwrap();
        ctx.finish_attempt();
        let current = ctx.begin_attempt().unwrap();

        ReducerTest::new(CheckoutReducer)
            .with_env(harness().env)
            .given_state(state_with(LifecycleStatus::Init, ctx))
            .when_actions([
                CheckoutAction::ContractsResolved {
                    attempt: stale,
                    resolution: Resolution::default(),
                },
                CheckoutAction::SubmissionAccepted {
                    attempt: stale,
                    submission_id: SubmissionId::new("late"),
                },
            ])
            .then_state(move |state| {
                assert_eq!(state.status.get(), LifecycleStatus::Init);
                assert!(state.context.submission_id.is_none());
                assert_eq!(state.context.in_flight(), Some(current));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn stale_connection_still_records_the_wallet() {
        let mut ctx = context();
        let stale = ctx.begin_attempt().unwrap();
        ctx.finish_attempt();

        ReducerTest::new(CheckoutReducer)
            .with_env(harness().env)
            .given_state(state_with(LifecycleStatus::Init, ctx))
            .when_action(CheckoutAction::WalletConnected {
                attempt: stale,
                address: fixtures::payer(),
            })
            .then_state(|state| assert_eq!(state.context.address, Some(fixtures::payer())))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn acceptance_sets_pending_and_starts_polling() {
        let (ctx, attempt) = in_flight();

        ReducerTest::new(CheckoutReducer)
            .with_env(harness().env)
            .given_state(state_with(LifecycleStatus::Init, ctx))
            .when_action(CheckoutAction::SubmissionAccepted {
                attempt,
                submission_id: fixtures::submission_id(),
            })
            .then_state(|state| {
                assert_eq!(state.status.get(), LifecycleStatus::TransactionPending);
                assert!(state.context.is_current_submission(&fixtures::submission_id()));
                assert!(state.context.in_flight().is_none());
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn pending_submission_is_polled_again_after_the_interval() {
        ReducerTest::new(CheckoutReducer)
            .with_env(harness().env)
            .given_state(state_with(LifecycleStatus::TransactionPending, submitted()))
            .when_action(CheckoutAction::SubmissionStatusReported {
                submission_id: fixtures::submission_id(),
                status: CallsStatus::Pending,
            })
            .then_effects(|effects| {
                assertions::assert_has_delay_effect(
                    effects,
                    Duration::from_millis(250),
                    |action| {
                        *action
                            == CheckoutAction::PollSubmission {
                                submission_id: fixtures::submission_id(),
                            }
                    },
                );
            })
            .run();
    }

    #[test]
    fn failed_poll_is_retried_but_status_is_kept() {
        ReducerTest::new(CheckoutReducer)
            .with_env(harness().env)
            .given_state(state_with(LifecycleStatus::TransactionPending, submitted()))
            .when_action(CheckoutAction::ObservationFailed {
                submission_id: fixtures::submission_id(),
                error: CollaboratorError::observation("rpc timeout"),
            })
            .then_state(|state| {
                assert_eq!(state.status.get(), LifecycleStatus::TransactionPending);
            })
            .then_effects(|effects| {
                assertions::assert_has_delay_effect(
                    effects,
                    Duration::from_millis(250),
                    |action| matches!(action, CheckoutAction::PollSubmission { .. }),
                );
            })
            .run();
    }

    #[test]
    fn receipt_for_the_included_transaction_means_success() {
        let receipt = fixtures::receipt(fixtures::transaction_hash());
        let expected = LifecycleStatus::success(receipt.clone());

        ReducerTest::new(CheckoutReducer)
            .with_env(harness().env)
            .given_state(state_with(LifecycleStatus::TransactionPending, submitted()))
            .when_actions([
                CheckoutAction::SubmissionStatusReported {
                    submission_id: fixtures::submission_id(),
                    status: CallsStatus::Included {
                        transaction_hash: fixtures::transaction_hash(),
                    },
                },
                CheckoutAction::ReceiptConfirmed {
                    submission_id: fixtures::submission_id(),
                    transaction_hash: fixtures::transaction_hash(),
                    receipt,
                },
            ])
            .then_state(move |state| assert_eq!(state.status.get(), expected))
            .run();
    }

    #[test]
    fn receipt_is_matched_on_the_watched_hash() {
        let mut ctx = submitted();
        ctx.transaction_hash = Some(fixtures::transaction_hash());
        let checksummed = fixtures::receipt(TransactionHash::new("0xABC123"));
        let expected = LifecycleStatus::success(checksummed.clone());

        ReducerTest::new(CheckoutReducer)
            .with_env(harness().env)
            .given_state(state_with(LifecycleStatus::TransactionPending, ctx))
            .when_action(CheckoutAction::ReceiptConfirmed {
                submission_id: fixtures::submission_id(),
                transaction_hash: fixtures::transaction_hash(),
                receipt: checksummed,
            })
            .then_state(move |state| assert_eq!(state.status.get(), expected))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn failed_receipt_wait_is_retried_after_the_interval() {
        let mut ctx = submitted();
        ctx.transaction_hash = Some(fixtures::transaction_hash());

        ReducerTest::new(CheckoutReducer)
            .with_env(harness().env)
            .given_state(state_with(LifecycleStatus::TransactionPending, ctx))
            .when_action(CheckoutAction::ObservationFailed {
                submission_id: fixtures::submission_id(),
                error: CollaboratorError::observation("rpc timeout"),
            })
            .then_state(|state| {
                assert_eq!(state.status.get(), LifecycleStatus::TransactionPending);
            })
            .then_effects(|effects| {
                assertions::assert_has_delay_effect(
                    effects,
                    Duration::from_millis(250),
                    |action| {
                        *action
                            == CheckoutAction::WatchReceipt {
                                submission_id: fixtures::submission_id(),
                            }
                    },
                );
            })
            .run();
    }

    #[test]
    fn watching_again_calls_the_watcher() {
        let mut ctx = submitted();
        ctx.transaction_hash = Some(fixtures::transaction_hash());

        ReducerTest::new(CheckoutReducer)
            .with_env(harness().env)
            .given_state(state_with(LifecycleStatus::TransactionPending, ctx))
            .when_action(CheckoutAction::WatchReceipt {
                submission_id: fixtures::submission_id(),
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn observation_of_a_superseded_submission_stops() {
        ReducerTest::new(CheckoutReducer)
            .with_env(harness().env)
            .given_state(state_with(LifecycleStatus::Init, context()))
            .when_actions([
                CheckoutAction::ObservationFailed {
                    submission_id: SubmissionId::new("old"),
                    error: CollaboratorError::observation("rpc timeout"),
                },
                CheckoutAction::WatchReceipt {
                    submission_id: SubmissionId::new("old"),
                },
            ])
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn receipt_for_another_transaction_is_ignored() {
        let mut ctx = submitted();
        ctx.transaction_hash = Some(fixtures::transaction_hash());

        ReducerTest::new(CheckoutReducer)
            .with_env(harness().env)
            .given_state(state_with(LifecycleStatus::TransactionPending, ctx))
            .when_action(CheckoutAction::ReceiptConfirmed {
                submission_id: fixtures::submission_id(),
                transaction_hash: TransactionHash::new("0xother"),
                receipt: fixtures::receipt(TransactionHash::new("0xother")),
            })
            .then_state(|state| {
                assert_eq!(state.status.get(), LifecycleStatus::TransactionPending);
            })
            .run();
    }

    #[test]
    fn account_change_abandons_the_attempt() {
        let (mut ctx, attempt) = in_flight();
        ctx.address = Some(fixtures::payer());

        ReducerTest::new(CheckoutReducer)
            .with_env(harness().env)
            .given_state(state_with(LifecycleStatus::Init, ctx))
            .when_actions([
                CheckoutAction::WalletAccountChanged { address: None },
                CheckoutAction::ContractsResolved {
                    attempt,
                    resolution: fixtures::payable(),
                },
            ])
            .then_state(|state| {
                assert!(state.context.address.is_none());
                assert!(state.context.resolved_calls.is_none());
                assert!(state.context.in_flight().is_none());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    /// Host or collaborator input, turned into an action against the
    /// current state
    #[derive(Debug, Clone)]
    enum Input {
        Submit,
        Connected { stale: bool },
        Resolved { stale: bool, resolution: u8 },
        Accepted { stale: bool, batch: u8 },
        Failed { stale: bool, rejected: bool },
        Reported { batch: u8, included: bool },
        Receipt { batch: u8 },
        ObservationFailed { batch: u8 },
        AccountChanged { connected: bool },
    }

    fn batch(n: u8) -> SubmissionId {
        SubmissionId::new(format!("batch-{n}"))
    }

    fn hash_of(n: u8) -> TransactionHash {
        TransactionHash::new(format!("0xtx{n}"))
    }

    fn any_input() -> impl Strategy<Value = Input> {
        prop_oneof![
            Just(Input::Submit),
            any::<bool>().prop_map(|stale| Input::Connected { stale }),
            (any::<bool>(), 0..3u8)
                .prop_map(|(stale, resolution)| Input::Resolved { stale, resolution }),
            (any::<bool>(), 0..2u8).prop_map(|(stale, batch)| Input::Accepted { stale, batch }),
            (any::<bool>(), any::<bool>())
                .prop_map(|(stale, rejected)| Input::Failed { stale, rejected }),
            (0..2u8, any::<bool>()).prop_map(|(batch, included)| Input::Reported { batch, included }),
            (0..2u8).prop_map(|batch| Input::Receipt { batch }),
            (0..2u8).prop_map(|batch| Input::ObservationFailed { batch }),
            any::<bool>().prop_map(|connected| Input::AccountChanged { connected }),
        ]
    }

    /// `None` when the input needs an attempt and none was ever started
    fn action_for(
        input: &Input,
        context: &OrchestrationContext,
        started: &[AttemptId],
    ) -> Option<CheckoutAction> {
        let attempt = |stale: bool| {
            if stale {
                started.first().copied()
            } else {
                context.in_flight().or_else(|| started.last().copied())
            }
        };

        Some(match *input {
            Input::Submit => CheckoutAction::Submit,
            Input::Connected { stale } => CheckoutAction::WalletConnected {
                attempt: attempt(stale)?,
                address: fixtures::payer(),
            },
            Input::Resolved { stale, resolution } => CheckoutAction::ContractsResolved {
                attempt: attempt(stale)?,
                resolution: match resolution {
                    0 => fixtures::payable(),
                    1 => Resolution::insufficient(vec![fixtures::call_x()]),
                    _ => Resolution::default(),
                },
            },
            Input::Accepted { stale, batch: n } => CheckoutAction::SubmissionAccepted {
                attempt: attempt(stale)?,
                submission_id: batch(n),
            },
            Input::Failed { stale, rejected } => CheckoutAction::AttemptFailed {
                attempt: attempt(stale)?,
                error: if rejected {
                    CheckoutError::UserRejected { step: Step::Submit }
                } else {
                    CheckoutError::classify(Step::Resolve, CollaboratorError::network("reset"))
                },
            },
            Input::Reported { batch: n, included } => CheckoutAction::SubmissionStatusReported {
                submission_id: batch(n),
                status: if included {
                    CallsStatus::Included {
                        transaction_hash: hash_of(n),
                    }
                } else {
                    CallsStatus::Pending
                },
            },
            Input::Receipt { batch: n } => CheckoutAction::ReceiptConfirmed {
                submission_id: batch(n),
                transaction_hash: hash_of(n),
                receipt: fixtures::receipt(hash_of(n)),
            },
            Input::ObservationFailed { batch: n } => CheckoutAction::ObservationFailed {
                submission_id: batch(n),
                error: CollaboratorError::observation("timeout"),
            },
            Input::AccountChanged { connected } => CheckoutAction::WalletAccountChanged {
                address: connected.then(fixtures::payer),
            },
        })
    }

    proptest! {
        #[test]
        fn success_only_follows_pending_for_the_same_submission(
            inputs in prop::collection::vec(any_input(), 0..48)
        ) {
            let env = harness().env;
            let mut state = CheckoutState::new(StatusStore::new(), context());
            let mut started: Vec<AttemptId> = Vec::new();
            let mut pending_for: Option<SubmissionId> = None;

            for input in &inputs {
                let Some(action) = action_for(input, &state.context, &started) else {
                    continue;
                };
                let before = state.status.get();
                let _effects = CheckoutReducer.reduce(&mut state, action, &env);
                let after = state.status.get();

                if let Some(attempt) = state.context.in_flight() {
                    if started.last() != Some(&attempt) {
                        started.push(attempt);
                    }
                }

                if after == LifecycleStatus::TransactionPending && before != after {
                    pending_for = state.context.submission_id.clone();
                }
                if after.is_success() && !before.is_success() {
                    prop_assert_eq!(before, LifecycleStatus::TransactionPending);
                    prop_assert!(pending_for.is_some());
                    prop_assert_eq!(&state.context.submission_id, &pending_for);
                }
                if after.is_success() {
                    prop_assert!(state.context.submission_id.is_some());
                    prop_assert!(state.context.in_flight().is_none());
                }
            }
        }
    }
}
