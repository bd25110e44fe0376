//! Write-side action pipeline.
//!
//! Every action walks the same machine:
//!
//! ```text
//! Idle -> Validating -> [Approving] -> Submitting -> Succeeded | Failed
//! ```
//!
//! `Validating` runs the form checks and the precondition reads, uploads
//! property metadata when the action carries any, then reads the allowance.
//! `Approving` is entered only when the allowance is below what the action
//! spends, and its receipt is awaited before the primary write is sent.
//! Terminal states restart on the next `Submit`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::address::Address;
use crate::amount::TokenAmount;
use crate::config::PoplarConfig;
use crate::content::ContentStore;
use crate::error::SdkError;
use crate::forms::{FormError, PropertySubmission, ValidationRequest, VoteRequest};
use crate::id::EntityId;
use crate::ledger::{ContractCall, LedgerReader, Receipt, Wallet};
use crate::projection::{Projector, ValidationDetail};

// ==================== State Machine ====================

/// Where an action currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionState {
    Idle,
    Validating,
    Approving,
    Submitting,
    Succeeded(Receipt),
    Failed(String),
}

impl ActionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Approving => "approving",
            Self::Submitting => "submitting",
            Self::Succeeded(_) => "succeeded",
            Self::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded(_) | Self::Failed(_))
    }

    /// Submit controls are disabled in these states
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Validating | Self::Approving | Self::Submitting)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed(message) => Some(message),
            _ => None,
        }
    }

    /// Pure transition function.
    pub fn apply(self, event: PipelineEvent) -> Result<ActionState, TransitionError> {
        use PipelineEvent as E;

        match (self, event) {
            (Self::Idle | Self::Succeeded(_) | Self::Failed(_), E::Submit) => Ok(Self::Validating),
            (Self::Idle | Self::Succeeded(_) | Self::Failed(_), E::Reset) => Ok(Self::Idle),
            (Self::Validating, E::ValidationFailed(message)) => Ok(Self::Failed(message)),
            (Self::Validating, E::ValidationPassed { needs_approval }) => Ok(if needs_approval {
                Self::Approving
            } else {
                Self::Submitting
            }),
            (Self::Approving, E::ApprovalConfirmed) => Ok(Self::Submitting),
            (Self::Submitting, E::Confirmed(receipt)) => Ok(Self::Succeeded(receipt)),
            (Self::Validating | Self::Approving | Self::Submitting, E::Failed(message)) => {
                Ok(Self::Failed(message))
            }
            (state, event) => Err(TransitionError {
                from: state.name(),
                event: event.name(),
            }),
        }
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(message) => write!(f, "failed: {message}"),
            Self::Succeeded(receipt) => write!(f, "succeeded: {}", receipt.tx_hash),
            other => f.write_str(other.name()),
        }
    }
}

/// Input to [`ActionState::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    Submit,
    ValidationFailed(String),
    ValidationPassed { needs_approval: bool },
    ApprovalConfirmed,
    Confirmed(Receipt),
    Failed(String),
    Reset,
}

impl PipelineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::ValidationFailed(_) => "validation_failed",
            Self::ValidationPassed { .. } => "validation_passed",
            Self::ApprovalConfirmed => "approval_confirmed",
            Self::Confirmed(_) => "confirmed",
            Self::Failed(_) => "failed",
            Self::Reset => "reset",
        }
    }
}

/// Event not accepted in the current state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid transition from {from} on {event}")]
pub struct TransitionError {
    pub from: &'static str,
    pub event: &'static str,
}

/// Why `run` did not walk the machine at all.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Another run of this pipeline is in flight
    #[error("An action is already in progress")]
    Busy,

    /// The action's button is disabled for this caller
    #[error("{0}")]
    Gated(FormError),

    /// Gate could not be evaluated
    #[error(transparent)]
    Unavailable(#[from] SdkError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

// ==================== Actions ====================

/// One user-initiated write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SubmitProperty(PropertySubmission),
    RequestValidation(ValidationRequest),
    CastVote(VoteRequest),
    ConcludeValidation(EntityId),
    ClaimRewards(EntityId),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SubmitProperty(_) => "submit_property",
            Self::RequestValidation(_) => "request_validation",
            Self::CastVote(_) => "cast_vote",
            Self::ConcludeValidation(_) => "conclude_validation",
            Self::ClaimRewards(_) => "claim_rewards",
        }
    }

    /// Availability check for actions offered on the validation detail view
    fn gate(&self) -> Option<(EntityId, Gate)> {
        match self {
            Self::CastVote(vote) => Some((vote.property_id, Gate::Vote)),
            Self::ConcludeValidation(id) => Some((*id, Gate::Conclude)),
            Self::ClaimRewards(id) => Some((*id, Gate::Claim)),
            Self::SubmitProperty(_) | Self::RequestValidation(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Gate {
    Vote,
    Conclude,
    Claim,
}

impl Gate {
    fn is_open(self, detail: &ValidationDetail) -> bool {
        match self {
            Gate::Vote => detail.can_vote(),
            Gate::Conclude => detail.can_conclude(),
            Gate::Claim => detail.can_claim(),
        }
    }

    fn closed(self) -> FormError {
        match self {
            Gate::Vote => FormError::VotingUnavailable,
            Gate::Conclude => FormError::ConcludeUnavailable,
            Gate::Claim => FormError::ClaimUnavailable,
        }
    }
}

/// Outcome of `Validating`
struct Plan {
    account: Address,
    /// Tokens the primary write draws from the allowance
    funding: TokenAmount,
    write: ContractCall,
}

enum Abort {
    Invalid(FormError),
    Error(SdkError),
}

impl From<FormError> for Abort {
    fn from(err: FormError) -> Self {
        Abort::Invalid(err)
    }
}

impl From<SdkError> for Abort {
    fn from(err: SdkError) -> Self {
        Abort::Error(err)
    }
}

impl Abort {
    fn into_event(self) -> PipelineEvent {
        match self {
            Abort::Invalid(err) => PipelineEvent::ValidationFailed(err.to_string()),
            Abort::Error(err) => PipelineEvent::Failed(err.to_string()),
        }
    }
}

/// Clears the in-flight flag when a run ends or is dropped
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ==================== Driver ====================

/// Runs actions against a wallet, one at a time.
pub struct ActionPipeline {
    projector: Projector,
    wallet: Arc<dyn Wallet>,
    content: Arc<dyn ContentStore>,
    config: PoplarConfig,
    state_tx: watch::Sender<ActionState>,
    running: AtomicBool,
}

impl fmt::Debug for ActionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionPipeline")
            .field("state", &*self.state_tx.borrow())
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish()
    }
}

impl ActionPipeline {
    pub fn new(
        reader: Arc<dyn LedgerReader>,
        wallet: Arc<dyn Wallet>,
        content: Arc<dyn ContentStore>,
        config: PoplarConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(ActionState::Idle);
        Self {
            projector: Projector::new(reader, &config),
            wallet,
            content,
            config,
            state_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Every state this pipeline enters, latest first
    pub fn subscribe(&self) -> watch::Receiver<ActionState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> ActionState {
        self.state_tx.borrow().clone()
    }

    pub fn projector(&self) -> &Projector {
        &self.projector
    }

    /// Return a terminal pipeline to `Idle`.
    pub fn reset(&self) -> Result<(), PipelineError> {
        let _guard = RunGuard::acquire(&self.running).ok_or(PipelineError::Busy)?;
        self.advance(PipelineEvent::Reset)?;
        Ok(())
    }

    /// Walk `action` through the machine and return the terminal state.
    ///
    /// Ledger and content-store failures end in `Failed` and are returned
    /// as `Ok`. `Err` means the machine was not started.
    pub async fn run(&self, action: Action) -> Result<ActionState, PipelineError> {
        let _guard = RunGuard::acquire(&self.running).ok_or(PipelineError::Busy)?;
        let span = info_span!("action", run_id = %Uuid::new_v4(), action = action.name());
        self.drive(action).instrument(span).await
    }

    async fn drive(&self, action: Action) -> Result<ActionState, PipelineError> {
        if let Some(err) = self.closed_gate(&action).await? {
            debug!(reason = %err, "Action not available");
            return Err(PipelineError::Gated(err));
        }

        self.advance(PipelineEvent::Submit)?;

        let (plan, needs_approval) = match self.validate(action).await {
            Ok(validated) => validated,
            Err(abort) => return self.fail(abort.into_event()),
        };
        self.advance(PipelineEvent::ValidationPassed { needs_approval })?;

        if needs_approval {
            let approve = ContractCall::Approve {
                spender: self.config.ledger.registry_address,
                amount: plan.funding,
            };
            info!(amount = %plan.funding, "Requesting approval");
            if let Err(err) = self.wallet.send(approve).await {
                return self.fail(PipelineEvent::Failed(err.to_string()));
            }
            self.advance(PipelineEvent::ApprovalConfirmed)?;
        }

        let call = plan.write;
        info!(call = call.name(), from = %plan.account, "Sending write");
        match self.wallet.send(call).await {
            Ok(receipt) => {
                info!(tx_hash = %receipt.tx_hash, "Write confirmed");
                Ok(self.advance(PipelineEvent::Confirmed(receipt))?)
            }
            Err(err) => self.fail(PipelineEvent::Failed(err.to_string())),
        }
    }

    /// `Some` when the caller's view has this action disabled
    async fn closed_gate(&self, action: &Action) -> Result<Option<FormError>, SdkError> {
        let Some((id, gate)) = action.gate() else {
            return Ok(None);
        };
        // Unconnected callers get the wallet message from validation
        let Some(account) = self.wallet.account() else {
            return Ok(None);
        };
        let detail = self.projector.validation_detail(id, Some(account)).await?;
        Ok((!gate.is_open(&detail)).then(|| gate.closed()))
    }

    /// Form checks, precondition reads, metadata upload, then the allowance read.
    async fn validate(&self, action: Action) -> Result<(Plan, bool), Abort> {
        let account = self.wallet.account().ok_or(FormError::WalletNotConnected)?;

        let (funding, write) = match action {
            Action::SubmitProperty(form) => {
                form.validate()?;
                let location = form.location();
                if !self.projector.is_valid_location(&location).await? {
                    return Err(FormError::InvalidLocation.into());
                }
                if self.projector.is_registered(location.entity_id()).await? {
                    return Err(FormError::AlreadyRegistered.into());
                }
                let metadata = form.metadata().map_err(SdkError::from)?;
                let content_hash = self.content.upload(metadata).await?;
                info!(content_hash = %content_hash, "Uploaded property metadata");
                (
                    self.config.economics.minimum_stake,
                    ContractCall::SubmitProperty {
                        location,
                        content_hash,
                    },
                )
            }
            Action::RequestValidation(form) => {
                form.check_location_fields()?;
                let location = form.location();
                if !self.projector.is_valid_location(&location).await? {
                    return Err(FormError::InvalidLocation.into());
                }
                form.check_parcel()?;
                let property_id = location.entity_id();
                if !self.projector.is_registered(property_id).await? {
                    return Err(FormError::NotRegistered.into());
                }
                let fee = form.parse_fee()?;
                (fee, ContractCall::RequestValidation { property_id, fee })
            }
            Action::CastVote(vote) => {
                let stake = vote.parse_stake()?;
                (
                    stake,
                    ContractCall::CastValidationVote {
                        property_id: vote.property_id,
                        stake,
                        support: vote.support,
                    },
                )
            }
            Action::ConcludeValidation(property_id) => (
                TokenAmount::ZERO,
                ContractCall::ConcludeValidation { property_id },
            ),
            Action::ClaimRewards(property_id) => (
                TokenAmount::ZERO,
                ContractCall::ClaimRewards { property_id },
            ),
        };

        let needs_approval = if funding.is_zero() {
            false
        } else {
            let allowance = self.projector.allowance(account).await?;
            debug!(allowance = %allowance, required = %funding, "Checked allowance");
            allowance < funding
        };

        Ok((
            Plan {
                account,
                funding,
                write,
            },
            needs_approval,
        ))
    }

    fn advance(&self, event: PipelineEvent) -> Result<ActionState, TransitionError> {
        let next = self.state().apply(event)?;
        debug!(state = next.name(), "Action state changed");
        self.state_tx.send_replace(next.clone());
        Ok(next)
    }

    fn fail(&self, event: PipelineEvent) -> Result<ActionState, PipelineError> {
        let state = self.advance(event)?;
        if let Some(message) = state.error() {
            warn!(error = %message, "Action failed");
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MemoryContentStore;
    use crate::ledger::{JournalEntry, MockLedger};
    use crate::records::{RawStake, RawValidation};
    use std::time::Duration;

    fn alice() -> Address {
        "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".parse().unwrap()
    }

    fn bob() -> Address {
        "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359".parse().unwrap()
    }

    fn submission() -> PropertySubmission {
        PropertySubmission {
            country: "US".into(),
            state: "Alabama".into(),
            county: "Baldwin County".into(),
            parcel_number: "1234567890".into(),
            street_address: "123 Main Street".into(),
            city: "Fairhope".into(),
            zip_code: "36532".into(),
            legal_description: "Lot 1, Block 2 of Sunset Heights Addition".into(),
        }
    }

    fn baldwin_ledger() -> MockLedger {
        MockLedger::new()
            .with_account(alice())
            .with_valid_location("US", "Alabama", "Baldwin County")
    }

    fn pipeline(ledger: &Arc<MockLedger>, store: &Arc<MemoryContentStore>) -> ActionPipeline {
        ActionPipeline::new(
            ledger.clone(),
            ledger.clone(),
            store.clone(),
            PoplarConfig::default(),
        )
    }

    fn open_round(id: EntityId) -> RawValidation {
        RawValidation {
            property_id: id,
            start_time: 1_700_000_000,
            ..Default::default()
        }
    }

    #[test]
    fn test_transitions() {
        let state = ActionState::Idle
            .apply(PipelineEvent::Submit)
            .unwrap()
            .apply(PipelineEvent::ValidationPassed {
                needs_approval: true,
            })
            .unwrap();
        assert_eq!(state, ActionState::Approving);

        let state = state.apply(PipelineEvent::ApprovalConfirmed).unwrap();
        assert_eq!(state, ActionState::Submitting);

        let state = ActionState::Validating
            .apply(PipelineEvent::ValidationPassed {
                needs_approval: false,
            })
            .unwrap();
        assert_eq!(state, ActionState::Submitting);

        let failed = ActionState::Validating
            .apply(PipelineEvent::ValidationFailed("City is required".into()))
            .unwrap();
        assert_eq!(failed.error(), Some("City is required"));
        assert!(failed.is_terminal());
        assert_eq!(
            failed.apply(PipelineEvent::Submit).unwrap(),
            ActionState::Validating
        );
    }

    #[test]
    fn test_invalid_transitions() {
        let err = ActionState::Idle
            .apply(PipelineEvent::ApprovalConfirmed)
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid transition from idle on approval_confirmed");

        assert!(ActionState::Submitting.apply(PipelineEvent::Submit).is_err());
        assert!(ActionState::Approving.apply(PipelineEvent::Reset).is_err());
        assert!(ActionState::Validating
            .apply(PipelineEvent::ApprovalConfirmed)
            .is_err());
    }

    #[tokio::test]
    async fn test_submit_property_end_to_end() {
        let ledger = Arc::new(baldwin_ledger());
        let store = Arc::new(MemoryContentStore::new());
        let pipeline = pipeline(&ledger, &store);

        let state = pipeline
            .run(Action::SubmitProperty(submission()))
            .await
            .unwrap();
        assert!(matches!(state, ActionState::Succeeded(_)), "{state}");
        assert_eq!(pipeline.state(), state);

        assert_eq!(store.upload_count(), 1);
        let calls = ledger.calls().await;
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0],
            ContractCall::Approve {
                spender: PoplarConfig::default().ledger.registry_address,
                amount: TokenAmount::from_tokens(100),
            }
        );
        let ContractCall::SubmitProperty {
            location,
            content_hash,
        } = &calls[1]
        else {
            panic!("expected submitProperty, got {:?}", calls[1]);
        };
        assert_eq!(location, &submission().location());
        assert!(store.entries().await.contains_key(content_hash));

        assert_eq!(
            ledger.journal().await,
            vec![
                JournalEntry::Sent("approve"),
                JournalEntry::Confirmed("approve"),
                JournalEntry::Sent("submitProperty"),
                JournalEntry::Confirmed("submitProperty"),
            ]
        );
        assert!(ledger
            .is_property_registered(submission().property_id())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_sufficient_allowance_skips_approval() {
        let ledger =
            Arc::new(baldwin_ledger().with_allowance(alice(), TokenAmount::from_tokens(150)));
        let store = Arc::new(MemoryContentStore::new());
        let pipeline = pipeline(&ledger, &store);

        let state = pipeline
            .run(Action::SubmitProperty(submission()))
            .await
            .unwrap();
        assert!(matches!(state, ActionState::Succeeded(_)));
        assert_eq!(ledger.approval_count().await, 0);
    }

    #[tokio::test]
    async fn test_validation_failure_makes_no_writes() {
        let ledger = Arc::new(baldwin_ledger());
        let store = Arc::new(MemoryContentStore::new());
        let pipeline = pipeline(&ledger, &store);

        let mut form = submission();
        form.zip_code = "3653".into();
        let state = pipeline.run(Action::SubmitProperty(form)).await.unwrap();
        assert_eq!(
            state,
            ActionState::Failed("Valid ZIP code is required".into())
        );

        let mut form = submission();
        form.county = "Mobile County".into();
        let state = pipeline.run(Action::SubmitProperty(form)).await.unwrap();
        assert_eq!(
            state,
            ActionState::Failed("Invalid location combination".into())
        );

        assert!(ledger.calls().await.is_empty());
        assert_eq!(store.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_submission_rejected_before_write() {
        let location = submission().location();
        let ledger = Arc::new(
            baldwin_ledger().with_property(MockLedger::property_fixture(&location, bob(), 1)),
        );
        let store = Arc::new(MemoryContentStore::new());
        let pipeline = pipeline(&ledger, &store);

        let state = pipeline
            .run(Action::SubmitProperty(submission()))
            .await
            .unwrap();
        assert_eq!(state.error(), Some("Property already registered"));
        assert!(ledger.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_wallet_not_connected() {
        let ledger =
            Arc::new(MockLedger::new().with_valid_location("US", "Alabama", "Baldwin County"));
        let store = Arc::new(MemoryContentStore::new());
        let pipeline = pipeline(&ledger, &store);

        let state = pipeline
            .run(Action::SubmitProperty(submission()))
            .await
            .unwrap();
        assert_eq!(state.error(), Some("Please connect your wallet first"));
        assert_eq!(ledger.read_count(), 0);
    }

    #[tokio::test]
    async fn test_revert_surfaced_verbatim() {
        let ledger = Arc::new(
            baldwin_ledger()
                .with_allowance(alice(), TokenAmount::from_tokens(100))
                .with_revert("submitProperty", "Insufficient ROOT balance"),
        );
        let store = Arc::new(MemoryContentStore::new());
        let pipeline = pipeline(&ledger, &store);

        let state = pipeline
            .run(Action::SubmitProperty(submission()))
            .await
            .unwrap();
        assert_eq!(state, ActionState::Failed("Insufficient ROOT balance".into()));
    }

    #[tokio::test]
    async fn test_upload_failure_sends_no_approval() {
        let ledger = Arc::new(baldwin_ledger());
        let failing = Arc::new(MemoryContentStore::failing("Failed to upload to IPFS"));
        let pipeline = pipeline(&ledger, &failing);

        let state = pipeline
            .run(Action::SubmitProperty(submission()))
            .await
            .unwrap();
        assert_eq!(state.error(), Some("Failed to upload to IPFS"));
        assert_eq!(failing.upload_count(), 1);
        assert!(ledger.calls().await.is_empty());
        assert_eq!(ledger.allowance_of(alice()).await, TokenAmount::ZERO);

        // resubmission approves once and submits
        let store = Arc::new(MemoryContentStore::new());
        let retry = ActionPipeline::new(
            ledger.clone(),
            ledger.clone(),
            store.clone(),
            PoplarConfig::default(),
        );
        let state = retry.run(Action::SubmitProperty(submission())).await.unwrap();
        assert!(matches!(state, ActionState::Succeeded(_)));
        assert_eq!(ledger.approval_count().await, 1);
    }

    #[tokio::test]
    async fn test_request_validation() {
        let location = submission().location();
        let id = location.entity_id();
        let ledger = Arc::new(
            baldwin_ledger().with_property(MockLedger::property_fixture(&location, alice(), 1)),
        );
        let store = Arc::new(MemoryContentStore::new());
        let pipeline = pipeline(&ledger, &store);

        let mut request = ValidationRequest {
            country: "US".into(),
            region: "Alabama".into(),
            locality: "Baldwin County".into(),
            parcel_number: "0000".into(),
            fee: "25".into(),
        };
        let state = pipeline
            .run(Action::RequestValidation(request.clone()))
            .await
            .unwrap();
        assert_eq!(state.error(), Some("Property not found in registry"));

        request.parcel_number = "1234567890".into();
        let state = pipeline
            .run(Action::RequestValidation(request))
            .await
            .unwrap();
        assert!(matches!(state, ActionState::Succeeded(_)));

        assert_eq!(
            ledger.calls().await,
            vec![
                ContractCall::Approve {
                    spender: PoplarConfig::default().ledger.registry_address,
                    amount: TokenAmount::from_tokens(25),
                },
                ContractCall::RequestValidation {
                    property_id: id,
                    fee: TokenAmount::from_tokens(25),
                },
            ]
        );
        assert!(ledger.validation(id).await.unwrap().start_time != 0);
    }

    #[tokio::test]
    async fn test_vote_gate_after_staking() {
        let location = submission().location();
        let id = location.entity_id();
        let ledger = Arc::new(
            MockLedger::new()
                .with_account(bob())
                .with_property(MockLedger::property_fixture(&location, alice(), 1))
                .with_validation(open_round(id)),
        );
        let store = Arc::new(MemoryContentStore::new());
        let pipeline = pipeline(&ledger, &store);

        let state = pipeline
            .run(Action::CastVote(VoteRequest::new(id, "10", true)))
            .await
            .unwrap();
        assert!(matches!(state, ActionState::Succeeded(_)));
        assert_eq!(ledger.approval_count().await, 1);

        let err = pipeline
            .run(Action::CastVote(VoteRequest::new(id, "10", false)))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Gated(FormError::VotingUnavailable)));
        assert_eq!(err.to_string(), "Voting is not available for this property");
        // the gate never re-entered Validating
        assert!(matches!(pipeline.state(), ActionState::Succeeded(_)));
        assert_eq!(ledger.calls().await.len(), 2);
    }

    #[tokio::test]
    async fn test_vote_gate_on_concluded_round_with_stake() {
        let id = submission().property_id();
        let ledger = Arc::new(
            MockLedger::new()
                .with_account(bob())
                .with_validation(RawValidation {
                    concluded: true,
                    ..open_round(id)
                })
                .with_stake(
                    id,
                    bob(),
                    RawStake {
                        amount: TokenAmount::from_tokens(10).raw(),
                        support: true,
                        claimed: false,
                    },
                ),
        );
        let store = Arc::new(MemoryContentStore::new());
        let pipeline = pipeline(&ledger, &store);

        for action in [
            Action::CastVote(VoteRequest::new(id, "10", true)),
            Action::ConcludeValidation(id),
        ] {
            let err = pipeline.run(action).await.unwrap_err();
            assert!(matches!(err, PipelineError::Gated(_)));
        }
        assert_eq!(pipeline.state(), ActionState::Idle);

        let state = pipeline.run(Action::ClaimRewards(id)).await.unwrap();
        assert!(matches!(state, ActionState::Succeeded(_)));
        assert_eq!(ledger.approval_count().await, 0);
    }

    #[tokio::test]
    async fn test_gate_read_failure() {
        let ledger = Arc::new(
            MockLedger::new()
                .with_account(bob())
                .with_failing_reads("connection refused"),
        );
        let store = Arc::new(MemoryContentStore::new());
        let pipeline = pipeline(&ledger, &store);

        let run = pipeline.run(Action::ConcludeValidation(EntityId::ZERO)).await;
        let err = tokio_test::assert_err!(run);
        assert!(matches!(err, PipelineError::Unavailable(_)));
        assert_eq!(pipeline.state(), ActionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_is_rejected_while_in_flight() {
        let ledger = Arc::new(baldwin_ledger().with_confirmation_delay(Duration::from_secs(5)));
        let store = Arc::new(MemoryContentStore::new());
        let pipeline = pipeline(&ledger, &store);

        let (first, second) = tokio::join!(
            pipeline.run(Action::SubmitProperty(submission())),
            pipeline.run(Action::SubmitProperty(submission())),
        );
        assert!(matches!(first.unwrap(), ActionState::Succeeded(_)));
        assert!(matches!(second, Err(PipelineError::Busy)));
        assert_eq!(store.upload_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_states_are_published() {
        let ledger = Arc::new(baldwin_ledger().with_confirmation_delay(Duration::from_secs(5)));
        let store = Arc::new(MemoryContentStore::new());
        let pipeline = Arc::new(pipeline(&ledger, &store));

        let mut rx = pipeline.subscribe();
        let collector = tokio::spawn(async move {
            let mut seen = Vec::new();
            while rx.changed().await.is_ok() {
                let state = rx.borrow_and_update().clone();
                let done = state.is_terminal();
                seen.push(state);
                if done {
                    break;
                }
            }
            seen
        });

        let runner = pipeline.clone();
        let state =
            tokio::spawn(async move { runner.run(Action::SubmitProperty(submission())).await })
                .await
                .unwrap()
                .unwrap();

        let seen = collector.await.unwrap();
        let names: Vec<_> = seen.iter().map(ActionState::name).collect();
        let approving = names.iter().position(|n| *n == "approving").unwrap();
        let submitting = names.iter().position(|n| *n == "submitting").unwrap();
        assert!(approving < submitting);
        assert_eq!(seen.last(), Some(&state));

        pipeline.reset().unwrap();
        assert_eq!(pipeline.state(), ActionState::Idle);
    }
}
