//! Read-side projection of ledger state.
//!
//! `Projector` turns raw ledger tuples into typed records. It holds no cache:
//! every call is a fresh read, and staleness is bounded by how often the
//! caller polls (see [`crate::poll`]).

use futures::future::try_join_all;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::address::Address;
use crate::amount::TokenAmount;
use crate::config::PoplarConfig;
use crate::error::Result;
use crate::id::{EntityId, LocationKey};
use crate::ledger::LedgerReader;
use crate::poll::{PollHandle, Poller};
use crate::records::{PropertyRecord, PropertySummary, ValidationRecord, VoterStake};

/// Outcome of a polled read.
///
/// A failed fetch is `Unavailable`, never an empty `Ready`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState<T> {
    Loading,
    Ready(T),
    Unavailable(String),
}

impl<T> FetchState<T> {
    pub fn from_result<E: fmt::Display>(result: std::result::Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Ready(value),
            Err(err) => Self::Unavailable(err.to_string()),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Unavailable(message) => Some(message),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchState<U> {
        match self {
            Self::Loading => FetchState::Loading,
            Self::Ready(value) => FetchState::Ready(f(value)),
            Self::Unavailable(message) => FetchState::Unavailable(message),
        }
    }
}

/// Everything the validation detail view needs, plus its action gates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationDetail {
    /// `None` when the id is not registered
    pub property: Option<PropertyRecord>,
    pub validation: ValidationRecord,
    /// Caller's stake; `None` without a connected wallet
    pub stake: Option<VoterStake>,
}

impl ValidationDetail {
    fn connected(&self) -> bool {
        self.stake.is_some()
    }

    /// Connected, not yet staked, and the round is open
    pub fn can_vote(&self) -> bool {
        self.connected()
            && !self.stake.is_some_and(|s| s.has_stake())
            && self.validation.is_open()
    }

    /// Connected and the round is open
    pub fn can_conclude(&self) -> bool {
        self.connected() && self.validation.is_open()
    }

    /// Connected, the round is concluded, and the caller has not claimed
    pub fn can_claim(&self) -> bool {
        self.connected()
            && self.validation.concluded
            && !self.stake.is_some_and(|s| s.claimed)
    }
}

/// Typed reads over a [`LedgerReader`].
#[derive(Clone)]
pub struct Projector {
    reader: Arc<dyn LedgerReader>,
    spender: Address,
    validation_period_secs: u64,
}

impl fmt::Debug for Projector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projector")
            .field("spender", &self.spender)
            .field("validation_period_secs", &self.validation_period_secs)
            .finish()
    }
}

impl Projector {
    pub fn new(reader: Arc<dyn LedgerReader>, config: &PoplarConfig) -> Self {
        Self {
            reader,
            spender: config.ledger.registry_address,
            validation_period_secs: config.economics.validation_period_secs,
        }
    }

    pub fn reader(&self) -> &Arc<dyn LedgerReader> {
        &self.reader
    }

    /// The ledger's curated "needs validation" list
    pub async fn properties_needing_validation(&self) -> Result<Vec<PropertyRecord>> {
        let raw = self.reader.properties_needing_validation().await?;
        debug!(count = raw.len(), "Fetched properties needing validation");
        raw.into_iter().map(PropertyRecord::try_from).collect()
    }

    /// List-view rows for `/properties`
    pub async fn property_summaries(&self) -> Result<Vec<PropertySummary>> {
        Ok(self
            .properties_needing_validation()
            .await?
            .iter()
            .map(|p| p.summary(self.validation_period_secs))
            .collect())
    }

    /// Single property; `None` when the ledger has no such entry
    pub async fn property(&self, id: EntityId) -> Result<Option<PropertyRecord>> {
        let raw = self.reader.property(id).await?;
        if raw.id.is_zero() {
            return Ok(None);
        }
        if raw.id != id {
            warn!(requested = %id, returned = %raw.id, "Ledger returned a different property");
            return Ok(None);
        }
        Ok(Some(PropertyRecord::try_from(raw)?))
    }

    /// Several properties, each paired with the id it was requested under
    pub async fn properties(
        &self,
        ids: &[EntityId],
    ) -> Result<Vec<(EntityId, Option<PropertyRecord>)>> {
        let records = try_join_all(ids.iter().map(|id| self.property(*id))).await?;
        Ok(ids.iter().copied().zip(records).collect())
    }

    /// Property at a location, derived client-side
    pub async fn property_at(&self, location: &LocationKey) -> Result<Option<PropertyRecord>> {
        self.property(location.entity_id()).await
    }

    pub async fn validation(&self, id: EntityId) -> Result<ValidationRecord> {
        ValidationRecord::try_from(self.reader.validation(id).await?)
    }

    pub async fn voter_stake(&self, id: EntityId, voter: Address) -> Result<VoterStake> {
        Ok(self.reader.validation_stake(id, voter).await?.into())
    }

    /// Amount `owner` has authorised the registry to draw
    pub async fn allowance(&self, owner: Address) -> Result<TokenAmount> {
        Ok(self.reader.allowance(owner, self.spender).await?)
    }

    pub async fn balance(&self, owner: Address) -> Result<TokenAmount> {
        Ok(self.reader.balance_of(owner).await?)
    }

    pub async fn is_valid_location(&self, location: &LocationKey) -> Result<bool> {
        Ok(self
            .reader
            .is_valid_location(&location.country, &location.region, &location.locality)
            .await?)
    }

    pub async fn is_registered(&self, id: EntityId) -> Result<bool> {
        Ok(self.reader.is_property_registered(id).await?)
    }

    /// Property, validation round and caller stake, read concurrently
    pub async fn validation_detail(
        &self,
        id: EntityId,
        wallet: Option<Address>,
    ) -> Result<ValidationDetail> {
        let stake = async {
            match wallet {
                Some(voter) => self.voter_stake(id, voter).await.map(Some),
                None => Ok(None),
            }
        };
        let (property, validation, stake) =
            tokio::try_join!(self.property(id), self.validation(id), stake)?;

        Ok(ValidationDetail {
            property,
            validation,
            stake,
        })
    }

    // ==================== Polling ====================

    /// Poll the `/properties` list
    pub fn watch_summaries<F>(&self, poller: &Poller, observer: F) -> PollHandle
    where
        F: FnMut(FetchState<Vec<PropertySummary>>) + Send + 'static,
    {
        let projector = self.clone();
        poller.spawn(
            "property_summaries",
            move || {
                let projector = projector.clone();
                Box::pin(async move { projector.property_summaries().await })
            },
            observer,
        )
    }

    /// Poll one validation detail view
    pub fn watch_validation_detail<F>(
        &self,
        poller: &Poller,
        id: EntityId,
        wallet: Option<Address>,
        observer: F,
    ) -> PollHandle
    where
        F: FnMut(FetchState<ValidationDetail>) + Send + 'static,
    {
        let projector = self.clone();
        poller.spawn(
            "validation_detail",
            move || {
                let projector = projector.clone();
                Box::pin(async move { projector.validation_detail(id, wallet).await })
            },
            observer,
        )
    }

    /// Poll the caller's allowance
    pub fn watch_allowance<F>(&self, poller: &Poller, owner: Address, observer: F) -> PollHandle
    where
        F: FnMut(FetchState<TokenAmount>) + Send + 'static,
    {
        let projector = self.clone();
        poller.spawn(
            "allowance",
            move || {
                let projector = projector.clone();
                Box::pin(async move { projector.allowance(owner).await })
            },
            observer,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MockLedger;
    use crate::records::{RawStake, RawValidation};
    use crate::status::DisplayStatus;

    fn alice() -> Address {
        "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".parse().unwrap()
    }

    fn baldwin() -> LocationKey {
        LocationKey::new("US", "Alabama", "Baldwin County", "1234567890")
    }

    fn projector(ledger: MockLedger) -> Projector {
        Projector::new(Arc::new(ledger), &PoplarConfig::default())
    }

    fn open_round(id: EntityId) -> RawValidation {
        RawValidation {
            property_id: id,
            fee: TokenAmount::from_tokens(100).raw(),
            start_time: 1_700_000_000,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_summaries_collapse_status() {
        let texas = LocationKey::new("US", "Texas", "Travis County", "0001");
        let projector = projector(
            MockLedger::new()
                .with_property(MockLedger::property_fixture(&baldwin(), alice(), 0))
                .with_property(MockLedger::property_fixture(&texas, alice(), 1)),
        );

        let summaries = projector.property_summaries().await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| s.status == DisplayStatus::Pending));
        for summary in &summaries {
            assert_eq!(
                summary.lock_period_end.timestamp() - summary.submission_date.timestamp(),
                172_800
            );
        }
    }

    #[tokio::test]
    async fn test_empty_list_is_not_an_error() {
        let projector = projector(MockLedger::new());
        assert!(projector.properties_needing_validation().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_unavailable() {
        let projector = projector(MockLedger::new().with_failing_reads("connection refused"));
        let state = FetchState::from_result(projector.property_summaries().await);
        assert_eq!(state.error(), Some("connection refused"));
        assert!(state.ready().is_none());
    }

    #[tokio::test]
    async fn test_properties_correlate_ids() {
        let known = baldwin().entity_id();
        let unknown = baldwin().with_parcel("missing").entity_id();
        let projector = projector(
            MockLedger::new().with_property(MockLedger::property_fixture(&baldwin(), alice(), 1)),
        );

        let results = projector.properties(&[unknown, known]).await.unwrap();
        assert_eq!(results[0].0, unknown);
        assert!(results[0].1.is_none());
        assert_eq!(results[1].0, known);
        assert_eq!(results[1].1.as_ref().map(|p| p.id), Some(known));
    }

    #[tokio::test]
    async fn test_vote_gate_closed_after_staking() {
        let id = baldwin().entity_id();
        let projector = projector(
            MockLedger::new()
                .with_property(MockLedger::property_fixture(&baldwin(), alice(), 1))
                .with_validation(open_round(id))
                .with_stake(
                    id,
                    alice(),
                    RawStake {
                        amount: TokenAmount::from_tokens(100).raw(),
                        support: true,
                        claimed: false,
                    },
                ),
        );

        let detail = projector.validation_detail(id, Some(alice())).await.unwrap();
        assert!(!detail.can_vote());
        assert!(detail.can_conclude());
        assert!(!detail.can_claim());
    }

    #[tokio::test]
    async fn test_gates_without_wallet() {
        let id = baldwin().entity_id();
        let projector = projector(MockLedger::new().with_validation(open_round(id)));

        let detail = projector.validation_detail(id, None).await.unwrap();
        assert!(detail.property.is_none());
        assert!(!detail.can_vote());
        assert!(!detail.can_conclude());
        assert!(!detail.can_claim());
    }

    #[tokio::test]
    async fn test_gates_without_round() {
        let id = baldwin().entity_id();
        let projector = projector(MockLedger::new());

        let detail = projector.validation_detail(id, Some(alice())).await.unwrap();
        assert!(!detail.validation.exists());
        assert!(!detail.can_vote());
        assert!(!detail.can_conclude());
    }

    #[tokio::test]
    async fn test_claim_gate_after_conclusion() {
        let id = baldwin().entity_id();
        let mut round = open_round(id);
        round.concluded = true;
        let projector = projector(
            MockLedger::new().with_validation(round).with_stake(
                id,
                alice(),
                RawStake {
                    amount: 1,
                    support: false,
                    claimed: false,
                },
            ),
        );

        let detail = projector.validation_detail(id, Some(alice())).await.unwrap();
        assert!(detail.can_claim());
        assert!(!detail.can_vote());
        assert!(!detail.can_conclude());
    }
}
