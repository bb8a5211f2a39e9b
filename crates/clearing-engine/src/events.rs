//! Settlement event contracts (§6). These are not wire types; they exist so
//! a host application can subscribe to `perform_settlement` outcomes without
//! re-deriving them from `tracing` spans. Every variant is constructed at
//! the point in the phase pipeline the contract names and routed through
//! [`emit`], which is the only place these get turned into `tracing`
//! records — there is no separate ad hoc breadcrumb for the same event.

use clearing_types::{Amount, DvpOrderId, PaymentId, Participant, SwapId, Timestamp, TokenId};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    OrderPlaced(DvpOrderId),
    DvPMatched(DvpOrderId, DvpOrderId),
    SwapMatched(SwapId, SwapId),
    PaymentAccepted(PaymentId),
    AssetLocked(DvpOrderId),
    AssetUnlocked(DvpOrderId),
    StakeCollected(Participant, Amount),
    StakeCollectionFailed(Participant),
    StakeDistributed(Participant, Amount),
    CrossTokenNetted {
        participant: Participant,
        token: TokenId,
        amount: Amount,
    },
    PaymentSettled(PaymentId),
    SwapSettled(SwapId, SwapId),
    SettlementFailed(FailureReason),
    SettlementCompleted(Timestamp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error("too few re-net attempts remained to isolate every defaulter")]
    ReNetExhausted,
    #[error("non-fungible asset lock failed")]
    AssetLockFailure,
}

/// Emit `event` as a structured `tracing` record. Called once per event at
/// the point in the phase pipeline where the contract says it occurs;
/// callers that want the full list for a cycle collect the return value of
/// [`crate::engine::Engine::perform_settlement`] instead of parsing logs.
pub fn emit(event: &Event) {
    match event {
        Event::OrderPlaced(id) => info!(?id, "OrderPlaced"),
        Event::DvPMatched(sell, buy) => info!(?sell, ?buy, "DvPMatched"),
        Event::SwapMatched(a, b) => info!(?a, ?b, "SwapMatched"),
        Event::PaymentAccepted(id) => info!(?id, "PaymentAccepted"),
        Event::AssetLocked(id) => info!(?id, "AssetLocked"),
        Event::AssetUnlocked(id) => info!(?id, "AssetUnlocked"),
        Event::StakeCollected(p, amount) => info!(?p, ?amount, "StakeCollected"),
        Event::StakeCollectionFailed(p) => info!(?p, "StakeCollectionFailed"),
        Event::StakeDistributed(p, amount) => info!(?p, ?amount, "StakeDistributed"),
        Event::CrossTokenNetted {
            participant,
            token,
            amount,
        } => info!(?participant, ?token, ?amount, "CrossTokenNetted"),
        Event::PaymentSettled(id) => info!(?id, "PaymentSettled"),
        Event::SwapSettled(a, b) => info!(?a, ?b, "SwapSettled"),
        Event::SettlementFailed(reason) => info!(%reason, "SettlementFailed"),
        Event::SettlementCompleted(now) => info!(?now, "SettlementCompleted"),
    }
}
