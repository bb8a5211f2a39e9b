//! Trait boundaries to collaborators that are out of scope for this crate:
//! the external ledger holding fungible balances, the non-fungible asset
//! custody primitives, and the clock. The engine only ever calls through
//! these traits; production wiring supplies real adapters, tests and the
//! demo CLI supply the in-memory ones in [`crate::testing`].
//!
//! Kept synchronous and allocation-light on purpose: the engine itself is a
//! single-threaded, non-reentrant state machine (see the crate-level
//! invariants in [`crate::engine`]), so there is no need for the `async`
//! infra ports the wider settlement stack this is grounded on would use for
//! a networked chain.

use clearing_types::{Address, Amount, Participant, Timestamp, TokenId};

/// Fungible value movement and inspection. Implementors must guarantee that
/// a successful `transfer_from` has atomically debited `owner` and credited
/// the engine's custody, and symmetrically for `transfer_to`.
pub trait Ledger {
    /// Move `amount` of `token` from `owner` into the engine's custody.
    fn transfer_from(
        &mut self,
        owner: Participant,
        amount: Amount,
        token: TokenId,
    ) -> Result<(), TransferError>;

    /// Move `amount` of `token` from the engine's custody to `recipient`.
    fn transfer_to(
        &mut self,
        recipient: Participant,
        amount: Amount,
        token: TokenId,
    ) -> Result<(), TransferError>;

    /// The participant's off-engine balance of `token`.
    fn balance_of(&self, owner: Participant, token: TokenId) -> Amount;

    /// The amount of `token` the participant has approved the engine to
    /// pull via `transfer_from`.
    fn allowance_of(&self, owner: Participant, token: TokenId) -> Amount;
}

/// Non-fungible asset custody: transfer in, transfer out, ownership query.
pub trait AssetCustody {
    fn asset_transfer(
        &mut self,
        from: Participant,
        to: Participant,
        asset: Address,
        token_id: u64,
    ) -> Result<(), TransferError>;

    fn owner_of(&self, asset: Address, token_id: u64) -> Option<Participant>;
}

/// A monotonic clock, injected so cycles are reproducible in tests.
pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// The external primitive failed. The engine treats this uniformly as
/// `TransferFailed` regardless of cause (insufficient balance, revoked
/// allowance, a primitive that times out and is made to fail fast per the
/// concurrency model) — the distinction does not change engine behavior.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("transfer failed")]
pub struct TransferError;
