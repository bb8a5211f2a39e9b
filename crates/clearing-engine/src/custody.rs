//! Scoped value and asset custody: collection, refund, distribution, and
//! payout ordering (§4.5). Everything that moves value or assets through
//! the engine goes through a [`Custodian`], which is the only component
//! that is allowed to call the [`crate::ports::Ledger`]/
//! [`crate::ports::AssetCustody`] ports.

use crate::ports::{AssetCustody, Ledger, TransferError};
use clearing_types::{Amount, Participant, TokenId};
use std::collections::HashMap;
use tracing::debug;

/// Cycle-scoped record of what has been pulled from participants this
/// cycle, split into the stake bucket (drawn in Phase P2, consumed first in
/// Phase P5 before anything else is drawn) and the "extra" bucket (drawn
/// directly in Phase P5 once stake is exhausted). Both buckets back the
/// same custodied `pool`.
#[derive(Debug, Default, Clone)]
pub struct CustodyLedger {
    stake: HashMap<Participant, Vec<(TokenId, Amount)>>,
    extra: HashMap<Participant, Vec<(TokenId, Amount)>>,
    pool: HashMap<TokenId, Amount>,
}

impl CustodyLedger {
    pub fn pool_of(&self, token: TokenId) -> Amount {
        self.pool.get(&token).copied().unwrap_or(Amount::ZERO)
    }

    pub fn stake_entries(&self, participant: Participant) -> &[(TokenId, Amount)] {
        self.stake.get(&participant).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn stake_participants(&self) -> impl Iterator<Item = Participant> + '_ {
        self.stake.keys().copied()
    }

    pub fn extra_participants(&self) -> impl Iterator<Item = Participant> + '_ {
        self.extra.keys().copied()
    }

    /// Pulls the stake bucket out as an attempt-independent snapshot, for
    /// the re-net controller to clone back in at the start of every P3-P5
    /// attempt. Pool totals are left untouched: the custodied value never
    /// physically moves between attempts, only the bookkeeping of whose
    /// stake remains refundable does.
    pub fn take_stake(&mut self) -> HashMap<Participant, Vec<(TokenId, Amount)>> {
        std::mem::take(&mut self.stake)
    }

    pub fn set_stake(&mut self, stake: HashMap<Participant, Vec<(TokenId, Amount)>>) {
        self.stake = stake;
    }

    /// Removes `amount` of `token` from the pool without a ledger call —
    /// used when a defaulter's stake is forfeited out of the cycle's
    /// distributable pool and into the indemnity reserve, where the value
    /// stays in engine custody but under different bookkeeping.
    pub fn remove_from_pool(&mut self, token: TokenId, amount: Amount) {
        bump_sub(&mut self.pool, token, amount);
    }
}

pub struct Custodian<'a, L, A> {
    ledger: &'a mut L,
    assets: &'a mut A,
    pub custody_account: Participant,
}

impl<'a, L: Ledger, A: AssetCustody> Custodian<'a, L, A> {
    pub fn new(ledger: &'a mut L, assets: &'a mut A, custody_account: Participant) -> Self {
        Self {
            ledger,
            assets,
            custody_account,
        }
    }

    pub fn balance_of(&self, owner: Participant, token: TokenId) -> Amount {
        self.ledger.balance_of(owner, token)
    }

    pub fn allowance_of(&self, owner: Participant, token: TokenId) -> Amount {
        self.ledger.allowance_of(owner, token)
    }

    /// Phase P2: draw `amount` of `token` from `participant` into the stake
    /// bucket.
    pub fn collect_stake(
        &mut self,
        custody: &mut CustodyLedger,
        participant: Participant,
        token: TokenId,
        amount: Amount,
    ) -> Result<(), TransferError> {
        self.ledger.transfer_from(participant, amount, token)?;
        custody
            .stake
            .entry(participant)
            .or_default()
            .push((token, amount));
        bump(&mut custody.pool, token, amount);
        debug!(?participant, ?token, ?amount, "StakeCollected");
        Ok(())
    }

    /// Phase P5 step 2: draw `amount` of `token` from `participant` beyond
    /// their stake, once the stake bucket has been exhausted against their
    /// obligation.
    pub fn collect_extra(
        &mut self,
        custody: &mut CustodyLedger,
        participant: Participant,
        token: TokenId,
        amount: Amount,
    ) -> Result<(), TransferError> {
        self.ledger.transfer_from(participant, amount, token)?;
        custody
            .extra
            .entry(participant)
            .or_default()
            .push((token, amount));
        bump(&mut custody.pool, token, amount);
        Ok(())
    }

    /// Consume up to `need` from `participant`'s stake bucket, in collected
    /// order, without touching the external ledger (the value is already in
    /// the engine's custody). Returns the amount actually consumed.
    pub fn consume_stake(
        &mut self,
        custody: &mut CustodyLedger,
        participant: Participant,
        need: Amount,
    ) -> Amount {
        let Some(entries) = custody.stake.get_mut(&participant) else {
            return Amount::ZERO;
        };
        let mut remaining = need;
        let mut consumed = Amount::ZERO;
        for (_token, amount) in entries.iter_mut() {
            if remaining.is_zero() {
                break;
            }
            let take = amount.min(remaining);
            *amount = amount.saturating_sub(take);
            remaining = remaining.saturating_sub(take);
            consumed = consumed.checked_add(take).expect("consumed overflow");
        }
        entries.retain(|(_, amount)| !amount.is_zero());
        consumed
    }

    /// Refund every entry in both buckets for `participant` back to them
    /// and zero the entries, per §4.5's refund contract.
    pub fn refund_all(&mut self, custody: &mut CustodyLedger, participant: Participant) {
        for bucket in [&mut custody.stake, &mut custody.extra] {
            if let Some(entries) = bucket.remove(&participant) {
                for (token, amount) in entries {
                    if amount.is_zero() {
                        continue;
                    }
                    self.ledger
                        .transfer_to(participant, amount, token)
                        .expect("refund transfer is expected to always succeed: invariant violation");
                    bump_sub(&mut custody.pool, token, amount);
                }
            }
        }
    }

    /// Refund only unused stake (whatever is left after Phase P5 step 1
    /// consumed what it needed), leaving any "extra" draw in place because
    /// it is needed to satisfy positive aggregates at Phase P7.
    pub fn refund_unused_stake(&mut self, custody: &mut CustodyLedger, participant: Participant) {
        if let Some(entries) = custody.stake.remove(&participant) {
            for (token, amount) in entries {
                if amount.is_zero() {
                    continue;
                }
                self.ledger
                    .transfer_to(participant, amount, token)
                    .expect("refund transfer is expected to always succeed: invariant violation");
                bump_sub(&mut custody.pool, token, amount);
            }
        }
    }

    /// Refund only the "extra" bucket (value drawn beyond stake in Phase
    /// P5 step 2), leaving stake untouched. Used to unwind a failed re-net
    /// attempt's draws before the controller retries from Phase P3.
    pub fn refund_extra(&mut self, custody: &mut CustodyLedger, participant: Participant) {
        if let Some(entries) = custody.extra.remove(&participant) {
            for (token, amount) in entries {
                if amount.is_zero() {
                    continue;
                }
                self.ledger
                    .transfer_to(participant, amount, token)
                    .expect("refund transfer is expected to always succeed: invariant violation");
                bump_sub(&mut custody.pool, token, amount);
            }
        }
    }

    /// Pay `amount` of `token` directly out of engine custody, bypassing
    /// the pool bookkeeping — used for indemnity payouts sourced from
    /// forfeited stake, whether a defaulter was excluded from a cycle that
    /// went on to succeed or the whole cycle aborted at Phase P9.
    pub fn pay_out(&mut self, participant: Participant, token: TokenId, amount: Amount) {
        if amount.is_zero() {
            return;
        }
        self.ledger
            .transfer_to(participant, amount, token)
            .expect("indemnity payout is expected to always succeed: invariant violation");
    }

    /// Phase P7: pay `amount` of `token` out of the pool to `participant`.
    /// Never exceeds the pool total (checked before transferring). The
    /// caller is responsible for recording the resulting
    /// [`crate::events::Event::CrossTokenNetted`] — it owns the cycle's
    /// event sink, this type doesn't.
    pub fn distribute(
        &mut self,
        custody: &mut CustodyLedger,
        participant: Participant,
        token: TokenId,
        amount: Amount,
    ) {
        assert!(
            custody.pool_of(token) >= amount,
            "distribution would exceed pool total: invariant violation"
        );
        self.ledger
            .transfer_to(participant, amount, token)
            .expect("distribution transfer is expected to always succeed: invariant violation");
        bump_sub(&mut custody.pool, token, amount);
    }

    /// Phase P6: pull the non-fungible asset into engine custody.
    pub fn lock_asset(
        &mut self,
        seller: Participant,
        collection: clearing_types::Collection,
        token_id: u64,
    ) -> Result<(), TransferError> {
        self.assets
            .asset_transfer(seller, self.custody_account, collection.0, token_id)
    }

    /// Reverses [`Self::lock_asset`] on abort.
    pub fn unlock_asset(
        &mut self,
        seller: Participant,
        collection: clearing_types::Collection,
        token_id: u64,
    ) {
        self.assets
            .asset_transfer(self.custody_account, seller, collection.0, token_id)
            .expect("asset unlock is expected to always succeed: invariant violation");
    }

    /// Phase P8: hand the custodied asset to the settled buyer.
    pub fn deliver_asset(
        &mut self,
        buyer: Participant,
        collection: clearing_types::Collection,
        token_id: u64,
    ) {
        self.assets
            .asset_transfer(self.custody_account, buyer, collection.0, token_id)
            .expect("asset delivery is expected to always succeed: invariant violation");
    }
}

fn bump(map: &mut HashMap<TokenId, Amount>, token: TokenId, amount: Amount) {
    let entry = map.entry(token).or_insert(Amount::ZERO);
    *entry = entry.checked_add(amount).expect("pool overflow: invariant violation");
}

fn bump_sub(map: &mut HashMap<TokenId, Amount>, token: TokenId, amount: Amount) {
    let entry = map.entry(token).or_insert(Amount::ZERO);
    *entry = entry
        .checked_sub(amount)
        .expect("pool underflow: invariant violation");
}

/// Pro-rata redistribution of a stake pool across `eligible`, weighted by
/// each participant's `gross_outgoing`, with floor division; undistributed
/// residue is returned so the caller can retain it (Phase P9's indemnity
/// redistribution keeps residue in the engine's reserve rather than losing
/// it, per the design notes' "residue-to-treasury" choice).
pub fn prorate(
    total: Amount,
    participant_weight: Amount,
    weight_sum: Amount,
) -> Amount {
    if weight_sum.is_zero() {
        return Amount::ZERO;
    }
    Amount((total.0 * participant_weight.0) / weight_sum.0)
}
