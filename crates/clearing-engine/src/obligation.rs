//! Walks matched pairs to produce per-participant per-token signed balances
//! (§4.2). A record whose either counterparty is not eligible is skipped:
//! it does not change state, it simply remains active for a future cycle.

use crate::registry::{Registry, Side};
use clearing_types::{Amount, Participant, SignedAmount, TokenId};
use std::collections::{HashMap, HashSet};

/// `(participant, token) -> signed balance`, plus the token set touched.
#[derive(Debug, Default)]
pub struct NetBalanceTable {
    balances: HashMap<(Participant, TokenId), SignedAmount>,
    involved_tokens: HashSet<TokenId>,
}

impl NetBalanceTable {
    pub fn balance(&self, participant: Participant, token: TokenId) -> SignedAmount {
        self.balances
            .get(&(participant, token))
            .copied()
            .unwrap_or(SignedAmount::ZERO)
    }

    pub fn involved_tokens(&self) -> &HashSet<TokenId> {
        &self.involved_tokens
    }

    /// All `(participant, token)` pairs with a nonzero balance.
    pub fn entries(&self) -> impl Iterator<Item = (Participant, TokenId, SignedAmount)> + '_ {
        self.balances
            .iter()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(&(p, t), &amount)| (p, t, amount))
    }

    fn add(&mut self, participant: Participant, token: TokenId, delta: SignedAmount) {
        self.involved_tokens.insert(token);
        let entry = self
            .balances
            .entry((participant, token))
            .or_insert(SignedAmount::ZERO);
        *entry = entry.checked_add(delta).expect("balance overflow: invariant violation");
    }
}

/// Per-participant outflow before netting, in unit-equivalent terms across
/// tokens (§4.4 Phase P1). Computed over every matched/eligible-for-cycle
/// record regardless of participant eligibility, since eligibility is what
/// stake sizing determines in the first place.
pub fn gross_outgoing(registry: &Registry) -> HashMap<Participant, Amount> {
    let mut out: HashMap<Participant, Amount> = HashMap::new();
    let mut bump = |p: Participant, amount: Amount| {
        let entry = out.entry(p).or_insert(Amount::ZERO);
        *entry = entry
            .checked_add(amount)
            .expect("gross outgoing overflow: invariant violation");
    };

    for order in matched_dvp_buyers(registry) {
        bump(order.maker, order.price);
    }
    for payment in registry.eligible_payments() {
        bump(payment.sender, payment.amount);
    }
    for swap in primary_matched_swaps(registry) {
        bump(swap.maker, swap.send_amount);
        let peer = registry.swap(swap.matched_with.unwrap()).expect("peer exists");
        bump(peer.maker, peer.send_amount);
    }
    out
}

/// The set of participants touched by at least one matched/eligible record
/// this cycle (§4.4 `CycleParticipants`).
pub fn cycle_participants(registry: &Registry) -> HashSet<Participant> {
    let mut set = HashSet::new();
    for order in matched_dvp_buyers(registry) {
        set.insert(order.maker);
        let sell = registry
            .dvp_order(order.matched_with.unwrap())
            .expect("peer exists");
        set.insert(sell.maker);
    }
    for payment in registry.eligible_payments() {
        set.insert(payment.sender);
        set.insert(payment.recipient);
    }
    for swap in primary_matched_swaps(registry) {
        set.insert(swap.maker);
        let peer = registry.swap(swap.matched_with.unwrap()).expect("peer exists");
        set.insert(peer.maker);
    }
    set
}

/// Builds the net balance table over the eligible population (§4.2, §4.4
/// Phase P3). Records touching an ineligible participant are skipped.
pub fn build(registry: &Registry, eligible: &HashSet<Participant>) -> NetBalanceTable {
    let mut table = NetBalanceTable::default();

    for buy in matched_dvp_buyers(registry) {
        let sell = registry
            .dvp_order(buy.matched_with.unwrap())
            .expect("peer exists");
        if !eligible.contains(&buy.maker) || !eligible.contains(&sell.maker) {
            continue;
        }
        let token = buy.payment_token.expect("buy always has payment_token");
        table.add(buy.maker, token, -SignedAmount::from(buy.price));
        table.add(sell.maker, token, SignedAmount::from(buy.price));
    }

    for payment in registry.eligible_payments() {
        if !eligible.contains(&payment.sender) || !eligible.contains(&payment.recipient) {
            continue;
        }
        table.add(payment.sender, payment.token, -SignedAmount::from(payment.amount));
        table.add(payment.recipient, payment.token, SignedAmount::from(payment.amount));
    }

    for swap in primary_matched_swaps(registry) {
        let peer = registry.swap(swap.matched_with.unwrap()).expect("peer exists");
        if !eligible.contains(&swap.maker) || !eligible.contains(&peer.maker) {
            continue;
        }
        table.add(swap.maker, swap.send_token, -SignedAmount::from(swap.send_amount));
        table.add(swap.maker, peer.send_token, SignedAmount::from(peer.send_amount));
        table.add(peer.maker, peer.send_token, -SignedAmount::from(peer.send_amount));
        table.add(peer.maker, swap.send_token, SignedAmount::from(swap.send_amount));
    }

    table
}

fn matched_dvp_buyers(registry: &Registry) -> impl Iterator<Item = &crate::registry::DvPOrder> {
    registry
        .active_dvp_orders()
        .filter(|o| o.side == Side::Buy && o.is_matched())
}

/// Matched swaps, yielded once per pair (when visiting the peer with the
/// lower id), per §4.2's "process exactly once" rule.
fn primary_matched_swaps(registry: &Registry) -> impl Iterator<Item = &crate::registry::SwapOrder> {
    registry
        .active_swaps()
        .filter(|s| s.is_matched() && s.id.0 < s.matched_with.unwrap().0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher;
    use alloy_primitives::Address;
    use clearing_types::{AssetRef, Collection, Participant, TokenId};

    fn user(byte: u8) -> Participant {
        Participant(Address::repeat_byte(byte))
    }

    fn token(byte: u8) -> TokenId {
        TokenId(Address::repeat_byte(byte))
    }

    fn asset() -> AssetRef {
        AssetRef {
            collection: Collection(Address::repeat_byte(0xaa)),
            token_id: 0,
        }
    }

    #[test]
    fn dvp_pair_nets_to_zero_across_participants() {
        let mut reg = Registry::default();
        let u0 = user(1);
        let u1 = user(2);
        reg.submit_sell(u0, asset(), u1, Amount(100)).unwrap();
        reg.submit_buy(u1, asset(), token(9), Amount(100), u0)
            .unwrap();
        matcher::match_dvp(&mut reg);

        let eligible = [u0, u1].into_iter().collect();
        let table = build(&reg, &eligible);
        assert_eq!(table.balance(u0, token(9)), SignedAmount(100));
        assert_eq!(table.balance(u1, token(9)), SignedAmount(-100));
    }

    #[test]
    fn ineligible_counterparty_skips_the_record() {
        let mut reg = Registry::default();
        let u0 = user(1);
        let u1 = user(2);
        reg.submit_sell(u0, asset(), u1, Amount(100)).unwrap();
        reg.submit_buy(u1, asset(), token(9), Amount(100), u0)
            .unwrap();
        matcher::match_dvp(&mut reg);

        let eligible = [u0].into_iter().collect();
        let table = build(&reg, &eligible);
        assert_eq!(table.balance(u0, token(9)), SignedAmount::ZERO);
        assert_eq!(table.balance(u1, token(9)), SignedAmount::ZERO);
    }

    #[test]
    fn swap_pair_processed_once_nets_to_zero() {
        let mut reg = Registry::default();
        let u0 = user(1);
        let u1 = user(2);
        reg.submit_swap(u0, token(1), Amount(5), token(2), Amount(6))
            .unwrap();
        reg.submit_swap(u1, token(2), Amount(6), token(1), Amount(5))
            .unwrap();
        matcher::match_swaps(&mut reg);

        let eligible = [u0, u1].into_iter().collect();
        let table = build(&reg, &eligible);
        assert_eq!(table.balance(u0, token(1)), SignedAmount(-5));
        assert_eq!(table.balance(u0, token(2)), SignedAmount(6));
        assert_eq!(table.balance(u1, token(2)), SignedAmount(-6));
        assert_eq!(table.balance(u1, token(1)), SignedAmount(5));
    }
}
