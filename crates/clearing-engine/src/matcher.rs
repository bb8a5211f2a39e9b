//! Pairs compatible DvP buys/sells and PvP swap sides, recording the
//! pairing via the symmetric `matched_with` sidecar field on each record
//! (§4.1). Matching is idempotent and monotone: it only ever establishes new
//! pairings, never breaks existing ones (cancellation does that).
//!
//! The source's asset-transfer-chain traversal (`_calculateAssetChainObligations`)
//! is deliberately not reproduced here: §9's design notes call for computing
//! each matched pair once and treating it as an independent obligation,
//! which this module does by construction — a pair is recorded exactly once
//! as a symmetric `matched_with` link, with no notion of chaining multiple
//! sells of the same asset within a cycle.

use crate::events::Event;
use crate::registry::{DvPOrder, Registry, Side};
use clearing_types::{DvpOrderId, SwapId};

/// For each active unmatched sell, scan active buys with the same asset,
/// skipping already-matched peers, requiring `SellTerms[buy.payment_token]
/// == buy.price` and bilateral counterparty agreement. The first valid buy
/// (by id) wins. Returns one [`Event::DvPMatched`] per pairing established,
/// for the caller to run through [`crate::events::emit`].
pub fn match_dvp(registry: &mut Registry) -> Vec<Event> {
    let sell_ids: Vec<DvpOrderId> = registry
        .active_dvp_orders()
        .filter(|o| o.side == Side::Sell && !o.is_matched())
        .map(|o| o.id)
        .collect();

    let mut events = Vec::new();
    for sell_id in sell_ids {
        let Some(buy_id) = find_match_for_sell(registry, sell_id) else {
            continue;
        };
        registry.dvp_order_mut(sell_id).unwrap().matched_with = Some(buy_id);
        registry.dvp_order_mut(buy_id).unwrap().matched_with = Some(sell_id);
        events.push(Event::DvPMatched(sell_id, buy_id));
    }
    events
}

fn find_match_for_sell(registry: &Registry, sell_id: DvpOrderId) -> Option<DvpOrderId> {
    let sell = registry.dvp_order(sell_id)?;
    let mut candidates: Vec<&DvPOrder> = registry
        .active_dvp_orders()
        .filter(|buy| {
            buy.side == Side::Buy
                && !buy.is_matched()
                && buy.asset == sell.asset
                && sell.counterparty == buy.maker
                && buy.counterparty == sell.maker
                && sell
                    .sell_terms()
                    .price_for(buy.payment_token.expect("buy always has payment_token"))
                    == Some(buy.price)
        })
        .collect();
    candidates.sort_by_key(|o| o.id.0);
    candidates.first().map(|o| o.id)
}

/// Scan active unmatched swaps; for each, first-fit against any other active
/// unmatched swap with inverted amounts and tokens and a different maker.
/// Returns one [`Event::SwapMatched`] per pairing established.
pub fn match_swaps(registry: &mut Registry) -> Vec<Event> {
    let mut unmatched: Vec<SwapId> = registry
        .active_swaps()
        .filter(|s| !s.is_matched())
        .map(|s| s.id)
        .collect();
    unmatched.sort_by_key(|id| id.0);

    let mut events = Vec::new();
    for swap_id in unmatched.clone() {
        if registry.swap(swap_id).is_some_and(|s| s.is_matched()) {
            continue;
        }
        let Some(peer_id) = unmatched
            .iter()
            .copied()
            .filter(|&other| other != swap_id)
            .find(|&other| {
                let swap = registry.swap(swap_id).unwrap();
                let peer = registry.swap(other).unwrap();
                !peer.is_matched() && swap.inverts(peer)
            })
        else {
            continue;
        };
        registry.swap_mut(swap_id).unwrap().matched_with = Some(peer_id);
        registry.swap_mut(peer_id).unwrap().matched_with = Some(swap_id);
        events.push(Event::SwapMatched(swap_id, peer_id));
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use alloy_primitives::Address;
    use clearing_types::{Amount, AssetRef, Collection, Participant, TokenId};

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
    fn matches_sell_with_first_compatible_buy() {
        let mut reg = Registry::new();
        let u0 = user(1);
        let u1 = user(2);
        let sell = reg.submit_sell(u0, asset(), u1, Amount(100)).unwrap();
        let buy = reg
            .submit_buy(u1, asset(), token(9), Amount(100), u0)
            .unwrap();

        match_dvp(&mut reg);

        assert_eq!(reg.dvp_order(sell).unwrap().matched_with, Some(buy));
        assert_eq!(reg.dvp_order(buy).unwrap().matched_with, Some(sell));
    }

    #[test]
    fn requires_bilateral_counterparty_agreement() {
        let mut reg = Registry::new();
        let u0 = user(1);
        let u1 = user(2);
        let u2 = user(3);
        reg.submit_sell(u0, asset(), u1, Amount(100)).unwrap();
        // Buy names u0 as counterparty but is submitted by a third party,
        // so the sell's counterparty (u1) never agrees bilaterally.
        reg.submit_buy(u2, asset(), token(9), Amount(100), u0)
            .unwrap();

        match_dvp(&mut reg);

        assert!(reg.active_dvp_orders().all(|o| !o.is_matched()));
    }

    #[test]
    fn matches_inverted_swaps() {
        let mut reg = Registry::new();
        let u0 = user(1);
        let u1 = user(2);
        let a = reg
            .submit_swap(u0, token(1), Amount(5), token(2), Amount(6))
            .unwrap();
        let b = reg
            .submit_swap(u1, token(2), Amount(6), token(1), Amount(5))
            .unwrap();

        match_swaps(&mut reg);

        assert_eq!(reg.swap(a).unwrap().matched_with, Some(b));
        assert_eq!(reg.swap(b).unwrap().matched_with, Some(a));
    }

    #[test]
    fn matching_is_idempotent() {
        let mut reg = Registry::new();
        let u0 = user(1);
        let u1 = user(2);
        reg.submit_sell(u0, asset(), u1, Amount(100)).unwrap();
        reg.submit_buy(u1, asset(), token(9), Amount(100), u0)
            .unwrap();

        match_dvp(&mut reg);
        let before: Vec<_> = reg.active_dvp_orders().map(|o| o.matched_with).collect();
        match_dvp(&mut reg);
        let after: Vec<_> = reg.active_dvp_orders().map(|o| o.matched_with).collect();
        assert_eq!(before, after);
    }
}
