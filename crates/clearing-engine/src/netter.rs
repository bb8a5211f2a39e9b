//! Collapses per-token balances into a single signed aggregate per
//! participant (§4.3). Every token touched this cycle is treated as
//! unit-equivalent: this is what makes cross-token netting sound, and is
//! the reason a participant's surplus can be paid out in any accepted
//! token and a deficit drawn from any token they hold.

use crate::obligation::NetBalanceTable;
use clearing_types::{Participant, SignedAmount};
use std::collections::HashMap;

pub fn aggregate(table: &NetBalanceTable) -> HashMap<Participant, SignedAmount> {
    let mut aggregates: HashMap<Participant, SignedAmount> = HashMap::new();
    for (participant, _token, amount) in table.entries() {
        let entry = aggregates.entry(participant).or_insert(SignedAmount::ZERO);
        *entry = entry
            .checked_add(amount)
            .expect("aggregate overflow: invariant violation");
    }
    aggregates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{matcher, obligation, registry::Registry};
    use alloy_primitives::Address;
    use clearing_types::{Amount, Participant, TokenId};

    fn user(byte: u8) -> Participant {
        Participant(Address::repeat_byte(byte))
    }

    fn token(byte: u8) -> TokenId {
        TokenId(Address::repeat_byte(byte))
    }

    #[test]
    fn aggregate_zero_sum_across_multiple_tokens() {
        // U0 pays U1 10 (T1); matched swap U0<->U2 exchanging 5 T1 <-> 6 T2.
        let mut reg = Registry::default();
        let u0 = user(1);
        let u1 = user(2);
        let u2 = user(3);
        reg.create_payment(u0, u1, Amount(10), token(1)).unwrap();
        reg.payment_mut(clearing_types::PaymentId(0))
            .unwrap()
            .fulfilled = true;
        reg.submit_swap(u0, token(1), Amount(5), token(2), Amount(6))
            .unwrap();
        reg.submit_swap(u2, token(2), Amount(6), token(1), Amount(5))
            .unwrap();
        matcher::match_swaps(&mut reg);

        let eligible = [u0, u1, u2].into_iter().collect();
        let table = obligation::build(&reg, &eligible);
        let agg = aggregate(&table);

        let total: i128 = agg.values().map(|a| a.0).sum();
        assert_eq!(total, 0);
        assert_eq!(agg[&u0], SignedAmount(-10 - 5 + 6));
        assert_eq!(agg[&u1], SignedAmount(10));
        assert_eq!(agg[&u2], SignedAmount(5 - 6));
    }
}
