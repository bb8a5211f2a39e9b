//! End-to-end settlement scenarios driven entirely through [`Engine`]'s
//! public surface and the in-memory test adapters, one per testable
//! property worth exercising as a full cycle rather than a unit.

use alloy_primitives::Address;
use clearing_engine::config::EngineConfig;
use clearing_engine::engine::{Engine, Error};
use clearing_engine::testing::{InMemoryAssets, InMemoryClock, InMemoryLedger};
use clearing_types::{Amount, AssetRef, Bps, Collection, Participant, Timestamp, TokenId};

fn user(byte: u8) -> Participant {
    Participant(Address::repeat_byte(byte))
}

fn token(byte: u8) -> TokenId {
    TokenId(Address::repeat_byte(byte))
}

fn asset(byte: u8) -> AssetRef {
    AssetRef {
        collection: Collection(Address::repeat_byte(byte)),
        token_id: 0,
    }
}

fn custody_account() -> Participant {
    user(0xff)
}

fn zero_stake_config() -> EngineConfig {
    EngineConfig {
        stake_bps: Bps(0),
        ..EngineConfig::default()
    }
}

/// S1 — single DvP, happy path: asset moves to the buyer, payment token
/// moves to the seller, both orders settle, nothing else is touched.
#[test]
fn single_dvp_happy_path() {
    let u0 = user(1);
    let u1 = user(2);
    let t1 = token(1);
    let a = asset(0xaa);

    let mut ledger = InMemoryLedger::default();
    ledger.set_balance(u1, t1, Amount(100));
    ledger.set_allowance(u1, t1, Amount(100));

    let mut assets = InMemoryAssets::default();
    assets.set_owner(a, u0);

    let clock = InMemoryClock::new(Timestamp(0));
    let mut engine = Engine::new(ledger, assets, clock, custody_account(), zero_stake_config());

    engine.configure_accepted(u0, vec![t1], t1).unwrap();
    engine.configure_accepted(u1, vec![t1], t1).unwrap();

    let sell = engine.submit_sell(u0, a, u1, Amount(100)).unwrap();
    let buy = engine.submit_buy(u1, a, t1, Amount(100), u0).unwrap();
    engine.match_dvp();

    engine.clock().advance(301);
    let outcome = engine.perform_settlement().unwrap();

    assert!(outcome.succeeded);
    assert_eq!(engine.ledger().balance_of(u0, t1), Amount(100));
    assert_eq!(engine.ledger().balance_of(u1, t1), Amount(0));
    assert_eq!(engine.assets().owner_of(a.collection.0, 0), Some(u1));
    assert!(!engine.dvp_order(sell).unwrap().active);
    assert!(!engine.dvp_order(buy).unwrap().active);
}

/// S2 — a DvP pair whose buyer can never fund the trade expires after
/// `max_failed_cycles` unsettled attempts, without ever locking the asset.
#[test]
fn unfundable_dvp_expires_after_max_failed_cycles() {
    let u0 = user(1);
    let u1 = user(2);
    let t1 = token(1);
    let a = asset(0xaa);

    let ledger = InMemoryLedger::default(); // u1 has no balance or allowance anywhere
    let mut assets = InMemoryAssets::default();
    assets.set_owner(a, u0);

    let clock = InMemoryClock::new(Timestamp(0));
    let mut engine = Engine::new(ledger, assets, clock, custody_account(), zero_stake_config());

    engine.configure_accepted(u0, vec![t1], t1).unwrap();
    engine.configure_accepted(u1, vec![t1], t1).unwrap();

    let sell = engine.submit_sell(u0, a, u1, Amount(100)).unwrap();
    let buy = engine.submit_buy(u1, a, t1, Amount(100), u0).unwrap();
    engine.match_dvp();

    for _ in 0..EngineConfig::default().max_failed_cycles {
        engine.clock().advance(301);
        engine.perform_settlement().unwrap();
    }

    assert!(!engine.dvp_order(sell).unwrap().active);
    assert!(!engine.dvp_order(buy).unwrap().active);
    assert_eq!(engine.assets().owner_of(a.collection.0, 0), Some(u0));
}

/// S3 — multilateral netting across a payment and a swap pair: only the net
/// aggregate per participant moves real value, not each individual leg.
/// Aggregates: U0 = -10 (payment) - 5 (swap send) + 6 (swap receive) = -9;
/// U1 = +10; U2 = -6 (swap send) + 5 (swap receive) + 7 (payment) = +6;
/// U3 = -7. Only U0 and U3 (the two negative aggregates) ever touch the
/// ledger on the debit side.
#[test]
fn multilateral_netting_moves_only_the_aggregate() {
    let u0 = user(1);
    let u1 = user(2);
    let u2 = user(3);
    let u3 = user(4);
    let t1 = token(1);
    let t2 = token(2);

    let mut ledger = InMemoryLedger::default();
    ledger.set_balance(u0, t1, Amount(100));
    ledger.set_allowance(u0, t1, Amount(100));
    ledger.set_balance(u3, t2, Amount(7));
    ledger.set_allowance(u3, t2, Amount(7));

    let assets = InMemoryAssets::default();
    let clock = InMemoryClock::new(Timestamp(0));
    let mut engine = Engine::new(ledger, assets, clock, custody_account(), zero_stake_config());

    engine.configure_accepted(u0, vec![t1, t2], t1).unwrap();
    engine.configure_accepted(u1, vec![t1, t2], t1).unwrap();
    engine.configure_accepted(u2, vec![t2, t1], t2).unwrap();
    engine.configure_accepted(u3, vec![t2, t1], t2).unwrap();

    // U0 pays U1 10 (T1).
    let p_a = engine.create_payment(u0, u1, Amount(10), t1).unwrap();
    engine.accept_payment(p_a, u0, Amount(10)).unwrap();
    // U3 pays U2 7 (T2).
    let p_b = engine.create_payment(u3, u2, Amount(7), t2).unwrap();
    engine.accept_payment(p_b, u3, Amount(7)).unwrap();
    // Swap: U0 sends 5 T1, receives 6 T2; U2 sends 6 T2, receives 5 T1.
    engine.submit_swap(u0, t1, Amount(5), t2, Amount(6)).unwrap();
    engine.submit_swap(u2, t2, Amount(6), t1, Amount(5)).unwrap();
    engine.match_swaps();

    engine.clock().advance(301);
    let outcome = engine.perform_settlement().unwrap();

    assert!(outcome.succeeded);
    // U0 paid only its net 9 (T1), not the 15 of its two individual legs.
    assert_eq!(engine.ledger().balance_of(u0, t1), Amount(91));
    // U3 paid exactly its net 7 (T2).
    assert_eq!(engine.ledger().balance_of(u3, t2), Amount(0));
    // Pool (T1=9, T2=7) pays U1's +10 rank-first (T1 then T2 fallthrough)
    // and U2's +6 out of the T2 remainder.
    assert_eq!(engine.ledger().balance_of(u1, t1), Amount(9));
    assert_eq!(engine.ledger().balance_of(u1, t2), Amount(1));
    assert_eq!(engine.ledger().balance_of(u2, t2), Amount(6));
}

/// S4 — a defaulter who cannot fund their net obligation is excluded and
/// the cycle re-nets and settles everyone else; the defaulter's own records
/// stay active with a bumped failure counter and no asset movement.
#[test]
fn defaulter_exclusion_preserves_the_rest() {
    let u0 = user(1);
    let u1 = user(2);
    let u2 = user(3);
    let u3 = user(4);
    let t1 = token(1);
    let t2 = token(2);
    let t3 = token(3);
    let a = asset(0xaa);

    let mut ledger = InMemoryLedger::default();
    // U0 owes 9 once U3 is excluded (payment debit 10 + swap send 5 - swap receive 6).
    ledger.set_balance(u0, t1, Amount(100));
    ledger.set_allowance(u0, t1, Amount(100));
    // U2 owes 1 once U3 is excluded (swap send 6 - swap receive 5).
    ledger.set_balance(u2, t2, Amount(5));
    ledger.set_allowance(u2, t2, Amount(5));
    // U3 cannot fund its 12 (T3) DvP leg or its 7 (T2) payment leg at all.

    let mut assets = InMemoryAssets::default();
    assets.set_owner(a, u0);

    let clock = InMemoryClock::new(Timestamp(0));
    let mut engine = Engine::new(ledger, assets, clock, custody_account(), zero_stake_config());

    engine.configure_accepted(u0, vec![t1, t2], t1).unwrap();
    engine.configure_accepted(u1, vec![t1, t2], t1).unwrap();
    engine.configure_accepted(u2, vec![t2, t1], t2).unwrap();
    engine.configure_accepted(u3, vec![t2, t3], t2).unwrap();

    let p_a = engine.create_payment(u0, u1, Amount(10), t1).unwrap();
    engine.accept_payment(p_a, u0, Amount(10)).unwrap();
    let p_b = engine.create_payment(u3, u2, Amount(7), t2).unwrap();
    engine.accept_payment(p_b, u3, Amount(7)).unwrap();

    engine.submit_swap(u0, t1, Amount(5), t2, Amount(6)).unwrap();
    engine.submit_swap(u2, t2, Amount(6), t1, Amount(5)).unwrap();
    engine.match_swaps();

    let sell = engine.submit_sell(u0, a, u3, Amount(12)).unwrap();
    let buy = engine.submit_buy(u3, a, t3, Amount(12), u0).unwrap();
    engine.match_dvp();

    engine.clock().advance(301);
    let outcome = engine.perform_settlement().unwrap();

    assert!(outcome.succeeded, "re-net excluding U3 should still settle the rest");

    // U0 paid only the net 9, not the raw 10 + 5 = 15 of its individual legs.
    assert_eq!(engine.ledger().balance_of(u0, t1), Amount(91));
    // U2 paid only the net 1, not the raw 6 of its swap leg.
    assert_eq!(engine.ledger().balance_of(u2, t2), Amount(4));
    // U1 received the full settled aggregate, routed through its accepted set.
    assert_eq!(engine.ledger().balance_of(u1, t1), Amount(9));
    assert_eq!(engine.ledger().balance_of(u1, t2), Amount(1));

    // U3's own records are untouched: still active, not locked, not settled,
    // and the asset never moved.
    assert!(engine.dvp_order(sell).unwrap().active);
    assert!(!engine.dvp_order(sell).unwrap().locked);
    assert!(engine.dvp_order(buy).unwrap().active);
    assert_eq!(engine.dvp_order(sell).unwrap().failed_cycles, 1);
    assert!(engine.payment(p_b).unwrap().active);
    assert_eq!(engine.payment(p_b).unwrap().failed_cycles, 1);
    assert_eq!(engine.assets().owner_of(a.collection.0, 0), Some(u0));
}

/// S5 — an asset-lock failure at P6 aborts the whole cycle: value collected
/// at P5 is refunded, the asset stays wherever it actually was, and the
/// order's failure counter still advances.
#[test]
fn asset_lock_failure_is_a_global_abort() {
    let u0 = user(1);
    let u1 = user(2);
    let t1 = token(1);
    let a = asset(0xaa);

    let mut ledger = InMemoryLedger::default();
    ledger.set_balance(u1, t1, Amount(100));
    ledger.set_allowance(u1, t1, Amount(100));

    // The registry thinks U0 is the seller, but engine custody never
    // actually holds the asset on U0's behalf (owned by someone else
    // entirely) -- the asset_transfer at P6 will fail.
    let mut assets = InMemoryAssets::default();
    let someone_else = user(9);
    assets.set_owner(a, someone_else);

    let clock = InMemoryClock::new(Timestamp(0));
    let mut engine = Engine::new(ledger, assets, clock, custody_account(), zero_stake_config());

    engine.configure_accepted(u0, vec![t1], t1).unwrap();
    engine.configure_accepted(u1, vec![t1], t1).unwrap();

    let sell = engine.submit_sell(u0, a, u1, Amount(100)).unwrap();
    let buy = engine.submit_buy(u1, a, t1, Amount(100), u0).unwrap();
    engine.match_dvp();

    engine.clock().advance(301);
    let outcome = engine.perform_settlement().unwrap();

    assert!(!outcome.succeeded);
    // U1's value was drawn at P5 then refunded in full on abort.
    assert_eq!(engine.ledger().balance_of(u1, t1), Amount(100));
    assert_eq!(engine.ledger().allowance_of(u1, t1), Amount(100));
    assert!(engine.dvp_order(sell).unwrap().active);
    assert!(!engine.dvp_order(sell).unwrap().locked);
    assert_eq!(engine.dvp_order(sell).unwrap().failed_cycles, 1);
    assert_eq!(engine.dvp_order(buy).unwrap().failed_cycles, 1);
    assert_eq!(engine.assets().owner_of(a.collection.0, 0), Some(someone_else));
}

/// S6 — preference routing: a recipient drains their preferred token first
/// and only falls back to a lower-ranked token once the preferred one is
/// exhausted.
#[test]
fn distribution_respects_preference_rank_before_falling_back() {
    let payer1 = user(1);
    let payer2 = user(2);
    let payer3 = user(3);
    let recipient = user(4);
    let other_recipient = user(5);
    let t1 = token(1);
    let t2 = token(2);

    let mut ledger = InMemoryLedger::default();
    ledger.set_balance(payer1, t1, Amount(70));
    ledger.set_allowance(payer1, t1, Amount(70));
    ledger.set_balance(payer2, t2, Amount(30));
    ledger.set_allowance(payer2, t2, Amount(30));
    ledger.set_balance(payer3, t2, Amount(20));
    ledger.set_allowance(payer3, t2, Amount(20));

    let assets = InMemoryAssets::default();
    let clock = InMemoryClock::new(Timestamp(0));
    let mut engine = Engine::new(ledger, assets, clock, custody_account(), zero_stake_config());

    engine.configure_accepted(payer1, vec![t1], t1).unwrap();
    engine.configure_accepted(payer2, vec![t2], t2).unwrap();
    engine.configure_accepted(payer3, vec![t2], t2).unwrap();
    engine.configure_accepted(recipient, vec![t1, t2], t1).unwrap();
    engine.configure_accepted(other_recipient, vec![t2], t2).unwrap();

    let p1 = engine.create_payment(payer1, recipient, Amount(70), t1).unwrap();
    engine.accept_payment(p1, payer1, Amount(70)).unwrap();
    let p2 = engine.create_payment(payer2, recipient, Amount(30), t2).unwrap();
    engine.accept_payment(p2, payer2, Amount(30)).unwrap();
    let p3 = engine
        .create_payment(payer3, other_recipient, Amount(20), t2)
        .unwrap();
    engine.accept_payment(p3, payer3, Amount(20)).unwrap();

    engine.clock().advance(301);
    let outcome = engine.perform_settlement().unwrap();

    assert!(outcome.succeeded);
    // Preferred token (T1) fully drained (70) before any T2 is touched; the
    // remaining 30 of the 100 aggregate falls back to T2.
    assert_eq!(engine.ledger().balance_of(recipient, t1), Amount(70));
    assert_eq!(engine.ledger().balance_of(recipient, t2), Amount(30));
    // The other recipient's own 20 (T2) is untouched by recipient's draw.
    assert_eq!(engine.ledger().balance_of(other_recipient, t2), Amount(20));
}
