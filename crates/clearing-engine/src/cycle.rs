//! The settlement cycle itself (§4.4): gate, participant assembly, stake
//! collection, the bounded obligation-build/aggregate/value-lock re-net
//! loop, asset lock, distribution, finalization, and the abort path. This
//! is the one place all the other modules are wired together; the engine
//! (`crate::engine`) only adds the non-reentrancy guard and persistent
//! counters around a call into [`run`].

use crate::config::EngineConfig;
use crate::custody::{prorate, Custodian, CustodyLedger};
use crate::events::{Event, FailureReason};
use crate::failure::{self, TouchedRecords};
use crate::matcher;
use crate::netter;
use crate::obligation::{self, NetBalanceTable};
use crate::ports::{AssetCustody, Ledger};
use crate::registry::{Registry, Side};
use clearing_types::{Amount, DvpOrderId, Participant, SignedAmount, Timestamp, TokenId};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("settlement interval has not yet elapsed")]
    TooEarly,
}

#[derive(Debug)]
pub struct SettlementOutcome {
    pub succeeded: bool,
    pub events: Vec<Event>,
}

/// Runs one `perform_settlement` cycle. `reserve` and `last_settlement` are
/// the two pieces of cross-cycle state the cycle needs beyond the registry
/// itself; the engine owns both and passes them in by reference.
#[allow(clippy::too_many_arguments)]
pub fn run<L: Ledger, A: AssetCustody>(
    registry: &mut Registry,
    ledger: &mut L,
    assets: &mut A,
    custody_account: Participant,
    config: &EngineConfig,
    reserve: &mut HashMap<TokenId, Amount>,
    last_settlement: &mut Option<Timestamp>,
    now: Timestamp,
) -> Result<SettlementOutcome, Error> {
    if let Some(last) = *last_settlement {
        let next_allowed = last
            .checked_add_secs(config.settlement_interval_secs)
            .expect("settlement interval overflow: invariant violation");
        if now < next_allowed {
            return Err(Error::TooEarly);
        }
    }
    *last_settlement = Some(now);

    let mut events = Vec::new();
    let gross_outgoing = obligation::gross_outgoing(registry);
    let mut participants: Vec<Participant> = obligation::cycle_participants(registry).into_iter().collect();
    participants.sort_by_key(|p| p.0);
    let touched = capture_touched(registry);

    let mut custody = CustodyLedger::default();
    let mut custodian = Custodian::new(ledger, assets, custody_account);

    // Phase P2
    let mut eligible: HashSet<Participant> = HashSet::new();
    for participant in &participants {
        let required = config
            .stake_bps
            .of(gross_outgoing.get(participant).copied().unwrap_or(Amount::ZERO));
        if required.is_zero() {
            eligible.insert(*participant);
            continue;
        }
        match collect_full_stake(&mut custodian, &mut custody, registry, *participant, required) {
            Ok(()) => {
                eligible.insert(*participant);
                events.push(Event::StakeCollected(*participant, required));
            }
            Err(()) => {
                custodian.refund_all(&mut custody, *participant);
                events.push(Event::StakeCollectionFailed(*participant));
            }
        }
    }

    // Phases P3-P5, with bounded re-net on defaulter exclusion. A defaulter's
    // already-collected P2 stake is forfeited into this cycle-scoped pool,
    // not into the persistent `reserve` — it still needs to be shared out
    // among whoever this cycle actually settles with, on either outcome.
    let mut stake_pool = custody.take_stake();
    let mut forfeited: HashMap<TokenId, Amount> = HashMap::new();
    let mut attempt = 0u32;
    let outcome: Result<(NetBalanceTable, HashMap<Participant, SignedAmount>), FailureReason> = loop {
        attempt += 1;
        custody.set_stake(stake_pool.clone());
        let table = obligation::build(registry, &eligible);
        let aggregates = netter::aggregate(&table);

        match lock_value(&mut custodian, &mut custody, registry, &table, &aggregates) {
            Ok(()) => break Ok((table, aggregates)),
            Err(defaulter) => {
                events.push(Event::StakeCollectionFailed(defaulter));
                for participant in custody.extra_participants().collect::<Vec<_>>() {
                    custodian.refund_extra(&mut custody, participant);
                }
                eligible.remove(&defaulter);
                if let Some(entries) = stake_pool.remove(&defaulter) {
                    for (token, amount) in entries {
                        if amount.is_zero() {
                            continue;
                        }
                        custody.remove_from_pool(token, amount);
                        bump_total(&mut forfeited, token, amount);
                    }
                }
                if attempt >= config.max_renet_attempts {
                    break Err(FailureReason::ReNetExhausted);
                }
            }
        }
    };

    let outcome = match outcome {
        Ok((table, aggregates)) => match lock_assets(&mut custodian, registry, &eligible) {
            Ok(locked_sells) => {
                for id in &locked_sells {
                    events.push(Event::AssetLocked(*id));
                }
                for participant in sorted(&eligible) {
                    custodian.refund_unused_stake(&mut custody, participant);
                }
                distribute(&mut custodian, &mut custody, registry, &table, &aggregates, &mut events);
                // Defaulters excluded along the way forfeit their P2 stake to
                // this cycle's actual survivors, weighted the same way P9's
                // abort-path indemnity is, rather than to the persistent
                // reserve — reserve only ever receives floor-division
                // residue with no eligible participant left to take it.
                prorate_distribute(&mut custodian, &forfeited, &gross_outgoing, &eligible, reserve);
                finalize(&mut custodian, registry, &eligible, &locked_sells, &mut events);
                Ok(())
            }
            Err(()) => Err(FailureReason::AssetLockFailure),
        },
        Err(reason) => Err(reason),
    };

    let succeeded = match outcome {
        Ok(()) => {
            events.push(Event::SettlementCompleted(now));
            true
        }
        Err(reason) => {
            abort(
                &mut custodian,
                registry,
                &mut custody,
                stake_pool,
                &forfeited,
                reserve,
                &gross_outgoing,
                &eligible,
                &mut events,
            );
            events.push(Event::SettlementFailed(reason));
            false
        }
    };

    failure::settle_failures(registry, config, &touched);
    registry.compact();

    Ok(SettlementOutcome { succeeded, events })
}

fn sorted(set: &HashSet<Participant>) -> Vec<Participant> {
    let mut v: Vec<Participant> = set.iter().copied().collect();
    v.sort_by_key(|p| p.0);
    v
}

fn capture_touched(registry: &Registry) -> TouchedRecords {
    let dvp = registry
        .active_dvp_orders()
        .filter(|o| o.side == Side::Buy && o.is_matched())
        .map(|o| o.id)
        .collect();
    let payments = registry.eligible_payments().map(|p| p.id).collect();
    let swaps = registry
        .active_swaps()
        .filter(|s| s.is_matched() && s.id.0 < s.matched_with.unwrap().0)
        .map(|s| s.id)
        .collect();
    TouchedRecords { dvp, payments, swaps }
}

/// Phase P2: drain `participant`'s accepted tokens in preference-rank
/// order until `required` is met, or fail leaving whatever was drawn for
/// the caller to refund.
fn collect_full_stake<L: Ledger, A: AssetCustody>(
    custodian: &mut Custodian<L, A>,
    custody: &mut CustodyLedger,
    registry: &Registry,
    participant: Participant,
    required: Amount,
) -> Result<(), ()> {
    let Some(config) = registry.config_of(participant) else {
        return Err(());
    };
    let mut remaining = required;
    for token in config.rank().to_vec() {
        if remaining.is_zero() {
            break;
        }
        let draw = remaining
            .min(custodian.balance_of(participant, token))
            .min(custodian.allowance_of(participant, token));
        if draw.is_zero() {
            continue;
        }
        if custodian.collect_stake(custody, participant, token, draw).is_ok() {
            remaining = remaining.saturating_sub(draw);
        }
    }
    if remaining.is_zero() {
        Ok(())
    } else {
        Err(())
    }
}

/// Phase P5: for each participant with a negative aggregate, consume stake
/// first, then draw the remainder from their accepted tokens (or, for an
/// unconfigured participant, from the specific `InvolvedTokens` they owe).
/// Returns the first defaulter encountered, if any.
fn lock_value<L: Ledger, A: AssetCustody>(
    custodian: &mut Custodian<L, A>,
    custody: &mut CustodyLedger,
    registry: &Registry,
    table: &NetBalanceTable,
    aggregates: &HashMap<Participant, SignedAmount>,
) -> Result<(), Participant> {
    let mut negative: Vec<Participant> = aggregates
        .iter()
        .filter(|(_, agg)| agg.0 < 0)
        .map(|(p, _)| *p)
        .collect();
    negative.sort_by_key(|p| p.0);

    for participant in negative {
        let owed_total = Amount((-aggregates[&participant].0) as u128);
        let consumed = custodian.consume_stake(custody, participant, owed_total);
        let mut owed = owed_total.saturating_sub(consumed);
        if owed.is_zero() {
            continue;
        }

        let tokens: Vec<TokenId> = match registry.config_of(participant) {
            Some(config) => config.accepted().to_vec(),
            None => {
                let mut owed_tokens: Vec<TokenId> = table
                    .involved_tokens()
                    .iter()
                    .copied()
                    .filter(|token| table.balance(participant, *token).0 < 0)
                    .collect();
                owed_tokens.sort_by_key(|t| t.0);
                owed_tokens
            }
        };
        for token in tokens {
            if owed.is_zero() {
                break;
            }
            let draw = owed
                .min(custodian.balance_of(participant, token))
                .min(custodian.allowance_of(participant, token));
            if draw.is_zero() {
                continue;
            }
            if custodian.collect_extra(custody, participant, token, draw).is_ok() {
                owed = owed.saturating_sub(draw);
            }
        }
        if !owed.is_zero() {
            return Err(participant);
        }
    }
    Ok(())
}

/// Phase P6: lock the asset side of every matched, both-eligible DvP pair.
/// A single failure rolls back every lock taken so far in this call.
fn lock_assets<L: Ledger, A: AssetCustody>(
    custodian: &mut Custodian<L, A>,
    registry: &mut Registry,
    eligible: &HashSet<Participant>,
) -> Result<Vec<DvpOrderId>, ()> {
    let mut pairs: Vec<(DvpOrderId, Participant, clearing_types::AssetRef)> = registry
        .active_dvp_orders()
        .filter(|o| o.side == Side::Sell && o.is_matched())
        .filter_map(|sell| {
            let buy = registry.dvp_order(sell.matched_with?)?;
            (eligible.contains(&sell.maker) && eligible.contains(&buy.maker))
                .then_some((sell.id, sell.maker, sell.asset))
        })
        .collect();
    pairs.sort_by_key(|(id, _, _)| id.0);

    let mut locked = Vec::new();
    for &(sell_id, seller, asset) in &pairs {
        match custodian.lock_asset(seller, asset.collection, asset.token_id) {
            Ok(()) => locked.push(sell_id),
            Err(_) => {
                for &locked_id in &locked {
                    let (_, seller, asset) = pairs.iter().find(|(id, _, _)| *id == locked_id).copied().unwrap();
                    custodian.unlock_asset(seller, asset.collection, asset.token_id);
                }
                return Err(());
            }
        }
    }
    for &id in &locked {
        if let Some(order) = registry.dvp_order_mut(id) {
            order.locked = true;
        }
    }
    Ok(locked)
}

/// Phase P7: pay every positive aggregate out of the pool, preference rank
/// first, falling back to any other involved token with residual pool.
fn distribute<L: Ledger, A: AssetCustody>(
    custodian: &mut Custodian<L, A>,
    custody: &mut CustodyLedger,
    registry: &Registry,
    table: &NetBalanceTable,
    aggregates: &HashMap<Participant, SignedAmount>,
    events: &mut Vec<Event>,
) {
    let mut positive: Vec<Participant> = aggregates
        .iter()
        .filter(|(_, agg)| agg.0 > 0)
        .map(|(p, _)| *p)
        .collect();
    positive.sort_by_key(|p| p.0);

    for participant in positive {
        let mut remaining = Amount(aggregates[&participant].0 as u128);
        let rank: Vec<TokenId> = registry
            .config_of(participant)
            .map(|c| c.rank().to_vec())
            .unwrap_or_default();

        for token in rank.iter().copied() {
            if remaining.is_zero() {
                break;
            }
            let draw = custody.pool_of(token).min(remaining);
            if draw.is_zero() {
                continue;
            }
            custodian.distribute(custody, participant, token, draw);
            events.push(Event::CrossTokenNetted {
                participant,
                token,
                amount: draw,
            });
            remaining = remaining.saturating_sub(draw);
        }
        if !remaining.is_zero() {
            let mut fallback: Vec<TokenId> = table
                .involved_tokens()
                .iter()
                .copied()
                .filter(|t| !rank.contains(t))
                .collect();
            fallback.sort_by_key(|t| t.0);
            for token in fallback {
                if remaining.is_zero() {
                    break;
                }
                let draw = custody.pool_of(token).min(remaining);
                if draw.is_zero() {
                    continue;
                }
                custodian.distribute(custody, participant, token, draw);
                events.push(Event::CrossTokenNetted {
                    participant,
                    token,
                    amount: draw,
                });
                remaining = remaining.saturating_sub(draw);
            }
        }
        assert!(
            remaining.is_zero(),
            "pool exhausted before positive aggregate satisfied: invariant violation"
        );
        events.push(Event::StakeDistributed(participant, Amount(aggregates[&participant].0 as u128)));
    }
}

/// Phase P8: deliver custodied assets, settle payments and swaps, compact.
fn finalize<L: Ledger, A: AssetCustody>(
    custodian: &mut Custodian<L, A>,
    registry: &mut Registry,
    eligible: &HashSet<Participant>,
    locked_sells: &[DvpOrderId],
    events: &mut Vec<Event>,
) {
    for &sell_id in locked_sells {
        let (buy_id, asset) = {
            let sell = registry.dvp_order(sell_id).expect("locked order exists");
            (sell.matched_with.expect("locked sell is matched"), sell.asset)
        };
        let buyer = registry.dvp_order(buy_id).expect("matched buy exists").maker;
        custodian.deliver_asset(buyer, asset.collection, asset.token_id);
        if let Some(order) = registry.dvp_order_mut(sell_id) {
            order.active = false;
            order.matched_with = None;
        }
        if let Some(order) = registry.dvp_order_mut(buy_id) {
            order.active = false;
            order.matched_with = None;
        }
    }

    let settled_payments: Vec<_> = registry
        .eligible_payments()
        .filter(|p| eligible.contains(&p.sender) && eligible.contains(&p.recipient))
        .map(|p| p.id)
        .collect();
    for id in settled_payments {
        if let Some(payment) = registry.payment_mut(id) {
            payment.active = false;
        }
        events.push(Event::PaymentSettled(id));
    }

    let settled_swaps: Vec<_> = registry
        .active_swaps()
        .filter(|s| s.is_matched() && s.id.0 < s.matched_with.unwrap().0)
        .filter_map(|s| {
            let peer_id = s.matched_with.unwrap();
            let peer = registry.swap(peer_id)?;
            (eligible.contains(&s.maker) && eligible.contains(&peer.maker)).then_some((s.id, peer_id))
        })
        .collect();
    for (a, b) in settled_swaps {
        if let Some(swap) = registry.swap_mut(a) {
            swap.active = false;
        }
        if let Some(swap) = registry.swap_mut(b) {
            swap.active = false;
        }
        events.push(Event::SwapSettled(a, b));
    }
}

/// Phase P9: unwind any asset locks, refund cycle-collected value, and
/// redistribute the surviving stake pool plus this cycle's forfeited stake
/// as a loss-sharing indemnity weighted by `gross_outgoing`. The persistent
/// `reserve` is never read back in here — it only ever receives residue,
/// never supplies a future cycle's payout (see [`prorate_distribute`]).
#[allow(clippy::too_many_arguments)]
fn abort<L: Ledger, A: AssetCustody>(
    custodian: &mut Custodian<L, A>,
    registry: &mut Registry,
    custody: &mut CustodyLedger,
    stake_pool: HashMap<Participant, Vec<(TokenId, Amount)>>,
    forfeited: &HashMap<TokenId, Amount>,
    reserve: &mut HashMap<TokenId, Amount>,
    gross_outgoing: &HashMap<Participant, Amount>,
    surviving_eligible: &HashSet<Participant>,
    events: &mut Vec<Event>,
) {
    let locked_ids: Vec<DvpOrderId> = registry
        .active_dvp_orders()
        .filter(|o| o.locked)
        .map(|o| o.id)
        .collect();
    for id in locked_ids {
        let (seller, asset) = {
            let order = registry.dvp_order(id).expect("id from active_dvp_orders");
            (order.maker, order.asset)
        };
        custodian.unlock_asset(seller, asset.collection, asset.token_id);
        if let Some(order) = registry.dvp_order_mut(id) {
            order.locked = false;
        }
        events.push(Event::AssetUnlocked(id));
    }

    for participant in custody.extra_participants().collect::<Vec<_>>() {
        custodian.refund_extra(custody, participant);
    }

    custody.set_stake(stake_pool);
    let mut totals: HashMap<TokenId, Amount> = HashMap::new();
    for participant in custody.stake_participants().collect::<Vec<_>>() {
        for &(token, amount) in custody.stake_entries(participant) {
            bump_total(&mut totals, token, amount);
        }
    }
    for (&token, &amount) in forfeited {
        bump_total(&mut totals, token, amount);
    }

    prorate_distribute(custodian, &totals, gross_outgoing, surviving_eligible, reserve);
}

/// Pays `totals` out pro-rata by `gross_outgoing` weight among `survivors`
/// via [`Custodian::pay_out`], and folds whatever floor division leaves
/// undistributed (or has no surviving weight to receive) into `reserve`.
/// `reserve` is purely additive here: it accumulates across cycles and is
/// never itself folded back into a later `totals` to be re-attempted.
fn prorate_distribute<L: Ledger, A: AssetCustody>(
    custodian: &mut Custodian<L, A>,
    totals: &HashMap<TokenId, Amount>,
    gross_outgoing: &HashMap<Participant, Amount>,
    survivors: &HashSet<Participant>,
    reserve: &mut HashMap<TokenId, Amount>,
) {
    if totals.values().all(|amount| amount.is_zero()) {
        return;
    }
    let survivors = sorted(survivors);
    let weight_sum = survivors.iter().fold(Amount::ZERO, |acc, p| {
        acc.checked_add(gross_outgoing.get(p).copied().unwrap_or(Amount::ZERO))
            .expect("weight sum overflow: invariant violation")
    });

    let mut residual = totals.clone();
    for participant in &survivors {
        let weight = gross_outgoing.get(participant).copied().unwrap_or(Amount::ZERO);
        for (&token, &total) in totals {
            let share = prorate(total, weight, weight_sum);
            if share.is_zero() {
                continue;
            }
            custodian.pay_out(*participant, token, share);
            let slot = residual.get_mut(&token).expect("token present in totals");
            *slot = slot.checked_sub(share).expect("indemnity overpaid: invariant violation");
        }
    }

    for (token, amount) in residual {
        if amount.is_zero() {
            continue;
        }
        let slot = reserve.entry(token).or_insert(Amount::ZERO);
        *slot = slot.checked_add(amount).expect("reserve overflow: invariant violation");
    }
}

fn bump_total(totals: &mut HashMap<TokenId, Amount>, token: TokenId, amount: Amount) {
    let slot = totals.entry(token).or_insert(Amount::ZERO);
    *slot = slot.checked_add(amount).expect("indemnity pool overflow: invariant violation");
}

/// Convenience wrapper so callers that only need matching (outside a
/// settlement cycle) don't have to import `matcher` directly.
pub fn match_all(registry: &mut Registry) {
    for event in matcher::match_dvp(registry) {
        crate::events::emit(&event);
    }
    for event in matcher::match_swaps(registry) {
        crate::events::emit(&event);
    }
}
