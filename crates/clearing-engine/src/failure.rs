//! Per-record retry counters and expiry (§4.6). Runs once at the end of
//! every cycle against the set of records that were eligible to settle —
//! whatever in that set is still active did not settle this cycle, whether
//! because of a global abort or because a re-net excluded one of its
//! counterparties.

use crate::config::EngineConfig;
use crate::registry::Registry;
use clearing_types::{DvpOrderId, PaymentId, SwapId};
use tracing::debug;

/// The records a cycle attempted to settle, captured once at Phase P1
/// before any eligibility exclusion narrows the population.
#[derive(Debug, Default)]
pub struct TouchedRecords {
    pub dvp: Vec<DvpOrderId>,
    pub payments: Vec<PaymentId>,
    /// One id per matched pair (the lower-id side); the peer is derived via
    /// `matched_with`.
    pub swaps: Vec<SwapId>,
}

/// Bump `failed_cycles` for every still-active record in `touched` and
/// expire whatever crosses `config.max_failed_cycles`. Called after P8 on a
/// successful cycle (for records dropped by re-netting) and after P9 on a
/// global abort (for everything).
pub fn settle_failures(registry: &mut Registry, config: &EngineConfig, touched: &TouchedRecords) {
    for &id in &touched.dvp {
        let Some(order) = registry.dvp_order(id) else {
            continue;
        };
        if !order.active {
            continue;
        }
        let peer = order.matched_with;
        bump_dvp(registry, id);
        if let Some(peer_id) = peer {
            bump_dvp(registry, peer_id);
        }
        expire_dvp_if_due(registry, config, id);
        if let Some(peer_id) = peer {
            expire_dvp_if_due(registry, config, peer_id);
        }
    }

    for &id in &touched.payments {
        let Some(payment) = registry.payment_mut(id) else {
            continue;
        };
        if !payment.active {
            continue;
        }
        payment.failed_cycles += 1;
        debug!(?id, failed_cycles = payment.failed_cycles, "PaymentFailedCycle");
        if payment.failed_cycles >= config.max_failed_cycles {
            payment.active = false;
            debug!(?id, "PaymentExpired");
        }
    }

    for &id in &touched.swaps {
        let Some(swap) = registry.swap(id) else {
            continue;
        };
        if !swap.active {
            continue;
        }
        let Some(peer_id) = swap.matched_with else {
            continue;
        };
        bump_swap(registry, id);
        bump_swap(registry, peer_id);
        let expired = registry.swap(id).is_some_and(|s| s.failed_cycles >= config.max_failed_cycles)
            || registry
                .swap(peer_id)
                .is_some_and(|s| s.failed_cycles >= config.max_failed_cycles);
        if expired {
            for swap_id in [id, peer_id] {
                if let Some(s) = registry.swap_mut(swap_id) {
                    s.matched_with = None;
                    s.failed_cycles = 0;
                }
            }
            debug!(a = ?id, b = ?peer_id, "SwapUnmatchedOnExpiry");
        }
    }
}

fn bump_dvp(registry: &mut Registry, id: DvpOrderId) {
    if let Some(order) = registry.dvp_order_mut(id) {
        order.failed_cycles += 1;
        debug!(?id, failed_cycles = order.failed_cycles, "DvPFailedCycle");
    }
}

fn expire_dvp_if_due(registry: &mut Registry, config: &EngineConfig, id: DvpOrderId) {
    let Some(order) = registry.dvp_order(id) else {
        return;
    };
    if order.failed_cycles < config.max_failed_cycles {
        return;
    }
    let peer = order.matched_with;
    if let Some(order) = registry.dvp_order_mut(id) {
        order.active = false;
        order.matched_with = None;
    }
    if let Some(peer_id) = peer {
        if let Some(peer) = registry.dvp_order_mut(peer_id) {
            peer.matched_with = None;
            peer.failed_cycles = 0;
        }
    }
    debug!(?id, "DvPExpired");
}

fn bump_swap(registry: &mut Registry, id: SwapId) {
    if let Some(swap) = registry.swap_mut(id) {
        swap.failed_cycles += 1;
        debug!(?id, failed_cycles = swap.failed_cycles, "SwapFailedCycle");
    }
}
