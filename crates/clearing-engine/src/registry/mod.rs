//! Persistent tables of orders, payments, swaps, and per-participant
//! configuration, plus the submission/cancellation mutation surface that is
//! the engine's only administrative API (§4.1, §6).
//!
//! Represented as separate collections keyed by id, with active-id lists as
//! owned, monotonically rebuilt secondary indices — the typed-state
//! reworking of the source's nested-mapping representation called for in
//! the design notes, mirroring how this codebase splits persistent registry
//! state from cycle-scoped state elsewhere in the settlement stack.

mod config;
mod dvp;
mod payment;
mod swap;

pub use config::{ConfigError, UserConfig};
pub use dvp::{DvPOrder, Side};
pub use payment::PaymentRequest;
pub use swap::SwapOrder;

use clearing_types::{Amount, AssetRef, DvpOrderId, Participant, PaymentId, SwapId, TokenId};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct Registry {
    dvp_orders: HashMap<DvpOrderId, DvPOrder>,
    active_dvp: Vec<DvpOrderId>,
    next_dvp_id: u64,

    payments: HashMap<PaymentId, PaymentRequest>,
    active_payments: Vec<PaymentId>,
    next_payment_id: u64,

    swaps: HashMap<SwapId, SwapOrder>,
    active_swaps: Vec<SwapId>,
    next_swap_id: u64,

    configs: HashMap<Participant, UserConfig>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // -- DvP ----------------------------------------------------------

    pub fn submit_sell(
        &mut self,
        maker: Participant,
        asset: AssetRef,
        counterparty: Participant,
        price: Amount,
    ) -> Result<DvpOrderId, Error> {
        validate_counterparty(maker, counterparty)?;
        validate_positive(price)?;

        let id = DvpOrderId(self.next_dvp_id);
        self.next_dvp_id += 1;
        let order = DvPOrder::new_sell(id, maker, asset, counterparty, price);
        self.dvp_orders.insert(id, order);
        self.active_dvp.push(id);
        Ok(id)
    }

    /// On buy submission, scans for an active sell with the same
    /// `(asset, maker=counterparty, counterparty=submitter)`. If found and
    /// sell-side terms for `payment_token` already exist, the existing price
    /// must equal the new price; otherwise the buy's `(payment_token,
    /// price)` is written into the sell's terms.
    pub fn submit_buy(
        &mut self,
        maker: Participant,
        asset: AssetRef,
        payment_token: TokenId,
        price: Amount,
        counterparty: Participant,
    ) -> Result<DvpOrderId, Error> {
        validate_counterparty(maker, counterparty)?;
        validate_positive(price)?;

        if let Some(sell_id) = self.find_compatible_sell(asset, counterparty, maker) {
            let sell = self.dvp_orders.get_mut(&sell_id).expect("id from index");
            match sell.sell_terms().price_for(payment_token) {
                Some(existing) if existing != price => return Err(Error::TermsMismatch),
                _ => sell.record_term(payment_token, price),
            }
        }

        let id = DvpOrderId(self.next_dvp_id);
        self.next_dvp_id += 1;
        let order = DvPOrder::new_buy(id, maker, asset, payment_token, price, counterparty);
        self.dvp_orders.insert(id, order);
        self.active_dvp.push(id);
        Ok(id)
    }

    fn find_compatible_sell(
        &self,
        asset: AssetRef,
        sell_maker: Participant,
        sell_counterparty: Participant,
    ) -> Option<DvpOrderId> {
        self.active_dvp
            .iter()
            .copied()
            .filter_map(|id| self.dvp_orders.get(&id))
            .find(|sell| {
                sell.active
                    && sell.side == Side::Sell
                    && sell.asset == asset
                    && sell.maker == sell_maker
                    && sell.counterparty == sell_counterparty
            })
            .map(|sell| sell.id)
    }

    pub fn cancel_dvp(&mut self, id: DvpOrderId) -> Result<(), Error> {
        let peer = {
            let order = self.dvp_orders.get(&id).ok_or(Error::NotFound)?;
            if !order.active || order.locked {
                return Err(Error::NotCancellable);
            }
            order.matched_with
        };
        if let Some(peer_id) = peer {
            if let Some(peer) = self.dvp_orders.get_mut(&peer_id) {
                peer.matched_with = None;
                peer.failed_cycles = 0;
            }
        }
        let order = self.dvp_orders.get_mut(&id).expect("checked above");
        order.active = false;
        order.matched_with = None;
        Ok(())
    }

    pub fn dvp_order(&self, id: DvpOrderId) -> Option<&DvPOrder> {
        self.dvp_orders.get(&id)
    }

    pub fn dvp_order_mut(&mut self, id: DvpOrderId) -> Option<&mut DvPOrder> {
        self.dvp_orders.get_mut(&id)
    }

    pub fn active_dvp_orders(&self) -> impl Iterator<Item = &DvPOrder> {
        self.active_dvp
            .iter()
            .filter_map(move |id| self.dvp_orders.get(id))
            .filter(|o| o.active)
    }

    // -- Payments -------------------------------------------------------

    pub fn create_payment(
        &mut self,
        sender: Participant,
        recipient: Participant,
        amount: Amount,
        token: TokenId,
    ) -> Result<PaymentId, Error> {
        validate_counterparty(sender, recipient)?;
        validate_positive(amount)?;

        let id = PaymentId(self.next_payment_id);
        self.next_payment_id += 1;
        self.payments
            .insert(id, PaymentRequest::new(id, sender, recipient, amount, token));
        self.active_payments.push(id);
        Ok(id)
    }

    pub fn accept_payment(
        &mut self,
        id: PaymentId,
        expected_sender: Participant,
        expected_amount: Amount,
    ) -> Result<(), Error> {
        let payment = self.payments.get_mut(&id).ok_or(Error::NotFound)?;
        if !payment.active {
            return Err(Error::NotCancellable);
        }
        if payment.sender != expected_sender || payment.amount != expected_amount {
            return Err(Error::PaymentMismatch);
        }
        payment.fulfilled = true;
        Ok(())
    }

    pub fn cancel_payment(&mut self, id: PaymentId) -> Result<(), Error> {
        let payment = self.payments.get_mut(&id).ok_or(Error::NotFound)?;
        if !payment.active {
            return Err(Error::NotCancellable);
        }
        payment.active = false;
        Ok(())
    }

    pub fn payment(&self, id: PaymentId) -> Option<&PaymentRequest> {
        self.payments.get(&id)
    }

    pub fn payment_mut(&mut self, id: PaymentId) -> Option<&mut PaymentRequest> {
        self.payments.get_mut(&id)
    }

    pub fn eligible_payments(&self) -> impl Iterator<Item = &PaymentRequest> {
        self.active_payments
            .iter()
            .filter_map(move |id| self.payments.get(id))
            .filter(|p| p.eligible_for_cycle())
    }

    // -- Swaps ------------------------------------------------------------

    pub fn submit_swap(
        &mut self,
        maker: Participant,
        send_token: TokenId,
        send_amount: Amount,
        receive_token: TokenId,
        receive_amount: Amount,
    ) -> Result<SwapId, Error> {
        validate_positive(send_amount)?;
        validate_positive(receive_amount)?;

        let id = SwapId(self.next_swap_id);
        self.next_swap_id += 1;
        self.swaps.insert(
            id,
            SwapOrder::new(id, maker, send_token, send_amount, receive_token, receive_amount),
        );
        self.active_swaps.push(id);
        Ok(id)
    }

    pub fn cancel_swap(&mut self, id: SwapId) -> Result<(), Error> {
        let peer = {
            let order = self.swaps.get(&id).ok_or(Error::NotFound)?;
            if !order.active {
                return Err(Error::NotCancellable);
            }
            order.matched_with
        };
        if let Some(peer_id) = peer {
            if let Some(peer) = self.swaps.get_mut(&peer_id) {
                peer.matched_with = None;
                peer.failed_cycles = 0;
            }
        }
        let order = self.swaps.get_mut(&id).expect("checked above");
        order.active = false;
        order.matched_with = None;
        Ok(())
    }

    pub fn swap(&self, id: SwapId) -> Option<&SwapOrder> {
        self.swaps.get(&id)
    }

    pub fn swap_mut(&mut self, id: SwapId) -> Option<&mut SwapOrder> {
        self.swaps.get_mut(&id)
    }

    pub fn active_swaps(&self) -> impl Iterator<Item = &SwapOrder> {
        self.active_swaps
            .iter()
            .filter_map(move |id| self.swaps.get(id))
            .filter(|s| s.active)
    }

    // -- Preference configuration -----------------------------------------

    pub fn configure_accepted(
        &mut self,
        participant: Participant,
        accepted: Vec<TokenId>,
        preferred: TokenId,
    ) -> Result<(), ConfigError> {
        let config = UserConfig::configure_accepted(accepted, preferred)?;
        self.configs.insert(participant, config);
        Ok(())
    }

    pub fn configure_ranked(
        &mut self,
        participant: Participant,
        accepted: Vec<TokenId>,
        ranked: Vec<TokenId>,
    ) -> Result<(), ConfigError> {
        let config = UserConfig::configure_ranked(accepted, ranked)?;
        self.configs.insert(participant, config);
        Ok(())
    }

    pub fn config_of(&self, participant: Participant) -> Option<&UserConfig> {
        self.configs.get(&participant)
    }

    /// Remove inactive entries from the active-id lists. Called once at the
    /// end of each settlement cycle (§6: "Active-id lists maintain set
    /// membership with O(1) append and O(n) compaction after each cycle").
    pub fn compact(&mut self) {
        let dvp_orders = &self.dvp_orders;
        self.active_dvp
            .retain(|id| dvp_orders.get(id).is_some_and(|o| o.active));
        let payments = &self.payments;
        self.active_payments
            .retain(|id| payments.get(id).is_some_and(|p| p.active));
        let swaps = &self.swaps;
        self.active_swaps
            .retain(|id| swaps.get(id).is_some_and(|s| s.active));
    }
}

fn validate_counterparty(maker: Participant, counterparty: Participant) -> Result<(), Error> {
    if maker == counterparty {
        return Err(Error::SelfCounterparty);
    }
    Ok(())
}

fn validate_positive(amount: Amount) -> Result<(), Error> {
    if amount.is_zero() {
        return Err(Error::NonPositiveAmount);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("counterparty must differ from the submitter")]
    SelfCounterparty,
    #[error("amount/price must be positive")]
    NonPositiveAmount,
    #[error("sell terms for this payment token already exist at a different price")]
    TermsMismatch,
    #[error("no such record")]
    NotFound,
    #[error("record is not in a cancellable state (inactive or locked)")]
    NotCancellable,
    #[error("accept_payment arguments do not match the payment request")]
    PaymentMismatch,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;

    fn user(byte: u8) -> Participant {
        Participant(Address::repeat_byte(byte))
    }

    fn token(byte: u8) -> TokenId {
        TokenId(Address::repeat_byte(byte))
    }

    fn asset() -> AssetRef {
        AssetRef {
            collection: clearing_types::Collection(Address::repeat_byte(0xaa)),
            token_id: 0,
        }
    }

    #[test]
    fn buy_accrues_sell_terms() {
        let mut reg = Registry::new();
        let u0 = user(1);
        let u1 = user(2);
        reg.submit_sell(u0, asset(), u1, Amount(100)).unwrap();
        reg.submit_buy(u1, asset(), token(9), Amount(100), u0)
            .unwrap();

        let sell_id = reg.active_dvp_orders().find(|o| o.maker == u0).unwrap().id;
        assert_eq!(
            reg.dvp_order(sell_id).unwrap().sell_terms().price_for(token(9)),
            Some(Amount(100))
        );
    }

    #[test]
    fn conflicting_buy_price_is_rejected() {
        let mut reg = Registry::new();
        let u0 = user(1);
        let u1 = user(2);
        reg.submit_sell(u0, asset(), u1, Amount(100)).unwrap();
        reg.submit_buy(u1, asset(), token(9), Amount(100), u0)
            .unwrap();
        let err = reg
            .submit_buy(u1, asset(), token(9), Amount(200), u0)
            .unwrap_err();
        assert_eq!(err, Error::TermsMismatch);
    }

    #[test]
    fn cancel_matched_dvp_severs_pairing_and_resets_peer_counter() {
        let mut reg = Registry::new();
        let u0 = user(1);
        let u1 = user(2);
        let sell = reg.submit_sell(u0, asset(), u1, Amount(100)).unwrap();
        let buy = reg
            .submit_buy(u1, asset(), token(9), Amount(100), u0)
            .unwrap();
        reg.dvp_order_mut(sell).unwrap().matched_with = Some(buy);
        reg.dvp_order_mut(buy).unwrap().matched_with = Some(sell);
        reg.dvp_order_mut(buy).unwrap().failed_cycles = 1;

        reg.cancel_dvp(sell).unwrap();

        assert!(!reg.dvp_order(sell).unwrap().active);
        assert_eq!(reg.dvp_order(buy).unwrap().matched_with, None);
        assert_eq!(reg.dvp_order(buy).unwrap().failed_cycles, 0);
    }

    #[test]
    fn cannot_cancel_locked_order() {
        let mut reg = Registry::new();
        let u0 = user(1);
        let u1 = user(2);
        let sell = reg.submit_sell(u0, asset(), u1, Amount(100)).unwrap();
        reg.dvp_order_mut(sell).unwrap().locked = true;
        assert_eq!(reg.cancel_dvp(sell).unwrap_err(), Error::NotCancellable);
    }

    #[test]
    fn compact_drops_inactive_ids() {
        let mut reg = Registry::new();
        let u0 = user(1);
        let u1 = user(2);
        let sell = reg.submit_sell(u0, asset(), u1, Amount(100)).unwrap();
        reg.cancel_dvp(sell).unwrap();
        reg.compact();
        assert_eq!(reg.active_dvp_orders().count(), 0);
    }
}
