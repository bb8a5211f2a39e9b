use clearing_types::{Amount, AssetRef, DvpOrderId, Participant, TokenId};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

/// A sell order's accrued acceptable-payment terms, written to by compatible
/// buy submissions (see [`super::Registry::submit_buy`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SellTerms(HashMap<TokenId, Amount>);

impl SellTerms {
    pub fn price_for(&self, token: TokenId) -> Option<Amount> {
        self.0.get(&token).copied()
    }

    fn record(&mut self, token: TokenId, price: Amount) {
        self.0.insert(token, price);
    }
}

/// A Delivery-versus-Payment order: either side of a unique-asset-for-
/// fungible-payment trade.
///
/// Invariant: `locked` implies `active`; only a sell order is ever locked.
#[derive(Debug, Clone)]
pub struct DvPOrder {
    pub id: DvpOrderId,
    pub maker: Participant,
    pub side: Side,
    pub asset: AssetRef,
    /// Required, and must differ from `maker`.
    pub counterparty: Participant,
    /// `Some` only for `Side::Buy`.
    pub payment_token: Option<TokenId>,
    pub price: Amount,
    pub active: bool,
    pub locked: bool,
    pub failed_cycles: u32,
    pub matched_with: Option<DvpOrderId>,
    sell_terms: SellTerms,
}

impl DvPOrder {
    pub fn new_buy(
        id: DvpOrderId,
        maker: Participant,
        asset: AssetRef,
        payment_token: TokenId,
        price: Amount,
        counterparty: Participant,
    ) -> Self {
        Self {
            id,
            maker,
            side: Side::Buy,
            asset,
            counterparty,
            payment_token: Some(payment_token),
            price,
            active: true,
            locked: false,
            failed_cycles: 0,
            matched_with: None,
            sell_terms: SellTerms::default(),
        }
    }

    pub fn new_sell(
        id: DvpOrderId,
        maker: Participant,
        asset: AssetRef,
        counterparty: Participant,
        price: Amount,
    ) -> Self {
        Self {
            id,
            maker,
            side: Side::Sell,
            asset,
            counterparty,
            payment_token: None,
            price,
            active: true,
            locked: false,
            failed_cycles: 0,
            matched_with: None,
            sell_terms: SellTerms::default(),
        }
    }

    pub fn sell_terms(&self) -> &SellTerms {
        &self.sell_terms
    }

    pub(crate) fn record_term(&mut self, token: TokenId, price: Amount) {
        self.sell_terms.record(token, price);
    }

    pub fn is_matched(&self) -> bool {
        self.matched_with.is_some()
    }
}
