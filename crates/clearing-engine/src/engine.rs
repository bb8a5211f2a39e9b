//! Top-level engine: wires the [`Registry`], the settlement [`cycle`], and
//! the external ports together behind one non-reentrant entry point.
//!
//! The crate-level invariant this module owns: "strictly single-threaded
//! and non-reentrant" (§5). There is no concurrent access to defend
//! against — the guard exists purely to catch a reentrant call made from
//! within a custody callback, the same shape as the teacher's single-owner
//! driver structs rather than an `Arc<Mutex<_>>` shared-state design.

use crate::config::EngineConfig;
use crate::cycle::{self, SettlementOutcome};
use crate::events::Event;
use crate::matcher;
use crate::ports::{AssetCustody, Clock, Ledger};
use crate::registry::{self, ConfigError, DvPOrder, PaymentRequest, Registry, SwapOrder, UserConfig};
use clearing_types::{Amount, AssetRef, DvpOrderId, Participant, PaymentId, SwapId, TokenId};
use std::cell::Cell;
use std::collections::HashMap;

/// State that outlives a single settlement cycle.
#[derive(Debug, Default)]
struct Persistent {
    registry: Registry,
    last_settlement: Option<clearing_types::Timestamp>,
    /// Undistributed residue from floor-division and forfeited stake with
    /// no surviving eligible participant to receive it, carried forward
    /// across cycles rather than stranded (§9 open question).
    reserve: HashMap<TokenId, Amount>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] registry::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Cycle(#[from] cycle::Error),
    #[error("perform_settlement called reentrantly from within a custody callback")]
    Reentrant,
}

pub struct Engine<L, A, C> {
    ledger: L,
    assets: A,
    clock: C,
    custody_account: Participant,
    config: EngineConfig,
    persistent: Persistent,
    in_call: Cell<bool>,
}

impl<L: Ledger, A: AssetCustody, C: Clock> Engine<L, A, C> {
    pub fn new(ledger: L, assets: A, clock: C, custody_account: Participant, config: EngineConfig) -> Self {
        Self {
            ledger,
            assets,
            clock,
            custody_account,
            config,
            persistent: Persistent::default(),
            in_call: Cell::new(false),
        }
    }

    fn enter(&self) -> Result<(), Error> {
        if self.in_call.replace(true) {
            return Err(Error::Reentrant);
        }
        Ok(())
    }

    fn exit(&self) {
        self.in_call.set(false);
    }

    /// Runs one settlement cycle at `self.clock.now()`. Guarded against
    /// reentrancy and against running before `SETTLEMENT_INTERVAL` has
    /// elapsed since the previous call (§4.4 Phase P0).
    pub fn perform_settlement(&mut self) -> Result<SettlementOutcome, Error> {
        self.enter()?;
        let now = self.clock.now();
        let outcome = cycle::run(
            &mut self.persistent.registry,
            &mut self.ledger,
            &mut self.assets,
            self.custody_account,
            &self.config,
            &mut self.persistent.reserve,
            &mut self.persistent.last_settlement,
            now,
        );
        self.exit();
        for event in outcome.as_ref().map(|o| o.events.as_slice()).unwrap_or(&[]) {
            crate::events::emit(event);
        }
        Ok(outcome?)
    }

    pub fn match_dvp(&mut self) {
        for event in matcher::match_dvp(&mut self.persistent.registry) {
            crate::events::emit(&event);
        }
    }

    pub fn match_swaps(&mut self) {
        for event in matcher::match_swaps(&mut self.persistent.registry) {
            crate::events::emit(&event);
        }
    }

    pub fn reserve_of(&self, token: TokenId) -> Amount {
        self.persistent.reserve.get(&token).copied().unwrap_or(Amount::ZERO)
    }

    /// Read-only access to the injected ledger, asset custody, and clock,
    /// for callers (and tests) that need to inspect state the mutation
    /// surface doesn't otherwise expose.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn assets(&self) -> &A {
        &self.assets
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    // -- Registry delegation (§6 mutation surface) -------------------------

    pub fn submit_sell(
        &mut self,
        maker: Participant,
        asset: AssetRef,
        counterparty: Participant,
        price: Amount,
    ) -> Result<DvpOrderId, Error> {
        let id = self.persistent.registry.submit_sell(maker, asset, counterparty, price)?;
        crate::events::emit(&Event::OrderPlaced(id));
        Ok(id)
    }

    pub fn submit_buy(
        &mut self,
        maker: Participant,
        asset: AssetRef,
        payment_token: TokenId,
        price: Amount,
        counterparty: Participant,
    ) -> Result<DvpOrderId, Error> {
        let id = self
            .persistent
            .registry
            .submit_buy(maker, asset, payment_token, price, counterparty)?;
        crate::events::emit(&Event::OrderPlaced(id));
        Ok(id)
    }

    pub fn cancel_dvp(&mut self, id: DvpOrderId) -> Result<(), Error> {
        Ok(self.persistent.registry.cancel_dvp(id)?)
    }

    pub fn dvp_order(&self, id: DvpOrderId) -> Option<&DvPOrder> {
        self.persistent.registry.dvp_order(id)
    }

    pub fn create_payment(
        &mut self,
        sender: Participant,
        recipient: Participant,
        amount: Amount,
        token: TokenId,
    ) -> Result<PaymentId, Error> {
        Ok(self.persistent.registry.create_payment(sender, recipient, amount, token)?)
    }

    pub fn accept_payment(
        &mut self,
        id: PaymentId,
        expected_sender: Participant,
        expected_amount: Amount,
    ) -> Result<(), Error> {
        self.persistent.registry.accept_payment(id, expected_sender, expected_amount)?;
        crate::events::emit(&Event::PaymentAccepted(id));
        Ok(())
    }

    pub fn cancel_payment(&mut self, id: PaymentId) -> Result<(), Error> {
        Ok(self.persistent.registry.cancel_payment(id)?)
    }

    pub fn payment(&self, id: PaymentId) -> Option<&PaymentRequest> {
        self.persistent.registry.payment(id)
    }

    pub fn submit_swap(
        &mut self,
        maker: Participant,
        send_token: TokenId,
        send_amount: Amount,
        receive_token: TokenId,
        receive_amount: Amount,
    ) -> Result<SwapId, Error> {
        Ok(self
            .persistent
            .registry
            .submit_swap(maker, send_token, send_amount, receive_token, receive_amount)?)
    }

    pub fn cancel_swap(&mut self, id: SwapId) -> Result<(), Error> {
        Ok(self.persistent.registry.cancel_swap(id)?)
    }

    pub fn swap(&self, id: SwapId) -> Option<&SwapOrder> {
        self.persistent.registry.swap(id)
    }

    pub fn configure_accepted(
        &mut self,
        participant: Participant,
        accepted: Vec<TokenId>,
        preferred: TokenId,
    ) -> Result<(), Error> {
        Ok(self.persistent.registry.configure_accepted(participant, accepted, preferred)?)
    }

    pub fn configure_ranked(
        &mut self,
        participant: Participant,
        accepted: Vec<TokenId>,
        ranked: Vec<TokenId>,
    ) -> Result<(), Error> {
        Ok(self.persistent.registry.configure_ranked(participant, accepted, ranked)?)
    }

    pub fn config_of(&self, participant: Participant) -> Option<&UserConfig> {
        self.persistent.registry.config_of(participant)
    }
}
