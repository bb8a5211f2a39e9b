//! In-memory adapters for the [`crate::ports`] traits, used by this crate's
//! own unit tests, integration tests, and the demo CLI. Plays the role the
//! teacher's mock/test-double adapters play for `blockchain::Ethereum`: a
//! deterministic stand-in for the real external primitives, never shipped
//! behind anything but `#[cfg(test)]`/an explicit demo binary dependency.

use crate::ports::{AssetCustody, Clock, Ledger, TransferError};
use clearing_types::{Address, Amount, Participant, Timestamp, TokenId};
use std::cell::Cell;
use std::collections::HashMap;

/// A fungible ledger held entirely in memory: balances plus allowances the
/// engine's custody account has been granted.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLedger {
    balances: HashMap<(Participant, TokenId), Amount>,
    allowances: HashMap<(Participant, TokenId), Amount>,
}

impl InMemoryLedger {
    pub fn set_balance(&mut self, owner: Participant, token: TokenId, amount: Amount) {
        self.balances.insert((owner, token), amount);
    }

    pub fn set_allowance(&mut self, owner: Participant, token: TokenId, amount: Amount) {
        self.allowances.insert((owner, token), amount);
    }
}

impl Ledger for InMemoryLedger {
    fn transfer_from(&mut self, owner: Participant, amount: Amount, token: TokenId) -> Result<(), TransferError> {
        if amount.is_zero() {
            return Ok(());
        }
        let balance = self.balances.get(&(owner, token)).copied().unwrap_or(Amount::ZERO);
        let allowance = self.allowances.get(&(owner, token)).copied().unwrap_or(Amount::ZERO);
        if balance < amount || allowance < amount {
            return Err(TransferError);
        }
        self.balances.insert((owner, token), balance.checked_sub(amount).unwrap());
        self.allowances
            .insert((owner, token), allowance.checked_sub(amount).unwrap());
        Ok(())
    }

    fn transfer_to(&mut self, recipient: Participant, amount: Amount, token: TokenId) -> Result<(), TransferError> {
        if amount.is_zero() {
            return Ok(());
        }
        let balance = self.balances.get(&(recipient, token)).copied().unwrap_or(Amount::ZERO);
        self.balances.insert(
            (recipient, token),
            balance.checked_add(amount).ok_or(TransferError)?,
        );
        Ok(())
    }

    fn balance_of(&self, owner: Participant, token: TokenId) -> Amount {
        self.balances.get(&(owner, token)).copied().unwrap_or(Amount::ZERO)
    }

    fn allowance_of(&self, owner: Participant, token: TokenId) -> Amount {
        self.allowances.get(&(owner, token)).copied().unwrap_or(Amount::ZERO)
    }
}

/// Non-fungible asset custody, keyed by `(collection, token_id)`.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAssets {
    owners: HashMap<(Address, u64), Participant>,
}

impl InMemoryAssets {
    pub fn set_owner(&mut self, asset: clearing_types::AssetRef, owner: Participant) {
        self.owners.insert((asset.collection.0, asset.token_id), owner);
    }
}

impl AssetCustody for InMemoryAssets {
    fn asset_transfer(
        &mut self,
        from: Participant,
        to: Participant,
        asset: Address,
        token_id: u64,
    ) -> Result<(), TransferError> {
        match self.owners.get(&(asset, token_id)) {
            Some(&owner) if owner == from => {
                self.owners.insert((asset, token_id), to);
                Ok(())
            }
            _ => Err(TransferError),
        }
    }

    fn owner_of(&self, asset: Address, token_id: u64) -> Option<Participant> {
        self.owners.get(&(asset, token_id)).copied()
    }
}

/// A manually-advanced clock, so settlement cycles are reproducible.
///
/// Shares its reading through an `Rc` so a caller can hold a handle to
/// advance time from outside the [`crate::engine::Engine`] that owns the
/// other end of the clone.
#[derive(Debug, Clone)]
pub struct InMemoryClock {
    now: std::rc::Rc<Cell<Timestamp>>,
}

impl InMemoryClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: std::rc::Rc::new(Cell::new(now)),
        }
    }

    pub fn advance(&self, secs: u64) {
        let current = self.now.get();
        self.now.set(
            current
                .checked_add_secs(secs)
                .expect("clock overflow in test double"),
        );
    }

    pub fn set(&self, now: Timestamp) {
        self.now.set(now);
    }
}

impl Clock for InMemoryClock {
    fn now(&self) -> Timestamp {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(byte: u8) -> Participant {
        Participant(Address::repeat_byte(byte))
    }

    fn token(byte: u8) -> TokenId {
        TokenId(Address::repeat_byte(byte))
    }

    #[test]
    fn transfer_from_requires_balance_and_allowance() {
        let mut ledger = InMemoryLedger::default();
        let u0 = user(1);
        let t1 = token(1);
        ledger.set_balance(u0, t1, Amount(50));
        ledger.set_allowance(u0, t1, Amount(10));
        assert_eq!(ledger.transfer_from(u0, Amount(20), t1), Err(TransferError));
        assert_eq!(ledger.transfer_from(u0, Amount(10), t1), Ok(()));
        assert_eq!(ledger.balance_of(u0, t1), Amount(40));
        assert_eq!(ledger.allowance_of(u0, t1), Amount::ZERO);
    }

    #[test]
    fn asset_transfer_requires_current_owner() {
        let mut assets = InMemoryAssets::default();
        let u0 = user(1);
        let u1 = user(2);
        let asset_ref = clearing_types::AssetRef {
            collection: clearing_types::Collection(Address::repeat_byte(0xaa)),
            token_id: 0,
        };
        assets.set_owner(asset_ref, u0);
        assert_eq!(
            assets.asset_transfer(u1, u0, asset_ref.collection.0, 0),
            Err(TransferError)
        );
        assert_eq!(assets.asset_transfer(u0, u1, asset_ref.collection.0, 0), Ok(()));
        assert_eq!(assets.owner_of(asset_ref.collection.0, 0), Some(u1));
    }
}
