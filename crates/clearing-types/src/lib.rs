//! Shared value types for the clearing engine: addresses, token and asset
//! identifiers, and the fixed-point amount newtypes used throughout
//! `clearing-engine`.
//!
//! Mirrors the `eth`-domain newtype style used elsewhere in this codebase
//! (`Address`/`TokenAddress`/`TokenAmount` wrappers around a primitive with
//! `derive_more::{From, Into}`), generalized away from any one chain: the
//! engine does not itself talk to a blockchain, it only needs stable,
//! comparable identifiers for participants, fungible tokens and non-fungible
//! assets.

use derive_more::{Display, From, Into};
use std::fmt;

pub use alloy_primitives::Address;

/// A clearing-house participant, identified by an opaque address.
///
/// The same underlying [`Address`] type is reused for participants, tokens
/// and NFT collections: they are distinguished by the newtype wrapping them,
/// not by any difference in the underlying bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct Participant(pub Address);

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// An accepted fungible value token. All tokens the engine is configured to
/// accept are treated as unit-equivalent for netting purposes; this type
/// only distinguishes *which* token a balance or transfer refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct TokenId(pub Address);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// The NFT collection (contract) a [`AssetRef`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct Collection(pub Address);

/// A reference to a specific non-fungible asset: a collection plus a
/// within-collection token id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetRef {
    pub collection: Collection,
    pub token_id: u64,
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}:{}", self.collection.0, self.token_id)
    }
}

/// A non-negative fungible amount, denominated in the fixed 18-decimal
/// integer base the engine uses throughout (`"$1" == 10^18`). The engine
/// performs no unit conversion; callers are responsible for scaling into
/// this base before submission.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into, Display,
)]
pub struct Amount(pub u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    pub fn saturating_sub(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_sub(rhs.0))
    }

    pub fn min(self, rhs: Amount) -> Amount {
        Amount(self.0.min(rhs.0))
    }
}

/// A signed fungible amount: the unit of per-token balances and
/// unit-equivalent aggregates, which may be owed (negative) or due
/// (positive).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, From, Into, Display)]
pub struct SignedAmount(pub i128);

impl SignedAmount {
    pub const ZERO: SignedAmount = SignedAmount(0);

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: SignedAmount) -> Option<SignedAmount> {
        self.0.checked_add(rhs.0).map(SignedAmount)
    }

    pub fn checked_sub(self, rhs: SignedAmount) -> Option<SignedAmount> {
        self.0.checked_sub(rhs.0).map(SignedAmount)
    }
}

impl From<Amount> for SignedAmount {
    fn from(value: Amount) -> Self {
        // Amounts in this engine are bounded well within i128 range (18
        // decimals of fixed-point on realistic participant balances), so
        // this conversion never actually fails; callers dealing with
        // adversarial input should prefer `checked_add`/`checked_sub` on the
        // resulting `SignedAmount` to catch overflow rather than relying on
        // this panicking.
        SignedAmount(i128::try_from(value.0).expect("amount exceeds i128::MAX: invariant violation"))
    }
}

impl std::ops::Neg for SignedAmount {
    type Output = SignedAmount;

    fn neg(self) -> Self::Output {
        SignedAmount(-self.0)
    }
}

/// A monotonic clock reading, expressed in seconds. Injected rather than
/// read from the OS so that settlement cycles are reproducible in tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into, Display)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn checked_add_secs(self, secs: u64) -> Option<Timestamp> {
        self.0.checked_add(secs).map(Timestamp)
    }
}

/// Basis points, used for the stake ratio (`STAKE_BPS`). One basis point is
/// `1 / 10_000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, From, Into, Display)]
pub struct Bps(pub u16);

impl Bps {
    /// `amount * self / 10_000`, floored.
    pub fn of(self, amount: Amount) -> Amount {
        Amount((amount.0 * self.0 as u128) / 10_000)
    }
}

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into, Display)]
        pub struct $name(pub u64);
    };
}

typed_id!(DvpOrderId);
typed_id!(PaymentId);
typed_id!(SwapId);
