//! Core clearing and settlement engine: a single-threaded state machine
//! that periodically reconciles Delivery-versus-Payment trades, payment
//! requests, and Payment-versus-Payment swaps against a shared pool of
//! fungible value tokens, via multilateral netting with defaulter
//! isolation and re-netting.
//!
//! External collaborators — the fungible ledger, non-fungible asset
//! custody, and the clock — are narrow trait ports (see [`ports`]); the
//! engine never talks to a chain or any other network primitive directly.

pub mod config;
pub mod custody;
pub mod cycle;
pub mod engine;
pub mod events;
pub mod failure;
pub mod matcher;
pub mod netter;
pub mod obligation;
pub mod ports;
pub mod registry;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::EngineConfig;
pub use engine::{Engine, Error};
pub use events::{Event, FailureReason};
