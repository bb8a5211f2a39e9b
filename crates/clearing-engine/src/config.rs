//! Engine-wide constants, exposed as an overridable config struct rather
//! than bare consts so tests can shrink the settlement interval and so a
//! production binary can wire them from its own configuration surface,
//! while the defaults match the contracts in §6 exactly.

use clearing_types::Bps;

/// `SETTLEMENT_INTERVAL`, `MAX_FAILED_CYCLES`, and `STAKE_BPS` are
/// contracts, not tunables, per the design notes — the `Default` impl is
/// the only value any deployment should use. The struct form exists so
/// tests can construct a config with a shorter interval without touching
/// engine internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Minimum number of seconds between successive settlement cycles.
    pub settlement_interval_secs: u64,
    /// A record expires once its `failed_cycles` counter reaches this.
    pub max_failed_cycles: u32,
    /// Required stake as a fraction of gross outgoing.
    pub stake_bps: Bps,
    /// Upper bound on P3-P5 re-net attempts per cycle before global abort.
    pub max_renet_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settlement_interval_secs: 5 * 60,
            max_failed_cycles: 2,
            stake_bps: Bps(2000),
            max_renet_attempts: 3,
        }
    }
}
