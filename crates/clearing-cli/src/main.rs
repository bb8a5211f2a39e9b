mod cli;

use alloy_primitives::Address;
use clap::Parser;
use clearing_engine::config::EngineConfig;
use clearing_engine::engine::{Engine, Error};
use clearing_engine::testing::{InMemoryAssets, InMemoryClock, InMemoryLedger};
use clearing_types::{Amount, AssetRef, Bps, Collection, Participant, Timestamp, TokenId};

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt().with_env_filter(args.log_filter.clone()).init();
    run(args)
}

/// Seeds a small multilateral scenario — one DvP pair, one payment, one
/// swap pair — and drives `cycles` settlement attempts against it, logging
/// every emitted event. Demonstrates the wiring a production host would do
/// around [`Engine`]; it is not itself a long-running service.
fn run(args: cli::Args) -> anyhow::Result<()> {
    let u0 = user(1);
    let u1 = user(2);
    let u2 = user(3);
    let t1 = token(1);
    let t2 = token(2);

    const UNIT: u128 = 1_000_000_000_000_000_000;

    let mut ledger = InMemoryLedger::default();
    ledger.set_balance(u0, t1, Amount(10 * UNIT));
    ledger.set_allowance(u0, t1, Amount(10 * UNIT));
    ledger.set_balance(u1, t1, Amount(10 * UNIT));
    ledger.set_allowance(u1, t1, Amount(10 * UNIT));
    ledger.set_balance(u0, t2, Amount(10 * UNIT));
    ledger.set_allowance(u0, t2, Amount(10 * UNIT));
    ledger.set_balance(u2, t2, Amount(10 * UNIT));
    ledger.set_allowance(u2, t2, Amount(10 * UNIT));

    let mut assets = InMemoryAssets::default();
    let asset_ref = AssetRef {
        collection: Collection(Address::repeat_byte(0xaa)),
        token_id: 0,
    };
    assets.set_owner(asset_ref, u0);

    let clock = InMemoryClock::new(Timestamp(0));
    let clock_handle = clock.clone();
    let config = EngineConfig {
        settlement_interval_secs: args.settlement_interval.as_secs(),
        stake_bps: Bps(args.stake_bps),
        ..EngineConfig::default()
    };

    let mut engine = Engine::new(ledger, assets, clock, custody_account(), config);

    engine.configure_accepted(u0, vec![t1, t2], t1)?;
    engine.configure_accepted(u1, vec![t1], t1)?;
    engine.configure_accepted(u2, vec![t2], t2)?;

    // U0 sells the asset to U1 for 1 unit of T1.
    engine.submit_sell(u0, asset_ref, u1, Amount(UNIT))?;
    engine.submit_buy(u1, asset_ref, t1, Amount(UNIT), u0)?;
    engine.match_dvp();

    // U0 pays U2 a small amount in T2, and a swap pair runs the other way.
    let payment = engine.create_payment(u0, u2, Amount(UNIT / 10), t2)?;
    engine.accept_payment(payment, u0, Amount(UNIT / 10))?;

    engine.submit_swap(u1, t1, Amount(UNIT / 2), t2, Amount(UNIT / 2))?;
    engine.submit_swap(u2, t2, Amount(UNIT / 2), t1, Amount(UNIT / 2))?;
    engine.match_swaps();

    for cycle in 0..args.cycles {
        clock_handle.advance(args.settlement_interval.as_secs());
        tracing::info!(cycle, "attempting settlement");
        match engine.perform_settlement() {
            Ok(outcome) => tracing::info!(cycle, succeeded = outcome.succeeded, "settlement attempt finished"),
            Err(Error::Cycle(clearing_engine::cycle::Error::TooEarly)) => {
                tracing::info!(cycle, "too early, will retry next cycle");
            }
            Err(err) => return Err(err.into()),
        }
    }

    Ok(())
}

fn user(byte: u8) -> Participant {
    Participant(Address::repeat_byte(byte))
}

fn token(byte: u8) -> TokenId {
    TokenId(Address::repeat_byte(byte))
}

fn custody_account() -> Participant {
    Participant(Address::repeat_byte(0xff))
}
