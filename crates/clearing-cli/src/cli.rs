use std::time::Duration;

#[derive(Debug, clap::Parser)]
pub struct Args {
    /// Log filter passed straight to `tracing_subscriber::EnvFilter`.
    #[clap(long, env, default_value = "info")]
    pub log_filter: String,

    /// Required stake as a fraction of gross outgoing, in basis points.
    #[clap(long, env, default_value_t = 2000)]
    pub stake_bps: u16,

    /// Minimum number of seconds between settlement cycles.
    #[clap(long, env, value_parser = humantime::parse_duration, default_value = "5min")]
    pub settlement_interval: Duration,

    /// Number of settlement cycles the demo harness should attempt.
    #[clap(long, env, default_value_t = 3)]
    pub cycles: u32,
}
