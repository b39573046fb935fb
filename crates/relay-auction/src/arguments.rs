use {
    alloy::primitives::Address,
    std::{
        fmt::{self, Display, Formatter},
        net::SocketAddr,
        num::NonZeroUsize,
        time::Duration,
    },
    tracing::level_filters::LevelFilter,
    url::Url,
};

#[derive(clap::Parser)]
pub struct Arguments {
    #[clap(long, env, default_value = "warn,relay_auction=debug,ethrpc=info")]
    pub log_filter: String,

    #[clap(long, env, default_value = "error")]
    pub log_stderr_threshold: LevelFilter,

    /// Emit logs as JSON objects instead of human readable lines.
    #[clap(long, env, action = clap::ArgAction::Set, default_value = "false")]
    pub use_json_logs: bool,

    /// The L1 node whose blocks pace the auction rounds.
    #[clap(long, env, default_value = "http://localhost:8545")]
    pub node_url: Url,

    /// How often the node gets polled for a new block.
    #[clap(long, env, default_value = "200ms", value_parser = humantime::parse_duration)]
    pub block_poll_interval: Duration,

    /// How long a round accepts bids.
    #[clap(long, env, default_value = "5s", value_parser = humantime::parse_duration)]
    pub bidding_period: Duration,

    /// How long after the bidding period a round may take to report its
    /// outcome before the process gives up.
    #[clap(long, env, default_value = "1s", value_parser = humantime::parse_duration)]
    pub outcome_grace_period: Duration,

    /// Number of submitted bids a round buffers before submitters have to
    /// wait.
    #[clap(long, env, default_value = "10")]
    pub bid_queue_capacity: NonZeroUsize,

    /// Relays that may take part in auctions.
    #[clap(long, env, use_value_delimiter = true)]
    pub relay_allow_list: Vec<Address>,

    #[clap(long, env, default_value = "0.0.0.0:8080")]
    pub api_address: SocketAddr,
}

impl Display for Arguments {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let Self {
            log_filter,
            log_stderr_threshold,
            use_json_logs,
            node_url,
            block_poll_interval,
            bidding_period,
            outcome_grace_period,
            bid_queue_capacity,
            relay_allow_list,
            api_address,
        } = self;

        writeln!(f, "log_filter: {log_filter}")?;
        writeln!(f, "log_stderr_threshold: {log_stderr_threshold}")?;
        writeln!(f, "use_json_logs: {use_json_logs}")?;
        // Node urls often embed API keys.
        writeln!(f, "node_url: {}", redact(node_url))?;
        writeln!(f, "block_poll_interval: {block_poll_interval:?}")?;
        writeln!(f, "bidding_period: {bidding_period:?}")?;
        writeln!(f, "outcome_grace_period: {outcome_grace_period:?}")?;
        writeln!(f, "bid_queue_capacity: {bid_queue_capacity}")?;
        display_list(f, "relay_allow_list", relay_allow_list)?;
        writeln!(f, "api_address: {api_address}")?;
        Ok(())
    }
}

/// Keeps scheme, host and port but hides credentials, path and query.
fn redact(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{host}:{port}/SECRET", url.scheme()),
        None => format!("{}://{host}/SECRET", url.scheme()),
    }
}

fn display_list<T>(
    f: &mut Formatter<'_>,
    name: &str,
    iter: impl IntoIterator<Item = T>,
) -> fmt::Result
where
    T: Display,
{
    write!(f, "{name}: [")?;
    for (i, t) in iter.into_iter().enumerate() {
        if i != 0 {
            f.write_str(", ")?;
        }
        write!(f, "{t}")?;
    }
    writeln!(f, "]")
}
