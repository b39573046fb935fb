use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The round did not produce an outcome within the bidding period plus
    /// the grace period. Rounds always close on their own so this is a bug.
    #[error("round for block {block} produced no outcome within {waited:?}")]
    RoundTimeoutViolation { block: u64, waited: Duration },
    /// The round task went away without an outcome although no shutdown was
    /// requested.
    #[error("round for block {block} was abandoned without a shutdown")]
    RoundAbandoned { block: u64 },
    #[error("cadence signal unavailable: {0:#}")]
    UpstreamUnavailable(anyhow::Error),
    #[error("no auction round is active")]
    NoActiveRound,
    #[error("auction round was already started")]
    AlreadyStarted,
}
