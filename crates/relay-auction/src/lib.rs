pub mod api;
pub mod arguments;
pub mod eligibility;
pub mod error;
pub mod orchestrator;
pub mod round;
pub mod run;
pub mod shutdown_controller;

pub use {
    error::Error,
    orchestrator::RoundOrchestrator,
    round::AuctionRound,
    run::{run, start},
};
