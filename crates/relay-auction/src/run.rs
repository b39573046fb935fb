use {
    crate::{
        api::Api,
        arguments::Arguments,
        eligibility::{AlwaysRegistered, EligibilityPolicy},
        orchestrator::{self, RoundOrchestrator},
        shutdown_controller::ShutdownController,
    },
    anyhow::{Context, Result},
    clap::Parser,
    model::SignedBid,
    observe::tracing::LogFormat,
    std::sync::Arc,
    tokio::sync::mpsc,
};

pub async fn start(args: impl Iterator<Item = String>) {
    let args = Arguments::parse_from(args);
    observe::tracing::initialize(&observe::tracing::Config {
        env_filter: args.log_filter.clone(),
        stderr_threshold: args.log_stderr_threshold,
        format: if args.use_json_logs {
            LogFormat::Json
        } else {
            LogFormat::Text
        },
    });
    if let Err(err) = observe::metrics::setup_registry(Some("relay_auction".into())) {
        tracing::warn!(?err, "failed to set up metrics registry");
    }
    tracing::info!("running relay auction with validated arguments:\n{}", args);

    if let Err(err) = run(args).await {
        tracing::error!(?err, "relay auction stopped");
        std::process::exit(1);
    }
}

/// Runs auction rounds until SIGINT or SIGTERM.
pub async fn run(args: Arguments) -> Result<()> {
    if args.relay_allow_list.is_empty() {
        tracing::warn!("relay allow-list is empty, no bid can win");
    }
    let policy = Arc::new(EligibilityPolicy::new(
        args.relay_allow_list,
        Arc::new(AlwaysRegistered),
    ));
    let (orchestrator, winners) = RoundOrchestrator::new(
        orchestrator::Config {
            bidding_period: args.bidding_period,
            grace_period: args.outcome_grace_period,
            bid_queue_capacity: args.bid_queue_capacity,
        },
        policy,
    );
    let orchestrator = Arc::new(orchestrator);

    let provider = ethrpc::provider(&args.node_url);
    let blocks =
        ethrpc::block_stream::current_block_stream(Arc::new(provider), args.block_poll_interval)
            .await
            .context("failed to fetch the current block")?;
    tracing::info!(block = blocks.borrow().number, "waiting for the next block");

    let shutdown = ShutdownController::new_shutdown_on_signal();
    let api = tokio::spawn({
        let mut shutdown = shutdown.clone();
        Api {
            addr: args.api_address,
            orchestrator: orchestrator.clone(),
        }
        .serve(async move { shutdown.wait().await })
    });
    tokio::spawn(settle(winners));

    orchestrator
        .run(ethrpc::block_stream::cadence(blocks), shutdown)
        .await
        .context("auction rounds failed")?;

    api.await
        .context("API task panicked")?
        .context("API server failed")?;
    Ok(())
}

/// Hands winning bids to the settlement layer.
async fn settle(mut winners: mpsc::Receiver<SignedBid>) {
    while let Some(winner) = winners.recv().await {
        tracing::info!(
            block = winner.l1_block(),
            address = ?winner.address(),
            amount = %winner.amount_wei(),
            bid = %winner.encode(),
            "relay won the auction"
        );
    }
}
