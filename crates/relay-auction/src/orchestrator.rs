use {
    crate::{
        eligibility::EligibilityPolicy,
        error::Error,
        round::{AuctionRound, RoundAbandoned},
        shutdown_controller::ShutdownController,
    },
    futures::{Stream, StreamExt},
    model::SignedBid,
    std::{
        future::Future,
        num::NonZeroUsize,
        sync::{Arc, RwLock},
        time::Duration,
    },
    tokio::sync::mpsc,
    tracing::Instrument,
};

/// Winners that were not picked up by the settlement side yet.
const WINNER_QUEUE_CAPACITY: usize = 16;

#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub bidding_period: Duration,
    /// Extra time the outcome may take after the bidding period ended.
    pub grace_period: Duration,
    pub bid_queue_capacity: NonZeroUsize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bidding_period: Duration::from_secs(5),
            grace_period: Duration::from_secs(1),
            bid_queue_capacity: NonZeroUsize::new(10).unwrap(),
        }
    }
}

/// Runs one auction round per cadence tick and forwards the winners.
pub struct RoundOrchestrator {
    config: Config,
    policy: Arc<EligibilityPolicy>,
    active: RwLock<Option<Arc<AuctionRound>>>,
    winners: mpsc::Sender<SignedBid>,
}

impl RoundOrchestrator {
    /// Creates the orchestrator together with the receiving end of its winner
    /// channel.
    pub fn new(config: Config, policy: Arc<EligibilityPolicy>) -> (Self, mpsc::Receiver<SignedBid>) {
        let (winners, receiver) = mpsc::channel(WINNER_QUEUE_CAPACITY);
        let orchestrator = Self {
            config,
            policy,
            active: RwLock::new(None),
            winners,
        };
        (orchestrator, receiver)
    }

    /// Runs rounds until `shutdown` fires.
    ///
    /// Errors of the cadence stream skip the tick. Returns an error when the
    /// cadence stream ends or a round misses its outcome deadline.
    pub async fn run(
        &self,
        cadence: impl Stream<Item = anyhow::Result<u64>>,
        mut shutdown: ShutdownController,
    ) -> Result<(), Error> {
        let mut cadence = std::pin::pin!(cadence);
        loop {
            let tick = tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    tracing::info!("stopping auction rounds because of shutdown");
                    return Ok(());
                }
                tick = cadence.next() => tick,
            };
            match tick {
                Some(Ok(block)) => {
                    self.run_round(block, shutdown.clone())
                        .instrument(tracing::info_span!("auction", block))
                        .await?
                }
                Some(Err(err)) => {
                    tracing::warn!(?err, "cadence signal failed, skipping tick");
                    Metrics::get().skipped_ticks.inc();
                }
                None => {
                    return Err(Error::UpstreamUnavailable(anyhow::anyhow!(
                        "cadence stream ended"
                    )));
                }
            }
        }
    }

    async fn run_round(&self, block: u64, shutdown: ShutdownController) -> Result<(), Error> {
        let round = Arc::new(AuctionRound::new(
            block,
            self.config.bidding_period,
            self.config.bid_queue_capacity,
            self.policy.clone(),
        ));
        let outcome = round.start(shutdown.clone())?;
        *self.active.write().unwrap() = Some(round);
        Metrics::get().rounds_started.inc();
        self.conclude(block, outcome, shutdown).await
    }

    /// Waits for the outcome of the active round and forwards its winner.
    ///
    /// The outcome has to arrive within the bidding period plus the grace
    /// period, otherwise the round is considered stuck.
    async fn conclude(
        &self,
        block: u64,
        outcome: impl Future<Output = Result<Option<SignedBid>, RoundAbandoned>>,
        mut shutdown: ShutdownController,
    ) -> Result<(), Error> {
        let waited = self.config.bidding_period + self.config.grace_period;
        let result = tokio::time::timeout(waited, outcome).await;
        *self.active.write().unwrap() = None;

        match result {
            Ok(Ok(Some(winner))) => {
                tracing::info!(address = ?winner.address(), amount = %winner.amount_wei(), "forwarding winning bid");
                tokio::select! {
                    biased;
                    sent = self.winners.send(winner) => {
                        if sent.is_err() {
                            tracing::warn!("winner receiver is gone, dropping winning bid");
                        }
                    }
                    _ = shutdown.wait() => {
                        tracing::info!("dropping winning bid because of shutdown");
                    }
                }
                Ok(())
            }
            Ok(Ok(None)) => {
                tracing::info!("no winning bid");
                Ok(())
            }
            Ok(Err(RoundAbandoned)) if shutdown.should_shutdown() => Ok(()),
            Ok(Err(RoundAbandoned)) => Err(Error::RoundAbandoned { block }),
            Err(_) => Err(Error::RoundTimeoutViolation { block, waited }),
        }
    }

    /// Block and leader of the active round.
    pub fn current_round(&self) -> Result<RoundSnapshot, Error> {
        let active = self.active.read().unwrap();
        let round = active.as_ref().ok_or(Error::NoActiveRound)?;
        Ok(RoundSnapshot {
            l1_block: round.l1_block(),
            leader: round.current_leader(),
        })
    }

    /// Leading bid of the active round, `None` if nobody placed a valid bid
    /// yet.
    pub fn current_bid(&self) -> Result<Option<SignedBid>, Error> {
        self.current_round().map(|round| round.leader)
    }

    /// Hands a bid to the active round.
    pub async fn submit(&self, bid: SignedBid) -> Result<(), Error> {
        let round = self
            .active
            .read()
            .unwrap()
            .clone()
            .ok_or(Error::NoActiveRound)?;
        round.submit(bid).await;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundSnapshot {
    pub l1_block: u64,
    pub leader: Option<SignedBid>,
}

#[derive(prometheus_metric_storage::MetricStorage)]
#[metric(subsystem = "auction_orchestrator")]
struct Metrics {
    /// Number of started auction rounds.
    rounds_started: prometheus::IntCounter,

    /// Number of cadence ticks skipped because the signal failed.
    skipped_ticks: prometheus::IntCounter,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::eligibility::AlwaysRegistered,
        alloy::primitives::Address,
        futures::stream,
        num::BigUint,
        testlib::bidders,
        tokio::sync::oneshot,
    };

    fn orchestrator(
        allowed: impl IntoIterator<Item = Address>,
    ) -> (Arc<RoundOrchestrator>, mpsc::Receiver<SignedBid>) {
        let policy = Arc::new(EligibilityPolicy::new(allowed, Arc::new(AlwaysRegistered)));
        let (orchestrator, winners) = RoundOrchestrator::new(Config::default(), policy);
        (Arc::new(orchestrator), winners)
    }

    fn bid(amount: u64, block: u64) -> SignedBid {
        SignedBid::sign(BigUint::from(amount), block, &bidders::alice()).unwrap()
    }

    /// Cadence that ticks for the given blocks and then stays silent.
    fn ticks(
        blocks: Vec<anyhow::Result<u64>>,
    ) -> impl Stream<Item = anyhow::Result<u64>> + Send + 'static {
        stream::iter(blocks).chain(stream::pending())
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_winner_of_each_round() {
        let (orchestrator, mut winners) = orchestrator([bidders::ALICE]);
        let (tick, blocks) = mpsc::unbounded_channel();
        let (_signal, shutdown) = ShutdownController::new_manual_shutdown();

        let runner = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator.run(stream_from(blocks), shutdown).await
            })
        };
        assert!(matches!(orchestrator.current_bid(), Err(Error::NoActiveRound)));
        assert!(matches!(
            orchestrator.submit(bid(1, 10)).await,
            Err(Error::NoActiveRound)
        ));

        tick.send(Ok(10)).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(
            orchestrator.current_round().unwrap(),
            RoundSnapshot {
                l1_block: 10,
                leader: None,
            }
        );
        assert_eq!(orchestrator.current_bid().unwrap(), None);
        orchestrator.submit(bid(5, 10)).await.unwrap();
        orchestrator.submit(bid(7, 10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(orchestrator.current_bid().unwrap(), Some(bid(7, 10)));

        assert_eq!(winners.recv().await, Some(bid(7, 10)));
        assert!(matches!(orchestrator.current_round(), Err(Error::NoActiveRound)));

        // a round without bids forwards nothing
        tick.send(Ok(11)).unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        tick.send(Ok(12)).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        orchestrator.submit(bid(3, 12)).await.unwrap();
        assert_eq!(winners.recv().await, Some(bid(3, 12)));

        assert!(!runner.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn skips_failed_ticks() {
        let (orchestrator, mut winners) = orchestrator([bidders::ALICE]);
        let (_signal, shutdown) = ShutdownController::new_manual_shutdown();
        let cadence = ticks(vec![Err(anyhow::anyhow!("node unreachable")), Ok(20)]);

        let runner = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.run(cadence, shutdown).await })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(orchestrator.current_round().unwrap().l1_block, 20);
        orchestrator.submit(bid(1, 20)).await.unwrap();
        assert_eq!(winners.recv().await, Some(bid(1, 20)));
        assert!(!runner.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn ended_cadence_is_an_error() {
        let (orchestrator, _winners) = orchestrator([bidders::ALICE]);
        let (_signal, shutdown) = ShutdownController::new_manual_shutdown();

        let blocks: Vec<anyhow::Result<u64>> = vec![Ok(1)];
        let result = orchestrator.run(stream::iter(blocks), shutdown).await;
        assert!(matches!(result, Err(Error::UpstreamUnavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_cleanly_mid_round() {
        let (orchestrator, mut winners) = orchestrator([bidders::ALICE]);
        let (signal, shutdown) = ShutdownController::new_manual_shutdown();

        let runner = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.run(ticks(vec![Ok(30)]), shutdown).await })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        orchestrator.submit(bid(1, 30)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        signal.shutdown();

        assert!(runner.await.unwrap().is_ok());
        assert!(winners.try_recv().is_err());
        assert!(matches!(orchestrator.current_bid(), Err(Error::NoActiveRound)));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_outcome_is_fatal() {
        let (orchestrator, _winners) = orchestrator([bidders::ALICE]);
        let (_signal, shutdown) = ShutdownController::new_manual_shutdown();
        // The sender stays alive so the outcome never resolves.
        let (_sender, receiver) = oneshot::channel::<Option<SignedBid>>();
        let outcome = async move { receiver.await.map_err(|_| RoundAbandoned) };

        let result = orchestrator.conclude(40, outcome, shutdown).await;
        assert!(matches!(
            result,
            Err(Error::RoundTimeoutViolation { block: 40, waited })
                if waited == Duration::from_secs(6)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn lost_round_without_shutdown_is_fatal() {
        let (orchestrator, _winners) = orchestrator([bidders::ALICE]);
        let (_signal, shutdown) = ShutdownController::new_manual_shutdown();
        let (sender, receiver) = oneshot::channel::<Option<SignedBid>>();
        drop(sender);
        let outcome = async move { receiver.await.map_err(|_| RoundAbandoned) };

        let result = orchestrator.conclude(41, outcome, shutdown).await;
        assert!(matches!(result, Err(Error::RoundAbandoned { block: 41 })));
    }

    #[tokio::test(start_paused = true)]
    async fn lost_round_after_shutdown_is_fine() {
        let (orchestrator, _winners) = orchestrator([bidders::ALICE]);
        let (signal, shutdown) = ShutdownController::new_manual_shutdown();
        signal.shutdown();

        let result = orchestrator
            .conclude(42, async { Err(RoundAbandoned) }, shutdown)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_blocked_forwarding() {
        let (orchestrator, mut winners) = orchestrator([bidders::ALICE]);
        let (signal, shutdown) = ShutdownController::new_manual_shutdown();
        let winner = bid(1, 43);

        for _ in 0..WINNER_QUEUE_CAPACITY {
            let outcome = std::future::ready(Ok(Some(winner.clone())));
            orchestrator
                .conclude(43, outcome, shutdown.clone())
                .await
                .unwrap();
        }
        let blocked = tokio::time::timeout(
            Duration::from_secs(1),
            orchestrator.conclude(43, std::future::ready(Ok(Some(winner.clone()))), shutdown.clone()),
        )
        .await;
        assert!(blocked.is_err());

        signal.shutdown();
        let result = tokio::time::timeout(
            Duration::from_secs(1),
            orchestrator.conclude(43, std::future::ready(Ok(Some(winner.clone()))), shutdown),
        )
        .await;
        assert!(matches!(result, Ok(Ok(()))));

        let mut forwarded = 0;
        while winners.try_recv().is_ok() {
            forwarded += 1;
        }
        assert_eq!(forwarded, WINNER_QUEUE_CAPACITY);
    }

    fn stream_from(
        mut receiver: mpsc::UnboundedReceiver<anyhow::Result<u64>>,
    ) -> impl Stream<Item = anyhow::Result<u64>> {
        stream::poll_fn(move |cx| receiver.poll_recv(cx))
    }
}
