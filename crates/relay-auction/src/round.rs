//! A single sealed-bid auction for the relay slot of one L1 block.
//!
//! A round accepts bids until its deadline, keeps the highest valid bid of an
//! eligible relay as leader and hands out that leader exactly once when it
//! closes. All bids are evaluated by a single task that owns the intake
//! queue, so ranking never races with other submissions.

use {
    crate::{eligibility::EligibilityPolicy, error::Error, shutdown_controller::ShutdownController},
    alloy::primitives::Address,
    model::SignedBid,
    num::ToPrimitive,
    std::{
        future::Future,
        num::NonZeroUsize,
        pin::Pin,
        sync::{Arc, Mutex, RwLock},
        task::{Context, Poll},
        time::Duration,
    },
    tokio::{
        sync::{mpsc, oneshot},
        time::Instant,
    },
    tracing::Instrument,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Open,
    /// Terminal, no bid is evaluated anymore.
    Closed,
}

#[derive(Debug)]
struct State {
    leader: Option<SignedBid>,
    status: Status,
}

pub struct AuctionRound {
    l1_block: u64,
    bidding_period: Duration,
    policy: Arc<EligibilityPolicy>,
    state: Arc<RwLock<State>>,
    intake: mpsc::Sender<SignedBid>,
    /// Handed to the round task on start.
    queue: Mutex<Option<mpsc::Receiver<SignedBid>>>,
}

impl AuctionRound {
    pub fn new(
        l1_block: u64,
        bidding_period: Duration,
        queue_capacity: NonZeroUsize,
        policy: Arc<EligibilityPolicy>,
    ) -> Self {
        let (intake, queue) = mpsc::channel(queue_capacity.get());
        Self {
            l1_block,
            bidding_period,
            policy,
            state: Arc::new(RwLock::new(State {
                leader: None,
                status: Status::Open,
            })),
            intake,
            queue: Mutex::new(Some(queue)),
        }
    }

    pub fn l1_block(&self) -> u64 {
        self.l1_block
    }

    /// Starts the bidding period.
    ///
    /// The returned outcome resolves to the leader at the deadline, or to
    /// [`RoundAbandoned`] if `shutdown` fires first. Bids submitted before
    /// the start stay queued and get evaluated once the round runs.
    pub fn start(&self, shutdown: ShutdownController) -> Result<RoundOutcome, Error> {
        let queue = self
            .queue
            .lock()
            .unwrap()
            .take()
            .ok_or(Error::AlreadyStarted)?;
        let (sender, receiver) = oneshot::channel();
        let task = RoundTask {
            l1_block: self.l1_block,
            deadline: Instant::now() + self.bidding_period,
            policy: self.policy.clone(),
            state: self.state.clone(),
            queue,
            shutdown,
        };
        tracing::debug!(block = self.l1_block, period = ?self.bidding_period, "starting round");
        tokio::spawn(
            task.run(sender)
                .instrument(tracing::info_span!("round", block = self.l1_block)),
        );
        Ok(RoundOutcome(receiver))
    }

    /// Queues a bid for evaluation. Waits while the intake queue is full.
    ///
    /// Bids for a closed round are dropped. Acceptance says nothing about
    /// the bid's validity, invalid bids are dropped when evaluated.
    pub async fn submit(&self, bid: SignedBid) {
        if self.status() == Status::Closed || self.intake.send(bid).await.is_err() {
            tracing::debug!(block = self.l1_block, "dropping bid for closed round");
        }
    }

    /// Snapshot of the current leader.
    pub fn current_leader(&self) -> Option<SignedBid> {
        self.state.read().unwrap().leader.clone()
    }

    pub fn status(&self) -> Status {
        self.state.read().unwrap().status
    }
}

/// Why a bid has no effect on the round.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("bid is for block {actual} but the round is for block {expected}")]
    WrongBlock { expected: u64, actual: u64 },
    #[error("signature does not belong to the bidder")]
    InvalidSignature,
    #[error("relay {0} is not eligible")]
    Ineligible(Address),
}

impl Rejection {
    fn label(&self) -> &'static str {
        match self {
            Self::WrongBlock { .. } => "wrong_block",
            Self::InvalidSignature => "invalid_signature",
            Self::Ineligible(_) => "ineligible",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("auction round was abandoned before it closed")]
pub struct RoundAbandoned;

/// Resolves to the winner of a round, `None` if no valid bid was placed.
#[must_use]
pub struct RoundOutcome(oneshot::Receiver<Option<SignedBid>>);

impl Future for RoundOutcome {
    type Output = Result<Option<SignedBid>, RoundAbandoned>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0)
            .poll(cx)
            .map(|outcome| outcome.map_err(|_| RoundAbandoned))
    }
}

enum Event {
    Shutdown,
    Deadline,
    Bid(SignedBid),
}

struct RoundTask {
    l1_block: u64,
    deadline: Instant,
    policy: Arc<EligibilityPolicy>,
    state: Arc<RwLock<State>>,
    queue: mpsc::Receiver<SignedBid>,
    shutdown: ShutdownController,
}

impl RoundTask {
    async fn run(mut self, outcome: oneshot::Sender<Option<SignedBid>>) {
        let mut deadline = std::pin::pin!(tokio::time::sleep_until(self.deadline));
        loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.wait() => Event::Shutdown,
                _ = &mut deadline => Event::Deadline,
                Some(bid) = self.queue.recv() => Event::Bid(bid),
            };
            match event {
                Event::Bid(bid) => self.evaluate(bid),
                Event::Shutdown => {
                    self.close();
                    tracing::info!("round abandoned because of shutdown");
                    Metrics::round_ended("abandoned");
                    return;
                }
                Event::Deadline => break,
            }
        }

        let winner = self.close();
        match &winner {
            Some(bid) => {
                tracing::info!(address = ?bid.address(), amount = %bid.amount_wei(), "round closed with winner");
                Metrics::round_ended("winner");
                Metrics::winning_amount(bid);
            }
            None => {
                tracing::info!("round closed without winner");
                Metrics::round_ended("no_winner");
            }
        }
        if outcome.send(winner).is_err() {
            tracing::debug!("nobody is waiting for the round outcome");
        }
    }

    fn evaluate(&self, bid: SignedBid) {
        let address = bid.address();
        if let Err(rejection) = self.check(&bid) {
            tracing::debug!(?address, %rejection, "rejected bid");
            Metrics::bid(rejection.label());
            return;
        }

        let amount = bid.amount_wei().clone();
        let leads = {
            let mut state = self.state.write().unwrap();
            let leads = state
                .leader
                .as_ref()
                .is_none_or(|leader| bid.amount_wei() > leader.amount_wei());
            if leads {
                state.leader = Some(bid);
            }
            leads
        };

        if leads {
            tracing::debug!(?address, %amount, "new leading bid");
            Metrics::bid("leading");
        } else {
            tracing::debug!(?address, %amount, "bid does not beat the leader");
            Metrics::bid("outbid");
        }
    }

    fn check(&self, bid: &SignedBid) -> Result<(), Rejection> {
        if bid.l1_block() != self.l1_block {
            return Err(Rejection::WrongBlock {
                expected: self.l1_block,
                actual: bid.l1_block(),
            });
        }
        if !bid.verify() {
            return Err(Rejection::InvalidSignature);
        }
        if !self.policy.is_eligible(bid.address()) {
            return Err(Rejection::Ineligible(bid.address()));
        }
        Ok(())
    }

    /// Marks the round closed and returns the final leader.
    fn close(&mut self) -> Option<SignedBid> {
        let leader = {
            let mut state = self.state.write().unwrap();
            state.status = Status::Closed;
            state.leader.clone()
        };
        // Unblocks submitters waiting for queue capacity.
        self.queue.close();
        leader
    }
}

#[derive(prometheus_metric_storage::MetricStorage)]
#[metric(subsystem = "auction_round")]
struct Metrics {
    /// Evaluated bids by result.
    #[metric(labels("result"))]
    bids: prometheus::IntCounterVec,

    /// Ended rounds by result.
    #[metric(labels("result"))]
    rounds: prometheus::IntCounterVec,

    /// Amount of the most recent winning bid in wei.
    winning_amount_wei: prometheus::Gauge,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }

    fn bid(result: &str) {
        Self::get().bids.with_label_values(&[result]).inc();
    }

    fn round_ended(result: &str) {
        Self::get().rounds.with_label_values(&[result]).inc();
    }

    fn winning_amount(bid: &SignedBid) {
        Self::get()
            .winning_amount_wei
            .set(bid.amount_wei().to_f64().unwrap_or(f64::INFINITY));
    }
}
