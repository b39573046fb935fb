use {
    crate::AlloyProvider,
    alloy::providers::Provider,
    anyhow::{Context as _, Result},
    futures::{Stream, StreamExt},
    std::{sync::Arc, time::Duration},
    tokio::sync::watch,
    tokio_stream::wrappers::WatchStream,
    tracing::Instrument,
};

/// Block information.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    pub number: u64,
}

impl BlockInfo {
    pub fn new(number: u64) -> Self {
        Self { number }
    }
}

/// Trait for abstracting the retrieval of the latest block number.
#[mockall::automock]
#[async_trait::async_trait]
pub trait BlockRetrieving: Send + Sync + 'static {
    async fn current_block_number(&self) -> Result<u64>;
}

#[async_trait::async_trait]
impl BlockRetrieving for AlloyProvider {
    async fn current_block_number(&self) -> Result<u64> {
        self.get_block_number()
            .await
            .context("failed to get current block number")
    }
}

pub type CurrentBlockWatcher = watch::Receiver<BlockInfo>;

/// Creates a cloneable stream that yields the current block whenever it
/// changes.
///
/// The stream is not guaranteed to yield *every* block individually without
/// gaps but it does yield the newest block whenever it detects a block number
/// increase. If the node advances by several blocks between two polls only
/// the last one is observed.
///
/// Failing polls are logged and retried on the next interval. The polling
/// task stops once every receiver is dropped.
pub async fn current_block_stream(
    retriever: Arc<dyn BlockRetrieving>,
    poll_interval: Duration,
) -> Result<CurrentBlockWatcher> {
    let first_block = BlockInfo::new(retriever.current_block_number().await?);
    tracing::debug!(number = first_block.number, "polled initial block");
    update_current_block_metrics(first_block.number);

    let (sender, receiver) = watch::channel(first_block);
    let update_future = async move {
        let mut previous_block = first_block;
        loop {
            tokio::time::sleep(poll_interval).await;
            let number = match retriever.current_block_number().await {
                Ok(number) => number,
                Err(err) => {
                    tracing::warn!(?err, "failed to get current block");
                    continue;
                }
            };

            // Only update the stream if the number has increased.
            if number <= previous_block.number {
                continue;
            }

            let block = BlockInfo::new(number);
            tracing::info!(number, skipped = number - previous_block.number - 1, "noticed a new block");
            update_current_block_metrics(number);
            if sender.send(block).is_err() {
                tracing::debug!("no block stream receivers left, exiting polling loop");
                break;
            }
            previous_block = block;
        }
    };

    tokio::task::spawn(update_future.instrument(tracing::info_span!("current_block_stream")));
    Ok(receiver)
}

pub fn into_stream(receiver: CurrentBlockWatcher) -> WatchStream<BlockInfo> {
    WatchStream::new(receiver)
}

/// Turns block updates into a stream of "start a round for this block"
/// signals.
///
/// The block that was current when the watcher got created is skipped so
/// rounds only ever start on a freshly observed block. The stream ends when
/// the polling task stops.
pub fn cadence(blocks: CurrentBlockWatcher) -> impl Stream<Item = Result<u64>> + Send + 'static {
    into_stream(blocks).skip(1).map(|block| Ok(block.number))
}

#[derive(prometheus_metric_storage::MetricStorage)]
struct Metrics {
    /// Records newly observed block number.
    last_block_number: prometheus::core::GenericGauge<prometheus::core::AtomicU64>,
}

/// Records newly observed block number in the metrics.
fn update_current_block_metrics(block_number: u64) {
    match Metrics::instance(observe::metrics::get_storage_registry()) {
        Ok(metrics) => metrics.last_block_number.set(block_number),
        Err(err) => tracing::warn!(?err, "failed to register block stream metrics"),
    }
}
