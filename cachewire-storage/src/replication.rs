//! Driving a consumer from a stream.
//!
//! [`catch_up`] replays a stored stream from the consumer's reported position.
//! [`run_feed`] applies batches pushed by the replication transport, one at
//! a time, until the transport hangs up or shutdown is signalled.

use tokio::sync::{mpsc, watch};

use cachewire_core::{CachewireResult, StreamBatch, CACHES_STREAM};

use crate::consumer::ReplicatedCacheConsumer;
use crate::stream::InvalidationStream;

/// Apply every row of `stream` the consumer has not yet seen.
///
/// A consumer without a position (no "caches" entry) replays from the
/// beginning. Returns the number of rows delivered.
pub fn catch_up(
    consumer: &mut ReplicatedCacheConsumer,
    stream: &InvalidationStream,
    batch_size: usize,
) -> CachewireResult<usize> {
    let batch_size = batch_size.max(1);
    let mut from = consumer
        .report_position()
        .get(CACHES_STREAM)
        .copied()
        .unwrap_or(0);
    let mut delivered = 0;

    loop {
        let batch = stream.rows_since(from, batch_size)?;
        if batch.rows.is_empty() {
            if batch.token > from {
                consumer.apply_batch(&batch)?;
            }
            break;
        }
        delivered += batch.rows.len();
        from = batch.token;
        consumer.apply_batch(&batch)?;
    }

    tracing::debug!(delivered, position = from, "Caught up on caches stream");
    Ok(delivered)
}

/// Apply batches from `batches` until the sender is dropped or `shutdown`
/// turns true. Starts replication on the consumer first. Dropping the
/// shutdown sender without sending `true` does not stop the feed.
///
/// Returns the number of batches handed to the consumer. An apply error
/// stops the feed; the transport redelivers from the last reported position.
pub async fn run_feed(
    consumer: &mut ReplicatedCacheConsumer,
    mut batches: mpsc::Receiver<StreamBatch>,
    mut shutdown: watch::Receiver<bool>,
) -> CachewireResult<u64> {
    consumer.on_start_replication();
    let mut handled = 0u64;
    // A dropped shutdown sender is not a shutdown request; keep draining.
    let mut shutdown_open = true;

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            maybe_batch = batches.recv() => match maybe_batch {
                Some(batch) => {
                    if let Err(err) = consumer.apply_batch(&batch) {
                        tracing::error!(
                            stream = %batch.stream_name,
                            token = batch.token,
                            error = %err,
                            "Failed to apply batch, stopping feed"
                        );
                        return Err(err);
                    }
                    handled += 1;
                }
                None => {
                    tracing::info!(handled, "Replication feed closed");
                    break;
                }
            },
            changed = shutdown.changed(), if shutdown_open => {
                if changed.is_err() {
                    tracing::warn!(handled, "Shutdown handle dropped, feed runs until the transport closes");
                    shutdown_open = false;
                } else if *shutdown.borrow() {
                    tracing::info!(handled, "Replication feed shutting down");
                    break;
                }
            }
        }
    }

    Ok(handled)
}
