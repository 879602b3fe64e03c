//! Size- and time-bounded re-chunking of a record stream.
use std::time::Duration;

use futures_util::{Stream, StreamExt, stream};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum number of records in one batch.
    pub max_size: usize,
    /// Maximum time a record may wait in the buffer before it is flushed.
    pub max_wait: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: 256,
            max_wait: Duration::from_secs(10),
        }
    }
}

/// Accumulates records from `S` and hands them out as bounded batches.
///
/// A batch is flushed when it reaches `max_size` or when `max_wait` has passed
/// since its first record was buffered. Exhaustion flushes the remainder once;
/// cancellation drops it.
pub struct Batcher<S, T> {
    input: S,
    cfg: BatchConfig,
    ctx: CancellationToken,
    buffer: Vec<T>,
    deadline: Option<Instant>,
    done: bool,
}

impl<S, T> Batcher<S, T>
where
    S: Stream<Item = T> + Unpin,
{
    pub fn new(input: S, cfg: BatchConfig, ctx: CancellationToken) -> Self {
        let max_size = cfg.max_size.max(1);
        Self {
            input,
            cfg: BatchConfig { max_size, ..cfg },
            ctx,
            buffer: Vec::with_capacity(max_size),
            deadline: None,
            done: false,
        }
    }

    /// Next batch, or `None` once the input is exhausted or cancelled.
    pub async fn next_batch(&mut self) -> Option<Vec<T>> {
        if self.done {
            return None;
        }

        loop {
            let armed = self.deadline.is_some();
            let deadline = self.deadline.unwrap_or_else(Instant::now);

            tokio::select! {
                biased;

                _ = self.ctx.cancelled() => {
                    trace!(dropped = self.buffer.len(), "batching cancelled");
                    self.buffer.clear();
                    self.deadline = None;
                    self.done = true;
                    return None;
                }
                _ = sleep_until(deadline), if armed => {
                    trace!(len = self.buffer.len(), "flushing batch on time window");
                    return Some(self.flush());
                }
                item = self.input.next() => match item {
                    Some(record) => {
                        if self.buffer.is_empty() {
                            // a window past the clock's range never expires
                            self.deadline = Instant::now().checked_add(self.cfg.max_wait);
                        }
                        self.buffer.push(record);
                        if self.buffer.len() >= self.cfg.max_size {
                            return Some(self.flush());
                        }
                    }
                    None => {
                        self.done = true;
                        if self.buffer.is_empty() {
                            return None;
                        }
                        return Some(self.flush());
                    }
                },
            }
        }
    }

    /// Turn the batcher into a stream of batches.
    pub fn into_stream(self) -> impl Stream<Item = Vec<T>> + Unpin
    where
        S: Send + 'static,
        T: Send + 'static,
    {
        stream::unfold(self, |mut batcher| async move {
            let batch = batcher.next_batch().await?;
            Some((batch, batcher))
        })
        .boxed()
    }

    fn flush(&mut self) -> Vec<T> {
        self.deadline = None;
        std::mem::replace(&mut self.buffer, Vec::with_capacity(self.cfg.max_size))
    }
}
