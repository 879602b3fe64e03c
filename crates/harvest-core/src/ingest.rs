use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use harvest_model::{Batch, IngestEnvelope};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{api::BatchUploader, backoff::BackoffPolicy};

/// Summary of one ingest pass over a job's batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Batches accepted by the ingest endpoint.
    pub accepted: usize,
    /// Records contained in accepted batches.
    pub records: usize,
    /// Batches given up on after exhausting transient retries.
    pub degraded: usize,
    /// The pass stopped early on an unrecoverable error.
    pub aborted: bool,
    /// The pass stopped early because the job was cancelled.
    pub cancelled: bool,
}

impl IngestReport {
    /// Job-level ingest error flag.
    #[inline]
    pub fn has_errors(&self) -> bool {
        self.aborted || self.degraded > 0
    }
}

enum Delivery {
    Accepted,
    Degraded,
    Aborted,
    Cancelled,
}

/// Uploads batches in order, retrying transient failures per [`BackoffPolicy`].
#[derive(Clone)]
pub struct Ingestor {
    uploader: Arc<dyn BatchUploader>,
    source_type: String,
    backoff: BackoffPolicy,
}

impl Ingestor {
    pub fn new(
        uploader: Arc<dyn BatchUploader>,
        source_type: impl Into<String>,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            uploader,
            source_type: source_type.into(),
            backoff,
        }
    }

    /// Drain `batches`, uploading each one.
    ///
    /// Stops at the first unrecoverable error; a batch whose transient retries
    /// run out is counted as degraded and the pass moves on.
    pub async fn ingest<S>(&self, mut batches: S, ctx: &CancellationToken) -> IngestReport
    where
        S: Stream<Item = Batch> + Unpin,
    {
        let mut report = IngestReport::default();

        while let Some(batch) = batches.next().await {
            let size = batch.len();
            let envelope = IngestEnvelope::new(self.source_type.as_str(), batch);

            match self.deliver(&envelope, ctx).await {
                Delivery::Accepted => {
                    report.accepted += 1;
                    report.records += size;
                    debug!(size, batch = report.accepted, "batch accepted");
                }
                Delivery::Degraded => report.degraded += 1,
                Delivery::Aborted => {
                    report.aborted = true;
                    break;
                }
                Delivery::Cancelled => {
                    report.cancelled = true;
                    break;
                }
            }
        }
        if ctx.is_cancelled() && !report.aborted {
            report.cancelled = true;
        }
        report
    }

    async fn deliver(&self, envelope: &IngestEnvelope, ctx: &CancellationToken) -> Delivery {
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = tokio::select! {
                biased;
                _ = ctx.cancelled() => return Delivery::Cancelled,
                result = self.uploader.upload(envelope) => result,
            };

            let err = match result {
                Ok(()) => return Delivery::Accepted,
                Err(err) => err,
            };
            if !err.is_transient() {
                error!(error = %err, "ending current ingest job due to unrecoverable error");
                return Delivery::Aborted;
            }
            if !self.backoff.can_retry(attempt) {
                error!(
                    error = %err,
                    attempts = attempt,
                    "exceeded max retry limit for ingest batch, proceeding with next batch"
                );
                return Delivery::Degraded;
            }

            let delay = self.backoff.delay(attempt);
            warn!(error = %err, attempt, delay_ms = delay.as_millis() as u64, "retrying ingest batch");
            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Delivery::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use futures_util::stream;
    use serde_json::json;
    use tokio::time::Instant;

    use super::*;
    use crate::error::UploadError;

    /// Replays scripted responses and records when each attempt happened.
    #[derive(Default)]
    struct Scripted {
        responses: Mutex<VecDeque<Result<(), UploadError>>>,
        attempts: Mutex<Vec<(Instant, usize)>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<(), UploadError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                attempts: Mutex::default(),
            })
        }

        fn attempts(&self) -> Vec<(Instant, usize)> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BatchUploader for Scripted {
        async fn upload(&self, envelope: &IngestEnvelope) -> Result<(), UploadError> {
            assert_eq!(envelope.meta.kind, "azure");
            self.attempts
                .lock()
                .unwrap()
                .push((Instant::now(), envelope.len()));
            self.responses.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
    }

    fn unavailable() -> Result<(), UploadError> {
        Err(UploadError::Transient { status: 503 })
    }

    fn batches(sizes: &[usize]) -> impl Stream<Item = Batch> + Unpin {
        let batches: Vec<Batch> = sizes
            .iter()
            .map(|n| (0..*n).map(|i| json!({ "n": i })).collect())
            .collect();
        stream::iter(batches)
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_back_off_then_degrade() {
        let uploader = Scripted::new(vec![unavailable(), unavailable(), unavailable()]);
        let ingestor = Ingestor::new(uploader.clone(), "azure", BackoffPolicy::default());

        let report = ingestor
            .ingest(batches(&[2, 3]), &CancellationToken::new())
            .await;

        let attempts = uploader.attempts();
        assert_eq!(attempts.len(), 4);
        assert_eq!(attempts[1].0 - attempts[0].0, Duration::from_secs(5));
        assert_eq!(attempts[2].0 - attempts[1].0, Duration::from_secs(25));
        // the degraded batch does not hold back the next one
        assert_eq!(attempts[3].0, attempts[2].0);
        assert_eq!(attempts[3].1, 3);

        assert_eq!(report.degraded, 1);
        assert_eq!(report.accepted, 1);
        assert!(!report.aborted);
        assert!(report.has_errors());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_then_accepted_is_clean() {
        let uploader = Scripted::new(vec![Err(UploadError::Transient { status: 504 }), Ok(())]);
        let ingestor = Ingestor::new(uploader.clone(), "azure", BackoffPolicy::default());

        let report = ingestor.ingest(batches(&[4]), &CancellationToken::new()).await;

        assert_eq!(uploader.attempts().len(), 2);
        assert_eq!(report.accepted, 1);
        assert_eq!(report.records, 4);
        assert!(!report.has_errors());
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_aborts_remaining_batches() {
        let uploader = Scripted::new(vec![
            Ok(()),
            Err(UploadError::Rejected {
                status: 400,
                body: "bad payload".into(),
            }),
        ]);
        let ingestor = Ingestor::new(uploader.clone(), "azure", BackoffPolicy::default());

        let report = ingestor
            .ingest(batches(&[1, 1, 1, 1]), &CancellationToken::new())
            .await;

        assert_eq!(uploader.attempts().len(), 2);
        assert!(report.aborted);
        assert_eq!(report.accepted, 1);
        assert!(report.has_errors());
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_is_not_retried() {
        let uploader = Scripted::new(vec![Err(UploadError::Transport("connection reset".into()))]);
        let ingestor = Ingestor::new(uploader.clone(), "azure", BackoffPolicy::default());

        let report = ingestor.ingest(batches(&[1, 1]), &CancellationToken::new()).await;

        assert_eq!(uploader.attempts().len(), 1);
        assert!(report.aborted);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let uploader = Scripted::new(vec![unavailable(), unavailable(), unavailable()]);
        let ingestor = Ingestor::new(uploader.clone(), "azure", BackoffPolicy::default());
        let ctx = CancellationToken::new();

        let cancel = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        });

        let start = Instant::now();
        let report = ingestor.ingest(batches(&[1, 1]), &ctx).await;

        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(uploader.attempts().len(), 1);
        assert!(report.cancelled);
        assert_eq!(report.degraded, 0);
    }

    /// Rejects every batch, cancelling the job while the request is in flight.
    struct RejectDuringShutdown {
        ctx: CancellationToken,
    }

    #[async_trait]
    impl BatchUploader for RejectDuringShutdown {
        async fn upload(&self, _: &IngestEnvelope) -> Result<(), UploadError> {
            self.ctx.cancel();
            Err(UploadError::Rejected {
                status: 413,
                body: "payload too large".into(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn abort_is_not_masked_by_later_cancellation() {
        let ctx = CancellationToken::new();
        let uploader = Arc::new(RejectDuringShutdown { ctx: ctx.clone() });
        let ingestor = Ingestor::new(uploader, "azure", BackoffPolicy::default());

        let report = ingestor.ingest(batches(&[1, 1]), &ctx).await;

        assert!(ctx.is_cancelled());
        assert!(report.aborted);
        assert!(!report.cancelled);
        assert!(report.has_errors());
    }
}
