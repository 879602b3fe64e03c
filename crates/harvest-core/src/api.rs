use async_trait::async_trait;
use futures_util::stream::BoxStream;
use harvest_model::{ClientIdentity, IngestEnvelope, JobOutcome, Record, Task, TaskId};
use tokio_util::sync::CancellationToken;

use crate::error::{ControlPlaneError, UploadError};

/// Lazy, single-pass sequence of collected records.
pub type RecordStream = BoxStream<'static, Record>;

/// Control-plane operations the agent depends on.
///
/// Implementations are plain request/response calls; callers take care of
/// cancellation.
#[async_trait]
pub trait ControlPlane: Send + Sync + 'static {
    /// `GET /api/v1/clients/availabletasks`
    async fn available_tasks(&self) -> Result<Vec<Task>, ControlPlaneError>;

    /// `POST /api/v1/clients/starttask`
    async fn start_task(&self, id: TaskId) -> Result<(), ControlPlaneError>;

    /// `GET /api/v2/jobs/current`
    async fn current_job(&self) -> Result<(), ControlPlaneError>;

    /// `POST /api/v2/jobs/end`
    async fn end_job(&self, outcome: &JobOutcome) -> Result<(), ControlPlaneError>;

    /// `PUT /api/v1/clients/update`
    async fn update_client(&self, identity: &ClientIdentity) -> Result<(), ControlPlaneError>;
}

/// Sends one ingest envelope.
#[async_trait]
pub trait BatchUploader: Send + Sync + 'static {
    async fn upload(&self, envelope: &IngestEnvelope) -> Result<(), UploadError>;
}

/// Domain collector producing the records of one job.
///
/// The returned stream must end promptly once `ctx` is cancelled.
pub trait RecordSource: Send + Sync + 'static {
    fn records(&self, ctx: CancellationToken) -> RecordStream;
}
