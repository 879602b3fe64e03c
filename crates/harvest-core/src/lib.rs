pub mod api;
pub use api::{BatchUploader, ControlPlane, RecordSource, RecordStream};

pub mod error;
pub use error::{ControlPlaneError, UploadError};

pub mod backoff;
pub use backoff::BackoffPolicy;

pub mod batch;
pub use batch::{BatchConfig, Batcher};

pub mod ingest;
pub use ingest::{IngestReport, Ingestor};

pub mod heartbeat;
pub use heartbeat::HeartbeatMonitor;

pub mod select;
pub use select::{due_tasks, select_due};

pub mod scheduler;
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerSnapshot, SchedulerState};

mod system;
pub use system::{agent_version, client_identity, host_name, init_uptime, probe_local_address, uptime_seconds};
