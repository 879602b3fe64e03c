mod task;
pub use task::{StartTaskRequest, Task, TaskId};

mod outcome;
pub use outcome::{JobOutcome, JobStatus};

mod ingest;
pub use ingest::{Batch, IngestEnvelope, IngestMeta, Record};

mod client;
pub use client::ClientIdentity;
