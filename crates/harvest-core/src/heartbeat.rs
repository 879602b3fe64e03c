use std::{sync::Arc, time::Duration};

use harvest_model::TaskId;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::ControlPlane;

/// Liveness notifications sent while a job is running.
///
/// The response is not inspected and failures never affect the job. A beat
/// that has not answered within `deadline` is abandoned.
#[derive(Clone)]
pub struct HeartbeatMonitor {
    control_plane: Arc<dyn ControlPlane>,
    deadline: Duration,
}

impl HeartbeatMonitor {
    pub fn new(control_plane: Arc<dyn ControlPlane>, deadline: Duration) -> Self {
        Self {
            control_plane,
            deadline,
        }
    }

    /// Send one heartbeat for `task`. Returns whether it was acknowledged.
    pub async fn beat(&self, task: TaskId, ctx: &CancellationToken) -> bool {
        debug!(task_id = task, "collection in progress, sending heartbeat");

        let call = tokio::time::timeout(self.deadline, self.control_plane.current_job());
        let result = tokio::select! {
            biased;
            _ = ctx.cancelled() => return false,
            result = call => result,
        };
        match result {
            Ok(Ok(())) => {
                debug!(task_id = task, "heartbeat sent successfully");
                true
            }
            Ok(Err(e)) => {
                warn!(task_id = task, error = %e, "control plane checkin failed");
                false
            }
            Err(_) => {
                warn!(
                    task_id = task,
                    deadline_ms = self.deadline.as_millis() as u64,
                    "control plane checkin timed out"
                );
                false
            }
        }
    }
}
