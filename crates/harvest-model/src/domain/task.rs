use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Control-plane identifier of a collection task.
pub type TaskId = i64;

/// Unit of schedulable work handed out by the control plane.
///
/// The agent only ever reads tasks; it never creates or mutates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Control-plane task identifier.
    pub id: TaskId,
    /// Moment from which the task may be executed.
    #[serde(with = "time::serde::rfc3339")]
    pub execution_time: OffsetDateTime,
}

impl Task {
    pub fn new(id: TaskId, execution_time: OffsetDateTime) -> Self {
        Self { id, execution_time }
    }

    /// Returns `true` once `execution_time` has been reached.
    #[inline]
    pub fn is_due(&self, now: OffsetDateTime) -> bool {
        self.execution_time <= now
    }
}

/// Body of `POST /api/v1/clients/starttask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartTaskRequest {
    pub id: TaskId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn due_is_inclusive() {
        let now = datetime!(2024-05-01 12:00:00 UTC);

        assert!(Task::new(1, now).is_due(now));
        assert!(Task::new(2, datetime!(2024-05-01 11:59:59 UTC)).is_due(now));
        assert!(!Task::new(3, datetime!(2024-05-01 12:00:01 UTC)).is_due(now));
    }

    #[test]
    fn decodes_control_plane_payload() {
        let body = r#"[
            {"id": 7, "execution_time": "2024-05-01T12:00:00Z"},
            {"id": 8, "execution_time": "2024-05-01T14:30:00+02:00"}
        ]"#;
        let tasks: Vec<Task> = serde_json::from_str(body).unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, 7);
        assert_eq!(tasks[0].execution_time, datetime!(2024-05-01 12:00:00 UTC));
        assert_eq!(tasks[1].execution_time, datetime!(2024-05-01 12:30:00 UTC));
    }

    #[test]
    fn start_request_shape() {
        let json = serde_json::to_value(StartTaskRequest { id: 42 }).unwrap();
        assert_eq!(json, serde_json::json!({ "id": 42 }));
    }
}
