use harvest_model::Task;
use time::OffsetDateTime;

/// Due tasks ordered by `execution_time`, ties kept in discovery order.
pub fn due_tasks(tasks: Vec<Task>, now: OffsetDateTime) -> Vec<Task> {
    let mut due: Vec<Task> = tasks.into_iter().filter(|t| t.is_due(now)).collect();
    due.sort_by_key(|t| t.execution_time);
    due
}

/// The task to run next, if any is due.
pub fn select_due(tasks: Vec<Task>, now: OffsetDateTime) -> Option<Task> {
    due_tasks(tasks, now).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-05-01 12:00:00 UTC);

    fn task(id: i64, offset_secs: i64) -> Task {
        Task::new(id, NOW + Duration::seconds(offset_secs))
    }

    #[test]
    fn picks_earliest_due_task() {
        let tasks = vec![task(1, 10), task(2, -5), task(3, -60), task(4, 0)];

        let picked = select_due(tasks.clone(), NOW).unwrap();
        assert_eq!(picked.id, 3);

        let order: Vec<i64> = due_tasks(tasks, NOW).iter().map(|t| t.id).collect();
        assert_eq!(order, vec![3, 2, 4]);
    }

    #[test]
    fn future_tasks_are_not_eligible() {
        let tasks = vec![task(1, 10), task(2, 1)];
        assert!(select_due(tasks, NOW).is_none());
        assert!(select_due(Vec::new(), NOW).is_none());
    }

    #[test]
    fn ties_keep_discovery_order() {
        let tasks = vec![task(9, 30), task(5, -5), task(7, -5), task(6, -5)];
        let order: Vec<i64> = due_tasks(tasks, NOW).iter().map(|t| t.id).collect();
        assert_eq!(order, vec![5, 7, 6]);
    }
}
