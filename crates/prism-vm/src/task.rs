//! Tracking of asynchronous control plane tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::providers::{ControlPlane, TaskInfo, TaskStatus};

/// Interval between task status polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Polls a task until it succeeds, fails or the wait is cancelled.
#[derive(Clone)]
pub struct TaskTracker {
    client: Arc<dyn ControlPlane>,
    poll_interval: Duration,
}

impl TaskTracker {
    /// Create a tracker over a control plane client.
    #[must_use]
    pub fn new(client: Arc<dyn ControlPlane>) -> Self {
        Self::with_interval(client, POLL_INTERVAL)
    }

    pub(crate) fn with_interval(client: Arc<dyn ControlPlane>, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }

    /// Wait for a task to reach `SUCCEEDED`.
    ///
    /// Polls immediately and then every [`POLL_INTERVAL`], with no upper bound
    /// on the number of polls. `FAILED` and `INVALID_UUID` end the wait with
    /// [`Error::TaskFailed`]. Cancelling `cancel` ends the wait with
    /// [`Error::Cancelled`], interrupting both the pause between polls and an
    /// in-flight status request. The task itself is never touched.
    ///
    /// # Errors
    /// Returns an error if the task fails, a status request fails, or the
    /// wait is cancelled.
    pub async fn wait_for_task(
        &self,
        task_id: &str,
        cancel: &CancellationToken,
    ) -> Result<TaskInfo, Error> {
        info!(task_id = %task_id, "Waiting for task to finish");

        let start = tokio::time::Instant::now();
        let cancelled = || Error::Cancelled {
            task_id: task_id.to_string(),
        };

        loop {
            let task = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(cancelled()),
                result = self.client.get_task(task_id) => result.map_err(|source| Error::Remote {
                    action: format!("get status of task {task_id}"),
                    source,
                })?,
            };

            debug!(
                task_id = %task_id,
                status = %task.status,
                percentage = ?task.percentage_complete,
                elapsed_secs = start.elapsed().as_secs(),
                "Polling task status"
            );

            if task.status == TaskStatus::Succeeded {
                info!(task_id = %task_id, "Task succeeded");
                return Ok(task);
            }

            if task.status.is_failure() {
                warn!(
                    task_id = %task_id,
                    status = %task.status,
                    error_detail = ?task.error_detail,
                    "Task failed"
                );
                return Err(Error::TaskFailed {
                    task_id: task_id.to_string(),
                    status: task.status,
                    error_detail: task.error_detail.unwrap_or_default(),
                    progress_message: task.progress_message.unwrap_or_default(),
                });
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(cancelled()),
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use tokio::time::Instant;

    use super::*;
    use crate::providers::{ClientError, MockControlPlane};

    fn task(status: TaskStatus) -> TaskInfo {
        TaskInfo {
            id: "op-77".into(),
            status,
            error_detail: None,
            progress_message: None,
            percentage_complete: None,
        }
    }

    /// Mock that replays `statuses` and records when each poll happened.
    fn scripted(
        statuses: Vec<TaskStatus>,
        polls: usize,
    ) -> (MockControlPlane, Arc<Mutex<Vec<Instant>>>) {
        let script = Mutex::new(VecDeque::from(statuses));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);

        let mut mock = MockControlPlane::new();
        mock.expect_get_task()
            .withf(|id: &str| id == "op-77")
            .times(polls)
            .returning(move |_| {
                recorder.lock().unwrap().push(Instant::now());
                let status = script
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or(TaskStatus::Running);
                Ok(task(status))
            });
        (mock, seen)
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_three_polls() {
        let (mock, seen) = scripted(
            vec![TaskStatus::Queued, TaskStatus::Running, TaskStatus::Succeeded],
            3,
        );
        let tracker = TaskTracker::new(Arc::new(mock));

        let result = tracker
            .wait_for_task("op-77", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.status, TaskStatus::Succeeded);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[1] - seen[0], POLL_INTERVAL);
        assert_eq!(seen[2] - seen[1], POLL_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_interval_spaces_polls() {
        let (mock, seen) = scripted(vec![TaskStatus::Running, TaskStatus::Succeeded], 2);
        let interval = Duration::from_millis(250);
        let tracker = TaskTracker::with_interval(Arc::new(mock), interval);

        tracker
            .wait_for_task("op-77", &CancellationToken::new())
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1] - seen[0], interval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_task_stops_polling() {
        let mut mock = MockControlPlane::new();
        mock.expect_get_task().times(1).returning(|_| {
            Ok(TaskInfo {
                error_detail: Some("X".into()),
                progress_message: Some("creating vm".into()),
                ..task(TaskStatus::Failed)
            })
        });
        let tracker = TaskTracker::new(Arc::new(mock));

        let err = tracker
            .wait_for_task("op-77", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TaskFailed { .. }));
        assert!(err.to_string().contains("error_detail: X"));
        assert!(err.to_string().contains("progress_message: creating vm"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_uuid_is_terminal() {
        let (mock, _) = scripted(vec![TaskStatus::InvalidUuid], 1);
        let tracker = TaskTracker::new(Arc::new(mock));

        let err = tracker
            .wait_for_task("op-77", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::TaskFailed {
                status: TaskStatus::InvalidUuid,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_error_aborts() {
        let mut mock = MockControlPlane::new();
        mock.expect_get_task().times(1).returning(|_| {
            Err(ClientError::Api {
                status: 500,
                message: "boom".into(),
            })
        });
        let tracker = TaskTracker::new(Arc::new(mock));

        let err = tracker
            .wait_for_task("op-77", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Remote { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_second_wait() {
        let (mock, seen) = scripted(vec![TaskStatus::Running, TaskStatus::Running], 2);
        let tracker = TaskTracker::new(Arc::new(mock));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let start = Instant::now();
        tokio::spawn(async move {
            tokio::time::sleep(POLL_INTERVAL + POLL_INTERVAL / 2).await;
            trigger.cancel();
        });

        let err = tracker.wait_for_task("op-77", &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(start.elapsed(), POLL_INTERVAL + POLL_INTERVAL / 2);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_never_polls() {
        let mut mock = MockControlPlane::new();
        mock.expect_get_task().never();
        let tracker = TaskTracker::new(Arc::new(mock));

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = tracker.wait_for_task("op-77", &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }
}
