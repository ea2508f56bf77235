//! Bounded polling for create-task/poll backends.
//!
//! A [`PollPolicy`] fixes the interval and the attempt budget; [`poll_task`]
//! drives any probe function until it reports a terminal state or the budget
//! runs out. Nothing here polls indefinitely.

use crate::config::PollingConfig;
use crate::error::{GenerationCause, ProviderError, ProviderResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Interval and attempt budget for polling a remote task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from_config(&PollingConfig::default())
    }
}

impl PollPolicy {
    pub fn from_config(config: &PollingConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms),
            max_attempts: config.max_attempts,
        }
    }

    /// Longest time a task can be waited on.
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

/// Status of a remote task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Success,
    Failed,
    Timeout,
}

/// A backend-side asynchronous job, mutated only by polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTask {
    pub task_id: String,
    pub status: TaskStatus,
}

impl RemoteTask {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Pending,
        }
    }
}

/// What a single status check observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPoll<T> {
    Pending,
    Success(T),
    Failed(String),
}

/// Poll `task` with `probe` until it succeeds, fails, or exhausts `policy`.
///
/// Waits one interval before every check. Transient probe errors count as a
/// pending observation; `Unauthenticated` and `NotFound` abort immediately.
pub async fn poll_task<T, F, Fut>(
    provider: &str,
    task: &mut RemoteTask,
    policy: &PollPolicy,
    mut probe: F,
) -> ProviderResult<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = ProviderResult<TaskPoll<T>>>,
{
    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(policy.interval).await;

        match probe(task.task_id.clone()).await {
            Ok(TaskPoll::Success(value)) => {
                task.status = TaskStatus::Success;
                tracing::debug!(
                    "Task {} on {provider} succeeded after {attempt} checks",
                    task.task_id
                );
                return Ok(value);
            }
            Ok(TaskPoll::Failed(message)) => {
                task.status = TaskStatus::Failed;
                // No HTTP status here: only the message decides the cause.
                let cause = super::http::classify(0, &message);
                return Err(ProviderError::Generation {
                    provider: provider.to_string(),
                    cause,
                    message,
                    status_code: None,
                });
            }
            Ok(TaskPoll::Pending) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    "Status check {attempt}/{} for task {} failed: {e}",
                    policy.max_attempts,
                    task.task_id
                );
            }
        }
    }

    task.status = TaskStatus::Timeout;
    Err(ProviderError::Generation {
        provider: provider.to_string(),
        cause: GenerationCause::Timeout,
        message: format!(
            "task {} still pending after {} checks ({:?})",
            task.task_id,
            policy.max_attempts,
            policy.budget()
        ),
        status_code: None,
    })
}
