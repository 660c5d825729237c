//! Long-running provider actions and their progress

use crate::error::{CloudError, Result};
use crate::provider::ComputeProvider;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An asynchronous operation running on the provider side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Provider-assigned action ID
    pub id: u64,

    /// Command the action executes (e.g. "shutdown_server")
    pub command: String,

    /// Current status
    pub status: ActionStatus,

    /// Progress in percent (0-100)
    pub progress: u8,

    /// Error message if the action failed
    pub error: Option<String>,
}

impl Action {
    pub fn is_finished(&self) -> bool {
        self.status != ActionStatus::Running
    }
}

/// Status of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Running,
    Success,
    Error,
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionStatus::Running => write!(f, "running"),
            ActionStatus::Success => write!(f, "success"),
            ActionStatus::Error => write!(f, "error"),
        }
    }
}

/// Progress event emitted while watching an action
///
/// `Ok(progress)` carries the percentage; the stream ends after `Ok(100)` or
/// after the first `Err`.
pub type ProgressEvent = Result<u8>;

/// Watch an action by polling the provider until it finishes
///
/// The first event reflects the action as passed in, every further event is
/// produced after `poll_interval` by re-reading the action.
pub fn watch_progress<'a, P>(
    provider: &'a P,
    action: Action,
    poll_interval: Duration,
) -> BoxStream<'a, ProgressEvent>
where
    P: ComputeProvider + ?Sized,
{
    stream::unfold(Some((action, true)), move |state| async move {
        let (action, first) = state?;

        let action = if first {
            action
        } else {
            tokio::time::sleep(poll_interval).await;
            match provider.get_action(action.id).await {
                Ok(action) => action,
                Err(e) => return Some((Err(e), None)),
            }
        };

        tracing::debug!(
            "action {} ({}) is {} at {}%",
            action.id,
            action.command,
            action.status,
            action.progress
        );

        match action.status {
            ActionStatus::Success => Some((Ok(100), None)),
            ActionStatus::Error => {
                let err = CloudError::ActionFailed {
                    action_id: action.id,
                    command: action.command.clone(),
                    message: action
                        .error
                        .clone()
                        .unwrap_or_else(|| "unknown error".to_string()),
                };
                Some((Err(err), None))
            }
            ActionStatus::Running => {
                let progress = action.progress.min(99);
                Some((Ok(progress), Some((action, false))))
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_finished() {
        let mut action = Action {
            id: 1,
            command: "shutdown_server".to_string(),
            status: ActionStatus::Running,
            progress: 40,
            error: None,
        };
        assert!(!action.is_finished());
        action.status = ActionStatus::Error;
        assert!(action.is_finished());
    }

    #[test]
    fn test_action_status_serde() {
        let status: ActionStatus = serde_json::from_str("\"success\"").unwrap();
        assert_eq!(status, ActionStatus::Success);
        assert_eq!(status.to_string(), "success");
    }
}
