use chrono::{DateTime, Utc};
use tracing::info;

use crate::core::error::{ServiceError, require_text};
use crate::core::signals::RunSignals;
use crate::core::store::Store;
use crate::core::store::types::{RunRecord, RunStatus, RunStatusChange, RunStatusWrite, now};

/// Which status changes `set_status` accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicy {
    /// Any status may follow any other.
    #[default]
    Permissive,
    /// pending -> running -> {completed, failed}; pending may also finish
    /// directly. Terminal runs stay terminal.
    Forward,
}

pub fn can_transition(from: RunStatus, to: RunStatus) -> bool {
    if from == to {
        return true;
    }
    match from {
        RunStatus::Pending => matches!(
            to,
            RunStatus::Running | RunStatus::Completed | RunStatus::Failed
        ),
        RunStatus::Running => matches!(to, RunStatus::Completed | RunStatus::Failed),
        RunStatus::Completed | RunStatus::Failed => false,
    }
}

/// Timestamps a status change leaves on the run.
///
/// A caller-supplied value (including an explicit null) is used verbatim.
/// Otherwise `started_at` is stamped when entering `running` and
/// `completed_at` when entering a terminal status, but only if unset.
pub(crate) fn resolve_timestamps(
    current: &RunRecord,
    change: &RunStatusChange,
    at: DateTime<Utc>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let started_at = match change.started_at {
        Some(explicit) => explicit,
        None if change.status == RunStatus::Running && current.started_at.is_none() => Some(at),
        None => current.started_at,
    };
    let completed_at = match change.completed_at {
        Some(explicit) => explicit,
        None if change.status.is_terminal() && current.completed_at.is_none() => Some(at),
        None => current.completed_at,
    };
    (started_at, completed_at)
}

/// Creates runs and moves them through their status lifecycle.
#[derive(Clone)]
pub struct RunLifecycle {
    store: Store,
    signals: RunSignals,
    policy: TransitionPolicy,
}

impl RunLifecycle {
    pub fn new(store: Store, signals: RunSignals, policy: TransitionPolicy) -> Self {
        Self {
            store,
            signals,
            policy,
        }
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    pub async fn start(&self, agent_id: i64, input_text: &str) -> Result<RunRecord, ServiceError> {
        require_text("input_text", input_text)?;

        let agent = self
            .store
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| ServiceError::agent_not_found(agent_id))?;
        if !agent.is_active {
            return Err(ServiceError::PreconditionFailed(format!(
                "Agent with ID {} is not active",
                agent_id
            )));
        }

        let run = self.store.insert_run(agent_id, input_text).await?;
        info!("Run {} created for agent {} ({})", run.id, agent.id, agent.name);
        self.signals.publish(run.id);
        Ok(run)
    }

    /// `Ok(None)` when the run does not exist. The policy check and the
    /// write see the same stored row, so concurrent callers are serialized.
    pub async fn set_status(
        &self,
        run_id: i64,
        change: &RunStatusChange,
    ) -> Result<Option<RunRecord>, ServiceError> {
        let policy = self.policy;
        let applied = self
            .store
            .update_run_with(run_id, |current| {
                if policy == TransitionPolicy::Forward
                    && !can_transition(current.status, change.status)
                {
                    return Err(ServiceError::PreconditionFailed(format!(
                        "Invalid run status transition: {} -> {}",
                        current.status, change.status
                    )));
                }
                let (started_at, completed_at) = resolve_timestamps(current, change, now());
                Ok(RunStatusWrite {
                    status: change.status,
                    started_at,
                    completed_at,
                })
            })
            .await?;

        let Some((previous, run)) = applied else {
            return Ok(None);
        };
        info!("Run {} status {} -> {}", run.id, previous.status, run.status);
        self.signals.publish(run.id);
        Ok(Some(run))
    }
}

#[cfg(test)]
mod tests;
