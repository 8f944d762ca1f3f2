use tracing::info;

use crate::core::error::{ServiceError, require_text};
use crate::core::store::Store;
use crate::core::store::types::{AgentPatch, AgentRecord, NewAgent};

/// Creates agents and applies partial updates to them.
#[derive(Clone)]
pub struct AgentManager {
    store: Store,
}

impl AgentManager {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn create_agent(&self, agent: &NewAgent) -> Result<AgentRecord, ServiceError> {
        require_text("name", &agent.name)?;
        require_text("role", &agent.role)?;
        require_text("goal", &agent.goal)?;
        require_text("backstory", &agent.backstory)?;

        let rec = self.store.insert_agent(agent).await?;
        info!("Agent {} created ({})", rec.id, rec.name);
        Ok(rec)
    }

    /// `Ok(None)` when the agent does not exist.
    pub async fn update_agent(
        &self,
        id: i64,
        patch: &AgentPatch,
    ) -> Result<Option<AgentRecord>, ServiceError> {
        let required = [
            ("name", &patch.name),
            ("role", &patch.role),
            ("goal", &patch.goal),
            ("backstory", &patch.backstory),
        ];
        for (field, value) in required {
            if let Some(value) = value {
                require_text(field, value)?;
            }
        }

        let updated = self.store.update_agent(id, patch).await?;
        if let Some(agent) = &updated {
            info!("Agent {} updated (active: {})", agent.id, agent.is_active);
        }
        Ok(updated)
    }
}
