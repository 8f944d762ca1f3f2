use crate::core::error::ServiceError;
use crate::core::store::Store;
use crate::core::store::types::{AgentRecord, OutputRecord, RunRecord, RunWithOutputs};

/// Read-only views over the store. Absent entities come back as `None`.
#[derive(Clone)]
pub struct QueryFacade {
    store: Store,
}

impl QueryFacade {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn get_agents(&self, include_inactive: bool) -> Result<Vec<AgentRecord>, ServiceError> {
        Ok(self.store.list_agents(include_inactive).await?)
    }

    pub async fn get_agent_by_id(&self, id: i64) -> Result<Option<AgentRecord>, ServiceError> {
        Ok(self.store.get_agent(id).await?)
    }

    /// Newest first.
    pub async fn get_agent_runs(&self, agent_id: Option<i64>) -> Result<Vec<RunRecord>, ServiceError> {
        Ok(self.store.list_runs(agent_id).await?)
    }

    pub async fn get_agent_run(&self, id: i64) -> Result<Option<RunWithOutputs>, ServiceError> {
        let Some(run) = self.store.get_run(id).await? else {
            return Ok(None);
        };
        let outputs = self.store.list_outputs(run.id).await?;
        Ok(Some(RunWithOutputs { run, outputs }))
    }

    pub async fn get_agent_outputs(&self, run_id: i64) -> Result<Vec<OutputRecord>, ServiceError> {
        Ok(self.store.list_outputs(run_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::core::store::test_store;
    use crate::core::store::types::{AgentPatch, NewAgent, OutputType, now};

    async fn seeded() -> (Store, QueryFacade, AgentRecord) {
        let store = test_store().await;
        let agent = store
            .insert_agent(&NewAgent {
                name: "planner".into(),
                description: None,
                role: "r".into(),
                goal: "g".into(),
                backstory: "b".into(),
                is_active: true,
            })
            .await
            .unwrap();
        (store.clone(), QueryFacade::new(store), agent)
    }

    #[tokio::test]
    async fn inactive_agents_hidden_by_default() {
        let (store, query, active) = seeded().await;
        let dormant = store
            .insert_agent(&NewAgent {
                name: "dormant".into(),
                description: None,
                role: "r".into(),
                goal: "g".into(),
                backstory: "b".into(),
                is_active: true,
            })
            .await
            .unwrap();
        store
            .update_agent(
                dormant.id,
                &AgentPatch {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let visible: Vec<i64> = query.get_agents(false).await.unwrap().iter().map(|a| a.id).collect();
        assert_eq!(visible, vec![active.id]);
        let all: Vec<i64> = query.get_agents(true).await.unwrap().iter().map(|a| a.id).collect();
        assert_eq!(all, vec![active.id, dormant.id]);
        assert!(query.get_agent_by_id(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn runs_list_newest_first_and_filters_by_agent() {
        let (store, query, agent) = seeded().await;
        let other = store
            .insert_agent(&NewAgent {
                name: "other".into(),
                description: None,
                role: "r".into(),
                goal: "g".into(),
                backstory: "b".into(),
                is_active: true,
            })
            .await
            .unwrap();
        let first = store.insert_run(agent.id, "one").await.unwrap();
        let second = store.insert_run(agent.id, "two").await.unwrap();
        let foreign = store.insert_run(other.id, "three").await.unwrap();

        let mine: Vec<i64> = query
            .get_agent_runs(Some(agent.id))
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(mine, vec![second.id, first.id]);

        let everything = query.get_agent_runs(None).await.unwrap();
        assert_eq!(everything.len(), 3);
        assert_eq!(everything[0].id, foreign.id);
    }

    #[tokio::test]
    async fn run_detail_carries_outputs_in_timestamp_order() {
        let (store, query, agent) = seeded().await;
        let run = store.insert_run(agent.id, "go").await.unwrap();
        let base = now();
        store
            .insert_output(run.id, OutputType::Log, "late", Some(base))
            .await
            .unwrap();
        store
            .insert_output(run.id, OutputType::Log, "early", Some(base - Duration::seconds(10)))
            .await
            .unwrap();
        store
            .insert_output(run.id, OutputType::Result, "tied", Some(base))
            .await
            .unwrap();

        let detail = query.get_agent_run(run.id).await.unwrap().unwrap();
        assert_eq!(detail.run, run);
        let contents: Vec<&str> = detail.outputs.iter().map(|o| o.content.as_str()).collect();
        assert_eq!(contents, vec!["early", "late", "tied"]);

        let outputs = query.get_agent_outputs(run.id).await.unwrap();
        assert!(outputs.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(query.get_agent_run(run.id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn run_detail_serializes_flat() {
        let (store, query, agent) = seeded().await;
        let run = store.insert_run(agent.id, "go").await.unwrap();
        let detail = query.get_agent_run(run.id).await.unwrap().unwrap();
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["id"], run.id);
        assert_eq!(json["status"], "pending");
        assert_eq!(json["outputs"], serde_json::json!([]));
    }
}
