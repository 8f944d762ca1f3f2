
use crate::core::signals::RunSignals;
use crate::core::store::types::{AgentRecord, NewAgent};
use crate::core::store::{Store, test_store};

use super::{RunLifecycle, TransitionPolicy};

pub(super) async fn fixture(policy: TransitionPolicy) -> (Store, RunLifecycle, AgentRecord) {
    let store = test_store().await;
    let lifecycle = RunLifecycle::new(store.clone(), RunSignals::new(), policy);
    let agent = store
        .insert_agent(&NewAgent {
            name: "planner".into(),
            description: Some("plans trips".into()),
            role: "travel agent".into(),
            goal: "book the cheapest route".into(),
            backstory: "spent a decade at an airline".into(),
            is_active: true,
        })
        .await
        .expect("seed agent");
    (store, lifecycle, agent)
}
