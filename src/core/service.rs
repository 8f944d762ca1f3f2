use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::agents::AgentManager;
use crate::core::config::RunboardConfig;
use crate::core::notifier::ProgressNotifier;
use crate::core::outputs::OutputRecorder;
use crate::core::query::QueryFacade;
use crate::core::runs::RunLifecycle;
use crate::core::signals::RunSignals;
use crate::core::store::Store;
use crate::core::store::types::now;

#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// Every run-service component, wired to one store and one signal hub.
///
/// The hub itself is not exposed; writers publish through `runs` and
/// `outputs`, readers wait through `notifier`.
#[derive(Clone)]
pub struct Services {
    pub store: Store,
    pub agents: AgentManager,
    pub runs: RunLifecycle,
    pub outputs: OutputRecorder,
    pub notifier: ProgressNotifier,
    pub query: QueryFacade,
}

impl Services {
    pub fn new(store: Store, config: &RunboardConfig) -> Self {
        let signals = RunSignals::new();
        Self {
            agents: AgentManager::new(store.clone()),
            runs: RunLifecycle::new(
                store.clone(),
                signals.clone(),
                config.runs.transition_policy,
            ),
            outputs: OutputRecorder::new(store.clone(), signals.clone()),
            notifier: ProgressNotifier::new(
                store.clone(),
                signals.clone(),
                config.subscribe_options(),
            ),
            query: QueryFacade::new(store.clone()),
            store,
        }
    }

    pub async fn healthcheck(&self) -> Health {
        let status = if self.store.is_open().await {
            "ok"
        } else {
            "unavailable"
        };
        Health {
            status,
            timestamp: now(),
        }
    }
}

#[cfg(test)]
pub(crate) async fn test_services() -> Services {
    let mut config = RunboardConfig::default();
    config.stream.poll_interval_ms = 20;
    Services::new(crate::core::store::test_store().await, &config)
}
