use std::time::Duration;

use async_stream::try_stream;
use futures_util::Stream;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::core::error::ServiceError;
use crate::core::signals::RunSignals;
use crate::core::store::Store;
use crate::core::store::types::{OutputRecord, OutputType, RunStatus};

/// One notification in a run subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    Output {
        output: OutputRecord,
    },
    StatusUpdate {
        status: RunStatus,
    },
    Complete {
        #[serde(skip_serializing_if = "Option::is_none")]
        final_result: Option<String>,
    },
}

impl RunEvent {
    pub fn is_complete(&self) -> bool {
        matches!(self, RunEvent::Complete { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Longest wait between two store reads.
    pub poll_interval: Duration,
    /// Ends the subscription, without a `complete` event, once exceeded.
    pub max_duration: Option<Duration>,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_duration: None,
        }
    }
}

/// Newline-joined `result` contents in ascending id order; `None` when the
/// run produced no results.
pub fn final_result(outputs: &[OutputRecord]) -> Option<String> {
    let mut results: Vec<&OutputRecord> = outputs
        .iter()
        .filter(|o| o.output_type == OutputType::Result)
        .collect();
    if results.is_empty() {
        return None;
    }
    results.sort_by_key(|o| o.id);
    Some(
        results
            .iter()
            .map(|o| o.content.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

/// Turns store state into per-run event streams.
#[derive(Clone)]
pub struct ProgressNotifier {
    store: Store,
    signals: RunSignals,
    defaults: SubscribeOptions,
}

impl ProgressNotifier {
    pub fn new(store: Store, signals: RunSignals, defaults: SubscribeOptions) -> Self {
        Self {
            store,
            signals,
            defaults,
        }
    }

    pub fn defaults(&self) -> SubscribeOptions {
        self.defaults
    }

    pub fn subscribe(
        &self,
        run_id: i64,
    ) -> impl Stream<Item = Result<RunEvent, ServiceError>> + Send + 'static {
        self.subscribe_with(run_id, self.defaults)
    }

    /// Nothing is read until the first poll. A missing run surfaces as an
    /// `Err(NotFound)` item, after which the stream ends.
    pub fn subscribe_with(
        &self,
        run_id: i64,
        options: SubscribeOptions,
    ) -> impl Stream<Item = Result<RunEvent, ServiceError>> + Send + 'static {
        let store = self.store.clone();
        let signals = self.signals.clone();

        try_stream! {
            // watch before the first read so no write slips between them
            let mut watch = signals.watch(run_id);
            let deadline = options.max_duration.map(|d| Instant::now() + d);

            let run = store
                .get_run(run_id)
                .await?
                .ok_or_else(|| ServiceError::run_not_found(run_id))?;
            info!("Subscription opened for run {} ({})", run_id, run.status);

            let mut last_status = run.status;
            let mut last_output_id = 0;

            if last_status.is_terminal() {
                let outputs = store.list_outputs_after(run_id, 0).await?;
                let result = final_result(&outputs);
                for output in outputs {
                    yield RunEvent::Output { output };
                }
                yield RunEvent::Complete { final_result: result };
                debug!("Subscription for finished run {} replayed", run_id);
                return;
            }

            loop {
                for output in store.list_outputs_after(run_id, last_output_id).await? {
                    last_output_id = output.id;
                    yield RunEvent::Output { output };
                }

                let current = store
                    .get_run(run_id)
                    .await?
                    .ok_or_else(|| ServiceError::run_not_found(run_id))?;
                if current.status != last_status {
                    last_status = current.status;
                    yield RunEvent::StatusUpdate { status: last_status };
                }

                if last_status.is_terminal() {
                    // outputs written between the first read and the status change
                    for output in store.list_outputs_after(run_id, last_output_id).await? {
                        yield RunEvent::Output { output };
                    }
                    let all = store.list_outputs_after(run_id, 0).await?;
                    yield RunEvent::Complete { final_result: final_result(&all) };
                    info!("Subscription for run {} completed ({})", run_id, last_status);
                    break;
                }

                let expired = tokio::select! {
                    _ = tokio::time::sleep(options.poll_interval) => false,
                    _ = watch.changed() => false,
                    _ = wait_until(deadline) => true,
                };
                if expired {
                    info!("Subscription for run {} reached its time limit", run_id);
                    break;
                }
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}
