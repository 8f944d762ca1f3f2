use tracing::debug;

use crate::core::error::ServiceError;
use crate::core::signals::RunSignals;
use crate::core::store::Store;
use crate::core::store::types::{NewOutput, OutputRecord};

/// Appends outputs to runs. Recording never touches run status.
#[derive(Clone)]
pub struct OutputRecorder {
    store: Store,
    signals: RunSignals,
}

impl OutputRecorder {
    pub fn new(store: Store, signals: RunSignals) -> Self {
        Self { store, signals }
    }

    pub async fn record(&self, run_id: i64, output: &NewOutput) -> Result<OutputRecord, ServiceError> {
        if self.store.get_run(run_id).await?.is_none() {
            return Err(ServiceError::run_not_found(run_id));
        }

        let rec = self
            .store
            .insert_output(run_id, output.output_type, &output.content, output.timestamp)
            .await?;
        debug!("Run {} output {} ({})", run_id, rec.id, rec.output_type.as_str());
        self.signals.publish(run_id);
        Ok(rec)
    }
}
