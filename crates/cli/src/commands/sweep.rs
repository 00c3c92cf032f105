use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use souk_core::{
    ChannelNotifier, NegotiationManager, Notification, Notifier, SweepReport, Sweeper,
};
use souk_db::SqliteStore;

use crate::commands::{build_runtime, load_config, open_database, CommandResult, StepError};

const NOTIFICATION_BUFFER: usize = 4096;

#[derive(Debug, Clone, Copy, Default)]
pub struct SweepOptions {
    pub at: Option<DateTime<Utc>>,
    pub skip_auto_conversion: bool,
}

#[derive(Debug, Serialize)]
struct SweepOutput {
    as_of: DateTime<Utc>,
    report: SweepReport,
    /// Not delivered by this command; listed so an operator can forward them.
    undelivered_notifications: Vec<Notification>,
}

pub fn run(options: SweepOptions) -> CommandResult {
    let config = match load_config("sweep") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("sweep") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result: Result<SweepOutput, StepError> = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let store = SqliteStore::new(pool.clone());
        let (notifier, mut notifications) = ChannelNotifier::new(NOTIFICATION_BUFFER);
        let notifier: Arc<dyn Notifier> = Arc::new(notifier);

        let mut auto_conversion = config.auto_conversion.clone();
        if options.skip_auto_conversion {
            auto_conversion.enabled = false;
        }
        let sweeper = Sweeper::new(
            store.clone(),
            NegotiationManager::new(store, notifier, config.negotiation.clone()),
            auto_conversion,
        );

        let as_of = options.at.unwrap_or_else(Utc::now);
        let report = sweeper
            .run_sweep_at(as_of)
            .await
            .map_err(|error| ("sweep_execution", error.to_string(), 6u8))?;

        let mut undelivered_notifications = Vec::new();
        while let Ok(notification) = notifications.try_recv() {
            undelivered_notifications.push(notification);
        }
        pool.close().await;

        Ok::<SweepOutput, StepError>(SweepOutput { as_of, report, undelivered_notifications })
    });

    match result {
        Ok(output) => {
            let mut message = format!(
                "sweep completed with {} change(s) as of {}",
                output.report.total_changes(),
                output.as_of.to_rfc3339()
            );
            if !output.undelivered_notifications.is_empty() {
                message.push_str(&format!(
                    "; {} notification(s) were not delivered and are listed in details",
                    output.undelivered_notifications.len()
                ));
            }
            CommandResult::success_with_details("sweep", message, &output)
        }
        Err(step) => CommandResult::from_step("sweep", step),
    }
}
