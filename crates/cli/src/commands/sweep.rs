use chrono::Utc;

use crate::commands::CommandResult;
use countersign_core::config::{AppConfig, LoadOptions};
use countersign_core::engine::WorkflowEngine;
use countersign_core::notify::NoopNotifier;
use countersign_db::{connect_with_settings, migrations, SqlRuleStore, SqlWorkflowStore};

/// One escalation sweep, for deployments that drive escalation from an
/// external timer (cron) instead of the in-server interval task. State
/// changes (escalation counters, history entries) are identical to the
/// server's sweep; webhook delivery happens only in the server deployment.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "sweep",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "sweep",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let engine = WorkflowEngine::new(
            SqlWorkflowStore::new(pool.clone()),
            SqlRuleStore::new(pool.clone()),
            NoopNotifier,
        );
        let report = engine
            .tick(Utc::now())
            .await
            .map_err(|error| ("sweep_execution", error.to_string(), 6u8))?;

        pool.close().await;
        Ok::<countersign_core::SweepReport, (&'static str, String, u8)>(report)
    });

    match result {
        Ok(report) => CommandResult::success(
            "sweep",
            format!(
                "scanned {} open workflows; escalated {}; skipped {} on commit conflicts",
                report.scanned,
                report.escalated.len(),
                report.conflicts.len()
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("sweep", error_class, message, exit_code)
        }
    }
}
