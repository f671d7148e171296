use countersign_core::config::{AppConfig, LoadOptions, LogFormat};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct EffectiveConfig {
    database_url: String,
    database_max_connections: u32,
    database_timeout_secs: u64,
    server_bind_address: String,
    server_port: u16,
    server_graceful_shutdown_secs: u64,
    escalation_sweep_interval_secs: u64,
    escalation_enabled: bool,
    notify_webhook_url: Option<String>,
    notify_signing_secret: &'static str,
    notify_timeout_secs: u64,
    logging_level: String,
    logging_format: &'static str,
}

/// Effective configuration after file, environment, and override layering.
/// Secrets are reported by presence only.
pub fn run() -> String {
    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            let effective = EffectiveConfig {
                database_url: config.database.url.clone(),
                database_max_connections: config.database.max_connections,
                database_timeout_secs: config.database.timeout_secs,
                server_bind_address: config.server.bind_address.clone(),
                server_port: config.server.port,
                server_graceful_shutdown_secs: config.server.graceful_shutdown_secs,
                escalation_sweep_interval_secs: config.escalation.sweep_interval_secs,
                escalation_enabled: config.escalation.enabled,
                notify_webhook_url: config.notify.webhook_url.clone(),
                notify_signing_secret: if config.notify.signing_secret.is_some() {
                    "<redacted>"
                } else {
                    "<unset>"
                },
                notify_timeout_secs: config.notify.timeout_secs,
                logging_level: config.logging.level.clone(),
                logging_format: match config.logging.format {
                    LogFormat::Compact => "compact",
                    LogFormat::Pretty => "pretty",
                    LogFormat::Json => "json",
                },
            };
            serde_json::to_string_pretty(&effective)
                .unwrap_or_else(|error| format!("config serialization failed: {error}"))
        }
        Err(error) => format!("configuration is invalid: {error}"),
    }
}
