use std::env;
use std::sync::{Mutex, OnceLock};

use countersign_cli::commands::{migrate, seed, sweep};
use serde_json::Value;

const MEMORY_DB: &[(&str, &str)] = &[
    ("COUNTERSIGN_DATABASE_URL", "sqlite::memory:?cache=shared"),
    ("COUNTERSIGN_DATABASE_MAX_CONNECTIONS", "1"),
];

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(MEMORY_DB, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_with_invalid_database_url() {
    with_env(&[("COUNTERSIGN_DATABASE_URL", "postgres://not-sqlite")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_returns_deterministic_rule_summary() {
    with_env(MEMORY_DB, || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected deterministic seed success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("deterministic_demo_rule_catalog"));
        assert!(message.contains("rule-petty-cash: Petty cash"));
        assert!(message.contains("rule-standard: Standard purchases"));
        assert!(message.contains("rule-high-value: High-value purchases"));
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    with_env(MEMORY_DB, || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let first_payload = parse_payload(&first.output);

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        let second_payload = parse_payload(&second.output);

        assert_eq!(first_payload["message"], second_payload["message"]);
    });
}

#[test]
fn sweep_reports_an_empty_scan_on_a_fresh_database() {
    with_env(MEMORY_DB, || {
        let result = sweep::run();
        assert_eq!(result.exit_code, 0, "expected sweep success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "sweep");
        assert_eq!(payload["status"], "ok");
        assert!(payload["message"]
            .as_str()
            .unwrap_or("")
            .contains("scanned 0 open workflows"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "COUNTERSIGN_DATABASE_URL",
        "COUNTERSIGN_DATABASE_MAX_CONNECTIONS",
        "COUNTERSIGN_DATABASE_TIMEOUT_SECS",
        "COUNTERSIGN_SERVER_BIND_ADDRESS",
        "COUNTERSIGN_SERVER_PORT",
        "COUNTERSIGN_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "COUNTERSIGN_ESCALATION_SWEEP_INTERVAL_SECS",
        "COUNTERSIGN_ESCALATION_ENABLED",
        "COUNTERSIGN_NOTIFY_WEBHOOK_URL",
        "COUNTERSIGN_NOTIFY_SIGNING_SECRET",
        "COUNTERSIGN_NOTIFY_TIMEOUT_SECS",
        "COUNTERSIGN_LOGGING_LEVEL",
        "COUNTERSIGN_LOGGING_FORMAT",
        "COUNTERSIGN_LOG_LEVEL",
        "COUNTERSIGN_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
