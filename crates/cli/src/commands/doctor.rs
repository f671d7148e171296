use countersign_core::config::{AppConfig, LoadOptions};
use countersign_core::store::RuleStore;
use countersign_db::{connect_with_settings, migrations, SqlRuleStore};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.extend(database_checks(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            checks.push(DoctorCheck {
                name: "rule_catalog",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn database_checks(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            }];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Fail,
                        details: error.to_string(),
                    },
                    DoctorCheck {
                        name: "rule_catalog",
                        status: CheckStatus::Skipped,
                        details: "skipped because the database is unreachable".to_string(),
                    },
                ];
            }
        };

        let mut checks = vec![DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: "database connection established".to_string(),
        }];

        if let Err(error) = migrations::run_pending(&pool).await {
            checks.push(DoctorCheck {
                name: "rule_catalog",
                status: CheckStatus::Fail,
                details: format!("migrations failed: {error}"),
            });
            pool.close().await;
            return checks;
        }

        // An engine with no active rules rejects every submission, so an
        // empty catalog is a readiness failure, not a warning.
        match SqlRuleStore::new(pool.clone()).list_active().await {
            Ok(rules) if rules.is_empty() => checks.push(DoctorCheck {
                name: "rule_catalog",
                status: CheckStatus::Fail,
                details: "no active approval rules; run `countersign seed` or create rules"
                    .to_string(),
            }),
            Ok(rules) => checks.push(DoctorCheck {
                name: "rule_catalog",
                status: CheckStatus::Pass,
                details: format!("{} active approval rules", rules.len()),
            }),
            Err(error) => checks.push(DoctorCheck {
                name: "rule_catalog",
                status: CheckStatus::Fail,
                details: error.to_string(),
            }),
        }

        pool.close().await;
        checks
    })
}

fn render_human(report: &DoctorReport) -> String {
    let mut output = String::new();
    output.push_str(&report.summary);
    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Skipped => "skip",
        };
        output.push_str(&format!("\n  [{marker}] {}: {}", check.name, check.details));
    }
    output
}

fn escape_json(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}
