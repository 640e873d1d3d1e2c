use relay_core::config::{AppConfig, LoadOptions};
use serde::Serialize;

use super::{serialize_payload, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
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

pub fn run(json_output: bool) -> CommandResult {
    run_with(LoadOptions::default(), json_output)
}

pub fn run_with(options: LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Fail { 1 } else { 0 };

    let output = if json_output { serialize_payload(&report) } else { render_human(&report) };
    CommandResult { exit_code, output }
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_catalog(&config));
            checks.push(check_quote_forwarding(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["catalog_integrity", "quote_forwarding"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let warned = checks.iter().any(|check| check.status == CheckStatus::Warn);
    let (overall_status, summary) = match (failed, warned) {
        (true, _) => (CheckStatus::Fail, "doctor: one or more readiness checks failed"),
        (false, true) => (CheckStatus::Warn, "doctor: ready, with warnings"),
        (false, false) => (CheckStatus::Pass, "doctor: all readiness checks passed"),
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

fn check_catalog(config: &AppConfig) -> DoctorCheck {
    let catalog = &config.catalog;
    let unresolved = catalog.unresolved_templates();
    if unresolved.is_empty() {
        return DoctorCheck {
            name: "catalog_integrity",
            status: CheckStatus::Pass,
            details: format!(
                "{} trigger field(s), {} template(s)",
                catalog.triggers().len(),
                catalog.templates().count()
            ),
        };
    }

    DoctorCheck {
        name: "catalog_integrity",
        status: CheckStatus::Warn,
        details: format!(
            "trigger(s) name templates with no descriptor and will report unknown_template: {}",
            unresolved.join(", ")
        ),
    }
}

fn check_quote_forwarding(config: &AppConfig) -> DoctorCheck {
    if !config.catalog.uses_quote_forward() {
        return DoctorCheck {
            name: "quote_forwarding",
            status: CheckStatus::Skipped,
            details: "no template uses the quote_forward rule".to_string(),
        };
    }

    DoctorCheck {
        name: "quote_forwarding",
        status: CheckStatus::Pass,
        details: format!(
            "forwarding to `{}`",
            config.quote.endpoint.as_deref().unwrap_or("<unset>")
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
