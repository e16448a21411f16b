use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use chrono::NaiveDate;
use leaveflow_cli::commands::decide::DecideArgs;
use leaveflow_cli::commands::quota::QuotaCommand;
use leaveflow_cli::commands::seed::SeedCommand;
use leaveflow_cli::commands::submit::SubmitArgs;
use leaveflow_cli::commands::{decide, doctor, migrate, quota, seed, show, submit};
use leaveflow_core::domain::leave::LeaveKind;
use leaveflow_core::flows::DecisionAction;
use serde_json::Value;
use tempfile::TempDir;

const SECRET: &str = "cli-test-signing-secret";

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(
        &[("LEAVEFLOW_SIGNING_SECRET", SECRET), ("LEAVEFLOW_DATABASE_URL", "sqlite::memory:")],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 0, "expected successful migrate run");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "migrate");
            assert_eq!(payload["status"], "ok");
        },
    );
}

#[test]
fn migrate_returns_config_failure_without_signing_secret() {
    with_env(&[("LEAVEFLOW_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_reports_unmigrated_schema_until_migrate_runs() {
    let workspace = Workspace::new();
    with_env(&workspace.env(), || {
        let before = parse_payload(&doctor::run(true));
        assert_eq!(before["overall_status"], "fail");
        assert_eq!(check(&before, "database_connectivity")["status"], "pass");
        assert_eq!(check(&before, "schema_migrations")["status"], "fail");

        assert_eq!(migrate::run().exit_code, 0);

        let after = parse_payload(&doctor::run(true));
        assert_eq!(after["overall_status"], "pass", "doctor report: {after}");
        assert_eq!(check(&after, "document_renderer")["status"], "pass");
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[], || {
        let report = parse_payload(&doctor::run(true));
        assert_eq!(report["overall_status"], "fail");
        assert_eq!(check(&report, "config_validation")["status"], "fail");
        assert_eq!(check(&report, "schema_migrations")["status"], "skipped");
    });
}

#[test]
fn full_approval_flow_runs_through_the_cli() {
    let workspace = Workspace::new();
    with_env(&workspace.env(), || {
        seed_directory();

        let submitted = submit::run(staff_request());
        assert_eq!(submitted.exit_code, 0, "submit output: {}", submitted.output);
        let submitted = parse_payload(&submitted.output);
        assert_eq!(submitted["data"]["status"], "waiting_manager");
        assert_eq!(submitted["data"]["current_approver_id"], "E-MGR");
        let request_id = submitted["data"]["id"].as_str().expect("request id").to_owned();

        let manager = parse_payload(&decide::run(decision(&request_id, "E-MGR")).output);
        assert_eq!(manager["status"], "ok", "manager decision: {manager}");
        assert_eq!(manager["data"]["status"], "waiting_hrd");
        assert_eq!(manager["data"]["next_approver_id"], "E-HR");

        let hr = parse_payload(&decide::run(decision(&request_id, "E-HR")).output);
        assert_eq!(hr["data"]["status"], "approved", "hr decision: {hr}");

        let shown = parse_payload(&show::run(request_id.clone()).output);
        let approvals = shown["data"]["approvals"].as_array().expect("approvals");
        assert_eq!(approvals.len(), 2);
        assert!(approvals.iter().all(|approval| approval["signature_valid"] == true));
        assert_eq!(shown["data"]["effect_failures"].as_array().map(Vec::len), Some(0));

        let final_document =
            shown["data"]["request"]["documents"]["final_document"].as_str().expect("final doc");
        assert!(Path::new(final_document).exists(), "missing {final_document}");
        assert!(final_document.starts_with(workspace.documents_dir()));

        let ledger = parse_payload(
            &quota::run(QuotaCommand::Show { employee: "E-STAFF".to_owned(), year: 2026 }).output,
        );
        assert_eq!(ledger["data"]["balance"]["used"], 3);
        assert_eq!(ledger["data"]["balance"]["pending"], 0);
        assert_eq!(ledger["data"]["balance"]["remaining"], 9);
    });
}

#[test]
fn refused_decisions_exit_with_their_error_class() {
    let workspace = Workspace::new();
    with_env(&workspace.env(), || {
        seed_directory();
        let submitted = parse_payload(&submit::run(staff_request()).output);
        let request_id = submitted["data"]["id"].as_str().expect("request id").to_owned();

        let outsider = decide::run(decision(&request_id, "E-HR"));
        assert_eq!(outsider.exit_code, 6);
        assert_eq!(parse_payload(&outsider.output)["error_class"], "authorization");

        let mut no_reason = decision(&request_id, "E-MGR");
        no_reason.action = DecisionAction::Reject;
        let no_reason = decide::run(no_reason);
        assert_eq!(parse_payload(&no_reason.output)["error_class"], "validation");

        let mut stale = decision(&request_id, "E-MGR");
        stale.expected_version = Some(7);
        let stale = decide::run(stale);
        assert_eq!(parse_payload(&stale.output)["error_class"], "concurrency_conflict");

        let missing = show::run("LV-missing".to_owned());
        assert_eq!(missing.exit_code, 6);
        assert_eq!(parse_payload(&missing.output)["error_class"], "not_found");
    });
}

#[test]
fn submit_without_a_division_approver_is_an_approver_resolution_failure() {
    let workspace = Workspace::new();
    with_env(&workspace.env(), || {
        let mut request = staff_request();
        request.division = "OPS".to_owned();

        let result = submit::run(request);

        assert_eq!(result.exit_code, 6);
        assert_eq!(parse_payload(&result.output)["error_class"], "approver_resolution");
    });
}

#[test]
fn quota_adjustment_requires_justification_and_records_the_trail() {
    let workspace = Workspace::new();
    with_env(&workspace.env(), || {
        seed_directory();
        let allotment = seed::run(SeedCommand::Allotment { year: 2026, days: 14 });
        assert_eq!(allotment.exit_code, 0);

        let blank = quota::run(adjust("  ", 20));
        assert_eq!(blank.exit_code, 6);
        assert_eq!(parse_payload(&blank.output)["error_class"], "validation");

        let adjusted = parse_payload(&quota::run(adjust("long service award", 20)).output);
        assert_eq!(adjusted["status"], "ok", "adjust output: {adjusted}");
        assert_eq!(adjusted["data"]["balance"]["total"], 20);
        let trail = adjusted["data"]["adjustments"].as_array().expect("trail");
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0]["previous_total"], 14);
        assert_eq!(trail[0]["justification"], "long service award");
    });
}

struct Workspace {
    _dir: TempDir,
    database_url: String,
    documents_dir: String,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let database_url = format!("sqlite://{}", dir.path().join("leaveflow.db").display());
        let documents_dir = dir.path().join("documents").display().to_string();
        Self { _dir: dir, database_url, documents_dir }
    }

    fn env(&self) -> Vec<(&str, &str)> {
        vec![
            ("LEAVEFLOW_SIGNING_SECRET", SECRET),
            ("LEAVEFLOW_DATABASE_URL", self.database_url.as_str()),
            ("LEAVEFLOW_DOCUMENTS_OUTPUT_DIR", self.documents_dir.as_str()),
        ]
    }

    fn documents_dir(&self) -> &str {
        &self.documents_dir
    }
}

fn seed_directory() {
    let targets = [
        employee("E-STAFF", "Sari"),
        employee("E-MGR", "Budi"),
        employee("E-HR", "Rina"),
        SeedCommand::DivisionApprover {
            division: "FIN".to_owned(),
            approver: "E-MGR".to_owned(),
            inactive: false,
        },
        SeedCommand::HrApprover {
            id: "HR-01".to_owned(),
            employee: "E-HR".to_owned(),
            division: None,
            generic: true,
            inactive: false,
        },
    ];
    for target in targets {
        let result = seed::run(target);
        assert_eq!(result.exit_code, 0, "seed output: {}", result.output);
    }
}

fn employee(id: &str, name: &str) -> SeedCommand {
    SeedCommand::Employee { id: id.to_owned(), name: name.to_owned(), inactive: false }
}

fn staff_request() -> SubmitArgs {
    SubmitArgs {
        employee: "E-STAFF".to_owned(),
        name: "Sari".to_owned(),
        role_id: "R-STAFF".to_owned(),
        role_name: "Staff Finance".to_owned(),
        division: "FIN".to_owned(),
        kind: LeaveKind::Cuti,
        start: NaiveDate::from_ymd_opt(2026, 3, 2).expect("date"),
        end: NaiveDate::from_ymd_opt(2026, 3, 4),
        description: None,
        first_approver: None,
    }
}

fn decision(request_id: &str, actor: &str) -> DecideArgs {
    DecideArgs {
        request: request_id.to_owned(),
        actor: actor.to_owned(),
        action: DecisionAction::Approve,
        notes: None,
        expected_version: None,
    }
}

fn adjust(justification: &str, total: u32) -> QuotaCommand {
    QuotaCommand::Adjust {
        employee: "E-STAFF".to_owned(),
        year: 2026,
        total,
        justification: justification.to_owned(),
        actor: "E-HR".to_owned(),
    }
}

fn check<'a>(report: &'a Value, name: &str) -> &'a Value {
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .expect("check present")
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "LEAVEFLOW_DATABASE_URL",
        "LEAVEFLOW_DATABASE_MAX_CONNECTIONS",
        "LEAVEFLOW_DATABASE_TIMEOUT_SECS",
        "LEAVEFLOW_QUOTA_DEFAULT_ANNUAL_DAYS",
        "LEAVEFLOW_WORKFLOW_TOP_LEVEL_ROLE_MARKERS",
        "LEAVEFLOW_SIGNING_SECRET",
        "LEAVEFLOW_DOCUMENTS_OUTPUT_DIR",
        "LEAVEFLOW_LOGGING_LEVEL",
        "LEAVEFLOW_LOGGING_FORMAT",
        "LEAVEFLOW_LOG_LEVEL",
        "LEAVEFLOW_LOG_FORMAT",
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
