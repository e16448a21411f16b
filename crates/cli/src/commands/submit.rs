use chrono::NaiveDate;
use clap::Args;

use leaveflow_core::domain::leave::{EmployeeId, LeaveKind, Requester};
use leaveflow_core::flows::LeaveApplication;
use leaveflow_db::repositories::{ApproverDirectory, SqlApproverDirectory};

use crate::commands::{
    build_runtime, build_workflow, correlation_id, load_config, open_pool, repository_failure,
    workflow_failure, CommandResult, Failure,
};

#[derive(Debug, Clone, Args)]
pub struct SubmitArgs {
    #[arg(long)]
    pub employee: String,
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub role_id: String,
    #[arg(long)]
    pub role_name: String,
    #[arg(long)]
    pub division: String,
    #[arg(
        long,
        value_parser = parse_kind,
        help = "cuti|sakit|izin|datang_terlambat|meninggalkan_pekerjaan"
    )]
    pub kind: LeaveKind,
    #[arg(long, help = "First day, YYYY-MM-DD")]
    pub start: NaiveDate,
    #[arg(long, help = "Last day for cuti, YYYY-MM-DD")]
    pub end: Option<NaiveDate>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long, help = "First-layer approver; defaults to the division's approver")]
    pub first_approver: Option<String>,
}

pub fn run(args: SubmitArgs) -> CommandResult {
    let config = match load_config("submit") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("submit") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let correlation_id = correlation_id();

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let top_level = config.role_classifier().is_top_level(&args.role_name);

        let first_approver_id = match args.first_approver {
            Some(approver) => Some(EmployeeId(approver)),
            None if top_level => None,
            None => {
                let resolved = SqlApproverDirectory::new(pool.clone())
                    .manager_for_division(&args.division)
                    .await
                    .map_err(repository_failure)?;
                if resolved.is_none() {
                    return Err((
                        "approver_resolution",
                        format!(
                            "division `{}` has no active first-layer approver; pass \
                             --first-approver or seed one with `leaveflow seed division-approver`",
                            args.division
                        ),
                        6u8,
                    ));
                }
                resolved
            }
        };

        let application = LeaveApplication {
            requester: Requester {
                employee_id: EmployeeId(args.employee),
                full_name: args.name,
                role_id: args.role_id,
                role_name: args.role_name,
                division_code: args.division,
            },
            kind: args.kind,
            start_date: args.start,
            end_date: args.end,
            description: args.description,
            first_approver_id,
        };

        let workflow = build_workflow(pool.clone(), &config)?;
        let receipt = workflow
            .submit(application, &correlation_id)
            .await
            .map_err(|error| workflow_failure(error, &correlation_id))?;
        pool.close().await;
        Ok::<_, Failure>(receipt)
    });

    match result {
        Ok(receipt) => CommandResult::success_with_data(
            "submit",
            format!("leave request `{}` is {}", receipt.id.0, receipt.status.as_str()),
            &receipt,
        ),
        Err(failure) => CommandResult::from_failure("submit", failure),
    }
}

fn parse_kind(value: &str) -> Result<LeaveKind, String> {
    LeaveKind::parse(value).ok_or_else(|| format!("unknown leave kind `{value}`"))
}
