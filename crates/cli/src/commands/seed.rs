use clap::Subcommand;

use leaveflow_core::domain::directory::{
    AccountStatus, DivisionApprover, EmployeeAccount, HrApproverEntry,
};
use leaveflow_core::domain::leave::EmployeeId;
use leaveflow_db::repositories::{
    ApproverDirectory, QuotaLedgerRepository, SqlApproverDirectory, SqlQuotaLedgerRepository,
};

use crate::commands::{build_runtime, load_config, open_pool, repository_failure, CommandResult};

/// Directory and allotment rows the workflow reads. Every target is an upsert.
#[derive(Debug, Clone, Subcommand)]
pub enum SeedCommand {
    #[command(about = "Create or update an employee account")]
    Employee {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long, help = "Mark the account inactive")]
        inactive: bool,
    },
    #[command(about = "Map a division to its first-layer approver")]
    DivisionApprover {
        #[arg(long)]
        division: String,
        #[arg(long)]
        approver: String,
        #[arg(long)]
        inactive: bool,
    },
    #[command(about = "Register an HR approver entry (division-bound or generic)")]
    HrApprover {
        #[arg(long)]
        id: String,
        #[arg(long)]
        employee: String,
        #[arg(long)]
        division: Option<String>,
        #[arg(long)]
        generic: bool,
        #[arg(long)]
        inactive: bool,
    },
    #[command(about = "Set the default annual leave days for a year")]
    Allotment {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        days: u32,
    },
}

pub fn run(target: SeedCommand) -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let directory = SqlApproverDirectory::new(pool.clone());

        let message = match target {
            SeedCommand::Employee { id, name, inactive } => {
                let status =
                    if inactive { AccountStatus::Inactive } else { AccountStatus::Active };
                let message = format!("employee `{id}` saved as {}", status.as_str());
                directory
                    .save_employee(EmployeeAccount {
                        employee_id: EmployeeId(id),
                        full_name: name,
                        status,
                    })
                    .await
                    .map_err(repository_failure)?;
                message
            }
            SeedCommand::DivisionApprover { division, approver, inactive } => {
                let message = format!("division `{division}` approver set to `{approver}`");
                directory
                    .save_division_approver(DivisionApprover {
                        division_code: division,
                        approver_id: EmployeeId(approver),
                        active: !inactive,
                    })
                    .await
                    .map_err(repository_failure)?;
                message
            }
            SeedCommand::HrApprover { id, employee, division, generic, inactive } => {
                let scope = match (&division, generic) {
                    (Some(division), _) => format!("division `{division}`"),
                    (None, true) => "generic".to_string(),
                    (None, false) => "unscoped".to_string(),
                };
                let message = format!("hr approver `{id}` ({scope}) saved for `{employee}`");
                directory
                    .save_hr_approver(HrApproverEntry {
                        id,
                        employee_id: EmployeeId(employee),
                        division_code: division,
                        is_generic: generic,
                        active: !inactive,
                    })
                    .await
                    .map_err(repository_failure)?;
                message
            }
            SeedCommand::Allotment { year, days } => {
                SqlQuotaLedgerRepository::new(pool.clone())
                    .set_year_allotment(year, days)
                    .await
                    .map_err(repository_failure)?;
                format!("allotment for {year} set to {days} days")
            }
        };

        pool.close().await;
        Ok::<String, (&'static str, String, u8)>(message)
    });

    match result {
        Ok(message) => CommandResult::success("seed", message),
        Err(failure) => CommandResult::from_failure("seed", failure),
    }
}
