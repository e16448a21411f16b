use clap::Subcommand;
use serde::Serialize;

use leaveflow_core::domain::leave::EmployeeId;
use leaveflow_core::ledger::{QuotaAdjustment, QuotaBalance};
use leaveflow_db::repositories::{QuotaLedgerRepository, SqlQuotaLedgerRepository};

use crate::commands::{
    build_runtime, build_workflow, correlation_id, load_config, open_pool, repository_failure,
    workflow_failure, CommandResult, Failure,
};

#[derive(Debug, Clone, Subcommand)]
pub enum QuotaCommand {
    #[command(about = "Show an employee's ledger entry and adjustment trail for a year")]
    Show {
        #[arg(long)]
        employee: String,
        #[arg(long)]
        year: i32,
    },
    #[command(about = "Resize an employee's yearly total with a recorded justification")]
    Adjust {
        #[arg(long)]
        employee: String,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        total: u32,
        #[arg(long)]
        justification: String,
        #[arg(long, help = "Employee id of the administrator making the change")]
        actor: String,
    },
}

#[derive(Debug, Serialize)]
struct LedgerView {
    balance: Option<QuotaBalance>,
    adjustments: Vec<QuotaAdjustment>,
}

pub fn run(command: QuotaCommand) -> CommandResult {
    let config = match load_config("quota") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("quota") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;

        let outcome = match command {
            QuotaCommand::Show { employee, year } => {
                let employee_id = EmployeeId(employee);
                let ledger = SqlQuotaLedgerRepository::new(pool.clone());
                let balance =
                    ledger.find(&employee_id, year).await.map_err(repository_failure)?;
                let adjustments = ledger
                    .list_adjustments(&employee_id, year)
                    .await
                    .map_err(repository_failure)?;
                let message = match &balance {
                    Some(balance) => format!(
                        "`{}` {year}: {} remaining of {} ({} used, {} pending)",
                        employee_id.0,
                        balance.remaining,
                        balance.total,
                        balance.used,
                        balance.pending
                    ),
                    None => format!("`{}` has no ledger entry for {year} yet", employee_id.0),
                };
                (message, LedgerView { balance, adjustments })
            }
            QuotaCommand::Adjust { employee, year, total, justification, actor } => {
                let correlation_id = correlation_id();
                let employee_id = EmployeeId(employee);
                let workflow = build_workflow(pool.clone(), &config)?;
                let balance = workflow
                    .adjust_quota(
                        &employee_id,
                        year,
                        total,
                        &justification,
                        &EmployeeId(actor),
                        &correlation_id,
                    )
                    .await
                    .map_err(|error| workflow_failure(error, &correlation_id))?;
                let adjustments = SqlQuotaLedgerRepository::new(pool.clone())
                    .list_adjustments(&employee_id, year)
                    .await
                    .map_err(repository_failure)?;
                let message = format!(
                    "`{}` {year} total set to {}; {} remaining",
                    employee_id.0, balance.total, balance.remaining
                );
                (message, LedgerView { balance: Some(balance), adjustments })
            }
        };

        pool.close().await;
        Ok::<_, Failure>(outcome)
    });

    match result {
        Ok((message, view)) => CommandResult::success_with_data("quota", message, &view),
        Err(failure) => CommandResult::from_failure("quota", failure),
    }
}
