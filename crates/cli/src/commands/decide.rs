use clap::Args;

use leaveflow_core::domain::leave::{EmployeeId, LeaveRequestId};
use leaveflow_core::flows::{Decision, DecisionAction};

use crate::commands::{
    build_runtime, build_workflow, correlation_id, load_config, open_pool, workflow_failure,
    CommandResult, Failure,
};

#[derive(Debug, Clone, Args)]
pub struct DecideArgs {
    #[arg(long)]
    pub request: String,
    #[arg(long, help = "Employee id of the deciding approver")]
    pub actor: String,
    #[arg(long, value_parser = parse_action, help = "approve|reject")]
    pub action: DecisionAction,
    #[arg(long, help = "Approval notes, or the rejection reason (required to reject)")]
    pub notes: Option<String>,
    #[arg(long, help = "Refuse the decision unless the request is still at this version")]
    pub expected_version: Option<u32>,
}

pub fn run(args: DecideArgs) -> CommandResult {
    let config = match load_config("decide") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("decide") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let correlation_id = correlation_id();

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let workflow = build_workflow(pool.clone(), &config)?;
        let decision = Decision {
            actor_id: EmployeeId(args.actor),
            action: args.action,
            notes: args.notes,
            expected_version: args.expected_version,
        };

        let receipt = workflow
            .decide(&LeaveRequestId(args.request), decision, &correlation_id)
            .await
            .map_err(|error| workflow_failure(error, &correlation_id))?;
        pool.close().await;
        Ok::<_, Failure>(receipt)
    });

    match result {
        Ok(receipt) => CommandResult::success_with_data(
            "decide",
            format!("leave request `{}` is now {}", receipt.id.0, receipt.status.as_str()),
            &receipt,
        ),
        Err(failure) => CommandResult::from_failure("decide", failure),
    }
}

fn parse_action(value: &str) -> Result<DecisionAction, String> {
    DecisionAction::parse(value).ok_or_else(|| format!("unknown action `{value}`"))
}
