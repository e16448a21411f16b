use serde::Serialize;

use leaveflow_core::domain::approval::ApprovalRecord;
use leaveflow_core::domain::leave::{EmployeeId, LeaveRequest, LeaveRequestId, LeaveStatus};
use leaveflow_core::effects::EffectFailure;
use leaveflow_core::signature::ApprovalSigner;
use leaveflow_db::repositories::{
    ApprovalRecordRepository, EffectFailureRepository, LeaveRequestRepository,
    SqlApprovalRecordRepository, SqlEffectFailureSink, SqlLeaveRequestRepository,
};

use crate::commands::{
    build_runtime, load_config, open_pool, repository_failure, CommandResult, Failure,
};

#[derive(Debug, Serialize)]
struct VerifiedApproval {
    #[serde(flatten)]
    record: ApprovalRecord,
    signature_valid: bool,
}

#[derive(Debug, Serialize)]
struct RequestView {
    request: LeaveRequest,
    approvals: Vec<VerifiedApproval>,
    effect_failures: Vec<EffectFailure>,
}

#[derive(Debug, Serialize)]
struct InboxEntry {
    id: LeaveRequestId,
    employee_id: EmployeeId,
    employee_name: String,
    kind: &'static str,
    status: LeaveStatus,
    duration_days: u32,
    state_version: u32,
}

/// Prints one request with its approval trail (signatures re-verified) and
/// any captured side-effect failures.
pub fn run(request_id: String) -> CommandResult {
    let config = match load_config("show") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("show") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let signer = ApprovalSigner::new(config.signing.secret.clone());
    let id = LeaveRequestId(request_id);

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let request = SqlLeaveRequestRepository::new(pool.clone())
            .find_by_id(&id)
            .await
            .map_err(repository_failure)?
            .ok_or_else(|| {
                ("not_found", format!("leave request `{}` does not exist", id.0), 6u8)
            })?;
        let approvals = SqlApprovalRecordRepository::new(pool.clone())
            .list_for_request(&id)
            .await
            .map_err(repository_failure)?
            .into_iter()
            .map(|record| VerifiedApproval { signature_valid: signer.verify(&record), record })
            .collect();
        let effect_failures = SqlEffectFailureSink::new(pool.clone())
            .list_for_request(&id)
            .await
            .map_err(repository_failure)?;
        pool.close().await;
        Ok::<_, Failure>(RequestView { request, approvals, effect_failures })
    });

    match result {
        Ok(view) => {
            let message = format!(
                "leave request `{}` is {} at level {}/{}",
                view.request.id.0,
                view.request.status.as_str(),
                view.request.approval_level,
                view.request.max_approval_level
            );
            CommandResult::success_with_data("show", message, &view)
        }
        Err(failure) => CommandResult::from_failure("show", failure),
    }
}

/// Lists the requests currently waiting on `approver`.
pub fn run_inbox(approver: String) -> CommandResult {
    let config = match load_config("inbox") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("inbox") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let approver_id = EmployeeId(approver);

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let awaiting = SqlLeaveRequestRepository::new(pool.clone())
            .list_awaiting(&approver_id)
            .await
            .map_err(repository_failure)?;
        pool.close().await;
        Ok::<_, Failure>(awaiting)
    });

    match result {
        Ok(awaiting) => {
            let entries: Vec<InboxEntry> = awaiting
                .into_iter()
                .map(|request| InboxEntry {
                    kind: request.kind.as_str(),
                    status: request.status,
                    duration_days: request.duration_days,
                    state_version: request.state_version,
                    employee_name: request.requester.full_name,
                    employee_id: request.requester.employee_id,
                    id: request.id,
                })
                .collect();
            let message = format!("{} request(s) awaiting `{}`", entries.len(), approver_id.0);
            CommandResult::success_with_data("inbox", message, &entries)
        }
        Err(failure) => CommandResult::from_failure("inbox", failure),
    }
}
