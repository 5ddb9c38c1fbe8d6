use crate::ledger::CreditLedger;
use crate::phase::run_phase;
use crate::step::StepRegistry;
use crate::storage::Storage;
use chrono::Utc;
use refinecore::{
    Edge, EngineError, ExecutionId, ExecutionStatus, PhaseRecord, RunEnvironment, StepOutcome,
    UserId,
};
use std::time::Duration;

/// Outcome of one coordinator pass over an ordered phase list
#[derive(Debug, Clone, Copy)]
pub struct PassOutcome {
    pub status: ExecutionStatus,
    pub credits_consumed: u32,
    pub phases_run: usize,
}

/// Drives a run (or a resumption) across the ordered phase list, aggregates
/// consumed credits, detects suspension and finalizes the execution row.
pub(crate) struct Coordinator<'a> {
    pub store: &'a dyn Storage,
    pub ledger: &'a dyn CreditLedger,
    pub registry: &'a StepRegistry,
    pub step_timeout: Duration,
}

impl Coordinator<'_> {
    /// Walk the phases strictly sequentially. On resume this is invoked
    /// with only the phases still pending; the logic is identical.
    pub async fn run(
        &self,
        env: &mut RunEnvironment,
        execution_id: ExecutionId,
        phases: Vec<PhaseRecord>,
        edges: &[Edge],
        user_id: UserId,
    ) -> Result<PassOutcome, EngineError> {
        let mut failed = false;
        let mut credits = 0u32;
        let mut phases_run = 0usize;

        for phase in phases {
            let runner = self.registry.runner(phase.node.task_type)?;
            let result = run_phase(
                self.store,
                self.ledger,
                runner.as_ref(),
                phase,
                env,
                edges,
                user_id,
                self.step_timeout,
            )
            .await?;

            credits += result.credits_consumed;
            phases_run += 1;

            match result.outcome {
                StepOutcome::Succeeded => continue,
                StepOutcome::Failed(_) => {
                    failed = true;
                    break;
                }
                StepOutcome::Suspended => {
                    // confirm the row really is parked before trusting the
                    // in-memory view
                    let execution = self.store.execution(execution_id).await?;
                    if execution.status == ExecutionStatus::WaitingForApproval {
                        self.store
                            .add_execution_credits(execution_id, credits)
                            .await?;
                        tracing::info!(%execution_id, "run suspended awaiting approval");
                        return Ok(PassOutcome {
                            status: ExecutionStatus::WaitingForApproval,
                            credits_consumed: credits,
                            phases_run,
                        });
                    }
                    failed = true;
                    break;
                }
            }
        }

        let status = self.finalize(execution_id, failed, credits).await?;
        Ok(PassOutcome {
            status,
            credits_consumed: credits,
            phases_run,
        })
    }

    /// Write the terminal execution status and propagate it onto the parent
    /// workflow's last-run fields. Skipped entirely when the execution is
    /// parked awaiting approval, guarding against a concurrent suspend.
    async fn finalize(
        &self,
        execution_id: ExecutionId,
        failed: bool,
        credits: u32,
    ) -> Result<ExecutionStatus, EngineError> {
        let execution = self.store.execution(execution_id).await?;
        if execution.status == ExecutionStatus::WaitingForApproval {
            return Ok(ExecutionStatus::WaitingForApproval);
        }

        let status = if failed {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        };
        self.store
            .finalize_execution(execution_id, status, credits, Utc::now())
            .await?;
        tracing::info!(%execution_id, ?status, credits, "run finalized");
        Ok(status)
    }
}
