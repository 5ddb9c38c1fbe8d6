use crate::ledger::CreditLedger;
use crate::step::StepRunner;
use crate::storage::Storage;
use chrono::Utc;
use refinecore::{
    Edge, EngineError, PhaseRecord, PhaseStatus, RunEnvironment, StepOutcome, UserId,
};
use std::time::Duration;
use tokio::time::timeout;

/// What one phase invocation produced
#[derive(Debug)]
pub struct PhaseResult {
    pub outcome: StepOutcome,
    pub credits_consumed: u32,
}

/// Execute exactly one node: wire its inputs, debit credits, invoke the
/// step runner, persist the updated phase row. Each numbered step below is
/// a commit point.
pub(crate) async fn run_phase(
    store: &dyn Storage,
    ledger: &dyn CreditLedger,
    runner: &dyn StepRunner,
    mut phase: PhaseRecord,
    env: &mut RunEnvironment,
    edges: &[Edge],
    user_id: UserId,
    step_timeout: Duration,
) -> Result<PhaseResult, EngineError> {
    let node_id = phase.node.id;
    let execution_id = phase.execution_id;
    let price = phase.node.task_type.descriptor().credits;

    // 1. wire inputs from literals and upstream outputs
    env.wire_inputs(&phase.node, edges, phase.id);

    // 2. mark the row running before any work happens
    phase.status = PhaseStatus::Running;
    phase.started_at = Some(Utc::now());
    phase.inputs = env.slots_of(node_id).inputs;
    store.update_phase(phase.clone()).await?;

    tracing::info!(
        phase = phase.number,
        node = %phase.node.label(),
        "phase started"
    );

    // 3. admission control: no credits, no step body
    if !ledger.debit(user_id, price).await? {
        let reason = format!("insufficient credits: step requires {price}");
        tracing::warn!(node = %phase.node.label(), "{reason}");
        env.scope(node_id, phase.id).error(reason.clone());

        phase.status = PhaseStatus::Failed;
        phase.credits_cost = 0;
        phase.completed_at = Some(Utc::now());
        store.finalize_phase(phase, env.take_logs()).await?;
        return Ok(PhaseResult {
            outcome: StepOutcome::Failed(reason),
            credits_consumed: 0,
        });
    }

    // 4. invoke the step runner; timeouts and faults become plain failures
    let outcome = {
        let mut scope = env.scope(node_id, phase.id);
        match timeout(step_timeout, runner.run(&mut scope, store, execution_id)).await {
            Ok(Ok(outcome)) => {
                if let StepOutcome::Failed(reason) = &outcome {
                    scope.error(format!("step failed: {reason}"));
                }
                outcome
            }
            Ok(Err(fault)) => {
                tracing::error!(node = %phase.node.label(), error = %fault, "step fault");
                scope.error(format!("step fault: {fault}"));
                StepOutcome::Failed(fault.to_string())
            }
            Err(_) => {
                let reason = format!("step timed out after {}s", step_timeout.as_secs());
                tracing::error!(node = %phase.node.label(), "{reason}");
                scope.error(reason.clone());
                StepOutcome::Failed(reason)
            }
        }
    };

    // 5. finalize: status, slots, credits and log flush in one commit
    let slots = env.slots_of(node_id);
    phase.inputs = slots.inputs;
    phase.outputs = slots.outputs;
    phase.temp = slots.temp;
    phase.credits_cost = price;
    phase.status = match outcome {
        StepOutcome::Succeeded => PhaseStatus::Completed,
        StepOutcome::Failed(_) => PhaseStatus::Failed,
        StepOutcome::Suspended => PhaseStatus::WaitingForApproval,
    };
    if phase.status != PhaseStatus::WaitingForApproval {
        phase.completed_at = Some(Utc::now());
    }

    let logs = env.take_logs();
    if phase.status == PhaseStatus::WaitingForApproval {
        // the execution row flips to WaitingForApproval in the same commit
        store.suspend(phase, logs).await?;
    } else {
        store.finalize_phase(phase, logs).await?;
    }

    Ok(PhaseResult {
        outcome,
        credits_consumed: price,
    })
}
