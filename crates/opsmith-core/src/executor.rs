//! The per-run driver: plan, fan out to workers, gate proposed mutations
//! on human decisions, execute what was approved, repeat until the planner
//! completes or a bound is hit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Level;

use opsmith_gateway::{CallerIdentity, Gateway};
use opsmith_observability::{emit_event, ObservabilityEvent, ProcessKind};
use opsmith_types::{
    ActionDecision, ActionFilter, ActionStatus, DelegateTask, PendingAction, PlanDecision,
    RunEvent, RunSnapshot, RunStatus, WorkerStatus,
};

use crate::actions::invocation_for;
use crate::config::EngineConfig;
use crate::ledger::{ActionLedger, LedgerError};
use crate::planner::Planner;
use crate::state::{RunStateStore, StateError};
use crate::worker::{Worker, WorkerContext, WorkerReport};

#[derive(Clone)]
pub struct RunExecutor {
    pub(crate) state: RunStateStore,
    pub(crate) ledger: Arc<ActionLedger>,
    pub(crate) gateway: Gateway,
    pub(crate) caller: CallerIdentity,
    pub(crate) planner: Arc<dyn Planner>,
    pub(crate) workers: HashMap<String, Arc<dyn Worker>>,
    pub(crate) config: EngineConfig,
}

impl RunExecutor {
    pub async fn drive(&self, run_id: &str, cancel: CancellationToken) {
        if let Err(err) = self.drive_inner(run_id, &cancel).await {
            let reason = format!("{err:#}");
            let _ = self.fail(run_id, &reason).await;
        }
    }

    async fn drive_inner(
        &self,
        run_id: &str,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        loop {
            if cancel.is_cancelled() {
                return self.cancel_run(run_id).await;
            }
            let snapshot = self.state.snapshot(run_id).await?;
            let round = snapshot.round + 1;
            if round > self.config.max_rounds {
                self.fail(run_id, "planning_loop_exceeded").await?;
                return Ok(());
            }

            self.state
                .append_event(run_id, RunEvent::PlanStarted { round })
                .await?;
            let decision = match self.plan_with_retries(&snapshot).await {
                Ok(decision) => decision,
                Err(err) => {
                    self.fail(run_id, &format!("planning_error: {err:#}")).await?;
                    return Ok(());
                }
            };

            let tasks = match decision {
                PlanDecision::Complete { synthesis } => {
                    self.state.set_synthesis(run_id, &synthesis).await?;
                    self.state
                        .append_event(run_id, RunEvent::RunCompleted { round })
                        .await?;
                    self.state.set_status(run_id, RunStatus::Completed).await?;
                    self.observe(run_id, "run.completed", None);
                    return Ok(());
                }
                PlanDecision::Delegate { tasks } => tasks,
            };

            self.state
                .append_event(
                    run_id,
                    RunEvent::PlanDecided {
                        round,
                        workers: tasks.iter().map(|t| t.worker.clone()).collect(),
                    },
                )
                .await?;

            self.run_round(run_id, round, tasks).await?;

            self.state
                .append_event(run_id, RunEvent::PlanCompleted { round })
                .await?;
            self.state.set_round(run_id, round).await?;

            // A decision can land while the round is still joining, so
            // collect every unsettled action of this round, not just the
            // ones a human has yet to rule on.
            let actions: Vec<PendingAction> = self
                .ledger
                .list(&ActionFilter {
                    run_id: Some(run_id.to_string()),
                    status: None,
                })
                .await
                .into_iter()
                .filter(|a| {
                    a.round == round
                        && !matches!(
                            a.status,
                            ActionStatus::Executed | ActionStatus::ExecutionFailed
                        )
                })
                .collect();
            if !actions.is_empty() {
                if actions.iter().any(|a| a.status == ActionStatus::Pending) {
                    self.state
                        .set_status(run_id, RunStatus::WaitingHuman)
                        .await?;
                    self.observe(run_id, "run.waiting_human", None);
                }
                let failed = self.settle_actions(run_id, &actions, cancel).await?;
                if cancel.is_cancelled() {
                    return self.cancel_run(run_id).await;
                }
                if !failed.is_empty() {
                    self.fail(
                        run_id,
                        &format!("action_execution_failed: {}", failed.join(", ")),
                    )
                    .await?;
                    return Ok(());
                }
                self.state.set_status(run_id, RunStatus::Running).await?;
            }
        }
    }

    /// Fan the round's tasks out and barrier on all of them. One worker's
    /// failure becomes an error-marker finding; it never sinks the round.
    async fn run_round(
        &self,
        run_id: &str,
        round: u32,
        tasks: Vec<DelegateTask>,
    ) -> anyhow::Result<()> {
        let mut join: JoinSet<(DelegateTask, anyhow::Result<WorkerReport>)> = JoinSet::new();
        for task in tasks {
            self.state
                .append_event(
                    run_id,
                    RunEvent::WorkerDispatched {
                        round,
                        worker: task.worker.clone(),
                        objective: task.objective.clone(),
                    },
                )
                .await?;
            let worker = self.workers.get(&task.worker).cloned();
            let ctx = WorkerContext::new(
                run_id,
                self.gateway.clone(),
                self.caller.clone(),
                self.state.clone(),
            );
            join.spawn(async move {
                let result = match worker {
                    Some(worker) => worker.run(&ctx, &task).await,
                    None => Err(anyhow::anyhow!("unknown worker: {}", task.worker)),
                };
                (task, result)
            });
        }

        while let Some(joined) = join.join_next().await {
            let Ok((task, result)) = joined else {
                // A panicked worker task; isolate it like any other failure.
                let _ = self
                    .state
                    .record_finding(
                        run_id,
                        &format!("r{round}.worker_panic"),
                        serde_json::json!({"error": "worker task panicked"}),
                    )
                    .await;
                continue;
            };
            let key = format!("r{round}.{}", task.result_key);
            match result {
                Ok(report) => {
                    let recorded = self
                        .state
                        .record_finding(run_id, &key, report.finding)
                        .await;
                    let status = match recorded {
                        Ok(()) => WorkerStatus::Succeeded,
                        Err(StateError::DuplicateKey(_)) => {
                            let _ = self
                                .state
                                .record_finding(
                                    run_id,
                                    &format!("{key}.error"),
                                    serde_json::json!({
                                        "error": "duplicate result key",
                                        "worker": task.worker,
                                    }),
                                )
                                .await;
                            WorkerStatus::Failed
                        }
                        Err(err) => return Err(err.into()),
                    };
                    self.state
                        .append_event(
                            run_id,
                            RunEvent::WorkerFinished {
                                round,
                                worker: task.worker.clone(),
                                status,
                            },
                        )
                        .await?;
                    self.observe_worker(
                        run_id,
                        &task.worker,
                        round,
                        match status {
                            WorkerStatus::Succeeded => "ok",
                            WorkerStatus::Failed => "failed",
                        },
                    );
                    if status == WorkerStatus::Succeeded {
                        for proposal in report.proposals {
                            let action =
                                PendingAction::new(run_id, &task.worker, round, proposal);
                            self.state
                                .append_event(
                                    run_id,
                                    RunEvent::ApprovalRequested {
                                        action_id: action.id.clone(),
                                        action_type: action.action_type.clone(),
                                        worker: task.worker.clone(),
                                    },
                                )
                                .await?;
                            self.observe(run_id, "action.proposed", Some(&action.id));
                            self.ledger.propose(action).await?;
                        }
                    }
                }
                Err(err) => {
                    let _ = self
                        .state
                        .record_finding(
                            run_id,
                            &format!("{key}.error"),
                            serde_json::json!({
                                "error": err.to_string(),
                                "worker": task.worker,
                            }),
                        )
                        .await;
                    self.state
                        .append_event(
                            run_id,
                            RunEvent::WorkerFinished {
                                round,
                                worker: task.worker.clone(),
                                status: WorkerStatus::Failed,
                            },
                        )
                        .await?;
                    self.observe_worker(run_id, &task.worker, round, "failed");
                }
            }
        }
        Ok(())
    }

    /// Park on each action in turn and execute the approved ones. Actions
    /// decided before the park is reached are picked up immediately from
    /// their watch channel. Returns the ids of approved actions whose
    /// execution failed.
    async fn settle_actions(
        &self,
        run_id: &str,
        actions: &[PendingAction],
        cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<String>> {
        let mut failed = Vec::new();
        for action in actions {
            let Some(decision) = self
                .ledger
                .wait_for_decision(&action.id, cancel.clone())
                .await
            else {
                if cancel.is_cancelled() {
                    return Ok(failed);
                }
                continue;
            };
            self.state
                .append_event(
                    run_id,
                    RunEvent::ActionDecided {
                        action_id: action.id.clone(),
                        decision,
                    },
                )
                .await?;
            if decision != ActionDecision::Approve {
                continue;
            }
            match self.execute_approved(&action.id).await {
                Ok(outcome) => {
                    self.state
                        .append_event(
                            run_id,
                            RunEvent::ActionExecuted {
                                action_id: action.id.clone(),
                                outcome: outcome.clone(),
                            },
                        )
                        .await?;
                    if outcome != "ok" {
                        failed.push(action.id.clone());
                    }
                }
                // Lost the claim race; whoever won carries the execution.
                Err(LedgerError::NotApproved(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(failed)
    }

    /// Claim the approved action (CAS, at-most-once) and run its tool with
    /// the post-approval flag. Returns "ok" or the failure code.
    pub(crate) async fn execute_approved(&self, action_id: &str) -> Result<String, LedgerError> {
        let claimed = self.ledger.claim_for_execution(action_id).await?;
        let request = match invocation_for(&claimed) {
            Ok(request) => request,
            Err(err) => {
                self.ledger.mark_execution_failed(action_id).await?;
                self.observe(&claimed.run_id, "action.execution_failed", Some(action_id));
                return Ok(err.to_string());
            }
        };
        let response = self.gateway.invoke(&request, &self.caller, true).await;
        if response.is_success() {
            self.observe(&claimed.run_id, "action.executed", Some(action_id));
            Ok("ok".to_string())
        } else {
            self.ledger.mark_execution_failed(action_id).await?;
            self.observe(&claimed.run_id, "action.execution_failed", Some(action_id));
            Ok(response
                .error_kind()
                .map(|kind| kind.as_str().to_string())
                .unwrap_or_else(|| "error".to_string()))
        }
    }

    async fn plan_with_retries(&self, snapshot: &RunSnapshot) -> anyhow::Result<PlanDecision> {
        let mut attempt = 0;
        loop {
            match self.planner.plan(snapshot).await {
                Ok(decision) => return Ok(decision),
                Err(err) => {
                    if attempt >= self.config.planner_max_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(
                        self.config.planner_backoff_ms * u64::from(attempt),
                    ))
                    .await;
                }
            }
        }
    }

    async fn fail(&self, run_id: &str, reason: &str) -> Result<(), StateError> {
        self.state
            .append_event(
                run_id,
                RunEvent::RunFailed {
                    reason: reason.to_string(),
                },
            )
            .await?;
        self.state.set_failure(run_id, reason).await?;
        emit_event(
            Level::WARN,
            ProcessKind::Engine,
            ObservabilityEvent {
                event: "run.failed",
                component: "executor",
                run_id: Some(run_id),
                detail: Some(reason),
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn cancel_run(&self, run_id: &str) -> anyhow::Result<()> {
        self.ledger.reject_pending_for_run(run_id).await?;
        self.state.append_event(run_id, RunEvent::RunCancelled).await?;
        self.state.set_status(run_id, RunStatus::Cancelled).await?;
        self.observe(run_id, "run.cancelled", None);
        Ok(())
    }

    fn observe_worker(&self, run_id: &str, worker: &str, round: u32, status: &str) {
        emit_event(
            Level::INFO,
            ProcessKind::Engine,
            ObservabilityEvent {
                event: "worker.finished",
                component: "executor",
                run_id: Some(run_id),
                worker: Some(worker),
                round: Some(round),
                status: Some(status),
                ..Default::default()
            },
        );
    }

    fn observe(&self, run_id: &str, event: &str, action_id: Option<&str>) {
        emit_event(
            Level::INFO,
            ProcessKind::Engine,
            ObservabilityEvent {
                event,
                component: "executor",
                run_id: Some(run_id),
                action_id,
                ..Default::default()
            },
        );
    }
}
