//! Public facade over the orchestration core. One `Engine` owns the run
//! state, the ledger, the gateway, and the worker roster; callers start
//! runs, subscribe to events, and rule on pending actions through it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::Level;

use opsmith_gateway::{CallerIdentity, Gateway};
use opsmith_observability::{emit_event, ObservabilityEvent, ProcessKind};
use opsmith_tools::{standard_registry, OpsDataset, StaticRecall, ToolRegistry};
use opsmith_types::{ActionDecision, ActionFilter, PendingAction, RunEvent, RunSnapshot};

use crate::config::EngineConfig;
use crate::event_bus::{EventBus, RunEnvelope};
use crate::executor::RunExecutor;
use crate::ledger::{ActionLedger, LedgerError};
use crate::planner::{Planner, RulePlanner};
use crate::state::{RunStateStore, StateError};
use crate::worker::{standard_workers, Worker};

pub struct Engine {
    bus: EventBus,
    state: RunStateStore,
    ledger: Arc<ActionLedger>,
    gateway: Gateway,
    caller: CallerIdentity,
    planner: Arc<dyn Planner>,
    workers: HashMap<String, Arc<dyn Worker>>,
    config: EngineConfig,
    runs: RwLock<HashMap<String, CancellationToken>>,
}

impl Engine {
    pub async fn new(
        config: EngineConfig,
        registry: ToolRegistry,
        planner: Arc<dyn Planner>,
        workers: HashMap<String, Arc<dyn Worker>>,
    ) -> anyhow::Result<Self> {
        let bus = EventBus::new();
        let state = RunStateStore::new(bus.clone());
        let ledger = Arc::new(ActionLedger::new(&config.data_dir).await?);
        let gateway = Gateway::new(registry, &config.api_key, config.tool_timeout());
        let caller = CallerIdentity::bearer(&config.api_key);
        Ok(Self {
            bus,
            state,
            ledger,
            gateway,
            caller,
            planner,
            workers,
            config,
            runs: RwLock::new(HashMap::new()),
        })
    }

    /// Engine over the built-in fixture dataset, rule planner, and the
    /// standard worker roster.
    pub async fn with_fixture(config: EngineConfig) -> anyhow::Result<Self> {
        let registry = standard_registry(
            Arc::new(OpsDataset::with_fixture()),
            Arc::new(StaticRecall::with_fixture()),
        )?;
        Self::new(config, registry, Arc::new(RulePlanner), standard_workers()).await
    }

    fn executor(&self) -> RunExecutor {
        RunExecutor {
            state: self.state.clone(),
            ledger: self.ledger.clone(),
            gateway: self.gateway.clone(),
            caller: self.caller.clone(),
            planner: self.planner.clone(),
            workers: self.workers.clone(),
            config: self.config.clone(),
        }
    }

    /// Create a run and spawn its driver. Returns the run id immediately;
    /// progress is observed through `run_snapshot` or `subscribe`.
    pub async fn start_run(&self, request: &str) -> anyhow::Result<String> {
        let snapshot = self.state.create_run(request).await;
        self.state
            .append_event(
                &snapshot.id,
                RunEvent::RunStarted {
                    request: request.to_string(),
                },
            )
            .await?;
        let cancel = CancellationToken::new();
        self.runs
            .write()
            .await
            .insert(snapshot.id.clone(), cancel.clone());
        emit_event(
            Level::INFO,
            ProcessKind::Engine,
            ObservabilityEvent {
                event: "run.started",
                component: "engine",
                run_id: Some(&snapshot.id),
                ..Default::default()
            },
        );
        let executor = self.executor();
        let run_id = snapshot.id.clone();
        tokio::spawn(async move {
            executor.drive(&run_id, cancel).await;
        });
        Ok(snapshot.id)
    }

    pub async fn run_snapshot(&self, run_id: &str) -> Result<RunSnapshot, StateError> {
        self.state.snapshot(run_id).await
    }

    pub async fn list_runs(&self) -> Vec<RunSnapshot> {
        self.state.list_runs().await
    }

    pub async fn pending_actions(&self, filter: &ActionFilter) -> Vec<PendingAction> {
        self.ledger.list(filter).await
    }

    /// Record a human decision. If the run's driver is parked on this
    /// action it picks the decision up; otherwise (say, after a restart)
    /// an approval is executed right here. The ledger's claim keeps
    /// execution at-most-once either way.
    pub async fn decide_action(
        &self,
        action_id: &str,
        decision: ActionDecision,
    ) -> Result<PendingAction, LedgerError> {
        let driver_parked = self.ledger.has_waiter(action_id).await;
        let action = self.ledger.decide(action_id, decision).await?;
        emit_event(
            Level::INFO,
            ProcessKind::Engine,
            ObservabilityEvent {
                event: "action.decided",
                component: "engine",
                run_id: Some(&action.run_id),
                action_id: Some(action_id),
                status: Some(match decision {
                    ActionDecision::Approve => "approved",
                    ActionDecision::Reject => "rejected",
                }),
                ..Default::default()
            },
        );
        if decision == ActionDecision::Approve && !driver_parked {
            match self.executor().execute_approved(action_id).await {
                Ok(_) | Err(LedgerError::NotApproved(_)) => {}
                Err(err) => return Err(err),
            }
        }
        self.ledger
            .get(action_id)
            .await
            .ok_or_else(|| LedgerError::UnknownAction(action_id.to_string()))
    }

    /// Request cancellation; the driver rejects pending actions and marks
    /// the run cancelled. Returns false for unknown or already-finished
    /// runs.
    pub async fn cancel_run(&self, run_id: &str) -> bool {
        let Some(token) = self.runs.read().await.get(run_id).cloned() else {
            return false;
        };
        token.cancel();
        true
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RunEnvelope> {
        self.bus.subscribe()
    }
}
