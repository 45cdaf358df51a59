//! Orchestration core: the planner/worker round loop, the in-memory run
//! state store, the durable pending-action ledger, and the engine facade
//! that ties them to the tool gateway.

pub mod actions;
pub mod config;
pub mod engine;
pub mod event_bus;
pub mod executor;
pub mod ledger;
pub mod planner;
pub mod state;
pub mod worker;

pub use actions::{invocation_for, UnknownActionType};
pub use config::EngineConfig;
pub use engine::Engine;
pub use event_bus::{EventBus, RunEnvelope};
pub use executor::RunExecutor;
pub use ledger::{ActionLedger, LedgerError};
pub use planner::{Planner, RulePlanner};
pub use state::{RunStateStore, StateError};
pub use worker::{standard_workers, Worker, WorkerContext, WorkerReport};
