//! Durable pending-action ledger. Every proposal from a worker lands here
//! before any human sees it; every state change is flushed to disk, so
//! pending approvals survive a restart. Transitions are compare-and-set:
//! pending -> approved|rejected, approved -> executed -> execution_failed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tokio::fs;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;

use opsmith_types::{ActionDecision, ActionFilter, ActionStatus, PendingAction};

const ACTIONS_FILE: &str = "actions.json";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("action {id} already decided: {status:?}")]
    AlreadyDecided { id: String, status: ActionStatus },
    #[error("action {0} is not approved")]
    NotApproved(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

pub struct ActionLedger {
    base: PathBuf,
    actions: RwLock<HashMap<String, PendingAction>>,
    waiters: RwLock<HashMap<String, watch::Sender<Option<ActionDecision>>>>,
}

impl ActionLedger {
    pub async fn new(base: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let base = base.as_ref().to_path_buf();
        fs::create_dir_all(&base).await?;
        let file = base.join(ACTIONS_FILE);
        let actions = if file.exists() {
            let raw = fs::read_to_string(&file).await?;
            serde_json::from_str::<HashMap<String, PendingAction>>(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };
        Ok(Self {
            base,
            actions: RwLock::new(actions),
            waiters: RwLock::new(HashMap::new()),
        })
    }

    pub async fn propose(&self, action: PendingAction) -> Result<(), LedgerError> {
        let id = action.id.clone();
        self.actions.write().await.insert(id.clone(), action);
        let (tx, _rx) = watch::channel(None);
        self.waiters.write().await.insert(id, tx);
        self.flush().await
    }

    /// Rule on a pending action. Anything but `pending` is refused, so the
    /// second of two racing decisions always loses.
    pub async fn decide(
        &self,
        id: &str,
        decision: ActionDecision,
    ) -> Result<PendingAction, LedgerError> {
        let updated = {
            let mut actions = self.actions.write().await;
            let action = actions
                .get_mut(id)
                .ok_or_else(|| LedgerError::UnknownAction(id.to_string()))?;
            if action.status != ActionStatus::Pending {
                return Err(LedgerError::AlreadyDecided {
                    id: id.to_string(),
                    status: action.status,
                });
            }
            action.status = match decision {
                ActionDecision::Approve => ActionStatus::Approved,
                ActionDecision::Reject => ActionStatus::Rejected,
            };
            action.decided_at = Some(Utc::now());
            action.clone()
        };
        self.flush().await?;
        if let Some(waiter) = self.waiters.read().await.get(id).cloned() {
            let _ = waiter.send(Some(decision));
        }
        Ok(updated)
    }

    /// Compare-and-set approved -> executed. The caller that wins this
    /// claim is the only one that runs the tool; everyone else gets
    /// `NotApproved`.
    pub async fn claim_for_execution(&self, id: &str) -> Result<PendingAction, LedgerError> {
        let claimed = {
            let mut actions = self.actions.write().await;
            let action = actions
                .get_mut(id)
                .ok_or_else(|| LedgerError::UnknownAction(id.to_string()))?;
            if action.status != ActionStatus::Approved {
                return Err(LedgerError::NotApproved(id.to_string()));
            }
            action.status = ActionStatus::Executed;
            action.clone()
        };
        self.flush().await?;
        Ok(claimed)
    }

    pub async fn mark_execution_failed(&self, id: &str) -> Result<PendingAction, LedgerError> {
        let updated = {
            let mut actions = self.actions.write().await;
            let action = actions
                .get_mut(id)
                .ok_or_else(|| LedgerError::UnknownAction(id.to_string()))?;
            action.status = ActionStatus::ExecutionFailed;
            action.clone()
        };
        self.flush().await?;
        Ok(updated)
    }

    pub async fn get(&self, id: &str) -> Option<PendingAction> {
        self.actions.read().await.get(id).cloned()
    }

    pub async fn list(&self, filter: &ActionFilter) -> Vec<PendingAction> {
        let mut out: Vec<PendingAction> = self
            .actions
            .read()
            .await
            .values()
            .filter(|a| match &filter.run_id {
                Some(run_id) => &a.run_id == run_id,
                None => true,
            })
            .filter(|a| match filter.status {
                Some(status) => a.status == status,
                None => true,
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }

    /// Auto-reject everything still pending for a run. Used on cancel.
    pub async fn reject_pending_for_run(&self, run_id: &str) -> Result<Vec<String>, LedgerError> {
        let rejected: Vec<String> = {
            let mut actions = self.actions.write().await;
            let mut rejected = Vec::new();
            for action in actions.values_mut() {
                if action.run_id == run_id && action.status == ActionStatus::Pending {
                    action.status = ActionStatus::Rejected;
                    action.decided_at = Some(Utc::now());
                    rejected.push(action.id.clone());
                }
            }
            rejected
        };
        if !rejected.is_empty() {
            self.flush().await?;
            let waiters = self.waiters.read().await;
            for id in &rejected {
                if let Some(waiter) = waiters.get(id) {
                    let _ = waiter.send(Some(ActionDecision::Reject));
                }
            }
        }
        Ok(rejected)
    }

    /// True while a run driver is parked on this action.
    pub async fn has_waiter(&self, id: &str) -> bool {
        self.waiters.read().await.contains_key(id)
    }

    /// Park until a human rules on the action, or the token is cancelled.
    pub async fn wait_for_decision(
        &self,
        id: &str,
        cancel: CancellationToken,
    ) -> Option<ActionDecision> {
        let mut rx = {
            let waiters = self.waiters.read().await;
            waiters.get(id).map(|tx| tx.subscribe())?
        };
        let immediate = *rx.borrow();
        if let Some(decision) = immediate {
            self.waiters.write().await.remove(id);
            return Some(decision);
        }
        let decided = tokio::select! {
            _ = cancel.cancelled() => None,
            changed = rx.changed() => {
                if changed.is_ok() {
                    *rx.borrow()
                } else {
                    None
                }
            }
        };
        self.waiters.write().await.remove(id);
        decided
    }

    async fn flush(&self) -> Result<(), LedgerError> {
        let snapshot = self.actions.read().await.clone();
        let payload = serde_json::to_string_pretty(&snapshot)?;
        fs::write(self.base.join(ACTIONS_FILE), payload).await?;
        Ok(())
    }
}
