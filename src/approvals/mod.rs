use crate::metrics;
use crate::models::{Approval, ApprovalQuery, ApprovalStatus, Event};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("approval not found")]
    NotFound,
    #[error("approval for this identifier already exists")]
    AlreadyExists,
    #[error("store error: {0}")]
    Store(String),
}

/// Persistence for approval records
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_approval(&self, approval: Approval) -> Result<Approval, ApprovalError>;
    async fn update_approval(&self, approval: Approval) -> Result<(), ApprovalError>;
    async fn get_approval(&self, id: &str) -> Result<Approval, ApprovalError>;
    async fn list_approvals(&self, query: &ApprovalQuery) -> Result<Vec<Approval>, ApprovalError>;
    async fn delete_approval(&self, id: &str) -> Result<(), ApprovalError>;
}

/// In-memory approval store
#[derive(Default)]
pub struct MemoryStore {
    approvals: RwLock<HashMap<String, Approval>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_approval(&self, approval: Approval) -> Result<Approval, ApprovalError> {
        let mut approvals = self.approvals.write().await;
        approvals.insert(approval.id.clone(), approval.clone());
        Ok(approval)
    }

    async fn update_approval(&self, approval: Approval) -> Result<(), ApprovalError> {
        let mut approvals = self.approvals.write().await;
        if !approvals.contains_key(&approval.id) {
            return Err(ApprovalError::NotFound);
        }
        approvals.insert(approval.id.clone(), approval);
        Ok(())
    }

    async fn get_approval(&self, id: &str) -> Result<Approval, ApprovalError> {
        let approvals = self.approvals.read().await;
        approvals.get(id).cloned().ok_or(ApprovalError::NotFound)
    }

    async fn list_approvals(&self, query: &ApprovalQuery) -> Result<Vec<Approval>, ApprovalError> {
        let approvals = self.approvals.read().await;
        let mut out: Vec<Approval> = approvals
            .values()
            .filter(|a| query.archived || !a.archived)
            .filter(|a| {
                query
                    .identifier
                    .as_ref()
                    .is_none_or(|id| &a.identifier == id)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn delete_approval(&self, id: &str) -> Result<(), ApprovalError> {
        let mut approvals = self.approvals.write().await;
        approvals.remove(id).map(|_| ()).ok_or(ApprovalError::NotFound)
    }
}

/// Details needed to gate an update behind approvals
#[derive(Debug, Clone)]
pub struct GateRequest {
    pub provider: String,
    pub identifier: String,
    pub event: Option<Event>,
    pub message: String,
    pub current_version: String,
    pub new_version: String,
    pub votes_required: u32,
    pub deadline: DateTime<Utc>,
}

/// Coordinates the approval lifecycle: create, vote, reject, archive,
/// expire. Votes are serialized so concurrent approvals of the same
/// request cannot double count.
pub struct ApprovalsManager<S: Store> {
    store: Arc<S>,
    vote_lock: Mutex<()>,
}

impl<S: Store> ApprovalsManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            vote_lock: Mutex::new(()),
        }
    }

    /// Creates a new pending approval. Fails with AlreadyExists when a
    /// non-archived approval holds the same identifier.
    pub async fn create(&self, request: GateRequest) -> Result<Approval, ApprovalError> {
        let existing = self
            .store
            .list_approvals(&ApprovalQuery {
                identifier: Some(request.identifier.clone()),
                archived: false,
            })
            .await?;
        if !existing.is_empty() {
            return Err(ApprovalError::AlreadyExists);
        }

        let now = Utc::now();
        let approval = Approval {
            id: Uuid::new_v4().to_string(),
            archived: false,
            provider: request.provider,
            identifier: request.identifier,
            event: request.event,
            message: request.message,
            current_version: request.current_version,
            new_version: request.new_version,
            votes_required: request.votes_required,
            votes_received: 0,
            voters: Default::default(),
            rejected: false,
            deadline: request.deadline,
            created_at: now,
            updated_at: now,
        };

        info!(
            identifier = %approval.identifier,
            votes_required = approval.votes_required,
            "approval request created"
        );
        metrics::APPROVALS_CREATED_TOTAL.inc();

        self.store.create_approval(approval).await
    }

    /// Active (non-archived) approval for the identifier
    pub async fn get(&self, identifier: &str) -> Result<Approval, ApprovalError> {
        let found = self
            .store
            .list_approvals(&ApprovalQuery {
                identifier: Some(identifier.to_string()),
                archived: false,
            })
            .await?;
        found.into_iter().next().ok_or(ApprovalError::NotFound)
    }

    /// Records a vote. Voting is idempotent per voter: a repeat vote
    /// changes nothing and is not an error.
    pub async fn approve(&self, identifier: &str, voter: &str) -> Result<Approval, ApprovalError> {
        let _guard = self.vote_lock.lock().await;

        let mut approval = self.get(identifier).await?;
        if !approval.add_voter(voter) {
            debug!(identifier, voter, "duplicate vote ignored");
            return Ok(approval);
        }

        approval.votes_received += 1;
        approval.updated_at = Utc::now();

        info!(
            identifier,
            voter,
            votes_received = approval.votes_received,
            votes_required = approval.votes_required,
            "vote recorded"
        );
        if approval.status() == ApprovalStatus::Approved {
            metrics::APPROVALS_APPROVED_TOTAL.inc();
        }

        self.store.update_approval(approval.clone()).await?;
        Ok(approval)
    }

    /// Marks the approval rejected. Final: later votes cannot revive it.
    pub async fn reject(&self, identifier: &str) -> Result<Approval, ApprovalError> {
        let _guard = self.vote_lock.lock().await;

        let mut approval = self.get(identifier).await?;
        approval.rejected = true;
        approval.updated_at = Utc::now();

        info!(identifier, "approval rejected");
        metrics::APPROVALS_REJECTED_TOTAL.inc();

        self.store.update_approval(approval.clone()).await?;
        Ok(approval)
    }

    /// Archives the approval, freeing the identifier for future requests
    pub async fn archive(&self, identifier: &str) -> Result<(), ApprovalError> {
        let mut approval = self.get(identifier).await?;
        approval.archived = true;
        approval.updated_at = Utc::now();
        self.store.update_approval(approval).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApprovalError> {
        self.store.delete_approval(id).await
    }

    pub async fn list(&self, query: &ApprovalQuery) -> Result<Vec<Approval>, ApprovalError> {
        self.store.list_approvals(query).await
    }

    /// Gatekeeper called before applying an update. Zero required votes
    /// means no gate. An unknown identifier creates a pending approval
    /// and blocks the update until it collects enough votes.
    pub async fn is_approved(&self, request: GateRequest) -> Result<bool, ApprovalError> {
        if request.votes_required == 0 {
            return Ok(true);
        }

        match self.get(&request.identifier).await {
            Ok(approval) => Ok(approval.status() == ApprovalStatus::Approved),
            Err(ApprovalError::NotFound) => {
                self.create(request).await?;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Deletes expired, non-archived approvals. Returns how many were
    /// removed.
    pub async fn expire(&self) -> Result<usize, ApprovalError> {
        let all = self
            .store
            .list_approvals(&ApprovalQuery::default())
            .await?;

        let mut removed = 0;
        for approval in all {
            if !approval.expired() {
                continue;
            }
            warn!(
                identifier = %approval.identifier,
                deadline = %approval.deadline,
                "approval deadline passed, removing"
            );
            self.store.delete_approval(&approval.id).await?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Background loop that sweeps expired approvals until shutdown
    pub async fn run_expiry_service(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(StdDuration::from_secs(60 * 60));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.expire().await {
                        Ok(0) => {}
                        Ok(removed) => info!(removed, "expired approvals cleaned up"),
                        Err(error) => error!(%error, "failed to clean up expired approvals"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("approvals expiry service stopping");
                        return;
                    }
                }
            }
        }
    }
}

/// Default deadline applied when a resource does not set its own
pub fn default_deadline(hours: i64) -> DateTime<Utc> {
    Utc::now() + Duration::hours(hours)
}
