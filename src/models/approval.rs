use crate::models::event::Event;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A pending/approved/rejected gate on applying a specific version change
/// to a specific resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub id: String,

    /// Set once the approval reached a terminal state and the update was
    /// applied; archived approvals are excluded from lookups
    pub archived: bool,

    /// Provider name that owns the gated resource (kubernetes, helm)
    pub provider: String,

    /// Identifies the gated decision, ie: `<namespace>/<name>:<new version>`
    pub identifier: String,

    /// Event that triggered evaluation
    pub event: Option<Event>,

    pub message: String,

    pub current_version: String,
    pub new_version: String,

    pub votes_required: u32,
    pub votes_received: u32,

    /// Voter identities with the time they voted; a set, so a repeat voter
    /// never counts twice
    pub voters: BTreeMap<String, DateTime<Utc>>,

    /// Explicitly rejected; final even if the deadline is not reached
    pub rejected: bool,

    /// Deadline for this request
    pub deadline: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

impl Approval {
    pub fn status(&self) -> ApprovalStatus {
        if self.rejected {
            return ApprovalStatus::Rejected;
        }
        if self.votes_received >= self.votes_required {
            return ApprovalStatus::Approved;
        }
        ApprovalStatus::Pending
    }

    pub fn expired(&self) -> bool {
        self.deadline < Utc::now()
    }

    /// Records a vote. Returns true if the voter was new.
    pub fn add_voter(&mut self, voter: &str) -> bool {
        self.voters
            .insert(voter.to_string(), Utc::now())
            .is_none()
    }

    pub fn voters(&self) -> Vec<String> {
        self.voters.keys().cloned().collect()
    }

    /// Delta of what's changed, ie: `0.15.0 -> 0.16.0`
    pub fn delta(&self) -> String {
        format!("{} -> {}", self.current_version, self.new_version)
    }
}

/// Lookup filter for approvals
#[derive(Debug, Clone, Default)]
pub struct ApprovalQuery {
    pub identifier: Option<String>,
    pub archived: bool,
}
