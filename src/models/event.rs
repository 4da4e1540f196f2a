use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What causes an image to be re-evaluated for updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    /// Wait for external triggers (webhooks)
    Default,
    /// Set up registry watchers for the affected repositories
    Poll,
    /// Fulfilled approval requests trigger events
    Approval,
}

impl TriggerType {
    pub fn parse(trigger: &str) -> Self {
        match trigger {
            "poll" => TriggerType::Poll,
            "approval" => TriggerType::Approval,
            _ => TriggerType::Default,
        }
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TriggerType::Default => "default",
            TriggerType::Poll => "poll",
            TriggerType::Approval => "approval",
        };
        write!(f, "{}", s)
    }
}

/// Repository coordinates carried by an event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub host: String,
    pub name: String,
    pub tag: String,
    /// optional digest field
    pub digest: String,
}

/// Emitted by a trigger when a repository changed; consumed by providers.
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub repository: Repository,
    pub created_at: DateTime<Utc>,
    /// optional field to identify trigger
    pub trigger_name: String,
}

impl Event {
    pub fn new(repository: Repository, trigger: TriggerType) -> Self {
        Self {
            repository,
            created_at: Utc::now(),
            trigger_name: trigger.to_string(),
        }
    }
}
