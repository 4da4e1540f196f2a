use crate::models::event::TriggerType;
use crate::models::image::Reference;
use crate::policy::Policy;
use std::collections::HashMap;

/// One (resource-container, policy, schedule) tuple the system watches for
/// updates. Produced by a provider; consumed by the scheduler and jobs.
#[derive(Debug, Clone)]
pub struct TrackedImage {
    pub image: Reference,
    pub trigger: TriggerType,
    pub poll_schedule: String,
    pub provider: String,
    pub namespace: String,
    /// Names of image pull secrets attached to the consuming resource
    pub secrets: Vec<String>,
    pub policy: Policy,
    /// Pre-release channels and their last seen tags, ie: `1.0.0-dev`
    /// tracked as `dev -> 1.0.0-dev`
    pub semver_pre_release_tags: HashMap<String, String>,
}

impl TrackedImage {
    pub fn new(image: Reference, policy: Policy) -> Self {
        Self {
            image,
            trigger: TriggerType::Default,
            poll_schedule: String::new(),
            provider: String::new(),
            namespace: String::new(),
            secrets: Vec::new(),
            policy,
            semver_pre_release_tags: HashMap::new(),
        }
    }
}

impl std::fmt::Display for TrackedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "namespace:{},image:{},provider:{},trigger:{},sched:{},policy:{}",
            self.namespace,
            self.image.name(),
            self.provider,
            self.trigger,
            self.poll_schedule,
            self.policy.name(),
        )
    }
}
