// Shared fakes for integration tests: an in-memory provider, a scripted
// registry and a scheduler that only fires when told to.

use anyhow::Result;
use async_trait::async_trait;
use slipstream::models::{Event, TrackedImage};
use slipstream::provider::Provider;
use slipstream::registry::{Opts, RegistryClient, RegistryError, Repository};
use slipstream::scheduler::{Job, ScheduleError, Scheduler};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

pub struct FakeProvider {
    pub images: Mutex<Vec<TrackedImage>>,
    pub events: Mutex<Vec<Event>>,
}

impl FakeProvider {
    pub fn new(images: Vec<TrackedImage>) -> Self {
        Self {
            images: Mutex::new(images),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn submitted(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for FakeProvider {
    async fn submit(&self, event: Event) -> Result<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }

    async fn tracked_images(&self) -> Result<Vec<TrackedImage>> {
        Ok(self.images.lock().unwrap().clone())
    }

    fn get_name(&self) -> &str {
        "fake"
    }

    async fn stop(&self) {}
}

pub struct FakeRegistry {
    digest: Mutex<String>,
    tags: Mutex<Vec<String>>,
}

impl FakeRegistry {
    pub fn new(digest: &str, tags: &[&str]) -> Self {
        Self {
            digest: Mutex::new(digest.to_string()),
            tags: Mutex::new(tags.iter().map(|s| s.to_string()).collect()),
        }
    }

    pub fn set_digest(&self, digest: &str) {
        *self.digest.lock().unwrap() = digest.to_string();
    }

    pub fn set_tags(&self, tags: &[&str]) {
        *self.tags.lock().unwrap() = tags.iter().map(|s| s.to_string()).collect();
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn digest(&self, _opts: Opts) -> Result<String, RegistryError> {
        Ok(self.digest.lock().unwrap().clone())
    }

    async fn get(&self, opts: Opts) -> Result<Repository, RegistryError> {
        Ok(Repository {
            name: opts.name,
            tags: self.tags.lock().unwrap().clone(),
        })
    }
}

/// Scheduler that records registrations and runs jobs on demand
#[derive(Default)]
pub struct ManualScheduler {
    jobs: AsyncMutex<HashMap<String, Arc<dyn Job>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn registered(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.jobs.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn fire(&self, identifier: &str) -> bool {
        let job = { self.jobs.lock().await.get(identifier).cloned() };
        match job {
            Some(job) => {
                job.run().await;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl Scheduler for ManualScheduler {
    async fn register(
        &self,
        identifier: &str,
        _expr: &str,
        job: Arc<dyn Job>,
    ) -> Result<(), ScheduleError> {
        self.jobs.lock().await.insert(identifier.to_string(), job);
        Ok(())
    }

    async fn update(
        &self,
        identifier: &str,
        expr: &str,
        job: Arc<dyn Job>,
    ) -> Result<(), ScheduleError> {
        self.register(identifier, expr, job).await
    }

    async fn unregister(&self, identifier: &str) {
        self.jobs.lock().await.remove(identifier);
    }

    async fn stop(&self) {
        self.jobs.lock().await.clear();
    }
}
