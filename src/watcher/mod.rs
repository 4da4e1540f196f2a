mod jobs;

pub use jobs::{WatchRepositoryTagsJob, WatchTagJob, compute_events};

use crate::credentials::{Credentials, CredentialsRegistry};
use crate::metrics;
use crate::models::{TrackedImage, TriggerType};
use crate::policy::parse_tag;
use crate::provider::Providers;
use crate::registry::{self, RegistryClient};
use crate::scheduler::{Job, Scheduler, validate};
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

/// Per-repository watch state. Jobs hold this behind a mutex and keep it
/// locked for the duration of a scan, so two firings of the same entry
/// never interleave.
pub struct WatchDetails {
    pub tracked_image: TrackedImage,
    pub credentials: Credentials,
    /// Last seen manifest digest, digest watches only
    pub digest: String,
    /// Highest tag seen so far, tag watches only
    pub latest: String,
    pub schedule: String,
}

/// True when the image cannot be compared by tag and must be watched for
/// digest changes instead: force policies and non-semver tags.
fn watch_by_digest(image: &TrackedImage) -> bool {
    image.policy.keep_tag() || parse_tag(image.image.tag()).is_err()
}

/// Registry request parameters for a tracked image
pub(crate) fn registry_opts(image: &TrackedImage, credentials: &Credentials) -> registry::Opts {
    registry::Opts {
        registry: format!("{}://{}", image.image.scheme(), image.image.registry()),
        name: image.image.short_name().to_string(),
        tag: image.image.tag().to_string(),
        username: credentials.username.clone(),
        password: credentials.password.clone(),
    }
}

/// Keeps registry watch jobs in sync with the set of tracked images
pub struct RepositoryWatcher {
    providers: Providers,
    registry_client: Arc<dyn RegistryClient>,
    credentials: Arc<CredentialsRegistry>,
    scheduler: Arc<dyn Scheduler>,
    default_schedule: String,
    watched: Mutex<HashMap<String, Arc<Mutex<WatchDetails>>>>,
}

impl RepositoryWatcher {
    pub fn new(
        providers: Providers,
        registry_client: Arc<dyn RegistryClient>,
        credentials: Arc<CredentialsRegistry>,
        scheduler: Arc<dyn Scheduler>,
        default_schedule: String,
    ) -> Self {
        Self {
            providers,
            registry_client,
            credentials,
            scheduler,
            default_schedule,
            watched: Mutex::new(HashMap::new()),
        }
    }

    /// Watch key for a tracked image. Tag watches cover the whole
    /// repository; digest watches are per tag.
    pub fn image_identifier(image: &TrackedImage) -> String {
        if watch_by_digest(image) {
            image.image.remote()
        } else {
            image.image.repository()
        }
    }

    /// Reconciles watch jobs against the given tracked images: new images
    /// get jobs, schedule changes are applied, stale entries are removed.
    /// Already-watched images are left untouched. Per-image failures are
    /// collected so one bad image cannot stop the batch.
    pub async fn watch(&self, tracked: &[TrackedImage]) -> Result<()> {
        let mut seen = HashSet::new();
        let mut errors = Vec::new();

        for image in tracked {
            if image.trigger != TriggerType::Poll {
                continue;
            }

            let identifier = Self::image_identifier(image);
            if !seen.insert(identifier.clone()) {
                continue;
            }

            let schedule = self.effective_schedule(image);
            let existing = { self.watched.lock().await.get(&identifier).cloned() };

            let result = match existing {
                Some(details) => self.update(&identifier, image, &schedule, details).await,
                None => self.add(&identifier, image, &schedule).await,
            };
            if let Err(error) = result {
                error!(image = %image.image, %error, "failed to watch image");
                errors.push(format!("{}: {}", identifier, error));
            }
        }

        self.unwatch_stale(&seen).await;

        {
            let watched = self.watched.lock().await;
            metrics::IMAGES_TRACKED.set(watched.len() as i64);
        }

        if !errors.is_empty() {
            anyhow::bail!("failed to watch images: {}", errors.join("; "));
        }
        Ok(())
    }

    fn effective_schedule(&self, image: &TrackedImage) -> String {
        let schedule = image.poll_schedule.trim();
        if schedule.is_empty() {
            return self.default_schedule.clone();
        }
        match validate(schedule) {
            Ok(()) => schedule.to_string(),
            Err(error) => {
                warn!(image = %image.image, %error, "invalid poll schedule, using default");
                self.default_schedule.clone()
            }
        }
    }

    async fn add(&self, identifier: &str, image: &TrackedImage, schedule: &str) -> Result<()> {
        let credentials = self
            .credentials
            .get_credentials(image)
            .await
            .unwrap_or_default();

        let digest_watch = watch_by_digest(image);
        let mut details = WatchDetails {
            tracked_image: image.clone(),
            credentials,
            digest: String::new(),
            latest: String::new(),
            schedule: schedule.to_string(),
        };

        // digest watches need a baseline before the first firing,
        // otherwise the first scan would always look like a change
        if digest_watch {
            let opts = registry_opts(image, &details.credentials);
            details.digest = self.registry_client.digest(opts).await?;
        }

        let details = Arc::new(Mutex::new(details));
        let job = self.make_job(digest_watch, details.clone());
        self.scheduler.register(identifier, schedule, job.clone()).await?;
        self.watched
            .lock()
            .await
            .insert(identifier.to_string(), details);

        info!(
            image = %image.image,
            identifier,
            schedule,
            digest_watch,
            "watching image"
        );

        // tag watches scan immediately so already-published tags are not
        // delayed by a full poll interval
        if !digest_watch {
            job.run().await;
        }
        Ok(())
    }

    async fn update(
        &self,
        identifier: &str,
        image: &TrackedImage,
        schedule: &str,
        details: Arc<Mutex<WatchDetails>>,
    ) -> Result<()> {
        let (schedule_changed, digest_watch) = {
            let mut locked = details.lock().await;
            let changed = locked.schedule != schedule;
            locked.schedule = schedule.to_string();
            locked.tracked_image = image.clone();
            (changed, watch_by_digest(image))
        };

        if schedule_changed {
            let job = self.make_job(digest_watch, details.clone());
            self.scheduler.update(identifier, schedule, job).await?;
        }
        Ok(())
    }

    async fn unwatch_stale(&self, seen: &HashSet<String>) {
        let stale: Vec<String> = {
            let watched = self.watched.lock().await;
            watched.keys().filter(|k| !seen.contains(*k)).cloned().collect()
        };
        for identifier in stale {
            self.unwatch(&identifier).await;
        }
    }

    pub async fn unwatch(&self, identifier: &str) {
        self.scheduler.unregister(identifier).await;
        if self.watched.lock().await.remove(identifier).is_some() {
            info!(identifier, "stopped watching image");
        }
    }

    pub async fn watched(&self) -> Vec<String> {
        self.watched.lock().await.keys().cloned().collect()
    }

    fn make_job(&self, digest_watch: bool, details: Arc<Mutex<WatchDetails>>) -> Arc<dyn Job> {
        if digest_watch {
            Arc::new(WatchTagJob::new(
                self.providers.clone(),
                self.registry_client.clone(),
                details,
            ))
        } else {
            Arc::new(WatchRepositoryTagsJob::new(
                self.providers.clone(),
                self.registry_client.clone(),
                details,
            ))
        }
    }
}

/// Periodically re-reads tracked images from all providers and feeds them
/// to the watcher
pub struct PollManager {
    providers: Providers,
    watcher: Arc<RepositoryWatcher>,
    scan_interval: Duration,
}

impl PollManager {
    pub fn new(providers: Providers, watcher: Arc<RepositoryWatcher>, scan_interval: Duration) -> Self {
        Self {
            providers,
            watcher,
            scan_interval,
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?self.scan_interval, "poll manager started");

        if let Err(error) = self.scan().await {
            error!(%error, "initial scan failed");
        }

        let mut ticker = tokio::time::interval(self.scan_interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = self.scan().await {
                        error!(%error, "tracked image scan failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("poll manager stopping");
                        return;
                    }
                }
            }
        }
    }

    pub async fn scan(&self) -> Result<()> {
        let images = self.providers.tracked_images().await?;
        self.watcher.watch(&images).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Reference;
    use crate::policy::{Options, Policy};

    fn tracked(image: &str, policy: &str) -> TrackedImage {
        let mut t = TrackedImage::new(
            Reference::parse(image).unwrap(),
            Policy::parse(policy, &Options::default()),
        );
        t.trigger = TriggerType::Poll;
        t
    }

    #[test]
    fn test_identifier_semver_tag_covers_repository() {
        let image = tracked("foo/bar:1.1.0", "all");
        assert_eq!(
            RepositoryWatcher::image_identifier(&image),
            "index.docker.io/foo/bar"
        );
    }

    #[test]
    fn test_identifier_non_semver_tag_is_per_tag() {
        let image = tracked("foo/bar:latest", "all");
        assert_eq!(
            RepositoryWatcher::image_identifier(&image),
            "index.docker.io/foo/bar:latest"
        );
    }

    #[test]
    fn test_identifier_force_policy_is_per_tag() {
        let image = tracked("foo/bar:1.1.0", "force");
        assert_eq!(
            RepositoryWatcher::image_identifier(&image),
            "index.docker.io/foo/bar:1.1.0"
        );
    }

    #[test]
    fn test_watch_by_digest() {
        assert!(!watch_by_digest(&tracked("foo/bar:1.1.0", "all")));
        assert!(watch_by_digest(&tracked("foo/bar:latest", "all")));
        assert!(watch_by_digest(&tracked("foo/bar:1.1.0", "force")));
    }
}
