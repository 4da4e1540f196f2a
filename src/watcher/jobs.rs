use super::{WatchDetails, registry_opts};
use crate::metrics;
use crate::models::{Event, Repository, TrackedImage, TriggerType};
use crate::policy::{collapse, parse_tag};
use crate::provider::Providers;
use crate::registry::RegistryClient;
use crate::scheduler::Job;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Watches a single tag for manifest digest changes. Used for force
/// policies and non-semver tags, where only a repushed image signals an
/// update.
pub struct WatchTagJob {
    providers: Providers,
    registry_client: Arc<dyn RegistryClient>,
    details: Arc<Mutex<WatchDetails>>,
}

impl WatchTagJob {
    pub fn new(
        providers: Providers,
        registry_client: Arc<dyn RegistryClient>,
        details: Arc<Mutex<WatchDetails>>,
    ) -> Self {
        Self {
            providers,
            registry_client,
            details,
        }
    }
}

#[async_trait]
impl Job for WatchTagJob {
    async fn run(&self) {
        let mut details = self.details.lock().await;
        let image = details.tracked_image.clone();
        let opts = registry_opts(&image, &details.credentials);

        metrics::REGISTRIES_SCANNED_TOTAL
            .with_label_values(&[image.image.registry(), &image.image.repository()])
            .inc();

        let digest = match self.registry_client.digest(opts).await {
            Ok(digest) => digest,
            Err(error) => {
                metrics::SCAN_ERRORS_TOTAL.inc();
                error!(image = %image.image, %error, "failed to fetch digest");
                return;
            }
        };

        if digest == details.digest {
            debug!(image = %image.image, digest, "digest unchanged");
            return;
        }

        info!(
            image = %image.image,
            previous = %details.digest,
            current = %digest,
            "digest change detected"
        );

        let event = Event::new(
            Repository {
                host: image.image.registry().to_string(),
                name: image.image.repository(),
                tag: image.image.tag().to_string(),
                digest: digest.clone(),
            },
            TriggerType::Poll,
        );

        if let Err(error) = self.providers.submit(event).await {
            // leave the stored digest alone so the next firing retries
            error!(image = %image.image, %error, "failed to submit event");
            return;
        }
        metrics::EVENTS_SUBMITTED_TOTAL.inc();
        details.digest = digest;
    }
}

/// Watches a repository's tag list and emits events for tags that beat
/// the current version under each consumer's policy
pub struct WatchRepositoryTagsJob {
    providers: Providers,
    registry_client: Arc<dyn RegistryClient>,
    details: Arc<Mutex<WatchDetails>>,
}

impl WatchRepositoryTagsJob {
    pub fn new(
        providers: Providers,
        registry_client: Arc<dyn RegistryClient>,
        details: Arc<Mutex<WatchDetails>>,
    ) -> Self {
        Self {
            providers,
            registry_client,
            details,
        }
    }
}

#[async_trait]
impl Job for WatchRepositoryTagsJob {
    async fn run(&self) {
        let mut details = self.details.lock().await;
        let image = details.tracked_image.clone();
        let opts = registry_opts(&image, &details.credentials);

        metrics::REGISTRIES_SCANNED_TOTAL
            .with_label_values(&[image.image.registry(), &image.image.repository()])
            .inc();

        let repository = match self.registry_client.get(opts).await {
            Ok(repository) => repository,
            Err(error) => {
                metrics::SCAN_ERRORS_TOTAL.inc();
                error!(image = %image.image, %error, "failed to list tags");
                return;
            }
        };

        let candidates = collapse(&repository.tags);
        if candidates.is_empty() {
            debug!(image = %image.image, "no semver tags in repository");
            return;
        }

        let tracked = match self.providers.tracked_images().await {
            Ok(tracked) => tracked,
            Err(error) => {
                error!(%error, "failed to get tracked images");
                return;
            }
        };
        let repo_name = image.image.repository();
        let related: Vec<TrackedImage> = tracked
            .into_iter()
            .filter(|t| t.image.repository() == repo_name)
            .collect();

        let events = compute_events(&candidates, &related, image.image.registry(), &repo_name);

        if let Some(highest) = candidates.first() {
            details.latest = highest.clone();
        }

        for event in events {
            info!(
                repository = %event.repository.name,
                tag = %event.repository.tag,
                "new tag detected"
            );
            if let Err(error) = self.providers.submit(event).await {
                error!(repository = %repo_name, %error, "failed to submit event");
                continue;
            }
            metrics::EVENTS_SUBMITTED_TOTAL.inc();
        }
    }
}

/// Matches candidate tags against every consumer of a repository and
/// returns the events to emit, deduplicated by tag.
///
/// A candidate whose pre-release channel is tracked by a consumer is
/// compared against that channel's last seen tag, and every accepted
/// candidate produces an event. All other candidates compete for the
/// consumer's main version; only the highest accepted one is emitted,
/// so a batch of releases yields a single jump.
pub fn compute_events(
    candidates: &[String],
    tracked: &[TrackedImage],
    registry_host: &str,
    repo_name: &str,
) -> Vec<Event> {
    let mut events = Vec::new();
    let mut emitted = HashSet::new();

    for image in tracked {
        let current = image.image.tag();
        let mut main_updated = false;

        for candidate in candidates {
            let channel = parse_tag(candidate)
                .map(|v| v.pre.as_str().to_string())
                .unwrap_or_default();
            let channel_baseline = if channel.is_empty() {
                None
            } else {
                image.semver_pre_release_tags.get(&channel)
            };

            let baseline = match channel_baseline {
                Some(last_seen) => last_seen.as_str(),
                None => {
                    // candidates are sorted best-first, the main version
                    // only ever takes the top accepted one
                    if main_updated {
                        continue;
                    }
                    current
                }
            };

            match image.policy.should_update(baseline, candidate) {
                Ok(true) => {
                    if emitted.insert(candidate.clone()) {
                        events.push(Event::new(
                            Repository {
                                host: registry_host.to_string(),
                                name: repo_name.to_string(),
                                tag: candidate.clone(),
                                digest: String::new(),
                            },
                            TriggerType::Poll,
                        ));
                    }
                    if channel_baseline.is_none() {
                        main_updated = true;
                    }
                }
                Ok(false) => {}
                Err(error) => {
                    debug!(
                        image = %image.image,
                        candidate,
                        %error,
                        "skipping candidate tag"
                    );
                }
            }
        }
    }

    events
}
