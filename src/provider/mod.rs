use crate::models::{Event, TrackedImage};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

/// A downstream consumer of update events. Providers own resources
/// (deployments, releases) and report which images those resources run.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Deliver an event for processing
    async fn submit(&self, event: Event) -> Result<()>;
    /// Images currently referenced by the provider's resources
    async fn tracked_images(&self) -> Result<Vec<TrackedImage>>;
    fn get_name(&self) -> &str;
    async fn stop(&self);
}

/// Fan-out registry over all active providers
#[derive(Clone, Default)]
pub struct Providers {
    providers: Arc<RwLock<HashMap<String, Arc<dyn Provider>>>>,
}

impl Providers {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, provider: Arc<dyn Provider>) {
        let name = provider.get_name().to_string();
        info!(provider = %name, "provider registered");
        self.providers.write().await.insert(name, provider);
    }

    /// Delivers the event to every provider. A failing provider is logged
    /// and skipped; one bad consumer must not starve the rest.
    pub async fn submit(&self, event: Event) -> Result<()> {
        let providers = self.providers.read().await;
        for (name, provider) in providers.iter() {
            if let Err(error) = provider.submit(event.clone()).await {
                error!(provider = %name, %error, "provider failed to process event");
            }
        }
        Ok(())
    }

    /// Concatenated tracked images across providers. Providers that fail to
    /// report are logged and skipped.
    pub async fn tracked_images(&self) -> Result<Vec<TrackedImage>> {
        let providers = self.providers.read().await;
        let mut images = Vec::new();
        for (name, provider) in providers.iter() {
            match provider.tracked_images().await {
                Ok(mut tracked) => images.append(&mut tracked),
                Err(error) => {
                    error!(provider = %name, %error, "failed to get tracked images");
                }
            }
        }
        Ok(images)
    }

    pub async fn list(&self) -> Vec<String> {
        self.providers.read().await.keys().cloned().collect()
    }

    pub async fn stop(&self) {
        let providers = self.providers.read().await;
        for provider in providers.values() {
            provider.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Reference, Repository, TriggerType};
    use crate::policy::Policy;
    use std::sync::Mutex;

    struct FakeProvider {
        name: String,
        submitted: Mutex<Vec<Event>>,
        images: Vec<TrackedImage>,
        fail: bool,
    }

    impl FakeProvider {
        fn new(name: &str, fail: bool) -> Self {
            Self {
                name: name.to_string(),
                submitted: Mutex::new(Vec::new()),
                images: vec![TrackedImage::new(
                    Reference::parse("foo/bar:1.0.0").unwrap(),
                    Policy::None,
                )],
                fail,
            }
        }
    }

    #[async_trait]
    impl Provider for FakeProvider {
        async fn submit(&self, event: Event) -> Result<()> {
            if self.fail {
                anyhow::bail!("provider down");
            }
            self.submitted.lock().unwrap().push(event);
            Ok(())
        }

        async fn tracked_images(&self) -> Result<Vec<TrackedImage>> {
            if self.fail {
                anyhow::bail!("provider down");
            }
            Ok(self.images.clone())
        }

        fn get_name(&self) -> &str {
            &self.name
        }

        async fn stop(&self) {}
    }

    fn event() -> Event {
        Event::new(
            Repository {
                name: "index.docker.io/foo/bar".to_string(),
                tag: "1.1.0".to_string(),
                ..Default::default()
            },
            TriggerType::Poll,
        )
    }

    #[tokio::test]
    async fn test_submit_fans_out() {
        let providers = Providers::new();
        let a = Arc::new(FakeProvider::new("a", false));
        let b = Arc::new(FakeProvider::new("b", false));
        providers.register(a.clone()).await;
        providers.register(b.clone()).await;

        providers.submit(event()).await.unwrap();

        assert_eq!(a.submitted.lock().unwrap().len(), 1);
        assert_eq!(b.submitted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_provider_does_not_block_others() {
        let providers = Providers::new();
        let bad = Arc::new(FakeProvider::new("bad", true));
        let good = Arc::new(FakeProvider::new("good", false));
        providers.register(bad).await;
        providers.register(good.clone()).await;

        providers.submit(event()).await.unwrap();
        assert_eq!(good.submitted.lock().unwrap().len(), 1);

        let images = providers.tracked_images().await.unwrap();
        assert_eq!(images.len(), 1);
    }

    #[tokio::test]
    async fn test_list() {
        let providers = Providers::new();
        providers
            .register(Arc::new(FakeProvider::new("kubernetes", false)))
            .await;
        assert_eq!(providers.list().await, vec!["kubernetes".to_string()]);
    }
}
