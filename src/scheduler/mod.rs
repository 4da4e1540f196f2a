use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid schedule '{expr}': {reason}")]
    Invalid { expr: String, reason: String },
}

/// Unit of periodic work owned by the scheduler
#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self);
}

/// Recurring schedule: either a fixed interval (`@every 1m`) or a cron
/// expression
#[derive(Debug, Clone)]
pub enum Schedule {
    Every(Duration),
    Cron(cron::Schedule),
}

impl Schedule {
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        if let Some(spec) = expr.strip_prefix("@every ") {
            let duration = humantime::parse_duration(spec).map_err(|e| ScheduleError::Invalid {
                expr: expr.to_string(),
                reason: e.to_string(),
            })?;
            if duration.is_zero() {
                return Err(ScheduleError::Invalid {
                    expr: expr.to_string(),
                    reason: "interval must be positive".to_string(),
                });
            }
            return Ok(Schedule::Every(duration));
        }

        let schedule = cron::Schedule::from_str(expr).map_err(|e| ScheduleError::Invalid {
            expr: expr.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Schedule::Cron(schedule))
    }

    /// Time until the next firing
    pub fn next_delay(&self) -> Duration {
        match self {
            Schedule::Every(interval) => *interval,
            Schedule::Cron(schedule) => schedule
                .upcoming(Utc)
                .next()
                .and_then(|next| (next - Utc::now()).to_std().ok())
                // no upcoming firing, park the task
                .unwrap_or(Duration::from_secs(60 * 60)),
        }
    }
}

/// Validates a schedule expression without registering anything
pub fn validate(expr: &str) -> Result<(), ScheduleError> {
    Schedule::parse(expr).map(|_| ())
}

/// Owns recurring jobs keyed by identifier
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Adds a job. Replaces any existing job under the same identifier.
    async fn register(
        &self,
        identifier: &str,
        expr: &str,
        job: Arc<dyn Job>,
    ) -> Result<(), ScheduleError>;
    /// Re-registers only if the schedule expression changed
    async fn update(
        &self,
        identifier: &str,
        expr: &str,
        job: Arc<dyn Job>,
    ) -> Result<(), ScheduleError>;
    async fn unregister(&self, identifier: &str);
    async fn stop(&self);
}

struct Entry {
    expr: String,
    handle: JoinHandle<()>,
}

/// Scheduler that runs each job on its own interval/cron timer task.
/// A job's runs never overlap; the next firing waits for the previous
/// run to finish.
#[derive(Default)]
pub struct CronScheduler {
    entries: Mutex<HashMap<String, Entry>>,
}

impl CronScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn spawn(identifier: String, schedule: Schedule, job: Arc<dyn Job>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(schedule.next_delay()).await;
                debug!(job = %identifier, "running scheduled job");
                job.run().await;
            }
        })
    }
}

#[async_trait]
impl Scheduler for CronScheduler {
    async fn register(
        &self,
        identifier: &str,
        expr: &str,
        job: Arc<dyn Job>,
    ) -> Result<(), ScheduleError> {
        let schedule = Schedule::parse(expr)?;
        let mut entries = self.entries.lock().await;

        if let Some(previous) = entries.remove(identifier) {
            previous.handle.abort();
        }

        info!(job = %identifier, schedule = expr, "job scheduled");
        let handle = Self::spawn(identifier.to_string(), schedule, job);
        entries.insert(
            identifier.to_string(),
            Entry {
                expr: expr.to_string(),
                handle,
            },
        );
        Ok(())
    }

    async fn update(
        &self,
        identifier: &str,
        expr: &str,
        job: Arc<dyn Job>,
    ) -> Result<(), ScheduleError> {
        {
            let entries = self.entries.lock().await;
            if entries.get(identifier).is_some_and(|e| e.expr == expr) {
                return Ok(());
            }
        }
        info!(job = %identifier, schedule = expr, "job schedule changed");
        self.register(identifier, expr, job).await
    }

    async fn unregister(&self, identifier: &str) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.remove(identifier) {
            entry.handle.abort();
            debug!(job = %identifier, "job unregistered");
        } else {
            error!(job = %identifier, "unregister for unknown job");
        }
    }

    async fn stop(&self) {
        let mut entries = self.entries.lock().await;
        for (_, entry) in entries.drain() {
            entry.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJob {
        runs: AtomicUsize,
    }

    impl CountingJob {
        fn new() -> Self {
            Self {
                runs: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Job for CountingJob {
        async fn run(&self) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_parse_every() {
        assert!(matches!(
            Schedule::parse("@every 1m").unwrap(),
            Schedule::Every(d) if d == Duration::from_secs(60)
        ));
        assert!(Schedule::parse("@every nonsense").is_err());
        assert!(Schedule::parse("@every 0s").is_err());
    }

    #[test]
    fn test_parse_cron() {
        assert!(matches!(
            Schedule::parse("0 0 * * * *").unwrap(),
            Schedule::Cron(_)
        ));
        assert!(Schedule::parse("not a cron line").is_err());
    }

    #[test]
    fn test_validate() {
        assert!(validate("@every 30s").is_ok());
        assert!(validate("0 0 * * * *").is_ok());
        assert!(validate("whenever").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_fires_on_interval() {
        let scheduler = CronScheduler::new();
        let job = Arc::new(CountingJob::new());
        scheduler
            .register("index.docker.io/foo/bar", "@every 10s", job.clone())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(35)).await;
        tokio::task::yield_now().await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 3);

        scheduler.unregister("index.docker.io/foo/bar").await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        tokio::task::yield_now().await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_is_a_noop_for_same_expression() {
        let scheduler = CronScheduler::new();
        let job = Arc::new(CountingJob::new());
        scheduler
            .register("job", "@every 10s", job.clone())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(9)).await;
        // identical expression must not reset the timer
        scheduler.update("job", "@every 10s", job.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_aborts_all_jobs() {
        let scheduler = CronScheduler::new();
        let job = Arc::new(CountingJob::new());
        scheduler.register("a", "@every 5s", job.clone()).await.unwrap();
        scheduler.register("b", "@every 5s", job.clone()).await.unwrap();

        scheduler.stop().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        tokio::task::yield_now().await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }
}
