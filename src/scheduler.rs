//! Periodic job scheduling
//!
//! A single loop ticks once a second and runs every job whose interval has
//! elapsed. Job bodies run sequentially within the tick, so engine mutations
//! are never issued concurrently. Each job wraps its work in a
//! [`JobRunner`] carrying an explicit error policy.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::WardenConfig;
use crate::error::WardenError;
use crate::warden::SwarmWarden;
use crate::WardenResult;

/// Pace of the scheduling loop.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Number of jobs a healthy daemon schedules.
pub const EXPECTED_JOBS: usize = 4;

type JobFuture = Pin<Box<dyn Future<Output = WardenResult<()>> + Send>>;
type JobAction = Box<dyn Fn() -> JobFuture + Send + Sync>;

/// How a job reacts to failures of its body.
#[derive(Debug, Clone, Copy)]
pub struct JobPolicy {
    /// Swallow errors after logging them instead of propagating.
    pub catch_errors: bool,
    /// Drop the job from future scheduling after a failure.
    pub cancel_on_failure: bool,
}

impl Default for JobPolicy {
    fn default() -> Self {
        Self {
            catch_errors: true,
            cancel_on_failure: false,
        }
    }
}

/// Wraps one job body with its error policy.
pub struct JobRunner {
    policy: JobPolicy,
    action: JobAction,
}

impl JobRunner {
    pub fn new<F, Fut>(policy: JobPolicy, job: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WardenResult<()>> + Send + 'static,
    {
        Self {
            policy,
            action: Box::new(move || {
                let future: JobFuture = Box::pin(job());
                future
            }),
        }
    }

    /// Run the body once; `Ok(true)` keeps the job scheduled.
    ///
    /// Losing the leadership gate is an expected outcome on most nodes, not
    /// a failure, so it never trips the policy.
    pub async fn run(&self, name: &str) -> WardenResult<bool> {
        match (self.action)().await {
            Ok(()) => Ok(true),
            Err(WardenError::NotLeader) => {
                info!("Job {} skipped: this node is not the elected leader", name);
                Ok(true)
            }
            Err(e) => {
                warn!("Job {} failed: {}", name, e);
                if !self.policy.catch_errors {
                    return Err(e);
                }
                if self.policy.cancel_on_failure {
                    warn!("Job {} canceled due to failure", name);
                    return Ok(false);
                }
                Ok(true)
            }
        }
    }
}

/// Read-only projection of one scheduled job for health reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub name: String,
    pub interval_seconds: u64,
    pub last_run: Option<String>,
    pub next_run: String,
}

#[derive(Debug, Clone)]
struct JobState {
    last_run: Option<DateTime<Utc>>,
    next_run: DateTime<Utc>,
    cancelled: bool,
}

struct ScheduledJob {
    name: String,
    interval_secs: u64,
    runner: JobRunner,
    state: Mutex<JobState>,
}

/// The daemon's periodic job set.
#[derive(Default)]
pub struct WardenScheduler {
    jobs: Vec<ScheduledJob>,
}

impl WardenScheduler {
    /// Build the standard job set against a warden.
    pub fn new(config: &WardenConfig, warden: Arc<SwarmWarden>) -> Self {
        let mut scheduler = Self::default();
        let intervals = &config.intervals;

        let w = warden.clone();
        scheduler.add_job(
            "assume-role",
            intervals.assume_role_secs,
            JobPolicy::default(),
            move || {
                let w = w.clone();
                async move { w.assume_role().await }
            },
        );

        let w = warden.clone();
        scheduler.add_job(
            "prune-nodes",
            intervals.prune_nodes_secs,
            JobPolicy::default(),
            move || {
                let w = w.clone();
                async move { w.prune_nodes().await }
            },
        );

        let w = warden.clone();
        scheduler.add_job(
            "prune-system",
            intervals.prune_system_secs,
            JobPolicy::default(),
            move || {
                let w = w.clone();
                async move { w.prune_system().await }
            },
        );

        let w = warden;
        scheduler.add_job(
            "refresh-auth",
            intervals.refresh_auth_secs,
            JobPolicy::default(),
            move || {
                let w = w.clone();
                async move { w.refresh_auth().await }
            },
        );

        scheduler
    }

    /// Register a job; its first run happens one interval from now.
    pub fn add_job<F, Fut>(&mut self, name: &str, interval_secs: u64, policy: JobPolicy, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WardenResult<()>> + Send + 'static,
    {
        let next_run = Utc::now() + chrono::Duration::seconds(interval_secs as i64);
        self.jobs.push(ScheduledJob {
            name: name.to_string(),
            interval_secs,
            runner: JobRunner::new(policy, job),
            state: Mutex::new(JobState {
                last_run: None,
                next_run,
                cancelled: false,
            }),
        });
    }

    /// Run every due job once, in registration order.
    pub async fn run_pending(&self) -> WardenResult<()> {
        for job in &self.jobs {
            let due = {
                let state = job.state.lock().await;
                !state.cancelled && state.next_run <= Utc::now()
            };
            if !due {
                continue;
            }

            let keep = job.runner.run(&job.name).await?;

            let now = Utc::now();
            let mut state = job.state.lock().await;
            state.last_run = Some(now);
            state.next_run = now + chrono::Duration::seconds(job.interval_secs as i64);
            if !keep {
                state.cancelled = true;
            }
        }
        Ok(())
    }

    /// Project the live job set for health reporting.
    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        let mut jobs = Vec::with_capacity(self.jobs.len());
        for job in &self.jobs {
            let state = job.state.lock().await;
            if state.cancelled {
                continue;
            }
            jobs.push(JobInfo {
                name: job.name.clone(),
                interval_seconds: job.interval_secs,
                last_run: state.last_run.map(|t| t.to_rfc3339()),
                next_run: state.next_run.to_rfc3339(),
            });
        }
        jobs
    }

    /// Tick until the shutdown signal fires. An in-flight job body always
    /// finishes before the loop exits; engine mutations are not safely
    /// abortable mid-flight.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> WardenResult<()> {
        let mut tick = tokio::time::interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Starting scheduler loop");
        loop {
            tokio::select! {
                _ = tick.tick() => self.run_pending().await?,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Stopped scheduler loop");
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_job(counter: Arc<AtomicUsize>) -> impl Fn() -> JobFuture + Send + Sync {
        move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn runner_keeps_the_job_on_success() {
        let runner = JobRunner::new(JobPolicy::default(), || async { Ok(()) });
        assert!(runner.run("ok").await.unwrap());
    }

    #[tokio::test]
    async fn runner_catches_failures_by_default() {
        let runner = JobRunner::new(JobPolicy::default(), || async {
            Err(WardenError::Engine("boom".to_string()))
        });
        assert!(runner.run("failing").await.unwrap());
    }

    #[tokio::test]
    async fn runner_cancels_when_the_policy_says_so() {
        let policy = JobPolicy {
            catch_errors: true,
            cancel_on_failure: true,
        };
        let runner = JobRunner::new(policy, || async {
            Err(WardenError::Engine("boom".to_string()))
        });
        assert!(!runner.run("failing").await.unwrap());
    }

    #[tokio::test]
    async fn runner_propagates_when_not_catching() {
        let policy = JobPolicy {
            catch_errors: false,
            cancel_on_failure: false,
        };
        let runner = JobRunner::new(policy, || async {
            Err(WardenError::Engine("boom".to_string()))
        });
        assert!(runner.run("failing").await.is_err());
    }

    #[tokio::test]
    async fn losing_the_leader_gate_is_a_skip_not_a_failure() {
        let policy = JobPolicy {
            catch_errors: true,
            cancel_on_failure: true,
        };
        let runner = JobRunner::new(policy, || async { Err(WardenError::NotLeader) });
        // Even the harshest policy keeps the job scheduled.
        assert!(runner.run("leader-only").await.unwrap());
    }

    #[tokio::test]
    async fn run_pending_runs_due_jobs_and_reschedules() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = WardenScheduler::default();
        scheduler.add_job("tick", 0, JobPolicy::default(), counting_job(counter.clone()));

        scheduler.run_pending().await.unwrap();
        scheduler.run_pending().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        let jobs = scheduler.list_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].last_run.is_some());
    }

    #[tokio::test]
    async fn jobs_do_not_run_before_their_interval() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = WardenScheduler::default();
        scheduler.add_job(
            "slow",
            3600,
            JobPolicy::default(),
            counting_job(counter.clone()),
        );

        scheduler.run_pending().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        let jobs = scheduler.list_jobs().await;
        assert!(jobs[0].last_run.is_none());
    }

    #[tokio::test]
    async fn a_failing_job_does_not_block_the_next() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = WardenScheduler::default();
        scheduler.add_job("failing", 0, JobPolicy::default(), || async {
            Err(WardenError::Engine("boom".to_string()))
        });
        scheduler.add_job("next", 0, JobPolicy::default(), counting_job(counter.clone()));

        scheduler.run_pending().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_jobs_leave_the_schedule_and_the_projection() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = WardenScheduler::default();
        let policy = JobPolicy {
            catch_errors: true,
            cancel_on_failure: true,
        };
        let c = counter.clone();
        scheduler.add_job("flaky", 0, policy, move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(WardenError::Engine("boom".to_string()))
            }
        });

        scheduler.run_pending().await.unwrap();
        scheduler.run_pending().await.unwrap();

        // One attempt, then gone.
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(scheduler.list_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn list_jobs_projects_names_and_intervals() {
        let mut scheduler = WardenScheduler::default();
        scheduler.add_job("a", 60, JobPolicy::default(), || async { Ok(()) });
        scheduler.add_job("b", 120, JobPolicy::default(), || async { Ok(()) });

        let jobs = scheduler.list_jobs().await;
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].name, "a");
        assert_eq!(jobs[0].interval_seconds, 60);
        assert_eq!(jobs[1].name, "b");
        assert_eq!(jobs[1].interval_seconds, 120);
    }

    #[tokio::test]
    async fn the_standard_job_set_is_complete() {
        use crate::warden::fakes::{
            active_worker_membership, FakeBroker, FakeDiscovery, FakeEngine,
        };

        let config = WardenConfig::default();
        let warden = SwarmWarden::new(
            config.clone(),
            Arc::new(FakeEngine::new(active_worker_membership("self"))),
            Arc::new(FakeDiscovery::with_candidates(Vec::new())),
            Arc::new(FakeBroker::empty()),
        )
        .unwrap();

        let scheduler = WardenScheduler::new(&config, Arc::new(warden));
        let names: Vec<String> = scheduler
            .list_jobs()
            .await
            .into_iter()
            .map(|job| job.name)
            .collect();
        assert_eq!(names.len(), EXPECTED_JOBS);
        assert_eq!(
            names,
            vec!["assume-role", "prune-nodes", "prune-system", "refresh-auth"],
        );
    }
}
