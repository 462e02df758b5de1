// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Waiting for a submitted job to serve.
//!
//! [`JobWatch`] is a pure state machine fed one observation at a time. [`wait_until_ready`]
//! is the polling loop around it: it asks the [`Scheduler`] and the optional [`HealthProbe`],
//! feeds the watch, and sleeps on the injected [`Clock`].
//!
//! ```text
//!  Pending ──RUNNING──▶ Running ──RUNNING (+ node, healthy)──▶ Ready
//!     │                    │
//!     ├─FAILED──▶ Failed   ├─FAILED / COMPLETED──▶ RuntimeFailed
//!     └─deadline─▶ TimedOut└─startup deadline──▶ TimedOut
//! ```
//!
//! A job must be seen running twice in a row before it counts, so a container that
//! crashes right after start is not reported as ready. It must also have a node, since the
//! server is reached through it.

use std::time::Duration;

use async_trait::async_trait;

use super::{JobId, JobState, JobStatus, Scheduler, SchedulerError};
use crate::config::PlatformConfig;
use crate::utils::clock::Clock;

/// How long to wait for each phase, and how often to look
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchPolicy {
    pub poll_interval: Duration,
    /// Bound on the time spent queued
    pub ready_timeout: Duration,
    /// Bound on the time from first seen running to ready
    pub startup_timeout: Duration,
    /// How long an unknown state is tolerated
    pub unknown_grace: Duration,
    /// Ready also requires a successful health probe
    pub require_health: bool,
}

impl WatchPolicy {
    pub fn from_config(config: &PlatformConfig) -> Self {
        WatchPolicy {
            poll_interval: config.poll_interval(),
            ready_timeout: config.ready_timeout(),
            startup_timeout: config.startup_timeout(),
            unknown_grace: config.unknown_grace(),
            require_health: config.health_check,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchState {
    Pending,
    /// `since` is the elapsed time of the first running observation
    Running { since: Duration, confirmed: bool },
    Ready,
    /// Ended before it ever ran
    Failed { status: String },
    /// Ended after it was running
    RuntimeFailed { status: String },
    /// The scheduler kept answering without a state
    Lost,
    TimedOut { waited: Duration, last: JobState },
}

impl WatchState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WatchState::Pending | WatchState::Running { .. })
    }
}

#[derive(Debug, Clone)]
pub struct JobWatch {
    policy: WatchPolicy,
    state: WatchState,
    last: JobState,
    /// Start of the current run of unknown observations
    unknown_since: Option<Duration>,
    node_known: bool,
}

impl JobWatch {
    pub fn new(policy: WatchPolicy) -> Self {
        JobWatch {
            policy,
            state: WatchState::Pending,
            last: JobState::Pending,
            unknown_since: None,
            node_known: false,
        }
    }

    pub fn state(&self) -> &WatchState {
        &self.state
    }

    /// The scheduler has reported the node running the job
    pub fn node_assigned(&mut self) {
        self.node_known = true;
    }

    /// Apply one observation taken `elapsed` after submission.
    ///
    /// `healthy` is the health probe result for this round; it is ignored unless the
    /// policy requires health.
    pub fn observe(&mut self, status: &JobStatus, healthy: bool, elapsed: Duration) -> &WatchState {
        if self.state.is_terminal() {
            return &self.state;
        }
        if status.state == JobState::Unknown {
            self.unknown_since.get_or_insert(elapsed);
        } else {
            self.last = status.state;
            self.unknown_since = None;
        }

        let next = match (&self.state, status.state) {
            (WatchState::Pending, JobState::Running) => WatchState::Running {
                since: elapsed,
                confirmed: false,
            },
            (WatchState::Running { since, .. }, JobState::Running) => WatchState::Running {
                since: *since,
                confirmed: true,
            },
            (_, JobState::Pending) => WatchState::Pending,
            (WatchState::Pending, JobState::Failed) => WatchState::Failed {
                status: status.raw.clone(),
            },
            // A server that completes has exited; that is never the success path
            (WatchState::Pending, JobState::Completed)
            | (WatchState::Running { .. }, JobState::Failed | JobState::Completed) => {
                WatchState::RuntimeFailed {
                    status: status.raw.clone(),
                }
            }
            (current, JobState::Unknown) => {
                let since = self.unknown_since.unwrap_or(elapsed);
                if elapsed.saturating_sub(since) >= self.policy.unknown_grace {
                    WatchState::Lost
                } else {
                    current.clone()
                }
            }
            // Terminal states returned early
            (current, _) => current.clone(),
        };

        self.state = match next {
            WatchState::Running {
                confirmed: true, ..
            } if self.node_known && (!self.policy.require_health || healthy) => WatchState::Ready,
            WatchState::Running { since, .. }
                if elapsed.saturating_sub(since) >= self.policy.startup_timeout =>
            {
                WatchState::TimedOut {
                    waited: elapsed,
                    last: self.last,
                }
            }
            WatchState::Pending if elapsed >= self.policy.ready_timeout => WatchState::TimedOut {
                waited: elapsed,
                last: self.last,
            },
            other => other,
        };
        &self.state
    }
}

/// Health signal of the served model
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn is_healthy(&self, node: &str, port: u16) -> bool;
}

/// Where polling ended, and the node if one was assigned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOutcome {
    pub state: WatchState,
    pub node: Option<String>,
    pub polls: u32,
}

/// Poll until the job is ready or the watch reaches another terminal state.
///
/// Scheduler errors while polling are returned immediately, they are not retried.
pub async fn wait_until_ready(
    scheduler: &dyn Scheduler,
    job: &JobId,
    port: u16,
    policy: WatchPolicy,
    probe: Option<&dyn HealthProbe>,
    clock: &dyn Clock,
) -> Result<WatchOutcome, SchedulerError> {
    tracing::info!("Waiting for job {job} to start...");
    // Without a probe there is nothing to wait on besides the scheduler
    let policy = WatchPolicy {
        require_health: policy.require_health && probe.is_some(),
        ..policy
    };
    let started = clock.now();
    let mut watch = JobWatch::new(policy);
    let mut node: Option<String> = None;
    let mut polls = 0;

    loop {
        let status = scheduler.status(job).await?;
        let elapsed = clock.now().saturating_duration_since(started);
        polls += 1;
        tracing::debug!(raw = %status.raw, state = %status.state, ?elapsed, "Polled job status");

        let mut healthy = false;
        if status.state == JobState::Running {
            if node.is_none() {
                match scheduler.node(job).await {
                    Ok(n) => {
                        tracing::info!("Job {job} is running on {n}");
                        watch.node_assigned();
                        node = Some(n);
                    }
                    // squeue can lag behind sacct right after the job starts
                    Err(SchedulerError::NoNode(_)) => {}
                    Err(e) => return Err(e),
                }
            }
            if policy.require_health {
                if let (Some(probe), Some(node)) = (probe, node.as_deref()) {
                    healthy = probe.is_healthy(node, port).await;
                }
            }
        }

        let previous = watch.state().clone();
        let state = watch.observe(&status, healthy, elapsed).clone();
        report(job, &previous, &state, scheduler).await;

        if state.is_terminal() {
            return Ok(WatchOutcome { state, node, polls });
        }
        clock.sleep(policy.poll_interval).await;
    }
}

/// User feedback for each poll
async fn report(job: &JobId, previous: &WatchState, state: &WatchState, scheduler: &dyn Scheduler) {
    match state {
        WatchState::Pending => {
            let estimate = scheduler.start_time(job).await.ok().flatten();
            tracing::info!(
                "Job {job} is pending. Estimated start time {}.",
                estimate.as_deref().unwrap_or("unknown")
            );
        }
        WatchState::Running {
            confirmed: false, ..
        } => tracing::info!(
            "Job {job} is running. Will wait one more iteration to make sure it doesn't immediately fail."
        ),
        WatchState::Running { confirmed: true, .. } => {
            if !matches!(previous, WatchState::Running { confirmed: true, .. }) {
                tracing::info!("Job {job} is running, waiting for the server to load the model");
            }
        }
        WatchState::Ready => tracing::info!("Job {job} is ready"),
        WatchState::Failed { status } => tracing::error!("Job {job} failed: {status}"),
        WatchState::RuntimeFailed { status } => {
            tracing::error!("Job {job} stopped after starting: {status}")
        }
        WatchState::Lost => tracing::error!("Job {job} status unknown. Please report this."),
        WatchState::TimedOut { waited, last } => tracing::error!(
            "Gave up on job {job} after {} (last state {last})",
            humantime::format_duration(*waited)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::mock::{ScriptedScheduler, StaticProbe};
    use crate::utils::clock::ManualClock;

    fn policy() -> WatchPolicy {
        WatchPolicy {
            poll_interval: Duration::from_secs(10),
            ready_timeout: Duration::from_secs(60),
            startup_timeout: Duration::from_secs(120),
            unknown_grace: Duration::from_secs(30),
            require_health: false,
        }
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_running_twice_is_ready() {
        let mut watch = JobWatch::new(policy());
        watch.node_assigned();
        let running = JobStatus::new("RUNNING");
        assert_eq!(
            watch.observe(&running, false, secs(0)),
            &WatchState::Running {
                since: secs(0),
                confirmed: false
            }
        );
        assert_eq!(watch.observe(&running, false, secs(10)), &WatchState::Ready);
    }

    #[test]
    fn test_health_required_before_ready() {
        let mut watch = JobWatch::new(WatchPolicy {
            require_health: true,
            ..policy()
        });
        watch.node_assigned();
        let running = JobStatus::new("RUNNING");
        watch.observe(&running, false, secs(0));
        assert_eq!(
            watch.observe(&running, false, secs(10)),
            &WatchState::Running {
                since: secs(0),
                confirmed: true
            }
        );
        assert_eq!(watch.observe(&running, true, secs(20)), &WatchState::Ready);
    }

    #[test]
    fn test_pending_past_deadline_times_out() {
        let mut watch = JobWatch::new(policy());
        let pending = JobStatus::new("PENDING");
        assert_eq!(watch.observe(&pending, false, secs(50)), &WatchState::Pending);
        assert_eq!(
            watch.observe(&pending, false, secs(60)),
            &WatchState::TimedOut {
                waited: secs(60),
                last: JobState::Pending
            }
        );
        // Terminal states absorb later observations
        assert!(watch.observe(&JobStatus::new("RUNNING"), false, secs(70)).is_terminal());
    }

    #[test]
    fn test_running_just_before_deadline_still_confirms() {
        let mut watch = JobWatch::new(policy());
        watch.node_assigned();
        watch.observe(&JobStatus::new("RUNNING"), false, secs(55));
        assert_eq!(
            watch.observe(&JobStatus::new("RUNNING"), false, secs(65)),
            &WatchState::Ready
        );
    }

    #[test]
    fn test_running_without_node_is_not_ready() {
        let mut watch = JobWatch::new(policy());
        let running = JobStatus::new("RUNNING");
        watch.observe(&running, false, secs(0));
        assert_eq!(
            watch.observe(&running, true, secs(10)),
            &WatchState::Running {
                since: secs(0),
                confirmed: true
            }
        );
        assert_eq!(
            watch.observe(&running, true, secs(120)),
            &WatchState::TimedOut {
                waited: secs(120),
                last: JobState::Running
            }
        );
    }

    #[test]
    fn test_requeued_job_goes_back_to_pending() {
        let mut watch = JobWatch::new(policy());
        watch.node_assigned();
        let pending = JobStatus::new("PENDING");
        watch.observe(&pending, false, secs(0));
        assert!(matches!(
            watch.observe(&JobStatus::new("RUNNING"), false, secs(10)),
            WatchState::Running { confirmed: false, .. }
        ));
        assert_eq!(watch.observe(&pending, false, secs(20)), &WatchState::Pending);
        assert_eq!(watch.observe(&pending, false, secs(50)), &WatchState::Pending);
        // The queue deadline still counts from submission
        assert_eq!(
            watch.observe(&pending, false, secs(60)),
            &WatchState::TimedOut {
                waited: secs(60),
                last: JobState::Pending
            }
        );
    }

    #[test]
    fn test_unhealthy_server_hits_startup_deadline() {
        let mut watch = JobWatch::new(WatchPolicy {
            require_health: true,
            ..policy()
        });
        let running = JobStatus::new("RUNNING");
        watch.observe(&running, false, secs(10));
        watch.observe(&running, false, secs(20));
        assert!(matches!(
            watch.observe(&running, false, secs(130)),
            WatchState::TimedOut {
                last: JobState::Running,
                ..
            }
        ));
    }

    #[test]
    fn test_failed_before_and_after_running() {
        let mut watch = JobWatch::new(policy());
        assert_eq!(
            watch.observe(&JobStatus::new("CANCELLED by 0"), false, secs(0)),
            &WatchState::Failed {
                status: "CANCELLED by 0".to_string()
            }
        );

        let mut watch = JobWatch::new(policy());
        watch.observe(&JobStatus::new("RUNNING"), false, secs(0));
        assert_eq!(
            watch.observe(&JobStatus::new("OUT_OF_MEMORY"), false, secs(10)),
            &WatchState::RuntimeFailed {
                status: "OUT_OF_MEMORY".to_string()
            }
        );
    }

    #[test]
    fn test_completed_is_runtime_failure() {
        let mut watch = JobWatch::new(policy());
        assert!(matches!(
            watch.observe(&JobStatus::new("COMPLETED"), false, secs(0)),
            WatchState::RuntimeFailed { .. }
        ));
    }

    #[test]
    fn test_unknown_tolerated_during_grace() {
        let mut watch = JobWatch::new(policy());
        assert_eq!(
            watch.observe(&JobStatus::unknown(), false, secs(10)),
            &WatchState::Pending
        );
        assert_eq!(
            watch.observe(&JobStatus::unknown(), false, secs(40)),
            &WatchState::Lost
        );
    }

    #[test]
    fn test_unknown_grace_restarts_after_known_state() {
        let mut watch = JobWatch::new(policy());
        watch.observe(&JobStatus::unknown(), false, secs(0));
        watch.observe(&JobStatus::new("PENDING"), false, secs(20));
        assert_eq!(
            watch.observe(&JobStatus::unknown(), false, secs(40)),
            &WatchState::Pending
        );
    }

    #[tokio::test]
    async fn test_wait_until_ready() {
        let scheduler =
            ScriptedScheduler::new(["UNKNOWN", "PENDING", "RUNNING", "RUNNING"]).with_node("della-l01g02");
        let clock = ManualClock::new();
        let job: JobId = "123".parse().unwrap();

        let outcome = wait_until_ready(&scheduler, &job, 8000, policy(), None, &clock)
            .await
            .unwrap();
        assert_eq!(outcome.state, WatchState::Ready);
        assert_eq!(outcome.node.as_deref(), Some("della-l01g02"));
        assert_eq!(outcome.polls, 4);
        assert_eq!(clock.elapsed(), secs(30));
    }

    #[tokio::test]
    async fn test_wait_until_ready_waits_for_node() {
        let scheduler = ScriptedScheduler::new(["RUNNING"]).with_node_after(3, "della-l01g02");
        let clock = ManualClock::new();
        let job: JobId = "123".parse().unwrap();

        let outcome = wait_until_ready(&scheduler, &job, 8000, policy(), None, &clock)
            .await
            .unwrap();
        assert_eq!(outcome.state, WatchState::Ready);
        assert_eq!(outcome.node.as_deref(), Some("della-l01g02"));
        assert_eq!(outcome.polls, 4);
        assert_eq!(clock.elapsed(), secs(30));
    }

    #[tokio::test]
    async fn test_wait_until_ready_with_probe() {
        let scheduler = ScriptedScheduler::new(["RUNNING"]).with_node("della-l01g02");
        let clock = ManualClock::new();
        let job: JobId = "123".parse().unwrap();
        let policy = WatchPolicy {
            require_health: true,
            ..policy()
        };

        let probe = StaticProbe::healthy_after(3);
        let outcome = wait_until_ready(&scheduler, &job, 8000, policy, Some(&probe), &clock)
            .await
            .unwrap();
        assert_eq!(outcome.state, WatchState::Ready);
        assert_eq!(probe.calls(), 3);
    }

    #[tokio::test]
    async fn test_wait_until_ready_times_out_when_never_scheduled() {
        let scheduler = ScriptedScheduler::new(["PENDING"]);
        let clock = ManualClock::new();
        let job: JobId = "123".parse().unwrap();

        let outcome = wait_until_ready(&scheduler, &job, 8000, policy(), None, &clock)
            .await
            .unwrap();
        assert!(matches!(outcome.state, WatchState::TimedOut { last: JobState::Pending, .. }));
        assert_eq!(outcome.node, None);
        assert_eq!(clock.elapsed(), secs(60));
    }
}
