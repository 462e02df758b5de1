// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Batch scheduler abstraction.
//!
//! The cluster scheduler owns job placement. We only need to hand it a script, learn the
//! job id, and then ask about that job until the server it runs is reachable. [`Scheduler`]
//! is the seam between that workflow and the real scheduler commands, so the workflow can
//! be driven by [`mock::ScriptedScheduler`] in tests.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::Display;

pub mod slurm;
pub mod watch;

#[cfg(any(test, feature = "testing"))]
pub mod mock;

pub use slurm::Slurm;
pub use watch::{HealthProbe, JobWatch, WatchOutcome, WatchPolicy, WatchState, wait_until_ready};

/// Scheduler assigned job id, e.g. `12345` or `12345_7` for array tasks
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for JobId {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let valid = !s.is_empty()
            && s.starts_with(|c: char| c.is_ascii_digit())
            && s.chars().all(|c| c.is_ascii_digit() || c == '_' || c == '.');
        if valid {
            Ok(JobId(s.to_string()))
        } else {
            Err(SchedulerError::InvalidJobId(s.to_string()))
        }
    }
}

impl TryFrom<String> for JobId {
    type Error = SchedulerError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Slightly coarser categorization of SLURM job states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum JobState {
    Running,
    Completed,
    Pending,
    Failed,
    Unknown,
}

impl JobState {
    /// Interpret one line of `sacct --format=State` output.
    ///
    /// `CANCELLED by 1234` and truncated states such as `CANCELLED+` are accepted.
    pub fn from_status_str(status: &str) -> JobState {
        let word = status
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .trim_end_matches('+');
        match word {
            "RUNNING" => JobState::Running,
            "COMPLETED" | "DEADLINE" => JobState::Completed,
            "PENDING" | "REQUEUED" => JobState::Pending,
            "FAILED" | "BOOT_FAIL" | "CANCELLED" | "NODE_FAIL" | "OUT_OF_MEMORY" | "PREEMPTED"
            | "TIMEOUT" => JobState::Failed,
            _ => JobState::Unknown,
        }
    }
}

/// A state report: what the scheduler printed and how we read it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub raw: String,
    pub state: JobState,
}

impl JobStatus {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let state = JobState::from_status_str(&raw);
        JobStatus { raw, state }
    }

    pub fn unknown() -> Self {
        JobStatus {
            raw: String::new(),
            state: JobState::Unknown,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed ({status}): {output}")]
    CommandFailed {
        command: String,
        status: String,
        output: String,
    },

    #[error("Could not submit job, scheduler said: '{0}'")]
    Rejected(String),

    #[error("invalid job id '{0}'")]
    InvalidJobId(String),

    #[error("no node assigned to job {0}")]
    NoNode(JobId),
}

#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Submit a batch script. Returns as soon as the scheduler accepted it.
    async fn submit(&self, script: &str) -> Result<JobId, SchedulerError>;

    async fn status(&self, job: &JobId) -> Result<JobStatus, SchedulerError>;

    /// Estimated or actual start time, as printed by the scheduler
    async fn start_time(&self, job: &JobId) -> Result<Option<String>, SchedulerError>;

    /// Compute node the job is running on
    async fn node(&self, job: &JobId) -> Result<String, SchedulerError>;

    async fn cancel(&self, job: &JobId) -> Result<(), SchedulerError>;

    /// The command a user can run themselves to cancel the job
    fn cancel_command(&self, job: &JobId) -> String {
        format!("scancel {job}")
    }
}
