// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use llmip_runtime::scheduler::{JobId, JobState, SchedulerError};

/// Why a snapshot could not be resolved from a cache directory
#[derive(Debug, thiserror::Error)]
pub enum LocateError {
    #[error("model '{repo_id}' is not in the cache at {}", cache.display())]
    RepoNotFound { repo_id: String, cache: PathBuf },

    #[error("model '{repo_id}' has no snapshot for revision '{revision}'")]
    RevisionNotFound { repo_id: String, revision: String },

    #[error("model '{repo_id}' has no snapshots")]
    NoSnapshots { repo_id: String },

    #[error("snapshot at {} is incomplete, missing {missing}", path.display())]
    Incomplete { path: PathBuf, missing: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("Model not found: {0}")]
    NotFound(#[from] LocateError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Submission failed: {0}")]
    Submission(String),

    #[error(
        "Job {job_id} was not ready after {waited}. {}, cancel it with `{cancel_command}`",
        where_it_stopped(.last, .node.as_deref())
    )]
    Timeout {
        job_id: JobId,
        waited: String,
        /// Scheduler state when the wait gave up
        last: JobState,
        node: Option<String>,
        cancel_command: String,
    },

    #[error("Job {job_id} stopped after it started running: {status}")]
    RuntimeFailure { job_id: JobId, status: String },

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

fn where_it_stopped(last: &JobState, node: Option<&str>) -> String {
    match (*last, node) {
        (JobState::Running, Some(node)) => {
            format!("It is running on {node} but the server never became healthy")
        }
        (JobState::Running, None) => {
            "It is running but the scheduler has not reported its node".to_string()
        }
        _ => "It is still queued".to_string(),
    }
}

impl From<validator::ValidationErrors> for DeployError {
    fn from(e: validator::ValidationErrors) -> Self {
        DeployError::Config(e.to_string())
    }
}

impl From<minijinja::Error> for DeployError {
    fn from(e: minijinja::Error) -> Self {
        DeployError::Config(format!("job script template: {e:#}"))
    }
}
