// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The deployment pipeline: locate the snapshot, render the batch script, submit it and wait
//! for the server.

use std::path::PathBuf;

use tracing::Instrument as _;

use llmip_runtime::PlatformConfig;
use llmip_runtime::scheduler::{
    HealthProbe, JobId, Scheduler, SchedulerError, WatchPolicy, WatchState, wait_until_ready,
};
use llmip_runtime::utils::Clock;

use crate::connection::ConnectionReport;
use crate::deployment::DeploymentRequest;
use crate::error::DeployError;
use crate::hub::{ResolvedSnapshot, locate_snapshot};
use crate::job_script::{JobDescriptor, render_job_script};

/// A submitted job, as known to this invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: JobId,
    pub node: Option<String>,
    pub port: u16,
}

#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Render the script and stop
    pub dry_run: bool,
    /// Also write the rendered script here
    pub script_out: Option<PathBuf>,
}

#[derive(Debug)]
pub enum DeployOutcome {
    DryRun {
        snapshot: ResolvedSnapshot,
        job: JobDescriptor,
    },
    Ready {
        handle: JobHandle,
        report: ConnectionReport,
    },
}

pub struct Deployer<'a> {
    config: &'a PlatformConfig,
    scheduler: &'a dyn Scheduler,
    clock: &'a dyn Clock,
    probe: Option<&'a dyn HealthProbe>,
}

impl<'a> Deployer<'a> {
    pub fn new(
        config: &'a PlatformConfig,
        scheduler: &'a dyn Scheduler,
        clock: &'a dyn Clock,
    ) -> Self {
        Deployer {
            config,
            scheduler,
            clock,
            probe: None,
        }
    }

    /// Wait for this probe to pass before reporting the server ready
    pub fn with_probe(mut self, probe: &'a dyn HealthProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    pub async fn deploy(
        &self,
        request: &DeploymentRequest,
        options: &DeployOptions,
    ) -> Result<DeployOutcome, DeployError> {
        let span = tracing::info_span!("deploy", model = %request.model_id);
        self.deploy_inner(request, options).instrument(span).await
    }

    async fn deploy_inner(
        &self,
        request: &DeploymentRequest,
        options: &DeployOptions,
    ) -> Result<DeployOutcome, DeployError> {
        let snapshot = locate_snapshot(
            &request.cache_dir,
            &request.model_id,
            request.revision.as_deref(),
        )?;
        tracing::info!("Using snapshot {}", snapshot.path.display());

        let job = render_job_script(&snapshot, request)?;
        if let Some(path) = &options.script_out {
            job.write_to(path)
                .map_err(|e| DeployError::Config(format!("{e:#}")))?;
            tracing::info!("Wrote job script to {}", path.display());
        }
        if options.dry_run {
            return Ok(DeployOutcome::DryRun { snapshot, job });
        }

        let job_id = self.scheduler.submit(&job.script).await.map_err(|e| match e {
            SchedulerError::Rejected(msg) => DeployError::Submission(msg),
            other => DeployError::Submission(other.to_string()),
        })?;
        let mut handle = JobHandle {
            job_id,
            node: None,
            port: request.port,
        };

        let outcome = wait_until_ready(
            self.scheduler,
            &handle.job_id,
            handle.port,
            WatchPolicy::from_config(self.config),
            self.probe,
            self.clock,
        )
        .await?;
        handle.node = outcome.node;

        let job_id = handle.job_id.clone();
        match outcome.state {
            WatchState::Ready => {
                let Some(node) = handle.node.clone() else {
                    return Err(DeployError::Submission(format!(
                        "job {job_id} is ready but has no node"
                    )));
                };
                let report = ConnectionReport::new(
                    job_id.clone(),
                    &request.model_id,
                    node,
                    handle.port,
                    self.config,
                    self.scheduler.cancel_command(&job_id),
                );
                Ok(DeployOutcome::Ready { handle, report })
            }
            WatchState::Failed { status } => Err(DeployError::Submission(format!(
                "job {job_id} ended before it started running: {status}"
            ))),
            WatchState::RuntimeFailed { status } => {
                Err(DeployError::RuntimeFailure { job_id, status })
            }
            WatchState::Lost => Err(DeployError::Submission(format!(
                "the scheduler has no state for job {job_id}"
            ))),
            WatchState::TimedOut { waited, last } => Err(DeployError::Timeout {
                cancel_command: self.scheduler.cancel_command(&job_id),
                job_id,
                waited: humantime::format_duration(waited).to_string(),
                last,
                node: handle.node,
            }),
            WatchState::Pending | WatchState::Running { .. } => Err(DeployError::Submission(
                format!("stopped waiting for job {job_id} before it was ready"),
            )),
        }
    }
}
