// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::AsyncWriteExt as _;
use tokio::process::Command;

use super::{JobId, JobStatus, Scheduler, SchedulerError};

static SUBMITTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Submitted batch job (\S+)").unwrap());

/// SLURM through its command line tools (`sbatch`, `sacct`, `squeue`, `scancel`)
#[derive(Debug, Clone, Default)]
pub struct Slurm {
    /// Directory holding the SLURM binaries. `None` resolves them through `PATH`.
    bin_dir: Option<PathBuf>,
}

impl Slurm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bin_dir(bin_dir: impl Into<PathBuf>) -> Self {
        Slurm {
            bin_dir: Some(bin_dir.into()),
        }
    }

    fn program(&self, name: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    async fn run(
        &self,
        name: &str,
        args: &[&str],
        stdin: Option<&str>,
    ) -> Result<String, SchedulerError> {
        let command_line = std::iter::once(name)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        tracing::debug!("Running '{command_line}'");

        let mut child = Command::new(self.program(name))
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SchedulerError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            match pipe.write_all(input.as_bytes()).await {
                // The command exited without reading its input, its status tells us why
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(source) => {
                    return Err(SchedulerError::Spawn {
                        command: command_line,
                        source,
                    });
                }
                Ok(()) => {}
            }
            // Closing stdin tells sbatch the script is complete
            drop(pipe);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| SchedulerError::Spawn {
                command: command_line.clone(),
                source,
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SchedulerError::CommandFailed {
                command: command_line,
                status: output.status.to_string(),
                output: first_line(&stderr).unwrap_or(stdout.trim()).to_string(),
            });
        }
        tracing::debug!("Got {:?}", stdout.trim());
        Ok(stdout)
    }
}

/// First line of command output, trimmed. `None` if the output is blank.
pub(crate) fn first_line(output: &str) -> Option<&str> {
    let output = output.trim();
    if output.is_empty() {
        return None;
    }
    output.lines().next().map(str::trim)
}

pub(crate) fn parse_sbatch_output(output: &str) -> Result<JobId, SchedulerError> {
    SUBMITTED_RE
        .captures(output)
        .and_then(|caps| caps[1].parse().ok())
        .ok_or_else(|| SchedulerError::Rejected(output.trim().to_string()))
}

#[async_trait]
impl Scheduler for Slurm {
    async fn submit(&self, script: &str) -> Result<JobId, SchedulerError> {
        let output = match self.run("sbatch", &[], Some(script)).await {
            Err(SchedulerError::CommandFailed { output, .. }) => {
                return Err(SchedulerError::Rejected(output));
            }
            other => other?,
        };
        let job_id = parse_sbatch_output(&output)?;
        tracing::info!("Submitted batch job {job_id}");
        Ok(job_id)
    }

    async fn status(&self, job: &JobId) -> Result<JobStatus, SchedulerError> {
        let output = self
            .run(
                "sacct",
                &["-n", "-j", job.as_str(), "--format=State", "-P"],
                None,
            )
            .await?;
        Ok(first_line(&output).map_or_else(JobStatus::unknown, JobStatus::new))
    }

    async fn start_time(&self, job: &JobId) -> Result<Option<String>, SchedulerError> {
        let output = self
            .run(
                "sacct",
                &["-n", "-j", job.as_str(), "--format=Start", "-P"],
                None,
            )
            .await?;
        Ok(first_line(&output)
            .filter(|s| !s.eq_ignore_ascii_case("unknown"))
            .map(str::to_string))
    }

    async fn node(&self, job: &JobId) -> Result<String, SchedulerError> {
        let output = self
            .run(
                "squeue",
                &["-j", job.as_str(), "--noheader", "--format=%N"],
                None,
            )
            .await?;
        first_line(&output)
            .filter(|node| *node != "(null)")
            .map(str::to_string)
            .ok_or_else(|| SchedulerError::NoNode(job.clone()))
    }

    async fn cancel(&self, job: &JobId) -> Result<(), SchedulerError> {
        tracing::warn!("Cancelling SLURM job {job}");
        self.run("scancel", &[job.as_str()], None).await?;
        tracing::debug!("Cancelled job {job}");
        Ok(())
    }
}
