// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! SLURM batch script rendering.
//!
//! Rendering is a pure function of the snapshot and the request. The port is only written
//! on the `PORT=` line, everything else refers to `$PORT`.

use std::path::Path;

use minijinja::{Environment, UndefinedBehavior, Value};
use serde::Serialize;

use crate::container::{ContainerCommand, container_env, shell_quote};
use crate::deployment::DeploymentRequest;
use crate::error::DeployError;
use crate::hub::ResolvedSnapshot;

const BUILTIN_TEMPLATE: &str = include_str!("templates/job.sh.j2");

/// A rendered batch script, ready to hand to the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    pub job_name: String,
    pub script: String,
}

impl JobDescriptor {
    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context as _;
        std::fs::write(path, &self.script)
            .with_context(|| format!("Failed to write job script to {}", path.display()))
    }
}

/// Variables available to job script templates
#[derive(Debug, Serialize)]
struct ScriptContext<'a> {
    job_name: String,
    model_id: &'a str,
    revision: &'a str,
    cpus: u32,
    mem_gb: u32,
    gpus: u32,
    time_limit: String,
    partition: Option<&'a str>,
    account: Option<&'a str>,
    email: Option<&'a str>,
    port: u16,
    cache_dir: String,
    snapshot_path: String,
    container: String,
    image: &'a str,
    quantization: String,
    context_length: u32,
    env: Vec<(&'static str, &'static str)>,
    launch_command: String,
}

fn environment<'source>() -> Environment<'source> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_keep_trailing_newline(true);
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.add_filter("shell_quote", |value: Value| shell_quote(&value.to_string()));
    env
}

/// Render the batch script serving `snapshot` as described by `request`.
///
/// Uses the template file of the request when it has one.
pub fn render_job_script(
    snapshot: &ResolvedSnapshot,
    request: &DeploymentRequest,
) -> Result<JobDescriptor, DeployError> {
    request.check()?;

    let custom;
    let source = match &request.template {
        Some(path) => {
            custom = std::fs::read_to_string(path).map_err(|e| {
                DeployError::Config(format!("cannot read template {}: {e}", path.display()))
            })?;
            custom.as_str()
        }
        None => BUILTIN_TEMPLATE,
    };

    let resources = &request.resources;
    let ctx = ScriptContext {
        job_name: request.job_name(),
        model_id: &request.model_id,
        revision: &snapshot.revision,
        cpus: resources.cpus,
        mem_gb: resources.mem_gb,
        gpus: resources.gpus,
        time_limit: resources.slurm_time(),
        partition: resources.partition.as_deref(),
        account: resources.account.as_deref(),
        email: request.email.as_deref(),
        port: request.port,
        cache_dir: snapshot.cache_root.display().to_string(),
        snapshot_path: snapshot.path.display().to_string(),
        container: request.container.to_string(),
        image: &request.image,
        quantization: request.quantization.to_string(),
        context_length: request.context_length,
        env: container_env().to_vec(),
        launch_command: ContainerCommand::for_request(request, snapshot).render(),
    };

    let env = environment();
    let script = env.template_from_str(source)?.render(&ctx)?;
    Ok(JobDescriptor {
        job_name: ctx.job_name,
        script,
    })
}
