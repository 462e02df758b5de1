// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::time::Duration;

use derive_builder::Builder;
use serde::Serialize;
use strum::{Display, EnumString};
use validator::{Validate, ValidationError};

use llmip_runtime::{ContainerRuntime, PlatformConfig};

use crate::error::DeployError;

pub const DEFAULT_CONTEXT_LENGTH: u32 = 2048;

/// Lowest port a job may listen on without privileges
const MIN_PORT: u16 = 1024;

/// Weight quantization applied by the inference server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Quantization {
    #[default]
    None,
    Bitsandbytes,
    Gptq,
}

/// Resources requested from the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct ResourceSpec {
    /// The inference image is GPU only
    #[validate(range(min = 1, message = "at least one GPU is required"))]
    pub gpus: u32,

    #[validate(range(min = 1, message = "at least one CPU is required"))]
    pub cpus: u32,

    #[validate(range(min = 1, message = "memory must be at least 1 GB"))]
    pub mem_gb: u32,

    #[validate(custom(function = "validate_time_limit"))]
    pub time_limit: Duration,

    pub partition: Option<String>,
    pub account: Option<String>,
}

fn validate_time_limit(limit: &Duration) -> Result<(), ValidationError> {
    if limit.as_secs() == 0 {
        return Err(ValidationError::new("zero_time_limit")
            .with_message("time limit must be at least one second".into()));
    }
    Ok(())
}

impl ResourceSpec {
    pub fn from_config(config: &PlatformConfig) -> Result<Self, DeployError> {
        Ok(ResourceSpec {
            gpus: config.gpus,
            cpus: config.cpus,
            mem_gb: config.mem_gb,
            time_limit: config
                .time_limit()
                .map_err(|e| DeployError::Config(format!("{e:#}")))?,
            partition: config.partition.clone(),
            account: config.account.clone(),
        })
    }

    /// Time limit in the `D-HH:MM:SS` form `sbatch --time` accepts
    pub fn slurm_time(&self) -> String {
        let total = self.time_limit.as_secs();
        let days = total / 86_400;
        let hours = (total % 86_400) / 3600;
        let minutes = (total % 3600) / 60;
        let seconds = total % 60;
        format!("{days}-{hours:02}:{minutes:02}:{seconds:02}")
    }
}

/// Everything needed to deploy one model, as asked for on the command line
#[derive(Debug, Clone, Builder, Validate)]
#[builder(
    pattern = "owned",
    build_fn(private, name = "build_internal", validate = "Self::validate")
)]
pub struct DeploymentRequest {
    /// Repository id such as `bigscience/bloom-560m`
    #[builder(setter(into))]
    pub model_id: String,

    #[builder(default, setter(into, strip_option))]
    pub revision: Option<String>,

    #[builder(setter(into))]
    pub cache_dir: PathBuf,

    #[validate(nested)]
    pub resources: ResourceSpec,

    #[validate(custom(function = "validate_port"))]
    pub port: u16,

    #[builder(default)]
    pub container: ContainerRuntime,

    #[builder(setter(into))]
    pub image: String,

    #[builder(default)]
    pub quantization: Quantization,

    #[builder(default = "DEFAULT_CONTEXT_LENGTH")]
    #[validate(range(min = 1, message = "context length must be positive"))]
    pub context_length: u32,

    /// Address for scheduler begin/end/fail notifications
    #[builder(default, setter(into, strip_option))]
    pub email: Option<String>,

    /// MiniJinja template replacing the built-in job script
    #[builder(default, setter(into, strip_option))]
    pub template: Option<PathBuf>,
}

fn validate_port(port: u16) -> Result<(), ValidationError> {
    if port < MIN_PORT {
        return Err(ValidationError::new("privileged_port")
            .with_message(format!("port must be at least {MIN_PORT}").into()));
    }
    Ok(())
}

impl DeploymentRequestBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(model_id) = &self.model_id {
            let valid = !model_id.is_empty()
                && !model_id.starts_with('/')
                && !model_id.ends_with('/')
                && !model_id.contains("--")
                && model_id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "-_./".contains(c));
            if !valid {
                return Err(format!("'{model_id}' is not a model repository id"));
            }
        }
        if let Some(Some(email)) = &self.email {
            if !email.contains('@') {
                return Err(format!("'{email}' is not an email address"));
            }
        }
        Ok(())
    }

    pub fn build(self) -> Result<DeploymentRequest, DeployError> {
        self.build_internal()
            .map_err(|e| DeployError::Config(e.to_string()))
    }
}

impl DeploymentRequest {
    /// A builder preloaded with the platform defaults. Set the model and cache dir, then
    /// override what the user gave.
    pub fn builder(config: &PlatformConfig) -> Result<DeploymentRequestBuilder, DeployError> {
        Ok(DeploymentRequestBuilder::default()
            .resources(ResourceSpec::from_config(config)?)
            .port(config.port)
            .container(config.container)
            .image(config.image_for(config.container)))
    }

    /// Range and consistency checks on the resources, port and context length
    pub fn check(&self) -> Result<(), DeployError> {
        Ok(self.validate()?)
    }

    /// Scheduler job name: the model name without its organization
    pub fn job_name(&self) -> String {
        let name = self.model_id.rsplit('/').next().unwrap_or(&self.model_id);
        format!("tgi-{name}")
    }
}
