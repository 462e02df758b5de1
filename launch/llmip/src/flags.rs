// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use llmip_llm::deployment::DEFAULT_CONTEXT_LENGTH;
use llmip_llm::hub::default_cache_dir;
use llmip_llm::protocols::DEFAULT_MAX_NEW_TOKENS;
use llmip_llm::{DeployError, DeploymentRequest, Quantization};
use llmip_runtime::{ContainerRuntime, PlatformConfig};

/// Deploy LLM inference servers on a SLURM cluster
#[derive(Parser, Debug)]
#[command(name = "llmip", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download a model from the HuggingFace hub into a cache directory
    ModelDl(ModelDlArgs),

    /// Submit a batch job serving a cached model and wait until it is ready
    Deploy(Box<DeployArgs>),

    /// List the models in a cache directory
    List(ListArgs),

    /// Show the scheduler state of a job
    Status(JobArgs),

    /// Cancel a job
    Cancel(JobArgs),

    /// Send one prompt to a running server
    Generate(GenerateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ModelDlArgs {
    /// HuggingFace model repository id, e.g. bigscience/bloom-560m
    #[arg(long)]
    pub repo_id: String,

    #[arg(long, default_value = "main")]
    pub revision: String,

    /// Cache directory to download into. Defaults to $HF_HOME, then the working directory.
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct DeployArgs {
    /// Model repository id, e.g. bigscience/bloom-560m
    #[arg(long)]
    pub name: String,

    /// Branch, tag or commit. Defaults to the newest cached snapshot.
    #[arg(long)]
    pub revision: Option<String>,

    /// Cache directory holding the model. Defaults to $HF_HOME, then the working directory.
    #[arg(long, visible_alias = "cache-dir")]
    pub dir: Option<PathBuf>,

    #[arg(long)]
    pub gpus: Option<u32>,

    #[arg(long)]
    pub cpus: Option<u32>,

    /// Memory in GB
    #[arg(long)]
    pub mem_gb: Option<u32>,

    /// Wall time limit, e.g. 2h or 90m
    #[arg(long, value_parser = humantime::parse_duration)]
    pub time: Option<Duration>,

    #[arg(long)]
    pub partition: Option<String>,

    #[arg(long)]
    pub account: Option<String>,

    /// Port the server listens on, on the compute node
    #[arg(long)]
    pub port: Option<u16>,

    /// docker or singularity
    #[arg(long)]
    pub container: Option<ContainerRuntime>,

    /// Container image. Defaults to the configured image for the container runtime.
    #[arg(long)]
    pub image: Option<String>,

    /// none, bitsandbytes or gptq
    #[arg(long, default_value_t = Quantization::None)]
    pub quantize: Quantization,

    /// Maximum total tokens per request
    #[arg(long, default_value_t = DEFAULT_CONTEXT_LENGTH)]
    pub context_length: u32,

    /// Send scheduler notifications to this address
    #[arg(long)]
    pub email: Option<String>,

    /// MiniJinja job script template replacing the built-in one
    #[arg(long)]
    pub template: Option<PathBuf>,

    /// Write the rendered job script to this file
    #[arg(long)]
    pub script_out: Option<PathBuf>,

    /// Print the job script without submitting it
    #[arg(long)]
    pub dry_run: bool,

    /// Report ready as soon as the job runs, without waiting on /health
    #[arg(long)]
    pub no_health_check: bool,

    /// How long to wait for the job to start, e.g. 30m
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,
}

impl DeployArgs {
    /// Apply the flags that override platform configuration
    pub fn apply_to(&self, config: &mut PlatformConfig) {
        if let Some(gpus) = self.gpus {
            config.gpus = gpus;
        }
        if let Some(cpus) = self.cpus {
            config.cpus = cpus;
        }
        if let Some(mem_gb) = self.mem_gb {
            config.mem_gb = mem_gb;
        }
        if let Some(time) = self.time {
            config.time_limit = humantime::format_duration(time).to_string();
        }
        if self.partition.is_some() {
            config.partition = self.partition.clone();
        }
        if self.account.is_some() {
            config.account = self.account.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(container) = self.container {
            config.container = container;
        }
        if self.no_health_check {
            config.health_check = false;
        }
        if let Some(timeout) = self.timeout {
            config.ready_timeout_secs = timeout.as_secs().max(1);
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(default_cache_dir)
    }

    /// The deployment request these flags describe, on top of `config`
    pub fn to_request(&self, config: &PlatformConfig) -> Result<DeploymentRequest, DeployError> {
        let mut builder = DeploymentRequest::builder(config)?
            .model_id(self.name.as_str())
            .cache_dir(self.cache_dir())
            .quantization(self.quantize)
            .context_length(self.context_length);
        if let Some(revision) = &self.revision {
            builder = builder.revision(revision.as_str());
        }
        if let Some(image) = &self.image {
            builder = builder.image(image.as_str());
        }
        if let Some(email) = &self.email {
            builder = builder.email(email.as_str());
        }
        if let Some(template) = &self.template {
            builder = builder.template(template.as_path());
        }
        builder.build()
    }
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Cache directory. Defaults to $HF_HOME, then the working directory.
    #[arg(long, visible_alias = "cache-dir")]
    pub dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct JobArgs {
    #[arg(long)]
    pub job_id: String,
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Host the server is reachable on, usually localhost through a tunnel
    #[arg(long, default_value = "localhost")]
    pub host: String,

    #[arg(long, default_value_t = llmip_runtime::config::DEFAULT_PORT)]
    pub port: u16,

    #[arg(long)]
    pub prompt: String,

    #[arg(long, default_value_t = DEFAULT_MAX_NEW_TOKENS)]
    pub max_new_tokens: u32,

    /// Request timeout
    #[arg(long, default_value = "5m", value_parser = humantime::parse_duration)]
    pub timeout: Duration,
}
