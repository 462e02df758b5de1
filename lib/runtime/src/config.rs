// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::time::Duration;

use anyhow::{Context as _, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use validator::{Validate, ValidationError};

pub mod environment_names;

use environment_names::{logging as env_logging, platform as env_platform};

/// System-wide configuration file, installed by cluster admins
const SYSTEM_CONFIG_PATH: &str = "/etc/llmip/config.toml";

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_READY_TIMEOUT_SECS: u64 = 30 * 60;
/// Model load time allowed once the job is running
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 10 * 60;
/// How long a job may report no state at all before we give up on it.
/// sacct can lag a few seconds behind sbatch.
pub const DEFAULT_UNKNOWN_GRACE_SECS: u64 = 30;
pub const DEFAULT_HEALTH_REQUEST_TIMEOUT_SECS: u64 = 3;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_DOCKER_IMAGE: &str = "ghcr.io/huggingface/text-generation-inference:latest";
pub const DEFAULT_SINGULARITY_IMAGE: &str = "text-generation-inference_latest.sif";

/// Container runtime used on the compute node
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ContainerRuntime {
    Docker,
    #[default]
    Singularity,
}

/// Platform configuration
///
/// Priority, highest first:
/// 1. Environment variables prefixed with `LLMIP_` (empty values are ignored)
/// 2. The TOML file named by `LLMIP_CONFIG_PATH`
/// 3. `/etc/llmip/config.toml`
/// 4. Built-in defaults
///
/// Command line flags override all of these.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct PlatformConfig {
    /// Seconds between two scheduler status queries
    #[validate(range(min = 1))]
    pub poll_interval_secs: u64,

    /// Give up waiting for the server after this many seconds
    #[validate(range(min = 1))]
    pub ready_timeout_secs: u64,

    /// Give up if the server is not healthy this many seconds after the job started
    #[validate(range(min = 1))]
    pub startup_timeout_secs: u64,

    #[validate(range(min = 1))]
    pub unknown_grace_secs: u64,

    /// Require a successful `/health` answer before reporting ready
    pub health_check: bool,

    #[validate(range(min = 1))]
    pub health_request_timeout_secs: u64,

    pub container: ContainerRuntime,
    pub docker_image: String,
    pub singularity_image: String,

    pub port: u16,
    pub gpus: u32,
    pub cpus: u32,
    pub mem_gb: u32,

    /// Wall time limit, humantime syntax ("1h", "90m", "2h 30m")
    #[validate(custom(function = "validate_time_limit"))]
    pub time_limit: String,

    pub partition: Option<String>,
    pub account: Option<String>,

    /// SSH entry point of the cluster. Defaults to the host we run on.
    pub login_host: Option<String>,
    /// Defaults to `$USER`
    pub ssh_user: Option<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        PlatformConfig {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            ready_timeout_secs: DEFAULT_READY_TIMEOUT_SECS,
            startup_timeout_secs: DEFAULT_STARTUP_TIMEOUT_SECS,
            unknown_grace_secs: DEFAULT_UNKNOWN_GRACE_SECS,
            health_check: true,
            health_request_timeout_secs: DEFAULT_HEALTH_REQUEST_TIMEOUT_SECS,
            container: ContainerRuntime::default(),
            docker_image: DEFAULT_DOCKER_IMAGE.to_string(),
            singularity_image: DEFAULT_SINGULARITY_IMAGE.to_string(),
            port: DEFAULT_PORT,
            gpus: 1,
            cpus: 4,
            mem_gb: 32,
            time_limit: "1h".to_string(),
            partition: None,
            account: None,
            login_host: None,
            ssh_user: None,
        }
    }
}

fn validate_time_limit(value: &str) -> Result<(), ValidationError> {
    humantime::parse_duration(value)
        .map(|_| ())
        .map_err(|_| ValidationError::new("time_limit must be a duration such as '1h' or '90m'"))
}

impl fmt::Display for PlatformConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "poll_interval_secs={}, ", self.poll_interval_secs)?;
        write!(f, "ready_timeout_secs={}, ", self.ready_timeout_secs)?;
        write!(f, "health_check={}, ", self.health_check)?;
        write!(f, "container={}, ", self.container)?;
        write!(f, "port={}, ", self.port)?;
        write!(
            f,
            "resources=gpus:{} cpus:{} mem:{}G time:{}",
            self.gpus, self.cpus, self.mem_gb, self.time_limit
        )?;
        if let Some(partition) = &self.partition {
            write!(f, ", partition={partition}")?;
        }
        Ok(())
    }
}

impl PlatformConfig {
    pub(crate) fn figment() -> Figment {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(PlatformConfig::default()))
            .merge(Toml::file(SYSTEM_CONFIG_PATH));
        match std::env::var(env_platform::LLMIP_CONFIG_PATH) {
            Ok(path) if !path.is_empty() => figment = figment.merge(Toml::file(path)),
            _ => {}
        }
        figment.merge(Env::prefixed(env_platform::PREFIX).filter_map(|k| {
            let full_key = format!("{}{}", env_platform::PREFIX, k.as_str().to_uppercase());
            // filters out empty environment variables
            match std::env::var(&full_key) {
                Ok(v) if !v.is_empty() => Some(k.into()),
                _ => None,
            }
        }))
    }

    /// Load the platform configuration from files and the environment
    pub fn from_settings() -> Result<PlatformConfig> {
        let config: PlatformConfig = Self::figment()
            .extract()
            .context("failed to load platform configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn unknown_grace(&self) -> Duration {
        Duration::from_secs(self.unknown_grace_secs)
    }

    pub fn health_request_timeout(&self) -> Duration {
        Duration::from_secs(self.health_request_timeout_secs)
    }

    pub fn time_limit(&self) -> Result<Duration> {
        humantime::parse_duration(&self.time_limit)
            .with_context(|| format!("invalid time limit '{}'", self.time_limit))
    }

    /// Image reference for the configured container runtime
    pub fn image_for(&self, runtime: ContainerRuntime) -> &str {
        match runtime {
            ContainerRuntime::Docker => &self.docker_image,
            ContainerRuntime::Singularity => &self.singularity_image,
        }
    }

    /// Where users SSH to. Falls back to the name of the current host, since the tool
    /// is normally run from a login node.
    pub fn resolved_login_host(&self) -> String {
        if let Some(host) = &self.login_host {
            return host.clone();
        }
        hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string())
    }

    pub fn resolved_ssh_user(&self) -> String {
        self.ssh_user.clone().unwrap_or_else(|| {
            std::env::var(environment_names::shell::USER).unwrap_or_else(|_| "$USER".to_string())
        })
    }
}

/// Check if a string is truthy: "1", "true", "on", "yes" (case-insensitive)
pub fn is_truthy(val: &str) -> bool {
    matches!(val.to_lowercase().as_str(), "1" | "true" | "on" | "yes")
}

/// Check if an environment variable is set to a truthy value
pub fn env_is_truthy(env: &str) -> bool {
    std::env::var(env).is_ok_and(|val| is_truthy(&val))
}

pub fn jsonl_logging_enabled() -> bool {
    env_is_truthy(env_logging::LLMIP_LOGGING_JSONL)
}

pub fn disable_ansi_logging() -> bool {
    env_is_truthy(env_logging::LLMIP_DISABLE_ANSI_LOGGING)
}

pub fn use_local_timezone() -> bool {
    env_is_truthy(env_logging::LLMIP_LOG_USE_LOCAL_TZ)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    #[serial_test::serial]
    fn test_platform_config_defaults() -> Result<()> {
        temp_env::with_vars(
            vec![
                (env_platform::LLMIP_CONFIG_PATH, None::<&str>),
                (env_platform::LLMIP_POLL_INTERVAL_SECS, None),
                (env_platform::LLMIP_PORT, None),
            ],
            || {
                let config = PlatformConfig::from_settings()?;
                let default_config = PlatformConfig::default();
                assert_eq!(config.poll_interval_secs, default_config.poll_interval_secs);
                assert_eq!(config.port, DEFAULT_PORT);
                assert_eq!(config.container, ContainerRuntime::Singularity);
                Ok(())
            },
        )
    }

    #[test]
    #[serial_test::serial]
    fn test_platform_config_with_env_vars() -> Result<()> {
        temp_env::with_vars(
            vec![
                (env_platform::LLMIP_POLL_INTERVAL_SECS, Some("2")),
                (env_platform::LLMIP_CONTAINER, Some("docker")),
                (env_platform::LLMIP_PORT, Some("9000")),
                (env_platform::LLMIP_LOGIN_HOST, Some("della.princeton.edu")),
            ],
            || {
                let config = PlatformConfig::from_settings()?;
                assert_eq!(config.poll_interval(), Duration::from_secs(2));
                assert_eq!(config.container, ContainerRuntime::Docker);
                assert_eq!(config.port, 9000);
                assert_eq!(config.resolved_login_host(), "della.princeton.edu");
                Ok(())
            },
        )
    }

    #[test]
    #[serial_test::serial]
    fn test_platform_config_ignores_empty_env_vars() -> Result<()> {
        temp_env::with_vars(vec![(env_platform::LLMIP_GPUS, Some(""))], || {
            let config = PlatformConfig::from_settings()?;
            assert_eq!(config.gpus, PlatformConfig::default().gpus);
            Ok(())
        })
    }

    #[test]
    #[serial_test::serial]
    fn test_platform_config_rejects_zero_interval() {
        temp_env::with_vars(
            vec![(env_platform::LLMIP_POLL_INTERVAL_SECS, Some("0"))],
            || {
                let err = PlatformConfig::from_settings().unwrap_err();
                assert!(err.to_string().contains("poll_interval_secs"));
            },
        )
    }

    #[test]
    #[serial_test::serial]
    fn test_platform_config_from_file() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "gpus = 2\npartition = \"gpu\"\ntime_limit = \"3h\"")?;
        let path = file.path().display().to_string();
        temp_env::with_vars(
            vec![
                (env_platform::LLMIP_CONFIG_PATH, Some(path.as_str())),
                (env_platform::LLMIP_GPUS, None),
            ],
            || {
                let config = PlatformConfig::from_settings()?;
                assert_eq!(config.gpus, 2);
                assert_eq!(config.partition.as_deref(), Some("gpu"));
                assert_eq!(config.time_limit()?, Duration::from_secs(3 * 3600));
                Ok(())
            },
        )
    }

    #[test]
    fn test_invalid_time_limit_fails_validation() {
        let config = PlatformConfig {
            time_limit: "forever".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_container_runtime_parse() {
        assert_eq!(
            "Docker".parse::<ContainerRuntime>().unwrap(),
            ContainerRuntime::Docker
        );
        assert_eq!(ContainerRuntime::Singularity.to_string(), "singularity");
        assert!("podman".parse::<ContainerRuntime>().is_err());
    }

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy("1"));
        assert!(is_truthy("TRUE"));
        assert!(is_truthy("yes"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy(""));
        assert!(!env_is_truthy("DEFINITELY_NOT_SET_VAR_12345"));
    }
}
