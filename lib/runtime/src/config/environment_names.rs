// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Environment variable name constants for centralized management across the workspace
//!
//! ## Organization
//!
//! - **Logging**: Log filters, output format and timestamps
//! - **Platform**: The `LLMIP_*` configuration layer and its file override
//! - **HuggingFace**: Cache location, offline mode and credentials, shared with the
//!   inference container
//! - **Shell**: Values read from the login environment

/// Logging environment variables
pub mod logging {
    /// Log filter directives (e.g., "debug", "llmip_runtime=trace")
    pub const LLMIP_LOG: &str = "LLMIP_LOG";

    /// Path to logging configuration file
    pub const LLMIP_LOGGING_CONFIG_PATH: &str = "LLMIP_LOGGING_CONFIG_PATH";

    /// Enable JSONL logging format
    pub const LLMIP_LOGGING_JSONL: &str = "LLMIP_LOGGING_JSONL";

    /// Disable ANSI terminal colors in logs
    pub const LLMIP_DISABLE_ANSI_LOGGING: &str = "LLMIP_DISABLE_ANSI_LOGGING";

    /// Use local timezone for logging timestamps (default is UTC)
    pub const LLMIP_LOG_USE_LOCAL_TZ: &str = "LLMIP_LOG_USE_LOCAL_TZ";
}

/// Platform configuration environment variables
///
/// Every field of [`crate::config::PlatformConfig`] can be set with `LLMIP_<FIELD>`,
/// for example `LLMIP_POLL_INTERVAL_SECS=5`.
pub mod platform {
    /// Prefix for all platform configuration fields
    pub const PREFIX: &str = "LLMIP_";

    /// Path to an additional TOML configuration file
    pub const LLMIP_CONFIG_PATH: &str = "LLMIP_CONFIG_PATH";

    pub const LLMIP_POLL_INTERVAL_SECS: &str = "LLMIP_POLL_INTERVAL_SECS";
    pub const LLMIP_READY_TIMEOUT_SECS: &str = "LLMIP_READY_TIMEOUT_SECS";
    pub const LLMIP_CONTAINER: &str = "LLMIP_CONTAINER";
    pub const LLMIP_PORT: &str = "LLMIP_PORT";
    pub const LLMIP_GPUS: &str = "LLMIP_GPUS";
    pub const LLMIP_LOGIN_HOST: &str = "LLMIP_LOGIN_HOST";
    pub const LLMIP_SSH_USER: &str = "LLMIP_SSH_USER";
}

/// HuggingFace hub environment variables
pub mod huggingface {
    /// Root of the HuggingFace cache. The snapshot cache lives directly below it
    /// for this platform, matching how models are downloaded with `model-dl`.
    /// Reference: <https://huggingface.co/docs/huggingface_hub/en/package_reference/environment_variables#hfhome>
    pub const HF_HOME: &str = "HF_HOME";

    /// Hub cache directory, read by the inference container
    pub const HUGGINGFACE_HUB_CACHE: &str = "HUGGINGFACE_HUB_CACHE";

    /// Disable all network calls to the hub
    pub const HF_HUB_OFFLINE: &str = "HF_HUB_OFFLINE";

    /// Access token for gated models
    pub const HF_TOKEN: &str = "HF_TOKEN";
}

/// Login shell environment
pub mod shell {
    pub const USER: &str = "USER";
}
