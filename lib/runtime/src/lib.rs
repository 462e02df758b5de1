// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! llmip runtime: configuration, logging and the batch scheduler seam

pub use anyhow::{
    Context as ErrorContext, Error, Ok as OK, Result, anyhow as error, bail as raise,
};

pub mod config;
pub use config::{ContainerRuntime, PlatformConfig};

pub mod logging;
pub mod scheduler;
pub mod ssh;
pub mod utils;
