// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! # llmip LLM
//!
//! Deploys models from a HuggingFace cache onto a SLURM cluster with
//! text-generation-inference.

pub mod connection;
pub mod container;
pub mod deploy;
pub mod deployment;
pub mod error;
pub mod hub;
pub mod job_script;
pub mod protocols;

pub use deploy::{DeployOptions, DeployOutcome, Deployer, JobHandle};
pub use deployment::{DeploymentRequest, Quantization, ResourceSpec};
pub use error::{DeployError, LocateError};
