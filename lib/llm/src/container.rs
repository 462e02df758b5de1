// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The container command run inside the batch job.

use std::path::Path;

use llmip_runtime::ContainerRuntime;
use llmip_runtime::config::environment_names::huggingface as env_hf;

use crate::deployment::{DeploymentRequest, Quantization};
use crate::hub::ResolvedSnapshot;

/// Where the cache directory is mounted inside the container
pub const CONTAINER_DATA_DIR: &str = "/data";

/// One word of a shell command line
#[derive(Debug, Clone, PartialEq, Eq)]
enum Word {
    /// Quoted when rendered
    Literal(String),
    /// Emitted as is, for variable expansion
    Shell(&'static str),
}

impl Word {
    fn render(&self) -> String {
        match self {
            Word::Literal(s) => shell_quote(s),
            Word::Shell(s) => s.to_string(),
        }
    }
}

fn lit(s: impl Into<String>) -> Word {
    Word::Literal(s.into())
}

/// A command line split into display lines, each a program name or an option with its value
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerCommand {
    lines: Vec<Vec<Word>>,
}

impl ContainerCommand {
    fn line(&mut self, words: impl IntoIterator<Item = Word>) -> &mut Self {
        self.lines.push(words.into_iter().collect());
        self
    }

    /// Inference server invocation for `request`, serving `snapshot`
    pub fn for_request(request: &DeploymentRequest, snapshot: &ResolvedSnapshot) -> Self {
        let mut cmd = ContainerCommand::default();
        let mount = format!("{}:{CONTAINER_DATA_DIR}", snapshot.cache_root.display());
        let env = container_env();

        match request.container {
            ContainerRuntime::Singularity => {
                cmd.line([lit("singularity"), lit("run")]);
                cmd.line([lit("--nv")]);
                cmd.line([lit("--bind"), lit(mount)]);
                for (key, value) in env {
                    cmd.line([lit("--env"), lit(format!("{key}={value}"))]);
                }
            }
            ContainerRuntime::Docker => {
                cmd.line([lit("docker"), lit("run")]);
                cmd.line([lit("--rm")]);
                cmd.line([lit("--gpus"), lit("all")]);
                cmd.line([lit("--shm-size"), lit("1g")]);
                cmd.line([lit("-p"), Word::Shell("\"$PORT:$PORT\"")]);
                cmd.line([lit("-v"), lit(mount)]);
                for (key, value) in env {
                    cmd.line([lit("-e"), lit(format!("{key}={value}"))]);
                }
            }
        }
        cmd.line([lit(request.image.clone())]);

        // text-generation-launcher arguments
        cmd.line([lit("--model-id"), lit(container_model_path(snapshot))]);
        cmd.line([lit("--hostname"), lit("0.0.0.0")]);
        cmd.line([lit("--port"), Word::Shell("\"$PORT\"")]);
        cmd.line([lit("--num-shard"), lit(request.resources.gpus.to_string())]);
        cmd.line([
            lit("--max-total-tokens"),
            lit(request.context_length.to_string()),
        ]);
        if request.quantization != Quantization::None {
            cmd.line([lit("--quantize"), lit(request.quantization.to_string())]);
        }
        cmd
    }

    /// Multi-line rendering with `\` continuations
    pub fn render(&self) -> String {
        self.lines
            .iter()
            .map(|words| {
                words
                    .iter()
                    .map(Word::render)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join(" \\\n    ")
    }
}

/// Environment of the inference server: offline, reading the mounted cache
pub fn container_env() -> [(&'static str, &'static str); 3] {
    [
        (env_hf::HF_HOME, CONTAINER_DATA_DIR),
        (env_hf::HUGGINGFACE_HUB_CACHE, CONTAINER_DATA_DIR),
        (env_hf::HF_HUB_OFFLINE, "1"),
    ]
}

/// The snapshot path as seen from inside the container
pub fn container_model_path(snapshot: &ResolvedSnapshot) -> String {
    Path::new(CONTAINER_DATA_DIR)
        .join(snapshot.relative_path())
        .display()
        .to_string()
}

/// Quote `s` for a POSIX shell. Words made only of safe characters are left alone.
pub fn shell_quote(s: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c);
    if !s.is_empty() && s.chars().all(safe) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r#"'"'"'"#))
}
