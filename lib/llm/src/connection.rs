// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! What the user needs to reach a deployed model.

use std::fmt;

use llmip_runtime::PlatformConfig;
use llmip_runtime::scheduler::JobId;
use llmip_runtime::ssh::{TunnelCommand, is_local_node};

use crate::container::shell_quote;
use crate::protocols::{GenerateRequest, base_url};

/// How the server port becomes reachable as `localhost:<port>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// We are on the compute node already
    Direct,
    Tunnel(TunnelCommand),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionReport {
    pub job_id: JobId,
    pub model_id: String,
    pub node: String,
    pub port: u16,
    pub access: Access,
    pub cancel_command: String,
}

impl ConnectionReport {
    /// Pick direct access when running on `node`, a tunnel through the login host otherwise
    pub fn new(
        job_id: JobId,
        model_id: impl Into<String>,
        node: impl Into<String>,
        port: u16,
        config: &PlatformConfig,
        cancel_command: String,
    ) -> Self {
        let node = node.into();
        let access = if is_local_node(&node) {
            Access::Direct
        } else {
            Access::Tunnel(TunnelCommand {
                local_port: port,
                node: node.clone(),
                remote_port: port,
                user: config.resolved_ssh_user(),
                login_host: config.resolved_login_host(),
            })
        };
        ConnectionReport {
            job_id,
            model_id: model_id.into(),
            node,
            port,
            access,
            cancel_command,
        }
    }

    /// Base URL on the user's side
    pub fn local_url(&self) -> String {
        let port = match &self.access {
            Access::Direct => self.port,
            Access::Tunnel(tunnel) => tunnel.local_port,
        };
        base_url("localhost", port)
    }

    pub fn example_request(&self) -> String {
        let body = serde_json::to_string(&GenerateRequest::example()).unwrap_or_default();
        format!(
            "curl {}/generate -X POST -H 'Content-Type: application/json' -d {}",
            self.local_url(),
            shell_quote(&body)
        )
    }
}

impl fmt::Display for ConnectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Job {} is serving {} on {}:{}",
            self.job_id, self.model_id, self.node, self.port
        )?;
        writeln!(f)?;
        match &self.access {
            Access::Direct => writeln!(f, "Connect directly at {}", self.local_url())?,
            Access::Tunnel(tunnel) => {
                writeln!(f, "Forward the port from your machine with:")?;
                writeln!(f, "    {tunnel}")?;
            }
        }
        writeln!(f)?;
        writeln!(f, "Send generation requests to {}/generate, e.g.", self.local_url())?;
        writeln!(f, "    {}", self.example_request())?;
        writeln!(f)?;
        writeln!(f, "Stop the server with:")?;
        write!(f, "    {}", self.cancel_command)
    }
}
