// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Reaching a compute node from the user's machine.
//!
//! The tool does not open tunnels itself. It prints the `ssh` command and the user runs it
//! where they want the port to appear.

use std::fmt;

/// True if `node` names the host we are running on
pub fn is_local_node(node: &str) -> bool {
    let Ok(this_host) = hostname::get() else {
        return false;
    };
    let this_host = this_host.to_string_lossy();
    // SLURM reports short names, hostname may be fully qualified
    let short = |name: &str| name.split('.').next().unwrap_or_default().to_string();
    node == this_host || short(node) == short(&this_host)
}

/// `ssh -N -L <local_port>:<node>:<remote_port> <user>@<login_host>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelCommand {
    pub local_port: u16,
    pub node: String,
    pub remote_port: u16,
    pub user: String,
    pub login_host: String,
}

impl TunnelCommand {
    pub fn args(&self) -> Vec<String> {
        vec![
            "ssh".to_string(),
            "-N".to_string(),
            "-L".to_string(),
            format!("{}:{}:{}", self.local_port, self.node, self.remote_port),
            format!("{}@{}", self.user, self.login_host),
        ]
    }
}

impl fmt::Display for TunnelCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args().join(" "))
    }
}
