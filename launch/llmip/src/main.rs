// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::process::ExitCode;

use clap::Parser as _;

use llmip::Cli;
use llmip_runtime::logging;

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();

    // One command at a time, mostly waiting on subprocesses and HTTP
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start the async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(llmip::run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!("{e:?}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
