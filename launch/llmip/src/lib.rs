// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;

use anyhow::Context as _;

use llmip_llm::hub::{default_cache_dir, download_snapshot, list_cached_models};
use llmip_llm::protocols::{GenerateRequest, HttpHealthProbe, TgiClient};
use llmip_llm::{DeployOptions, DeployOutcome, Deployer};
use llmip_runtime::PlatformConfig;
use llmip_runtime::scheduler::{HealthProbe, JobId, JobState, Scheduler, Slurm};
use llmip_runtime::utils::{Clock, TokioClock};

pub mod flags;
pub use flags::{Cli, Commands};

/// Run one command against the real cluster, printing results to stdout
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = PlatformConfig::from_settings()?;
    tracing::debug!("Platform configuration: {config}");
    let scheduler = Slurm::new();
    let mut stdout = std::io::stdout().lock();
    run_with(cli, config, &scheduler, &TokioClock, None, &mut stdout).await
}

/// Run one command with the given scheduler and clock.
///
/// `probe` replaces the HTTP health probe of `deploy`.
pub async fn run_with(
    cli: Cli,
    mut config: PlatformConfig,
    scheduler: &dyn Scheduler,
    clock: &dyn Clock,
    probe: Option<&dyn HealthProbe>,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    match cli.command {
        Commands::ModelDl(args) => {
            let cache_dir = args.cache_dir.unwrap_or_else(default_cache_dir);
            let snapshot = download_snapshot(&args.repo_id, &args.revision, &cache_dir).await?;
            writeln!(out, "{}", snapshot.path.display())?;
        }

        Commands::Deploy(args) => {
            args.apply_to(&mut config);
            let request = args.to_request(&config)?;
            let options = DeployOptions {
                dry_run: args.dry_run,
                script_out: args.script_out.clone(),
            };

            let http_probe = HttpHealthProbe::new(config.health_request_timeout());
            let mut deployer = Deployer::new(&config, scheduler, clock);
            if config.health_check {
                deployer = deployer.with_probe(probe.unwrap_or(&http_probe));
            }

            match deployer.deploy(&request, &options).await? {
                DeployOutcome::DryRun { job, .. } => write!(out, "{}", job.script)?,
                DeployOutcome::Ready { report, .. } => writeln!(out, "{report}")?,
            }
        }

        Commands::List(args) => {
            let cache_dir = args.dir.unwrap_or_else(default_cache_dir);
            let models = list_cached_models(&cache_dir)?;
            if models.is_empty() {
                tracing::info!("No models cached in {}", cache_dir.display());
            }
            for model in models {
                writeln!(out, "{model}")?;
            }
        }

        Commands::Status(args) => {
            let job_id: JobId = args.job_id.parse()?;
            let status = scheduler.status(&job_id).await?;
            writeln!(out, "{job_id} {} {}", status.state, status.raw)?;
            if status.state == JobState::Pending {
                if let Some(start) = scheduler.start_time(&job_id).await? {
                    writeln!(out, "Estimated start: {start}")?;
                }
            }
        }

        Commands::Cancel(args) => {
            let job_id: JobId = args.job_id.parse()?;
            scheduler.cancel(&job_id).await?;
            tracing::info!("Cancelled job {job_id}");
        }

        Commands::Generate(args) => {
            let client = TgiClient::new(&args.host, args.port, args.timeout)?;
            let response = client
                .generate(&GenerateRequest::new(args.prompt, args.max_new_tokens))
                .await
                .context("Is the server running and the port forwarded?")?;
            writeln!(out, "{}", response.generated_text)?;
        }
    }
    out.flush()?;
    Ok(())
}
