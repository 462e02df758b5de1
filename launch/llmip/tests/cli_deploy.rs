// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Command line to scheduler, with a scripted scheduler standing in for SLURM.

use std::fs;
use std::path::Path;

use clap::Parser as _;

use llmip::Cli;
use llmip_llm::DeployError;
use llmip_runtime::PlatformConfig;
use llmip_runtime::scheduler::JobId;
use llmip_runtime::scheduler::mock::{ScriptedScheduler, StaticProbe};
use llmip_runtime::utils::clock::ManualClock;

const NODE: &str = "della-l01g02";

fn populated_cache(root: &Path) {
    let snapshot = root.join("models/models--bigscience--bloom-560m/snapshots/main");
    fs::create_dir_all(&snapshot).unwrap();
    fs::write(snapshot.join("config.json"), "{}").unwrap();
    fs::write(snapshot.join("model.safetensors"), "").unwrap();
}

fn config() -> PlatformConfig {
    PlatformConfig {
        ready_timeout_secs: 120,
        login_host: Some("della.princeton.edu".to_string()),
        ssh_user: Some("jdoe".to_string()),
        ..Default::default()
    }
}

fn deploy_cli(cache: &Path, extra: &[&str]) -> Cli {
    let dir = cache.join("models").display().to_string();
    let mut args = vec![
        "llmip",
        "deploy",
        "--name",
        "bigscience/bloom-560m",
        "--revision",
        "main",
        "--dir",
    ];
    args.push(&dir);
    args.extend_from_slice(extra);
    Cli::try_parse_from(args).unwrap()
}

#[tokio::test]
async fn test_deploy_prints_connection_instructions() {
    let cache = tempfile::tempdir().unwrap();
    populated_cache(cache.path());
    let scheduler = ScriptedScheduler::new(["PENDING", "RUNNING", "RUNNING"]).with_node(NODE);
    let probe = StaticProbe::healthy();
    let clock = ManualClock::new();
    let mut out: Vec<u8> = Vec::new();

    llmip::run_with(
        deploy_cli(cache.path(), &[]),
        config(),
        &scheduler,
        &clock,
        Some(&probe),
        &mut out,
    )
    .await
    .unwrap();

    let out = String::from_utf8(out).unwrap();
    assert!(out.contains("ssh -N -L 8000:della-l01g02:8000 jdoe@della.princeton.edu"));
    assert!(out.contains("scancel 12345"));
    assert!(probe.calls() >= 1);

    let scripts = scheduler.submitted_scripts();
    assert_eq!(scripts.len(), 1);
    assert!(scripts[0].contains("models--bigscience--bloom-560m/snapshots/main"));
}

#[tokio::test]
async fn test_deploy_missing_model_submits_nothing() {
    let cache = tempfile::tempdir().unwrap();
    fs::create_dir_all(cache.path().join("models")).unwrap();
    let scheduler = ScriptedScheduler::new(["RUNNING"]).with_node(NODE);
    let clock = ManualClock::new();
    let mut out: Vec<u8> = Vec::new();

    let err = llmip::run_with(
        deploy_cli(cache.path(), &[]),
        config(),
        &scheduler,
        &clock,
        None,
        &mut out,
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<DeployError>(),
        Some(DeployError::NotFound(_))
    ));
    assert!(scheduler.submitted_scripts().is_empty());
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_deploy_gives_up_on_queued_job() {
    let cache = tempfile::tempdir().unwrap();
    populated_cache(cache.path());
    let scheduler = ScriptedScheduler::new(["PENDING"]);
    let clock = ManualClock::new();
    let mut out: Vec<u8> = Vec::new();

    let err = llmip::run_with(
        deploy_cli(cache.path(), &["--timeout", "1m"]),
        config(),
        &scheduler,
        &clock,
        Some(&StaticProbe::healthy()),
        &mut out,
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<DeployError>(),
        Some(DeployError::Timeout { .. })
    ));
    assert!(err.to_string().contains("still queued"));
    assert!(err.to_string().contains("scancel 12345"));
    assert!(clock.elapsed().as_secs() >= 60);
    assert!(scheduler.cancelled_jobs().is_empty());
}

#[tokio::test]
async fn test_dry_run_prints_script() {
    let cache = tempfile::tempdir().unwrap();
    populated_cache(cache.path());
    let scheduler = ScriptedScheduler::new(["RUNNING"]);
    let clock = ManualClock::new();
    let mut out: Vec<u8> = Vec::new();

    llmip::run_with(
        deploy_cli(cache.path(), &["--dry-run", "--gpus", "2", "--partition", "gpu"]),
        config(),
        &scheduler,
        &clock,
        None,
        &mut out,
    )
    .await
    .unwrap();

    let script = String::from_utf8(out).unwrap();
    assert!(script.starts_with("#!/bin/bash\n"));
    assert!(script.contains("#SBATCH --gres=gpu:2\n"));
    assert!(script.contains("#SBATCH --partition=gpu\n"));
    assert!(scheduler.submitted_scripts().is_empty());
}

#[tokio::test]
async fn test_list_models() {
    let cache = tempfile::tempdir().unwrap();
    populated_cache(cache.path());
    let dir = cache.path().join("models").display().to_string();
    let cli = Cli::try_parse_from(["llmip", "list", "--dir", dir.as_str()]).unwrap();
    let scheduler = ScriptedScheduler::new(["RUNNING"]);
    let mut out: Vec<u8> = Vec::new();

    llmip::run_with(cli, config(), &scheduler, &ManualClock::new(), None, &mut out)
        .await
        .unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "bigscience/bloom-560m\n");
}

#[tokio::test]
async fn test_status_and_cancel() {
    let scheduler = ScriptedScheduler::new(["PENDING"]).with_start_time("2026-10-17T09:30:00");
    let clock = ManualClock::new();

    let mut out: Vec<u8> = Vec::new();
    let cli = Cli::try_parse_from(["llmip", "status", "--job-id", "4242"]).unwrap();
    llmip::run_with(cli, config(), &scheduler, &clock, None, &mut out)
        .await
        .unwrap();
    let out = String::from_utf8(out).unwrap();
    assert!(out.starts_with("4242 PENDING PENDING\n"));
    assert!(out.contains("Estimated start: 2026-10-17T09:30:00"));

    let cli = Cli::try_parse_from(["llmip", "cancel", "--job-id", "4242"]).unwrap();
    llmip::run_with(cli, config(), &scheduler, &clock, None, &mut Vec::<u8>::new())
        .await
        .unwrap();
    assert_eq!(scheduler.cancelled_jobs(), vec!["4242".parse::<JobId>().unwrap()]);
}

#[tokio::test]
async fn test_bad_job_id_is_rejected() {
    let scheduler = ScriptedScheduler::new(["RUNNING"]);
    let cli = Cli::try_parse_from(["llmip", "cancel", "--job-id", "12; rm -rf /"]).unwrap();
    let result = llmip::run_with(
        cli,
        config(),
        &scheduler,
        &ManualClock::new(),
        None,
        &mut Vec::<u8>::new(),
    )
    .await;
    assert!(result.is_err());
    assert!(scheduler.cancelled_jobs().is_empty());
}
