// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Model snapshots in a HuggingFace hub cache directory.
//!
//! Layout of a cache:
//!
//! ```text
//! <cache>/models--<org>--<name>/
//!     refs/<revision>          file holding the commit hash of a branch or tag
//!     snapshots/<commit>/...   the model files
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use hf_hub::api::tokio::ApiBuilder;
use hf_hub::{Cache, Repo, RepoType};

use llmip_runtime::config::environment_names::huggingface as env_hf;

use crate::error::LocateError;

const REPO_FOLDER_PREFIX: &str = "models--";

const CONFIG_FILE: &str = "config.json";

/// At least one of these must be present for a snapshot to be servable
const WEIGHT_FILES: &[&str] = &[
    "model.safetensors",
    "model.safetensors.index.json",
    "pytorch_model.bin",
    "pytorch_model.bin.index.json",
];

/// A model revision present on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSnapshot {
    pub repo_id: String,
    /// The revision asked for, or the snapshot directory name when none was given
    pub revision: String,
    pub path: PathBuf,
    /// The cache directory the snapshot was found in
    pub cache_root: PathBuf,
}

impl ResolvedSnapshot {
    /// Snapshot path relative to the cache root, as seen from a container mounting the cache
    pub fn relative_path(&self) -> &Path {
        self.path
            .strip_prefix(&self.cache_root)
            .unwrap_or(self.path.as_path())
    }
}

/// `bigscience/bloom-560m` -> `models--bigscience--bloom-560m`
pub fn repo_folder_name(repo_id: &str) -> String {
    format!("{REPO_FOLDER_PREFIX}{}", repo_id.split('/').collect::<Vec<_>>().join("--"))
}

/// Cache directory used when none is given: `$HF_HOME`, else the working directory
pub fn default_cache_dir() -> PathBuf {
    match env::var(env_hf::HF_HOME) {
        Ok(home) if !home.is_empty() => PathBuf::from(home),
        _ => PathBuf::from("."),
    }
}

/// Resolve the snapshot of `repo_id` at `revision` inside `cache_root`.
///
/// A revision is looked up in `refs/` first and otherwise taken as a snapshot directory
/// name. Without a revision the most recently modified snapshot wins.
pub fn locate_snapshot(
    cache_root: &Path,
    repo_id: &str,
    revision: Option<&str>,
) -> Result<ResolvedSnapshot, LocateError> {
    let cache_root = std::path::absolute(cache_root).map_err(|source| LocateError::Io {
        path: cache_root.to_path_buf(),
        source,
    })?;
    let repo_dir = cache_root.join(repo_folder_name(repo_id));
    if !repo_dir.is_dir() {
        return Err(LocateError::RepoNotFound {
            repo_id: repo_id.to_string(),
            cache: cache_root,
        });
    }
    let snapshots = repo_dir.join("snapshots");

    let (revision, path) = match revision {
        Some(revision) => {
            let commit = read_ref(&repo_dir, revision)?;
            let path = snapshots.join(commit.as_deref().unwrap_or(revision));
            if !path.is_dir() {
                return Err(LocateError::RevisionNotFound {
                    repo_id: repo_id.to_string(),
                    revision: revision.to_string(),
                });
            }
            (revision.to_string(), path)
        }
        None => {
            let path = newest_snapshot(&snapshots)?.ok_or_else(|| LocateError::NoSnapshots {
                repo_id: repo_id.to_string(),
            })?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            (name, path)
        }
    };

    if let Some(missing) = missing_files(&path) {
        return Err(LocateError::Incomplete { path, missing });
    }

    tracing::debug!(repo_id, revision = %revision, path = %path.display(), "Resolved snapshot");
    Ok(ResolvedSnapshot {
        repo_id: repo_id.to_string(),
        revision,
        path,
        cache_root,
    })
}

/// Contents of `refs/<revision>`, if that ref exists
fn read_ref(repo_dir: &Path, revision: &str) -> Result<Option<String>, LocateError> {
    let ref_path = repo_dir.join("refs").join(revision);
    if !ref_path.is_file() {
        return Ok(None);
    }
    let commit = std::fs::read_to_string(&ref_path).map_err(|source| LocateError::Io {
        path: ref_path,
        source,
    })?;
    Ok(Some(commit.trim().to_string()))
}

fn newest_snapshot(snapshots: &Path) -> Result<Option<PathBuf>, LocateError> {
    if !snapshots.is_dir() {
        return Ok(None);
    }
    let io_err = |source| LocateError::Io {
        path: snapshots.to_path_buf(),
        source,
    };
    let mut candidates: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(snapshots).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let metadata = entry.metadata().map_err(io_err)?;
        if metadata.is_dir() {
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            candidates.push((modified, entry.path()));
        }
    }
    // Newest first, then by name so equal timestamps resolve the same way every time
    candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    Ok(candidates.into_iter().next().map(|(_, path)| path))
}

/// What a snapshot lacks to be servable, or `None` if it is complete
fn missing_files(snapshot: &Path) -> Option<String> {
    if !snapshot.join(CONFIG_FILE).is_file() {
        return Some(CONFIG_FILE.to_string());
    }
    if !WEIGHT_FILES.iter().any(|f| snapshot.join(f).is_file()) {
        return Some(format!("weights (one of {})", WEIGHT_FILES.join(", ")));
    }
    None
}

pub fn is_complete_snapshot(snapshot: &Path) -> bool {
    missing_files(snapshot).is_none()
}

/// Repository ids with a folder in the cache, sorted
pub fn list_cached_models(cache_root: &Path) -> Result<Vec<String>, LocateError> {
    let io_err = |source| LocateError::Io {
        path: cache_root.to_path_buf(),
        source,
    };
    let mut models = Vec::new();
    for entry in std::fs::read_dir(cache_root).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if !entry.file_type().map_err(io_err)?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(folder) = name.strip_prefix(REPO_FOLDER_PREFIX) {
            models.push(folder.replace("--", "/"));
        }
    }
    models.sort();
    Ok(models)
}

/// Download every file of `repo_id` at `revision` into `cache_dir`, then resolve it.
///
/// Uses `HF_TOKEN` when set, for gated or private models.
pub async fn download_snapshot(
    repo_id: &str,
    revision: &str,
    cache_dir: &Path,
) -> anyhow::Result<ResolvedSnapshot> {
    use anyhow::Context as _;

    let token = env::var(env_hf::HF_TOKEN).ok().filter(|t| !t.is_empty());
    let api = ApiBuilder::from_cache(Cache::new(cache_dir.to_path_buf()))
        .with_progress(false)
        .with_token(token)
        .build()
        .context("Failed to create HuggingFace API client")?;
    let repo = api.repo(Repo::with_revision(
        repo_id.to_string(),
        RepoType::Model,
        revision.to_string(),
    ));

    let info = repo
        .info()
        .await
        .with_context(|| format!("Failed to fetch file list of {repo_id}@{revision}"))?;
    tracing::info!(
        "Downloading {} files of {repo_id}@{revision} into {}",
        info.siblings.len(),
        cache_dir.display()
    );
    for sibling in &info.siblings {
        tracing::debug!(file = %sibling.rfilename, "Downloading");
        repo.get(&sibling.rfilename)
            .await
            .with_context(|| format!("Failed to download {}", sibling.rfilename))?;
    }

    let snapshot = locate_snapshot(cache_dir, repo_id, Some(revision))?;
    tracing::info!("Downloaded {repo_id} to {}", snapshot.path.display());
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const REPO: &str = "bigscience/bloom-560m";

    fn write_snapshot(cache: &Path, repo_id: &str, name: &str, files: &[&str]) -> PathBuf {
        let dir = cache.join(repo_folder_name(repo_id)).join("snapshots").join(name);
        fs::create_dir_all(&dir).unwrap();
        for f in files {
            fs::write(dir.join(f), "{}").unwrap();
        }
        dir
    }

    fn complete(cache: &Path, name: &str) -> PathBuf {
        write_snapshot(cache, REPO, name, &["config.json", "model.safetensors"])
    }

    #[test]
    fn test_repo_folder_name() {
        assert_eq!(repo_folder_name(REPO), "models--bigscience--bloom-560m");
        assert_eq!(repo_folder_name("gpt2"), "models--gpt2");
    }

    #[test]
    fn test_locate_snapshot_by_directory_name() {
        let cache = tempfile::tempdir().unwrap();
        let expected = complete(cache.path(), "main");
        let snapshot = locate_snapshot(cache.path(), REPO, Some("main")).unwrap();
        assert_eq!(snapshot.path, expected);
        assert_eq!(snapshot.revision, "main");
        assert_eq!(
            snapshot.relative_path(),
            Path::new("models--bigscience--bloom-560m/snapshots/main")
        );
    }

    #[test]
    fn test_locate_snapshot_through_ref() {
        let cache = tempfile::tempdir().unwrap();
        let expected = complete(cache.path(), "abc123");
        let refs = cache.path().join(repo_folder_name(REPO)).join("refs");
        fs::create_dir_all(&refs).unwrap();
        fs::write(refs.join("main"), "abc123\n").unwrap();

        let snapshot = locate_snapshot(cache.path(), REPO, Some("main")).unwrap();
        assert_eq!(snapshot.path, expected);
        assert_eq!(snapshot.revision, "main");
    }

    #[test]
    fn test_locate_snapshot_missing_revision() {
        let cache = tempfile::tempdir().unwrap();
        complete(cache.path(), "main");
        let err = locate_snapshot(cache.path(), REPO, Some("v2")).unwrap_err();
        assert!(matches!(err, LocateError::RevisionNotFound { ref revision, .. } if revision == "v2"));
    }

    #[test]
    fn test_locate_snapshot_missing_repo() {
        let cache = tempfile::tempdir().unwrap();
        let err = locate_snapshot(cache.path(), REPO, Some("main")).unwrap_err();
        assert!(matches!(err, LocateError::RepoNotFound { .. }));
    }

    #[test]
    fn test_locate_snapshot_incomplete() {
        let cache = tempfile::tempdir().unwrap();
        write_snapshot(cache.path(), REPO, "main", &["config.json"]);
        let err = locate_snapshot(cache.path(), REPO, Some("main")).unwrap_err();
        assert!(matches!(err, LocateError::Incomplete { ref missing, .. } if missing.starts_with("weights")));

        write_snapshot(cache.path(), REPO, "other", &["model.safetensors"]);
        let err = locate_snapshot(cache.path(), REPO, Some("other")).unwrap_err();
        assert!(matches!(err, LocateError::Incomplete { ref missing, .. } if missing == "config.json"));
    }

    #[test]
    fn test_locate_snapshot_without_revision_prefers_newest() {
        let cache = tempfile::tempdir().unwrap();
        let old = complete(cache.path(), "aaa");
        let new = complete(cache.path(), "bbb");
        let past = SystemTime::now() - std::time::Duration::from_secs(3600);
        fs::File::open(&old).unwrap().set_modified(past).unwrap();

        let snapshot = locate_snapshot(cache.path(), REPO, None).unwrap();
        assert_eq!(snapshot.path, new);
        assert_eq!(snapshot.revision, "bbb");
    }

    #[test]
    fn test_locate_snapshot_without_revision_tie_breaks_by_name() {
        let cache = tempfile::tempdir().unwrap();
        let a = complete(cache.path(), "aaa");
        let b = complete(cache.path(), "bbb");
        let t = SystemTime::now() - std::time::Duration::from_secs(60);
        fs::File::open(&a).unwrap().set_modified(t).unwrap();
        fs::File::open(&b).unwrap().set_modified(t).unwrap();

        assert_eq!(locate_snapshot(cache.path(), REPO, None).unwrap().path, a);
    }

    #[test]
    fn test_sharded_weights_are_complete() {
        let cache = tempfile::tempdir().unwrap();
        let dir = write_snapshot(
            cache.path(),
            REPO,
            "main",
            &["config.json", "model.safetensors.index.json"],
        );
        assert!(is_complete_snapshot(&dir));
    }

    #[test]
    fn test_list_cached_models() {
        let cache = tempfile::tempdir().unwrap();
        complete(cache.path(), "main");
        write_snapshot(cache.path(), "meta-llama/Llama-2-7b-hf", "main", &[]);
        fs::create_dir_all(cache.path().join("not-a-model")).unwrap();
        fs::write(cache.path().join("models--stray-file"), "").unwrap();

        assert_eq!(
            list_cached_models(cache.path()).unwrap(),
            vec!["bigscience/bloom-560m", "meta-llama/Llama-2-7b-hf"]
        );
    }

    #[test]
    #[serial_test::serial]
    fn test_default_cache_dir() {
        temp_env::with_var(env_hf::HF_HOME, Some("/scratch/gpfs/hf"), || {
            assert_eq!(default_cache_dir(), PathBuf::from("/scratch/gpfs/hf"));
        });
        temp_env::with_var(env_hf::HF_HOME, None::<&str>, || {
            assert_eq!(default_cache_dir(), PathBuf::from("."));
        });
    }
}
