pub mod config;
pub mod contract;
pub mod epic;
pub mod gate;
pub mod init;
pub mod runs;
pub mod story;
pub mod workflow;

use anyhow::Context;
use semad_core::{config::Config, paths, SemadError};
use std::future::Future;
use std::path::{Path, PathBuf};

/// Project config, or the defaults when `semad init` has not been run.
pub fn load_config(root: &Path) -> anyhow::Result<Config> {
    match Config::load(root) {
        Ok(config) => Ok(config),
        Err(SemadError::NotInitialized) => {
            let name = root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "project".to_string());
            Ok(Config::new(name))
        }
        Err(e) => Err(e).context("failed to load .semad/config.yaml"),
    }
}

/// Resolve a story argument: an existing path, a filename inside the
/// stories directory, or a story id such as `1.2`.
pub fn resolve_story(root: &Path, config: &Config, arg: &str) -> anyhow::Result<PathBuf> {
    let given = PathBuf::from(arg);
    if given.is_file() {
        return Ok(given);
    }
    let rooted = root.join(&given);
    if rooted.is_file() {
        return Ok(rooted);
    }
    let dir = config.stories_path(root);
    let in_dir = dir.join(&given);
    if in_dir.is_file() {
        return Ok(in_dir);
    }
    if dir.is_dir() {
        let prefix = format!("{arg}.");
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if name.starts_with(&prefix)
                && paths::parse_story_filename(&name).is_some_and(|s| s.story_id == arg)
            {
                return Ok(path);
            }
        }
    }
    anyhow::bail!("story '{arg}' not found")
}

/// Drive a future to completion on a fresh tokio runtime.
pub fn block_on<F: Future>(fut: F) -> anyhow::Result<F::Output> {
    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    Ok(rt.block_on(fut))
}
