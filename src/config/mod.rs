//! Configuration management.
//!
//! Two pieces of configuration exist:
//! - **Repository marker**: a `.mbs` JSON file at the repository root naming
//!   the Metabase URL (and optionally the include folder). Commands find it
//!   by walking up from the working directory.
//! - **Remotes**: `remotes.json` in the user config directory, mapping each
//!   Metabase URL to its session token and optional saved credentials.
//!
//! `MBS_CONFIG_DIR` overrides the user config directory, and `MBS_SESSION`
//! overrides the stored session token.

mod remotes;

pub use remotes::{
    remotes_path, resolve_session, RemoteEntry, Remotes, REMOTES_FILE, SESSION_ENV,
};

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::render::DEFAULT_INCLUDE_FOLDER;
use crate::sync::file::{atomic_write, read_text};

/// Repository marker file name.
pub const MARKER_FILE: &str = ".mbs";

/// Environment variable overriding the user config directory.
pub const CONFIG_DIR_ENV: &str = "MBS_CONFIG_DIR";

/// Contents of the `.mbs` marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_folder: Option<String>,
}

/// A discovered repository.
#[derive(Debug, Clone)]
pub struct Repo {
    pub root: PathBuf,
    pub config: RepoConfig,
}

impl Repo {
    #[must_use]
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Include folder relative to the root, falling back to `include`.
    #[must_use]
    pub fn include_folder(&self) -> &Path {
        Path::new(
            self.config
                .include_folder
                .as_deref()
                .unwrap_or(DEFAULT_INCLUDE_FOLDER),
        )
    }
}

/// Normalize a Metabase URL: surrounding whitespace and trailing slashes
/// are dropped so the same server always maps to the same remotes key.
#[must_use]
pub fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Find the repository root by walking up from `start` looking for the
/// `.mbs` marker file.
#[must_use]
pub fn discover_repo(start: &Path) -> Option<PathBuf> {
    let start = std::path::absolute(start).ok()?;
    start
        .ancestors()
        .find(|dir| dir.join(MARKER_FILE).is_file())
        .map(Path::to_path_buf)
}

/// Load the repository containing `start`.
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] if no marker is found and
/// [`Error::Config`] if the marker is not valid.
pub fn load_repo(start: &Path) -> Result<Repo> {
    let root = discover_repo(start).ok_or_else(|| Error::NotInitialized {
        path: start.to_path_buf(),
    })?;
    let marker = root.join(MARKER_FILE);
    let text = read_text(&marker)?;
    let mut config: RepoConfig = serde_json::from_str(&text)
        .map_err(|e| Error::Config(format!("{}: {e}", marker.display())))?;
    config.url = normalize_url(&config.url);
    if config.url.is_empty() {
        return Err(Error::Config(format!("{}: url is empty", marker.display())));
    }

    debug!(root = %root.display(), url = %config.url, "Loaded repository");
    Ok(Repo { root, config })
}

/// Create the `.mbs` marker in `dir`.
///
/// # Errors
///
/// Returns [`Error::AlreadyInitialized`] if `dir` already has a marker and
/// [`Error::InvalidArgument`] for an empty URL.
pub fn init_repo(dir: &Path, url: &str, include_folder: Option<&str>) -> Result<Repo> {
    let root = std::path::absolute(dir)?;
    let marker = root.join(MARKER_FILE);
    if marker.exists() {
        return Err(Error::AlreadyInitialized { path: marker });
    }

    let url = normalize_url(url);
    if url.is_empty() {
        return Err(Error::InvalidArgument("url must not be empty".to_string()));
    }

    let config = RepoConfig {
        url,
        include_folder: include_folder.map(str::to_string),
    };
    let mut text = serde_json::to_string_pretty(&config)?;
    text.push('\n');
    atomic_write(&marker, &text)?;

    Ok(Repo { root, config })
}

/// Express `path` relative to `root` as a `/`-separated string.
///
/// Returns `None` when `path` is not strictly below `root` or contains
/// `..` after the root prefix.
#[must_use]
pub fn repo_relative(root: &Path, path: &Path) -> Option<String> {
    let rest = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rest.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?.to_string()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// User config directory holding `remotes.json`.
///
/// Priority:
/// 1. `MBS_CONFIG_DIR` environment variable
/// 2. Platform config directory (e.g. `~/.config/mbs` on Linux)
#[must_use]
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.trim().is_empty() {
            return Some(PathBuf::from(dir));
        }
    }
    directories::ProjectDirs::from("", "", "mbs").map(|dirs| dirs.config_dir().to_path_buf())
}
