//! Saved sessions per Metabase server.
//!
//! `remotes.json` maps a normalized server URL to its session token and,
//! unless the user opted out at login, the credentials used to renew it.
//! The file holds secrets, so it is written owner-only via temp file and
//! rename.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{config_dir, normalize_url};
use crate::error::{Error, Result};
use crate::remote::{Credentials, Session};

/// File name inside the user config directory.
pub const REMOTES_FILE: &str = "remotes.json";

/// Environment variable overriding the stored session token.
pub const SESSION_ENV: &str = "MBS_SESSION";

/// Stored state for one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub session: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl RemoteEntry {
    /// Saved credentials, present only when both halves were stored.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }
}

/// All saved remotes, keyed by normalized URL.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Remotes {
    entries: BTreeMap<String, RemoteEntry>,
}

impl Remotes {
    /// Load remotes from `path`. A missing file means no remotes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file exists but is not valid.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Write remotes to `path` with owner-only permissions.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let temp_path = path.with_extension("json.tmp");

        let result = (|| -> std::io::Result<()> {
            {
                let mut opts = fs::OpenOptions::new();
                opts.write(true).create(true).truncate(true);
                #[cfg(unix)]
                opts.mode(0o600);
                let mut file = opts.open(&temp_path)?;
                file.write_all(json.as_bytes())?;
                file.write_all(b"\n")?;
                file.sync_all()?;
            }
            fs::rename(&temp_path, path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        debug!(path = %path.display(), remotes = self.entries.len(), "Saved remotes");
        Ok(())
    }

    #[must_use]
    pub fn get(&self, url: &str) -> Option<&RemoteEntry> {
        self.entries.get(&normalize_url(url))
    }

    /// Store the result of a login, replacing any previous entry.
    pub fn set_login(&mut self, url: &str, session: &Session, credentials: Option<&Credentials>) {
        self.entries.insert(
            normalize_url(url),
            RemoteEntry {
                session: session.token.clone(),
                username: credentials.map(|c| c.username.clone()),
                password: credentials.map(|c| c.password.clone()),
            },
        );
    }

    /// Replace the session token of an existing entry.
    ///
    /// Returns `true` if the stored token changed.
    pub fn update_session(&mut self, url: &str, session: &Session) -> bool {
        match self.entries.get_mut(&normalize_url(url)) {
            Some(entry) if entry.session != session.token => {
                entry.session.clone_from(&session.token);
                true
            }
            _ => false,
        }
    }
}

/// Path of `remotes.json`.
///
/// # Errors
///
/// Returns [`Error::Config`] if no user config directory can be determined.
pub fn remotes_path() -> Result<PathBuf> {
    config_dir()
        .map(|dir| dir.join(REMOTES_FILE))
        .ok_or_else(|| Error::Config("cannot determine the user config directory".to_string()))
}

/// Session and renewal credentials for `url`.
///
/// `MBS_SESSION` wins over the stored token; saved credentials are still
/// returned so an expired override can be renewed.
///
/// # Errors
///
/// Returns [`Error::NotLoggedIn`] if neither source has a session.
pub fn resolve_session(remotes: &Remotes, url: &str) -> Result<(Session, Option<Credentials>)> {
    let env_session = std::env::var(SESSION_ENV).ok().filter(|s| !s.trim().is_empty());
    resolve(remotes, url, env_session)
}

fn resolve(
    remotes: &Remotes,
    url: &str,
    env_session: Option<String>,
) -> Result<(Session, Option<Credentials>)> {
    let entry = remotes.get(url);
    let credentials = entry.and_then(RemoteEntry::credentials);

    if let Some(token) = env_session {
        return Ok((Session::new(token), credentials));
    }

    entry
        .map(|e| (Session::new(e.session.clone()), credentials))
        .ok_or_else(|| Error::NotLoggedIn {
            url: normalize_url(url),
        })
}
