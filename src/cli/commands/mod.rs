//! Command implementations.

pub mod completions;
pub mod init;
pub mod login;
pub mod merge;
pub mod pull;
pub mod push;
pub mod version;

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::{load_repo, remotes_path, resolve_session, Remotes, Repo};
use crate::error::{Error, Result};
use crate::remote::{MetabaseClient, Session};
use crate::render::Renderer;
use crate::sync::CardStore;

/// The repository a command runs in, with its store and renderer.
pub(crate) struct Workspace {
    pub repo: Repo,
    pub store: CardStore,
    pub renderer: Renderer,
}

impl Workspace {
    /// Open the repository containing the working directory.
    ///
    /// `include_folder` overrides the folder configured in `.mbs`.
    pub fn open(include_folder: Option<&str>) -> Result<Self> {
        let repo = load_repo(&std::env::current_dir()?)?;
        let include = include_folder.map_or_else(|| repo.include_folder().to_path_buf(), PathBuf::from);
        let store = CardStore::open(&repo.root, &include)?;
        let renderer = Renderer::new(&repo.root, &include).with_url(repo.url());
        Ok(Self {
            repo,
            store,
            renderer,
        })
    }

    /// Repo-relative name of a file given on the command line.
    pub fn resolve_file(&self, file: Option<&Path>) -> Result<Option<String>> {
        Ok(file.map(|f| self.store.relativize(f)).transpose()?)
    }
}

/// An authenticated client plus the remotes file it was built from.
pub(crate) struct Connection {
    pub client: MetabaseClient,
    /// Token the client started with, stored or from `MBS_SESSION`.
    initial_session: Session,
    remotes: Remotes,
    remotes_path: PathBuf,
}

impl Connection {
    /// Build a client for `url` from the saved session.
    pub fn open(url: &str) -> Result<Self> {
        let remotes_path = remotes_path()?;
        let remotes = Remotes::load(&remotes_path)?;
        let (session, credentials) = resolve_session(&remotes, url)?;
        let client = MetabaseClient::new(url, session)?.with_credentials(credentials);
        Ok(Self::new(client, remotes, remotes_path))
    }

    fn new(client: MetabaseClient, remotes: Remotes, remotes_path: PathBuf) -> Self {
        Self {
            initial_session: client.session(),
            client,
            remotes,
            remotes_path,
        }
    }

    /// Store the session again if the client had to renew it.
    pub fn persist_session(&mut self) -> Result<()> {
        let current = self.client.session();
        self.store_renewed(&current)
    }

    fn store_renewed(&mut self, current: &Session) -> Result<()> {
        if *current == self.initial_session {
            debug!(url = self.client.base_url(), "Session not renewed");
            return Ok(());
        }
        if self.remotes.update_session(self.client.base_url(), current) {
            self.remotes.save(&self.remotes_path)?;
            info!(url = self.client.base_url(), "Saved renewed session");
        }
        Ok(())
    }
}

/// Runtime for driving the async remote client.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn connection(dir: &TempDir, client_token: &str) -> Connection {
        let mut remotes = Remotes::default();
        remotes.set_login("http://mb", &Session::new("stored"), None);
        let client = MetabaseClient::new("http://mb", Session::new(client_token)).unwrap();
        Connection::new(client, remotes, dir.path().join("remotes.json"))
    }

    #[test]
    fn test_session_override_is_not_persisted() {
        let dir = TempDir::new().unwrap();
        let mut conn = connection(&dir, "env-token");

        conn.persist_session().unwrap();

        assert_eq!(conn.remotes.get("http://mb").unwrap().session, "stored");
        assert!(!dir.path().join("remotes.json").exists());
    }

    #[test]
    fn test_renewed_session_is_persisted() {
        let dir = TempDir::new().unwrap();
        let mut conn = connection(&dir, "env-token");

        conn.store_renewed(&Session::new("fresh")).unwrap();

        let saved = Remotes::load(&dir.path().join("remotes.json")).unwrap();
        assert_eq!(saved.get("http://mb").unwrap().session, "fresh");
    }
}
