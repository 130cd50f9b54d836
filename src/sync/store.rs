//! Local card files and their remote identity.
//!
//! Card files live anywhere below the repository root. Which card a file
//! belongs to is recorded in the card index (`.mbs-cards.json` at the root),
//! written when a card is pulled and consulted by push and merge. Files
//! missing from the index fall back to the `id` field of their own
//! document, which is what a pulled snapshot contains.
//!
//! All file arguments are repo-relative, `/`-separated paths.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::repo_relative;
use crate::model::{Card, CardId};
use crate::sync::file::{atomic_write, read_text};
use crate::sync::types::{SyncError, SyncResult};

/// Card index file name, relative to the repository root.
pub const INDEX_FILE: &str = ".mbs-cards.json";

/// One file → card binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: CardId,
    /// ISO8601 timestamp of the last pull or merge that wrote the file.
    pub synced_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CardIndex {
    #[serde(default)]
    files: BTreeMap<String, IndexEntry>,
}

/// Reads and writes card files for one repository.
#[derive(Debug)]
pub struct CardStore {
    root: PathBuf,
    include_dir: PathBuf,
    index: CardIndex,
    dirty: bool,
}

impl CardStore {
    /// Open the store for the repository at `root`, loading the card index
    /// if there is one.
    ///
    /// # Errors
    ///
    /// Returns an error if the index exists but cannot be read or parsed.
    pub fn open(root: &Path, include_folder: &Path) -> SyncResult<Self> {
        let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
        let include_dir = root.join(include_folder);
        let index_path = root.join(INDEX_FILE);

        let index = if index_path.is_file() {
            let text = read_text(&index_path)?;
            serde_json::from_str(&text)
                .map_err(|e| SyncError::validation(INDEX_FILE, format!("invalid card index: {e}")))?
        } else {
            CardIndex::default()
        };

        Ok(Self {
            root,
            include_dir,
            index,
            dirty: false,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a repo-relative file.
    #[must_use]
    pub fn path(&self, file: &str) -> PathBuf {
        self.root.join(file)
    }

    /// Turn a user-supplied path (absolute, or relative to the working
    /// directory) into a repo-relative file name.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if the path is outside the repository.
    pub fn relativize(&self, path: &Path) -> SyncResult<String> {
        let abs = std::path::absolute(path)
            .map_err(|e| SyncError::io(path.display().to_string(), e))?;
        repo_relative(&self.root, &abs).ok_or_else(|| {
            SyncError::NotFound(format!(
                "{} is not inside the repository at {}",
                path.display(),
                self.root.display()
            ))
        })
    }

    #[must_use]
    pub fn exists(&self, file: &str) -> bool {
        self.path(file).is_file()
    }

    /// Read a card file.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if the file is missing.
    pub fn read(&self, file: &str) -> SyncResult<String> {
        read_text(&self.path(file))
    }

    /// Create or atomically replace a card file.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`] on filesystem failures.
    pub fn write(&self, file: &str, content: &str) -> SyncResult<()> {
        atomic_write(&self.path(file), content)
    }

    /// Which card a local file belongs to.
    ///
    /// The card index wins; otherwise the `id` of the local document is
    /// used. Files that are not parseable JSON before rendering have no
    /// embedded identity.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if the file is not indexed and does
    /// not exist.
    pub fn resolve_identity(&self, file: &str) -> SyncResult<Option<CardId>> {
        if let Some(entry) = self.index.files.get(file) {
            return Ok(Some(entry.id));
        }
        let text = self.read(file)?;
        Ok(Card::parse(&text).ok().and_then(|card| card.id()))
    }

    /// The file a card was last written to, if it still exists.
    #[must_use]
    pub fn file_for(&self, id: CardId) -> Option<&str> {
        self.index
            .files
            .iter()
            .find(|(file, entry)| entry.id == id && self.exists(file))
            .map(|(file, _)| file.as_str())
    }

    /// Every card file holding a card, keyed by card id.
    ///
    /// Identity is resolved per file as in [`resolve_identity`]. When two
    /// files claim the same card the lexically first one wins.
    ///
    /// [`resolve_identity`]: Self::resolve_identity
    ///
    /// # Errors
    ///
    /// Returns an error if the card files cannot be listed or read.
    pub fn identities(&self) -> SyncResult<BTreeMap<CardId, String>> {
        let mut found = BTreeMap::new();
        for file in self.list_card_files()? {
            if let Some(id) = self.resolve_identity(&file)? {
                found.entry(id).or_insert(file);
            }
        }
        Ok(found)
    }

    /// Record that `file` holds card `id`, unless the index already says so.
    /// Any other file bound to the same card is unbound.
    pub fn bind(&mut self, file: &str, id: CardId) {
        let bound = self.index.files.get(file).is_some_and(|entry| entry.id == id)
            && self
                .index
                .files
                .iter()
                .all(|(f, entry)| entry.id != id || f == file);
        if !bound {
            self.record_sync(file, id);
        }
    }

    /// Bind `file` to card `id` and stamp it as just written.
    pub fn record_sync(&mut self, file: &str, id: CardId) {
        self.index.files.retain(|f, entry| entry.id != id || f == file);
        self.index.files.insert(
            file.to_string(),
            IndexEntry {
                id,
                synced_at: Utc::now().to_rfc3339(),
            },
        );
        self.dirty = true;
    }

    /// Index entry for a file.
    #[must_use]
    pub fn entry(&self, file: &str) -> Option<&IndexEntry> {
        self.index.files.get(file)
    }

    /// Persist the card index if it changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be written.
    pub fn save_index(&mut self) -> SyncResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let mut text = serde_json::to_string_pretty(&self.index)
            .map_err(|e| SyncError::validation(INDEX_FILE, e.to_string()))?;
        text.push('\n');
        atomic_write(&self.root.join(INDEX_FILE), &text)?;
        self.dirty = false;
        debug!(files = self.index.files.len(), "Saved card index");
        Ok(())
    }

    /// Every card file in the repository, in lexical order.
    ///
    /// Card files are `*.json` files below the root, excluding dot-files,
    /// dot-directories and the include folder.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`] if the directory tree cannot be read.
    pub fn list_card_files(&self) -> SyncResult<Vec<String>> {
        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !(entry.file_name().to_string_lossy().starts_with('.')
                        || entry.path() == self.include_dir)
            });

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| SyncError::io(self.root.display().to_string(), e.into()))?;
            let is_json = entry.path().extension().is_some_and(|ext| ext == "json");
            if !entry.file_type().is_file() || !is_json {
                continue;
            }
            if let Some(file) = repo_relative(&self.root, entry.path()) {
                files.push(file);
            }
        }
        files.sort();
        Ok(files)
    }
}
