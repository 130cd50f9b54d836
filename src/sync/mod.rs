//! Card synchronization.
//!
//! This module moves cards between the remote service and the local
//! repository:
//!
//! - **Tag**: the `## mbs_controlled ##` marker that opts a card into sync
//! - **Store**: card files on disk and the file → card index
//! - **Engine**: pull, push and merge, reporting per-item outcomes
//!
//! # Example
//!
//! ```ignore
//! use mbs::sync::{CardStore, SyncEngine};
//!
//! let mut store = CardStore::open(&repo.root, repo.include_folder())?;
//! let mut engine = SyncEngine::new(&client, &mut store, &renderer);
//! let report = engine.pull_all(false).await?;
//! ```

mod engine;
pub(crate) mod file;
mod store;
pub mod tag;
mod types;

pub use engine::{render_card, render_files, RenderedFile, SyncEngine};
pub use file::atomic_write;
pub use store::{CardStore, IndexEntry, INDEX_FILE};
pub use tag::{contains_control_tag, is_controlled, CONTROL_TAG};
pub use types::{
    FailureKind, ItemReport, ItemStatus, Operation, SyncError, SyncReport, SyncResult,
};
