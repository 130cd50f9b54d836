//! Merge remote card changes into local files.

use std::path::Path;

use super::{runtime, Connection, Workspace};
use crate::cli::report::conclude;
use crate::error::Result;
use crate::sync::SyncEngine;

/// Execute the merge command.
///
/// Every field except `native.query` is taken from the remote card; nothing
/// is uploaded.
///
/// # Errors
///
/// Returns an error if the repository or session is missing, the remote is
/// unreachable, or any file failed.
pub fn execute(file: Option<&Path>, json: bool) -> Result<()> {
    let mut workspace = Workspace::open(None)?;
    let file = workspace.resolve_file(file)?;

    let mut connection = Connection::open(workspace.repo.url())?;
    let mut engine = SyncEngine::new(
        &connection.client,
        &mut workspace.store,
        &workspace.renderer,
    );
    let result = runtime()?.block_on(engine.merge(file.as_deref()));

    connection.persist_session()?;
    conclude(result, json)
}
