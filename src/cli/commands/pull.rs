//! Pull cards from the remote into the repository.

use super::{runtime, Connection, Workspace};
use crate::cli::report::conclude;
use crate::error::Result;
use crate::model::CardId;
use crate::sync::SyncEngine;

/// Execute the pull command.
///
/// Without `card_id`, every controlled card is pulled. Existing files are
/// overwritten unless `keep_existing` is set.
///
/// # Errors
///
/// Returns an error if the repository or session is missing, the remote is
/// unreachable, or any card failed.
pub fn execute(card_id: Option<CardId>, keep_existing: bool, json: bool) -> Result<()> {
    let mut workspace = Workspace::open(None)?;
    let mut connection = Connection::open(workspace.repo.url())?;

    let rt = runtime()?;
    let mut engine = SyncEngine::new(
        &connection.client,
        &mut workspace.store,
        &workspace.renderer,
    );
    let result = match card_id {
        Some(id) => rt.block_on(engine.pull_one(id, keep_existing)),
        None => rt.block_on(engine.pull_all(keep_existing)),
    };

    connection.persist_session()?;
    conclude(result, json)
}
