//! Render card files and upload them.
//!
//! `--render-only` renders and validates without contacting the remote, so
//! it works before `mbs login`.

use std::path::Path;

use colored::Colorize;
use serde_json::json;
use tracing::warn;

use super::{runtime, Connection, Workspace};
use crate::cli::report::{conclude, finish, eprint_item, to_json};
use crate::error::Result;
use crate::sync::{render_files, SyncEngine};

/// Execute the push command.
///
/// # Errors
///
/// Returns an error if the repository or session is missing, the remote is
/// unreachable, or any file failed.
pub fn execute(
    file: Option<&Path>,
    include_folder: Option<&str>,
    render_only: bool,
    json: bool,
) -> Result<()> {
    let mut workspace = Workspace::open(include_folder)?;
    let file = workspace.resolve_file(file)?;

    if render_only {
        return execute_render_only(&workspace, file.as_deref(), json);
    }

    if file.is_none() {
        warn!("No file given: pushing every card file in the repository");
    }

    let mut connection = Connection::open(workspace.repo.url())?;
    let mut engine = SyncEngine::new(
        &connection.client,
        &mut workspace.store,
        &workspace.renderer,
    );
    let result = runtime()?.block_on(engine.push(file.as_deref()));

    connection.persist_session()?;
    conclude(result, json)
}

fn execute_render_only(workspace: &Workspace, file: Option<&str>, json: bool) -> Result<()> {
    let (report, outputs) = render_files(&workspace.store, &workspace.renderer, file)?;

    if json {
        let mut value = to_json(&report);
        value["outputs"] = json!(outputs);
        println!("{}", serde_json::to_string(&value)?);
        return finish(&report);
    }

    let several = outputs.len() > 1;
    for rendered in &outputs {
        if several {
            println!("{}", format!("# {}", rendered.file).dimmed());
        }
        println!("{}", rendered.output);
    }
    for item in report.items.iter().filter(|i| i.status.is_failure()) {
        eprint_item(item);
    }
    finish(&report)
}
