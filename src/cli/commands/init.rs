//! Initialize an mbs repository.
//!
//! Writes the `.mbs` marker into the current directory. Every other command
//! finds the repository by walking up to that marker.

use crate::config::{init_repo, MARKER_FILE};
use crate::error::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct InitOutput<'a> {
    path: PathBuf,
    url: &'a str,
    include_folder: &'a Path,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns an error if the directory is already a repository or the marker
/// cannot be written.
pub fn execute(url: &str, include_folder: Option<&str>, json: bool) -> Result<()> {
    let repo = init_repo(&std::env::current_dir()?, url, include_folder)?;

    if json {
        let output = InitOutput {
            path: repo.root.join(MARKER_FILE),
            url: repo.url(),
            include_folder: repo.include_folder(),
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Initialized mbs repository in {}", repo.root.display());
        println!("  Remote: {}", repo.url());
        println!("  Includes: {}/", repo.include_folder().display());
        println!();
        println!("Next: Run 'mbs login <username> <password>' to connect.");
    }

    Ok(())
}
