//! Log in to the repository's Metabase server.

use serde::Serialize;
use tracing::info;

use super::runtime;
use crate::config::{load_repo, remotes_path, Remotes};
use crate::error::Result;
use crate::remote::{login, Credentials};

#[derive(Serialize)]
struct LoginOutput<'a> {
    url: &'a str,
    credentials_saved: bool,
}

/// Execute the login command.
///
/// The session is stored in `remotes.json`, together with the credentials
/// unless `dont_save_credentials` is set.
///
/// # Errors
///
/// Returns an error if the server rejects the credentials or the remotes
/// file cannot be written.
pub fn execute(
    username: &str,
    password: &str,
    dont_save_credentials: bool,
    json: bool,
) -> Result<()> {
    let repo = load_repo(&std::env::current_dir()?)?;
    let credentials = Credentials {
        username: username.to_string(),
        password: password.to_string(),
    };

    let session = runtime()?.block_on(login(repo.url(), &credentials))?;
    info!(url = repo.url(), username, "Logged in");

    let path = remotes_path()?;
    let mut remotes = Remotes::load(&path)?;
    let save_credentials = !dont_save_credentials;
    remotes.set_login(repo.url(), &session, save_credentials.then_some(&credentials));
    remotes.save(&path)?;

    if json {
        let output = LoginOutput {
            url: repo.url(),
            credentials_saved: save_credentials,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Logged in to {} as {username}", repo.url());
        if !save_credentials {
            println!("  Credentials not saved: log in again when the session expires.");
        }
    }
    Ok(())
}
