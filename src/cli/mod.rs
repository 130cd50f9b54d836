//! CLI definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::model::CardId;

pub mod commands;
pub mod report;

/// mbs - keep Metabase questions in a local repository of Jinja templates
#[derive(Parser, Debug)]
#[command(name = "mbs", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize an mbs repository in the current directory
    Init {
        /// Metabase base URL (e.g. https://metabase.example.com)
        url: String,

        /// Folder searched for includes after the repository root
        #[arg(long)]
        include_folder: Option<String>,
    },

    /// Log in to the repository's Metabase server
    Login {
        /// Metabase username (usually an email address)
        username: String,

        /// Metabase password
        #[arg(env = "MBS_PASSWORD", hide_env_values = true)]
        password: String,

        /// Do not store the credentials used to renew expired sessions
        #[arg(short = 's', long)]
        dont_save_credentials: bool,
    },

    /// Pull controlled cards (or one card by id) into the repository
    Pull {
        /// Pull only this card, even if it is not controlled
        card_id: Option<CardId>,

        /// Do not overwrite files that already exist
        #[arg(short, long)]
        keep_existing: bool,
    },

    /// Render card files and upload them
    ///
    /// Without a file, every card file in the repository is pushed.
    Push {
        /// Card file to push
        file: Option<PathBuf>,

        /// Folder searched for includes (overrides the repository setting)
        #[arg(long)]
        include_folder: Option<String>,

        /// Render and validate only; print the output and upload nothing
        #[arg(long)]
        render_only: bool,
    },

    /// Merge remote changes into card files, keeping the local query
    ///
    /// Without a file, every card file in the repository is merged.
    Merge {
        /// Card file to merge
        file: Option<PathBuf>,
    },

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_pull_with_id() {
        let cli = Cli::parse_from(["mbs", "pull", "42", "-k"]);
        match cli.command {
            Commands::Pull {
                card_id,
                keep_existing,
            } => {
                assert_eq!(card_id, Some(42));
                assert!(keep_existing);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_push_flags() {
        let cli = Cli::parse_from([
            "mbs",
            "--json",
            "push",
            "q.json",
            "--render-only",
            "--include-folder",
            "partials",
        ]);
        assert!(cli.json);
        match cli.command {
            Commands::Push {
                file,
                include_folder,
                render_only,
            } => {
                assert_eq!(file, Some(PathBuf::from("q.json")));
                assert_eq!(include_folder.as_deref(), Some("partials"));
                assert!(render_only);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_login_short_flag() {
        let cli = Cli::parse_from(["mbs", "login", "ana@example.com", "pw", "-s"]);
        assert!(matches!(
            cli.command,
            Commands::Login {
                dont_save_credentials: true,
                ..
            }
        ));
    }
}
