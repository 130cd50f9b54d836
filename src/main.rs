//! mbs CLI entry point.

use clap::Parser;
use mbs::cli::commands;
use mbs::cli::{Cli, Commands};
use mbs::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,hyper_util=info,reqwest=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli) -> Result<(), Error> {
    let json = cli.json;
    match &cli.command {
        Commands::Init {
            url,
            include_folder,
        } => commands::init::execute(url, include_folder.as_deref(), json),
        Commands::Login {
            username,
            password,
            dont_save_credentials,
        } => commands::login::execute(username, password, *dont_save_credentials, json),
        Commands::Pull {
            card_id,
            keep_existing,
        } => commands::pull::execute(*card_id, *keep_existing, json),
        Commands::Push {
            file,
            include_folder,
            render_only,
        } => commands::push::execute(
            file.as_deref(),
            include_folder.as_deref(),
            *render_only,
            json,
        ),
        Commands::Merge { file } => commands::merge::execute(file.as_deref(), json),
        Commands::Version => commands::version::execute(json),
        Commands::Completions { shell } => commands::completions::execute(shell),
    }
}
