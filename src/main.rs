use anyhow::Result;
use clap::Parser;

mod baseline;
mod cherry_pick;
mod cli;
mod classifier;
mod commit_filter;
mod conflict;
mod config;
mod error;
mod event;
mod onboarding;
mod platform;
mod rebase;
mod split;
mod sync;
mod trailer;
mod upstream;
mod vcs;

fn init_tools() -> Result<()> {
    crate::vcs::ensure_tool("git")?;
    crate::vcs::ensure_tool("gh")?;
    Ok(())
}

/// Configuration errors exit 2 (distinct from the general failure code 1),
/// so CI can tell a bad `linecook.yml` apart from a failed sync.
const EXIT_CONFIG_ERROR: i32 = 2;
const EXIT_FAILURE: i32 = 1;

fn is_config_error(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<crate::error::SyncError>(), Some(crate::error::SyncError::Config(_)))
}

fn main() -> std::process::ExitCode {
    let cli = crate::cli::Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("info")
            .with_target(false)
            .with_level(false)
            .compact()
            .init();
        std::env::set_var("LINECOOK_VERBOSE", "1");
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("info")
            .with_target(false)
            .with_level(false)
            .without_time()
            .compact()
            .init();
    }

    match run(cli) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) if is_config_error(&e) => {
            tracing::error!("{:#}", e);
            std::process::ExitCode::from(EXIT_CONFIG_ERROR as u8)
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            std::process::ExitCode::from(EXIT_FAILURE as u8)
        }
    }
}

fn run(cli: crate::cli::Cli) -> Result<()> {
    init_tools()?;

    let cfg = crate::config::load_config(&cli.config)?;
    let registry = crate::upstream::build_registry(&cfg)?;

    match cli.cmd {
        crate::cli::Cmd::Sync {} => {
            let reports = crate::sync::sync_all(cli.dry_run, &cfg, &registry)?;
            for report in reports {
                tracing::info!(
                    "upstream `{}`: applied {} commit(s), opened_conflict={}",
                    report.upstream_key,
                    report.applied,
                    report.opened_conflict
                );
            }
        }
        crate::cli::Cmd::Event { event_path } => {
            crate::event::handle_event(cli.dry_run, &cfg, &registry, &event_path)?;
        }
    }

    Ok(())
}
