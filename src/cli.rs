use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Fetch every configured upstream, apply new commits, and publish PRs
    Sync {},

    /// Handle a hosting-platform webhook payload (comment commands)
    Event {
        /// Path to the webhook event JSON payload
        #[arg(long)]
        event_path: PathBuf,
    },
}

#[derive(Parser, Debug)]
#[command(
    name = "line-cook",
    version,
    about = "Mirrors prefix-named cookbook directories from upstream repos into this one"
)]
pub struct Cli {
    /// Verbose output for underlying git/gh commands
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Path to the YAML configuration file
    #[arg(long, global = true, default_value = "linecook.yml")]
    pub config: PathBuf,

    /// Never push, create, or edit anything; just log what would happen
    #[arg(long, global = true, visible_alias = "dr")]
    pub dry_run: bool,

    #[command(subcommand)]
    pub cmd: Cmd,
}
