//! CLI argument parsing with clap derive

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;
use crate::output::OutputContext;

/// Package manager for AI agent formations
#[derive(Parser)]
#[command(
    name = "aviary",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Install a formation from a local directory
    Install(commands::install::InstallArgs),

    /// Migrate an installed formation to a new manifest
    Update(commands::update::UpdateArgs),

    /// Remove an installed formation
    Uninstall(commands::uninstall::UninstallArgs),

    /// Detect and optionally fix drift between state and the live host
    Repair(commands::repair::RepairArgs),

    /// Show installed formations
    List,

    /// Export a formation's source snapshot
    Export(commands::export::ExportArgs),

    /// Show version
    Version,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self) -> Result<()> {
        let Cli {
            json,
            quiet,
            no_color,
            command,
        } = self;
        let ctx = OutputContext::new(no_color, quiet);
        match command {
            Command::Install(args) => commands::install::run(&ctx, &args, json).await,
            Command::Update(args) => commands::update::run(&ctx, &args, json).await,
            Command::Uninstall(args) => commands::uninstall::run(&ctx, &args).await,
            Command::Repair(args) => commands::repair::run(&ctx, &args, json).await,
            Command::List => commands::list::run(&ctx, json).await,
            Command::Export(args) => commands::export::run(&ctx, &args).await,
            Command::Version => commands::version::run(json),
        }
    }
}
