pub mod clone;
pub mod fetch;
pub mod init;
pub mod ls_remote;
pub mod remote;

use anyhow::Result;
use clap::Subcommand;

use crate::Cli;

#[derive(Subcommand)]
pub enum Commands {
    /// Create an empty Git repository or reinitialize an existing one
    Init(init::InitArgs),
    /// Clone a repository into a new directory
    Clone(clone::CloneArgs),
    /// Manage set of tracked repositories
    Remote(remote::RemoteArgs),
    /// Download objects and refs from another repository
    Fetch(fetch::FetchArgs),
    /// List references in a remote repository
    LsRemote(ls_remote::LsRemoteArgs),
}

impl Commands {
    /// Get the command name as used in config keys (e.g., "fetch", "remote").
    pub fn command_name(&self) -> &str {
        match self {
            Commands::Init(_) => "init",
            Commands::Clone(_) => "clone",
            Commands::Remote(_) => "remote",
            Commands::Fetch(_) => "fetch",
            Commands::LsRemote(_) => "ls-remote",
        }
    }
}

/// Open a repository, respecting --git-dir override.
pub fn open_repo(cli: &Cli) -> Result<git_repository::Repository> {
    let repo = if let Some(ref git_dir) = cli.git_dir {
        git_repository::Repository::open(git_dir)?
    } else {
        git_repository::Repository::discover(".")?
    };
    Ok(repo)
}

pub fn run(cli: Cli) -> Result<i32> {
    match &cli.command {
        Commands::Init(args) => init::run(args, &cli),
        Commands::Clone(args) => clone::run(args, &cli),
        Commands::Remote(args) => remote::run(args, &cli),
        Commands::Fetch(args) => fetch::run(args, &cli),
        Commands::LsRemote(args) => ls_remote::run(args, &cli),
    }
}
