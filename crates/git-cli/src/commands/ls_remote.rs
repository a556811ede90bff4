use std::io::{self, Write};

use anyhow::{bail, Result};
use clap::Args;

use crate::transport_helper;
use super::open_repo;
use crate::Cli;

#[derive(Args)]
pub struct LsRemoteArgs {
    /// Show only refs/heads
    #[arg(long)]
    heads: bool,

    /// Show only refs/tags
    #[arg(long)]
    tags: bool,

    /// Suppress informational messages
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Exit with status 2 when no matching refs are found
    #[arg(long)]
    exit_code: bool,

    /// Show the URL of the remote instead of refs
    #[arg(long)]
    get_url: bool,

    /// Repository (remote name or URL)
    #[arg(value_name = "repository")]
    repository: Option<String>,

    /// Ref patterns to match
    #[arg(value_name = "patterns")]
    patterns: Vec<String>,
}

pub fn run(args: &LsRemoteArgs, cli: &Cli) -> Result<i32> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let remote_url = resolve_remote_url(args, cli)?;

    if args.get_url {
        writeln!(out, "{}", remote_url)?;
        return Ok(0);
    }

    let flags = transport_helper::resolve_flags(&git_config::ConfigSet::load(None)?);
    let transport = transport_helper::connect(&remote_url, flags)?;
    let mut lines = Vec::new();
    transport.ls(|record| {
        let name = String::from_utf8_lossy(&record.name).to_string();
        if args.heads && !name.starts_with("refs/heads/") {
            return std::ops::ControlFlow::Continue(());
        }
        if args.tags && !name.starts_with("refs/tags/") {
            return std::ops::ControlFlow::Continue(());
        }
        if args.patterns.is_empty() || args.patterns.iter().any(|p| ref_matches_pattern(&name, p)) {
            lines.push(format!("{}\t{}", record.oid.to_hex(), name));
        }
        std::ops::ControlFlow::Continue(())
    })?;

    if lines.is_empty() && args.exit_code {
        return Ok(2);
    }

    for line in &lines {
        writeln!(out, "{}", line)?;
    }

    Ok(0)
}

/// Resolve the remote URL from args or repo config.
fn resolve_remote_url(args: &LsRemoteArgs, cli: &Cli) -> Result<String> {
    if let Some(ref repo_arg) = args.repository {
        if repo_arg.contains("://")
            || repo_arg.contains('@')
            || repo_arg.starts_with('/')
            || repo_arg.ends_with(".git")
        {
            return Ok(repo_arg.clone());
        }

        if let Ok(repo) = open_repo(cli) {
            if let Some(url) = get_remote_url(&repo, repo_arg) {
                return Ok(url);
            }
        }

        Ok(repo_arg.clone())
    } else {
        let repo = open_repo(cli)?;
        if let Some(url) = get_remote_url(&repo, "origin") {
            Ok(url)
        } else {
            bail!("fatal: No remote configured and no repository specified");
        }
    }
}

/// Read a remote's URL from the repository config.
fn get_remote_url(repo: &git_repository::Repository, remote_name: &str) -> Option<String> {
    let config_path = repo.git_dir().join("config");
    let content = std::fs::read_to_string(&config_path).ok()?;

    let section_header = format!("[remote \"{}\"]", remote_name);
    let mut in_section = false;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed == section_header {
            in_section = true;
            continue;
        }
        if in_section && trimmed.starts_with('[') {
            break;
        }
        if in_section {
            if let Some(url) = trimmed.strip_prefix("url = ") {
                return Some(url.to_string());
            }
        }
    }

    None
}

/// Check if a ref name matches a pattern (simple glob matching).
fn ref_matches_pattern(ref_name: &str, pattern: &str) -> bool {
    if pattern.contains('*') {
        let parts: Vec<&str> = pattern.splitn(2, '*').collect();
        if parts.len() == 2 {
            ref_name.starts_with(parts[0]) && ref_name.ends_with(parts[1])
        } else {
            ref_name == pattern
        }
    } else {
        ref_name == pattern || ref_name.ends_with(&format!("/{}", pattern))
    }
}
