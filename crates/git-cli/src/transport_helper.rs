//! Resolves a URL to a connected `SmartTransport`, bridging `git-transport`'s
//! dispatch table to `git-protocol`'s smart-transport lifecycle for the
//! commands that fetch from or list a remote.

use anyhow::{bail, Result};
use git_config::ConfigSet;
use git_protocol::smart::SmartTransport;
use git_transport::{dispatch, open_subtransport, ConnectFlags, GitUrl};

/// Resolve `ConnectFlags` from `http.sslVerify`, the one connect-time option
/// the fetch core exposes to callers. Defaults to verifying certificates.
pub fn resolve_flags(config: &ConfigSet) -> ConnectFlags {
    let ssl_verify = config.get_bool("http.sslVerify").ok().flatten().unwrap_or(true);
    ConnectFlags {
        no_check_cert: !ssl_verify,
    }
}

pub fn connect(url_str: &str, flags: ConnectFlags) -> Result<SmartTransport> {
    let url = GitUrl::parse(url_str)?;
    let kind = dispatch::find_transport_for(&url)
        .ok_or_else(|| anyhow::anyhow!("fatal: unable to find a transport for '{}'", url_str))?;
    if matches!(kind, dispatch::TransportKind::Local | dispatch::TransportKind::Dummy) {
        bail!("fatal: '{}' is not supported by the smart-transport fetch core", url_str);
    }
    let subtransport = open_subtransport(kind, flags)?;
    Ok(SmartTransport::connect(subtransport, url, flags)?)
}
