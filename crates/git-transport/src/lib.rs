//! Transport dispatch (L4) and subtransport carriers (L1) for the git smart
//! protocol. This crate maps a URL to a concrete transport kind and opens the
//! byte streams the smart protocol in `git-protocol` drives; it has no
//! knowledge of pkt-lines, capabilities, or negotiation.

pub mod dispatch;
pub mod dummy;
pub mod git_subtransport;
pub mod http_subtransport;
pub mod local;
pub mod subtransport;
pub mod url;

/// Errors produced by dispatch and the subtransport carriers.
///
/// Mirrors the five error kinds named in SPEC_FULL.md §7: `Network` and
/// `Protocol`-adjacent framing live in `git-protocol::ProtocolError`, which
/// wraps this type transparently; `Unsupported` and the URL/connection kinds
/// below belong at this layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("not supported: {0}")]
    Unsupported(String),

    #[error("HTTP error: {status}: {message}")]
    Http { status: u16, message: String },

    #[error("server error: {0}")]
    ServerError(String),

    #[error(transparent)]
    Config(#[from] git_config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Git URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Ssh,
    Git,
    Http,
    Https,
    File,
    /// Local path without scheme prefix.
    Local,
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scheme::Ssh => write!(f, "ssh"),
            Scheme::Git => write!(f, "git"),
            Scheme::Http => write!(f, "http"),
            Scheme::Https => write!(f, "https"),
            Scheme::File => write!(f, "file"),
            Scheme::Local => write!(f, "local"),
        }
    }
}

/// Parsed git URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitUrl {
    pub scheme: Scheme,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub path: String,
}

impl std::fmt::Display for GitUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.scheme {
            Scheme::Ssh if self.user.is_some() && self.port.is_none() => {
                // SCP-like syntax: user@host:path
                write!(
                    f,
                    "{}@{}:{}",
                    self.user.as_deref().unwrap_or("git"),
                    self.host.as_deref().unwrap_or(""),
                    self.path
                )
            }
            Scheme::Local => write!(f, "{}", self.path),
            Scheme::File => write!(f, "file://{}", self.path),
            _ => {
                write!(f, "{}://", self.scheme)?;
                if let Some(ref user) = self.user {
                    write!(f, "{}@", user)?;
                }
                if let Some(ref host) = self.host {
                    write!(f, "{}", host)?;
                }
                if let Some(port) = self.port {
                    write!(f, ":{}", port)?;
                }
                write!(f, "{}", self.path)
            }
        }
    }
}

/// Configuration options recognized on `connect` (SPEC_FULL.md §6).
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectFlags {
    /// Suppress TLS peer certificate verification.
    pub no_check_cert: bool,
}

/// Build a `Subtransport` for the given URL, as resolved by `dispatch`.
///
/// Returns `Unsupported` for `TransportKind::Dummy` and `TransportKind::Local`
/// (the latter is handled directly by `local::connect`, which speaks raw
/// subprocess I/O rather than the smart protocol's subtransport interface).
pub fn open_subtransport(
    kind: dispatch::TransportKind,
    flags: ConnectFlags,
) -> Result<Box<dyn subtransport::Subtransport>, TransportError> {
    match kind {
        dispatch::TransportKind::SmartGit => {
            Ok(Box::new(git_subtransport::GitSubtransport::new()))
        }
        dispatch::TransportKind::SmartHttp => {
            Ok(Box::new(http_subtransport::HttpSubtransport::new(flags)))
        }
        dispatch::TransportKind::Dummy => Ok(Box::new(dummy::DummySubtransport)),
        dispatch::TransportKind::Local => Err(TransportError::Unsupported(
            "local transport does not use the subtransport interface".into(),
        )),
    }
}
