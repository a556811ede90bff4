//! Git smart-transport fetch core.
//!
//! This crate owns L3 (smart transport lifecycle, negotiation, download
//! orchestration) and L2 (pkt-line framing, capability detection, side-band
//! demultiplexing) of the four-layer transport architecture; `git-transport`
//! owns L4/L1 below it.

pub mod buffer;
pub mod capability;
pub mod download;
pub mod negotiate;
pub mod pktline;
pub mod sideband;
pub mod smart;

use git_transport::TransportError;

/// Errors that can occur during protocol operations.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid pkt-line: {0}")]
    InvalidPktLine(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("server error: {0}")]
    ServerError(String),

    #[error("unsupported capability: {0}")]
    UnsupportedCapability(String),

    #[error("operation cancelled")]
    UserAbort,

    #[error("receive buffer exceeded its size cap")]
    OutOfMemory,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Pack(#[from] git_pack::PackError),

    #[error(transparent)]
    Ref(#[from] git_ref::RefError),

    #[error(transparent)]
    RevWalk(#[from] git_revwalk::RevWalkError),

    #[error(transparent)]
    Config(#[from] git_config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
