//! Subtransport abstraction (L1): the stream carrier underneath the smart protocol.
//!
//! A subtransport knows nothing about pkt-lines, capabilities, or negotiation —
//! it only knows how to open a byte stream for a named service against a URL.
//! The smart transport in `git-protocol` drives everything above this line.

use std::io::{Read, Write};

use crate::{GitUrl, TransportError};

/// Action the smart transport can ask a subtransport to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Reference discovery (`git-upload-pack` with `--advertise-refs`, or the
    /// `/info/refs?service=git-upload-pack` HTTP request).
    UploadPackLs,
    /// The actual fetch negotiation + pack transfer.
    UploadPack,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::UploadPackLs | Service::UploadPack => "git-upload-pack",
        }
    }
}

/// A stream used to read and write data for one subtransport action.
///
/// The stream holds a non-owning back-reference to its subtransport only
/// conceptually (see SPEC_FULL.md §9); in this Rust expression there is no
/// literal back-pointer, since the stream is returned as an owned boxed value
/// and the subtransport is free to be a plain stateless factory.
pub trait SubtransportStream: Read + Write + Send {}

impl<T: Read + Write + Send> SubtransportStream for T {}

/// A carrier that opens streams for the smart transport.
///
/// `rpc()` distinguishes persistent carriers (git://, one stream spans the
/// whole ls+negotiate+download sequence) from stateless/RPC carriers
/// (http(s)://, each `action` call is one request/response transaction).
pub trait Subtransport: Send {
    fn action(
        &mut self,
        url: &GitUrl,
        service: Service,
    ) -> Result<Box<dyn SubtransportStream>, TransportError>;

    /// Whether this carrier is stateless/RPC (true) or persistent (false).
    fn rpc(&self) -> bool;
}
