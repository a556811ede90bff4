//! The `git://` subtransport: a persistent raw-TCP stream (rpc = false).
//!
//! One connection is opened per `action` call against the upload-pack
//! service; per SPEC_FULL.md §4.6 the same stream is then reused across the
//! whole ls+negotiate+download sequence by the smart transport, so this type
//! only needs to hand back one stream per logical fetch, not reconnect per
//! service invocation the way the RPC carrier does.

use std::io::Write;
use std::net::TcpStream;

use crate::subtransport::{Service, Subtransport, SubtransportStream};
use crate::{GitUrl, TransportError};

const GIT_DAEMON_PORT: u16 = 9418;

/// Subtransport for the anonymous `git://` protocol.
#[derive(Default)]
pub struct GitSubtransport;

impl GitSubtransport {
    pub fn new() -> Self {
        Self
    }
}

impl Subtransport for GitSubtransport {
    fn action(
        &mut self,
        url: &GitUrl,
        service: Service,
    ) -> Result<Box<dyn SubtransportStream>, TransportError> {
        let host = url.host.as_deref().ok_or_else(|| {
            TransportError::InvalidUrl("git:// URL has no host".into())
        })?;
        let port = url.port.unwrap_or(GIT_DAEMON_PORT);

        log::trace!("git-subtransport: connecting to {host}:{port}");
        let mut stream = TcpStream::connect((host, port))?;

        // git-daemon request line: "<service> <path>\0host=<host>\0"
        let request = format!(
            "{} {}\0host={}\0",
            service.as_str(),
            url.path,
            host
        );
        let framed = format!("{:04x}{}", request.len() + 4, request);
        stream.write_all(framed.as_bytes())?;

        Ok(Box::new(stream))
    }

    fn rpc(&self) -> bool {
        false
    }
}
