//! The `http(s)://` subtransport: stateless/RPC (rpc = true).
//!
//! Every `action` call is one logical request/response transaction. The
//! stream returned buffers whatever the smart protocol writes to it and only
//! performs the actual HTTP request when the protocol makes its first read —
//! mirroring `git_smart_subtransport_stream`'s documented contract, where
//! writes accumulate and the read that follows them triggers the flush. This
//! differs from the teacher's original `HttpTransport`, which eagerly fired
//! the GET inside `connect()` regardless of whether the caller had written
//! anything yet.

use std::io::{self, Cursor, Read, Write};
use std::process::{Command, Stdio};

use crate::subtransport::{Service, Subtransport, SubtransportStream};
use crate::{ConnectFlags, GitUrl, TransportError};

/// Subtransport for `http://` and `https://`.
pub struct HttpSubtransport {
    flags: ConnectFlags,
}

impl HttpSubtransport {
    pub fn new(flags: ConnectFlags) -> Self {
        Self { flags }
    }
}

impl Subtransport for HttpSubtransport {
    fn action(
        &mut self,
        url: &GitUrl,
        service: Service,
    ) -> Result<Box<dyn SubtransportStream>, TransportError> {
        let base_url = format!(
            "{}://{}{}{}",
            url.scheme,
            url.host.as_deref().unwrap_or(""),
            url.port.map(|p| format!(":{}", p)).unwrap_or_default(),
            url.path
        );

        let kind = match service {
            Service::UploadPackLs => RequestKind::InfoRefs {
                url: format!("{base_url}/info/refs?service={}", service.as_str()),
            },
            Service::UploadPack => RequestKind::Rpc {
                url: format!("{base_url}/{}", service.as_str()),
                service: service.as_str(),
            },
        };

        Ok(Box::new(HttpStream {
            kind,
            no_check_cert: self.flags.no_check_cert,
            write_buf: Vec::new(),
            read_buf: None,
        }))
    }

    fn rpc(&self) -> bool {
        true
    }
}

enum RequestKind {
    InfoRefs { url: String },
    Rpc { url: String, service: &'static str },
}

/// One request/response transaction's stream.
///
/// Writes accumulate in `write_buf`; the first `read` performs the request
/// (GET for `InfoRefs`, POST with `write_buf` as body for `Rpc`) and caches
/// the response body in `read_buf` for subsequent reads.
struct HttpStream {
    kind: RequestKind,
    no_check_cert: bool,
    write_buf: Vec<u8>,
    read_buf: Option<Cursor<Vec<u8>>>,
}

impl HttpStream {
    fn ensure_requested(&mut self) -> io::Result<()> {
        if self.read_buf.is_some() {
            return Ok(());
        }
        let body = match &self.kind {
            RequestKind::InfoRefs { url } => {
                log::trace!("http-subtransport: GET {url}");
                http_get(url, self.no_check_cert)
            }
            RequestKind::Rpc { url, service } => {
                let content_type = format!("application/x-{service}-request");
                let accept = format!("application/x-{service}-result");
                log::trace!("http-subtransport: POST {url} ({} bytes)", self.write_buf.len());
                http_post(url, &content_type, &accept, &self.write_buf, self.no_check_cert)
            }
        }
        .map_err(io::Error::other)?;
        self.read_buf = Some(Cursor::new(body));
        Ok(())
    }
}

impl Read for HttpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.ensure_requested()?;
        self.read_buf.as_mut().expect("just populated").read(buf)
    }
}

impl Write for HttpStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn http_get(url: &str, no_check_cert: bool) -> Result<Vec<u8>, TransportError> {
    let mut args = vec!["-sfL".to_string(), "--include".to_string()];
    if no_check_cert {
        args.push("-k".to_string());
    }
    args.push(url.to_string());

    let output = Command::new("curl")
        .args(&args)
        .output()
        .map_err(|e| TransportError::ConnectionFailed(format!("curl not found: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TransportError::Http {
            status: 0,
            message: format!("HTTP GET failed: {stderr}"),
        });
    }

    extract_http_body(&output.stdout)
}

fn http_post(
    url: &str,
    content_type: &str,
    accept: &str,
    body: &[u8],
    no_check_cert: bool,
) -> Result<Vec<u8>, TransportError> {
    let mut args = vec![
        "-sf".to_string(),
        "--include".to_string(),
        "-X".to_string(),
        "POST".to_string(),
        "-H".to_string(),
        format!("Content-Type: {content_type}"),
        "-H".to_string(),
        format!("Accept: {accept}"),
        "--data-binary".to_string(),
        "@-".to_string(),
    ];
    if no_check_cert {
        args.push("-k".to_string());
    }
    args.push(url.to_string());

    let mut child = Command::new("curl")
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| TransportError::ConnectionFailed(format!("curl not found: {e}")))?;

    if let Some(ref mut stdin) = child.stdin {
        stdin.write_all(body)?;
    }
    drop(child.stdin.take());

    let output = child.wait_with_output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TransportError::Http {
            status: 0,
            message: format!("HTTP POST failed: {stderr}"),
        });
    }

    extract_http_body(&output.stdout)
}

/// Extract the HTTP response body by skipping headers up to the `\r\n\r\n` boundary.
fn extract_http_body(response: &[u8]) -> Result<Vec<u8>, TransportError> {
    for i in 0..response.len().saturating_sub(3) {
        if &response[i..i + 4] == b"\r\n\r\n" {
            return Ok(response[i + 4..].to_vec());
        }
    }
    Ok(response.to_vec())
}
