//! Local transport: a narrow, out-of-scope collaborator (SPEC_FULL.md §1, §6).
//!
//! Local repositories never go through the smart protocol's subtransport
//! interface — there is no pkt-line negotiation to speak of when the remote
//! is a subprocess on the same machine. This module keeps the teacher's
//! subprocess-spawn shape (`git-upload-pack <path>` over piped stdio) as a
//! standalone collaborator the dispatch layer can hand off to directly,
//! rather than folding it into `Subtransport`.

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};

use crate::subtransport::Service;
use crate::{GitUrl, TransportError};

/// A live local-transport connection: a spawned `git-upload-pack` subprocess.
pub struct LocalConnection {
    child: Child,
}

impl LocalConnection {
    pub fn reader(&mut self) -> &mut dyn Read {
        self.child.stdout.as_mut().expect("stdout not captured")
    }

    pub fn writer(&mut self) -> &mut dyn Write {
        self.child.stdin.as_mut().expect("stdin not captured")
    }

    pub fn close(mut self) -> Result<(), TransportError> {
        drop(self.child.stdin.take());
        let status = self.child.wait()?;
        if !status.success() {
            let code = status.code().unwrap_or(-1);
            return Err(TransportError::ConnectionFailed(format!(
                "local transport process exited with code {code}"
            )));
        }
        Ok(())
    }
}

/// Connect to a local repository by spawning its upload-pack process.
pub fn connect(url: &GitUrl, service: Service) -> Result<LocalConnection, TransportError> {
    let child = Command::new(service.as_str())
        .arg(&url.path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            TransportError::ConnectionFailed(format!(
                "failed to spawn {}: {e}",
                service.as_str()
            ))
        })?;

    Ok(LocalConnection { child })
}
