//! Dummy transport and subtransport: an explicit "not implemented" stand-in.
//!
//! Used for URL schemes that dispatch routes away from a real carrier (the
//! SSH aliases, per SPEC_FULL.md §4.1) so callers get a clear error instead
//! of a scheme-unknown failure. The message matches libgit2's
//! `git_transport_dummy` verbatim.

use crate::subtransport::{Service, Subtransport, SubtransportStream};
use crate::{GitUrl, TransportError};

const DUMMY_MESSAGE: &str = "This transport isn't implemented. Sorry";

/// Subtransport that refuses every action with the dummy error.
pub struct DummySubtransport;

impl Subtransport for DummySubtransport {
    fn action(
        &mut self,
        _url: &GitUrl,
        _service: Service,
    ) -> Result<Box<dyn SubtransportStream>, TransportError> {
        Err(TransportError::Unsupported(DUMMY_MESSAGE.to_string()))
    }

    fn rpc(&self) -> bool {
        false
    }
}
