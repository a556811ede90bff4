//! Fetch negotiation (L3): the want/have/ACK exchange that finds a common
//! base between the client and server before the server sends a pack.
//!
//! Grounded on `git_smart__negotiate_fetch` (named in
//! `original_source/src/transport.h`'s companion smart-protocol source): the
//! `multi_ack`/`multi_ack_detailed` state machine, the every-20-haves flush
//! cadence, and the stateless-carrier re-prefix rule all mirror that
//! function's structure, re-expressed without its manual buffer bookkeeping.

use std::sync::atomic::{AtomicBool, Ordering};

use git_hash::ObjectId;
use git_ref::{RefName, RefStore};
use git_repository::Repository;
use git_revwalk::{RevWalk, SortOrder};
use git_transport::subtransport::SubtransportStream;

use crate::buffer::RecvBuffer;
use crate::capability::{negotiate_fetch_capabilities, CapabilitySet};
use crate::pktline::{self, AckStatus, Pkt};
use crate::ProtocolError;

/// How many `have` lines accumulate before a flush + read-ACK round-trip.
const HAVES_PER_FLUSH: usize = 20;

/// Outcome of a negotiation round.
#[derive(Debug, Clone, Default)]
pub struct NegotiateOutcome {
    /// Commits the server ACKed as common, in the order it sent them.
    pub common: Vec<ObjectId>,
    /// True if the server indicated it will send a pack (ACK or NAK
    /// reached); false only if negotiation aborted without either.
    pub ready: bool,
}

/// Run full want/have negotiation over an already-open stream.
///
/// `wants` is the list of (oid, first-line capability string already
/// resolved) pairs; only the first entry's capability string is sent, per
/// protocol. `rpc` selects the re-prefixing discipline for stateless
/// carriers (SPEC_FULL.md §4.4 step 3).
pub fn negotiate_fetch(
    stream: &mut dyn SubtransportStream,
    recv: &mut RecvBuffer,
    rpc: bool,
    wants: &[ObjectId],
    repo: &Repository,
    server_caps: &CapabilitySet,
    cancelled: &AtomicBool,
) -> Result<NegotiateOutcome, ProtocolError> {
    if wants.is_empty() {
        return Ok(NegotiateOutcome::default());
    }

    let client_caps = negotiate_fetch_capabilities(server_caps);
    write_wants(stream, wants, &client_caps)?;

    let mut common = Vec::new();
    let mut all_haves_sent: Vec<ObjectId> = Vec::new();
    let mut buffered_haves: Vec<ObjectId> = Vec::new();
    let mut first_burst = true;

    let mut walk = RevWalk::new(repo)?;
    walk.set_sort(SortOrder::Chronological);
    for name in local_tip_names(repo)? {
        if let Some(oid) = repo.refs().resolve_to_oid(&name)? {
            walk.push(oid)?;
        }
    }

    let mut walk_exhausted = false;
    'negotiation: loop {
        match walk.next() {
            Some(item) => buffered_haves.push(item?),
            None => walk_exhausted = true,
        }

        // Only a full 20-have batch gets its own flush + ACK-read round-trip.
        // A leftover batch smaller than that when the walk runs dry is never
        // flushed separately — it rides along into the `done` send below.
        if buffered_haves.len() < HAVES_PER_FLUSH {
            if walk_exhausted {
                break;
            }
            continue;
        }

        if cancelled.load(Ordering::SeqCst) {
            return Err(ProtocolError::UserAbort);
        }

        // Stateless carriers have no memory of prior bursts: every burst
        // after the first must re-prefix the full want+have history.
        if rpc && !first_burst {
            write_wants(stream, wants, &client_caps)?;
            for oid in &all_haves_sent {
                write_have(stream, *oid)?;
            }
        }
        first_burst = false;

        for oid in &buffered_haves {
            write_have(stream, *oid)?;
        }
        all_haves_sent.append(&mut buffered_haves.clone());
        pktline::write_flush(stream)?;
        stream.flush()?;

        if server_caps.multi_ack {
            let found_common = drain_acks(stream, recv, &mut common)?;
            buffered_haves.clear();
            if found_common {
                break 'negotiation;
            }
        } else {
            match pktline::read_pkt(recv, stream)? {
                Pkt::Ack { oid, .. } => {
                    common.push(oid);
                    buffered_haves.clear();
                    break 'negotiation;
                }
                Pkt::Nak => {
                    buffered_haves.clear();
                }
                Pkt::Err(text) => {
                    return Err(ProtocolError::ServerError(String::from_utf8_lossy(&text).to_string()))
                }
                other => {
                    return Err(ProtocolError::Protocol(format!(
                        "unexpected frame during negotiation: {other:?}"
                    )))
                }
            }
        }

        if walk_exhausted {
            break;
        }
    }

    if rpc && !common.is_empty() {
        write_wants(stream, wants, &client_caps)?;
        for oid in &common {
            write_have(stream, *oid)?;
        }
    }

    // Any straggler haves left over from a final sub-20 batch ride along
    // unsent until now, bundled into the same burst as `done`.
    for oid in &buffered_haves {
        write_have(stream, *oid)?;
    }

    if cancelled.load(Ordering::SeqCst) {
        return Err(ProtocolError::UserAbort);
    }
    pktline::write_text(stream, "done")?;
    stream.flush()?;

    let ready = drain_final(stream, recv, server_caps, &mut common)?;

    Ok(NegotiateOutcome { common, ready })
}

fn write_wants(
    stream: &mut dyn SubtransportStream,
    wants: &[ObjectId],
    client_caps: &str,
) -> Result<(), ProtocolError> {
    for (i, want) in wants.iter().enumerate() {
        if i == 0 && !client_caps.is_empty() {
            pktline::write_text(stream, &format!("want {want} {client_caps}"))?;
        } else {
            pktline::write_text(stream, &format!("want {want}"))?;
        }
    }
    pktline::write_flush(stream)?;
    Ok(())
}

fn write_have(stream: &mut dyn SubtransportStream, oid: ObjectId) -> Result<(), ProtocolError> {
    pktline::write_text(stream, &format!("have {oid}"))
}

/// Drain ACK lines after a `multi_ack`/`multi_ack_detailed` burst. Returns
/// true once a common base confirmed as `ready` (or a bare ACK under plain
/// `multi_ack`) has been seen.
fn drain_acks(
    stream: &mut dyn SubtransportStream,
    recv: &mut RecvBuffer,
    common: &mut Vec<ObjectId>,
) -> Result<bool, ProtocolError> {
    loop {
        match pktline::read_pkt(recv, stream)? {
            Pkt::Ack { oid, status } => {
                common.push(oid);
                match status {
                    AckStatus::Continue | AckStatus::Common => continue,
                    AckStatus::Ready => return Ok(true),
                }
            }
            Pkt::Nak => return Ok(false),
            Pkt::Flush => return Ok(false),
            Pkt::Err(text) => {
                return Err(ProtocolError::ServerError(String::from_utf8_lossy(&text).to_string()))
            }
            other => {
                return Err(ProtocolError::Protocol(format!(
                    "unexpected frame while draining ACKs: {other:?}"
                )))
            }
        }
    }
}

/// Drain the final ACK/NAK after `done`, per SPEC_FULL.md §4.4 step 7.
fn drain_final(
    stream: &mut dyn SubtransportStream,
    recv: &mut RecvBuffer,
    server_caps: &CapabilitySet,
    common: &mut Vec<ObjectId>,
) -> Result<bool, ProtocolError> {
    if !server_caps.multi_ack {
        return match pktline::read_pkt(recv, stream)? {
            Pkt::Ack { oid, .. } => {
                common.push(oid);
                Ok(true)
            }
            Pkt::Nak => Ok(true),
            Pkt::Err(text) => {
                Err(ProtocolError::ServerError(String::from_utf8_lossy(&text).to_string()))
            }
            other => Err(ProtocolError::Protocol(format!(
                "expected ACK or NAK after done, got {other:?}"
            ))),
        };
    }

    loop {
        match pktline::read_pkt(recv, stream)? {
            Pkt::Ack { oid, status } => {
                common.push(oid);
                if !matches!(status, AckStatus::Continue) {
                    return Ok(true);
                }
            }
            Pkt::Nak => return Ok(true),
            Pkt::Err(text) => {
                return Err(ProtocolError::ServerError(String::from_utf8_lossy(&text).to_string()))
            }
            other => {
                return Err(ProtocolError::Protocol(format!(
                    "unexpected frame while draining final ACK: {other:?}"
                )))
            }
        }
    }
}

/// Enumerate local ref names usable as negotiation tips: non-symbolic,
/// outside `refs/tags/`.
fn local_tip_names(repo: &Repository) -> Result<Vec<RefName>, ProtocolError> {
    let mut names = Vec::new();
    for entry in repo.refs().iter(None)? {
        let reference = entry?;
        if reference.is_symbolic() {
            continue;
        }
        if reference.name().as_str().starts_with("refs/tags/") {
            continue;
        }
        names.push(reference.name().clone());
    }
    Ok(names)
}
