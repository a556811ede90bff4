//! Pkt-line framing (L2): parse and emit the length-prefixed packets that
//! carry every smart-protocol message.
//!
//! Each packet is prefixed with a 4-hex-digit length (including the 4 bytes
//! of the length field itself). `0000` is the flush packet. `parse_line`
//! never reads from a stream itself — it operates on whatever bytes are
//! already pending in a `RecvBuffer` and reports `PktError::BufferShort`
//! when there isn't a complete packet yet, so the caller can `fill` and
//! retry. This mirrors `recv_pkt`'s `GIT_EBUFS` split in
//! `original_source/src/transport.h`'s smart-protocol companion, where a
//! short buffer is a recoverable "read more" signal, not a protocol error.

use std::io::{Read, Write};

use git_hash::ObjectId;

use crate::buffer::RecvBuffer;
use crate::ProtocolError;

/// Maximum data per packet, per SPEC_FULL.md §3 (65524 total line length
/// including the 4-byte header).
pub const MAX_PKT_DATA_LEN: usize = 65520;

/// Maximum packet length including the 4-byte header.
pub const MAX_PKT_LEN: usize = 65524;

/// One parsed pkt-line payload, decoded as far as this layer understands.
/// Higher-level parsing (e.g. distinguishing a ref line from a have line)
/// happens in `smart.rs`/`negotiate.rs`; this enum only recognizes the
/// shapes that are universal across the sections of the v0/v1 exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pkt {
    /// Flush packet (`0000`) — end of a section.
    Flush,
    /// A ref advertised during reference discovery, with the first line's
    /// NUL-separated capability string attached if present.
    Ref {
        oid: ObjectId,
        name: Vec<u8>,
        capabilities: Option<Vec<u8>>,
    },
    /// `ACK <oid> [continue|common|ready]` or bare `ACK <oid>`.
    Ack { oid: ObjectId, status: AckStatus },
    /// `NAK\n`.
    Nak,
    /// Raw pack/data bytes (post-negotiation, non-side-band stream).
    Data(Vec<u8>),
    /// Side-band-demultiplexed progress text (channel 2).
    Progress(Vec<u8>),
    /// Side-band-demultiplexed error text (channel 3) — fatal.
    Err(Vec<u8>),
    /// A comment/unrecognized text line carried verbatim (e.g. shallow info).
    Comment(Vec<u8>),
}

/// ACK status suffix, per the `multi_ack`/`multi_ack_detailed` capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    /// Bare ACK: negotiation is done, server will send the pack.
    Ready,
    /// `multi_ack` continue: common commit found, negotiation continues.
    Continue,
    /// `multi_ack_detailed` common: common commit found, no pack yet.
    Common,
}

/// Recoverable-vs-hard parse outcome for one pkt-line.
#[derive(Debug, thiserror::Error)]
pub enum PktError {
    /// Not enough bytes pending yet; fill the buffer and retry. Carries the
    /// minimum additional byte count known to be needed, when known.
    #[error("incomplete pkt-line, need more data")]
    BufferShort,

    #[error("malformed pkt-line: {0}")]
    Malformed(String),
}

/// Parse one pkt-line out of `buf`, returning the decoded packet and the
/// number of bytes consumed. Does not distinguish `Data`/`Progress`/`Err` —
/// that demultiplexing happens in `sideband.rs` for sections where
/// `side-band`/`side-band-64k` is active; outside of those sections, a
/// non-flush packet in the download phase is always `Data`.
pub fn parse_line(buf: &[u8]) -> Result<(Pkt, usize), PktError> {
    if buf.len() < 4 {
        return Err(PktError::BufferShort);
    }
    let len_str = std::str::from_utf8(&buf[..4])
        .map_err(|_| PktError::Malformed(format!("non-hex pkt-line length bytes: {:?}", &buf[..4])))?;
    let len = u16::from_str_radix(len_str, 16)
        .map_err(|_| PktError::Malformed(format!("invalid pkt-line length: {len_str:?}")))? as usize;

    if len == 0 {
        return Ok((Pkt::Flush, 4));
    }
    if len < 4 {
        return Err(PktError::Malformed(format!(
            "pkt-line length {len} is invalid (minimum is 4)"
        )));
    }
    if len > MAX_PKT_LEN {
        return Err(PktError::Malformed(format!("pkt-line too long: {len} bytes")));
    }
    if buf.len() < len {
        return Err(PktError::BufferShort);
    }

    let data = &buf[4..len];
    Ok((classify(data), len))
}

/// Parse a ref-advertisement data line specifically (used during `ls`),
/// splitting the optional NUL-separated capability string off the first
/// advertised ref.
fn classify(data: &[u8]) -> Pkt {
    let line = data.strip_suffix(b"\n").unwrap_or(data);

    if let Some(rest) = line.strip_prefix(b"ACK ") {
        if let Some(parsed) = parse_ack(rest) {
            return parsed;
        }
    }
    if line == b"NAK" {
        return Pkt::Nak;
    }
    if let Some(text) = line.strip_prefix(b"ERR ") {
        return Pkt::Err(text.to_vec());
    }
    if let Some((oid_hex, name_and_caps)) = split_once_space(line) {
        if let Ok(oid) = parse_oid_hex(oid_hex) {
            let (name, capabilities) = match name_and_caps.iter().position(|&b| b == 0) {
                Some(nul) => (name_and_caps[..nul].to_vec(), Some(name_and_caps[nul + 1..].to_vec())),
                None => (name_and_caps.to_vec(), None),
            };
            return Pkt::Ref { oid, name, capabilities };
        }
    }

    Pkt::Comment(line.to_vec())
}

fn parse_ack(rest: &[u8]) -> Option<Pkt> {
    let (oid_hex, suffix) = match split_once_space(rest) {
        Some((oid, s)) => (oid, Some(s)),
        None => (rest, None),
    };
    let oid = parse_oid_hex(oid_hex).ok()?;
    let status = match suffix {
        None => AckStatus::Ready,
        Some(b"continue") => AckStatus::Continue,
        Some(b"common") => AckStatus::Common,
        Some(b"ready") => AckStatus::Ready,
        Some(_) => AckStatus::Ready,
    };
    Some(Pkt::Ack { oid, status })
}

fn split_once_space(line: &[u8]) -> Option<(&[u8], &[u8])> {
    let pos = line.iter().position(|&b| b == b' ')?;
    Some((&line[..pos], &line[pos + 1..]))
}

fn parse_oid_hex(hex: &[u8]) -> Result<ObjectId, ()> {
    let s = std::str::from_utf8(hex).map_err(|_| ())?;
    ObjectId::from_hex(s).map_err(|_| ())
}

/// Write a data packet (non-flush), splitting into multiple pkt-lines if
/// `data` exceeds `MAX_PKT_DATA_LEN`. Rarely needed on the client side of a
/// fetch, kept for negotiation lines which are always small in practice.
pub fn write_line(writer: &mut impl Write, data: &[u8]) -> Result<(), ProtocolError> {
    if data.len() > MAX_PKT_DATA_LEN {
        return Err(ProtocolError::InvalidPktLine(format!(
            "data too long for pkt-line: {} bytes (max {})",
            data.len(),
            MAX_PKT_DATA_LEN
        )));
    }
    let len = data.len() + 4;
    write!(writer, "{len:04x}")?;
    writer.write_all(data)?;
    Ok(())
}

/// Write a text line (appends `\n` if not already present).
pub fn write_text(writer: &mut impl Write, text: &str) -> Result<(), ProtocolError> {
    if text.ends_with('\n') {
        write_line(writer, text.as_bytes())
    } else {
        let mut data = text.as_bytes().to_vec();
        data.push(b'\n');
        write_line(writer, &data)
    }
}

/// Write a flush packet (`0000`).
pub fn write_flush(writer: &mut impl Write) -> Result<(), ProtocolError> {
    writer.write_all(b"0000")?;
    Ok(())
}

/// Read exactly one pkt-line off `reader`, refilling `buf` as needed.
///
/// This is the glue between the offset-based `parse_line` and a live stream:
/// it retries on `PktError::BufferShort` by pulling more bytes, and
/// surfaces a hard `Protocol` error (rather than a panic) on early EOF or
/// malformed framing.
pub fn read_pkt(buf: &mut RecvBuffer, reader: &mut impl Read) -> Result<Pkt, ProtocolError> {
    loop {
        match parse_line(buf.pending()) {
            Ok((pkt, consumed)) => {
                buf.consume(consumed);
                return Ok(pkt);
            }
            Err(PktError::BufferShort) => {
                if buf.fill(reader)? == 0 {
                    return Err(ProtocolError::Protocol(
                        "early EOF while reading pkt-line".into(),
                    ));
                }
            }
            Err(PktError::Malformed(msg)) => return Err(ProtocolError::InvalidPktLine(msg)),
        }
    }
}
