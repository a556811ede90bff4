//! Side-band channel framing (L2).
//!
//! When `side-band`/`side-band-64k` is active, every non-flush packet during
//! the download phase carries a one-byte channel marker ahead of its
//! payload: 1 = pack data, 2 = progress text, 3 = a fatal error. The actual
//! read loop that drives this demultiplexing against a live stream lives in
//! `download.rs`, since it needs to interleave with pack-indexer writes and
//! cancellation checks; this module only owns the channel framing itself.

use crate::ProtocolError;

/// Side-band channel identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    /// Pack data (band 1).
    Data = 1,
    /// Progress messages, normally surfaced to the user (band 2).
    Progress = 2,
    /// Fatal error from the server (band 3).
    Error = 3,
}

/// Split a side-band-framed packet payload into its channel and data.
pub fn demux(data: &[u8]) -> Result<(Band, &[u8]), ProtocolError> {
    let (&marker, payload) = data
        .split_first()
        .ok_or_else(|| ProtocolError::Protocol("empty side-band packet".into()))?;
    let band = match marker {
        1 => Band::Data,
        2 => Band::Progress,
        3 => Band::Error,
        other => {
            return Err(ProtocolError::Protocol(format!(
                "unknown side-band channel: {other}"
            )))
        }
    };
    Ok((band, payload))
}

/// Write `data` with side-band framing, splitting into multiple packets if
/// it exceeds the per-packet payload limit (one byte less than
/// `MAX_PKT_DATA_LEN`, to leave room for the channel marker).
pub fn write_sideband_data(
    writer: &mut impl std::io::Write,
    band: Band,
    data: &[u8],
) -> Result<(), ProtocolError> {
    let max_chunk = crate::pktline::MAX_PKT_DATA_LEN - 1;

    for chunk in data.chunks(max_chunk.max(1)) {
        let mut pkt = Vec::with_capacity(1 + chunk.len());
        pkt.push(band as u8);
        pkt.extend_from_slice(chunk);
        crate::pktline::write_line(writer, &pkt)?;
    }
    if data.is_empty() {
        crate::pktline::write_line(writer, &[band as u8])?;
    }

    Ok(())
}
