//! Capability detection (L2).
//!
//! The server advertises its capabilities as a NUL-separated string appended
//! to the first ref line of the v0/v1 advertisement
//! (`<oid> HEAD\0multi_ack side-band-64k ofs-delta ...`). `CapabilitySet` is
//! a flat boolean record rather than a generic name/value map — grounded on
//! `git_smart__detect_caps` in `original_source/src/transport.h`'s companion,
//! which tests each capability string with a direct `strcmp` rather than
//! building an intermediate collection. The handful of capabilities that do
//! carry a value (`agent=`, `symref=`) are kept as their raw strings.

/// The fixed set of capabilities this fetch core inspects and negotiates.
/// Unknown/unrecognized capability tokens are ignored, not stored — this
/// core never needs to round-trip an advertisement it didn't ask to parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    /// Set whenever any recognized capability token matched during `parse`.
    pub common: bool,
    /// `multi_ack`: at least one common commit gets ACKed before the client
    /// sends `done`, instead of the server staying silent until negotiation
    /// ends. `multi_ack_detailed` is parsed as plain `multi_ack` — the
    /// detailed ACK distinction is out of scope.
    pub multi_ack: bool,
    /// `ofs-delta`: pack may use offset-deltas instead of only ref-deltas.
    pub ofs_delta: bool,
    /// `thin-pack`: server may send a pack with deltas against objects the
    /// client already has but that aren't in the pack itself.
    pub thin_pack: bool,
    /// `include-tag`: server annotates the pack with tags pointing at
    /// fetched commits even if the tag ref itself wasn't requested.
    pub include_tag: bool,
    /// `side-band`: demultiplexed pack/progress/error stream, 1000-byte
    /// packets.
    pub side_band: bool,
    /// `side-band-64k`: same demultiplexing, up to 65520-byte packets.
    /// Detected before `side-band` in the raw string since a server that
    /// advertises `side-band-64k` also historically advertises the plain
    /// `side-band` token as a prefix collision; `side_band_64k` must win.
    pub side_band_64k: bool,
    /// `no-done`: client may omit the final `done` line; server sends the
    /// pack as soon as it ACKs a common commit.
    pub no_done: bool,
    /// `no-progress`: client asked (or could ask) the server to suppress
    /// sideband-2 progress text.
    pub no_progress: bool,
    /// `agent=<value>`, if present.
    pub agent: Option<String>,
    /// `symref=<name>:<target>`, if present (only ever one in v0/v1: HEAD).
    pub symref: Option<String>,
}

impl CapabilitySet {
    /// Parse a NUL-separated (or plain space-separated) capability string
    /// from the first ref line of a v0/v1 advertisement.
    pub fn parse(raw: &[u8]) -> Self {
        let raw = String::from_utf8_lossy(raw);
        let mut set = CapabilitySet::default();

        for token in raw.split_whitespace() {
            // side-band-64k is checked before the side-band prefix match so a
            // server advertising both never loses 64k support to the plain
            // `side-band` branch matching first.
            if token == "side-band-64k" {
                set.side_band_64k = true;
            } else if token == "side-band" {
                set.side_band = true;
            } else if token == "multi_ack_detailed" || token == "multi_ack" {
                set.multi_ack = true;
            } else if token == "ofs-delta" {
                set.ofs_delta = true;
            } else if token == "thin-pack" {
                set.thin_pack = true;
            } else if token == "include-tag" {
                set.include_tag = true;
            } else if token == "no-done" {
                set.no_done = true;
            } else if token == "no-progress" {
                set.no_progress = true;
            } else if let Some(value) = token.strip_prefix("agent=") {
                set.agent = Some(value.to_string());
                set.common = true;
                continue;
            } else if let Some(value) = token.strip_prefix("symref=") {
                set.symref = Some(value.to_string());
                set.common = true;
                continue;
            } else {
                continue;
            }
            set.common = true;
        }

        set
    }

    /// Whether either side-band variant is active.
    pub fn any_side_band(&self) -> bool {
        self.side_band || self.side_band_64k
    }
}

/// Build the capability string the client appends to its first `want` line,
/// restricted to what the server actually advertised. Never requests
/// `multi_ack_detailed`: the detailed ACK extension is out of scope, so only
/// plain `multi_ack` is ever offered back, even if the server advertised the
/// detailed form.
pub fn negotiate_fetch_capabilities(server: &CapabilitySet) -> String {
    let mut wanted = Vec::new();

    if server.side_band_64k {
        wanted.push("side-band-64k".to_string());
    } else if server.side_band {
        wanted.push("side-band".to_string());
    }
    if server.multi_ack {
        wanted.push("multi_ack".to_string());
    }
    if server.ofs_delta {
        wanted.push("ofs-delta".to_string());
    }
    if server.thin_pack {
        wanted.push("thin-pack".to_string());
    }
    if server.include_tag {
        wanted.push("include-tag".to_string());
    }
    if server.no_done {
        wanted.push("no-done".to_string());
    }
    wanted.push("agent=gitr/0.1".to_string());

    wanted.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_boolean_capabilities() {
        let caps = CapabilitySet::parse(
            b"multi_ack thin-pack side-band side-band-64k ofs-delta include-tag no-done",
        );
        assert!(caps.common);
        assert!(caps.multi_ack);
        assert!(caps.thin_pack);
        assert!(caps.side_band);
        assert!(caps.side_band_64k);
        assert!(caps.ofs_delta);
        assert!(caps.include_tag);
        assert!(caps.no_done);
    }

    #[test]
    fn multi_ack_detailed_token_is_parsed_as_plain_multi_ack() {
        let caps = CapabilitySet::parse(b"multi_ack_detailed");
        assert!(caps.common);
        assert!(caps.multi_ack);
    }

    #[test]
    fn parses_value_capabilities() {
        let caps = CapabilitySet::parse(b"symref=HEAD:refs/heads/main agent=git/2.39.0");
        assert!(caps.common);
        assert_eq!(caps.symref.as_deref(), Some("HEAD:refs/heads/main"));
        assert_eq!(caps.agent.as_deref(), Some("git/2.39.0"));
    }

    #[test]
    fn side_band_64k_wins_over_plain_side_band_prefix_collision() {
        // A server token list containing both must not let the `side-band`
        // substring match clobber the 64k flag, regardless of token order.
        let caps = CapabilitySet::parse(b"side-band side-band-64k");
        assert!(caps.side_band);
        assert!(caps.side_band_64k);
        assert!(caps.any_side_band());
    }

    #[test]
    fn unknown_tokens_are_ignored() {
        let caps = CapabilitySet::parse(b"shallow deepen-since deepen-not deepen-relative");
        assert_eq!(caps, CapabilitySet::default());
        assert!(!caps.common);
    }

    #[test]
    fn negotiate_prefers_64k_and_never_requests_detailed() {
        let server = CapabilitySet::parse(
            b"multi_ack_detailed thin-pack side-band-64k side-band ofs-delta no-done include-tag",
        );
        let wanted = negotiate_fetch_capabilities(&server);
        assert!(wanted.contains("side-band-64k"));
        assert!(!wanted.contains("side-band "));
        assert!(wanted.contains("multi_ack"));
        assert!(!wanted.contains("multi_ack_detailed"));
        assert!(wanted.contains("ofs-delta"));
        assert!(wanted.contains("thin-pack"));
        assert!(wanted.contains("include-tag"));
        assert!(wanted.contains("no-done"));
        assert!(wanted.contains("agent=gitr/0.1"));
    }

    #[test]
    fn negotiate_omits_unadvertised_capabilities() {
        let server = CapabilitySet::parse(b"ofs-delta");
        let wanted = negotiate_fetch_capabilities(&server);
        assert_eq!(wanted, "ofs-delta agent=gitr/0.1");
    }
}
