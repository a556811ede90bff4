//! Transport dispatch (L4): URL → transport factory lookup.
//!
//! Mirrors `transport_find_fn` from libgit2's `transport.c`: an ordered table
//! of scheme descriptors, each carrying a priority. Highest priority wins; at
//! equal priority the *last* matching table entry wins, because the original
//! scan keeps overwriting its candidate on every `>=` comparison rather than
//! stopping at the first hit. When nothing in the table matches, fall back to
//! a local-directory check, then an SSH-looking-colon heuristic.

use std::path::Path;

use crate::GitUrl;

/// Which concrete transport a dispatch match resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Smart transport over a persistent subtransport (git://).
    SmartGit,
    /// Smart transport over a stateless/RPC subtransport (http(s)://).
    SmartHttp,
    /// Local transport (file:// or bare local path).
    Local,
    /// Dummy transport: URL looks plausible but isn't implemented (SSH).
    Dummy,
}

struct Descriptor {
    prefix: &'static str,
    priority: u32,
    kind: TransportKind,
}

/// The process-wide dispatch table. Order matters only for the last-match
/// tie-break at equal priority; within that constraint it mirrors the table
/// in `transport.c` (git first, then http/https, then file, then the ssh
/// aliases that resolve to dummy).
const TABLE: &[Descriptor] = &[
    Descriptor { prefix: "git://", priority: 1, kind: TransportKind::SmartGit },
    Descriptor { prefix: "http://", priority: 1, kind: TransportKind::SmartHttp },
    Descriptor { prefix: "https://", priority: 1, kind: TransportKind::SmartHttp },
    Descriptor { prefix: "file://", priority: 1, kind: TransportKind::Local },
    Descriptor { prefix: "git+ssh://", priority: 1, kind: TransportKind::Dummy },
    Descriptor { prefix: "ssh+git://", priority: 1, kind: TransportKind::Dummy },
];

/// Resolve a URL to a transport kind, or `None` if no factory applies
/// (`UnsupportedScheme` at the caller).
pub fn find_transport(url: &str) -> Option<TransportKind> {
    let lower = url.to_ascii_lowercase();

    let mut best: Option<(u32, TransportKind)> = None;
    for d in TABLE {
        if lower.starts_with(d.prefix) {
            let replace = match best {
                None => true,
                // last-match-wins at equal-or-higher priority
                Some((p, _)) => d.priority >= p,
            };
            if replace {
                best = Some((d.priority, d.kind));
            }
        }
    }
    if let Some((_, kind)) = best {
        return Some(kind);
    }

    // No scheme prefix matched. Local-directory check runs before the colon
    // heuristic: a colon-bearing path that also exists locally resolves to
    // `Local`, not `Dummy` (see SPEC_FULL.md §9).
    if Path::new(url).is_dir() {
        return Some(TransportKind::Local);
    }
    if url.contains(':') {
        return Some(TransportKind::Dummy);
    }
    None
}

/// True iff a factory can be found for `url` (regardless of whether it is
/// the dummy factory).
pub fn valid_url(url: &str) -> bool {
    find_transport(url).is_some()
}

/// True iff a factory can be found for `url` *and* it is not the dummy
/// factory.
pub fn supported_url(url: &str) -> bool {
    !matches!(find_transport(url), None | Some(TransportKind::Dummy))
}

/// Parse convenience: resolve a `GitUrl`'s original string form.
pub fn find_transport_for(url: &GitUrl) -> Option<TransportKind> {
    find_transport(&url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_scheme_resolves_smart_git() {
        assert_eq!(find_transport("git://example.com/repo.git"), Some(TransportKind::SmartGit));
    }

    #[test]
    fn https_resolves_smart_http() {
        assert_eq!(find_transport("https://example.com/repo.git"), Some(TransportKind::SmartHttp));
    }

    #[test]
    fn file_scheme_resolves_local() {
        assert_eq!(find_transport("file:///tmp/repo.git"), Some(TransportKind::Local));
    }

    #[test]
    fn ssh_alias_resolves_dummy() {
        assert_eq!(find_transport("git+ssh://example.com/repo.git"), Some(TransportKind::Dummy));
        assert_eq!(find_transport("ssh+git://example.com/repo.git"), Some(TransportKind::Dummy));
    }

    #[test]
    fn existing_local_dir_wins_over_colon_heuristic() {
        let dir = tempfile::tempdir().unwrap();
        // A path that also happens to contain a colon still resolves local
        // if it is a real directory.
        let path = dir.path().to_str().unwrap().to_string();
        assert_eq!(find_transport(&path), Some(TransportKind::Local));
    }

    #[test]
    fn scp_like_colon_heuristic_falls_back_to_dummy() {
        assert_eq!(find_transport("git@example.com:user/repo.git"), Some(TransportKind::Dummy));
    }

    #[test]
    fn unrecognized_scheme_with_no_colon_is_unsupported() {
        assert_eq!(find_transport("definitely-not-a-path-or-url"), None);
    }

    #[test]
    fn valid_and_supported_predicates() {
        assert!(valid_url("git+ssh://example.com/repo.git"));
        assert!(!supported_url("git+ssh://example.com/repo.git"));
        assert!(valid_url("git://example.com/repo.git"));
        assert!(supported_url("git://example.com/repo.git"));
    }

    #[test]
    fn equal_priority_last_match_wins() {
        // Reproduce the tie-break rule directly: two descriptors with the
        // same prefix and the same priority, the later one must win.
        struct D { priority: u32, kind: TransportKind }
        let table = [
            D { priority: 1, kind: TransportKind::Local },
            D { priority: 1, kind: TransportKind::SmartGit },
        ];
        let mut best: Option<(u32, TransportKind)> = None;
        for d in &table {
            let replace = match best {
                None => true,
                Some((p, _)) => d.priority >= p,
            };
            if replace {
                best = Some((d.priority, d.kind));
            }
        }
        assert_eq!(best.map(|(_, k)| k), Some(TransportKind::SmartGit));
    }
}
