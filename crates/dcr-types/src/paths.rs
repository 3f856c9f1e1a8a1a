//! Identifier resolution and hashed repository paths.
//!
//! Canonical path grammar:
//!
//! ```text
//! /qualifier/{2-hex}/{2-hex}/{2-hex}/{2-hex}/id[/componentPath]
//! ```
//!
//! The four fan-out segments are the leading hex characters of the id,
//! bounding the number of children of any one repository container.
//! Reserved ids (and ids without a hex prefix) skip the fan-out.
//!
//! Compact grammar: `[qualifier/]id[/componentPath]`, qualifier defaulting
//! to `content`, with an optional `uuid:` prefix on the id.

use crate::pid::{is_valid_id, normalize_component, Pid, Qualifier, RESERVED_IDS};

/// Number of fan-out segments in a hashed path.
pub const HASHED_PATH_DEPTH: usize = 4;

/// Characters per fan-out segment.
pub const HASHED_PATH_SIZE: usize = 2;

/// Sub-resource holding the RDF description of a binary.
pub const METADATA_SEGMENT: &str = "fcr:metadata";

/// Prefix of the path segment that scopes a URI inside a transaction.
pub const TX_SEGMENT_PREFIX: &str = "tx:";

const UUID_PREFIX: &str = "uuid:";

/// Build the canonical repository path for the given parts.
///
/// Pure and deterministic: identical inputs always produce identical paths.
pub fn derive_path(qualifier: Qualifier, id: &str, component_path: Option<&str>) -> String {
    let mut path = String::with_capacity(
        qualifier.as_str().len() + id.len() + HASHED_PATH_DEPTH * (HASHED_PATH_SIZE + 1) + 8,
    );
    path.push('/');
    path.push_str(qualifier.as_str());
    if let Some(segments) = hashed_segments(id) {
        for segment in segments {
            path.push('/');
            path.push_str(segment);
        }
    }
    path.push('/');
    path.push_str(id);
    if let Some(component) = component_path {
        let component = component.trim_matches('/');
        if !component.is_empty() {
            path.push('/');
            path.push_str(component);
        }
    }
    path
}

/// Fan-out segments for an id, or `None` when the id is not hashed.
fn hashed_segments(id: &str) -> Option<Vec<&str>> {
    let prefix_len = HASHED_PATH_DEPTH * HASHED_PATH_SIZE;
    if RESERVED_IDS.contains(&id) || id.len() < prefix_len {
        return None;
    }
    let prefix = &id[..prefix_len];
    if !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some(
        (0..HASHED_PATH_DEPTH)
            .map(|i| &prefix[i * HASHED_PATH_SIZE..(i + 1) * HASHED_PATH_SIZE])
            .collect(),
    )
}

fn is_hash_segment(segment: &str) -> bool {
    segment.len() == HASHED_PATH_SIZE && segment.bytes().all(|b| b.is_ascii_hexdigit())
}

/// True iff `b`'s path starts with `a`'s path and the paths differ.
///
/// This is a raw string-prefix test with no separator anchoring, so an id
/// that is a textual prefix of a sibling id also matches. Callers relying
/// on strict ancestry must compare path segments themselves.
pub fn is_proper_descendant(a: &Pid, b: &Pid) -> bool {
    b.repository_path().starts_with(a.repository_path())
        && a.repository_path() != b.repository_path()
}

/// Parse a canonical repository path (leading `/`, no base URI).
///
/// A leading transaction segment and a trailing `fcr:metadata` segment are
/// ignored, so transaction-scoped and metadata addresses resolve to the
/// same PID as the resource itself.
pub(crate) fn parse_repository_path(path: &str) -> Option<Pid> {
    let mut segments: Vec<&str> = path.split('/').skip(1).collect();
    if segments.last() == Some(&"") {
        segments.pop();
    }
    if segments.last() == Some(&METADATA_SEGMENT) {
        segments.pop();
    }
    if segments
        .first()
        .is_some_and(|s| s.starts_with(TX_SEGMENT_PREFIX))
    {
        segments.remove(0);
    }
    let (first, rest) = segments.split_first()?;
    let qualifier = Qualifier::parse(first)?;
    if rest.is_empty() {
        return None;
    }

    let (id, tail) = if rest.len() > HASHED_PATH_DEPTH
        && rest[..HASHED_PATH_DEPTH].iter().all(|s| is_hash_segment(s))
    {
        let id = rest[HASHED_PATH_DEPTH];
        if !id.starts_with(&rest[..HASHED_PATH_DEPTH].concat()) {
            return None;
        }
        (id, &rest[HASHED_PATH_DEPTH + 1..])
    } else {
        let id = rest[0];
        // A hashable id must carry its fan-out segments.
        if hashed_segments(id).is_some() {
            return None;
        }
        (id, &rest[1..])
    };
    build(qualifier, id, tail)
}

/// Parse the compact grammar `[qualifier/]id[/componentPath]`.
pub(crate) fn parse_compact(value: &str) -> Option<Pid> {
    let value = value.trim().trim_end_matches('/');
    let segments: Vec<&str> = value.split('/').collect();
    let (qualifier, rest) = match Qualifier::parse(segments[0]) {
        Some(q) if segments.len() > 1 => (q, &segments[1..]),
        _ => (Qualifier::Content, &segments[..]),
    };
    let (id, tail) = rest.split_first()?;
    let id = id.strip_prefix(UUID_PREFIX).unwrap_or(id);
    build(qualifier, id, tail)
}

fn build(qualifier: Qualifier, id: &str, tail: &[&str]) -> Option<Pid> {
    if !is_valid_id(id) {
        return None;
    }
    let component = if tail.is_empty() {
        None
    } else {
        Some(normalize_component(&tail.join("/"))?)
    };
    Some(Pid::from_parts(qualifier, id.to_string(), component))
}

/// Resolve a repository path or compact id without a base URI.
pub(crate) fn resolve_local(value: &str) -> Option<Pid> {
    if value.starts_with('/') {
        parse_repository_path(value)
    } else if value.contains("://") {
        None
    } else {
        parse_compact(value)
    }
}

/// Resolves identifiers against a repository base URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PidResolver {
    base_uri: String,
}

impl PidResolver {
    pub fn new(base_uri: impl Into<String>) -> Self {
        let base_uri: String = base_uri.into();
        Self {
            base_uri: base_uri.trim_end_matches('/').to_string(),
        }
    }

    /// Base URI without a trailing slash.
    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    /// Resolve a full URI, a repository path, or a compact id.
    ///
    /// Malformed input yields `None` rather than an error. URIs under a
    /// different base are treated as malformed.
    pub fn resolve(&self, value: &str) -> Option<Pid> {
        let value = value.trim();
        if let Some(path) = value.strip_prefix(&self.base_uri) {
            if path.starts_with('/') {
                return parse_repository_path(path);
            }
            return None;
        }
        resolve_local(value)
    }

    /// Full URI for a PID under this resolver's base.
    pub fn uri(&self, pid: &Pid) -> String {
        pid.uri(&self.base_uri)
    }

    /// Metadata address for a PID under this resolver's base.
    pub fn metadata_uri(&self, pid: &Pid) -> String {
        pid.metadata_uri(&self.base_uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BASE: &str = "http://localhost:8080/rest";
    const ID: &str = "abcdef01-2345-6789-abcd-ef0123456789";

    fn resolver() -> PidResolver {
        PidResolver::new(format!("{BASE}/"))
    }

    #[test]
    fn derive_path_splits_leading_hex() {
        let path = derive_path(Qualifier::Deposit, ID, Some("manifest0"));
        assert_eq!(path, format!("/deposits/ab/cd/ef/01/{ID}/manifest0"));
    }

    #[test]
    fn derive_path_skips_non_hex_prefix() {
        assert_eq!(derive_path(Qualifier::Content, "collections", None), "/content/collections");
        assert_eq!(derive_path(Qualifier::Agent, "zzzzzzzz-x", None), "/agents/zzzzzzzz-x");
    }

    #[test]
    fn resolves_compact_forms() {
        let r = resolver();
        let plain = r.resolve(ID).unwrap();
        assert_eq!(plain.qualifier(), Qualifier::Content);
        assert_eq!(plain.id(), ID);

        let prefixed = r.resolve(&format!("uuid:{ID}")).unwrap();
        assert_eq!(prefixed, plain);

        let deposit = r.resolve(&format!("deposits/{ID}")).unwrap();
        assert_eq!(deposit.qualifier(), Qualifier::Deposit);

        let component = r.resolve(&format!("content/{ID}/datafs/original_file")).unwrap();
        assert_eq!(component.component_path(), Some("datafs/original_file"));
    }

    #[test]
    fn resolves_full_uri() {
        let r = resolver();
        let uri = format!("{BASE}/content/ab/cd/ef/01/{ID}/datafs/original_file");
        let pid = r.resolve(&uri).unwrap();
        assert_eq!(pid.id(), ID);
        assert_eq!(pid.component_path(), Some("datafs/original_file"));
        assert_eq!(r.uri(&pid), uri);
    }

    #[test]
    fn resolves_metadata_and_transaction_uris() {
        let r = resolver();
        let canonical = r.resolve(ID).unwrap().component("datafs/original_file").unwrap();

        let metadata = r.metadata_uri(&canonical);
        assert_eq!(r.resolve(&metadata).unwrap(), canonical);

        let tx_scoped = format!("{BASE}/tx:8e2f{}", canonical.repository_path());
        assert_eq!(r.resolve(&tx_scoped).unwrap(), canonical);
    }

    #[test]
    fn resolves_reserved_root() {
        let r = resolver();
        let root = r.resolve(&format!("{BASE}/content/collections")).unwrap();
        assert_eq!(root, Pid::content_root());
        assert_eq!(r.resolve("collections").unwrap(), Pid::content_root());
    }

    #[test]
    fn malformed_input_is_soft_failure() {
        let r = resolver();
        assert!(r.resolve("").is_none());
        assert!(r.resolve("not-an-id").is_none());
        assert!(r.resolve("http://elsewhere.org/content/collections").is_none());
        assert!(r.resolve(&format!("{BASE}/bogus/{ID}")).is_none());
        // Fan-out that disagrees with the id.
        assert!(r.resolve(&format!("{BASE}/content/ff/cd/ef/01/{ID}")).is_none());
        // Hashable id without its fan-out.
        assert!(r.resolve(&format!("{BASE}/content/{ID}")).is_none());
        assert!(r.resolve(&format!("{BASE}/content")).is_none());
        assert!(r.resolve(&format!("{BASE}x/content/collections")).is_none());
    }

    #[test]
    fn proper_descendant_requires_distinct_paths() {
        let parent = resolver().resolve(ID).unwrap();
        let child = parent.component("datafs").unwrap();
        assert!(is_proper_descendant(&parent, &child));
        assert!(!is_proper_descendant(&child, &parent));
        assert!(!is_proper_descendant(&parent, &parent));
    }

    #[test]
    fn proper_descendant_matches_textual_prefix_of_sibling() {
        // Separator anchoring is absent: a component named "data" is
        // considered an ancestor of a sibling named "datafs".
        let object = resolver().resolve(ID).unwrap();
        let data = object.component("data").unwrap();
        let datafs = object.component("datafs").unwrap();
        assert!(is_proper_descendant(&data, &datafs));
    }

    fn arb_pid() -> impl Strategy<Value = Pid> {
        (
            any::<u128>(),
            prop::sample::select(Qualifier::ALL.to_vec()),
            prop::option::of("[a-z_]{1,8}(/[a-z0-9_]{1,8}){0,2}"),
        )
            .prop_map(|(raw, qualifier, component)| {
                let id = uuid::Uuid::from_u128(raw).to_string();
                Pid::new(qualifier, &id, component.as_deref()).unwrap()
            })
    }

    proptest! {
        #[test]
        fn path_roundtrip(pid in arb_pid()) {
            let r = resolver();
            let from_compact = r.resolve(&pid.to_compact()).unwrap();
            let from_path = r.resolve(from_compact.repository_path()).unwrap();
            let from_uri = r.resolve(&r.uri(&from_path)).unwrap();
            prop_assert_eq!(&from_compact, &pid);
            prop_assert_eq!(&from_path, &pid);
            prop_assert_eq!(&from_uri, &pid);
        }

        #[test]
        fn path_is_deterministic(pid in arb_pid()) {
            let again = derive_path(pid.qualifier(), pid.id(), pid.component_path());
            prop_assert_eq!(again.as_str(), pid.repository_path());
        }

        #[test]
        fn distinct_prefixes_never_collide(a in any::<u128>(), b in any::<u128>()) {
            let a = uuid::Uuid::from_u128(a).to_string();
            let b = uuid::Uuid::from_u128(b).to_string();
            prop_assume!(a[..8] != b[..8]);
            let pa = derive_path(Qualifier::Content, &a, None);
            let pb = derive_path(Qualifier::Content, &b, None);
            prop_assert_ne!(&pa[..20], &pb[..20]);
        }
    }
}
