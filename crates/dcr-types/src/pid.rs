use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RepositoryError, RepositoryResult};
use crate::paths;

/// Id of the content root object. Reserved ids are never hashed.
pub const CONTENT_ROOT_ID: &str = "collections";

/// Ids that live directly under their qualifier without path fan-out.
pub const RESERVED_IDS: &[&str] = &[CONTENT_ROOT_ID];

/// Namespace segment separating object categories in the repository.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Qualifier {
    /// Content objects: the containment hierarchy and its binaries.
    Content,
    /// Deposit records and their manifests.
    Deposit,
    /// Agents (people and software) referenced by provenance events.
    Agent,
}

impl Qualifier {
    pub const ALL: [Qualifier; 3] = [Qualifier::Content, Qualifier::Deposit, Qualifier::Agent];

    /// Path segment for this qualifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Deposit => "deposits",
            Self::Agent => "agents",
        }
    }

    /// Parse a path segment. Returns `None` for unknown qualifiers.
    pub fn parse(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|q| q.as_str() == segment)
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Qualifier {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| RepositoryError::InvalidIdentifier(format!("unknown qualifier '{s}'")))
    }
}

/// Persistent identifier of a repository object or one of its components.
///
/// The repository path is derived once at construction and is a pure
/// function of `(qualifier, id, component_path)`. Equality, hashing and
/// ordering all compare the repository path.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pid {
    qualifier: Qualifier,
    id: String,
    component_path: Option<String>,
    repository_path: String,
}

impl Pid {
    /// Build a PID from its parts, validating the id and component path.
    pub fn new(
        qualifier: Qualifier,
        id: &str,
        component_path: Option<&str>,
    ) -> RepositoryResult<Self> {
        if !is_valid_id(id) {
            return Err(RepositoryError::InvalidIdentifier(id.to_string()));
        }
        let component_path = match component_path {
            Some(path) => Some(
                normalize_component(path)
                    .ok_or_else(|| RepositoryError::InvalidIdentifier(path.to_string()))?,
            ),
            None => None,
        };
        Ok(Self::from_parts(qualifier, id.to_string(), component_path))
    }

    /// Parts must already be validated.
    pub(crate) fn from_parts(
        qualifier: Qualifier,
        id: String,
        component_path: Option<String>,
    ) -> Self {
        let repository_path = paths::derive_path(qualifier, &id, component_path.as_deref());
        Self {
            qualifier,
            id,
            component_path,
            repository_path,
        }
    }

    /// Mint a fresh identifier in the given namespace.
    pub fn mint(qualifier: Qualifier) -> Self {
        Self::from_parts(qualifier, Uuid::new_v4().to_string(), None)
    }

    /// The content root PID.
    pub fn content_root() -> Self {
        Self::from_parts(Qualifier::Content, CONTENT_ROOT_ID.to_string(), None)
    }

    pub fn qualifier(&self) -> Qualifier {
        self.qualifier
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn component_path(&self) -> Option<&str> {
        self.component_path.as_deref()
    }

    /// Canonical hashed path, e.g. `/content/ab/cd/ef/01/abcdef01-.../datafs/original`.
    pub fn repository_path(&self) -> &str {
        &self.repository_path
    }

    /// Returns `true` if this PID addresses a sub-component of an object.
    pub fn is_component(&self) -> bool {
        self.component_path.is_some()
    }

    /// `qualifier/id`, without any component path.
    pub fn qualified_id(&self) -> String {
        format!("{}/{}", self.qualifier, self.id)
    }

    /// Full URI of the resource under the given base URI.
    pub fn uri(&self, base_uri: &str) -> String {
        format!("{}{}", base_uri.trim_end_matches('/'), self.repository_path)
    }

    /// Address of the resource's metadata representation.
    ///
    /// Components are binaries whose RDF description lives at a separate
    /// `fcr:metadata` sub-resource.
    pub fn metadata_uri(&self, base_uri: &str) -> String {
        let uri = self.uri(base_uri);
        if self.is_component() {
            format!("{uri}/{}", paths::METADATA_SEGMENT)
        } else {
            uri
        }
    }

    /// PID of a sub-component, appending `path` to any existing component path.
    pub fn component(&self, path: &str) -> RepositoryResult<Self> {
        let suffix = normalize_component(path)
            .ok_or_else(|| RepositoryError::InvalidIdentifier(path.to_string()))?;
        let component_path = match &self.component_path {
            Some(existing) => format!("{existing}/{suffix}"),
            None => suffix,
        };
        Ok(Self::from_parts(self.qualifier, self.id.clone(), Some(component_path)))
    }

    /// PID of the owning object, dropping any component path.
    pub fn parent_object(&self) -> Self {
        Self::from_parts(self.qualifier, self.id.clone(), None)
    }

    /// Compact representation `qualifier/id[/componentPath]`.
    pub fn to_compact(&self) -> String {
        match &self.component_path {
            Some(component) => format!("{}/{}/{component}", self.qualifier, self.id),
            None => self.qualified_id(),
        }
    }
}

/// Ids are either reserved names or UUID strings.
pub(crate) fn is_valid_id(id: &str) -> bool {
    if RESERVED_IDS.contains(&id) {
        return true;
    }
    id.chars().all(|c| c.is_ascii_hexdigit() || c == '-') && Uuid::parse_str(id).is_ok()
}

/// Trim surrounding slashes and reject empty, `.` or `..` segments.
pub(crate) fn normalize_component(path: &str) -> Option<String> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    let valid = trimmed.split('/').all(|segment| {
        !segment.is_empty()
            && segment != "."
            && segment != ".."
            && !segment.chars().any(char::is_whitespace)
    });
    valid.then(|| trimmed.to_string())
}

impl PartialEq for Pid {
    fn eq(&self, other: &Self) -> bool {
        self.repository_path == other.repository_path
    }
}

impl Eq for Pid {}

impl Hash for Pid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.repository_path.hash(state);
    }
}

impl PartialOrd for Pid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pid {
    fn cmp(&self, other: &Self) -> Ordering {
        self.repository_path.cmp(&other.repository_path)
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pid({})", self.to_compact())
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_compact())
    }
}

impl TryFrom<String> for Pid {
    type Error = RepositoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        paths::resolve_local(&value).ok_or(RepositoryError::InvalidIdentifier(value))
    }
}

impl From<Pid> for String {
    fn from(pid: Pid) -> Self {
        pid.to_compact()
    }
}

impl FromStr for Pid {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "abcdef01-2345-6789-abcd-ef0123456789";

    #[test]
    fn new_derives_hashed_path() {
        let pid = Pid::new(Qualifier::Content, ID, None).unwrap();
        assert_eq!(pid.repository_path(), format!("/content/ab/cd/ef/01/{ID}"));
        assert!(!pid.is_component());
    }

    #[test]
    fn component_path_is_appended() {
        let pid = Pid::new(Qualifier::Content, ID, Some("/datafs/original_file/")).unwrap();
        assert_eq!(pid.component_path(), Some("datafs/original_file"));
        assert!(pid.repository_path().ends_with("/datafs/original_file"));
    }

    #[test]
    fn reserved_id_is_not_hashed() {
        let root = Pid::content_root();
        assert_eq!(root.repository_path(), "/content/collections");
    }

    #[test]
    fn rejects_invalid_ids() {
        assert!(Pid::new(Qualifier::Content, "not-a-uuid", None).is_err());
        assert!(Pid::new(Qualifier::Content, "", None).is_err());
        assert!(Pid::new(Qualifier::Content, ID, Some("a/../b")).is_err());
        assert!(Pid::new(Qualifier::Content, ID, Some("//")).is_err());
    }

    #[test]
    fn equality_follows_repository_path() {
        let a = Pid::new(Qualifier::Content, ID, None).unwrap();
        let b = Pid::new(Qualifier::Content, ID, None).unwrap();
        let c = Pid::new(Qualifier::Deposit, ID, None).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn minted_pids_are_unique_and_hashed() {
        let a = Pid::mint(Qualifier::Content);
        let b = Pid::mint(Qualifier::Content);
        assert_ne!(a, b);
        assert_eq!(a.repository_path().split('/').count(), 7);
    }

    #[test]
    fn component_and_parent_object() {
        let pid = Pid::new(Qualifier::Content, ID, None).unwrap();
        let original = pid.component("datafs").unwrap().component("original_file").unwrap();
        assert_eq!(original.component_path(), Some("datafs/original_file"));
        assert_eq!(original.parent_object(), pid);
    }

    #[test]
    fn uri_and_metadata_uri() {
        let pid = Pid::new(Qualifier::Content, ID, None).unwrap();
        let base = "http://localhost:8080/rest/";
        assert_eq!(pid.uri(base), format!("http://localhost:8080/rest{}", pid.repository_path()));
        assert_eq!(pid.metadata_uri(base), pid.uri(base));

        let binary = pid.component("datafs/original_file").unwrap();
        assert!(binary.metadata_uri(base).ends_with("/datafs/original_file/fcr:metadata"));
    }

    #[test]
    fn qualifier_parse_and_display() {
        for q in Qualifier::ALL {
            assert_eq!(Qualifier::parse(q.as_str()), Some(q));
        }
        assert_eq!(Qualifier::parse("bogus"), None);
        assert!("bogus".parse::<Qualifier>().is_err());
        assert_eq!(Qualifier::Deposit.to_string(), "deposits");
    }

    #[test]
    fn display_is_compact() {
        let pid = Pid::new(Qualifier::Deposit, ID, None).unwrap();
        assert_eq!(pid.to_string(), format!("deposits/{ID}"));
    }

    #[test]
    fn serde_roundtrip_uses_compact_form() {
        let pid = Pid::new(Qualifier::Content, ID, Some("datafs/original_file")).unwrap();
        let json = serde_json::to_string(&pid).unwrap();
        assert_eq!(json, format!("\"content/{ID}/datafs/original_file\""));
        let parsed: Pid = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, pid);
    }

    #[test]
    fn serde_rejects_malformed() {
        let result: Result<Pid, _> = serde_json::from_str("\"content/nope\"");
        assert!(result.is_err());
    }
}
