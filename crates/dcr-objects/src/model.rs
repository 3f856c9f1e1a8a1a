use std::fmt;
use std::str::FromStr;

use dcr_types::{vocab, Qualifier, RepositoryError};
use serde::{Deserialize, Serialize};

/// Concrete kind of a repository object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    ContentRoot,
    AdminUnit,
    Collection,
    Folder,
    Work,
    File,
    Binary,
    DepositRecord,
    Tombstone,
    PremisEvent,
}

/// Which member types each container type accepts. Types absent from
/// this table are leaves.
const CONTAINMENT: &[(ResourceType, &[ResourceType])] = &[
    (ResourceType::ContentRoot, &[ResourceType::AdminUnit]),
    (ResourceType::AdminUnit, &[ResourceType::Collection]),
    (
        ResourceType::Collection,
        &[ResourceType::Folder, ResourceType::Work],
    ),
    (
        ResourceType::Folder,
        &[ResourceType::Folder, ResourceType::Work, ResourceType::File],
    ),
    (ResourceType::Work, &[ResourceType::File]),
    (ResourceType::File, &[ResourceType::Binary]),
];

const CONTENT: &[Qualifier] = &[Qualifier::Content];
const DEPOSIT: &[Qualifier] = &[Qualifier::Deposit];
const CONTENT_AND_DEPOSIT: &[Qualifier] = &[Qualifier::Content, Qualifier::Deposit];

impl ResourceType {
    pub const ALL: [ResourceType; 10] = [
        Self::ContentRoot,
        Self::AdminUnit,
        Self::Collection,
        Self::Folder,
        Self::Work,
        Self::File,
        Self::Binary,
        Self::DepositRecord,
        Self::Tombstone,
        Self::PremisEvent,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ContentRoot => "ContentRoot",
            Self::AdminUnit => "AdminUnit",
            Self::Collection => "Collection",
            Self::Folder => "Folder",
            Self::Work => "Work",
            Self::File => "FileObject",
            Self::Binary => "Binary",
            Self::DepositRecord => "DepositRecord",
            Self::Tombstone => "Tombstone",
            Self::PremisEvent => "PremisEvent",
        }
    }

    /// RDF type asserted by objects of this kind.
    pub fn type_iri(&self) -> &'static str {
        match self {
            Self::ContentRoot => vocab::CONTENT_ROOT,
            Self::AdminUnit => vocab::ADMIN_UNIT,
            Self::Collection => vocab::COLLECTION,
            Self::Folder => vocab::FOLDER,
            Self::Work => vocab::WORK,
            Self::File => vocab::FILE_OBJECT,
            Self::Binary => vocab::FEDORA_BINARY,
            Self::DepositRecord => vocab::DEPOSIT_RECORD,
            Self::Tombstone => vocab::TOMBSTONE,
            Self::PremisEvent => vocab::PREMIS_EVENT,
        }
    }

    /// Qualifiers under which this kind may appear.
    pub fn qualifiers(&self) -> &'static [Qualifier] {
        match self {
            Self::DepositRecord => DEPOSIT,
            Self::Binary | Self::PremisEvent | Self::Tombstone => CONTENT_AND_DEPOSIT,
            _ => CONTENT,
        }
    }

    /// Lookup order when a graph asserts several known types. Lower wins.
    pub fn priority(&self) -> u32 {
        match self {
            Self::Tombstone => 0,
            Self::ContentRoot => 10,
            Self::AdminUnit => 20,
            Self::Collection => 30,
            Self::Folder => 40,
            Self::Work => 50,
            Self::File => 60,
            Self::DepositRecord => 70,
            Self::PremisEvent => 80,
            Self::Binary => 90,
        }
    }

    /// Immutable kinds never change after creation and skip refetching.
    pub fn is_immutable(&self) -> bool {
        matches!(self, Self::PremisEvent)
    }

    pub fn allowed_members(&self) -> &'static [ResourceType] {
        CONTAINMENT
            .iter()
            .find(|(container, _)| container == self)
            .map(|(_, members)| *members)
            .unwrap_or(&[])
    }

    pub fn is_container(&self) -> bool {
        !self.allowed_members().is_empty()
    }

    pub fn can_contain(&self, member: ResourceType) -> bool {
        self.allowed_members().contains(&member)
    }

    /// Predicate a parent uses to point at an object of this kind.
    pub fn membership_predicate(&self) -> &'static str {
        match self {
            Self::Binary => vocab::PCDM_HAS_FILE,
            _ => vocab::PCDM_HAS_MEMBER,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResourceType {
    type Err = RepositoryError;

    /// Accepts the display name or its snake_case form, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.replace(['_', '-'], "").to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| {
                let name = t.name().to_ascii_lowercase();
                name == wanted || name.trim_end_matches("object") == wanted
            })
            .ok_or_else(|| RepositoryError::InvalidIdentifier(format!("unknown resource type: {s}")))
    }
}
