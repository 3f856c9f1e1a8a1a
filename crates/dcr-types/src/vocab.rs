//! RDF vocabulary IRIs used by the access layer.

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

pub const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";

pub const DC_TITLE: &str = "http://purl.org/dc/terms/title";

// Repository server model
pub const FEDORA_BINARY: &str = "http://fedora.info/definitions/v4/repository#Binary";
pub const FEDORA_CONTAINER: &str = "http://fedora.info/definitions/v4/repository#Container";
pub const FEDORA_CREATED: &str = "http://fedora.info/definitions/v4/repository#created";
pub const FEDORA_LAST_MODIFIED: &str = "http://fedora.info/definitions/v4/repository#lastModified";

// Portland Common Data Model membership
pub const PCDM_HAS_MEMBER: &str = "http://pcdm.org/models#hasMember";
pub const PCDM_HAS_FILE: &str = "http://pcdm.org/models#hasFile";
pub const PCDM_OBJECT: &str = "http://pcdm.org/models#Object";

// Binary technical metadata
pub const EBUCORE_FILENAME: &str = "http://www.ebu.ch/metadata/ontologies/ebucore/ebucore#filename";
pub const EBUCORE_MIME_TYPE: &str = "http://www.ebu.ch/metadata/ontologies/ebucore/ebucore#hasMimeType";

// Provenance
pub const PREMIS_EVENT: &str = "http://www.loc.gov/premis/rdf/v3/Event";
pub const PREMIS_EVENT_TYPE: &str = "http://www.loc.gov/premis/rdf/v3/eventType";
pub const PREMIS_EVENT_DETAIL: &str = "http://www.loc.gov/premis/rdf/v3/eventDetail";
pub const PREMIS_EVENT_DATE_TIME: &str = "http://www.loc.gov/premis/rdf/v3/eventDateTime";
pub const PREMIS_RELATED_OBJECT: &str = "http://www.loc.gov/premis/rdf/v3/hasEventRelatedObject";

// Content model
pub const MODEL_NS: &str = "https://w3id.org/dcr/model#";
pub const CONTENT_ROOT: &str = "https://w3id.org/dcr/model#ContentRoot";
pub const ADMIN_UNIT: &str = "https://w3id.org/dcr/model#AdminUnit";
pub const COLLECTION: &str = "https://w3id.org/dcr/model#Collection";
pub const FOLDER: &str = "https://w3id.org/dcr/model#Folder";
pub const WORK: &str = "https://w3id.org/dcr/model#Work";
pub const FILE_OBJECT: &str = "https://w3id.org/dcr/model#FileObject";
pub const DEPOSIT_RECORD: &str = "https://w3id.org/dcr/model#DepositRecord";
pub const TOMBSTONE: &str = "https://w3id.org/dcr/model#Tombstone";
