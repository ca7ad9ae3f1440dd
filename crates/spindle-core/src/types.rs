//! Identifier aliases and well-known tag names shared across the core
//!
//! Ids are plain integers on the wire; the aliases only document intent.

/// Playback slot handle assigned by the backend
pub type DeckId = u32;

/// Library entry (file metadata) identifier
pub type MetadataId = i64;

/// Concrete tag value identifier
pub type TagId = i64;

/// Tag category identifier
pub type TagNameId = i64;

/// Worker queue task identifier
pub type TaskId = i64;

/// Server-side query scope identifier, opaque and generated by the backend
pub type ContextId = String;

/// Identifier of a derived file (e.g. an extracted stem)
pub type VariationId = i64;

// ============================================================================
// Well-known tag names
// ============================================================================

pub const TAG_NAME_ID_FILE_NAME_EMBEDDING: TagNameId = 1;
pub const TAG_NAME_ID_DIRECTORY: TagNameId = 2;
pub const TAG_NAME_ID_FILE_NAME: TagNameId = 3;
pub const TAG_NAME_ID_TITLE: TagNameId = 4;
pub const TAG_NAME_ID_ARTIST: TagNameId = 5;
pub const TAG_NAME_ID_ALBUM: TagNameId = 6;
pub const TAG_NAME_ID_GENRE: TagNameId = 7;

/// Name of the tag category whose values are directory paths
pub const DIRECTORY_TAG_NAME: &str = "directory";
