//! View models exchanged with the backend
//!
//! These mirror the backend's DTOs field for field. Everything here is plain
//! data; the synchronizers decide how the local copies evolve.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{
    DeckId, MetadataId, TagId, TagNameId, TaskId, TAG_NAME_ID_FILE_NAME, TAG_NAME_ID_TITLE,
};

// ============================================================================
// Decks
// ============================================================================

/// Track metadata known as soon as a deck starts loading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckFileMetadataSnapshot {
    pub title: String,
}

/// Decoded audio characteristics, available once decoding finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckFilePayloadSnapshot {
    /// Duration in seconds
    pub duration: f64,
    pub sample_rate: u32,
    pub channels_count: u32,
    pub samples_count: u64,
}

/// Playback status of a loaded deck
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DeckFileStatus {
    /// Decoding in progress (0.0 - 1.0)
    Loading { progress: f32 },
    /// Playing from the given sample offset
    Playing { offset: u64 },
    /// Paused at the given sample offset
    Paused { offset: u64 },
}

impl DeckFileStatus {
    /// Sample offset for `Playing`/`Paused`, `None` while loading
    pub fn offset(&self) -> Option<u64> {
        match self {
            Self::Loading { .. } => None,
            Self::Playing { offset } | Self::Paused { offset } => Some(*offset),
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing { .. })
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }

    /// The status a play/pause toggle should request
    ///
    /// Offset is preserved across the toggle. Loading decks cannot be toggled.
    pub fn toggled(&self) -> Option<Self> {
        match *self {
            Self::Loading { .. } => None,
            Self::Playing { offset } => Some(Self::Paused { offset }),
            Self::Paused { offset } => Some(Self::Playing { offset }),
        }
    }

    /// Same variant at a different offset (seek)
    pub fn with_offset(&self, offset: u64) -> Option<Self> {
        match self {
            Self::Loading { .. } => None,
            Self::Playing { .. } => Some(Self::Playing { offset }),
            Self::Paused { .. } => Some(Self::Paused { offset }),
        }
    }
}

/// Full snapshot of a deck's loaded file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckFileView {
    pub metadata: DeckFileMetadataSnapshot,
    pub payload: DeckFilePayloadSnapshot,
    pub status: DeckFileStatus,
}

/// A deck as returned by `get_audio_decks`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckView {
    pub file: Option<DeckFileView>,
    pub id: DeckId,
}

impl DeckView {
    /// A deck known to exist by id but not populated yet
    pub fn placeholder(id: DeckId) -> Self {
        Self { file: None, id }
    }
}

// ============================================================================
// Worker queue
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Queued,
    Processing,
    Done,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "Queued"),
            Self::Processing => write!(f, "Processing"),
            Self::Done => write!(f, "Done"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerQueueTask {
    pub id: TaskId,
    pub status: TaskStatus,
}

// ============================================================================
// Library entries and tags
// ============================================================================

/// One tag assigned to one entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataTagView {
    pub tag_id: TagId,
    pub metadata_tag_id: i64,
    pub tag_name_id: TagNameId,
    pub tag_value: String,
    pub metadata_id: MetadataId,
}

/// A library entry with its tag assignments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryView {
    pub metadata_id: MetadataId,
    pub metadata_hash: String,
    pub tags: Vec<MetadataTagView>,
}

impl EntryView {
    /// First value assigned under a tag name
    pub fn tag_value(&self, tag_name_id: TagNameId) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.tag_name_id == tag_name_id)
            .map(|tag| tag.tag_value.as_str())
    }

    /// All values assigned under a tag name, in assignment order
    pub fn tag_values(&self, tag_name_id: TagNameId) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|tag| tag.tag_name_id == tag_name_id)
            .map(|tag| tag.tag_value.as_str())
            .collect()
    }

    pub fn has_tag(&self, tag_name_id: TagNameId, tag_id: TagId) -> bool {
        self.tags
            .iter()
            .any(|tag| tag.tag_name_id == tag_name_id && tag.tag_id == tag_id)
    }

    /// Display title: title tag, then file name, then the content hash
    pub fn title(&self) -> &str {
        self.tag_value(TAG_NAME_ID_TITLE)
            .or_else(|| self.tag_value(TAG_NAME_ID_FILE_NAME))
            .unwrap_or(&self.metadata_hash)
    }
}

/// A concrete tag value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagView {
    pub id: TagId,
    pub value: String,
    pub name_id: TagNameId,
}

/// A tag category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagName {
    pub id: TagNameId,
    pub name: String,
    pub use_for_filtering: bool,
}

// ============================================================================
// Filter
// ============================================================================

/// One tag value in a filter section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSelection {
    pub id: TagId,
    pub value: String,
    pub selected: bool,
}

impl TagSelection {
    pub fn selected(tag: &TagView) -> Self {
        Self {
            id: tag.id,
            value: tag.value.clone(),
            selected: true,
        }
    }
}

/// Combined directory and tag selection used to query entries
///
/// Equality is structural over the canonical form: directories compare as a
/// set, and each tag name compares as the set of its *selected* values. A tag
/// name with nothing selected is the same as an absent one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterSelection {
    pub directories: Vec<String>,
    pub tags: BTreeMap<TagNameId, Vec<TagSelection>>,
}

impl FilterSelection {
    /// Sorted, deduplicated, selected-only form
    pub fn canonical(&self) -> FilterSelection {
        let mut directories = self.directories.clone();
        directories.sort();
        directories.dedup();

        let tags = self
            .tags
            .iter()
            .filter_map(|(name_id, selections)| {
                let mut selected: Vec<TagSelection> =
                    selections.iter().filter(|s| s.selected).cloned().collect();
                selected.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.value.cmp(&b.value)));
                selected.dedup();
                (!selected.is_empty()).then_some((*name_id, selected))
            })
            .collect();

        FilterSelection { directories, tags }
    }

    /// True when nothing is selected at all
    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
            && self
                .tags
                .values()
                .all(|selections| selections.iter().all(|s| !s.selected))
    }
}

impl PartialEq for FilterSelection {
    fn eq(&self, other: &Self) -> bool {
        let a = self.canonical();
        let b = other.canonical();
        a.directories == b.directories && a.tags == b.tags
    }
}

impl Eq for FilterSelection {}
