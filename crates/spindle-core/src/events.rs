//! Inbound notification schemas
//!
//! Every channel the backend emits on has exactly one payload struct. A
//! payload type names its base channel through [`ChannelPayload`]; per-entity
//! channels append `:<id>` to that base (see [`identified_channel`]).
//!
//! ```text
//! AudioDeckCreated                      {id}
//! AudioDeckFileMetadataUpdated:<id>     {id, metadata}
//! AudioDeckFilePayloadUpdated:<id>      {id, payload}
//! AudioDeckFileStatusUpdated:<id>       {id, status}
//! EntryChanged                          {entry}
//! EntryListChanged                      {}
//! TagListChanged                        {}
//! WorkerQueueTaskCreated                {task}
//! WorkerQueueTaskUpdated                {id, task|null}
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SyncError, SyncResult};
use crate::models::{
    DeckFileMetadataSnapshot, DeckFilePayloadSnapshot, DeckFileStatus, EntryView, WorkerQueueTask,
};
use crate::types::{DeckId, TaskId};

/// A payload type bound to one base channel name
pub trait ChannelPayload: DeserializeOwned + 'static {
    const CHANNEL: &'static str;
}

/// Channel name for a per-entity notification: `"<base>:<id>"`
pub fn identified_channel(base: &str, id: impl std::fmt::Display) -> String {
    format!("{}:{}", base, id)
}

/// Split `"<base>:<id>"` into its base name and id suffix
fn split_channel(channel: &str) -> (&str, Option<&str>) {
    match channel.split_once(':') {
        Some((base, id)) => (base, Some(id)),
        None => (channel, None),
    }
}

macro_rules! channel_payload {
    ($ty:ty, $name:literal) => {
        impl ChannelPayload for $ty {
            const CHANNEL: &'static str = $name;
        }
    };
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioDeckCreated {
    pub id: DeckId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioDeckFileMetadataUpdated {
    pub id: DeckId,
    pub metadata: DeckFileMetadataSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioDeckFilePayloadUpdated {
    pub id: DeckId,
    pub payload: DeckFilePayloadSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioDeckFileStatusUpdated {
    pub id: DeckId,
    pub status: DeckFileStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryChanged {
    pub entry: EntryView,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryListChanged {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagListChanged {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerQueueTaskCreated {
    pub task: WorkerQueueTask,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerQueueTaskUpdated {
    pub id: TaskId,
    pub task: Option<WorkerQueueTask>,
}

channel_payload!(AudioDeckCreated, "AudioDeckCreated");
channel_payload!(AudioDeckFileMetadataUpdated, "AudioDeckFileMetadataUpdated");
channel_payload!(AudioDeckFilePayloadUpdated, "AudioDeckFilePayloadUpdated");
channel_payload!(AudioDeckFileStatusUpdated, "AudioDeckFileStatusUpdated");
channel_payload!(EntryChanged, "EntryChanged");
channel_payload!(EntryListChanged, "EntryListChanged");
channel_payload!(TagListChanged, "TagListChanged");
channel_payload!(WorkerQueueTaskCreated, "WorkerQueueTaskCreated");
channel_payload!(WorkerQueueTaskUpdated, "WorkerQueueTaskUpdated");

// ============================================================================
// Closed notification set
// ============================================================================

/// Any notification the backend can emit, decoded by channel
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    AudioDeckCreated(AudioDeckCreated),
    AudioDeckFileMetadataUpdated(AudioDeckFileMetadataUpdated),
    AudioDeckFilePayloadUpdated(AudioDeckFilePayloadUpdated),
    AudioDeckFileStatusUpdated(AudioDeckFileStatusUpdated),
    EntryChanged(EntryChanged),
    EntryListChanged(EntryListChanged),
    TagListChanged(TagListChanged),
    WorkerQueueTaskCreated(WorkerQueueTaskCreated),
    WorkerQueueTaskUpdated(WorkerQueueTaskUpdated),
}

fn decode_as<T: ChannelPayload>(channel: &str, payload: &Value) -> SyncResult<T> {
    T::deserialize(payload).map_err(|source| SyncError::Decode {
        channel: channel.to_string(),
        source,
    })
}

impl Notification {
    /// Decode a raw payload using the schema of its channel
    ///
    /// Identified channels are matched on their base name.
    pub fn decode(channel: &str, payload: &Value) -> SyncResult<Self> {
        let (base, _) = split_channel(channel);
        let notification = match base {
            AudioDeckCreated::CHANNEL => Self::AudioDeckCreated(decode_as(channel, payload)?),
            AudioDeckFileMetadataUpdated::CHANNEL => {
                Self::AudioDeckFileMetadataUpdated(decode_as(channel, payload)?)
            }
            AudioDeckFilePayloadUpdated::CHANNEL => {
                Self::AudioDeckFilePayloadUpdated(decode_as(channel, payload)?)
            }
            AudioDeckFileStatusUpdated::CHANNEL => {
                Self::AudioDeckFileStatusUpdated(decode_as(channel, payload)?)
            }
            EntryChanged::CHANNEL => Self::EntryChanged(decode_as(channel, payload)?),
            EntryListChanged::CHANNEL => Self::EntryListChanged(decode_as(channel, payload)?),
            TagListChanged::CHANNEL => Self::TagListChanged(decode_as(channel, payload)?),
            WorkerQueueTaskCreated::CHANNEL => {
                Self::WorkerQueueTaskCreated(decode_as(channel, payload)?)
            }
            WorkerQueueTaskUpdated::CHANNEL => {
                Self::WorkerQueueTaskUpdated(decode_as(channel, payload)?)
            }
            _ => return Err(SyncError::UnknownChannel(channel.to_string())),
        };
        Ok(notification)
    }

    /// Base channel name of this notification
    pub fn name(&self) -> &'static str {
        match self {
            Self::AudioDeckCreated(_) => AudioDeckCreated::CHANNEL,
            Self::AudioDeckFileMetadataUpdated(_) => AudioDeckFileMetadataUpdated::CHANNEL,
            Self::AudioDeckFilePayloadUpdated(_) => AudioDeckFilePayloadUpdated::CHANNEL,
            Self::AudioDeckFileStatusUpdated(_) => AudioDeckFileStatusUpdated::CHANNEL,
            Self::EntryChanged(_) => EntryChanged::CHANNEL,
            Self::EntryListChanged(_) => EntryListChanged::CHANNEL,
            Self::TagListChanged(_) => TagListChanged::CHANNEL,
            Self::WorkerQueueTaskCreated(_) => WorkerQueueTaskCreated::CHANNEL,
            Self::WorkerQueueTaskUpdated(_) => WorkerQueueTaskUpdated::CHANNEL,
        }
    }
}
