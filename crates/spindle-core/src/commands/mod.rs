//! Outbound commands and their pending replies
//!
//! Every command is a request to the authoritative backend. Invoking one
//! never blocks: it returns a [`Pending`] backed by a oneshot reply channel that
//! the owner polls from its event loop.
//!
//! Commands whose result nobody needs (tag creation, context deletion,
//! playback control) are handed to [`CommandClient::detach`]. Their outcome is
//! only logged when [`CommandClient::poll_detached`] observes it.

#[cfg(test)]
pub mod testing;

use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;
use tokio::sync::oneshot::{self, error::TryRecvError};

use crate::error::{SyncError, SyncResult};
use crate::models::{
    DeckFileStatus, DeckView, EntryView, FilterSelection, TagName, TagView, WorkerQueueTask,
};
use crate::types::{ContextId, DeckId, MetadataId, TagNameId, TaskId, VariationId};

/// Raw backend answer: JSON result or error message
pub type Reply = Result<Value, String>;

/// Result type for commands whose answer carries no information
pub type Ack = IgnoredAny;

/// Every command the core sends to the backend
///
/// Serialized as `{"command": "<name>", ...arguments}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum BackendCommand {
    GetAudioDecks,
    CreateAudioDeck,
    LoadAudioTrackFromMetadata {
        deck_id: DeckId,
        metadata_id: MetadataId,
    },
    LoadAudioTrackFromVariation {
        deck_id: DeckId,
        variation_id: VariationId,
    },
    SetDeckFileStatus {
        deck_id: DeckId,
        status: DeckFileStatus,
    },
    GetTagsByName {
        tag_name: String,
    },
    GetTagNames,
    #[serde(rename = "interactive_list_create_context")]
    CreateContext,
    #[serde(rename = "interactive_list_delete_context")]
    DeleteContext { context_id: ContextId },
    #[serde(rename = "get_interactive_list_context_entries")]
    GetContextEntries {
        context_id: ContextId,
        filter: FilterSelection,
    },
    #[serde(rename = "interactive_list_create_tag")]
    CreateTag {
        context_id: ContextId,
        metadata_id: MetadataId,
        name_id: TagNameId,
        value: String,
    },
    #[serde(rename = "interactive_list_get_tag_creation_suggestions")]
    GetTagCreationSuggestions {
        context_id: ContextId,
        tag_name_id: TagNameId,
        input: String,
    },
    GetWorkerQueueTasks,
    GetWorkerQueueTask {
        task_id: TaskId,
    },
    ImportFolder {
        directory: String,
    },
}

impl BackendCommand {
    /// Wire name of the command
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetAudioDecks => "get_audio_decks",
            Self::CreateAudioDeck => "create_audio_deck",
            Self::LoadAudioTrackFromMetadata { .. } => "load_audio_track_from_metadata",
            Self::LoadAudioTrackFromVariation { .. } => "load_audio_track_from_variation",
            Self::SetDeckFileStatus { .. } => "set_deck_file_status",
            Self::GetTagsByName { .. } => "get_tags_by_name",
            Self::GetTagNames => "get_tag_names",
            Self::CreateContext => "interactive_list_create_context",
            Self::DeleteContext { .. } => "interactive_list_delete_context",
            Self::GetContextEntries { .. } => "get_interactive_list_context_entries",
            Self::CreateTag { .. } => "interactive_list_create_tag",
            Self::GetTagCreationSuggestions { .. } => {
                "interactive_list_get_tag_creation_suggestions"
            }
            Self::GetWorkerQueueTasks => "get_worker_queue_tasks",
            Self::GetWorkerQueueTask { .. } => "get_worker_queue_task",
            Self::ImportFolder { .. } => "import_folder",
        }
    }
}

/// Anything able to carry a command to the backend and hand back its reply
pub trait Backend {
    fn invoke(&self, command: BackendCommand) -> oneshot::Receiver<Reply>;
}

// ============================================================================
// Pending replies
// ============================================================================

/// A command in flight, resolving to `T`
pub struct Pending<T> {
    command: &'static str,
    reply_rx: oneshot::Receiver<Reply>,
    _result: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pending")
            .field("command", &self.command)
            .finish()
    }
}

impl<T: DeserializeOwned> Pending<T> {
    fn new(command: &'static str, reply_rx: oneshot::Receiver<Reply>) -> Self {
        Self {
            command,
            reply_rx,
            _result: PhantomData,
        }
    }

    pub fn command(&self) -> &'static str {
        self.command
    }

    /// Non-blocking check; `None` while the backend has not answered
    ///
    /// Once this returns `Some` the pending reply is spent and should be
    /// dropped.
    pub fn try_take(&mut self) -> Option<SyncResult<T>> {
        match self.reply_rx.try_recv() {
            Ok(reply) => Some(decode_reply(self.command, reply)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(SyncError::Disconnected(self.command))),
        }
    }

    /// Block the calling thread until the reply arrives
    ///
    /// Only for setup code and tools outside the event loop.
    pub fn wait(self) -> SyncResult<T> {
        match self.reply_rx.blocking_recv() {
            Ok(reply) => decode_reply(self.command, reply),
            Err(_) => Err(SyncError::Disconnected(self.command)),
        }
    }

    /// Forget the result type; only success or failure will be observed
    pub fn detach(self) -> Pending<Ack> {
        Pending::new(self.command, self.reply_rx)
    }
}

fn decode_reply<T: DeserializeOwned>(command: &'static str, reply: Reply) -> SyncResult<T> {
    match reply {
        Ok(value) => {
            serde_json::from_value(value).map_err(|source| SyncError::Reply { command, source })
        }
        Err(message) => Err(SyncError::Command { command, message }),
    }
}

// ============================================================================
// Client
// ============================================================================

/// Typed front for a [`Backend`]
///
/// Cheap to clone; clones share the backend and the detached command list.
#[derive(Clone)]
pub struct CommandClient {
    backend: Rc<dyn Backend>,
    detached: Rc<RefCell<Vec<Pending<Ack>>>>,
}

impl CommandClient {
    pub fn new(backend: Rc<dyn Backend>) -> Self {
        Self {
            backend,
            detached: Rc::new(RefCell::new(Vec::new())),
        }
    }

    fn send<T: DeserializeOwned>(&self, command: BackendCommand) -> Pending<T> {
        let name = command.name();
        log::debug!("invoke: {}", name);
        Pending::new(name, self.backend.invoke(command))
    }

    // ------------------------------------------------------------------------
    // Decks
    // ------------------------------------------------------------------------

    pub fn get_audio_decks(&self) -> Pending<Vec<DeckView>> {
        self.send(BackendCommand::GetAudioDecks)
    }

    pub fn create_audio_deck(&self) -> Pending<DeckId> {
        self.send(BackendCommand::CreateAudioDeck)
    }

    pub fn load_track_from_metadata(
        &self,
        deck_id: DeckId,
        metadata_id: MetadataId,
    ) -> Pending<Ack> {
        self.send(BackendCommand::LoadAudioTrackFromMetadata {
            deck_id,
            metadata_id,
        })
    }

    pub fn load_track_from_variation(
        &self,
        deck_id: DeckId,
        variation_id: VariationId,
    ) -> Pending<Ack> {
        self.send(BackendCommand::LoadAudioTrackFromVariation {
            deck_id,
            variation_id,
        })
    }

    pub fn set_deck_status(&self, deck_id: DeckId, status: DeckFileStatus) -> Pending<Ack> {
        self.send(BackendCommand::SetDeckFileStatus { deck_id, status })
    }

    // ------------------------------------------------------------------------
    // Tags
    // ------------------------------------------------------------------------

    pub fn get_tags_by_name(&self, tag_name: &str) -> Pending<Vec<TagView>> {
        self.send(BackendCommand::GetTagsByName {
            tag_name: tag_name.to_string(),
        })
    }

    pub fn get_tag_names(&self) -> Pending<Vec<TagName>> {
        self.send(BackendCommand::GetTagNames)
    }

    // ------------------------------------------------------------------------
    // Interactive list context
    // ------------------------------------------------------------------------

    pub fn create_context(&self) -> Pending<ContextId> {
        self.send(BackendCommand::CreateContext)
    }

    pub fn delete_context(&self, context_id: &str) -> Pending<Ack> {
        self.send(BackendCommand::DeleteContext {
            context_id: context_id.to_string(),
        })
    }

    pub fn get_context_entries(
        &self,
        context_id: &str,
        filter: FilterSelection,
    ) -> Pending<Vec<EntryView>> {
        self.send(BackendCommand::GetContextEntries {
            context_id: context_id.to_string(),
            filter,
        })
    }

    pub fn create_tag(
        &self,
        context_id: &str,
        metadata_id: MetadataId,
        name_id: TagNameId,
        value: &str,
    ) -> Pending<Ack> {
        self.send(BackendCommand::CreateTag {
            context_id: context_id.to_string(),
            metadata_id,
            name_id,
            value: value.to_string(),
        })
    }

    pub fn get_tag_creation_suggestions(
        &self,
        context_id: &str,
        tag_name_id: TagNameId,
        input: &str,
    ) -> Pending<Vec<String>> {
        self.send(BackendCommand::GetTagCreationSuggestions {
            context_id: context_id.to_string(),
            tag_name_id,
            input: input.to_string(),
        })
    }

    // ------------------------------------------------------------------------
    // Worker queue and import
    // ------------------------------------------------------------------------

    pub fn get_worker_queue_tasks(&self) -> Pending<Vec<WorkerQueueTask>> {
        self.send(BackendCommand::GetWorkerQueueTasks)
    }

    pub fn get_worker_queue_task(&self, task_id: TaskId) -> Pending<WorkerQueueTask> {
        self.send(BackendCommand::GetWorkerQueueTask { task_id })
    }

    pub fn import_folder(&self, directory: &str) -> Pending<bool> {
        self.send(BackendCommand::ImportFolder {
            directory: directory.to_string(),
        })
    }

    // ------------------------------------------------------------------------
    // Fire and forget
    // ------------------------------------------------------------------------

    /// Keep a command alive without caring about its result
    pub fn detach<T: DeserializeOwned>(&self, pending: Pending<T>) {
        self.detached.borrow_mut().push(pending.detach());
    }

    /// Drop detached commands that completed, logging failures
    ///
    /// Failures are not retried and not surfaced any further.
    pub fn poll_detached(&self) {
        self.detached
            .borrow_mut()
            .retain_mut(|pending| match pending.try_take() {
                None => true,
                Some(Ok(_)) => {
                    log::debug!("{} completed", pending.command());
                    false
                }
                Some(Err(e)) => {
                    log::error!("{}", e);
                    false
                }
            });
    }

    /// Detached commands still awaiting a reply
    pub fn detached_count(&self) -> usize {
        self.detached.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedBackend;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_wire_shape() {
        let value = serde_json::to_value(BackendCommand::GetContextEntries {
            context_id: "ctx-3".into(),
            filter: FilterSelection::default(),
        })
        .unwrap();
        assert_eq!(value["command"], "get_interactive_list_context_entries");
        assert_eq!(value["context_id"], "ctx-3");

        let value = serde_json::to_value(BackendCommand::GetAudioDecks).unwrap();
        assert_eq!(value, json!({ "command": "get_audio_decks" }));
    }

    #[test]
    fn test_name_matches_serialized_tag() {
        let commands = vec![
            BackendCommand::CreateContext,
            BackendCommand::DeleteContext {
                context_id: "ctx".into(),
            },
            BackendCommand::CreateTag {
                context_id: "ctx".into(),
                metadata_id: 2,
                name_id: 3,
                value: "x".into(),
            },
            BackendCommand::GetTagCreationSuggestions {
                context_id: "ctx".into(),
                tag_name_id: 3,
                input: "x".into(),
            },
            BackendCommand::SetDeckFileStatus {
                deck_id: 1,
                status: DeckFileStatus::Paused { offset: 0 },
            },
            BackendCommand::ImportFolder {
                directory: "/music".into(),
            },
        ];
        for command in commands {
            let value = serde_json::to_value(&command).unwrap();
            assert_eq!(value["command"], command.name());
        }
    }

    #[test]
    fn test_pending_resolves_after_reply() {
        let backend = ScriptedBackend::new();
        let client = CommandClient::new(backend.clone());

        let mut pending = client.create_audio_deck();
        assert!(pending.try_take().is_none());

        backend.reply(|c| matches!(c, BackendCommand::CreateAudioDeck), json!(4));
        assert_eq!(pending.try_take().unwrap().unwrap(), 4);
    }

    #[test]
    fn test_pending_reports_backend_error() {
        let backend = ScriptedBackend::new();
        let client = CommandClient::new(backend.clone());

        let mut pending = client.import_folder("/nowhere");
        backend.fail(
            |c| matches!(c, BackendCommand::ImportFolder { .. }),
            "no such directory",
        );
        match pending.try_take() {
            Some(Err(SyncError::Command { command, message })) => {
                assert_eq!(command, "import_folder");
                assert_eq!(message, "no such directory");
            }
            other => panic!("unexpected {:?}", other.map(|r| r.is_ok())),
        }
    }

    #[test]
    fn test_pending_reports_shape_mismatch() {
        let backend = ScriptedBackend::new();
        let client = CommandClient::new(backend.clone());

        let mut pending = client.get_tag_names();
        backend.reply(|_| true, json!("not a list"));
        assert!(matches!(
            pending.try_take(),
            Some(Err(SyncError::Reply { .. }))
        ));
    }

    #[test]
    fn test_detached_commands_are_drained() {
        let backend = ScriptedBackend::new();
        let client = CommandClient::new(backend.clone());

        client.detach(client.delete_context("ctx"));
        client.detach(client.create_tag("ctx", 2, 3, "House"));
        assert_eq!(client.detached_count(), 2);

        client.poll_detached();
        assert_eq!(client.detached_count(), 2);

        backend.reply(
            |c| matches!(c, BackendCommand::DeleteContext { .. }),
            Value::Null,
        );
        backend.fail(|c| matches!(c, BackendCommand::CreateTag { .. }), "rejected");
        client.poll_detached();
        assert_eq!(client.detached_count(), 0);
    }
}
