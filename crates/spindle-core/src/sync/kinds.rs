//! Entity kinds synchronized by the core

use crate::commands::{CommandClient, Pending};
use crate::events::{
    AudioDeckCreated, EntryChanged, EntryListChanged, TagListChanged, WorkerQueueTaskCreated,
    WorkerQueueTaskUpdated,
};
use crate::models::{DeckView, EntryView, FilterSelection, TagName, TagView, WorkerQueueTask};
use crate::subscription::{ChannelRouter, Subscription};
use crate::types::{ContextId, DeckId, MetadataId, TagId, TagNameId, TaskId};

use super::{EntityKind, Hydration, SyncEvent};

// ============================================================================
// Decks
// ============================================================================

/// Audio decks; a new deck starts as an empty placeholder
pub struct DeckKind;

impl EntityKind for DeckKind {
    type Id = DeckId;
    type Item = DeckView;
    type Query = ();

    const NAME: &'static str = "decks";

    fn id_of(item: &DeckView) -> DeckId {
        item.id
    }

    fn fetch_all(client: &CommandClient, _query: &()) -> Pending<Vec<DeckView>> {
        client.get_audio_decks()
    }

    fn hydrate(_client: &CommandClient, id: &DeckId) -> Hydration<DeckView> {
        Hydration::Ready(DeckView::placeholder(*id))
    }

    fn subscribe<M, F>(router: &ChannelRouter<M>, map: F) -> Vec<Subscription>
    where
        M: 'static,
        F: Fn(SyncEvent<Self>) -> M + Clone + 'static,
    {
        vec![router.subscribe_to(move |e: AudioDeckCreated| map(SyncEvent::Created(e.id)))]
    }
}

// ============================================================================
// Worker queue tasks
// ============================================================================

/// Background worker tasks; new tasks are fetched individually
pub struct TaskKind;

impl EntityKind for TaskKind {
    type Id = TaskId;
    type Item = WorkerQueueTask;
    type Query = ();

    const NAME: &'static str = "tasks";

    fn id_of(item: &WorkerQueueTask) -> TaskId {
        item.id
    }

    fn fetch_all(client: &CommandClient, _query: &()) -> Pending<Vec<WorkerQueueTask>> {
        client.get_worker_queue_tasks()
    }

    fn hydrate(client: &CommandClient, id: &TaskId) -> Hydration<WorkerQueueTask> {
        Hydration::Fetch(client.get_worker_queue_task(*id))
    }

    fn subscribe<M, F>(router: &ChannelRouter<M>, map: F) -> Vec<Subscription>
    where
        M: 'static,
        F: Fn(SyncEvent<Self>) -> M + Clone + 'static,
    {
        let on_created = map.clone();
        vec![
            router.subscribe_to(move |e: WorkerQueueTaskCreated| {
                on_created(SyncEvent::Created(e.task.id))
            }),
            router.subscribe_to(move |e: WorkerQueueTaskUpdated| {
                map(SyncEvent::Updated {
                    id: e.id,
                    item: e.task,
                })
            }),
        ]
    }
}

// ============================================================================
// Entries
// ============================================================================

/// Query scope for entries: a context and the filter applied in it
#[derive(Debug, Clone, PartialEq)]
pub struct EntryQuery {
    pub context_id: ContextId,
    pub filter: FilterSelection,
}

/// Library entries listed under an interactive list context
pub struct EntryKind;

impl EntityKind for EntryKind {
    type Id = MetadataId;
    type Item = EntryView;
    type Query = EntryQuery;

    const NAME: &'static str = "entries";

    fn id_of(item: &EntryView) -> MetadataId {
        item.metadata_id
    }

    fn fetch_all(client: &CommandClient, query: &EntryQuery) -> Pending<Vec<EntryView>> {
        client.get_context_entries(&query.context_id, query.filter.canonical())
    }

    fn subscribe<M, F>(router: &ChannelRouter<M>, map: F) -> Vec<Subscription>
    where
        M: 'static,
        F: Fn(SyncEvent<Self>) -> M + Clone + 'static,
    {
        let on_changed = map.clone();
        vec![
            router.subscribe_to(move |e: EntryChanged| on_changed(SyncEvent::ItemChanged(e.entry))),
            router.subscribe_to(move |_: EntryListChanged| map(SyncEvent::ListInvalidated)),
        ]
    }
}

// ============================================================================
// Tags
// ============================================================================

/// Tag values of one tag name
pub struct TagKind;

impl EntityKind for TagKind {
    type Id = TagId;
    type Item = TagView;
    /// Tag name the values belong to
    type Query = String;

    const NAME: &'static str = "tags";

    fn id_of(item: &TagView) -> TagId {
        item.id
    }

    fn fetch_all(client: &CommandClient, tag_name: &String) -> Pending<Vec<TagView>> {
        client.get_tags_by_name(tag_name)
    }

    fn subscribe<M, F>(router: &ChannelRouter<M>, map: F) -> Vec<Subscription>
    where
        M: 'static,
        F: Fn(SyncEvent<Self>) -> M + Clone + 'static,
    {
        vec![router.subscribe_to(move |_: TagListChanged| map(SyncEvent::ListInvalidated))]
    }
}

/// Tag categories, fetched once
pub struct TagNameKind;

impl EntityKind for TagNameKind {
    type Id = TagNameId;
    type Item = TagName;
    type Query = ();

    const NAME: &'static str = "tag names";

    fn id_of(item: &TagName) -> TagNameId {
        item.id
    }

    fn fetch_all(client: &CommandClient, _query: &()) -> Pending<Vec<TagName>> {
        client.get_tag_names()
    }
}
