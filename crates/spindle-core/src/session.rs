//! Session - one instance of every synchronized component
//!
//! ```text
//!   inbound queue ──► handle_notification ──► router ──► SessionMessage ──► apply
//!                                                                             │
//!   poll tick ──► poll(): completed replies, tree rebuild, section sync  ◄────┘
//! ```
//!
//! Everything runs on the thread that owns the session. The transport only
//! feeds the inbound queue and completes reply channels.

use crossbeam::channel::{Receiver, RecvTimeoutError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::commands::{Backend, CommandClient, Pending};
use crate::config::ClientConfig;
use crate::deck::{AudioPlayer, DeckController, DeckEvent};
use crate::directory::{DirectoryTree, DirectoryTreeState};
use crate::filter::FilterReconciler;
use crate::ipc::InboundNotification;
use crate::models::{TagName, TagView, WorkerQueueTask};
use crate::subscription::{ChannelRouter, Subscription};
use crate::sync::{
    DeckKind, EntityKind, EntitySynchronizer, EntryKind, SyncEvent, TagKind, TagNameKind, TaskKind,
};
use crate::types::{DeckId, MetadataId, TagId, TagNameId};

/// Routed notification, addressed to the component that owns it
#[derive(Debug)]
pub enum SessionMessage {
    Decks(SyncEvent<DeckKind>),
    Deck(DeckId, DeckEvent),
    Tasks(SyncEvent<TaskKind>),
    DirectoryTags(SyncEvent<TagKind>),
    SectionTags(TagNameId, SyncEvent<TagKind>),
    Entries(SyncEvent<EntryKind>),
}

/// Filter section for one filterable tag name
pub struct TagSection {
    name: TagName,
    tags: EntitySynchronizer<TagKind>,
    _subscriptions: Vec<Subscription>,
}

impl TagSection {
    pub fn name(&self) -> &TagName {
        &self.name
    }

    pub fn tags(&self) -> &[TagView] {
        self.tags.items()
    }
}

pub struct Session {
    config: ClientConfig,
    client: CommandClient,
    router: ChannelRouter<SessionMessage>,
    player: AudioPlayer<SessionMessage>,
    tasks: EntitySynchronizer<TaskKind>,
    tag_names: EntitySynchronizer<TagNameKind>,
    directory_tags: EntitySynchronizer<TagKind>,
    directory_tree: DirectoryTree,
    directory_state: DirectoryTreeState,
    tag_sections: BTreeMap<TagNameId, TagSection>,
    entries: FilterReconciler,
    imports: Vec<(String, Pending<bool>)>,
    _subscriptions: Vec<Subscription>,
}

impl Session {
    /// Subscribe everything and issue every initial fetch
    pub fn start(backend: Rc<dyn Backend>, config: ClientConfig) -> Self {
        log::info!("Starting session");
        let client = CommandClient::new(backend);
        let router = ChannelRouter::new();
        let mut subscriptions = Vec::new();

        let player = AudioPlayer::new(
            client.clone(),
            &router,
            SessionMessage::Decks,
            SessionMessage::Deck,
        );

        let mut tasks = EntitySynchronizer::new(client.clone(), ());
        tasks.initialize();
        subscriptions.extend(TaskKind::subscribe(&router, SessionMessage::Tasks));

        let mut tag_names = EntitySynchronizer::new(client.clone(), ());
        tag_names.initialize();

        let mut directory_tags =
            EntitySynchronizer::new(client.clone(), config.directory_tag_name.clone());
        directory_tags.initialize();
        if config.auto_refresh_tags {
            subscriptions.extend(TagKind::subscribe(&router, SessionMessage::DirectoryTags));
        }

        let entries = FilterReconciler::new(client.clone(), &router, SessionMessage::Entries);

        Self {
            config,
            client,
            router,
            player,
            tasks,
            tag_names,
            directory_tags,
            directory_tree: DirectoryTree::default(),
            directory_state: DirectoryTreeState::new(),
            tag_sections: BTreeMap::new(),
            entries,
            imports: Vec::new(),
            _subscriptions: subscriptions,
        }
    }

    // ========================================================================
    // Event loop
    // ========================================================================

    /// Route one raw notification; returns whether any state changed
    pub fn handle_notification(&mut self, channel: &str, payload: &Value) -> bool {
        let messages = self.router.route(channel, payload);
        if messages.is_empty() {
            log::trace!("No listener took {}", channel);
        }
        let mut changed = false;
        for message in messages {
            changed |= self.apply(message);
        }
        changed
    }

    fn apply(&mut self, message: SessionMessage) -> bool {
        match message {
            SessionMessage::Decks(event) => self.player.apply_list(event),
            SessionMessage::Deck(id, event) => self.player.apply_deck(id, event),
            SessionMessage::Tasks(event) => self.tasks.apply(event),
            SessionMessage::DirectoryTags(event) => {
                let changed = self.directory_tags.apply(event);
                if changed {
                    self.rebuild_directory_tree();
                }
                changed
            }
            SessionMessage::SectionTags(name_id, event) => self
                .tag_sections
                .get_mut(&name_id)
                .is_some_and(|section| section.tags.apply(event)),
            SessionMessage::Entries(event) => self.entries.apply(event),
        }
    }

    /// Apply every completed reply; returns whether any state changed
    pub fn poll(&mut self) -> bool {
        let mut changed = self.player.poll();
        changed |= self.tasks.poll();

        if self.tag_names.poll() {
            self.sync_tag_sections();
            changed = true;
        }
        if self.directory_tags.poll() {
            self.rebuild_directory_tree();
            changed = true;
        }
        for section in self.tag_sections.values_mut() {
            changed |= section.tags.poll();
        }
        changed |= self.entries.poll();

        self.imports.retain_mut(|(path, pending)| match pending.try_take() {
            None => true,
            Some(Ok(true)) => {
                log::info!("Imported {}", path);
                false
            }
            Some(Ok(false)) => {
                log::warn!("Import of {} reported nothing to do", path);
                false
            }
            Some(Err(e)) => {
                log::error!("Import of {} failed: {}", path, e);
                false
            }
        });
        self.client.poll_detached();

        changed
    }

    /// Process inbound notifications until the backend disconnects
    ///
    /// `observer` is called after every iteration that changed state.
    pub fn run<F>(&mut self, inbound: &Receiver<InboundNotification>, mut observer: F)
    where
        F: FnMut(&Session),
    {
        log::info!("Session loop running");
        loop {
            let mut changed = false;
            match inbound.recv_timeout(self.config.poll_interval()) {
                Ok(notification) => {
                    changed |= self.handle_notification(&notification.channel, &notification.payload);
                    for notification in inbound.try_iter() {
                        changed |=
                            self.handle_notification(&notification.channel, &notification.payload);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    log::info!("Notification stream closed, stopping session loop");
                    break;
                }
            }

            changed |= self.poll();
            if changed {
                observer(self);
            }
        }
    }

    /// Delete the entry context and release every subscription
    pub fn shutdown(mut self) {
        log::info!("Shutting down session");
        self.entries.close();
        self.client.poll_detached();
    }

    // ========================================================================
    // Derived state
    // ========================================================================

    fn rebuild_directory_tree(&mut self) {
        self.directory_tree = DirectoryTree::from_tags(self.directory_tags.items());
        log::debug!("Directory tree rebuilt: {} nodes", self.directory_tree.len());
        if self.directory_state.retain_existing(&self.directory_tree) {
            self.entries
                .set_directories(self.directory_state.selected.clone());
        }
    }

    /// Open a section per filterable tag name, close the ones that went away
    fn sync_tag_sections(&mut self) {
        let filterable: Vec<TagName> = self
            .tag_names
            .items()
            .iter()
            .filter(|name| name.use_for_filtering && name.name != self.config.directory_tag_name)
            .cloned()
            .collect();

        let stale: Vec<TagNameId> = self
            .tag_sections
            .keys()
            .filter(|id| !filterable.iter().any(|name| name.id == **id))
            .copied()
            .collect();
        for name_id in stale {
            self.tag_sections.remove(&name_id);
            self.entries.set_tag_selection(name_id, Vec::new());
        }

        for name in filterable {
            if let Some(section) = self.tag_sections.get_mut(&name.id) {
                section.name = name;
                continue;
            }
            log::debug!("Opening tag section {:?}", name.name);
            let mut tags = EntitySynchronizer::new(self.client.clone(), name.name.clone());
            tags.initialize();
            let name_id = name.id;
            let subscriptions = if self.config.auto_refresh_tags {
                TagKind::subscribe(&self.router, move |event| {
                    SessionMessage::SectionTags(name_id, event)
                })
            } else {
                Vec::new()
            };
            self.tag_sections.insert(
                name_id,
                TagSection {
                    name,
                    tags,
                    _subscriptions: subscriptions,
                },
            );
        }
    }

    // ========================================================================
    // User intents
    // ========================================================================

    pub fn create_deck(&self) {
        self.player.create_deck();
    }

    pub fn toggle_directory(&mut self, path: &str) -> bool {
        self.directory_state.toggle_selected(path);
        self.entries
            .set_directories(self.directory_state.selected.clone())
    }

    pub fn toggle_directory_expanded(&mut self, path: &str) {
        self.directory_state.toggle_expanded(path);
    }

    /// Toggle a tag of an open section in the filter
    pub fn toggle_tag(&mut self, name_id: TagNameId, tag_id: TagId) -> bool {
        let tag = self
            .tag_sections
            .get(&name_id)
            .and_then(|section| section.tags.get(&tag_id))
            .cloned();
        match tag {
            Some(tag) => self.entries.toggle_tag(name_id, &tag),
            None => {
                log::warn!("toggle_tag: unknown tag {} in section {}", tag_id, name_id);
                false
            }
        }
    }

    pub fn clear_filter(&mut self) -> bool {
        self.directory_state.clear_selection();
        self.entries.clear()
    }

    pub fn create_tag(&self, metadata_id: MetadataId, name_id: TagNameId, value: &str) -> bool {
        self.entries.create_tag(metadata_id, name_id, value)
    }

    pub fn import_folder(&mut self, path: &str) {
        log::info!("Importing {}", path);
        self.imports
            .push((path.to_string(), self.client.import_folder(path)));
    }

    // ========================================================================
    // Read access
    // ========================================================================

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn player(&self) -> &AudioPlayer<SessionMessage> {
        &self.player
    }

    pub fn deck(&self, id: DeckId) -> Option<&DeckController> {
        self.player.controller(id)
    }

    pub fn tasks(&self) -> &[WorkerQueueTask] {
        self.tasks.items()
    }

    pub fn tag_names(&self) -> &[TagName] {
        self.tag_names.items()
    }

    pub fn directory_tree(&self) -> &DirectoryTree {
        &self.directory_tree
    }

    pub fn directory_state(&self) -> &DirectoryTreeState {
        &self.directory_state
    }

    pub fn tag_sections(&self) -> impl Iterator<Item = &TagSection> {
        self.tag_sections.values()
    }

    pub fn entries(&self) -> &FilterReconciler {
        &self.entries
    }

    /// Channels with a live listener
    pub fn channels(&self) -> Vec<String> {
        self.router.channels()
    }
}
