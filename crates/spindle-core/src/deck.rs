//! Deck Playback Controller
//!
//! Mirrors the playback state of each deck. State only ever moves in response
//! to backend notifications; user intents (play, pause, seek, load) are sent
//! as commands and show up locally once the backend reports the new status.
//!
//! ```text
//!   Absent ──metadata──► Absent payload/status
//!                          │ status
//!                          ▼
//!                  Loading{progress} ──► Playing{offset} ⇄ Paused{offset}
//! ```
//!
//! A metadata notification always resets payload and status to absent: a new
//! track never inherits the previous track's progress.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::commands::CommandClient;
use crate::events::{
    AudioDeckFileMetadataUpdated, AudioDeckFilePayloadUpdated, AudioDeckFileStatusUpdated,
};
use crate::models::{
    DeckFileMetadataSnapshot, DeckFilePayloadSnapshot, DeckFileStatus, DeckView,
};
use crate::subscription::{ChannelRouter, Subscription};
use crate::sync::{DeckKind, EntityKind, EntitySynchronizer, SyncEvent};
use crate::types::{DeckId, MetadataId, VariationId};

/// Per-deck notification, already routed by deck id
#[derive(Debug, Clone, PartialEq)]
pub enum DeckEvent {
    Metadata(DeckFileMetadataSnapshot),
    Payload(DeckFilePayloadSnapshot),
    Status(DeckFileStatus),
}

/// Playback state and controls for one deck
pub struct DeckController {
    id: DeckId,
    client: CommandClient,
    metadata: Option<DeckFileMetadataSnapshot>,
    payload: Option<DeckFilePayloadSnapshot>,
    status: Option<DeckFileStatus>,
    _subscriptions: Vec<Subscription>,
}

impl DeckController {
    /// Create a controller listening on this deck's identified channels
    pub fn new<M, F>(id: DeckId, client: CommandClient, router: &ChannelRouter<M>, map: F) -> Self
    where
        M: 'static,
        F: Fn(DeckEvent) -> M + Clone + 'static,
    {
        let on_metadata = map.clone();
        let on_payload = map.clone();
        let on_status = map;
        let subscriptions = vec![
            router.subscribe_identified(id, move |e: AudioDeckFileMetadataUpdated| {
                on_metadata(DeckEvent::Metadata(e.metadata))
            }),
            router.subscribe_identified(id, move |e: AudioDeckFilePayloadUpdated| {
                on_payload(DeckEvent::Payload(e.payload))
            }),
            router.subscribe_identified(id, move |e: AudioDeckFileStatusUpdated| {
                on_status(DeckEvent::Status(e.status))
            }),
        ];

        Self {
            id,
            client,
            metadata: None,
            payload: None,
            status: None,
            _subscriptions: subscriptions,
        }
    }

    /// Take initial state from a fetched deck view
    pub fn seed(&mut self, view: &DeckView) {
        if let Some(file) = &view.file {
            self.metadata = Some(file.metadata.clone());
            self.payload = Some(file.payload.clone());
            self.status = Some(file.status);
        }
    }

    pub fn apply(&mut self, event: DeckEvent) {
        match event {
            DeckEvent::Metadata(metadata) => {
                log::debug!("deck {}: loaded {:?}", self.id, metadata.title);
                self.metadata = Some(metadata);
                self.payload = None;
                self.status = None;
            }
            DeckEvent::Payload(payload) => self.payload = Some(payload),
            DeckEvent::Status(status) => self.status = Some(status),
        }
    }

    pub fn id(&self) -> DeckId {
        self.id
    }

    pub fn metadata(&self) -> Option<&DeckFileMetadataSnapshot> {
        self.metadata.as_ref()
    }

    pub fn payload(&self) -> Option<&DeckFilePayloadSnapshot> {
        self.payload.as_ref()
    }

    pub fn status(&self) -> Option<DeckFileStatus> {
        self.status
    }

    /// Playback progress in percent (0 - 100)
    ///
    /// Zero while loading, when nothing is known, or when the file has no
    /// samples.
    pub fn progress(&self) -> f64 {
        let (Some(payload), Some(offset)) = (&self.payload, self.status.and_then(|s| s.offset()))
        else {
            return 0.0;
        };
        if payload.samples_count == 0 {
            return 0.0;
        }
        offset as f64 / payload.samples_count as f64 * 100.0
    }

    /// Playback position in seconds, when rate and offset are known
    pub fn position_seconds(&self) -> Option<f64> {
        let payload = self.payload.as_ref()?;
        let offset = self.status?.offset()?;
        if payload.sample_rate == 0 {
            return None;
        }
        Some(offset as f64 / payload.sample_rate as f64)
    }

    // ------------------------------------------------------------------------
    // Commands (no local state change until the backend reports back)
    // ------------------------------------------------------------------------

    pub fn set_status(&self, status: DeckFileStatus) {
        self.client
            .detach(self.client.set_deck_status(self.id, status));
    }

    /// Request play/pause; returns false when there is nothing to toggle
    pub fn toggle_play(&self) -> bool {
        match self.status.and_then(|s| s.toggled()) {
            Some(next) => {
                self.set_status(next);
                true
            }
            None => false,
        }
    }

    /// Request a seek to `offset`, clamped to the file length
    pub fn seek(&self, offset: u64) -> bool {
        let offset = match &self.payload {
            Some(payload) => offset.min(payload.samples_count),
            None => offset,
        };
        match self.status.and_then(|s| s.with_offset(offset)) {
            Some(next) => {
                self.set_status(next);
                true
            }
            None => false,
        }
    }

    /// Seek to a fraction (0.0 - 1.0) of the file
    pub fn seek_to_fraction(&self, fraction: f64) -> bool {
        let Some(payload) = &self.payload else {
            return false;
        };
        let offset = (fraction.clamp(0.0, 1.0) * payload.samples_count as f64) as u64;
        self.seek(offset)
    }

    pub fn load_track_from_metadata(&self, metadata_id: MetadataId) {
        self.client
            .detach(self.client.load_track_from_metadata(self.id, metadata_id));
    }

    pub fn load_track_from_variation(&self, variation_id: VariationId) {
        self.client
            .detach(self.client.load_track_from_variation(self.id, variation_id));
    }
}

// ============================================================================
// AudioPlayer
// ============================================================================

/// Deck list plus one controller per known deck
///
/// Controllers are created when a deck appears in the list and dropped (which
/// unsubscribes them) when it disappears.
pub struct AudioPlayer<M: 'static> {
    client: CommandClient,
    router: ChannelRouter<M>,
    decks: EntitySynchronizer<DeckKind>,
    controllers: BTreeMap<DeckId, DeckController>,
    on_deck: Rc<dyn Fn(DeckId, DeckEvent) -> M>,
    _subscriptions: Vec<Subscription>,
}

impl<M: 'static> AudioPlayer<M> {
    pub fn new<L, D>(client: CommandClient, router: &ChannelRouter<M>, on_list: L, on_deck: D) -> Self
    where
        L: Fn(SyncEvent<DeckKind>) -> M + Clone + 'static,
        D: Fn(DeckId, DeckEvent) -> M + 'static,
    {
        let subscriptions = DeckKind::subscribe(router, on_list);
        let mut decks = EntitySynchronizer::new(client.clone(), ());
        decks.initialize();

        Self {
            client,
            router: router.clone(),
            decks,
            controllers: BTreeMap::new(),
            on_deck: Rc::new(on_deck),
            _subscriptions: subscriptions,
        }
    }

    /// Apply a deck-list notification
    pub fn apply_list(&mut self, event: SyncEvent<DeckKind>) -> bool {
        let changed = self.decks.apply(event);
        if changed {
            self.reconcile_controllers();
        }
        changed
    }

    /// Apply a per-deck notification; false if the deck is unknown
    pub fn apply_deck(&mut self, id: DeckId, event: DeckEvent) -> bool {
        match self.controllers.get_mut(&id) {
            Some(controller) => {
                controller.apply(event);
                true
            }
            None => false,
        }
    }

    pub fn poll(&mut self) -> bool {
        let changed = self.decks.poll();
        if changed {
            self.reconcile_controllers();
        }
        changed
    }

    fn reconcile_controllers(&mut self) {
        let known: BTreeSet<DeckId> = self.decks.items().iter().map(|d| d.id).collect();
        self.controllers.retain(|id, _| {
            let keep = known.contains(id);
            if !keep {
                log::info!("deck {} removed", id);
            }
            keep
        });

        for deck in self.decks.items() {
            if self.controllers.contains_key(&deck.id) {
                continue;
            }
            let on_deck = self.on_deck.clone();
            let id = deck.id;
            let mut controller = DeckController::new(
                id,
                self.client.clone(),
                &self.router,
                move |event| on_deck(id, event),
            );
            controller.seed(deck);
            log::info!("deck {} added", id);
            self.controllers.insert(id, controller);
        }
    }

    /// Ask the backend for a new deck; it arrives via `AudioDeckCreated`
    pub fn create_deck(&self) {
        self.client.detach(self.client.create_audio_deck());
    }

    pub fn decks(&self) -> &[DeckView] {
        self.decks.items()
    }

    pub fn is_initialized(&self) -> bool {
        self.decks.is_initialized()
    }

    pub fn controller(&self, id: DeckId) -> Option<&DeckController> {
        self.controllers.get(&id)
    }

    pub fn controllers(&self) -> impl Iterator<Item = &DeckController> {
        self.controllers.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::ScriptedBackend;
    use crate::commands::BackendCommand;
    use serde_json::json;

    #[derive(Debug)]
    enum Msg {
        List(SyncEvent<DeckKind>),
        Deck(DeckId, DeckEvent),
    }

    fn payload(samples_count: u64) -> DeckFilePayloadSnapshot {
        DeckFilePayloadSnapshot {
            duration: 10.0,
            sample_rate: 100,
            channels_count: 2,
            samples_count,
        }
    }

    fn controller(backend: &Rc<ScriptedBackend>, router: &ChannelRouter<DeckEvent>) -> DeckController {
        DeckController::new(1, CommandClient::new(backend.clone()), router, |e| e)
    }

    fn sent_statuses(backend: &ScriptedBackend) -> Vec<DeckFileStatus> {
        backend
            .commands()
            .into_iter()
            .filter_map(|c| match c {
                BackendCommand::SetDeckFileStatus { status, .. } => Some(status),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_toggle_round_trip_preserves_offset() {
        let backend = ScriptedBackend::new();
        let router = ChannelRouter::new();
        let mut deck = controller(&backend, &router);
        deck.apply(DeckEvent::Status(DeckFileStatus::Playing { offset: 250 }));

        assert!(deck.toggle_play());
        // No optimistic transition
        assert_eq!(deck.status(), Some(DeckFileStatus::Playing { offset: 250 }));

        deck.apply(DeckEvent::Status(DeckFileStatus::Paused { offset: 250 }));
        assert!(deck.toggle_play());
        deck.apply(DeckEvent::Status(DeckFileStatus::Playing { offset: 250 }));

        assert_eq!(
            sent_statuses(&backend),
            vec![
                DeckFileStatus::Paused { offset: 250 },
                DeckFileStatus::Playing { offset: 250 },
            ]
        );
        assert_eq!(deck.status(), Some(DeckFileStatus::Playing { offset: 250 }));
    }

    #[test]
    fn test_toggle_is_noop_while_loading_or_absent() {
        let backend = ScriptedBackend::new();
        let router = ChannelRouter::new();
        let mut deck = controller(&backend, &router);
        assert!(!deck.toggle_play());

        deck.apply(DeckEvent::Status(DeckFileStatus::Loading { progress: 0.3 }));
        assert!(!deck.toggle_play());
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn test_progress() {
        let backend = ScriptedBackend::new();
        let router = ChannelRouter::new();
        let mut deck = controller(&backend, &router);
        assert_eq!(deck.progress(), 0.0);

        deck.apply(DeckEvent::Payload(payload(1000)));
        deck.apply(DeckEvent::Status(DeckFileStatus::Playing { offset: 250 }));
        assert_eq!(deck.progress(), 25.0);
        assert_eq!(deck.position_seconds(), Some(2.5));

        deck.apply(DeckEvent::Status(DeckFileStatus::Loading { progress: 0.5 }));
        assert_eq!(deck.progress(), 0.0);

        deck.apply(DeckEvent::Payload(payload(0)));
        deck.apply(DeckEvent::Status(DeckFileStatus::Paused { offset: 250 }));
        assert_eq!(deck.progress(), 0.0);
    }

    #[test]
    fn test_metadata_resets_payload_and_status() {
        let backend = ScriptedBackend::new();
        let router = ChannelRouter::new();
        let mut deck = controller(&backend, &router);
        deck.apply(DeckEvent::Payload(payload(1000)));
        deck.apply(DeckEvent::Status(DeckFileStatus::Paused { offset: 10 }));

        deck.apply(DeckEvent::Metadata(DeckFileMetadataSnapshot {
            title: "Next".into(),
        }));
        assert_eq!(deck.metadata().map(|m| m.title.as_str()), Some("Next"));
        assert!(deck.payload().is_none());
        assert!(deck.status().is_none());
    }

    #[test]
    fn test_seek_clamps_and_keeps_variant() {
        let backend = ScriptedBackend::new();
        let router = ChannelRouter::new();
        let mut deck = controller(&backend, &router);
        deck.apply(DeckEvent::Payload(payload(1000)));
        deck.apply(DeckEvent::Status(DeckFileStatus::Paused { offset: 0 }));

        assert!(deck.seek(5000));
        assert!(deck.seek_to_fraction(0.5));
        assert_eq!(
            sent_statuses(&backend),
            vec![
                DeckFileStatus::Paused { offset: 1000 },
                DeckFileStatus::Paused { offset: 500 },
            ]
        );
    }

    #[test]
    fn test_load_commands_target_deck() {
        let backend = ScriptedBackend::new();
        let router = ChannelRouter::new();
        let deck = controller(&backend, &router);
        deck.load_track_from_metadata(42);
        deck.load_track_from_variation(9);

        assert_eq!(
            backend.commands(),
            vec![
                BackendCommand::LoadAudioTrackFromMetadata {
                    deck_id: 1,
                    metadata_id: 42,
                },
                BackendCommand::LoadAudioTrackFromVariation {
                    deck_id: 1,
                    variation_id: 9,
                },
            ]
        );
    }

    #[test]
    fn test_dropping_controller_unsubscribes() {
        let backend = ScriptedBackend::new();
        let router = ChannelRouter::new();
        let deck = controller(&backend, &router);
        assert_eq!(router.channels().len(), 3);
        drop(deck);
        assert!(router.channels().is_empty());
    }

    fn player(backend: &Rc<ScriptedBackend>) -> (AudioPlayer<Msg>, ChannelRouter<Msg>) {
        let router = ChannelRouter::new();
        let mut player = AudioPlayer::new(
            CommandClient::new(backend.clone()),
            &router,
            Msg::List,
            Msg::Deck,
        );
        backend.reply(
            |c| matches!(c, BackendCommand::GetAudioDecks),
            json!([
                { "id": 2, "file": null },
                { "id": 3, "file": {
                    "metadata": { "title": "Three" },
                    "payload": { "duration": 1.0, "sample_rate": 10, "channels_count": 2, "samples_count": 10 },
                    "status": { "kind": "Paused", "offset": 4 }
                }}
            ]),
        );
        assert!(player.poll());
        (player, router)
    }

    fn dispatch(player: &mut AudioPlayer<Msg>, router: &ChannelRouter<Msg>, channel: &str, payload: serde_json::Value) {
        for message in router.route(channel, &payload) {
            match message {
                Msg::List(event) => {
                    player.apply_list(event);
                }
                Msg::Deck(id, event) => {
                    player.apply_deck(id, event);
                }
            }
        }
    }

    #[test]
    fn test_identified_dispatch_isolation() {
        let backend = ScriptedBackend::new();
        let (mut player, router) = player(&backend);
        assert_eq!(
            player.controller(3).and_then(|c| c.status()),
            Some(DeckFileStatus::Paused { offset: 4 })
        );

        dispatch(
            &mut player,
            &router,
            "AudioDeckFileStatusUpdated:2",
            json!({ "id": 2, "status": { "kind": "Playing", "offset": 1 } }),
        );

        assert_eq!(
            player.controller(2).and_then(|c| c.status()),
            Some(DeckFileStatus::Playing { offset: 1 })
        );
        assert_eq!(
            player.controller(3).and_then(|c| c.status()),
            Some(DeckFileStatus::Paused { offset: 4 })
        );
    }

    #[test]
    fn test_created_deck_gets_a_controller() {
        let backend = ScriptedBackend::new();
        let (mut player, router) = player(&backend);

        player.create_deck();
        assert_eq!(
            backend.count(|c| matches!(c, BackendCommand::CreateAudioDeck)),
            1
        );

        dispatch(&mut player, &router, "AudioDeckCreated", json!({ "id": 4 }));
        assert_eq!(player.decks().len(), 3);
        assert!(player.controller(4).is_some());
        assert_eq!(router.subscriber_count("AudioDeckFileStatusUpdated:4"), 1);
    }

    #[test]
    fn test_repeated_created_keeps_populated_deck() {
        let backend = ScriptedBackend::new();
        let (mut player, router) = player(&backend);
        let before = player.decks().to_vec();

        dispatch(&mut player, &router, "AudioDeckCreated", json!({ "id": 3 }));
        assert_eq!(player.decks(), &before[..]);
        assert!(player
            .decks()
            .iter()
            .find(|d| d.id == 3)
            .is_some_and(|d| d.file.is_some()));
        assert_eq!(router.subscriber_count("AudioDeckFileStatusUpdated:3"), 1);
    }

    #[test]
    fn test_removed_deck_drops_controller() {
        let backend = ScriptedBackend::new();
        let (mut player, router) = player(&backend);

        player.apply_list(SyncEvent::Updated { id: 2, item: None });
        assert!(player.controller(2).is_none());
        assert_eq!(router.subscriber_count("AudioDeckFileMetadataUpdated:2"), 0);
        assert_eq!(router.subscriber_count("AudioDeckFileMetadataUpdated:3"), 1);
        assert_eq!(player.controllers().count(), 1);
    }
}
