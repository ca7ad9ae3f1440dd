//! Entity Synchronizer
//!
//! Keeps one local collection consistent with the backend. The collection
//! starts from one authoritative list fetch and then follows notifications:
//!
//! ```text
//!   Created(id)          → hydrate (placeholder or fetch-by-id), append if absent
//!   Updated{id, Some(x)} → replace in place, ignored if id unknown
//!   Updated{id, None}    → remove if present, cancel its pending hydration
//!   ItemChanged(x)       → replace in place without a round trip
//!   ListInvalidated      → refetch the whole list under the current query
//! ```
//!
//! What differs between entity kinds (fetch commands, id accessor, channels)
//! lives in an [`EntityKind`] descriptor; see [`kinds`] for the instances.
//!
//! Every list fetch carries a generation number. Only the response to the most
//! recently issued fetch is applied, so a slow reply to an old query can never
//! overwrite a newer one.

pub mod kinds;

use serde::de::DeserializeOwned;
use std::fmt::Debug;

use crate::commands::{CommandClient, Pending};
use crate::subscription::{ChannelRouter, Subscription};

pub use kinds::{DeckKind, EntryKind, EntryQuery, TagKind, TagNameKind, TaskKind};

/// How a newly announced entity becomes a full item
pub enum Hydration<T> {
    /// Known immediately (e.g. an empty placeholder)
    Ready(T),
    /// Needs a fetch-by-id
    Fetch(Pending<T>),
    /// Kind cannot hydrate single items; refetch the list instead
    Unsupported,
}

/// Descriptor of one synchronized entity kind
pub trait EntityKind: Sized + 'static {
    type Id: Clone + PartialEq + Debug + 'static;
    type Item: Clone + Debug + DeserializeOwned + 'static;
    type Query: Clone + Debug;

    /// Used in log lines
    const NAME: &'static str;

    fn id_of(item: &Self::Item) -> Self::Id;

    fn fetch_all(client: &CommandClient, query: &Self::Query) -> Pending<Vec<Self::Item>>;

    fn hydrate(_client: &CommandClient, _id: &Self::Id) -> Hydration<Self::Item> {
        Hydration::Unsupported
    }

    /// Wire this kind's notification channels into `SyncEvent`s
    fn subscribe<M, F>(_router: &ChannelRouter<M>, _map: F) -> Vec<Subscription>
    where
        M: 'static,
        F: Fn(SyncEvent<Self>) -> M + Clone + 'static,
    {
        Vec::new()
    }
}

/// Change notification for one entity kind
pub enum SyncEvent<K: EntityKind> {
    Created(K::Id),
    Updated { id: K::Id, item: Option<K::Item> },
    ListInvalidated,
    ItemChanged(K::Item),
}

impl<K: EntityKind> Debug for SyncEvent<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created(id) => f.debug_tuple("Created").field(id).finish(),
            Self::Updated { id, item } => f
                .debug_struct("Updated")
                .field("id", id)
                .field("item", item)
                .finish(),
            Self::ListInvalidated => f.write_str("ListInvalidated"),
            Self::ItemChanged(item) => f.debug_tuple("ItemChanged").field(item).finish(),
        }
    }
}

/// Local mirror of one backend collection
pub struct EntitySynchronizer<K: EntityKind> {
    client: CommandClient,
    query: K::Query,
    items: Vec<K::Item>,
    initialized: bool,
    /// Generation of the most recently issued list fetch
    generation: u64,
    list_fetches: Vec<(u64, Pending<Vec<K::Item>>)>,
    hydrations: Vec<(K::Id, Pending<K::Item>)>,
    stale_discarded: usize,
}

impl<K: EntityKind> EntitySynchronizer<K> {
    /// Empty synchronizer; nothing is fetched until [`Self::initialize`]
    pub fn new(client: CommandClient, query: K::Query) -> Self {
        Self {
            client,
            query,
            items: Vec::new(),
            initialized: false,
            generation: 0,
            list_fetches: Vec::new(),
            hydrations: Vec::new(),
            stale_discarded: 0,
        }
    }

    /// Issue the initial authoritative fetch
    pub fn initialize(&mut self) {
        log::debug!("{}: initial fetch", K::NAME);
        self.refetch();
    }

    /// Fetch the whole list again under the current query
    ///
    /// Returns the generation of the issued fetch.
    pub fn refetch(&mut self) -> u64 {
        self.generation += 1;
        let pending = K::fetch_all(&self.client, &self.query);
        self.list_fetches.push((self.generation, pending));
        self.generation
    }

    /// Replace the query and refetch under it
    pub fn set_query(&mut self, query: K::Query) -> u64 {
        self.query = query;
        self.refetch()
    }

    pub fn query(&self) -> &K::Query {
        &self.query
    }

    pub fn items(&self) -> &[K::Item] {
        &self.items
    }

    pub fn get(&self, id: &K::Id) -> Option<&K::Item> {
        self.items.iter().find(|item| K::id_of(item) == *id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True once the first list response has been applied
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// True while a list fetch is in flight
    pub fn is_loading(&self) -> bool {
        !self.list_fetches.is_empty()
    }

    /// List responses dropped because a newer fetch had been issued
    pub fn stale_discarded(&self) -> usize {
        self.stale_discarded
    }

    fn position(&self, id: &K::Id) -> Option<usize> {
        self.items.iter().position(|item| K::id_of(item) == *id)
    }

    fn upsert(&mut self, item: K::Item) {
        let id = K::id_of(&item);
        match self.position(&id) {
            Some(index) => self.items[index] = item,
            None => self.items.push(item),
        }
    }

    /// Forget in-flight fetch-by-id replies for `id`; returns whether any were
    fn cancel_hydration(&mut self, id: &K::Id) -> bool {
        let before = self.hydrations.len();
        self.hydrations.retain(|(pending_id, _)| pending_id != id);
        self.hydrations.len() != before
    }

    /// Apply one notification; returns whether the collection changed
    pub fn apply(&mut self, event: SyncEvent<K>) -> bool {
        match event {
            SyncEvent::Created(id) => match K::hydrate(&self.client, &id) {
                // A placeholder never replaces what a fetch already filled in
                Hydration::Ready(_) if self.position(&id).is_some() => {
                    log::debug!("{}: {:?} already known", K::NAME, id);
                    false
                }
                Hydration::Ready(item) => {
                    self.items.push(item);
                    true
                }
                Hydration::Fetch(pending) => {
                    self.hydrations.push((id, pending));
                    false
                }
                Hydration::Unsupported => {
                    self.refetch();
                    false
                }
            },
            SyncEvent::Updated { id, item: Some(item) } => match self.position(&id) {
                Some(index) => {
                    self.items[index] = item;
                    true
                }
                // Newer than whatever the fetch-by-id will return
                None if self.cancel_hydration(&id) => {
                    self.items.push(item);
                    true
                }
                None => {
                    log::debug!("{}: update for unknown id {:?} ignored", K::NAME, id);
                    false
                }
            },
            SyncEvent::Updated { id, item: None } => {
                if self.cancel_hydration(&id) {
                    log::debug!("{}: {:?} removed before its fetch completed", K::NAME, id);
                }
                match self.position(&id) {
                    Some(index) => {
                        self.items.remove(index);
                        true
                    }
                    None => false,
                }
            }
            SyncEvent::ItemChanged(item) => {
                let id = K::id_of(&item);
                match self.position(&id) {
                    Some(index) => {
                        self.items[index] = item;
                        true
                    }
                    None => {
                        log::debug!("{}: change for unknown id {:?} ignored", K::NAME, id);
                        false
                    }
                }
            }
            SyncEvent::ListInvalidated => {
                self.refetch();
                false
            }
        }
    }

    /// Apply completed fetches; returns whether the collection changed
    pub fn poll(&mut self) -> bool {
        let mut changed = false;

        let mut completed = Vec::new();
        self.list_fetches
            .retain_mut(|(generation, pending)| match pending.try_take() {
                None => true,
                Some(result) => {
                    completed.push((*generation, result));
                    false
                }
            });

        for (generation, result) in completed {
            match result {
                Ok(items) if generation == self.generation => {
                    log::debug!("{}: {} items (fetch #{})", K::NAME, items.len(), generation);
                    self.items = items;
                    self.initialized = true;
                    changed = true;
                }
                Ok(_) => {
                    self.stale_discarded += 1;
                    log::debug!(
                        "{}: discarding stale response #{} (latest #{})",
                        K::NAME,
                        generation,
                        self.generation
                    );
                }
                Err(e) => log::error!("{}: list fetch failed: {}", K::NAME, e),
            }
        }

        let mut hydrated = Vec::new();
        self.hydrations
            .retain_mut(|(_, pending)| match pending.try_take() {
                None => true,
                Some(result) => {
                    hydrated.push(result);
                    false
                }
            });

        for result in hydrated {
            match result {
                Ok(item) => {
                    self.upsert(item);
                    changed = true;
                }
                Err(e) => log::error!("{}: fetch by id failed: {}", K::NAME, e),
            }
        }

        changed
    }
}
