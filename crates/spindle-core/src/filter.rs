//! Filter/Query Reconciler
//!
//! Holds the user's directory and tag selection and keeps the entry list of
//! one interactive list context in step with it. Every selection change
//! recomputes the canonical filter; a query is only sent when that filter
//! differs from the one sent last, so repeated clicks on the same state cost
//! nothing.
//!
//! Responses are matched to queries by generation (see [`crate::sync`]): a
//! late response to a superseded filter is dropped instead of overwriting the
//! current result.

use std::collections::BTreeMap;

use crate::commands::{CommandClient, Pending};
use crate::models::{EntryView, FilterSelection, TagSelection, TagView};
use crate::subscription::{ChannelRouter, Subscription};
use crate::sync::{EntityKind, EntitySynchronizer, EntryKind, EntryQuery, SyncEvent};
use crate::types::{ContextId, MetadataId, TagId, TagNameId};

enum ContextState {
    Creating(Pending<ContextId>),
    Ready(ContextId),
    Failed,
    Closed,
}

pub struct FilterReconciler {
    client: CommandClient,
    context: ContextState,
    entries: Option<EntitySynchronizer<EntryKind>>,
    directories: Vec<String>,
    tags: BTreeMap<TagNameId, Vec<TagSelection>>,
    last_issued: Option<FilterSelection>,
    queries_issued: usize,
    _subscriptions: Vec<Subscription>,
}

impl FilterReconciler {
    /// Request a new context and listen for entry changes
    ///
    /// Selection changes made before the context exists are applied once it
    /// does.
    pub fn new<M, F>(client: CommandClient, router: &ChannelRouter<M>, map: F) -> Self
    where
        M: 'static,
        F: Fn(SyncEvent<EntryKind>) -> M + Clone + 'static,
    {
        let context = ContextState::Creating(client.create_context());
        Self {
            client,
            context,
            entries: None,
            directories: Vec::new(),
            tags: BTreeMap::new(),
            last_issued: None,
            queries_issued: 0,
            _subscriptions: EntryKind::subscribe(router, map),
        }
    }

    // ------------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------------

    pub fn context_id(&self) -> Option<&str> {
        match &self.context {
            ContextState::Ready(id) => Some(id.as_str()),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.entries.is_some()
    }

    pub fn entries(&self) -> &[EntryView] {
        self.entries.as_ref().map(|e| e.items()).unwrap_or(&[])
    }

    pub fn is_loading(&self) -> bool {
        self.entries.as_ref().is_some_and(|e| e.is_loading())
    }

    /// Canonical filter for the current selection
    pub fn filter(&self) -> FilterSelection {
        FilterSelection {
            directories: self.directories.clone(),
            tags: self.tags.clone(),
        }
        .canonical()
    }

    /// Filter sent with the most recent query
    pub fn last_issued(&self) -> Option<&FilterSelection> {
        self.last_issued.as_ref()
    }

    /// Filter-driven queries sent so far
    pub fn queries_issued(&self) -> usize {
        self.queries_issued
    }

    pub fn directories(&self) -> &[String] {
        &self.directories
    }

    pub fn tag_selection(&self, name_id: TagNameId) -> &[TagSelection] {
        self.tags.get(&name_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_tag_selected(&self, name_id: TagNameId, tag_id: TagId) -> bool {
        self.tag_selection(name_id)
            .iter()
            .any(|s| s.id == tag_id && s.selected)
    }

    // ------------------------------------------------------------------------
    // Selection (each setter reconciles; returns whether a query went out)
    // ------------------------------------------------------------------------

    pub fn set_directories(&mut self, directories: Vec<String>) -> bool {
        self.directories = directories;
        self.reconcile()
    }

    pub fn toggle_directory(&mut self, path: &str) -> bool {
        match self.directories.iter().position(|d| d == path) {
            Some(index) => {
                self.directories.remove(index);
            }
            None => self.directories.push(path.to_string()),
        }
        self.reconcile()
    }

    pub fn set_tag_selection(&mut self, name_id: TagNameId, selection: Vec<TagSelection>) -> bool {
        if selection.is_empty() {
            self.tags.remove(&name_id);
        } else {
            self.tags.insert(name_id, selection);
        }
        self.reconcile()
    }

    pub fn toggle_tag(&mut self, name_id: TagNameId, tag: &TagView) -> bool {
        let selection = self.tags.entry(name_id).or_default();
        match selection.iter_mut().find(|s| s.id == tag.id) {
            Some(existing) => existing.selected = !existing.selected,
            None => selection.push(TagSelection::selected(tag)),
        }
        self.reconcile()
    }

    pub fn clear(&mut self) -> bool {
        self.directories.clear();
        self.tags.clear();
        self.reconcile()
    }

    /// Send a query if the filter changed since the last one
    ///
    /// Deferred (returns false) until the context exists.
    pub fn reconcile(&mut self) -> bool {
        let filter = self.filter();
        let Some(entries) = self.entries.as_mut() else {
            return false;
        };
        if self.last_issued.as_ref() == Some(&filter) {
            log::trace!("filter unchanged, no query");
            return false;
        }

        let context_id = entries.query().context_id.clone();
        let generation = entries.set_query(EntryQuery {
            context_id,
            filter: filter.clone(),
        });
        log::debug!(
            "entries query #{}: {} directories, {} tag names",
            generation,
            filter.directories.len(),
            filter.tags.len()
        );
        self.last_issued = Some(filter);
        self.queries_issued += 1;
        true
    }

    // ------------------------------------------------------------------------
    // Event loop
    // ------------------------------------------------------------------------

    pub fn apply(&mut self, event: SyncEvent<EntryKind>) -> bool {
        match self.entries.as_mut() {
            Some(entries) => entries.apply(event),
            None => false,
        }
    }

    /// Resolve the context and apply completed entry fetches
    pub fn poll(&mut self) -> bool {
        let created = match &mut self.context {
            ContextState::Creating(pending) => pending.try_take(),
            _ => None,
        };
        match created {
            Some(Ok(context_id)) => {
                log::info!("interactive list context {} created", context_id);
                self.entries = Some(EntitySynchronizer::new(
                    self.client.clone(),
                    EntryQuery {
                        context_id: context_id.clone(),
                        filter: FilterSelection::default(),
                    },
                ));
                self.context = ContextState::Ready(context_id);
                self.reconcile();
            }
            Some(Err(e)) => {
                log::error!("Failed to create interactive list context: {}", e);
                self.context = ContextState::Failed;
            }
            None => {}
        }

        self.entries.as_mut().is_some_and(|e| e.poll())
    }

    // ------------------------------------------------------------------------
    // Context-scoped commands
    // ------------------------------------------------------------------------

    /// Assign a tag to an entry; the change comes back as `EntryChanged`
    pub fn create_tag(&self, metadata_id: MetadataId, name_id: TagNameId, value: &str) -> bool {
        let Some(context_id) = self.context_id() else {
            log::warn!("create_tag: no context yet");
            return false;
        };
        self.client
            .detach(self.client.create_tag(context_id, metadata_id, name_id, value));
        true
    }

    pub fn tag_creation_suggestions(
        &self,
        tag_name_id: TagNameId,
        input: &str,
    ) -> Option<Pending<Vec<String>>> {
        let context_id = self.context_id()?;
        Some(
            self.client
                .get_tag_creation_suggestions(context_id, tag_name_id, input),
        )
    }

    /// Delete the context on the backend and forget the entries
    pub fn close(&mut self) {
        if let ContextState::Ready(context_id) = &self.context {
            log::info!("closing interactive list context {}", context_id);
            self.client.detach(self.client.delete_context(context_id));
        }
        self.context = ContextState::Closed;
        self.entries = None;
    }
}

impl Drop for FilterReconciler {
    fn drop(&mut self) {
        self.close();
    }
}
