//! Channel Subscription Manager
//!
//! Binds notification channels to typed handlers. A subscriber states the
//! payload type it expects and how to turn that payload into its owner's
//! message type `M`; routing decodes each payload once per subscriber and
//! returns the produced messages for the owner to apply.
//!
//! Registrations live as long as the returned [`Subscription`] guard. Dropping
//! the guard (or calling [`Subscription::unsubscribe`]) removes the listener
//! immediately, so no delivery can reach a component that is gone.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::events::{identified_channel, ChannelPayload};

type Decoder<M> = Box<dyn Fn(&Value) -> Result<M, serde_json::Error>>;

struct Registry<M> {
    channels: HashMap<String, Vec<(u64, Decoder<M>)>>,
    next_id: u64,
}

impl<M> Registry<M> {
    fn remove(&mut self, channel: &str, id: u64) {
        if let Some(listeners) = self.channels.get_mut(channel) {
            listeners.retain(|(listener_id, _)| *listener_id != id);
            if listeners.is_empty() {
                self.channels.remove(channel);
            }
        }
    }
}

/// Registry of channel name to typed listeners
///
/// Cloning shares the same registry.
pub struct ChannelRouter<M> {
    registry: Rc<RefCell<Registry<M>>>,
}

impl<M> Clone for ChannelRouter<M> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<M: 'static> Default for ChannelRouter<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: 'static> ChannelRouter<M> {
    pub fn new() -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry {
                channels: HashMap::new(),
                next_id: 0,
            })),
        }
    }

    /// Register one listener on `channel`
    pub fn subscribe<T, F>(&self, channel: &str, map: F) -> Subscription
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) -> M + 'static,
    {
        let decoder: Decoder<M> = Box::new(move |payload| T::deserialize(payload).map(&map));

        let id = {
            let mut registry = self.registry.borrow_mut();
            let id = registry.next_id;
            registry.next_id += 1;
            registry
                .channels
                .entry(channel.to_string())
                .or_default()
                .push((id, decoder));
            id
        };
        log::debug!("subscribe: {} (#{})", channel, id);

        let weak: Weak<RefCell<Registry<M>>> = Rc::downgrade(&self.registry);
        let owned_channel = channel.to_string();
        Subscription {
            channel: channel.to_string(),
            release: Some(Box::new(move || {
                if let Some(registry) = weak.upgrade() {
                    registry.borrow_mut().remove(&owned_channel, id);
                }
            })),
        }
    }

    /// Register on the payload type's own base channel
    pub fn subscribe_to<E, F>(&self, map: F) -> Subscription
    where
        E: ChannelPayload,
        F: Fn(E) -> M + 'static,
    {
        self.subscribe::<E, F>(E::CHANNEL, map)
    }

    /// Register on `"<base>:<id>"` for one entity
    pub fn subscribe_identified<E, F>(&self, id: impl std::fmt::Display, map: F) -> Subscription
    where
        E: ChannelPayload,
        F: Fn(E) -> M + 'static,
    {
        self.subscribe::<E, F>(&identified_channel(E::CHANNEL, id), map)
    }

    /// Deliver a payload to every listener of `channel`
    ///
    /// Listeners whose payload type does not match are skipped with a
    /// warning; the rest still receive the notification.
    pub fn route(&self, channel: &str, payload: &Value) -> Vec<M> {
        let registry = self.registry.borrow();
        let Some(listeners) = registry.channels.get(channel) else {
            log::trace!("route: no listeners on {}", channel);
            return Vec::new();
        };

        listeners
            .iter()
            .filter_map(|(id, decode)| match decode(payload) {
                Ok(message) => Some(message),
                Err(e) => {
                    log::warn!(
                        "Skipping malformed payload on {} for listener #{}: {}",
                        channel,
                        id,
                        e
                    );
                    None
                }
            })
            .collect()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.registry
            .borrow()
            .channels
            .get(channel)
            .map_or(0, Vec::len)
    }

    /// Channels with at least one listener
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.registry.borrow().channels.keys().cloned().collect();
        channels.sort();
        channels
    }
}

/// Guard for one registration
pub struct Subscription {
    channel: String,
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Remove the listener now
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            log::debug!("unsubscribe: {}", self.channel);
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .finish()
    }
}
