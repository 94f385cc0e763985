//! Channel registry
//!
//! Maps channel name to the handles currently subscribed to it. Channels
//! exist implicitly: the entry is created on first subscribe and pruned as
//! soon as its last subscriber leaves, so churn never accumulates empty
//! entries.
//!
//! Every mutation and every snapshot takes the same lock, so a snapshot is
//! always a consistent point-in-time copy. Fan-out visits the subscribers
//! under that lock as well, which puts concurrent publishes in one order that
//! every subscriber of a channel observes.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::subscriber::{SubscriberHandle, SubscriberId};

#[derive(Debug, Default)]
struct Channels {
    members: HashMap<String, HashMap<SubscriberId, SubscriberHandle>>,
    // subscriber -> the one channel it is registered on
    memberships: HashMap<SubscriberId, String>,
}

#[derive(Debug, Default)]
pub struct ChannelRegistry {
    inner: Mutex<Channels>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `handle` to `channel`. Re-subscribing is a no-op; subscribing to a
    /// different channel moves the handle there.
    pub fn subscribe(&self, channel: &str, handle: SubscriberHandle) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = handle.id().clone();

        if let Some(previous) = inner.memberships.get(&id).cloned() {
            if previous == channel {
                return;
            }
            Self::remove_member(&mut inner, &previous, &id);
        }

        inner.memberships.insert(id.clone(), channel.to_string());
        inner
            .members
            .entry(channel.to_string())
            .or_default()
            .insert(id, handle);
    }

    /// Removes `handle` from `channel`. Unknown handles and channels are
    /// ignored so late or duplicate cleanup is harmless.
    pub fn unsubscribe(&self, channel: &str, handle: &SubscriberHandle) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = handle.id();

        if inner.memberships.get(id).map(String::as_str) == Some(channel) {
            inner.memberships.remove(id);
        }
        Self::remove_member(&mut inner, channel, id);
    }

    /// Point-in-time copy of the handles subscribed to `channel`.
    pub fn subscribers_of(&self, channel: &str) -> Vec<SubscriberHandle> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .members
            .get(channel)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Calls `visit` on every handle subscribed to `channel` while holding the
    /// registry lock and returns how many were visited. `visit` must not block
    /// and must not call back into the registry.
    pub fn for_each_subscriber(
        &self,
        channel: &str,
        mut visit: impl FnMut(&SubscriberHandle),
    ) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(set) = inner.members.get(channel) else {
            return 0;
        };
        for handle in set.values() {
            visit(handle);
        }
        set.len()
    }

    pub fn contains(&self, channel: &str, id: &SubscriberId) -> bool {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .members
            .get(channel)
            .is_some_and(|set| set.contains_key(id))
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.members.get(channel).map_or(0, HashMap::len)
    }

    pub fn channel_count(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.members.len()
    }

    fn remove_member(inner: &mut Channels, channel: &str, id: &SubscriberId) {
        if let Some(set) = inner.members.get_mut(channel) {
            set.remove(id);
            if set.is_empty() {
                inner.members.remove(channel);
            }
        }
    }
}
