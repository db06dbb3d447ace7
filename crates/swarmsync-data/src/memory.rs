//! In-process stand-ins for the DHT and the messaging layer.

use std::collections::VecDeque;

use dashmap::DashMap;

use crate::error::{DataError, Result};
use crate::keys::{ContentKey, LocationKey, ProtectionKeys};
use crate::message::{Message, MessageManager, PeerId, SendHandle, SendOutcome};
use crate::store::DataManager;

type Key = (LocationKey, ContentKey);

struct Entry {
    data:  Vec<u8>,
    guard: Vec<u8>,
}

/// [`DataManager`] over a concurrent map.
///
/// Mirrors the DHT's protection rule: an existing entry may only be
/// overwritten or removed by a caller presenting the same public key.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<Key, Entry>,
}

fn describe(location: &LocationKey, content: &ContentKey) -> String { format!("{location}/{content}") }

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn contains(&self, location: &LocationKey, content: &ContentKey) -> bool {
        self.entries.contains_key(&(location.clone(), content.clone()))
    }
}

impl DataManager for MemoryStore {
    fn get(&self, location: &LocationKey, content: &ContentKey) -> Result<Option<Vec<u8>>> {
        let key = (location.clone(), content.clone());
        Ok(self.entries.get(&key).map(|entry| entry.data.clone()))
    }

    fn put(&self, location: &LocationKey, content: &ContentKey, data: &[u8], protection: &ProtectionKeys) -> Result<()> {
        let key = (location.clone(), content.clone());
        let mut slot = self.entries.entry(key).or_insert_with(|| Entry {
            data:  Vec::new(),
            guard: protection.public().to_vec(),
        });
        if slot.guard != protection.public() {
            return Err(DataError::Denied(describe(location, content)));
        }
        slot.data = data.to_vec();
        tracing::trace!(location = %location, content = %content, bytes = data.len(), "put");
        Ok(())
    }

    fn remove(&self, location: &LocationKey, content: &ContentKey, protection: &ProtectionKeys) -> Result<()> {
        let key = (location.clone(), content.clone());
        let removed = self
            .entries
            .remove_if(&key, |_, entry| entry.guard == protection.public());
        match removed {
            Some(_) => Ok(()),
            None if self.entries.contains_key(&key) => Err(DataError::Denied(describe(location, content))),
            None => Err(DataError::NotFound(describe(location, content))),
        }
    }

    fn change_protection_key(
        &self,
        location: &LocationKey,
        content: &ContentKey,
        old: &ProtectionKeys,
        new: &ProtectionKeys,
    ) -> Result<()> {
        let key = (location.clone(), content.clone());
        let mut entry = self
            .entries
            .get_mut(&key)
            .ok_or_else(|| DataError::NotFound(describe(location, content)))?;
        if entry.guard != old.public() {
            return Err(DataError::Denied(describe(location, content)));
        }
        entry.guard = new.public().to_vec();
        Ok(())
    }
}

/// [`MessageManager`] that records every message it is asked to send.
///
/// Outcomes can be scripted per peer; once a script runs out, sends succeed.
#[derive(Default)]
pub struct MemoryMessenger {
    sent:    DashMap<PeerId, Vec<Message>>,
    scripts: DashMap<PeerId, VecDeque<SendOutcome>>,
}

impl MemoryMessenger {
    pub fn new() -> Self { Self::default() }

    /// Queues the outcomes of the next sends to `peer`.
    pub fn script(&self, peer: &PeerId, outcomes: impl IntoIterator<Item = SendOutcome>) {
        self.scripts.entry(peer.clone()).or_default().extend(outcomes);
    }

    /// Messages sent to `peer`, including attempts that did not succeed.
    pub fn sent_to(&self, peer: &PeerId) -> Vec<Message> {
        self.sent.get(peer).map(|m| m.value().clone()).unwrap_or_default()
    }
}

impl MessageManager for MemoryMessenger {
    fn send(&self, peer: &PeerId, message: &Message) -> SendHandle {
        self.sent.entry(peer.clone()).or_default().push(message.clone());
        let outcome = self
            .scripts
            .get_mut(peer)
            .and_then(|mut script| script.pop_front())
            .unwrap_or(SendOutcome::Success);
        SendHandle::ready(outcome)
    }
}
