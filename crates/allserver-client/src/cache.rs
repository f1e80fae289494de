use std::collections::HashMap;
use std::sync::Arc;

use allserver_common::Envelope;
use parking_lot::RwLock;

/// Introspection snapshots keyed by server URI.
///
/// Owned by a [`ClientFactory`](crate::ClientFactory) and shared by every
/// client it creates, so a server is introspected once no matter how many
/// clients point at it. Only successful snapshots are stored; a failing server
/// is simply introspected again on the next dynamic call.
///
/// Concurrent first callers may each introspect. They converge on the same
/// cached state.
#[derive(Debug, Clone, Default)]
pub struct IntrospectionCache {
    entries: Arc<RwLock<HashMap<String, Envelope>>>,
}

impl IntrospectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uri: &str) -> Option<Envelope> {
        self.entries.read().get(uri).cloned()
    }

    pub fn insert(&self, uri: impl Into<String>, snapshot: Envelope) {
        self.entries.write().insert(uri.into(), snapshot);
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.entries.read().contains_key(uri)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
