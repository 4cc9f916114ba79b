//! The local document store the mirror exchanges edits with.

use crate::error::{SyncError, SyncResult};
use crate::peer::PeerId;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use textmirror_protocol::Update;
use tokio::sync::mpsc;

/// Options for subscribing to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Merge type of the document.
    pub merge_type: String,
    /// Peer of the subscriber; its own puts are not echoed back.
    pub peer: PeerId,
}

/// A versioned document store.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Subscribes to every update put under `key` by other peers.
    async fn subscribe(
        &self,
        key: &str,
        options: StoreOptions,
    ) -> SyncResult<mpsc::UnboundedReceiver<Update>>;

    /// Records an update made by `peer`.
    async fn put(&self, key: &str, update: Update, peer: &PeerId) -> SyncResult<()>;
}

#[derive(Debug, Default)]
struct Document {
    history: Vec<Update>,
    subscribers: Vec<(PeerId, mpsc::UnboundedSender<Update>)>,
}

/// In-process document store.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<HashMap<String, Document>>,
}

impl MemoryDocumentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every update recorded under `key`, in order.
    pub fn history(&self, key: &str) -> Vec<Update> {
        self.documents
            .lock()
            .get(key)
            .map(|doc| doc.history.clone())
            .unwrap_or_default()
    }

    /// Keys with at least one subscriber or update.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.documents.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn subscribe(
        &self,
        key: &str,
        options: StoreOptions,
    ) -> SyncResult<mpsc::UnboundedReceiver<Update>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.documents
            .lock()
            .entry(key.to_string())
            .or_default()
            .subscribers
            .push((options.peer, tx));
        Ok(rx)
    }

    async fn put(&self, key: &str, update: Update, peer: &PeerId) -> SyncResult<()> {
        if update.version.is_empty() {
            return Err(SyncError::Store(format!(
                "refusing update without a version for {key}"
            )));
        }

        let mut documents = self.documents.lock();
        let document = documents.entry(key.to_string()).or_default();
        document.subscribers.retain(|(_, tx)| !tx.is_closed());
        for (subscriber, tx) in &document.subscribers {
            if subscriber != peer {
                let _ = tx.send(update.clone());
            }
        }
        document.history.push(update);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use textmirror_protocol::Version;

    fn options(peer: &str) -> StoreOptions {
        StoreOptions {
            merge_type: "dt".into(),
            peer: PeerId::new(peer),
        }
    }

    fn update(id: &str) -> Update {
        Update::snapshot(Version::single(id), Version::empty(), id)
    }

    #[tokio::test]
    async fn puts_are_not_echoed_to_the_author() {
        let store = MemoryDocumentStore::new();
        let mut a = store.subscribe("doc", options("a")).await.unwrap();
        let mut b = store.subscribe("doc", options("b")).await.unwrap();

        store.put("doc", update("a-1"), &PeerId::new("a")).await.unwrap();

        assert_eq!(b.recv().await.unwrap(), update("a-1"));
        assert!(a.try_recv().is_err());
        assert_eq!(store.history("doc"), vec![update("a-1")]);
    }

    #[tokio::test]
    async fn documents_are_isolated() {
        let store = MemoryDocumentStore::new();
        let mut other = store.subscribe("other", options("x")).await.unwrap();

        store.put("doc", update("a-1"), &PeerId::new("a")).await.unwrap();

        assert!(other.try_recv().is_err());
        assert!(store.history("other").is_empty());
        assert_eq!(store.keys(), vec!["doc".to_string(), "other".to_string()]);
    }

    #[tokio::test]
    async fn closed_subscribers_are_pruned() {
        let store = MemoryDocumentStore::new();
        let gone = store.subscribe("doc", options("gone")).await.unwrap();
        drop(gone);

        store.put("doc", update("a-1"), &PeerId::new("a")).await.unwrap();
        assert!(store.documents.lock()["doc"].subscribers.is_empty());
    }

    #[tokio::test]
    async fn rejects_empty_version() {
        let store = MemoryDocumentStore::new();
        let result = store.put("doc", Update::default(), &PeerId::new("a")).await;
        assert!(matches!(result, Err(SyncError::Store(_))));
    }
}
