//! Registry of mirrored documents and the tasks that keep them in sync.
//!
//! The document store is the hub every writer goes through. Each pinned
//! document has two store peers: the link to the remote origin and the
//! replica that owns the mirrored file. Four tasks run inside an
//! `info_span!("replica")`:
//!
//! - the remote feed, which drains the live subscription and records each
//!   update in the store under the link peer
//! - the commit relay, which queues every store commit not made by the
//!   replica itself (remote updates and other local editors alike)
//! - the replica task, which owns the [`ReplicaReconciler`], applies queued
//!   commits, writes applied states to the file sink and runs the local
//!   drain loop
//! - the local forwarder, which pushes every store commit not made by the
//!   link to the remote origin
//!
//! Un-pinning aborts all four.

use crate::channel::{ResilientChannel, Subscription};
use crate::config::MirrorConfig;
use crate::error::{SyncError, SyncResult};
use crate::peer::PeerId;
use crate::reconciler::{RemoteOutcome, ReplicaReconciler};
use crate::sink::{relative_path_for, DirectorySink, FileSink};
use crate::store::{DocumentStore, StoreOptions};
use crate::transport::{Headers, PutRequest, SubscribeRequest, Transport};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use textmirror_protocol::{Update, Version};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use url::Url;

/// Aborts its task when dropped.
#[derive(Debug)]
struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Work queued for a replica task.
#[derive(Debug)]
enum ReplicaEvent {
    /// A store commit made by another peer.
    Committed(Update),
    LocalChanged,
}

/// Store subscriptions opened for one document before its tasks start.
struct StoreFeeds {
    link_peer: PeerId,
    replica_peer: PeerId,
    /// Commits to push upstream.
    outbound: mpsc::UnboundedReceiver<Update>,
    /// Commits to apply to the replica.
    inbound: mpsc::UnboundedReceiver<Update>,
}

struct ReplicaHandle {
    events: mpsc::UnboundedSender<ReplicaEvent>,
    version: watch::Receiver<Version>,
    _tasks: Vec<TaskGuard>,
}

#[derive(Default)]
struct Registry {
    replicas: HashMap<String, ReplicaHandle>,
    paths: HashMap<PathBuf, String>,
    indexes: HashMap<String, TaskGuard>,
}

/// Mirrors remote documents into files and pushes local edits back.
pub struct SyncOrchestrator<T: Transport, D: DocumentStore, S: FileSink> {
    config: MirrorConfig,
    channel: Arc<ResilientChannel<T>>,
    store: Arc<D>,
    sink: Arc<S>,
    root: PathBuf,
    registry: Mutex<Registry>,
}

impl<T: Transport, D: DocumentStore> SyncOrchestrator<T, D, DirectorySink> {
    /// Creates an orchestrator writing plain files under `config.root`.
    pub fn with_directory_sink(config: MirrorConfig, transport: Arc<T>, store: Arc<D>) -> Self {
        let sink = DirectorySink::new(config.root.clone());
        Self::new(config, transport, store, sink)
    }
}

impl<T: Transport, D: DocumentStore, S: FileSink> SyncOrchestrator<T, D, S> {
    /// Creates an orchestrator with nothing pinned.
    pub fn new(config: MirrorConfig, transport: Arc<T>, store: Arc<D>, sink: S) -> Self {
        let channel = Arc::new(ResilientChannel::new(transport, config.retry.clone()));
        let root = std::path::absolute(sink.root()).unwrap_or_else(|_| sink.root().to_path_buf());
        Self {
            config,
            channel,
            store,
            sink: Arc::new(sink),
            root,
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Starts mirroring `url`.
    ///
    /// Returns `false` if it was already pinned.
    pub async fn pin(&self, url: &str) -> SyncResult<bool> {
        if self.is_pinned(url) {
            return Ok(false);
        }
        let path = relative_path_for(url)?;

        let link_peer = PeerId::random();
        let replica_peer = PeerId::random();
        let outbound = self.store.subscribe(url, self.store_options(&link_peer)).await?;
        let inbound = self.store.subscribe(url, self.store_options(&replica_peer)).await?;
        let feeds = StoreFeeds {
            link_peer,
            replica_peer,
            outbound,
            inbound,
        };

        self.register(url, path, feeds)
    }

    fn store_options(&self, peer: &PeerId) -> StoreOptions {
        StoreOptions {
            merge_type: self.config.merge_type.clone(),
            peer: peer.clone(),
        }
    }

    /// Stops mirroring `url`. Returns `false` if it was not pinned.
    pub fn unpin(&self, url: &str) -> bool {
        let mut registry = self.registry.lock();
        let Some(handle) = registry.replicas.remove(url) else {
            return false;
        };
        registry.paths.retain(|_, doc| doc != url);
        drop(handle);
        info!(doc = %url, "unpinned");
        true
    }

    /// Returns true if `url` is pinned.
    pub fn is_pinned(&self, url: &str) -> bool {
        self.registry.lock().replicas.contains_key(url)
    }

    /// Lists the pinned document ids, sorted.
    pub fn pinned(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.registry.lock().replicas.keys().cloned().collect();
        urls.sort();
        urls
    }

    /// Returns the replica's current version, if `url` is pinned.
    pub fn version(&self, url: &str) -> Option<Version> {
        self.registry
            .lock()
            .replicas
            .get(url)
            .map(|handle| handle.version.borrow().clone())
    }

    /// Reports that a mirrored file changed on disk.
    ///
    /// `path` is either relative to the mirror root or absolute under it.
    /// Absolute paths are matched against the root as configured and, failing
    /// that, with symlinks resolved. Returns `false` if no pinned document
    /// lives there.
    pub fn file_changed(&self, path: &Path) -> bool {
        let Some(relative) = self.relative_to_root(path) else {
            return false;
        };

        let registry = self.registry.lock();
        let Some(handle) = registry
            .paths
            .get(&relative)
            .and_then(|url| registry.replicas.get(url))
        else {
            return false;
        };
        handle.events.send(ReplicaEvent::LocalChanged).is_ok()
    }

    fn relative_to_root(&self, path: &Path) -> Option<PathBuf> {
        if !path.is_absolute() {
            return normalize(path);
        }
        if let Ok(relative) = path.strip_prefix(&self.root) {
            return normalize(relative);
        }
        let root = std::fs::canonicalize(&self.root).ok()?;
        let path = std::fs::canonicalize(path).ok()?;
        normalize(path.strip_prefix(&root).ok()?)
    }

    fn register(&self, url: &str, path: PathBuf, feeds: StoreFeeds) -> SyncResult<bool> {
        let mut registry = self.registry.lock();
        if registry.replicas.contains_key(url) {
            return Ok(false);
        }
        if let Some(existing) = registry.paths.get(&path) {
            warn!(doc = %url, existing = %existing, "document maps onto a mirrored path");
            return Err(SyncError::InvalidDocumentId(url.to_string()));
        }

        let span = info_span!("replica", doc = %url);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (version_tx, version_rx) = watch::channel(Version::empty());

        let worker = ReplicaWorker {
            url: url.to_string(),
            path: path.clone(),
            reconciler: ReplicaReconciler::new(feeds.replica_peer),
            store: Arc::clone(&self.store),
            sink: Arc::clone(&self.sink),
            version: version_tx,
            unwritten: false,
        };
        let replica_task = tokio::spawn(worker.run(events_rx).instrument(span.clone()));
        let relay_task = tokio::spawn(
            relay_commits(feeds.inbound, events_tx.clone()).instrument(span.clone()),
        );

        let request = SubscribeRequest {
            url: url.to_string(),
            headers: self.config.subscribe_headers(),
            parents: None,
            peer: feeds.link_peer.clone(),
        };
        let latest = version_rx.clone();
        let subscription = self.channel.subscribe(request, move || {
            let version = latest.borrow().clone();
            (!version.is_empty()).then_some(version)
        });
        let remote_task = tokio::spawn(
            feed_remote(
                subscription,
                Arc::clone(&self.store),
                url.to_string(),
                feeds.link_peer.clone(),
            )
            .instrument(span.clone()),
        );

        let forward_task = tokio::spawn(
            forward_local(
                Arc::clone(&self.channel),
                url.to_string(),
                self.config.put_headers(),
                feeds.link_peer,
                feeds.outbound,
            )
            .instrument(span),
        );

        registry.paths.insert(path.clone(), url.to_string());
        registry.replicas.insert(
            url.to_string(),
            ReplicaHandle {
                events: events_tx,
                version: version_rx,
                _tasks: vec![
                    TaskGuard(replica_task),
                    TaskGuard(relay_task),
                    TaskGuard(remote_task),
                    TaskGuard(forward_task),
                ],
            },
        );
        info!(doc = %url, path = %path.display(), "pinned");
        Ok(true)
    }

    /// Pins every document listed by the index at `index_url`.
    ///
    /// The index is a JSON array of absolute paths, each joined to the
    /// index's origin. It is re-read every `index_refresh_interval`; fetch
    /// or parse failures are logged and retried on the next round. Returns
    /// `false` if the index is already being followed.
    pub fn pin_index(self: &Arc<Self>, index_url: &str) -> SyncResult<bool> {
        let parsed = Url::parse(index_url)
            .map_err(|err| SyncError::InvalidIndex(format!("{index_url}: {err}")))?;
        let origin = parsed.origin();
        if !origin.is_tuple() {
            return Err(SyncError::InvalidIndex(format!("{index_url}: no origin")));
        }
        let origin = origin.ascii_serialization();

        let mut registry = self.registry.lock();
        if registry.indexes.contains_key(index_url) {
            return Ok(false);
        }

        let orchestrator = Arc::downgrade(self);
        let index = index_url.to_string();
        let task = tokio::spawn(
            async move {
                loop {
                    let Some(this) = orchestrator.upgrade() else {
                        return;
                    };
                    this.refresh_index(&index, &origin).await;
                    let interval = this.config.index_refresh_interval;
                    drop(this);
                    tokio::time::sleep(interval).await;
                }
            }
            .instrument(info_span!("pin_index", index = %index_url)),
        );
        registry
            .indexes
            .insert(index_url.to_string(), TaskGuard(task));
        info!(index = %index_url, "following pin index");
        Ok(true)
    }

    /// Stops following a pin index. Documents it pinned stay pinned.
    pub fn unpin_index(&self, index_url: &str) -> bool {
        self.registry.lock().indexes.remove(index_url).is_some()
    }

    async fn refresh_index(&self, index_url: &str, origin: &str) {
        let text = match self.channel.transport().fetch_text(index_url).await {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "failed to fetch pin index");
                return;
            }
        };
        let paths: Vec<String> = match serde_json::from_str(&text) {
            Ok(paths) => paths,
            Err(err) => {
                let err = SyncError::InvalidIndex(err.to_string());
                warn!(error = %err, "failed to parse pin index");
                return;
            }
        };

        debug!(entries = paths.len(), "refreshed pin index");
        for path in paths {
            let url = format!("{origin}{path}");
            if let Err(err) = self.pin(&url).await {
                warn!(doc = %url, error = %err, "failed to pin index entry");
            }
        }
    }
}

fn normalize(path: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(normalized)
}

struct ReplicaWorker<D: DocumentStore, S: FileSink> {
    url: String,
    path: PathBuf,
    reconciler: ReplicaReconciler,
    store: Arc<D>,
    sink: Arc<S>,
    version: watch::Sender<Version>,
    unwritten: bool,
}

impl<D: DocumentStore, S: FileSink> ReplicaWorker<D, S> {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<ReplicaEvent>) {
        while let Some(event) = events.recv().await {
            let flushed = !self.unwritten || self.persist().await;
            match event {
                ReplicaEvent::Committed(update) => self.apply_commit(update).await,
                ReplicaEvent::LocalChanged if flushed => self.drain_local().await,
                ReplicaEvent::LocalChanged => {
                    debug!("skipping local change until the mirrored file is written");
                }
            }
        }
    }

    async fn apply_commit(&mut self, update: Update) {
        match self.reconciler.on_remote_update(&update) {
            Ok(RemoteOutcome::Applied) => {
                debug!(version = %update.version, "applied commit");
                self.publish_version();
                self.unwritten = true;
                self.persist().await;
            }
            Ok(RemoteOutcome::Dropped | RemoteOutcome::Ignored) => {}
            Err(err) => {
                warn!(version = %update.version, error = %err, "skipping malformed update");
            }
        }
    }

    async fn drain_local(&mut self) {
        loop {
            let text = match self.sink.read(&self.path).await {
                Ok(text) => text,
                Err(err) => {
                    debug!(error = %err, "mirrored file not readable");
                    return;
                }
            };
            let change = match self.reconciler.prepare_local_change(&text) {
                Ok(Some(change)) => change,
                Ok(None) => return,
                Err(err) => {
                    error!(error = %err, "failed to encode local change");
                    return;
                }
            };

            debug!(version = %change.update.version, "local change");
            let peer = self.reconciler.peer().clone();
            if let Err(err) = self.store.put(&self.url, change.update.clone(), &peer).await {
                error!(error = %err, "failed to record local change");
                return;
            }
            self.reconciler.commit_local_change(&change);
            self.publish_version();
        }
    }

    async fn persist(&mut self) -> bool {
        match self.sink.write(&self.path, self.reconciler.prev_state()).await {
            Ok(()) => {
                self.unwritten = false;
                true
            }
            Err(err) => {
                error!(error = %err, "failed to write mirrored file");
                false
            }
        }
    }

    fn publish_version(&self) {
        self.version
            .send_replace(self.reconciler.current_version().clone());
    }
}

async fn feed_remote<D: DocumentStore>(
    mut subscription: Subscription,
    store: Arc<D>,
    url: String,
    link_peer: PeerId,
) {
    while let Some(update) = subscription.next().await {
        if update.version.is_empty() {
            continue;
        }
        let version = update.version.clone();
        if let Err(err) = store.put(&url, update, &link_peer).await {
            warn!(version = %version, error = %err, "failed to record remote update");
        }
    }
}

async fn relay_commits(
    mut inbound: mpsc::UnboundedReceiver<Update>,
    events: mpsc::UnboundedSender<ReplicaEvent>,
) {
    while let Some(update) = inbound.recv().await {
        if update.version.is_empty() {
            continue;
        }
        if events.send(ReplicaEvent::Committed(update)).is_err() {
            return;
        }
    }
}

async fn forward_local<T: Transport>(
    channel: Arc<ResilientChannel<T>>,
    url: String,
    headers: Headers,
    link_peer: PeerId,
    mut local_feed: mpsc::UnboundedReceiver<Update>,
) {
    while let Some(update) = local_feed.recv().await {
        if update.version.is_empty() {
            continue;
        }
        let request = PutRequest::from_update(url.clone(), headers.clone(), update, link_peer.clone());
        match channel.send(&request).await {
            Ok(response) => {
                debug!(version = %request.version, status = response.status, "sent local change")
            }
            Err(err) => error!(version = %request.version, error = %err, "failed to send local change"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDocumentStore;
    use crate::transport::MockTransport;
    use textmirror_testkit::TempMirror;

    type Orchestrator = SyncOrchestrator<MockTransport, MemoryDocumentStore, DirectorySink>;

    fn orchestrator(mirror: &TempMirror) -> (Arc<Orchestrator>, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(MemoryDocumentStore::new());
        let config = MirrorConfig::new(mirror.root());
        let orchestrator =
            SyncOrchestrator::with_directory_sink(config, Arc::clone(&transport), store);
        (Arc::new(orchestrator), transport)
    }

    #[test]
    fn normalizes_relative_paths() {
        assert_eq!(
            normalize(Path::new("./example.com/doc")),
            Some(PathBuf::from("example.com/doc"))
        );
        assert_eq!(normalize(Path::new("../doc")), None);
    }

    #[tokio::test]
    async fn pin_is_idempotent() {
        let mirror = TempMirror::new();
        let (orchestrator, transport) = orchestrator(&mirror);

        assert!(orchestrator.pin("https://example.com/doc").await.unwrap());
        assert!(!orchestrator.pin("https://example.com/doc").await.unwrap());
        assert_eq!(orchestrator.pinned(), vec!["https://example.com/doc".to_string()]);

        let subscriptions = transport.wait_for_subscriptions(1).await;
        assert_eq!(subscriptions[0].headers["Merge-Type"], "dt");
        assert_eq!(subscriptions[0].headers["Accept"], "text/plain");
        assert_eq!(subscriptions[0].parents, None);
    }

    #[tokio::test]
    async fn rejects_unmappable_ids() {
        let mirror = TempMirror::new();
        let (orchestrator, _) = orchestrator(&mirror);

        let err = orchestrator.pin("https://example.com/../secret").await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidDocumentId(_)));

        orchestrator.pin("https://example.com/doc").await.unwrap();
        let err = orchestrator.pin("http://example.com/doc").await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidDocumentId(_)));
        assert_eq!(orchestrator.pinned().len(), 1);
    }

    #[tokio::test]
    async fn file_changes_map_to_documents() {
        let mirror = TempMirror::new();
        let (orchestrator, _) = orchestrator(&mirror);
        orchestrator.pin("https://example.com/doc").await.unwrap();

        assert!(orchestrator.file_changed(Path::new("example.com/doc")));
        assert!(orchestrator.file_changed(&mirror.path("example.com/doc")));
        assert!(!orchestrator.file_changed(Path::new("example.com/other")));
        assert!(!orchestrator.file_changed(Path::new("/elsewhere/example.com/doc")));
    }

    #[tokio::test]
    async fn absolute_paths_match_a_relative_root() {
        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(MemoryDocumentStore::new());
        let config = MirrorConfig::new("./relative-mirror");
        let orchestrator = SyncOrchestrator::with_directory_sink(config, transport, store);
        orchestrator.pin("https://example.com/doc").await.unwrap();

        let cwd = std::env::current_dir().unwrap();
        assert!(orchestrator.file_changed(&cwd.join("relative-mirror/example.com/doc")));
        assert!(orchestrator.file_changed(&cwd.join("./relative-mirror/./example.com/doc")));
        assert!(!orchestrator.file_changed(&cwd.join("elsewhere/example.com/doc")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn absolute_paths_match_through_symlinks() {
        let mirror = TempMirror::new();
        let links = TempMirror::new();
        let linked_root = links.path("mirror");
        std::os::unix::fs::symlink(mirror.root(), &linked_root).unwrap();

        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(MemoryDocumentStore::new());
        let orchestrator = SyncOrchestrator::with_directory_sink(
            MirrorConfig::new(&linked_root),
            transport,
            store,
        );
        orchestrator.pin("https://example.com/doc").await.unwrap();
        mirror.write("example.com/doc", "text");

        assert!(orchestrator.file_changed(&linked_root.join("example.com/doc")));
        assert!(orchestrator.file_changed(&mirror.path("example.com/doc")));
    }

    #[tokio::test]
    async fn unpin_forgets_the_document() {
        let mirror = TempMirror::new();
        let (orchestrator, _) = orchestrator(&mirror);
        orchestrator.pin("https://example.com/doc").await.unwrap();

        assert!(orchestrator.unpin("https://example.com/doc"));
        assert!(!orchestrator.unpin("https://example.com/doc"));
        assert!(orchestrator.pinned().is_empty());
        assert!(!orchestrator.file_changed(Path::new("example.com/doc")));
        assert_eq!(orchestrator.version("https://example.com/doc"), None);
    }

    #[tokio::test]
    async fn pin_index_requires_an_origin() {
        let mirror = TempMirror::new();
        let (orchestrator, _) = orchestrator(&mirror);

        assert!(matches!(
            orchestrator.pin_index("not a url"),
            Err(SyncError::InvalidIndex(_))
        ));
        assert!(orchestrator.pin_index("https://example.com/pins").unwrap());
        assert!(!orchestrator.pin_index("https://example.com/pins").unwrap());
        assert!(orchestrator.unpin_index("https://example.com/pins"));
        assert!(!orchestrator.unpin_index("https://example.com/pins"));
    }
}
