//! Transport layer abstraction for talking to the remote origin.

use crate::error::{SyncError, SyncResult};
use crate::peer::PeerId;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use textmirror_protocol::{Update, Version, WirePatch};
use tokio::sync::{mpsc, Notify};

/// HTTP-style request headers.
pub type Headers = BTreeMap<String, String>;

/// Stream of updates delivered by a live subscription.
///
/// An `Err` item or the end of the stream means the connection was lost.
pub type UpdateStream = mpsc::Receiver<SyncResult<Update>>;

const STREAM_CAPACITY: usize = 64;

/// Request to open a long-lived subscription to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    /// Document URL.
    pub url: String,
    /// Request headers.
    pub headers: Headers,
    /// Version to resume from, if any.
    pub parents: Option<Version>,
    /// Peer token of this link.
    pub peer: PeerId,
}

/// Request to push one local edit to the remote origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRequest {
    /// Document URL.
    pub url: String,
    /// Always `PUT`.
    pub method: String,
    /// Request headers.
    pub headers: Headers,
    /// Version produced by the edit.
    pub version: Version,
    /// Version the edit was made against.
    pub parents: Version,
    /// Full replacement text, if the edit carries one.
    pub body: Option<String>,
    /// Patches in code-point units, if the edit carries them.
    pub patches: Option<Vec<WirePatch>>,
    /// Peer token of this link.
    pub peer: PeerId,
}

impl PutRequest {
    /// Builds a `PUT` request carrying `update`.
    pub fn from_update(url: impl Into<String>, headers: Headers, update: Update, peer: PeerId) -> Self {
        Self {
            url: url.into(),
            method: "PUT".to_string(),
            headers,
            version: update.version,
            parents: update.parents,
            body: update.body,
            patches: update.patches,
            peer,
        }
    }
}

/// Response to a [`PutRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutResponse {
    /// HTTP status code.
    pub status: u16,
}

impl PutResponse {
    /// Returns true for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A transport handles network communication with the remote origin.
///
/// This trait abstracts the network layer so an HTTP client, a test double,
/// or anything else speaking the update protocol can be plugged in.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Opens a subscription and returns its update stream.
    async fn subscribe(&self, request: SubscribeRequest) -> SyncResult<UpdateStream>;

    /// Sends one edit.
    async fn send(&self, request: &PutRequest) -> SyncResult<PutResponse>;

    /// Fetches a plain text resource, such as a pin index.
    async fn fetch_text(&self, url: &str) -> SyncResult<String>;
}

#[derive(Debug, Default)]
struct MockState {
    failing_sends: u32,
    fatal_sends: u32,
    statuses: VecDeque<u16>,
    attempts: Vec<PutRequest>,
    delivered: Vec<PutRequest>,
    failing_subscribes: u32,
    subscriptions: Vec<SubscribeRequest>,
    feed: Option<mpsc::Sender<SyncResult<Update>>>,
    texts: HashMap<String, String>,
}

/// An in-memory transport for testing.
///
/// Sends succeed with status 200 unless failures or statuses are queued.
/// Only the most recent subscription receives pushed updates.
#[derive(Debug, Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
    changed: Notify,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` sends fail with a retryable error.
    pub fn fail_next_sends(&self, count: u32) {
        self.state.lock().failing_sends = count;
    }

    /// Makes the next `count` sends fail with a non-retryable error.
    ///
    /// These are served before any failures queued by
    /// [`fail_next_sends`](Self::fail_next_sends).
    pub fn fail_next_sends_fatally(&self, count: u32) {
        self.state.lock().fatal_sends = count;
    }

    /// Queues a status for the next successful send.
    pub fn respond_with_status(&self, status: u16) {
        self.state.lock().statuses.push_back(status);
    }

    /// Makes the next `count` subscribe calls fail with a retryable error.
    pub fn fail_next_subscribes(&self, count: u32) {
        self.state.lock().failing_subscribes = count;
    }

    /// Every send attempt, including failed ones.
    pub fn attempts(&self) -> Vec<PutRequest> {
        self.state.lock().attempts.clone()
    }

    /// Sends answered with a 2xx status.
    pub fn delivered(&self) -> Vec<PutRequest> {
        self.state.lock().delivered.clone()
    }

    /// Every subscribe attempt, including failed ones.
    pub fn subscriptions(&self) -> Vec<SubscribeRequest> {
        self.state.lock().subscriptions.clone()
    }

    /// Delivers an update on the live subscription.
    ///
    /// Returns false if no subscription is open.
    pub async fn push(&self, update: Update) -> bool {
        self.feed_item(Ok(update)).await
    }

    /// Breaks the live subscription with a retryable error.
    pub async fn fail_stream(&self) -> bool {
        self.feed_item(Err(SyncError::transport_retryable("connection reset")))
            .await
    }

    /// Ends the live subscription cleanly.
    pub fn end_stream(&self) {
        self.state.lock().feed = None;
    }

    /// Serves `text` for [`Transport::fetch_text`] on `url`.
    pub fn set_text(&self, url: impl Into<String>, text: impl Into<String>) {
        self.state.lock().texts.insert(url.into(), text.into());
    }

    /// Waits until at least `count` sends have been delivered.
    pub async fn wait_for_delivered(&self, count: usize) -> Vec<PutRequest> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let state = self.state.lock();
                if state.delivered.len() >= count {
                    return state.delivered.clone();
                }
            }
            notified.await;
        }
    }

    /// Waits until at least `count` subscribe attempts have been made.
    pub async fn wait_for_subscriptions(&self, count: usize) -> Vec<SubscribeRequest> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let state = self.state.lock();
                if state.subscriptions.len() >= count {
                    return state.subscriptions.clone();
                }
            }
            notified.await;
        }
    }

    async fn feed_item(&self, item: SyncResult<Update>) -> bool {
        let feed = self.state.lock().feed.clone();
        match feed {
            Some(feed) => feed.send(item).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn subscribe(&self, request: SubscribeRequest) -> SyncResult<UpdateStream> {
        let result = {
            let mut state = self.state.lock();
            state.subscriptions.push(request);
            if state.failing_subscribes > 0 {
                state.failing_subscribes -= 1;
                Err(SyncError::transport_retryable("connection refused"))
            } else {
                let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
                state.feed = Some(tx);
                Ok(rx)
            }
        };
        self.changed.notify_waiters();
        result
    }

    async fn send(&self, request: &PutRequest) -> SyncResult<PutResponse> {
        let result = {
            let mut state = self.state.lock();
            state.attempts.push(request.clone());
            if state.fatal_sends > 0 {
                state.fatal_sends -= 1;
                Err(SyncError::transport_fatal("tls handshake reset"))
            } else if state.failing_sends > 0 {
                state.failing_sends -= 1;
                Err(SyncError::transport_retryable("connection reset"))
            } else {
                let response = PutResponse {
                    status: state.statuses.pop_front().unwrap_or(200),
                };
                if response.is_success() {
                    state.delivered.push(request.clone());
                }
                Ok(response)
            }
        };
        self.changed.notify_waiters();
        result
    }

    async fn fetch_text(&self, url: &str) -> SyncResult<String> {
        self.state
            .lock()
            .texts
            .get(url)
            .cloned()
            .ok_or(SyncError::Status(404))
    }
}
