//! Resilient delivery on top of a [`Transport`].
//!
//! Sends are retried with exponential backoff until they succeed. Live
//! subscriptions run in their own task, driven by a [`ConnectionState`]
//! machine that reconnects whenever the stream fails or ends.

use crate::config::RetryConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::{PutRequest, PutResponse, SubscribeRequest, Transport, UpdateStream};
use std::sync::Arc;
use std::time::Duration;
use textmirror_protocol::{Update, Version};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const SUBSCRIPTION_CAPACITY: usize = 64;

/// The state of a live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Opening the stream.
    Connecting,
    /// Receiving updates.
    Connected,
    /// Waiting before the next connection attempt.
    Backoff,
}

impl ConnectionState {
    /// Returns true while updates can arrive.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Exponential backoff schedule for one connection.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: RetryConfig,
    failures: u32,
}

impl Backoff {
    /// Creates a schedule at its floor.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            failures: 0,
        }
    }

    /// Records a failure and returns how long to wait.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.config.delay_for_attempt(self.failures);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    /// Returns to the floor after a success.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Retrying wrapper around a transport.
pub struct ResilientChannel<T: Transport> {
    transport: Arc<T>,
    retry: RetryConfig,
}

impl<T: Transport> ResilientChannel<T> {
    /// Creates a channel over `transport`.
    pub fn new(transport: Arc<T>, retry: RetryConfig) -> Self {
        Self { transport, retry }
    }

    /// Returns the underlying transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Sends `request` until the remote origin accepts it.
    ///
    /// Every transport error and non-2xx status is retried, including errors
    /// the transport flags as fatal. Gives up only when `max_attempts` is
    /// configured and reached.
    pub async fn send(&self, request: &PutRequest) -> SyncResult<PutResponse> {
        let mut backoff = Backoff::new(self.retry.clone());
        loop {
            let error = match self.transport.send(request).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) => SyncError::Status(response.status),
                Err(err) => err,
            };

            let attempts = backoff.failures() + 1;
            if self.retry.is_exhausted(attempts) {
                return Err(SyncError::RetriesExhausted {
                    attempts,
                    last_error: error.to_string(),
                });
            }

            let delay = backoff.next_delay();
            warn!(
                url = %request.url,
                version = %request.version,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                retryable = error.is_retryable(),
                error = %error,
                "send failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Opens a subscription that reconnects forever.
    ///
    /// `parents` is called before every connection attempt so a reconnect
    /// resumes from the replica's latest version.
    pub fn subscribe<F>(&self, request: SubscribeRequest, parents: F) -> Subscription
    where
        F: Fn() -> Option<Version> + Send + Sync + 'static,
    {
        let (updates_tx, updates_rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let task = tokio::spawn(run_subscription(
            Arc::clone(&self.transport),
            Backoff::new(self.retry.clone()),
            request,
            parents,
            updates_tx,
            state_tx,
        ));

        Subscription {
            updates: updates_rx,
            state: state_rx,
            task,
        }
    }
}

async fn run_subscription<T, F>(
    transport: Arc<T>,
    mut backoff: Backoff,
    request: SubscribeRequest,
    parents: F,
    updates: mpsc::Sender<Update>,
    state_tx: watch::Sender<ConnectionState>,
) where
    T: Transport,
    F: Fn() -> Option<Version> + Send + Sync + 'static,
{
    let mut state = ConnectionState::Connecting;
    let mut stream: Option<UpdateStream> = None;

    loop {
        state_tx.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });

        state = match state {
            ConnectionState::Connecting => {
                let mut attempt = request.clone();
                attempt.parents = parents();
                match transport.subscribe(attempt).await {
                    Ok(opened) => {
                        info!(url = %request.url, "subscription connected");
                        backoff.reset();
                        stream = Some(opened);
                        ConnectionState::Connected
                    }
                    Err(err) => {
                        warn!(url = %request.url, error = %err, "subscribe failed");
                        ConnectionState::Backoff
                    }
                }
            }
            ConnectionState::Connected => {
                let item = match stream.as_mut() {
                    Some(live) => live.recv().await,
                    None => None,
                };
                match item {
                    Some(Ok(update)) => {
                        if updates.send(update).await.is_err() {
                            debug!(url = %request.url, "subscriber gone, stopping");
                            return;
                        }
                        ConnectionState::Connected
                    }
                    Some(Err(err)) => {
                        warn!(url = %request.url, error = %err, "subscription failed");
                        stream = None;
                        ConnectionState::Backoff
                    }
                    None => {
                        info!(url = %request.url, "subscription ended");
                        stream = None;
                        ConnectionState::Backoff
                    }
                }
            }
            ConnectionState::Backoff => {
                let delay = backoff.next_delay();
                debug!(
                    url = %request.url,
                    delay_ms = delay.as_millis() as u64,
                    "reconnecting after delay"
                );
                tokio::time::sleep(delay).await;
                ConnectionState::Connecting
            }
        };
    }
}

/// A live subscription. Dropping it stops the connection task.
#[derive(Debug)]
pub struct Subscription {
    updates: mpsc::Receiver<Update>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Receives the next update, in arrival order.
    pub async fn next(&mut self) -> Option<Update> {
        self.updates.recv().await
    }

    /// Returns the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Returns a receiver of connection state changes.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
