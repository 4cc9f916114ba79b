//! # textmirror Engine
//!
//! Keeps local files in sync with collaboratively edited remote documents.
//!
//! This crate provides:
//! - Replica reconciliation (parent-matched remote updates, diffed local edits)
//! - Resilient sends and subscriptions with exponential backoff
//! - A transport abstraction with an in-memory mock
//! - A local document store abstraction with an in-memory store
//! - File persistence under a mirror root
//! - The `SyncOrchestrator` registry that pins documents and pin indexes
//!
//! ## Architecture
//!
//! The local document store is the hub for every writer. Remote updates are
//! recorded in it, and each pinned document has a single replica task that
//! receives every commit it did not make itself, plus local file changes,
//! and handles them strictly in order:
//! 1. A commit is accepted only if its parents equal the replica's current
//!    version, then applied and written to the mirrored file
//! 2. A file change re-reads the file, diffs it against the last agreed
//!    text and records the resulting update in the document store, repeating
//!    until the file and the replica agree
//! 3. Commits not made by the remote link are pushed to the remote origin,
//!    retried until accepted
//!
//! ## Key Invariants
//!
//! - Wire ranges count Unicode code points; local splicing uses UTF-16 code units
//! - Remote application is serialized per document
//! - Local diffing never overlaps itself
//! - Transport failures are retried, never fatal

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod channel;
mod config;
mod error;
mod orchestrator;
mod peer;
mod reconciler;
mod sink;
mod store;
mod transport;

pub use channel::{Backoff, ConnectionState, ResilientChannel, Subscription};
pub use config::{MirrorConfig, RetryConfig};
pub use error::{SyncError, SyncResult};
pub use orchestrator::SyncOrchestrator;
pub use peer::PeerId;
pub use reconciler::{LocalChange, RemoteOutcome, ReplicaReconciler, ReplicaState};
pub use sink::{relative_path_for, DirectorySink, FileSink};
pub use store::{DocumentStore, MemoryDocumentStore, StoreOptions};
pub use transport::{
    Headers, MockTransport, PutRequest, PutResponse, SubscribeRequest, Transport, UpdateStream,
};
