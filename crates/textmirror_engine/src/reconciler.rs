//! Per-document replica reconciliation.
//!
//! A [`ReplicaReconciler`] holds the last state both sides agreed on. Remote
//! updates are accepted only when their parents match the current version;
//! local changes are found by diffing the file against that state.

use crate::peer::PeerId;
use textmirror_protocol::{
    apply, count_code_points, diff, Patch, Payload, PositionTranslator, ProtocolResult, Update,
    Version, WirePatch,
};
use tracing::debug;

/// Reconciliation state of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaState {
    /// Version of `prev_state`, sorted.
    pub current_version: Version,
    /// Last text both sides agree on.
    pub prev_state: String,
    /// Running count used to mint local version ids. Starts at -1.
    pub char_counter: i64,
    /// Token namespacing local version ids.
    pub peer: PeerId,
}

impl ReplicaState {
    /// Creates an empty state for `peer`.
    pub fn new(peer: PeerId) -> Self {
        Self {
            current_version: Version::empty(),
            prev_state: String::new(),
            char_counter: -1,
            peer,
        }
    }
}

/// What happened to a remote update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// The update was applied; `prev_state` holds the new text.
    Applied,
    /// The parents did not match the current version.
    Dropped,
    /// The update carried an empty version.
    Ignored,
}

/// A local edit computed but not yet committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalChange {
    /// The update to publish.
    pub update: Update,
    /// Text the edit produces.
    pub new_state: String,
    /// Counter after the edit.
    pub char_counter: i64,
}

/// Reconciles one document's replica with remote and local edits.
#[derive(Debug, Clone)]
pub struct ReplicaReconciler {
    state: ReplicaState,
}

impl ReplicaReconciler {
    /// Creates a reconciler for a fresh replica.
    pub fn new(peer: PeerId) -> Self {
        Self {
            state: ReplicaState::new(peer),
        }
    }

    /// Returns the full state.
    pub fn state(&self) -> &ReplicaState {
        &self.state
    }

    /// Returns the current version.
    pub fn current_version(&self) -> &Version {
        &self.state.current_version
    }

    /// Returns the last agreed text.
    pub fn prev_state(&self) -> &str {
        &self.state.prev_state
    }

    /// Returns the peer token.
    pub fn peer(&self) -> &PeerId {
        &self.state.peer
    }

    /// Applies a remote update if it was made against the current version.
    ///
    /// A malformed update is rejected with an error and leaves the state
    /// untouched.
    pub fn on_remote_update(&mut self, update: &Update) -> ProtocolResult<RemoteOutcome> {
        if update.version.is_empty() {
            return Ok(RemoteOutcome::Ignored);
        }
        if update.parents != self.state.current_version {
            debug!(
                parents = %update.parents,
                current = %self.state.current_version,
                "dropping update with mismatched parents"
            );
            return Ok(RemoteOutcome::Dropped);
        }

        let next = match update.payload()? {
            Payload::Body(body) => body.to_string(),
            Payload::Patches(patches) => apply_wire_patches(&self.state.prev_state, patches)?,
        };

        self.state.prev_state = next;
        self.state.current_version = update.version.clone();
        Ok(RemoteOutcome::Applied)
    }

    /// Computes the update turning the agreed text into `text`.
    ///
    /// Returns `None` when nothing changed. The state is left as is until
    /// [`commit_local_change`](Self::commit_local_change).
    pub fn prepare_local_change(&self, text: &str) -> ProtocolResult<Option<LocalChange>> {
        let patches = diff(&self.state.prev_state, text);
        if patches.is_empty() {
            return Ok(None);
        }

        let units: Vec<u16> = self.state.prev_state.encode_utf16().collect();
        let mut translator = PositionTranslator::new(&units);
        let mut char_counter = self.state.char_counter;
        let mut wire = Vec::with_capacity(patches.len());
        for patch in patches {
            let range = translator.units_to_points(patch.range)?;
            char_counter += (range.end - range.start) as i64;
            char_counter += count_code_points(&patch.content) as i64;
            wire.push(WirePatch::new(range, patch.content));
        }

        let version = Version::single(format!("{}-{}", self.state.peer, char_counter));
        let update = Update::patched(version, self.state.current_version.clone(), wire);
        Ok(Some(LocalChange {
            update,
            new_state: text.to_string(),
            char_counter,
        }))
    }

    /// Adopts a prepared change as the agreed state.
    pub fn commit_local_change(&mut self, change: &LocalChange) {
        self.state.current_version = change.update.version.clone();
        self.state.prev_state = change.new_state.clone();
        self.state.char_counter = change.char_counter;
    }

    /// Computes and commits the update for `text` in one step.
    pub fn on_local_change(&mut self, text: &str) -> ProtocolResult<Option<Update>> {
        let Some(change) = self.prepare_local_change(text)? else {
            return Ok(None);
        };
        self.commit_local_change(&change);
        Ok(Some(change.update))
    }
}

fn apply_wire_patches(text: &str, patches: &[WirePatch]) -> ProtocolResult<String> {
    let mut ranged = patches
        .iter()
        .map(|patch| Ok((patch.code_point_range()?, patch.content.as_str())))
        .collect::<ProtocolResult<Vec<_>>>()?;
    ranged.sort_by_key(|(range, _)| (range.start, range.end));

    let units: Vec<u16> = text.encode_utf16().collect();
    let mut translator = PositionTranslator::new(&units);
    let local = ranged
        .into_iter()
        .map(|(range, content)| Ok(Patch::new(translator.points_to_units(range)?, content)))
        .collect::<ProtocolResult<Vec<_>>>()?;

    apply(text, &local)
}
