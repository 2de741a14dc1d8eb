//! What is loaded, what was loaded before it, and the flattened metadata
//! clients see under `now_playing`.

use std::collections::VecDeque;

use opuscule_proto::metadata::{Metadata, NowPlayingData};
use tracing::{debug, warn};

use crate::menu::NodeId;

#[derive(Debug)]
pub struct NowPlaying {
    current: Option<NodeId>,
    history: VecDeque<NodeId>,
    capacity: usize,
    data: NowPlayingData,
}

impl NowPlaying {
    pub fn new(capacity: usize) -> Self {
        Self {
            current: None,
            history: VecDeque::with_capacity(capacity),
            capacity,
            data: NowPlayingData::default(),
        }
    }

    pub fn current(&self) -> Option<NodeId> {
        self.current
    }

    pub fn data(&self) -> &NowPlayingData {
        &self.data
    }

    #[cfg(test)]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    fn remember(&mut self, id: NodeId) {
        if self.capacity == 0 {
            return;
        }
        while self.history.len() >= self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(id);
    }

    /// Make `id` the current opus, remembering the one it replaces.
    pub fn load(&mut self, id: NodeId) {
        if let Some(previous) = self.current.filter(|&prev| prev != id) {
            self.remember(previous);
        }
        self.current = Some(id);
    }

    /// Swap back to the most recently played opus that still exists.
    ///
    /// The opus being left goes onto the history, so two reverts in a row
    /// return to where they started.  Entries rejected by `is_live` are
    /// discarded.
    pub fn revert_with(&mut self, is_live: impl Fn(NodeId) -> bool) -> Option<NodeId> {
        while let Some(candidate) = self.history.pop_back() {
            if Some(candidate) == self.current || !is_live(candidate) {
                continue;
            }
            if let Some(left) = self.current.replace(candidate) {
                self.remember(left);
            }
            return Some(candidate);
        }
        None
    }

    /// Rebuild the record: blank every key, overlay the opus's own
    /// description, then whatever the backend reports about the track.
    pub fn refresh(&mut self, opus_record: &Metadata, backend_record: &Metadata) {
        self.data.reset();
        let rejected = self.data.overlay(opus_record);
        if !rejected.is_empty() {
            warn!("Opus metadata keys unsupported in now_playing: {:?}", rejected);
        }
        let rejected = self.data.overlay(backend_record);
        if !rejected.is_empty() {
            debug!("Dropped backend keys: {:?}", rejected);
        }
    }
}
