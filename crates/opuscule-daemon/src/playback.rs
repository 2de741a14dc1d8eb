//! The contract every playable backend implements, and the `Opus` leaf that
//! carries a backend through the menu tree.
//!
//! Backends are driven from the backend worker only; the state engine never
//! awaits them.  Everything here that touches the outside world is async,
//! everything the engine reads synchronously (capabilities, metadata) is not.

use std::sync::Arc;

use async_trait::async_trait;
use opuscule_proto::metadata::Metadata;

/// Static capability flags of an opus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub pause: bool,
    pub repeat: bool,
    pub shuffle: bool,
    /// Supports moving between tracks with `next`/`previous`.
    pub navigation: bool,
}

/// Playback modes an opus is started with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayModes {
    pub repeat: bool,
    pub shuffle: bool,
}

#[async_trait]
pub trait Playable: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    /// Static description of the opus.  Also the record persisted for
    /// favorites, so it must carry `component` and `type`.
    fn metadata(&self) -> Metadata;

    /// Name of the shared backend this opus plays through, if any.  Events
    /// the backend raises on its own only apply to operai with a matching
    /// source.
    fn source(&self) -> Option<&'static str> {
        None
    }

    async fn play(&self, modes: PlayModes) -> anyhow::Result<()>;

    async fn stop(&self) -> anyhow::Result<()>;

    async fn pause(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn unpause(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn next(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn previous(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn update_repeat(&self, _repeat: bool) -> anyhow::Result<()> {
        Ok(())
    }

    async fn update_shuffle(&self, _shuffle: bool) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Something that can set the output level (0–100).
#[async_trait]
pub trait Mixer: Send + Sync {
    async fn set_volume(&self, level: u8) -> anyhow::Result<()>;
}

/// A playable leaf.  Repeat and shuffle belong to the opus, not the radio,
/// so they travel with it into favorites.
#[derive(Clone)]
pub struct Opus {
    pub caps: Capabilities,
    pub repeat: bool,
    pub shuffle: bool,
    pub backend: Arc<dyn Playable>,
}

impl Opus {
    pub fn new(backend: Arc<dyn Playable>) -> Self {
        Self {
            caps: backend.capabilities(),
            repeat: false,
            shuffle: false,
            backend,
        }
    }

    pub fn metadata(&self) -> Metadata {
        self.backend.metadata()
    }

    pub fn source(&self) -> Option<&'static str> {
        self.backend.source()
    }

    pub fn modes(&self) -> PlayModes {
        PlayModes {
            repeat: self.caps.repeat && self.repeat,
            shuffle: self.caps.shuffle && self.shuffle,
        }
    }
}

impl std::fmt::Debug for Opus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Opus")
            .field("caps", &self.caps)
            .field("repeat", &self.repeat)
            .field("shuffle", &self.shuffle)
            .field("metadata", &self.metadata())
            .finish()
    }
}
