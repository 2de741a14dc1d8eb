//! BackendWorker: runs the calls handlers defer.
//!
//! The state task never awaits a backend.  Each accepted command leaves
//! behind a batch of `BackendCall`s which is queued here after the mutation
//! commits.  Batches run strictly in order, one call at a time, so a stop
//! queued before a play always reaches the backend first.

use std::path::PathBuf;
use std::sync::Arc;

use opuscule_proto::metadata::Metadata;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::core::DaemonEvent;
use crate::favorites;
use crate::playback::{Mixer, Playable, PlayModes};

pub enum BackendCall {
    Play {
        backend: Arc<dyn Playable>,
        modes: PlayModes,
    },
    Stop(Arc<dyn Playable>),
    Pause(Arc<dyn Playable>),
    Unpause(Arc<dyn Playable>),
    Next(Arc<dyn Playable>),
    Previous(Arc<dyn Playable>),
    UpdateRepeat(Arc<dyn Playable>, bool),
    UpdateShuffle(Arc<dyn Playable>, bool),
    SetVolume(u8),
    SaveFavorites {
        path: PathBuf,
        records: Vec<Metadata>,
    },
}

impl BackendCall {
    pub fn label(&self) -> &'static str {
        match self {
            BackendCall::Play { .. } => "play",
            BackendCall::Stop(_) => "stop",
            BackendCall::Pause(_) => "pause",
            BackendCall::Unpause(_) => "unpause",
            BackendCall::Next(_) => "next",
            BackendCall::Previous(_) => "previous",
            BackendCall::UpdateRepeat(..) => "repeat",
            BackendCall::UpdateShuffle(..) => "shuffle",
            BackendCall::SetVolume(_) => "setvol",
            BackendCall::SaveFavorites { .. } => "save_favorites",
        }
    }

    /// The backend source a transport call drives, if any.  Volume and
    /// favorites calls never change what a backend is playing.
    pub fn transport_source(&self) -> Option<&'static str> {
        match self {
            BackendCall::Play { backend, .. }
            | BackendCall::Stop(backend)
            | BackendCall::Pause(backend)
            | BackendCall::Unpause(backend)
            | BackendCall::Next(backend)
            | BackendCall::Previous(backend) => backend.source(),
            _ => None,
        }
    }

    /// The opus name the call is about, for log lines.
    fn subject(&self) -> String {
        let backend = match self {
            BackendCall::Play { backend, .. }
            | BackendCall::Stop(backend)
            | BackendCall::Pause(backend)
            | BackendCall::Unpause(backend)
            | BackendCall::Next(backend)
            | BackendCall::Previous(backend)
            | BackendCall::UpdateRepeat(backend, _)
            | BackendCall::UpdateShuffle(backend, _) => backend,
            BackendCall::SetVolume(level) => return format!("volume {}", level),
            BackendCall::SaveFavorites { path, .. } => return path.display().to_string(),
        };
        backend.metadata().get("name").cloned().unwrap_or_default()
    }
}

impl std::fmt::Debug for BackendCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.label(), self.subject())
    }
}

pub type Batch = Vec<BackendCall>;

/// Clonable handle for queuing batches.
#[derive(Clone)]
pub struct BackendQueue {
    tx: mpsc::UnboundedSender<Batch>,
}

impl BackendQueue {
    /// Queue a batch.  Returns false if the worker is gone.
    pub fn submit(&self, batch: Batch) -> bool {
        self.tx.send(batch).is_ok()
    }
}

pub struct BackendWorker {
    jobs: mpsc::UnboundedReceiver<Batch>,
    mixer: Option<Arc<dyn Mixer>>,
    events: mpsc::UnboundedSender<DaemonEvent>,
}

impl BackendWorker {
    pub fn new(
        mixer: Option<Arc<dyn Mixer>>,
        events: mpsc::UnboundedSender<DaemonEvent>,
    ) -> (Self, BackendQueue) {
        let (tx, jobs) = mpsc::unbounded_channel();
        (Self { jobs, mixer, events }, BackendQueue { tx })
    }

    /// Run until every queue handle is dropped.  Each batch is acknowledged
    /// with `JobFinished`, failed or not.
    pub async fn run(mut self) {
        while let Some(batch) = self.jobs.recv().await {
            for call in batch {
                debug!("Backend call: {:?}", call);
                let description = format!("{:?}", call);
                if let Err(e) = self.execute(call).await {
                    error!("Backend call {} failed: {:#}", description, e);
                }
            }
            if self.events.send(DaemonEvent::JobFinished).is_err() {
                break;
            }
        }
        debug!("Backend worker stopped");
    }

    async fn execute(&self, call: BackendCall) -> anyhow::Result<()> {
        match call {
            BackendCall::Play { backend, modes } => backend.play(modes).await,
            BackendCall::Stop(backend) => backend.stop().await,
            BackendCall::Pause(backend) => backend.pause().await,
            BackendCall::Unpause(backend) => backend.unpause().await,
            BackendCall::Next(backend) => backend.next().await,
            BackendCall::Previous(backend) => backend.previous().await,
            BackendCall::UpdateRepeat(backend, on) => backend.update_repeat(on).await,
            BackendCall::UpdateShuffle(backend, on) => backend.update_shuffle(on).await,
            BackendCall::SetVolume(level) => match &self.mixer {
                Some(mixer) => mixer.set_volume(level).await,
                None => {
                    debug!("No mixer, volume {} not applied", level);
                    Ok(())
                }
            },
            BackendCall::SaveFavorites { path, records } => {
                favorites::save_records(&path, &records).await
            }
        }
    }
}
