//! RadioState: the aggregate root.
//!
//! Owned by the core task and mutated only through the dispatcher.  Methods
//! here never block: every backend side effect is appended to `calls` and
//! handed to the backend worker once the command has been applied.

use std::sync::Arc;

use opuscule_proto::metadata::Metadata;
use opuscule_proto::protocol::{PlayState, Snapshot};
use tracing::{debug, info};

use crate::backend::BackendCall;
use crate::controls::{IndicatorBoard, MessageQueue, Volume};
use crate::menu::{MenuTree, NodeId};
use crate::now_playing::NowPlaying;
use crate::playback::{Opus, Playable};
use crate::playstate::{decide, Facts, PlayInput, Transition};

pub struct RadioState {
    pub menu: MenuTree,
    pub now_playing: NowPlaying,
    pub volume: Volume,
    pub messages: MessageQueue,
    pub indicators: IndicatorBoard,
    playstate: PlayState,
    /// Last track details the current opus's backend reported.
    backend_record: Metadata,
    calls: Vec<BackendCall>,
}

impl RadioState {
    pub fn new(history_len: usize, volume: Volume) -> Self {
        Self {
            menu: MenuTree::new(),
            now_playing: NowPlaying::new(history_len),
            volume,
            messages: MessageQueue::default(),
            indicators: IndicatorBoard::default(),
            playstate: PlayState::Stopped,
            backend_record: Metadata::new(),
            calls: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn playstate(&self) -> PlayState {
        self.playstate
    }

    pub fn current_opus(&self) -> Option<&Opus> {
        self.now_playing.current().and_then(|id| self.menu.opus(id))
    }

    /// Backend calls accumulated since the last take.
    pub fn take_calls(&mut self) -> Vec<BackendCall> {
        std::mem::take(&mut self.calls)
    }

    /// Queue a call that is not about playback, e.g. saving favorites.
    pub fn defer(&mut self, call: BackendCall) {
        self.calls.push(call);
    }

    pub fn snapshot(&mut self) -> Snapshot {
        Snapshot {
            playstate: self.playstate,
            component: self.menu.current_component().to_string(),
            messages: self.messages.drain(),
            menu: self.menu.view(),
            now_playing: self.now_playing.data().clone(),
            volume: self.volume.level(),
            indicators: self.indicators.lamps().clone(),
        }
    }

    // ── Transport ───────────────────────────────────────────────

    fn facts(&self) -> Facts {
        let selected_opus = self
            .menu
            .selected()
            .filter(|&id| self.menu.opus(id).is_some());
        Facts {
            selected_opus,
            current: self.now_playing.current(),
            current_can_pause: self.current_opus().is_some_and(|o| o.caps.pause),
        }
    }

    pub fn play(&mut self) -> bool {
        self.apply(decide(self.playstate, PlayInput::Play, self.facts()))
    }

    pub fn stop(&mut self) -> bool {
        self.apply(decide(self.playstate, PlayInput::Stop, self.facts()))
    }

    pub fn pause(&mut self) -> bool {
        self.apply(decide(self.playstate, PlayInput::Pause, self.facts()))
    }

    fn apply(&mut self, transition: Transition) -> bool {
        let Some(destination) = transition.destination() else {
            return false;
        };
        match transition {
            Transition::Start(id) => self.start(id),
            Transition::Stop => self.queue_on_current(BackendCall::Stop),
            Transition::Pause => self.queue_on_current(BackendCall::Pause),
            Transition::Unpause => self.queue_on_current(BackendCall::Unpause),
            Transition::Ignore => {}
        }
        self.enter(destination);
        true
    }

    fn enter(&mut self, state: PlayState) {
        if state != self.playstate {
            debug!("Playstate {} -> {}", self.playstate.as_str(), state.as_str());
        }
        self.playstate = state;
        self.indicators.show_play_state(state);
    }

    fn queue_on_current(&mut self, call: fn(Arc<dyn Playable>) -> BackendCall) {
        if let Some(opus) = self.current_opus() {
            let backend = opus.backend.clone();
            self.calls.push(call(backend));
        }
    }

    /// Stop what is loaded, load `id` and play it.
    fn start(&mut self, id: NodeId) {
        self.queue_on_current(BackendCall::Stop);
        self.now_playing.load(id);
        self.backend_record.clear();
        self.refresh_now_playing();

        let Some(opus) = self.menu.opus(id) else {
            return;
        };
        let modes = opus.modes();
        info!("Playing {}", self.now_playing.data().get("name").unwrap_or_default());
        self.calls.push(BackendCall::Play {
            backend: opus.backend.clone(),
            modes,
        });
        self.indicators.set_repeat(modes.repeat);
        self.indicators.set_shuffle(modes.shuffle);
    }

    /// The backend stopped on its own.  Nothing is sent back to it.
    pub fn backend_stopped(&mut self) -> bool {
        if self.playstate == PlayState::Stopped {
            return false;
        }
        info!("Backend stopped playback");
        self.enter(PlayState::Stopped);
        true
    }

    /// The loaded opus was removed from the menu.  Stop `backend`, which
    /// was playing it, and forget the record it reported.
    pub fn unload(&mut self, backend: Arc<dyn Playable>) {
        if self.playstate != PlayState::Stopped {
            self.calls.push(BackendCall::Stop(backend));
            self.enter(PlayState::Stopped);
        }
        self.backend_record.clear();
        self.refresh_now_playing();
    }

    pub fn next(&mut self) -> bool {
        let navigable = self.current_opus().is_some_and(|o| o.caps.navigation);
        if self.playstate == PlayState::Stopped || !navigable {
            return false;
        }
        self.queue_on_current(BackendCall::Next);
        true
    }

    /// Previous track, or the previous opus when the current one has no
    /// tracks to step through.
    pub fn previous(&mut self) -> bool {
        let navigable = self.current_opus().is_some_and(|o| o.caps.navigation);
        if !navigable {
            return self.revert();
        }
        if self.playstate == PlayState::Stopped {
            return false;
        }
        self.queue_on_current(BackendCall::Previous);
        true
    }

    /// Go back to the opus played before the current one and play it.
    pub fn revert(&mut self) -> bool {
        let leaving = self.current_opus().map(|o| o.backend.clone());
        let menu = &self.menu;
        let Some(id) = self.now_playing.revert_with(|id| menu.opus(id).is_some()) else {
            return false;
        };
        if self.playstate != PlayState::Stopped {
            if let Some(backend) = leaving {
                self.calls.push(BackendCall::Stop(backend));
            }
        }
        self.backend_record.clear();
        self.refresh_now_playing();
        if let Some(opus) = self.menu.opus(id) {
            self.calls.push(BackendCall::Play {
                backend: opus.backend.clone(),
                modes: opus.modes(),
            });
            self.indicators.set_repeat(opus.modes().repeat);
            self.indicators.set_shuffle(opus.modes().shuffle);
        }
        self.enter(PlayState::Playing);
        true
    }

    // ── Modes ───────────────────────────────────────────────────

    pub fn toggle_repeat(&mut self) -> bool {
        let Some(id) = self.now_playing.current() else {
            return false;
        };
        let Some(opus) = self.menu.opus_mut(id).filter(|o| o.caps.repeat) else {
            return false;
        };
        opus.repeat = !opus.repeat;
        let (on, backend) = (opus.repeat, opus.backend.clone());
        self.calls.push(BackendCall::UpdateRepeat(backend, on));
        self.indicators.set_repeat(on);
        true
    }

    pub fn toggle_shuffle(&mut self) -> bool {
        let Some(id) = self.now_playing.current() else {
            return false;
        };
        let Some(opus) = self.menu.opus_mut(id).filter(|o| o.caps.shuffle) else {
            return false;
        };
        opus.shuffle = !opus.shuffle;
        let (on, backend) = (opus.shuffle, opus.backend.clone());
        self.calls.push(BackendCall::UpdateShuffle(backend, on));
        self.indicators.set_shuffle(on);
        true
    }

    // ── Volume ──────────────────────────────────────────────────

    pub fn louder(&mut self) {
        self.volume.louder();
        self.push_volume();
    }

    pub fn softer(&mut self) {
        self.volume.softer();
        self.push_volume();
    }

    pub fn toggle_mute(&mut self) {
        let muted = self.volume.toggle_mute();
        self.indicators.set_mute(muted);
        self.calls.push(BackendCall::SetVolume(self.volume.effective()));
    }

    fn push_volume(&mut self) {
        // while muted only the remembered level moves
        if !self.volume.muted() {
            self.calls.push(BackendCall::SetVolume(self.volume.effective()));
        }
    }

    /// Push the current level to the mixer, e.g. at startup.
    pub fn sync_volume(&mut self) {
        self.calls.push(BackendCall::SetVolume(self.volume.effective()));
    }

    // ── Now playing ─────────────────────────────────────────────

    pub fn refresh_now_playing(&mut self) {
        let opus_record = self.current_opus().map(Opus::metadata).unwrap_or_default();
        self.now_playing.refresh(&opus_record, &self.backend_record);
    }

    /// Track details pushed by a backend.  Applied only while an opus
    /// playing through that backend is loaded.
    pub fn update_from_backend(&mut self, source: &str, record: Metadata) -> bool {
        if self.current_opus().and_then(Opus::source) != Some(source) {
            return false;
        }
        self.backend_record = record;
        self.refresh_now_playing();
        true
    }

    /// Whether an event from `source` concerns the loaded opus.
    pub fn current_source_is(&self, source: &str) -> bool {
        self.current_opus().and_then(Opus::source) == Some(source)
    }

    /// Stop playback for shutdown.
    pub fn power_down(&mut self) {
        self.stop();
    }
}
