//! Auxiliary state: volume, indicator lamps and the outgoing notice queue.

use std::collections::VecDeque;

use opuscule_proto::protocol::{Distribution, Indicators, Notice, NoticeKind, PlayState};

pub const MAX_VOLUME: u8 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    level: u8,
    muted: bool,
    step: u8,
}

impl Volume {
    pub fn new(level: u8, step: u8) -> Self {
        Self {
            level: level.min(MAX_VOLUME),
            muted: false,
            step: step.max(1),
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    /// Level the output should actually be at.
    pub fn effective(&self) -> u8 {
        if self.muted {
            0
        } else {
            self.level
        }
    }

    pub fn louder(&mut self) -> u8 {
        self.level = self.level.saturating_add(self.step).min(MAX_VOLUME);
        self.level
    }

    pub fn softer(&mut self) -> u8 {
        self.level = self.level.saturating_sub(self.step);
        self.level
    }

    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        self.muted
    }
}

/// Front panel lamps.
#[derive(Debug, Clone, Default)]
pub struct IndicatorBoard(Indicators);

impl IndicatorBoard {
    /// Light the transport lamps for `state`.
    pub fn show_play_state(&mut self, state: PlayState) {
        let lamps = &mut self.0;
        lamps.play = matches!(state, PlayState::Playing | PlayState::Paused);
        lamps.pause = state == PlayState::Paused;
        lamps.stop = state == PlayState::Stopped;
    }

    pub fn set_repeat(&mut self, on: bool) {
        self.0.repeat = on;
    }

    pub fn set_shuffle(&mut self, on: bool) {
        self.0.shuffle = on;
    }

    pub fn set_mute(&mut self, on: bool) {
        self.0.mute = on;
    }

    pub fn lamps(&self) -> &Indicators {
        &self.0
    }
}

/// Notices waiting for the next snapshot.  Each notice is delivered once.
#[derive(Debug, Default)]
pub struct MessageQueue {
    pending: VecDeque<Notice>,
}

impl MessageQueue {
    pub fn queue(&mut self, kind: NoticeKind, text: impl Into<String>) {
        self.push(Notice {
            kind,
            dist: Distribution::All,
            text: text.into(),
        });
    }

    pub fn push(&mut self, notice: Notice) {
        self.pending.push_back(notice);
    }

    pub fn drain(&mut self) -> Vec<Notice> {
        self.pending.drain(..).collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_clamps() {
        let mut volume = Volume::new(97, 5);
        assert_eq!(volume.louder(), 100);
        assert_eq!(volume.louder(), 100);

        let mut volume = Volume::new(3, 5);
        assert_eq!(volume.softer(), 0);
        assert_eq!(volume.softer(), 0);

        assert_eq!(Volume::new(250, 5).level(), 100);
    }

    #[test]
    fn test_mute_keeps_level() {
        let mut volume = Volume::new(60, 5);
        assert!(volume.toggle_mute());
        assert_eq!(volume.effective(), 0);
        assert_eq!(volume.level(), 60);
        assert!(!volume.toggle_mute());
        assert_eq!(volume.effective(), 60);
    }

    #[test]
    fn test_play_state_lamps() {
        let mut board = IndicatorBoard::default();
        assert!(board.lamps().stop);
        assert!(board.lamps().power);

        board.show_play_state(PlayState::Paused);
        let lamps = board.lamps();
        assert!(lamps.play && lamps.pause && !lamps.stop);

        board.show_play_state(PlayState::Playing);
        let lamps = board.lamps();
        assert!(lamps.play && !lamps.pause && !lamps.stop);

        board.show_play_state(PlayState::Stopped);
        let lamps = board.lamps();
        assert!(!lamps.play && !lamps.pause && lamps.stop);
    }

    #[test]
    fn test_messages_drain_once() {
        let mut messages = MessageQueue::default();
        messages.queue(NoticeKind::Info, "one");
        messages.queue(NoticeKind::Fault, "two");
        let drained = messages.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].text, "one");
        assert_eq!(drained[1].kind, NoticeKind::Fault);
        assert!(messages.drain().is_empty());
    }
}
