//! The play/pause/stop transition table.
//!
//! `decide` is pure: it reads the state and what the menu offers and returns
//! the transition to perform.  Carrying it out (loading, queuing backend
//! calls, lighting lamps) is `RadioState`'s job.

use opuscule_proto::protocol::PlayState;

use crate::menu::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayInput {
    Play,
    Stop,
    Pause,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Ignore,
    /// Stop whatever is loaded, load this opus and play it.
    Start(NodeId),
    Stop,
    Pause,
    Unpause,
}

/// What the transition table needs to know about the world.
#[derive(Debug, Clone, Copy, Default)]
pub struct Facts {
    /// The selected node, only if it is a playable leaf.
    pub selected_opus: Option<NodeId>,
    pub current: Option<NodeId>,
    pub current_can_pause: bool,
}

pub fn decide(state: PlayState, input: PlayInput, facts: Facts) -> Transition {
    use PlayInput as I;
    use PlayState as S;

    match (state, input) {
        (S::Stopped, I::Play) => facts.selected_opus.map_or(Transition::Ignore, Transition::Start),
        (S::Playing, I::Play) => match facts.selected_opus {
            Some(selected) if Some(selected) != facts.current => Transition::Start(selected),
            _ => Transition::Ignore,
        },
        (S::Paused, I::Play) | (S::Paused, I::Pause) => Transition::Unpause,
        (S::Playing, I::Stop) | (S::Paused, I::Stop) => Transition::Stop,
        (S::Playing, I::Pause) if facts.current_can_pause => Transition::Pause,
        (S::Stopped, I::Stop) | (S::Stopped, I::Pause) | (S::Playing, I::Pause) => {
            Transition::Ignore
        }
    }
}

impl Transition {
    /// State after the transition, `None` when nothing changes.
    pub fn destination(&self) -> Option<PlayState> {
        match self {
            Transition::Ignore => None,
            Transition::Start(_) | Transition::Unpause => Some(PlayState::Playing),
            Transition::Stop => Some(PlayState::Stopped),
            Transition::Pause => Some(PlayState::Paused),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::{CommandAction, MenuTree, Node, NodeKind};
    use opuscule_proto::protocol::Labels;

    fn two_ids() -> (NodeId, NodeId) {
        let mut tree = MenuTree::new();
        let root = tree.root();
        let mut add = |name: &str| {
            tree.add_child(
                root,
                Node {
                    labels: Labels::new(name, "", ""),
                    component: "test".to_string(),
                    kind: NodeKind::Command(CommandAction::Shutdown),
                },
            )
            .unwrap()
        };
        (add("a"), add("b"))
    }

    #[test]
    fn test_play_from_stopped_needs_a_playable_selection() {
        let (a, _) = two_ids();
        let nothing = Facts::default();
        assert_eq!(decide(PlayState::Stopped, PlayInput::Play, nothing), Transition::Ignore);

        let facts = Facts {
            selected_opus: Some(a),
            ..Default::default()
        };
        assert_eq!(decide(PlayState::Stopped, PlayInput::Play, facts), Transition::Start(a));
    }

    #[test]
    fn test_play_while_playing_only_reloads_a_different_item() {
        let (a, b) = two_ids();
        let same = Facts {
            selected_opus: Some(a),
            current: Some(a),
            current_can_pause: false,
        };
        assert_eq!(decide(PlayState::Playing, PlayInput::Play, same), Transition::Ignore);

        let other = Facts {
            selected_opus: Some(b),
            ..same
        };
        assert_eq!(decide(PlayState::Playing, PlayInput::Play, other), Transition::Start(b));

        let not_playable = Facts {
            selected_opus: None,
            ..same
        };
        assert_eq!(decide(PlayState::Playing, PlayInput::Play, not_playable), Transition::Ignore);
    }

    #[test]
    fn test_pause_is_gated_on_support() {
        let (a, _) = two_ids();
        let no_pause = Facts {
            selected_opus: None,
            current: Some(a),
            current_can_pause: false,
        };
        assert_eq!(decide(PlayState::Playing, PlayInput::Pause, no_pause), Transition::Ignore);

        let can_pause = Facts {
            current_can_pause: true,
            ..no_pause
        };
        assert_eq!(decide(PlayState::Playing, PlayInput::Pause, can_pause), Transition::Pause);
        assert_eq!(decide(PlayState::Paused, PlayInput::Pause, can_pause), Transition::Unpause);
        assert_eq!(decide(PlayState::Stopped, PlayInput::Pause, can_pause), Transition::Ignore);
    }

    #[test]
    fn test_stop_and_resume() {
        let facts = Facts::default();
        assert_eq!(decide(PlayState::Stopped, PlayInput::Stop, facts), Transition::Ignore);
        assert_eq!(decide(PlayState::Playing, PlayInput::Stop, facts), Transition::Stop);
        assert_eq!(decide(PlayState::Paused, PlayInput::Stop, facts), Transition::Stop);
        assert_eq!(decide(PlayState::Paused, PlayInput::Play, facts), Transition::Unpause);
    }

    #[test]
    fn test_destinations() {
        let (a, _) = two_ids();
        assert_eq!(Transition::Ignore.destination(), None);
        assert_eq!(Transition::Start(a).destination(), Some(PlayState::Playing));
        assert_eq!(Transition::Pause.destination(), Some(PlayState::Paused));
        assert_eq!(Transition::Stop.destination(), Some(PlayState::Stopped));
    }
}
