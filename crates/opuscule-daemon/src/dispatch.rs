//! Dispatcher: named commands and the components they act on.
//!
//! Every handler runs to completion against `RadioState` without awaiting.
//! Whatever a handler needs from a backend is left in the state's call list
//! for the core to hand to the backend worker.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use opuscule_proto::metadata::Metadata;
use opuscule_proto::protocol::{Labels, NoticeKind};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::components::{field, Component};
use crate::favorites::{self, AddOutcome, FavoritesAggregator};
use crate::menu::{Blueprint, CommandAction, Node, NodeId, NodeKind};
use crate::radio::RadioState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Advance,
    Retreat,
    Select,
    Escape,
    Shutdown,
    Play,
    Pause,
    Stop,
    AddFavorite,
    Shuffle,
    Repeat,
    Next,
    Previous,
    Louder,
    Softer,
    Mute,
    Refresh,
}

impl Verb {
    pub const ALL: [Verb; 17] = [
        Verb::Advance,
        Verb::Retreat,
        Verb::Select,
        Verb::Escape,
        Verb::Shutdown,
        Verb::Play,
        Verb::Pause,
        Verb::Stop,
        Verb::AddFavorite,
        Verb::Shuffle,
        Verb::Repeat,
        Verb::Next,
        Verb::Previous,
        Verb::Louder,
        Verb::Softer,
        Verb::Mute,
        Verb::Refresh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Advance => "advance",
            Verb::Retreat => "retreat",
            Verb::Select => "select",
            Verb::Escape => "escape",
            Verb::Shutdown => "shutdown",
            Verb::Play => "play",
            Verb::Pause => "pause",
            Verb::Stop => "stop",
            Verb::AddFavorite => "add_favorite",
            Verb::Shuffle => "shuffle",
            Verb::Repeat => "repeat",
            Verb::Next => "next",
            Verb::Previous => "previous",
            Verb::Louder => "louder",
            Verb::Softer => "softer",
            Verb::Mute => "mute",
            Verb::Refresh => "refresh",
        }
    }
}

impl FromStr for Verb {
    type Err = CommandError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Verb::ALL
            .into_iter()
            .find(|verb| verb.as_str() == name)
            .ok_or_else(|| CommandError::Unknown(name.to_string()))
    }
}

/// Why a command was refused.  The text goes back to the sender as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown command '{0}'.")]
    Unknown(String),
    #[error("Only operai can be added as favorites.")]
    NoCurrentOpus,
    #[error("Component '{0}' does not keep favorites.")]
    NoFavorites(String),
}

/// Work an accepted command leaves for the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Follow {
    None,
    Shutdown,
    /// Read the named component's catalog again.
    Rescan(String),
}

struct Registered {
    component: Arc<dyn Component>,
    node: NodeId,
}

pub struct Dispatcher {
    pub radio: RadioState,
    favorites: FavoritesAggregator,
    components: Vec<Registered>,
}

impl Dispatcher {
    pub fn new(mut radio: RadioState, favorites_dir: PathBuf) -> anyhow::Result<Self> {
        let favorites = FavoritesAggregator::install(&mut radio.menu, favorites_dir)?;
        Ok(Self {
            radio,
            favorites,
            components: Vec::new(),
        })
    }

    #[cfg(test)]
    pub fn favorites(&self) -> &FavoritesAggregator {
        &self.favorites
    }

    pub fn component(&self, tag: &str) -> Option<Arc<dyn Component>> {
        self.registered(tag).map(|r| r.component.clone())
    }

    /// Components whose menus are read from a backend catalog.
    pub fn catalogs(&self) -> Vec<Arc<dyn Component>> {
        self.components
            .iter()
            .filter(|r| r.component.has_catalog())
            .map(|r| r.component.clone())
            .collect()
    }

    fn registered(&self, tag: &str) -> Option<&Registered> {
        self.components.iter().find(|r| r.component.tag() == tag)
    }

    // ── Registration ────────────────────────────────────────────

    /// Give `component` a node under the root, restore its favorites and
    /// build its menus.
    pub fn register(&mut self, component: Arc<dyn Component>) -> Option<NodeId> {
        let tag = component.tag();
        let labels = component.labels();
        let root = self.radio.menu.root();
        let node = self.radio.menu.add_child(root, Node::submenu(labels.clone(), tag))?;

        if component.has_favorites() {
            let origin = self.radio.menu.add_child(
                node,
                Node::submenu(
                    Labels::new("Favorites", "Fav", format!("Favorite {}", labels.name)),
                    tag,
                ),
            )?;
            self.restore_favorites(component.as_ref(), origin);
            self.favorites.register(&mut self.radio.menu, tag, &labels.name, origin);
        }

        for blueprint in component.build() {
            self.radio.menu.graft(node, tag, blueprint);
        }
        info!("Registered component {}", tag);
        self.components.push(Registered { component, node });
        Some(node)
    }

    fn restore_favorites(&mut self, component: &dyn Component, origin: NodeId) {
        let tag = component.tag();
        let records = favorites::load_records(&self.favorites.path(tag));
        let mut restored = 0;
        for record in records {
            match component.opus_from_record(&record) {
                Some(opus) => {
                    let labels = Labels::new(field(&record, "name"), "", field(&record, "comment"));
                    self.radio.menu.graft(origin, tag, Blueprint::opus(labels, opus));
                    restored += 1;
                }
                None => warn!("Skipping unusable {} favorite: {:?}", tag, record),
            }
        }
        debug!("Restored {} {} favorites", restored, tag);
    }

    /// Replace the contents of `tag`'s sections with a freshly read catalog.
    /// Sections the component did not build up front are added.  The
    /// favorites list is never part of a catalog.
    pub fn install_catalog(&mut self, tag: &str, sections: Vec<Blueprint>) -> bool {
        let Some(node) = self.registered(tag).map(|r| r.node) else {
            return false;
        };
        let playing = self.radio.current_opus().map(|o| o.backend.clone());
        let kept = self.favorites.origin(tag);
        let menu = &mut self.radio.menu;

        for section in sections {
            let existing = menu.find_child(node, &section.labels().name);
            match (existing, section) {
                (Some(list), other) if Some(list) == kept => {
                    debug!("{} catalog: keeping favorites over {}", tag, other.labels().name);
                }
                (Some(list), Blueprint::Menu { children, .. }) => {
                    menu.reset_children(list);
                    for child in children {
                        menu.graft(list, tag, child);
                    }
                    menu.sort_children(list);
                }
                (Some(_), other) => debug!("{} catalog: keeping {}", tag, other.labels().name),
                (None, section) => {
                    menu.graft(node, tag, section);
                }
            }
        }

        if let Some(backend) = playing {
            if self.radio.current_opus().is_none() {
                info!("Loaded opus left the {} menu", tag);
                self.radio.unload(backend);
            }
        }
        info!("Installed {} catalog", tag);
        true
    }

    // ── Commands ────────────────────────────────────────────────

    /// Run the command named `name`.  A rejected command changes nothing.
    pub fn handle(&mut self, name: &str) -> Result<Follow, CommandError> {
        let verb: Verb = name.parse()?;
        debug!("Command: {}", verb.as_str());

        let radio = &mut self.radio;
        match verb {
            Verb::Advance => {
                radio.menu.advance();
            }
            Verb::Retreat => {
                radio.menu.retreat();
            }
            Verb::Select => return Ok(self.select()),
            Verb::Escape => {
                radio.menu.escape();
            }
            Verb::Shutdown => return Ok(Follow::Shutdown),
            Verb::Play => {
                radio.play();
            }
            Verb::Pause => {
                radio.pause();
            }
            Verb::Stop => {
                radio.stop();
            }
            Verb::AddFavorite => self.add_favorite()?,
            Verb::Shuffle => {
                radio.toggle_shuffle();
            }
            Verb::Repeat => {
                radio.toggle_repeat();
            }
            Verb::Next => {
                radio.next();
            }
            Verb::Previous => {
                radio.previous();
            }
            Verb::Louder => radio.louder(),
            Verb::Softer => radio.softer(),
            Verb::Mute => radio.toggle_mute(),
            Verb::Refresh => self.refresh(),
        }
        Ok(Follow::None)
    }

    /// Descend, play or run the command, depending on what is selected.
    fn select(&mut self) -> Follow {
        let Some(node) = self.radio.menu.selected_node() else {
            return Follow::None;
        };
        match &node.kind {
            NodeKind::Submenu(_) => {
                self.radio.menu.select();
                Follow::None
            }
            NodeKind::Playable(_) => {
                self.radio.play();
                Follow::None
            }
            NodeKind::Command(action) => self.run_action(action.clone()),
        }
    }

    fn run_action(&mut self, action: CommandAction) -> Follow {
        match action {
            CommandAction::Notice(text) => {
                info!("{}", text);
                self.radio.messages.queue(NoticeKind::Info, text);
                Follow::None
            }
            CommandAction::Rescan(tag) => {
                info!("Rescanning {}", tag);
                self.radio
                    .messages
                    .queue(NoticeKind::Info, format!("Rescanning {}.", tag));
                Follow::Rescan(tag)
            }
            CommandAction::Shutdown => Follow::Shutdown,
        }
    }

    /// Copy the loaded opus into its component's favorites and save them.
    fn add_favorite(&mut self) -> Result<(), CommandError> {
        let id = self
            .radio
            .now_playing
            .current()
            .filter(|&id| self.radio.menu.opus(id).is_some())
            .ok_or(CommandError::NoCurrentOpus)?;
        let tag = self
            .radio
            .menu
            .get(id)
            .map(|node| node.component.clone())
            .unwrap_or_default();

        let outcome = self
            .favorites
            .add_favorite(&mut self.radio.menu, &tag, id)
            .ok_or_else(|| CommandError::NoFavorites(tag.clone()))?;
        if outcome == AddOutcome::Added {
            if let Some(call) = self.favorites.save_call(&self.radio.menu, &tag) {
                self.radio.defer(call);
            }
        }
        Ok(())
    }

    fn refresh(&mut self) {
        self.favorites.refresh_all(&mut self.radio.menu);
        self.radio.refresh_now_playing();
    }

    // ── Backend events ──────────────────────────────────────────

    /// `source` stopped on its own.  Only matters if it was playing the
    /// loaded opus.
    pub fn backend_stopped(&mut self, source: &str) -> bool {
        self.radio.current_source_is(source) && self.radio.backend_stopped()
    }

    pub fn backend_metadata(&mut self, source: &str, record: Metadata) -> bool {
        self.radio.update_from_backend(source, record)
    }

    /// Stop playback and save every component's favorites.
    pub fn power_down(&mut self) {
        self.radio.power_down();
        for call in self.favorites.save_all_calls(&self.radio.menu) {
            self.radio.defer(call);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendCall;
    use crate::components::record_matches;
    use crate::controls::Volume;
    use crate::playback::testing::RecordingBackend;
    use crate::playback::{Capabilities, Opus};
    use opuscule_proto::protocol::{PlayState, SelKind};

    struct TestComponent {
        favorites: bool,
    }

    fn song(name: &str) -> Opus {
        Opus::new(RecordingBackend::new("test", name, Capabilities::default()))
    }

    #[async_trait::async_trait]
    impl Component for TestComponent {
        fn tag(&self) -> &'static str {
            "test"
        }

        fn labels(&self) -> Labels {
            Labels::new("Test", "Tst", "Test component")
        }

        fn build(&self) -> Vec<Blueprint> {
            vec![
                Blueprint::menu(
                    Labels::new("Songs", "", ""),
                    vec![
                        Blueprint::opus(Labels::new("one", "", ""), song("one")),
                        Blueprint::opus(Labels::new("two", "", ""), song("two")),
                    ],
                ),
                Blueprint::command(
                    Labels::new("Hello", "", ""),
                    CommandAction::Notice("hello there".to_string()),
                ),
                Blueprint::command(
                    Labels::new("Rescan", "", ""),
                    CommandAction::Rescan("test".to_string()),
                ),
            ]
        }

        fn has_favorites(&self) -> bool {
            self.favorites
        }

        fn opus_from_record(&self, record: &Metadata) -> Option<Opus> {
            record_matches(record, "test", "test").then(|| song(field(record, "name")))
        }
    }

    fn dispatcher(dir: &std::path::Path, favorites: bool) -> Dispatcher {
        let radio = RadioState::new(10, Volume::new(50, 5));
        let mut dispatcher = Dispatcher::new(radio, dir.to_path_buf()).unwrap();
        dispatcher.register(Arc::new(TestComponent { favorites }));
        dispatcher
    }

    fn run(dispatcher: &mut Dispatcher, commands: &[&str]) {
        for command in commands {
            dispatcher.handle(command).unwrap();
        }
    }

    /// From the root, into Test → Songs with "one" selected.
    fn enter_songs(dispatcher: &mut Dispatcher) {
        run(dispatcher, &["advance", "select"]);
        let view = dispatcher.radio.menu.view();
        let songs = view.list.iter().position(|l| l.name == "Songs").unwrap();
        for _ in 0..songs {
            dispatcher.handle("advance").unwrap();
        }
        dispatcher.handle("select").unwrap();
    }

    #[test]
    fn test_verbs_parse() {
        for verb in Verb::ALL {
            assert_eq!(verb.as_str().parse::<Verb>().unwrap(), verb);
        }
        assert_eq!(
            "dance".parse::<Verb>(),
            Err(CommandError::Unknown("dance".to_string()))
        );
    }

    #[test]
    fn test_unknown_command_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = dispatcher(dir.path(), false);
        let before = d.radio.snapshot();
        let err = d.handle("jump").unwrap_err();
        assert_eq!(err.to_string(), "Unknown command 'jump'.");
        assert_eq!(d.radio.snapshot(), before);
        assert!(d.radio.take_calls().is_empty());
    }

    #[test]
    fn test_root_menu_layout() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path(), true);
        let view = d.radio.menu.view();
        let names: Vec<&str> = view.list.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Favorites", "Test"]);
        assert_eq!(view.selkind, SelKind::Menulist);

        let test = d.radio.menu.children(d.radio.menu.root())[1];
        let sections: Vec<String> = d
            .radio
            .menu
            .children(test)
            .iter()
            .map(|&id| d.radio.menu.get(id).unwrap().labels.name.clone())
            .collect();
        assert_eq!(sections, vec!["Favorites", "Songs", "Hello", "Rescan"]);
    }

    #[test]
    fn test_select_plays_opus() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = dispatcher(dir.path(), false);
        enter_songs(&mut d);
        assert_eq!(d.radio.menu.view().selkind, SelKind::Opus);

        assert_eq!(d.handle("select").unwrap(), Follow::None);
        assert_eq!(d.radio.playstate(), PlayState::Playing);
        assert_eq!(d.radio.now_playing.data().get("name"), Some("one"));
        assert_eq!(d.radio.take_calls().len(), 1);
    }

    #[test]
    fn test_select_runs_commands() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = dispatcher(dir.path(), false);
        run(&mut d, &["advance", "select", "advance"]);
        assert_eq!(d.radio.menu.view().selkind, SelKind::Command);

        assert_eq!(d.handle("select").unwrap(), Follow::None);
        let messages = d.radio.snapshot().messages;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, NoticeKind::Info);
        assert_eq!(messages[0].text, "hello there");

        d.handle("advance").unwrap();
        assert_eq!(d.handle("select").unwrap(), Follow::Rescan("test".to_string()));
        assert_eq!(d.handle("shutdown").unwrap(), Follow::Shutdown);
    }

    #[test]
    fn test_add_favorite_requires_current_opus() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = dispatcher(dir.path(), true);
        assert_eq!(d.handle("add_favorite"), Err(CommandError::NoCurrentOpus));
        assert_eq!(
            CommandError::NoCurrentOpus.to_string(),
            "Only operai can be added as favorites."
        );
    }

    #[test]
    fn test_add_favorite_requires_favorites_component() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = dispatcher(dir.path(), false);
        enter_songs(&mut d);
        d.handle("play").unwrap();
        d.radio.take_calls();
        assert_eq!(
            d.handle("add_favorite"),
            Err(CommandError::NoFavorites("test".to_string()))
        );
        assert!(d.radio.take_calls().is_empty());
    }

    #[tokio::test]
    async fn test_favorites_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = dispatcher(dir.path(), true);
        enter_songs(&mut d);
        d.handle("play").unwrap();
        d.radio.take_calls();

        d.handle("add_favorite").unwrap();
        let calls = d.radio.take_calls();
        assert_eq!(calls.len(), 1);
        let BackendCall::SaveFavorites { path, records } = &calls[0] else {
            panic!("expected a save call");
        };
        favorites::save_records(path, records).await.unwrap();

        // a second add is a no-op
        d.handle("add_favorite").unwrap();
        assert!(d.radio.take_calls().is_empty());
        assert_eq!(d.favorites().records(&d.radio.menu, "test").len(), 1);

        let fresh = dispatcher(dir.path(), true);
        let records = fresh.favorites().records(&fresh.radio.menu, "test");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("name").map(String::as_str), Some("one"));

        let collected = fresh.favorites().root();
        let shadow = fresh.radio.menu.children(collected)[0];
        assert_eq!(fresh.radio.menu.children(shadow).len(), 1);
    }

    #[test]
    fn test_backend_stop_ignores_other_sources() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = dispatcher(dir.path(), false);
        enter_songs(&mut d);
        d.handle("play").unwrap();
        assert!(!d.backend_stopped("mpd"));
        assert_eq!(d.radio.playstate(), PlayState::Playing);
    }

    #[test]
    fn test_catalog_replaces_sections() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = dispatcher(dir.path(), false);
        enter_songs(&mut d);
        d.handle("play").unwrap();
        d.radio.take_calls();

        let catalog = vec![
            Blueprint::menu(
                Labels::new("Songs", "", ""),
                vec![Blueprint::opus(Labels::new("three", "", ""), song("three"))],
            ),
            Blueprint::menu(Labels::new("Extra", "", ""), Vec::new()),
        ];
        assert!(d.install_catalog("test", catalog));
        assert!(!d.install_catalog("nothing", Vec::new()));

        let view = d.radio.menu.view();
        let names: Vec<&str> = view.list.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["three"]);

        // the playing opus went away with the old section
        assert_eq!(d.radio.playstate(), PlayState::Stopped);
        assert_eq!(format!("{:?}", d.radio.take_calls()), "[stop(one)]");
    }

    #[test]
    fn test_catalog_leaves_favorites_alone() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = dispatcher(dir.path(), true);
        enter_songs(&mut d);
        d.handle("play").unwrap();
        d.handle("add_favorite").unwrap();
        d.radio.take_calls();

        let catalog = vec![
            Blueprint::menu(Labels::new("Favorites", "", ""), Vec::new()),
            Blueprint::menu(Labels::new("Songs", "", ""), Vec::new()),
        ];
        assert!(d.install_catalog("test", catalog));
        assert_eq!(d.favorites().records(&d.radio.menu, "test").len(), 1);

        let collected = d.favorites().root();
        let shadow = d.radio.menu.children(collected)[0];
        assert_eq!(d.radio.menu.children(shadow).len(), 1);
    }

    #[test]
    fn test_power_down_saves_favorites() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = dispatcher(dir.path(), true);
        enter_songs(&mut d);
        d.handle("play").unwrap();
        d.radio.take_calls();

        d.power_down();
        let labels: Vec<&str> = d.radio.take_calls().iter().map(BackendCall::label).collect();
        assert_eq!(labels, vec!["stop", "save_favorites"]);
    }
}
