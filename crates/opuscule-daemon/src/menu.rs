//! MenuTree: the navigable hierarchy of the appliance.
//!
//! Nodes live in an arena and are addressed by generational `NodeId`s.
//! Child lists hold ids; back-references live in a separate parent map, so a
//! list may reference a node it does not own (the favorites shadow lists do
//! exactly that) without changing where `escape` leads.
//!
//! The cursor is the pair (current list, that list's `index`).  The selected
//! node is always derived from it, never stored.

use std::collections::HashMap;

use opuscule_proto::protocol::{Labels, MenuView, SelKind};

use crate::playback::Opus;

pub const ROOT_NAME: &str = "root";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

/// What a command leaf does when selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    /// Log the request and tell every client about it.
    Notice(String),
    /// Re-read a component's catalog from its backend.
    Rescan(String),
    Shutdown,
}

#[derive(Debug, Clone, Default)]
pub struct Submenu {
    children: Vec<NodeId>,
    index: usize,
}

impl Submenu {
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Submenu(Submenu),
    Playable(Opus),
    Command(CommandAction),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub labels: Labels,
    pub component: String,
    pub kind: NodeKind,
}

impl Node {
    pub fn submenu(labels: Labels, component: impl Into<String>) -> Self {
        Self {
            labels,
            component: component.into(),
            kind: NodeKind::Submenu(Submenu::default()),
        }
    }

    pub fn sel_kind(&self) -> SelKind {
        match self.kind {
            NodeKind::Submenu(_) => SelKind::Menulist,
            NodeKind::Playable(_) => SelKind::Opus,
            NodeKind::Command(_) => SelKind::Command,
        }
    }

    pub fn as_opus(&self) -> Option<&Opus> {
        match &self.kind {
            NodeKind::Playable(opus) => Some(opus),
            _ => None,
        }
    }

    fn as_submenu(&self) -> Option<&Submenu> {
        match &self.kind {
            NodeKind::Submenu(list) => Some(list),
            _ => None,
        }
    }

    fn as_submenu_mut(&mut self) -> Option<&mut Submenu> {
        match &mut self.kind {
            NodeKind::Submenu(list) => Some(list),
            _ => None,
        }
    }
}

/// Plain description of a subtree, built off the state task (e.g. from a
/// backend catalog scan) and grafted into the tree in one step.
#[derive(Debug, Clone)]
pub enum Blueprint {
    Menu { labels: Labels, children: Vec<Blueprint> },
    Opus { labels: Labels, opus: Opus },
    Command { labels: Labels, action: CommandAction },
}

impl Blueprint {
    pub fn menu(labels: Labels, children: Vec<Blueprint>) -> Self {
        Blueprint::Menu { labels, children }
    }

    pub fn opus(labels: Labels, opus: Opus) -> Self {
        Blueprint::Opus { labels, opus }
    }

    pub fn command(labels: Labels, action: CommandAction) -> Self {
        Blueprint::Command { labels, action }
    }

    pub fn labels(&self) -> &Labels {
        match self {
            Blueprint::Menu { labels, .. }
            | Blueprint::Opus { labels, .. }
            | Blueprint::Command { labels, .. } => labels,
        }
    }
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

pub struct MenuTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    parents: HashMap<NodeId, NodeId>,
    root: NodeId,
    current: NodeId,
}

impl Default for MenuTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MenuTree {
    pub fn new() -> Self {
        let mut tree = Self {
            slots: Vec::new(),
            free: Vec::new(),
            parents: HashMap::new(),
            root: NodeId { index: 0, generation: 0 },
            current: NodeId { index: 0, generation: 0 },
        };
        let root = tree.insert(Node::submenu(
            Labels::new(ROOT_NAME, ROOT_NAME, "Top of the menu."),
            ROOT_NAME,
        ));
        tree.root = root;
        tree.current = root;
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The list the cursor is in.
    #[cfg(test)]
    pub fn current(&self) -> NodeId {
        self.current
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn opus(&self, id: NodeId) -> Option<&Opus> {
        self.get(id).and_then(Node::as_opus)
    }

    pub fn opus_mut(&mut self, id: NodeId) -> Option<&mut Opus> {
        match self.get_mut(id).map(|n| &mut n.kind) {
            Some(NodeKind::Playable(opus)) => Some(opus),
            _ => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(&id).copied()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id)
            .and_then(Node::as_submenu)
            .map(Submenu::children)
            .unwrap_or(&[])
    }

    pub fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&id| self.get(id).is_some_and(|n| n.labels.name == name))
    }

    /// Node under the cursor of the current list.
    pub fn selected(&self) -> Option<NodeId> {
        let list = self.get(self.current)?.as_submenu()?;
        list.children.get(list.index).copied()
    }

    pub fn selected_node(&self) -> Option<&Node> {
        self.selected().and_then(|id| self.get(id))
    }

    /// Component tag of the current list.
    pub fn current_component(&self) -> &str {
        self.get(self.current)
            .map(|n| n.component.as_str())
            .unwrap_or(ROOT_NAME)
    }

    fn insert(&mut self, node: Node) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    fn release(&mut self, id: NodeId) {
        let owned: Vec<NodeId> = self
            .children(id)
            .iter()
            .copied()
            .filter(|child| self.parents.get(child) == Some(&id))
            .collect();
        for child in owned {
            self.release(child);
        }
        self.parents.remove(&id);
        if let Some(slot) = self.slots.get_mut(id.index as usize) {
            if slot.generation == id.generation && slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(id.index);
            }
        }
    }

    /// Append `node` to `parent`'s children and record `parent` as its
    /// parent.  Returns `None` if `parent` is not a live submenu.
    pub fn add_child(&mut self, parent: NodeId, node: Node) -> Option<NodeId> {
        self.get(parent)?.as_submenu()?;
        let child = self.insert(node);
        if let Some(list) = self.get_mut(parent).and_then(Node::as_submenu_mut) {
            list.children.push(child);
        }
        self.parents.insert(child, parent);
        Some(child)
    }

    /// Drop every child of `list`.  Children owned by `list` are released
    /// with their subtrees; borrowed references are only unlinked.
    pub fn reset_children(&mut self, list: NodeId) {
        let children = match self.get_mut(list).and_then(Node::as_submenu_mut) {
            Some(submenu) => {
                submenu.index = 0;
                std::mem::take(&mut submenu.children)
            }
            None => return,
        };
        for child in children {
            if self.parents.get(&child) == Some(&list) {
                self.release(child);
            }
        }
        if !self.contains(self.current) {
            self.current = list;
        }
    }

    /// Stable in-place sort of `list`'s children by name.
    pub fn sort_children(&mut self, list: NodeId) {
        let mut children = match self.get_mut(list).and_then(Node::as_submenu_mut) {
            Some(submenu) => std::mem::take(&mut submenu.children),
            None => return,
        };
        children.sort_by(|a, b| {
            let name = |id: &NodeId| {
                self.get(*id)
                    .map(|n| n.labels.name.clone())
                    .unwrap_or_default()
            };
            name(a).cmp(&name(b))
        });
        if let Some(submenu) = self.get_mut(list).and_then(Node::as_submenu_mut) {
            submenu.children = children;
        }
    }

    /// Make `shadow` list the same children as `origin`, without taking
    /// ownership of them.
    pub fn mirror_children(&mut self, origin: NodeId, shadow: NodeId) {
        let children: Vec<NodeId> = self
            .children(origin)
            .iter()
            .copied()
            .filter(|&id| self.contains(id))
            .collect();
        if let Some(submenu) = self.get_mut(shadow).and_then(Node::as_submenu_mut) {
            submenu.index = submenu.index.min(children.len().saturating_sub(1));
            submenu.children = children;
        }
    }

    /// Move the cursor one entry forward.  No-op at the end of the list.
    pub fn advance(&mut self) -> bool {
        let current = self.current;
        match self.get_mut(current).and_then(Node::as_submenu_mut) {
            Some(list) if list.index + 1 < list.children.len() => {
                list.index += 1;
                true
            }
            _ => false,
        }
    }

    /// Move the cursor one entry back.  No-op at the start of the list.
    pub fn retreat(&mut self) -> bool {
        let current = self.current;
        match self.get_mut(current).and_then(Node::as_submenu_mut) {
            Some(list) if list.index > 0 => {
                list.index -= 1;
                true
            }
            _ => false,
        }
    }

    /// Descend into the selected node if it is a non-empty submenu.
    pub fn select(&mut self) -> bool {
        let Some(selected) = self.selected() else {
            return false;
        };
        let descend = self
            .get(selected)
            .and_then(Node::as_submenu)
            .is_some_and(|list| !list.children.is_empty());
        if descend {
            self.current = selected;
        }
        descend
    }

    /// Ascend to the parent of the current list.  No-op at the root.
    pub fn escape(&mut self) -> bool {
        match self.parent(self.current) {
            Some(parent) if self.contains(parent) => {
                self.current = parent;
                true
            }
            _ => false,
        }
    }

    /// Labels from below the root down to the parent of the current list.
    pub fn get_path(&self) -> Vec<Labels> {
        let mut path = Vec::new();
        let mut cursor = self.parent(self.current);
        while let Some(id) = cursor {
            if id == self.root {
                break;
            }
            if let Some(node) = self.get(id) {
                path.push(node.labels.clone());
            }
            cursor = self.parent(id);
        }
        path.reverse();
        path
    }

    pub fn view(&self) -> MenuView {
        let (list, index) = match self.get(self.current).and_then(Node::as_submenu) {
            Some(submenu) => (
                submenu
                    .children
                    .iter()
                    .filter_map(|&id| self.get(id).map(|n| n.labels.clone()))
                    .collect(),
                submenu.index,
            ),
            None => (Vec::new(), 0),
        };
        MenuView {
            path: self.get_path(),
            list,
            index,
            selkind: self
                .selected_node()
                .map(Node::sel_kind)
                .unwrap_or(SelKind::Unknown),
        }
    }

    /// Build `blueprint` under `parent`, tagging every node with `component`.
    pub fn graft(
        &mut self,
        parent: NodeId,
        component: &str,
        blueprint: Blueprint,
    ) -> Option<NodeId> {
        match blueprint {
            Blueprint::Menu { labels, children } => {
                let id = self.add_child(parent, Node::submenu(labels, component))?;
                for child in children {
                    self.graft(id, component, child);
                }
                Some(id)
            }
            Blueprint::Opus { labels, opus } => self.add_child(
                parent,
                Node {
                    labels,
                    component: component.to_string(),
                    kind: NodeKind::Playable(opus),
                },
            ),
            Blueprint::Command { labels, action } => self.add_child(
                parent,
                Node {
                    labels,
                    component: component.to_string(),
                    kind: NodeKind::Command(action),
                },
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str) -> Node {
        Node {
            labels: Labels::new(name, "", ""),
            component: "test".to_string(),
            kind: NodeKind::Command(CommandAction::Notice(name.to_string())),
        }
    }

    fn list(name: &str) -> Node {
        Node::submenu(Labels::new(name, "", ""), "test")
    }

    #[test]
    fn test_cursor_bounds() {
        let mut tree = MenuTree::new();
        let root = tree.root();
        for name in ["a", "b", "c", "d"] {
            tree.add_child(root, leaf(name));
        }

        assert!(!tree.retreat());
        let mut moves = 0;
        while tree.advance() {
            moves += 1;
        }
        assert_eq!(moves, 3);
        assert_eq!(tree.view().index, 3);
        assert!(!tree.advance());
        assert_eq!(tree.view().index, 3);

        while tree.retreat() {}
        assert_eq!(tree.view().index, 0);
        assert!(!tree.retreat());
    }

    #[test]
    fn test_empty_list_has_no_selection() {
        let tree = MenuTree::new();
        assert_eq!(tree.selected(), None);
        let view = tree.view();
        assert!(view.list.is_empty());
        assert_eq!(view.index, 0);
        assert_eq!(view.selkind, SelKind::Unknown);
    }

    #[test]
    fn test_select_escape_and_path() {
        let mut tree = MenuTree::new();
        let root = tree.root();
        let music = tree.add_child(root, list("Music")).unwrap();
        let jazz = tree.add_child(music, list("Jazz")).unwrap();
        tree.add_child(jazz, leaf("Kind of Blue"));
        tree.add_child(music, leaf("Shuffle all"));

        assert_eq!(tree.view().selkind, SelKind::Menulist);
        assert!(tree.select());
        assert_eq!(tree.current(), music);
        assert!(tree.get_path().is_empty());

        assert!(tree.select());
        assert_eq!(tree.current(), jazz);
        let path: Vec<String> = tree.get_path().into_iter().map(|l| l.name).collect();
        assert_eq!(path, vec!["Music".to_string()]);
        assert_eq!(tree.view().selkind, SelKind::Command);

        // leaves are not descended into
        assert!(!tree.select());

        assert!(tree.escape());
        assert!(tree.escape());
        assert_eq!(tree.current(), root);
        assert!(!tree.escape());
    }

    #[test]
    fn test_select_empty_submenu_is_noop() {
        let mut tree = MenuTree::new();
        let root = tree.root();
        tree.add_child(root, list("Empty"));
        assert!(!tree.select());
        assert_eq!(tree.current(), root);
    }

    #[test]
    fn test_list_index_survives_escape() {
        let mut tree = MenuTree::new();
        let root = tree.root();
        let a = tree.add_child(root, list("A")).unwrap();
        tree.add_child(a, leaf("1"));
        tree.add_child(a, leaf("2"));
        tree.add_child(root, list("B"));

        tree.select();
        tree.advance();
        tree.escape();
        tree.select();
        assert_eq!(tree.view().index, 1);
    }

    #[test]
    fn test_reset_children_releases_owned_nodes() {
        let mut tree = MenuTree::new();
        let root = tree.root();
        let lib = tree.add_child(root, list("Library")).unwrap();
        let genre = tree.add_child(lib, list("Rock")).unwrap();
        let song = tree.add_child(genre, leaf("song")).unwrap();
        tree.select();
        tree.select();
        assert_eq!(tree.current(), genre);

        tree.reset_children(lib);

        assert!(!tree.contains(genre));
        assert!(!tree.contains(song));
        assert_eq!(tree.current(), lib);
        assert!(tree.children(lib).is_empty());

        // slots are reused with a new generation
        let fresh = tree.add_child(lib, leaf("new")).unwrap();
        assert_ne!(fresh, genre);
        assert_ne!(fresh, song);
        assert!(tree.get(song).is_none());
    }

    #[test]
    fn test_mirror_does_not_reparent() {
        let mut tree = MenuTree::new();
        let root = tree.root();
        let favs = tree.add_child(root, list("Favorites")).unwrap();
        let item = tree.add_child(favs, leaf("x")).unwrap();
        let shadow = tree.add_child(root, list("Shadow")).unwrap();

        tree.mirror_children(favs, shadow);
        assert_eq!(tree.children(shadow), &[item]);
        assert_eq!(tree.parent(item), Some(favs));

        // resetting the shadow must not release the borrowed node
        tree.reset_children(shadow);
        assert!(tree.contains(item));
        assert_eq!(tree.children(favs), &[item]);
    }

    #[test]
    fn test_sort_children_is_stable_by_name() {
        let mut tree = MenuTree::new();
        let root = tree.root();
        let first_b = tree.add_child(root, leaf("b")).unwrap();
        tree.add_child(root, leaf("a"));
        let second_b = tree.add_child(root, leaf("b")).unwrap();
        tree.add_child(root, leaf("c"));

        tree.sort_children(root);

        let names: Vec<String> = tree.view().list.into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["a", "b", "b", "c"]);
        assert_eq!(&tree.children(root)[1..3], &[first_b, second_b]);
    }

    #[test]
    fn test_graft_tags_component() {
        let mut tree = MenuTree::new();
        let root = tree.root();
        let id = tree
            .graft(
                root,
                "system",
                Blueprint::menu(
                    Labels::new("System", "Sys", "System Commands"),
                    vec![Blueprint::command(
                        Labels::new("Shutdown", "Stdn", "Shutdown the system."),
                        CommandAction::Shutdown,
                    )],
                ),
            )
            .unwrap();

        assert_eq!(tree.get(id).unwrap().component, "system");
        let child = tree.children(id)[0];
        assert_eq!(tree.get(child).unwrap().component, "system");
        assert_eq!(tree.find_child(root, "System"), Some(id));
        tree.select();
        assert_eq!(tree.current_component(), "system");
    }
}
