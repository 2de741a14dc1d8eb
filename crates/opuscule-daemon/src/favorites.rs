//! FavoritesAggregator: per-component favorites and the collected view.
//!
//! Every component with favorites owns a "Favorites" list under its own
//! node.  The aggregator keeps one shadow list per component under the
//! root-level "Favorites" menu.  A shadow list references the same opus
//! nodes without adopting them, so escaping out of a shadow list returns to
//! the collected menu, never into the component's tree.
//!
//! Persistence is a JSON array of flat metadata records per component at
//! `<favorites_dir>/<component>_favorites.json`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use opuscule_proto::metadata::Metadata;
use opuscule_proto::protocol::Labels;
use tracing::{debug, info, warn};

use crate::backend::BackendCall;
use crate::menu::{MenuTree, Node, NodeId};

pub const TAG: &str = "superfavorites";

pub fn favorites_path(dir: &Path, component: &str) -> PathBuf {
    dir.join(format!("{}_favorites.json", component))
}

/// Read a favorites file.  A missing file is normal on first run; an
/// unreadable or corrupt one is worth a warning.  Either way the result is
/// an empty list.
pub fn load_records(path: &Path) -> Vec<Metadata> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No favorites at {}", path.display());
            return Vec::new();
        }
        Err(e) => {
            warn!("Could not read favorites {}: {}", path.display(), e);
            return Vec::new();
        }
    };
    match serde_json::from_str::<Vec<Metadata>>(&content) {
        Ok(records) => records,
        Err(e) => {
            warn!("Corrupt favorites file {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

pub async fn save_records(path: &Path, records: &[Metadata]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(records)?;
    tokio::fs::write(path, json).await?;
    debug!("Saved {} favorites to {}", records.len(), path.display());
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
}

struct Entry {
    component: String,
    origin: NodeId,
    shadow: NodeId,
    path: PathBuf,
}

pub struct FavoritesAggregator {
    root: NodeId,
    dir: PathBuf,
    entries: Vec<Entry>,
}

impl FavoritesAggregator {
    /// Create the collected "Favorites" menu under the menu root.
    pub fn install(menu: &mut MenuTree, dir: PathBuf) -> anyhow::Result<Self> {
        let root = menu
            .add_child(
                menu.root(),
                Node::submenu(
                    Labels::new("Favorites", "Fav", "Collected Favorites from all Components"),
                    TAG,
                ),
            )
            .ok_or_else(|| anyhow::anyhow!("menu root does not accept children"))?;
        Ok(Self {
            root,
            dir,
            entries: Vec::new(),
        })
    }

    #[cfg(test)]
    pub fn root(&self) -> NodeId {
        self.root
    }

    fn entry(&self, component: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.component == component)
    }

    /// The component's own favorites list.
    pub fn origin(&self, component: &str) -> Option<NodeId> {
        self.entry(component).map(|e| e.origin)
    }

    pub fn path(&self, component: &str) -> PathBuf {
        favorites_path(&self.dir, component)
    }

    /// Add a shadow list for `component`'s favorites list `origin`.
    pub fn register(
        &mut self,
        menu: &mut MenuTree,
        component: &str,
        display_name: &str,
        origin: NodeId,
    ) -> Option<NodeId> {
        let shadow = menu.add_child(
            self.root,
            Node::submenu(Labels::new(format!("{} Favorites", display_name), "", ""), TAG),
        )?;
        self.entries.push(Entry {
            component: component.to_string(),
            origin,
            shadow,
            path: self.path(component),
        });
        self.refresh_one(menu, component);
        Some(shadow)
    }

    /// Rebuild one component's shadow list from its favorites list.
    pub fn refresh_one(&self, menu: &mut MenuTree, component: &str) -> bool {
        match self.entry(component) {
            Some(entry) => {
                menu.mirror_children(entry.origin, entry.shadow);
                true
            }
            None => false,
        }
    }

    pub fn refresh_all(&self, menu: &mut MenuTree) {
        for entry in &self.entries {
            menu.mirror_children(entry.origin, entry.shadow);
        }
    }

    /// Copy the opus at `opus` into `component`'s favorites unless an opus
    /// with the same record is already there.  `None` if the component has
    /// no favorites or `opus` is not an opus.
    pub fn add_favorite(
        &self,
        menu: &mut MenuTree,
        component: &str,
        opus: NodeId,
    ) -> Option<AddOutcome> {
        let origin = self.origin(component)?;
        let node = menu.get(opus).filter(|n| n.as_opus().is_some())?.clone();
        let record = node.as_opus()?.metadata();

        let present = menu
            .children(origin)
            .iter()
            .any(|&id| menu.opus(id).is_some_and(|o| o.metadata() == record));
        if present {
            debug!("{} already a {} favorite", node.labels.name, component);
            return Some(AddOutcome::AlreadyPresent);
        }

        info!("Adding {} to {} favorites", node.labels.name, component);
        menu.add_child(origin, node)?;
        self.refresh_one(menu, component);
        Some(AddOutcome::Added)
    }

    pub fn records(&self, menu: &MenuTree, component: &str) -> Vec<Metadata> {
        let Some(origin) = self.origin(component) else {
            return Vec::new();
        };
        menu.children(origin)
            .iter()
            .filter_map(|&id| menu.opus(id))
            .map(|opus| opus.metadata())
            .collect()
    }

    /// Backend job persisting `component`'s favorites as they are now.
    pub fn save_call(&self, menu: &MenuTree, component: &str) -> Option<BackendCall> {
        let entry = self.entry(component)?;
        Some(BackendCall::SaveFavorites {
            path: entry.path.clone(),
            records: self.records(menu, component),
        })
    }

    pub fn save_all_calls(&self, menu: &MenuTree) -> Vec<BackendCall> {
        self.entries
            .iter()
            .filter_map(|e| self.save_call(menu, &e.component))
            .collect()
    }
}
