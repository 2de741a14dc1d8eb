//! Components: the top-level sections of the menu and the operai they own.
//!
//! A component describes its menus as `Blueprint`s; the dispatcher grafts
//! them under the component's node.  Components with favorites also know how
//! to rebuild an opus from a persisted record.

pub mod fmradio;
pub mod library;
pub mod process;
pub mod soundscapes;
pub mod streaming;
pub mod system;

use async_trait::async_trait;
use opuscule_proto::metadata::Metadata;
use opuscule_proto::protocol::Labels;

use crate::menu::Blueprint;
use crate::playback::Opus;

#[async_trait]
pub trait Component: Send + Sync {
    /// Tag stamped on every node of this component.
    fn tag(&self) -> &'static str;

    fn labels(&self) -> Labels;

    /// Whatever the component needs outside the daemon is present.
    async fn requirements_met(&self) -> bool {
        true
    }

    /// Menus available without asking a backend.
    fn build(&self) -> Vec<Blueprint>;

    fn has_favorites(&self) -> bool {
        false
    }

    /// Rebuild an opus from a favorites record.
    fn opus_from_record(&self, _record: &Metadata) -> Option<Opus> {
        None
    }

    /// Whether `scan` has anything to contribute.
    fn has_catalog(&self) -> bool {
        false
    }

    /// Read the backend's catalog.  Each returned menu replaces the
    /// contents of the same-named section built by `build`.
    async fn scan(&self) -> anyhow::Result<Vec<Blueprint>> {
        Ok(Vec::new())
    }
}

/// Build a metadata record from literal pairs.
pub fn record<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Metadata {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Value of `key` in `record`, empty if missing.
pub fn field<'a>(record: &'a Metadata, key: &str) -> &'a str {
    record.get(key).map(String::as_str).unwrap_or_default()
}

/// A record is usable by `component` if it names it and has the given type.
pub fn record_matches(record: &Metadata, component: &str, kind: &str) -> bool {
    field(record, "component") == component && field(record, "type") == kind
}

pub fn opus_blueprint(name: &str, comment: &str, opus: Opus) -> Blueprint {
    Blueprint::opus(Labels::new(name, "", comment), opus)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_helpers() {
        let rec = record([("component", "fmradio"), ("type", "fmradio"), ("freq", "88.3")]);
        assert_eq!(field(&rec, "freq"), "88.3");
        assert_eq!(field(&rec, "missing"), "");
        assert!(record_matches(&rec, "fmradio", "fmradio"));
        assert!(!record_matches(&rec, "streaming", "fmradio"));
    }
}
