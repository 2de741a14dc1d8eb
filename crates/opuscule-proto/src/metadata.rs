//! Flat metadata records and the fixed now-playing key set.
//!
//! Every opus describes itself with a flat `Metadata` record.  The same
//! record is what gets persisted for favorites, so it must carry enough to
//! rebuild the opus (`component`, `type`, and whatever the component needs).

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// A flat, string-keyed metadata record.
pub type Metadata = BTreeMap<String, String>;

/// The closed set of keys reported under `now_playing`.
pub const NOW_PLAYING_KEYS: [&str; 26] = [
    "file",
    "last-modified",
    "artist",
    "album",
    "title",
    "name",
    "track",
    "genre",
    "date",
    "disc",
    "albumartist",
    "time",
    "duration",
    "pos",
    "id",
    "package",
    "agent",
    "callsign",
    "freq",
    "mode",
    "error",
    "component",
    "type",
    "comment",
    "url",
    "subgenre",
];

/// Now-playing record: always holds exactly the keys in `NOW_PLAYING_KEYS`.
/// Decoding rejects any other key and blanks the ones left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NowPlayingData(BTreeMap<String, String>);

impl Default for NowPlayingData {
    fn default() -> Self {
        Self(
            NOW_PLAYING_KEYS
                .iter()
                .map(|k| (k.to_string(), String::new()))
                .collect(),
        )
    }
}

impl<'de> Deserialize<'de> for NowPlayingData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = Metadata::deserialize(deserializer)?;
        let mut data = Self::default();
        match data.overlay(&record).first() {
            Some(key) => Err(D::Error::custom(format!("unknown now_playing key '{}'", key))),
            None => Ok(data),
        }
    }
}

impl NowPlayingData {
    /// Blank every key.
    pub fn reset(&mut self) {
        for value in self.0.values_mut() {
            value.clear();
        }
    }

    /// Copy the known keys of `record` over the current values.
    ///
    /// Returns the keys that are not part of the now-playing set; they are
    /// dropped and the caller decides how loudly to log them.
    pub fn overlay(&mut self, record: &Metadata) -> Vec<String> {
        let mut rejected = Vec::new();
        for (key, value) in record {
            match self.0.get_mut(key.as_str()) {
                Some(slot) => slot.clone_from(value),
                None => rejected.push(key.clone()),
            }
        }
        rejected
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether every value is blank.
    pub fn is_blank(&self) -> bool {
        self.0.values().all(String::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_every_key_blank() {
        let data = NowPlayingData::default();
        assert_eq!(data.len(), NOW_PLAYING_KEYS.len());
        assert!(data.is_blank());
        assert_eq!(data.get("albumartist"), Some(""));
    }

    #[test]
    fn test_overlay_drops_unknown_keys() {
        let mut data = NowPlayingData::default();
        let record: Metadata = [
            ("title".to_string(), "Blue in Green".to_string()),
            ("format".to_string(), "44100:16:2".to_string()),
        ]
        .into_iter()
        .collect();

        let rejected = data.overlay(&record);

        assert_eq!(rejected, vec!["format".to_string()]);
        assert_eq!(data.get("title"), Some("Blue in Green"));
        assert_eq!(data.get("format"), None);
        assert_eq!(data.len(), NOW_PLAYING_KEYS.len());
    }

    #[test]
    fn test_reset_keeps_key_set() {
        let mut data = NowPlayingData::default();
        data.overlay(&[("url".to_string(), "http://x".to_string())].into_iter().collect());
        data.reset();
        assert!(data.is_blank());
        assert_eq!(data.len(), NOW_PLAYING_KEYS.len());
    }

    #[test]
    fn test_decode_keeps_key_set_closed() {
        let data: NowPlayingData = serde_json::from_str(r#"{"title": "So What"}"#).unwrap();
        assert_eq!(data.get("title"), Some("So What"));
        assert_eq!(data.get("artist"), Some(""));
        assert_eq!(data.len(), NOW_PLAYING_KEYS.len());

        let err = serde_json::from_str::<NowPlayingData>(r#"{"format": "flac"}"#).unwrap_err();
        assert!(err.to_string().contains("unknown now_playing key 'format'"));
    }
}
