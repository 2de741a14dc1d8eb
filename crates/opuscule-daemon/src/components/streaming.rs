//! Streaming: remote audio streams played through MPD.

use std::sync::Arc;

use async_trait::async_trait;
use opuscule_proto::config::StationConfig;
use opuscule_proto::metadata::Metadata;
use opuscule_proto::protocol::Labels;

use super::{field, opus_blueprint, record, record_matches, Component};
use crate::menu::Blueprint;
use crate::mpd::{self, MpdClient};
use crate::playback::{Capabilities, Opus, Playable, PlayModes};

pub const TAG: &str = "streaming";

pub struct Streaming {
    mpd: Arc<MpdClient>,
    stations: Vec<StationConfig>,
}

impl Streaming {
    pub fn new(mpd: Arc<MpdClient>, stations: Vec<StationConfig>) -> Self {
        Self { mpd, stations }
    }

    fn stream(&self, station: StationConfig) -> Opus {
        Opus::new(Arc::new(StreamOpus {
            mpd: self.mpd.clone(),
            station,
        }))
    }
}

#[async_trait]
impl Component for Streaming {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn labels(&self) -> Labels {
        Labels::new("Streaming", "Str", "Streaming Audio Services")
    }

    async fn requirements_met(&self) -> bool {
        self.mpd.prepare().await.is_ok()
    }

    fn build(&self) -> Vec<Blueprint> {
        let custom = self
            .stations
            .iter()
            .map(|s| opus_blueprint(display_name(s), &s.comment, self.stream(s.clone())))
            .collect();
        vec![Blueprint::menu(
            Labels::new("Custom", "Cstm", "My custom stations"),
            custom,
        )]
    }

    fn has_favorites(&self) -> bool {
        true
    }

    fn opus_from_record(&self, rec: &Metadata) -> Option<Opus> {
        if !record_matches(rec, TAG, "stream") || field(rec, "url").is_empty() {
            return None;
        }
        Some(self.stream(StationConfig {
            name: field(rec, "name").to_string(),
            url: field(rec, "url").to_string(),
            comment: field(rec, "comment").to_string(),
            genre: field(rec, "genre").to_string(),
            subgenre: field(rec, "subgenre").to_string(),
        }))
    }
}

/// Stations without a name are shown by their URL.
fn display_name(station: &StationConfig) -> &str {
    if station.name.is_empty() {
        &station.url
    } else {
        &station.name
    }
}

struct StreamOpus {
    mpd: Arc<MpdClient>,
    station: StationConfig,
}

#[async_trait]
impl Playable for StreamOpus {
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn metadata(&self) -> Metadata {
        let s = &self.station;
        let name = display_name(s);
        record([
            ("component", TAG),
            ("type", "stream"),
            ("name", name),
            ("comment", s.comment.as_str()),
            ("title", name),
            ("url", s.url.as_str()),
            ("genre", s.genre.as_str()),
            ("subgenre", s.subgenre.as_str()),
        ])
    }

    fn source(&self) -> Option<&'static str> {
        Some(mpd::SOURCE)
    }

    async fn play(&self, _modes: PlayModes) -> anyhow::Result<()> {
        self.mpd.clear().await?;
        self.mpd.add(&self.station.url).await?;
        self.mpd.play().await
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.mpd.stop().await?;
        self.mpd.clear().await
    }
}
