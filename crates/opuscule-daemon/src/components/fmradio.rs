//! FM radio: a software-defined tuner piped into an audio player.

use std::sync::Arc;

use async_trait::async_trait;
use opuscule_proto::config::{FmRadioConfig, FmStationConfig};
use opuscule_proto::metadata::Metadata;
use opuscule_proto::platform;
use opuscule_proto::protocol::Labels;

use super::process::ProcessOpus;
use super::{field, opus_blueprint, record, record_matches, Component};
use crate::menu::Blueprint;
use crate::playback::Opus;

pub const TAG: &str = "fmradio";

pub struct FmRadio {
    config: FmRadioConfig,
}

impl FmRadio {
    pub fn new(config: FmRadioConfig) -> Self {
        Self { config }
    }

    /// Tuner and player command lines for `freq` (MHz).
    fn pipeline(&self, freq: &str) -> Vec<Vec<String>> {
        let tuner = self
            .config
            .tuner
            .iter()
            .map(|arg| arg.replace("{freq}", freq))
            .collect();
        vec![tuner, self.config.player.clone()]
    }

    fn station(&self, station: &FmStationConfig) -> Opus {
        let rec = record([
            ("component", TAG),
            ("type", "fmradio"),
            ("name", station.callsign.as_str()),
            ("callsign", station.callsign.as_str()),
            ("comment", station.comment.as_str()),
            ("freq", station.freq.as_str()),
        ]);
        Opus::new(Arc::new(ProcessOpus::new(rec, self.pipeline(&station.freq))))
    }
}

#[async_trait]
impl Component for FmRadio {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn labels(&self) -> Labels {
        Labels::new("FM Radio", "FM", "FM Radio Stations")
    }

    async fn requirements_met(&self) -> bool {
        [&self.config.tuner, &self.config.player]
            .iter()
            .all(|cmd| cmd.first().is_some_and(|program| platform::find_on_path(program).is_some()))
    }

    fn build(&self) -> Vec<Blueprint> {
        let stations = self
            .config
            .stations
            .iter()
            .map(|s| opus_blueprint(&s.callsign, &s.comment, self.station(s)))
            .collect();
        vec![Blueprint::menu(
            Labels::new("Custom", "Ctm", "My custom stations"),
            stations,
        )]
    }

    fn has_favorites(&self) -> bool {
        true
    }

    fn opus_from_record(&self, rec: &Metadata) -> Option<Opus> {
        if !record_matches(rec, TAG, "fmradio") || field(rec, "freq").is_empty() {
            return None;
        }
        let callsign = match field(rec, "callsign") {
            "" => field(rec, "name"),
            callsign => callsign,
        };
        Some(self.station(&FmStationConfig {
            callsign: callsign.to_string(),
            freq: field(rec, "freq").to_string(),
            comment: field(rec, "comment").to_string(),
        }))
    }
}
