//! Soundscapes: generated ambient audio from the boodler program.

use std::sync::Arc;

use async_trait::async_trait;
use opuscule_proto::config::{ScapeConfig, SoundscapesConfig};
use opuscule_proto::metadata::Metadata;
use opuscule_proto::platform;
use opuscule_proto::protocol::Labels;

use super::process::ProcessOpus;
use super::{field, opus_blueprint, record, record_matches, Component};
use crate::menu::Blueprint;
use crate::playback::Opus;

pub const TAG: &str = "soundscapes";

pub struct Soundscapes {
    config: SoundscapesConfig,
}

impl Soundscapes {
    pub fn new(config: SoundscapesConfig) -> Self {
        Self { config }
    }

    fn scape(&self, scape: &ScapeConfig) -> Opus {
        let rec = record([
            ("component", TAG),
            ("type", "soundscape"),
            ("name", scape.name.as_str()),
            ("comment", scape.comment.as_str()),
            ("package", scape.package.as_str()),
            ("agent", scape.agent.as_str()),
        ]);
        Opus::new(Arc::new(ProcessOpus::new(rec, vec![self.command(scape)])))
    }

    fn command(&self, scape: &ScapeConfig) -> Vec<String> {
        vec![
            self.config.program.clone(),
            format!("{}/{}", scape.package, scape.agent),
        ]
    }
}

#[async_trait]
impl Component for Soundscapes {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn labels(&self) -> Labels {
        Labels::new("Soundscapes", "Scp", "Generated Soundscapes")
    }

    async fn requirements_met(&self) -> bool {
        platform::find_on_path(&self.config.program).is_some()
    }

    fn build(&self) -> Vec<Blueprint> {
        let available = self
            .config
            .scapes
            .iter()
            .map(|s| opus_blueprint(&s.name, &s.comment, self.scape(s)))
            .collect();
        vec![Blueprint::menu(
            Labels::new("Available", "Avbl", "Available soundscapes"),
            available,
        )]
    }

    fn has_favorites(&self) -> bool {
        true
    }

    fn opus_from_record(&self, rec: &Metadata) -> Option<Opus> {
        if !record_matches(rec, TAG, "soundscape") {
            return None;
        }
        let scape = ScapeConfig {
            name: field(rec, "name").to_string(),
            comment: field(rec, "comment").to_string(),
            package: field(rec, "package").to_string(),
            agent: field(rec, "agent").to_string(),
        };
        if scape.package.is_empty() || scape.agent.is_empty() {
            return None;
        }
        Some(self.scape(&scape))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scape_runs_package_agent() {
        let component = Soundscapes::new(SoundscapesConfig::default());
        let defaults = SoundscapesConfig::default();
        let crows = &defaults.scapes[0];
        let opus = component.scape(crows);
        let rec = opus.metadata();
        assert_eq!(field(&rec, "agent"), "ParliamentOfCrows");
        assert_eq!(component.opus_from_record(&rec).unwrap().metadata(), rec);
        assert_eq!(
            component.command(crows),
            vec!["boodler".to_string(), "com.eblong.zarf.crows/ParliamentOfCrows".to_string()]
        );
    }

    #[tokio::test]
    async fn test_missing_program_fails_requirements() {
        let component = Soundscapes::new(SoundscapesConfig {
            program: "definitely-not-a-real-program-4f1c".to_string(),
            scapes: Vec::new(),
        });
        assert!(!component.requirements_met().await);
    }

    #[test]
    fn test_incomplete_record_is_rejected() {
        let component = Soundscapes::new(SoundscapesConfig::default());
        let rec = record([("component", TAG), ("type", "soundscape"), ("name", "Crows")]);
        assert!(component.opus_from_record(&rec).is_none());
    }
}
