use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub mpd: MpdConfig,
    #[serde(default)]
    pub volume: VolumeConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub soundscapes: SoundscapesConfig,
    #[serde(default)]
    pub fmradio: FmRadioConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "platform::favorites_dir")]
    pub favorites_dir: PathBuf,
    /// How many previously played operai NowPlaying remembers.
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpdConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_mpd_host")]
    pub host: String,
    #[serde(default = "default_mpd_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeConfig {
    #[serde(default = "default_volume")]
    pub initial: u8,
    #[serde(default = "default_volume_step")]
    pub step: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub subgenre: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    #[serde(default = "default_streams", rename = "station")]
    pub stations: Vec<StationConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScapeConfig {
    pub name: String,
    #[serde(default)]
    pub comment: String,
    pub package: String,
    pub agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundscapesConfig {
    #[serde(default = "default_boodler")]
    pub program: String,
    #[serde(default = "default_scapes", rename = "scape")]
    pub scapes: Vec<ScapeConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FmStationConfig {
    pub callsign: String,
    /// Frequency in MHz, e.g. "88.3".
    pub freq: String,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FmRadioConfig {
    /// Tuner command line; `{freq}` is replaced with the station frequency.
    #[serde(default = "default_tuner")]
    pub tuner: Vec<String>,
    /// Player command line, fed the tuner's raw output on stdin.
    #[serde(default = "default_player")]
    pub player: Vec<String>,
    #[serde(default = "default_fm_stations", rename = "station")]
    pub stations: Vec<FmStationConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            favorites_dir: platform::favorites_dir(),
            history_len: default_history_len(),
            pid_file: default_pid_file(),
        }
    }
}

impl Default for MpdConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_mpd_host(),
            port: default_mpd_port(),
        }
    }
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            initial: default_volume(),
            step: default_volume_step(),
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            stations: default_streams(),
        }
    }
}

impl Default for SoundscapesConfig {
    fn default() -> Self {
        Self {
            program: default_boodler(),
            scapes: default_scapes(),
        }
    }
}

impl Default for FmRadioConfig {
    fn default() -> Self {
        Self {
            tuner: default_tuner(),
            player: default_player(),
            stations: default_fm_stations(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    platform::DAEMON_TCP_PORT
}

fn default_history_len() -> usize {
    100
}

fn default_pid_file() -> PathBuf {
    platform::data_dir().join("daemon.pid")
}

fn default_mpd_host() -> String {
    "localhost".to_string()
}

fn default_mpd_port() -> u16 {
    6600
}

fn default_volume() -> u8 {
    80
}

fn default_volume_step() -> u8 {
    5
}

fn default_boodler() -> String {
    "boodler".to_string()
}

fn default_streams() -> Vec<StationConfig> {
    let station = |name: &str, comment: &str, url: &str, genre: &str, subgenre: &str| {
        StationConfig {
            name: name.to_string(),
            url: url.to_string(),
            comment: comment.to_string(),
            genre: genre.to_string(),
            subgenre: subgenre.to_string(),
        }
    };
    vec![
        station("AncientFM", "Early music.", "http://5.152.208.98:8058/", "Classical", "Early"),
        station(
            "Venice Classic Radio",
            "Beautiful classical music.",
            "http://174.36.206.197:8000/stream",
            "Classical",
            "",
        ),
        station(
            "Bartok Radio",
            "Hungarian classical radio.",
            "http://mr-stream.mediaconnect.hu/4741/mr3.mp3",
            "Classical",
            "",
        ),
    ]
}

fn default_scapes() -> Vec<ScapeConfig> {
    vec![
        ScapeConfig {
            name: "Crows".to_string(),
            comment: "A Parliament of Crows.".to_string(),
            package: "com.eblong.zarf.crows".to_string(),
            agent: "ParliamentOfCrows".to_string(),
        },
        ScapeConfig {
            name: "Thunderstorms".to_string(),
            comment: "A storm an hour.".to_string(),
            package: "com.eblong.ow.storm".to_string(),
            agent: "RainForever".to_string(),
        },
    ]
}

fn default_tuner() -> Vec<String> {
    ["rtl_fm", "-M", "wbfm", "-s", "256000", "-r", "48k", "-f", "{freq}M"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_player() -> Vec<String> {
    ["play", "-r", "48k", "-t", "raw", "-e", "s", "-b", "16", "-c", "1", "-V1", "-"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_fm_stations() -> Vec<FmStationConfig> {
    [
        ("WRCT", "88.3", "Radio Carnegie Tech"),
        ("WQED", "89.3", "Pittsburgh's Classical Music"),
        ("WESA", "90.5", "NPR Radio"),
        ("WYEP", "91.3", "Alternative"),
        ("WPTS", "92.1", "Hail to Pitt"),
    ]
    .iter()
    .map(|(callsign, freq, comment)| FmStationConfig {
        callsign: callsign.to_string(),
        freq: freq.to_string(),
        comment: comment.to_string(),
    })
    .collect()
}

impl Config {
    /// Load the config from the platform path, writing defaults on first run.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
