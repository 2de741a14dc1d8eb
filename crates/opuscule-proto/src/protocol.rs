use serde::{Deserialize, Serialize};

use crate::metadata::NowPlayingData;

/// A command sent from a client to the daemon.
///
/// `command` is kept as a plain string so that unknown names reach the
/// dispatcher and get a proper ERROR reply instead of failing to decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Request {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            message: None,
        }
    }
}

/// Messages sent from the daemon to clients.
///
/// `Snapshot` is broadcast to every client after each accepted command;
/// `Error` goes only to the client whose command was rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "response")]
pub enum Response {
    #[serde(rename = "OK")]
    Snapshot(Snapshot),
    #[serde(rename = "ERROR")]
    Error { text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl PlayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayState::Stopped => "stopped",
            PlayState::Playing => "playing",
            PlayState::Paused => "paused",
        }
    }
}

/// Menu labels of a single node, as shown by clients.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Labels {
    pub name: String,
    #[serde(rename = "shortname")]
    pub short_name: String,
    pub comment: String,
}

impl Labels {
    pub fn new(
        name: impl Into<String>,
        short_name: impl Into<String>,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            short_name: short_name.into(),
            comment: comment.into(),
        }
    }
}

/// Kind of the node under the menu cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelKind {
    Opus,
    Menulist,
    Command,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuView {
    /// Breadcrumb: labels from below the root down to the parent of the
    /// current list.
    pub path: Vec<Labels>,
    pub list: Vec<Labels>,
    pub index: usize,
    pub selkind: SelKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NoticeKind {
    Fault,
    Info,
    Alert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Distribution {
    #[default]
    All,
    Sender,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    #[serde(rename = "type")]
    pub kind: NoticeKind,
    pub dist: Distribution,
    pub text: String,
}

/// Indicator lamps on the appliance front panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicators {
    pub power: bool,
    pub play: bool,
    pub pause: bool,
    pub stop: bool,
    pub repeat: bool,
    pub shuffle: bool,
    pub mute: bool,
}

impl Default for Indicators {
    fn default() -> Self {
        Self {
            power: true,
            play: false,
            pause: false,
            stop: true,
            repeat: false,
            shuffle: false,
            mute: false,
        }
    }
}

/// Full state of the appliance as broadcast to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub playstate: PlayState,
    /// Component tag of the menu list the cursor is in.
    pub component: String,
    pub messages: Vec<Notice>,
    pub menu: MenuView,
    pub now_playing: NowPlayingData,
    pub volume: u8,
    pub indicators: Indicators,
}

/// Wrapper for socket communication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Request(Request),
    Response(Response),
}

impl Message {
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let len = json.len() as u32;
        let mut result = Vec::with_capacity(4 + json.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&json);
        Ok(result)
    }

    pub fn decode(data: &[u8]) -> anyhow::Result<(Self, usize)> {
        if data.len() < 4 {
            anyhow::bail!("Insufficient data for length header");
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if data.len() < 4 + len {
            anyhow::bail!("Insufficient data for message");
        }
        let msg: Self = serde_json::from_slice(&data[4..4 + len])?;
        Ok((msg, 4 + len))
    }

    /// Length of the next complete frame in `data`, if one has fully arrived.
    pub fn frame_len(data: &[u8]) -> Option<usize> {
        if data.len() < 4 {
            return None;
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        (data.len() >= 4 + len).then_some(4 + len)
    }
}
