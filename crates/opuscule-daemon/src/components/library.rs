//! Library: locally stored audio, played through MPD.

use std::sync::Arc;

use async_trait::async_trait;
use opuscule_proto::metadata::Metadata;
use opuscule_proto::protocol::Labels;
use tracing::debug;

use super::{field, opus_blueprint, record, record_matches, Component};
use crate::menu::{Blueprint, CommandAction};
use crate::mpd::{self, MpdClient};
use crate::playback::{Capabilities, Opus, Playable, PlayModes};

pub const TAG: &str = "library";

/// Tags a slice may be narrowed by, in the order they are recorded.
const SLICE_TERMS: [&str; 3] = ["genre", "artist", "album"];

/// Seconds into a track after which `previous` restarts it instead.
const RESTART_THRESHOLD: f64 = 5.0;

pub struct Library {
    mpd: Arc<MpdClient>,
}

impl Library {
    pub fn new(mpd: Arc<MpdClient>) -> Self {
        Self { mpd }
    }

    fn playlist(&self, name: &str) -> Opus {
        Opus::new(Arc::new(PlaylistOpus {
            mpd: self.mpd.clone(),
            name: name.to_string(),
        }))
    }

    fn slice_opus(&self, name: &str, terms: &[(&str, &str)]) -> Opus {
        Opus::new(Arc::new(SliceOpus {
            mpd: self.mpd.clone(),
            name: name.to_string(),
            terms: terms.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }))
    }

    fn slice(&self, name: &str, terms: &[(&str, &str)]) -> Blueprint {
        opus_blueprint(name, "", self.slice_opus(name, terms))
    }

    /// "All songs by …" plus the artist's albums, optionally within a genre.
    async fn artist_menu(&self, artist: &str, genre: Option<&str>) -> anyhow::Result<Blueprint> {
        let mut terms = vec![("artist", artist)];
        if let Some(genre) = genre {
            terms.push(("genre", genre));
        }
        let all = self.slice(&format!("All songs by {}", artist), &terms);

        let mut albums = Vec::new();
        for album in self.mpd.list("album", &terms).await? {
            let mut album_terms = vec![("album", album.as_str())];
            album_terms.extend_from_slice(&terms);
            albums.push(self.slice(&album, &album_terms));
        }

        Ok(Blueprint::menu(
            Labels::new(artist, "", ""),
            vec![all, Blueprint::menu(Labels::new("By Album", "", ""), albums)],
        ))
    }

    async fn scan_playlists(&self) -> anyhow::Result<Vec<Blueprint>> {
        let playlists = self.mpd.listplaylists().await?;
        debug!("library: {} playlists", playlists.len());
        Ok(playlists
            .iter()
            .map(|name| opus_blueprint(name, "", self.playlist(name)))
            .collect())
    }

    async fn scan_genres(&self) -> anyhow::Result<Vec<Blueprint>> {
        let mut genres = Vec::new();
        for genre in self.mpd.list("genre", &[]).await? {
            let within = [("genre", genre.as_str())];
            let all = self.slice(&format!("All songs in {}", genre), &within);

            let mut albums = Vec::new();
            for album in self.mpd.list("album", &within).await? {
                let filter = [("genre", genre.as_str()), ("album", album.as_str())];
                albums.push(self.slice(&album, &filter));
            }

            let mut artists = Vec::new();
            for artist in self.mpd.list("artist", &within).await? {
                artists.push(self.artist_menu(&artist, Some(genre.as_str())).await?);
            }

            genres.push(Blueprint::menu(
                Labels::new(genre.as_str(), "", ""),
                vec![
                    all,
                    Blueprint::menu(Labels::new("By Album", "", ""), albums),
                    Blueprint::menu(Labels::new("By Artist", "", ""), artists),
                ],
            ));
        }
        debug!("library: {} genres", genres.len());
        Ok(genres)
    }

    async fn scan_artists(&self) -> anyhow::Result<Vec<Blueprint>> {
        let mut artists = Vec::new();
        for artist in self.mpd.list("artist", &[]).await? {
            artists.push(self.artist_menu(&artist, None).await?);
        }
        debug!("library: {} artists", artists.len());
        Ok(artists)
    }

    async fn scan_albums(&self) -> anyhow::Result<Vec<Blueprint>> {
        let albums = self.mpd.list("album", &[]).await?;
        debug!("library: {} albums", albums.len());
        Ok(albums
            .iter()
            .map(|album| self.slice(album, &[("album", album.as_str())]))
            .collect())
    }
}

fn sections(children: [Vec<Blueprint>; 4]) -> Vec<Blueprint> {
    let [playlists, genres, artists, albums] = children;
    vec![
        Blueprint::menu(Labels::new("Playlists", "Pls", "My playlists."), playlists),
        Blueprint::menu(Labels::new("Genres", "Gnr", "Library By Genre"), genres),
        Blueprint::menu(Labels::new("Artists", "Art", "Library By Artist"), artists),
        Blueprint::menu(Labels::new("Albums", "Alb", "Library By Album"), albums),
    ]
}

#[async_trait]
impl Component for Library {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn labels(&self) -> Labels {
        Labels::new("Library", "Lib", "Locally Stored Audio")
    }

    async fn requirements_met(&self) -> bool {
        self.mpd.prepare().await.is_ok()
    }

    fn build(&self) -> Vec<Blueprint> {
        let mut menus = sections(Default::default());
        menus.push(Blueprint::command(
            Labels::new("Rescan", "Scan", "Re-read the music database."),
            CommandAction::Rescan(TAG.to_string()),
        ));
        menus
    }

    fn has_favorites(&self) -> bool {
        true
    }

    fn opus_from_record(&self, rec: &Metadata) -> Option<Opus> {
        let name = field(rec, "name");
        if record_matches(rec, TAG, "playlist") && !name.is_empty() {
            return Some(self.playlist(name));
        }
        if record_matches(rec, TAG, "slice") {
            let terms: Vec<(&str, &str)> = SLICE_TERMS
                .iter()
                .filter_map(|&tag| rec.get(tag).map(|v| (tag, v.as_str())))
                .collect();
            if !terms.is_empty() {
                return Some(self.slice_opus(name, &terms));
            }
        }
        None
    }

    fn has_catalog(&self) -> bool {
        true
    }

    async fn scan(&self) -> anyhow::Result<Vec<Blueprint>> {
        Ok(sections([
            self.scan_playlists().await?,
            self.scan_genres().await?,
            self.scan_artists().await?,
            self.scan_albums().await?,
        ]))
    }
}

// ── Operai ──────────────────────────────────────────────────────

/// A stored MPD playlist.
struct PlaylistOpus {
    mpd: Arc<MpdClient>,
    name: String,
}

#[async_trait]
impl Playable for PlaylistOpus {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            pause: true,
            ..Default::default()
        }
    }

    fn metadata(&self) -> Metadata {
        record([("component", TAG), ("type", "playlist"), ("name", self.name.as_str())])
    }

    fn source(&self) -> Option<&'static str> {
        Some(mpd::SOURCE)
    }

    async fn play(&self, _modes: PlayModes) -> anyhow::Result<()> {
        self.mpd.clear().await?;
        self.mpd.load(&self.name).await?;
        self.mpd.play().await
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.mpd.stop().await?;
        self.mpd.clear().await
    }

    async fn pause(&self) -> anyhow::Result<()> {
        self.mpd.pause(true).await
    }

    async fn unpause(&self) -> anyhow::Result<()> {
        self.mpd.pause(false).await
    }
}

/// Every song matching a set of tag terms.
struct SliceOpus {
    mpd: Arc<MpdClient>,
    name: String,
    terms: Vec<(String, String)>,
}

impl SliceOpus {
    async fn elapsed(&self) -> anyhow::Result<f64> {
        let status = self.mpd.status().await?;
        if let Some(elapsed) = status.get("elapsed") {
            return Ok(elapsed.parse().unwrap_or_default());
        }
        // older servers only report "time: elapsed:total"
        Ok(status
            .get("time")
            .and_then(|t| t.split(':').next())
            .and_then(|s| s.parse().ok())
            .unwrap_or_default())
    }
}

#[async_trait]
impl Playable for SliceOpus {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            pause: true,
            repeat: true,
            shuffle: true,
            navigation: true,
        }
    }

    fn metadata(&self) -> Metadata {
        let mut rec = record([("component", TAG), ("type", "slice"), ("name", self.name.as_str())]);
        for (tag, value) in &self.terms {
            rec.insert(tag.clone(), value.clone());
        }
        rec
    }

    fn source(&self) -> Option<&'static str> {
        Some(mpd::SOURCE)
    }

    async fn play(&self, modes: PlayModes) -> anyhow::Result<()> {
        self.mpd.clear().await?;
        self.mpd.findadd(&self.terms).await?;
        self.mpd.random(modes.shuffle).await?;
        self.mpd.repeat(modes.repeat).await?;
        self.mpd.play().await
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.mpd.stop().await?;
        self.mpd.clear().await
    }

    async fn pause(&self) -> anyhow::Result<()> {
        self.mpd.pause(true).await
    }

    async fn unpause(&self) -> anyhow::Result<()> {
        self.mpd.pause(false).await
    }

    async fn next(&self) -> anyhow::Result<()> {
        if self.mpd.status().await?.contains_key("nextsong") {
            self.mpd.next().await?;
        }
        Ok(())
    }

    async fn previous(&self) -> anyhow::Result<()> {
        if self.elapsed().await? > RESTART_THRESHOLD {
            self.mpd.seekcur(0).await
        } else {
            self.mpd.previous().await
        }
    }

    async fn update_repeat(&self, repeat: bool) -> anyhow::Result<()> {
        self.mpd.repeat(repeat).await
    }

    async fn update_shuffle(&self, shuffle: bool) -> anyhow::Result<()> {
        self.mpd.random(shuffle).await
    }
}
