//! Radio client event hook payloads
//!
//! The radio client runs a configured event command on song and station
//! changes; that command posts a JSON body to `/radio/event`. Only the fields
//! used for now-playing metadata are kept.

use hearth_common::events::Track;
use serde::{Deserialize, Serialize};

/// Event reported by the radio client's event command
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RadioEvent {
    /// Client event name (`songstart`, `songfinish`, `stationchange`, ...)
    pub event: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default, alias = "stationName")]
    pub station_name: Option<String>,
    #[serde(default, alias = "coverArt")]
    pub cover_art: Option<String>,
    #[serde(default, alias = "songDuration")]
    pub song_duration: Option<f64>,
    #[serde(default, alias = "detailUrl")]
    pub detail_url: Option<String>,
}

/// Event categories the supervisor acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioEventKind {
    SongStart,
    SongFinish,
    StationChange,
    Other,
}

impl RadioEvent {
    pub fn kind(&self) -> RadioEventKind {
        match self.event.to_ascii_lowercase().as_str() {
            "songstart" => RadioEventKind::SongStart,
            "songfinish" => RadioEventKind::SongFinish,
            "stationchange" | "stationcreate" | "stationfetchplaylist" => {
                RadioEventKind::StationChange
            }
            _ => RadioEventKind::Other,
        }
    }

    /// Track described by a song event; None when it carries no title
    pub fn track(&self) -> Option<Track> {
        let title = self.title.as_deref()?.trim();
        if title.is_empty() {
            return None;
        }

        let id = self
            .detail_url
            .clone()
            .unwrap_or_else(|| match &self.artist {
                Some(artist) => format!("radio:{} - {}", artist, title),
                None => format!("radio:{}", title),
            });

        Some(Track {
            id,
            title: title.to_string(),
            artist: self.artist.clone(),
            album: self.album.clone(),
            duration_secs: self.song_duration.filter(|d| *d > 0.0),
            cover_art: self.cover_art.clone(),
        })
    }
}
