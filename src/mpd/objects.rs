//! Value objects decoded from MPD responses

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ===== Library entries =====

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub path: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_artist: String,
    pub date: String,
    pub artist_mbid: String,
    pub album_mbid: String,
    pub album_artist_mbid: String,
    pub track_mbid: String,
    /// Length in seconds
    pub length: u32,
    pub track_number: u32,
    pub track_count: u32,
    pub disc_number: u32,
    pub disc_count: u32,
    /// Position in the current playlist
    pub position: Option<u32>,
    /// Song id in the current playlist
    pub id: Option<u32>,
    pub last_modified: Option<String>,
}

impl Track {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Last component of the path, used when ordering files in a listing
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Title if tagged, file name otherwise
    pub fn visible_title(&self) -> &str {
        if self.title.is_empty() {
            self.file_name()
        } else {
            &self.title
        }
    }

    /// Album order: album MBID, then disc, then track number
    pub fn index_cmp(&self, other: &Track) -> Ordering {
        self.album_mbid
            .cmp(&other.album_mbid)
            .then(self.disc_number.cmp(&other.disc_number))
            .then(self.track_number.cmp(&other.track_number))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    pub path: String,
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub path: String,
    pub last_modified: Option<String>,
}

/// One row of an `lsinfo`-style listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileEntry {
    Directory(Directory),
    Playlist(Playlist),
    Track(Track),
}

impl FileEntry {
    pub fn path(&self) -> &str {
        match self {
            FileEntry::Directory(d) => &d.path,
            FileEntry::Playlist(p) => &p.path,
            FileEntry::Track(t) => &t.path,
        }
    }

    pub fn as_track(&self) -> Option<&Track> {
        match self {
            FileEntry::Track(t) => Some(t),
            _ => None,
        }
    }

    pub fn into_track(self) -> Option<Track> {
        match self {
            FileEntry::Track(t) => Some(t),
            _ => None,
        }
    }

    pub(crate) fn set_last_modified(&mut self, value: String) {
        let slot = match self {
            FileEntry::Directory(d) => &mut d.last_modified,
            FileEntry::Playlist(p) => &mut p.last_modified,
            FileEntry::Track(t) => &mut t.last_modified,
        };
        *slot = Some(value);
    }

    fn rank(&self) -> u8 {
        match self {
            FileEntry::Directory(_) => 0,
            FileEntry::Playlist(_) => 1,
            FileEntry::Track(_) => 2,
        }
    }

    /// Directories, then playlists, then tracks; each case-insensitively by name
    pub fn listing_cmp(&self, other: &FileEntry) -> Ordering {
        self.rank().cmp(&other.rank()).then_with(|| match (self, other) {
            (FileEntry::Track(a), FileEntry::Track(b)) => {
                caseless_cmp(a.file_name(), b.file_name()).then_with(|| a.path.cmp(&b.path))
            }
            _ => caseless_cmp(self.path(), other.path()),
        })
    }

    /// Like `listing_cmp`, but tracks follow album order
    pub fn index_cmp(&self, other: &FileEntry) -> Ordering {
        match (self, other) {
            (FileEntry::Track(a), FileEntry::Track(b)) => a.index_cmp(b),
            _ => self.listing_cmp(other),
        }
    }
}

fn caseless_cmp(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Album {
    pub name: String,
    pub mbid: String,
    pub artist: String,
    pub date: String,
}

impl Album {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name_cmp(&self, other: &Album) -> Ordering {
        caseless_cmp(&self.name, &other.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
    pub mbids: Vec<String>,
}

impl Artist {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mbids: Vec::new(),
        }
    }

    /// Case-insensitive by name; among equal names fewer MBIDs come first
    pub fn name_cmp(&self, other: &Artist) -> Ordering {
        caseless_cmp(&self.name, &other.name).then(self.mbids.len().cmp(&other.mbids.len()))
    }
}

// ===== Server state =====

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub id: u32,
    pub name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    #[default]
    Stopped,
}

impl PlaybackState {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "play" => Some(PlaybackState::Playing),
            "pause" => Some(PlaybackState::Paused),
            "stop" => Some(PlaybackState::Stopped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub volume: u32,
    pub repeat: bool,
    pub random: bool,
    pub single: bool,
    pub consume: bool,
    pub playlist_version: u32,
    pub playlist_length: u32,
    /// -1 when nothing is selected
    pub current_song_index: i32,
    pub next_song_index: i32,
    pub current_song_id: Option<u32>,
    pub next_song_id: Option<u32>,
    pub sample_rate: u32,
    /// Kept as text, MPD reports `f` for floating point output
    pub bit_depth: String,
    pub channel_count: u32,
    pub bitrate: u32,
    /// Elapsed seconds
    pub elapsed: u32,
    /// Track length in seconds
    pub total: u32,
    /// -1 when no database update is running
    pub update_db_job: i32,
    pub state: PlaybackState,
    pub error: Option<String>,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            volume: 0,
            repeat: false,
            random: false,
            single: false,
            consume: false,
            playlist_version: 0,
            playlist_length: 0,
            current_song_index: -1,
            next_song_index: -1,
            current_song_id: None,
            next_song_id: None,
            sample_rate: 0,
            bit_depth: "0".to_string(),
            channel_count: 0,
            bitrate: 0,
            elapsed: 0,
            total: 0,
            update_db_job: -1,
            state: PlaybackState::Stopped,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub artists: u32,
    pub albums: u32,
    pub songs: u32,
    /// Seconds
    pub uptime: u64,
    pub playtime: u64,
    pub db_playtime: u64,
    pub last_db_update: Option<DateTime<Utc>>,
}
