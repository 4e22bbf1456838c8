//! Response decoding
//!
//! MPD answers with `key: value` lines followed by `OK` or `ACK ...`.
//! Entity lists are decoded with a line-prefix state machine: a leading key
//! (`file:`, `Album:`, ...) starts a new record, the following lines fill it
//! in, and the record is pushed when the next leading key or the terminal
//! line arrives. Malformed numbers keep their defaults.

use chrono::{DateTime, Utc};

use super::error::AckError;
use super::objects::{
    Album, Artist, Directory, FileEntry, Output, PlaybackState, Playlist, Statistics, Status,
    Track,
};

// ===== Line prefixes =====

pub const OK: &str = "OK";
pub const ACK: &str = "ACK";
pub const GREETING: &str = "OK MPD ";
pub const CHANGED: &str = "changed:";

const FILE: &str = "file: ";
const DIRECTORY: &str = "directory: ";
const PLAYLIST: &str = "playlist: ";
const LAST_MODIFIED: &str = "Last-Modified: ";

const TITLE: &str = "Title: ";
const ARTIST: &str = "Artist: ";
const ALBUM: &str = "Album: ";
const ALBUM_ARTIST: &str = "AlbumArtist: ";
const DATE: &str = "Date: ";
const TRACK: &str = "Track: ";
const DISC: &str = "Disc: ";
const TIME: &str = "Time: ";
const DURATION: &str = "duration: ";
const POS: &str = "Pos: ";
const ID: &str = "Id: ";
const ARTIST_MBID: &str = "MUSICBRAINZ_ARTISTID: ";
const ALBUM_MBID: &str = "MUSICBRAINZ_ALBUMID: ";
const ALBUM_ARTIST_MBID: &str = "MUSICBRAINZ_ALBUMARTISTID: ";
const TRACK_MBID: &str = "MUSICBRAINZ_TRACKID: ";

const COMMAND: &str = "command: ";
const TAG_TYPE: &str = "tagtype: ";

const OUTPUT_ID: &str = "outputid: ";
const OUTPUT_NAME: &str = "outputname: ";
const OUTPUT_ENABLED: &str = "outputenabled: ";

const STICKER: &str = "sticker: ";

// ===== Terminal lines =====

/// How a response ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Ok,
    Ack(AckError),
}

/// Classify a line as a response terminator
pub fn terminal(line: &str) -> Option<Terminal> {
    if line == OK || line.starts_with("OK ") {
        Some(Terminal::Ok)
    } else if line.starts_with(ACK) {
        Some(Terminal::Ack(AckError::parse(line)))
    } else {
        None
    }
}

/// Version from an `OK MPD x.y.z` greeting
pub fn greeting_version(line: &str) -> Option<&str> {
    line.strip_prefix(GREETING).map(str::trim)
}

/// Lines of a response up to (not including) the terminal line
fn body<'a, I>(lines: I) -> impl Iterator<Item = &'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    lines
        .into_iter()
        .map(|l| l.trim_end_matches(['\r', '\n']))
        .take_while(|l| terminal(l).is_none())
}

fn parse_num<T: std::str::FromStr>(value: &str, slot: &mut T) {
    if let Ok(v) = value.trim().parse() {
        *slot = v;
    }
}

/// `3/12` style position and count. Spaces are ignored, missing parts keep
/// their defaults.
fn parse_position(value: &str, number: &mut u32, count: &mut u32) {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    let mut parts = compact.split('/');
    if let Some(n) = parts.next() {
        parse_num(n, number);
    }
    if let Some(c) = parts.next() {
        parse_num(c, count);
    }
}

fn rounded_secs(value: &str) -> Option<u32> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite() && *f >= 0.0)
        .map(|f| f.round() as u32)
}

// ===== Simple lists =====

fn values_with_prefix<'a, I>(lines: I, prefix: &str) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    body(lines)
        .filter_map(|l| l.strip_prefix(prefix))
        .map(str::to_string)
        .collect()
}

/// `commands` response
pub fn decode_commands<'a, I>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    values_with_prefix(lines, COMMAND)
}

/// `tagtypes` response
pub fn decode_tag_types<'a, I>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    values_with_prefix(lines, TAG_TYPE)
}

/// Every `file:` path in the response
pub fn decode_file_paths<'a, I>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    values_with_prefix(lines, FILE)
}

/// Subsystems named by `changed:` lines
pub fn decode_changed<'a, I>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    body(lines)
        .filter_map(|l| l.strip_prefix(CHANGED))
        .map(|s| s.trim().to_string())
        .collect()
}

/// Value of one named sticker from `sticker: name=value` lines
pub fn decode_sticker<'a, I>(lines: I, name: &str) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    body(lines)
        .filter_map(|l| l.strip_prefix(STICKER))
        .filter_map(|s| s.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

// ===== Albums and artists =====

fn strip_leading_unnamed<T>(items: &mut Vec<T>, name: impl Fn(&T) -> &str) {
    let leading = items.iter().take_while(|item| name(item).is_empty()).count();
    items.drain(..leading);
}

/// `list album [group ...]` response
pub fn decode_albums<'a, I>(lines: I) -> Vec<Album>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut albums = Vec::new();
    let mut current: Option<Album> = None;

    for line in body(lines) {
        if let Some(name) = line.strip_prefix(ALBUM) {
            albums.extend(current.take());
            current = Some(Album::new(name));
            continue;
        }
        let Some(album) = current.as_mut() else {
            continue;
        };
        if let Some(mbid) = line.strip_prefix(ALBUM_MBID) {
            album.mbid = mbid.to_string();
        } else if let Some(artist) = line.strip_prefix(ALBUM_ARTIST) {
            album.artist = artist.to_string();
        } else if let Some(date) = line.strip_prefix(DATE) {
            album.date = date.to_string();
        }
    }
    albums.extend(current);

    strip_leading_unnamed(&mut albums, |a| a.name.as_str());
    albums
}

/// `list artist` / `list albumartist` response, optionally grouped by MBID
pub fn decode_artists<'a, I>(lines: I) -> Vec<Artist>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut artists = Vec::new();
    let mut current: Option<Artist> = None;

    for line in body(lines) {
        let name = line
            .strip_prefix(ARTIST)
            .or_else(|| line.strip_prefix(ALBUM_ARTIST));
        if let Some(name) = name {
            artists.extend(current.take());
            current = Some(Artist::new(name));
        } else if let Some(mbid) = line.strip_prefix(ARTIST_MBID) {
            if let Some(artist) = current.as_mut() {
                if !mbid.is_empty() {
                    artist.mbids.push(mbid.to_string());
                }
            }
        }
    }
    artists.extend(current);

    strip_leading_unnamed(&mut artists, |a| a.name.as_str());
    artists
}

// ===== Files, directories and playlists =====

/// Per-track filter applied while decoding
#[derive(Debug, Clone, Default)]
pub struct TrackFilter {
    /// Matches artist or album artist; empty matches everything
    pub artist: String,
    /// Matches the album MBID; empty matches everything
    pub album_mbid: String,
}

impl TrackFilter {
    pub fn new(artist: impl Into<String>, album_mbid: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            album_mbid: album_mbid.into(),
        }
    }

    pub fn accepts(&self, entry: &FileEntry) -> bool {
        let FileEntry::Track(track) = entry else {
            return true;
        };
        let artist_ok = self.artist.is_empty()
            || self.artist == track.artist
            || self.artist == track.album_artist;
        let mbid_ok = self.album_mbid.is_empty() || self.album_mbid == track.album_mbid;
        artist_ok && mbid_ok
    }
}

fn apply_track_field(track: &mut Track, line: &str) {
    if let Some(v) = line.strip_prefix(TITLE) {
        track.title = v.to_string();
    } else if let Some(v) = line.strip_prefix(ARTIST) {
        track.artist = v.to_string();
    } else if let Some(v) = line.strip_prefix(ALBUM_ARTIST) {
        track.album_artist = v.to_string();
    } else if let Some(v) = line.strip_prefix(ALBUM) {
        track.album = v.to_string();
    } else if let Some(v) = line.strip_prefix(DATE) {
        track.date = v.to_string();
    } else if let Some(v) = line.strip_prefix(ARTIST_MBID) {
        track.artist_mbid = v.to_string();
    } else if let Some(v) = line.strip_prefix(ALBUM_MBID) {
        track.album_mbid = v.to_string();
    } else if let Some(v) = line.strip_prefix(ALBUM_ARTIST_MBID) {
        track.album_artist_mbid = v.to_string();
    } else if let Some(v) = line.strip_prefix(TRACK_MBID) {
        track.track_mbid = v.to_string();
    } else if let Some(v) = line.strip_prefix(TIME) {
        parse_num(v, &mut track.length);
    } else if let Some(v) = line.strip_prefix(DURATION) {
        if let Some(secs) = rounded_secs(v) {
            track.length = secs;
        }
    } else if let Some(v) = line.strip_prefix(TRACK) {
        parse_position(v, &mut track.track_number, &mut track.track_count);
    } else if let Some(v) = line.strip_prefix(DISC) {
        parse_position(v, &mut track.disc_number, &mut track.disc_count);
    } else if let Some(v) = line.strip_prefix(POS) {
        track.position = v.trim().parse().ok();
    } else if let Some(v) = line.strip_prefix(ID) {
        track.id = v.trim().parse().ok();
    }
}

/// Mixed `file:` / `directory:` / `playlist:` listing, filtered per track
pub fn decode_file_entries<'a, I>(lines: I, filter: &TrackFilter) -> Vec<FileEntry>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut entries = Vec::new();
    let mut current: Option<FileEntry> = None;

    let finish = |entry: Option<FileEntry>, entries: &mut Vec<FileEntry>| {
        if let Some(entry) = entry {
            if filter.accepts(&entry) {
                entries.push(entry);
            }
        }
    };

    for line in body(lines) {
        let started = if let Some(path) = line.strip_prefix(FILE) {
            Some(FileEntry::Track(Track::new(path)))
        } else if let Some(path) = line.strip_prefix(DIRECTORY) {
            Some(FileEntry::Directory(Directory {
                path: path.to_string(),
                last_modified: None,
            }))
        } else if let Some(path) = line.strip_prefix(PLAYLIST) {
            Some(FileEntry::Playlist(Playlist {
                path: path.to_string(),
                last_modified: None,
            }))
        } else {
            None
        };

        if let Some(entry) = started {
            finish(current.replace(entry), &mut entries);
            continue;
        }

        match current.as_mut() {
            Some(entry) if line.starts_with(LAST_MODIFIED) => {
                entry.set_last_modified(line[LAST_MODIFIED.len()..].to_string());
            }
            Some(FileEntry::Track(track)) => apply_track_field(track, line),
            _ => {}
        }
    }
    finish(current, &mut entries);

    entries
}

/// Tracks only, in server order
pub fn decode_tracks<'a, I>(lines: I, filter: &TrackFilter) -> Vec<Track>
where
    I: IntoIterator<Item = &'a str>,
{
    decode_file_entries(lines, filter)
        .into_iter()
        .filter_map(FileEntry::into_track)
        .collect()
}

// ===== Status, statistics and outputs =====

/// `status` response
pub fn decode_status<'a, I>(lines: I) -> Status
where
    I: IntoIterator<Item = &'a str>,
{
    let mut status = Status::default();

    for line in body(lines) {
        let Some((key, value)) = line.split_once(": ") else {
            continue;
        };
        match key {
            "volume" => {
                let mut volume = -1i64;
                parse_num(value, &mut volume);
                status.volume = if (0..=100).contains(&volume) {
                    volume as u32
                } else {
                    0
                };
            }
            "repeat" => status.repeat = value != "0",
            "random" => status.random = value != "0",
            "single" => status.single = value != "0",
            "consume" => status.consume = value != "0",
            "playlist" => parse_num(value, &mut status.playlist_version),
            "playlistlength" => parse_num(value, &mut status.playlist_length),
            "song" => parse_num(value, &mut status.current_song_index),
            "nextsong" => parse_num(value, &mut status.next_song_index),
            "songid" => status.current_song_id = value.parse().ok(),
            "nextsongid" => status.next_song_id = value.parse().ok(),
            "bitrate" => parse_num(value, &mut status.bitrate),
            "time" => {
                if let Some((elapsed, total)) = value.split_once(':') {
                    parse_num(elapsed, &mut status.elapsed);
                    parse_num(total, &mut status.total);
                }
            }
            "elapsed" => {
                if let Some(secs) = rounded_secs(value) {
                    status.elapsed = secs;
                }
            }
            "duration" => {
                if let Some(secs) = rounded_secs(value) {
                    status.total = secs;
                }
            }
            "audio" => {
                let mut parts = value.split(':');
                if let Some(rate) = parts.next() {
                    parse_num(rate, &mut status.sample_rate);
                }
                if let Some(bits) = parts.next() {
                    status.bit_depth = bits.to_string();
                }
                if let Some(channels) = parts.next() {
                    parse_num(channels, &mut status.channel_count);
                }
            }
            "updating_db" => parse_num(value, &mut status.update_db_job),
            "state" => {
                if let Some(state) = PlaybackState::parse(value) {
                    status.state = state;
                }
            }
            "error" => status.error = Some(value.to_string()),
            _ => {}
        }
    }

    status
}

/// `stats` response
pub fn decode_statistics<'a, I>(lines: I) -> Statistics
where
    I: IntoIterator<Item = &'a str>,
{
    let mut stats = Statistics::default();

    for line in body(lines) {
        let Some((key, value)) = line.split_once(": ") else {
            continue;
        };
        match key {
            "artists" => parse_num(value, &mut stats.artists),
            "albums" => parse_num(value, &mut stats.albums),
            "songs" => parse_num(value, &mut stats.songs),
            "uptime" => parse_num(value, &mut stats.uptime),
            "playtime" => parse_num(value, &mut stats.playtime),
            "db_playtime" => parse_num(value, &mut stats.db_playtime),
            "db_update" => {
                stats.last_db_update = value
                    .trim()
                    .parse::<i64>()
                    .ok()
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
            }
            _ => {}
        }
    }

    stats
}

/// `outputs` response
pub fn decode_outputs<'a, I>(lines: I) -> Vec<Output>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut outputs = Vec::new();
    let mut current: Option<Output> = None;

    for line in body(lines) {
        if let Some(id) = line.strip_prefix(OUTPUT_ID) {
            outputs.extend(current.take());
            let mut output = Output::default();
            parse_num(id, &mut output.id);
            current = Some(output);
        } else if let Some(output) = current.as_mut() {
            if let Some(name) = line.strip_prefix(OUTPUT_NAME) {
                output.name = name.to_string();
            } else if let Some(enabled) = line.strip_prefix(OUTPUT_ENABLED) {
                output.enabled = enabled.trim() == "1";
            }
        }
    }
    outputs.extend(current);

    outputs
}
