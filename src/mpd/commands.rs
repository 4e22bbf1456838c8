//! MPD command strings
//!
//! Pure functions from a logical operation (plus the server's capability
//! snapshot where the command form depends on it) to the literal command
//! line. No trailing newline; the connection adds it.

use super::capabilities::Capabilities;

// ===== Argument quoting =====

/// Escape backslashes and double quotes inside a quoted argument
pub fn escape(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len());
    for c in arg.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Wrap an argument in double quotes
pub fn quote(arg: &str) -> String {
    format!("\"{}\"", escape(arg))
}

fn switch(enabled: bool) -> &'static str {
    if enabled {
        "1"
    } else {
        "0"
    }
}

// ===== Connection =====

pub const IDLE: &str = "idle";
pub const NOIDLE: &str = "noidle";
pub const CLOSE: &str = "close";
pub const COMMAND_LIST_BEGIN: &str = "command_list_begin";
pub const COMMAND_LIST_END: &str = "command_list_end";
pub const COMMANDS: &str = "commands";
pub const TAG_TYPES: &str = "tagtypes";

/// Wrap commands in `command_list_begin` / `command_list_end`. The server
/// answers the whole block with a single terminal line.
pub fn command_list<S: AsRef<str>>(commands: &[S]) -> String {
    let mut block = String::from(COMMAND_LIST_BEGIN);
    for command in commands {
        block.push('\n');
        block.push_str(command.as_ref());
    }
    block.push('\n');
    block.push_str(COMMAND_LIST_END);
    block
}

pub fn password(secret: &str) -> String {
    if secret.chars().any(|c| c.is_whitespace() || c == '"' || c == '\\') {
        format!("password {}", quote(secret))
    } else {
        format!("password {}", secret)
    }
}

// ===== Library =====

fn album_groups(caps: &Capabilities) -> String {
    let mut groups = String::new();
    if caps.has_tag_album_artist() {
        groups.push_str(" group albumartist");
    }
    if caps.has_musicbrainz_tags() {
        groups.push_str(" group musicbrainz_albumid");
    }
    if caps.has_tag_date() {
        groups.push_str(" group date");
    }
    groups
}

pub fn albums(caps: &Capabilities) -> String {
    if caps.has_list_group() {
        format!("list album{}", album_groups(caps))
    } else {
        "list album".to_string()
    }
}

pub fn artist_albums(artist: &str, caps: &Capabilities) -> String {
    if caps.has_list_group() {
        format!("list album artist {}{}", quote(artist), album_groups(caps))
    } else {
        format!("list album {}", quote(artist))
    }
}

pub fn album_artist_albums(artist: &str, caps: &Capabilities) -> String {
    if caps.has_list_group() {
        format!(
            "list album AlbumArtist {}{}",
            quote(artist),
            album_groups(caps)
        )
    } else {
        format!("list album AlbumArtist {}", quote(artist))
    }
}

pub fn albums_in_path(path: &str, caps: &Capabilities) -> String {
    if caps.has_list_filtering() {
        format!("list album base {}{}", quote(path), album_groups(caps))
    } else {
        "list album".to_string()
    }
}

pub fn album_tracks(album: &str) -> String {
    format!("find album {}", quote(album))
}

pub fn artists(group_mbid: bool) -> String {
    if group_mbid {
        "list artist group MUSICBRAINZ_ARTISTID".to_string()
    } else {
        "list artist".to_string()
    }
}

pub fn album_artists(group_mbid: bool) -> String {
    if group_mbid {
        "list albumartist group MUSICBRAINZ_ARTISTID".to_string()
    } else {
        "list albumartist".to_string()
    }
}

pub const ALL_FILES: &str = "listallinfo";

pub fn lsinfo(path: &str) -> String {
    format!("lsinfo {}", quote(path))
}

/// Field names accepted by `search`, `find` and `searchadd`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchType {
    Track,
    Album,
    Artist,
    File,
    Any,
}

impl SearchType {
    pub fn field(self) -> &'static str {
        match self {
            SearchType::Track => "title",
            SearchType::Album => "album",
            SearchType::Artist => "artist",
            SearchType::File => "file",
            SearchType::Any => "any",
        }
    }
}

pub fn search(term: &str, kind: SearchType) -> String {
    format!("search {} {}", kind.field(), quote(term))
}

pub fn search_add(term: &str, kind: SearchType) -> String {
    format!("searchadd {} {}", kind.field(), quote(term))
}

pub fn playlist_find_file(url: &str) -> String {
    format!("playlistfind file {}", quote(url))
}

pub fn update_database(path: Option<&str>) -> String {
    match path {
        Some(p) if !p.is_empty() => format!("update {}", quote(p)),
        _ => "update".to_string(),
    }
}

// ===== Playback =====

pub const NEXT: &str = "next";
pub const PREVIOUS: &str = "previous";
pub const STOP: &str = "stop";

pub fn pause(paused: bool) -> String {
    format!("pause {}", switch(paused))
}

pub fn play(index: u32) -> String {
    format!("play {}", index)
}

pub fn seek(index: u32, seconds: u32) -> String {
    format!("seek {} {}", index, seconds)
}

pub fn random(enabled: bool) -> String {
    format!("random {}", switch(enabled))
}

pub fn repeat(enabled: bool) -> String {
    format!("repeat {}", switch(enabled))
}

pub fn single(enabled: bool) -> String {
    format!("single {}", switch(enabled))
}

pub fn consume(enabled: bool) -> String {
    format!("consume {}", switch(enabled))
}

/// Volume is clamped to 0..=100
pub fn set_volume(volume: i32) -> String {
    format!("setvol {}", volume.clamp(0, 100))
}

// ===== Status =====

pub const STATUS: &str = "status";
pub const STATS: &str = "stats";
pub const CURRENT_SONG: &str = "currentsong";
pub const OUTPUTS: &str = "outputs";

pub fn toggle_output(id: u32) -> String {
    format!("toggleoutput {}", id)
}

// ===== Current playlist =====

pub const CURRENT_PLAYLIST: &str = "playlistinfo";
pub const CLEAR_PLAYLIST: &str = "clear";
pub const SHUFFLE_PLAYLIST: &str = "shuffle";

/// Half-open `start:end` window
pub fn current_playlist_window(start: u32, end: u32) -> String {
    format!("playlistinfo {}:{}", start, end)
}

pub fn add(uri: &str) -> String {
    format!("add {}", quote(uri))
}

pub fn add_at_index(uri: &str, index: u32) -> String {
    format!("addid {} {}", quote(uri), index)
}

pub fn remove_index(index: u32) -> String {
    format!("delete {}", index)
}

/// Half-open `start:end` range
pub fn remove_range(start: u32, end: u32) -> String {
    format!("delete {}:{}", start, end)
}

pub fn move_song(from: u32, to: u32) -> String {
    format!("move {} {}", from, to)
}

// ===== Stored playlists =====

pub const SAVED_PLAYLISTS: &str = "listplaylists";

pub fn saved_playlist(name: &str) -> String {
    format!("listplaylistinfo {}", quote(name))
}

pub fn save_playlist(name: &str) -> String {
    format!("save {}", quote(name))
}

pub fn remove_playlist(name: &str) -> String {
    format!("rm {}", quote(name))
}

pub fn load_playlist(name: &str) -> String {
    format!("load {}", quote(name))
}

pub fn add_to_playlist(name: &str, uri: &str) -> String {
    format!("playlistadd {} {}", quote(name), quote(uri))
}

pub fn remove_from_playlist(name: &str, index: u32) -> String {
    format!("playlistdelete {} {}", quote(name), index)
}

// ===== Stickers =====

pub fn sticker_find(base: &str, name: &str, value: &str) -> String {
    format!(
        "sticker find song {} {} = {}",
        quote(base),
        quote(name),
        quote(value)
    )
}

pub fn sticker_rating(uri: &str) -> String {
    format!("sticker get song {} \"rating\"", quote(uri))
}
