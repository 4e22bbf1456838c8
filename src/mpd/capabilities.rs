//! Server capability negotiation
//!
//! Derived from the greeting version plus the `commands` and `tagtypes`
//! responses. Command construction consults this snapshot on every call.

use serde::Serialize;
use std::fmt;

/// `major.minor.patch` from the `OK MPD` greeting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ServerVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Anything other than three dot separated parts falls back to 0.0.0.
    /// Unparsable parts count as zero.
    pub fn parse(raw: &str) -> Self {
        let parts: Vec<&str> = raw.trim().split('.').collect();
        if parts.len() != 3 {
            return Self::default();
        }
        let num = |s: &str| s.trim().parse().unwrap_or(0);
        Self::new(num(parts[0]), num(parts[1]), num(parts[2]))
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    version: ServerVersion,
    has_idle: bool,
    has_ranged_current_playlist: bool,
    has_search_add: bool,
    has_musicbrainz_tags: bool,
    has_list_group: bool,
    has_list_filtering: bool,
    has_current_playlist_remove_range: bool,
    has_tag_album_artist: bool,
    has_tag_date: bool,
    mopidy_detected: bool,
}

impl Capabilities {
    pub fn negotiate<C, T>(version: ServerVersion, commands: &[C], tags: &[T]) -> Self
    where
        C: AsRef<str>,
        T: AsRef<str>,
    {
        let ServerVersion { major, minor, .. } = version;
        let has_command = |name: &str| commands.iter().any(|c| c.as_ref() == name);

        let mut caps = Self {
            version,
            has_idle: has_command("idle"),
            has_search_add: has_command("searchadd"),
            has_ranged_current_playlist: minor > 14 || major > 0,
            has_list_group: minor >= 19 || major > 0,
            has_list_filtering: minor >= 19 || major > 0,
            has_current_playlist_remove_range: minor >= 16 || major > 0,
            ..Self::default()
        };

        for tag in tags {
            let tag = tag.as_ref().to_lowercase();
            if tag.contains("musicbrainz") {
                caps.has_musicbrainz_tags = true;
            } else if tag == "albumartist" {
                caps.has_tag_album_artist = true;
            } else if tag == "date" {
                caps.has_tag_date = true;
            }
        }

        caps
    }

    /// Degrade to the command forms Mopidy understands
    pub fn enable_mopidy_workaround(&mut self) {
        self.has_list_group = false;
        self.has_list_filtering = false;
        self.mopidy_detected = true;
    }

    pub fn version(&self) -> ServerVersion {
        self.version
    }

    pub fn has_idle(&self) -> bool {
        self.has_idle
    }

    pub fn has_ranged_current_playlist(&self) -> bool {
        self.has_ranged_current_playlist
    }

    pub fn has_search_add(&self) -> bool {
        self.has_search_add
    }

    pub fn has_musicbrainz_tags(&self) -> bool {
        self.has_musicbrainz_tags
    }

    pub fn has_list_group(&self) -> bool {
        self.has_list_group
    }

    pub fn has_list_filtering(&self) -> bool {
        self.has_list_filtering
    }

    pub fn has_current_playlist_remove_range(&self) -> bool {
        self.has_current_playlist_remove_range
    }

    pub fn has_tag_album_artist(&self) -> bool {
        self.has_tag_album_artist
    }

    pub fn has_tag_date(&self) -> bool {
        self.has_tag_date
    }

    pub fn mopidy_detected(&self) -> bool {
        self.mopidy_detected
    }

    /// Human readable summary of what the server supports
    pub fn server_features(&self) -> String {
        let flag = |b: bool| if b { "yes" } else { "no" };
        let mut out = format!("MPD protocol version: {}\n", self.version);
        for (label, value) in [
            ("idle", self.has_idle),
            ("ranged current playlist", self.has_ranged_current_playlist),
            ("searchadd", self.has_search_add),
            ("MusicBrainz tags", self.has_musicbrainz_tags),
            ("list grouping", self.has_list_group),
            ("list filtering", self.has_list_filtering),
            ("ranged delete", self.has_current_playlist_remove_range),
            ("albumartist tag", self.has_tag_album_artist),
            ("date tag", self.has_tag_date),
        ] {
            out.push_str(&format!("{}: {}\n", label, flag(value)));
        }
        if self.mopidy_detected {
            out.push_str("Mopidy workaround active\n");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_TAGS: &[&str] = &[];

    #[test]
    fn test_version_parse() {
        assert_eq!(ServerVersion::parse("0.21.25"), ServerVersion::new(0, 21, 25));
        assert_eq!(ServerVersion::parse("0.23"), ServerVersion::default());
        assert_eq!(ServerVersion::parse("garbage"), ServerVersion::default());
        assert_eq!(ServerVersion::parse("0.x.1"), ServerVersion::new(0, 0, 1));
    }

    #[test]
    fn test_ranged_playlist_threshold() {
        let old = Capabilities::negotiate(ServerVersion::parse("0.14.0"), NO_TAGS, NO_TAGS);
        assert!(!old.has_ranged_current_playlist());

        let newer = Capabilities::negotiate(ServerVersion::parse("0.20.0"), NO_TAGS, NO_TAGS);
        assert!(newer.has_ranged_current_playlist());
    }

    #[test]
    fn test_list_group_threshold() {
        let caps = Capabilities::negotiate(ServerVersion::parse("0.19.0"), &["list"], NO_TAGS);
        assert!(caps.has_list_group());
        assert!(caps.has_list_filtering());

        let caps = Capabilities::negotiate(ServerVersion::parse("0.18.9"), &["list"], NO_TAGS);
        assert!(!caps.has_list_group());
        assert!(!caps.has_current_playlist_remove_range());
    }

    #[test]
    fn test_major_version_enables_everything_version_gated() {
        let caps = Capabilities::negotiate(ServerVersion::new(1, 0, 0), NO_TAGS, NO_TAGS);
        assert!(caps.has_ranged_current_playlist());
        assert!(caps.has_list_group());
        assert!(caps.has_current_playlist_remove_range());
    }

    #[test]
    fn test_command_gated_flags() {
        let caps = Capabilities::negotiate(
            ServerVersion::parse("0.21.0"),
            &["status", "idle", "noidle", "searchadd"],
            NO_TAGS,
        );
        assert!(caps.has_idle());
        assert!(caps.has_search_add());

        let caps = Capabilities::negotiate(ServerVersion::parse("0.21.0"), &["status"], NO_TAGS);
        assert!(!caps.has_idle());
        assert!(!caps.has_search_add());
    }

    #[test]
    fn test_tag_detection_is_case_insensitive() {
        let caps = Capabilities::negotiate(
            ServerVersion::parse("0.21.0"),
            NO_TAGS,
            &["Artist", "MUSICBRAINZ_ARTISTID", "AlbumArtist", "Date"],
        );
        assert!(caps.has_musicbrainz_tags());
        assert!(caps.has_tag_album_artist());
        assert!(caps.has_tag_date());

        let caps = Capabilities::negotiate(
            ServerVersion::parse("0.21.0"),
            NO_TAGS,
            &["AlbumArtistSort", "OriginalDate"],
        );
        assert!(!caps.has_tag_album_artist());
        assert!(!caps.has_tag_date());
    }

    #[test]
    fn test_mopidy_workaround() {
        let mut caps = Capabilities::negotiate(ServerVersion::parse("0.19.0"), NO_TAGS, NO_TAGS);
        caps.enable_mopidy_workaround();
        assert!(!caps.has_list_group());
        assert!(!caps.has_list_filtering());
        assert!(caps.mopidy_detected());
        assert!(caps.has_ranged_current_playlist());
    }

    #[test]
    fn test_server_features_mentions_version() {
        let caps = Capabilities::negotiate(ServerVersion::parse("0.22.4"), &["idle"], NO_TAGS);
        let text = caps.server_features();
        assert!(text.starts_with("MPD protocol version: 0.22.4"));
        assert!(text.contains("idle: yes"));
    }
}
