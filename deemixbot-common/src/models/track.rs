use std::fmt;
use std::fmt::Write as _;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A playable item as resolved from the catalog. Immutable once built; a queue may
/// hold the same track more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    pub artist: String,
    /// Locator handed to the fetch pipeline (a catalog link).
    pub source: String,
}

impl Track {
    pub fn new(title: impl Into<String>, artist: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            source: source.into(),
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.artist.is_empty() {
            write!(f, "{}", self.title)
        } else {
            write!(f, "{} - {}", self.artist, self.title)
        }
    }
}

/// A search hit with the extra details shown by the `search` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchedTrack {
    pub track: Track,
    pub album: String,
    pub duration: Duration,
}

impl SearchedTrack {
    /// Appends a human readable block describing this hit.
    pub fn append_to(&self, out: &mut String) {
        let secs = self.duration.as_secs();
        let _ = write!(
            out,
            "\nTitle: {}\nAlbum: {}\nArtist: {}\nDuration: {}:{:02}\nLink:\n`{}`\n\n",
            self.track.title,
            self.album,
            self.track.artist,
            secs / 60,
            secs % 60,
            self.track.source,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_artist_and_title() {
        let t = Track::new("Teardrop", "Massive Attack", "https://www.deezer.com/track/1");
        assert_eq!(t.to_string(), "Massive Attack - Teardrop");
    }

    #[test]
    fn display_without_artist_is_just_title() {
        let t = Track::new("your requested song", "", "https://www.deezer.com/track/1");
        assert_eq!(t.to_string(), "your requested song");
    }

    #[test]
    fn searched_track_block_has_padded_duration() {
        let hit = SearchedTrack {
            track: Track::new("Angel", "Massive Attack", "https://www.deezer.com/track/2"),
            album: "Mezzanine".into(),
            duration: Duration::from_secs(379),
        };
        let mut out = String::new();
        hit.append_to(&mut out);
        assert!(out.contains("Album: Mezzanine"));
        assert!(out.contains("Duration: 6:19"));
        assert!(out.contains("`https://www.deezer.com/track/2`"));
    }
}
