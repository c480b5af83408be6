//! Playlists and albums.
//!
//! The upstream only embeds the first few tracks of a playlist in full; the
//! rest are stubs (see [`Track::is_stub`]). The
//! [`missing`](crate::missing) module fetches those and splices them back
//! in, leaving a [`Playlist::missing_tracks`] cursor for anything it did not
//! get to.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull};

use super::{fix_artwork, fix_id, tags, track::Track, user::User, Entity, Kind};

#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Playlist {
    /// Bare identifier, taken from `urn` and falling back to the numeric id.
    #[serde_as(as = "DefaultOnNull")]
    #[serde(rename(deserialize = "urn"))]
    pub id: String,

    #[serde(rename(deserialize = "id"), skip_serializing)]
    #[serde_as(as = "DefaultOnNull")]
    numeric_id: u64,

    #[serde_as(as = "DefaultOnNull")]
    pub title: String,

    #[serde_as(as = "DefaultOnNull")]
    pub permalink: String,

    #[serde_as(as = "DefaultOnNull")]
    pub artwork_url: String,

    #[serde_as(as = "DefaultOnNull")]
    pub description: String,

    #[serde_as(as = "DefaultOnNull")]
    pub likes_count: u64,

    /// Total number of tracks, which may exceed `tracks.len()` for playlists
    /// with unavailable tracks.
    #[serde_as(as = "DefaultOnNull")]
    pub track_count: u64,

    /// Tracks in playlist order; may contain stubs.
    #[serde_as(as = "DefaultOnNull")]
    pub tracks: Vec<Track>,

    /// Comma-joined ids of stubs that have not been fetched yet; empty when
    /// there are none. Resume with
    /// [`Gateway::next_missing_tracks`](crate::gateway::Gateway::next_missing_tracks).
    #[serde(skip_deserializing)]
    pub missing_tracks: String,

    /// Raw tag list, see [`tags::parse`].
    #[serde_as(as = "DefaultOnNull")]
    pub tag_list: String,

    pub user: Option<User>,

    #[serde_as(as = "DefaultOnNull")]
    pub created_at: String,

    #[serde_as(as = "DefaultOnNull")]
    pub last_modified: String,

    #[serde_as(as = "DefaultOnNull")]
    pub kind: String,
}

impl Entity for Playlist {
    const KIND: Kind = Kind::Playlist;

    fn kind(&self) -> &str {
        &self.kind
    }

    /// Normalizes the playlist itself, not its tracks.
    ///
    /// This is what search results get. Resolved playlists additionally go
    /// through [`Playlist::fix_tracks`] and missing track reconciliation.
    fn fix(&mut self) {
        self.artwork_url = fix_artwork(&self.artwork_url);
        fix_id(&mut self.id, self.numeric_id);
        if let Some(user) = self.user.as_mut() {
            user.fix();
        }
    }
}

impl Playlist {
    /// Normalizes every embedded track, stubs included.
    pub fn fix_tracks(&mut self) {
        for track in &mut self.tracks {
            track.fix();
        }
    }

    /// Whether any embedded track is still a stub.
    #[must_use]
    pub fn has_stubs(&self) -> bool {
        self.tracks.iter().any(Track::is_stub)
    }

    /// A human-readable summary: the description followed by the track and
    /// like counts, dates and tags.
    #[must_use]
    pub fn format_description(&self) -> String {
        let mut desc = self.description.clone();
        if !desc.is_empty() {
            desc.push_str("\n\n");
        }

        desc.push_str(&format!(
            "{} tracks\n{} ❤️\nCreated: {}\nLast modified: {}",
            self.tracks.len(),
            self.likes_count,
            self.created_at,
            self.last_modified,
        ));

        let tags = tags::parse(&self.tag_list);
        if !tags.is_empty() {
            desc.push_str("\nTags: ");
            desc.push_str(&tags.join(", "));
        }

        desc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: &str = r#"{
        "kind": "playlist",
        "id": 77,
        "title": "Mix",
        "artwork_url": "https://i1.sndcdn.com/artworks-000-large.jpg",
        "description": null,
        "likes_count": 4,
        "tag_list": "\"late night\"",
        "created_at": "2020",
        "last_modified": "2021",
        "tracks": [
            {"kind": "track", "urn": "soundcloud:tracks:1", "title": "One"},
            {"kind": "track", "id": 2},
            {"kind": "track", "id": 3}
        ]
    }"#;

    #[test]
    fn light_fix_leaves_tracks_alone() {
        let mut playlist: Playlist = serde_json::from_str(JSON).unwrap();
        playlist.fix();

        assert_eq!(playlist.id, "77");
        assert_eq!(
            playlist.artwork_url,
            "https://i1.sndcdn.com/artworks-000-t200x200.jpg"
        );
        assert_eq!(playlist.tracks[0].id, "soundcloud:tracks:1");
        assert_eq!(playlist.tracks[1].id, "");
    }

    #[test]
    fn fix_tracks_normalizes_stubs() {
        let mut playlist: Playlist = serde_json::from_str(JSON).unwrap();
        playlist.fix_tracks();

        let ids: Vec<_> = playlist.tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3"]);
        assert!(playlist.has_stubs());
    }

    #[test]
    fn cursor_is_never_read_from_upstream() {
        let playlist: Playlist =
            serde_json::from_str(r#"{"kind": "playlist", "missing_tracks": "1,2"}"#).unwrap();
        assert_eq!(playlist.missing_tracks, "");
    }

    #[test]
    fn formats_description() {
        let playlist: Playlist = serde_json::from_str(JSON).unwrap();
        assert_eq!(
            playlist.format_description(),
            "3 tracks\n4 ❤️\nCreated: 2020\nLast modified: 2021\nTags: late night"
        );
    }
}
