//! Tracks and their media transcodings.
//!
//! # Wire Format
//!
//! ```json
//! {
//!     "kind": "track",
//!     "id": 42,
//!     "urn": "soundcloud:tracks:42",
//!     "title": "Track Title",
//!     "permalink": "track-title",
//!     "artwork_url": "https://i1.sndcdn.com/artworks-000-large.jpg",
//!     "description": "",
//!     "duration": 180000,
//!     "genre": "Electronic",
//!     "tag_list": "house \"deep house\"",
//!     "likes_count": 3,
//!     "playback_count": 100,
//!     "track_authorization": "secret",
//!     "media": {
//!         "transcodings": [{
//!             "url": "https://api-v2.soundcloud.com/media/soundcloud:tracks:42/abc/stream/progressive",
//!             "preset": "mp3_1_0",
//!             "snipped": false,
//!             "format": { "protocol": "progressive", "mime_type": "audio/mpeg" }
//!         }]
//!     },
//!     "user": { "kind": "user", "id": 1234, "username": "Artist" }
//! }
//! ```
//!
//! Inside playlists, tracks after the first few are *stubs* that only carry
//! `id` and `kind`. A stub is recognized by its empty title.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull};
use veil::Redact;

use super::{fix_artwork, fix_id, tags, user::User, Entity, Kind};

#[serde_as]
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize, Redact)]
#[serde(default)]
pub struct Track {
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

    /// Duration in milliseconds.
    #[serde_as(as = "DefaultOnNull")]
    pub duration: u64,

    #[serde_as(as = "DefaultOnNull")]
    pub genre: String,

    /// Raw tag list, see [`tags::parse`].
    #[serde_as(as = "DefaultOnNull")]
    pub tag_list: String,

    #[serde_as(as = "DefaultOnNull")]
    pub likes_count: u64,

    #[serde_as(as = "DefaultOnNull")]
    pub playback_count: u64,

    /// Short-lived token that grants access to this track's streams.
    #[serde_as(as = "DefaultOnNull")]
    #[redact]
    pub track_authorization: String,

    #[serde_as(as = "DefaultOnNull")]
    pub media: Media,

    pub user: Option<User>,

    #[serde_as(as = "DefaultOnNull")]
    pub created_at: String,

    #[serde_as(as = "DefaultOnNull")]
    pub last_modified: String,

    #[serde_as(as = "DefaultOnNull")]
    pub kind: String,
}

impl Entity for Track {
    const KIND: Kind = Kind::Track;

    fn kind(&self) -> &str {
        &self.kind
    }

    fn fix(&mut self) {
        self.artwork_url = fix_artwork(&self.artwork_url);
        fix_id(&mut self.id, self.numeric_id);
        if let Some(user) = self.user.as_mut() {
            user.fix();
        }
    }
}

impl Track {
    /// A stub has an identifier but none of the other fields.
    #[must_use]
    pub fn is_stub(&self) -> bool {
        self.title.is_empty()
    }

    /// A stub for `id`, as embedded in playlists.
    #[must_use]
    pub fn stub(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: Kind::Track.as_str().to_owned(),
            ..Self::default()
        }
    }

    /// A human-readable summary: the description followed by statistics,
    /// genre, dates and tags.
    #[must_use]
    pub fn format_description(&self) -> String {
        let mut desc = self.description.clone();
        if !desc.is_empty() {
            desc.push_str("\n\n");
        }

        desc.push_str(&format!(
            "{} ❤️ | {} ▶️",
            self.likes_count, self.playback_count
        ));
        if !self.genre.is_empty() {
            desc.push_str("\nGenre: ");
            desc.push_str(&self.genre);
        }
        desc.push_str("\nCreated: ");
        desc.push_str(&self.created_at);
        desc.push_str("\nLast modified: ");
        desc.push_str(&self.last_modified);

        let tags = tags::parse(&self.tag_list);
        if !tags.is_empty() {
            desc.push_str("\nTags: ");
            desc.push_str(&tags.join(", "));
        }

        desc
    }
}

/// The media formats a track is available in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Media {
    pub transcodings: Vec<Transcoding>,
}

impl Media {
    /// MIME type of the only codec that downstream players are expected to
    /// handle.
    const MPEG: &'static str = "audio/mpeg";

    /// Selects the first full-length MP3 transcoding using `protocol`.
    #[must_use]
    pub fn select(&self, protocol: Protocol) -> Option<&Transcoding> {
        self.transcodings.iter().find(|transcoding| {
            !transcoding.snipped
                && transcoding.format.protocol == protocol
                && transcoding.format.mime_type == Self::MPEG
        })
    }

    /// Selects a full-length MP3 transcoding, preferring a progressive
    /// download over HLS.
    #[must_use]
    pub fn select_compatible(&self) -> Option<&Transcoding> {
        self.select(Protocol::Progressive)
            .or_else(|| self.select(Protocol::Hls))
    }
}

#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Transcoding {
    /// Endpoint that answers with the actual media URL.
    pub url: String,

    #[serde_as(as = "DefaultOnNull")]
    pub preset: String,

    /// Whether only a preview snippet is available.
    #[serde_as(as = "DefaultOnNull")]
    pub snipped: bool,

    pub format: Format,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Format {
    pub protocol: Protocol,
    pub mime_type: String,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// A single file over plain HTTP.
    #[default]
    Progressive,

    /// HTTP Live Streaming playlist.
    Hls,

    #[serde(other)]
    Other,
}
