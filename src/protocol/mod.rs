//! SoundCloud API types.
//!
//! This module provides type-safe representations of the JSON objects that
//! the SoundCloud API returns:
//! * Users ([`user`])
//! * Tracks and their media transcodings ([`track`])
//! * Playlists, possibly with stub tracks ([`playlist`])
//! * Pages of search and listing results ([`paginated`])
//!
//! # Normalization
//!
//! Upstream objects are not returned as-is. Every entity implements
//! [`Entity::fix`], which:
//! * strips namespaces from identifiers (`soundcloud:tracks:42` → `42`)
//! * rewrites artwork to a fixed size (`-large.` → `-t200x200.`)
//!
//! Both rewrites are idempotent.
//!
//! # Null Handling
//!
//! The API freely returns `null` for strings and counters. All such fields
//! decode `null` to their default value, so callers never deal with
//! `Option<String>` for a missing description.

pub mod paginated;
pub mod playlist;
pub mod tags;
pub mod track;
pub mod user;

pub use paginated::Paginated;
pub use playlist::Playlist;
pub use track::{Media, Protocol, Track, Transcoding};
pub use user::User;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Error;

/// The `kind` discriminator of a resolved object.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    User,
    Track,
    Playlist,
}

impl Kind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::User => "user",
            Kind::Track => "track",
            Kind::Playlist => "playlist",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolvable SoundCloud object.
pub trait Entity {
    /// The `kind` that the resolve endpoint reports for this type.
    const KIND: Kind;

    /// The `kind` that the upstream actually reported.
    fn kind(&self) -> &str;

    /// Normalizes identifiers and artwork in place.
    ///
    /// For playlists this is the lightweight variant that does not fetch
    /// missing tracks.
    fn fix(&mut self);

    /// Fails when the reported kind is not [`Entity::KIND`].
    ///
    /// # Errors
    ///
    /// Returns a [`KindMismatch`] error.
    fn check_kind(&self) -> Result<(), KindMismatch> {
        if self.kind() == Self::KIND.as_str() {
            Ok(())
        } else {
            Err(KindMismatch {
                expected: Self::KIND,
                actual: self.kind().to_owned(),
            })
        }
    }
}

/// A permalink resolved to a different kind of object than requested.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("entity of incorrect kind: expected {expected}, got \"{actual}\"")]
pub struct KindMismatch {
    pub expected: Kind,
    pub actual: String,
}

impl From<KindMismatch> for Error {
    fn from(e: KindMismatch) -> Self {
        Self::invalid_argument(e)
    }
}

/// Failures to turn a track into a playable URL.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum StreamError {
    /// The track offers no transcoding in the requested format.
    #[error("incompatible stream")]
    Incompatible,

    /// The transcoding endpoint answered without a URL.
    #[error("no url")]
    NoUrl,
}

impl From<StreamError> for Error {
    fn from(e: StreamError) -> Self {
        match e {
            StreamError::Incompatible => Self::unimplemented(e),
            StreamError::NoUrl => Self::not_found(e),
        }
    }
}

/// Response of a transcoding endpoint.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct Stream {
    #[serde(default)]
    pub url: Option<String>,
}

/// Strips any namespace prefix from an identifier, keeping the part after
/// the last colon.
///
/// ```rust
/// assert_eq!(strip_namespace("soundcloud:tracks:42"), "42");
/// assert_eq!(strip_namespace("42"), "42");
/// ```
#[must_use]
pub fn strip_namespace(id: &str) -> &str {
    id.rsplit(':').next().unwrap_or(id)
}

/// Rewrites the first `-large.` size suffix of an artwork URL to
/// `-t200x200.`.
#[must_use]
pub fn fix_artwork(url: &str) -> String {
    url.replacen("-large.", "-t200x200.", 1)
}

/// Normalizes an identifier that may come as a namespaced `urn` or as a
/// bare number.
pub(crate) fn fix_id(id: &mut String, numeric_id: u64) {
    if id.is_empty() {
        if numeric_id != 0 {
            *id = numeric_id.to_string();
        }
    } else {
        let stripped = strip_namespace(id);
        if stripped.len() != id.len() {
            *id = stripped.to_owned();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaces_are_stripped() {
        assert_eq!(strip_namespace("soundcloud:tracks:42"), "42");
        assert_eq!(strip_namespace("soundcloud:users:1234"), "1234");
    }

    #[test]
    fn stripping_is_idempotent() {
        let once = strip_namespace("soundcloud:tracks:42");
        assert_eq!(strip_namespace(once), once);
        assert_eq!(strip_namespace("42"), "42");
        assert_eq!(strip_namespace(""), "");
    }

    #[test]
    fn artwork_is_resized() {
        assert_eq!(
            fix_artwork("https://i1.sndcdn.com/artworks-000-large.jpg"),
            "https://i1.sndcdn.com/artworks-000-t200x200.jpg"
        );
    }

    #[test]
    fn artwork_rewrite_is_idempotent() {
        let url = "https://i1.sndcdn.com/artworks-000-original.png";
        assert_eq!(fix_artwork(url), url);

        let once = fix_artwork("https://i1.sndcdn.com/artwork-large.jpg");
        assert_eq!(fix_artwork(&once), once);
        assert_eq!(fix_artwork(""), "");
    }

    #[test]
    fn numeric_ids_are_converted() {
        let mut id = String::new();
        fix_id(&mut id, 42);
        assert_eq!(id, "42");

        let mut id = "soundcloud:tracks:7".to_owned();
        fix_id(&mut id, 7);
        assert_eq!(id, "7");
        fix_id(&mut id, 7);
        assert_eq!(id, "7");
    }

    #[test]
    fn stream_errors_map_to_kinds() {
        use crate::error::ErrorKind;

        assert_eq!(
            Error::from(StreamError::Incompatible).kind,
            ErrorKind::Unimplemented
        );
        assert_eq!(Error::from(StreamError::NoUrl).kind, ErrorKind::NotFound);
    }
}
