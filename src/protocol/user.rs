//! User profiles.
//!
//! # Wire Format
//!
//! ```json
//! {
//!     "kind": "user",
//!     "id": 1234,
//!     "urn": "soundcloud:users:1234",
//!     "username": "Artist",
//!     "permalink": "artist",
//!     "verified": true,
//!     "avatar_url": "https://i1.sndcdn.com/avatars-000-large.jpg",
//!     "description": null,
//!     "followers_count": 10,
//!     "followings_count": 2,
//!     "track_count": 5,
//!     "playlist_count": 1,
//!     "created_at": "2015-01-01T00:00:00Z",
//!     "last_modified": "2024-01-01T00:00:00Z"
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull};

use super::{fix_artwork, fix_id, Entity, Kind};

#[serde_as]
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct User {
    /// Bare identifier, taken from `urn` and falling back to the numeric id.
    #[serde_as(as = "DefaultOnNull")]
    #[serde(rename(deserialize = "urn"))]
    pub id: String,

    #[serde(rename(deserialize = "id"), skip_serializing)]
    #[serde_as(as = "DefaultOnNull")]
    numeric_id: u64,

    #[serde_as(as = "DefaultOnNull")]
    pub username: String,

    #[serde_as(as = "DefaultOnNull")]
    pub permalink: String,

    #[serde_as(as = "DefaultOnNull")]
    pub verified: bool,

    #[serde_as(as = "DefaultOnNull")]
    pub avatar_url: String,

    #[serde_as(as = "DefaultOnNull")]
    pub description: String,

    #[serde_as(as = "DefaultOnNull")]
    pub followers_count: u64,

    #[serde_as(as = "DefaultOnNull")]
    pub followings_count: u64,

    #[serde_as(as = "DefaultOnNull")]
    pub track_count: u64,

    #[serde_as(as = "DefaultOnNull")]
    pub playlist_count: u64,

    #[serde_as(as = "DefaultOnNull")]
    pub created_at: String,

    #[serde_as(as = "DefaultOnNull")]
    pub last_modified: String,

    #[serde_as(as = "DefaultOnNull")]
    pub kind: String,
}

impl Entity for User {
    const KIND: Kind = Kind::User;

    fn kind(&self) -> &str {
        &self.kind
    }

    fn fix(&mut self) {
        self.avatar_url = fix_artwork(&self.avatar_url);
        fix_id(&mut self.id, self.numeric_id);
    }
}

impl User {
    /// The username, marked when the account is verified.
    #[must_use]
    pub fn format_username(&self) -> String {
        if self.verified {
            format!("{} ☑️", self.username)
        } else {
            self.username.clone()
        }
    }

    /// A human-readable summary: the profile description followed by
    /// follower and upload statistics.
    #[must_use]
    pub fn format_description(&self) -> String {
        let mut desc = self.description.clone();
        if !desc.is_empty() {
            desc.push_str("\n\n");
        }

        desc.push_str(&format!(
            "{} followers | {} following\n{} tracks | {} playlists\nCreated: {}\nLast modified: {}",
            self.followers_count,
            self.followings_count,
            self.track_count,
            self.playlist_count,
            self.created_at,
            self.last_modified,
        ));

        desc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: &str = r#"{
        "kind": "user",
        "id": 1234,
        "urn": "soundcloud:users:1234",
        "username": "Artist",
        "verified": true,
        "avatar_url": "https://i1.sndcdn.com/avatars-000-large.jpg",
        "description": null,
        "followers_count": 10,
        "followings_count": 2,
        "track_count": 5,
        "playlist_count": 1,
        "created_at": "2015-01-01T00:00:00Z",
        "last_modified": "2024-01-01T00:00:00Z",
        "badges": {"pro": false}
    }"#;

    #[test]
    fn decodes_and_fixes() {
        let mut user: User = serde_json::from_str(JSON).unwrap();
        assert!(user.check_kind().is_ok());
        assert_eq!(user.description, "");

        user.fix();
        assert_eq!(user.id, "1234");
        assert_eq!(
            user.avatar_url,
            "https://i1.sndcdn.com/avatars-000-t200x200.jpg"
        );

        let fixed = user.clone();
        user.fix();
        assert_eq!(user, fixed);
    }

    #[test]
    fn falls_back_to_numeric_id() {
        let mut user: User = serde_json::from_str(r#"{"kind": "user", "id": 99}"#).unwrap();
        user.fix();
        assert_eq!(user.id, "99");
    }

    #[test]
    fn formats_username_and_description() {
        let user: User = serde_json::from_str(JSON).unwrap();
        assert_eq!(user.format_username(), "Artist ☑️");
        assert_eq!(
            user.format_description(),
            "10 followers | 2 following\n5 tracks | 1 playlists\n\
             Created: 2015-01-01T00:00:00Z\nLast modified: 2024-01-01T00:00:00Z"
        );

        let user = User {
            description: "Hi".to_owned(),
            ..User::default()
        };
        assert!(user.format_description().starts_with("Hi\n\n0 followers"));
        assert_eq!(user.format_username(), "");
    }
}
