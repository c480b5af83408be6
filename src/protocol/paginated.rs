//! Cursor-paginated listings.
//!
//! # Wire Format
//!
//! ```json
//! {
//!     "collection": [...],
//!     "next_href": "https://api-v2.soundcloud.com/search/tracks?q=x&offset=20&limit=20"
//! }
//! ```
//!
//! The `next_href` cursor never carries a valid client id, so one is attached
//! on every continuation (see
//! [`Gateway::proceed`](crate::gateway::Gateway::proceed)).

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull};

/// One page of a listing, plus the cursor to the next page.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>", serialize = "T: Serialize"))]
pub struct Paginated<T> {
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default = "Vec::new")]
    pub collection: Vec<T>,

    /// Absent when the listing is exhausted.
    #[serde(default, rename(deserialize = "next_href"))]
    pub next: Option<String>,
}

impl<T> Paginated<T> {
    /// An empty page that will fetch `next` when proceeded.
    #[must_use]
    pub fn starting_at(next: impl Into<String>) -> Self {
        Self {
            collection: Vec::new(),
            next: Some(next.into()),
        }
    }

    /// Whether another page can be fetched.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.next.as_deref().is_some_and(|next| !next.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_or_empty_cursor_is_exhausted() {
        let page: Paginated<u32> =
            serde_json::from_str(r#"{"collection": [1, 2], "next_href": null}"#).unwrap();
        assert_eq!(page.collection, [1, 2]);
        assert!(!page.has_next());

        let page: Paginated<u32> =
            serde_json::from_str(r#"{"collection": [], "next_href": ""}"#).unwrap();
        assert!(!page.has_next());

        let page: Paginated<u32> = serde_json::from_str(r#"{"collection": null}"#).unwrap();
        assert!(page.collection.is_empty());
        assert!(!page.has_next());
    }

    #[test]
    fn cursor_allows_continuation() {
        let page: Paginated<u32> = serde_json::from_str(
            r#"{"collection": [], "next_href": "https://api/search?offset=20", "query_urn": "x"}"#,
        )
        .unwrap();
        assert!(page.has_next());
        assert!(Paginated::<u32>::starting_at("https://api/users/1/tracks").has_next());
    }
}
