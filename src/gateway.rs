//! Cached access to the SoundCloud API.
//!
//! The [`Gateway`] is the entry point of this crate. It resolves permalinks
//! to users, tracks and playlists, pages through listings and searches, and
//! turns tracks into playable stream URLs.
//!
//! # Caching
//!
//! Resolved entities are cached by permalink, each kind in its own
//! [`TtlCache`] with its own time-to-live. Listings, searches and streams are
//! never cached. Failed lookups, including permalinks that resolve to the
//! wrong kind of object, leave the caches untouched.
//!
//! # Authorization
//!
//! Every API call carries a `client_id` from the [`TokenProvider`]. By
//! default that is a [`Scraper`], but any provider can be injected with
//! [`Gateway::with_token_provider`].
//!
//! # Example
//!
//! ```rust
//! use soundgate::{config::Config, gateway::Gateway};
//!
//! let gateway = Gateway::new(&Config::default())?;
//! let track = gateway.track("artist/track").await?;
//! let url = gateway.stream_url(&track).await?;
//! ```

use std::{fmt, sync::Arc};

use serde::de::DeserializeOwned;
use url::Url;

use crate::{
    cache::TtlCache,
    config::Config,
    error::{Error, Result},
    http::Client as HttpClient,
    protocol::{Entity, Paginated, Playlist, Protocol, Stream, StreamError, Track, User},
    token::{Scraper, TokenProvider},
};

/// Client for the SoundCloud API with per-kind entity caches.
pub struct Gateway {
    http_client: Arc<HttpClient>,
    token_provider: Arc<dyn TokenProvider>,

    api_url: Url,
    site_url: Url,

    users: TtlCache<String, User>,
    tracks: TtlCache<String, Track>,
    playlists: TtlCache<String, Playlist>,
}

impl Gateway {
    /// Creates a gateway that scrapes its client id from the web front-end.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built from `config`.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime, as the caches start
    /// their sweepers right away.
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = Arc::new(HttpClient::new(config)?);
        let scraper = Scraper::new(config, Arc::clone(&http_client))?;
        Ok(Self::with_parts(config, http_client, Arc::new(scraper)))
    }

    /// Creates a gateway that takes its client id from `token_provider`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built from `config`.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn with_token_provider(
        config: &Config,
        token_provider: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        let http_client = Arc::new(HttpClient::new(config)?);
        Ok(Self::with_parts(config, http_client, token_provider))
    }

    fn with_parts(
        config: &Config,
        http_client: Arc<HttpClient>,
        token_provider: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            http_client,
            token_provider,
            api_url: config.api_url.clone(),
            site_url: config.site_url.clone(),
            users: TtlCache::new(config.user_ttl),
            tracks: TtlCache::new(config.track_ttl),
            playlists: TtlCache::new(config.playlist_ttl),
        }
    }

    pub(crate) fn http_client(&self) -> &HttpClient {
        &self.http_client
    }

    /// Builds an authorized URL for an API endpoint: `path` relative to the
    /// API host, with `query` and a fresh client id.
    pub(crate) async fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.api_url.join(path)?;
        url.query_pairs_mut().extend_pairs(query);
        self.authorize(url).await
    }

    /// Sets the client id of `url`, replacing any that it already carries.
    async fn authorize(&self, url: Url) -> Result<Url> {
        let client_id = self.token_provider.current_token().await?;
        Ok(with_client_id(url, &client_id))
    }

    /// Resolves a permalink to an entity of kind `T`, bypassing the caches.
    ///
    /// `permalink` is relative to the site, like `artist` or
    /// `artist/sets/album`. The entity is normalized with [`Entity::fix`].
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// * No client id can be obtained
    /// * The request fails or does not answer `200 OK`
    /// * The permalink resolves to another kind of object (a
    ///   [`KindMismatch`](crate::protocol::KindMismatch))
    pub async fn resolve<T>(&self, permalink: &str) -> Result<T>
    where
        T: DeserializeOwned + Entity,
    {
        debug!("resolving {} {permalink}", T::KIND);

        let target = self.site_url.join(permalink.trim_start_matches('/'))?;
        let url = self.endpoint("resolve", &[("url", target.as_str())]).await?;

        let mut entity: T = self.http_client.get_json(&url, "resolve").await?;
        entity.check_kind()?;
        entity.fix();

        Ok(entity)
    }

    /// Returns the user at `permalink`.
    ///
    /// # Errors
    ///
    /// See [`Gateway::resolve`].
    pub async fn user(&self, permalink: &str) -> Result<User> {
        self.users
            .get_or_try_insert_with(permalink, || self.resolve(permalink))
            .await
    }

    /// Returns the track at `permalink`.
    ///
    /// # Errors
    ///
    /// See [`Gateway::resolve`].
    pub async fn track(&self, permalink: &str) -> Result<Track> {
        self.tracks
            .get_or_try_insert_with(permalink, || self.resolve(permalink))
            .await
    }

    /// Returns the playlist at `permalink`, with as many of its stub tracks
    /// filled in as one batch allows.
    ///
    /// # Errors
    ///
    /// See [`Gateway::resolve`]. Also fails if the stub tracks cannot be
    /// fetched, in which case nothing is cached.
    pub async fn playlist(&self, permalink: &str) -> Result<Playlist> {
        self.playlists
            .get_or_try_insert_with(permalink, || async {
                let mut playlist = self.resolve(permalink).await?;
                self.refresh_playlist(&mut playlist).await?;
                Ok::<_, Error>(playlist)
            })
            .await
    }

    /// Normalizes a playlist including its tracks, and fills in stub tracks.
    ///
    /// # Errors
    ///
    /// Returns error if the stub tracks cannot be fetched. The playlist is
    /// then normalized, but its stubs are left as they were.
    pub async fn refresh_playlist(&self, playlist: &mut Playlist) -> Result<()> {
        playlist.fix_tracks();
        self.reconcile(playlist).await?;
        playlist.fix();
        Ok(())
    }

    /// Fetches the next page of a listing into `page`, replacing its
    /// collection and cursor.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// * `page` has no next page (`OutOfRange`)
    /// * No client id can be obtained
    /// * The request fails or does not answer `200 OK`
    pub async fn proceed<T>(&self, page: &mut Paginated<T>) -> Result<()>
    where
        T: DeserializeOwned + Entity,
    {
        let next = page
            .next
            .as_deref()
            .filter(|next| !next.is_empty())
            .ok_or_else(|| Error::out_of_range("no next page"))?;

        let url = self.authorize(self.api_url.join(next)?).await?;
        let mut fetched: Paginated<T> = self
            .http_client
            .get_json(&url, "paginated.proceed")
            .await?;

        for item in &mut fetched.collection {
            item.fix();
        }
        trace!(
            "fetched {} {} entities, more: {}",
            fetched.collection.len(),
            T::KIND,
            fetched.has_next()
        );

        *page = fetched;
        Ok(())
    }

    /// Returns the first page of tracks uploaded by `user`.
    ///
    /// `args` is a query string such as `?limit=20`.
    ///
    /// # Errors
    ///
    /// See [`Gateway::proceed`].
    pub async fn user_tracks(&self, user: &User, args: &str) -> Result<Paginated<Track>> {
        self.first_page(&format!("users/{}/tracks", user.id), args)
            .await
    }

    /// Returns the first page of tracks matching a search.
    ///
    /// `args` is a query string such as `?q=ambient&limit=20`.
    ///
    /// # Errors
    ///
    /// See [`Gateway::proceed`].
    pub async fn search_tracks(&self, args: &str) -> Result<Paginated<Track>> {
        self.first_page("search/tracks", args).await
    }

    /// Returns the first page of users matching a search.
    ///
    /// # Errors
    ///
    /// See [`Gateway::proceed`].
    pub async fn search_users(&self, args: &str) -> Result<Paginated<User>> {
        self.first_page("search/users", args).await
    }

    /// Returns the first page of playlists matching a search.
    ///
    /// The playlists are only lightly normalized: their tracks are left as
    /// returned, stubs included.
    ///
    /// # Errors
    ///
    /// See [`Gateway::proceed`].
    pub async fn search_playlists(&self, args: &str) -> Result<Paginated<Playlist>> {
        self.first_page("search/playlists", args).await
    }

    async fn first_page<T>(&self, path: &str, args: &str) -> Result<Paginated<T>>
    where
        T: DeserializeOwned + Entity,
    {
        let mut url = self.api_url.join(path)?;
        let args = args.strip_prefix('?').unwrap_or(args);
        if !args.is_empty() {
            url.set_query(Some(args));
        }

        let mut page = Paginated::starting_at(url);
        self.proceed(&mut page).await?;
        Ok(page)
    }

    /// Returns a playable URL for `track`, preferring a progressive MP3
    /// download over HLS.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// * The track has no full-length MP3 transcoding
    ///   ([`StreamError::Incompatible`])
    /// * The transcoding endpoint fails or does not answer `200 OK`
    /// * The answer carries no URL ([`StreamError::NoUrl`])
    pub async fn stream_url(&self, track: &Track) -> Result<String> {
        let transcoding = track
            .media
            .select_compatible()
            .ok_or(StreamError::Incompatible)?;
        self.stream(track, &transcoding.url).await
    }

    /// Returns a playable URL for `track` using `protocol` only.
    ///
    /// # Errors
    ///
    /// See [`Gateway::stream_url`].
    pub async fn stream_url_for(&self, track: &Track, protocol: Protocol) -> Result<String> {
        let transcoding = track
            .media
            .select(protocol)
            .ok_or(StreamError::Incompatible)?;
        self.stream(track, &transcoding.url).await
    }

    async fn stream(&self, track: &Track, transcoding_url: &str) -> Result<String> {
        let mut url = self.authorize(self.api_url.join(transcoding_url)?).await?;
        url.query_pairs_mut()
            .append_pair("track_authorization", &track.track_authorization);

        let stream: Stream = self.http_client.get_json(&url, "stream").await?;
        stream
            .url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| StreamError::NoUrl.into())
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("api_url", &self.api_url.as_str())
            .field("site_url", &self.site_url.as_str())
            .field("users", &self.users.len())
            .field("tracks", &self.tracks.len())
            .field("playlists", &self.playlists.len())
            .finish_non_exhaustive()
    }
}

/// Sets the `client_id` query parameter, dropping any previous ones and
/// keeping all other parameters in order.
fn with_client_id(mut url: Url, client_id: &str) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "client_id")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("client_id", client_id);
    url
}
