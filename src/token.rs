//! Client id discovery.
//!
//! Every API call needs a `client_id`, which SoundCloud does not hand out
//! through any API. The web front-end embeds one in its script bundles, so
//! the [`Scraper`] finds it there:
//!
//! 1. Fetch a page of the front-end (`/h`, which is a cheap 404 page).
//! 2. Read the front-end version from an inline `<script>`.
//! 3. If the version did not change, the cached client id is still good.
//! 4. Otherwise fetch the bundled scripts one by one until one of them
//!    contains a client id. Only scripts on the front-end host or on one of
//!    the configured script hosts are fetched.
//!
//! The client id is then trusted for the configured time-to-live before the
//! version is checked again.
//!
//! # Concurrency
//!
//! The cached state is replaced as a whole under a lock, so readers never
//! see a client id paired with the wrong version. Refreshes themselves are
//! not mutually excluded: callers that find the client id expired at the
//! same time each run the discovery, and the last one to finish wins.

use std::{
    sync::{Arc, LazyLock, PoisonError, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use regex_lite::Regex;
use thiserror::Error;
use tokio::time::Instant;
use url::Url;
use veil::Redact;

use crate::{
    config::Config,
    error::{Error, Result},
    http::Client as HttpClient,
};

/// Supplies the client id that authorizes API calls.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a client id that is believed to be valid.
    async fn current_token(&self) -> Result<String>;
}

/// Failures to discover a client id. Each one means that the front-end
/// changed in a way the scraper does not understand.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum ScrapeError {
    #[error("version not found")]
    VersionNotFound,

    #[error("script not found")]
    ScriptNotFound,

    #[error("client id not found")]
    ClientIdNotFound,
}

impl From<ScrapeError> for Error {
    fn from(e: ScrapeError) -> Self {
        Self::not_found(e)
    }
}

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^<script>window\.__sc_version="([0-9]{10})"</script>$"#)
        .expect("invalid version pattern")
});

static SCRIPT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^<script crossorigin src="(https?://[^"]+\.js)"></script>$"#)
        .expect("invalid script pattern")
});

static CLIENT_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"client_id[=:]"?([A-Za-z0-9]{32})""#).expect("invalid client id pattern")
});

/// Extracts the front-end version from a page.
#[must_use]
pub fn extract_version(page: &str) -> Option<&str> {
    VERSION_PATTERN
        .captures(page)
        .and_then(|captures| captures.get(1))
        .map(|version| version.as_str())
}

/// Extracts the URLs of the bundled scripts from a page, in page order.
#[must_use]
pub fn extract_scripts(page: &str) -> Vec<&str> {
    SCRIPT_PATTERN
        .captures_iter(page)
        .filter_map(|captures| captures.get(1))
        .map(|script| script.as_str())
        .collect()
}

/// Extracts the first client id from a script.
#[must_use]
pub fn extract_client_id(script: &str) -> Option<&str> {
    CLIENT_ID_PATTERN
        .captures(script)
        .and_then(|captures| captures.get(1))
        .map(|client_id| client_id.as_str())
}

/// Whether `url` is served by one of `hosts`. Hosts compare without regard
/// to case.
#[must_use]
pub fn is_trusted_host(url: &Url, hosts: &[String]) -> bool {
    url.host_str()
        .is_some_and(|host| hosts.iter().any(|trusted| trusted.eq_ignore_ascii_case(host)))
}

/// The discovered client id and when to look again.
#[derive(Clone, Default, Redact)]
struct State {
    #[redact]
    client_id: String,
    version: String,
    next_check: Option<Instant>,
}

impl State {
    fn is_fresh(&self, now: Instant) -> bool {
        self.next_check.is_some_and(|next_check| now < next_check)
    }
}

/// Scrapes the client id from the SoundCloud web front-end.
#[derive(Debug)]
pub struct Scraper {
    http_client: Arc<HttpClient>,
    probe_url: Url,
    script_hosts: Vec<String>,
    ttl: Duration,
    state: RwLock<State>,
}

impl Scraper {
    /// The front-end page to probe. Its 404 page is small, but still carries
    /// the version and all script tags.
    const PROBE_PATH: &'static str = "h";

    /// Creates a scraper that probes `config.site_url` and trusts a client id
    /// for `config.client_id_ttl`.
    ///
    /// Scripts are fetched from the host of `config.site_url` and from
    /// `config.script_hosts`.
    ///
    /// # Errors
    ///
    /// Returns an error if the probe URL cannot be built.
    pub fn new(config: &Config, http_client: Arc<HttpClient>) -> Result<Self> {
        let mut script_hosts = config.script_hosts.clone();
        script_hosts.extend(config.site_url.host_str().map(str::to_owned));

        Ok(Self {
            http_client,
            probe_url: config.site_url.join(Self::PROBE_PATH)?,
            script_hosts,
            ttl: config.client_id_ttl,
            state: RwLock::new(State::default()),
        })
    }

    fn state(&self) -> State {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Moves the next check of the cached client id forward.
    fn extend(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.next_check = Some(Instant::now() + self.ttl);
    }

    /// Replaces the cached client id and version as one.
    fn replace(&self, client_id: &str, version: &str) {
        let state = State {
            client_id: client_id.to_owned(),
            version: version.to_owned(),
            next_check: Some(Instant::now() + self.ttl),
        };
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Parses the script URLs of a page, keeping those on a trusted host.
    fn trusted_scripts(&self, scripts: &[&str]) -> Vec<Url> {
        scripts
            .iter()
            .filter_map(|script| match Url::parse(script) {
                Ok(url) if is_trusted_host(&url, &self.script_hosts) => Some(url),
                Ok(url) => {
                    debug!("skipping script on untrusted host {:?}", url.host_str());
                    None
                }
                Err(e) => {
                    debug!("skipping script: {e}");
                    None
                }
            })
            .collect()
    }

    /// Fetches scripts in order until one contains a client id.
    ///
    /// Scripts that cannot be fetched are skipped.
    async fn find_client_id(&self, scripts: &[Url]) -> Option<String> {
        for (i, url) in scripts.iter().enumerate() {
            match self.http_client.get_text(url).await {
                Ok((status, body)) if status.is_success() => {
                    if let Some(client_id) = extract_client_id(&body) {
                        debug!("found client id in script {}/{}", i + 1, scripts.len());
                        return Some(client_id.to_owned());
                    }
                }
                Ok((status, _)) => {
                    warn!("script {}/{} returned {status}", i + 1, scripts.len());
                }
                Err(e) => {
                    warn!("script {}/{} failed: {e}", i + 1, scripts.len());
                }
            }
        }

        None
    }
}

#[async_trait]
impl TokenProvider for Scraper {
    async fn current_token(&self) -> Result<String> {
        let cached = self.state();
        if cached.is_fresh(Instant::now()) {
            return Ok(cached.client_id);
        }

        // The probe page is a 404, so its status is meaningless.
        let (_, page) = self.http_client.get_text(&self.probe_url).await?;
        let version = extract_version(&page).ok_or(ScrapeError::VersionNotFound)?;

        if !cached.client_id.is_empty() && version == cached.version {
            trace!("front-end version {version} unchanged");
            self.extend();
            return Ok(cached.client_id);
        }

        let scripts = self.trusted_scripts(&extract_scripts(&page));
        if scripts.is_empty() {
            return Err(ScrapeError::ScriptNotFound.into());
        }

        debug!(
            "front-end version {version}, searching {} scripts for a client id",
            scripts.len()
        );
        let client_id = self
            .find_client_id(&scripts)
            .await
            .ok_or(ScrapeError::ClientIdNotFound)?;

        self.replace(&client_id, version);
        info!("refreshed client id for front-end version {version}");

        Ok(client_id)
    }
}
