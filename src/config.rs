//! Runtime configuration.
//!
//! All fields have production defaults, so an empty configuration file (or
//! none at all) is valid. Durations are given in seconds:
//!
//! ```toml
//! user_agent = "Mozilla/5.0 (X11; Linux x86_64; rv:131.0) Gecko/20100101 Firefox/131.0"
//! api_url = "https://api-v2.soundcloud.com/"
//! site_url = "https://soundcloud.com/"
//! script_hosts = ["a-v2.sndcdn.com"]
//! client_id_ttl = 1800
//! user_ttl = 1200
//! track_ttl = 1200
//! playlist_ttl = 1200
//! ```

use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use url::Url;

use crate::error::{Error, Result};

#[serde_as]
#[derive(Clone, Debug, Hash, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Sent on every request, including the front-end scrapes.
    pub user_agent: String,

    /// Base URL of the JSON API.
    pub api_url: Url,

    /// Base URL of the web front-end: the client id is scraped from here,
    /// and permalinks are resolved relative to it.
    pub site_url: Url,

    /// Hosts that front-end scripts may be fetched from, besides the host of
    /// `site_url`. Scripts on any other host are never fetched.
    pub script_hosts: Vec<String>,

    /// How long a scraped client id is trusted before the front-end version
    /// is checked again.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub client_id_ttl: Duration,

    #[serde_as(as = "DurationSeconds<u64>")]
    pub user_ttl: Duration,

    #[serde_as(as = "DurationSeconds<u64>")]
    pub track_ttl: Duration,

    #[serde_as(as = "DurationSeconds<u64>")]
    pub playlist_ttl: Duration,
}

impl Config {
    /// Front-end scrapes are served differently to unknown clients, so
    /// pretend to be a desktop browser.
    pub const DEFAULT_USER_AGENT: &'static str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:131.0) Gecko/20100101 Firefox/131.0";

    const DEFAULT_API_URL: &'static str = "https://api-v2.soundcloud.com/";
    const DEFAULT_SITE_URL: &'static str = "https://soundcloud.com/";
    const DEFAULT_SCRIPT_HOST: &'static str = "a-v2.sndcdn.com";

    /// Configuration files are tiny; anything larger is a mistake.
    const MAX_FILE_SIZE: u64 = 16 * 1024;

    /// Loads a TOML configuration file.
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is unreasonably large, is
    /// not valid TOML, or contains invalid values.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Prevent out-of-memory condition: the configuration should be small.
        let file_size = fs::metadata(path)?.len();
        if file_size > Self::MAX_FILE_SIZE {
            return Err(Error::out_of_range(format!(
                "{} is too large ({file_size} bytes)",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        trace!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Checks values that deserialize fine but cannot work.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when the user agent is empty or contains
    /// control characters, or when a base URL cannot carry paths.
    pub fn validate(&self) -> Result<()> {
        if self.user_agent.is_empty() || self.user_agent.contains(char::is_control) {
            return Err(Error::invalid_argument(format!(
                "user agent invalid (\"{}\")",
                self.user_agent.escape_debug()
            )));
        }

        for url in [&self.api_url, &self.site_url] {
            if url.cannot_be_a_base() {
                return Err(Error::invalid_argument(format!(
                    "{url} cannot be used as a base url"
                )));
            }
        }

        Ok(())
    }

    /// Builds the configuration for a given API and front-end host, keeping
    /// all other defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if either URL does not parse.
    pub fn with_hosts(api_url: &str, site_url: &str) -> Result<Self> {
        Ok(Self {
            api_url: Url::parse(api_url)?,
            site_url: Url::parse(site_url)?,
            ..Self::default()
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: Self::DEFAULT_USER_AGENT.to_owned(),
            // Both are compile-time constants covered by tests.
            api_url: Url::parse(Self::DEFAULT_API_URL).expect("invalid default api url"),
            site_url: Url::parse(Self::DEFAULT_SITE_URL).expect("invalid default site url"),
            script_hosts: vec![Self::DEFAULT_SCRIPT_HOST.to_owned()],
            client_id_ttl: Duration::from_secs(30 * 60),
            user_ttl: Duration::from_secs(20 * 60),
            track_ttl: Duration::from_secs(20 * 60),
            playlist_ttl: Duration::from_secs(20 * 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.api_url.host_str(), Some("api-v2.soundcloud.com"));
        assert_eq!(config.client_id_ttl, Duration::from_secs(1800));
        assert_eq!(config.script_hosts, ["a-v2.sndcdn.com"]);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str("track_ttl = 60\nsite_url = \"http://localhost:8080/\"")
            .expect("valid toml");
        assert_eq!(config.track_ttl, Duration::from_secs(60));
        assert_eq!(config.user_ttl, Duration::from_secs(1200));
        assert_eq!(config.site_url.as_str(), "http://localhost:8080/");
        assert_eq!(config.user_agent, Config::DEFAULT_USER_AGENT);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(toml::from_str::<Config>("client_ttl = 5").is_err());
    }

    #[test]
    fn control_characters_in_user_agent_are_rejected() {
        let config = Config {
            user_agent: "agent\r\nX-Injected: yes".to_owned(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
