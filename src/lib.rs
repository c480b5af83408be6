//! Cached, rate-limited access to the SoundCloud API.
//!
//! `soundgate` resolves SoundCloud permalinks to users, tracks and
//! playlists, pages through searches and listings, and turns tracks into
//! playable stream URLs. It is meant to sit behind a front-end that serves
//! many requests for the same popular content:
//! * resolved entities are cached per kind with a time-to-live
//!   ([`cache`])
//! * the `client_id` that authorizes every call is scraped from the web
//!   front-end and refreshed when it changes ([`token`])
//! * timed out requests are retried, and requests are rate limited
//!   ([`http`])
//! * stub tracks of playlists are fetched in batches ([`missing`])
//!
//! Start with [`gateway::Gateway`].
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

#[macro_use]
extern crate log;

pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod missing;
pub mod protocol;
pub mod token;
