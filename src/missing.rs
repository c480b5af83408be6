//! Filling in stub tracks of playlists.
//!
//! Playlists embed only their first few tracks in full. The rest are stubs
//! with nothing but an id, which have to be fetched separately through the
//! batch tracks endpoint. One batch holds at most [`BATCH_LIMIT`] ids; stubs
//! beyond that are left in place and their ids are kept as a cursor in
//! [`Playlist::missing_tracks`], to be fetched on demand with
//! [`Gateway::next_missing_tracks`].
//!
//! # Cursor Format
//!
//! The cursor is a comma-separated list of bare track ids in playlist order,
//! like `"101,102,103"`. An empty cursor means nothing is missing.

use std::collections::HashMap;

use crate::{
    error::Result,
    gateway::Gateway,
    protocol::{Entity, Playlist, Track},
};

/// Maximum number of ids in one batch request.
pub const BATCH_LIMIT: usize = 50;

/// A stub track and where it sits in its playlist.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MissingTrack {
    pub id: String,
    pub index: usize,
}

/// Collects the stubs of `tracks` in order.
#[must_use]
pub fn collect(tracks: &[Track]) -> Vec<MissingTrack> {
    tracks
        .iter()
        .enumerate()
        .filter(|(_, track)| track.is_stub())
        .map(|(index, track)| MissingTrack {
            id: track.id.clone(),
            index,
        })
        .collect()
}

/// Serializes ids to a cursor.
pub fn join<'a>(ids: impl IntoIterator<Item = &'a str>) -> String {
    ids.into_iter().collect::<Vec<_>>().join(",")
}

/// Parses a cursor to ids, skipping empty entries.
#[must_use]
pub fn split(cursor: &str) -> Vec<&str> {
    cursor
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .collect()
}

/// Replaces stubs with the fetched tracks of the same id.
///
/// Stubs without a fetched counterpart stay in place. Returns the number of
/// replaced stubs.
pub fn splice(tracks: &mut [Track], missing: &[MissingTrack], fetched: Vec<Track>) -> usize {
    let by_id: HashMap<String, Track> = fetched
        .into_iter()
        .map(|track| (track.id.clone(), track))
        .collect();

    let mut replaced = 0;
    for stub in missing {
        // The same track may appear more than once in a playlist.
        if let (Some(slot), Some(track)) = (tracks.get_mut(stub.index), by_id.get(&stub.id)) {
            slot.clone_from(track);
            replaced += 1;
        }
    }

    replaced
}

impl Gateway {
    /// Fetches tracks by id in one batch request.
    ///
    /// Ids that the upstream does not know are silently absent from the
    /// result, and the order of the result is the upstream's. Does not make
    /// a request if `ids` is empty.
    ///
    /// # Errors
    ///
    /// Returns error if no client id can be obtained, or the request fails
    /// or does not answer `200 OK`.
    pub async fn tracks_by_ids(&self, ids: &[&str]) -> Result<Vec<Track>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let joined = join(ids.iter().copied());
        let url = self.endpoint("tracks", &[("ids", joined.as_str())]).await?;

        debug!("fetching {} tracks by id", ids.len());
        let mut tracks: Vec<Track> = self.http_client().get_json(&url, "tracks").await?;
        for track in &mut tracks {
            track.fix();
        }

        Ok(tracks)
    }

    /// Fills in the stub tracks of `playlist`, up to [`BATCH_LIMIT`] of them,
    /// and stores the ids of the remaining stubs in
    /// [`Playlist::missing_tracks`].
    ///
    /// Tracks must have been normalized with [`Playlist::fix_tracks`] first.
    ///
    /// # Errors
    ///
    /// See [`Gateway::tracks_by_ids`]. On error the playlist is unchanged.
    pub async fn reconcile(&self, playlist: &mut Playlist) -> Result<()> {
        if !playlist.has_stubs() {
            playlist.missing_tracks.clear();
            return Ok(());
        }

        let missing = collect(&playlist.tracks);

        let (batch, rest) = missing.split_at(missing.len().min(BATCH_LIMIT));
        let ids: Vec<&str> = batch.iter().map(|stub| stub.id.as_str()).collect();
        let fetched = self.tracks_by_ids(&ids).await?;

        let replaced = splice(&mut playlist.tracks, batch, fetched);
        if replaced < batch.len() {
            debug!(
                "playlist {}: {} of {} stubs unavailable",
                playlist.id,
                batch.len() - replaced,
                batch.len()
            );
        }

        playlist.missing_tracks = join(rest.iter().map(|stub| stub.id.as_str()));
        Ok(())
    }

    /// Fetches the next batch of tracks from a missing tracks cursor.
    ///
    /// Returns the fetched tracks and the cursor for the ones after them,
    /// which is empty when there are no more. An empty cursor makes no
    /// request.
    ///
    /// # Errors
    ///
    /// See [`Gateway::tracks_by_ids`].
    pub async fn next_missing_tracks(&self, cursor: &str) -> Result<(Vec<Track>, String)> {
        let ids = split(cursor);
        let (batch, rest) = ids.split_at(ids.len().min(BATCH_LIMIT));

        let tracks = self.tracks_by_ids(batch).await?;
        Ok((tracks, join(rest.iter().copied())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(id: &str) -> Track {
        let mut track = Track::stub(id);
        track.title = format!("Track {id}");
        track
    }

    #[test]
    fn collects_stubs_in_order() {
        let tracks = vec![full("1"), Track::stub("2"), full("3"), Track::stub("4")];
        assert_eq!(
            collect(&tracks),
            [
                MissingTrack {
                    id: "2".to_owned(),
                    index: 1
                },
                MissingTrack {
                    id: "4".to_owned(),
                    index: 3
                },
            ]
        );
        assert!(collect(&[full("1")]).is_empty());
    }

    #[test]
    fn cursor_round_trips_and_skips_blanks() {
        assert_eq!(join(["1", "2", "3"]), "1,2,3");
        assert_eq!(join(Vec::<&str>::new()), "");
        assert_eq!(split("1,2,3"), ["1", "2", "3"]);
        assert_eq!(split(" 1,,2, "), ["1", "2"]);
        assert!(split("").is_empty());
    }

    #[test]
    fn splice_fills_matching_stubs_only() {
        let mut tracks = vec![Track::stub("1"), full("2"), Track::stub("3")];
        let missing = collect(&tracks);

        let replaced = splice(&mut tracks, &missing, vec![full("3"), full("99")]);

        assert_eq!(replaced, 1);
        assert!(tracks[0].is_stub());
        assert_eq!(tracks[2].title, "Track 3");
    }

    #[test]
    fn splice_fills_repeated_tracks() {
        let mut tracks = vec![Track::stub("7"), full("2"), Track::stub("7")];
        let missing = collect(&tracks);

        assert_eq!(splice(&mut tracks, &missing, vec![full("7")]), 2);
        assert!(!tracks[0].is_stub());
        assert!(!tracks[2].is_stub());
    }

    #[test]
    fn overflow_ids_become_the_cursor() {
        let tracks: Vec<Track> = (0..120).map(|i| Track::stub(i.to_string())).collect();
        let missing = collect(&tracks);
        let (batch, rest) = missing.split_at(missing.len().min(BATCH_LIMIT));

        assert_eq!(batch.len(), 50);
        assert_eq!(rest.len(), 70);

        let cursor = join(rest.iter().map(|stub| stub.id.as_str()));
        assert!(cursor.starts_with("50,51,"));
        assert!(cursor.ends_with(",119"));
        assert_eq!(split(&cursor).len(), 70);
    }
}
