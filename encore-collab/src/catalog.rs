use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Config;

const ITUNES_ENDPOINT: &str = "https://itunes.apple.com/search";

#[derive(Debug, Error)]
pub enum CatalogError {
    /// The provider could not be reached or answered with an error
    #[error("Catalog provider is unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to parse catalog response: {0}")]
    ParseError(String),
}

/// A track as returned by a catalog search. Its fields are copied onto a
/// song request verbatim when an attendee submits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackCandidate {
    /// The provider's id for the track
    pub track_id: String,
    pub title: String,
    pub thumbnail: String,
    pub url: String,
}

/// Represents a provider that can turn a free-text query into an ordered
/// list of track candidates.
#[async_trait]
pub trait CatalogSearch: Send + Sync + 'static {
    async fn search(&self, query: &str, limit: usize)
        -> Result<Vec<TrackCandidate>, CatalogError>;
}

/// A catalog implementation backed by the iTunes Search API.
///
/// No credentials required, which suits a casual venue setup.
pub struct ItunesCatalog {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<ItunesTrack>,
}

/// Fields are optional because the API mixes albums and artists into
/// results. Entries missing track data are dropped.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItunesTrack {
    track_id: Option<i64>,
    track_name: Option<String>,
    artwork_url_100: Option<String>,
    track_view_url: Option<String>,
}

impl ItunesCatalog {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.catalog_timeout)
            .build()
            .expect("reqwest client is built");

        Self {
            client,
            endpoint: ITUNES_ENDPOINT.to_string(),
        }
    }
}

#[async_trait]
impl CatalogSearch for ItunesCatalog {
    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<TrackCandidate>, CatalogError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("term", query),
                ("media", "music"),
                ("entity", "song"),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::ParseError(e.to_string()))?;

        Ok(body
            .results
            .into_iter()
            .filter_map(ItunesTrack::into_candidate)
            .collect())
    }
}

impl ItunesTrack {
    fn into_candidate(self) -> Option<TrackCandidate> {
        Some(TrackCandidate {
            track_id: self.track_id?.to_string(),
            title: self.track_name?,
            thumbnail: self.artwork_url_100.unwrap_or_default(),
            url: self.track_view_url?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tracks_are_decoded_and_non_songs_dropped() {
        let payload = r#"{
            "resultCount": 3,
            "results": [
                {
                    "trackId": 1440857781,
                    "trackName": "Harvest Moon",
                    "artworkUrl100": "https://example.com/art.jpg",
                    "trackViewUrl": "https://example.com/track"
                },
                {
                    "collectionName": "An album without track data"
                },
                {
                    "trackId": 1440857782,
                    "trackName": "Heart of Gold",
                    "trackViewUrl": "https://example.com/track2"
                }
            ]
        }"#;

        let response: SearchResponse = serde_json::from_str(payload).unwrap();
        let candidates: Vec<_> = response
            .results
            .into_iter()
            .filter_map(ItunesTrack::into_candidate)
            .collect();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].track_id, "1440857781");
        assert_eq!(candidates[0].title, "Harvest Moon");
        // Missing artwork falls back to an empty thumbnail
        assert_eq!(candidates[1].thumbnail, "");
    }
}
