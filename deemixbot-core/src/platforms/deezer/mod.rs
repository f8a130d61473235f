//! Deezer catalog lookups and the deemix downloader.

pub mod deemix;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use deemixbot_common::error::Error;
use deemixbot_common::models::{SearchedTrack, Track};
use deemixbot_common::traits::TrackResolver;

pub use deemix::DeemixFetcher;

pub const TRACK_SEARCH_ENDPOINT: &str = "https://api.deezer.com/search";
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Title shown for tracks requested by link, before deemix tells us more.
pub const LINKED_TRACK_TITLE: &str = "your requested song";

#[derive(Debug, Deserialize)]
struct TrackSearchResponse {
    #[serde(default)]
    data: Vec<TrackInfoResponse>,
}

#[derive(Debug, Deserialize)]
struct TrackInfoResponse {
    title: String,
    link: String,
    #[serde(default)]
    duration: u64,
    artist: NamedArtist,
    #[serde(default)]
    album: Option<AlbumInfo>,
}

#[derive(Debug, Deserialize)]
struct NamedArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AlbumInfo {
    title: String,
}

impl TrackInfoResponse {
    fn into_searched(self) -> SearchedTrack {
        SearchedTrack {
            track: Track::new(self.title, self.artist.name, self.link),
            album: self.album.map(|a| a.title).unwrap_or_default(),
            duration: Duration::from_secs(self.duration),
        }
    }
}

/// Parses a `/search` response body, keeping at most `limit` hits.
pub fn parse_search_response(body: &str, limit: usize) -> Result<Vec<SearchedTrack>, Error> {
    let response: TrackSearchResponse = serde_json::from_str(body)?;
    Ok(response
        .data
        .into_iter()
        .take(limit)
        .map(TrackInfoResponse::into_searched)
        .collect())
}

/// True for absolute http(s) URLs.
pub fn is_url(text: &str) -> bool {
    Url::parse(text)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

/// Resolves links as-is and keywords through the Deezer search API.
pub struct DeezerResolver {
    client: ReqwestClient,
    endpoint: String,
}

impl DeezerResolver {
    pub fn new() -> Result<Self, Error> {
        Self::with_endpoint(TRACK_SEARCH_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: &str) -> Result<Self, Error> {
        let client = ReqwestClient::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl TrackResolver for DeezerResolver {
    async fn resolve(&self, text: &str) -> Result<Track, Error> {
        let text = text.trim();
        if is_url(text) {
            return Ok(Track::new(LINKED_TRACK_TITLE, "", text));
        }
        self.search(text, 1)
            .await?
            .into_iter()
            .next()
            .map(|hit| hit.track)
            .ok_or_else(|| Error::NotFound(format!("no track matches '{text}'")))
    }

    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<SearchedTrack>, Error> {
        debug!("Deezer search for '{keyword}'");
        let body = self
            .client
            .get(&self.endpoint)
            .query(&[("q", keyword)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_search_response(&body, limit)
    }
}
