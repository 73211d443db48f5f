//! Search Service — resolves a free-text query into one track.

use async_trait::async_trait;
use serde::Deserialize;
use tapedeck_proto::config::SearchConfig;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("search service returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("could not decode search response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// First result of a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub track_name: String,
    pub artist_name: String,
    /// Artwork at the service's thumbnail resolution.
    pub artwork_url: Option<String>,
    pub preview_url: Option<String>,
}

impl SearchHit {
    /// `"<track> - <artist>"`, or just the track when the artist is unknown.
    pub fn title(&self) -> String {
        if self.artist_name.is_empty() {
            self.track_name.clone()
        } else {
            format!("{} - {}", self.track_name, self.artist_name)
        }
    }

    pub fn cover_url(&self) -> Option<String> {
        self.artwork_url.as_deref().map(upgrade_artwork)
    }
}

/// Swap the thumbnail resolution token for the large one.
pub fn upgrade_artwork(url: &str) -> String {
    url.replace("100x100", "600x600")
}

#[async_trait]
pub trait SearchService: Send + Sync + 'static {
    /// Look `term` up, returning the first hit if there is one.
    async fn search(&self, term: &str) -> Result<Option<SearchHit>, SearchError>;
}

// ── iTunes ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ItunesResponse {
    #[serde(default)]
    results: Vec<ItunesTrack>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItunesTrack {
    #[serde(default)]
    track_name: String,
    #[serde(default)]
    artist_name: String,
    #[serde(rename = "artworkUrl100")]
    artwork_url: Option<String>,
    preview_url: Option<String>,
}

/// Unauthenticated iTunes Search API client.
#[derive(Debug, Clone)]
pub struct ItunesSearch {
    client: reqwest::Client,
    endpoint: String,
}

impl ItunesSearch {
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    pub fn search_url(&self, term: &str) -> String {
        format!(
            "{}?term={}&media=music&entity=song&limit=1",
            self.endpoint,
            urlencoding::encode(term)
        )
    }
}

/// Decode an iTunes response body into its first hit.
pub fn parse_response(body: &str) -> Result<Option<SearchHit>, SearchError> {
    let response: ItunesResponse = serde_json::from_str(body)?;
    Ok(response.results.into_iter().next().map(|t| SearchHit {
        track_name: t.track_name,
        artist_name: t.artist_name,
        artwork_url: t.artwork_url,
        preview_url: t.preview_url,
    }))
}

#[async_trait]
impl SearchService for ItunesSearch {
    async fn search(&self, term: &str) -> Result<Option<SearchHit>, SearchError> {
        let url = self.search_url(term);
        debug!("search: GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::Status(response.status()));
        }

        let body = response.text().await?;
        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ItunesSearch {
        ItunesSearch::new(&SearchConfig::default()).unwrap()
    }

    #[test]
    fn test_search_url_encodes_term() {
        let url = client().search_url("放漾 A公館 & friends");
        assert!(url.starts_with("https://itunes.apple.com/search?term="));
        assert!(url.contains("A%E5%85%AC%E9%A4%A8%20%26%20friends"));
        assert!(url.ends_with("&media=music&entity=song&limit=1"));
    }

    #[test]
    fn test_parse_first_result() {
        let body = r#"{
            "resultCount": 1,
            "results": [{
                "trackName": "Fang Yang",
                "artistName": "A Gong Guan",
                "artworkUrl100": "https://is1-ssl.mzstatic.com/image/thumb/x/100x100bb.jpg",
                "previewUrl": "https://audio-ssl.itunes.apple.com/preview.m4a"
            }]
        }"#;
        let hit = parse_response(body).unwrap().unwrap();
        assert_eq!(hit.title(), "Fang Yang - A Gong Guan");
        assert_eq!(
            hit.cover_url().as_deref(),
            Some("https://is1-ssl.mzstatic.com/image/thumb/x/600x600bb.jpg")
        );
        assert_eq!(
            hit.preview_url.as_deref(),
            Some("https://audio-ssl.itunes.apple.com/preview.m4a")
        );
    }

    #[test]
    fn test_parse_empty_and_garbage() {
        assert!(parse_response(r#"{"resultCount":0,"results":[]}"#)
            .unwrap()
            .is_none());
        assert!(parse_response("{}").unwrap().is_none());
        assert!(matches!(
            parse_response("<html>"),
            Err(SearchError::Decode(_))
        ));
    }
}
