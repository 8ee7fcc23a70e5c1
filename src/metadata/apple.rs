// Apple Media Services catalog search
// Unauthenticated search endpoint used for artwork and share links

use super::{MetadataTransport, SearchHit, SearchKind};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

const SEARCH_BASE_URL: &str = "https://tools.applemediaservices.com/api/apple-media/music";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    songs: Option<ResultSet>,
    #[serde(default)]
    artists: Option<ResultSet>,
}

#[derive(Debug, Deserialize)]
struct ResultSet {
    #[serde(default)]
    data: Vec<Resource>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    id: String,
    #[serde(default)]
    attributes: Attributes,
}

#[derive(Debug, Default, Deserialize)]
struct Attributes {
    #[serde(default)]
    url: String,
    #[serde(default)]
    artwork: Artwork,
}

#[derive(Debug, Default, Deserialize)]
struct Artwork {
    #[serde(default)]
    url: String,
}

/// Blocking catalog client
pub struct AppleCatalog {
    storefront: String,
    timeout: Duration,
}

impl AppleCatalog {
    pub fn new(storefront: String, timeout: Duration) -> Self {
        Self { storefront, timeout }
    }

    fn search_url(&self) -> String {
        format!("{}/{}/search.json", SEARCH_BASE_URL, self.storefront)
    }
}

impl MetadataTransport for AppleCatalog {
    fn search(&self, kind: SearchKind, term: &str) -> Result<Option<SearchHit>> {
        log::debug!("Searching {} for '{}'", kind.as_str(), term);

        let response = attohttpc::get(self.search_url())
            .param("types", kind.as_str())
            .param("limit", "1")
            .param("term", term)
            .timeout(self.timeout)
            .send()
            .context("Failed to send catalog search request")?;

        if !response.is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            anyhow::bail!("Catalog search error ({}): {}", status, body);
        }

        let body = response
            .text()
            .context("Failed to read catalog search response")?;

        parse_search(kind, &body)
    }
}

/// Decode a search response body into its first hit
fn parse_search(kind: SearchKind, body: &str) -> Result<Option<SearchHit>> {
    let response: SearchResponse =
        serde_json::from_str(body).context("Failed to decode catalog search response")?;

    let results = match kind {
        SearchKind::Songs => response.songs,
        SearchKind::Artists => response.artists,
    };

    Ok(results
        .and_then(|set| set.data.into_iter().next())
        .map(|resource| SearchHit {
            id: resource.id,
            artwork_template: resource.attributes.artwork.url,
            url: resource.attributes.url,
        }))
}
