// Metadata resolver
// Enriches (artist, album, title) with artwork and share links, backed by TTL caches

pub mod apple;

use crate::cache::TtlCache;
use anyhow::{Context, Result};
use std::time::Duration;

/// Separators tried in order when picking the lead artist of a credit string
const ARTIST_SEPARATORS: &[&str] = &[",", "&"];

/// Catalog search category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Songs,
    Artists,
}

impl SearchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Songs => "songs",
            Self::Artists => "artists",
        }
    }
}

/// First result of a catalog search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchHit {
    pub id: String,
    /// Artwork URL with `{w}`/`{h}` placeholders
    pub artwork_template: String,
    pub url: String,
}

/// Catalog lookup transport
pub trait MetadataTransport {
    /// Search the catalog, returning the first hit if there is one
    fn search(&self, kind: SearchKind, term: &str) -> Result<Option<SearchHit>>;
}

/// Storefront share URL together with the catalog id it was derived from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareLink {
    pub url: String,
    pub id: String,
}

/// Enrichment output. Empty strings mean "not known".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub share_id: String,
    pub artwork: String,
    pub share_url: String,
    pub artist_artwork: String,
}

/// The three metadata sub-caches, all keyed by [`composite_key`]
pub struct MetadataCaches {
    pub artwork: TtlCache<String, String>,
    pub share: TtlCache<String, ShareLink>,
    pub artist_artwork: TtlCache<String, String>,
}

impl MetadataCaches {
    pub fn new() -> Self {
        Self {
            artwork: TtlCache::new("artwork"),
            share: TtlCache::new("share-url"),
            artist_artwork: TtlCache::new("artist-artwork"),
        }
    }

    /// A hit requires all three slots, otherwise the caller refetches everything.
    fn lookup(&self, key: &str) -> Option<Metadata> {
        let artwork = self.artwork.get(key)?;
        let share = self.share.get(key)?;
        let artist_artwork = self.artist_artwork.get(key)?;

        Some(Metadata {
            share_id: share.id,
            artwork,
            share_url: share.url,
            artist_artwork,
        })
    }

    fn store(&self, key: &str, metadata: &Metadata, ttl: Duration) {
        self.artwork.set(key.to_string(), metadata.artwork.clone(), ttl);
        self.share.set(
            key.to_string(),
            ShareLink {
                url: metadata.share_url.clone(),
                id: metadata.share_id.clone(),
            },
            ttl,
        );
        self.artist_artwork
            .set(key.to_string(), metadata.artist_artwork.clone(), ttl);
    }

    pub fn sweep(&self) {
        self.artwork.sweep();
        self.share.sweep();
        self.artist_artwork.sweep();
    }

    pub fn close(&self) {
        self.artwork.close();
        self.share.close();
        self.artist_artwork.close();
    }
}

impl Default for MetadataCaches {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache key for a track: the query-escaped, space-joined triple
pub fn composite_key(artist: &str, album: &str, title: &str) -> String {
    let joined = [artist, album, title].join(" ");
    url::form_urlencoded::byte_serialize(joined.as_bytes()).collect()
}

/// Lead artist of a credit such as "A, B & C".
///
/// The first separator that actually splits the string wins; without any
/// separator the whole (trimmed) string is returned.
pub fn lead_artist(artist: &str) -> &str {
    for separator in ARTIST_SEPARATORS {
        let mut parts = artist.split(separator);
        if let (Some(first), Some(_)) = (parts.next(), parts.next()) {
            return first.trim();
        }
    }
    artist.trim()
}

/// Fill the first `{w}` and `{h}` placeholders of an artwork template
pub fn sized_artwork(template: &str, size: u32) -> String {
    let size = size.to_string();
    template.replacen("{w}", &size, 1).replacen("{h}", &size, 1)
}

/// Resolves track metadata, issuing at most two lookups per key and TTL
pub struct MetadataResolver<T> {
    transport: T,
    caches: MetadataCaches,
    ttl: Duration,
    artwork_size: u32,
}

impl<T: MetadataTransport> MetadataResolver<T> {
    pub fn new(transport: T, caches: MetadataCaches, ttl: Duration, artwork_size: u32) -> Self {
        Self {
            transport,
            caches,
            ttl,
            artwork_size,
        }
    }

    pub fn resolve(&self, artist: &str, album: &str, title: &str) -> Result<Metadata> {
        let key = composite_key(artist, album, title);

        if let Some(cached) = self.caches.lookup(&key) {
            log::debug!("Got album and artist artwork from cache: {}", key);
            return Ok(cached);
        }

        let query = [artist, album, title].join(" ");
        let song = self
            .transport
            .search(SearchKind::Songs, &query)
            .with_context(|| format!("Song lookup failed for '{}'", query))?;

        let Some(song) = song else {
            log::debug!("No catalog match for '{}'", query);
            return Ok(Metadata::default());
        };

        let lead = lead_artist(artist);
        let artist_hit = self
            .transport
            .search(SearchKind::Artists, lead)
            .with_context(|| format!("Artist lookup failed for '{}'", lead))?;

        let metadata = Metadata {
            share_id: song.id,
            artwork: sized_artwork(&song.artwork_template, self.artwork_size),
            share_url: song.url,
            artist_artwork: artist_hit
                .map(|hit| sized_artwork(&hit.artwork_template, self.artwork_size))
                .unwrap_or_default(),
        };

        self.caches.store(&key, &metadata, self.ttl);

        Ok(metadata)
    }

    pub fn caches(&self) -> &MetadataCaches {
        &self.caches
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }
}
