// Now playing observer
// Polls the player once per cycle and normalizes the answer into a Snapshot

pub mod osascript;

use crate::cache::TtlCache;
use crate::metadata::{MetadataResolver, MetadataTransport};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Player state literal reported while a track is playing
pub const STATE_PLAYING: &str = "playing";

/// What the player reported for the current cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    /// Paused, stopped, fast forwarding... carries the raw state
    NotPlaying(String),
}

impl PlaybackState {
    pub fn from_raw(state: &str) -> Self {
        if state == STATE_PLAYING {
            Self::Playing
        } else {
            Self::NotPlaying(state.to_string())
        }
    }
}

/// A library track with its resolved metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    /// Library database id
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub year: i32,
    /// Seconds
    pub duration: f64,
    pub artwork: String,
    pub artist_artwork: String,
    pub share_url: String,
    pub share_id: String,
}

impl Track {
    /// Cross-platform link built from the catalog id, if known
    pub fn songlink(&self) -> Option<String> {
        if self.share_id.is_empty() {
            None
        } else {
            Some(format!("https://song.link/i/{}", self.share_id))
        }
    }
}

/// One cycle's observation. `track` is only set while playing.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub state: PlaybackState,
    pub track: Option<Track>,
    /// Seconds into the track
    pub position: f64,
}

impl Snapshot {
    pub fn not_playing(state: &str) -> Self {
        Self {
            state: PlaybackState::NotPlaying(state.to_string()),
            track: None,
            position: 0.0,
        }
    }

    pub fn playing(track: Track, position: f64) -> Self {
        Self {
            state: PlaybackState::Playing,
            track: Some(track),
            position,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing && self.track.is_some()
    }
}

/// Questions the observer asks the player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    /// `id, position, state` of the current track
    PlayerState,
    Title,
    Artist,
    Album,
    /// `year, duration` of the current track
    YearAndDuration,
}

/// Failures reported by a now playing source
#[derive(Debug, Error)]
pub enum SourceError {
    /// The player went away while being queried
    #[error("the player is no longer running")]
    Terminated,

    #[error("script error {code:?}: {message}")]
    Script { code: Option<i32>, message: String },

    #[error("failed to run player query: {0}")]
    Io(#[from] std::io::Error),
}

/// Local media player
pub trait NowPlayingSource {
    /// Answer a query as the trimmed raw text the player returned
    fn query(&self, query: Query) -> Result<String, SourceError>;
}

#[derive(Debug, Error)]
pub enum ObserveError {
    #[error("the player stopped running")]
    SourceTerminated,

    #[error(transparent)]
    Source(SourceError),

    #[error("could not parse {field} from '{value}'")]
    Parse { field: &'static str, value: String },

    #[error("metadata lookup failed: {0:#}")]
    Metadata(anyhow::Error),
}

impl From<SourceError> for ObserveError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Terminated => Self::SourceTerminated,
            other => Self::Source(other),
        }
    }
}

/// Player state as returned by [`Query::PlayerState`]
#[derive(Debug, Clone, PartialEq)]
struct PlayerState {
    track_id: i64,
    position: f64,
    state: String,
}

fn field<'a>(parts: &[&'a str], index: usize, name: &'static str, raw: &str) -> Result<&'a str, ObserveError> {
    parts.get(index).copied().ok_or_else(|| ObserveError::Parse {
        field: name,
        value: raw.to_string(),
    })
}

fn parse_number<T: std::str::FromStr>(value: &str, name: &'static str) -> Result<T, ObserveError> {
    value.trim().parse().map_err(|_| ObserveError::Parse {
        field: name,
        value: value.to_string(),
    })
}

fn parse_player_state(raw: &str) -> Result<PlayerState, ObserveError> {
    let parts: Vec<&str> = raw.split(", ").collect();

    Ok(PlayerState {
        track_id: parse_number(field(&parts, 0, "track id", raw)?, "track id")?,
        position: parse_number(field(&parts, 1, "player position", raw)?, "player position")?,
        state: field(&parts, 2, "player state", raw)?.trim().to_string(),
    })
}

fn parse_year_and_duration(raw: &str) -> Result<(i32, f64), ObserveError> {
    let parts: Vec<&str> = raw.split(", ").collect();

    Ok((
        parse_number(field(&parts, 0, "year", raw)?, "year")?,
        parse_number(field(&parts, 1, "duration", raw)?, "duration")?,
    ))
}

/// Turns player queries into snapshots, resolving each track once per song TTL
pub struct Observer<S, T> {
    source: S,
    resolver: MetadataResolver<T>,
    songs: TtlCache<i64, Track>,
    song_ttl: Duration,
}

impl<S: NowPlayingSource, T: MetadataTransport> Observer<S, T> {
    pub fn new(source: S, resolver: MetadataResolver<T>, songs: TtlCache<i64, Track>, song_ttl: Duration) -> Self {
        Self {
            source,
            resolver,
            songs,
            song_ttl,
        }
    }

    pub fn observe(&self) -> Result<Snapshot, ObserveError> {
        let started = Instant::now();
        let result = self.observe_inner();
        log::info!("Got player info, took {:?}", started.elapsed());
        result
    }

    fn observe_inner(&self) -> Result<Snapshot, ObserveError> {
        let raw = self.source.query(Query::PlayerState)?;
        let player = parse_player_state(&raw)?;

        if let PlaybackState::NotPlaying(state) = PlaybackState::from_raw(&player.state) {
            return Ok(Snapshot::not_playing(&state));
        }

        if let Some(track) = self.songs.get(&player.track_id) {
            log::debug!("Got song {} from cache", player.track_id);
            return Ok(Snapshot::playing(track, player.position));
        }

        let track = self.load_track(player.track_id)?;
        self.songs.set(track.id, track.clone(), self.song_ttl);

        Ok(Snapshot::playing(track, player.position))
    }

    fn load_track(&self, id: i64) -> Result<Track, ObserveError> {
        let title = self.source.query(Query::Title)?;
        let artist = self.source.query(Query::Artist)?;
        let album = self.source.query(Query::Album)?;
        let (year, duration) = parse_year_and_duration(&self.source.query(Query::YearAndDuration)?)?;

        let metadata = self
            .resolver
            .resolve(&artist, &album, &title)
            .map_err(ObserveError::Metadata)?;

        Ok(Track {
            id,
            title,
            artist,
            album,
            year,
            duration,
            artwork: metadata.artwork,
            artist_artwork: metadata.artist_artwork,
            share_url: metadata.share_url,
            share_id: metadata.share_id,
        })
    }

    pub fn sweep(&self) {
        self.songs.sweep();
        self.resolver.caches().sweep();
    }

    /// Release all four caches. Only call once polling has stopped.
    pub fn close(&self) {
        self.songs.close();
        self.resolver.caches().close();
    }

    #[cfg(test)]
    pub fn source(&self) -> &S {
        &self.source
    }

    #[cfg(test)]
    pub fn songs(&self) -> &TtlCache<i64, Track> {
        &self.songs
    }

    #[cfg(test)]
    pub fn resolver(&self) -> &MetadataResolver<T> {
        &self.resolver
    }
}
