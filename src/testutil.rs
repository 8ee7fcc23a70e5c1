// Test doubles for the external collaborators

use crate::liveness::ProcessProbe;
use crate::metadata::{MetadataTransport, SearchHit, SearchKind};
use crate::now_playing::{NowPlayingSource, Query, SourceError, Track};
use crate::presence::{Activity, PresenceSink};
use anyhow::{anyhow, Result};
use std::cell::RefCell;
use std::collections::HashSet;

pub fn track(id: i64) -> Track {
    Track {
        id,
        title: format!("Song {}", id),
        artist: "Artist".to_string(),
        album: "Album".to_string(),
        year: 2001,
        duration: 180.0,
        artwork: "https://art/song/512x512.jpg".to_string(),
        artist_artwork: "https://art/artist/512x512.jpg".to_string(),
        share_url: "https://music.apple.com/us/song/1440".to_string(),
        share_id: "1440".to_string(),
    }
}

#[derive(Debug, Clone, Copy)]
enum Catalog {
    Full,
    SongOnly,
    Empty,
    FailingArtists,
}

/// Catalog that records every search
pub struct FakeTransport {
    catalog: Catalog,
    calls: RefCell<Vec<(SearchKind, String)>>,
}

impl FakeTransport {
    fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn with_catalog() -> Self {
        Self::new(Catalog::Full)
    }

    pub fn with_song_only() -> Self {
        Self::new(Catalog::SongOnly)
    }

    pub fn empty() -> Self {
        Self::new(Catalog::Empty)
    }

    pub fn failing_artists() -> Self {
        Self::new(Catalog::FailingArtists)
    }

    pub fn calls(&self) -> Vec<(SearchKind, String)> {
        self.calls.borrow().clone()
    }
}

impl MetadataTransport for FakeTransport {
    fn search(&self, kind: SearchKind, term: &str) -> Result<Option<SearchHit>> {
        self.calls.borrow_mut().push((kind, term.to_string()));

        let song = SearchHit {
            id: "1440".to_string(),
            artwork_template: "https://art/song/{w}x{h}.jpg".to_string(),
            url: "https://music.apple.com/us/song/1440".to_string(),
        };
        let artist = SearchHit {
            id: "99".to_string(),
            artwork_template: "https://art/artist/{w}x{h}.jpg".to_string(),
            url: String::new(),
        };

        match (self.catalog, kind) {
            (Catalog::Empty, _) => Ok(None),
            (_, SearchKind::Songs) => Ok(Some(song)),
            (Catalog::Full, SearchKind::Artists) => Ok(Some(artist)),
            (Catalog::SongOnly, SearchKind::Artists) => Ok(None),
            (Catalog::FailingArtists, SearchKind::Artists) => Err(anyhow!("connection reset")),
        }
    }
}

#[derive(Debug, Clone)]
enum Failure {
    Terminated,
    Script(Option<i32>, String),
}

/// Player that answers from canned text
pub struct FakeSource {
    player_state: RefCell<String>,
    year_and_duration: String,
    failure: RefCell<Option<Failure>>,
    queries: RefCell<Vec<Query>>,
}

impl FakeSource {
    pub fn new(player_state: &str) -> Self {
        Self {
            player_state: RefCell::new(player_state.to_string()),
            year_and_duration: "2001, 180.0".to_string(),
            failure: RefCell::new(None),
            queries: RefCell::new(Vec::new()),
        }
    }

    pub fn terminated() -> Self {
        let source = Self::new("");
        source.fail_with(SourceError::Terminated);
        source
    }

    pub fn failing(err: SourceError) -> Self {
        let source = Self::new("");
        source.fail_with(err);
        source
    }

    pub fn with_year_and_duration(mut self, raw: &str) -> Self {
        self.year_and_duration = raw.to_string();
        self
    }

    pub fn set_player_state(&self, raw: &str) {
        *self.player_state.borrow_mut() = raw.to_string();
    }

    pub fn fail_with(&self, err: SourceError) {
        let failure = match err {
            SourceError::Terminated => Failure::Terminated,
            SourceError::Script { code, message } => Failure::Script(code, message),
            SourceError::Io(e) => Failure::Script(None, e.to_string()),
        };
        *self.failure.borrow_mut() = Some(failure);
    }

    pub fn queries(&self) -> Vec<Query> {
        self.queries.borrow().clone()
    }
}

impl NowPlayingSource for FakeSource {
    fn query(&self, query: Query) -> Result<String, SourceError> {
        self.queries.borrow_mut().push(query);

        if let Some(failure) = self.failure.borrow().clone() {
            return Err(match failure {
                Failure::Terminated => SourceError::Terminated,
                Failure::Script(code, message) => SourceError::Script { code, message },
            });
        }

        Ok(match query {
            Query::PlayerState => self.player_state.borrow().clone(),
            Query::Title => "Song".to_string(),
            Query::Artist => "Artist".to_string(),
            Query::Album => "Album".to_string(),
            Query::YearAndDuration => self.year_and_duration.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Connect(String),
    Publish(Activity),
    Disconnect,
}

/// Sink that records calls and can be told to fail
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub calls: Vec<SinkCall>,
    pub refuse_connect: bool,
    pub fail_publish: bool,
}

impl RecordingSink {
    pub fn refusing_connect() -> Self {
        Self {
            refuse_connect: true,
            ..Self::default()
        }
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    pub fn connect_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, SinkCall::Connect(_)))
            .count()
    }

    /// Publish attempts, failed ones included
    pub fn publish_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, SinkCall::Publish(_)))
            .count()
    }

    pub fn last_activity(&self) -> Option<&Activity> {
        self.calls.iter().rev().find_map(|call| match call {
            SinkCall::Publish(activity) => Some(activity),
            _ => None,
        })
    }
}

impl PresenceSink for RecordingSink {
    fn connect(&mut self, application_id: &str) -> Result<()> {
        if self.refuse_connect {
            return Err(anyhow!("Discord IPC socket not found"));
        }
        self.calls.push(SinkCall::Connect(application_id.to_string()));
        Ok(())
    }

    fn publish(&mut self, activity: &Activity) -> Result<()> {
        self.calls.push(SinkCall::Publish(activity.clone()));
        if self.fail_publish {
            return Err(anyhow!("payload rejected"));
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        self.calls.push(SinkCall::Disconnect);
    }
}

/// Process table with a fixed set of running apps
pub struct FakeProbe {
    running: HashSet<String>,
}

impl FakeProbe {
    pub fn running(apps: &[&str]) -> Self {
        Self {
            running: apps.iter().map(|app| app.to_string()).collect(),
        }
    }

    pub fn stop(&mut self, app: &str) {
        self.running.remove(app);
    }
}

impl ProcessProbe for FakeProbe {
    fn is_running(&self, app: &str) -> bool {
        self.running.contains(app)
    }
}
