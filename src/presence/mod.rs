// Presence reconciliation
// Decides, per snapshot, whether the published activity needs to change

pub mod discord;

use crate::config::PresenceConfig;
use crate::now_playing::{PlaybackState, Snapshot, Track};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Link rendered as an activity button
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub url: String,
}

/// Everything a sink needs to render one track
#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    pub details: String,
    pub state: String,
    pub large_image: String,
    pub large_text: String,
    pub small_image: String,
    pub small_text: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub buttons: Vec<Button>,
}

/// Presence publishing service
pub trait PresenceSink {
    fn connect(&mut self, application_id: &str) -> Result<()>;
    fn publish(&mut self, activity: &Activity) -> Result<()>;
    fn disconnect(&mut self);
}

#[derive(Debug, Error)]
pub enum PresenceError {
    /// No session could be established; nothing else can be done
    #[error("could not create rich presence client: {0:#}")]
    Login(anyhow::Error),

    /// The session is still considered valid
    #[error("could not set activity: {0:#}")]
    Publish(anyhow::Error),
}

/// What a reconciliation step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not playing and not connected
    Idle,
    /// Playback stopped, session torn down
    Disconnected,
    /// Same play-through as last published
    Unchanged,
    Published,
}

/// Connection state plus the last published play
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceSession {
    pub connected: bool,
    /// Track of the last successful publish
    pub last_track_id: Option<i64>,
    pub last_position: f64,
}

impl PresenceSession {
    /// Same track, not rewound: nothing new to publish.
    fn is_ongoing(&self, track_id: i64, position: f64) -> bool {
        self.connected && self.last_track_id == Some(track_id) && position >= self.last_position
    }
}

/// Start and end of the progress window for a track observed at `position`.
///
/// Either bound falls back to `now` if it leaves chrono's range.
pub fn play_window(now: DateTime<Utc>, position: f64, duration: f64) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = seconds(position)
        .and_then(|elapsed| now.checked_sub_signed(elapsed))
        .unwrap_or(now);
    let end = seconds(duration - position)
        .and_then(|remaining| now.checked_add_signed(remaining))
        .unwrap_or(now);
    (start, end)
}

fn seconds(value: f64) -> Option<Duration> {
    Duration::try_milliseconds((value * 1000.0) as i64)
}

fn first_non_empty<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

/// Presence state machine. Owns the sink and the session exclusively.
pub struct Reconciler<S> {
    sink: S,
    session: PresenceSession,
    config: PresenceConfig,
}

impl<S: PresenceSink> Reconciler<S> {
    pub fn new(sink: S, config: PresenceConfig) -> Self {
        Self {
            sink,
            session: PresenceSession::default(),
            config,
        }
    }

    #[cfg(test)]
    pub fn session(&self) -> &PresenceSession {
        &self.session
    }

    pub fn is_connected(&self) -> bool {
        self.session.connected
    }

    pub fn reconcile(&mut self, snapshot: &Snapshot, now: DateTime<Utc>) -> Result<Outcome, PresenceError> {
        let track = match (&snapshot.state, &snapshot.track) {
            (PlaybackState::Playing, Some(track)) => track,
            _ => {
                return Ok(if self.stop() {
                    Outcome::Disconnected
                } else {
                    Outcome::Idle
                });
            }
        };

        if self.session.is_ongoing(track.id, snapshot.position) {
            log::debug!(
                "Ongoing activity, ignoring: song {} at {:.1}s",
                track.id,
                snapshot.position
            );
            return Ok(Outcome::Unchanged);
        }

        log::debug!(
            "New event: last song {:?} at {:.1}s, now song {} at {:.1}s",
            self.session.last_track_id,
            self.session.last_position,
            track.id,
            snapshot.position
        );

        if !self.session.connected {
            self.sink
                .connect(&self.config.application_id)
                .map_err(PresenceError::Login)?;
            self.session.connected = true;
        }

        let activity = self.activity(track, snapshot.position, now);
        self.sink.publish(&activity).map_err(PresenceError::Publish)?;

        self.session.last_track_id = Some(track.id);
        self.session.last_position = snapshot.position;

        log::warn!(
            "Now playing: {} - {} [{}] ({}), {:.0}s/{:.0}s{}",
            track.artist,
            track.title,
            track.album,
            track.year,
            snapshot.position,
            track.duration,
            track
                .songlink()
                .map(|link| format!(", {}", link))
                .unwrap_or_default()
        );

        Ok(Outcome::Published)
    }

    /// Tear down the session if there is one. Returns whether it was connected.
    pub fn stop(&mut self) -> bool {
        if !self.session.connected {
            return false;
        }

        self.sink.disconnect();
        self.session = PresenceSession::default();
        true
    }

    fn activity(&self, track: &Track, position: f64, now: DateTime<Utc>) -> Activity {
        let (start, end) = play_window(now, position, track.duration);

        let mut buttons = Vec::new();
        if !track.share_url.is_empty() {
            buttons.push(Button {
                label: self.config.listen_button_label.clone(),
                url: track.share_url.clone(),
            });
        }
        if let Some(link) = track.songlink() {
            buttons.push(Button {
                label: self.config.songlink_button_label.clone(),
                url: link,
            });
        }

        Activity {
            details: format!("{} · {}", track.title, track.artist),
            state: track.album.clone(),
            large_image: first_non_empty(&track.artwork, &self.config.large_image_fallback).to_string(),
            large_text: track.title.clone(),
            small_image: first_non_empty(&track.artist_artwork, &self.config.small_image_fallback).to_string(),
            small_text: track.artist.clone(),
            start,
            end,
            buttons,
        }
    }

    #[cfg(test)]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    #[cfg(test)]
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}
