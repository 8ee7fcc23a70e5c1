// Poll loop
// One observation, one reconciliation, one sleep, until shutdown is requested

use crate::config::PollConfig;
use crate::liveness::ProcessProbe;
use crate::metadata::MetadataTransport;
use crate::now_playing::{NowPlayingSource, ObserveError, Observer};
use crate::presence::{PresenceError, PresenceSink, Reconciler};
use anyhow::Result;
use chrono::Utc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

/// How long to wait before the next cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    /// Normal cadence and transient errors
    Short,
    /// A required application is not running
    Long,
}

/// Applications that must be alive for a cycle to make sense
pub struct Prerequisites {
    pub player: String,
    pub presence_hosts: Vec<String>,
}

pub struct PollLoop<S, T, K, P> {
    observer: Observer<S, T>,
    reconciler: Reconciler<K>,
    probe: P,
    prerequisites: Prerequisites,
    cadence: PollConfig,
    last_sweep: Instant,
}

impl<S, T, K, P> PollLoop<S, T, K, P>
where
    S: NowPlayingSource,
    T: MetadataTransport,
    K: PresenceSink,
    P: ProcessProbe,
{
    pub fn new(
        observer: Observer<S, T>,
        reconciler: Reconciler<K>,
        probe: P,
        prerequisites: Prerequisites,
        cadence: PollConfig,
    ) -> Self {
        Self {
            observer,
            reconciler,
            probe,
            prerequisites,
            cadence,
            last_sweep: Instant::now(),
        }
    }

    /// Run until `shutdown` fires. Only a failed presence login ends it early.
    pub fn run(&mut self, shutdown: &Receiver<()>) -> Result<()> {
        loop {
            let pause = self.tick()?;
            self.sweep_if_due();

            let wait = match pause {
                Pause::Short => self.cadence.short(),
                Pause::Long => self.cadence.long(),
            };

            match shutdown.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    log::info!("Shutdown requested");
                    return Ok(());
                }
            }
        }
    }

    /// One cycle
    pub fn tick(&mut self) -> Result<Pause, PresenceError> {
        if !self.probe.is_running(&self.prerequisites.player) {
            log::warn!(
                "{} is not running, sleeping {:?}",
                self.prerequisites.player,
                self.cadence.long()
            );
            self.reconciler.stop();
            return Ok(Pause::Long);
        }

        let host_running = self
            .prerequisites
            .presence_hosts
            .iter()
            .any(|app| self.probe.is_running(app));
        if !host_running {
            log::warn!(
                "None of {} is running, sleeping {:?}",
                self.prerequisites.presence_hosts.join(", "),
                self.cadence.long()
            );
            self.reconciler.stop();
            return Ok(Pause::Long);
        }

        let snapshot = match self.observer.observe() {
            Ok(snapshot) => snapshot,
            Err(ObserveError::SourceTerminated) => {
                log::warn!(
                    "{} stopped running, sleeping {:?}",
                    self.prerequisites.player,
                    self.cadence.long()
                );
                self.reconciler.stop();
                return Ok(Pause::Long);
            }
            Err(e) => {
                log::error!("Will try again in {:?}: {}", self.cadence.short(), e);
                self.reconciler.stop();
                return Ok(Pause::Short);
            }
        };

        if !snapshot.is_playing() && self.reconciler.is_connected() {
            log::info!("Not playing");
        }

        match self.reconciler.reconcile(&snapshot, Utc::now()) {
            Ok(_) => {}
            Err(PresenceError::Publish(e)) => {
                log::warn!("Could not set activity, will retry later: {:#}", e);
            }
            Err(fatal) => return Err(fatal),
        }

        Ok(Pause::Short)
    }

    fn sweep_if_due(&mut self) {
        if self.last_sweep.elapsed() >= self.cadence.sweep() {
            self.observer.sweep();
            self.last_sweep = Instant::now();
        }
    }

    /// Drop the presence session, then release the caches.
    pub fn shutdown(&mut self) {
        self.reconciler.stop();
        self.observer.close();
    }

    #[cfg(test)]
    pub fn reconciler(&self) -> &Reconciler<K> {
        &self.reconciler
    }

    #[cfg(test)]
    pub fn reconciler_mut(&mut self) -> &mut Reconciler<K> {
        &mut self.reconciler
    }

    #[cfg(test)]
    pub fn probe_mut(&mut self) -> &mut P {
        &mut self.probe
    }

    #[cfg(test)]
    pub fn observer(&self) -> &Observer<S, T> {
        &self.observer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlCache;
    use crate::config::PresenceConfig;
    use crate::metadata::{MetadataCaches, MetadataResolver};
    use crate::now_playing::SourceError;
    use crate::testutil::{track, FakeProbe, FakeSource, FakeTransport, RecordingSink, SinkCall};
    use std::sync::mpsc;
    use std::thread::sleep;

    type TestLoop = PollLoop<FakeSource, FakeTransport, RecordingSink, FakeProbe>;

    fn poll_loop(source: FakeSource, sink: RecordingSink) -> TestLoop {
        poll_loop_with(source, sink, PollConfig::default())
    }

    fn poll_loop_with(source: FakeSource, sink: RecordingSink, cadence: PollConfig) -> TestLoop {
        let resolver = MetadataResolver::new(
            FakeTransport::with_catalog(),
            MetadataCaches::new(),
            Duration::from_secs(3600),
            512,
        );
        let observer = Observer::new(source, resolver, TtlCache::new("song"), Duration::from_secs(86_400));
        PollLoop::new(
            observer,
            Reconciler::new(sink, PresenceConfig::default()),
            FakeProbe::running(&["Music", "Vesktop"]),
            Prerequisites {
                player: "Music".to_string(),
                presence_hosts: vec!["Discord".to_string(), "Vesktop".to_string()],
            },
            cadence,
        )
    }

    #[test]
    fn playing_track_is_published() {
        let mut poll = poll_loop(FakeSource::new("5, 12.0, playing"), RecordingSink::default());

        assert_eq!(poll.tick().unwrap(), Pause::Short);
        assert_eq!(poll.tick().unwrap(), Pause::Short);

        let sink = poll.reconciler().sink();
        assert_eq!(sink.connect_count(), 1);
        assert_eq!(sink.publish_count(), 1);
    }

    #[test]
    fn missing_player_disconnects_and_backs_off() {
        let mut poll = poll_loop(FakeSource::new("5, 12.0, playing"), RecordingSink::default());
        poll.tick().unwrap();

        poll.probe_mut().stop("Music");

        assert_eq!(poll.tick().unwrap(), Pause::Long);
        assert!(!poll.reconciler().is_connected());
        assert_eq!(poll.reconciler().sink().calls.last(), Some(&SinkCall::Disconnect));
    }

    #[test]
    fn missing_presence_host_backs_off() {
        let mut poll = poll_loop(FakeSource::new("5, 12.0, playing"), RecordingSink::default());
        poll.probe_mut().stop("Vesktop");

        assert_eq!(poll.tick().unwrap(), Pause::Long);
        assert!(poll.reconciler().sink().calls.is_empty());
    }

    #[test]
    fn terminated_player_backs_off_long() {
        let mut poll = poll_loop(FakeSource::terminated(), RecordingSink::default());

        assert_eq!(poll.tick().unwrap(), Pause::Long);
    }

    #[test]
    fn generic_error_disconnects_and_retries_soon() {
        let mut poll = poll_loop(FakeSource::new("5, 12.0, playing"), RecordingSink::default());
        poll.tick().unwrap();

        poll.observer().source().fail_with(SourceError::Script {
            code: Some(-2753),
            message: "variable not defined".to_string(),
        });

        assert_eq!(poll.tick().unwrap(), Pause::Short);
        assert!(!poll.reconciler().is_connected());
    }

    #[test]
    fn pausing_disconnects() {
        let mut poll = poll_loop(FakeSource::new("5, 12.0, playing"), RecordingSink::default());
        poll.tick().unwrap();

        poll.observer().source().set_player_state("5, 12.0, paused");

        assert_eq!(poll.tick().unwrap(), Pause::Short);
        assert!(!poll.reconciler().is_connected());
        assert_eq!(
            poll.reconciler()
                .sink()
                .calls
                .iter()
                .filter(|call| **call == SinkCall::Disconnect)
                .count(),
            1
        );
    }

    #[test]
    fn publish_failure_is_not_fatal() {
        let mut poll = poll_loop(FakeSource::new("5, 12.0, playing"), RecordingSink::default());
        poll.reconciler_mut().sink_mut().fail_publish = true;

        assert_eq!(poll.tick().unwrap(), Pause::Short);
        assert!(poll.reconciler().is_connected());
    }

    #[test]
    fn login_failure_is_fatal() {
        let mut poll = poll_loop(FakeSource::new("5, 12.0, playing"), RecordingSink::refusing_connect());

        assert!(matches!(poll.tick(), Err(PresenceError::Login(_))));

        let (_tx, rx) = mpsc::channel();
        assert!(poll.run(&rx).is_err());
    }

    #[test]
    fn run_stops_on_shutdown_and_releases_resources() {
        let mut poll = poll_loop(FakeSource::new("5, 12.0, playing"), RecordingSink::default());
        let (tx, rx) = mpsc::channel();
        tx.send(()).unwrap();

        poll.run(&rx).unwrap();
        assert!(poll.reconciler().is_connected());

        poll.shutdown();

        assert!(!poll.reconciler().is_connected());
        assert!(poll.observer().resolver().caches().artwork.is_closed());
    }

    #[test]
    fn due_sweep_purges_expired_songs() {
        let cadence = PollConfig {
            sweep_interval: 0,
            ..PollConfig::default()
        };
        let mut poll = poll_loop_with(FakeSource::new("5, 12.0, paused"), RecordingSink::default(), cadence);
        let songs = poll.observer().songs();
        songs.set(1, track(1), Duration::from_millis(20));
        songs.set(2, track(2), Duration::from_secs(3600));
        songs.sweep();
        assert_eq!(songs.entry_count(), 2);

        sleep(Duration::from_millis(1500));
        let (tx, rx) = mpsc::channel();
        tx.send(()).unwrap();
        poll.run(&rx).unwrap();

        assert_eq!(poll.observer().songs().entry_count(), 1);
        assert_eq!(poll.observer().songs().get(&2), Some(track(2)));
    }
}
