// OSX Music Presence
// Mirrors Apple Music playback to Discord Rich Presence

mod cache;
mod config;
mod liveness;
mod logging;
mod metadata;
mod now_playing;
mod poll_loop;
mod presence;

#[cfg(test)]
mod testutil;

use anyhow::{Context, Result};
use cache::TtlCache;
use clap::Parser;
use config::Config;
use liveness::Pgrep;
use metadata::apple::AppleCatalog;
use metadata::{MetadataCaches, MetadataResolver};
use now_playing::osascript::MusicScript;
use now_playing::Observer;
use poll_loop::{PollLoop, Prerequisites};
use presence::discord::DiscordPresence;
use presence::Reconciler;
use std::path::PathBuf;
use std::sync::mpsc;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "osx_music_presence=info"
    #[arg(short, long)]
    log_level: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.log_level.as_deref());

    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let transport = AppleCatalog::new(config.metadata.storefront.clone(), config.metadata.timeout());
    let resolver = MetadataResolver::new(
        transport,
        MetadataCaches::new(),
        config.metadata.ttl(),
        config.metadata.artwork_size,
    );
    let source = MusicScript::new(config.player.app_name.clone())?;
    let observer = Observer::new(source, resolver, TtlCache::new("song"), config.cache.song_ttl());
    let reconciler = Reconciler::new(DiscordPresence::new(), config.presence.clone());

    let prerequisites = Prerequisites {
        player: config.player.app_name.clone(),
        presence_hosts: config.presence.host_apps.clone(),
    };
    let mut poll = PollLoop::new(observer, reconciler, Pgrep, prerequisites, config.poll.clone());

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .context("Failed to install Ctrl-C handler")?;

    log::info!(
        "Watching {} every {}s",
        config.player.app_name,
        config.poll.short_interval
    );

    let result = poll.run(&shutdown_rx);
    poll.shutdown();

    result
}
