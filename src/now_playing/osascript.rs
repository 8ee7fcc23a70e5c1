// AppleScript bridge to the Music app
// Each query is one `osascript` invocation inside a `tell application` block

use super::{NowPlayingSource, Query, SourceError};
use anyhow::Context;
use regex::Regex;
use std::process::Command;

/// AppleScript "can't get object", raised when the app quits mid-query
const ERR_NO_SUCH_OBJECT: i32 = -1728;

pub struct MusicScript {
    app_name: String,
    error_code: Regex,
}

impl MusicScript {
    pub fn new(app_name: String) -> anyhow::Result<Self> {
        // osascript ends its error output with the numeric code, e.g. "(-1728)"
        let error_code = Regex::new(r"\((-?\d+)\)\s*$").context("Invalid script error pattern")?;

        Ok(Self { app_name, error_code })
    }

    fn statement(query: Query) -> &'static str {
        match query {
            Query::PlayerState => "get {database id} of current track & {player position, player state}",
            Query::Title => "get {name} of current track",
            Query::Artist => "get {artist} of current track",
            Query::Album => "get {album} of current track",
            Query::YearAndDuration => "get {year, duration} of current track",
        }
    }

    fn tell(&self, statement: &str) -> Result<String, SourceError> {
        let output = Command::new("osascript")
            .arg("-e")
            .arg(format!("tell application \"{}\"", self.app_name))
            .arg("-e")
            .arg(statement)
            .arg("-e")
            .arg("end tell")
            .output()?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() { stdout } else { stderr };
        Err(self.classify(message))
    }

    fn classify(&self, message: String) -> SourceError {
        let code = self
            .error_code
            .captures(&message)
            .and_then(|caps| caps[1].parse::<i32>().ok());

        match code {
            Some(ERR_NO_SUCH_OBJECT) => SourceError::Terminated,
            code => SourceError::Script { code, message },
        }
    }
}

impl NowPlayingSource for MusicScript {
    fn query(&self, query: Query) -> Result<String, SourceError> {
        log::debug!("Querying {}: {:?}", self.app_name, query);
        self.tell(Self::statement(query))
    }
}
