// Process liveness checks

use std::process::Command;

pub trait ProcessProbe {
    fn is_running(&self, app: &str) -> bool;
}

/// Looks for an app bundle executable (`.../MacOS/<app>`) with pgrep
pub struct Pgrep;

impl ProcessProbe for Pgrep {
    fn is_running(&self, app: &str) -> bool {
        match Command::new("pgrep").arg("-f").arg(format!("MacOS/{}", app)).output() {
            Ok(output) => output.status.success() && !output.stdout.is_empty(),
            Err(e) => {
                log::debug!("pgrep failed for {}: {}", app, e);
                false
            }
        }
    }
}
