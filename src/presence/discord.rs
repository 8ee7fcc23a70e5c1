// Discord Rich Presence sink over the local IPC socket

use super::{Activity, PresenceSink};
use anyhow::{anyhow, Result};
use discord_rich_presence::{activity, DiscordIpc, DiscordIpcClient};

#[derive(Default)]
pub struct DiscordPresence {
    client: Option<DiscordIpcClient>,
}

impl DiscordPresence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PresenceSink for DiscordPresence {
    fn connect(&mut self, application_id: &str) -> Result<()> {
        let mut client = DiscordIpcClient::new(application_id)
            .map_err(|e| anyhow!("Failed to create Discord IPC client: {}", e))?;

        client
            .connect()
            .map_err(|e| anyhow!("Failed to connect to Discord: {}", e))?;

        log::info!("Connected to Discord as application {}", application_id);
        self.client = Some(client);
        Ok(())
    }

    fn publish(&mut self, presence: &Activity) -> Result<()> {
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| anyhow!("Discord client is not connected"))?;

        let assets = activity::Assets::new()
            .large_image(&presence.large_image)
            .large_text(&presence.large_text)
            .small_image(&presence.small_image)
            .small_text(&presence.small_text);

        let timestamps = activity::Timestamps::new()
            .start(presence.start.timestamp())
            .end(presence.end.timestamp());

        let mut payload = activity::Activity::new()
            .details(&presence.details)
            .state(&presence.state)
            .assets(assets)
            .timestamps(timestamps);

        if !presence.buttons.is_empty() {
            payload = payload.buttons(
                presence
                    .buttons
                    .iter()
                    .map(|button| activity::Button::new(&button.label, &button.url))
                    .collect(),
            );
        }

        client
            .set_activity(payload)
            .map_err(|e| anyhow!("Failed to set Discord activity: {}", e))
    }

    fn disconnect(&mut self) {
        let Some(mut client) = self.client.take() else {
            return;
        };

        if let Err(e) = client.clear_activity() {
            log::debug!("Failed to clear Discord activity: {}", e);
        }
        if let Err(e) = client.close() {
            log::debug!("Failed to close Discord connection: {}", e);
        }
        log::info!("Disconnected from Discord");
    }
}
