//! Media player control through an MPRIS command line client (playerctl)

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{
    ports::{PauseAction, ResourceCheck},
    retry::{retry_with_backoff, DEFAULT_BACKOFF},
    system::run_command,
};
use crate::error::{Result, TimerError};

/// Controls players through `playerctl`-compatible commands.
///
/// A resource id is a player name as printed by `<program> -l`. Instance
/// suffixes are accepted, so `firefox` matches `firefox.instance_1_42`.
#[derive(Debug, Clone)]
pub struct PlayerctlController {
    program: String,
    backoff: Vec<Duration>,
}

impl PlayerctlController {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            backoff: DEFAULT_BACKOFF.to_vec(),
        }
    }

    pub fn with_backoff(mut self, backoff: Vec<Duration>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Names of all players the client currently sees
    pub async fn list_players(&self) -> Result<Vec<String>> {
        let output = retry_with_backoff("listing players", &self.backoff, || {
            run_command(&self.program, &["-l"])
        })
        .await
        .map_err(TimerError::ActionPortFailure)?;

        Ok(parse_player_list(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Whether the player reports `Playing`. `None` when the status query fails.
    pub async fn is_playing(&self, resource_id: &str) -> Option<bool> {
        let player_arg = format!("--player={}", resource_id);
        match run_command(&self.program, &[player_arg.as_str(), "status"]).await {
            Ok(output) => Some(is_playing_status(&String::from_utf8_lossy(&output.stdout))),
            Err(e) => {
                debug!("Status of {} unknown: {}", resource_id, e);
                None
            }
        }
    }
}

fn is_playing_status(stdout: &str) -> bool {
    stdout.trim().eq_ignore_ascii_case("playing")
}

fn parse_player_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn player_matches(player: &str, resource_id: &str) -> bool {
    player == resource_id
        || player
            .strip_prefix(resource_id)
            .is_some_and(|rest| rest.starts_with('.'))
}

#[async_trait]
impl ResourceCheck for PlayerctlController {
    async fn exists(&self, resource_id: &str) -> Result<bool> {
        let players = self.list_players().await?;
        let found = players.iter().any(|p| player_matches(p, resource_id));
        debug!("Player {} present: {}", resource_id, found);
        Ok(found)
    }
}

#[async_trait]
impl PauseAction for PlayerctlController {
    async fn pause(&self, resource_id: &str) -> Result<bool> {
        if self.is_playing(resource_id).await == Some(false) {
            debug!("Player {} is not playing, leaving it alone", resource_id);
            return Ok(false);
        }

        let player_arg = format!("--player={}", resource_id);
        let args = [player_arg.as_str(), "pause"];
        retry_with_backoff("pausing playback", &self.backoff, || {
            run_command(&self.program, &args)
        })
        .await
        .map_err(TimerError::ActionPortFailure)?;

        info!("Paused playback on {}", resource_id);
        Ok(true)
    }
}
