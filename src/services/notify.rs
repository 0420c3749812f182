//! Desktop notifications

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::{
    ports::NotifyAction,
    retry::{retry_with_backoff, DEFAULT_BACKOFF},
    system::run_command,
};
use crate::error::{Result, TimerError};

pub const NOTIFICATION_TITLE: &str = "Sleep timer";

/// Sends notifications through a `notify-send`-compatible program
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    program: String,
    backoff: Vec<Duration>,
}

impl DesktopNotifier {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            backoff: DEFAULT_BACKOFF.to_vec(),
        }
    }
}

#[async_trait]
impl NotifyAction for DesktopNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        let args = [NOTIFICATION_TITLE, message];
        retry_with_backoff("sending notification", &self.backoff, || {
            run_command(&self.program, &args)
        })
        .await
        .map_err(TimerError::ActionPortFailure)?;
        Ok(())
    }
}

/// Writes notifications to the log only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl NotifyAction for LogNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        info!("{}: {}", NOTIFICATION_TITLE, message);
        Ok(())
    }
}
