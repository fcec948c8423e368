use firefly_core::PanelError;
use serde::Serialize;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::info;

/// Requested bot state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BotAction {
    Start,
    Stop,
}

impl FromStr for BotAction {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(BotAction::Start),
            "stop" => Ok(BotAction::Stop),
            other => Err(PanelError::Validation(format!("Unknown bot action: {}", other))),
        }
    }
}

impl Display for BotAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BotAction::Start => write!(f, "start"),
            BotAction::Stop => write!(f, "stop"),
        }
    }
}

/// Last requested bot state and protocol reconnect count.
///
/// Only the request is recorded; no bot process is started or stopped.
#[derive(Debug, Default)]
pub struct BotControl {
    running: AtomicBool,
    reconnects: AtomicU64,
}

impl BotControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(&self, action: BotAction) -> BotAction {
        self.running
            .store(action == BotAction::Start, Ordering::SeqCst);
        info!(action = %action, "Bot state requested");
        action
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Records a protocol reconnect and returns how many have been requested so far
    pub fn reconnect(&self) -> u64 {
        let count = self.reconnects.fetch_add(1, Ordering::SeqCst) + 1;
        info!(count, "Protocol reconnect requested");
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action() {
        assert_eq!("start".parse::<BotAction>().unwrap(), BotAction::Start);
        assert_eq!("stop".parse::<BotAction>().unwrap(), BotAction::Stop);
        assert!(matches!("restart".parse::<BotAction>(), Err(PanelError::Validation(_))));
    }

    #[test]
    fn test_toggle_and_reconnect() {
        let bot = BotControl::new();
        assert!(!bot.is_running());

        assert_eq!(bot.toggle(BotAction::Start), BotAction::Start);
        assert!(bot.is_running());
        bot.toggle(BotAction::Stop);
        assert!(!bot.is_running());

        assert_eq!(bot.reconnect(), 1);
        assert_eq!(bot.reconnect(), 2);
    }
}
