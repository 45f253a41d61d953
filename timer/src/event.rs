use std::path::PathBuf;

use crate::config::Config;
use crate::policy::{Moment, PolicyConfig};

pub enum TimerEvent {
    /// Periodic tick carrying the current wall-clock and monotonic time.
    Tick(Moment),
    /// Something the user asked for at the console.
    Command(UserCommand),
    /// The config file changed on disk and was successfully re-parsed.
    ConfigReloaded(Config),
    /// Ctrl+C received; stop the managed process and exit.
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    SelectTarget { path: PathBuf, args: Vec<String> },
    Start(PolicyConfig),
    Stop,
    Status,
    Quit,
}
