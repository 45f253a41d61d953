use chrono::NaiveTime;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::policy::{parse_minutes, parse_time_of_day, PolicyConfig};

#[derive(Debug, Parser)]
#[command(
    name = "script-timer",
    version,
    about = "Launch a script or program and close, repeat or schedule it on a timer",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Do not write status.toml
    #[arg(long, global = true)]
    pub no_status: bool,

    #[command(subcommand)]
    pub mode: Option<Mode>,

    /// Script to preselect in the interactive console
    pub target: Option<PathBuf>,
}

/// Runs a single policy without the console and exits when it is done.
#[derive(Debug, Subcommand)]
pub enum Mode {
    /// Run the script now and close it after MINUTES
    CloseAfter {
        #[arg(value_parser = parse_minutes)]
        minutes: u32,
        target: PathBuf,
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Run the script now and again every MINUTES until Ctrl+C
    RunEvery {
        #[arg(value_parser = parse_minutes)]
        minutes: u32,
        target: PathBuf,
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Start the script at TIME (HH:MM)
    StartAt {
        #[arg(value_parser = parse_time_of_day)]
        time: NaiveTime,
        target: PathBuf,
        /// Launch again every day at the same time until Ctrl+C
        #[arg(long)]
        daily: bool,
        #[arg(last = true)]
        args: Vec<String>,
    },
}

/// What the command line asked for.
#[derive(Debug, PartialEq, Eq)]
pub struct Plan {
    pub target: Option<(PathBuf, Vec<String>)>,
    /// Set for one-shot runs; `None` opens the console.
    pub policy: Option<PolicyConfig>,
}

impl Cli {
    pub fn plan(&self) -> Plan {
        match &self.mode {
            None => Plan {
                target: self.target.clone().map(|t| (t, Vec::new())),
                policy: None,
            },
            Some(Mode::CloseAfter {
                minutes,
                target,
                args,
            }) => Plan {
                target: Some((target.clone(), args.clone())),
                policy: Some(PolicyConfig::CloseAfter { minutes: *minutes }),
            },
            Some(Mode::RunEvery {
                minutes,
                target,
                args,
            }) => Plan {
                target: Some((target.clone(), args.clone())),
                policy: Some(PolicyConfig::RunEvery { minutes: *minutes }),
            },
            Some(Mode::StartAt {
                time,
                target,
                daily,
                args,
            }) => Plan {
                target: Some((target.clone(), args.clone())),
                policy: Some(PolicyConfig::StartAt {
                    time: *time,
                    repeat_daily: *daily,
                }),
            },
        }
    }
}
