//! Interactive console menu.
//!
//! Stdin is read on a dedicated OS thread, so a pending prompt never stalls
//! the event loop. Each completed dialog is forwarded as a
//! [`TimerEvent::Command`]. EOF on stdin counts as quit.
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use crate::config::{Config, PolicyDefaults};
use crate::error::TimerError;
use crate::event::{TimerEvent, UserCommand};
use crate::policy::{parse_minutes, parse_time_of_day, PolicyConfig};

const RULE: &str = "========================================";

/// Starts the console reader thread.
pub fn spawn(
    config: Arc<RwLock<Config>>,
    tx: mpsc::Sender<TimerEvent>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut out = io::stdout();

        loop {
            let defaults = config.blocking_read().defaults.clone();
            let command = match read_command(&mut input, &mut out, &defaults) {
                Ok(Some(command)) => command,
                Ok(None) => UserCommand::Quit,
                Err(e) => {
                    tracing::warn!(error = %e, "console input failed");
                    UserCommand::Quit
                }
            };
            let quit = command == UserCommand::Quit;
            if tx.blocking_send(TimerEvent::Command(command)).is_err() || quit {
                break;
            }
        }
    })
}

/// Shows the menu and runs one dialog. Invalid answers are reported and the
/// menu is shown again. Returns `None` on EOF.
pub fn read_command<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    defaults: &PolicyDefaults,
) -> io::Result<Option<UserCommand>> {
    loop {
        show_menu(out)?;
        let Some(choice) = prompt(input, out, "Select option: ")? else {
            return Ok(None);
        };

        let result = match choice.to_lowercase().as_str() {
            "1" => {
                let default = defaults.effective_close_after();
                ask_minutes(input, out, "Enter duration in minutes", default)?.map(|r| {
                    r.map(|minutes| UserCommand::Start(PolicyConfig::CloseAfter { minutes }))
                })
            }
            "2" => {
                let default = defaults.effective_run_every();
                ask_minutes(input, out, "Enter interval in minutes", default)?.map(|r| {
                    r.map(|minutes| UserCommand::Start(PolicyConfig::RunEvery { minutes }))
                })
            }
            "3" => ask_start_at(input, out)?,
            "4" => ask_target(input, out)?,
            "5" => Some(Ok(UserCommand::Stop)),
            "6" => Some(Ok(UserCommand::Status)),
            "q" | "quit" | "exit" => Some(Ok(UserCommand::Quit)),
            "" => continue,
            other => {
                writeln!(out, "Invalid option '{other}'. Please try again.")?;
                continue;
            }
        };

        match result {
            None => return Ok(None),
            Some(Ok(command)) => return Ok(Some(command)),
            Some(Err(e)) => writeln!(out, "Error: {e}")?,
        }
    }
}

fn show_menu<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "SCRIPT TIMER MENU")?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "1. Close script after x minutes")?;
    writeln!(out, "2. Run script every x minutes")?;
    writeln!(out, "3. Start script at specific time")?;
    writeln!(out, "4. Select script")?;
    writeln!(out, "5. Stop")?;
    writeln!(out, "6. Status")?;
    writeln!(out, "q. Quit")?;
    writeln!(out, "{RULE}")
}

/// Prints `question` and reads one trimmed line. `None` on EOF.
fn prompt<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    question: &str,
) -> io::Result<Option<String>> {
    write!(out, "{question}")?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

type Answer = Option<Result<UserCommand, TimerError>>;

fn ask_minutes<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    question: &str,
    default: u32,
) -> io::Result<Option<Result<u32, TimerError>>> {
    let Some(answer) = prompt(input, out, &format!("{question} [{default}]: "))? else {
        return Ok(None);
    };
    if answer.is_empty() {
        return Ok(Some(Ok(default)));
    }
    Ok(Some(parse_minutes(&answer)))
}

fn ask_start_at<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> io::Result<Answer> {
    let Some(answer) = prompt(input, out, "Enter time (HH:MM format): ")? else {
        return Ok(None);
    };
    let time = match parse_time_of_day(&answer) {
        Ok(time) => time,
        Err(e) => return Ok(Some(Err(e))),
    };
    let Some(repeat) = prompt(input, out, "Repeat daily? (y/n): ")? else {
        return Ok(None);
    };
    let repeat_daily = matches!(repeat.to_lowercase().as_str(), "y" | "yes");
    Ok(Some(Ok(UserCommand::Start(PolicyConfig::StartAt { time, repeat_daily }))))
}

fn ask_target<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> io::Result<Answer> {
    let Some(path) = prompt(input, out, "Enter full path to script/program: ")? else {
        return Ok(None);
    };
    if path.is_empty() {
        return Ok(Some(Err(TimerError::invalid_target("", "path is empty"))));
    }
    let Some(args) = prompt(input, out, "Arguments (optional): ")? else {
        return Ok(None);
    };
    Ok(Some(Ok(UserCommand::SelectTarget {
        path: PathBuf::from(path),
        args: args.split_whitespace().map(str::to_string).collect(),
    })))
}
