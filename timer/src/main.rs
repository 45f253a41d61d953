mod cli;
mod config;
mod console;
mod error;
mod event;
mod paths;
mod policy;
mod process;
mod session;
mod status;
mod target;
mod ticker;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing_subscriber::EnvFilter;

use crate::event::{TimerEvent, UserCommand};
use crate::policy::{Moment, PolicyConfig, TickOutcome};
use crate::process::{ProcessController, StopOutcome};
use crate::session::Session;
use crate::status::TimerStatus;

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics go to stderr; stdout is for the console dialog.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("script_timer=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    let plan = cli.plan();

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = match cli.config.clone() {
        Some(path) => Some(path),
        None => paths::config_file_path()
            .inspect_err(|e| tracing::warn!("config file disabled: {e:#}"))
            .ok(),
    };
    let initial_config = match &config_path {
        Some(path) => config::load_or_default(path).unwrap_or_else(|e| {
            tracing::warn!("using default config: {e:#}");
            config::Config::default()
        }),
        None => config::Config::default(),
    };
    let shared_config = Arc::new(RwLock::new(initial_config.clone()));

    // ── Status file ───────────────────────────────────────────────────────────
    // An explicit --config keeps status.toml next to it.
    let status_path: Option<PathBuf> = if cli.no_status {
        None
    } else if let Some(path) = &cli.config {
        Some(path.with_file_name(paths::STATUS_FILE_NAME))
    } else {
        paths::status_file_path().ok()
    };
    let mut write_status = initial_config.general.write_status;

    // ── Session ───────────────────────────────────────────────────────────────
    let mut session = Session::new(ProcessController::new(
        initial_config.general.effective_grace_period(),
    ));
    let one_shot = plan.policy.is_some();

    if let Some((path, args)) = plan.target {
        match session.select_target(path, args).await {
            Ok(target) => println!("Selected script: {}", target.display_name()),
            Err(e) if one_shot => return Err(e.into()),
            Err(e) => println!("Error: {e}"),
        }
    }

    let (event_tx, mut event_rx) = mpsc::channel::<TimerEvent>(32);

    // ── Background tasks ──────────────────────────────────────────────────────
    if let Some(path) = config_path.clone() {
        tokio::spawn(config::watch_config(path, event_tx.clone()));
    }
    tokio::spawn(ticker::run(Arc::clone(&shared_config), event_tx.clone()));

    // Graceful shutdown on Ctrl+C.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(TimerEvent::Shutdown).await;
            }
        });
    }

    if let Some(policy) = plan.policy {
        session.start(policy, Moment::now()).await?;
        announce_start(policy, &session.query_status());
    } else {
        println!("script-timer v{} started", env!("CARGO_PKG_VERSION"));
        console::spawn(Arc::clone(&shared_config), event_tx.clone());
    }

    let mut current_status = session.query_status();
    if write_status {
        publish(&status_path, &current_status);
    }

    // ── Event loop ────────────────────────────────────────────────────────────
    while let Some(evt) = event_rx.recv().await {
        let mut quit = false;

        match evt {
            TimerEvent::Tick(now) => {
                let name = session
                    .target()
                    .map(|t| t.display_name())
                    .unwrap_or_default();
                match session.on_tick(now).await {
                    Ok(TickOutcome::Launched { pid }) => {
                        println!("Script scheduled started: {name} (pid {pid})");
                    }
                    Ok(TickOutcome::Relaunched { pid }) => {
                        println!("Script started: {name} (pid {pid})");
                    }
                    Ok(TickOutcome::Skipped { next }) => {
                        println!(
                            "Script still running at its scheduled time; next start at {}",
                            next.format(status::TIMESTAMP_FORMAT)
                        );
                    }
                    Ok(TickOutcome::Closed) => println!("Script closed after specified time."),
                    Ok(TickOutcome::ProcessExited) => println!("Script completed execution"),
                    Ok(TickOutcome::Waiting | TickOutcome::Inactive) => {
                        let status = session.query_status();
                        if current_status.running && !status.running {
                            println!("Script completed execution");
                        }
                    }
                    Err(e) => println!("Error running script: {e}"),
                }
                quit = one_shot && session.is_finished();
            }

            TimerEvent::Command(command) => match command {
                UserCommand::SelectTarget { path, args } => {
                    match session.select_target(path, args).await {
                        Ok(target) => println!("Selected script: {}", target.display_name()),
                        Err(e) => println!("Error: {e}"),
                    }
                }
                UserCommand::Start(policy) => {
                    match session.start(policy, Moment::now()).await {
                        Ok(_) => announce_start(policy, &session.query_status()),
                        Err(e) => println!("Error: {e}"),
                    }
                }
                UserCommand::Stop => {
                    report_stop(session.stop().await);
                    println!("All timers stopped");
                }
                UserCommand::Status => println!("{}", session.query_status()),
                UserCommand::Quit => quit = true,
            },

            TimerEvent::ConfigReloaded(new_config) => {
                let controller = session.controller_mut();
                controller.set_grace_period(new_config.general.effective_grace_period());
                tracing::info!(
                    grace_secs = controller.grace_period().as_secs_f32(),
                    tick_ms = new_config.general.effective_tick_interval().as_millis() as u64,
                    "config reloaded"
                );
                write_status = new_config.general.write_status;
                *shared_config.write().await = new_config;
            }

            TimerEvent::Shutdown => {
                println!("\nStopping...");
                quit = true;
            }
        }

        if quit {
            report_stop(session.stop().await);
            break;
        }

        let status = session.query_status();
        if status != current_status {
            if write_status {
                publish(&status_path, &status);
            }
            current_status = status;
        }
    }

    if write_status {
        publish(&status_path, &session.query_status());
    }
    println!("Goodbye!");
    Ok(())
}

fn announce_start(policy: PolicyConfig, status: &TimerStatus) {
    match policy {
        PolicyConfig::CloseAfter { minutes } => println!("Running script for {minutes} minutes"),
        PolicyConfig::RunEvery { minutes } => {
            println!("Script will repeat every {minutes} minutes (Ctrl+C or Stop to end)")
        }
        PolicyConfig::StartAt { repeat_daily, .. } => {
            let when = status.next_launch.as_deref().unwrap_or("-");
            if repeat_daily {
                println!("Script scheduled to run daily, next at {when}");
            } else {
                println!("Script scheduled to run once at {when}");
            }
        }
    }
}

fn report_stop(outcome: StopOutcome) {
    match outcome {
        StopOutcome::NotRunning => {}
        StopOutcome::Exited => println!("Script stopped."),
        StopOutcome::Killed => println!("Script did not exit in time and was killed."),
    }
}

fn publish(path: &Option<PathBuf>, status: &TimerStatus) {
    if let Some(path) = path {
        status::write_status(path, status);
    }
}
