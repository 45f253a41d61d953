//! Timer policies: close after a duration, relaunch on an interval, or launch
//! at a time of day.
//!
//! A [`TimerPolicy`] never reads the clock itself. The host feeds it a
//! [`Moment`] through [`TimerPolicy::start`] and [`TimerPolicy::on_tick`],
//! which keeps every decision deterministic under test. Time-of-day schedules
//! match against the local wall clock; run durations are measured on the
//! monotonic clock so DST shifts and clock steps never shorten them.
use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

use crate::error::TimerError;
use crate::process::{ProcessControl, StopOutcome};
use crate::target::Target;

pub const MIN_MINUTES: u32 = 1;
pub const MAX_MINUTES: u32 = 10_000;

/// Which timing behaviour is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyConfig {
    /// Launch now, terminate after `minutes`.
    CloseAfter { minutes: u32 },
    /// Launch now and relaunch every `minutes`.
    RunEvery { minutes: u32 },
    /// Launch at `time`, once or every day.
    StartAt { time: NaiveTime, repeat_daily: bool },
}

impl PolicyConfig {
    pub fn validate(&self) -> Result<(), TimerError> {
        match *self {
            Self::CloseAfter { minutes } | Self::RunEvery { minutes } => check_minutes(minutes),
            // NaiveTime cannot hold an invalid time of day.
            Self::StartAt { .. } => Ok(()),
        }
    }
}

impl fmt::Display for PolicyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CloseAfter { minutes } => write!(f, "close after {}", plural_minutes(*minutes)),
            Self::RunEvery { minutes } => write!(f, "run every {}", plural_minutes(*minutes)),
            Self::StartAt {
                time,
                repeat_daily: true,
            } => write!(f, "start daily at {}", time.format("%H:%M")),
            Self::StartAt {
                time,
                repeat_daily: false,
            } => write!(f, "start once at {}", time.format("%H:%M")),
        }
    }
}

fn plural_minutes(minutes: u32) -> String {
    if minutes == 1 {
        "1 minute".to_string()
    } else {
        format!("{minutes} minutes")
    }
}

fn check_minutes(minutes: u32) -> Result<(), TimerError> {
    if (MIN_MINUTES..=MAX_MINUTES).contains(&minutes) {
        Ok(())
    } else {
        Err(TimerError::InvalidPolicyParameter(format!(
            "minutes must be between {MIN_MINUTES} and {MAX_MINUTES}, got {minutes}"
        )))
    }
}

/// Parses a minute count as typed by the user.
pub fn parse_minutes(input: &str) -> Result<u32, TimerError> {
    let minutes = input.trim().parse::<u32>().map_err(|_| {
        TimerError::InvalidPolicyParameter(format!("'{}' is not a number of minutes", input.trim()))
    })?;
    check_minutes(minutes)?;
    Ok(minutes)
}

/// Parses a `HH:MM` wall-clock time (24-hour).
pub fn parse_time_of_day(input: &str) -> Result<NaiveTime, TimerError> {
    let input = input.trim();
    let malformed = || {
        TimerError::InvalidPolicyParameter(format!(
            "'{input}' is not a valid time; use HH:MM, e.g. 14:30"
        ))
    };
    let (hour, minute) = input.split_once(':').ok_or_else(malformed)?;
    let hour: u32 = hour.trim().parse().map_err(|_| malformed())?;
    let minute: u32 = minute.trim().parse().map_err(|_| malformed())?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(malformed)
}

/// First occurrence of `time` strictly after `now`: later today if the time
/// has not passed yet, otherwise tomorrow.
pub fn next_occurrence(now: NaiveDateTime, time: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(time);
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

/// A point in time on both clocks the policy cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Moment {
    /// Local wall-clock time, for `StartAt` matching and display.
    pub wall: NaiveDateTime,
    /// Monotonic time, for elapsed durations.
    pub instant: Instant,
}

impl Moment {
    pub fn now() -> Self {
        Self {
            wall: chrono::Local::now().naive_local(),
            instant: Instant::now(),
        }
    }

    /// `self` moved forward by `elapsed` on both clocks.
    pub fn after(self, elapsed: std::time::Duration) -> Self {
        let wall = Duration::from_std(elapsed)
            .ok()
            .and_then(|d| self.wall.checked_add_signed(d))
            .unwrap_or(self.wall);
        Self {
            wall,
            instant: self.instant + elapsed,
        }
    }
}

#[cfg(test)]
impl Moment {
    /// Synthetic moment whose monotonic part tracks `wall` from a fixed
    /// origin, so tests can reason in wall-clock terms.
    pub fn at(wall: NaiveDateTime) -> Self {
        use std::sync::OnceLock;
        static ORIGIN: OnceLock<Instant> = OnceLock::new();
        let origin = *ORIGIN.get_or_init(Instant::now);
        let epoch = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Self {
            wall,
            instant: origin + (wall - epoch).to_std().unwrap(),
        }
    }
}

fn minutes(count: u32) -> std::time::Duration {
    std::time::Duration::from_secs(u64::from(count) * 60)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyState {
    /// No policy has been started since the target was selected.
    #[default]
    Idle,
    /// A policy is active and consuming ticks.
    Running,
    /// The last policy was stopped by the user or ran to completion.
    Stopped,
}

impl fmt::Display for PolicyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No policy is running.
    Inactive,
    /// Running, but nothing was due.
    Waiting,
    /// A scheduled launch happened.
    Launched { pid: u32 },
    /// A scheduled launch was due while the previous run was still alive, so
    /// that occurrence was dropped.
    Skipped { next: NaiveDateTime },
    /// The interval elapsed and the process was restarted.
    Relaunched { pid: u32 },
    /// The close-after duration elapsed and the process was stopped.
    Closed,
    /// The process exited on its own before the close-after duration.
    ProcessExited,
}

#[derive(Debug, Default)]
pub struct TimerPolicy {
    state: PolicyState,
    config: Option<PolicyConfig>,
    last_launch: Option<Moment>,
    next_run: Option<NaiveDateTime>,
    launches: u32,
}

impl TimerPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PolicyState {
        self.state
    }

    pub fn config(&self) -> Option<PolicyConfig> {
        self.config
    }

    pub fn launches(&self) -> u32 {
        self.launches
    }

    pub fn last_launch(&self) -> Option<NaiveDateTime> {
        self.last_launch.map(|m| m.wall)
    }

    /// When a `StartAt` policy will next launch.
    pub fn next_run(&self) -> Option<NaiveDateTime> {
        self.next_run
    }

    /// Activates `config`. `CloseAfter` and `RunEvery` launch immediately;
    /// `StartAt` only computes its first due time. Returns the pid when a
    /// process was launched.
    ///
    /// A running activation is stopped first, and any process still alive
    /// from an earlier activation is stopped before an immediate launch so
    /// two instances never overlap. If the launch fails the policy keeps its
    /// previous `Idle`/`Stopped` state.
    pub async fn start<C>(
        &mut self,
        config: PolicyConfig,
        target: &Target,
        controller: &mut C,
        now: Moment,
    ) -> Result<Option<u32>, TimerError>
    where
        C: ProcessControl + ?Sized,
    {
        config.validate()?;
        let began = Instant::now();
        if self.state == PolicyState::Running {
            self.stop(controller).await;
        }

        match config {
            PolicyConfig::CloseAfter { .. } | PolicyConfig::RunEvery { .. } => {
                if controller.is_running() {
                    controller.stop().await;
                }
                let pid = controller.start(target)?;
                self.activate(config);
                // Stopping the old process may have taken up to a grace period.
                self.record_launch(now.after(began.elapsed()));
                tracing::info!(policy = %config, pid, "policy started");
                Ok(Some(pid))
            }
            PolicyConfig::StartAt { time, .. } => {
                self.activate(config);
                let due = next_occurrence(now.wall, time);
                self.next_run = Some(due);
                tracing::info!(policy = %config, due = %due, "policy scheduled");
                Ok(None)
            }
        }
    }

    /// User stop: terminates the process and cancels anything scheduled.
    pub async fn stop<C>(&mut self, controller: &mut C) -> StopOutcome
    where
        C: ProcessControl + ?Sized,
    {
        let outcome = controller.stop().await;
        if self.state == PolicyState::Running {
            tracing::info!(outcome = ?outcome, "policy stopped");
            self.finish();
        }
        outcome
    }

    /// Drops back to `Idle`, stopping the process. Used when the target changes.
    pub async fn reset<C>(&mut self, controller: &mut C) -> StopOutcome
    where
        C: ProcessControl + ?Sized,
    {
        let outcome = controller.stop().await;
        *self = Self::default();
        outcome
    }

    /// Evaluates the active policy against `now`.
    ///
    /// A failed relaunch leaves the policy `Stopped` and returns the error.
    pub async fn on_tick<C>(
        &mut self,
        now: Moment,
        target: &Target,
        controller: &mut C,
    ) -> Result<TickOutcome, TimerError>
    where
        C: ProcessControl + ?Sized,
    {
        if self.state != PolicyState::Running {
            return Ok(TickOutcome::Inactive);
        }
        let Some(config) = self.config else {
            return Ok(TickOutcome::Inactive);
        };

        match config {
            PolicyConfig::CloseAfter { minutes: limit } => {
                if self.elapsed(now) >= minutes(limit) {
                    let outcome = controller.stop().await;
                    tracing::info!(outcome = ?outcome, "close-after duration reached");
                    self.finish();
                    Ok(TickOutcome::Closed)
                } else if !controller.is_running() {
                    self.finish();
                    Ok(TickOutcome::ProcessExited)
                } else {
                    Ok(TickOutcome::Waiting)
                }
            }
            PolicyConfig::RunEvery { minutes: interval } => {
                if self.elapsed(now) < minutes(interval) {
                    return Ok(TickOutcome::Waiting);
                }
                let began = Instant::now();
                controller.stop().await;
                let pid = self.launch(target, controller)?;
                // The interval counts from the actual spawn, after the stop.
                self.record_launch(now.after(began.elapsed()));
                Ok(TickOutcome::Relaunched { pid })
            }
            PolicyConfig::StartAt { time, repeat_daily } => {
                let due = match self.next_run {
                    Some(due) if now.wall >= due => due,
                    _ => return Ok(TickOutcome::Waiting),
                };
                if controller.is_running() {
                    let next = next_occurrence(now.wall, time);
                    tracing::debug!(
                        due = %due,
                        next = %next,
                        "previous run still alive; occurrence skipped"
                    );
                    self.next_run = Some(next);
                    return Ok(TickOutcome::Skipped { next });
                }
                let pid = self.launch(target, controller)?;
                self.record_launch(now);
                if repeat_daily {
                    self.next_run = Some(next_occurrence(now.wall, time));
                } else {
                    self.finish();
                }
                Ok(TickOutcome::Launched { pid })
            }
        }
    }

    fn launch<C>(&mut self, target: &Target, controller: &mut C) -> Result<u32, TimerError>
    where
        C: ProcessControl + ?Sized,
    {
        controller.start(target).inspect_err(|e| {
            tracing::warn!(error = %e, "launch failed; policy stopped");
            self.finish();
        })
    }

    fn activate(&mut self, config: PolicyConfig) {
        self.state = PolicyState::Running;
        self.config = Some(config);
        self.last_launch = None;
        self.next_run = None;
        self.launches = 0;
    }

    fn record_launch(&mut self, at: Moment) {
        self.last_launch = Some(at);
        self.launches += 1;
    }

    fn finish(&mut self) {
        self.state = PolicyState::Stopped;
        self.config = None;
        self.next_run = None;
    }

    /// Monotonic time since the last launch.
    fn elapsed(&self, now: Moment) -> std::time::Duration {
        self.last_launch
            .map(|launched| now.instant.saturating_duration_since(launched.instant))
            .unwrap_or_default()
    }
}
