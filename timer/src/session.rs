//! The presentation-facing entry point: one selected target, one process
//! controller and one timer policy, owned together.
use std::path::PathBuf;

use crate::error::TimerError;
use crate::policy::{Moment, PolicyConfig, PolicyState, TickOutcome, TimerPolicy};
use crate::process::{ProcessControl, StopOutcome};
use crate::status::{TimerStatus, TIMESTAMP_FORMAT};
use crate::target::Target;

pub struct Session<C> {
    controller: C,
    policy: TimerPolicy,
    target: Option<Target>,
    last_error: Option<String>,
}

impl<C: ProcessControl> Session<C> {
    pub fn new(controller: C) -> Self {
        Self {
            controller,
            policy: TimerPolicy::new(),
            target: None,
            last_error: None,
        }
    }

    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    pub fn policy_state(&self) -> PolicyState {
        self.policy.state()
    }

    /// Selects a new target. Any tracked process is stopped and the policy
    /// returns to `Idle`. An invalid path leaves the current selection alone.
    pub async fn select_target(
        &mut self,
        path: impl Into<PathBuf>,
        args: Vec<String>,
    ) -> Result<&Target, TimerError> {
        let target = self.record(Target::new(path))?.with_args(args);
        self.policy.reset(&mut self.controller).await;
        tracing::info!(target = %target, "target selected");
        Ok(&*self.target.insert(target))
    }

    /// Starts `config` against the selected target.
    pub async fn start(
        &mut self,
        config: PolicyConfig,
        now: Moment,
    ) -> Result<Option<u32>, TimerError> {
        let Some(target) = self.target.as_ref() else {
            return self.record(Err(TimerError::NoTargetSelected));
        };
        let result = self
            .policy
            .start(config, target, &mut self.controller, now)
            .await;
        self.record(result)
    }

    /// Stops the managed process and cancels the active policy.
    pub async fn stop(&mut self) -> StopOutcome {
        self.policy.stop(&mut self.controller).await
    }

    pub async fn on_tick(&mut self, now: Moment) -> Result<TickOutcome, TimerError> {
        let Some(target) = self.target.as_ref() else {
            return Ok(TickOutcome::Inactive);
        };
        let result = self.policy.on_tick(now, target, &mut self.controller).await;
        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => self.record(Err(e)),
        }
    }

    /// True once no policy is running and no process is alive. The one-shot
    /// command line exits at this point.
    pub fn is_finished(&mut self) -> bool {
        self.policy_state() != PolicyState::Running && !self.controller.is_running()
    }

    pub fn query_status(&mut self) -> TimerStatus {
        let running = self.controller.is_running();
        TimerStatus {
            state: self.policy.state(),
            running,
            launches: self.policy.launches(),
            target: self.target.as_ref().map(ToString::to_string),
            policy: self.policy.config().map(|c| c.to_string()),
            pid: self.controller.pid(),
            process_started: self
                .controller
                .started_at()
                .map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
            last_launch: self
                .policy
                .last_launch()
                .map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
            next_launch: self
                .policy
                .next_run()
                .map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
            last_exit_code: self.controller.last_exit_code(),
            error: self.last_error.clone(),
            ..TimerStatus::new()
        }
    }

    /// Keeps `last_error` in step with the outcome of a user-visible operation.
    fn record<T>(&mut self, result: Result<T, TimerError>) -> Result<T, TimerError> {
        match &result {
            Ok(_) => self.last_error = None,
            Err(e) => self.last_error = Some(e.to_string()),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::FakeController;
    use chrono::{Duration, NaiveDate, NaiveTime};
    use tokio::time::Instant;

    fn at(h: u32, m: u32, s: u32) -> Moment {
        Moment::at(
            NaiveDate::from_ymd_opt(2024, 3, 10)
                .unwrap()
                .and_hms_opt(h, m, s)
                .unwrap(),
        )
    }

    fn exe() -> PathBuf {
        std::env::current_exe().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn start_without_target_is_reported() {
        let mut session = Session::new(FakeController::default());
        let err = session
            .start(PolicyConfig::CloseAfter { minutes: 1 }, at(9, 0, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, TimerError::NoTargetSelected));

        let status = session.query_status();
        assert_eq!(status.state, PolicyState::Idle);
        assert_eq!(status.error.as_deref(), Some("no script selected"));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_target_keeps_state_idle() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(FakeController::default());
        let err = session
            .select_target(dir.path().join("missing.sh"), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TimerError::InvalidTargetPath { .. }));
        assert!(session.target().is_none());
        assert_eq!(session.policy_state(), PolicyState::Idle);
        assert!(session.query_status().error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn reselecting_target_resets_to_idle_and_stops_process() {
        let mut session = Session::new(FakeController::default());
        session.select_target(exe(), Vec::new()).await.unwrap();
        session
            .start(PolicyConfig::RunEvery { minutes: 5 }, at(9, 0, 0))
            .await
            .unwrap();
        assert!(session.controller_mut().running);

        session
            .select_target(exe(), vec!["--flag".to_string()])
            .await
            .unwrap();
        assert_eq!(session.policy_state(), PolicyState::Idle);
        assert!(!session.controller_mut().running);
        assert_eq!(session.target().unwrap().args(), ["--flag"]);
    }

    #[tokio::test(start_paused = true)]
    async fn status_reflects_running_policy() {
        let mut session = Session::new(FakeController::default());
        session.select_target(exe(), Vec::new()).await.unwrap();
        let pid = session
            .start(PolicyConfig::RunEvery { minutes: 30 }, at(9, 0, 0))
            .await
            .unwrap();

        let status = session.query_status();
        assert_eq!(status.state, PolicyState::Running);
        assert!(status.running);
        assert_eq!(status.pid, pid);
        assert_eq!(status.policy.as_deref(), Some("run every 30 minutes"));
        assert_eq!(status.launches, 1);
        assert_eq!(status.last_launch.as_deref(), Some("2024-03-10 09:00:00"));
        assert!(status.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn status_shows_next_scheduled_launch() {
        let mut session = Session::new(FakeController::default());
        session.select_target(exe(), Vec::new()).await.unwrap();
        session
            .start(
                PolicyConfig::StartAt {
                    time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
                    repeat_daily: true,
                },
                at(9, 0, 0),
            )
            .await
            .unwrap();

        let status = session.query_status();
        assert!(!status.running);
        assert_eq!(status.next_launch.as_deref(), Some("2024-03-10 18:00:00"));
    }

    #[tokio::test(start_paused = true)]
    async fn successful_start_clears_previous_error() {
        let mut session = Session::new(FakeController::default());
        let _ = session
            .start(PolicyConfig::CloseAfter { minutes: 1 }, at(9, 0, 0))
            .await;
        assert!(session.query_status().error.is_some());

        session.select_target(exe(), Vec::new()).await.unwrap();
        session
            .start(PolicyConfig::CloseAfter { minutes: 1 }, at(9, 0, 0))
            .await
            .unwrap();
        assert!(session.query_status().error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn tick_failure_is_recorded() {
        let mut session = Session::new(FakeController::default());
        session.select_target(exe(), Vec::new()).await.unwrap();
        session
            .start(PolicyConfig::RunEvery { minutes: 1 }, at(9, 0, 0))
            .await
            .unwrap();
        session.controller_mut().fail_next_start = true;

        assert!(session.on_tick(at(9, 1, 0)).await.is_err());
        let status = session.query_status();
        assert_eq!(status.state, PolicyState::Stopped);
        assert!(status.error.unwrap().contains("failed to launch"));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_without_process_is_harmless() {
        let mut session = Session::new(FakeController::default());
        assert_eq!(session.stop().await, StopOutcome::NotRunning);
        assert!(!session.query_status().running);
        assert!(session.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn finished_once_close_after_elapses() {
        let mut session = Session::new(FakeController::default());
        session.select_target(exe(), Vec::new()).await.unwrap();
        session
            .start(PolicyConfig::CloseAfter { minutes: 1 }, at(9, 0, 0))
            .await
            .unwrap();
        assert!(!session.is_finished());

        let outcome = session
            .on_tick(at(9, 0, 0).after(std::time::Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(outcome, TickOutcome::Closed);
        assert!(session.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn close_after_follows_real_time_not_wall_clock() {
        let mut session = Session::new(FakeController::default());
        session.select_target(exe(), Vec::new()).await.unwrap();
        let start = Moment::now();
        session
            .start(PolicyConfig::CloseAfter { minutes: 60 }, start)
            .await
            .unwrap();

        // Ten minutes pass while the local clock springs forward an hour.
        tokio::time::advance(std::time::Duration::from_secs(10 * 60)).await;
        let jumped = Moment {
            wall: start.wall + Duration::minutes(70),
            instant: Instant::now(),
        };
        assert_eq!(session.on_tick(jumped).await.unwrap(), TickOutcome::Waiting);
        assert!(session.query_status().running);

        tokio::time::advance(std::time::Duration::from_secs(50 * 60)).await;
        let due = Moment {
            wall: start.wall + Duration::minutes(120),
            instant: Instant::now(),
        };
        assert_eq!(session.on_tick(due).await.unwrap(), TickOutcome::Closed);
        assert!(!session.query_status().running);
    }
}
