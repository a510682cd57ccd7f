//! Refresh scheduling state: a per-pattern run state machine and the
//! declarative cadence configuration the orchestrator consumes.
//!
//! The state machine guarantees at most one concurrent run per pattern type
//! and records outcomes without ever blocking another pattern's schedule;
//! a `Failed` run simply waits for its own next tick.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::pattern::PatternKind;

/// Lifecycle of one pattern type's refresh: Idle → Running → {Succeeded,
/// Failed} → Idle. Succeeded/Failed are the recorded outcome of the last
/// run; both permit starting the next one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("refresh for {pattern} is already running")]
    AlreadyRunning { pattern: PatternKind },
    #[error("invalid run transition for {pattern}: {from:?} -> {to:?}")]
    InvalidTransition { pattern: PatternKind, from: RunState, to: RunState },
}

/// Tracked state for one pattern type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternRun {
    pub pattern: PatternKind,
    pub state: RunState,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub runs_completed: u32,
}

impl PatternRun {
    pub fn new(pattern: PatternKind) -> Self {
        Self {
            pattern,
            state: RunState::Idle,
            last_started_at: None,
            last_finished_at: None,
            last_success_at: None,
            last_error: None,
            consecutive_failures: 0,
            runs_completed: 0,
        }
    }

    /// Claim the run slot. Fails while a run is in flight.
    pub fn begin(&mut self, now: DateTime<Utc>) -> Result<(), ScheduleError> {
        if self.state == RunState::Running {
            return Err(ScheduleError::AlreadyRunning { pattern: self.pattern });
        }
        self.state = RunState::Running;
        self.last_started_at = Some(now);
        Ok(())
    }

    pub fn succeed(&mut self, now: DateTime<Utc>) -> Result<(), ScheduleError> {
        self.finish(now, RunState::Succeeded, None)
    }

    pub fn fail(&mut self, now: DateTime<Utc>, error: impl Into<String>) -> Result<(), ScheduleError> {
        self.finish(now, RunState::Failed, Some(error.into()))
    }

    fn finish(
        &mut self,
        now: DateTime<Utc>,
        outcome: RunState,
        error: Option<String>,
    ) -> Result<(), ScheduleError> {
        if self.state != RunState::Running {
            return Err(ScheduleError::InvalidTransition {
                pattern: self.pattern,
                from: self.state,
                to: outcome,
            });
        }
        self.state = outcome;
        self.last_finished_at = Some(now);
        self.runs_completed += 1;
        match outcome {
            RunState::Succeeded => {
                self.last_success_at = Some(now);
                self.last_error = None;
                self.consecutive_failures = 0;
            }
            RunState::Failed => {
                self.last_error = error;
                self.consecutive_failures += 1;
            }
            RunState::Idle | RunState::Running => unreachable!("finish only settles outcomes"),
        }
        Ok(())
    }
}

/// Shared view over all five pattern runs.
#[derive(Clone, Debug)]
pub struct ScheduleBoard {
    runs: HashMap<PatternKind, PatternRun>,
}

impl Default for ScheduleBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleBoard {
    pub fn new() -> Self {
        let runs =
            PatternKind::ALL.iter().map(|kind| (*kind, PatternRun::new(*kind))).collect();
        Self { runs }
    }

    pub fn begin(&mut self, pattern: PatternKind, now: DateTime<Utc>) -> Result<(), ScheduleError> {
        self.run_mut(pattern).begin(now)
    }

    pub fn succeed(
        &mut self,
        pattern: PatternKind,
        now: DateTime<Utc>,
    ) -> Result<(), ScheduleError> {
        self.run_mut(pattern).succeed(now)
    }

    pub fn fail(
        &mut self,
        pattern: PatternKind,
        now: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Result<(), ScheduleError> {
        self.run_mut(pattern).fail(now, error)
    }

    pub fn run(&self, pattern: PatternKind) -> Option<&PatternRun> {
        self.runs.get(&pattern)
    }

    pub fn snapshot(&self) -> Vec<PatternRun> {
        let mut runs: Vec<PatternRun> = self.runs.values().cloned().collect();
        runs.sort_by_key(|run| run.pattern.as_str());
        runs
    }

    fn run_mut(&mut self, pattern: PatternKind) -> &mut PatternRun {
        self.runs.entry(pattern).or_insert_with(|| PatternRun::new(pattern))
    }
}

/// Declarative per-pattern refresh cadence plus the per-job timeout.
///
/// The cadence says how often a pattern should be recomputed; it never leaks
/// into the computations themselves. Calling a refresh entry point more often
/// than its cadence is safe (it recomputes from the same window).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CadenceConfig {
    pub preference_secs: u64,
    pub session_context_secs: u64,
    pub reorder_secs: u64,
    pub association_secs: u64,
    pub behavior_secs: u64,
    pub job_timeout_secs: u64,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            preference_secs: 3_600,
            session_context_secs: 3_600,
            reorder_secs: 21_600,
            association_secs: 86_400,
            behavior_secs: 86_400,
            job_timeout_secs: 300,
        }
    }
}

impl CadenceConfig {
    pub fn period(&self, pattern: PatternKind) -> Duration {
        let secs = match pattern {
            PatternKind::Preference => self.preference_secs,
            PatternKind::SessionContext => self.session_context_secs,
            PatternKind::Reorder => self.reorder_secs,
            PatternKind::Association => self.association_secs,
            PatternKind::Behavior => self.behavior_secs,
        };
        Duration::from_secs(secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        let cadences = [
            ("preference_secs", self.preference_secs),
            ("session_context_secs", self.session_context_secs),
            ("reorder_secs", self.reorder_secs),
            ("association_secs", self.association_secs),
            ("behavior_secs", self.behavior_secs),
            ("job_timeout_secs", self.job_timeout_secs),
        ];
        for (name, value) in cadences {
            if value == 0 {
                return Err(format!("refresh cadence `{name}` must be greater than zero"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn run_walks_idle_running_outcome() {
        let mut run = PatternRun::new(PatternKind::Preference);
        assert_eq!(run.state, RunState::Idle);

        run.begin(now()).unwrap();
        assert_eq!(run.state, RunState::Running);

        run.succeed(now()).unwrap();
        assert_eq!(run.state, RunState::Succeeded);
        assert_eq!(run.consecutive_failures, 0);
        assert_eq!(run.runs_completed, 1);
        assert!(run.last_success_at.is_some());
    }

    #[test]
    fn only_one_concurrent_run_per_pattern() {
        let mut run = PatternRun::new(PatternKind::Reorder);
        run.begin(now()).unwrap();
        assert_eq!(
            run.begin(now()),
            Err(ScheduleError::AlreadyRunning { pattern: PatternKind::Reorder })
        );
    }

    #[test]
    fn failure_records_error_and_allows_the_next_run() {
        let mut run = PatternRun::new(PatternKind::Association);
        run.begin(now()).unwrap();
        run.fail(now(), "store unavailable").unwrap();
        assert_eq!(run.state, RunState::Failed);
        assert_eq!(run.last_error.as_deref(), Some("store unavailable"));
        assert_eq!(run.consecutive_failures, 1);

        // Failed settles; the next tick can begin again.
        run.begin(now()).unwrap();
        run.succeed(now()).unwrap();
        assert_eq!(run.consecutive_failures, 0);
        assert_eq!(run.last_error, None);
    }

    #[test]
    fn finishing_without_a_running_run_is_invalid() {
        let mut run = PatternRun::new(PatternKind::Behavior);
        assert!(matches!(
            run.succeed(now()),
            Err(ScheduleError::InvalidTransition { from: RunState::Idle, .. })
        ));
    }

    #[test]
    fn board_isolates_pattern_states() {
        let mut board = ScheduleBoard::new();
        board.begin(PatternKind::Preference, now()).unwrap();
        board.fail(PatternKind::Preference, now(), "boom").unwrap();

        // The preference failure does not affect the association run.
        board.begin(PatternKind::Association, now()).unwrap();
        board.succeed(PatternKind::Association, now()).unwrap();

        assert_eq!(board.run(PatternKind::Preference).unwrap().state, RunState::Failed);
        assert_eq!(board.run(PatternKind::Association).unwrap().state, RunState::Succeeded);
        assert_eq!(board.run(PatternKind::Reorder).unwrap().state, RunState::Idle);
    }

    #[test]
    fn default_cadences_match_the_schedule_contract() {
        let cadence = CadenceConfig::default();
        assert_eq!(cadence.period(PatternKind::Preference), Duration::from_secs(3_600));
        assert_eq!(cadence.period(PatternKind::SessionContext), Duration::from_secs(3_600));
        assert_eq!(cadence.period(PatternKind::Reorder), Duration::from_secs(21_600));
        assert_eq!(cadence.period(PatternKind::Association), Duration::from_secs(86_400));
        assert_eq!(cadence.period(PatternKind::Behavior), Duration::from_secs(86_400));
        assert!(cadence.validate().is_ok());
    }

    #[test]
    fn zero_cadence_fails_validation() {
        let cadence = CadenceConfig { reorder_secs: 0, ..CadenceConfig::default() };
        assert!(cadence.validate().is_err());
    }
}
