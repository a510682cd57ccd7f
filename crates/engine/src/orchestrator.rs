//! Continuous mode: one task per pattern type, each on its own cadence.
//!
//! A slow or failing pattern never delays another; each task owns its
//! interval, and run outcomes land on a shared schedule board that status
//! reporting reads.

use std::sync::Arc;

use basketry_core::domain::pattern::PatternKind;
use basketry_core::schedule::{CadenceConfig, PatternRun, ScheduleBoard};
use basketry_db::event_store::EventStore;
use basketry_db::pattern_store::PatternStore;
use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::refresh::RefreshEngine;

pub struct Orchestrator<E, P> {
    engine: RefreshEngine<E, P>,
    cadence: CadenceConfig,
    board: Arc<Mutex<ScheduleBoard>>,
}

impl<E, P> Orchestrator<E, P>
where
    E: EventStore + 'static,
    P: PatternStore + 'static,
{
    pub fn new(engine: RefreshEngine<E, P>, cadence: CadenceConfig) -> Self {
        Self { engine, cadence, board: Arc::new(Mutex::new(ScheduleBoard::new())) }
    }

    pub fn board(&self) -> Arc<Mutex<ScheduleBoard>> {
        Arc::clone(&self.board)
    }

    /// Spawn the per-pattern refresh loops. Each loop fires immediately on
    /// startup and then on its cadence until shutdown.
    pub fn spawn(self) -> OrchestratorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::with_capacity(PatternKind::ALL.len());

        for pattern in PatternKind::ALL {
            let engine = self.engine.clone();
            let board = Arc::clone(&self.board);
            let cadence = self.cadence;
            let mut shutdown = shutdown_rx.clone();

            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(cadence.period(pattern));
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                tracing::info!(
                    pattern = pattern.as_str(),
                    period_secs = cadence.period(pattern).as_secs(),
                    "refresh loop started"
                );

                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            run_scheduled(&engine, &board, pattern, &cadence).await;
                        }
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                tracing::info!(pattern = pattern.as_str(), "refresh loop stopped");
                                break;
                            }
                        }
                    }
                }
            }));
        }

        OrchestratorHandle { shutdown: shutdown_tx, tasks, board: self.board }
    }
}

/// One scheduled run: claim the board slot, refresh under the job timeout,
/// settle the outcome. Board transitions from a claimed slot cannot fail.
async fn run_scheduled<E: EventStore, P: PatternStore>(
    engine: &RefreshEngine<E, P>,
    board: &Mutex<ScheduleBoard>,
    pattern: PatternKind,
    cadence: &CadenceConfig,
) {
    if let Err(error) = board.lock().await.begin(pattern, Utc::now()) {
        tracing::warn!(pattern = pattern.as_str(), error = %error, "skipping refresh tick");
        return;
    }

    let outcome = tokio::time::timeout(cadence.job_timeout(), engine.refresh(pattern)).await;

    let mut board = board.lock().await;
    let settled = match outcome {
        Ok(Ok(_report)) => board.succeed(pattern, Utc::now()),
        Ok(Err(error)) => board.fail(pattern, Utc::now(), error.to_string()),
        Err(_elapsed) => {
            let message =
                format!("refresh timed out after {}s", cadence.job_timeout().as_secs());
            tracing::error!(pattern = pattern.as_str(), "{message}");
            board.fail(pattern, Utc::now(), message)
        }
    };
    if let Err(error) = settled {
        tracing::error!(pattern = pattern.as_str(), error = %error, "schedule board out of sync");
    }
}

/// Running orchestrator: read the board, or stop the loops.
pub struct OrchestratorHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    board: Arc<Mutex<ScheduleBoard>>,
}

impl OrchestratorHandle {
    pub async fn board_snapshot(&self) -> Vec<PatternRun> {
        self.board.lock().await.snapshot()
    }

    /// Signal every loop to stop and wait for them to drain. A refresh in
    /// flight finishes its current run first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use basketry_core::domain::event::{InteractionEvent, InteractionType};
    use basketry_core::schedule::RunState;
    use basketry_db::memory::{InMemoryEventStore, InMemoryPatternStore};

    use super::*;

    fn seeded_engine() -> (
        Arc<InMemoryEventStore>,
        Arc<InMemoryPatternStore>,
        RefreshEngine<InMemoryEventStore, InMemoryPatternStore>,
    ) {
        let events = Arc::new(InMemoryEventStore::new());
        let patterns = Arc::new(InMemoryPatternStore::new());
        let reference = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        for (id, day) in [("i1", 1), ("i2", 2), ("i3", 3)] {
            events.push_interaction(InteractionEvent {
                event_id: id.to_string(),
                timestamp: reference - ChronoDuration::days(day),
                user_id: Some("alice".to_string()),
                session_id: "s1".to_string(),
                product_sku: "sku-milk".to_string(),
                product_name: "Oat Milk 1L".to_string(),
                interaction_type: InteractionType::View,
                category: "dairy".to_string(),
                brand: "Fieldworks".to_string(),
                price: 3.5,
            });
        }
        let engine = RefreshEngine::new(Arc::clone(&events), Arc::clone(&patterns));
        (events, patterns, engine)
    }

    #[tokio::test(start_paused = true)]
    async fn every_pattern_refreshes_once_at_startup() {
        let (_events, _patterns, engine) = seeded_engine();
        let orchestrator = Orchestrator::new(engine, CadenceConfig::default());
        let handle = orchestrator.spawn();

        // The first interval tick fires immediately; give the tasks a beat.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let snapshot = handle.board_snapshot().await;
        assert_eq!(snapshot.len(), PatternKind::ALL.len());
        for run in &snapshot {
            assert_eq!(run.state, RunState::Succeeded, "{} never ran", run.pattern.as_str());
            assert_eq!(run.runs_completed, 1);
        }

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cadence_drives_repeat_runs() {
        let (_events, patterns, engine) = seeded_engine();
        let cadence = CadenceConfig {
            preference_secs: 2,
            session_context_secs: 3_600,
            reorder_secs: 3_600,
            association_secs: 3_600,
            behavior_secs: 3_600,
            job_timeout_secs: 300,
        };
        let handle = Orchestrator::new(engine, cadence).spawn();

        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.shutdown().await;

        // Startup tick plus at least two cadence ticks.
        assert!(patterns.replace_count(PatternKind::Preference) >= 3);
        assert_eq!(patterns.replace_count(PatternKind::Behavior), 1);
    }

    #[tokio::test]
    async fn a_failed_run_settles_on_the_board_and_the_next_one_recovers() {
        let (events, _patterns, engine) = seeded_engine();
        let board = Mutex::new(ScheduleBoard::new());
        let cadence = CadenceConfig::default();

        events.fail_next_read();
        run_scheduled(&engine, &board, PatternKind::Preference, &cadence).await;
        {
            let board = board.lock().await;
            let run = board.run(PatternKind::Preference).expect("tracked run");
            assert_eq!(run.state, RunState::Failed);
            assert_eq!(run.consecutive_failures, 1);
            assert!(run.last_error.as_deref().unwrap_or("").contains("unavailable"));
        }

        run_scheduled(&engine, &board, PatternKind::Preference, &cadence).await;
        let board = board.lock().await;
        let run = board.run(PatternKind::Preference).expect("tracked run");
        assert_eq!(run.state, RunState::Succeeded);
        assert_eq!(run.consecutive_failures, 0);
        assert_eq!(run.runs_completed, 2);
    }
}
