use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use mixtape_core::config::{SchedulerConfig, DEFAULT_FALLBACK_CRON};
use mixtape_core::{JobExecution, JobRunner, Schedule};
use tokio::sync::{Mutex as RunLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::cron::CronExpression;
use crate::error::{Result, SchedulerError};
use crate::recurrence::Trigger;
use crate::store::ScheduleStore;

/// A registered timer for one schedule.
struct TriggerHandle {
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

struct EngineInner {
    store: Arc<ScheduleStore>,
    runner: Arc<dyn JobRunner>,
    triggers: DashMap<String, TriggerHandle>,
    /// Held for the whole of a run; a fire that cannot take it is skipped.
    run_locks: DashMap<String, Arc<RunLock<()>>>,
    /// Bounds concurrently running jobs across all schedules.
    workers: Arc<Semaphore>,
    fallback: CronExpression,
    started: AtomicBool,
}

/// Turns persisted schedules into live timers and runs their jobs.
///
/// Construct one per process and pass it around; clones share all state.
/// Registering triggers spawns tasks, so `start` and `upsert` must be called
/// from within a Tokio runtime.
/// Different schedules fire concurrently (bounded by
/// `max_concurrent_jobs`), the same schedule never overlaps itself.
#[derive(Clone)]
pub struct SchedulerEngine {
    inner: Arc<EngineInner>,
}

impl SchedulerEngine {
    pub fn new(
        store: Arc<ScheduleStore>,
        runner: Arc<dyn JobRunner>,
        config: &SchedulerConfig,
    ) -> Result<Self> {
        let fallback = match CronExpression::parse(&config.fallback_cron) {
            Ok(cron) => cron,
            Err(e) => {
                warn!(error = %e, "configured fallback cron is invalid, using default");
                CronExpression::parse(DEFAULT_FALLBACK_CRON)?
            }
        };
        Ok(Self {
            inner: Arc::new(EngineInner {
                store,
                runner,
                triggers: DashMap::new(),
                run_locks: DashMap::new(),
                workers: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
                fallback,
                started: AtomicBool::new(false),
            }),
        })
    }

    pub fn store(&self) -> &Arc<ScheduleStore> {
        &self.inner.store
    }

    pub fn fallback(&self) -> &CronExpression {
        &self.inner.fallback
    }

    /// Register a trigger for every enabled schedule. Idempotent: a second
    /// call registers nothing and returns 0.
    pub fn start(&self) -> Result<usize> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            debug!("scheduler already started");
            return Ok(0);
        }
        let schedules = match self.inner.store.list_enabled() {
            Ok(s) => s,
            Err(e) => {
                self.inner.started.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        for schedule in &schedules {
            self.register(schedule);
        }
        info!(registered = schedules.len(), "scheduler started");
        Ok(schedules.len())
    }

    /// (Re)register the trigger for `schedule`, replacing any existing one.
    /// A disabled schedule is unregistered instead.
    pub fn upsert(&self, schedule: &Schedule) {
        if schedule.enabled {
            self.register(schedule);
        } else {
            self.remove(&schedule.id);
        }
    }

    /// Cancel the trigger for `schedule_id`, if any. A run already in
    /// progress finishes and records its execution.
    pub fn remove(&self, schedule_id: &str) {
        if let Some((_, handle)) = self.inner.triggers.remove(schedule_id) {
            handle.cancel.cancel();
            info!(schedule_id = %schedule_id, "trigger removed");
        }
        // a held or about-to-be-held lock has a second Arc
        self.inner
            .run_locks
            .remove_if(schedule_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Cancel every trigger.
    pub fn shutdown(&self) {
        let ids: Vec<String> = self.inner.triggers.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.remove(&id);
        }
        self.inner.started.store(false, Ordering::SeqCst);
        info!("scheduler stopped");
    }

    pub fn is_registered(&self, schedule_id: &str) -> bool {
        self.inner.triggers.contains_key(schedule_id)
    }

    pub fn registered_count(&self) -> usize {
        self.inner.triggers.len()
    }

    /// Timer fire: reload the schedule and run it unless it is gone or disabled.
    ///
    /// Returns the recorded execution, or `None` when nothing ran.
    #[instrument(skip(self))]
    pub async fn on_trigger(&self, schedule_id: &str) -> Result<Option<JobExecution>> {
        let schedule = match self.inner.store.get(schedule_id)? {
            Some(s) if s.enabled => s,
            Some(_) => {
                debug!("schedule disabled, trigger ignored");
                return Ok(None);
            }
            None => {
                debug!("schedule no longer exists, trigger ignored");
                return Ok(None);
            }
        };
        self.execute(&schedule).await.map(Some)
    }

    /// Run a schedule right away, even if disabled, through the same
    /// locking and audit path as a timer fire.
    #[instrument(skip(self))]
    pub async fn run_now(&self, schedule_id: &str) -> Result<JobExecution> {
        let schedule =
            self.inner
                .store
                .get(schedule_id)?
                .ok_or_else(|| SchedulerError::ScheduleNotFound {
                    id: schedule_id.to_string(),
                })?;
        self.execute(&schedule).await
    }

    async fn execute(&self, schedule: &Schedule) -> Result<JobExecution> {
        let inner = &self.inner;
        let lock = inner
            .run_locks
            .entry(schedule.id.clone())
            .or_insert_with(|| Arc::new(RunLock::new(())))
            .clone();

        let Ok(_guard) = lock.try_lock_owned() else {
            let exec = JobExecution::skipped(
                &schedule.id,
                Utc::now(),
                "previous run still in progress",
            );
            warn!(schedule_id = %schedule.id, "run already in progress, trigger skipped");
            self.persist(&exec)?;
            return Ok(exec);
        };

        let _permit = inner
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SchedulerError::ShuttingDown)?;

        let outcome = inner.runner.run(schedule).await;
        let exec = outcome.to_execution();
        self.persist(&exec)?;
        if let Err(e) = inner.store.record_run(&schedule.id, outcome.started_at) {
            warn!(schedule_id = %schedule.id, error = %e, "run bookkeeping failed");
        }
        info!(
            schedule_id = %schedule.id,
            status = %exec.status,
            "execution recorded"
        );
        Ok(exec)
    }

    fn persist(&self, exec: &JobExecution) -> Result<()> {
        self.inner.store.insert_execution(exec).map_err(|e| {
            error!(schedule_id = %exec.schedule_id, execution_id = %exec.id, error = %e, "execution record lost");
            e
        })
    }

    fn register(&self, schedule: &Schedule) {
        let trigger = Trigger::from_recurrence(&schedule.recurrence, &self.inner.fallback);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(trigger_loop(
            self.clone(),
            schedule.id.clone(),
            trigger,
            schedule.last_run_at,
            cancel.clone(),
        ));

        let previous = self.inner.triggers.insert(
            schedule.id.clone(),
            TriggerHandle {
                cancel,
                _task: task,
            },
        );
        let replaced = previous.is_some();
        if let Some(old) = previous {
            old.cancel.cancel();
        }
        info!(
            schedule_id = %schedule.id,
            recurrence = %schedule.recurrence,
            replaced,
            "trigger registered"
        );
    }
}

/// Sleep until the next fire, run, repeat; exits once `cancel` fires.
async fn trigger_loop(
    engine: SchedulerEngine,
    schedule_id: String,
    trigger: Trigger,
    mut last_run: Option<chrono::DateTime<Utc>>,
    cancel: CancellationToken,
) {
    loop {
        let now = Utc::now();
        let next = trigger.next_fire(last_run, now);
        let wait = (next - now).to_std().unwrap_or_default();
        debug!(schedule_id = %schedule_id, next = %next, "waiting for next fire");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        last_run = Some(Utc::now());
        if let Err(e) = engine.on_trigger(&schedule_id).await {
            error!(schedule_id = %schedule_id, error = %e, "trigger failed");
        }
        if cancel.is_cancelled() {
            break;
        }
    }
    debug!(schedule_id = %schedule_id, "trigger loop exited");
}
