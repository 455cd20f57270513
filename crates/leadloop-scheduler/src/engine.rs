//! Scheduler engine — the polling loop that evaluates and dispatches agents.
//!
//! One engine instance owns all mutable scheduler state (retry counters,
//! in-flight set, start time) with an explicit start/stop lifecycle. Every
//! tick evaluates all enabled agents against a single reference timestamp,
//! then dispatches the due set as independent tokio tasks joined before the
//! tick returns, each bounded by the per-dispatch timeout.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;

use leadloop_core::config::SchedulerConfig;
use leadloop_core::error::{LeadLoopError, Result};
use leadloop_registry::{AgentSetting, RegistryStore, RunRecord};

use crate::cron::CronSchedule;
use crate::executor::AgentExecutor;

/// Per-agent retry bookkeeping for the current scheduled slot.
#[derive(Debug, Clone, Copy)]
struct RetryState {
    /// The fire time being retried.
    slot: DateTime<Utc>,
    attempts: u32,
    /// Set once attempts hit the ceiling; the agent next fires at the
    /// following scheduled slot.
    abandoned: bool,
}

/// What one tick did — for logging and deterministic tests.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TickSummary {
    /// Enabled rows evaluated this tick.
    pub evaluated: usize,
    /// Agents found due and dispatched.
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Rows skipped because their cron expression failed to parse.
    pub skipped_invalid: usize,
    /// The whole tick was skipped because the registry could not be read.
    pub registry_unavailable: bool,
}

/// The scheduler engine.
pub struct SchedulerEngine {
    registry: Arc<dyn RegistryStore>,
    executor: Arc<dyn AgentExecutor>,
    config: SchedulerConfig,
    /// Reference point for agents that have never run.
    started_at: DateTime<Utc>,
    retries: Mutex<HashMap<i64, RetryState>>,
    /// Agents with a dispatch currently running — prevents double dispatch
    /// when a manual trigger races a tick.
    in_flight: Mutex<HashSet<i64>>,
    registry_healthy: AtomicBool,
}

impl SchedulerEngine {
    pub fn new(
        registry: Arc<dyn RegistryStore>,
        executor: Arc<dyn AgentExecutor>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            registry,
            executor,
            config,
            started_at: Utc::now(),
            retries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            registry_healthy: AtomicBool::new(true),
        }
    }

    /// Whether the last registry read succeeded — health-check surface for
    /// external monitors.
    pub fn registry_healthy(&self) -> bool {
        self.registry_healthy.load(Ordering::Relaxed)
    }

    /// Run one tick against the current wall clock.
    pub async fn tick(self: &Arc<Self>) -> TickSummary {
        self.tick_at(Utc::now()).await
    }

    /// Run one tick with an explicit reference timestamp. All agents are
    /// evaluated against the same `now`, so the due set is a consistent
    /// snapshot.
    pub async fn tick_at(self: &Arc<Self>, now: DateTime<Utc>) -> TickSummary {
        let mut summary = TickSummary::default();

        let rows = match self.registry.list_enabled() {
            Ok(rows) => {
                self.registry_healthy.store(true, Ordering::Relaxed);
                rows
            }
            Err(e) => {
                // No partial dispatch from stale data — skip the whole tick
                self.registry_healthy.store(false, Ordering::Relaxed);
                summary.registry_unavailable = true;
                tracing::warn!("⚠️ Registry unavailable, skipping tick: {e}");
                return summary;
            }
        };
        summary.evaluated = rows.len();

        // Compute the due set: (agent, crossed slot) pairs
        let mut due: Vec<(AgentSetting, DateTime<Utc>)> = Vec::new();
        {
            let retries = self.retries.lock().await;
            for row in rows {
                let Some(expr) = row.schedule_cron.as_deref() else {
                    continue;
                };
                let schedule = match CronSchedule::parse(expr) {
                    Ok(s) => s,
                    Err(e) => {
                        summary.skipped_invalid += 1;
                        tracing::warn!("⚠️ Skipping '{}': {e}", row.agent_name);
                        continue;
                    }
                };

                let mut since = row.last_run_at.unwrap_or(self.started_at);
                if let Some(state) = retries.get(&row.agent_id)
                    && state.abandoned
                    && state.slot > since
                {
                    since = state.slot;
                }

                match schedule.next_after(since) {
                    Some(slot) if slot <= now => due.push((row, slot)),
                    _ => {}
                }
            }
        }

        // Claim in-flight slots; anything already running is skipped
        let dispatched_ids: Vec<i64> = {
            let mut in_flight = self.in_flight.lock().await;
            due.retain(|(row, _)| in_flight.insert(row.agent_id));
            due.iter().map(|(row, _)| row.agent_id).collect()
        };
        summary.due = due.len();

        // One task per due agent — a failing or slow agent never blocks the rest
        let mut dispatches = JoinSet::new();
        for (agent, slot) in due {
            let engine = Arc::clone(self);
            dispatches.spawn(async move {
                let success = engine.dispatch(&agent, now, "scheduler").await;
                (agent, slot, success)
            });
        }

        while let Some(joined) = dispatches.join_next().await {
            let (agent, slot, success) = match joined {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("🚨 Dispatch task panicked: {e}");
                    continue;
                }
            };
            let mut retries = self.retries.lock().await;
            if success {
                summary.succeeded += 1;
                retries.remove(&agent.agent_id);
            } else {
                summary.failed += 1;
                let state = retries.entry(agent.agent_id).or_insert(RetryState {
                    slot,
                    attempts: 0,
                    abandoned: false,
                });
                if state.slot != slot {
                    // New slot — fresh attempt budget
                    *state = RetryState {
                        slot,
                        attempts: 0,
                        abandoned: false,
                    };
                }
                state.attempts += 1;
                if state.attempts >= self.config.max_retries_per_slot && !state.abandoned {
                    state.abandoned = true;
                    tracing::warn!(
                        "🚨 '{}' failed {} attempt(s) for slot {}; waiting for the next scheduled slot",
                        agent.agent_name,
                        state.attempts,
                        slot
                    );
                }
            }
        }

        // Release in-flight claims, including any lost to a panicked task
        {
            let mut in_flight = self.in_flight.lock().await;
            for id in dispatched_ids {
                in_flight.remove(&id);
            }
        }

        summary
    }

    /// Dispatch one agent immediately, outside the cron schedule. Honors the
    /// enabled flag and the in-flight guard; bookkeeping matches a scheduled
    /// dispatch with action "manual".
    pub async fn trigger_now(&self, name: &str) -> Result<String> {
        let agent = self
            .registry
            .get(name)?
            .ok_or_else(|| LeadLoopError::Execution(format!("agent '{name}' is not registered")))?;
        if !agent.is_enabled {
            return Err(LeadLoopError::Execution(format!("agent '{name}' is disabled")));
        }

        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(agent.agent_id) {
                return Err(LeadLoopError::Execution(format!(
                    "agent '{name}' is already running"
                )));
            }
        }

        let success = self.dispatch(&agent, Utc::now(), "manual").await;
        self.in_flight.lock().await.remove(&agent.agent_id);

        if success {
            self.retries.lock().await.remove(&agent.agent_id);
            Ok(format!("dispatched '{name}'"))
        } else {
            Err(LeadLoopError::Execution(format!(
                "dispatch of '{name}' failed; see run log"
            )))
        }
    }

    /// Execute one agent with a timeout and record the attempt. Returns
    /// whether the dispatch succeeded. `now` becomes `last_run_at` on
    /// success, keeping firing idempotent per scheduled slot.
    async fn dispatch(&self, agent: &AgentSetting, now: DateTime<Utc>, action: &str) -> bool {
        let timeout = Duration::from_secs(self.config.dispatch_timeout_secs.max(1));
        let started = std::time::Instant::now();
        tracing::debug!("🔔 Dispatching '{}'", agent.agent_name);

        let result = tokio::time::timeout(timeout, self.executor.execute(agent)).await;
        let duration_ms = started.elapsed().as_millis() as i64;

        match result {
            Ok(Ok(summary)) => {
                if let Err(e) = self.registry.mark_run(agent.agent_id, now) {
                    tracing::warn!("⚠️ Failed to record last_run_at for '{}': {e}", agent.agent_name);
                }
                self.record(RunRecord::ok(agent, action, &summary, duration_ms));
                tracing::info!(
                    "✅ '{}' completed in {}ms ({})",
                    agent.agent_name,
                    duration_ms,
                    action
                );
                true
            }
            Ok(Err(e)) => {
                self.record(RunRecord::error(agent, action, &e.to_string(), duration_ms));
                tracing::warn!("⚠️ '{}' failed after {}ms: {e}", agent.agent_name, duration_ms);
                false
            }
            Err(_) => {
                let detail = format!("timed out after {}s", timeout.as_secs());
                self.record(RunRecord::error(agent, action, &detail, duration_ms));
                tracing::warn!("⚠️ '{}' {detail}", agent.agent_name);
                false
            }
        }
    }

    fn record(&self, record: RunRecord) {
        if let Err(e) = self.registry.log_run(&record) {
            tracing::warn!("⚠️ Failed to persist run log for '{}': {e}", record.agent_name);
        }
    }

    /// Spawn the polling loop. The returned handle stops it gracefully:
    /// no new ticks are accepted and the in-flight tick (whose dispatches
    /// are already bounded by the per-dispatch timeout) is given the
    /// configured grace period before the loop is aborted.
    pub fn start(self: &Arc<Self>) -> SchedulerHandle {
        let engine = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let grace = Duration::from_secs(self.config.shutdown_grace_secs.max(1));
        let poll = Duration::from_secs(self.config.poll_secs.max(1));

        let task = tokio::spawn(async move {
            tracing::info!("⏰ Scheduler started (tick every {}s)", poll.as_secs());
            let mut interval = tokio::time::interval(poll);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let summary = engine.tick().await;
                        if summary.due > 0 || summary.skipped_invalid > 0 {
                            tracing::info!(
                                "📣 Tick: {} evaluated, {} due, {} ok, {} failed, {} invalid",
                                summary.evaluated,
                                summary.due,
                                summary.succeeded,
                                summary.failed,
                                summary.skipped_invalid
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("⏹️ Scheduler stopped");
        });

        SchedulerHandle {
            shutdown: shutdown_tx,
            task,
            grace,
        }
    }
}

/// Handle to a running scheduler loop.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
    grace: Duration,
}

impl SchedulerHandle {
    /// Stop the loop: signal shutdown, wait up to the grace period, then abort.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if tokio::time::timeout(self.grace, &mut self.task).await.is_err() {
            tracing::warn!("⚠️ Scheduler did not stop within grace period; aborting");
            self.task.abort();
        }
    }
}
