//! # LeadLoop Scheduler
//!
//! Due-time agent scheduler driven by per-agent cron configuration in the
//! registry. One scheduler instance owns the polling loop; agents fire as
//! independent tokio tasks so a slow or failing agent never delays the rest.
//!
//! ## Architecture
//! ```text
//! SchedulerEngine (tokio interval tick)
//!   ├── load enabled agent_settings rows
//!   ├── CronSchedule::due(now, last_run) per row  → due set
//!   ├── dispatch each due agent (own task + timeout)
//!   │     └── AgentExecutor::execute(agent)       → external runtime
//!   └── bookkeeping: last_run_at on success, per-slot retries on failure,
//!       one agent_logs row per attempt
//! ```
//!
//! Cron evaluation is a pure function of (expression, now, last-fired), so
//! every timing property is unit-testable without real-time waits.

pub mod cron;
pub mod engine;
pub mod executor;

pub use cron::CronSchedule;
pub use engine::{SchedulerEngine, SchedulerHandle, TickSummary};
pub use executor::{AgentExecutor, CallbackExecutor, WebhookExecutor};
