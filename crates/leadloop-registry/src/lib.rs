//! # LeadLoop Agent Registry
//!
//! The relational config store for all LeadLoop agents. One row per agent
//! (`agent_settings`): name, tier, cron schedule, enabled flag, opaque JSON
//! config, and last-run bookkeeping. The scheduler reads enabled rows each
//! tick and writes `last_run_at` after a successful dispatch; everything
//! else is written by the administrative surface (CLI, seed routine).
//!
//! Also owns `agent_logs` — one row per dispatch attempt, the durable half
//! of the observability sink.

pub mod db;
pub mod seeds;
pub mod settings;

pub use db::{AgentRegistry, RegistryStore};
pub use seeds::{SeedAgent, DEFAULT_AGENTS};
pub use settings::{AgentSetting, RunRecord, RunStatus};
