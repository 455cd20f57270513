//! SQLite-backed agent registry.
//!
//! The schema evolves via idempotent `CREATE TABLE IF NOT EXISTS` plus safe
//! `ALTER TABLE` statements, so databases created by older builds (or by
//! external migration scripts) keep working without redeployment.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Mutex;

use leadloop_core::error::{LeadLoopError, Result};

use crate::settings::{AgentSetting, RunRecord, RunStatus};

/// The registry surface the scheduler depends on. `AgentRegistry` is the
/// production implementation; tests substitute in-memory fakes.
pub trait RegistryStore: Send + Sync {
    /// Settings eligible for scheduling (enabled, with a cron expression).
    fn list_enabled(&self) -> Result<Vec<AgentSetting>>;
    /// Look up one agent by name.
    fn get(&self, name: &str) -> Result<Option<AgentSetting>>;
    /// Record a successful dispatch (per-row atomic update).
    fn mark_run(&self, agent_id: i64, ts: DateTime<Utc>) -> Result<()>;
    /// Persist one dispatch attempt to the run log.
    fn log_run(&self, record: &RunRecord) -> Result<i64>;
}

impl RegistryStore for AgentRegistry {
    fn list_enabled(&self) -> Result<Vec<AgentSetting>> {
        AgentRegistry::list_enabled(self)
    }
    fn get(&self, name: &str) -> Result<Option<AgentSetting>> {
        AgentRegistry::get(self, name)
    }
    fn mark_run(&self, agent_id: i64, ts: DateTime<Utc>) -> Result<()> {
        AgentRegistry::mark_run(self, agent_id, ts)
    }
    fn log_run(&self, record: &RunRecord) -> Result<i64> {
        AgentRegistry::log_run(self, record)
    }
}

/// The agent registry — shared as `Arc<AgentRegistry>`.
pub struct AgentRegistry {
    conn: Mutex<Connection>,
}

/// Shared SELECT column list for setting queries — single source of truth.
const SETTING_SELECT: &str = "SELECT id, agent_id, agent_name, tier, is_enabled, schedule_cron, config, last_run_at, created_at, updated_at FROM agent_settings";

/// Map a database row to an AgentSetting.
fn row_to_setting(row: &rusqlite::Row) -> rusqlite::Result<AgentSetting> {
    let config_str: String = row.get(6)?;
    let last_run_str: Option<String> = row.get(7)?;
    let created_str: String = row.get(8)?;
    let updated_str: String = row.get(9)?;
    Ok(AgentSetting {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        agent_name: row.get(2)?,
        tier: row.get(3)?,
        is_enabled: row.get::<_, i32>(4)? != 0,
        schedule_cron: row.get(5)?,
        config: serde_json::from_str(&config_str).unwrap_or_default(),
        last_run_at: parse_ts_opt(last_run_str),
        created_at: parse_ts(&created_str),
        updated_at: parse_ts(&updated_str),
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_ts_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|d| d.with_timezone(&Utc))
}

impl AgentRegistry {
    /// Open or create the registry database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)
            .map_err(|e| LeadLoopError::Registry(format!("DB open error: {e}")))?;

        // WAL mode allows concurrent readers/writers and prevents "database is locked" errors
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| LeadLoopError::Registry(format!("DB pragma error: {e}")))?;

        let registry = Self {
            conn: Mutex::new(conn),
        };
        registry.migrate()?;
        Ok(registry)
    }

    /// Open an in-memory registry (tests, embedding).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| LeadLoopError::Registry(format!("DB open error: {e}")))?;
        let registry = Self {
            conn: Mutex::new(conn),
        };
        registry.migrate()?;
        Ok(registry)
    }

    /// Run schema migrations.
    fn migrate(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS agent_settings (
                id TEXT PRIMARY KEY,
                agent_id INTEGER UNIQUE NOT NULL,
                agent_name TEXT UNIQUE NOT NULL,
                tier TEXT NOT NULL DEFAULT 'Operations',
                is_enabled INTEGER NOT NULL DEFAULT 1,
                schedule_cron TEXT,
                config TEXT NOT NULL DEFAULT '{}',
                last_run_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS agent_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_id INTEGER NOT NULL,
                agent_name TEXT NOT NULL,
                action TEXT NOT NULL,
                status TEXT NOT NULL,
                message TEXT NOT NULL DEFAULT '',
                error_details TEXT,
                duration_ms INTEGER,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_agent_logs_agent ON agent_logs(agent_id, created_at);
        ",
        )
        .map_err(|e| LeadLoopError::Registry(format!("Migration error: {e}")))?;

        // Safe ALTER TABLE migrations for databases created before the config column
        let _ = conn.execute(
            "ALTER TABLE agent_settings ADD COLUMN config TEXT NOT NULL DEFAULT '{}'",
            [],
        );
        // Normalize rows seeded by external scripts with NULL configs
        conn.execute("UPDATE agent_settings SET config = '{}' WHERE config IS NULL", [])
            .map_err(|e| LeadLoopError::Registry(format!("Migration error: {e}")))?;

        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned lock means another thread panicked mid-statement; the
        // connection itself is still usable.
        self.conn.lock().unwrap_or_else(|p| p.into_inner())
    }

    // ─── Reads ──────────────────────────────────────

    /// Get a setting by agent name.
    pub fn get(&self, name: &str) -> Result<Option<AgentSetting>> {
        let conn = self.lock();
        let result = conn.query_row(
            &format!("{SETTING_SELECT} WHERE agent_name = ?1"),
            params![name],
            row_to_setting,
        );
        match result {
            Ok(setting) => Ok(Some(setting)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(LeadLoopError::Registry(format!("Get setting: {e}"))),
        }
    }

    /// Get a setting by numeric agent id.
    pub fn get_by_id(&self, agent_id: i64) -> Result<Option<AgentSetting>> {
        let conn = self.lock();
        let result = conn.query_row(
            &format!("{SETTING_SELECT} WHERE agent_id = ?1"),
            params![agent_id],
            row_to_setting,
        );
        match result {
            Ok(setting) => Ok(Some(setting)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(LeadLoopError::Registry(format!("Get setting: {e}"))),
        }
    }

    /// List all settings ordered by agent id.
    pub fn list_all(&self) -> Result<Vec<AgentSetting>> {
        self.list_where("")
    }

    /// List settings eligible for scheduling: enabled with a cron schedule.
    pub fn list_enabled(&self) -> Result<Vec<AgentSetting>> {
        self.list_where("WHERE is_enabled = 1 AND schedule_cron IS NOT NULL")
    }

    fn list_where(&self, clause: &str) -> Result<Vec<AgentSetting>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!("{SETTING_SELECT} {clause} ORDER BY agent_id"))
            .map_err(|e| LeadLoopError::Registry(format!("Prepare: {e}")))?;
        let settings = stmt
            .query_map([], row_to_setting)
            .map_err(|e| LeadLoopError::Registry(format!("Query: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(settings)
    }

    /// Number of registered agents.
    pub fn count(&self) -> Result<i64> {
        let conn = self.lock();
        conn.query_row("SELECT count(*) FROM agent_settings", [], |row| row.get(0))
            .map_err(|e| LeadLoopError::Registry(format!("Count: {e}")))
    }

    // ─── Administrative writes ──────────────────────────────────────

    /// Insert or update a setting row, keyed by agent_id.
    pub fn upsert(&self, setting: &AgentSetting) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO agent_settings
             (id, agent_id, agent_name, tier, is_enabled, schedule_cron, config, last_run_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(agent_id) DO UPDATE SET
                agent_name = excluded.agent_name,
                tier = excluded.tier,
                is_enabled = excluded.is_enabled,
                schedule_cron = excluded.schedule_cron,
                config = excluded.config,
                updated_at = excluded.updated_at",
            params![
                setting.id,
                setting.agent_id,
                setting.agent_name,
                setting.tier,
                setting.is_enabled as i32,
                setting.schedule_cron,
                setting.config.to_string(),
                setting.last_run_at.map(|t| t.to_rfc3339()),
                setting.created_at.to_rfc3339(),
                setting.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| LeadLoopError::Registry(format!("Upsert setting: {e}")))?;
        Ok(())
    }

    /// Enable or disable a single agent by name. Returns rows affected.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<usize> {
        let conn = self.lock();
        conn.execute(
            "UPDATE agent_settings SET is_enabled = ?1, updated_at = ?2 WHERE agent_name = ?3",
            params![enabled as i32, Utc::now().to_rfc3339(), name],
        )
        .map_err(|e| LeadLoopError::Registry(format!("Set enabled: {e}")))
    }

    /// Enable every agent. Returns rows affected.
    pub fn enable_all(&self) -> Result<usize> {
        let conn = self.lock();
        conn.execute(
            "UPDATE agent_settings SET is_enabled = 1, updated_at = ?1",
            params![Utc::now().to_rfc3339()],
        )
        .map_err(|e| LeadLoopError::Registry(format!("Enable all: {e}")))
    }

    /// Disable every agent. Returns rows affected.
    pub fn disable_all(&self) -> Result<usize> {
        let conn = self.lock();
        conn.execute(
            "UPDATE agent_settings SET is_enabled = 0, updated_at = ?1",
            params![Utc::now().to_rfc3339()],
        )
        .map_err(|e| LeadLoopError::Registry(format!("Disable all: {e}")))
    }

    /// Enable exactly the named agents and disable everything else
    /// (activation-sprint semantics). Returns (enabled, disabled) counts.
    pub fn enable_only(&self, names: &[&str]) -> Result<(usize, usize)> {
        if names.is_empty() {
            return Ok((0, self.disable_all()?));
        }
        let conn = self.lock();
        let now = Utc::now().to_rfc3339();
        let placeholders = (0..names.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");

        let mut on_params: Vec<&dyn rusqlite::ToSql> = vec![&now];
        for name in names {
            on_params.push(name);
        }

        let enabled = conn
            .execute(
                &format!(
                    "UPDATE agent_settings SET is_enabled = 1, updated_at = ?1 WHERE agent_name IN ({placeholders})"
                ),
                on_params.as_slice(),
            )
            .map_err(|e| LeadLoopError::Registry(format!("Enable only: {e}")))?;
        let disabled = conn
            .execute(
                &format!(
                    "UPDATE agent_settings SET is_enabled = 0, updated_at = ?1 WHERE agent_name NOT IN ({placeholders})"
                ),
                on_params.as_slice(),
            )
            .map_err(|e| LeadLoopError::Registry(format!("Enable only: {e}")))?;
        Ok((enabled, disabled))
    }

    /// Retune one agent's cron expression. Returns rows affected.
    pub fn set_schedule(&self, name: &str, cron: &str) -> Result<usize> {
        let conn = self.lock();
        conn.execute(
            "UPDATE agent_settings SET schedule_cron = ?1, updated_at = ?2 WHERE agent_name = ?3",
            params![cron, Utc::now().to_rfc3339(), name],
        )
        .map_err(|e| LeadLoopError::Registry(format!("Set schedule: {e}")))
    }

    /// Retune every agent in a tier. Returns rows affected.
    pub fn set_tier_schedule(&self, tier: &str, cron: &str) -> Result<usize> {
        let conn = self.lock();
        conn.execute(
            "UPDATE agent_settings SET schedule_cron = ?1, updated_at = ?2 WHERE tier = ?3",
            params![cron, Utc::now().to_rfc3339(), tier],
        )
        .map_err(|e| LeadLoopError::Registry(format!("Set tier schedule: {e}")))
    }

    // ─── Scheduler writes ──────────────────────────────────────

    /// Record a successful dispatch. Single-row atomic update — agents are
    /// independent rows, so no cross-agent locking is needed.
    pub fn mark_run(&self, agent_id: i64, ts: DateTime<Utc>) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE agent_settings SET last_run_at = ?1, updated_at = ?1 WHERE agent_id = ?2",
            params![ts.to_rfc3339(), agent_id],
        )
        .map_err(|e| LeadLoopError::Registry(format!("Mark run: {e}")))?;
        Ok(())
    }

    // ─── Run logs ──────────────────────────────────────

    /// Persist one dispatch attempt.
    pub fn log_run(&self, record: &RunRecord) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO agent_logs (agent_id, agent_name, action, status, message, error_details, duration_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.agent_id,
                record.agent_name,
                record.action,
                record.status.as_str(),
                record.message,
                record.error_details,
                record.duration_ms,
                record.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| LeadLoopError::Registry(format!("Log run: {e}")))?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent dispatch attempts, newest first.
    pub fn recent_logs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, agent_id, agent_name, action, status, message, error_details, duration_ms, created_at
                 FROM agent_logs ORDER BY id DESC LIMIT ?1",
            )
            .map_err(|e| LeadLoopError::Registry(format!("Prepare: {e}")))?;
        let logs = stmt
            .query_map([limit as i64], |row| {
                let status_str: String = row.get(4)?;
                let created_str: String = row.get(8)?;
                Ok(RunRecord {
                    id: row.get(0)?,
                    agent_id: row.get(1)?,
                    agent_name: row.get(2)?,
                    action: row.get(3)?,
                    status: if status_str == "ok" {
                        RunStatus::Ok
                    } else {
                        RunStatus::Error
                    },
                    message: row.get(5)?,
                    error_details: row.get(6)?,
                    duration_ms: row.get(7)?,
                    created_at: parse_ts(&created_str),
                })
            })
            .map_err(|e| LeadLoopError::Registry(format!("Query: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_registry(name: &str) -> (AgentRegistry, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("leadloop-registry-{name}"));
        std::fs::create_dir_all(&dir).ok();
        let registry = AgentRegistry::open(&dir.join("test.db")).unwrap();
        (registry, dir)
    }

    #[test]
    fn test_open_and_migrate() {
        let (registry, dir) = temp_registry("migrate");
        assert_eq!(registry.count().unwrap(), 0);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_upsert_and_get() {
        let registry = AgentRegistry::open_in_memory().unwrap();
        let setting = AgentSetting::new(1, "Lead Scraper", "Revenue", Some("0 6 * * *"));
        registry.upsert(&setting).unwrap();

        let loaded = registry.get("Lead Scraper").unwrap().unwrap();
        assert_eq!(loaded.agent_id, 1);
        assert_eq!(loaded.tier, "Revenue");
        assert_eq!(loaded.schedule_cron.as_deref(), Some("0 6 * * *"));
        assert!(registry.get("No Such Agent").unwrap().is_none());
    }

    #[test]
    fn test_upsert_is_idempotent_per_agent_id() {
        let registry = AgentRegistry::open_in_memory().unwrap();
        registry
            .upsert(&AgentSetting::new(5, "LinkedIn Prospector", "Revenue", None))
            .unwrap();
        let mut updated = AgentSetting::new(5, "LinkedIn Prospector", "Revenue", Some("0 10 * * 1-5"));
        updated.is_enabled = false;
        registry.upsert(&updated).unwrap();

        assert_eq!(registry.count().unwrap(), 1);
        let loaded = registry.get_by_id(5).unwrap().unwrap();
        assert!(!loaded.is_enabled);
        assert_eq!(loaded.schedule_cron.as_deref(), Some("0 10 * * 1-5"));
    }

    #[test]
    fn test_list_enabled_filters() {
        let registry = AgentRegistry::open_in_memory().unwrap();
        registry
            .upsert(&AgentSetting::new(1, "Lead Scraper", "Revenue", Some("0 6 * * *")))
            .unwrap();
        let mut disabled = AgentSetting::new(2, "Lead Enricher", "Revenue", Some("0 7 * * *"));
        disabled.is_enabled = false;
        registry.upsert(&disabled).unwrap();
        // Enabled but unscheduled — never eligible
        registry
            .upsert(&AgentSetting::new(3, "Outreach Sender", "Revenue", None))
            .unwrap();

        let enabled = registry.list_enabled().unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].agent_name, "Lead Scraper");
        assert_eq!(registry.list_all().unwrap().len(), 3);
    }

    #[test]
    fn test_bulk_enable_disable() {
        let registry = AgentRegistry::open_in_memory().unwrap();
        for (id, name) in [(1, "Lead Scraper"), (2, "Lead Enricher"), (3, "Outreach Sender")] {
            registry
                .upsert(&AgentSetting::new(id, name, "Revenue", Some("0 8 * * *")))
                .unwrap();
        }
        assert_eq!(registry.disable_all().unwrap(), 3);
        assert!(registry.list_enabled().unwrap().is_empty());
        assert_eq!(registry.enable_all().unwrap(), 3);
        assert_eq!(registry.list_enabled().unwrap().len(), 3);
    }

    #[test]
    fn test_enable_only() {
        let registry = AgentRegistry::open_in_memory().unwrap();
        for (id, name) in [(1, "Lead Scraper"), (2, "Lead Enricher"), (22, "Cost Monitor")] {
            registry
                .upsert(&AgentSetting::new(id, name, "Revenue", Some("0 8 * * *")))
                .unwrap();
        }
        let (enabled, disabled) = registry.enable_only(&["Lead Scraper", "Cost Monitor"]).unwrap();
        assert_eq!(enabled, 2);
        assert_eq!(disabled, 1);
        assert!(!registry.get("Lead Enricher").unwrap().unwrap().is_enabled);
        assert!(registry.get("Cost Monitor").unwrap().unwrap().is_enabled);
    }

    #[test]
    fn test_set_tier_schedule() {
        let registry = AgentRegistry::open_in_memory().unwrap();
        registry
            .upsert(&AgentSetting::new(9, "Content Idea Generator", "Content", Some("0 8 * * 1")))
            .unwrap();
        registry
            .upsert(&AgentSetting::new(22, "Cost Monitor", "Operations", Some("*/15 * * * *")))
            .unwrap();

        let affected = registry.set_tier_schedule("Content", "0 12 * * 3").unwrap();
        assert_eq!(affected, 1);
        let content = registry.get("Content Idea Generator").unwrap().unwrap();
        assert_eq!(content.schedule_cron.as_deref(), Some("0 12 * * 3"));
        // Other tiers untouched
        let ops = registry.get("Cost Monitor").unwrap().unwrap();
        assert_eq!(ops.schedule_cron.as_deref(), Some("*/15 * * * *"));
    }

    #[test]
    fn test_mark_run_touches_single_row() {
        let registry = AgentRegistry::open_in_memory().unwrap();
        registry
            .upsert(&AgentSetting::new(1, "Lead Scraper", "Revenue", Some("0 6 * * *")))
            .unwrap();
        registry
            .upsert(&AgentSetting::new(2, "Lead Enricher", "Revenue", Some("0 7 * * *")))
            .unwrap();

        let ts = Utc::now();
        registry.mark_run(1, ts).unwrap();
        assert!(registry.get_by_id(1).unwrap().unwrap().last_run_at.is_some());
        assert!(registry.get_by_id(2).unwrap().unwrap().last_run_at.is_none());
    }

    #[test]
    fn test_log_run_roundtrip() {
        let registry = AgentRegistry::open_in_memory().unwrap();
        let setting = AgentSetting::new(22, "Cost Monitor", "Operations", Some("*/15 * * * *"));
        registry.upsert(&setting).unwrap();

        registry
            .log_run(&RunRecord::ok(&setting, "scheduler", "done", 120))
            .unwrap();
        registry
            .log_run(&RunRecord::error(&setting, "scheduler", "timeout", 5000))
            .unwrap();

        let logs = registry.recent_logs(10).unwrap();
        assert_eq!(logs.len(), 2);
        // Newest first
        assert_eq!(logs[0].status, RunStatus::Error);
        assert_eq!(logs[0].error_details.as_deref(), Some("timeout"));
        assert_eq!(logs[1].status, RunStatus::Ok);
        assert_eq!(logs[1].duration_ms, Some(120));
    }
}
