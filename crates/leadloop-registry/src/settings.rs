//! Registry data model — agent settings and run log records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One agent's configuration row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSetting {
    /// Row UUID.
    pub id: String,
    /// Stable numeric identity — the executor mapping and retry bookkeeping key.
    pub agent_id: i64,
    /// Unique human-readable name (e.g. "Lead Scraper").
    pub agent_name: String,
    /// Grouping label for bulk configuration (Revenue, Content, ClientSuccess, Operations).
    pub tier: String,
    /// Disabled agents are never dispatched.
    pub is_enabled: bool,
    /// Cron expression defining recurrence. A row without one never fires.
    pub schedule_cron: Option<String>,
    /// Opaque JSON attribute bag, passed through to the executor.
    pub config: serde_json::Value,
    /// Timestamp of the most recent successful dispatch.
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentSetting {
    /// Create a new setting row with defaults (enabled, empty config).
    pub fn new(agent_id: i64, agent_name: &str, tier: &str, schedule_cron: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id,
            agent_name: agent_name.to_string(),
            tier: tier.to_string(),
            is_enabled: true,
            schedule_cron: schedule_cron.map(|s| s.to_string()),
            config: serde_json::json!({}),
            last_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Outcome of a dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ok,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Ok => "ok",
            RunStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dispatch attempt, as persisted in `agent_logs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Autoincrement row id (None before insert).
    pub id: Option<i64>,
    pub agent_id: i64,
    pub agent_name: String,
    /// What triggered the run: "scheduler", "manual", "retry".
    pub action: String,
    pub status: RunStatus,
    pub message: String,
    pub error_details: Option<String>,
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl RunRecord {
    /// Build a success record.
    pub fn ok(agent: &AgentSetting, action: &str, message: &str, duration_ms: i64) -> Self {
        Self {
            id: None,
            agent_id: agent.agent_id,
            agent_name: agent.agent_name.clone(),
            action: action.to_string(),
            status: RunStatus::Ok,
            message: message.to_string(),
            error_details: None,
            duration_ms: Some(duration_ms),
            created_at: Utc::now(),
        }
    }

    /// Build a failure record.
    pub fn error(agent: &AgentSetting, action: &str, detail: &str, duration_ms: i64) -> Self {
        Self {
            id: None,
            agent_id: agent.agent_id,
            agent_name: agent.agent_name.clone(),
            action: action.to_string(),
            status: RunStatus::Error,
            message: format!("Dispatch failed for '{}'", agent.agent_name),
            error_details: Some(detail.to_string()),
            duration_ms: Some(duration_ms),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_setting_defaults() {
        let setting = AgentSetting::new(22, "Cost Monitor", "Operations", Some("*/15 * * * *"));
        assert!(setting.is_enabled);
        assert!(setting.last_run_at.is_none());
        assert_eq!(setting.config, serde_json::json!({}));
        assert_eq!(setting.schedule_cron.as_deref(), Some("*/15 * * * *"));
    }

    #[test]
    fn test_run_status_strings() {
        assert_eq!(RunStatus::Ok.as_str(), "ok");
        assert_eq!(RunStatus::Error.to_string(), "error");
    }
}
