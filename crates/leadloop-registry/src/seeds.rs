//! Canonical agent roster — the 26 LeadLoop agents and their default schedules.
//!
//! Seeding is idempotent: missing rows are inserted, existing rows keep their
//! operator-tuned `schedule_cron` (the seed value only fills a NULL schedule).

use chrono::Utc;

use leadloop_core::error::Result;

use crate::db::AgentRegistry;
use crate::settings::AgentSetting;

/// One entry in the seed catalog.
#[derive(Debug, Clone, Copy)]
pub struct SeedAgent {
    pub agent_id: i64,
    pub name: &'static str,
    pub tier: &'static str,
    pub cron: &'static str,
    pub description: &'static str,
}

/// The default roster, grouped by tier.
pub const DEFAULT_AGENTS: &[SeedAgent] = &[
    // Revenue
    SeedAgent { agent_id: 1, name: "Lead Scraper", tier: "Revenue", cron: "0 6 * * *", description: "Finds prospect companies via data providers" },
    SeedAgent { agent_id: 2, name: "Lead Enricher", tier: "Revenue", cron: "0 7 * * *", description: "Enriches leads with firmographic and contact data" },
    SeedAgent { agent_id: 3, name: "Outreach Sender", tier: "Revenue", cron: "0 8 * * 1-5", description: "Sends cold email campaigns and outreach sequences" },
    SeedAgent { agent_id: 4, name: "Follow-Up Manager", tier: "Revenue", cron: "0 9 * * 1-5", description: "Manages follow-up and nurture sequences" },
    SeedAgent { agent_id: 5, name: "LinkedIn Prospector", tier: "Revenue", cron: "0 10 * * 1-5", description: "Sources prospects from LinkedIn" },
    SeedAgent { agent_id: 6, name: "Offer Generator", tier: "Revenue", cron: "0/30 * * * *", description: "Creates AI-powered custom proposals" },
    SeedAgent { agent_id: 7, name: "Pipeline Manager", tier: "Revenue", cron: "0 17 * * 1-5", description: "Maintains CRM stages and opportunity pipeline" },
    SeedAgent { agent_id: 8, name: "Meeting Scheduler", tier: "Revenue", cron: "0 * * * *", description: "Books discovery calls and confirms meetings" },
    // Content
    SeedAgent { agent_id: 9, name: "Content Idea Generator", tier: "Content", cron: "0 8 * * 1", description: "Generates weekly content ideas" },
    SeedAgent { agent_id: 10, name: "Content Writer", tier: "Content", cron: "0 9 * * 2", description: "Writes social posts and content drafts" },
    SeedAgent { agent_id: 11, name: "Image Generator", tier: "Content", cron: "0 10 * * 2", description: "Creates visual assets for campaigns" },
    SeedAgent { agent_id: 12, name: "Content Scheduler", tier: "Content", cron: "0 11 * * 3", description: "Schedules content across social platforms" },
    SeedAgent { agent_id: 13, name: "Engagement Monitor", tier: "Content", cron: "0/30 8-18 * * 1-5", description: "Tracks comments and engagement signals" },
    SeedAgent { agent_id: 14, name: "Trend Analyzer", tier: "Content", cron: "0 7 * * 1", description: "Discovers trending content opportunities" },
    // ClientSuccess
    SeedAgent { agent_id: 15, name: "Client Onboarder", tier: "ClientSuccess", cron: "0 * * * *", description: "Automates onboarding workflows" },
    SeedAgent { agent_id: 16, name: "Health Monitor", tier: "ClientSuccess", cron: "0 8 * * *", description: "Calculates client health and churn signals" },
    SeedAgent { agent_id: 17, name: "Report Generator", tier: "ClientSuccess", cron: "0 9 * * 1", description: "Builds weekly and monthly client reports" },
    SeedAgent { agent_id: 18, name: "Churn Predictor", tier: "ClientSuccess", cron: "0 8 * * *", description: "Flags accounts with churn risk" },
    SeedAgent { agent_id: 19, name: "Upsell Identifier", tier: "ClientSuccess", cron: "0 10 * * 1", description: "Finds expansion and upsell opportunities" },
    SeedAgent { agent_id: 20, name: "NPS Collector", tier: "ClientSuccess", cron: "0 9 1 * *", description: "Collects and tracks satisfaction feedback" },
    // Operations
    SeedAgent { agent_id: 21, name: "Daily Briefing", tier: "Operations", cron: "0 7 * * 1-5", description: "Publishes daily executive operations brief" },
    SeedAgent { agent_id: 22, name: "Cost Monitor", tier: "Operations", cron: "0/15 * * * *", description: "Monitors API and infrastructure spend" },
    SeedAgent { agent_id: 23, name: "Error Handler", tier: "Operations", cron: "0/5 * * * *", description: "Detects and routes runtime errors" },
    SeedAgent { agent_id: 24, name: "Backup Manager", tier: "Operations", cron: "0 2 * * *", description: "Runs routine backup and validation jobs" },
    SeedAgent { agent_id: 25, name: "Performance Optimizer", tier: "Operations", cron: "0 3 * * 0", description: "Optimizes pipelines and execution performance" },
    SeedAgent { agent_id: 26, name: "Compliance Checker", tier: "Operations", cron: "0 4 * * 0", description: "Ensures policy and best-practice compliance" },
];

/// Seed the registry with the default roster. Returns how many rows were inserted.
pub fn seed_defaults(registry: &AgentRegistry) -> Result<usize> {
    let mut inserted = 0;
    for seed in DEFAULT_AGENTS {
        match registry.get_by_id(seed.agent_id)? {
            None => {
                let mut setting = AgentSetting::new(seed.agent_id, seed.name, seed.tier, Some(seed.cron));
                setting.config = serde_json::json!({ "description": seed.description });
                registry.upsert(&setting)?;
                inserted += 1;
            }
            Some(mut existing) => {
                // Operator-tuned schedules win over seed defaults
                existing.agent_name = seed.name.to_string();
                existing.tier = seed.tier.to_string();
                if existing.schedule_cron.is_none() {
                    existing.schedule_cron = Some(seed.cron.to_string());
                }
                existing.updated_at = Utc::now();
                registry.upsert(&existing)?;
            }
        }
    }
    if inserted > 0 {
        tracing::info!("🌱 Seeded {} agent(s) into the registry", inserted);
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_integrity() {
        assert_eq!(DEFAULT_AGENTS.len(), 26);
        let mut ids: Vec<i64> = DEFAULT_AGENTS.iter().map(|a| a.agent_id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 26);
        let mut names: Vec<&str> = DEFAULT_AGENTS.iter().map(|a| a.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 26);
    }

    #[test]
    fn test_seed_inserts_all() {
        let registry = AgentRegistry::open_in_memory().unwrap();
        let inserted = seed_defaults(&registry).unwrap();
        assert_eq!(inserted, 26);
        assert_eq!(registry.count().unwrap(), 26);

        let cost_monitor = registry.get("Cost Monitor").unwrap().unwrap();
        assert_eq!(cost_monitor.tier, "Operations");
        assert_eq!(cost_monitor.schedule_cron.as_deref(), Some("0/15 * * * *"));
        assert!(cost_monitor.is_enabled);
    }

    #[test]
    fn test_seed_is_idempotent_and_keeps_tuned_cron() {
        let registry = AgentRegistry::open_in_memory().unwrap();
        seed_defaults(&registry).unwrap();

        // Operator retunes one schedule, then reseeds
        registry.set_schedule("Lead Scraper", "0 5 * * *").unwrap();
        let inserted = seed_defaults(&registry).unwrap();
        assert_eq!(inserted, 0);
        assert_eq!(registry.count().unwrap(), 26);

        let scraper = registry.get("Lead Scraper").unwrap().unwrap();
        assert_eq!(scraper.schedule_cron.as_deref(), Some("0 5 * * *"));
    }
}
