//! # LeadLoop — Multi-Agent Outreach & CRM Automation Backend
//!
//! Runs the due-time agent scheduler and the administrative surface for the
//! agent registry.
//!
//! Usage:
//!   leadloop serve                        # Run the scheduler until Ctrl-C
//!   leadloop seed                         # Seed the default 26-agent roster
//!   leadloop agents list                  # Show all agents
//!   leadloop agents enable "Lead Scraper"
//!   leadloop agents set-tier-cron Content "0 12 * * 3"
//!   leadloop run "Cost Monitor"           # One-shot manual dispatch
//!   leadloop logs --limit 50              # Recent dispatch attempts

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use leadloop_core::LeadLoopConfig;
use leadloop_registry::{seeds, AgentRegistry, RegistryStore};
use leadloop_scheduler::{AgentExecutor, CallbackExecutor, CronSchedule, SchedulerEngine, WebhookExecutor};

#[derive(Parser)]
#[command(
    name = "leadloop",
    version,
    about = "🔁 LeadLoop — Multi-Agent Outreach & CRM Automation"
)]
struct Cli {
    /// Path to config file (default: ~/.leadloop/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Registry database path (overrides config)
    #[arg(long)]
    db: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler until interrupted
    Serve,
    /// Seed the registry with the default agent roster
    Seed,
    /// Manage agent settings
    Agents {
        #[command(subcommand)]
        command: AgentsCommand,
    },
    /// Dispatch one agent immediately
    Run {
        /// Agent name (e.g. "Cost Monitor")
        name: String,
    },
    /// Show recent dispatch attempts
    Logs {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum AgentsCommand {
    /// List all registered agents
    List,
    /// Enable one agent by name
    Enable { name: String },
    /// Disable one agent by name
    Disable { name: String },
    /// Enable every agent
    EnableAll,
    /// Disable every agent
    DisableAll,
    /// Set one agent's cron expression
    SetCron { name: String, cron: String },
    /// Set the cron expression for every agent in a tier
    SetTierCron { tier: String, cron: String },
    /// Enable exactly the named agents and disable the rest
    Sprint { names: Vec<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &cli.config {
        Some(path) => LeadLoopConfig::load_from(path)?,
        None => LeadLoopConfig::load()?,
    };
    let db_path = cli.db.clone().unwrap_or_else(|| config.registry.db_path.clone());
    let registry = Arc::new(AgentRegistry::open(Path::new(&db_path))?);

    match cli.command {
        Command::Serve => serve(config, registry).await,
        Command::Seed => {
            let inserted = seeds::seed_defaults(&registry)?;
            println!("Seeded {inserted} agent(s); registry now holds {}", registry.count()?);
            Ok(())
        }
        Command::Agents { command } => agents(command, &registry),
        Command::Run { name } => {
            let engine = Arc::new(SchedulerEngine::new(
                Arc::clone(&registry) as Arc<dyn RegistryStore>,
                build_executor(&config),
                config.scheduler.clone(),
            ));
            let summary = engine.trigger_now(&name).await?;
            println!("{summary}");
            Ok(())
        }
        Command::Logs { limit } => {
            for log in registry.recent_logs(limit)? {
                println!(
                    "{}  {:<24} {:<9} {:>6}ms  {}",
                    log.created_at.format("%Y-%m-%d %H:%M:%S"),
                    log.agent_name,
                    log.status,
                    log.duration_ms.unwrap_or(0),
                    log.error_details.unwrap_or(log.message),
                );
            }
            Ok(())
        }
    }
}

/// Run the scheduler loop until Ctrl-C, then stop gracefully.
async fn serve(config: LeadLoopConfig, registry: Arc<AgentRegistry>) -> Result<()> {
    let count = registry.count()?;
    if count == 0 {
        tracing::warn!("⚠️ Registry is empty — run `leadloop seed` to install the default roster");
    }
    tracing::info!("📇 Registry ready with {count} agent(s) at startup");

    let engine = Arc::new(SchedulerEngine::new(
        Arc::clone(&registry) as Arc<dyn RegistryStore>,
        build_executor(&config),
        config.scheduler.clone(),
    ));
    let handle = engine.start();

    tokio::signal::ctrl_c().await?;
    tracing::info!("🛑 Shutting down...");
    handle.stop().await;
    Ok(())
}

/// Webhook executor when a runtime URL is configured, log-only otherwise.
fn build_executor(config: &LeadLoopConfig) -> Arc<dyn AgentExecutor> {
    if config.executor.webhook_url.is_empty() {
        tracing::warn!("⚠️ No executor.webhook_url configured — running in dry-run mode");
        Arc::new(CallbackExecutor::new(|agent| async move {
            tracing::info!("🤖 (dry-run) would execute '{}'", agent.agent_name);
            Ok("dry-run".into())
        }))
    } else {
        Arc::new(WebhookExecutor::new(
            &config.executor.webhook_url,
            Some(&config.executor.auth_token),
        ))
    }
}

fn agents(command: AgentsCommand, registry: &AgentRegistry) -> Result<()> {
    match command {
        AgentsCommand::List => {
            println!(
                "{:<4} {:<24} {:<14} {:<9} {:<20} LAST RUN",
                "ID", "NAME", "TIER", "ENABLED", "SCHEDULE"
            );
            for agent in registry.list_all()? {
                println!(
                    "{:<4} {:<24} {:<14} {:<9} {:<20} {}",
                    agent.agent_id,
                    agent.agent_name,
                    agent.tier,
                    if agent.is_enabled { "yes" } else { "no" },
                    agent.schedule_cron.as_deref().unwrap_or("-"),
                    agent
                        .last_run_at
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "never".into()),
                );
            }
        }
        AgentsCommand::Enable { name } => {
            report_rows(registry.set_enabled(&name, true)?, &name);
        }
        AgentsCommand::Disable { name } => {
            report_rows(registry.set_enabled(&name, false)?, &name);
        }
        AgentsCommand::EnableAll => {
            println!("Enabled {} agent(s)", registry.enable_all()?);
        }
        AgentsCommand::DisableAll => {
            println!("Disabled {} agent(s)", registry.disable_all()?);
        }
        AgentsCommand::SetCron { name, cron } => {
            // Reject bad expressions before they reach the scheduler
            CronSchedule::parse(&cron)?;
            report_rows(registry.set_schedule(&name, &cron)?, &name);
        }
        AgentsCommand::SetTierCron { tier, cron } => {
            CronSchedule::parse(&cron)?;
            println!("Updated {} agent(s) in tier {tier}", registry.set_tier_schedule(&tier, &cron)?);
        }
        AgentsCommand::Sprint { names } => {
            let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
            let (enabled, disabled) = registry.enable_only(&refs)?;
            println!("Sprint active: {enabled} enabled, {disabled} disabled");
        }
    }
    Ok(())
}

fn report_rows(affected: usize, name: &str) {
    if affected == 0 {
        println!("No agent named '{name}'");
    } else {
        println!("Updated '{name}'");
    }
}
