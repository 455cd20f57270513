//! Executor boundary — the scheduler's only view of what agents actually do.
//!
//! The core dispatches by name and expects back pass/fail plus a detail
//! string; the mapping from agent name to behavior is owned entirely by the
//! external runtime behind this trait.

use async_trait::async_trait;
use futures::future::BoxFuture;

use leadloop_core::error::{LeadLoopError, Result};
use leadloop_registry::AgentSetting;

/// Executes a named agent. Ok(summary) on success, `Execution` error on failure.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn execute(&self, agent: &AgentSetting) -> Result<String>;
}

/// Dispatches agents to an external runtime over HTTP.
/// POSTs `{agent_id, agent_name, tier, config}` and treats any non-2xx
/// response as an execution failure.
pub struct WebhookExecutor {
    client: reqwest::Client,
    url: String,
    auth_token: Option<String>,
}

impl WebhookExecutor {
    pub fn new(url: &str, auth_token: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            auth_token: auth_token
                .filter(|t| !t.is_empty())
                .map(|t| t.to_string()),
        }
    }
}

#[async_trait]
impl AgentExecutor for WebhookExecutor {
    async fn execute(&self, agent: &AgentSetting) -> Result<String> {
        let mut req = self.client.post(&self.url).json(&serde_json::json!({
            "agent_id": agent.agent_id,
            "agent_name": agent.agent_name,
            "tier": agent.tier,
            "config": agent.config,
        }));
        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| LeadLoopError::Execution(format!("webhook send failed: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            Ok(format!("runtime accepted '{}' ({status})", agent.agent_name))
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(LeadLoopError::Execution(format!(
                "runtime rejected '{}': {status} {body}",
                agent.agent_name
            )))
        }
    }
}

type Callback = dyn Fn(AgentSetting) -> BoxFuture<'static, Result<String>> + Send + Sync;

/// Wraps an async closure as an executor — used when embedding the scheduler
/// and throughout the engine tests.
pub struct CallbackExecutor {
    f: Box<Callback>,
}

impl CallbackExecutor {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(AgentSetting) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<String>> + Send + 'static,
    {
        Self {
            f: Box::new(move |agent| Box::pin(f(agent))),
        }
    }
}

#[async_trait]
impl AgentExecutor for CallbackExecutor {
    async fn execute(&self, agent: &AgentSetting) -> Result<String> {
        (self.f)(agent.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_callback_executor_passes_agent_through() {
        let executor = CallbackExecutor::new(|agent| async move {
            Ok(format!("ran {}", agent.agent_name))
        });
        let agent = AgentSetting::new(1, "Lead Scraper", "Revenue", Some("0 6 * * *"));
        let summary = executor.execute(&agent).await.unwrap();
        assert_eq!(summary, "ran Lead Scraper");
    }

    #[tokio::test]
    async fn test_callback_executor_propagates_failure() {
        let executor = CallbackExecutor::new(|_agent| async move {
            Err(LeadLoopError::Execution("provider quota exhausted".into()))
        });
        let agent = AgentSetting::new(2, "Lead Enricher", "Revenue", None);
        let err = executor.execute(&agent).await.unwrap_err();
        assert!(matches!(err, LeadLoopError::Execution(_)));
    }
}
