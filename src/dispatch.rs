//! Agent dispatch: resolves a fleet of named agent kinds to factories,
//! preflights the target server, spawns one polling task per agent, and
//! waits cooperatively for round completion before tearing everything down.
//!
//! Grounded on `examples/original_source/agents/dispatcher.py`
//! (`make_agent` factory resolution, `run_game`'s fleet-size validation,
//! polling-for-completion loop, and cooperative teardown). No concrete
//! trading strategies are implemented here — that is explicitly out of
//! scope; this module only provides the registry/factory/preflight seam.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::client::{EventHandler, FiggieClient};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamType {
    String,
    /// Numeric parameter, optionally bounded to `[min, max]` inclusive.
    Number { min: Option<f64>, max: Option<f64> },
    Bool,
}

impl ParamType {
    pub fn number() -> Self {
        ParamType::Number { min: None, max: None }
    }

    pub fn bounded(min: f64, max: f64) -> Self {
        ParamType::Number {
            min: Some(min),
            max: Some(max),
        }
    }
}

/// Declares which keys an agent kind expects in its parameter object, their
/// expected JSON type, and (for numbers) their bounds, so a bad dispatch
/// request fails before any network call is made.
#[derive(Debug, Clone, Default)]
pub struct ParamSchema {
    pub required: Vec<(&'static str, ParamType)>,
}

impl ParamSchema {
    pub fn validate(&self, params: &serde_json::Value) -> anyhow::Result<()> {
        for (key, expected) in &self.required {
            let value = params
                .get(key)
                .ok_or_else(|| anyhow::anyhow!("missing required parameter `{key}`"))?;
            match expected {
                ParamType::String if value.is_string() => {}
                ParamType::Bool if value.is_boolean() => {}
                ParamType::Number { min, max } if value.is_number() => {
                    let n = value.as_f64().unwrap();
                    if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
                        anyhow::bail!("parameter `{key}` = {n} is out of bounds [{min:?}, {max:?}]");
                    }
                }
                _ => anyhow::bail!("parameter `{key}` has the wrong type, expected {expected:?}"),
            }
        }
        Ok(())
    }
}

/// A single agent's dispatch configuration: which kind to build, and the
/// extra parameters it needs beyond `server_url`/`name`/`polling_rate`.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub kind: String,
    pub params: serde_json::Value,
}

pub type AgentFactory =
    Arc<dyn Fn(FiggieClient) -> Arc<dyn EventHandler> + Send + Sync>;

#[derive(Clone)]
struct RegisteredKind {
    schema: ParamSchema,
    factory: AgentFactory,
}

#[derive(Clone, Default)]
pub struct AgentRegistry {
    kinds: HashMap<String, RegisteredKind>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<String>, schema: ParamSchema, factory: AgentFactory) {
        self.kinds.insert(kind.into(), RegisteredKind { schema, factory });
    }

    fn resolve(&self, kind: &str) -> anyhow::Result<&RegisteredKind> {
        self.kinds
            .get(kind)
            .ok_or_else(|| anyhow::anyhow!("no agent kind registered for `{kind}`"))
    }
}

pub struct Dispatcher {
    registry: AgentRegistry,
    http: reqwest::Client,
}

impl Dispatcher {
    pub fn new(registry: AgentRegistry) -> Self {
        Self {
            registry,
            http: reqwest::Client::new(),
        }
    }

    /// Rejects dispatch unless the target server is idle: `{state: waiting,
    /// current_players: 0}` (§4.6).
    pub async fn preflight(&self, server_url: &str) -> anyhow::Result<()> {
        let status: serde_json::Value = self
            .http
            .get(format!("{}/status", server_url.trim_end_matches('/')))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let state = status.get("state").and_then(|v| v.as_str());
        let current_players = status.get("current_players").and_then(|v| v.as_u64());
        if state != Some("waiting") || current_players != Some(0) {
            anyhow::bail!(
                "server not idle for dispatch: state={:?}, current_players={:?}",
                state,
                current_players
            );
        }
        Ok(())
    }

    /// Resolves, joins, and launches one polling task per agent. Each
    /// returned `FiggieClient` is already joined (`player_id` populated)
    /// before the dispatcher waits for round completion.
    pub async fn run_game(
        &self,
        agents: Vec<AgentConfig>,
        server_url: &str,
        default_polling_rate: f64,
    ) -> anyhow::Result<()> {
        let fleet_size = agents.len();
        if fleet_size != 4 && fleet_size != 5 {
            anyhow::bail!("number of players must be 4 or 5, got {fleet_size}");
        }

        self.preflight(server_url).await?;

        let stop = Arc::new(AtomicBool::new(false));
        let mut tasks = Vec::with_capacity(fleet_size);

        for (idx, agent) in agents.into_iter().enumerate() {
            let registered = self.registry.resolve(&agent.kind)?;
            registered.schema.validate(&agent.params)?;

            let name = format!("{}{idx}", agent.kind);
            let mut client = FiggieClient::new(server_url, &name)
                .with_polling_rate(default_polling_rate, 0.1);
            client.join().await?;
            tracing::info!(agent = %name, kind = %agent.kind, "agent joined");

            // One join per agent: `poller` is a cheap clone sharing the same
            // player_id, not a second network join, so the strategy's own
            // quotes are still recognized as self by the event loop.
            let mut poller = client.clone();
            let handler = (registered.factory)(client);

            let stop = stop.clone();
            tasks.push(tokio::spawn(async move {
                poller.run(handler, stop).await;
            }));
        }

        self.wait_for_completion(server_url).await?;

        tracing::info!("round complete, shutting down agents");
        stop.store(true, Ordering::Relaxed);
        for task in tasks {
            let _ = task.await;
        }
        Ok(())
    }

    async fn wait_for_completion(&self, server_url: &str) -> anyhow::Result<()> {
        loop {
            let status: serde_json::Value = self
                .http
                .get(format!("{}/status", server_url.trim_end_matches('/')))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            if status.get("state").and_then(|v| v.as_str()) == Some("completed") {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_rejects_missing_param() {
        let schema = ParamSchema {
            required: vec![("aggression", ParamType::number())],
        };
        let err = schema.validate(&serde_json::json!({})).unwrap_err();
        assert!(err.to_string().contains("aggression"));
    }

    #[test]
    fn schema_rejects_wrong_type() {
        let schema = ParamSchema {
            required: vec![("aggression", ParamType::number())],
        };
        let err = schema
            .validate(&serde_json::json!({ "aggression": "high" }))
            .unwrap_err();
        assert!(err.to_string().contains("wrong type"));
    }

    #[test]
    fn schema_accepts_matching_params() {
        let schema = ParamSchema {
            required: vec![("aggression", ParamType::number())],
        };
        assert!(schema.validate(&serde_json::json!({ "aggression": 0.5 })).is_ok());
    }

    #[test]
    fn schema_rejects_out_of_bounds_number() {
        let schema = ParamSchema {
            required: vec![("aggression", ParamType::bounded(0.0, 1.0))],
        };
        let err = schema
            .validate(&serde_json::json!({ "aggression": 1.5 }))
            .unwrap_err();
        assert!(err.to_string().contains("out of bounds"));
    }
}
