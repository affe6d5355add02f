//! Wiring from configuration to stores, gateways, tools and the agent.

use crate::config::{Config, ConfigError, GatewayKind, Provider};
use crate::demo::{self, WeatherTable};
use crate::error::Result;
use approval::{
    ApprovalGateway, Decision, HttpGateway, LedgerGateway, PolicyGateway, RecordDecision,
};
use runtime::{
    AgentLoop, AnthropicBackend, ApprovalGate, Backend, ModelError, ModelRequest, ModelResponse,
    ResumeCoordinator, Resumed, ScriptedBackend, ToolSet,
};
use std::sync::Arc;
use storage::SqliteCheckpointStore;

/// The configured model backend.
pub enum CliBackend {
    Anthropic(AnthropicBackend),
    Scripted(ScriptedBackend),
}

impl Backend for CliBackend {
    async fn call(&self, request: ModelRequest<'_>) -> std::result::Result<ModelResponse, ModelError> {
        match self {
            Self::Anthropic(backend) => backend.call(request).await,
            Self::Scripted(backend) => backend.call(request).await,
        }
    }
}

/// Everything one CLI invocation needs.
pub struct App {
    pub config: Config,
    pub store: Arc<SqliteCheckpointStore>,
    /// Local ledger; also the store of record for `decide` and `watch`.
    pub ledger: Arc<LedgerGateway>,
    /// The gateway gated tools submit to.
    pub gateway: Arc<dyn ApprovalGateway>,
    pub tools: Arc<ToolSet>,
    pub weather: Arc<WeatherTable>,
    pub coordinator: ResumeCoordinator,
}

impl App {
    pub fn open(config: Config) -> Result<Self> {
        let db_path = config.database_path();
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        tracing::debug!(path = %db_path.display(), "opening database");

        let store = Arc::new(SqliteCheckpointStore::open(&db_path)?);
        let mut ledger = LedgerGateway::open(&db_path)?;
        if let Some(ttl) = config.approval.expire_after() {
            ledger = ledger.with_expiry(ttl);
        }
        let ledger = Arc::new(ledger);
        let gateway = Self::gateway(&config, &ledger)?;

        let gate = ApprovalGate::new(store.clone(), gateway.clone());
        let weather = Arc::new(WeatherTable::seeded());
        let tools = Arc::new(demo::tool_set(weather.clone(), &gate)?);

        let mut coordinator = ResumeCoordinator::new(store.clone(), tools.clone());
        if let Some(timeout) = config.approval.tool_timeout() {
            coordinator = coordinator.with_tool_timeout(timeout);
        }

        Ok(Self {
            config,
            store,
            ledger,
            gateway,
            tools,
            weather,
            coordinator,
        })
    }

    fn gateway(config: &Config, ledger: &Arc<LedgerGateway>) -> Result<Arc<dyn ApprovalGateway>> {
        let gateway: Arc<dyn ApprovalGateway> = match config.approval.gateway {
            GatewayKind::Ledger if config.policy.is_empty() => ledger.clone(),
            GatewayKind::Ledger => Arc::new(PolicyGateway::new(config.policy.clone(), ledger.clone())),
            GatewayKind::Http => {
                let base_url = config
                    .approval
                    .base_url
                    .clone()
                    .ok_or(ConfigError::MissingGatewayUrl)?;
                let mut builder = HttpGateway::builder(base_url);
                if let Some(api_key) = &config.approval.api_key {
                    builder = builder.api_key(api_key.clone());
                }
                if !config.policy.is_empty() {
                    tracing::warn!("allow/deny rules only apply to the ledger gateway; ignoring them");
                }
                if config.approval.expire_after_secs.is_some() {
                    tracing::warn!("expire_after_secs only applies to the ledger gateway; ignoring it");
                }
                Arc::new(builder.build()?)
            }
        };
        Ok(gateway)
    }

    /// Build the agent. A resuming agent gets the wrap-up script when offline.
    pub fn agent(&self, resuming: bool) -> Result<AgentLoop<CliBackend>> {
        let backend = match self.config.backend.provider {
            Provider::Anthropic => {
                let mut builder =
                    AnthropicBackend::builder(self.config.api_key()?, &self.config.backend.model);
                if let Some(base_url) = &self.config.backend.base_url {
                    builder = builder.base_url(base_url.clone());
                }
                if let Some(max_tokens) = self.config.backend.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }
                CliBackend::Anthropic(builder.build())
            }
            Provider::Scripted => CliBackend::Scripted(ScriptedBackend::new(demo::script(resuming))),
        };
        Ok(AgentLoop::new(backend, self.tools.clone()).with_system(demo::SYSTEM_PROMPT))
    }

    pub fn uses_ledger(&self) -> bool {
        self.config.approval.gateway == GatewayKind::Ledger
    }

    /// Resume from a decision pushed over HTTP.
    ///
    /// With the ledger in use its record is final: the push is written only
    /// if the request is still undecided, and the run resumes with whatever
    /// the ledger then holds. Pushes naming an unknown request, or a
    /// checkpoint other than the request's, are dropped (`Ok(None)`).
    pub async fn apply_pushed(&self, pushed: Decision) -> Result<Option<Resumed>> {
        let decision = if self.uses_ledger() {
            match self.ledger_decision(pushed).await? {
                Some(decision) => decision,
                None => return Ok(None),
            }
        } else {
            pushed
        };
        Ok(Some(self.coordinator.on_decision(decision).await?))
    }

    async fn ledger_decision(&self, pushed: Decision) -> Result<Option<Decision>> {
        let id = pushed.approval_request_id.clone();
        let Some(checkpoint_id) = pushed.correlation.as_deref() else {
            tracing::warn!(approval_request_id = %id, "pushed decision carries no checkpoint id");
            return Ok(None);
        };
        if self.ledger.request_for_checkpoint(checkpoint_id)?.as_ref() != Some(&id) {
            tracing::warn!(
                approval_request_id = %id,
                checkpoint_id,
                "pushed decision does not match a ledger request; dropped"
            );
            return Ok(None);
        }

        match self.ledger.record(&id, pushed.approved, pushed.feedback) {
            Ok(decision) => Ok(Some(decision)),
            Err(approval::Error::AlreadyDecided(_)) => {
                tracing::info!(approval_request_id = %id, "request already decided; using the ledger's decision");
                Ok(self.ledger.fetch_decision(&id).await?)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime::LoopOutcome;
    use runtime::model::ToolOutcome;
    use storage::CheckpointStore;

    fn offline_app(dir: &tempfile::TempDir, extra: &str) -> App {
        let config = Config::parse(&format!(
            "[backend]\nprovider = \"scripted\"\n[storage]\npath = {:?}\n{extra}",
            dir.path().join("lk.db")
        ))
        .unwrap();
        App::open(config).unwrap()
    }

    #[tokio::test]
    async fn run_parks_then_resumes_from_second_process() {
        let dir = tempfile::tempdir().unwrap();
        let first = offline_app(&dir, "");
        let (_, outcome) = first.agent(false).unwrap().start("make Paris sunny").await.unwrap();
        let LoopOutcome::Suspended { pending, .. } = outcome else {
            panic!("expected suspension");
        };
        assert_eq!(first.store.pending().unwrap().len(), 1);

        // An operator decides from another process.
        let operator = offline_app(&dir, "");
        operator
            .ledger
            .record(&pending.approval_request_id, true, None)
            .unwrap();

        let second = offline_app(&dir, "");
        let resumed = second
            .coordinator
            .poll(second.gateway.as_ref(), &pending.approval_request_id)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(resumed.outcome(), Some(ToolOutcome::Success { .. })));
        let outcome = second.agent(true).unwrap().resume(resumed).await.unwrap();
        assert!(matches!(outcome, LoopOutcome::Final { .. }));
        assert!(second.store.pending().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deny_rule_rejects_at_submit() {
        let dir = tempfile::tempdir().unwrap();
        let app = offline_app(
            &dir,
            "[deny]\ntools = [\"changeWeather\"]\nfeedback = \"weather is read-only today\"",
        );
        let (_, outcome) = app.agent(false).unwrap().start("make Paris sunny").await.unwrap();
        let LoopOutcome::Suspended { pending, .. } = outcome else {
            panic!("expected suspension");
        };

        let resumed = app
            .coordinator
            .poll(app.gateway.as_ref(), &pending.approval_request_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            resumed.outcome(),
            Some(&ToolOutcome::rejected("weather is read-only today"))
        );
    }

    async fn parked(app: &App) -> runtime::PendingApproval {
        let (_, outcome) = app.agent(false).unwrap().start("make Paris sunny").await.unwrap();
        let LoopOutcome::Suspended { pending, .. } = outcome else {
            panic!("expected suspension");
        };
        pending
    }

    #[tokio::test]
    async fn pushed_approval_cannot_override_recorded_rejection() {
        let dir = tempfile::tempdir().unwrap();
        let app = offline_app(&dir, "");
        let pending = parked(&app).await;
        app.ledger
            .record(&pending.approval_request_id, false, Some("no".into()))
            .unwrap();

        let pushed = Decision::approve(pending.approval_request_id.clone())
            .with_correlation(pending.checkpoint_id.as_str());
        let resumed = app.apply_pushed(pushed).await.unwrap().unwrap();

        assert_eq!(resumed.kind, runtime::ResumeKind::Rejected);
        assert_eq!(resumed.outcome(), Some(&ToolOutcome::rejected("no")));
        assert_eq!(app.weather.get("Paris").unwrap().unwrap().conditions, "Cloudy");
        let held = app
            .ledger
            .fetch_decision(&pending.approval_request_id)
            .await
            .unwrap()
            .unwrap();
        assert!(!held.approved);
    }

    #[tokio::test]
    async fn first_push_is_recorded_in_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let app = offline_app(&dir, "");
        let pending = parked(&app).await;

        let pushed = Decision::approve(pending.approval_request_id.clone())
            .with_correlation(pending.checkpoint_id.as_str());
        let resumed = app.apply_pushed(pushed).await.unwrap().unwrap();

        assert_eq!(resumed.kind, runtime::ResumeKind::Executed);
        assert_eq!(app.weather.get("Paris").unwrap().unwrap().conditions, "Sunny");
        assert!(app.ledger.pending().unwrap().is_empty());

        let late = Decision::reject(pending.approval_request_id.clone())
            .with_correlation(pending.checkpoint_id.as_str());
        assert!(app.apply_pushed(late).await.is_err());
    }

    #[tokio::test]
    async fn mismatched_push_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let app = offline_app(&dir, "");
        let pending = parked(&app).await;

        let unknown = Decision::approve("no-such-request")
            .with_correlation(pending.checkpoint_id.as_str());
        assert!(app.apply_pushed(unknown).await.unwrap().is_none());

        let wrong_checkpoint = Decision::approve(pending.approval_request_id.clone())
            .with_correlation("some-other-checkpoint");
        assert!(app.apply_pushed(wrong_checkpoint).await.unwrap().is_none());

        assert_eq!(app.store.pending().unwrap().len(), 1);
        assert_eq!(app.ledger.pending().unwrap().len(), 1);
        assert_eq!(app.weather.get("Paris").unwrap().unwrap().conditions, "Cloudy");
    }

    #[test]
    fn http_gateway_needs_url() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::parse(&format!(
            "[storage]\npath = {:?}\n[approval]\ngateway = \"http\"",
            dir.path().join("lk.db")
        ))
        .unwrap();
        assert!(matches!(
            App::open(config),
            Err(crate::error::Error::Config(ConfigError::MissingGatewayUrl))
        ));
    }
}
