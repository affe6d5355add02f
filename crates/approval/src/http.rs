//! HTTP client for a function-call approval service.
//!
//! The service keeps one record per call: the agent posts the call spec, a
//! human approves or rejects it out of band, and the record's `status` is
//! filled in. The same record shape arrives on the service's webhook, so
//! [`FunctionCall::decision`] serves both the poll and the push path.

use crate::{ApprovalGateway, ApprovalRequest, ApprovalRequestId, Decision, Error, Result};
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A function-call record as the approval service stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub run_id: String,
    pub call_id: String,
    pub spec: FunctionCallSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<FunctionCallStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallSpec {
    #[serde(rename = "fn")]
    pub function: String,
    pub kwargs: Value,
    /// Opaque state echoed back; carries `checkpoint_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallStatus {
    /// `None` while nobody has responded.
    #[serde(default)]
    pub approved: Option<bool>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl FunctionCall {
    /// The decision this record carries, if the approver has responded.
    pub fn decision(&self) -> Option<Decision> {
        let status = self.status.as_ref()?;
        let approved = status.approved?;
        let correlation = self
            .spec
            .state
            .as_ref()
            .and_then(|state| state.get("checkpoint_id"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Some(Decision {
            approval_request_id: self.call_id.clone().into(),
            approved,
            feedback: status.comment.clone(),
            correlation,
        })
    }
}

/// Builder for [`HttpGateway`].
#[derive(Debug, Clone)]
pub struct HttpGatewayBuilder {
    base_url: String,
    api_key: Option<String>,
    run_id: String,
    timeout: Duration,
}

impl HttpGatewayBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            run_id: "lockkeeper".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Bearer token sent with every request.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Label grouping this agent's calls on the service.
    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<HttpGateway> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::Unavailable(e.to_string()))?;
        Ok(HttpGateway {
            client,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            api_key: self.api_key,
            run_id: self.run_id,
        })
    }
}

/// Approval gateway backed by a remote function-call approval service.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    run_id: String,
}

impl HttpGateway {
    pub fn builder(base_url: impl Into<String>) -> HttpGatewayBuilder {
        HttpGatewayBuilder::new(base_url)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }
}

impl std::fmt::Display for HttpGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "http({})", self.base_url)
    }
}

#[async_trait]
impl ApprovalGateway for HttpGateway {
    async fn submit(&self, request: &ApprovalRequest) -> Result<ApprovalRequestId> {
        let id = ApprovalRequestId::generate();
        let call = FunctionCall {
            run_id: self.run_id.clone(),
            call_id: id.to_string(),
            spec: FunctionCallSpec {
                function: request.tool_name.clone(),
                kwargs: request.arguments.clone(),
                state: Some(json!({ "checkpoint_id": request.checkpoint_id })),
            },
            status: None,
        };

        let response = self
            .authorize(self.client.post(format!("{}/function_calls", self.base_url)))
            .json(&call)
            .send()
            .await
            .map_err(|e| Error::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!("{status}: {body}")));
        }

        tracing::info!(
            approval_request_id = %id,
            tool = %request.tool_name,
            checkpoint_id = %request.checkpoint_id,
            gateway = %self,
            "approval requested"
        );
        Ok(id)
    }

    async fn fetch_decision(&self, id: &ApprovalRequestId) -> Result<Option<Decision>> {
        let response = self
            .authorize(
                self.client
                    .get(format!("{}/function_calls/{}", self.base_url, id)),
            )
            .send()
            .await
            .map_err(|e| Error::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(Error::NotFound(id.to_string())),
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Api(format!("{status}: {body}")));
            }
            _ => {}
        }

        let call: FunctionCall = response
            .json()
            .await
            .map_err(|e| Error::Api(format!("invalid function call record: {e}")))?;
        Ok(call.decision())
    }
}
