//! # Remote Snapshot Fetcher
//!
//! Talks to the DIA web service: one login call that yields a session token,
//! and one report call that exchanges a report code for decoded rows.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DIA Web Service Calls                           │
//! │                                                                         │
//! │   CycleOrchestrator                 DiaClient               DIA (HTTPS) │
//! │         │                               │                        │      │
//! │         │ authenticate()                │  POST sis/json         │      │
//! │         │──────────────────────────────►│  {"login": {...}}      │      │
//! │         │                               │───────────────────────►│      │
//! │         │                               │  {code:"200", msg:tok} │      │
//! │         │◄──────────────── token ───────│◄───────────────────────│      │
//! │         │                               │                        │      │
//! │         │ fetch(FetchRequest)           │  POST rpr/json         │      │
//! │         │──────────────────────────────►│  {"rpr_raporsonuc_getir"}      │
//! │         │                               │───────────────────────►│      │
//! │         │                               │  {code, result:base64} │      │
//! │         │◄──────── FetchOutcome ────────│◄───────────────────────│      │
//! │                                                                         │
//! │  fetch() never fails: transport, decode and remote errors all come     │
//! │  back as a FetchStatus the caller branches on.                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use hednova_core::{token_preview, RemoteRow};

use crate::config::{IntegratorConfig, IntegratorSettings, RemoteSettings};
use crate::error::{IntegrationError, IntegrationResult};
use crate::payload::{decode_payload, extract_rows};

/// Status code the service uses for success.
pub const SUCCESS_CODE: &str = "200";

/// Reported for fetches that never got a response.
pub const TRANSPORT_FAILURE_CODE: &str = "997";

/// Reported for responses that could not be decoded.
pub const DECODE_FAILURE_CODE: &str = "996";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Fetch Request
// =============================================================================

/// One report fetch.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub report_code: String,
    pub token: String,
    pub company: String,
    pub period: String,
    /// Extra report parameters merged into `param`.
    pub params: Map<String, Value>,
    /// Sub-report id for hierarchical reports.
    pub detail: Option<String>,
}

impl FetchRequest {
    pub fn new(
        report_code: impl Into<String>,
        token: impl Into<String>,
        company: impl Into<String>,
        period: impl Into<String>,
    ) -> Self {
        FetchRequest {
            report_code: report_code.into(),
            token: token.into(),
            company: company.into(),
            period: period.into(),
            params: Map::new(),
            detail: None,
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Same request with a different session token.
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        FetchRequest {
            token: token.into(),
            ..self.clone()
        }
    }

    fn body(&self) -> Value {
        let mut param = Map::new();
        param.insert("firma".into(), Value::from(self.company.trim()));
        param.insert("donem".into(), Value::from(self.period.trim()));
        for (name, value) in &self.params {
            param.insert(name.clone(), value.clone());
        }

        json!({
            "rpr_raporsonuc_getir": {
                "session_id": self.token,
                "firma_kodu": numeric_or_text(&self.company),
                "donem_kodu": numeric_or_text(&self.period),
                "report_code": self.report_code,
                "param": param,
                "format_type": "json",
            }
        })
    }
}

/// `firma_kodu`/`donem_kodu` go out as integers when purely numeric; the
/// copies inside `param` stay text.
fn numeric_or_text(raw: &str) -> Value {
    let trimmed = raw.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(n) = trimmed.parse::<i64>() {
            return Value::from(n);
        }
    }
    Value::from(trimmed)
}

// =============================================================================
// Fetch Outcome
// =============================================================================

/// How a fetch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Success,
    /// The service answered with a non-success code.
    Rejected(String),
    TransportFailure,
    DecodeFailure,
}

/// Result of a fetch. Rows are empty unless the status is `Success`.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub status: FetchStatus,
    pub rows: Vec<RemoteRow>,
    pub message: String,
}

impl FetchOutcome {
    pub fn success(rows: Vec<RemoteRow>) -> Self {
        FetchOutcome {
            status: FetchStatus::Success,
            rows,
            message: String::new(),
        }
    }

    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        FetchOutcome {
            status: FetchStatus::Rejected(code.into()),
            rows: Vec::new(),
            message: message.into(),
        }
    }

    pub fn transport_failure(message: impl Into<String>) -> Self {
        FetchOutcome {
            status: FetchStatus::TransportFailure,
            rows: Vec::new(),
            message: message.into(),
        }
    }

    pub fn decode_failure(message: impl Into<String>) -> Self {
        FetchOutcome {
            status: FetchStatus::DecodeFailure,
            rows: Vec::new(),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Success
    }

    /// Status code as the service would report it.
    pub fn status_code(&self) -> &str {
        match &self.status {
            FetchStatus::Success => SUCCESS_CODE,
            FetchStatus::Rejected(code) => code,
            FetchStatus::TransportFailure => TRANSPORT_FAILURE_CODE,
            FetchStatus::DecodeFailure => DECODE_FAILURE_CODE,
        }
    }

    /// True when the service refused the session token.
    pub fn is_session_rejected(&self) -> bool {
        matches!(&self.status, FetchStatus::Rejected(code) if code == "401" || code == "403")
    }

    /// Converts the outcome into rows or a typed error.
    pub fn into_rows(self) -> IntegrationResult<Vec<RemoteRow>> {
        let session_rejected = self.is_session_rejected();
        match self.status {
            FetchStatus::Success => Ok(self.rows),
            FetchStatus::Rejected(code) if session_rejected => {
                Err(IntegrationError::SessionRejected { code })
            }
            FetchStatus::Rejected(code) => Err(IntegrationError::Remote {
                code,
                message: self.message,
            }),
            FetchStatus::TransportFailure => Err(IntegrationError::Transport(self.message)),
            FetchStatus::DecodeFailure => Err(IntegrationError::Decode(self.message)),
        }
    }
}

// =============================================================================
// Report Source Trait
// =============================================================================

/// Seam between the orchestrator and the remote service.
#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Logs in and returns a fresh session token.
    async fn authenticate(&self) -> IntegrationResult<String>;

    /// Fetches one report. Never fails; branch on the outcome status.
    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome;
}

// =============================================================================
// DIA Client
// =============================================================================

/// Response envelope shared by both endpoints.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: Value,
    #[serde(default)]
    msg: Value,
    #[serde(default)]
    result: Value,
}

impl Envelope {
    fn code(&self) -> String {
        value_text(&self.code)
    }

    fn message(&self) -> String {
        match value_text(&self.msg) {
            msg if !msg.is_empty() => msg,
            _ => value_text(&self.result),
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// HTTP client for the DIA web service.
#[derive(Debug, Clone)]
pub struct DiaClient {
    http: reqwest::Client,
    credentials: IntegratorSettings,
    remote: RemoteSettings,
}

impl DiaClient {
    /// Builds a client from the loaded configuration.
    pub fn new(config: &IntegratorConfig) -> IntegrationResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.remote.request_timeout())
            .connect_timeout(CONNECT_TIMEOUT.min(config.remote.request_timeout()))
            .build()
            .map_err(|e| IntegrationError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(DiaClient {
            http,
            credentials: config.integrator.clone(),
            remote: config.remote.clone(),
        })
    }

    fn login_body(&self) -> Value {
        json!({
            "login": {
                "username": self.credentials.username,
                "password": self.credentials.password,
                "disconnect_same_user": self.remote.disconnect_same_user.to_string(),
                "lang": self.remote.lang,
                "params": { "apikey": self.credentials.api_key },
            }
        })
    }

    async fn post(&self, url: &str, body: &Value) -> IntegrationResult<String> {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        response.text().await.map_err(|e| self.transport_error(e))
    }

    fn transport_error(&self, err: reqwest::Error) -> IntegrationError {
        if err.is_timeout() {
            IntegrationError::Timeout(self.remote.request_timeout_secs)
        } else {
            IntegrationError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl ReportSource for DiaClient {
    async fn authenticate(&self) -> IntegrationResult<String> {
        debug!(username = %self.credentials.username, "Authenticating");

        let text = self.post(&self.remote.auth_url, &self.login_body()).await?;
        let envelope: Envelope = serde_json::from_str(&text)?;
        let code = envelope.code();

        if code != SUCCESS_CODE {
            warn!(code = %code, "Authentication rejected");
            return Err(IntegrationError::Auth {
                code,
                message: envelope.message(),
            });
        }

        let token = value_text(&envelope.msg);
        if token.is_empty() {
            return Err(IntegrationError::Auth {
                code,
                message: "empty session token".into(),
            });
        }

        info!(token = %token_preview(&token), "Authenticated");
        Ok(token)
    }

    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        debug!(
            report = %request.report_code,
            detail = ?request.detail,
            token = %token_preview(&request.token),
            "Fetching report"
        );

        let text = match self.post(&self.remote.report_url, &request.body()).await {
            Ok(text) => text,
            Err(e) => {
                warn!(report = %request.report_code, error = %e, "Report transport failure");
                return FetchOutcome::transport_failure(e.to_string());
            }
        };

        let envelope: Envelope = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(report = %request.report_code, error = %e, "Report response is not JSON");
                return FetchOutcome::decode_failure(format!("invalid JSON response: {}", e));
            }
        };

        let code = envelope.code();
        if code != SUCCESS_CODE {
            warn!(report = %request.report_code, code = %code, "Report rejected");
            let message = envelope.message();
            return FetchOutcome::rejected(code, message);
        }

        let Value::String(encoded) = &envelope.result else {
            return FetchOutcome::decode_failure("result is not a base64 string");
        };

        let rows = decode_payload(encoded)
            .and_then(|payload| extract_rows(&payload, request.detail.as_deref()));

        match rows {
            Ok(rows) => {
                debug!(report = %request.report_code, rows = rows.len(), "Report fetched");
                FetchOutcome::success(rows)
            }
            Err(e) => {
                warn!(report = %request.report_code, error = %e, "Report payload undecodable");
                FetchOutcome::decode_failure(e.to_string())
            }
        }
    }
}
