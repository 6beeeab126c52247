//! Request/response path: one JSON payload in, one canonical record out.

use std::sync::Arc;

use rowpipe_gateways::Notifier;
use rowpipe_shared::{CanonicalRecord, Result, RowpipeError, Source};
use rowpipe_storage::StoreGateway;
use serde_json::{Value, json};
use tracing::{error, info, instrument, warn};

use crate::enricher::Enricher;
use crate::outcome;
use crate::validator;

/// Caller recorded when the transport does not identify one.
pub const UNKNOWN_CALLER: &str = "unknown";

/// Raw request body as the transport delivered it. Only interpreted for `POST`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Payload {
    #[default]
    Empty,
    Bytes(Vec<u8>),
    /// The transport could not read the body (too large, stream error).
    Unreadable(String),
}

impl Payload {
    /// Body text for validation. Empty bodies are `None`; undecodable ones are malformed.
    fn text(&self) -> Result<Option<&str>> {
        match self {
            Self::Empty => Ok(None),
            Self::Bytes(bytes) if bytes.is_empty() => Ok(None),
            Self::Bytes(bytes) => std::str::from_utf8(bytes).map(Some).map_err(|e| {
                RowpipeError::MalformedPayload(format!("request body is not valid UTF-8: {e}"))
            }),
            Self::Unreadable(message) => Err(RowpipeError::MalformedPayload(message.clone())),
        }
    }
}

/// A transport-neutral inbound request.
#[derive(Debug, Clone, Default)]
pub struct ApiRequest {
    pub method: String,
    pub payload: Payload,
    pub caller: Option<String>,
}

impl ApiRequest {
    pub fn new(method: impl Into<String>, payload: Payload) -> Self {
        Self {
            method: method.into(),
            payload,
            caller: None,
        }
    }

    pub fn post(body: impl Into<String>) -> Self {
        Self::new("POST", Payload::Bytes(body.into().into_bytes()))
    }

    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }
}

/// A transport-neutral response. Headers always include the CORS set.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl ApiResponse {
    pub fn json(status: u16, body: Value) -> Self {
        let headers = [
            ("Content-Type", "application/json"),
            ("Access-Control-Allow-Origin", "*"),
            ("Access-Control-Allow-Headers", "Content-Type"),
            ("Access-Control-Allow-Methods", "OPTIONS,POST"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            status,
            headers,
            body,
        }
    }

    pub fn error(status: u16, kind: &str, message: impl Into<String>) -> Self {
        Self::json(
            status,
            json!({
                "error": kind,
                "message": message.into(),
            }),
        )
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Creates single records from API payloads.
pub struct RecordService {
    store: Arc<dyn StoreGateway>,
    notifier: Arc<dyn Notifier>,
    enricher: Arc<Enricher>,
}

impl RecordService {
    pub fn new(
        store: Arc<dyn StoreGateway>,
        notifier: Arc<dyn Notifier>,
        enricher: Arc<Enricher>,
    ) -> Self {
        Self {
            store,
            notifier,
            enricher,
        }
    }

    /// Dispatch on method and map the result onto a response. Never fails.
    /// The payload is only looked at once the method is known to be `POST`.
    #[instrument(skip_all, fields(method = %request.method))]
    pub async fn handle(&self, request: ApiRequest) -> ApiResponse {
        match request.method.to_ascii_uppercase().as_str() {
            "OPTIONS" => ApiResponse::json(200, json!({})),
            "POST" => {
                let created = match request.payload.text() {
                    Ok(body) => self.create(body, request.caller.as_deref()).await,
                    Err(e) => Err(e),
                };
                match created {
                    Ok(record) => ApiResponse::json(
                        201,
                        json!({
                            "message": "Item created successfully",
                            "id": record.id,
                            "timestamp": record.timestamp,
                            "data": record,
                        }),
                    ),
                    Err(e) => error_response(&e),
                }
            }
            other => {
                warn!(method = other, "method not allowed");
                ApiResponse::error(
                    405,
                    "Method Not Allowed",
                    format!("Method {other} is not supported"),
                )
            }
        }
    }

    /// Validate, enrich, persist, then notify. The notification is best-effort.
    pub async fn create(
        &self,
        body: Option<&str>,
        caller: Option<&str>,
    ) -> Result<CanonicalRecord> {
        let accepted = validator::validate_payload(body)?;
        let caller = caller
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(UNKNOWN_CALLER);
        let record = self
            .enricher
            .enrich(accepted, Source::Api(caller.to_string()));

        self.store.put(&record).await.map_err(|e| match e {
            RowpipeError::PersistenceFailed(_) => e,
            other => RowpipeError::PersistenceFailed(other.to_string()),
        })?;
        info!(id = %record.id, timestamp = record.timestamp, caller, "record created");

        outcome::publish_best_effort(self.notifier.as_ref(), &outcome::record_created(&record))
            .await;
        Ok(record)
    }
}

fn error_response(e: &RowpipeError) -> ApiResponse {
    match e {
        RowpipeError::MalformedPayload(message) => {
            warn!(error = %e, "malformed payload");
            ApiResponse::error(400, "Invalid JSON", message.clone())
        }
        RowpipeError::RowRejected { message, .. } => {
            warn!(error = %e, "payload rejected");
            ApiResponse::error(400, "Validation Error", message.clone())
        }
        other => {
            error!(kind = other.kind(), error = %other, "record creation failed");
            ApiResponse::error(500, "Internal Server Error", other.to_string())
        }
    }
}
