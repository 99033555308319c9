//! JSON-RPC 2.0 message types for the Availability Protocol.
//!
//! Requests and responses travel as text frames on the WebSocket. Push
//! notifications are not JSON-RPC; see [`crate::ServerMessage`].

use avail_core::{AvailabilityStatus, Profession, ProfessionalId, SlotId};
use avail_store::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const NOT_FOUND: i32 = -32001;
pub const INVALID_TRANSITION: i32 = -32002;
pub const INVALID_WINDOW: i32 = -32003;
pub const ALREADY_EXISTS: i32 = -32004;

/// An incoming request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Option<Value>,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            method: method.into(),
            params,
            id: Some(Value::from(id)),
        }
    }
}

/// A response to a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

fn jsonrpc_version() -> String {
    "2.0".to_string()
}

impl Response {
    pub fn success<T: Serialize>(id: Option<Value>, result: T) -> Self {
        match serde_json::to_value(result) {
            Ok(value) => Self {
                jsonrpc: jsonrpc_version(),
                result: Some(value),
                error: None,
                id,
            },
            Err(e) => Self::error(id, INTERNAL_ERROR, e.to_string()),
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
            id,
        }
    }

    pub fn parse_error() -> Self {
        Self::error(None, PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request(id: Option<Value>, reason: impl Into<String>) -> Self {
        Self::error(id, INVALID_REQUEST, reason)
    }

    pub fn method_not_found(id: Option<Value>, method: &str) -> Self {
        Self::error(id, METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    pub fn invalid_params(id: Option<Value>, reason: impl Into<String>) -> Self {
        Self::error(id, INVALID_PARAMS, reason)
    }

    /// Maps a store failure onto its wire error code.
    pub fn store_error(id: Option<Value>, err: &StoreError) -> Self {
        let code = match err {
            StoreError::NotFound(_) | StoreError::SlotNotFound(_) => NOT_FOUND,
            StoreError::InvalidTransition { .. } => INVALID_TRANSITION,
            StoreError::InvalidWindow { .. } => INVALID_WINDOW,
            StoreError::AlreadyExists(_) => ALREADY_EXISTS,
            _ => INTERNAL_ERROR,
        };
        Self::error(id, code, err.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Method parameters
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfessionalParams {
    pub professional_id: ProfessionalId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterParams {
    /// Generated when absent.
    #[serde(default)]
    pub id: Option<ProfessionalId>,
    pub name: String,
    pub profession: Profession,
    #[serde(default)]
    pub status: Option<AvailabilityStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSetParams {
    pub professional_id: ProfessionalId,
    pub status: AvailabilityStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryParams {
    pub professional_id: ProfessionalId,
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    50
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecentParams {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionParams {
    pub professional_ids: Vec<ProfessionalId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotAddParams {
    pub professional_id: ProfessionalId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: AvailabilityStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotUpdateParams {
    pub slot_id: SlotId,
    pub professional_id: ProfessionalId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: AvailabilityStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotRemoveParams {
    pub slot_id: SlotId,
    pub professional_id: ProfessionalId,
}
