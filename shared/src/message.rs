//! Request and response records exchanged over a single connection
//!
//! A request is one JSON object carrying a mandatory `action` string plus the
//! fields that action needs. A response is one JSON object with at least a
//! `success` boolean. Both travel as a single newline-terminated line.

use crate::error::ServiceError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Every action understood by at least one service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    SaveScore,
    GetUserStats,
    GetGlobalStats,
    AddNotification,
    GetNotifications,
    Ping,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::SaveScore,
        Action::GetUserStats,
        Action::GetGlobalStats,
        Action::AddNotification,
        Action::GetNotifications,
        Action::Ping,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::SaveScore => "save_score",
            Action::GetUserStats => "get_user_stats",
            Action::GetGlobalStats => "get_global_stats",
            Action::AddNotification => "add_notification",
            Action::GetNotifications => "get_notifications",
            Action::Ping => "ping",
        }
    }

    pub fn parse(name: &str) -> Option<Action> {
        Action::ALL.into_iter().find(|action| action.as_str() == name)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity tag attached to a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

/// A decoded request
///
/// `save_score` also accepts its score under the legacy `puntaje` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    SaveScore {
        user_id: i64,
        #[serde(alias = "puntaje")]
        score: i64,
    },
    GetUserStats {
        user_id: i64,
    },
    GetGlobalStats,
    AddNotification {
        user_id: i64,
        message: String,
        #[serde(rename = "type", default)]
        kind: NotificationKind,
    },
    GetNotifications {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<i64>,
    },
    Ping,
}

impl Request {
    pub fn action(&self) -> Action {
        match self {
            Request::SaveScore { .. } => Action::SaveScore,
            Request::GetUserStats { .. } => Action::GetUserStats,
            Request::GetGlobalStats => Action::GetGlobalStats,
            Request::AddNotification { .. } => Action::AddNotification,
            Request::GetNotifications { .. } => Action::GetNotifications,
            Request::Ping => Action::Ping,
        }
    }
}

/// Decodes one request frame
///
/// Classification order matters: anything that is not a JSON object is
/// `invalid_request_format`, a missing or unrecognised `action` is
/// `unknown_action`, and only then are the action's fields type-checked
/// (`invalid_params`).
pub fn decode_request(frame: &[u8]) -> Result<Request, ServiceError> {
    let value: Value =
        serde_json::from_slice(frame).map_err(|_| ServiceError::InvalidRequestFormat)?;

    let object = value
        .as_object()
        .ok_or(ServiceError::InvalidRequestFormat)?;

    object
        .get("action")
        .and_then(Value::as_str)
        .and_then(Action::parse)
        .ok_or(ServiceError::UnknownAction)?;

    serde_json::from_value(value).map_err(|e| ServiceError::InvalidParams(e.to_string()))
}

/// Response envelope
///
/// Success bodies are flattened next to `success`, so a `save_score` reply
/// reads `{"success":true,"accepted":true,"is_new_record":false,...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Response {
    /// Wraps a payload that serializes to a JSON object
    pub fn ok<T: Serialize>(payload: &T) -> Result<Self, ServiceError> {
        match serde_json::to_value(payload) {
            Ok(Value::Object(body)) => Ok(Response {
                success: true,
                error: None,
                details: None,
                body,
            }),
            Ok(_) => Err(ServiceError::Internal(
                "response payload is not an object".to_string(),
            )),
            Err(e) => Err(ServiceError::Internal(e.to_string())),
        }
    }

    pub fn failure(error: &ServiceError) -> Self {
        Response {
            success: false,
            error: Some(error.code().to_string()),
            details: error.details(),
            body: Map::new(),
        }
    }

    /// Failure with a free-form reason, used when the peer is unreachable
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Response {
            success: false,
            error: Some(reason.into()),
            details: None,
            body: Map::new(),
        }
    }

    /// Decodes the flattened body into a typed payload
    pub fn payload<T: DeserializeOwned>(&self) -> Option<T> {
        if !self.success {
            return None;
        }
        serde_json::from_value(Value::Object(self.body.clone())).ok()
    }
}

impl From<Result<Response, ServiceError>> for Response {
    fn from(result: Result<Response, ServiceError>) -> Self {
        result.unwrap_or_else(|e| Response::failure(&e))
    }
}

/// Outcome of a score submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub accepted: bool,
    pub is_new_record: bool,
    pub best_score: i64,
}

/// Denormalized profile and score fields for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: i64,
    pub name: Option<String>,
    pub email: Option<String>,
    pub best_score: i64,
    pub last_played_at: Option<String>,
    pub registered_at: Option<String>,
}

/// `get_user_stats` body; a missing user is an empty `stats` object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStatsReply {
    #[serde(with = "empty_object")]
    pub stats: Option<UserStats>,
}

/// Aggregate computed from the record store on every read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    pub total_users: i64,
    pub active_users: i64,
    pub average_best_score: f64,
    pub top_best_score: i64,
    pub computed_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalStatsReply {
    pub stats: GlobalStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: i64,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationsReply {
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub message: String,
}

/// Liveness reply tagged with the answering service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    pub pong: bool,
    pub service: String,
}

impl Pong {
    pub fn new(service: &str) -> Self {
        Pong {
            pong: true,
            service: service.to_string(),
        }
    }
}

mod empty_object {
    use super::*;
    use serde::de::Error as _;

    pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => Map::new().serialize(serializer),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: DeserializeOwned,
        D: Deserializer<'de>,
    {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        if map.is_empty() {
            return Ok(None);
        }
        serde_json::from_value(Value::Object(map))
            .map(Some)
            .map_err(D::Error::custom)
    }
}
