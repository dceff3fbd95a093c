//! Single-attempt request/response client for both services

use log::{debug, warn};
use shared::codec::{read_frame, write_frame};
use shared::{
    FrameError, NotificationKind, Request, Response, DEFAULT_BROKER_PORT, DEFAULT_HOST,
    DEFAULT_PERSISTENCE_PORT, MAX_REPLY_BYTES,
};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
enum ExchangeError {
    #[error("connect failed: {0}")]
    Connect(std::io::Error),
    #[error("{0}")]
    Frame(#[from] FrameError),
    #[error("connection closed without a response")]
    NoResponse,
    #[error("invalid_response")]
    InvalidResponse,
}

/// Client for one service address
///
/// Every call opens a connection, writes one request line, reads one
/// response line and closes. Failures never escape as errors: they come
/// back as `(false, response)` with the reason in `response.error`. There
/// is exactly one attempt per call.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    addr: String,
    timeout: Duration,
    max_reply_bytes: usize,
}

impl ServiceClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: DEFAULT_TIMEOUT,
            max_reply_bytes: MAX_REPLY_BYTES,
        }
    }

    /// Client for the persistence service at its default address
    pub fn persistence() -> Self {
        Self::new(format!("{}:{}", DEFAULT_HOST, DEFAULT_PERSISTENCE_PORT))
    }

    /// Client for the broker at its default address
    pub fn broker() -> Self {
        Self::new(format!("{}:{}", DEFAULT_HOST, DEFAULT_BROKER_PORT))
    }

    /// Bounds the whole round trip: connect, write and read
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Caps the reply line; services configured with larger request frames
    /// can send correspondingly larger notification lists
    pub fn with_max_reply_bytes(mut self, max_reply_bytes: usize) -> Self {
        self.max_reply_bytes = max_reply_bytes;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn round_trip(&self, request: &Request) -> (bool, Response) {
        match tokio::time::timeout(self.timeout, self.exchange(request)).await {
            Ok(Ok(response)) => (response.success, response),
            Ok(Err(e)) => {
                debug!("{} to {} failed: {}", request.action(), self.addr, e);
                (false, Response::unavailable(e.to_string()))
            }
            Err(_) => {
                debug!("{} to {} timed out", request.action(), self.addr);
                (
                    false,
                    Response::unavailable(format!("timed out after {:?}", self.timeout)),
                )
            }
        }
    }

    async fn exchange(&self, request: &Request) -> Result<Response, ExchangeError> {
        let mut stream = TcpStream::connect(&self.addr)
            .await
            .map_err(ExchangeError::Connect)?;

        write_frame(&mut stream, request).await?;

        let frame = read_frame(&mut stream, self.max_reply_bytes)
            .await?
            .ok_or(ExchangeError::NoResponse)?;

        serde_json::from_slice(&frame).map_err(|_| ExchangeError::InvalidResponse)
    }

    pub async fn ping(&self) -> (bool, Response) {
        self.round_trip(&Request::Ping).await
    }

    pub async fn save_score(&self, user_id: i64, score: i64) -> (bool, Response) {
        self.round_trip(&Request::SaveScore { user_id, score }).await
    }

    pub async fn get_user_stats(&self, user_id: i64) -> (bool, Response) {
        self.round_trip(&Request::GetUserStats { user_id }).await
    }

    pub async fn get_global_stats(&self) -> (bool, Response) {
        self.round_trip(&Request::GetGlobalStats).await
    }

    pub async fn add_notification(
        &self,
        user_id: i64,
        message: impl Into<String>,
        kind: NotificationKind,
    ) -> (bool, Response) {
        self.round_trip(&Request::AddNotification {
            user_id,
            message: message.into(),
            kind,
        })
        .await
    }

    pub async fn get_notifications(&self, user_id: Option<i64>) -> (bool, Response) {
        self.round_trip(&Request::GetNotifications { user_id }).await
    }

    /// Fire-and-forget notification for callers whose own action must not
    /// fail when the broker is down. Logs and reports whether it landed.
    pub async fn deliver_notification(
        &self,
        user_id: i64,
        message: impl Into<String>,
        kind: NotificationKind,
    ) -> bool {
        let (ok, response) = self.add_notification(user_id, message, kind).await;
        if !ok {
            warn!(
                "Notification for user {} not delivered: {}",
                user_id,
                response.error.as_deref().unwrap_or("unknown")
            );
        }
        ok
    }
}
