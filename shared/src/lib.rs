//! # Shared Protocol Library
//!
//! Wire protocol spoken by the score persistence service, the stats and
//! notification broker, and the client library used to reach them.
//!
//! Every exchange is one request and one response over a fresh stream
//! connection. Each side writes a single JSON object followed by `\n`; the
//! server then closes the connection. There is no pipelining or keep-alive.
//!
//! ## Modules
//!
//! - `codec`: newline framing with a size limit and optional deadline
//! - `message`: request/response records and typed payloads
//! - `error`: the error codes that travel in failed responses

pub mod codec;
pub mod error;
pub mod message;

pub use error::{FrameError, ServiceError};
pub use message::{
    decode_request, Acknowledgement, Action, GlobalStats, GlobalStatsReply, Notification,
    NotificationKind, NotificationsReply, Pong, Request, Response, ScoreOutcome, UserStats,
    UserStatsReply,
};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PERSISTENCE_PORT: u16 = 6000;
pub const DEFAULT_BROKER_PORT: u16 = 7000;

/// Largest request frame a service accepts, in bytes
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Identity strings returned by `ping`
pub const PERSISTENCE_SERVICE: &str = "persistence";
pub const BROKER_SERVICE: &str = "broker";

/// Bounded FIFO capacity of the broker's notification queue
pub const NOTIFICATION_CAPACITY: usize = 100;
/// Notifications returned by an unfiltered `get_notifications`
pub const RECENT_NOTIFICATIONS: usize = 10;

/// Largest reply a client accepts, in bytes
///
/// Replies are not bounded by [`MAX_FRAME_BYTES`]: a per-user
/// `get_notifications` can return a full queue of maximum-size messages.
pub const MAX_REPLY_BYTES: usize = 16 * 1024 * 1024;
