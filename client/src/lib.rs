//! # Service Client Library
//!
//! Request/response helper used by the web layer to reach the score
//! persistence service and the stats/notification broker.
//!
//! ## Behaviour
//!
//! Each call is one blocking round trip bounded by a timeout (3 seconds by
//! default): connect, write one JSON line, read one JSON line, close. The
//! result is always a `(ok, response)` pair. Connection failures, timeouts
//! and undecodable replies come back as `ok == false` with the reason in
//! `response.error`; nothing is retried.
//!
//! Callers decide how much a failure matters. A failed `save_score` is a
//! failed save. A failed broker call (stats, notifications) should degrade
//! to "no data" and never fail the action that triggered it, which is what
//! [`ServiceClient::deliver_notification`] does.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::ServiceClient;
//! use shared::{NotificationKind, ScoreOutcome};
//!
//! #[tokio::main]
//! async fn main() {
//!     let persistence = ServiceClient::persistence();
//!     let broker = ServiceClient::broker();
//!
//!     let (ok, response) = persistence.save_score(1, 420).await;
//!     if let Some(outcome) = response.payload::<ScoreOutcome>() {
//!         if outcome.is_new_record {
//!             broker
//!                 .deliver_notification(1, "New high score!", NotificationKind::Success)
//!                 .await;
//!         }
//!     } else if !ok {
//!         eprintln!("save failed: {:?}", response.error);
//!     }
//! }
//! ```

pub mod network;

pub use network::{ServiceClient, DEFAULT_TIMEOUT};
