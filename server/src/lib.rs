//! # Score Services Library
//!
//! This library provides the two auxiliary network services that sit beside
//! the web application: the score persistence service and the stats and
//! notification broker. Both speak the line-delimited JSON protocol defined
//! in the `shared` crate and differ only in the handler they plug into the
//! common connection dispatcher.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Best Scores
//! The persistence service is the only writer of a user's best score. Every
//! submission goes through the monotonic-max merge inside a single record
//! store transaction, so concurrent submissions for the same user cannot
//! lose an update and a stored best never decreases.
//!
//! ### Best-Effort Side Channel
//! The broker answers profile and aggregate stats queries straight from the
//! record store and keeps a bounded in-memory notification queue. Its
//! callers treat every broker failure as "no data".
//!
//! ## Architecture Design
//!
//! ### One Request Per Connection
//! A client connects, writes one JSON line, reads one JSON line and the
//! server closes. There is no session state between requests.
//!
//! ### Task Per Connection, Bounded
//! Each accepted connection is served on its own tokio task so a slow peer
//! never stalls others. A semaphore caps concurrent handlers; overflow is
//! rejected with `server_busy`. Reads are bounded in size and time.
//!
//! ### Faults Stay Local
//! Decode errors, validation errors, store failures and handler panics are
//! all converted to an error response for that connection only.
//!
//! ## Module Organization
//!
//! ### Dispatcher Module (`dispatcher`)
//! Accept loop, framing, decoding and the [`dispatcher::Handler`] seam.
//!
//! ### Store Module (`store`)
//! The [`store::RecordStore`] collaborator trait and its SQLite
//! implementation.
//!
//! ### Persistence Module (`persistence`)
//! `save_score` and `ping`.
//!
//! ### Broker Module (`broker`) and Notifications Module (`notifications`)
//! `get_user_stats`, `get_global_stats`, `add_notification`,
//! `get_notifications` and `ping`, plus the bounded FIFO behind them.
//!
//! ### Config Module (`config`)
//! Command line and environment configuration for the binary.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::Limits;
//! use server::dispatcher::Dispatcher;
//! use server::persistence::PersistenceService;
//! use server::store::SqliteStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqliteStore::open("users.db")?);
//!     let service = PersistenceService::new(store);
//!
//!     let dispatcher = Dispatcher::bind("127.0.0.1:6000", service, Limits::default()).await?;
//!     dispatcher.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod broker;
pub mod config;
pub mod dispatcher;
pub mod notifications;
pub mod persistence;
pub mod store;
