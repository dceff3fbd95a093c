//! Score persistence service
//!
//! Authoritative writer of each user's best score. A submission is merged
//! with the monotonic-max rule: the stored value only ever increases, and
//! re-submitting a score that does not beat it changes nothing.

use crate::dispatcher::Handler;
use crate::store::RecordStore;
use chrono::Utc;
use log::info;
use shared::{Pong, Request, Response, ScoreOutcome, ServiceError, PERSISTENCE_SERVICE};
use std::sync::Arc;

pub struct PersistenceService<S: RecordStore> {
    store: Arc<S>,
}

impl<S: RecordStore> PersistenceService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Merges `score` into the user's stored best
    ///
    /// Unknown users fail with `user_not_found` and no record is created.
    pub fn save_score(&self, user_id: i64, score: i64) -> Result<ScoreOutcome, ServiceError> {
        let merge = self.store.merge_best_score(user_id, score, Utc::now())?;

        if merge.is_new_record() {
            info!("New best score {} for user {}", merge.best_score(), user_id);
        }

        Ok(ScoreOutcome {
            accepted: true,
            is_new_record: merge.is_new_record(),
            best_score: merge.best_score(),
        })
    }
}

impl<S: RecordStore> Handler for PersistenceService<S> {
    fn service_name(&self) -> &'static str {
        PERSISTENCE_SERVICE
    }

    fn handle(&self, request: Request) -> Result<Response, ServiceError> {
        match request {
            Request::SaveScore { user_id, score } => Response::ok(&self.save_score(user_id, score)?),
            Request::Ping => Response::ok(&Pong::new(PERSISTENCE_SERVICE)),
            _ => Err(ServiceError::UnknownAction),
        }
    }
}
