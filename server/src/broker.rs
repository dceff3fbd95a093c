//! Stats and notification broker
//!
//! A best-effort side channel next to the persistence service. Stats are
//! recomputed from the record store on every read; notifications live only
//! in a bounded in-memory queue. Nothing here writes to the record store.

use crate::dispatcher::Handler;
use crate::notifications::NotificationQueue;
use crate::store::{self, RecordStore};
use chrono::Utc;
use log::debug;
use shared::{
    Acknowledgement, GlobalStats, GlobalStatsReply, Notification, NotificationKind,
    NotificationsReply, Pong, Request, Response, ServiceError, UserStats, UserStatsReply,
    BROKER_SERVICE, NOTIFICATION_CAPACITY, RECENT_NOTIFICATIONS,
};
use std::sync::Arc;

pub struct BrokerService<S: RecordStore> {
    store: Arc<S>,
    queue: NotificationQueue,
}

impl<S: RecordStore> BrokerService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_capacity(store, NOTIFICATION_CAPACITY)
    }

    pub fn with_capacity(store: Arc<S>, capacity: usize) -> Self {
        Self {
            store,
            queue: NotificationQueue::new(capacity),
        }
    }

    /// Profile and score fields for one user; `None` if there is no such user
    pub fn get_user_stats(&self, user_id: i64) -> Result<Option<UserStats>, ServiceError> {
        Ok(self.store.user_profile(user_id)?)
    }

    pub fn get_global_stats(&self) -> Result<GlobalStats, ServiceError> {
        let snapshot = self.store.global_stats()?;
        Ok(GlobalStats {
            total_users: snapshot.total_users,
            active_users: snapshot.active_users,
            average_best_score: (snapshot.average_best_score * 100.0).round() / 100.0,
            top_best_score: snapshot.top_best_score,
            computed_at: store::timestamp(Utc::now()),
        })
    }

    pub fn add_notification(
        &self,
        user_id: i64,
        message: String,
        kind: NotificationKind,
    ) -> Result<(), ServiceError> {
        if user_id <= 0 {
            return Err(ServiceError::InvalidParams(
                "user_id must be positive".to_string(),
            ));
        }
        if message.is_empty() {
            return Err(ServiceError::InvalidParams(
                "message must not be empty".to_string(),
            ));
        }

        debug!("Queued {:?} notification for user {}", kind, user_id);
        self.queue.push(Notification {
            user_id,
            message,
            kind,
            timestamp: store::timestamp(Utc::now()),
        });
        Ok(())
    }

    /// Queued notifications for `user_id`, or the most recent ones overall
    pub fn get_notifications(&self, user_id: Option<i64>) -> Vec<Notification> {
        match user_id {
            Some(id) if id > 0 => self.queue.for_user(id),
            _ => self.queue.recent(RECENT_NOTIFICATIONS),
        }
    }

    pub fn queue(&self) -> &NotificationQueue {
        &self.queue
    }
}

impl<S: RecordStore> Handler for BrokerService<S> {
    fn service_name(&self) -> &'static str {
        BROKER_SERVICE
    }

    fn handle(&self, request: Request) -> Result<Response, ServiceError> {
        match request {
            Request::GetUserStats { user_id } => Response::ok(&UserStatsReply {
                stats: self.get_user_stats(user_id)?,
            }),
            Request::GetGlobalStats => Response::ok(&GlobalStatsReply {
                stats: self.get_global_stats()?,
            }),
            Request::AddNotification {
                user_id,
                message,
                kind,
            } => {
                self.add_notification(user_id, message, kind)?;
                Response::ok(&Acknowledgement {
                    message: "notification_added".to_string(),
                })
            }
            Request::GetNotifications { user_id } => Response::ok(&NotificationsReply {
                notifications: self.get_notifications(user_id),
            }),
            Request::Ping => Response::ok(&Pong::new(BROKER_SERVICE)),
            Request::SaveScore { .. } => Err(ServiceError::UnknownAction),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use assert_approx_eq::assert_approx_eq;
    use serde_json::json;
    use tempfile::NamedTempFile;

    fn setup() -> (NamedTempFile, Arc<SqliteStore>, BrokerService<SqliteStore>) {
        let db_file = NamedTempFile::new().expect("Failed to create temp file");
        let store = Arc::new(SqliteStore::open(db_file.path()).expect("Failed to open store"));
        let broker = BrokerService::new(Arc::clone(&store));
        (db_file, store, broker)
    }

    #[test]
    fn test_user_stats_found() {
        let (_db, store, broker) = setup();
        let id = store.create_user("Mia", "mia@example.com", false).unwrap();
        store.merge_best_score(id, 33, Utc::now()).unwrap();

        let stats = broker.get_user_stats(id).unwrap().unwrap();
        assert_eq!(stats.user_id, id);
        assert_eq!(stats.name.as_deref(), Some("Mia"));
        assert_eq!(stats.email.as_deref(), Some("mia@example.com"));
        assert_eq!(stats.best_score, 33);
        assert!(stats.registered_at.is_some());
    }

    #[test]
    fn test_user_stats_missing_is_soft() {
        let (_db, _store, broker) = setup();

        let response = broker
            .handle(Request::GetUserStats { user_id: 404 })
            .unwrap();
        let body = serde_json::to_value(&response).unwrap();
        assert_eq!(body, json!({"success": true, "stats": {}}));
    }

    #[test]
    fn test_global_stats_rounds_average() {
        let (_db, store, broker) = setup();
        for (i, score) in [10, 10, 11].into_iter().enumerate() {
            let id = store
                .create_user("P", &format!("p{}@example.com", i), false)
                .unwrap();
            store.merge_best_score(id, score, Utc::now()).unwrap();
        }

        let stats = broker.get_global_stats().unwrap();
        assert_eq!(stats.total_users, 3);
        assert_eq!(stats.active_users, 3);
        assert_eq!(stats.top_best_score, 11);
        assert_approx_eq!(stats.average_best_score, 10.33, 1e-9);
        assert!(!stats.computed_at.is_empty());
    }

    #[test]
    fn test_global_stats_reflect_latest_writes() {
        let (_db, store, broker) = setup();
        let id = store.create_user("Mia", "mia@example.com", false).unwrap();

        assert_eq!(broker.get_global_stats().unwrap().top_best_score, 0);
        store.merge_best_score(id, 64, Utc::now()).unwrap();
        assert_eq!(broker.get_global_stats().unwrap().top_best_score, 64);
    }

    #[test]
    fn test_add_notification_validates_fields() {
        let (_db, _store, broker) = setup();

        assert!(matches!(
            broker.add_notification(1, String::new(), NotificationKind::Info),
            Err(ServiceError::InvalidParams(_))
        ));
        assert!(matches!(
            broker.add_notification(0, "hi".to_string(), NotificationKind::Info),
            Err(ServiceError::InvalidParams(_))
        ));
        assert!(broker.queue().is_empty());
    }

    #[test]
    fn test_notifications_by_user_and_recent() {
        let (_db, _store, broker) = setup();
        broker
            .add_notification(1, "welcome".to_string(), NotificationKind::Info)
            .unwrap();
        broker
            .add_notification(2, "hello".to_string(), NotificationKind::Warning)
            .unwrap();
        broker
            .add_notification(1, "new record".to_string(), NotificationKind::Success)
            .unwrap();

        let mine = broker.get_notifications(Some(1));
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].message, "welcome");
        assert_eq!(mine[1].kind, NotificationKind::Success);

        let recent = broker.get_notifications(None);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[1].user_id, 2);
    }

    #[test]
    fn test_queue_keeps_most_recent_hundred() {
        let (_db, _store, broker) = setup();
        for i in 0..150 {
            broker
                .add_notification(7, format!("event {}", i), NotificationKind::Info)
                .unwrap();
        }

        assert_eq!(broker.queue().len(), 100);
        assert_eq!(broker.get_notifications(Some(7))[0].message, "event 50");

        let recent: Vec<String> = broker
            .get_notifications(None)
            .into_iter()
            .map(|n| n.message)
            .collect();
        let expected: Vec<String> = (140..150).map(|i| format!("event {}", i)).collect();
        assert_eq!(recent, expected);
    }

    #[test]
    fn test_handle_add_notification_envelope() {
        let (_db, _store, broker) = setup();

        let response = broker
            .handle(Request::AddNotification {
                user_id: 3,
                message: "hi".to_string(),
                kind: NotificationKind::Error,
            })
            .unwrap();
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"success": true, "message": "notification_added"})
        );

        let reply: NotificationsReply = broker
            .handle(Request::GetNotifications { user_id: Some(3) })
            .unwrap()
            .payload()
            .unwrap();
        assert_eq!(reply.notifications[0].kind, NotificationKind::Error);
    }

    #[test]
    fn test_ping_identifies_broker() {
        let (_db, _store, broker) = setup();
        let pong: Pong = broker.handle(Request::Ping).unwrap().payload().unwrap();
        assert_eq!(pong, Pong::new("broker"));
    }

    #[test]
    fn test_save_score_is_unknown_here() {
        let (_db, _store, broker) = setup();
        assert_eq!(
            broker.handle(Request::SaveScore {
                user_id: 1,
                score: 1
            }),
            Err(ServiceError::UnknownAction)
        );
    }
}
