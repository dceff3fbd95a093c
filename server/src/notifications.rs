//! Bounded in-memory notification queue held by the broker
//!
//! A fixed-capacity FIFO shared by every broker connection. Appending to a
//! full queue silently evicts the oldest entry; delivery is best-effort and
//! nothing survives a restart.

use log::debug;
use shared::Notification;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub struct NotificationQueue {
    entries: Mutex<VecDeque<Notification>>,
    capacity: usize,
}

impl NotificationQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Appends a notification, evicting the oldest entries past capacity
    ///
    /// Append and eviction happen under one lock acquisition.
    pub fn push(&self, notification: Notification) {
        let mut entries = self.lock();
        entries.push_back(notification);
        while entries.len() > self.capacity {
            if let Some(evicted) = entries.pop_front() {
                debug!("Evicted notification for user {}", evicted.user_id);
            }
        }
    }

    /// All queued notifications for one user, oldest first
    pub fn for_user(&self, user_id: i64) -> Vec<Notification> {
        self.lock()
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    /// The last `count` notifications in queue order
    pub fn recent(&self, count: usize) -> Vec<Notification> {
        let entries = self.lock();
        let skip = entries.len().saturating_sub(count);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // A panic while holding the lock cannot leave the deque half-updated,
    // so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Notification>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::NotificationKind;
    use std::sync::Arc;

    fn notification(user_id: i64, message: &str) -> Notification {
        Notification {
            user_id,
            message: message.to_string(),
            kind: NotificationKind::Info,
            timestamp: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_queue_starts_empty() {
        let queue = NotificationQueue::new(5);
        assert!(queue.is_empty());
        assert_eq!(queue.capacity(), 5);
        assert!(queue.recent(10).is_empty());
        assert!(queue.for_user(1).is_empty());
    }

    #[test]
    fn test_evicts_oldest_past_capacity() {
        let queue = NotificationQueue::new(100);
        for i in 0..150 {
            queue.push(notification(1, &format!("n{}", i)));
        }

        assert_eq!(queue.len(), 100);

        let all = queue.for_user(1);
        assert_eq!(all.first().unwrap().message, "n50");
        assert_eq!(all.last().unwrap().message, "n149");

        let recent: Vec<String> = queue.recent(10).into_iter().map(|n| n.message).collect();
        let expected: Vec<String> = (140..150).map(|i| format!("n{}", i)).collect();
        assert_eq!(recent, expected);
    }

    #[test]
    fn test_recent_with_fewer_entries() {
        let queue = NotificationQueue::new(100);
        queue.push(notification(1, "a"));
        queue.push(notification(2, "b"));

        let recent = queue.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "a");
        assert_eq!(recent[1].message, "b");
    }

    #[test]
    fn test_for_user_filters_in_queue_order() {
        let queue = NotificationQueue::new(100);
        queue.push(notification(1, "first"));
        queue.push(notification(2, "other"));
        queue.push(notification(1, "second"));

        let mine: Vec<String> = queue.for_user(1).into_iter().map(|n| n.message).collect();
        assert_eq!(mine, vec!["first", "second"]);
        assert!(queue.for_user(3).is_empty());
    }

    #[test]
    fn test_concurrent_pushes_respect_bound() {
        let queue = Arc::new(NotificationQueue::new(100));

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        queue.push(notification(worker, &format!("{}-{}", worker, i)));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(queue.len(), 100);
    }
}
