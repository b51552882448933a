//! In-session notifications with duplicate suppression.
//!
//! Two independent guards keep repeated events from flooding the list: a
//! cool-down map keyed by `(user, severity, message)`, and a scan of the list
//! itself for an identical entry within a slightly longer window.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::fields::Severity;

pub const DEFAULT_COOLDOWN_SECS: i64 = 5;
pub const DEFAULT_RECENCY_SECS: i64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub message: String,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

type Key = (String, Severity, String);

/// Most-recent-first notification list for the running session.
#[derive(Debug, Clone)]
pub struct NotificationCenter {
    items: Vec<Notification>,
    last_sent: HashMap<Key, DateTime<Utc>>,
    cooldown: Duration,
    recency: Duration,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        NotificationCenter::new(
            Duration::seconds(DEFAULT_COOLDOWN_SECS),
            Duration::seconds(DEFAULT_RECENCY_SECS),
        )
    }
}

impl NotificationCenter {
    pub fn new(cooldown: Duration, recency: Duration) -> Self {
        NotificationCenter {
            items: Vec::new(),
            last_sent: HashMap::new(),
            cooldown,
            recency,
        }
    }

    /// Queue a notification unless an identical one went out recently.
    pub fn notify(
        &mut self,
        user_id: &str,
        message: &str,
        severity: Severity,
        now: DateTime<Utc>,
    ) -> Option<&Notification> {
        let key = (user_id.to_string(), severity, message.to_string());
        if let Some(last) = self.last_sent.get(&key) {
            if now - *last < self.cooldown {
                debug!(user_id, text = message, "notification suppressed by cool-down");
                return None;
            }
        }
        let cooldown = self.cooldown;
        self.last_sent.retain(|_, sent| now - *sent < cooldown);
        self.last_sent.insert(key, now);

        let duplicate = self.items.iter().any(|n| {
            n.user_id == user_id
                && n.severity == severity
                && n.message == message
                && (n.created_at - now).abs() < self.recency
        });
        if duplicate {
            debug!(user_id, text = message, "notification suppressed as recent duplicate");
            return None;
        }

        self.items.insert(
            0,
            Notification {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                message: message.to_string(),
                severity,
                created_at: now,
                read: false,
            },
        );
        self.items.first()
    }

    pub fn all(&self) -> &[Notification] {
        &self.items
    }

    pub fn for_user<'a>(&'a self, user_id: &'a str) -> impl Iterator<Item = &'a Notification> + 'a {
        self.items.iter().filter(move |n| n.user_id == user_id)
    }

    pub fn unread_count(&self, user_id: &str) -> usize {
        self.for_user(user_id).filter(|n| !n.read).count()
    }

    /// Mark every notification of `user_id` as read; others are untouched.
    pub fn mark_all_read(&mut self, user_id: &str) -> usize {
        let mut marked = 0;
        for n in self.items.iter_mut().filter(|n| n.user_id == user_id && !n.read) {
            n.read = true;
            marked += 1;
        }
        marked
    }

    pub fn mark_read(&mut self, id: &str) -> bool {
        match self.items.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.read = true;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.last_sent.clear();
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap()
    }

    #[test]
    fn repeat_within_cooldown_is_dropped() {
        let mut center = NotificationCenter::default();
        assert!(center.notify("u1", "Saved", Severity::Success, t0()).is_some());
        assert!(center.notify("u1", "Saved", Severity::Success, t0() + Duration::seconds(3)).is_none());
        assert_eq!(center.all().len(), 1);
    }

    #[test]
    fn different_severity_or_user_is_not_a_duplicate() {
        let mut center = NotificationCenter::default();
        center.notify("u1", "Saved", Severity::Success, t0());
        center.notify("u1", "Saved", Severity::Info, t0());
        center.notify("u2", "Saved", Severity::Success, t0());
        assert_eq!(center.all().len(), 3);
    }

    #[test]
    fn cooldown_entries_expire() {
        let mut center = NotificationCenter::default();
        center.notify("u1", "a", Severity::Info, t0());
        center.notify("u1", "b", Severity::Info, t0() + Duration::seconds(1));
        assert_eq!(center.last_sent.len(), 2);
        center.notify("u2", "c", Severity::Info, t0() + Duration::minutes(5));
        assert_eq!(center.last_sent.len(), 1);
        assert!(center.last_sent.contains_key(&("u2".to_string(), Severity::Info, "c".to_string())));
    }

    #[test]
    fn recency_window_outlives_cooldown() {
        let mut center = NotificationCenter::default();
        center.notify("u1", "Saved", Severity::Success, t0());
        // Past the cool-down but still inside the recency window.
        assert!(center.notify("u1", "Saved", Severity::Success, t0() + Duration::seconds(7)).is_none());
        assert!(center.notify("u1", "Saved", Severity::Success, t0() + Duration::seconds(20)).is_some());
        assert_eq!(center.all().len(), 2);
    }

    #[test]
    fn newest_first_and_unread() {
        let mut center = NotificationCenter::default();
        center.notify("u1", "first", Severity::Info, t0());
        center.notify("u1", "second", Severity::Info, t0());
        assert_eq!(center.all()[0].message, "second");
        assert!(center.all().iter().all(|n| !n.read));
    }

    #[test]
    fn mark_all_read_is_scoped_to_one_user() {
        let mut center = NotificationCenter::default();
        center.notify("u1", "a", Severity::Info, t0());
        center.notify("u2", "b", Severity::Info, t0());
        assert_eq!(center.mark_all_read("u1"), 1);
        assert_eq!(center.unread_count("u1"), 0);
        assert_eq!(center.unread_count("u2"), 1);
    }

    #[test]
    fn mark_single_read() {
        let mut center = NotificationCenter::default();
        let id = center.notify("u1", "a", Severity::Info, t0()).map(|n| n.id.clone()).unwrap();
        assert!(center.mark_read(&id));
        assert!(!center.mark_read("missing"));
        assert_eq!(center.unread_count("u1"), 0);
    }
}
