use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Severity level for in-app notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// An unobtrusive in-window notification (degraded-mode banner, task warning).
///
/// `ttl == None` means the notification stays until dismissed.
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: u64,
    pub level: NotificationLevel,
    pub title: String,
    pub body: String,
    pub created_at: Instant,
    pub ttl: Option<Duration>,
}

impl Notification {
    fn with_level(level: NotificationLevel, title: String, body: String, ttl: Option<Duration>) -> Self {
        Self {
            id: 0,
            level,
            title,
            body,
            created_at: Instant::now(),
            ttl,
        }
    }

    /// Creates an info notification with a 5-second TTL.
    pub fn info(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::with_level(
            NotificationLevel::Info,
            title.into(),
            body.into(),
            Some(Duration::from_secs(5)),
        )
    }

    /// Creates a warning notification with a 10-second TTL.
    pub fn warning(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::with_level(
            NotificationLevel::Warning,
            title.into(),
            body.into(),
            Some(Duration::from_secs(10)),
        )
    }

    /// Creates a sticky warning used for degraded mode. It stays until dismissed.
    pub fn degraded(body: impl Into<String>) -> Self {
        Self::with_level(
            NotificationLevel::Warning,
            "Running in degraded mode".into(),
            body.into(),
            None,
        )
    }

    /// Creates a sticky error notification.
    pub fn error(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::with_level(NotificationLevel::Error, title.into(), body.into(), None)
    }

    pub fn is_sticky(&self) -> bool {
        self.ttl.is_none()
    }

    /// Returns `true` if this notification has exceeded its TTL.
    pub fn is_expired(&self) -> bool {
        self.ttl
            .map(|ttl| self.created_at.elapsed() >= ttl)
            .unwrap_or(false)
    }
}

/// A bounded queue of notifications.
///
/// Expired entries are evicted on access. When the queue is full the oldest
/// non-sticky entry goes first; sticky entries are only evicted when nothing
/// else is left.
#[derive(Debug)]
pub struct NotificationQueue {
    items: VecDeque<Notification>,
    capacity: usize,
    next_id: u64,
}

impl NotificationQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            next_id: 1,
        }
    }

    /// Pushes a notification and returns its id.
    pub fn push(&mut self, mut notification: Notification) -> u64 {
        self.evict_expired();
        if self.items.len() >= self.capacity {
            let victim = self
                .items
                .iter()
                .position(|n| !n.is_sticky())
                .unwrap_or(0);
            if let Some(evicted) = self.items.remove(victim) {
                tracing::debug!(title = %evicted.title, "notification evicted");
            }
        }
        notification.id = self.next_id;
        self.next_id += 1;
        self.items.push_back(notification);
        self.next_id - 1
    }

    /// Removes a notification by id. Returns whether it was present.
    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.items.len();
        self.items.retain(|n| n.id != id);
        self.items.len() != before
    }

    /// Returns all currently visible (non-expired) notifications.
    pub fn visible(&mut self) -> Vec<&Notification> {
        self.evict_expired();
        self.items.iter().collect()
    }

    /// Highest severity currently visible, if any.
    pub fn highest_level(&mut self) -> Option<NotificationLevel> {
        self.evict_expired();
        self.items.iter().map(|n| n.level).max()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn evict_expired(&mut self) {
        self.items.retain(|n| !n.is_expired());
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new(16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_notifications_are_sticky() {
        let n = Notification::degraded("storage probe failed");
        assert!(n.is_sticky());
        assert!(!n.is_expired());
        assert_eq!(n.level, NotificationLevel::Warning);
    }

    #[test]
    fn push_assigns_increasing_ids() {
        let mut q = NotificationQueue::new(4);
        let a = q.push(Notification::info("a", ""));
        let b = q.push(Notification::info("b", ""));
        assert!(b > a);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn full_queue_evicts_non_sticky_first() {
        let mut q = NotificationQueue::new(2);
        q.push(Notification::degraded("sticky"));
        q.push(Notification::info("transient", ""));
        q.push(Notification::warning("new", ""));

        let titles: Vec<_> = q.visible().iter().map(|n| n.title.clone()).collect();
        assert_eq!(titles, vec!["Running in degraded mode", "new"]);
    }

    #[test]
    fn dismiss_removes_by_id() {
        let mut q = NotificationQueue::default();
        let id = q.push(Notification::degraded("x"));
        assert!(q.dismiss(id));
        assert!(!q.dismiss(id));
        assert!(q.is_empty());
    }

    #[test]
    fn expired_entries_are_hidden() {
        let mut q = NotificationQueue::default();
        let mut n = Notification::info("old", "");
        n.ttl = Some(Duration::ZERO);
        q.push(n);
        assert!(q.visible().is_empty());
    }

    #[test]
    fn highest_level_reports_worst_visible() {
        let mut q = NotificationQueue::default();
        assert_eq!(q.highest_level(), None);
        q.push(Notification::info("i", ""));
        q.push(Notification::error("e", ""));
        assert_eq!(q.highest_level(), Some(NotificationLevel::Error));
    }
}
