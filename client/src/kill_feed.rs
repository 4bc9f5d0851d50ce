//! Bounded kill-feed queue
//!
//! Fed only by kill broadcasts. Each entry expires on its own timer, and the
//! oldest entry is evicted when a push would exceed the capacity.

use shared::{KILL_FEED_CAPACITY, KILL_FEED_TTL};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq)]
pub struct KillFeedEntry {
    pub message: String,
    pub expires_at: f64,
}

#[derive(Debug, Clone)]
pub struct KillFeed {
    entries: VecDeque<KillFeedEntry>,
    capacity: usize,
    ttl: f64,
}

impl KillFeed {
    pub fn new(capacity: usize, ttl: f64) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            ttl,
        }
    }

    pub fn push(&mut self, message: String, now: f64) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(KillFeedEntry {
            message,
            expires_at: now + self.ttl,
        });
    }

    /// Drops every entry whose own timer has run out.
    pub fn expire(&mut self, now: f64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.expires_at > now);
        before - self.entries.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = &KillFeedEntry> {
        self.entries.iter()
    }

    pub fn messages(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.message.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for KillFeed {
    fn default() -> Self {
        Self::new(KILL_FEED_CAPACITY, KILL_FEED_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut feed = KillFeed::default();
        for i in 0..8 {
            feed.push(format!("kill {}", i), 0.0);
            assert!(feed.len() <= 5);
        }
        assert_eq!(
            feed.messages(),
            vec!["kill 3", "kill 4", "kill 5", "kill 6", "kill 7"]
        );
    }

    #[test]
    fn test_entries_expire_independently() {
        let mut feed = KillFeed::default();
        feed.push("first".to_string(), 0.0);
        feed.push("second".to_string(), 2.0);

        assert_eq!(feed.expire(2.9), 0);
        assert_eq!(feed.expire(3.0), 1);
        assert_eq!(feed.messages(), vec!["second"]);
        assert_eq!(feed.expire(5.0), 1);
        assert!(feed.is_empty());
    }
}
