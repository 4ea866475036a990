//! Outbid notification queues.
//!
//! Per (user, day), an ordered set of slot keys the user was outbid on
//! since their last dismissal for that day. Only open days carry queues:
//! the whole day entry is dropped when the day starts executing.
//
//  Pure document manipulation; callers hold the global lock.

use common::keys::{DayKey, SlotKey};
use store::Document;

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};

impl Engine {
    /// Clear the caller's outbid queue for one day.
    pub async fn dismiss_outbid(&self, username: &str, day: DayKey) -> EngineResult<()> {
        self.mutate(|doc, _clock| {
            if !doc.users.contains_key(username) {
                return Err(EngineError::UnknownUser(username.to_string()));
            }
            dismiss(doc, username, day);
            Ok(())
        })
        .await
    }
}

/// Record that `username` lost `key` to a higher bid. Idempotent per key.
pub fn push_outbid(doc: &mut Document, username: &str, key: SlotKey) {
    let queue = doc
        .notifications
        .entry(username.to_string())
        .or_default()
        .entry(key.day)
        .or_default();
    if !queue.contains(&key) {
        queue.push(key);
    }
}

/// Clear one user's queue for one day.
pub fn dismiss(doc: &mut Document, username: &str, day: DayKey) {
    if let Some(days) = doc.notifications.get_mut(username) {
        days.remove(&day);
        if days.is_empty() {
            doc.notifications.remove(username);
        }
    }
}

/// Drop every user's queue for `day`. Called when the day leaves `open`.
pub fn clear_day(doc: &mut Document, day: DayKey) {
    doc.notifications.retain(|_, days| {
        days.remove(&day);
        !days.is_empty()
    });
}

/// Whether `username` has undismissed outbid entries for `day`.
pub fn has_notifications(doc: &Document, username: &str, day: DayKey) -> bool {
    doc.notifications
        .get(username)
        .and_then(|days| days.get(&day))
        .is_some_and(|queue| !queue.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::Config;

    fn key(day: &str, hour: u8, gpu: u8) -> SlotKey {
        SlotKey::new(day.parse().unwrap(), hour, gpu)
    }

    #[test]
    fn push_is_ordered_and_idempotent() {
        let mut doc = Document::bootstrap(Config::default());
        let a = key("2025-06-10", 14, 3);
        let b = key("2025-06-10", 9, 0);

        push_outbid(&mut doc, "ada", a);
        push_outbid(&mut doc, "ada", b);
        push_outbid(&mut doc, "ada", a);

        let day: DayKey = "2025-06-10".parse().unwrap();
        assert_eq!(doc.notifications["ada"][&day], vec![a, b]);
        assert!(has_notifications(&doc, "ada", day));
    }

    #[test]
    fn dismiss_clears_one_day_only() {
        let mut doc = Document::bootstrap(Config::default());
        push_outbid(&mut doc, "ada", key("2025-06-10", 14, 3));
        push_outbid(&mut doc, "ada", key("2025-06-11", 14, 3));

        dismiss(&mut doc, "ada", "2025-06-10".parse().unwrap());

        assert!(!has_notifications(&doc, "ada", "2025-06-10".parse().unwrap()));
        assert!(has_notifications(&doc, "ada", "2025-06-11".parse().unwrap()));
    }

    #[test]
    fn clear_day_sweeps_all_users() {
        let mut doc = Document::bootstrap(Config::default());
        push_outbid(&mut doc, "ada", key("2025-06-10", 14, 3));
        push_outbid(&mut doc, "bob", key("2025-06-10", 2, 1));

        clear_day(&mut doc, "2025-06-10".parse().unwrap());

        assert!(doc.notifications.is_empty());
    }
}
