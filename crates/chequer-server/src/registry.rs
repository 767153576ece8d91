//! Subscription registry for race fan-out.
//!
//! Maintains bidirectional mappings: race → subscribers (for broadcast) and
//! subscriber → race (for cleanup on disconnect). A subscriber watches exactly
//! one race; subscribing again moves it.
//!
//! Subscribers are kept in id order, and ids are handed out in increasing
//! order, so fan-out visits subscribers in the order they joined.

use std::collections::{BTreeSet, HashMap};

/// Opaque subscriber handle.
pub type SubscriberId = u64;

/// Registry of which subscriber watches which race.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    /// Race ID → subscribed subscriber IDs
    race_subscribers: HashMap<String, BTreeSet<SubscriberId>>,
    /// Subscriber ID → race ID
    subscriber_race: HashMap<SubscriberId, String>,
}

impl SubscriptionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `subscriber` to `race_id`.
    ///
    /// Returns the race it was previously subscribed to, if any.
    pub fn subscribe(&mut self, subscriber: SubscriberId, race_id: &str) -> Option<String> {
        let previous = self.unsubscribe(subscriber);
        self.race_subscribers.entry(race_id.to_string()).or_default().insert(subscriber);
        self.subscriber_race.insert(subscriber, race_id.to_string());
        previous
    }

    /// Remove a subscriber from whatever race it watches.
    ///
    /// Returns the race it was subscribed to.
    pub fn unsubscribe(&mut self, subscriber: SubscriberId) -> Option<String> {
        let race_id = self.subscriber_race.remove(&subscriber)?;
        if let Some(subscribers) = self.race_subscribers.get_mut(&race_id) {
            subscribers.remove(&subscriber);
            if subscribers.is_empty() {
                self.race_subscribers.remove(&race_id);
            }
        }
        Some(race_id)
    }

    /// Race watched by a subscriber.
    pub fn race_of(&self, subscriber: SubscriberId) -> Option<&str> {
        self.subscriber_race.get(&subscriber).map(String::as_str)
    }

    /// Check if a subscriber watches `race_id`.
    pub fn is_subscribed(&self, subscriber: SubscriberId, race_id: &str) -> bool {
        self.race_of(subscriber) == Some(race_id)
    }

    /// All subscribers of a race, in join order.
    pub fn subscribers_of(&self, race_id: &str) -> impl Iterator<Item = SubscriberId> + '_ {
        self.race_subscribers.get(race_id).into_iter().flat_map(|s| s.iter().copied())
    }

    /// Total number of subscribers across all races.
    pub fn subscriber_count(&self) -> usize {
        self.subscriber_race.len()
    }

    /// Number of subscribers of a race.
    pub fn race_subscriber_count(&self, race_id: &str) -> usize {
        self.race_subscribers.get(race_id).map_or(0, BTreeSet::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_and_lookup() {
        let mut registry = SubscriptionRegistry::new();

        assert_eq!(registry.subscribe(1, "spa"), None);
        assert_eq!(registry.subscribe(2, "spa"), None);

        assert!(registry.is_subscribed(1, "spa"));
        assert!(!registry.is_subscribed(1, "lemans"));
        assert_eq!(registry.subscribers_of("spa").collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn resubscribe_moves_subscriber() {
        let mut registry = SubscriptionRegistry::new();

        registry.subscribe(1, "spa");
        assert_eq!(registry.subscribe(1, "lemans"), Some("spa".to_string()));

        assert_eq!(registry.race_subscriber_count("spa"), 0);
        assert_eq!(registry.race_of(1), Some("lemans"));
        assert_eq!(registry.subscriber_count(), 1);
    }

    #[test]
    fn unsubscribe_removes_from_both_maps() {
        let mut registry = SubscriptionRegistry::new();

        registry.subscribe(1, "spa");
        registry.subscribe(2, "spa");

        assert_eq!(registry.unsubscribe(1), Some("spa".to_string()));
        assert_eq!(registry.unsubscribe(1), None);
        assert_eq!(registry.race_of(1), None);
        assert_eq!(registry.subscribers_of("spa").collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn empty_race_is_cleaned_up() {
        let mut registry = SubscriptionRegistry::new();

        registry.subscribe(1, "spa");
        registry.unsubscribe(1);

        assert_eq!(registry.race_subscriber_count("spa"), 0);
        assert_eq!(registry.subscribers_of("spa").count(), 0);
    }
}
