// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Dotted-segment topic matching with a `*` wildcard, grounded in
//! `topic_filter.cpp`'s `topic_match`/`pf_*`/`sf_*`. Unlike the prefix filter,
//! subscriptions here are patterns (may contain `*` standing for one whole
//! dot-delimited segment) matched against a literal message topic, so the
//! natural structure is a flat table of `pattern -> subscribers` rather than a
//! trie: there is no useful shared-prefix structure to exploit once wildcards
//! are in play.

use std::collections::HashMap;

use super::{PublisherFilter, SubscriberFilter, Subscriber};

/// Matches a dotted pattern (`*` stands for exactly one non-empty segment)
/// against a literal topic. A malformed pattern such as `"*abc"` (a `*` not
/// immediately followed by `.` or end-of-string) never matches anything, the
/// same as the original's fall-through `return false`.
fn topic_match(pattern: &[u8], mut data: &[u8]) -> bool {
    let mut topic = pattern;
    loop {
        if topic.is_empty() {
            return true;
        }
        if topic[0] == b'*' {
            topic = &topic[1..];
            while !data.is_empty() && data[0] != b'.' {
                data = &data[1..];
            }
        } else {
            loop {
                if topic.is_empty() || topic[0] == b'.' {
                    break;
                }
                if data.is_empty() || topic[0] != data[0] {
                    return false;
                }
                data = &data[1..];
                topic = &topic[1..];
            }
        }

        if topic.is_empty() {
            return true;
        }
        if topic[0] != b'.' {
            return false;
        }
        if data.is_empty() || data[0] != b'.' {
            return false;
        }
        data = &data[1..];
        topic = &topic[1..];
    }
}

struct Entry {
    subscribers: Vec<Subscriber>,
}

/// Publisher-side topic matcher: a flat map of subscribed patterns to the
/// subscribers pinned on each, tested linearly against every incoming message.
pub struct TopicFilter {
    patterns: HashMap<Vec<u8>, Entry>,
}

impl TopicFilter {
    pub fn new() -> TopicFilter {
        TopicFilter { patterns: HashMap::new() }
    }
}

impl Default for TopicFilter {
    fn default() -> Self {
        TopicFilter::new()
    }
}

impl PublisherFilter for TopicFilter {
    fn subscribe(&mut self, pattern: &[u8], subscriber: Subscriber) -> bool {
        let entry = self.patterns.entry(pattern.to_vec()).or_insert_with(|| Entry { subscribers: Vec::new() });
        let fresh = !entry.subscribers.contains(&subscriber);
        entry.subscribers.push(subscriber);
        fresh
    }

    fn unsubscribe(&mut self, pattern: &[u8], subscriber: Subscriber) -> bool {
        let (now_empty, drop_pattern) = match self.patterns.get_mut(pattern) {
            None => return false,
            Some(entry) => {
                match entry.subscribers.iter().position(|s| *s == subscriber) {
                    None => return false,
                    Some(pos) => {
                        entry.subscribers.remove(pos);
                        let no_more = !entry.subscribers.contains(&subscriber);
                        (no_more, entry.subscribers.is_empty())
                    }
                }
            }
        };
        if drop_pattern {
            self.patterns.remove(pattern);
        }
        now_empty
    }

    fn unsubscribe_all(&mut self, subscriber: Subscriber, on_removed: &mut dyn FnMut(&[u8])) {
        let mut drained = Vec::new();
        self.patterns.retain(|pattern, entry| {
            let before = entry.subscribers.len();
            entry.subscribers.retain(|s| *s != subscriber);
            if entry.subscribers.len() != before {
                drained.push(pattern.clone());
            }
            !entry.subscribers.is_empty()
        });
        for pattern in &drained {
            on_removed(pattern);
        }
    }

    fn matches(&self, message: &[u8], on_match: &mut dyn FnMut(Subscriber)) {
        for (pattern, entry) in &self.patterns {
            if topic_match(pattern, message) {
                for &subscriber in &entry.subscribers {
                    on_match(subscriber);
                }
            }
        }
    }
}

/// Subscriber-side: same pattern table, one unit subscriber.
pub struct TopicSubscriberFilter {
    inner: TopicFilter,
    patterns: Vec<Vec<u8>>,
}

impl TopicSubscriberFilter {
    pub fn new() -> TopicSubscriberFilter {
        TopicSubscriberFilter { inner: TopicFilter::new(), patterns: Vec::new() }
    }
}

impl Default for TopicSubscriberFilter {
    fn default() -> Self {
        TopicSubscriberFilter::new()
    }
}

const SELF: Subscriber = 0;

impl SubscriberFilter for TopicSubscriberFilter {
    fn subscribe(&mut self, pattern: &[u8]) -> bool {
        let fresh = self.inner.subscribe(pattern, SELF);
        self.patterns.push(pattern.to_vec());
        fresh
    }

    fn unsubscribe(&mut self, pattern: &[u8]) -> bool {
        if let Some(pos) = self.patterns.iter().position(|p| p == pattern) {
            self.patterns.remove(pos);
        }
        self.inner.unsubscribe(pattern, SELF)
    }

    fn matches(&self, message: &[u8]) -> bool {
        let mut found = false;
        self.inner.matches(message, &mut |_| found = true);
        found
    }

    fn each_pattern(&self, each: &mut dyn FnMut(&[u8])) {
        for pattern in &self.patterns {
            each(pattern);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_pattern_matches_exact_topic() {
        assert!(topic_match(b"sports.football", b"sports.football"));
        assert!(!topic_match(b"sports.football", b"sports.tennis"));
    }

    #[test]
    fn wildcard_matches_one_segment() {
        assert!(topic_match(b"sports.*", b"sports.football"));
        assert!(!topic_match(b"sports.*", b"sports"));
        assert!(!topic_match(b"sports.*", b"sports.football.league"));
    }

    #[test]
    fn wildcard_segment_must_be_nonempty() {
        assert!(!topic_match(b"sports.*", b"sports."));
    }

    #[test]
    fn malformed_pattern_never_matches() {
        assert!(!topic_match(b"*abc", b"xabc"));
    }

    #[test]
    fn fresh_subscription_reported_once_per_subscriber() {
        let mut filter = TopicFilter::new();
        assert!(filter.subscribe(b"sports.*", 1));
        assert!(!filter.subscribe(b"sports.*", 1));
        assert!(filter.subscribe(b"sports.*", 2));
    }

    #[test]
    fn matches_invokes_callback_for_every_pinned_subscriber() {
        let mut filter = TopicFilter::new();
        filter.subscribe(b"sports.*", 1);
        filter.subscribe(b"weather.*", 2);

        let mut matched = Vec::new();
        filter.matches(b"sports.football", &mut |s| matched.push(s));
        assert_eq!(matched, vec![1]);
    }

    #[test]
    fn unsubscribe_drops_pattern_once_last_subscriber_leaves() {
        let mut filter = TopicFilter::new();
        filter.subscribe(b"sports.*", 1);
        assert!(filter.unsubscribe(b"sports.*", 1));

        let mut matched = Vec::new();
        filter.matches(b"sports.football", &mut |s| matched.push(s));
        assert!(matched.is_empty());
    }

    #[test]
    fn unsubscribe_all_reports_every_dropped_pattern() {
        let mut filter = TopicFilter::new();
        filter.subscribe(b"sports.*", 1);
        filter.subscribe(b"weather.*", 1);
        filter.subscribe(b"weather.*", 2);

        let mut removed = Vec::new();
        filter.unsubscribe_all(1, &mut |pattern| removed.push(pattern.to_vec()));
        removed.sort();
        assert_eq!(removed, vec![b"sports.*".to_vec(), b"weather.*".to_vec()]);

        let mut matched = Vec::new();
        filter.matches(b"weather.rain", &mut |s| matched.push(s));
        assert_eq!(matched, vec![2]);
    }

    #[test]
    fn subscriber_filter_tracks_own_patterns() {
        let mut filter = TopicSubscriberFilter::new();
        filter.subscribe(b"sports.*");

        assert!(filter.matches(b"sports.football"));
        assert!(!filter.matches(b"weather.rain"));

        let mut seen = Vec::new();
        filter.each_pattern(&mut |p| seen.push(p.to_vec()));
        assert_eq!(seen, vec![b"sports.*".to_vec()]);
    }
}
