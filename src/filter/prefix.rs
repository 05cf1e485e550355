// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! A radix trie for byte-wise prefix matching, grounded in `prefix_filter.cpp`'s
//! `pfx_node_t`/`pfx_add`/`pfx_rm`/`pf_match`. The original represents each
//! node's children as either a single pointer (one live edge) or a packed
//! `[min, min+count)` array (many edges), switching shape as edges come and go.
//! A `BTreeMap<u8, Box<Node>>` is naturally sparse, so it is used here for both
//! shapes at once — the externally observable behavior (fresh-subscription
//! signaling, refcounting, bottom-up pruning) is unchanged, only the node's
//! internal child storage is simplified.

use std::collections::BTreeMap;
use std::collections::HashMap;

use super::{PublisherFilter, SubscriberFilter, Subscriber};

struct Node {
    subscribers: HashMap<Subscriber, u32>,
    children: BTreeMap<u8, Box<Node>>,
}

impl Node {
    fn new() -> Node {
        Node { subscribers: HashMap::new(), children: BTreeMap::new() }
    }

    fn is_empty(&self) -> bool {
        self.subscribers.is_empty() && self.children.is_empty()
    }
}

/// Publisher-side prefix trie: one subscriber set per distinct prefix, shared
/// across however many pipes have subscribed to it.
pub struct PrefixFilter {
    root: Node,
}

impl PrefixFilter {
    pub fn new() -> PrefixFilter {
        PrefixFilter { root: Node::new() }
    }

    fn subscribe_at(node: &mut Node, pattern: &[u8], subscriber: Subscriber) -> bool {
        match pattern.split_first() {
            None => {
                let refcount = node.subscribers.entry(subscriber).or_insert(0);
                *refcount += 1;
                *refcount == 1
            }
            Some((byte, rest)) => {
                let child = node.children.entry(*byte).or_insert_with(|| Box::new(Node::new()));
                Self::subscribe_at(child, rest, subscriber)
            }
        }
    }

    /// Returns `(transitioned_to_empty, should_prune_this_node)`.
    fn unsubscribe_at(node: &mut Node, pattern: &[u8], subscriber: Subscriber) -> (bool, bool) {
        let transitioned = match pattern.split_first() {
            None => {
                let became_empty = match node.subscribers.get_mut(&subscriber) {
                    None => return (false, false),
                    Some(refcount) => {
                        *refcount -= 1;
                        *refcount == 0
                    }
                };
                if became_empty {
                    node.subscribers.remove(&subscriber);
                }
                became_empty
            }
            Some((byte, rest)) => {
                let prune_child = match node.children.get_mut(byte) {
                    None => return (false, false),
                    Some(child) => {
                        let (became_empty, should_prune) = Self::unsubscribe_at(child, rest, subscriber);
                        if should_prune {
                            node.children.remove(byte);
                        }
                        became_empty
                    }
                };
                prune_child
            }
        };
        (transitioned, node.is_empty())
    }

    fn unsubscribe_all_at(
        node: &mut Node,
        subscriber: Subscriber,
        prefix: &mut Vec<u8>,
        on_removed: &mut dyn FnMut(&[u8]),
    ) -> bool {
        if let Some(refcount) = node.subscribers.remove(&subscriber) {
            debug_assert!(refcount > 0);
            on_removed(prefix);
        }
        let mut dead_children = Vec::new();
        for (&byte, child) in node.children.iter_mut() {
            prefix.push(byte);
            let child_empty = Self::unsubscribe_all_at(child, subscriber, prefix, on_removed);
            prefix.pop();
            if child_empty {
                dead_children.push(byte);
            }
        }
        for byte in dead_children {
            node.children.remove(&byte);
        }
        node.is_empty()
    }

    fn matches_at(node: &Node, message: &[u8], on_match: &mut dyn FnMut(Subscriber)) {
        for &subscriber in node.subscribers.keys() {
            on_match(subscriber);
        }
        if let Some((byte, rest)) = message.split_first() {
            if let Some(child) = node.children.get(byte) {
                Self::matches_at(child, rest, on_match);
            }
        }
    }
}

impl Default for PrefixFilter {
    fn default() -> Self {
        PrefixFilter::new()
    }
}

impl PublisherFilter for PrefixFilter {
    fn subscribe(&mut self, pattern: &[u8], subscriber: Subscriber) -> bool {
        Self::subscribe_at(&mut self.root, pattern, subscriber)
    }

    fn unsubscribe(&mut self, pattern: &[u8], subscriber: Subscriber) -> bool {
        Self::unsubscribe_at(&mut self.root, pattern, subscriber).0
    }

    fn unsubscribe_all(&mut self, subscriber: Subscriber, on_removed: &mut dyn FnMut(&[u8])) {
        let mut prefix = Vec::new();
        Self::unsubscribe_all_at(&mut self.root, subscriber, &mut prefix, on_removed);
    }

    fn matches(&self, message: &[u8], on_match: &mut dyn FnMut(Subscriber)) {
        Self::matches_at(&self.root, message, on_match);
    }
}

/// Subscriber-side: the same trie shape, but `Subscriber` is always the same
/// unit handle (`0`) since a socket only ever matches against its own set.
pub struct PrefixSubscriberFilter {
    inner: PrefixFilter,
    patterns: Vec<Vec<u8>>,
}

impl PrefixSubscriberFilter {
    pub fn new() -> PrefixSubscriberFilter {
        PrefixSubscriberFilter { inner: PrefixFilter::new(), patterns: Vec::new() }
    }
}

impl Default for PrefixSubscriberFilter {
    fn default() -> Self {
        PrefixSubscriberFilter::new()
    }
}

const SELF: Subscriber = 0;

impl SubscriberFilter for PrefixSubscriberFilter {
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
    fn fresh_subscription_is_signalled_once() {
        let mut filter = PrefixFilter::new();
        assert!(filter.subscribe(b"abc", 1));
        assert!(!filter.subscribe(b"abc", 1));
        assert!(filter.subscribe(b"abc", 2));
    }

    #[test]
    fn empty_prefix_matches_everything() {
        let mut filter = PrefixFilter::new();
        filter.subscribe(b"", 1);

        let mut matched = Vec::new();
        filter.matches(b"anything", &mut |s| matched.push(s));
        assert_eq!(matched, vec![1]);
    }

    #[test]
    fn match_requires_full_prefix() {
        let mut filter = PrefixFilter::new();
        filter.subscribe(b"Hello", 1);

        let mut matched = Vec::new();
        filter.matches(b"Hello, World!", &mut |s| matched.push(s));
        assert_eq!(matched, vec![1]);

        matched.clear();
        filter.matches(b"Hell", &mut |s| matched.push(s));
        assert!(matched.is_empty());
    }

    #[test]
    fn unsubscribe_requires_matching_refcount() {
        let mut filter = PrefixFilter::new();
        filter.subscribe(b"abc", 1);
        filter.subscribe(b"abc", 1);
        assert!(!filter.unsubscribe(b"abc", 1));
        assert!(filter.unsubscribe(b"abc", 1));

        let mut matched = Vec::new();
        filter.matches(b"abc", &mut |s| matched.push(s));
        assert!(matched.is_empty());
    }

    #[test]
    fn trie_compacts_after_siblings_unsubscribe() {
        let mut filter = PrefixFilter::new();
        filter.subscribe(b"ab", 1);
        filter.subscribe(b"ac", 2);
        filter.subscribe(b"ad", 3);

        filter.unsubscribe(b"ac", 2);
        filter.unsubscribe(b"ad", 3);

        let mut matched = Vec::new();
        filter.matches(b"ab", &mut |s| matched.push(s));
        assert_eq!(matched, vec![1]);

        matched.clear();
        filter.matches(b"ac", &mut |s| matched.push(s));
        assert!(matched.is_empty());
    }

    #[test]
    fn unsubscribe_all_reports_every_removed_prefix() {
        let mut filter = PrefixFilter::new();
        filter.subscribe(b"a", 1);
        filter.subscribe(b"ab", 1);
        filter.subscribe(b"ac", 2);

        let mut removed = Vec::new();
        filter.unsubscribe_all(1, &mut |prefix| removed.push(prefix.to_vec()));
        removed.sort();
        assert_eq!(removed, vec![b"a".to_vec(), b"ab".to_vec()]);

        let mut matched = Vec::new();
        filter.matches(b"ac", &mut |s| matched.push(s));
        assert_eq!(matched, vec![2]);
    }

    #[test]
    fn subscriber_filter_replays_patterns() {
        let mut filter = PrefixSubscriberFilter::new();
        filter.subscribe(b"a");
        filter.subscribe(b"b");

        let mut seen = Vec::new();
        filter.each_pattern(&mut |p| seen.push(p.to_vec()));
        seen.sort();
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec()]);

        assert!(filter.matches(b"abc"));
        assert!(!filter.matches(b"xyz"));
    }
}
