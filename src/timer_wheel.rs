// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! One-shot timers for an I/O thread's main loop: a sorted `(expiry, handle)`
//! list so `next_timeout` and `expire` are explicit, testable functions
//! instead of being buried in the event loop itself. No `original_source`
//! timer module is shipped in the retrieval pack, so this is modeled
//! structurally after the sorted-entries description in the I/O thread
//! specification rather than translated line-for-line from C.

use std::collections::HashMap;

/// Opaque handle returned by `add_timer`, passed back to `rm_timer`.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct TimerId(pub u64);

pub struct TimerWheel {
    /// Sorted ascending by expiry; a linear insert keeps this small wheel
    /// simple and its `next_timeout`/`expire` calls O(1) amortized.
    entries: Vec<(u64, TimerId)>,
    deadlines: HashMap<TimerId, u64>,
    next_id: u64,
}

impl TimerWheel {
    pub fn new() -> TimerWheel {
        TimerWheel { entries: Vec::new(), deadlines: HashMap::new(), next_id: 0 }
    }

    /// Registers a one-shot timer expiring at `expiry_ms` (an absolute
    /// monotonic millisecond timestamp, as produced by the caller's clock).
    pub fn add_timer(&mut self, expiry_ms: u64) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;

        let pos = self.entries.iter().position(|&(e, _)| e > expiry_ms).unwrap_or(self.entries.len());
        self.entries.insert(pos, (expiry_ms, id));
        self.deadlines.insert(id, expiry_ms);
        id
    }

    /// Cancels a pending timer. Returns `false` if it already fired or was
    /// never registered.
    pub fn rm_timer(&mut self, id: TimerId) -> bool {
        match self.deadlines.remove(&id) {
            None => false,
            Some(expiry) => {
                if let Some(pos) = self.entries.iter().position(|&(e, i)| e == expiry && i == id) {
                    self.entries.remove(pos);
                }
                true
            }
        }
    }

    /// Milliseconds until the next timer expires, for use as the poller's
    /// wait argument. `None` means no timer is pending (wait indefinitely).
    pub fn next_timeout(&self, now_ms: u64) -> Option<u64> {
        self.entries.first().map(|&(expiry, _)| if expiry > now_ms { expiry - now_ms } else { 0 })
    }

    /// Removes and returns every timer whose expiry is at or before `now_ms`,
    /// in expiry order.
    pub fn expire(&mut self, now_ms: u64) -> Vec<TimerId> {
        let split = self.entries.iter().position(|&(e, _)| e > now_ms).unwrap_or(self.entries.len());
        let fired: Vec<(u64, TimerId)> = self.entries.drain(..split).collect();
        for &(_, id) in &fired {
            self.deadlines.remove(&id);
        }
        fired.into_iter().map(|(_, id)| id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TimerWheel {
    fn default() -> Self {
        TimerWheel::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timers_expire_in_order_regardless_of_insertion_order() {
        let mut wheel = TimerWheel::new();
        let late = wheel.add_timer(300);
        let early = wheel.add_timer(100);
        let mid = wheel.add_timer(200);

        assert_eq!(wheel.expire(150), vec![early]);
        assert_eq!(wheel.expire(250), vec![mid]);
        assert_eq!(wheel.expire(1000), vec![late]);
    }

    #[test]
    fn next_timeout_is_zero_once_overdue() {
        let mut wheel = TimerWheel::new();
        wheel.add_timer(100);
        assert_eq!(wheel.next_timeout(50), Some(50));
        assert_eq!(wheel.next_timeout(150), Some(0));
    }

    #[test]
    fn next_timeout_is_none_when_idle() {
        let wheel = TimerWheel::new();
        assert_eq!(wheel.next_timeout(0), None);
    }

    #[test]
    fn cancelling_a_timer_removes_it_from_the_wheel() {
        let mut wheel = TimerWheel::new();
        let id = wheel.add_timer(100);
        assert!(wheel.rm_timer(id));
        assert!(wheel.is_empty());
        assert!(!wheel.rm_timer(id));
    }

    #[test]
    fn expire_drains_all_due_timers_in_one_call() {
        let mut wheel = TimerWheel::new();
        wheel.add_timer(10);
        wheel.add_timer(20);
        wheel.add_timer(30);

        assert_eq!(wheel.expire(25).len(), 2);
        assert!(!wheel.is_empty());
    }
}
