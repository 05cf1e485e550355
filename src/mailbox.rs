// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! A multi-producer/single-consumer ordered queue of `Command`s with a pollable
//! wake signal. Mirrors `mailbox.cpp`'s `mailbox_init`/`mailbox_send`/`mailbox_recv`
//! almost line for line: the writer side locks a shared queue (the original locks
//! around its `cpipe` write+flush), the reader side has an active/passive fast
//! path so a `recv` that finds work queued never touches the signaler at all.

use std::cell::Cell;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use command::Command;
use signaler::{park_on, Signaler};

struct Shared {
    queue: Mutex<VecDeque<Command>>,
    signaler: Signaler,
}

/// The sending half. Cheaply cloned; safe to hand to any number of other actors.
#[derive(Clone)]
pub struct MailboxSender {
    shared: Arc<Shared>,
}

impl MailboxSender {
    /// Pushes `cmd` and raises the signal iff the reader was passive. Safe from
    /// any thread.
    pub fn send(&self, cmd: Command) -> io::Result<()> {
        let was_empty = {
            let mut queue = self.shared.queue.lock().unwrap();
            let was_empty = queue.is_empty();
            queue.push_back(cmd);
            was_empty
        };
        if was_empty {
            self.shared.signaler.send()?;
        }
        Ok(())
    }
}

/// The single allowed receiver. Not `Clone`: at most one consumer, exactly as the
/// source's mailbox requires ("undefined" behavior otherwise is simply unrepresentable
/// here since there is no way to construct a second `Mailbox` from a `MailboxSender`).
pub struct Mailbox {
    shared: Arc<Shared>,
    active: Cell<bool>,
}

pub enum RecvError {
    Timeout,
    Interrupted,
}

impl Mailbox {
    pub fn new() -> Mailbox {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            signaler: Signaler::new(),
        });
        // Start passive: a caller that polls the signaler fd before the first
        // `recv` call will correctly see it as not-yet-ready.
        Mailbox { shared: shared, active: Cell::new(false) }
    }

    pub fn sender(&self) -> MailboxSender {
        MailboxSender { shared: self.shared.clone() }
    }

    pub fn signaler(&self) -> &Signaler {
        &self.shared.signaler
    }

    fn try_pop(&self) -> Option<Command> {
        self.shared.queue.lock().unwrap().pop_front()
    }

    /// Pops a command, blocking up to `timeout` (`None` = forever) if none is
    /// immediately available.
    pub fn recv(&self, timeout: Option<Duration>) -> Result<Command, RecvError> {
        if self.active.get() {
            if let Some(cmd) = self.try_pop() {
                return Ok(cmd);
            }
            // No more commands: drop to passive before waiting, draining
            // whatever signal is still pending from the last send.
            self.active.set(false);
            let _ = self.shared.signaler.recv();
        }

        let fired = park_on(&self.shared.signaler, timeout).map_err(|_| RecvError::Interrupted)?;
        if !fired {
            return Err(RecvError::Timeout);
        }

        self.active.set(true);
        self.try_pop().ok_or(RecvError::Interrupted)
    }

    /// Non-blocking variant used by an I/O thread that has its own poller and
    /// only wants to drain whatever is already queued.
    pub fn try_recv(&self) -> Option<Command> {
        if !self.active.get() {
            if self.try_pop().is_none() {
                return None;
            }
            self.active.set(true);
        }
        match self.try_pop() {
            Some(cmd) => Some(cmd),
            None => {
                self.active.set(false);
                let _ = self.shared.signaler.recv();
                None
            }
        }
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Mailbox::new()
    }
}
