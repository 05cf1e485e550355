// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! A pollable, cross-thread wake signal with "at most one outstanding signal"
//! semantics. The original implementation picks an eventfd, a self-pipe or a
//! loopback socket pair depending on platform; this crate already depends on
//! `mio` for its event loop, so the signal is a `mio::Registration`/`SetReadiness`
//! pair registered with the same `Poll` the owning I/O thread already polls.

use std::io;
use std::time::Duration;

use mio;
use mio::{Poll, PollOpt, Ready, Registration, SetReadiness, Token};

pub struct Signaler {
    registration: Registration,
    set_readiness: SetReadiness,
}

impl Signaler {
    pub fn new() -> Signaler {
        let (registration, set_readiness) = Registration::new2();
        Signaler { registration: registration, set_readiness: set_readiness }
    }

    /// Raises the signal. Idempotent: raising an already-raised signal is a no-op,
    /// preserving the "at most one unconsumed signal" invariant.
    pub fn send(&self) -> io::Result<()> {
        self.set_readiness.set_readiness(Ready::readable())
    }

    /// Consumes the signal, if any. Does not block.
    pub fn recv(&self) -> io::Result<()> {
        self.set_readiness.set_readiness(Ready::empty())
    }

    /// True if the signal is currently raised, without consuming it.
    pub fn wait(&self) -> bool {
        self.set_readiness.readiness().is_readable()
    }

    pub fn register(&self, poll: &Poll, token: Token) -> io::Result<()> {
        poll.register(&self.registration, token, Ready::readable(), PollOpt::edge())
    }

    pub fn deregister(&self, poll: &Poll) -> io::Result<()> {
        poll.deregister(&self.registration)
    }
}

impl Default for Signaler {
    fn default() -> Self {
        Signaler::new()
    }
}

/// Blocks the calling thread until the signal fires or `timeout` elapses, using a
/// private single-shot `Poll`. Used by `Mailbox::recv` when it has gone passive;
/// the I/O thread's own event loop instead registers the signaler directly with
/// its long-lived `Poll` via `register` above.
pub fn park_on(signaler: &Signaler, timeout: Option<Duration>) -> io::Result<bool> {
    let poll = Poll::new()?;
    signaler.register(&poll, Token(0))?;
    let mut events = mio::Events::with_capacity(1);
    let n = poll.poll(&mut events, timeout)?;
    signaler.deregister(&poll)?;
    Ok(n > 0)
}
