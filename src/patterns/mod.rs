// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The per-pattern virtual table (`xsend`/`xrecv`/...) dispatched by `SocketBase`,
//! and the `PipeSet` helper shared by every pattern implementation that tracks
//! attached pipes by `PipeId` so no pattern module reinvents pipe bookkeeping.

pub mod xreq;
pub mod req;
pub mod xrep;
pub mod rep;
pub mod xpub;
pub mod pub_socket;
pub mod xsub;
pub mod sub;
pub mod push;
pub mod pull;
pub mod xsurveyor;
pub mod surveyor;
pub mod xrespondent;
pub mod respondent;

use std::collections::HashMap;
use std::collections::hash_map;
use std::io;
use std::time::Instant;

use command::PipeId;
use global::SocketOption;
use message::Message;
use pipe::{PipeReader, PipeWriter};

/// One attached connection's pipe pair plus whatever bookkeeping a pattern
/// hangs off it (e.g. routing labels, subscription filter state) via `meta`.
pub struct PipeSlot<M> {
    pub writer: PipeWriter,
    pub reader: PipeReader,
    pub meta: M,
}

/// Tracks every pipe currently attached to a socket, keyed by `PipeId`.
pub struct PipeSet<M> {
    pipes: HashMap<PipeId, PipeSlot<M>>,
}

impl<M> PipeSet<M> {
    pub fn new() -> PipeSet<M> {
        PipeSet { pipes: HashMap::new() }
    }

    pub fn attach(&mut self, id: PipeId, writer: PipeWriter, reader: PipeReader, meta: M) {
        self.pipes.insert(id, PipeSlot { writer: writer, reader: reader, meta: meta });
    }

    pub fn detach(&mut self, id: PipeId) -> Option<PipeSlot<M>> {
        self.pipes.remove(&id)
    }

    pub fn get(&self, id: PipeId) -> Option<&PipeSlot<M>> {
        self.pipes.get(&id)
    }

    pub fn get_mut(&mut self, id: PipeId) -> Option<&mut PipeSlot<M>> {
        self.pipes.get_mut(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.pipes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pipes.len()
    }

    pub fn ids(&self) -> Vec<PipeId> {
        self.pipes.keys().cloned().collect()
    }

    pub fn iter(&self) -> hash_map::Iter<PipeId, PipeSlot<M>> {
        self.pipes.iter()
    }

    pub fn iter_mut(&mut self) -> hash_map::IterMut<PipeId, PipeSlot<M>> {
        self.pipes.iter_mut()
    }

    /// Round-robins over a starting point, used by `lb`/`fq`-style patterns that
    /// want fair rotation rather than always favoring the lowest `PipeId`.
    pub fn ids_from(&self, start: usize) -> Vec<PipeId> {
        let mut ids = self.ids();
        ids.sort_by_key(|id| id.0);
        if ids.is_empty() {
            return ids;
        }
        let at = start % ids.len();
        let mut rotated = ids.split_off(at);
        rotated.extend(ids);
        rotated
    }
}

impl<M> Default for PipeSet<M> {
    fn default() -> Self {
        PipeSet::new()
    }
}

/// `xsend` failed: `error` is the reason, `message` hands ownership of the
/// input back so the caller can retry it later. For a `WouldBlock` error this
/// is the whole point (no pipe had credit right now; `SocketBase::send` waits
/// for `xhas_out()` and tries the identical message again); for an outright
/// rejection (`EFSM`/`ENOTSUP`/malformed input) the caller typically just
/// drops `message`, but gets it back regardless so every failure path has the
/// same shape.
pub struct SendError {
    pub error: io::Error,
    pub message: Message,
}

impl SendError {
    pub fn new(error: io::Error, message: Message) -> SendError {
        SendError { error: error, message: message }
    }
}

/// The per-pattern behaviour a `SocketBase` dispatches into. Every method takes
/// `&mut self` since every pattern carries some mutable FSM/routing state; a raw
/// socket with no FSM simply ignores what it doesn't need (e.g. `Push` never
/// looks at `xhas_in`'s result because `xrecv` already returns `ENOTSUP`).
pub trait Protocol {
    /// Queues `msg` for delivery. `Err(WouldBlock)` means no pipe currently has
    /// credit (or, for patterns with send-side FSM state, the FSM forbids it —
    /// that case uses `fsm_io_error` instead). Either way `msg` comes back via
    /// `SendError::message`.
    fn xsend(&mut self, msg: Message) -> Result<(), SendError>;

    /// Dequeues the next message. `Err(WouldBlock)` means nothing is available
    /// right now.
    fn xrecv(&mut self) -> io::Result<Message>;

    fn xhas_in(&self) -> bool;
    fn xhas_out(&self) -> bool;

    /// A pattern-level deadline `recv` must not block past, distinct from the
    /// socket's own `RCVTIMEO` (e.g. SURVEYOR's `SURVEY_TIMEOUT`). Blocking on
    /// `xhas_in()` alone cannot observe this, since the wait only wakes on a
    /// pipe becoming ready and a deadline with no respondent never does.
    /// `None` (the default) means this pattern has no such deadline.
    fn recv_deadline(&self) -> Option<Instant> {
        None
    }

    /// Applies a pattern-specific option (`SUBSCRIBE`, `SURVEY_TIMEOUT`, ...).
    /// Returns `Ok(false)` for an option this pattern doesn't recognize at all,
    /// so the caller can fall through to `ENOTSUP` without every raw/cooked pair
    /// having to duplicate the rejection.
    fn xsetsockopt(&mut self, option: &SocketOption) -> io::Result<bool>;

    /// A new pipe has just been wired in by the owning `Session`.
    fn xattach_pipe(&mut self, pipe: PipeId, writer: PipeWriter, reader: PipeReader);

    /// The pipe's reader side published new data (`ActivateRead`/flush woke it).
    fn xread_activated(&mut self, pipe: PipeId);

    /// The pipe's writer side regained credit (`ActivateWrite`); `msgs_read`
    /// is the peer's count of messages consumed since the last report, which
    /// a raw protocol applies to the matching `PipeWriter` via
    /// `PipeWriter::on_activate_write`.
    fn xwrite_activated(&mut self, pipe: PipeId, msgs_read: u64);

    /// The pipe was torn down and immediately replaced (reconnect): patterns
    /// that cache per-pipe state (XSUB's replay set) use this to re-seed it.
    fn xhiccuped(&mut self, pipe: PipeId);

    /// The pipe is gone for good; drop any bookkeeping keyed on it.
    fn xterminated(&mut self, pipe: PipeId);
}
