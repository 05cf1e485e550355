// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The transport-facing collaborator contract: an `Engine` turns wire bytes
//! into `Message`s and back, registered with exactly one I/O thread for its
//! whole lifetime. `Listener`/`Connector` are the out-of-scope collaborator
//! interfaces a TCP/IPC transport would implement; only `udp/` ships a
//! concrete `Engine` in this crate. Grounded on the teacher's
//! `transport/stream/mod.rs` `StepStream`/`Handshake` split, generalized to
//! the engine contract named in the I/O thread specification
//! (`plug`/`unplug`/`terminate`/`activate_in`/`activate_out` plus the
//! `in_event`/`out_event`/`timer_event` poller callbacks).

use std::io;

use mio::Evented;

use message::Message;
use timer_wheel::TimerId;

/// What an `Engine` is given to register fd-level interest and one-shot
/// timers with its owning I/O thread. Implemented by `io_thread::IoThread`.
pub trait EngineContext {
    fn set_pollin(&mut self);
    fn set_pollout(&mut self);
    fn reset_pollin(&mut self);
    fn reset_pollout(&mut self);
    fn add_timer(&mut self, delay_ms: u64) -> TimerId;
    fn rm_timer(&mut self, id: TimerId);
}

/// What an `Engine` pushes decoded messages into and pulls outbound messages
/// from. Implemented by `session::Session`, which bridges this to the pipe
/// pair connecting to the owning socket.
pub trait SessionHandle: Send {
    /// Hands a freshly decoded inbound message to the session. Returns `false`
    /// if the session's pipe has no room (backpressure; the engine should
    /// stop reading until the next `activate_in`).
    fn push_msg(&mut self, msg: Message) -> bool;
    /// Pulls the next outbound message, if any is queued.
    fn pull_msg(&mut self) -> Option<Message>;
}

/// A connection's wire protocol driver. One `Engine` per connected pipe; it
/// never blocks and is driven entirely by its owning I/O thread's poller.
/// `Send` so a freshly built engine can be handed to its owning I/O thread
/// across the `CommandBody::OpenSession` mailbox message — the thread that
/// calls `connect`/`bind` is rarely the one running that I/O thread's loop.
pub trait Engine: Send {
    /// The raw pollable source the owning I/O thread registers with its
    /// `mio::Poll`. Borrowed, not handed over: the engine keeps ownership of
    /// the socket for its whole lifetime.
    fn evented(&self) -> &dyn Evented;

    fn plug(&mut self, ctx: &mut dyn EngineContext);
    fn unplug(&mut self);
    fn terminate(&mut self, ctx: &mut dyn EngineContext);

    /// The session has room for more inbound messages; resume reading.
    fn activate_in(&mut self, ctx: &mut dyn EngineContext);
    /// The session has queued an outbound message; resume writing.
    fn activate_out(&mut self, ctx: &mut dyn EngineContext);

    fn in_event(&mut self, ctx: &mut dyn EngineContext, session: &mut dyn SessionHandle) -> io::Result<()>;
    fn out_event(&mut self, ctx: &mut dyn EngineContext, session: &mut dyn SessionHandle) -> io::Result<()>;
    fn timer_event(&mut self, ctx: &mut dyn EngineContext, id: TimerId);
}

/// Out-of-scope collaborator: accepts inbound connections, handing each a
/// freshly constructed `Engine`. No concrete implementation ships in this
/// crate (TCP/IPC listeners are out of scope); this trait exists so a caller
/// could plug one in without touching `io_thread`/`session`.
pub trait Listener {
    fn accept(&mut self) -> io::Result<Option<Box<dyn Engine>>>;
}

/// Out-of-scope collaborator: establishes outbound connections. No concrete
/// implementation ships in this crate.
pub trait Connector {
    fn connect(&mut self) -> io::Result<Box<dyn Engine>>;
}
