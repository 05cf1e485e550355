// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Commands are the sole means of cross-thread state change: every actor
//! (I/O thread, socket, session, reaper) drains its mailbox of `Command`s before
//! doing its own local work. A command never carries a raw pointer to another
//! actor's state (that state lives on one thread only) — it carries an opaque
//! handle the receiving actor resolves against its own table, exactly the way
//! `own`/`attach`/`pipe_term` exchange slot/pipe ids rather than references.

use engine::{Engine, SessionHandle};
use global::SocketId;
use message::Message;
use pipe::{PipeReader, PipeWriter};

/// Opaque handle to a pipe, scoped to the two actors that share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipeId(pub usize);

/// Opaque handle to a session/engine pair, scoped to its owning I/O thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub usize);

/// Opaque handle to an I/O thread slot in the Context's slot table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IoThreadId(pub usize);

/// The actor a `Command` is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Context,
    Reaper,
    IoThread(IoThreadId),
    Socket(SocketId),
    Session(SessionId),
}

/// A small tagged record posted to a mailbox: `{type, destination, payload}`.
pub struct Command {
    pub destination: Destination,
    pub body: CommandBody,
}

impl Command {
    pub fn new(destination: Destination, body: CommandBody) -> Command {
        Command { destination: destination, body: body }
    }

    pub fn name(&self) -> &'static str {
        self.body.name()
    }
}

pub enum CommandBody {
    /// Tell the receiving actor to shut down its event loop.
    Stop,
    /// A newly created child (session, socket) is being handed to its owner.
    Plug(SessionId),
    /// Establish a counted ownership edge: parent will expect a `TermAck` before
    /// dropping this child.
    Own(SessionId),
    /// A pipe endpoint is being attached to a socket.
    Attach(PipeId),
    /// Bind succeeded/failed for a previously requested listener.
    Bind(Result<(), String>),
    /// The reader side of a pipe has more data available.
    ActivateRead(PipeId),
    /// The reader has consumed up to `msgs_read`; writer may advance its credit.
    ActivateWrite(PipeId, u64),
    /// A pipe was torn down and replaced (reconnect); cached subscriptions should
    /// be replayed onto the new one.
    Hiccup(PipeId),
    /// Initiate a pipe's three-message termination handshake.
    PipeTerm(PipeId),
    /// Acknowledge a `PipeTerm`, after drain (linger) completes.
    PipeTermAck(PipeId),
    /// A child is requesting permission to terminate.
    TermReq(SessionId),
    /// Begin terminating the addressed actor.
    Term,
    /// Acknowledge a `Term`/`TermReq`; the last outstanding ack releases the child.
    TermAck,
    /// Ask the Reaper to take over destroying a socket once its pipes drain,
    /// naming the pipes still owed a `PipeTermAck`.
    Reap(SocketId, Vec<PipeId>),
    /// The Reaper has finished destroying a socket.
    Reaped(SocketId),
    /// An `inproc://` connector found its matching listener in the endpoint registry.
    InprocConnected(SessionId),
    /// The Reaper has drained every socket; the Context's `term()` may return.
    Done,
    /// A deliverable user message flowing between a Session and its Engine.
    Deliver(PipeId, Message),
    /// `inproc://` rendezvous: the connecting socket hands the listening
    /// socket its half of a freshly created pipe pair. There is no
    /// Session/Engine for an inproc peer, so the pipe is plugged straight
    /// into the receiving socket's pattern FSM.
    InprocAttach(PipeId, PipeWriter, PipeReader),
    /// Hand a freshly built transport engine and its session to the I/O
    /// thread that must run it. Built on whatever thread called `connect`/
    /// `bind`; the engine is only ever touched by its owning I/O thread from
    /// here on, so this crosses the mailbox exactly once.
    OpenSession(SessionId, Box<dyn Engine>, Box<dyn SessionHandle>),
}

impl CommandBody {
    pub fn name(&self) -> &'static str {
        match *self {
            CommandBody::Stop => "stop",
            CommandBody::Plug(_) => "plug",
            CommandBody::Own(_) => "own",
            CommandBody::Attach(_) => "attach",
            CommandBody::Bind(_) => "bind",
            CommandBody::ActivateRead(_) => "activate_read",
            CommandBody::ActivateWrite(_, _) => "activate_write",
            CommandBody::Hiccup(_) => "hiccup",
            CommandBody::PipeTerm(_) => "pipe_term",
            CommandBody::PipeTermAck(_) => "pipe_term_ack",
            CommandBody::TermReq(_) => "term_req",
            CommandBody::Term => "term",
            CommandBody::TermAck => "term_ack",
            CommandBody::Reap(_, _) => "reap",
            CommandBody::Reaped(_) => "reaped",
            CommandBody::InprocConnected(_) => "inproc_connected",
            CommandBody::Done => "done",
            CommandBody::Deliver(_, _) => "deliver",
            CommandBody::InprocAttach(_, _, _) => "inproc_attach",
            CommandBody::OpenSession(_, _, _) => "open_session",
        }
    }
}
