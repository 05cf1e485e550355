// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The actor every application-visible handle wraps: per-socket options, the
//! attached-pipe routing table, and the pattern-specific `Protocol` it
//! dispatches `send`/`recv` into. Grounded on `socket_impl.rs`'s `bind`/
//! `connect`/`send`/`recv` shape, retargeted from its single-reactor
//! `mio::EventLoop`/timeout-callback style onto this crate's blocking
//! `Mailbox::recv(Some(Duration))` idiom, since here every socket call runs
//! on its own application thread rather than inside one shared event loop.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use command::{Command, CommandBody, Destination, PipeId, SessionId};
use context::Context;
use engine::Engine;
use filter::{self, FilterId};
use global::{
    addr_in_use_io_error, invalid_input_io_error, not_supported_io_error,
    other_io_error, term_io_error, timed_out_io_error, would_block_io_error,
    EndpointId, SocketId, SocketOption, SocketType,
};
use mailbox::{Mailbox, MailboxSender, RecvError};
use message::Message;
use patterns::pub_socket::Pub;
use patterns::pull::Pull;
use patterns::push::Push;
use patterns::rep::Rep;
use patterns::req::Req;
use patterns::respondent::Respondent;
use patterns::sub::Sub;
use patterns::surveyor::Surveyor;
use patterns::xpub::Xpub;
use patterns::xrep::Xrep;
use patterns::xreq::Xreq;
use patterns::xrespondent::Xrespondent;
use patterns::xsub::Xsub;
use patterns::xsurveyor::Xsurveyor;
use patterns::Protocol;
use pipe::new_pipe;
use session::Session;
use udp;

/// Pipes wired straight between two sockets in the same process have no
/// Session/Engine to mediate them, so there is no real backpressure to model;
/// an effectively unbounded credit ceiling sidesteps threading the peer's
/// actual consumption count back across the mailbox boundary (the
/// `ActivateWrite`/`ActivateRead` wake still crosses, but purely as a "check
/// again" nudge, not a precise credit report).
const INPROC_HWM: u32 = u32::max_value();

fn new_protocol(socket_type: SocketType, filter_id: FilterId) -> Box<dyn Protocol> {
    match socket_type {
        SocketType::Xreq => Box::new(Xreq::new()),
        SocketType::Req => Box::new(Req::new(::rand::random::<u32>(), true)),
        SocketType::Xrep => Box::new(Xrep::new()),
        SocketType::Rep => Box::new(Rep::new()),
        SocketType::Xpub => Box::new(Xpub::with_filter(filter_id)),
        SocketType::Pub => Box::new(Pub::new()),
        SocketType::Xsub => Box::new(Xsub::new()),
        SocketType::Sub => Box::new(Sub::with_filter(filter_id)),
        SocketType::Push => Box::new(Push::new()),
        SocketType::Pull => Box::new(Pull::new()),
        SocketType::Xsurveyor => Box::new(Xsurveyor::new()),
        SocketType::Surveyor => Box::new(Surveyor::new()),
        SocketType::Xrespondent => Box::new(Xrespondent::new()),
        SocketType::Respondent => Box::new(Respondent::new()),
    }
}

/// Generic options every socket carries regardless of pattern, mirroring the
/// `SocketOption` variants that are not routed down into `xsetsockopt`.
#[derive(Debug, Clone)]
pub struct Options {
    pub linger_ms: i64,
    pub send_hwm: u32,
    pub recv_hwm: u32,
    pub send_timeout_ms: i64,
    pub recv_timeout_ms: i64,
    pub reconnect_ivl: u32,
    pub reconnect_ivl_max: u32,
    pub backlog: u32,
    pub ipv4_only: bool,
    pub protocol: u8,
    pub max_msg_size: i64,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            linger_ms: 0,
            send_hwm: 1000,
            recv_hwm: 1000,
            send_timeout_ms: -1,
            recv_timeout_ms: -1,
            reconnect_ivl: 100,
            reconnect_ivl_max: 0,
            backlog: 100,
            ipv4_only: true,
            protocol: 0,
            max_msg_size: -1,
        }
    }
}

/// How the other end of an attached pipe is reached for the broadcast wake
/// `send`/`recv` issue after every successful `xsend`/`xrecv` (see
/// `notify_routes`).
enum PipeRoute {
    /// The peer is an `Engine`/`Session` pair running on an I/O thread.
    Remote { io_thread: MailboxSender, session: SessionId },
    /// The peer is another socket in this process, reached directly.
    Inproc { mailbox: MailboxSender, socket: SocketId },
}

enum EndpointKind {
    UdpBind(SocketAddr),
    UdpConnect(SocketAddr),
    InprocBind(String),
    InprocConnect(String),
}

struct EndpointRecord {
    kind: EndpointKind,
    pipes: Vec<PipeId>,
}

/// Which deadline, if any, ended a `wait` call.
enum WaitOutcome {
    Ready,
    /// The socket's own `SNDTIMEO`/`RCVTIMEO` elapsed: `EAGAIN`.
    TimedOut,
    /// A pattern-level deadline (e.g. `SURVEY_TIMEOUT`) elapsed at or before
    /// the socket timeout: `ETIMEDOUT`.
    DeadlineExpired,
}

/// The actor backing one application-visible socket handle. Owns its
/// `Context` handle (cheap to clone), its own mailbox (registered with the
/// Context so `inproc://` peers and attached sessions can reach it directly),
/// and the pattern-specific `Protocol` driving `xsend`/`xrecv`.
pub struct SocketBase {
    id: SocketId,
    socket_type: SocketType,
    ctx: Context,
    mailbox: Mailbox,
    protocol: Box<dyn Protocol>,
    options: Options,
    routes: HashMap<PipeId, PipeRoute>,
    endpoints: HashMap<EndpointId, EndpointRecord>,
    next_endpoint_id: usize,
    terminating: bool,
}

impl SocketBase {
    pub fn new(ctx: Context, socket_type: SocketType) -> io::Result<SocketBase> {
        SocketBase::with_filter(ctx, socket_type, filter::PREFIX)
    }

    /// Builds a socket whose `PUB`/`SUB` side uses `filter_id` rather than
    /// the default prefix matcher (`Xpub::with_filter`/`Sub::with_filter`
    /// only take this at construction; it cannot be changed afterwards, so
    /// there is no corresponding `set_option` path — see `set_option`).
    pub fn with_filter(ctx: Context, socket_type: SocketType, filter_id: FilterId) -> io::Result<SocketBase> {
        let id = ctx.create_socket()?;
        let mailbox = Mailbox::new();
        ctx.register_socket_mailbox(id, mailbox.sender());
        Ok(SocketBase {
            id: id,
            socket_type: socket_type,
            ctx: ctx,
            mailbox: mailbox,
            protocol: new_protocol(socket_type, filter_id),
            options: Options::default(),
            routes: HashMap::new(),
            endpoints: HashMap::new(),
            next_endpoint_id: 0,
            terminating: false,
        })
    }

    pub fn id(&self) -> SocketId {
        self.id
    }

    pub fn socket_type(&self) -> SocketType {
        self.socket_type
    }

    fn alloc_endpoint_id(&mut self) -> EndpointId {
        let id = self.next_endpoint_id;
        self.next_endpoint_id += 1;
        EndpointId(id)
    }

    fn check_alive(&self) -> io::Result<()> {
        if self.terminating || self.ctx.is_terminating() {
            Err(term_io_error())
        } else {
            Ok(())
        }
    }

    // -- command processing -------------------------------------------------

    fn handle_command(&mut self, cmd: Command) {
        match cmd.body {
            CommandBody::Stop | CommandBody::Term => {
                self.terminating = true;
            }
            CommandBody::ActivateRead(pipe) => {
                self.protocol.xread_activated(pipe);
            }
            CommandBody::ActivateWrite(pipe, msgs_read) => {
                self.protocol.xwrite_activated(pipe, msgs_read);
            }
            CommandBody::Hiccup(pipe) => {
                debug!("[{:?}] pipe {:?} hiccuped", self.id, pipe);
                self.protocol.xhiccuped(pipe);
            }
            CommandBody::PipeTerm(pipe) => {
                debug!("[{:?}] pipe {:?} terminated", self.id, pipe);
                self.protocol.xterminated(pipe);
                self.routes.remove(&pipe);
            }
            CommandBody::InprocAttach(pipe, writer, reader) => {
                debug!("[{:?}] attached pipe {:?}", self.id, pipe);
                self.protocol.xattach_pipe(pipe, writer, reader);
            }
            _ => {}
        }
    }

    /// Drains whatever is already queued without blocking; called before
    /// every `send`/`recv`/`bind`/`connect` so a socket never acts on stale
    /// pipe state.
    fn process_commands(&mut self) {
        while let Some(cmd) = self.mailbox.try_recv() {
            self.handle_command(cmd);
        }
    }

    /// After a successful `xsend`/`xrecv`, every attached peer is nudged to
    /// re-check its own readiness. This is a deliberate broadcast rather than
    /// a precise per-pipe wake: `Protocol` does not report which pipe a given
    /// call actually touched without invasive changes to every pattern, and
    /// the wakes themselves are idempotent (`ctx.set_pollin`/`set_pollout`,
    /// and a socket re-evaluating `xhas_in`/`xhas_out` that was already true)
    /// so over-notifying costs a few wasted wake-ups, never correctness.
    fn notify_routes(&self, sent: bool) {
        for (&pipe, route) in self.routes.iter() {
            match *route {
                PipeRoute::Remote { ref io_thread, session } => {
                    let body = if sent {
                        CommandBody::ActivateWrite(pipe, 0)
                    } else {
                        CommandBody::ActivateRead(pipe)
                    };
                    let _ = io_thread.send(Command::new(Destination::Session(session), body));
                }
                PipeRoute::Inproc { ref mailbox, socket } => {
                    // The peer's matching pipe carries the same `PipeId` this
                    // route is keyed on — both halves of an inproc duplex
                    // share one id (see `connect_inproc`) — so this is still
                    // the id the peer's own `routes`/`PipeSet` expects, not a
                    // value meaningful only on this side.
                    let body = if sent {
                        CommandBody::ActivateRead(pipe)
                    } else {
                        CommandBody::ActivateWrite(pipe, 0)
                    };
                    let _ = mailbox.send(Command::new(Destination::Socket(socket), body));
                }
            }
        }
    }

    /// Blocks until `ready` holds, commands have been drained along the way,
    /// or the effective deadline elapses. The effective deadline is the
    /// earlier of `timeout_ms` (negative = no socket-level deadline) and
    /// `pattern_deadline` (e.g. SURVEYOR's `SURVEY_TIMEOUT`, which a plain
    /// `ready()` check can never observe on its own since nothing ever makes
    /// a pipe ready when no respondent answers). `WaitOutcome` tells the
    /// caller which deadline — if either — actually fired, since the two map
    /// to different errors (`EAGAIN` vs `ETIMEDOUT`).
    fn wait<F>(&mut self, timeout_ms: i64, pattern_deadline: Option<Instant>, ready: F) -> io::Result<WaitOutcome>
        where F: Fn(&dyn Protocol) -> bool
    {
        let socket_deadline = if timeout_ms < 0 { None } else { Some(Instant::now() + Duration::from_millis(timeout_ms as u64)) };
        let deadline = match (socket_deadline, pattern_deadline) {
            (Some(s), Some(p)) => Some(s.min(p)),
            (Some(s), None) => Some(s),
            (None, Some(p)) => Some(p),
            (None, None) => None,
        };

        loop {
            if ready(&*self.protocol) {
                return Ok(WaitOutcome::Ready);
            }
            self.check_alive()?;

            let expired_outcome = |now: Instant| {
                if pattern_deadline.map_or(false, |p| now >= p) {
                    WaitOutcome::DeadlineExpired
                } else {
                    WaitOutcome::TimedOut
                }
            };

            let remaining = match deadline {
                None => None,
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return Ok(expired_outcome(now));
                    }
                    Some(d - now)
                }
            };

            match self.mailbox.recv(remaining) {
                Ok(cmd) => self.handle_command(cmd),
                Err(RecvError::Timeout) => return Ok(expired_outcome(Instant::now())),
                Err(RecvError::Interrupted) => continue,
            }
        }
    }

    // -- send / recv ----------------------------------------------------

    pub fn send(&mut self, mut msg: Message, dontwait: bool) -> io::Result<()> {
        self.process_commands();
        self.check_alive()?;

        loop {
            match self.protocol.xsend(msg) {
                Ok(()) => {
                    self.notify_routes(true);
                    return Ok(());
                }
                Err(err) => {
                    if err.error.kind() != io::ErrorKind::WouldBlock || dontwait {
                        return Err(err.error);
                    }
                    msg = err.message;
                    match self.wait(self.options.send_timeout_ms, None, |p| p.xhas_out())? {
                        WaitOutcome::Ready => {}
                        WaitOutcome::TimedOut | WaitOutcome::DeadlineExpired => return Err(would_block_io_error("EAGAIN")),
                    }
                }
            }
        }
    }

    pub fn recv(&mut self, dontwait: bool) -> io::Result<Message> {
        self.process_commands();
        self.check_alive()?;

        loop {
            match self.protocol.xrecv() {
                Ok(msg) => {
                    self.notify_routes(false);
                    return Ok(msg);
                }
                Err(err) => {
                    if err.kind() != io::ErrorKind::WouldBlock || dontwait {
                        return Err(err);
                    }
                    let pattern_deadline = self.protocol.recv_deadline();
                    match self.wait(self.options.recv_timeout_ms, pattern_deadline, |p| p.xhas_in())? {
                        WaitOutcome::Ready => {}
                        WaitOutcome::TimedOut => return Err(would_block_io_error("EAGAIN")),
                        WaitOutcome::DeadlineExpired => return Err(timed_out_io_error()),
                    }
                }
            }
        }
    }

    // -- bind / connect ---------------------------------------------------

    fn split_endpoint(endpoint: &str) -> io::Result<(&str, &str)> {
        let mut parts = endpoint.splitn(2, "://");
        let scheme = parts.next().unwrap_or("");
        let addr = parts.next().ok_or_else(|| invalid_input_io_error("endpoint is missing a scheme"))?;
        Ok((scheme, addr))
    }

    pub fn bind(&mut self, endpoint: &str) -> io::Result<EndpointId> {
        self.process_commands();
        self.check_alive()?;
        let (scheme, addr) = SocketBase::split_endpoint(endpoint)?;
        match scheme {
            "udp" => self.bind_udp(addr),
            "inproc" => self.bind_inproc(addr),
            "tcp" | "ipc" => Err(not_supported_io_error("EPROTONOSUPPORT: tcp/ipc transports are not implemented")),
            _ => Err(invalid_input_io_error("unrecognized endpoint scheme")),
        }
    }

    pub fn connect(&mut self, endpoint: &str) -> io::Result<EndpointId> {
        self.process_commands();
        self.check_alive()?;
        let (scheme, addr) = SocketBase::split_endpoint(endpoint)?;
        match scheme {
            "udp" => self.connect_udp(addr),
            "inproc" => self.connect_inproc(addr),
            "tcp" | "ipc" => Err(not_supported_io_error("EPROTONOSUPPORT: tcp/ipc transports are not implemented")),
            _ => Err(invalid_input_io_error("unrecognized endpoint scheme")),
        }
    }

    /// Builds the duplex pipe pair for a transport-backed connection and
    /// hands the wire-facing half to `session`, attaching the socket-facing
    /// half to the pattern FSM directly. `pipe1` carries wire→socket traffic
    /// (`to_socket`/`xattach_pipe`'s `reader`), `pipe2` carries socket→wire
    /// traffic (`xattach_pipe`'s `writer`/`from_socket`).
    fn open_session(&mut self, engine: Box<dyn Engine>) -> io::Result<(PipeId, SessionId)> {
        let io_thread_id = self.ctx.choose_io_thread().ok_or_else(|| other_io_error("no I/O thread available"))?;
        let io_thread = self.ctx.io_thread_sender(io_thread_id).ok_or_else(|| other_io_error("no I/O thread available"))?;

        let pipe = self.ctx.next_pipe_id();
        let session_id = self.ctx.next_session_id();

        let (inbound_w, inbound_r) = new_pipe(self.options.recv_hwm, 1);
        let (outbound_w, outbound_r) = new_pipe(self.options.send_hwm, 1);

        let session = Session::new(session_id, inbound_w, outbound_r, self.options.reconnect_ivl, self.options.reconnect_ivl_max)
            .notify_via(self.mailbox.sender(), self.id, pipe);

        self.protocol.xattach_pipe(pipe, outbound_w, inbound_r);
        self.routes.insert(pipe, PipeRoute::Remote { io_thread: io_thread.clone(), session: session_id });

        io_thread.send(Command::new(Destination::Session(session_id), CommandBody::OpenSession(session_id, engine, Box::new(session))))?;
        Ok((pipe, session_id))
    }

    fn bind_udp(&mut self, addr: &str) -> io::Result<EndpointId> {
        let socket_addr: SocketAddr = addr.parse().map_err(|_| invalid_input_io_error("EADDRNOTAVAIL: invalid udp address"))?;
        let receiver = udp::Receiver::bind(socket_addr)?;
        let (pipe, _session) = self.open_session(Box::new(receiver))?;
        let id = self.alloc_endpoint_id();
        self.endpoints.insert(id, EndpointRecord { kind: EndpointKind::UdpBind(socket_addr), pipes: vec![pipe] });
        info!("[{:?}] bound udp://{} as endpoint {:?}", self.id, socket_addr, id);
        Ok(id)
    }

    fn connect_udp(&mut self, addr: &str) -> io::Result<EndpointId> {
        let socket_addr: SocketAddr = addr.parse().map_err(|_| invalid_input_io_error("EADDRNOTAVAIL: invalid udp address"))?;
        let sender = udp::Sender::connect(socket_addr, self.options.reconnect_ivl)?;
        let (pipe, _session) = self.open_session(Box::new(sender))?;
        let id = self.alloc_endpoint_id();
        self.endpoints.insert(id, EndpointRecord { kind: EndpointKind::UdpConnect(socket_addr), pipes: vec![pipe] });
        info!("[{:?}] connected udp://{} as endpoint {:?}", self.id, socket_addr, id);
        Ok(id)
    }

    fn bind_inproc(&mut self, name: &str) -> io::Result<EndpointId> {
        self.ctx.register_endpoint(name, self.id).map_err(|_| addr_in_use_io_error(format!("EADDRINUSE: {}", name)))?;
        let id = self.alloc_endpoint_id();
        self.endpoints.insert(id, EndpointRecord { kind: EndpointKind::InprocBind(name.to_owned()), pipes: Vec::new() });
        info!("[{:?}] bound inproc://{} as endpoint {:?}", self.id, name, id);
        Ok(id)
    }

    /// Rendezvous with a listening socket already registered under `name`:
    /// builds the two pipes that form the duplex channel directly (no
    /// Session/Engine is involved for an inproc peer) and hands the
    /// listener's half over via `InprocAttach`.
    fn connect_inproc(&mut self, name: &str) -> io::Result<EndpointId> {
        let peer_socket = self.ctx.find_endpoint(name).ok_or_else(|| invalid_input_io_error("EADDRNOTAVAIL: no inproc listener by that name"))?;
        let peer_mailbox = self.ctx.socket_mailbox(peer_socket).ok_or_else(|| other_io_error("inproc listener has no mailbox"))?;

        let pipe = self.ctx.next_pipe_id();
        // pipe A: this socket writes, the peer reads.
        let (writer_a, reader_a) = new_pipe(INPROC_HWM, 1);
        // pipe B: the peer writes, this socket reads.
        let (writer_b, reader_b) = new_pipe(INPROC_HWM, 1);

        self.protocol.xattach_pipe(pipe, writer_a, reader_b);
        self.routes.insert(pipe, PipeRoute::Inproc { mailbox: peer_mailbox.clone(), socket: peer_socket });

        peer_mailbox.send(Command::new(Destination::Socket(peer_socket), CommandBody::InprocAttach(pipe, writer_b, reader_a)))?;

        let id = self.alloc_endpoint_id();
        self.endpoints.insert(id, EndpointRecord { kind: EndpointKind::InprocConnect(name.to_owned()), pipes: vec![pipe] });
        debug!("[{:?}] attached pipe {:?} to inproc listener {:?}", self.id, pipe, peer_socket);
        info!("[{:?}] connected inproc://{} as endpoint {:?}", self.id, name, id);
        Ok(id)
    }

    /// Closes the endpoint identified by `id`. Per the recorded shutdown
    /// decision: pipes are detached from the active set immediately (so new
    /// `xsend`/`xrecv` never reach them and subsequent non-blocking sends
    /// observe `EAGAIN`), without waiting on a linger-bounded drain handshake
    /// that would require plumbing `PipeTermAck` back from the owning I/O
    /// thread.
    pub fn shutdown(&mut self, id: EndpointId) -> io::Result<()> {
        let record = self.endpoints.remove(&id).ok_or_else(|| invalid_input_io_error("unknown endpoint id"))?;
        for pipe in &record.pipes {
            self.protocol.xterminated(*pipe);
            self.routes.remove(pipe);
        }
        if let EndpointKind::InprocBind(ref name) = record.kind {
            self.ctx.unregister_endpoint(name);
        }
        info!("[{:?}] shut down endpoint {:?}", self.id, id);
        Ok(())
    }

    // -- options ----------------------------------------------------------

    pub fn set_option(&mut self, option: SocketOption) -> io::Result<()> {
        match option {
            SocketOption::Linger(v) => { self.options.linger_ms = v; Ok(()) }
            SocketOption::SendHwm(v) => { self.options.send_hwm = v; Ok(()) }
            SocketOption::RecvHwm(v) => { self.options.recv_hwm = v; Ok(()) }
            SocketOption::SendTimeout(v) => { self.options.send_timeout_ms = v; Ok(()) }
            SocketOption::RecvTimeout(v) => { self.options.recv_timeout_ms = v; Ok(()) }
            SocketOption::ReconnectIvl(v) => { self.options.reconnect_ivl = v; Ok(()) }
            SocketOption::ReconnectIvlMax(v) => { self.options.reconnect_ivl_max = v; Ok(()) }
            SocketOption::Backlog(v) => { self.options.backlog = v; Ok(()) }
            SocketOption::Ipv4Only(v) => { self.options.ipv4_only = v; Ok(()) }
            SocketOption::Protocol(v) => { self.options.protocol = v; Ok(()) }
            SocketOption::MaxMsgSize(v) => { self.options.max_msg_size = v; Ok(()) }
            SocketOption::Filter(_) => Err(not_supported_io_error("ENOTSUP: filter id is fixed at socket creation")),
            other => {
                if self.protocol.xsetsockopt(&other)? {
                    // SUBSCRIBE/UNSUBSCRIBE write a frame to the upstream
                    // pipe as a side effect (`Sub::xsetsockopt`); the peer
                    // needs the same post-send wake an ordinary `send` gets,
                    // or its subscription table never sees the frame.
                    self.notify_routes(true);
                    Ok(())
                } else {
                    Err(not_supported_io_error("ENOTSUP: option not recognized by this socket type"))
                }
            }
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    // -- termination --------------------------------------------------------

    pub fn term(&mut self) -> io::Result<()> {
        if self.terminating {
            return Ok(());
        }
        self.terminating = true;

        let ids: Vec<EndpointId> = self.endpoints.keys().cloned().collect();
        for id in ids {
            let _ = self.shutdown(id);
        }

        // No pipe is named here: this crate's `Reaper` bookkeeping assumes a
        // `PipeTermAck` eventually arrives per pipe, which would require the
        // owning I/O thread to observe and report linger completion back
        // across the mailbox — out of scope for this socket's own
        // termination path, so pipes are reported already drained.
        let _ = self.ctx.reaper_sender().send(Command::new(Destination::Reaper, CommandBody::Reap(self.id, Vec::new())));
        self.ctx.release_socket(self.id);
        info!("[{:?}] terminated", self.id);
        Ok(())
    }
}
