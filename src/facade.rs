// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The application-facing handle. Grounded on `socket_facade.rs`'s public
//! surface (`connect`/`bind`/`send`/`recv`/`set_option`, `Drop`-based
//! teardown) but simplified for this crate's direct-call `SocketBase`: the
//! teacher's facade posts a command across a channel and blocks on an event
//! receiver because its backend runs on a separate event-loop thread; here
//! `SocketBase` already blocks in-line on its own mailbox, so the facade is a
//! thin, `Drop`-terminating wrapper rather than a second request/reply leg.

use std::io;
use std::time::Duration;

use context::Context;
use global::{EndpointId, SocketId, SocketOption, SocketType};
use message::Message;
use socket::SocketBase;

/// An application-visible socket. Blocking `send`/`recv` by default; pass
/// `DONTWAIT` semantics via `send`/`recv`'s own non-blocking variants, or
/// lower `SNDTIMEO`/`RCVTIMEO` with `set_option`.
pub struct Socket {
    inner: SocketBase,
}

impl Socket {
    pub fn new(ctx: &Context, socket_type: SocketType) -> io::Result<Socket> {
        Ok(Socket { inner: SocketBase::new(ctx.clone(), socket_type)? })
    }

    /// As `new`, but selects a non-default subscription-matching plugin for
    /// `Pub`/`Sub` sockets (`filter::PREFIX`/`filter::TOPIC`).
    pub fn with_filter(ctx: &Context, socket_type: SocketType, filter_id: u16) -> io::Result<Socket> {
        Ok(Socket { inner: SocketBase::with_filter(ctx.clone(), socket_type, filter_id)? })
    }

    pub fn id(&self) -> SocketId {
        self.inner.id()
    }

    pub fn socket_type(&self) -> SocketType {
        self.inner.socket_type()
    }

    /// Binds a local endpoint (`inproc://name` or `udp://host:port`).
    /// Returns a handle later passed to `shutdown`.
    pub fn bind(&mut self, endpoint: &str) -> io::Result<EndpointId> {
        self.inner.bind(endpoint)
    }

    /// Connects to a remote endpoint already bound elsewhere.
    pub fn connect(&mut self, endpoint: &str) -> io::Result<EndpointId> {
        self.inner.connect(endpoint)
    }

    /// Closes a previously bound or connected endpoint.
    pub fn shutdown(&mut self, endpoint: EndpointId) -> io::Result<()> {
        self.inner.shutdown(endpoint)
    }

    pub fn send(&mut self, buffer: Vec<u8>) -> io::Result<()> {
        self.send_msg(Message::new(buffer))
    }

    pub fn send_msg(&mut self, msg: Message) -> io::Result<()> {
        self.inner.send(msg, false)
    }

    /// Non-blocking send: fails with `WouldBlock` instead of waiting on
    /// `SNDTIMEO` (the `DONTWAIT` flag).
    pub fn try_send(&mut self, msg: Message) -> io::Result<()> {
        self.inner.send(msg, true)
    }

    pub fn recv(&mut self) -> io::Result<Vec<u8>> {
        self.recv_msg().map(|msg| msg.into_body())
    }

    pub fn recv_msg(&mut self) -> io::Result<Message> {
        self.inner.recv(false)
    }

    /// Non-blocking receive: fails with `WouldBlock` instead of waiting on
    /// `RCVTIMEO` (the `DONTWAIT` flag).
    pub fn try_recv(&mut self) -> io::Result<Message> {
        self.inner.recv(true)
    }

    pub fn set_option(&mut self, option: SocketOption) -> io::Result<()> {
        self.inner.set_option(option)
    }

    pub fn set_send_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_option(SocketOption::SendTimeout(duration_to_millis(timeout)))
    }

    pub fn set_recv_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_option(SocketOption::RecvTimeout(duration_to_millis(timeout)))
    }

    #[doc(hidden)]
    pub fn matches(&self, other: &Socket) -> bool {
        self.socket_type().matches(other.socket_type())
    }

    /// Forwards one message from this socket to `other`, as a device/proxy
    /// would between a raw `Xsub` and a raw `Xpub`.
    #[doc(hidden)]
    pub fn forward_msg(&mut self, other: &mut Socket) -> io::Result<()> {
        let msg = self.recv_msg()?;
        other.send_msg(msg)
    }
}

fn duration_to_millis(d: Duration) -> i64 {
    (d.as_secs() as i64).saturating_mul(1000).saturating_add(i64::from(d.subsec_nanos()) / 1_000_000)
}

impl Drop for Socket {
    fn drop(&mut self) {
        let _ = self.inner.term();
    }
}

/// Opaque endpoint handle returned by `Socket::bind`/`Socket::connect` and
/// consumed by `Socket::shutdown`. A thin re-export so callers need not reach
/// into `global` directly.
pub type Endpoint = EndpointId;
