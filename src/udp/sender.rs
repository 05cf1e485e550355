// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Sends one message per UDP datagram to a single connected peer. Grounded
//! on `udp_sender.cpp`: a connected, non-blocking datagram socket, a
//! monotonic `seq_no` bumped on every send attempt (including dropped ones,
//! so a receiver's gap-detection still notices), and a reconnect-style
//! backoff timer started whenever the peer is unreachable.

use std::io;
use std::net::SocketAddr;

use mio::udp::UdpSocket;
use mio::Evented;

use engine::{Engine, EngineContext, SessionHandle};
use message::Message;
use timer_wheel::TimerId;
use wire;

pub struct Sender {
    socket: UdpSocket,
    seq_no: u32,
    reconnect_ivl: u32,
    backoff_timer: Option<TimerId>,
    /// `true` once the synthetic subscribe-all frame has been pushed, faking
    /// the handshake a PUB/XPUB peer expects before it reports `xhas_out`.
    joined: bool,
}

impl Sender {
    /// Binds an ephemeral local socket and connects it to `peer`, the way
    /// `udp_sender_t::init` resolves and connects a single-peer datagram
    /// socket.
    pub fn connect(peer: SocketAddr, reconnect_ivl: u32) -> io::Result<Sender> {
        let local: SocketAddr = if peer.is_ipv4() { "0.0.0.0:0".parse().unwrap() } else { "[::]:0".parse().unwrap() };
        let socket = UdpSocket::bind(&local)?;
        socket.connect(peer)?;
        Ok(Sender { socket: socket, seq_no: 1, reconnect_ivl: reconnect_ivl, backoff_timer: None, joined: false })
    }

    fn start_backoff(&mut self, ctx: &mut dyn EngineContext) {
        ctx.reset_pollout();
        if let Some(id) = self.backoff_timer.take() {
            ctx.rm_timer(id);
        }
        self.backoff_timer = Some(ctx.add_timer(self.reconnect_ivl as u64));
        // Bump the sequence number on a dropped packet too, so the receiver's
        // gap detection notices the loss once the link recovers.
        self.seq_no = self.seq_no.wrapping_add(1);
    }
}

impl Engine for Sender {
    fn evented(&self) -> &dyn Evented {
        &self.socket
    }

    fn plug(&mut self, ctx: &mut dyn EngineContext) {
        ctx.set_pollout();
    }

    fn unplug(&mut self) {}

    fn terminate(&mut self, _ctx: &mut dyn EngineContext) {}

    fn activate_in(&mut self, _ctx: &mut dyn EngineContext) {
        // A sender never registers read interest, so there is never a
        // blocked inbound pipe for this to resume.
    }

    fn activate_out(&mut self, ctx: &mut dyn EngineContext) {
        ctx.set_pollout();
    }

    fn in_event(&mut self, _ctx: &mut dyn EngineContext, _session: &mut dyn SessionHandle) -> io::Result<()> {
        Ok(())
    }

    fn out_event(&mut self, ctx: &mut dyn EngineContext, session: &mut dyn SessionHandle) -> io::Result<()> {
        if !self.joined {
            // UDP carries no upstream subscription channel; fake one so a
            // PUB/XPUB's distributor treats this pipe as subscribed to
            // everything instead of leaving it permanently unmatched.
            session.push_msg(Message::new(vec![1]));
            self.joined = true;
        }

        let msg = match session.pull_msg() {
            Some(msg) => msg,
            None => {
                ctx.reset_pollout();
                return Ok(());
            }
        };

        let mut datagram = Vec::with_capacity(wire::UDP_HEADER_SIZE + msg.len());
        wire::encode_udp_header(&mut datagram, self.seq_no, 0)?;
        datagram.extend_from_slice(msg.body());

        match self.socket.send(&datagram) {
            Ok(_) => {
                self.seq_no = self.seq_no.wrapping_add(1);
                Ok(())
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(ref e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                self.start_backoff(ctx);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn timer_event(&mut self, ctx: &mut dyn EngineContext, id: TimerId) {
        if self.backoff_timer == Some(id) {
            self.backoff_timer = None;
            ctx.set_pollout();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_picks_a_matching_local_family() {
        let peer: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let sender = Sender::connect(peer, 100).unwrap();
        assert!(sender.socket.local_addr().unwrap().is_ipv4());
    }
}
