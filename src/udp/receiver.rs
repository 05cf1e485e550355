// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Receives one message per UDP datagram on an unconnected, bound socket.
//! Grounded on `udp_receiver.cpp`: a `last_seq_no` of zero means the socket
//! hasn't joined a stream yet; `offset` marks where a message boundary
//! starts within the datagram, with `UDP_NO_BOUNDARY` meaning "no boundary
//! here" — a receiver can only join, or rejoin after a gap, on a datagram
//! that carries a real boundary. An in-sequence datagram is delivered
//! normally; one at or behind `last_seq_no` is stale and dropped; a gap
//! resyncs instead of delivering.

use std::io;
use std::net::SocketAddr;

use mio::udp::UdpSocket;
use mio::Evented;

use engine::{Engine, EngineContext, SessionHandle};
use message::Message;
use timer_wheel::TimerId;
use wire;

/// Single-datagram receive buffer; large enough for any UDP payload that
/// hasn't been fragmented by IP itself.
const BUF_SIZE: usize = 8192;

pub struct Receiver {
    socket: UdpSocket,
    last_seq_no: u32,
    buf: [u8; BUF_SIZE],
}

impl Receiver {
    /// Binds to `addr` for multicast-free point-to-multipoint reception, the
    /// way `udp_receiver_t::init` sets up its unconnected socket.
    pub fn bind(addr: SocketAddr) -> io::Result<Receiver> {
        let socket = UdpSocket::bind(&addr)?;
        Ok(Receiver { socket: socket, last_seq_no: 0, buf: [0; BUF_SIZE] })
    }

    /// `true` once a datagram has joined the stream, i.e. `last_seq_no` has
    /// been set from a packet carrying a usable boundary.
    fn joined(&self) -> bool {
        self.last_seq_no != 0
    }

    /// A datagram can (re)join the stream only if it carries a real message
    /// boundary; `UDP_NO_BOUNDARY` means the datagram is a pure continuation
    /// with nothing this reference engine, carrying one message per
    /// datagram, could usefully start decoding from.
    fn can_join(offset: u16) -> bool {
        offset != wire::UDP_NO_BOUNDARY
    }

    fn decode(&self, n: usize) -> io::Result<Option<(u32, u16, Message)>> {
        if n < wire::UDP_HEADER_SIZE {
            return Ok(None);
        }
        let (seq_no, offset) = wire::decode_udp_header(&self.buf[..n])?;
        let body = self.buf[wire::UDP_HEADER_SIZE..n].to_vec();
        Ok(Some((seq_no, offset, Message::new(body))))
    }
}

impl Engine for Receiver {
    fn evented(&self) -> &dyn Evented {
        &self.socket
    }

    fn plug(&mut self, ctx: &mut dyn EngineContext) {
        ctx.set_pollin();
    }

    fn unplug(&mut self) {}

    fn terminate(&mut self, _ctx: &mut dyn EngineContext) {}

    fn activate_in(&mut self, ctx: &mut dyn EngineContext) {
        // The session has room again; resume reading. Unlike the original's
        // byte-level decoder, this engine never holds a half-delivered
        // message across calls, so there's nothing to replay here.
        ctx.set_pollin();
    }

    fn activate_out(&mut self, _ctx: &mut dyn EngineContext) {
        // A receiver never queues outbound messages.
    }

    fn in_event(&mut self, ctx: &mut dyn EngineContext, session: &mut dyn SessionHandle) -> io::Result<()> {
        loop {
            let n = match self.socket.recv_from(&mut self.buf) {
                Ok(Some((n, _from))) => n,
                Ok(None) => return Ok(()),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            };

            let (seq_no, offset, msg) = match self.decode(n)? {
                Some(decoded) => decoded,
                None => continue,
            };

            if !self.joined() {
                if !Receiver::can_join(offset) {
                    continue;
                }
            } else if seq_no == self.last_seq_no.wrapping_add(1) {
                // In sequence; fall through to delivery.
            } else if seq_no <= self.last_seq_no {
                // Stale or duplicate; drop.
                continue;
            } else if !Receiver::can_join(offset) {
                // Gap, but this datagram can't restart the stream either.
                self.last_seq_no = 0;
                continue;
            }

            self.last_seq_no = seq_no;

            if !session.push_msg(msg) {
                // No room downstream; stop polling until `activate_in`.
                ctx.reset_pollin();
                return Ok(());
            }
        }
    }

    fn out_event(&mut self, _ctx: &mut dyn EngineContext, _session: &mut dyn SessionHandle) -> io::Result<()> {
        Ok(())
    }

    fn timer_event(&mut self, _ctx: &mut dyn EngineContext, _id: TimerId) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_a_real_boundary_can_join_the_stream() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let receiver = Receiver::bind(addr).unwrap();
        assert!(!receiver.joined());
        assert!(!Receiver::can_join(wire::UDP_NO_BOUNDARY));
        assert!(Receiver::can_join(0));
    }

    #[test]
    fn decode_rejects_short_datagrams() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let mut receiver = Receiver::bind(addr).unwrap();
        receiver.buf[0] = 0;
        let decoded = receiver.decode(3).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn decode_splits_header_from_body() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let mut receiver = Receiver::bind(addr).unwrap();
        let mut datagram = Vec::new();
        wire::encode_udp_header(&mut datagram, 7, 0).unwrap();
        datagram.extend_from_slice(b"hello");
        receiver.buf[..datagram.len()].copy_from_slice(&datagram);

        let (seq_no, offset, msg) = receiver.decode(datagram.len()).unwrap().unwrap();
        assert_eq!(seq_no, 7);
        assert_eq!(offset, 0);
        assert_eq!(msg.body(), b"hello");
    }
}
