// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Raw reply socket: on receive, prepends a 4-byte peer-identity frame naming
//! the pipe a request arrived on; on send, consumes that same identity frame
//! as a routing key picking which pipe to reply on. No FSM of its own —
//! generalized from `req.cpp`'s session-side envelope discipline, since the
//! pack ships no dedicated `rep.cpp`/`xrep.cpp`.

use std::io;

use byteorder::{BigEndian, ByteOrder};

use command::PipeId;
use fq::FairQueue;
use global::{fsm_io_error, would_block_io_error, SocketOption};
use message::{Message, FLAG_MORE};
use patterns::{PipeSet, Protocol, SendError};
use pipe::{PipeReader, PipeWriter};

fn encode_identity(id: PipeId) -> Vec<u8> {
    let mut bytes = vec![0u8; 4];
    BigEndian::write_u32(&mut bytes, id.0 as u32);
    bytes
}

fn decode_identity(body: &[u8]) -> Option<PipeId> {
    if body.len() != 4 {
        return None;
    }
    Some(PipeId(BigEndian::read_u32(body) as usize))
}

pub struct Xrep {
    pipes: PipeSet<()>,
    fq: FairQueue,
    /// `true` when the next `xrecv` must start a fresh inbound message (so it
    /// injects an identity frame before returning any of the peer's own parts).
    awaiting_identity_out: bool,
    pending_body: Option<Message>,
    /// `true` when the next `xsend` is expected to be the identity/routing frame.
    expecting_route: bool,
    route: Option<PipeId>,
}

impl Xrep {
    pub fn new() -> Xrep {
        Xrep {
            pipes: PipeSet::new(),
            fq: FairQueue::new(),
            awaiting_identity_out: true,
            pending_body: None,
            expecting_route: true,
            route: None,
        }
    }
}

impl Default for Xrep {
    fn default() -> Self {
        Xrep::new()
    }
}

impl Protocol for Xrep {
    fn xsend(&mut self, msg: Message) -> Result<(), SendError> {
        if self.expecting_route {
            if !msg.has_more() {
                return Err(SendError::new(fsm_io_error("identity frame must be followed by a body"), msg));
            }
            let route = match decode_identity(msg.body()) {
                Some(route) => route,
                None => return Err(SendError::new(fsm_io_error("malformed identity frame"), msg)),
            };
            self.route = Some(route);
            self.expecting_route = false;
            return Ok(());
        }

        let more = msg.has_more();
        let route = match self.route {
            Some(id) => id,
            None => return Err(SendError::new(fsm_io_error("no route selected for reply"), msg)),
        };
        let has_credit = self.pipes.get(route).map_or(false, |s| s.writer.has_credit());
        if !has_credit {
            return Err(SendError::new(would_block_io_error("reply pipe has no credit"), msg));
        }
        let slot = self.pipes.get_mut(route).expect("checked has_credit above");
        if !slot.writer.write(msg) {
            return Err(SendError::new(would_block_io_error("reply pipe has no credit"), Message::empty()));
        }
        slot.writer.flush();

        if !more {
            self.expecting_route = true;
            self.route = None;
        }
        Ok(())
    }

    fn xrecv(&mut self) -> io::Result<Message> {
        if self.awaiting_identity_out {
            let msg = self.fq.recv(&mut self.pipes)?;
            let id = self.fq.last_id().expect("fair queue just served a message");
            self.pending_body = Some(msg);
            self.awaiting_identity_out = false;
            return Ok(Message::with_flags(encode_identity(id), FLAG_MORE));
        }

        if let Some(body) = self.pending_body.take() {
            if !body.has_more() {
                self.awaiting_identity_out = true;
            }
            return Ok(body);
        }

        let msg = self.fq.recv(&mut self.pipes)?;
        if !msg.has_more() {
            self.awaiting_identity_out = true;
        }
        Ok(msg)
    }

    fn xhas_in(&self) -> bool {
        self.pending_body.is_some() || self.fq.has_in(&self.pipes)
    }

    fn xhas_out(&self) -> bool {
        match self.route {
            Some(id) => self.pipes.get(id).map_or(false, |s| s.writer.has_credit()),
            None => self.pipes.iter().any(|(_, slot)| slot.writer.has_credit()),
        }
    }

    fn xsetsockopt(&mut self, _option: &SocketOption) -> io::Result<bool> {
        Ok(false)
    }

    fn xattach_pipe(&mut self, pipe: PipeId, writer: PipeWriter, reader: PipeReader) {
        self.pipes.attach(pipe, writer, reader, ());
    }

    fn xread_activated(&mut self, _pipe: PipeId) {}

    fn xwrite_activated(&mut self, pipe: PipeId, msgs_read: u64) {
        if let Some(slot) = self.pipes.get_mut(pipe) {
            slot.writer.on_activate_write(msgs_read);
        }
    }

    fn xhiccuped(&mut self, _pipe: PipeId) {}

    fn xterminated(&mut self, pipe: PipeId) {
        self.pipes.detach(pipe);
        if self.route == Some(pipe) {
            self.route = None;
            self.expecting_route = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipe::new_pipe;

    fn wire_up(xrep: &mut Xrep, id: PipeId) -> (PipeWriter, PipeReader) {
        let (out_writer, peer_reader) = new_pipe(4, 1);
        let (peer_writer, in_reader) = new_pipe(4, 1);
        xrep.xattach_pipe(id, out_writer, in_reader);
        (peer_writer, peer_reader)
    }

    #[test]
    fn recv_prepends_the_originating_pipe_identity() {
        let mut xrep = Xrep::new();
        let (mut peer_writer, _peer_reader) = wire_up(&mut xrep, PipeId(5));
        peer_writer.write(Message::new(vec![1]));
        peer_writer.flush();

        let identity = xrep.xrecv().unwrap();
        assert!(identity.has_more());
        assert_eq!(decode_identity(identity.body()), Some(PipeId(5)));
        assert_eq!(xrep.xrecv().unwrap().body(), &[1]);
    }

    #[test]
    fn send_routes_the_reply_back_to_the_named_pipe() {
        let mut xrep = Xrep::new();
        let (_peer_writer, mut peer_reader) = wire_up(&mut xrep, PipeId(2));

        xrep.xsend(Message::with_flags(encode_identity(PipeId(2)), FLAG_MORE)).unwrap();
        xrep.xsend(Message::new(vec![7])).unwrap();

        assert_eq!(peer_reader.read().unwrap().body(), &[7]);
    }

    #[test]
    fn reply_with_no_preceding_request_is_efsm() {
        let mut xrep = Xrep::new();
        let (_peer_writer, _peer_reader) = wire_up(&mut xrep, PipeId(0));

        let bad_identity = Message::new(vec![1]);
        assert!(xrep.xsend(bad_identity).is_err());
    }
}
