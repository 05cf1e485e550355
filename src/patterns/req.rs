// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Cooked request socket: wraps `Xreq` with the send/receive alternation FSM
//! and the request-id envelope. Grounded in `req.cpp`'s `req_t`: a request is
//! `[4-byte request-id, more][empty delimiter, more][body...]`; a reply must
//! echo the same id before its own empty delimiter, anything else (a stale
//! reply from a request this socket already abandoned) is drained and
//! discarded so `xrecv` never resurfaces it.

use std::io;

use byteorder::{BigEndian, ByteOrder};

use command::PipeId;
use global::{fsm_io_error, SocketOption};
use message::Message;
use patterns::xreq::Xreq;
use patterns::{Protocol, SendError};
use pipe::{PipeReader, PipeWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Sending,
    Receiving,
}

pub struct Req {
    base: Xreq,
    state: State,
    request_id: u32,
    /// Protocol v1 (0MQ/2.1 compatibility) carries no request-id frame at all,
    /// just the empty delimiter.
    framed: bool,
    /// `true` only for the first part of a request: the id-frame/delimiter
    /// envelope is emitted once per request, not once per `xsend` call, so a
    /// multipart request's later parts go out as plain body frames.
    message_begins: bool,
}

impl Req {
    pub fn new(seed: u32, framed: bool) -> Req {
        Req { base: Xreq::new(), state: State::Sending, request_id: seed, framed: framed, message_begins: true }
    }

    fn drain_reply(&mut self) -> io::Result<()> {
        loop {
            let part = self.base.xrecv()?;
            if !part.has_more() {
                return Ok(());
            }
        }
    }
}

impl Protocol for Req {
    fn xsend(&mut self, msg: Message) -> Result<(), SendError> {
        if self.state == State::Receiving {
            return Err(SendError::new(fsm_io_error("request already outstanding"), msg));
        }

        let more = msg.has_more();

        if self.message_begins {
            if self.framed {
                let mut id_bytes = [0u8; 4];
                BigEndian::write_u32(&mut id_bytes, self.request_id);
                let id_frame = Message::with_flags(id_bytes.to_vec(), ::message::FLAG_MORE);
                if let Err(e) = self.base.xsend(id_frame) {
                    return Err(SendError::new(e.error, msg));
                }
            }
            let delimiter = Message::with_flags(Vec::new(), ::message::FLAG_MORE);
            if let Err(e) = self.base.xsend(delimiter) {
                return Err(SendError::new(e.error, msg));
            }
            self.message_begins = false;
        }

        self.base.xsend(msg)?;

        if !more {
            self.state = State::Receiving;
        }
        Ok(())
    }

    fn xrecv(&mut self) -> io::Result<Message> {
        if self.state != State::Receiving {
            return Err(fsm_io_error("no request outstanding"));
        }

        loop {
            if self.framed {
                let id_part = self.base.xrecv()?;
                let matches = id_part.has_more() && id_part.len() == 4
                    && BigEndian::read_u32(id_part.body()) == self.request_id;
                if !matches {
                    if id_part.has_more() {
                        self.drain_reply()?;
                    }
                    continue;
                }
                self.request_id = self.request_id.wrapping_add(1);
            }

            let delimiter = self.base.xrecv()?;
            if !delimiter.has_more() || !delimiter.is_empty() {
                if delimiter.has_more() {
                    self.drain_reply()?;
                }
                continue;
            }

            let body = self.base.xrecv()?;
            if !body.has_more() {
                self.state = State::Sending;
                self.message_begins = true;
            } else {
                // Multipart reply bodies are passed through unchanged; the
                // caller keeps calling xrecv until `has_more()` is false.
            }
            return Ok(body);
        }
    }

    fn xhas_in(&self) -> bool {
        self.state == State::Receiving && self.base.xhas_in()
    }

    fn xhas_out(&self) -> bool {
        self.state == State::Sending && self.base.xhas_out()
    }

    fn xsetsockopt(&mut self, option: &SocketOption) -> io::Result<bool> {
        match *option {
            SocketOption::Protocol(v) => {
                self.framed = v != ::wire::PROTOCOL_LEGACY;
                Ok(true)
            }
            _ => self.base.xsetsockopt(option),
        }
    }

    fn xattach_pipe(&mut self, pipe: PipeId, writer: PipeWriter, reader: PipeReader) {
        self.base.xattach_pipe(pipe, writer, reader);
    }

    fn xread_activated(&mut self, pipe: PipeId) {
        self.base.xread_activated(pipe);
    }

    fn xwrite_activated(&mut self, pipe: PipeId, msgs_read: u64) {
        self.base.xwrite_activated(pipe, msgs_read);
    }

    fn xhiccuped(&mut self, pipe: PipeId) {
        self.base.xhiccuped(pipe);
    }

    fn xterminated(&mut self, pipe: PipeId) {
        self.base.xterminated(pipe);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipe::new_pipe;

    fn wire_up(req: &mut Req) -> (PipeWriter, ::pipe::PipeReader) {
        let (out_writer, peer_reader) = new_pipe(4, 1);
        let (peer_writer, in_reader) = new_pipe(4, 1);
        req.xattach_pipe(PipeId(0), out_writer, in_reader);
        (peer_writer, peer_reader)
    }

    #[test]
    fn second_send_before_reply_is_efsm() {
        let mut req = Req::new(1, true);
        let (_peer_writer, _peer_reader) = wire_up(&mut req);

        req.xsend(Message::new(vec![1])).unwrap();
        assert!(req.xsend(Message::new(vec![2])).is_err());
    }

    #[test]
    fn matching_reply_is_delivered_and_unblocks_sending() {
        let mut req = Req::new(7, true);
        let (mut peer_writer, mut peer_reader) = wire_up(&mut req);

        req.xsend(Message::new(vec![42])).unwrap();

        // Drain what the socket sent: id frame, delimiter, body.
        let id_frame = peer_reader.read().unwrap();
        assert_eq!(BigEndian::read_u32(id_frame.body()), 7);
        peer_reader.read().unwrap();
        assert_eq!(peer_reader.read().unwrap().body(), &[42]);

        // Reply with the same id.
        let mut id_bytes = [0u8; 4];
        BigEndian::write_u32(&mut id_bytes, 7);
        peer_writer.write(Message::with_flags(id_bytes.to_vec(), ::message::FLAG_MORE));
        peer_writer.write(Message::with_flags(Vec::new(), ::message::FLAG_MORE));
        peer_writer.write(Message::new(vec![99]));
        peer_writer.flush();

        assert_eq!(req.xrecv().unwrap().body(), &[99]);
        assert!(req.xhas_out());
    }

    #[test]
    fn multipart_request_emits_the_envelope_only_once() {
        let mut req = Req::new(4, true);
        let (_peer_writer, mut peer_reader) = wire_up(&mut req);

        req.xsend(Message::with_flags(vec![1], ::message::FLAG_MORE)).unwrap();
        req.xsend(Message::new(vec![2])).unwrap();

        let id_frame = peer_reader.read().unwrap();
        assert!(id_frame.has_more());
        assert_eq!(BigEndian::read_u32(id_frame.body()), 4);

        let delimiter = peer_reader.read().unwrap();
        assert!(delimiter.has_more());
        assert!(delimiter.is_empty());

        let part1 = peer_reader.read().unwrap();
        assert!(part1.has_more());
        assert_eq!(part1.body(), &[1]);

        let part2 = peer_reader.read().unwrap();
        assert!(!part2.has_more());
        assert_eq!(part2.body(), &[2]);
    }

    #[test]
    fn stale_reply_is_discarded() {
        let mut req = Req::new(3, true);
        let (mut peer_writer, mut peer_reader) = wire_up(&mut req);

        req.xsend(Message::new(vec![1])).unwrap();
        peer_reader.read();
        peer_reader.read();
        peer_reader.read();

        // A stale reply bearing the wrong id.
        let mut stale_id = [0u8; 4];
        BigEndian::write_u32(&mut stale_id, 999);
        peer_writer.write(Message::with_flags(stale_id.to_vec(), ::message::FLAG_MORE));
        peer_writer.write(Message::with_flags(Vec::new(), ::message::FLAG_MORE));
        peer_writer.write(Message::new(vec![1]));
        // The real reply follows right after.
        let mut real_id = [0u8; 4];
        BigEndian::write_u32(&mut real_id, 3);
        peer_writer.write(Message::with_flags(real_id.to_vec(), ::message::FLAG_MORE));
        peer_writer.write(Message::with_flags(Vec::new(), ::message::FLAG_MORE));
        peer_writer.write(Message::new(vec![2]));
        peer_writer.flush();

        assert_eq!(req.xrecv().unwrap().body(), &[2]);
    }
}
