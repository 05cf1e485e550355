// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Cooked reply socket: built on `Xrep`, stashing every routing/label frame
//! (the identity frame plus, for a `REQ` peer, its request-id and delimiter)
//! up to and including the first empty frame, and replaying that stash ahead
//! of the application's reply body. Generalized from spec's textual REP
//! description and `req.cpp`'s envelope discipline, since the pack carries no
//! dedicated `rep.cpp`.

use std::io;

use command::PipeId;
use global::{fsm_io_error, SocketOption};
use message::Message;
use patterns::xrep::Xrep;
use patterns::{Protocol, SendError};
use pipe::{PipeReader, PipeWriter};

pub struct Rep {
    base: Xrep,
    stash: Vec<Message>,
    /// `true` while a multipart body is still being delivered to the caller.
    in_body: bool,
    /// `true` once a request's labels have been captured and not yet fully replied to.
    has_request: bool,
    /// `true` once the current reply's labels have already been replayed.
    replaying: bool,
}

impl Rep {
    pub fn new() -> Rep {
        Rep { base: Xrep::new(), stash: Vec::new(), in_body: false, has_request: false, replaying: false }
    }
}

impl Default for Rep {
    fn default() -> Self {
        Rep::new()
    }
}

impl Protocol for Rep {
    fn xsend(&mut self, msg: Message) -> Result<(), SendError> {
        if !self.has_request {
            return Err(SendError::new(fsm_io_error("no request to reply to"), msg));
        }

        let more = msg.has_more();
        if !self.replaying {
            for label in self.stash.drain(..) {
                if let Err(e) = self.base.xsend(label) {
                    return Err(SendError::new(e.error, msg));
                }
            }
            self.replaying = true;
        }
        self.base.xsend(msg)?;

        if !more {
            self.has_request = false;
            self.replaying = false;
        }
        Ok(())
    }

    fn xrecv(&mut self) -> io::Result<Message> {
        if !self.in_body {
            self.stash.clear();
            loop {
                let frame = self.base.xrecv()?;
                let empty = frame.is_empty();
                let more = frame.has_more();
                self.stash.push(frame);
                if empty || !more {
                    break;
                }
            }
            self.in_body = true;
            self.has_request = true;
        }

        let body = self.base.xrecv()?;
        if !body.has_more() {
            self.in_body = false;
        }
        Ok(body)
    }

    fn xhas_in(&self) -> bool {
        self.base.xhas_in()
    }

    fn xhas_out(&self) -> bool {
        self.has_request && self.base.xhas_out()
    }

    fn xsetsockopt(&mut self, option: &SocketOption) -> io::Result<bool> {
        self.base.xsetsockopt(option)
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

    fn wire_up(rep: &mut Rep, id: PipeId) -> (PipeWriter, PipeReader) {
        let (out_writer, peer_reader) = new_pipe(4, 1);
        let (peer_writer, in_reader) = new_pipe(4, 1);
        rep.xattach_pipe(id, out_writer, in_reader);
        (peer_writer, peer_reader)
    }

    #[test]
    fn reply_without_request_is_efsm() {
        let mut rep = Rep::new();
        let (_peer_writer, _peer_reader) = wire_up(&mut rep, PipeId(0));
        assert!(rep.xsend(Message::new(vec![1])).is_err());
    }

    #[test]
    fn request_body_is_delivered_and_reply_is_routed_back() {
        let mut rep = Rep::new();
        let (mut peer_writer, mut peer_reader) = wire_up(&mut rep, PipeId(1));

        // A request-id/delimiter/body envelope, as a REQ peer would send.
        peer_writer.write(Message::with_flags(vec![0, 0, 0, 7], ::message::FLAG_MORE));
        peer_writer.write(Message::with_flags(Vec::new(), ::message::FLAG_MORE));
        peer_writer.write(Message::new(vec![42]));
        peer_writer.flush();

        assert_eq!(rep.xrecv().unwrap().body(), &[42]);

        rep.xsend(Message::new(vec![99])).unwrap();

        // The identity frame is internal to xrep and never hits the wire; the
        // peer observes exactly its own envelope echoed back, then the body.
        assert_eq!(peer_reader.read().unwrap().body(), &[0, 0, 0, 7]);
        assert_eq!(peer_reader.read().unwrap().body(), &[] as &[u8]);
        assert_eq!(peer_reader.read().unwrap().body(), &[99]);
    }
}
