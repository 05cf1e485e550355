// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Raw request socket: load-balances outbound, fair-queues inbound, no FSM of
//! its own. Grounded in `req.cpp`'s `xreq_t` base (the un-decorated superclass
//! `req_t` builds its envelope framing on top of).

use std::io;

use command::PipeId;
use fq::FairQueue;
use global::{not_supported_io_error, SocketOption};
use lb::LoadBalancer;
use message::Message;
use patterns::{PipeSet, Protocol, SendError};
use pipe::{PipeReader, PipeWriter};

pub struct Xreq {
    pipes: PipeSet<()>,
    lb: LoadBalancer,
    fq: FairQueue,
}

impl Xreq {
    pub fn new() -> Xreq {
        Xreq { pipes: PipeSet::new(), lb: LoadBalancer::new(), fq: FairQueue::new() }
    }
}

impl Default for Xreq {
    fn default() -> Self {
        Xreq::new()
    }
}

impl Protocol for Xreq {
    fn xsend(&mut self, msg: Message) -> Result<(), SendError> {
        self.lb.send(&mut self.pipes, msg)
    }

    fn xrecv(&mut self) -> io::Result<Message> {
        self.fq.recv(&mut self.pipes)
    }

    fn xhas_in(&self) -> bool {
        self.fq.has_in(&self.pipes)
    }

    fn xhas_out(&self) -> bool {
        self.pipes.iter().any(|(_, slot)| slot.writer.has_credit())
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
    }
}

/// Marker helper for cooked sockets built on `Xreq` (`Req`) that need to reject
/// an operation the raw socket itself has no opinion about.
pub fn reject(op: &'static str) -> io::Result<()> {
    Err(not_supported_io_error(op))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipe::new_pipe;

    #[test]
    fn sent_message_is_observed_by_the_attached_peer() {
        let mut xreq = Xreq::new();
        // Outbound direction: xreq writes, the test peer reads.
        let (out_writer, mut peer_reader) = new_pipe(4, 1);
        // Inbound direction: the test peer writes, xreq reads.
        let (mut peer_writer, in_reader) = new_pipe(4, 1);
        xreq.xattach_pipe(PipeId(0), out_writer, in_reader);

        xreq.xsend(Message::new(vec![1])).unwrap();
        assert_eq!(peer_reader.read().unwrap().body(), &[1]);

        peer_writer.write(Message::new(vec![2]));
        peer_writer.flush();
        assert_eq!(xreq.xrecv().unwrap().body(), &[2]);
    }

    #[test]
    fn detaching_the_only_pipe_makes_send_fail() {
        let mut xreq = Xreq::new();
        let (out_writer, _peer_reader) = new_pipe(4, 1);
        let (_peer_writer, in_reader) = new_pipe(4, 1);
        xreq.xattach_pipe(PipeId(0), out_writer, in_reader);
        xreq.xterminated(PipeId(0));

        assert!(xreq.xsend(Message::new(vec![1])).is_err());
    }
}
