// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Raw surveyor: broadcasts every outbound frame to all attached pipes and
//! fair-queues inbound responses, enforcing no deadline of its own. Grounded
//! on `xsurveyor.cpp`, whose `xsend`/`xrecv` are plain `dist`/`fq` calls.

use std::io;

use command::PipeId;
use dist;
use fq::FairQueue;
use global::SocketOption;
use message::Message;
use patterns::{PipeSet, Protocol, SendError};
use pipe::{PipeReader, PipeWriter};

pub struct Xsurveyor {
    pipes: PipeSet<()>,
    fq: FairQueue,
}

impl Xsurveyor {
    pub fn new() -> Xsurveyor {
        Xsurveyor { pipes: PipeSet::new(), fq: FairQueue::new() }
    }
}

impl Default for Xsurveyor {
    fn default() -> Self {
        Xsurveyor::new()
    }
}

impl Protocol for Xsurveyor {
    fn xsend(&mut self, msg: Message) -> Result<(), SendError> {
        dist::broadcast(&mut self.pipes, &msg);
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;
    use pipe::new_pipe;

    #[test]
    fn send_reaches_every_attached_pipe() {
        let mut xs = Xsurveyor::new();
        let (w0, mut peer_reader0) = new_pipe(4, 1);
        let (w1, mut peer_reader1) = new_pipe(4, 1);
        xs.xattach_pipe(PipeId(0), w0, new_pipe(0, 1).1);
        xs.xattach_pipe(PipeId(1), w1, new_pipe(0, 1).1);

        xs.xsend(Message::new(vec![9])).unwrap();

        assert_eq!(peer_reader0.read().unwrap().body(), &[9]);
        assert_eq!(peer_reader1.read().unwrap().body(), &[9]);
    }

    #[test]
    fn recv_fair_queues_across_responders() {
        let mut xs = Xsurveyor::new();
        let (mut peer_writer0, in0) = new_pipe(4, 1);
        xs.xattach_pipe(PipeId(0), new_pipe(0, 1).0, in0);
        peer_writer0.write(Message::new(vec![1]));
        peer_writer0.flush();

        assert_eq!(xs.xrecv().unwrap().body(), &[1]);
    }
}
