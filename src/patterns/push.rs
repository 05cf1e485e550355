// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Pipeline sender: load-balances outbound round-robin, no FSM, receive is not
//! implemented at all. Grounded on spec §4.6's PUSH/PULL description; the
//! load-balancing itself lives in `lb.rs`.

use std::io;

use command::PipeId;
use global::{not_supported_io_error, SocketOption};
use lb::LoadBalancer;
use message::Message;
use patterns::{PipeSet, Protocol, SendError};
use pipe::{PipeReader, PipeWriter};

pub struct Push {
    pipes: PipeSet<()>,
    lb: LoadBalancer,
}

impl Push {
    pub fn new() -> Push {
        Push { pipes: PipeSet::new(), lb: LoadBalancer::new() }
    }
}

impl Default for Push {
    fn default() -> Self {
        Push::new()
    }
}

impl Protocol for Push {
    fn xsend(&mut self, msg: Message) -> Result<(), SendError> {
        self.lb.send(&mut self.pipes, msg)
    }

    fn xrecv(&mut self) -> io::Result<Message> {
        Err(not_supported_io_error("PUSH does not support recv"))
    }

    fn xhas_in(&self) -> bool {
        false
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
    fn recv_is_not_supported() {
        let mut push = Push::new();
        assert!(push.xrecv().is_err());
    }

    #[test]
    fn send_load_balances_across_pipes() {
        let mut push = Push::new();
        let (w0, mut peer_reader0) = new_pipe(4, 1);
        let (w1, mut peer_reader1) = new_pipe(4, 1);
        push.xattach_pipe(PipeId(0), w0, new_pipe(0, 1).1);
        push.xattach_pipe(PipeId(1), w1, new_pipe(0, 1).1);

        push.xsend(Message::new(vec![1])).unwrap();
        push.xsend(Message::new(vec![2])).unwrap();

        assert_eq!(peer_reader0.read().unwrap().body(), &[1]);
        assert_eq!(peer_reader1.read().unwrap().body(), &[2]);
    }
}
