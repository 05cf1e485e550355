// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Pipeline receiver: fair-queues inbound round-robin, no FSM, send is not
//! implemented at all.

use std::io;

use command::PipeId;
use fq::FairQueue;
use global::{not_supported_io_error, SocketOption};
use message::Message;
use patterns::{PipeSet, Protocol, SendError};
use pipe::{PipeReader, PipeWriter};

pub struct Pull {
    pipes: PipeSet<()>,
    fq: FairQueue,
}

impl Pull {
    pub fn new() -> Pull {
        Pull { pipes: PipeSet::new(), fq: FairQueue::new() }
    }
}

impl Default for Pull {
    fn default() -> Self {
        Pull::new()
    }
}

impl Protocol for Pull {
    fn xsend(&mut self, msg: Message) -> Result<(), SendError> {
        Err(SendError::new(not_supported_io_error("PULL does not support send"), msg))
    }

    fn xrecv(&mut self) -> io::Result<Message> {
        self.fq.recv(&mut self.pipes)
    }

    fn xhas_in(&self) -> bool {
        self.fq.has_in(&self.pipes)
    }

    fn xhas_out(&self) -> bool {
        false
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
