// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Cooked respondent: copies every label frame of an incoming survey straight
//! back into the reply pipe as it is received (priming `Xrespondent::xsend`'s
//! routing state), then hands the survey body to the caller. A reply is
//! restricted to a single part. Grounded on `respondent.cpp`.

use std::io;

use command::PipeId;
use global::{fsm_io_error, invalid_input_io_error, SocketOption};
use message::Message;
use patterns::xrespondent::Xrespondent;
use patterns::{Protocol, SendError};
use pipe::{PipeReader, PipeWriter};

pub struct Respondent {
    base: Xrespondent,
    sending_reply: bool,
}

impl Respondent {
    pub fn new() -> Respondent {
        Respondent { base: Xrespondent::new(), sending_reply: false }
    }
}

impl Default for Respondent {
    fn default() -> Self {
        Respondent::new()
    }
}

impl Protocol for Respondent {
    fn xsend(&mut self, msg: Message) -> Result<(), SendError> {
        if !self.sending_reply {
            return Err(SendError::new(fsm_io_error("no survey to reply to"), msg));
        }
        if msg.has_more() {
            return Err(SendError::new(invalid_input_io_error("survey replies cannot span multiple parts"), msg));
        }

        self.base.xsend(msg)?;
        self.sending_reply = false;
        Ok(())
    }

    fn xrecv(&mut self) -> io::Result<Message> {
        if self.sending_reply {
            return Err(fsm_io_error("a reply is still pending"));
        }

        loop {
            let part = self.base.xrecv()?;
            let more = part.has_more();
            if !more {
                self.sending_reply = true;
                return Ok(part);
            }
            self.base.xsend(part).map_err(|e| e.error)?;
        }
    }

    fn xhas_in(&self) -> bool {
        !self.sending_reply && self.base.xhas_in()
    }

    fn xhas_out(&self) -> bool {
        self.sending_reply && self.base.xhas_out()
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

    #[test]
    fn reply_without_survey_is_efsm() {
        let mut r = Respondent::new();
        assert!(r.xsend(Message::new(vec![1])).is_err());
    }

    #[test]
    fn survey_is_received_and_reply_routed_back() {
        let mut r = Respondent::new();
        let (out_writer, mut peer_reader) = new_pipe(4, 1);
        let (mut peer_writer, in_reader) = new_pipe(4, 1);
        r.xattach_pipe(PipeId(1), out_writer, in_reader);

        peer_writer.write(Message::new(vec![5]));
        peer_writer.flush();

        assert_eq!(r.xrecv().unwrap().body(), &[5]);
        r.xsend(Message::new(vec![77])).unwrap();

        // The synthetic identity label primes routing internally and never
        // reaches the wire; the peer only ever observes the reply body.
        assert_eq!(peer_reader.read().unwrap().body(), &[77]);
        assert!(peer_reader.read().is_none());
    }

    #[test]
    fn multipart_reply_is_rejected() {
        let mut r = Respondent::new();
        let (out_writer, _peer_reader) = new_pipe(4, 1);
        let (mut peer_writer, in_reader) = new_pipe(4, 1);
        r.xattach_pipe(PipeId(0), out_writer, in_reader);

        peer_writer.write(Message::new(vec![1]));
        peer_writer.flush();
        r.xrecv().unwrap();

        assert!(r.xsend(::message::Message::with_flags(vec![1], ::message::FLAG_MORE)).is_err());
    }
}
