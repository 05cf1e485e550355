// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Cooked surveyor: tags every survey with a fresh 32-bit id, then only
//! accepts responses carrying that id, discarding stragglers from a previous
//! round. Enforces the survey deadline itself (no `ETIMEDOUT` distinction
//! would otherwise be possible from a plain `EAGAIN`). Grounded on
//! `surveyor.cpp`.

use std::io;
use std::time::{Duration, Instant};

use byteorder::{BigEndian, ByteOrder};

use command::PipeId;
use global::{fsm_io_error, invalid_input_io_error, timed_out_io_error, would_block_io_error, SocketOption};
use message::{Message, FLAG_MORE};
use patterns::xsurveyor::Xsurveyor;
use patterns::{Protocol, SendError};
use pipe::{PipeReader, PipeWriter};

pub struct Surveyor {
    base: Xsurveyor,
    receiving_responses: bool,
    survey_id: u32,
    deadline: Option<Instant>,
    survey_timeout: Option<Duration>,
}

impl Surveyor {
    pub fn new() -> Surveyor {
        Surveyor {
            base: Xsurveyor::new(),
            receiving_responses: false,
            survey_id: 0,
            deadline: None,
            survey_timeout: None,
        }
    }

    fn drain_mismatched_response(&mut self) -> io::Result<()> {
        loop {
            let part = self.base.xrecv()?;
            if !part.has_more() {
                return Ok(());
            }
        }
    }
}

impl Default for Surveyor {
    fn default() -> Self {
        Surveyor::new()
    }
}

impl Protocol for Surveyor {
    fn xsend(&mut self, msg: Message) -> Result<(), SendError> {
        if msg.has_more() {
            return Err(SendError::new(invalid_input_io_error("survey messages cannot span multiple parts"), msg));
        }

        self.survey_id = self.survey_id.wrapping_add(1);
        let mut id = vec![0u8; 4];
        BigEndian::write_u32(&mut id, self.survey_id);
        if let Err(e) = self.base.xsend(Message::with_flags(id, FLAG_MORE)) {
            return Err(SendError::new(e.error, msg));
        }
        self.base.xsend(msg)?;

        self.receiving_responses = true;
        self.deadline = self.survey_timeout.map(|timeout| Instant::now() + timeout);
        Ok(())
    }

    fn xrecv(&mut self) -> io::Result<Message> {
        if !self.receiving_responses {
            return Err(fsm_io_error("no survey underway"));
        }

        loop {
            let id = match self.base.xrecv() {
                Ok(msg) => msg,
                Err(e) => {
                    if e.kind() == io::ErrorKind::WouldBlock {
                        let expired = self.deadline.map_or(false, |d| Instant::now() >= d);
                        if expired {
                            return Err(timed_out_io_error());
                        }
                        return Err(would_block_io_error("no response available yet"));
                    }
                    return Err(e);
                }
            };

            let matches_this_survey =
                id.has_more() && id.body().len() == 4 && BigEndian::read_u32(id.body()) == self.survey_id;
            if !matches_this_survey {
                self.drain_mismatched_response()?;
                continue;
            }

            return self.base.xrecv();
        }
    }

    fn xhas_in(&self) -> bool {
        self.receiving_responses && self.base.xhas_in()
    }

    fn xhas_out(&self) -> bool {
        self.base.xhas_out()
    }

    fn recv_deadline(&self) -> Option<Instant> {
        if self.receiving_responses { self.deadline } else { None }
    }

    fn xsetsockopt(&mut self, option: &SocketOption) -> io::Result<bool> {
        if let SocketOption::SurveyTimeout(ms) = *option {
            self.survey_timeout = if ms <= 0 { None } else { Some(Duration::from_millis(ms as u64)) };
            return Ok(true);
        }
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

    fn wire_up(s: &mut Surveyor, id: PipeId) -> (PipeWriter, PipeReader) {
        let (out_writer, peer_reader) = new_pipe(4, 1);
        let (peer_writer, in_reader) = new_pipe(4, 1);
        s.xattach_pipe(id, out_writer, in_reader);
        (peer_writer, peer_reader)
    }

    #[test]
    fn recv_before_send_is_efsm() {
        let mut s = Surveyor::new();
        assert!(s.xrecv().is_err());
    }

    #[test]
    fn matching_response_is_delivered() {
        let mut s = Surveyor::new();
        let (mut peer_writer, mut peer_reader) = wire_up(&mut s, PipeId(0));

        s.xsend(Message::new(vec![1])).unwrap();
        let id_frame = peer_reader.read().unwrap();
        assert!(id_frame.has_more());
        peer_reader.read().unwrap();

        peer_writer.write(Message::with_flags(id_frame.body().to_vec(), FLAG_MORE));
        peer_writer.write(Message::new(vec![42]));
        peer_writer.flush();

        assert_eq!(s.xrecv().unwrap().body(), &[42]);
    }

    #[test]
    fn response_from_a_stale_survey_is_dropped() {
        let mut s = Surveyor::new();
        let (mut peer_writer, mut peer_reader) = wire_up(&mut s, PipeId(0));

        s.xsend(Message::new(vec![1])).unwrap();
        peer_reader.read();
        peer_reader.read();

        let mut stale_id = vec![0u8; 4];
        BigEndian::write_u32(&mut stale_id, 0xdead_beef);
        peer_writer.write(Message::with_flags(stale_id, FLAG_MORE));
        peer_writer.write(Message::new(vec![99]));
        peer_writer.flush();

        assert!(s.xrecv().is_err());
    }

    #[test]
    fn single_part_only() {
        let mut s = Surveyor::new();
        let (_w, _r) = wire_up(&mut s, PipeId(0));
        assert!(s.xsend(Message::with_flags(vec![1], FLAG_MORE)).is_err());
    }
}
