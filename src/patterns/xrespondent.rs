// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Raw respondent: the survey-side counterpart of `Xrep` — on receive,
//! prepends a peer-identity frame naming the originating pipe; on send, the
//! first frame is consumed as the routing key selecting which pipe gets the
//! reply. The pack carries no dedicated `xrespondent.cpp` (only the cooked
//! `respondent.cpp`, whose behavior presupposes exactly this split), so this
//! is a direct reapplication of `Xrep`'s mechanics to the survey pattern.

use std::io;

use command::PipeId;
use global::SocketOption;
use message::Message;
use patterns::xrep::Xrep;
use patterns::{Protocol, SendError};
use pipe::{PipeReader, PipeWriter};

pub struct Xrespondent {
    base: Xrep,
}

impl Xrespondent {
    pub fn new() -> Xrespondent {
        Xrespondent { base: Xrep::new() }
    }
}

impl Default for Xrespondent {
    fn default() -> Self {
        Xrespondent::new()
    }
}

impl Protocol for Xrespondent {
    fn xsend(&mut self, msg: Message) -> Result<(), SendError> {
        self.base.xsend(msg)
    }

    fn xrecv(&mut self) -> io::Result<Message> {
        self.base.xrecv()
    }

    fn xhas_in(&self) -> bool {
        self.base.xhas_in()
    }

    fn xhas_out(&self) -> bool {
        self.base.xhas_out()
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
    fn recv_prepends_identity_and_send_routes_back() {
        let mut xr = Xrespondent::new();
        let (out_writer, mut peer_reader) = new_pipe(4, 1);
        let (mut peer_writer, in_reader) = new_pipe(4, 1);
        xr.xattach_pipe(PipeId(3), out_writer, in_reader);

        peer_writer.write(Message::new(vec![1]));
        peer_writer.flush();

        let identity = xr.xrecv().unwrap();
        assert!(identity.has_more());
        xr.xrecv().unwrap();

        xr.xsend(identity).unwrap();
        xr.xsend(Message::new(vec![7])).unwrap();

        assert_eq!(peer_reader.read().unwrap().body(), &[7]);
    }
}
