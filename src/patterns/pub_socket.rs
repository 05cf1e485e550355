// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Cooked publisher: plain broadcast, receive never supported. Matches
//! `pbu.rs`'s `recv`/`on_recv_done` rejection exactly; named `pub_socket` to
//! avoid clashing with the `pub` keyword.

use std::io;

use command::PipeId;
use global::{not_supported_io_error, SocketOption};
use message::Message;
use patterns::xpub::Xpub;
use patterns::{Protocol, SendError};
use pipe::{PipeReader, PipeWriter};

pub struct Pub {
    base: Xpub,
}

impl Pub {
    pub fn new() -> Pub {
        Pub { base: Xpub::new() }
    }
}

impl Default for Pub {
    fn default() -> Self {
        Pub::new()
    }
}

impl Protocol for Pub {
    fn xsend(&mut self, msg: Message) -> Result<(), SendError> {
        self.base.xsend(msg)
    }

    fn xrecv(&mut self) -> io::Result<Message> {
        Err(not_supported_io_error("PUB does not support recv"))
    }

    fn xhas_in(&self) -> bool {
        false
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
    use wire;

    #[test]
    fn recv_is_not_supported() {
        let mut p = Pub::new();
        assert!(p.xrecv().is_err());
    }

    #[test]
    fn send_reaches_subscribed_peer() {
        let mut p = Pub::new();
        let (w0, mut peer_reader0) = new_pipe(4, 1);
        let (mut peer_writer0, in0) = new_pipe(4, 1);
        p.xattach_pipe(PipeId(0), w0, in0);

        let mut buf = Vec::new();
        wire::encode_subscription(&mut buf, true, wire::PATTERN_PUBSUB, b"a").unwrap();
        peer_writer0.write(Message::new(buf));
        peer_writer0.flush();
        p.xread_activated(PipeId(0));

        p.xsend(Message::new(b"a: 1".to_vec())).unwrap();
        assert_eq!(peer_reader0.read().unwrap().body(), b"a: 1");
    }
}
