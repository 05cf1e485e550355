// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Cooked subscriber: wraps `Xsub`, applying a `SubscriberFilter` to discard
//! every inbound message the application never subscribed to. Send is always
//! rejected. Grounded on `sub.cpp`.

use std::io;

use command::PipeId;
use filter::prefix::PrefixSubscriberFilter;
use filter::topic::TopicSubscriberFilter;
use filter::{self, SubscriberFilter};
use global::{not_supported_io_error, SocketOption};
use message::Message;
use patterns::xsub::Xsub;
use patterns::{Protocol, SendError};
use pipe::{PipeReader, PipeWriter};
use wire;

fn new_filter(filter_id: filter::FilterId) -> Box<dyn SubscriberFilter> {
    if filter_id == filter::TOPIC {
        Box::new(TopicSubscriberFilter::new())
    } else {
        Box::new(PrefixSubscriberFilter::new())
    }
}

pub struct Sub {
    base: Xsub,
    filter: Box<dyn SubscriberFilter>,
    /// `true` while a matched multipart message still has trailing parts due,
    /// which must pass through untested (only the first part is ever matched).
    in_body: bool,
}

impl Sub {
    pub fn new() -> Sub {
        Sub::with_filter(filter::PREFIX)
    }

    pub fn with_filter(filter_id: filter::FilterId) -> Sub {
        Sub { base: Xsub::new(), filter: new_filter(filter_id), in_body: false }
    }

    fn forward_upstream(&mut self, subscribe: bool, pattern: &[u8]) -> io::Result<()> {
        let mut buf = Vec::new();
        wire::encode_subscription(&mut buf, subscribe, wire::PATTERN_PUBSUB, pattern)?;
        self.base.xsend(Message::new(buf)).map_err(|e| e.error)
    }

    /// Reads the next message that matches an active subscription, discarding
    /// (with all of its trailing parts) every message that doesn't.
    fn next_match(&mut self) -> io::Result<Message> {
        loop {
            let first = self.base.xrecv()?;
            if self.filter.matches(first.body()) {
                return Ok(first);
            }
            let mut more = first.has_more();
            while more {
                let part = self.base.xrecv()?;
                more = part.has_more();
            }
        }
    }
}

impl Default for Sub {
    fn default() -> Self {
        Sub::new()
    }
}

impl Protocol for Sub {
    fn xsend(&mut self, msg: Message) -> Result<(), SendError> {
        Err(SendError::new(not_supported_io_error("SUB does not support send"), msg))
    }

    fn xrecv(&mut self) -> io::Result<Message> {
        if self.in_body {
            let part = self.base.xrecv()?;
            self.in_body = part.has_more();
            return Ok(part);
        }

        let first = self.next_match()?;
        self.in_body = first.has_more();
        Ok(first)
    }

    /// Conservative: reports whether the underlying pipes have *any* pending
    /// frame, not whether one is known to match. Determining an exact match
    /// here would require peeking and caching under `&self`, which `xhas_in`
    /// doesn't allow for.
    fn xhas_in(&self) -> bool {
        self.base.xhas_in()
    }

    fn xhas_out(&self) -> bool {
        false
    }

    fn xsetsockopt(&mut self, option: &SocketOption) -> io::Result<bool> {
        match *option {
            SocketOption::Subscribe(ref pattern) => {
                if self.filter.subscribe(pattern) {
                    self.forward_upstream(true, pattern)?;
                }
                Ok(true)
            }
            SocketOption::Unsubscribe(ref pattern) => {
                if self.filter.unsubscribe(pattern) {
                    self.forward_upstream(false, pattern)?;
                }
                Ok(true)
            }
            _ => Ok(false),
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

    fn wire_up(sub: &mut Sub, id: PipeId) -> (PipeWriter, PipeReader) {
        let (out_writer, peer_reader) = new_pipe(4, 1);
        let (peer_writer, in_reader) = new_pipe(4, 1);
        sub.xattach_pipe(id, out_writer, in_reader);
        (peer_writer, peer_reader)
    }

    #[test]
    fn send_is_not_supported() {
        let mut sub = Sub::new();
        assert!(sub.xsend(Message::new(vec![1])).is_err());
    }

    #[test]
    fn subscribing_forwards_the_pattern_upstream() {
        let mut sub = Sub::new();
        let (_peer_writer, mut peer_reader) = wire_up(&mut sub, PipeId(0));

        sub.xsetsockopt(&SocketOption::Subscribe(b"news".to_vec())).unwrap();

        let frame = peer_reader.read().unwrap();
        let (subscribe, _, pattern) = wire::decode_subscription(frame.body()).unwrap();
        assert!(subscribe);
        assert_eq!(pattern, b"news");
    }

    #[test]
    fn non_matching_message_is_discarded() {
        let mut sub = Sub::new();
        let (mut peer_writer, _peer_reader) = wire_up(&mut sub, PipeId(0));
        sub.xsetsockopt(&SocketOption::Subscribe(b"news".to_vec())).unwrap();

        peer_writer.write(Message::new(b"sports: score".to_vec()));
        peer_writer.write(Message::new(b"news: headline".to_vec()));
        peer_writer.flush();

        assert_eq!(sub.xrecv().unwrap().body(), b"news: headline");
    }

    #[test]
    fn unsubscribing_the_last_reference_forwards_upstream() {
        let mut sub = Sub::new();
        let (_peer_writer, mut peer_reader) = wire_up(&mut sub, PipeId(0));

        sub.xsetsockopt(&SocketOption::Subscribe(b"a".to_vec())).unwrap();
        peer_reader.read();
        sub.xsetsockopt(&SocketOption::Unsubscribe(b"a".to_vec())).unwrap();

        let frame = peer_reader.read().unwrap();
        let (subscribe, _, _) = wire::decode_subscription(frame.body()).unwrap();
        assert!(!subscribe);
    }
}
