// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Raw publisher: broadcasts outbound messages to every pipe whose peer has
//! subscribed to a matching pattern, and surfaces the raw subscribe/unsubscribe
//! frames it reads off each pipe (verbose-style) so a cooked `Pub` or an
//! application wanting subscription visibility can see them. Generalized from
//! `pbu.rs`'s unconditional broadcast loop plus the `PublisherFilter` vtable.

use std::collections::VecDeque;
use std::io;

use command::PipeId;
use dist;
use filter::prefix::PrefixFilter;
use filter::topic::TopicFilter;
use filter::{self, PublisherFilter};
use global::{would_block_io_error, SocketOption};
use message::Message;
use patterns::{PipeSet, Protocol, SendError};
use pipe::{PipeReader, PipeWriter};
use wire;

fn new_filter(filter_id: filter::FilterId) -> Box<dyn PublisherFilter> {
    if filter_id == filter::TOPIC {
        Box::new(TopicFilter::new())
    } else {
        Box::new(PrefixFilter::new())
    }
}

pub struct Xpub {
    pipes: PipeSet<()>,
    filter_id: filter::FilterId,
    filter: Box<dyn PublisherFilter>,
    pending: VecDeque<Message>,
}

impl Xpub {
    pub fn new() -> Xpub {
        Xpub::with_filter(filter::PREFIX)
    }

    pub fn with_filter(filter_id: filter::FilterId) -> Xpub {
        Xpub { pipes: PipeSet::new(), filter_id: filter_id, filter: new_filter(filter_id), pending: VecDeque::new() }
    }

    /// Drains every subscribe/unsubscribe frame currently buffered on `pipe`,
    /// updating the matching table and queuing each raw frame for `xrecv`.
    /// A frame naming a filter-id this socket wasn't configured for is dropped
    /// with a warning; the pipe itself stays attached.
    fn drain_subscriptions(&mut self, pipe: PipeId) {
        loop {
            let frame = match self.pipes.get_mut(pipe) {
                Some(slot) if slot.reader.has_data() => slot.reader.read(),
                _ => return,
            };
            let msg = match frame {
                Some(msg) => msg,
                None => return,
            };
            match wire::decode_subscription(msg.body()) {
                Ok((subscribe, filter_id, pattern)) if filter_id == self.filter_id => {
                    if subscribe {
                        self.filter.subscribe(pattern, pipe.0);
                    } else {
                        self.filter.unsubscribe(pattern, pipe.0);
                    }
                    self.pending.push_back(msg);
                }
                Ok((_, filter_id, _)) => {
                    warn!("dropping subscription with unknown filter-id {} from pipe {}", filter_id, pipe.0);
                }
                Err(_) => {
                    warn!("dropping malformed subscription frame from pipe {}", pipe.0);
                }
            }
        }
    }
}

impl Default for Xpub {
    fn default() -> Self {
        Xpub::new()
    }
}

impl Protocol for Xpub {
    fn xsend(&mut self, msg: Message) -> Result<(), SendError> {
        let mut targets = Vec::new();
        self.filter.matches(msg.body(), &mut |subscriber| targets.push(PipeId(subscriber)));
        dist::send_to(&mut self.pipes, &targets, &msg);
        Ok(())
    }

    fn xrecv(&mut self) -> io::Result<Message> {
        self.pending.pop_front().ok_or_else(|| would_block_io_error("no pending subscription notification"))
    }

    fn xhas_in(&self) -> bool {
        !self.pending.is_empty()
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

    fn xread_activated(&mut self, pipe: PipeId) {
        self.drain_subscriptions(pipe);
    }

    fn xwrite_activated(&mut self, pipe: PipeId, msgs_read: u64) {
        if let Some(slot) = self.pipes.get_mut(pipe) {
            slot.writer.on_activate_write(msgs_read);
        }
    }

    fn xhiccuped(&mut self, _pipe: PipeId) {}

    fn xterminated(&mut self, pipe: PipeId) {
        self.filter.unsubscribe_all(pipe.0, &mut |_| {});
        self.pipes.detach(pipe);
    }
}
