// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Round-robin inbound collection across attached pipes. Used by `XREP`/`PULL`
//! and by `XSURVEYOR`'s response collection.

use std::io;

use command::PipeId;
use global::would_block_io_error;
use message::Message;
use patterns::PipeSet;

pub struct FairQueue {
    cursor: usize,
    /// The pipe a still-open multipart message is being read from. A reader
    /// commits to one pipe until that message's last part, the inbound mirror
    /// of `LoadBalancer`'s `active`.
    active: Option<PipeId>,
    /// The pipe the most recent successful `recv` was served from, kept even
    /// after a message completes so callers that need to tag the message with
    /// its origin (`XREP`'s identity frame) can still ask afterwards.
    last: Option<PipeId>,
}

impl FairQueue {
    pub fn new() -> FairQueue {
        FairQueue { cursor: 0, active: None, last: None }
    }

    /// The pipe the last successful `recv` came from.
    pub fn last_id(&self) -> Option<PipeId> {
        self.last
    }

    /// Reads the next available message, starting just past whichever pipe was
    /// read from last so no single peer can starve the others.
    pub fn recv<M>(&mut self, pipes: &mut PipeSet<M>) -> io::Result<Message> {
        let candidates: Vec<PipeId> = match self.active {
            Some(id) if pipes.get(id).is_some() => vec![id],
            _ => pipes.ids_from(self.cursor),
        };
        for id in candidates {
            let slot = match pipes.get_mut(id) {
                Some(slot) => slot,
                None => continue,
            };
            if let Some(msg) = slot.reader.read() {
                self.cursor = id.0 + 1;
                self.active = if msg.has_more() { Some(id) } else { None };
                self.last = Some(id);
                return Ok(msg);
            }
        }
        Err(would_block_io_error("no pipe has a message available"))
    }

    /// `true` if at least one attached pipe has a message ready right now.
    pub fn has_in<M>(&self, pipes: &PipeSet<M>) -> bool {
        pipes.iter().any(|(_, slot)| slot.reader.has_data())
    }
}

impl Default for FairQueue {
    fn default() -> Self {
        FairQueue::new()
    }
}
