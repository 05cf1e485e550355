// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Round-robin outbound distribution across attached pipes, skipping any pipe
//! that currently has no credit. Used by `XREQ`/`PUSH` and as the outbound half
//! of `XSURVEYOR`'s per-pipe unicast retry.

use command::PipeId;
use global::would_block_io_error;
use message::Message;
use patterns::{PipeSet, SendError};

pub struct LoadBalancer {
    cursor: usize,
    /// The pipe a still-open multipart message is being written to. While this
    /// is set, every subsequent part must go to the same pipe: a message can
    /// never be split across two peers just because load-balancing rotated.
    active: Option<PipeId>,
}

impl LoadBalancer {
    pub fn new() -> LoadBalancer {
        LoadBalancer { cursor: 0, active: None }
    }

    /// Writes `msg` to the next ready pipe in rotation, or to whichever pipe is
    /// mid-multipart if one is open. The search starts just past whichever pipe
    /// was used last time, so repeated sends spread across every ready pipe
    /// rather than piling onto the first one found.
    pub fn send<M>(&mut self, pipes: &mut PipeSet<M>, msg: Message) -> Result<(), SendError> {
        let more = msg.has_more();
        let target = match self.active {
            Some(id) if pipes.get(id).is_some() => Some(id),
            _ => {
                let ids = pipes.ids_from(self.cursor);
                ids.into_iter().find(|id| pipes.get(*id).map_or(false, |s| s.writer.has_credit()))
            }
        };
        let id = match target {
            Some(id) => id,
            None => return Err(SendError::new(would_block_io_error("no pipe ready to accept a message"), msg)),
        };
        let slot = pipes.get_mut(id).unwrap();
        slot.writer.write(msg);
        slot.writer.flush();
        self.cursor = id.0 + 1;
        self.active = if more { Some(id) } else { None };
        Ok(())
    }
}

impl Default for LoadBalancer {
    fn default() -> Self {
        LoadBalancer::new()
    }
}
