// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Raw subscriber: keeps a local refcounted subscription table distinct from
//! whatever matches inbound messages (that is the cooked `Sub`'s job), and
//! forwards only the first subscribe / last unsubscribe transition upstream
//! to every attached pipe. Grounded line-for-line on `xsub.cpp`.

use std::collections::HashMap;
use std::io;

use command::PipeId;
use fq::FairQueue;
use global::{invalid_input_io_error, SocketOption};
use message::Message;
use patterns::{PipeSet, Protocol, SendError};
use pipe::{PipeReader, PipeWriter};
use wire;

/// `true` iff the attached peer speaks the legacy (0MQ/2.1) wire protocol,
/// which cannot carry a filter-id and so never receives forwarded subscriptions.
type PipeMeta = bool;

pub struct Xsub {
    pipes: PipeSet<PipeMeta>,
    fq: FairQueue,
    subscriptions: HashMap<(u16, Vec<u8>), u32>,
}

impl Xsub {
    pub fn new() -> Xsub {
        Xsub { pipes: PipeSet::new(), fq: FairQueue::new(), subscriptions: HashMap::new() }
    }

    fn replay_subscriptions_to(&mut self, pipe: PipeId) {
        let is_legacy = match self.pipes.get(pipe) {
            Some(slot) => slot.meta,
            None => return,
        };
        if is_legacy {
            return;
        }
        for (filter_id, pattern) in self.subscriptions.keys().cloned().collect::<Vec<_>>() {
            let mut buf = Vec::new();
            let _ = wire::encode_subscription(&mut buf, true, filter_id, &pattern);
            if let Some(slot) = self.pipes.get_mut(pipe) {
                if slot.writer.write(Message::new(buf)) {
                    slot.writer.flush();
                }
            }
        }
    }

    fn broadcast_transition(&mut self, msg: &Message) {
        let ids: Vec<PipeId> = self
            .pipes
            .iter()
            .filter(|&(_, slot)| !slot.meta)
            .map(|(&id, _)| id)
            .collect();
        ::dist::send_to(&mut self.pipes, &ids, msg);
    }

    /// Attaches a pipe already created elsewhere; `legacy` marks a protocol=1 peer.
    pub fn attach_with_protocol(&mut self, pipe: PipeId, writer: PipeWriter, reader: PipeReader, legacy: bool) {
        self.pipes.attach(pipe, writer, reader, legacy);
        self.replay_subscriptions_to(pipe);
    }
}

impl Default for Xsub {
    fn default() -> Self {
        Xsub::new()
    }
}

impl Protocol for Xsub {
    fn xsend(&mut self, msg: Message) -> Result<(), SendError> {
        let (subscribe, filter_id, payload) = match wire::decode_subscription(msg.body()) {
            Ok(decoded) => decoded,
            Err(_) => return Err(SendError::new(invalid_input_io_error("malformed subscription frame"), msg)),
        };
        let key = (filter_id, payload.to_vec());

        let first_or_last = if subscribe {
            let refcount = self.subscriptions.entry(key).or_insert(0);
            *refcount += 1;
            *refcount == 1
        } else {
            match self.subscriptions.get_mut(&key) {
                None => false,
                Some(refcount) => {
                    *refcount -= 1;
                    let drained = *refcount == 0;
                    if drained {
                        self.subscriptions.remove(&key);
                    }
                    drained
                }
            }
        };

        if first_or_last {
            self.broadcast_transition(&msg);
        }
        Ok(())
    }

    fn xrecv(&mut self) -> io::Result<Message> {
        self.fq.recv(&mut self.pipes)
    }

    fn xhas_in(&self) -> bool {
        self.fq.has_in(&self.pipes)
    }

    fn xhas_out(&self) -> bool {
        true
    }

    fn xsetsockopt(&mut self, _option: &SocketOption) -> io::Result<bool> {
        Ok(false)
    }

    fn xattach_pipe(&mut self, pipe: PipeId, writer: PipeWriter, reader: PipeReader) {
        self.attach_with_protocol(pipe, writer, reader, false);
    }

    fn xread_activated(&mut self, _pipe: PipeId) {}

    fn xwrite_activated(&mut self, pipe: PipeId, msgs_read: u64) {
        if let Some(slot) = self.pipes.get_mut(pipe) {
            slot.writer.on_activate_write(msgs_read);
        }
    }

    fn xhiccuped(&mut self, pipe: PipeId) {
        self.replay_subscriptions_to(pipe);
    }

    fn xterminated(&mut self, pipe: PipeId) {
        self.pipes.detach(pipe);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipe::new_pipe;

    fn subscribe_frame(subscribe: bool, pattern: &[u8]) -> Message {
        let mut buf = Vec::new();
        wire::encode_subscription(&mut buf, subscribe, wire::PATTERN_PUBSUB, pattern).unwrap();
        Message::new(buf)
    }

    #[test]
    fn first_subscribe_is_forwarded_every_repeat_is_absorbed() {
        let mut xsub = Xsub::new();
        let (out_writer, mut peer_reader) = new_pipe(4, 1);
        xsub.xattach_pipe(PipeId(0), out_writer, new_pipe(4, 1).1);

        xsub.xsend(subscribe_frame(true, b"a")).unwrap();
        xsub.xsend(subscribe_frame(true, b"a")).unwrap();

        assert!(peer_reader.read().is_some());
        assert!(peer_reader.read().is_none());
    }

    #[test]
    fn last_unsubscribe_is_forwarded() {
        let mut xsub = Xsub::new();
        let (out_writer, mut peer_reader) = new_pipe(4, 1);
        xsub.xattach_pipe(PipeId(0), out_writer, new_pipe(4, 1).1);

        xsub.xsend(subscribe_frame(true, b"a")).unwrap();
        peer_reader.read();

        xsub.xsend(subscribe_frame(true, b"a")).unwrap();
        assert!(peer_reader.read().is_none());

        xsub.xsend(subscribe_frame(false, b"a")).unwrap();
        assert!(peer_reader.read().is_none());
        xsub.xsend(subscribe_frame(false, b"a")).unwrap();
        assert!(peer_reader.read().is_some());
    }

    #[test]
    fn attaching_replays_cached_subscriptions() {
        let mut xsub = Xsub::new();
        let (out0, _r0) = new_pipe(4, 1);
        xsub.xattach_pipe(PipeId(0), out0, new_pipe(4, 1).1);
        xsub.xsend(subscribe_frame(true, b"a")).unwrap();

        let (out1, mut peer_reader1) = new_pipe(4, 1);
        xsub.xattach_pipe(PipeId(1), out1, new_pipe(4, 1).1);

        assert!(peer_reader1.read().is_some());
    }

    #[test]
    fn legacy_peer_never_receives_forwarded_subscriptions() {
        let mut xsub = Xsub::new();
        let (out0, mut peer_reader0) = new_pipe(4, 1);
        xsub.attach_with_protocol(PipeId(0), out0, new_pipe(4, 1).1, true);

        xsub.xsend(subscribe_frame(true, b"a")).unwrap();
        assert!(peer_reader0.read().is_none());
    }
}
