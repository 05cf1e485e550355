// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! One direction of a Pipe: an ordered, bounded SPSC queue of `Message`s built on
//! `Ypipe`, with credit-based flow control and a three-message termination
//! handshake. A logical connection is a *pair* of these (one per direction), each
//! owned on one side by the writer actor and on the other by the reader actor;
//! credit updates cross between them as `ActivateWrite` commands (§4.2), never as
//! shared mutable state.

use std::cell::Cell;
use std::sync::Arc;

use message::Message;
use ypipe::Ypipe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermState {
    Active,
    /// `pipe_term` received or sent; draining outstanding messages until `linger`
    /// expires or the queue empties, after which a `pipe_term_ack` is due.
    Lingering,
    /// `pipe_term_ack` exchanged both ways; the pipe may be released.
    Terminated,
}

/// The producer side of one direction of a pipe.
pub struct PipeWriter {
    ypipe: Arc<Ypipe<Message>>,
    hwm: u32,
    msgs_written: u64,
    last_msgs_read: u64,
    /// True while the previous `write` had `more = true`: a logical message is
    /// still open, so the next `write` must not be subjected to a fresh credit
    /// check (that would let a multipart message be observed half-written).
    writing_more: bool,
    term: Cell<TermState>,
}

/// The consumer side of one direction of a pipe.
pub struct PipeReader {
    ypipe: Arc<Ypipe<Message>>,
    lwm: u32,
    msgs_read: u64,
    /// `msgs_read` as of the last `ActivateWrite` command sent to the writer.
    last_reported: u64,
    term: Cell<TermState>,
}

/// Creates one direction of a pipe pair: `(writer_end, reader_end)`.
///
/// `hwm` is the credit ceiling in messages (not frames); a `hwm` of `0` means the
/// pipe has no credit at all and every send immediately would-block — the
/// contract `Socket::shutdown` relies on to make further sends observe `EAGAIN`.
/// `lwm` is the threshold below which the reader reports fresh credit back.
pub fn new_pipe(hwm: u32, lwm: u32) -> (PipeWriter, PipeReader) {
    let ypipe = Arc::new(Ypipe::new());
    let writer = PipeWriter {
        ypipe: ypipe.clone(),
        hwm: hwm,
        msgs_written: 0,
        last_msgs_read: 0,
        writing_more: false,
        term: Cell::new(TermState::Active),
    };
    let reader = PipeReader {
        ypipe: ypipe,
        lwm: lwm,
        msgs_read: 0,
        last_reported: 0,
        term: Cell::new(TermState::Active),
    };
    (writer, reader)
}

impl PipeWriter {
    fn credit(&self) -> u32 {
        let consumed = self.msgs_written.saturating_sub(self.last_msgs_read) as u32;
        self.hwm.saturating_sub(consumed)
    }

    /// `true` if a new logical message could be admitted right now.
    pub fn has_credit(&self) -> bool {
        self.writing_more || self.credit() > 0
    }

    /// Writes one message part. Returns `false` (would-block, no mutation) if
    /// this would start a new logical message with no credit available; once a
    /// message has been admitted, every subsequent part (`more = true`) is
    /// accepted unconditionally so no partial multipart is ever exposed.
    pub fn write(&mut self, msg: Message) -> bool {
        if self.term.get() == TermState::Terminated {
            return false;
        }
        let starting_new_message = !self.writing_more;
        if starting_new_message && self.credit() == 0 {
            return false;
        }
        let more = msg.has_more();
        self.ypipe.write(msg, more);
        if starting_new_message {
            self.msgs_written += 1;
        }
        self.writing_more = more;
        true
    }

    /// Publishes pending writes. Returns `true` if the reader needs no explicit
    /// wake, `false` if an `ActivateRead` command must be sent.
    pub fn flush(&self) -> bool {
        self.ypipe.flush()
    }

    /// Applies a credit update carried by an `ActivateWrite` command.
    pub fn on_activate_write(&mut self, msgs_read: u64) {
        self.last_msgs_read = msgs_read;
    }

    pub fn begin_term(&self) {
        if self.term.get() == TermState::Active {
            self.term.set(TermState::Lingering);
        }
    }

    pub fn on_term_ack(&self) {
        self.term.set(TermState::Terminated);
    }

    pub fn term_state(&self) -> TermState {
        self.term.get()
    }
}

impl PipeReader {
    /// Pops the next available message part, if any.
    pub fn read(&mut self) -> Option<Message> {
        let msg = self.ypipe.read();
        if msg.is_some() {
            self.msgs_read += 1;
        }
        msg
    }

    /// `true` if a message is available to `read()` right now, without consuming it.
    pub fn has_data(&self) -> bool {
        self.ypipe.has_data()
    }

    /// `true` once enough has been consumed since the last report that the
    /// writer's credit should be refreshed (the reader is below `lwm`).
    pub fn should_report_credit(&self) -> bool {
        self.lwm == 0 || (self.msgs_read - self.last_reported) as u32 >= self.lwm
    }

    /// Marks the current `msgs_read` as reported; the caller is responsible for
    /// actually posting the `ActivateWrite` command to the writer's owning actor.
    pub fn mark_reported(&mut self) -> u64 {
        self.last_reported = self.msgs_read;
        self.msgs_read
    }

    pub fn begin_term(&self) {
        if self.term.get() == TermState::Active {
            self.term.set(TermState::Lingering);
        }
    }

    /// `true` once every already-published message has been drained: the
    /// condition for replying with `pipe_term_ack`.
    pub fn is_drained(&mut self) -> bool {
        self.read().is_none()
    }

    pub fn on_term_ack(&self) {
        self.term.set(TermState::Terminated);
    }

    pub fn term_state(&self) -> TermState {
        self.term.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_is_rejected_with_no_credit() {
        let (mut w, _r) = new_pipe(0, 1);
        assert!(!w.has_credit());
        assert!(!w.write(Message::new(vec![1])));
    }

    #[test]
    fn fifo_order_is_preserved() {
        let (mut w, mut r) = new_pipe(4, 1);
        assert!(w.write(Message::new(vec![1])));
        assert!(w.write(Message::new(vec![2])));
        assert!(w.write(Message::new(vec![3])));
        w.flush();

        assert_eq!(r.read().unwrap().body(), &[1]);
        assert_eq!(r.read().unwrap().body(), &[2]);
        assert_eq!(r.read().unwrap().body(), &[3]);
        assert!(r.read().is_none());
    }

    #[test]
    fn multipart_message_is_admitted_even_past_hwm_once_started() {
        let (mut w, mut r) = new_pipe(1, 1);

        let mut first = Message::new(vec![1]);
        first.set_more(true);
        assert!(w.write(first));

        // Credit is exhausted (hwm=1, one message in flight) but we are mid
        // multipart, so the remaining parts must still be admitted.
        let mut second = Message::new(vec![2]);
        second.set_more(true);
        assert!(w.write(second));

        let last = Message::new(vec![3]);
        assert!(w.write(last));
        w.flush();

        assert_eq!(r.read().unwrap().body(), &[1]);
        assert_eq!(r.read().unwrap().body(), &[2]);
        assert_eq!(r.read().unwrap().body(), &[3]);
    }

    #[test]
    fn credit_is_restored_by_activate_write() {
        let (mut w, _r) = new_pipe(1, 1);
        assert!(w.write(Message::new(vec![1])));
        assert!(!w.write(Message::new(vec![2])));

        w.on_activate_write(1);
        assert!(w.write(Message::new(vec![2])));
    }

    #[test]
    fn reader_requests_credit_report_past_lwm() {
        let (mut w, mut r) = new_pipe(4, 2);
        for i in 0..3u8 {
            assert!(w.write(Message::new(vec![i])));
        }
        w.flush();
        r.read();
        assert!(!r.should_report_credit());
        r.read();
        assert!(r.should_report_credit());
        assert_eq!(r.mark_reported(), 2);
    }

    #[test]
    fn shutdown_hwm_zero_blocks_new_messages_immediately() {
        let (mut w, _r) = new_pipe(0, 0);
        assert!(!w.write(Message::new(vec![1])));
    }

    #[test]
    fn has_data_does_not_consume_the_message() {
        let (mut w, mut r) = new_pipe(4, 1);
        assert!(!r.has_data());
        w.write(Message::new(vec![1]));
        w.flush();
        assert!(r.has_data());
        assert!(r.has_data());
        assert_eq!(r.read().unwrap().body(), &[1]);
    }
}
