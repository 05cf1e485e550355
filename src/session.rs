// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The per-connection actor living on an I/O thread: it is the `Engine`'s
//! `SessionHandle`, bridging wire-level `push_msg`/`pull_msg` calls to the
//! pipe pair that connects to the owning socket's pattern FSM, and it tracks
//! the reconnect backoff an outbound connection's `Engine` consults after a
//! connection error. Grounded on `socket_impl.rs`'s `on_pipe_error`, which
//! reschedules a reconnect with `event_loop.timeout_ms(..., 200)` — a fixed
//! delay this crate generalizes into the configurable, doubling
//! `reconnect_ivl`/`reconnect_ivl_max` backoff the options surface exposes.

use command::{Command, CommandBody, Destination, PipeId, SessionId};
use global::SocketId;
use mailbox::MailboxSender;
use message::Message;
use engine::SessionHandle;
use pipe::{PipeReader, PipeWriter};

pub struct Session {
    id: SessionId,
    /// Inbound wire traffic, forwarded to the socket's pattern FSM.
    to_socket: PipeWriter,
    /// Outbound traffic queued by the socket's pattern FSM, pulled by the engine.
    from_socket: PipeReader,
    reconnect_ivl: u32,
    reconnect_ivl_max: u32,
    attempt: u32,
    /// Set by `SocketBase` at construction so a pipe transition that needs a
    /// cross-thread wake (the `flush`/credit-report cases `pipe.rs` documents)
    /// reaches the owning socket's mailbox directly, rather than only ever
    /// being noticed the next time that socket happens to poll.
    owner: Option<(MailboxSender, SocketId, PipeId)>,
}

impl Session {
    pub fn new(id: SessionId, to_socket: PipeWriter, from_socket: PipeReader, reconnect_ivl: u32, reconnect_ivl_max: u32) -> Session {
        Session {
            id: id,
            to_socket: to_socket,
            from_socket: from_socket,
            reconnect_ivl: reconnect_ivl,
            reconnect_ivl_max: reconnect_ivl_max,
            attempt: 0,
            owner: None,
        }
    }

    /// Wires this session to the socket that owns the other end of `pipe`, so
    /// backpressure relief and fresh inbound data can be reported across
    /// threads instead of waiting for the owning socket to poll again.
    pub fn notify_via(mut self, owner: MailboxSender, socket: SocketId, pipe: PipeId) -> Session {
        self.owner = Some((owner, socket, pipe));
        self
    }

    fn notify(&self, body: CommandBody) {
        if let Some((ref owner, socket, _)) = self.owner {
            let _ = owner.send(Command::new(Destination::Socket(socket), body));
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Delay in milliseconds before the next reconnect attempt, doubling from
    /// `reconnect_ivl` and capped at `reconnect_ivl_max` (`0` disables the
    /// cap, matching the option's documented "grow forever" meaning). Call
    /// once per failed attempt; `reset_backoff` restores it after a
    /// successful connection.
    pub fn next_reconnect_delay_ms(&mut self) -> u32 {
        let delay = self.reconnect_ivl.saturating_mul(1u32 << self.attempt.min(31));
        let delay = if self.reconnect_ivl_max > 0 { delay.min(self.reconnect_ivl_max) } else { delay };
        self.attempt += 1;
        debug!("[{:?}] reconnect attempt {} backing off {}ms", self.id, self.attempt, delay);
        delay
    }

    pub fn reset_backoff(&mut self) {
        self.attempt = 0;
    }

    /// Starts the pipe pair's three-message termination handshake; a `linger`
    /// drain continues to deliver already-queued messages until both ends
    /// report drained.
    pub fn begin_term(&self) {
        debug!("[{:?}] beginning term", self.id);
        self.to_socket.begin_term();
        self.from_socket.begin_term();
    }

    pub fn is_drained(&mut self) -> bool {
        !self.to_socket.has_credit() && self.from_socket.is_drained()
    }
}

impl SessionHandle for Session {
    /// Hands a freshly decoded inbound message to the socket's pattern FSM.
    /// `false` means the pipe has no credit (the socket hasn't kept up);
    /// the engine should stop reading until `activate_in` fires. A `flush`
    /// that reports the reader had gone idle means the owning socket is
    /// blocked waiting and needs an explicit wake.
    fn push_msg(&mut self, msg: Message) -> bool {
        if !self.to_socket.write(msg) {
            return false;
        }
        if !self.to_socket.flush() {
            let pipe = self.owner.as_ref().map(|&(_, _, p)| p);
            if let Some(pipe) = pipe {
                trace!("[{:?}] waking idle reader on {:?}", self.id, pipe);
                self.notify(CommandBody::ActivateRead(pipe));
            }
        }
        true
    }

    fn pull_msg(&mut self) -> Option<Message> {
        let msg = self.from_socket.read();
        if msg.is_some() && self.from_socket.should_report_credit() {
            let msgs_read = self.from_socket.mark_reported();
            let pipe = self.owner.as_ref().map(|&(_, _, p)| p);
            if let Some(pipe) = pipe {
                trace!("[{:?}] reporting {} message(s) of credit on {:?}", self.id, msgs_read, pipe);
                self.notify(CommandBody::ActivateWrite(pipe, msgs_read));
            }
        }
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipe::new_pipe;

    fn session_with(hwm: u32) -> (Session, PipeWriter, PipeReader) {
        let (to_socket_w, to_socket_r) = new_pipe(hwm, 1);
        let (from_socket_w, from_socket_r) = new_pipe(4, 1);
        let session = Session::new(SessionId(0), to_socket_w, from_socket_r, 100, 1600);
        (session, from_socket_w, to_socket_r)
    }

    #[test]
    fn push_msg_forwards_to_the_socket_side_pipe() {
        let (mut session, _from_socket_w, mut to_socket_r) = session_with(4);
        assert!(session.push_msg(Message::new(vec![1, 2])));
        assert_eq!(to_socket_r.read().unwrap().body(), &[1, 2]);
    }

    #[test]
    fn push_msg_reports_backpressure_when_the_socket_side_pipe_has_no_credit() {
        let (mut session, _from_socket_w, _to_socket_r) = session_with(0);
        assert!(!session.push_msg(Message::new(vec![1])));
    }

    #[test]
    fn pull_msg_reads_whatever_the_socket_queued() {
        let (mut session, mut from_socket_w, _to_socket_r) = session_with(4);
        from_socket_w.write(Message::new(vec![9]));
        from_socket_w.flush();
        assert_eq!(session.pull_msg().unwrap().body(), &[9]);
        assert!(session.pull_msg().is_none());
    }

    #[test]
    fn reconnect_delay_doubles_and_then_saturates_at_the_cap() {
        let (mut session, _w, _r) = session_with(4);
        assert_eq!(session.next_reconnect_delay_ms(), 100);
        assert_eq!(session.next_reconnect_delay_ms(), 200);
        assert_eq!(session.next_reconnect_delay_ms(), 400);
        assert_eq!(session.next_reconnect_delay_ms(), 800);
        assert_eq!(session.next_reconnect_delay_ms(), 1600);
        assert_eq!(session.next_reconnect_delay_ms(), 1600);
    }

    #[test]
    fn reset_backoff_restores_the_initial_delay() {
        let (mut session, _w, _r) = session_with(4);
        session.next_reconnect_delay_ms();
        session.next_reconnect_delay_ms();
        session.reset_backoff();
        assert_eq!(session.next_reconnect_delay_ms(), 100);
    }

    #[test]
    fn push_msg_wakes_the_owning_socket_once_the_reader_had_gone_idle() {
        use mailbox::Mailbox;

        let (to_socket_w, mut to_socket_r) = new_pipe(4, 1);
        let (_from_socket_w, from_socket_r) = new_pipe(4, 1);
        let owner = Mailbox::new();
        let mut session = Session::new(SessionId(0), to_socket_w, from_socket_r, 100, 1600)
            .notify_via(owner.sender(), SocketId(7), PipeId(3));

        session.push_msg(Message::new(vec![1]));
        assert!(owner.try_recv().is_none(), "first flush needs no wake");

        to_socket_r.read();
        session.push_msg(Message::new(vec![2]));
        let cmd = owner.try_recv().unwrap();
        assert_eq!(cmd.name(), "activate_read");
    }

    #[test]
    fn pull_msg_reports_credit_once_the_reader_crosses_the_low_water_mark() {
        use mailbox::Mailbox;

        let (mut from_socket_w, from_socket_r) = new_pipe(4, 2);
        let (to_socket_w, _to_socket_r) = new_pipe(4, 1);
        let owner = Mailbox::new();
        let mut session = Session::new(SessionId(0), to_socket_w, from_socket_r, 100, 1600)
            .notify_via(owner.sender(), SocketId(7), PipeId(3));

        for i in 0..2u8 {
            from_socket_w.write(Message::new(vec![i]));
        }
        from_socket_w.flush();

        session.pull_msg();
        assert!(owner.try_recv().is_none());
        session.pull_msg();
        let cmd = owner.try_recv().unwrap();
        assert_eq!(cmd.name(), "activate_write");
    }
}
