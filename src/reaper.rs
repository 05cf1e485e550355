// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Orderly socket teardown. `Context::term()` hands each socket being closed
//! to the Reaper via `adopt`, naming the pipes it must still hear a
//! `PipeTermAck` for; the Reaper reports `Reaped(socket)` once every pipe
//! has acked, and `Done` once every adopted socket has been reaped. No
//! `reaper.cpp` ships in the retrieval pack (only `ctx.cpp`'s references to
//! it survive), so this is grounded on `ctx.cpp`'s `terminate()` sequencing
//! (create the reaper thread, hand it sockets, `reaper->stop()` once the
//! slot table is empty, block until it is done) rather than a line-for-line
//! port.

use std::collections::HashMap;

use command::{Command, CommandBody, Destination, PipeId};
use global::SocketId;
use mailbox::{Mailbox, MailboxSender};

pub struct Reaper {
    mailbox: Mailbox,
    owner: MailboxSender,
    /// Sockets currently being torn down, mapped to the pipes still owed a
    /// `PipeTermAck`.
    outstanding: HashMap<SocketId, Vec<PipeId>>,
}

impl Reaper {
    pub fn new(owner: MailboxSender) -> Reaper {
        Reaper { mailbox: Mailbox::new(), owner: owner, outstanding: HashMap::new() }
    }

    pub fn mailbox_sender(&self) -> MailboxSender {
        self.mailbox.sender()
    }

    /// Registers `socket` as being torn down, with `pipes` the set still
    /// owed a termination handshake. A socket with no pipes at all is
    /// reported `Reaped` immediately.
    pub fn adopt(&mut self, socket: SocketId, pipes: Vec<PipeId>) {
        debug!("reaping {:?}, {} pipe(s) outstanding", socket, pipes.len());
        if pipes.is_empty() {
            self.report_reaped(socket);
        } else {
            self.outstanding.insert(socket, pipes);
        }
    }

    pub fn is_idle(&self) -> bool {
        self.outstanding.is_empty()
    }

    fn ack_pipe(&mut self, pipe: PipeId) {
        let mut done = None;
        for (socket, pipes) in self.outstanding.iter_mut() {
            if let Some(pos) = pipes.iter().position(|&p| p == pipe) {
                pipes.remove(pos);
                if pipes.is_empty() {
                    done = Some(*socket);
                }
                break;
            }
        }
        if let Some(socket) = done {
            self.outstanding.remove(&socket);
            debug!("{:?} drained its last pipe", socket);
            self.report_reaped(socket);
        }
    }

    fn report_reaped(&self, socket: SocketId) {
        let _ = self.owner.send(Command::new(Destination::Context, CommandBody::Reaped(socket)));
        if self.is_idle() {
            let _ = self.owner.send(Command::new(Destination::Context, CommandBody::Done));
        }
    }

    fn handle(&mut self, body: CommandBody) -> bool {
        match body {
            CommandBody::Stop => return false,
            CommandBody::PipeTermAck(pipe) => self.ack_pipe(pipe),
            CommandBody::Reap(socket, pipes) => self.adopt(socket, pipes),
            _ => {}
        }
        true
    }

    /// Drains whatever is queued. Returns `false` once a `Stop` command has
    /// been processed.
    pub fn run_once(&mut self) -> bool {
        while let Some(cmd) = self.mailbox.try_recv() {
            if !self.handle(cmd.body) {
                return false;
            }
        }
        true
    }

    /// Blocks on the mailbox forever, one command at a time, until `Stop`.
    /// This is what the Reaper's dedicated thread runs.
    pub fn run(&mut self) {
        loop {
            match self.mailbox.recv(None) {
                Ok(cmd) => {
                    if !self.handle(cmd.body) {
                        return;
                    }
                }
                Err(_) => continue,
            }
        }
    }
}
