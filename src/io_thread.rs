// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! A single poller thread driving any number of `Engine`s plus their one-shot
//! timers and the cross-thread command mailbox. Per the I/O thread
//! specification: `wait = min(next timer expiry, forever); poll; dispatch
//! readiness; drain the mailbox; repeat`. Grounded on the teacher's
//! `event_loop_msg.rs`/`mio::EventLoop`-based reactor, retargeted from its
//! single hard-coded stream handler onto the generic `engine::Engine`
//! contract and widened with `TimerWheel` for pattern-level deadlines
//! (survey timeout, reconnect backoff).

use std::collections::HashMap;
use std::io;
use std::time::{Duration, Instant};

use mio::{Events, Poll, PollOpt, Ready, Token};

use command::{Command, CommandBody, Destination, IoThreadId, SessionId};
use engine::{Engine, EngineContext, SessionHandle};
use global::ToMillis;
use mailbox::{Mailbox, MailboxSender};
use timer_wheel::{TimerId, TimerWheel};

/// Reserved for the mailbox's own wake signal; engine tokens start at 1.
const MAILBOX_TOKEN: Token = Token(0);

struct EngineSlot {
    engine: Box<dyn Engine>,
    session: Box<dyn SessionHandle>,
    token: Token,
    readable: bool,
    writable: bool,
}

/// What an `Engine` sees while it is being dispatched into: a thin view onto
/// its own slot's interest flags plus the shared `TimerWheel`. Never touches
/// `mio::Poll` directly — `IoThread` reconciles the slot's flags with the
/// poller once the dispatch returns, since that is also the point where it
/// has the slot's `Evented` borrowed.
struct Dispatch<'a> {
    timers: &'a mut TimerWheel,
    timer_owners: &'a mut HashMap<TimerId, SessionId>,
    session: SessionId,
    readable: &'a mut bool,
    writable: &'a mut bool,
}

impl<'a> EngineContext for Dispatch<'a> {
    fn set_pollin(&mut self) {
        *self.readable = true;
    }

    fn set_pollout(&mut self) {
        *self.writable = true;
    }

    fn reset_pollin(&mut self) {
        *self.readable = false;
    }

    fn reset_pollout(&mut self) {
        *self.writable = false;
    }

    fn add_timer(&mut self, delay_ms: u64) -> TimerId {
        let id = self.timers.add_timer(delay_ms);
        self.timer_owners.insert(id, self.session);
        id
    }

    fn rm_timer(&mut self, id: TimerId) {
        self.timers.rm_timer(id);
        self.timer_owners.remove(&id);
    }
}

pub struct IoThread {
    id: IoThreadId,
    poll: Poll,
    mailbox: Mailbox,
    timers: TimerWheel,
    timer_owners: HashMap<TimerId, SessionId>,
    sessions: HashMap<SessionId, EngineSlot>,
    tokens: HashMap<Token, SessionId>,
    next_token: usize,
    start: Instant,
}

fn interest_of(readable: bool, writable: bool) -> Ready {
    let mut ready = Ready::empty();
    if readable {
        ready = ready | Ready::readable();
    }
    if writable {
        ready = ready | Ready::writable();
    }
    ready
}

impl IoThread {
    pub fn new(id: IoThreadId) -> io::Result<IoThread> {
        let poll = Poll::new()?;
        let mailbox = Mailbox::new();
        mailbox.signaler().register(&poll, MAILBOX_TOKEN)?;

        Ok(IoThread {
            id: id,
            poll: poll,
            mailbox: mailbox,
            timers: TimerWheel::new(),
            timer_owners: HashMap::new(),
            sessions: HashMap::new(),
            tokens: HashMap::new(),
            next_token: 1,
            start: Instant::now(),
        })
    }

    pub fn id(&self) -> IoThreadId {
        self.id
    }

    pub fn mailbox_sender(&self) -> MailboxSender {
        self.mailbox.sender()
    }

    fn now_ms(&self) -> u64 {
        self.start.elapsed().to_millis()
    }

    /// Runs the event loop until a `Stop` command is drained, reusing one
    /// `Events` buffer across iterations.
    pub fn run(&mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(1024);
        loop {
            let now_ms = self.now_ms();
            if !self.run_once(&mut events, now_ms)? {
                return Ok(());
            }
        }
    }

    /// Registers a freshly created engine under `session`, starting with
    /// read interest only; an engine asks for write interest itself via
    /// `set_pollout` once it has something queued (`activate_out`).
    pub fn plug(&mut self, session: SessionId, mut engine: Box<dyn Engine>, handle: Box<dyn SessionHandle>) -> io::Result<()> {
        let token = Token(self.next_token);
        self.next_token += 1;

        self.poll.register(engine.evented(), token, Ready::readable(), PollOpt::level())?;

        let mut readable = true;
        let mut writable = false;
        {
            let mut dispatch = Dispatch {
                timers: &mut self.timers,
                timer_owners: &mut self.timer_owners,
                session: session,
                readable: &mut readable,
                writable: &mut writable,
            };
            engine.plug(&mut dispatch);
        }

        self.poll.reregister(engine.evented(), token, interest_of(readable, writable), PollOpt::level())?;

        self.tokens.insert(token, session);
        self.sessions.insert(session, EngineSlot {
            engine: engine,
            session: handle,
            token: token,
            readable: readable,
            writable: writable,
        });
        debug!("[{:?}] plugged session {:?} as {:?}", self.id, session, token);
        Ok(())
    }

    pub fn unplug(&mut self, session: SessionId) {
        if let Some(mut slot) = self.sessions.remove(&session) {
            debug!("[{:?}] unplugged session {:?}", self.id, session);
            let _ = self.poll.deregister(slot.engine.evented());
            self.tokens.remove(&slot.token);
            slot.engine.unplug();
            self.timer_owners.retain(|_, owner| *owner != session);
        }
    }

    /// One iteration: wait for the next timer or readiness event (whichever
    /// comes first), dispatch it, then drain whatever commands piled up in
    /// the mailbox while we were blocked. Returns `false` once a `Stop`
    /// command for this thread has been processed.
    pub fn run_once(&mut self, events: &mut Events, now_ms: u64) -> io::Result<bool> {
        let wait = self.timers.next_timeout(now_ms).map(Duration::from_millis);
        self.poll.poll(events, wait)?;

        let ready: Vec<(Token, Ready)> = events.iter()
            .filter(|e| e.token() != MAILBOX_TOKEN)
            .map(|e| (e.token(), e.readiness()))
            .collect();
        for (token, readiness) in ready {
            self.dispatch_io(token, readiness)?;
        }

        let expired = self.timers.expire(now_ms);
        for id in expired {
            self.dispatch_timer(id)?;
        }

        self.drain_mailbox()
    }

    fn dispatch_io(&mut self, token: Token, readiness: Ready) -> io::Result<()> {
        let session = match self.tokens.get(&token) {
            Some(&s) => s,
            None => return Ok(()),
        };
        self.with_slot(session, |dispatch, engine, handle| {
            if readiness.is_readable() {
                let _ = engine.in_event(dispatch, handle);
            }
            if readiness.is_writable() {
                let _ = engine.out_event(dispatch, handle);
            }
        })
    }

    fn dispatch_timer(&mut self, id: TimerId) -> io::Result<()> {
        let session = match self.timer_owners.remove(&id) {
            Some(s) => s,
            None => return Ok(()),
        };
        self.with_slot(session, |dispatch, engine, _handle| {
            engine.timer_event(dispatch, id);
        })
    }

    /// Runs `f` against the named session's engine (and its session handle)
    /// with a freshly built `Dispatch`, then reconciles the slot's (possibly
    /// changed) interest flags with the poller.
    fn with_slot<F>(&mut self, session: SessionId, f: F) -> io::Result<()>
        where F: FnOnce(&mut Dispatch, &mut dyn Engine, &mut dyn SessionHandle)
    {
        let IoThread { ref mut sessions, ref mut timers, ref mut timer_owners, ref poll, .. } = *self;

        let slot = match sessions.get_mut(&session) {
            Some(slot) => slot,
            None => return Ok(()),
        };

        {
            let mut dispatch = Dispatch {
                timers: timers,
                timer_owners: timer_owners,
                session: session,
                readable: &mut slot.readable,
                writable: &mut slot.writable,
            };
            f(&mut dispatch, &mut *slot.engine, &mut *slot.session);
        }

        poll.reregister(slot.engine.evented(), slot.token, interest_of(slot.readable, slot.writable), PollOpt::level())
    }

    fn drain_mailbox(&mut self) -> io::Result<bool> {
        while let Some(cmd) = self.mailbox.try_recv() {
            if !self.handle_command(cmd) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn handle_command(&mut self, cmd: Command) -> bool {
        trace!("[{:?}] {:?} -> {}", self.id, cmd.destination, cmd.name());
        match (cmd.destination, cmd.body) {
            (_, CommandBody::Stop) => return false,
            (Destination::Session(session), CommandBody::ActivateRead(_)) => {
                let _ = self.with_slot(session, |dispatch, engine, _handle| engine.activate_in(dispatch));
            }
            (Destination::Session(session), CommandBody::ActivateWrite(_, _)) => {
                let _ = self.with_slot(session, |dispatch, engine, _handle| engine.activate_out(dispatch));
            }
            (_, CommandBody::OpenSession(session, engine, handle)) => {
                if let Err(e) = self.plug(session, engine, handle) {
                    warn!("[{:?}] failed to plug session {:?}: {}", self.id, session, e);
                }
            }
            _ => {}
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use mio::{Evented, Registration, SetReadiness};

    use command::{Command, CommandBody, Destination, IoThreadId, SessionId};
    use message::Message;

    struct RecordingSession {
        pushed: Rc<RefCell<Vec<Vec<u8>>>>,
    }

    impl SessionHandle for RecordingSession {
        fn push_msg(&mut self, msg: Message) -> bool {
            self.pushed.borrow_mut().push(msg.body().to_vec());
            true
        }

        fn pull_msg(&mut self) -> Option<Message> {
            None
        }
    }

    struct FakeEngine {
        registration: Registration,
        set_readiness: SetReadiness,
        plugged: bool,
    }

    impl Engine for FakeEngine {
        fn evented(&self) -> &dyn Evented {
            &self.registration
        }

        fn plug(&mut self, ctx: &mut dyn EngineContext) {
            self.plugged = true;
            ctx.set_pollin();
        }

        fn unplug(&mut self) {
            self.plugged = false;
        }

        fn terminate(&mut self, _ctx: &mut dyn EngineContext) {}
        fn activate_in(&mut self, _ctx: &mut dyn EngineContext) {}
        fn activate_out(&mut self, _ctx: &mut dyn EngineContext) {}

        fn in_event(&mut self, _ctx: &mut dyn EngineContext, session: &mut dyn SessionHandle) -> io::Result<()> {
            session.push_msg(Message::new(vec![7, 8, 9]));
            self.set_readiness.set_readiness(::mio::Ready::empty())
        }

        fn out_event(&mut self, _ctx: &mut dyn EngineContext, _session: &mut dyn SessionHandle) -> io::Result<()> {
            Ok(())
        }

        fn timer_event(&mut self, _ctx: &mut dyn EngineContext, _id: TimerId) {}
    }

    #[test]
    fn readiness_on_an_engines_evented_source_dispatches_in_event() {
        let mut thread = IoThread::new(IoThreadId(0)).unwrap();
        let (registration, set_readiness) = Registration::new2();
        let pushed = Rc::new(RefCell::new(Vec::new()));

        let engine = Box::new(FakeEngine { registration: registration, set_readiness: set_readiness.clone(), plugged: false });
        let session = Box::new(RecordingSession { pushed: pushed.clone() });
        thread.plug(SessionId(0), engine, session).unwrap();

        set_readiness.set_readiness(::mio::Ready::readable()).unwrap();

        let mut events = Events::with_capacity(8);
        let keep_going = thread.run_once(&mut events, 0).unwrap();

        assert!(keep_going);
        assert_eq!(pushed.borrow().len(), 1);
        assert_eq!(pushed.borrow()[0], vec![7, 8, 9]);
    }

    #[test]
    fn open_session_command_plugs_the_engine() {
        let mut thread = IoThread::new(IoThreadId(0)).unwrap();
        let (registration, set_readiness) = Registration::new2();
        let pushed = Rc::new(RefCell::new(Vec::new()));
        let engine = Box::new(FakeEngine { registration: registration, set_readiness: set_readiness.clone(), plugged: false });
        let session = Box::new(RecordingSession { pushed: pushed });

        thread.mailbox_sender().send(Command::new(
            Destination::IoThread(IoThreadId(0)),
            CommandBody::OpenSession(SessionId(5), engine, session),
        )).unwrap();

        let mut events = Events::with_capacity(8);
        thread.run_once(&mut events, 0).unwrap();

        assert!(thread.sessions.contains_key(&SessionId(5)));
    }

    #[test]
    fn stop_command_ends_the_loop() {
        let mut thread = IoThread::new(IoThreadId(0)).unwrap();
        thread.mailbox_sender().send(Command::new(Destination::IoThread(IoThreadId(0)), CommandBody::Stop)).unwrap();

        let mut events = Events::with_capacity(8);
        let keep_going = thread.run_once(&mut events, 0).unwrap();
        assert!(!keep_going);
    }

    #[test]
    fn unplugging_deregisters_and_drops_owned_timers() {
        let mut thread = IoThread::new(IoThreadId(0)).unwrap();
        let (registration, set_readiness) = Registration::new2();
        let pushed = Rc::new(RefCell::new(Vec::new()));
        let engine = Box::new(FakeEngine { registration: registration, set_readiness: set_readiness, plugged: false });
        let session = Box::new(RecordingSession { pushed: pushed });
        thread.plug(SessionId(1), engine, session).unwrap();
        assert!(thread.sessions.contains_key(&SessionId(1)));

        thread.unplug(SessionId(1));
        assert!(!thread.sessions.contains_key(&SessionId(1)));
    }
}
