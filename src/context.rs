// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The process-wide Context: the slot table (term mailbox / Reaper / I/O
//! threads / Sockets, addressed by TID), the named-endpoint registry used
//! for `inproc://` rendezvous, the filter plug-in registry (`PREFIX`/`TOPIC`
//! built in, more installable via `register_filter`), and the monotonic
//! socket-id counter. Grounded on `ctx.cpp`: `slots[0]` is the term mailbox,
//! `slots[1]` is the Reaper, the rest are I/O threads then sockets;
//! `create_socket`/`terminate` mirror its allocate/stop/wait sequencing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::thread::JoinHandle;

use command::{Command, CommandBody, Destination, IoThreadId, SessionId};
use filter::prefix::{PrefixFilter, PrefixSubscriberFilter};
use filter::topic::{TopicFilter, TopicSubscriberFilter};
use filter::{self, FilterId, PublisherFilter, SubscriberFilter};
use global::{too_many_sockets_io_error, SocketId};
use io_thread::IoThread;
use mailbox::{Mailbox, MailboxSender};
use reaper::Reaper;

type PublisherFilterFactory = fn() -> Box<dyn PublisherFilter>;
type SubscriberFilterFactory = fn() -> Box<dyn SubscriberFilter>;

fn new_prefix_publisher_filter() -> Box<dyn PublisherFilter> {
    Box::new(PrefixFilter::new())
}

fn new_prefix_subscriber_filter() -> Box<dyn SubscriberFilter> {
    Box::new(PrefixSubscriberFilter::new())
}

fn new_topic_publisher_filter() -> Box<dyn PublisherFilter> {
    Box::new(TopicFilter::new())
}

fn new_topic_subscriber_filter() -> Box<dyn SubscriberFilter> {
    Box::new(TopicSubscriberFilter::new())
}

/// The Context's registry of subscription-matching plug-ins, keyed by
/// `filter-id`. `PREFIX` and `TOPIC` are registered at construction; a
/// `PLUGIN` context option would call `register` with additional factories
/// (discovering them from a shared object on disk is out of scope).
struct FilterRegistry {
    publisher: HashMap<FilterId, PublisherFilterFactory>,
    subscriber: HashMap<FilterId, SubscriberFilterFactory>,
}

impl FilterRegistry {
    fn new() -> FilterRegistry {
        let mut registry = FilterRegistry { publisher: HashMap::new(), subscriber: HashMap::new() };
        registry.register(filter::PREFIX, new_prefix_publisher_filter, new_prefix_subscriber_filter);
        registry.register(filter::TOPIC, new_topic_publisher_filter, new_topic_subscriber_filter);
        registry
    }

    fn register(&mut self, id: FilterId, publisher: PublisherFilterFactory, subscriber: SubscriberFilterFactory) {
        self.publisher.insert(id, publisher);
        self.subscriber.insert(id, subscriber);
    }

    fn new_publisher(&self, id: FilterId) -> Option<Box<dyn PublisherFilter>> {
        self.publisher.get(&id).map(|factory| factory())
    }

    fn new_subscriber(&self, id: FilterId) -> Option<Box<dyn SubscriberFilter>> {
        self.subscriber.get(&id).map(|factory| factory())
    }
}

/// What a slot in the Context's table currently holds. `Empty` slots are
/// recycled by `next_free_slot` before the table is grown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Empty,
    Term,
    Reaper,
    IoThread,
    Socket(SocketId),
}

fn is_socket_slot(slot: &Slot) -> bool {
    match *slot {
        Slot::Socket(_) => true,
        _ => false,
    }
}

/// Lock-protected, since the endpoint table, filter registry and slot table
/// are the only state shared across actor threads (spec §5).
struct Shared {
    slots: Vec<Slot>,
    endpoints: HashMap<String, SocketId>,
    filters: FilterRegistry,
    terminating: bool,
    /// Every live socket's inbox, so an `inproc://` connector can hand its
    /// pipe half straight to the listening socket without routing through
    /// an I/O thread (inproc has no transport to carry it over).
    sockets: HashMap<SocketId, MailboxSender>,
    next_socket_id: usize,
    next_session_id: usize,
    next_io_thread: usize,
    next_pipe_id: usize,
}

/// A `Context` is handed to sockets running on whatever application thread
/// created them, so every field must be safe to share across threads: the
/// socket/endpoint/filter registries live behind `Mutex`, and the I/O thread
/// pool + reaper are plain `MailboxSender`s to actors already running on
/// their own dedicated OS threads.
#[derive(Clone)]
pub struct Context {
    shared: Arc<Mutex<Shared>>,
    max_sockets: usize,
    io_thread_senders: Arc<HashMap<IoThreadId, MailboxSender>>,
    reaper_sender: MailboxSender,
    threads: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

pub const DEFAULT_MAX_SOCKETS: usize = 512;
pub const DEFAULT_IO_THREADS: usize = 1;

impl Context {
    /// `io_threads` slots (2..2+io_threads) are reserved up front for the
    /// I/O thread pool; slot 0 is the term mailbox, slot 1 the Reaper.
    /// Spawns one OS thread per I/O thread plus one for the Reaper, each
    /// running its own blocking loop off its own mailbox — mirroring
    /// `ctx.cpp`'s `start_thread` calls in `init`, generalized from a single
    /// hard-coded reactor since this crate runs the I/O thread pool for real
    /// rather than folding everything into one `mio::EventLoop`.
    pub fn new(io_threads: usize, max_sockets: usize) -> Context {
        let mut slots = vec![Slot::Term, Slot::Reaper];
        for _ in 0..io_threads {
            slots.push(Slot::IoThread);
        }

        // The Reaper reports `Reaped`/`Done` to this inbox; nothing drains it
        // today since `Context::term` joins the pool directly rather than
        // blocking on a `Done` message, but the Reaper still needs somewhere
        // to report to.
        let reaper_reports = Mailbox::new();
        let mut reaper = Reaper::new(reaper_reports.sender());
        let reaper_sender = reaper.mailbox_sender();
        let mut threads = Vec::new();
        threads.push(thread::spawn(move || reaper.run()));

        let mut io_thread_senders = HashMap::new();
        for (i, _) in slots.iter().enumerate().filter(|&(_, s)| *s == Slot::IoThread) {
            let id = IoThreadId(i);
            let mut io_thread = IoThread::new(id).expect("failed to create an I/O thread's poller");
            io_thread_senders.insert(id, io_thread.mailbox_sender());
            threads.push(thread::spawn(move || { let _ = io_thread.run(); }));
        }

        Context {
            shared: Arc::new(Mutex::new(Shared {
                slots: slots,
                endpoints: HashMap::new(),
                filters: FilterRegistry::new(),
                terminating: false,
                sockets: HashMap::new(),
                next_socket_id: 0,
                next_session_id: 0,
                next_io_thread: 0,
                next_pipe_id: 0,
            })),
            max_sockets: max_sockets,
            io_thread_senders: Arc::new(io_thread_senders),
            reaper_sender: reaper_sender,
            threads: Arc::new(Mutex::new(threads)),
        }
    }

    pub fn io_thread_ids(&self) -> Vec<IoThreadId> {
        let shared = self.shared.lock().unwrap();
        shared.slots.iter().enumerate()
            .filter(|&(_, slot)| *slot == Slot::IoThread)
            .map(|(i, _)| IoThreadId(i))
            .collect()
    }

    /// Round-robins across the I/O thread pool, the way `ctx.cpp`'s
    /// `choose_io_thread` picks the least-loaded thread (here simplified to
    /// a plain rotation, since no per-thread load counter is exposed outside
    /// `io_thread::IoThread` itself).
    pub fn choose_io_thread(&self) -> Option<IoThreadId> {
        let mut shared = self.shared.lock().unwrap();
        let ids: Vec<IoThreadId> = shared.slots.iter().enumerate()
            .filter(|&(_, slot)| *slot == Slot::IoThread)
            .map(|(i, _)| IoThreadId(i))
            .collect();
        if ids.is_empty() {
            return None;
        }
        let pick = ids[shared.next_io_thread % ids.len()];
        shared.next_io_thread = shared.next_io_thread.wrapping_add(1);
        Some(pick)
    }

    pub fn io_thread_sender(&self, id: IoThreadId) -> Option<MailboxSender> {
        self.io_thread_senders.get(&id).cloned()
    }

    pub fn reaper_sender(&self) -> MailboxSender {
        self.reaper_sender.clone()
    }

    pub fn next_session_id(&self) -> SessionId {
        let mut shared = self.shared.lock().unwrap();
        let id = shared.next_session_id;
        shared.next_session_id += 1;
        SessionId(id)
    }

    /// Allocates a fresh pipe-id, shared across every socket so an `inproc://`
    /// rendezvous and a transport-backed connection never collide on the same
    /// handle even though each socket otherwise only ever sees its own half.
    pub fn next_pipe_id(&self) -> ::command::PipeId {
        let mut shared = self.shared.lock().unwrap();
        let id = shared.next_pipe_id;
        shared.next_pipe_id += 1;
        ::command::PipeId(id)
    }

    /// Allocates a fresh socket-id and a slot for it. Fails with `EMFILE`
    /// once `max_sockets` is reached, or `ETERM` if `terminate` is already
    /// underway.
    pub fn create_socket(&self) -> ::std::io::Result<SocketId> {
        let mut shared = self.shared.lock().unwrap();
        if shared.terminating {
            return Err(::global::term_io_error());
        }

        let socket_count = shared.slots.iter().filter(|s| is_socket_slot(s)).count();
        if socket_count >= self.max_sockets {
            return Err(too_many_sockets_io_error());
        }

        let id = SocketId(shared.next_socket_id);
        shared.next_socket_id += 1;
        if let Some(pos) = shared.slots.iter().position(|s| *s == Slot::Empty) {
            shared.slots[pos] = Slot::Socket(id);
        } else {
            shared.slots.push(Slot::Socket(id));
        }
        debug!("created socket {:?}", id);
        Ok(id)
    }

    /// Frees `id`'s slot once the Reaper has finished destroying it.
    pub fn release_socket(&self, id: SocketId) {
        let mut shared = self.shared.lock().unwrap();
        if let Some(pos) = shared.slots.iter().position(|s| *s == Slot::Socket(id)) {
            shared.slots[pos] = Slot::Empty;
        }
        shared.endpoints.retain(|_, &mut owner| owner != id);
        shared.sockets.remove(&id);
    }

    /// Publishes `id`'s inbox so other sockets in the same process can reach
    /// it directly for `inproc://` rendezvous.
    pub fn register_socket_mailbox(&self, id: SocketId, sender: MailboxSender) {
        self.shared.lock().unwrap().sockets.insert(id, sender);
    }

    pub fn socket_mailbox(&self, id: SocketId) -> Option<MailboxSender> {
        self.shared.lock().unwrap().sockets.get(&id).cloned()
    }

    pub fn begin_terminate(&self) {
        self.shared.lock().unwrap().terminating = true;
    }

    pub fn is_terminating(&self) -> bool {
        self.shared.lock().unwrap().terminating
    }

    /// Stops every live socket, the I/O thread pool and the Reaper, then
    /// blocks until every spawned thread has exited. Per `ctx.cpp`'s
    /// `terminate()`: sockets are stopped first (`Stop` causes their blocked
    /// `send`/`recv` calls to observe `ETERM`); the I/O threads and Reaper
    /// are stopped directly rather than waited on, since this crate's
    /// sockets reap their own pipes synchronously in `SocketBase::term`
    /// instead of leaving that to a `Done` report the Reaper would send back.
    pub fn term(&self) -> ::std::io::Result<()> {
        info!("context terminating");
        self.begin_terminate();

        {
            let shared = self.shared.lock().unwrap();
            for sender in shared.sockets.values() {
                let _ = sender.send(Command::new(Destination::Context, CommandBody::Stop));
            }
        }

        for sender in self.io_thread_senders.values() {
            let _ = sender.send(Command::new(Destination::Context, CommandBody::Stop));
        }
        let _ = self.reaper_sender.send(Command::new(Destination::Reaper, CommandBody::Stop));

        let mut threads = self.threads.lock().unwrap();
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
        info!("context terminated");
        Ok(())
    }

    pub fn socket_count(&self) -> usize {
        let shared = self.shared.lock().unwrap();
        shared.slots.iter().filter(|s| matches!(*s, &Slot::Socket(_))).count()
    }

    /// Registers `name` (the path component of an `inproc://name` endpoint)
    /// as owned by `socket`. Fails if another socket already bound it.
    pub fn register_endpoint(&self, name: &str, socket: SocketId) -> ::std::io::Result<()> {
        let mut shared = self.shared.lock().unwrap();
        if shared.endpoints.contains_key(name) {
            return Err(::global::addr_in_use_io_error(format!("inproc address in use: {}", name)));
        }
        shared.endpoints.insert(name.to_owned(), socket);
        Ok(())
    }

    pub fn find_endpoint(&self, name: &str) -> Option<SocketId> {
        self.shared.lock().unwrap().endpoints.get(name).cloned()
    }

    pub fn unregister_endpoint(&self, name: &str) {
        self.shared.lock().unwrap().endpoints.remove(name);
    }

    pub fn new_publisher_filter(&self, id: FilterId) -> Option<Box<dyn PublisherFilter>> {
        self.shared.lock().unwrap().filters.new_publisher(id)
    }

    pub fn new_subscriber_filter(&self, id: FilterId) -> Option<Box<dyn SubscriberFilter>> {
        self.shared.lock().unwrap().filters.new_subscriber(id)
    }

    pub fn register_filter(&self, id: FilterId, publisher: PublisherFilterFactory, subscriber: SubscriberFilterFactory) {
        self.shared.lock().unwrap().filters.register(id, publisher, subscriber);
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new(DEFAULT_IO_THREADS, DEFAULT_MAX_SOCKETS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_thread_slots_follow_the_term_and_reaper_slots() {
        let ctx = Context::new(2, 16);
        assert_eq!(ctx.io_thread_ids(), vec![IoThreadId(2), IoThreadId(3)]);
    }

    #[test]
    fn sockets_get_distinct_increasing_ids() {
        let ctx = Context::new(1, 16);
        let a = ctx.create_socket().unwrap();
        let b = ctx.create_socket().unwrap();
        assert!(a.0 < b.0);
        assert_eq!(ctx.socket_count(), 2);
    }

    #[test]
    fn create_socket_fails_once_max_sockets_is_reached() {
        let ctx = Context::new(1, 1);
        ctx.create_socket().unwrap();
        assert!(ctx.create_socket().is_err());
    }

    #[test]
    fn releasing_a_socket_frees_its_slot_for_reuse() {
        let ctx = Context::new(1, 1);
        let a = ctx.create_socket().unwrap();
        ctx.release_socket(a);
        assert_eq!(ctx.socket_count(), 0);
        assert!(ctx.create_socket().is_ok());
    }

    #[test]
    fn create_socket_fails_once_terminating() {
        let ctx = Context::new(1, 16);
        ctx.begin_terminate();
        assert!(ctx.create_socket().is_err());
    }

    #[test]
    fn inproc_endpoint_registration_is_exclusive() {
        let ctx = Context::new(1, 16);
        let a = ctx.create_socket().unwrap();
        let b = ctx.create_socket().unwrap();
        ctx.register_endpoint("svc", a).unwrap();
        assert!(ctx.register_endpoint("svc", b).is_err());
        assert_eq!(ctx.find_endpoint("svc"), Some(a));

        ctx.release_socket(a);
        assert_eq!(ctx.find_endpoint("svc"), None);
    }

    #[test]
    fn socket_mailbox_lookup_tracks_registration_and_release() {
        use mailbox::Mailbox;

        let ctx = Context::new(1, 16);
        let a = ctx.create_socket().unwrap();
        let mailbox = Mailbox::new();
        ctx.register_socket_mailbox(a, mailbox.sender());
        assert!(ctx.socket_mailbox(a).is_some());

        ctx.release_socket(a);
        assert!(ctx.socket_mailbox(a).is_none());
    }

    #[test]
    fn built_in_filters_are_preregistered() {
        let ctx = Context::new(1, 16);
        assert!(ctx.new_publisher_filter(filter::PREFIX).is_some());
        assert!(ctx.new_subscriber_filter(filter::TOPIC).is_some());
        assert!(ctx.new_publisher_filter(999).is_none());
    }
}
