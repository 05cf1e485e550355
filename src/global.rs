// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::fmt;
use std::rc::Rc;
use std::cell::Cell;
use std::io::{Error, ErrorKind};
use std::time;

/// Defines the socket type, which in turn determines the exact semantics of the socket.
///
/// Raw (`X`-prefixed) variants expose framing unchanged and carry no FSM of their own;
/// they exist so devices (proxies) can forward frames between two patterns without
/// the discipline a cooked socket enforces. Cooked variants are built on top of their
/// raw counterpart and add the request/reply, subscription or survey state machine.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum SocketType {
    /// Raw request socket: load-balances outbound round-robin, fair-queues inbound.
    /// No FSM; used to build devices.
    Xreq       = (3 * 16) + 8,

    /// **Request/reply protocol.**
    /// Used to implement the client application that sends requests and receives replies.
    /// Enforces the 2-state Sending/Receiving discipline described in the request-id framing.
    Req        = (3 * 16),

    /// Raw reply socket: on receive, prepends a peer-identity frame identifying the
    /// inbound pipe; on send, uses the first frame as a routing key.
    Xrep       = (3 * 16) + 9,

    /// Used to implement the stateless worker that receives requests and sends replies.
    /// Built on `Xrep`; stashes routing labels on receive and replays them on send.
    Rep        = (3 * 16) + 1,

    /// Raw publisher: distributes outbound messages to every attached pipe whose
    /// subscription set matches, tracked per pipe via a `Filter`.
    Xpub       = (2 * 16) + 8,

    /// **Publish/subscribe protocol.**
    /// This socket is used to distribute messages to multiple destinations.
    /// Receive operation is not defined.
    Pub        = (2 * 16),

    /// Raw subscriber: forwards subscribe/unsubscribe frames upstream on the first
    /// refcount transition, matches inbound messages against the locally cached set.
    Xsub       = (2 * 16) + 9,

    /// Receives messages from the publisher.
    /// Only messages that the socket is subscribed to are received.
    /// Send operation is not defined on this socket.
    Sub        = (2 * 16) + 1,

    /// **Pipeline protocol.**
    /// This socket is used to send messages to a cluster of load-balanced nodes.
    /// Receive operation is not implemented on this socket type.
    Push       = (5 * 16),

    /// This socket is used to receive a message from a cluster of nodes.
    /// Send operation is not implemented on this socket type.
    Pull       = (5 * 16) + 1,

    /// Raw surveyor: emits a survey-id frame, broadcasts the body, fair-queues
    /// responses without enforcing the deadline itself.
    Xsurveyor   = (6 * 16) + 8,

    /// **Survey protocol.**
    /// Used to send the survey. The survey is delivered to all the connected
    /// respondents. Once the query is sent, the socket can be used to receive the
    /// responses. When the survey deadline expires, receive will return `ETIMEDOUT`.
    Surveyor   = (6 * 16) + 2,

    /// Raw respondent: copies routing labels into the reply pipe, does not enforce
    /// single-part replies itself.
    Xrespondent = (6 * 16) + 9,

    /// Used to respond to the survey.
    /// Survey is received using receive function, response is sent using send function.
    Respondent = (6 * 16) + 3,
}

impl SocketType {
    pub fn id(&self) -> u16 {
        *self as u16
    }

    /// The socket type a peer must present for a connection to be accepted.
    pub fn peer(&self) -> SocketType {
        match *self {
            SocketType::Xreq        => SocketType::Xrep,
            SocketType::Req         => SocketType::Xrep,
            SocketType::Xrep        => SocketType::Xreq,
            SocketType::Rep         => SocketType::Xreq,
            SocketType::Xpub        => SocketType::Xsub,
            SocketType::Pub         => SocketType::Xsub,
            SocketType::Xsub        => SocketType::Xpub,
            SocketType::Sub         => SocketType::Xpub,
            SocketType::Push        => SocketType::Pull,
            SocketType::Pull        => SocketType::Push,
            SocketType::Xsurveyor   => SocketType::Xrespondent,
            SocketType::Surveyor    => SocketType::Xrespondent,
            SocketType::Xrespondent => SocketType::Xsurveyor,
            SocketType::Respondent  => SocketType::Xsurveyor,
        }
    }

    pub fn matches(&self, other: SocketType) -> bool {
        self.peer() == other
    }

    /// The SP wire pattern number for the greeting header (`wire.rs`).
    pub fn pattern(&self) -> u8 {
        match *self {
            SocketType::Pub | SocketType::Sub | SocketType::Xpub | SocketType::Xsub => 2,
            SocketType::Req | SocketType::Rep | SocketType::Xreq | SocketType::Xrep => 3,
            SocketType::Push | SocketType::Pull => 4,
            SocketType::Surveyor | SocketType::Respondent
                | SocketType::Xsurveyor | SocketType::Xrespondent => 5,
        }
    }

    /// The SP wire role number for the greeting header (`wire.rs`).
    pub fn role(&self) -> u8 {
        match *self {
            SocketType::Pub | SocketType::Xpub => 1,
            SocketType::Sub | SocketType::Xsub => 2,
            SocketType::Req | SocketType::Xreq => 1,
            SocketType::Rep | SocketType::Xrep => 2,
            SocketType::Push => 1,
            SocketType::Pull => 2,
            SocketType::Surveyor | SocketType::Xsurveyor => 1,
            SocketType::Respondent | SocketType::Xrespondent => 2,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct SocketId(pub usize);

impl fmt::Debug for SocketId {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

/// Identifies a bound or connected endpoint, returned by `bind`/`connect` and
/// consumed by `shutdown`.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct EndpointId(pub usize);

impl fmt::Debug for EndpointId {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

/// Generic and pattern-specific socket options, set through `SocketBase::set_option`
/// and dispatched either to the generic `options` struct or down into `xsetsockopt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketOption {
    Linger(i64),
    SendHwm(u32),
    RecvHwm(u32),
    SendTimeout(i64),
    RecvTimeout(i64),
    ReconnectIvl(u32),
    ReconnectIvlMax(u32),
    Backlog(u32),
    Ipv4Only(bool),
    /// Wire protocol version: `1` selects the 0MQ/2.1-compatible subscription
    /// framing, any other value the current SP framing.
    Protocol(u8),
    Subscribe(Vec<u8>),
    Unsubscribe(Vec<u8>),
    /// Selects the publisher/subscriber matching plugin (`filter::PREFIX`/`TOPIC`).
    Filter(u16),
    SurveyTimeout(i64),
    MaxMsgSize(i64),
}

#[derive(Clone)]
pub struct IdSequence {
    value: Rc<Cell<usize>>
}

impl IdSequence {
    pub fn new() -> IdSequence {
        IdSequence { value: Rc::new(Cell::new(0)) }
    }

    pub fn next(&self) -> usize {
        let id = self.value.get();

        self.value.set(id + 1);
        id
    }
}

impl Default for IdSequence {
    fn default() -> Self {
        IdSequence::new()
    }
}

// Error constructors. Each named error code from the spec's wire/error table maps
// to one of these; `Other(msg)` carries the code name itself so callers can match
// on `err.to_string()` the way the original's errno constants were matched on.
pub fn other_io_error(msg: &'static str) -> Error {
    Error::new(ErrorKind::Other, msg)
}

pub fn invalid_data_io_error(msg: &'static str) -> Error {
    Error::new(ErrorKind::InvalidData, msg)
}

pub fn would_block_io_error(msg: &'static str) -> Error {
    Error::new(ErrorKind::WouldBlock, msg)
}

pub fn invalid_input_io_error(msg: &'static str) -> Error {
    Error::new(ErrorKind::InvalidInput, msg)
}

/// Pattern FSM forbids the call in the socket's current state (`EFSM`).
pub fn fsm_io_error(msg: &'static str) -> Error {
    Error::new(ErrorKind::Other, format!("EFSM: {}", msg))
}

/// Pattern does not support the operation at all, e.g. `send` on a `Sub` (`ENOTSUP`).
pub fn not_supported_io_error(msg: &'static str) -> Error {
    Error::new(ErrorKind::Other, format!("ENOTSUP: {}", msg))
}

/// Context has entered `terminating` state (`ETERM`).
pub fn term_io_error() -> Error {
    Error::new(ErrorKind::Other, "ETERM")
}

/// Context slot table is exhausted (`EMFILE`).
pub fn too_many_sockets_io_error() -> Error {
    Error::new(ErrorKind::Other, "EMFILE")
}

/// A pattern-level deadline (e.g. survey) elapsed; distinct from a plain `sndtimeo`/
/// `rcvtimeo` expiry, which surfaces as `WouldBlock`/`TimedOut` instead.
pub fn timed_out_io_error() -> Error {
    Error::new(ErrorKind::TimedOut, "ETIMEDOUT")
}

pub fn addr_in_use_io_error(msg: String) -> Error {
    Error::new(ErrorKind::AddrInUse, msg)
}

pub trait ToMillis {
    fn to_millis(&self) -> u64;
}

impl ToMillis for time::Duration {
    fn to_millis(&self) -> u64 {
        let millis_from_secs = self.as_secs() * 1_000;
        let millis_from_nanos = self.subsec_nanos() as f64 / 1_000_000f64;

        millis_from_secs + millis_from_nanos as u64
    }
}

#[cfg(test)]
mod tests {
    use super::{IdSequence, SocketType};

    #[test]
    fn id_sequence_can_be_cloned() {
        let seq = IdSequence::new();
        let other = seq.clone();

        assert_eq!(0, other.next());
        assert_eq!(1, seq.next());
        assert_eq!(2, seq.next());
        assert_eq!(3, other.next());
    }

    #[test]
    fn socket_types_pair_symmetrically() {
        assert!(SocketType::Req.matches(SocketType::Xrep));
        assert!(SocketType::Sub.matches(SocketType::Xpub));
        assert!(SocketType::Surveyor.matches(SocketType::Xrespondent));
        assert!(SocketType::Push.matches(SocketType::Pull));
        assert_eq!(SocketType::Push.peer(), SocketType::Pull);
    }
}
