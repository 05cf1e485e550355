// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Core actor-model engine for a brokerless, socket-like messaging library:
//! `Context` owns the I/O thread pool and the Reaper, `Command`s are the sole
//! means by which actors (I/O threads, sessions, sockets) change each other's
//! state, and `patterns::Protocol` implementations drive REQ/REP, PUB/SUB,
//! PUSH/PULL and SURVEYOR/RESPONDENT. `facade` is the handle an application
//! actually holds; everything else in this crate is the engine underneath it.

#[macro_use]
extern crate log;
extern crate byteorder;
extern crate mio;
extern crate rand;

pub mod command;
pub mod context;
pub mod dist;
pub mod engine;
pub mod facade;
pub mod filter;
pub mod fq;
pub mod global;
pub mod io_thread;
pub mod lb;
pub mod mailbox;
pub mod message;
pub mod patterns;
pub mod pipe;
pub mod reaper;
pub mod session;
pub mod signaler;
pub mod socket;
pub mod timer_wheel;
pub mod udp;
pub mod wire;
pub mod ypipe;

pub use command::{Command, CommandBody, Destination, IoThreadId, PipeId, SessionId};
pub use context::Context;
pub use facade::{Endpoint, Socket};
pub use global::{EndpointId, SocketId, SocketOption, SocketType};
pub use message::Message;
