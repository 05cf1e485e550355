// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The one concrete transport this crate ships: a UDP `Engine` pair grounded
//! on `udp_sender.cpp`/`udp_receiver.cpp`. A `connect`-ed datagram socket
//! fakes a PUB/SUB handshake it cannot actually perform over UDP (no
//! upstream subscription channel), and a resync-on-gap sequence number
//! recovers from lost packets without a full reconnect.
//!
//! Unlike the original's stream encoder/decoder (which packs several small
//! messages into one MTU-sized datagram and can split a single message
//! across several), this reference engine carries exactly one message per
//! datagram: every `seq_no`/`offset` header field and the join/resync
//! algorithm around it are preserved, but the packing loop that only matters
//! once several tiny messages share a socket buffer is not.

pub mod receiver;
pub mod sender;

pub use self::receiver::Receiver;
pub use self::sender::Sender;
