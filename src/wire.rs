// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Wire-level constants and pure encode/decode helpers: the SP greeting header,
//! the message frame prefix, the subscription frame, and the UDP datagram header.
//!
//! These are free functions over byte slices rather than a stateful codec: the
//! concrete stream encoder/decoder that drives bytes to/from a TCP/IPC socket is
//! out of scope here, but every engine that does exist (UDP) and every pattern
//! that frames subscriptions on the wire (PUB/SUB) goes through this module.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io;

pub const SP_HEADER_LENGTH: usize = 8;

pub const PATTERN_PAIR: u8 = 1;
pub const PATTERN_PUBSUB: u8 = 2;
pub const PATTERN_REQREP: u8 = 3;
pub const PATTERN_PIPELINE: u8 = 4;
pub const PATTERN_SURVEY: u8 = 5;

pub const SUB_CMD_SUBSCRIBE: u16 = 1;
pub const SUB_CMD_UNSUBSCRIBE: u16 = 2;

/// Legacy (0MQ/2.1) wire protocol selector for the `PROTOCOL` socket option.
pub const PROTOCOL_LEGACY: u8 = 1;
/// Current Scalability Protocol wire version.
pub const PROTOCOL_CURRENT: u8 = 3;

/// Builds the 8-byte SP greeting header exchanged at connection setup.
///
/// Byte layout: `0x00 0x00 'S' 'P' pattern version role 0x00`.
pub fn sp_header(pattern: u8, version: u8, role: u8) -> [u8; SP_HEADER_LENGTH] {
    [0, 0, b'S', b'P', pattern, version, role, 0]
}

/// Parses a received greeting header, returning `(pattern, version, role)`.
/// Rejects anything that isn't a well-formed SP header with `ENOCOMPATPROTO`-style
/// `InvalidData`, matching the "rejected if pattern or role mismatches" contract;
/// pattern/role compatibility against the local socket type is checked by the caller.
pub fn parse_sp_header(header: &[u8]) -> io::Result<(u8, u8, u8)> {
    if header.len() != SP_HEADER_LENGTH || header[0] != 0 || header[1] != 0
        || header[2] != b'S' || header[3] != b'P' || header[7] != 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "ENOCOMPATPROTO"));
    }
    Ok((header[4], header[5], header[6]))
}

/// Masks an incoming frame's flag byte down to the bits SP ever defined (`more`),
/// so unused bits set by a legacy 0MQ/2.1 peer are ignored rather than rejected
/// (see SPEC_FULL.md §9, "Legacy 0MQ/2.1 interop").
pub fn decode_frame_flags(raw: u8) -> u8 {
    raw & 0x01
}

/// Encodes a message frame prefix. Short form is used whenever the payload fits in
/// a single byte of length (`< 255`); long form otherwise: a `0xff` marker, an
/// 8-byte big-endian size, then the flags byte.
pub fn encode_frame_prefix(out: &mut Vec<u8>, len: usize, flags: u8) -> io::Result<()> {
    if len < 0xff {
        out.push(len as u8);
        out.push(decode_frame_flags(flags));
    } else {
        out.push(0xff);
        out.write_u64::<BigEndian>(len as u64)?;
        out.push(decode_frame_flags(flags));
    }
    Ok(())
}

/// Decodes a message frame prefix from the front of `buf`, returning
/// `(payload_len, flags, prefix_len)`. `prefix_len` bytes must be consumed by the
/// caller before the payload begins.
pub fn decode_frame_prefix(buf: &[u8]) -> io::Result<Option<(usize, u8, usize)>> {
    if buf.is_empty() {
        return Ok(None);
    }
    if buf[0] != 0xff {
        if buf.len() < 2 {
            return Ok(None);
        }
        return Ok(Some((buf[0] as usize, decode_frame_flags(buf[1]), 2)));
    }
    if buf.len() < 10 {
        return Ok(None);
    }
    let len = (&buf[1..9]).read_u64::<BigEndian>()? as usize;
    Ok(Some((len, decode_frame_flags(buf[9]), 10)))
}

/// Encodes an SP >= 3 subscription frame: `u16 cmd, u16 filter_id, payload`.
pub fn encode_subscription(out: &mut Vec<u8>, subscribe: bool, filter_id: u16, payload: &[u8]) -> io::Result<()> {
    out.write_u16::<BigEndian>(if subscribe { SUB_CMD_SUBSCRIBE } else { SUB_CMD_UNSUBSCRIBE })?;
    out.write_u16::<BigEndian>(filter_id)?;
    out.extend_from_slice(payload);
    Ok(())
}

/// Decodes an SP >= 3 subscription frame, returning `(subscribe, filter_id, payload)`.
pub fn decode_subscription(buf: &[u8]) -> io::Result<(bool, u16, &[u8])> {
    if buf.len() < 4 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "EINVAL: short subscription frame"));
    }
    let cmd = (&buf[0..2]).read_u16::<BigEndian>()?;
    let filter_id = (&buf[2..4]).read_u16::<BigEndian>()?;
    let subscribe = match cmd {
        SUB_CMD_SUBSCRIBE => true,
        SUB_CMD_UNSUBSCRIBE => false,
        _ => return Err(io::Error::new(io::ErrorKind::InvalidData, "EINVAL: unknown subscription command")),
    };
    Ok((subscribe, filter_id, &buf[4..]))
}

/// Encodes a legacy (0MQ/2.1, protocol=1) inline subscription frame:
/// `[0x01 | prefix]` to subscribe, `[0x00 | prefix]` to unsubscribe.
pub fn encode_legacy_subscription(out: &mut Vec<u8>, subscribe: bool, prefix: &[u8]) {
    out.push(if subscribe { 1 } else { 0 });
    out.extend_from_slice(prefix);
}

/// Decodes a legacy inline subscription frame, returning `(subscribe, prefix)`.
pub fn decode_legacy_subscription(buf: &[u8]) -> io::Result<(bool, &[u8])> {
    if buf.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "EINVAL: empty legacy subscription frame"));
    }
    Ok((buf[0] != 0, &buf[1..]))
}

pub const UDP_HEADER_SIZE: usize = 6;
/// Sentinel `offset` value meaning "no message boundary within this payload".
pub const UDP_NO_BOUNDARY: u16 = 0xffff;

/// Encodes the 6-byte UDP datagram header: `seq_no BE u32, offset BE u16`.
pub fn encode_udp_header(out: &mut Vec<u8>, seq_no: u32, offset: u16) -> io::Result<()> {
    out.write_u32::<BigEndian>(seq_no)?;
    out.write_u16::<BigEndian>(offset)?;
    Ok(())
}

/// Decodes the 6-byte UDP datagram header, returning `(seq_no, offset)`.
pub fn decode_udp_header(buf: &[u8]) -> io::Result<(u32, u16)> {
    if buf.len() < UDP_HEADER_SIZE {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "EINVAL: short udp header"));
    }
    let seq_no = (&buf[0..4]).read_u32::<BigEndian>()?;
    let offset = (&buf[4..6]).read_u16::<BigEndian>()?;
    Ok((seq_no, offset))
}
