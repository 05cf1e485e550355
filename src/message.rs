// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! An owned byte buffer plus a flags byte, moved across the send/recv boundary.

/// `more`: another part follows this one in the same multipart message.
pub const FLAG_MORE: u8 = 1 << 0;
/// `command`: this is an internal control frame (request-id, survey-id, subscription),
/// not application payload.
pub const FLAG_COMMAND: u8 = 1 << 1;
/// `shared`: the backing store is reference-counted rather than uniquely owned.
pub const FLAG_SHARED: u8 = 1 << 2;

/// A single message part: an owned byte buffer and its flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    body: Vec<u8>,
    flags: u8,
}

impl Message {
    pub fn new(body: Vec<u8>) -> Message {
        Message { body: body, flags: 0 }
    }

    pub fn with_flags(body: Vec<u8>, flags: u8) -> Message {
        Message { body: body, flags: flags }
    }

    pub fn empty() -> Message {
        Message::new(Vec::new())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn has_more(&self) -> bool {
        self.flags & FLAG_MORE != 0
    }

    pub fn set_more(&mut self, more: bool) {
        if more {
            self.flags |= FLAG_MORE;
        } else {
            self.flags &= !FLAG_MORE;
        }
    }

    pub fn is_command(&self) -> bool {
        self.flags & FLAG_COMMAND != 0
    }

    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.body.len() >= prefix.len() && &self.body[..prefix.len()] == prefix
    }
}

/// A whole logical message: one or more parts, the last of which has `more = false`.
pub type MultipartMessage = Vec<Message>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn more_flag_round_trips() {
        let mut msg = Message::new(vec![1, 2, 3]);
        assert!(!msg.has_more());

        msg.set_more(true);
        assert!(msg.has_more());
        assert_eq!(msg.flags() & FLAG_MORE, FLAG_MORE);

        msg.set_more(false);
        assert!(!msg.has_more());
    }

    #[test]
    fn starts_with_checks_prefix() {
        let msg = Message::new(b"Hello, World!".to_vec());
        assert!(msg.starts_with(b"Hello"));
        assert!(!msg.starts_with(b"World"));
        assert!(msg.starts_with(b""));
    }
}
