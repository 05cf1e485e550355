// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Broadcast to every pipe that currently has credit, skipping the rest.
//! `PUB` broadcasts to whichever pipes match the outbound message's subscription
//! set; `XSURVEYOR` broadcasts unconditionally to every attached pipe.

use message::Message;
use patterns::PipeSet;

/// Writes a clone of `msg` to every pipe whose id is in `targets` and currently
/// has credit. `Message` bodies are small and shared-nothing by design, so a
/// clone per target pipe is the simplest faithful translation of the original's
/// reference-counted shared-buffer broadcast (`msg_t::copy`).
pub fn send_to<M>(pipes: &mut PipeSet<M>, targets: &[::command::PipeId], msg: &Message) {
    for &id in targets {
        if let Some(slot) = pipes.get_mut(id) {
            if slot.writer.has_credit() {
                slot.writer.write(msg.clone());
                slot.writer.flush();
            }
        }
    }
}

/// Writes a clone of `msg` to every attached pipe with credit.
pub fn broadcast<M>(pipes: &mut PipeSet<M>, msg: &Message) {
    let ids = pipes.ids();
    send_to(pipes, &ids, msg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use command::PipeId;
    use message::Message;
    use pipe::new_pipe;

    #[test]
    fn broadcast_reaches_every_ready_pipe() {
        let mut pipes: PipeSet<()> = PipeSet::new();
        let (w0, r0) = new_pipe(4, 1);
        let (w1, r1) = new_pipe(0, 1);
        pipes.attach(PipeId(0), w0, r0, ());
        pipes.attach(PipeId(1), w1, new_pipe(0, 1).1, ());

        broadcast(&mut pipes, &Message::new(vec![9]));

        assert_eq!(pipes.get_mut(PipeId(0)).unwrap().reader.read().unwrap().body(), &[9]);
        let _ = r1;
    }

    #[test]
    fn send_to_skips_pipes_with_no_credit() {
        let mut pipes: PipeSet<()> = PipeSet::new();
        let (w0, _r0) = new_pipe(0, 1);
        pipes.attach(PipeId(0), w0, new_pipe(0, 1).1, ());

        send_to(&mut pipes, &[PipeId(0)], &Message::new(vec![1]));
        assert!(!pipes.get(PipeId(0)).unwrap().reader.has_data());
    }
}
