// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

#[macro_use]
extern crate log;
extern crate env_logger;
extern crate crossroads_core;

use std::io;
use std::thread;
use std::time;

use crossroads_core::{Context, Socket, SocketOption, SocketType};
use crossroads_core::message::Message;

fn pump_one_message(from: &mut Socket, to: &mut Socket) -> io::Result<()> {
    loop {
        let msg = from.recv_msg()?;
        let more = msg.has_more();
        to.send_msg(msg)?;
        if !more {
            return Ok(());
        }
    }
}

#[test]
fn test_push_pull_over_inproc() {
    let _ = env_logger::init();
    let ctx = Context::new(1, 16);
    let mut pull = Socket::new(&ctx, SocketType::Pull).unwrap();
    let mut push = Socket::new(&ctx, SocketType::Push).unwrap();

    pull.bind("inproc://push-pull").unwrap();
    push.connect("inproc://push-pull").unwrap();

    push.send(vec![65, 66, 67]).unwrap();
    let received = pull.recv().unwrap();

    assert_eq!(vec![65, 66, 67], received);
}

#[test]
fn test_req_rep_direct() {
    let _ = env_logger::init();
    let ctx = Context::new(1, 16);
    let mut server = Socket::new(&ctx, SocketType::Rep).unwrap();
    let mut client = Socket::new(&ctx, SocketType::Req).unwrap();

    server.bind("inproc://req-rep").unwrap();
    client.connect("inproc://req-rep").unwrap();

    client.send(vec![65, 66, 67]).unwrap();
    let request = server.recv().unwrap();
    assert_eq!(vec![65, 66, 67], request);

    server.send(vec![67, 66, 65]).unwrap();
    let reply = client.recv().unwrap();
    assert_eq!(vec![67, 66, 65], reply);
}

/// S1: REQ connects to a raw XREP, REP connects to a raw XREQ; a device in
/// between forwards every frame untouched, preserving the request-id and
/// delimiter framing REQ/REP rely on.
#[test]
fn test_reqrep_via_device() {
    let _ = env_logger::init();
    let ctx = Context::new(1, 16);
    let mut front = Socket::new(&ctx, SocketType::Xrep).unwrap();
    let mut back = Socket::new(&ctx, SocketType::Xreq).unwrap();
    let mut client = Socket::new(&ctx, SocketType::Req).unwrap();
    let mut server = Socket::new(&ctx, SocketType::Rep).unwrap();

    front.bind("inproc://device-front").unwrap();
    client.connect("inproc://device-front").unwrap();
    back.bind("inproc://device-back").unwrap();
    server.connect("inproc://device-back").unwrap();

    client.send(vec![65, 66, 67]).unwrap();
    pump_one_message(&mut front, &mut back).unwrap();

    let request = server.recv().unwrap();
    assert_eq!(vec![65, 66, 67], request);

    server.send(vec![67, 66, 65]).unwrap();
    pump_one_message(&mut back, &mut front).unwrap();

    let reply = client.recv().unwrap();
    assert_eq!(vec![67, 66, 65], reply);
}

/// S2: one SURVEYOR, two RESPONDENTs. Both replies are observed regardless of
/// arrival order.
#[test]
fn test_survey_two_respondents() {
    let _ = env_logger::init();
    let ctx = Context::new(1, 16);
    let mut server = Socket::new(&ctx, SocketType::Surveyor).unwrap();
    let mut client1 = Socket::new(&ctx, SocketType::Respondent).unwrap();
    let mut client2 = Socket::new(&ctx, SocketType::Respondent).unwrap();

    server.bind("inproc://survey").unwrap();
    client1.connect("inproc://survey").unwrap();
    client2.connect("inproc://survey").unwrap();

    server.send(vec![65, 66, 67]).unwrap();

    let survey1 = client1.recv().unwrap();
    assert_eq!(vec![65, 66, 67], survey1);
    let survey2 = client2.recv().unwrap();
    assert_eq!(vec![65, 66, 67], survey2);

    client1.send(vec![68, 69]).unwrap();
    client2.send(vec![70, 71, 72, 73]).unwrap();

    let mut responses = vec![server.recv().unwrap(), server.recv().unwrap()];
    responses.sort();
    assert_eq!(vec![vec![68, 69], vec![70, 71, 72, 73]], responses);
}

/// S3: a survey with no respondent attached must time out rather than block.
#[test]
fn test_survey_timeout() {
    let _ = env_logger::init();
    let ctx = Context::new(1, 16);
    let mut server = Socket::new(&ctx, SocketType::Surveyor).unwrap();
    server.set_option(SocketOption::SurveyTimeout(100)).unwrap();
    server.bind("inproc://survey-timeout").unwrap();

    server.send(vec![65, 66, 67]).unwrap();

    let start = time::Instant::now();
    let err = server.recv().unwrap_err();
    assert_eq!(io::ErrorKind::TimedOut, err.kind());
    assert!(start.elapsed() >= time::Duration::from_millis(90));
}

/// S4 (direct, no device): a SUB only ever sees messages matching one of its
/// subscriptions, and an unsubscribed prefix never arrives.
#[test]
fn test_pub_sub_subscription_filtering() {
    let _ = env_logger::init();
    let ctx = Context::new(1, 16);
    let mut server = Socket::new(&ctx, SocketType::Pub).unwrap();
    let mut client = Socket::new(&ctx, SocketType::Sub).unwrap();

    server.bind("inproc://pub-sub").unwrap();
    client.connect("inproc://pub-sub").unwrap();
    client.set_option(SocketOption::Subscribe(b"A".to_vec())).unwrap();
    client.set_option(SocketOption::Subscribe(b"B".to_vec())).unwrap();
    client.set_recv_timeout(time::Duration::from_millis(100)).unwrap();

    server.send(b"A-topic".to_vec()).unwrap();
    assert_eq!(b"A-topic".to_vec(), client.recv().unwrap());

    server.send(b"B-topic".to_vec()).unwrap();
    assert_eq!(b"B-topic".to_vec(), client.recv().unwrap());

    server.send(b"C-topic".to_vec()).unwrap();
    let err = client.recv().unwrap_err();
    assert_eq!(io::ErrorKind::TimedOut, err.kind());
}

/// S5: shutting down a PUSH's bound endpoint makes a subsequent non-blocking
/// send observe EAGAIN instead of reaching the now-detached pipe.
#[test]
fn test_shutdown_then_send_returns_eagain() {
    let _ = env_logger::init();
    let ctx = Context::new(1, 16);
    let mut push = Socket::new(&ctx, SocketType::Push).unwrap();
    let mut pull = Socket::new(&ctx, SocketType::Pull).unwrap();

    let bound = push.bind("inproc://shutdown-test").unwrap();
    pull.connect("inproc://shutdown-test").unwrap();

    push.send(vec![1, 2, 3]).unwrap();
    assert_eq!(vec![1, 2, 3], pull.recv().unwrap());

    push.shutdown(bound).unwrap();
    thread::sleep(time::Duration::from_millis(20));

    let err = push.try_send(Message::new(vec![4, 5, 6])).unwrap_err();
    assert_eq!(io::ErrorKind::WouldBlock, err.kind());
}

/// S6: PUB/SUB carried over the UDP reference transport instead of inproc.
#[test]
fn test_udp_pub_sub() {
    let _ = env_logger::init();
    let ctx = Context::new(2, 16);
    let mut server = Socket::new(&ctx, SocketType::Pub).unwrap();
    let mut client = Socket::new(&ctx, SocketType::Sub).unwrap();

    server.bind("udp://127.0.0.1:15870").unwrap();
    client.connect("udp://127.0.0.1:15870").unwrap();
    client.set_option(SocketOption::Subscribe(Vec::new())).unwrap();
    client.set_recv_timeout(time::Duration::from_millis(500)).unwrap();

    thread::sleep(time::Duration::from_millis(200));

    server.send(vec![1; 32]).unwrap();
    let received = client.recv().unwrap();
    assert_eq!(vec![1; 32], received);
}

#[test]
fn test_context_term_releases_every_socket() {
    let _ = env_logger::init();
    let ctx = Context::new(1, 16);
    {
        let _push = Socket::new(&ctx, SocketType::Push).unwrap();
        let _pull = Socket::new(&ctx, SocketType::Pull).unwrap();
        assert_eq!(ctx.socket_count(), 2);
    }
    assert_eq!(ctx.socket_count(), 0);
    ctx.term().unwrap();
}
