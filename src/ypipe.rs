// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! A single-producer/single-consumer lock-free queue built on an atomic-pointer
//! exchange ("Y-pipe"), grounded in `atomic_ptr.hpp`'s `xchg`/`cas` primitives.
//!
//! The writer appends into a private singly-linked chain; nothing is visible to
//! the reader until `flush()` publishes the chain up to the last complete message
//! boundary by swinging the shared `divider` pointer. The CAS-to-null trick in
//! `check_read` is how the reader tells the writer "I found nothing and am about
//! to block" without an extra round of synchronization on the common path: if the
//! writer's next `flush()` sees the divider is no longer what it last published,
//! it knows the reader needs an explicit wake (a `activate_read` command).

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::cell::Cell;

struct Node<T> {
    value: Option<T>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn alloc(value: Option<T>) -> *mut Node<T> {
        Box::into_raw(Box::new(Node { value: value, next: AtomicPtr::new(ptr::null_mut()) }))
    }
}

/// Shared chain anchor plus the publish boundary. Each field group below is
/// touched by exactly one of the two threads that share a `Ypipe`; the type is
/// not `Sync` by the compiler's own reasoning, so we assert the single-writer/
/// single-reader discipline explicitly (see `unsafe impl Sync` at the bottom).
pub struct Ypipe<T> {
    // Writer-owned.
    w: Cell<*mut Node<T>>,
    f: Cell<*mut Node<T>>,
    back: Cell<*mut Node<T>>,
    // Reader-owned.
    front: Cell<*mut Node<T>>,
    r: Cell<*mut Node<T>>,
    // Shared publish boundary ("c" in the original).
    divider: AtomicPtr<Node<T>>,
}

impl<T> Ypipe<T> {
    pub fn new() -> Ypipe<T> {
        let sentinel = Node::alloc(None);
        Ypipe {
            w: Cell::new(sentinel),
            f: Cell::new(sentinel),
            back: Cell::new(sentinel),
            front: Cell::new(sentinel),
            r: Cell::new(sentinel),
            divider: AtomicPtr::new(sentinel),
        }
    }

    /// Appends `value` to the writer's private chain. `incomplete` marks this as
    /// one part of a still-open multipart message: the flush boundary (`f`) only
    /// advances past it once a part with `incomplete = false` is written, so a
    /// `flush()` can never expose half of a multipart message.
    pub fn write(&self, value: T, incomplete: bool) {
        let back = self.back.get();
        unsafe {
            (*back).value = Some(value);
        }
        let new_back = Node::alloc(None);
        unsafe {
            (*back).next.store(new_back, Ordering::Release);
        }
        self.back.set(new_back);
        if !incomplete {
            self.f.set(self.back.get());
        }
    }

    /// Publishes everything written since the last successful flush, up to the
    /// last complete-message boundary. Returns `true` if the reader was already
    /// caught up to the previous publish point (no wake needed), `false` if the
    /// reader had gone idle waiting for data and must be sent an explicit command.
    pub fn flush(&self) -> bool {
        let w = self.w.get();
        let f = self.f.get();
        if w == f {
            return true;
        }
        match self.divider.compare_exchange(w, f, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => {
                self.w.set(f);
                true
            }
            Err(_) => {
                self.divider.store(f, Ordering::Release);
                self.w.set(f);
                false
            }
        }
    }

    fn check_read(&self) -> bool {
        if self.front.get() != self.r.get() {
            return true;
        }
        let expected = self.front.get();
        let prev = self.divider.compare_exchange(
            expected,
            ptr::null_mut(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        match prev {
            Ok(_) => false,
            Err(actual) => {
                self.r.set(if actual.is_null() { self.front.get() } else { actual });
                true
            }
        }
    }

    /// `true` if a value is available to `read()` right now, without consuming it.
    pub fn has_data(&self) -> bool {
        self.check_read()
    }

    /// Pops the next value, if the writer has published one.
    pub fn read(&self) -> Option<T> {
        if !self.check_read() {
            return None;
        }
        let node = self.front.get();
        let value = unsafe { (*node).value.take() };
        let next = unsafe { (*node).next.load(Ordering::Acquire) };
        self.front.set(next);
        unsafe {
            drop(Box::from_raw(node));
        }
        value
    }
}

impl<T> Default for Ypipe<T> {
    fn default() -> Self {
        Ypipe::new()
    }
}

impl<T> Drop for Ypipe<T> {
    fn drop(&mut self) {
        let mut node = self.front.get();
        while !node.is_null() {
            let next = unsafe { (*node).next.load(Ordering::Acquire) };
            unsafe {
                drop(Box::from_raw(node));
            }
            node = next;
        }
    }
}

// Safety: `Ypipe<T>` is shared between exactly two threads, one of which only
// ever calls `write`/`flush` (the writer-owned fields) and the other only ever
// calls `read` (the reader-owned fields); the only field either side touches on
// the other's behalf is the `divider` atomic, which is synchronized by its own
// acquire/release ordering. This mirrors the same single-writer/single-reader
// contract `atomic_ptr.hpp` documents for the underlying `xs::atomic_ptr_t`.
unsafe impl<T: Send> Sync for Ypipe<T> {}
unsafe impl<T: Send> Send for Ypipe<T> {}
