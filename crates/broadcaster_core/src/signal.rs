/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Single-fulfillment, single-consumption value hand-off between the session
//! context and a blocked caller.
//!
//! A pair is created per negotiation cycle and never reset. `Promise::fulfill`
//! takes `self`, so a second fulfillment does not type-check; dropping a promise
//! that was never fulfilled resolves the waiter to [`Error::Abandoned`] instead of
//! leaving it parked.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{Error, Result};

pub fn channel<T>() -> (Promise<T>, Waiter<T>) {
    let (tx, rx) = oneshot::channel();
    (Promise { tx }, Waiter { rx })
}

#[derive(Debug)]
pub struct Promise<T> {
    tx: oneshot::Sender<T>,
}

impl<T> Promise<T> {
    /// Hands the value to the waiter. Returns false if the waiter already gave up.
    pub fn fulfill(self, value: T) -> bool {
        self.tx.send(value).is_ok()
    }
}

#[derive(Debug)]
pub struct Waiter<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for Waiter<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|r| r.map_err(|_| Error::Abandoned))
    }
}
