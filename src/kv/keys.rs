//! Streaming key enumeration.
//!
//! [`Lister::keys`](super::Lister::keys) returns immediately with a
//! [`KeyStream`]. A background task pages through the backend and pushes
//! keys into one bounded channel and at most one error into another, so the
//! consumer sees keys as soon as each page is read.
//!
//! The producer checks the caller's [`Context`] before every page and races
//! every send against it. When it stops, for whatever reason, both channels
//! close: the producer owns the only senders and drops them exactly once.

use super::backend::KvBackend;
use crate::clock::Clock;
use crate::config::KeysConfig;
use crate::context::Context;
use crate::error::{Error, Result};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use tokio::sync::mpsc;
use tracing::debug;

/// Live keys, followed by at most one terminal error.
///
/// Consume it either as a [`Stream`] of `Result<String>` (keys first, then
/// the error if any), through [`collect_keys`](Self::collect_keys), or as the
/// raw channel pair from [`into_channels`](Self::into_channels). Dropping the
/// stream stops the producer.
#[derive(Debug)]
pub struct KeyStream {
    keys: mpsc::Receiver<String>,
    errors: mpsc::Receiver<Error>,
    keys_closed: bool,
}

impl KeyStream {
    /// Splits the stream into its key and error channels.
    ///
    /// Both channels close when enumeration ends. The error channel yields
    /// at most one error: the cancellation or storage failure that stopped
    /// the producer.
    #[must_use]
    pub fn into_channels(self) -> (mpsc::Receiver<String>, mpsc::Receiver<Error>) {
        (self.keys, self.errors)
    }

    /// Drains the stream.
    ///
    /// # Errors
    ///
    /// Returns the error that ended enumeration, discarding keys received
    /// before it.
    pub async fn collect_keys(self) -> Result<Vec<String>> {
        let (mut keys, mut errors) = self.into_channels();
        let mut collected = Vec::new();
        while let Some(key) = keys.recv().await {
            collected.push(key);
        }
        match errors.recv().await {
            Some(err) => Err(err),
            None => Ok(collected),
        }
    }
}

impl Stream for KeyStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        if !self.keys_closed {
            match self.keys.poll_recv(cx) {
                Poll::Ready(Some(key)) => return Poll::Ready(Some(Ok(key))),
                Poll::Ready(None) => self.keys_closed = true,
                Poll::Pending => return Poll::Pending,
            }
        }
        self.errors.poll_recv(cx).map(|err| err.map(Err))
    }
}

/// Starts the producer task and returns the consumer side.
pub(super) fn spawn(
    backend: Arc<dyn KvBackend>,
    clock: Arc<dyn Clock>,
    cx: Context,
    config: KeysConfig,
    prefix: Option<String>,
) -> KeyStream {
    let (key_tx, key_rx) = mpsc::channel(config.channel_capacity.max(1));
    let (err_tx, err_rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let producer = Producer {
            backend: backend.as_ref(),
            clock: clock.as_ref(),
            cx: &cx,
            page_size: config.page_size.max(1),
            prefix: prefix.as_deref(),
        };
        if let Err(err) = producer.run(&key_tx).await {
            debug!(error = %err, "Key enumeration stopped");
            // Capacity 1 and nothing sent yet, so this never waits.
            let _ = err_tx.send(err).await;
        }
    });

    KeyStream {
        keys: key_rx,
        errors: err_rx,
        keys_closed: false,
    }
}

struct Producer<'a> {
    backend: &'a dyn KvBackend,
    clock: &'a dyn Clock,
    cx: &'a Context,
    page_size: usize,
    prefix: Option<&'a str>,
}

impl Producer<'_> {
    async fn run(&self, tx: &mpsc::Sender<String>) -> Result<()> {
        let mut cursor: Option<String> = None;

        loop {
            self.cx.check()?;

            let page = tokio::select! {
                biased;
                () = self.cx.done() => return Err(self.cancellation()),
                page = self.backend.scan(
                    cursor.as_deref(),
                    self.prefix,
                    self.page_size,
                    self.clock.now(),
                ) => page?,
            };

            let last_page = page.len() < self.page_size;
            let next_cursor = page.last().cloned();

            for key in page {
                tokio::select! {
                    biased;
                    () = self.cx.done() => return Err(self.cancellation()),
                    sent = tx.send(key) => {
                        if sent.is_err() {
                            // Consumer dropped the stream.
                            return Ok(());
                        }
                    },
                }
            }

            match next_cursor {
                Some(next) if !last_page => cursor = Some(next),
                _ => return Ok(()),
            }
        }
    }

    fn cancellation(&self) -> Error {
        self.cx.err().unwrap_or(Error::Cancelled)
    }
}
