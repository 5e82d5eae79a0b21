//! Async adapter over the callback API.
//!
//! The session thread pushes every chunk into an unbounded tokio channel and
//! the returned [`ResponseStream`] yields them to async consumers. The stream
//! ends after the final chunk, when the session thread drops its sender.
//!
//! Dropping a [`Session`] blocks; in async code drop it inside
//! `tokio::task::spawn_blocking` or after the stream has ended.

use crate::{response::ResponseContext, session::Session, Result};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Chunks of one request, in generation order
#[derive(Debug)]
pub struct ResponseStream {
    receiver: mpsc::UnboundedReceiver<ResponseContext>,
}

impl ResponseStream {
    /// Receive the next chunk, `None` once the request has finished
    pub async fn next_response(&mut self) -> Option<ResponseContext> {
        self.receiver.recv().await
    }

    /// Drain the stream and concatenate every chunk
    pub async fn collect_text(mut self) -> String {
        let mut text = String::new();
        while let Some(response) = self.receiver.recv().await {
            text.push_str(&response.text());
        }
        text
    }
}

impl Stream for ResponseStream {
    type Item = ResponseContext;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Session {
    /// Start a request whose chunks are delivered through a [`ResponseStream`]
    pub fn predict_stream(&mut self, prompt: impl Into<String>) -> Result<ResponseStream> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.predict_async(prompt, move |response| {
            // the consumer may have dropped the stream; generation still completes
            let _ = sender.send(response);
        })?;
        Ok(ResponseStream { receiver })
    }
}
