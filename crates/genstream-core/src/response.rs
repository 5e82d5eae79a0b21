//! Response container handed to callers

use serde::Serialize;

/// Generated text released to a caller.
///
/// Each buffer is independently owned; the container owns all of them and
/// releases them together when [`ResponseContext::release`] is called or the
/// value is dropped. Ownership moves with the value, so a container cannot be
/// released twice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResponseContext {
    responses: Vec<String>,
    done: bool,
}

impl ResponseContext {
    pub fn new(responses: Vec<String>, done: bool) -> Self {
        Self { responses, done }
    }

    /// A container holding a single chunk
    pub fn chunk(text: String, done: bool) -> Self {
        Self {
            responses: vec![text],
            done,
        }
    }

    pub fn responses(&self) -> &[String] {
        &self.responses
    }

    pub fn response_count(&self) -> usize {
        self.responses.len()
    }

    /// Whether this is the final container of its request
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Concatenation of every buffer
    pub fn text(&self) -> String {
        self.responses.concat()
    }

    pub fn into_responses(self) -> Vec<String> {
        self.responses
    }

    /// Release the container and every buffer it owns
    pub fn release(self) {}
}
