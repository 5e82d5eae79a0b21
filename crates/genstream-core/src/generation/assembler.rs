//! Stop-sequence aware assembly of decoded text.
//!
//! Decoded text arrives one token piece at a time, but a stop sequence can
//! span several pieces. The assembler therefore withholds a trailing window
//! of the stream and only releases text that can no longer become part of a
//! stop sequence. Lengths are counted in chars so releases never split a
//! UTF-8 sequence.

use crate::config::EngineConfig;

/// Result of feeding one fragment into the assembler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assembled {
    /// Text that is safe to release now (possibly empty)
    pub ready: String,
    /// A stop sequence matched; `ready` is the final chunk
    pub should_stop: bool,
}

#[derive(Debug, Clone)]
pub struct TokenStreamAssembler {
    stop_sequences: Vec<String>,
    window: usize,
    pending: String,
    stopped: bool,
}

impl TokenStreamAssembler {
    /// `min_window` is widened to the longest stop sequence so no match can
    /// straddle text that was already released.
    pub fn new(stop_sequences: Vec<String>, min_window: usize) -> Self {
        let window = stop_sequences
            .iter()
            .map(|s| s.chars().count())
            .max()
            .unwrap_or(0)
            .max(min_window);
        Self {
            stop_sequences,
            window,
            pending: String::new(),
            stopped: false,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.stop_sequences.clone(), config.trailing_window)
    }

    /// Append `fragment` and decide what can be released.
    ///
    /// Stop sequences are tried in configuration order and the first one
    /// present anywhere in the withheld text wins, even when a later one
    /// would match at an earlier position.
    pub fn push(&mut self, fragment: &str) -> Assembled {
        if self.stopped {
            return Assembled {
                ready: String::new(),
                should_stop: true,
            };
        }

        self.pending.push_str(fragment);

        let matched = self
            .stop_sequences
            .iter()
            .find_map(|stop| self.pending.find(stop.as_str()));
        if let Some(index) = matched {
            self.pending.truncate(index);
            self.stopped = true;
            return Assembled {
                ready: std::mem::take(&mut self.pending),
                should_stop: true,
            };
        }

        let len = self.pending.chars().count();
        if len > self.window {
            let split = self
                .pending
                .char_indices()
                .nth(len - self.window)
                .map_or(self.pending.len(), |(i, _)| i);
            let tail = self.pending.split_off(split);
            return Assembled {
                ready: std::mem::replace(&mut self.pending, tail),
                should_stop: false,
            };
        }

        Assembled::default()
    }

    /// Release everything still withheld
    pub fn flush(&mut self) -> String {
        std::mem::take(&mut self.pending)
    }

    /// Clear buffered text and the stop flag for a new request
    pub fn reset(&mut self) {
        self.pending.clear();
        self.stopped = false;
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}
