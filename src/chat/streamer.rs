//! Handoff between the generation worker and the consumer.
//!
//! One bounded crossbeam channel per request, exactly one sender and one
//! receiver. Fragments arrive in the order they were pushed.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};

use crate::adapters::Tokenizer;
use crate::error::{ChatError, Result};
use crate::models::TokenId;

/// What travels over the handoff channel.
#[derive(Debug)]
pub enum StreamMessage {
    Fragment(String),
    /// The worker hit a fatal error; nothing follows.
    Failed(ChatError),
}

/// Create the channel for one request. `timeout` bounds both a push on a full
/// channel and a wait on an empty one.
pub fn handoff_channel(capacity: usize, timeout: Duration) -> (FragmentSender, FragmentReceiver) {
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    (
        FragmentSender { tx, timeout },
        FragmentReceiver {
            rx,
            timeout,
            finished: false,
        },
    )
}

/// Producer half. Dropping it closes the stream.
pub struct FragmentSender {
    tx: Sender<StreamMessage>,
    timeout: Duration,
}

impl FragmentSender {
    pub fn push(&self, fragment: String) -> Result<()> {
        match self.tx.send_timeout(StreamMessage::Fragment(fragment), self.timeout) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(ChatError::ChannelSend(format!(
                "consumer did not drain the channel within {:?}",
                self.timeout
            ))),
            Err(SendTimeoutError::Disconnected(_)) => {
                Err(ChatError::ChannelSend("consumer dropped the stream".into()))
            }
        }
    }

    /// Hand a fatal error to the consumer. Best effort: if the consumer is
    /// gone there is nobody left to tell.
    pub fn fail(&self, error: ChatError) {
        let _ = self.tx.send_timeout(StreamMessage::Failed(error), self.timeout);
    }
}

/// Consumer half: yields fragments until the sender is dropped.
///
/// Waiting longer than the timeout yields `StreamTimeout` once and ends the
/// iteration, as does a forwarded worker error.
pub struct FragmentReceiver {
    rx: Receiver<StreamMessage>,
    timeout: Duration,
    finished: bool,
}

impl Iterator for FragmentReceiver {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.rx.recv_timeout(self.timeout) {
            Ok(StreamMessage::Fragment(fragment)) => Some(Ok(fragment)),
            Ok(StreamMessage::Failed(error)) => {
                self.finished = true;
                Some(Err(error))
            }
            Err(RecvTimeoutError::Timeout) => {
                self.finished = true;
                Some(Err(ChatError::StreamTimeout(self.timeout)))
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.finished = true;
                None
            }
        }
    }
}

/// Turns generated ids into text fragments on word boundaries.
///
/// Only generated tokens are ever fed in, so the prompt is never echoed, and
/// special ids are dropped at decode time. The pending tokens are re-decoded on
/// every step so multi-token characters come out whole:
/// - text ending in a line break is released entirely and the cache restarts;
/// - text ending in a CJK ideograph is released entirely;
/// - text ending in U+FFFD (an unfinished UTF-8 sequence) is held back;
/// - otherwise text is released up to and including the last space.
///
/// Every `put` pushes exactly one fragment, empty when nothing is releasable
/// yet, so the consumer's wait is bounded per token rather than per word.
/// `end` flushes whatever is left.
pub struct TextStreamer {
    tokenizer: Arc<dyn Tokenizer>,
    sender: FragmentSender,
    token_cache: Vec<TokenId>,
    print_len: usize,
}

impl TextStreamer {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, sender: FragmentSender) -> Self {
        Self {
            tokenizer,
            sender,
            token_cache: Vec::new(),
            print_len: 0,
        }
    }

    pub fn put(&mut self, token: TokenId) -> Result<()> {
        self.token_cache.push(token);
        let text = self.tokenizer.decode(&self.token_cache, true)?;

        let printable = if text.ends_with('\n') {
            let printable = text.get(self.print_len..).unwrap_or_default().to_string();
            self.token_cache.clear();
            self.print_len = 0;
            printable
        } else if text.chars().next_back().is_some_and(is_cjk_char) {
            let printable = text.get(self.print_len..).unwrap_or_default().to_string();
            self.print_len = text.len();
            printable
        } else if text.ends_with('\u{FFFD}') {
            String::new()
        } else {
            let end = text.rfind(' ').map_or(0, |idx| idx + 1);
            if end <= self.print_len {
                String::new()
            } else {
                let printable = text.get(self.print_len..end).unwrap_or_default().to_string();
                self.print_len = end;
                printable
            }
        };

        self.sender.push(printable)
    }

    /// Flush the pending tail. Consumes the streamer so the channel closes.
    pub fn end(mut self) -> Result<()> {
        if self.token_cache.is_empty() {
            return Ok(());
        }
        let text = self.tokenizer.decode(&self.token_cache, true)?;
        let printable = text.get(self.print_len..).unwrap_or_default().to_string();
        self.token_cache.clear();
        self.print_len = 0;
        if printable.is_empty() {
            return Ok(());
        }
        self.sender.push(printable)
    }

    /// Report a fatal error to the consumer, closing the stream.
    pub fn fail(self, error: ChatError) {
        self.sender.fail(error);
    }

}

/// CJK Unified Ideographs and their extension/compatibility blocks. These are
/// written without spaces, so each one is a word of its own.
fn is_cjk_char(ch: char) -> bool {
    matches!(
        u32::from(ch),
        0x4E00..=0x9FFF
            | 0x3400..=0x4DBF
            | 0x20000..=0x2A6DF
            | 0x2A700..=0x2B73F
            | 0x2B740..=0x2B81F
            | 0x2B820..=0x2CEAF
            | 0xF900..=0xFAFF
            | 0x2F800..=0x2FA1F
    )
}
