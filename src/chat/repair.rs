// Text-level cleanup of hallucinated turns in the streamed answer

use regex::Regex;

use super::streamer::FragmentReceiver;
use crate::error::Result;
use crate::{log_debug, log_info, log_warn};

lazy_static::lazy_static! {
    /// A line break, then anything up to a colon that ends the text, e.g. `\nUser:`.
    pub static ref CHAT_NAME_PATTERN: Regex = Regex::new(r"\n.+:$").unwrap();
}

/// Byte offset where a trailing `"\n<name>:"` marker starts, if there is one.
///
/// Any name matches, not only the configured participants. Legitimate text
/// shaped the same way (`"...\nOptions:"`) is matched too.
pub fn find_speaker_suffix(text: &str) -> Option<usize> {
    CHAT_NAME_PATTERN.find(text).map(|m| m.start())
}

/// `text` without its trailing speaker marker.
pub fn strip_speaker_suffix(text: &str) -> &str {
    match find_speaker_suffix(text) {
        Some(start) => &text[..start],
        None => text,
    }
}

/// Caller-facing view of one generation.
///
/// Yields the full cleaned answer so far once per received fragment. The
/// iteration ends when the worker closes the channel; a timeout or a worker
/// failure is yielded as an `Err` and ends it as well. Not restartable.
///
/// Dropping the stream early does not stop the worker directly: it finds out
/// on its next push and exits then.
pub struct ResponseStream {
    fragments: FragmentReceiver,
    partial: String,
    request_id: String,
    received: usize,
}

impl ResponseStream {
    pub fn new(fragments: FragmentReceiver, request_id: impl Into<String>) -> Self {
        Self {
            fragments,
            partial: String::new(),
            request_id: request_id.into(),
            received: 0,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Cleaned text accumulated so far.
    pub fn partial(&self) -> &str {
        &self.partial
    }

    /// Drain the stream and return the last value, i.e. the final answer.
    pub fn into_final(self) -> Result<String> {
        let mut last = String::new();
        for item in self {
            last = item?;
        }
        Ok(last)
    }
}

impl Iterator for ResponseStream {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.fragments.next() {
            Some(Ok(fragment)) => {
                self.received += 1;
                self.partial.push_str(&fragment);
                if let Some(start) = find_speaker_suffix(&self.partial) {
                    log_debug!(
                        &self.request_id,
                        "Trimming hallucinated turn marker {:?}",
                        &self.partial[start..]
                    );
                    self.partial.truncate(start);
                }
                Some(Ok(self.partial.clone()))
            }
            Some(Err(error)) => {
                log_warn!(
                    &self.request_id,
                    "Stream failed after {} fragments: {}",
                    self.received,
                    error
                );
                Some(Err(error))
            }
            None => {
                log_info!(
                    &self.request_id,
                    "Stream finished: {} fragments, {} chars",
                    self.received,
                    self.partial.len()
                );
                None
            }
        }
    }
}
