// Mock adapters for tests and the demo shell.
// They stand in for a real tokenizer/model pair so the streaming loop can run
// without loading any weights.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::adapters::{InferenceContext, LanguageModel, Tokenizer};
use super::error::{ChatError, Result};
use super::models::TokenId;

/// Split text into word-level pieces: line breaks and colons stand alone,
/// a space starts a new piece and stays attached to the word after it.
fn split_pieces(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        match ch {
            '\n' | ':' => {
                if start < idx {
                    pieces.push(&text[start..idx]);
                }
                let end = idx + ch.len_utf8();
                pieces.push(&text[idx..end]);
                start = end;
            }
            ' ' if start < idx => {
                pieces.push(&text[start..idx]);
                start = idx;
            }
            _ => {}
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// Word-level tokenizer with a fixed vocabulary built from sample text.
#[derive(Debug, Clone)]
pub struct MockTokenizer {
    pieces: Vec<String>,
    ids: HashMap<String, TokenId>,
}

impl MockTokenizer {
    pub const END_OF_TEXT: TokenId = 0;
    pub const UNKNOWN: TokenId = 1;

    /// Vocabulary = control pieces, line break, colon, then every piece of the corpus.
    pub fn from_corpus(corpus: &[&str]) -> Self {
        let mut tokenizer = Self {
            pieces: Vec::new(),
            ids: HashMap::new(),
        };
        for piece in ["<|endoftext|>", "<|unk|>", "\n", ":"] {
            tokenizer.insert(piece);
        }
        for text in corpus {
            for piece in split_pieces(text) {
                tokenizer.insert(piece);
            }
        }
        tokenizer
    }

    /// Add pieces verbatim. Unlike corpus text they are not split, so e.g.
    /// `"\n\n"` becomes one id that `encode` never produces on its own.
    pub fn with_pieces(mut self, pieces: &[&str]) -> Self {
        for piece in pieces {
            self.insert(piece);
        }
        self
    }

    fn insert(&mut self, piece: &str) {
        if !self.ids.contains_key(piece) {
            let id = self.pieces.len() as TokenId;
            self.pieces.push(piece.to_string());
            self.ids.insert(piece.to_string(), id);
        }
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }
}

impl Tokenizer for MockTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<TokenId>> {
        Ok(split_pieces(text)
            .into_iter()
            .map(|piece| self.ids.get(piece).copied().unwrap_or(Self::UNKNOWN))
            .collect())
    }

    fn decode(&self, ids: &[TokenId], skip_special_tokens: bool) -> Result<String> {
        let mut text = String::new();
        for &id in ids {
            if skip_special_tokens && id == Self::END_OF_TEXT {
                continue;
            }
            let piece = self
                .pieces
                .get(id as usize)
                .ok_or_else(|| ChatError::Tokenizer(format!("id {id} out of vocabulary")))?;
            text.push_str(piece);
        }
        Ok(text)
    }

    fn token_to_id(&self, piece: &str) -> Option<TokenId> {
        self.ids.get(piece).copied()
    }
}

/// Model that replays canned replies instead of computing anything.
///
/// Each new context takes the next reply (cycling); its logits put all the
/// mass on the next scripted id and fall back to end-of-text once the reply
/// is exhausted.
pub struct ScriptedModel {
    vocab_size: usize,
    replies: Vec<Vec<TokenId>>,
    next_reply: AtomicUsize,
    step_delay: Option<Duration>,
    fail_after: Option<usize>,
    last_prompt: Arc<Mutex<Option<Vec<TokenId>>>>,
}

impl ScriptedModel {
    pub fn new(vocab_size: usize, replies: Vec<Vec<TokenId>>) -> Self {
        Self {
            vocab_size,
            replies,
            next_reply: AtomicUsize::new(0),
            step_delay: None,
            fail_after: None,
            last_prompt: Arc::new(Mutex::new(None)),
        }
    }

    /// Build the replies by encoding text with `tokenizer`.
    pub fn from_texts(tokenizer: &MockTokenizer, replies: &[&str]) -> Result<Self> {
        let replies = replies
            .iter()
            .map(|text| tokenizer.encode(text))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(tokenizer.len(), replies))
    }

    /// Sleep before producing each set of logits.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = Some(delay);
        self
    }

    /// Fail with a model error once `steps` tokens have been produced.
    pub fn failing_after(mut self, steps: usize) -> Self {
        self.fail_after = Some(steps);
        self
    }

    /// Prompt ids received by the most recent `new_context` call.
    pub fn last_prompt(&self) -> Option<Vec<TokenId>> {
        self.last_prompt.lock().ok().and_then(|guard| guard.clone())
    }
}

impl LanguageModel for ScriptedModel {
    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn new_context(&self, prompt: &[TokenId]) -> Result<Box<dyn InferenceContext>> {
        if let Ok(mut guard) = self.last_prompt.lock() {
            *guard = Some(prompt.to_vec());
        }
        let script = if self.replies.is_empty() {
            Vec::new()
        } else {
            let idx = self.next_reply.fetch_add(1, Ordering::SeqCst) % self.replies.len();
            self.replies[idx].clone()
        };
        Ok(Box::new(ScriptedContext {
            vocab_size: self.vocab_size,
            script,
            position: 0,
            step_delay: self.step_delay,
            fail_after: self.fail_after,
        }))
    }
}

struct ScriptedContext {
    vocab_size: usize,
    script: Vec<TokenId>,
    position: usize,
    step_delay: Option<Duration>,
    fail_after: Option<usize>,
}

impl InferenceContext for ScriptedContext {
    fn logits(&mut self) -> Result<Vec<f32>> {
        if let Some(delay) = self.step_delay {
            std::thread::sleep(delay);
        }
        if self.fail_after.is_some_and(|limit| self.position >= limit) {
            return Err(ChatError::Model(format!(
                "scripted failure at step {}",
                self.position
            )));
        }
        let next = self
            .script
            .get(self.position)
            .copied()
            .unwrap_or(MockTokenizer::END_OF_TEXT);
        let mut logits = vec![f32::NEG_INFINITY; self.vocab_size];
        let slot = logits
            .get_mut(next as usize)
            .ok_or_else(|| ChatError::Model(format!("scripted id {next} out of vocabulary")))?;
        *slot = 0.0;
        Ok(logits)
    }

    fn decode(&mut self, _token: TokenId) -> Result<()> {
        self.position += 1;
        Ok(())
    }
}
