//! Seams to the model-loading side of the application.
//!
//! The chat core never loads weights or vocabularies itself. A loader builds
//! one tokenizer and one model per process and hands them in as
//! `Arc<dyn Tokenizer>` / `Arc<dyn LanguageModel>`; requests only read them.

use super::error::{ChatError, Result};
use super::models::TokenId;

pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<TokenId>>;

    /// Render ids back to text. With `skip_special_tokens`, control ids such as
    /// end-of-text produce no output.
    fn decode(&self, ids: &[TokenId], skip_special_tokens: bool) -> Result<String>;

    /// Exact vocabulary lookup for a single piece.
    fn token_to_id(&self, piece: &str) -> Option<TokenId>;
}

/// A loaded causal language model.
pub trait LanguageModel: Send + Sync {
    fn vocab_size(&self) -> usize;

    /// Evaluate the prompt and return a context positioned right after it.
    fn new_context(&self, prompt: &[TokenId]) -> Result<Box<dyn InferenceContext>>;
}

/// Per-request decoding state (KV cache or equivalent).
pub trait InferenceContext: Send {
    /// Logits for the next position, one per vocabulary entry.
    fn logits(&mut self) -> Result<Vec<f32>>;

    /// Feed the sampled token so the next `logits` call sees it.
    fn decode(&mut self, token: TokenId) -> Result<()>;
}

/// Control ids the stop conditions look for, resolved once from the
/// tokenizer's vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpecialTokens {
    pub end_of_text: TokenId,
    pub line_break: TokenId,
    pub colon: TokenId,
}

impl SpecialTokens {
    pub fn resolve(tokenizer: &dyn Tokenizer, end_of_text_piece: &str) -> Result<Self> {
        let end_of_text = tokenizer
            .token_to_id(end_of_text_piece)
            .ok_or_else(|| ChatError::UnknownToken(end_of_text_piece.to_string()))?;
        Ok(Self {
            end_of_text,
            line_break: single_token(tokenizer, "\n")?,
            colon: single_token(tokenizer, ":")?,
        })
    }
}

/// Encode `text` and insist it maps to exactly one id.
fn single_token(tokenizer: &dyn Tokenizer, text: &str) -> Result<TokenId> {
    match tokenizer.encode(text)?.as_slice() {
        [id] => Ok(*id),
        _ => Err(ChatError::UnknownToken(text.to_string())),
    }
}
