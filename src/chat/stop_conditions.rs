// Stop condition checking for token generation

use crate::adapters::{SpecialTokens, Tokenizer};
use crate::error::Result;
use crate::models::TokenId;

/// A predicate over the tokens generated so far (prompt excluded).
///
/// Checked after every new token; generation halts on the first `true`.
pub trait StopCondition: Send + Sync {
    /// Short label used when logging why generation stopped.
    fn name(&self) -> &'static str;

    fn should_stop(&self, generated: &[TokenId]) -> bool;
}

/// Stops on an explicit end-of-text id or on a line break.
///
/// The model treats a line break as a turn boundary just as often as it emits
/// the real end-of-text marker, so both end the answer.
#[derive(Debug, Clone)]
pub struct EndOfTextStop {
    stop_ids: [TokenId; 2],
}

impl EndOfTextStop {
    pub fn new(specials: &SpecialTokens) -> Self {
        Self {
            stop_ids: [specials.end_of_text, specials.line_break],
        }
    }
}

impl StopCondition for EndOfTextStop {
    fn name(&self) -> &'static str {
        "end_of_text"
    }

    fn should_stop(&self, generated: &[TokenId]) -> bool {
        generated
            .last()
            .is_some_and(|last| self.stop_ids.contains(last))
    }
}

/// Stops when the model starts inventing the next turn of the dialogue, i.e.
/// the generated tokens end with `"\n<name>:"` for one of the participants.
///
/// Matching happens on ids rather than decoded text so subword boundaries
/// cannot blur the comparison.
#[derive(Debug, Clone)]
pub struct SpeakerTurnStop {
    templates: Vec<Vec<TokenId>>,
}

impl SpeakerTurnStop {
    /// `tokenized_names` holds the encoding of each participant name.
    pub fn new(specials: &SpecialTokens, tokenized_names: Vec<Vec<TokenId>>) -> Self {
        let templates = tokenized_names
            .into_iter()
            .map(|name| {
                let mut template = Vec::with_capacity(name.len() + 2);
                template.push(specials.line_break);
                template.extend(name);
                template.push(specials.colon);
                template
            })
            .collect();
        Self { templates }
    }

    pub fn for_names(
        tokenizer: &dyn Tokenizer,
        specials: &SpecialTokens,
        names: &[&str],
    ) -> Result<Self> {
        let tokenized = names
            .iter()
            .map(|name| tokenizer.encode(name))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(specials, tokenized))
    }

    pub fn templates(&self) -> &[Vec<TokenId>] {
        &self.templates
    }
}

impl StopCondition for SpeakerTurnStop {
    fn name(&self) -> &'static str {
        "speaker_turn"
    }

    fn should_stop(&self, generated: &[TokenId]) -> bool {
        self.templates
            .iter()
            .any(|template| generated.ends_with(template))
    }
}

/// Every registered condition, consulted together.
#[derive(Default)]
pub struct StopConditionList {
    conditions: Vec<Box<dyn StopCondition>>,
}

impl StopConditionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, condition: impl StopCondition + 'static) -> Self {
        self.push(condition);
        self
    }

    pub fn push(&mut self, condition: impl StopCondition + 'static) {
        self.conditions.push(Box::new(condition));
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Name of the first condition that fires, if any.
    pub fn check(&self, generated: &[TokenId]) -> Option<&'static str> {
        self.conditions
            .iter()
            .find(|condition| condition.should_stop(generated))
            .map(|condition| condition.name())
    }
}
