use serde::{Deserialize, Serialize};

/// Opaque vocabulary id handed out by the tokenizer.
pub type TokenId = u32;

/// One exchange: what the human said and what the bot answered.
///
/// The bot side is empty for the turn that is currently being generated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub human: String,
    pub bot: String,
}

impl Turn {
    pub fn new(human: impl Into<String>, bot: impl Into<String>) -> Self {
        Self {
            human: human.into(),
            bot: bot.into(),
        }
    }

    /// The in-progress turn: human message, no answer yet.
    pub fn pending(human: impl Into<String>) -> Self {
        Self::new(human, String::new())
    }
}

impl From<(String, String)> for Turn {
    fn from((human, bot): (String, String)) -> Self {
        Self { human, bot }
    }
}

impl From<(&str, &str)> for Turn {
    fn from((human, bot): (&str, &str)) -> Self {
        Self::new(human, bot)
    }
}

/// Decoding knobs for one generation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Hard cap on generated tokens.
    pub max_new_tokens: usize,
    /// Draw from the distribution instead of taking the argmax.
    pub do_sample: bool,
    /// Nucleus cutoff in (0, 1].
    pub top_p: f32,
    /// Candidate pool size; 0 keeps the whole vocabulary.
    pub top_k: usize,
    pub temperature: f32,
    /// Only 1 is supported (no beam search).
    pub num_beams: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 256,
            do_sample: true,
            top_p: 0.95,
            top_k: 1000,
            temperature: 1.0,
            num_beams: 1,
        }
    }
}

/// Display strings a UI shell shows around the chat box.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatDetails {
    pub title: String,
    pub description: String,
    pub examples: Vec<String>,
}
