//! Streaming chat front-end for a causal language model.
//!
//! [`ChatEngine::predict`] builds a prompt from the turn history, runs the
//! decode loop on a background thread and hands back a [`ResponseStream`]
//! that yields the answer so far, with hallucinated follow-up turns cut off
//! both at the token level (stop conditions) and at the text level (repair
//! filter).

pub mod adapters;
pub mod chat;
pub mod chat_mock;
pub mod config;
pub mod error;
pub mod locale;
pub mod logger;
pub mod models;

// Used by the logging macros.
#[doc(hidden)]
pub use log;

pub use adapters::{InferenceContext, LanguageModel, SpecialTokens, Tokenizer};
pub use chat::{ChatEngine, ResponseStream};
pub use config::{ChatConfig, Device};
pub use error::{ChatError, Result};
pub use locale::{Locale, Persona};
pub use models::{ChatDetails, SamplingConfig, TokenId, Turn};
