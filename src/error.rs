use std::time::Duration;

use thiserror::Error;

/// Everything that can end a chat request early.
///
/// None of these are retried. A failure on the generation worker is forwarded
/// through the handoff channel so the consumer sees it instead of a stream that
/// just stops.
#[derive(Debug, Error)]
pub enum ChatError {
    /// No fragment arrived within the configured wait.
    #[error("no token received within {0:?}")]
    StreamTimeout(Duration),

    #[error("tokenizer failure: {0}")]
    Tokenizer(String),

    #[error("model failure: {0}")]
    Model(String),

    /// The worker could not hand a fragment over: the consumer stopped
    /// draining the channel or dropped it.
    #[error("failed to push fragment to consumer: {0}")]
    ChannelSend(String),

    #[error("failed to spawn generation worker: {0}")]
    WorkerSpawn(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// A control piece the engine relies on is missing from the vocabulary.
    #[error("token {0:?} not found in vocabulary")]
    UnknownToken(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;
