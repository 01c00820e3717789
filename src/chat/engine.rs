use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use super::generation::{spawn_generation_worker, GenerationRequest};
use super::repair::ResponseStream;
use super::stop_conditions::{EndOfTextStop, SpeakerTurnStop, StopConditionList};
use super::streamer::handoff_channel;
use super::templates::build_prompt;
use crate::adapters::{LanguageModel, SpecialTokens, Tokenizer};
use crate::config::ChatConfig;
use crate::error::Result;
use crate::locale::Persona;
use crate::models::{ChatDetails, Turn};
use crate::{log_debug, log_info, sys_info};

/// Entry point the UI shell talks to.
///
/// Holds the shared model and tokenizer plus everything resolved once at
/// startup (names, preamble, control ids). Requests share nothing else.
pub struct ChatEngine {
    model: Arc<dyn LanguageModel>,
    tokenizer: Arc<dyn Tokenizer>,
    config: ChatConfig,
    persona: Persona,
    specials: SpecialTokens,
}

impl ChatEngine {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        tokenizer: Arc<dyn Tokenizer>,
        config: ChatConfig,
    ) -> Result<Self> {
        config.validate()?;
        let specials = SpecialTokens::resolve(tokenizer.as_ref(), &config.end_of_text_piece)?;
        let persona = Persona::from(config.locale);

        sys_info!(
            "Chat engine ready: locale={}, device={}, vocab={}, eot={}, eol={}, colon={}",
            config.locale.code(),
            config.device.resolve().as_str(),
            model.vocab_size(),
            specials.end_of_text,
            specials.line_break,
            specials.colon
        );

        Ok(Self {
            model,
            tokenizer,
            config,
            persona,
            specials,
        })
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    pub fn details(&self) -> ChatDetails {
        self.config.locale.details()
    }

    /// Answer `message` given the earlier turns.
    ///
    /// Returns as soon as the worker is running; the stream yields the cleaned
    /// answer so far, growing with every fragment. `history` is left untouched.
    pub fn predict(&self, message: &str, history: &[Turn]) -> Result<ResponseStream> {
        let request_id = Uuid::new_v4().to_string();

        let mut turns = history.to_vec();
        turns.push(Turn::pending(message));
        let prompt = build_prompt(&self.persona, &turns);
        log_debug!(&request_id, "Prompt ({} chars):\n{}", prompt.len(), prompt);

        let input_ids = self.tokenizer.encode(&prompt)?;
        let stop_conditions = self.stop_conditions()?;

        log_info!(
            &request_id,
            "Starting generation: {} prior turns, {} prompt tokens, {} stop conditions",
            history.len(),
            input_ids.len(),
            stop_conditions.len()
        );

        let (sender, receiver) =
            handoff_channel(self.config.channel_capacity, self.config.stream_timeout());
        let request = GenerationRequest {
            request_id: request_id.clone(),
            input_ids,
            sampling: self.config.sampling.clone(),
            seed: self.config.seed,
            stop_conditions,
        };
        spawn_generation_worker(
            Arc::clone(&self.model),
            Arc::clone(&self.tokenizer),
            request,
            sender,
        )?;

        Ok(ResponseStream::new(receiver, request_id))
    }

    /// Same as [`predict`](Self::predict) for callers on a tokio runtime.
    ///
    /// The blocking stream is drained on the blocking pool and each value is
    /// forwarded through a bounded mpsc channel. Must be called from within a
    /// runtime.
    pub fn predict_async(
        self: &Arc<Self>,
        message: String,
        history: Vec<Turn>,
    ) -> mpsc::Receiver<Result<String>> {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let engine = Arc::clone(self);

        tokio::task::spawn_blocking(move || match engine.predict(&message, &history) {
            Ok(stream) => {
                for item in stream {
                    // Receiver dropped: stop draining.
                    if tx.blocking_send(item).is_err() {
                        break;
                    }
                }
            }
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
            }
        });

        rx
    }

    // Templates depend only on names, so this is cheap to redo per request.
    fn stop_conditions(&self) -> Result<StopConditionList> {
        let speaker_stop = SpeakerTurnStop::for_names(
            self.tokenizer.as_ref(),
            &self.specials,
            &[
                self.persona.human_name.as_str(),
                self.persona.bot_name.as_str(),
            ],
        )?;
        Ok(StopConditionList::new()
            .with(EndOfTextStop::new(&self.specials))
            .with(speaker_stop))
    }
}
