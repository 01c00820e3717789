use std::sync::Arc;
use std::thread;
use std::time::Instant;

use super::sampler::create_sampler;
use super::stop_conditions::StopConditionList;
use super::streamer::{FragmentSender, TextStreamer};
use crate::adapters::{LanguageModel, Tokenizer};
use crate::error::{ChatError, Result};
use crate::models::{SamplingConfig, TokenId};
use crate::{log_debug, log_error, log_info};

/// Everything the worker needs for one decode run.
pub struct GenerationRequest {
    pub request_id: String,
    /// Encoded prompt.
    pub input_ids: Vec<TokenId>,
    pub sampling: SamplingConfig,
    pub seed: Option<u64>,
    pub stop_conditions: StopConditionList,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// A stop condition fired; holds its name.
    Condition(&'static str),
    MaxNewTokens,
}

/// Output from a generation run, including timing metrics.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    /// Generated ids, including the one that triggered a stop condition.
    pub generated: Vec<TokenId>,
    pub stop_reason: StopReason,
    /// Generation speed in tokens/second.
    pub gen_tok_per_sec: Option<f64>,
}

/// Run the decode loop to completion, feeding every generated token to
/// `streamer`.
///
/// After each token the full generated sequence goes through the stop
/// conditions; the token that fires one stays in the output. Decoding also
/// ends after `max_new_tokens`.
pub fn generate(
    model: &dyn LanguageModel,
    request: &GenerationRequest,
    streamer: &mut TextStreamer,
) -> Result<GenerationOutput> {
    let request_id = request.request_id.as_str();
    let max_new_tokens = request.sampling.max_new_tokens;
    let mut sampler = create_sampler(&request.sampling, request.seed, request_id);

    log_debug!(
        request_id,
        "Evaluating prompt ({} tokens), max_new_tokens={}",
        request.input_ids.len(),
        max_new_tokens
    );
    let mut context = model.new_context(&request.input_ids)?;

    let gen_start = Instant::now();
    let mut generated: Vec<TokenId> = Vec::with_capacity(max_new_tokens);
    let mut stop_reason = StopReason::MaxNewTokens;

    while generated.len() < max_new_tokens {
        let logits = context.logits()?;
        let next_token = sampler.sample(&logits)?;
        context.decode(next_token)?;
        generated.push(next_token);

        streamer.put(next_token)?;

        if let Some(name) = request.stop_conditions.check(&generated) {
            log_debug!(
                request_id,
                "Stop condition {} fired at token #{} (id {})",
                name,
                generated.len(),
                next_token
            );
            stop_reason = StopReason::Condition(name);
            break;
        }
    }

    let gen_secs = gen_start.elapsed().as_secs_f64();
    let gen_tok_per_sec = if gen_secs > 0.0 && !generated.is_empty() {
        Some(generated.len() as f64 / gen_secs)
    } else {
        None
    };

    Ok(GenerationOutput {
        generated,
        stop_reason,
        gen_tok_per_sec,
    })
}

/// Start the worker thread for one request.
///
/// The thread is detached: it finishes on its own once decoding stops, and
/// dropping its sender closes the consumer's stream. A decode failure is
/// forwarded to the consumer. If the consumer goes away, the next push fails
/// and the worker exits; until then it keeps decoding.
pub fn spawn_generation_worker(
    model: Arc<dyn LanguageModel>,
    tokenizer: Arc<dyn Tokenizer>,
    request: GenerationRequest,
    sender: FragmentSender,
) -> Result<()> {
    let thread_name = format!("generation-{}", request.request_id);
    thread::Builder::new()
        .name(thread_name)
        .spawn(move || run_worker(model.as_ref(), tokenizer, request, sender))
        .map(|_detached| ())
        .map_err(|e| ChatError::WorkerSpawn(e.to_string()))
}

fn run_worker(
    model: &dyn LanguageModel,
    tokenizer: Arc<dyn Tokenizer>,
    request: GenerationRequest,
    sender: FragmentSender,
) {
    let request_id = request.request_id.clone();
    let mut streamer = TextStreamer::new(tokenizer, sender);

    let result = generate(model, &request, &mut streamer);
    match result {
        Ok(output) => {
            log_info!(
                &request_id,
                "Generation finished: {} tokens, stop={:?}, {:.1} tok/s",
                output.generated.len(),
                output.stop_reason,
                output.gen_tok_per_sec.unwrap_or(0.0)
            );
            if let Err(e) = streamer.end() {
                log_error!(&request_id, "Failed to flush final fragment: {}", e);
            }
        }
        Err(ChatError::ChannelSend(reason)) => {
            // Nobody is listening any more; just stop.
            log_error!(&request_id, "Abandoning generation: {}", reason);
        }
        Err(e) => {
            log_error!(&request_id, "Generation failed: {}", e);
            streamer.fail(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SpecialTokens;
    use crate::chat::stop_conditions::{EndOfTextStop, SpeakerTurnStop};
    use crate::chat::streamer::{handoff_channel, FragmentReceiver};
    use crate::chat_mock::{MockTokenizer, ScriptedModel};
    use std::time::Duration;

    struct Fixture {
        tokenizer: Arc<MockTokenizer>,
        specials: SpecialTokens,
    }

    impl Fixture {
        fn new(corpus: &[&str]) -> Self {
            let tokenizer = Arc::new(MockTokenizer::from_corpus(corpus));
            let specials = SpecialTokens::resolve(tokenizer.as_ref(), "<|endoftext|>").unwrap();
            Self { tokenizer, specials }
        }

        fn request(&self, max_new_tokens: usize, stops: StopConditionList) -> GenerationRequest {
            GenerationRequest {
                request_id: "test".to_string(),
                input_ids: self.tokenizer.encode("prompt").unwrap(),
                sampling: SamplingConfig {
                    max_new_tokens,
                    do_sample: false,
                    ..Default::default()
                },
                seed: None,
                stop_conditions: stops,
            }
        }

        fn streamer(&self) -> (TextStreamer, FragmentReceiver) {
            let (tx, rx) = handoff_channel(64, Duration::from_secs(1));
            (TextStreamer::new(self.tokenizer.clone(), tx), rx)
        }

        fn decode(&self, ids: &[TokenId]) -> String {
            self.tokenizer.decode(ids, false).unwrap()
        }
    }

    #[test]
    fn test_end_of_text_stop_keeps_trigger_token() {
        let fx = Fixture::new(&["one two\nthree"]);
        let model = ScriptedModel::from_texts(&fx.tokenizer, &["one two\nthree"]).unwrap();
        let stops = StopConditionList::new().with(EndOfTextStop::new(&fx.specials));
        let (mut streamer, _rx) = fx.streamer();

        let output = generate(&model, &fx.request(50, stops), &mut streamer).unwrap();
        assert_eq!(output.stop_reason, StopReason::Condition("end_of_text"));
        assert_eq!(fx.decode(&output.generated), "one two\n");
    }

    #[test]
    fn test_speaker_turn_stop_halts_generation() {
        let fx = Fixture::new(&["Sure\nUser: again"]);
        let model = ScriptedModel::from_texts(&fx.tokenizer, &["Sure\nUser: again"]).unwrap();
        let stops = StopConditionList::new().with(
            SpeakerTurnStop::for_names(fx.tokenizer.as_ref(), &fx.specials, &["User", "Assistant"])
                .unwrap(),
        );
        let (mut streamer, _rx) = fx.streamer();

        let output = generate(&model, &fx.request(50, stops), &mut streamer).unwrap();
        assert_eq!(output.stop_reason, StopReason::Condition("speaker_turn"));
        assert_eq!(fx.decode(&output.generated), "Sure\nUser:");
    }

    #[test]
    fn test_max_new_tokens_caps_output() {
        let fx = Fixture::new(&["a b c d e f"]);
        let model = ScriptedModel::from_texts(&fx.tokenizer, &["a b c d e f"]).unwrap();
        let (mut streamer, rx) = fx.streamer();

        let output =
            generate(&model, &fx.request(3, StopConditionList::new()), &mut streamer).unwrap();
        assert_eq!(output.stop_reason, StopReason::MaxNewTokens);
        assert_eq!(output.generated.len(), 3);

        streamer.end().unwrap();
        let text: String = rx.map(|r| r.unwrap()).collect();
        assert_eq!(text, "a b c");
    }

    #[test]
    fn test_model_failure_propagates() {
        let fx = Fixture::new(&["a b c"]);
        let model = ScriptedModel::from_texts(&fx.tokenizer, &["a b c"])
            .unwrap()
            .failing_after(1);
        let (mut streamer, _rx) = fx.streamer();

        let err = generate(&model, &fx.request(10, StopConditionList::new()), &mut streamer)
            .unwrap_err();
        assert!(matches!(err, ChatError::Model(_)));
    }

    #[test]
    fn test_worker_forwards_failure_to_consumer() {
        let fx = Fixture::new(&["a b c"]);
        let model: Arc<dyn LanguageModel> = Arc::new(
            ScriptedModel::from_texts(&fx.tokenizer, &["a b c"])
                .unwrap()
                .failing_after(0),
        );
        let (tx, rx) = handoff_channel(8, Duration::from_secs(1));
        spawn_generation_worker(
            model,
            fx.tokenizer.clone(),
            fx.request(10, StopConditionList::new()),
            tx,
        )
        .unwrap();

        let items: Vec<_> = rx.collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(ChatError::Model(_))));
    }
}
