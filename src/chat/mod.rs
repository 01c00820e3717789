// Chat module
//
// This module contains the streaming generation loop:
// - templates.rs: Prompt building from the turn history
// - stop_conditions.rs: Token-level stop conditions (end of text, speaker turn)
// - sampler.rs: Greedy / temperature + top-k + top-p sampling
// - streamer.rs: Handoff channel and word-boundary text streaming
// - generation.rs: Decode loop and the background worker
// - repair.rs: Trailing speaker-marker cleanup and the caller-facing stream
// - engine.rs: Request entry point

mod engine;
mod generation;
mod repair;
mod sampler;
mod stop_conditions;
mod streamer;
mod templates;

pub use engine::ChatEngine;
pub use generation::{generate, spawn_generation_worker, GenerationOutput, GenerationRequest, StopReason};
pub use repair::{find_speaker_suffix, strip_speaker_suffix, ResponseStream};
pub use sampler::Sampler;
pub use stop_conditions::{EndOfTextStop, SpeakerTurnStop, StopCondition, StopConditionList};
pub use streamer::{handoff_channel, FragmentReceiver, FragmentSender, StreamMessage, TextStreamer};
pub use templates::build_prompt;
