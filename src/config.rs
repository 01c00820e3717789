use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{ChatError, Result};
use super::locale::Locale;
use super::models::SamplingConfig;

// Import logging macros
use crate::{sys_debug, sys_warn};

/// Default vocabulary piece marking the end of a document.
pub const END_OF_TEXT_PIECE: &str = "<|endoftext|>";

/// Where the model should run. Only reported by the core; the model loader
/// decides what to do with it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Auto,
    Cpu,
    Cuda,
}

impl Device {
    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Some(Device::Auto),
            "cpu" => Some(Device::Cpu),
            "cuda" | "gpu" => Some(Device::Cuda),
            _ => None,
        }
    }

    /// Replace `Auto` with a concrete target, using `CUDA_VISIBLE_DEVICES`.
    pub fn resolve(self) -> Device {
        self.resolve_with(env::var("CUDA_VISIBLE_DEVICES").ok().as_deref())
    }

    fn resolve_with(self, cuda_visible_devices: Option<&str>) -> Device {
        match self {
            Device::Auto => match cuda_visible_devices.map(str::trim) {
                Some(ids) if !ids.is_empty() && ids != "-1" => Device::Cuda,
                _ => Device::Cpu,
            },
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Device::Auto => "auto",
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
        }
    }
}

/// Startup configuration. Not renegotiated per request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub locale: Locale,
    pub device: Device,
    pub sampling: SamplingConfig,
    /// How long the consumer waits for the next fragment.
    pub stream_timeout_secs: f64,
    /// Bound of the worker -> consumer channel.
    pub channel_capacity: usize,
    /// Fixed seed for reproducible sampling.
    pub seed: Option<u64>,
    pub end_of_text_piece: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            locale: Locale::En,
            device: Device::Auto,
            sampling: SamplingConfig::default(),
            stream_timeout_secs: 10.0,
            channel_capacity: 64,
            seed: None,
            end_of_text_piece: END_OF_TEXT_PIECE.to_string(),
        }
    }
}

impl ChatConfig {
    /// Defaults, then the JSON file (if any), then `CHAT_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|e| {
                    ChatError::Config(format!("failed to read {}: {e}", path.display()))
                })?;
                Self::from_json(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        sys_debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| ChatError::Config(format!("invalid JSON: {e}")))
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    /// Apply overrides from any key/value source. Unparseable values are
    /// logged and ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(code) = lookup("CHAT_LANG") {
            match Locale::from_code(&code) {
                Some(locale) => self.locale = locale,
                None => sys_warn!("Ignoring CHAT_LANG={code}: expected EN or ES"),
            }
        }
        if let Some(device) = lookup("CHAT_DEVICE") {
            match Device::from_string(&device) {
                Some(device) => self.device = device,
                None => sys_warn!("Ignoring CHAT_DEVICE={device}: expected auto, cpu or cuda"),
            }
        }
        override_parsed(&lookup, "CHAT_MAX_NEW_TOKENS", &mut self.sampling.max_new_tokens);
        override_parsed(&lookup, "CHAT_TEMPERATURE", &mut self.sampling.temperature);
        override_parsed(&lookup, "CHAT_TOP_P", &mut self.sampling.top_p);
        override_parsed(&lookup, "CHAT_TOP_K", &mut self.sampling.top_k);
        override_parsed(&lookup, "CHAT_DO_SAMPLE", &mut self.sampling.do_sample);
        override_parsed(&lookup, "CHAT_STREAM_TIMEOUT", &mut self.stream_timeout_secs);
        if let Some(raw) = lookup("CHAT_SEED") {
            match raw.trim().parse::<u64>() {
                Ok(seed) => self.seed = Some(seed),
                Err(_) => sys_warn!("Ignoring CHAT_SEED={raw}: not an integer"),
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let sampling = &self.sampling;
        if sampling.num_beams != 1 {
            return Err(ChatError::Config(format!(
                "num_beams={} is not supported, only 1",
                sampling.num_beams
            )));
        }
        if sampling.max_new_tokens == 0 {
            return Err(ChatError::Config("max_new_tokens must be at least 1".into()));
        }
        if sampling.do_sample {
            if !(sampling.temperature > 0.0 && sampling.temperature.is_finite()) {
                return Err(ChatError::Config(format!(
                    "temperature must be positive, got {}",
                    sampling.temperature
                )));
            }
            if !(sampling.top_p > 0.0 && sampling.top_p <= 1.0) {
                return Err(ChatError::Config(format!(
                    "top_p must be in (0, 1], got {}",
                    sampling.top_p
                )));
            }
        }
        match Duration::try_from_secs_f64(self.stream_timeout_secs) {
            Ok(timeout) if !timeout.is_zero() => {}
            _ => {
                return Err(ChatError::Config(format!(
                    "stream_timeout_secs must be a positive number of seconds, got {}",
                    self.stream_timeout_secs
                )))
            }
        }
        if self.channel_capacity == 0 {
            return Err(ChatError::Config("channel_capacity must be at least 1".into()));
        }
        if self.end_of_text_piece.is_empty() {
            return Err(ChatError::Config("end_of_text_piece must not be empty".into()));
        }
        Ok(())
    }

    /// Saturates on values `validate` would reject.
    pub fn stream_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.stream_timeout_secs).unwrap_or(Duration::MAX)
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => sys_warn!("Ignoring {key}={raw}: could not parse value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_generation_settings() {
        let config = ChatConfig::default();
        assert_eq!(config.sampling.max_new_tokens, 256);
        assert!(config.sampling.do_sample);
        assert_eq!(config.sampling.top_p, 0.95);
        assert_eq!(config.sampling.top_k, 1000);
        assert_eq!(config.sampling.temperature, 1.0);
        assert_eq!(config.sampling.num_beams, 1);
        assert_eq!(config.stream_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            ChatConfig::from_json(r#"{"locale": "ES", "sampling": {"top_k": 50}}"#).unwrap();
        assert_eq!(config.locale, Locale::Es);
        assert_eq!(config.sampling.top_k, 50);
        assert_eq!(config.sampling.max_new_tokens, 256);
        assert_eq!(config.device, Device::Auto);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = ChatConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }

    #[test]
    fn test_overrides_apply_and_bad_values_are_ignored() {
        let mut config = ChatConfig::default();
        config.apply_overrides_from(lookup_from(&[
            ("CHAT_LANG", "es"),
            ("CHAT_DEVICE", "cpu"),
            ("CHAT_MAX_NEW_TOKENS", "32"),
            ("CHAT_TOP_P", "not-a-number"),
            ("CHAT_SEED", "7"),
        ]));
        assert_eq!(config.locale, Locale::Es);
        assert_eq!(config.device, Device::Cpu);
        assert_eq!(config.sampling.max_new_tokens, 32);
        assert_eq!(config.sampling.top_p, 0.95);
        assert_eq!(config.seed, Some(7));
    }

    #[test]
    fn test_beam_search_is_rejected() {
        let mut config = ChatConfig::default();
        config.sampling.num_beams = 4;
        assert!(matches!(config.validate(), Err(ChatError::Config(_))));
    }

    #[test]
    fn test_sampling_ranges_are_checked() {
        let mut config = ChatConfig::default();
        config.sampling.top_p = 0.0;
        assert!(config.validate().is_err());

        let mut config = ChatConfig::default();
        config.sampling.temperature = 0.0;
        assert!(config.validate().is_err());

        // Greedy decoding ignores temperature and top_p.
        config.sampling.do_sample = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stream_timeout_must_fit_a_duration() {
        let mut config = ChatConfig::default();
        config.apply_overrides_from(lookup_from(&[("CHAT_STREAM_TIMEOUT", "1e20")]));
        assert_eq!(config.stream_timeout_secs, 1e20);
        assert!(matches!(config.validate(), Err(ChatError::Config(_))));
        assert_eq!(config.stream_timeout(), Duration::MAX);

        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            config.stream_timeout_secs = bad;
            assert!(config.validate().is_err(), "{bad} should be rejected");
        }

        config.stream_timeout_secs = 0.25;
        assert!(config.validate().is_ok());
        assert_eq!(config.stream_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_device_resolution() {
        assert_eq!(Device::Auto.resolve_with(Some("0,1")), Device::Cuda);
        assert_eq!(Device::Auto.resolve_with(Some("-1")), Device::Cpu);
        assert_eq!(Device::Auto.resolve_with(None), Device::Cpu);
        assert_eq!(Device::Cuda.resolve_with(None), Device::Cuda);
        assert_eq!(Device::from_string("GPU"), Some(Device::Cuda));
    }
}
