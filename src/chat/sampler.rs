use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{ChatError, Result};
use crate::log_info;
use crate::models::{SamplingConfig, TokenId};

/// Picks the next token from a row of logits.
pub enum Sampler {
    /// Argmax, used when sampling is disabled.
    Greedy,
    /// temperature -> top-k -> top-p -> weighted draw.
    Chain {
        temperature: f32,
        top_k: usize,
        top_p: f32,
        rng: StdRng,
    },
}

/// Create a sampler based on the configuration.
pub(crate) fn create_sampler(config: &SamplingConfig, seed: Option<u64>, request_id: &str) -> Sampler {
    if !config.do_sample {
        log_info!(request_id, "Using Greedy sampler");
        return Sampler::Greedy;
    }

    log_info!(
        request_id,
        "Using sampling chain: temp={}, top_k={}, top_p={}, seed={:?}",
        config.temperature,
        config.top_k,
        config.top_p,
        seed
    );
    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    Sampler::Chain {
        temperature: config.temperature,
        top_k: config.top_k,
        top_p: config.top_p,
        rng,
    }
}

impl Sampler {
    pub fn sample(&mut self, logits: &[f32]) -> Result<TokenId> {
        if logits.is_empty() {
            return Err(ChatError::Model("model returned empty logits".into()));
        }
        match self {
            Sampler::Greedy => argmax(logits),
            Sampler::Chain {
                temperature,
                top_k,
                top_p,
                rng,
            } => {
                let candidates = nucleus(logits, *temperature, *top_k, *top_p)?;
                let total: f32 = candidates.iter().map(|(_, p)| p).sum();
                let mut draw = rng.random::<f32>() * total;
                for &(id, prob) in &candidates {
                    if draw < prob {
                        return Ok(id);
                    }
                    draw -= prob;
                }
                // Rounding left a sliver past the last bucket.
                candidates
                    .last()
                    .map(|(id, _)| *id)
                    .ok_or_else(|| ChatError::Model("no sampling candidates".into()))
            }
        }
    }
}

fn argmax(logits: &[f32]) -> Result<TokenId> {
    logits
        .iter()
        .enumerate()
        .filter(|(_, l)| !l.is_nan())
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(idx, _)| idx as TokenId)
        .ok_or_else(|| ChatError::Model("logits are all NaN".into()))
}

/// Candidate ids with their probabilities, most likely first, after
/// temperature scaling, top-k truncation and top-p truncation.
fn nucleus(logits: &[f32], temperature: f32, top_k: usize, top_p: f32) -> Result<Vec<(TokenId, f32)>> {
    let mut scaled: Vec<(TokenId, f32)> = logits
        .iter()
        .enumerate()
        .filter(|(_, l)| !l.is_nan())
        .map(|(idx, &l)| (idx as TokenId, l / temperature))
        .collect();
    scaled.sort_by(|a, b| b.1.total_cmp(&a.1));

    if top_k > 0 && top_k < scaled.len() {
        scaled.truncate(top_k);
    }

    let max = scaled
        .first()
        .map(|(_, l)| *l)
        .filter(|l| l.is_finite())
        .ok_or_else(|| ChatError::Model("logits contain no finite value".into()))?;

    let mut probs: Vec<(TokenId, f32)> = scaled
        .into_iter()
        .map(|(id, l)| (id, (l - max).exp()))
        .collect();
    let sum: f32 = probs.iter().map(|(_, p)| p).sum();
    for (_, p) in probs.iter_mut() {
        *p /= sum;
    }

    // Smallest prefix whose mass reaches top_p; always at least one token.
    let mut cumulative = 0.0;
    let mut keep = probs.len();
    for (idx, (_, p)) in probs.iter().enumerate() {
        cumulative += p;
        if cumulative >= top_p {
            keep = idx + 1;
            break;
        }
    }
    probs.truncate(keep);
    Ok(probs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(config: SamplingConfig, seed: u64) -> Sampler {
        create_sampler(&config, Some(seed), "test")
    }

    #[test]
    fn test_greedy_picks_argmax() {
        let config = SamplingConfig {
            do_sample: false,
            ..Default::default()
        };
        let mut sampler = create_sampler(&config, None, "test");
        assert_eq!(sampler.sample(&[0.1, 3.0, -1.0, 2.9]).unwrap(), 1);
    }

    #[test]
    fn test_top_k_one_is_deterministic() {
        let config = SamplingConfig {
            top_k: 1,
            ..Default::default()
        };
        let mut sampler = chain(config, 42);
        for _ in 0..20 {
            assert_eq!(sampler.sample(&[0.0, 1.0, 5.0, 4.9]).unwrap(), 2);
        }
    }

    #[test]
    fn test_tiny_top_p_keeps_only_best() {
        let config = SamplingConfig {
            top_p: 0.01,
            ..Default::default()
        };
        let mut sampler = chain(config, 3);
        for _ in 0..20 {
            assert_eq!(sampler.sample(&[2.0, 0.5, 1.0]).unwrap(), 0);
        }
    }

    #[test]
    fn test_masked_tokens_are_never_drawn() {
        let mut sampler = chain(SamplingConfig::default(), 9);
        let logits = [f32::NEG_INFINITY, 0.0, 0.0, f32::NEG_INFINITY];
        for _ in 0..50 {
            let id = sampler.sample(&logits).unwrap();
            assert!(id == 1 || id == 2);
        }
    }

    #[test]
    fn test_same_seed_same_draws() {
        let logits: Vec<f32> = (0..32).map(|i| (i % 7) as f32 * 0.3).collect();
        let mut a = chain(SamplingConfig::default(), 1234);
        let mut b = chain(SamplingConfig::default(), 1234);
        let draws_a: Vec<_> = (0..16).map(|_| a.sample(&logits).unwrap()).collect();
        let draws_b: Vec<_> = (0..16).map(|_| b.sample(&logits).unwrap()).collect();
        assert_eq!(draws_a, draws_b);
    }

    #[test]
    fn test_nucleus_probabilities_sum_to_one() {
        let probs = nucleus(&[1.0, 2.0, 3.0, 4.0], 1.0, 0, 1.0).unwrap();
        let sum: f32 = probs.iter().map(|(_, p)| p).sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(probs[0].0, 3);
    }

    #[test]
    fn test_bad_logits_are_errors() {
        let mut sampler = chain(SamplingConfig::default(), 0);
        assert!(sampler.sample(&[]).is_err());
        assert!(sampler.sample(&[f32::NEG_INFINITY, f32::NEG_INFINITY]).is_err());
    }
}
