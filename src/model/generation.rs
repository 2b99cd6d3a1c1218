//! Deterministic autoregressive decoding: greedy and beam search.
//!
//! The search is independent of ONNX Runtime. It asks a [`StepScorer`] for
//! next-token logits of a batch of partial sequences and applies the usual
//! seq2seq logits processing on top: log-softmax, forced BOS at the first
//! step, forced EOS at the length limit and no-repeat n-gram banning.
//! Finished hypotheses are ranked by `score / len^length_penalty`.

use crate::error::ExtractError;
use std::cmp::Ordering;

/// Produces next-token logits for a batch of decoder sequences.
///
/// All sequences in one call have the same length. The returned vector has
/// one row per sequence, each of vocabulary size.
pub trait StepScorer {
    fn next_token_logits(&mut self, sequences: &[Vec<u32>]) -> Result<Vec<Vec<f32>>, ExtractError>;
}

/// Parameters of one decoding run.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodingParams {
    pub num_beams: usize,
    pub max_new_tokens: usize,
    pub decoder_start_token_id: u32,
    pub eos_token_id: u32,
    pub forced_bos_token_id: Option<u32>,
    pub forced_eos_token_id: Option<u32>,
    pub no_repeat_ngram_size: usize,
    pub length_penalty: f32,
}

#[derive(Debug, Clone)]
struct Beam {
    tokens: Vec<u32>,
    score: f32,
}

/// The best `capacity` finished hypotheses seen so far.
struct Hypotheses {
    capacity: usize,
    length_penalty: f32,
    items: Vec<(f32, Vec<u32>)>,
}

impl Hypotheses {
    fn new(capacity: usize, length_penalty: f32) -> Self {
        Self {
            capacity,
            length_penalty,
            items: Vec::with_capacity(capacity + 1),
        }
    }

    fn add(&mut self, tokens: Vec<u32>, sum_logprobs: f32) {
        // generated length excludes the decoder start token
        let len = tokens.len().saturating_sub(1).max(1) as f32;
        let score = sum_logprobs / len.powf(self.length_penalty);
        if self.items.len() < self.capacity {
            self.items.push((score, tokens));
            return;
        }
        let worst = self
            .items
            .iter()
            .enumerate()
            .min_by(|a, b| a.1 .0.total_cmp(&b.1 .0))
            .map(|(i, _)| i);
        if let Some(worst) = worst {
            if score > self.items[worst].0 {
                self.items[worst] = (score, tokens);
            }
        }
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    fn into_best(self) -> Option<Vec<u32>> {
        self.items
            .into_iter()
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, tokens)| tokens)
    }
}

/// Run greedy (`num_beams == 1`) or beam search decoding.
///
/// The returned sequence starts with the decoder start token and, when the
/// search stopped on an end-of-sequence token, ends with it.
pub fn generate<S: StepScorer + ?Sized>(
    scorer: &mut S,
    params: &DecodingParams,
) -> Result<Vec<u32>, ExtractError> {
    let num_beams = params.num_beams.max(1);
    let max_len = params.max_new_tokens + 1;
    let candidates_per_step = 2 * num_beams;

    let mut beams = vec![Beam {
        tokens: vec![params.decoder_start_token_id],
        score: 0.0,
    }];
    let mut finished = Hypotheses::new(num_beams, params.length_penalty);
    let mut done = false;

    for _ in 0..params.max_new_tokens {
        let sequences: Vec<Vec<u32>> = beams.iter().map(|b| b.tokens.clone()).collect();
        let logits = scorer.next_token_logits(&sequences)?;
        if logits.len() != beams.len() {
            return Err(ExtractError::invalid_output(
                "decoder",
                format!("expected {} logit rows, got {}", beams.len(), logits.len()),
            ));
        }

        let cur_len = beams[0].tokens.len();
        let mut candidates: Vec<(f32, usize, u32)> = Vec::new();
        for (beam_idx, (beam, row)) in beams.iter().zip(logits).enumerate() {
            let mut logprobs = log_softmax(&row);
            ban_repeated_ngrams(&mut logprobs, &beam.tokens, params.no_repeat_ngram_size);
            force_tokens(&mut logprobs, cur_len, max_len, params);
            for (token, lp) in top_k(&logprobs, candidates_per_step) {
                candidates.push((beam.score + lp, beam_idx, token));
            }
        }
        candidates.sort_by(|a, b| match b.0.total_cmp(&a.0) {
            Ordering::Equal => (a.1, a.2).cmp(&(b.1, b.2)),
            other => other,
        });
        candidates.truncate(candidates_per_step);

        let mut next = Vec::with_capacity(num_beams);
        for (rank, (score, beam_idx, token)) in candidates.into_iter().enumerate() {
            let mut tokens = beams[beam_idx].tokens.clone();
            tokens.push(token);
            if token == params.eos_token_id {
                if rank < num_beams {
                    finished.add(tokens, score);
                }
            } else {
                next.push(Beam { tokens, score });
            }
            if next.len() == num_beams {
                break;
            }
        }

        beams = next;
        if finished.is_full() || beams.is_empty() {
            done = true;
            break;
        }
    }

    if !done {
        for beam in beams {
            finished.add(beam.tokens, beam.score);
        }
    }

    finished
        .into_best()
        .ok_or_else(|| ExtractError::invalid_output("decoder", "no finite-scoring hypothesis"))
}

/// Numerically stable log-softmax; `-inf` entries stay `-inf`.
pub(crate) fn log_softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return vec![f32::NEG_INFINITY; logits.len()];
    }
    let sum: f32 = logits.iter().map(|&v| (v - max).exp()).sum();
    let log_sum = sum.ln() + max;
    logits.iter().map(|&v| v - log_sum).collect()
}

fn force_tokens(logprobs: &mut [f32], cur_len: usize, max_len: usize, params: &DecodingParams) {
    let forced = if cur_len == 1 {
        params.forced_bos_token_id
    } else if cur_len + 1 == max_len {
        params.forced_eos_token_id
    } else {
        None
    };
    if let Some(token) = forced {
        let token = token as usize;
        for (i, lp) in logprobs.iter_mut().enumerate() {
            *lp = if i == token { 0.0 } else { f32::NEG_INFINITY };
        }
    }
}

/// Ban every token that would complete an n-gram already present in `tokens`.
pub(crate) fn ban_repeated_ngrams(logprobs: &mut [f32], tokens: &[u32], n: usize) {
    if n == 0 || tokens.len() + 1 < n {
        return;
    }
    let prefix = &tokens[tokens.len() + 1 - n..];
    for window in tokens.windows(n) {
        if &window[..n - 1] == prefix {
            if let Some(lp) = logprobs.get_mut(window[n - 1] as usize) {
                *lp = f32::NEG_INFINITY;
            }
        }
    }
}

/// The `k` best finite entries, best first; ties go to the lower token id.
fn top_k(logprobs: &[f32], k: usize) -> Vec<(u32, f32)> {
    let mut entries: Vec<(u32, f32)> = logprobs
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(i, &v)| (i as u32, v))
        .collect();
    let cmp = |a: &(u32, f32), b: &(u32, f32)| match b.1.total_cmp(&a.1) {
        Ordering::Equal => a.0.cmp(&b.0),
        other => other,
    };
    if entries.len() > k {
        entries.select_nth_unstable_by(k, cmp);
        entries.truncate(k);
    }
    entries.sort_by(cmp);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOCAB: usize = 6;
    const EOS: u32 = 2;

    fn params(num_beams: usize, max_new_tokens: usize) -> DecodingParams {
        DecodingParams {
            num_beams,
            max_new_tokens,
            decoder_start_token_id: EOS,
            eos_token_id: EOS,
            forced_bos_token_id: None,
            forced_eos_token_id: None,
            no_repeat_ngram_size: 0,
            length_penalty: 1.0,
        }
    }

    fn dist(probs: &[(u32, f32)]) -> Vec<f32> {
        let mut row = vec![f32::NEG_INFINITY; VOCAB];
        for &(token, p) in probs {
            row[token as usize] = p.ln();
        }
        row
    }

    struct Scripted<F: Fn(&[u32]) -> Vec<f32>> {
        script: F,
        calls: usize,
    }

    impl<F: Fn(&[u32]) -> Vec<f32>> StepScorer for Scripted<F> {
        fn next_token_logits(&mut self, sequences: &[Vec<u32>]) -> Result<Vec<Vec<f32>>, ExtractError> {
            self.calls += 1;
            Ok(sequences.iter().map(|s| (self.script)(s)).collect())
        }
    }

    fn scripted<F: Fn(&[u32]) -> Vec<f32>>(script: F) -> Scripted<F> {
        Scripted { script, calls: 0 }
    }

    /// Greedy picks 3 then stops (p = 0.18); the 4 branch is worth 0.36.
    fn branching(seq: &[u32]) -> Vec<f32> {
        match seq {
            [2] => dist(&[(3, 0.6), (4, 0.4)]),
            [2, 3] => dist(&[(EOS, 0.3), (5, 0.25), (1, 0.25), (0, 0.2)]),
            [2, 4] => dist(&[(EOS, 0.9), (5, 0.1)]),
            _ => dist(&[(EOS, 1.0)]),
        }
    }

    #[test]
    fn greedy_follows_argmax() {
        let mut scorer = scripted(branching);
        let out = generate(&mut scorer, &params(1, 10)).unwrap();
        assert_eq!(out, vec![2, 3, EOS]);
        assert_eq!(scorer.calls, 2);
    }

    #[test]
    fn beam_search_finds_more_probable_sequence() {
        let mut scorer = scripted(branching);
        let out = generate(&mut scorer, &params(2, 10)).unwrap();
        assert_eq!(out, vec![2, 4, EOS]);
    }

    #[test]
    fn beam_search_is_deterministic() {
        let a = generate(&mut scripted(branching), &params(3, 10)).unwrap();
        let b = generate(&mut scripted(branching), &params(3, 10)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn forced_bos_overrides_first_step() {
        let mut p = params(1, 10);
        p.forced_bos_token_id = Some(0);
        let out = generate(&mut scripted(branching), &p).unwrap();
        // [2, 0] is unscripted, so EOS follows
        assert_eq!(out, vec![2, 0, EOS]);
    }

    #[test]
    fn length_limit_without_eos_returns_running_beam() {
        let always_three = |_: &[u32]| dist(&[(3, 0.9), (EOS, 0.1)]);
        let out = generate(&mut scripted(always_three), &params(1, 3)).unwrap();
        assert_eq!(out, vec![2, 3, 3, 3]);
    }

    #[test]
    fn forced_eos_at_length_limit() {
        let always_three = |_: &[u32]| dist(&[(3, 0.9), (EOS, 0.1)]);
        let mut p = params(1, 3);
        p.forced_eos_token_id = Some(EOS);
        let out = generate(&mut scripted(always_three), &p).unwrap();
        assert_eq!(out, vec![2, 3, 3, EOS]);
    }

    #[test]
    fn forced_eos_survives_ngram_ban() {
        // with unigram blocking the start token (= EOS) is already "used"
        let always_three = |_: &[u32]| dist(&[(3, 0.9), (EOS, 0.1)]);
        let mut p = params(1, 2);
        p.forced_eos_token_id = Some(EOS);
        p.no_repeat_ngram_size = 1;
        let out = generate(&mut scripted(always_three), &p).unwrap();
        assert_eq!(out, vec![2, 3, EOS]);
    }

    #[test]
    fn no_repeat_ngram_changes_path() {
        // prefers 3 forever; bigram (3, 3) may only occur once
        let sticky = |_: &[u32]| dist(&[(3, 0.7), (4, 0.2), (EOS, 0.1)]);
        let mut p = params(1, 4);
        p.no_repeat_ngram_size = 2;
        let out = generate(&mut scripted(sticky), &p).unwrap();
        assert_eq!(out, vec![2, 3, 3, 4, 3]);
    }

    #[test]
    fn ban_repeated_ngrams_bans_continuations() {
        let mut lp = vec![0.0; VOCAB];
        ban_repeated_ngrams(&mut lp, &[2, 3, 4, 3], 2);
        assert_eq!(lp[4], f32::NEG_INFINITY);
        assert_eq!(lp[3], 0.0);

        let mut short = vec![0.0; VOCAB];
        ban_repeated_ngrams(&mut short, &[2], 3);
        assert!(short.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn log_softmax_normalises() {
        let lp = log_softmax(&[1.0, 2.0, f32::NEG_INFINITY]);
        let total: f32 = lp.iter().map(|v| v.exp()).sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert_eq!(lp[2], f32::NEG_INFINITY);
    }

    #[test]
    fn wrong_row_count_is_an_error() {
        struct Empty;
        impl StepScorer for Empty {
            fn next_token_logits(&mut self, _: &[Vec<u32>]) -> Result<Vec<Vec<f32>>, ExtractError> {
                Ok(vec![])
            }
        }
        let err = generate(&mut Empty, &params(2, 5)).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidModelOutput { .. }));
    }
}
