//! Exact occurrence-bound probabilities for independent trials.
//!
//! A trial produces event `i` with probability `probs[i]`, or no event at
//! all with the remaining probability. These are pure numeric utilities;
//! invalid inputs fail fast with a [`ConfigError`].

use crate::combinatorics::{EventOccurrences, KSubsetGenerator, ln_multinomial};
use crate::errors::ConfigError;

fn validate(probs: &[f64], bounds: &[usize]) -> Result<(), ConfigError> {
    if probs.len() != bounds.len() {
        return Err(ConfigError::InvalidOccurrenceBounds {
            probs: probs.len(),
            bounds: bounds.len(),
        });
    }
    let mut sum = 0.0;
    for &p in probs {
        if !p.is_finite() || !(0.0..=1.0).contains(&p) {
            return Err(ConfigError::InvalidProbability(p));
        }
        sum += p;
    }
    if sum > 1.0 + 1e-9 {
        return Err(ConfigError::InvalidProbability(sum));
    }
    Ok(())
}

/// Probability that in `n` trials every event `i` occurs at most
/// `max_occ[i]` times.
///
/// Sums a multinomial term over every occurrence-count assignment within
/// the bounds; terms are accumulated through log-space to keep large trial
/// counts stable.
pub fn prob_max_occ(probs: &[f64], max_occ: &[usize], n: usize) -> Result<f64, ConfigError> {
    validate(probs, max_occ)?;
    let none_prob = 1.0 - probs.iter().sum::<f64>();
    let bounds: Vec<usize> = max_occ.iter().map(|&b| b.min(n)).collect();
    let mut total = 0.0;
    for counts in EventOccurrences::new(bounds) {
        let used: usize = counts.iter().sum();
        if used > n {
            continue;
        }
        let mut ln = ln_multinomial(n, &counts);
        let mut zero = false;
        for (&c, &p) in counts.iter().zip(probs.iter()) {
            if c > 0 {
                if p == 0.0 {
                    zero = true;
                    break;
                }
                ln += c as f64 * p.ln();
            }
        }
        if zero {
            continue;
        }
        let rest = n - used;
        if rest > 0 {
            if none_prob <= 0.0 {
                continue;
            }
            ln += rest as f64 * none_prob.ln();
        }
        total += ln.exp();
    }
    Ok(total.min(1.0))
}

/// Probability that in `n` trials every event `i` occurs at least
/// `min_occ[i]` times.
///
/// Inclusion-exclusion over the non-empty subsets of events that fall short
/// of their bound, enumerated by [`KSubsetGenerator`].
pub fn prob_min_occ(probs: &[f64], min_occ: &[usize], n: usize) -> Result<f64, ConfigError> {
    validate(probs, min_occ)?;
    let mut total = 1.0;
    for k in 1..=probs.len() {
        let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
        for subset in KSubsetGenerator::new(k, probs.len()) {
            let sub_probs: Vec<f64> = subset.iter().map(|&i| probs[i]).collect();
            let sub_bounds: Vec<usize> = subset
                .iter()
                .map(|&i| min_occ[i].saturating_sub(1))
                .collect();
            // events with a zero minimum can never fall short
            if subset.iter().any(|&i| min_occ[i] == 0) {
                continue;
            }
            total += sign * prob_max_occ(&sub_probs, &sub_bounds, n)?;
        }
    }
    Ok(total.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_occ_reference_values() {
        let p = prob_max_occ(&[0.10], &[0], 100).unwrap();
        assert!((p - 0.0000265614).abs() < 1e-10);
        let p = prob_max_occ(&[0.10], &[1], 100).unwrap();
        assert!((p - 0.000321688).abs() < 1e-9);
    }

    #[test]
    fn min_occ_reference_value() {
        let p = prob_min_occ(&[0.10], &[2], 3).unwrap();
        assert!((p - 0.028).abs() < 0.001);
    }

    #[test]
    fn min_occ_single_event_closed_form() {
        // P(>= 1 occurrence) = 1 - (1-p)^n
        let p = prob_min_occ(&[0.3], &[1], 5).unwrap();
        assert!((p - (1.0 - 0.7f64.powi(5))).abs() < 1e-12);
    }

    #[test]
    fn min_occ_two_events() {
        // two fair outcomes in two trials: both occur iff one each, p = 1/2
        let p = prob_min_occ(&[0.5, 0.5], &[1, 1], 2).unwrap();
        assert!((p - 0.5).abs() < 1e-12);
    }

    #[test]
    fn zero_minimum_is_certain() {
        let p = prob_min_occ(&[0.4], &[0], 10).unwrap();
        assert!((p - 1.0).abs() < 1e-12);
    }

    #[test]
    fn invalid_inputs_fail_fast() {
        assert!(matches!(
            prob_max_occ(&[1.2], &[0], 3),
            Err(ConfigError::InvalidProbability(_))
        ));
        assert!(matches!(
            prob_max_occ(&[0.4, 0.4], &[0], 3),
            Err(ConfigError::InvalidOccurrenceBounds { .. })
        ));
        assert!(matches!(
            prob_min_occ(&[0.7, 0.7], &[1, 1], 3),
            Err(ConfigError::InvalidProbability(_))
        ));
    }
}
