//! Combinatorial enumeration utilities backing the probability computations.

/// Enumerates all k-subsets of `{0, .., n-1}` in the revolving-door
/// minimal-change order (Kreher & Stinson), built from the recurrence
/// `R(n, k) = R(n-1, k) ++ reverse(R(n-1, k-1)) * {n-1}`.
///
/// Consecutive subsets differ by a single element exchange; exactly
/// `C(n, k)` subsets are produced.
pub struct KSubsetGenerator {
    subsets: std::vec::IntoIter<Vec<usize>>,
}

impl KSubsetGenerator {
    pub fn new(k: usize, n: usize) -> Self {
        let subsets = if k > n {
            Vec::new()
        } else {
            revolving_door(n, k)
        };
        Self {
            subsets: subsets.into_iter(),
        }
    }
}

impl Iterator for KSubsetGenerator {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        self.subsets.next()
    }
}

fn revolving_door(n: usize, k: usize) -> Vec<Vec<usize>> {
    if k == 0 {
        return vec![vec![]];
    }
    if k == n {
        return vec![(0..n).collect()];
    }
    let mut out = revolving_door(n - 1, k);
    let mut tail = revolving_door(n - 1, k - 1);
    tail.reverse();
    for s in &mut tail {
        s.push(n - 1);
    }
    out.extend(tail);
    out
}

/// Mixed-radix odometer over occurrence-count vectors: yields every vector
/// `c` with `0 <= c[i] <= bounds[i]`, starting from all zeros.
pub struct EventOccurrences {
    bounds: Vec<usize>,
    current: Option<Vec<usize>>,
}

impl EventOccurrences {
    pub fn new(bounds: Vec<usize>) -> Self {
        let current = Some(vec![0; bounds.len()]);
        Self { bounds, current }
    }
}

impl Iterator for EventOccurrences {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let out = self.current.clone()?;
        // advance the odometer, least significant digit first
        let cur = self.current.as_mut().expect("checked above");
        let mut i = 0;
        loop {
            if i == cur.len() {
                self.current = None;
                break;
            }
            if cur[i] < self.bounds[i] {
                cur[i] += 1;
                break;
            }
            cur[i] = 0;
            i += 1;
        }
        Some(out)
    }
}

/// ln(n!), by direct summation. Inputs here are trial counts (at most a few
/// thousand seeds), where summation is precise enough and allocation-free.
pub fn ln_factorial(n: usize) -> f64 {
    (2..=n).map(|i| (i as f64).ln()).sum()
}

/// ln of the multinomial coefficient `n! / (parts[0]! * .. * parts[m]!)`.
///
/// The parts must sum to at most `n`; the remainder is treated as one more
/// part.
pub fn ln_multinomial(n: usize, parts: &[usize]) -> f64 {
    let used: usize = parts.iter().sum();
    debug_assert!(used <= n);
    let mut ln = ln_factorial(n) - ln_factorial(n - used);
    for &p in parts {
        ln -= ln_factorial(p);
    }
    ln
}

/// C(n, k) as an exact integer, for test oracles and small bounds.
pub fn binomial(n: usize, k: usize) -> u128 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut acc: u128 = 1;
    for i in 0..k {
        acc = acc * (n - i) as u128 / (i + 1) as u128;
    }
    acc
}
