use itertools::Itertools;

use crate::btag::pdf::FlavourProbs;

/// A flavour content hypothesis: `n_b` b-quark positions, `n_c` charm
/// positions, everything else light.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlavourHypothesis {
    pub n_b: usize,
    pub n_c: usize,
}

impl FlavourHypothesis {
    pub fn new(n_b: usize, n_c: usize) -> Self {
        FlavourHypothesis { n_b, n_c }
    }
}

/// Event likelihood of a flavour hypothesis by exhaustive permutation scan.
///
/// # Arguments
///
/// * `probs` - Per-jet flavour probabilities, one entry per jet.
/// * `hypothesis` - How many leading positions score as b and as charm.
///
/// # Returns
///
/// The mean permutation likelihood together with the best permutation. For
/// every permutation of the jets, positions `[0, n_b)` contribute their b
/// probability, positions `[n_b, min(n_b + n_c, n))` their charm
/// probability and the rest their light probability; the permutation score
/// is the product. The first permutation attaining the strict maximum is
/// reported, which makes the result deterministic. Permuting the input jets
/// changes the best permutation but never the mean.
///
/// # Panics
///
/// Panics when `probs` is empty or the hypothesis asks for more b positions
/// than there are jets.
///
/// # Examples
///
/// ```
/// use hepcore::btag::likelihood::{btag_likelihood, FlavourHypothesis};
/// use hepcore::btag::pdf::FlavourProbs;
///
/// let probs = vec![
///     FlavourProbs::new(0.8, 0.1, 0.1),
///     FlavourProbs::new(0.1, 0.1, 0.8),
/// ];
/// let (mean, best) = btag_likelihood(&probs, FlavourHypothesis::new(1, 0));
/// assert!((mean - 0.325).abs() < 1e-12);
/// assert_eq!(best, vec![0, 1]);
/// ```
pub fn btag_likelihood(probs: &[FlavourProbs], hypothesis: FlavourHypothesis) -> (f64, Vec<usize>) {
    let n = probs.len();
    assert!(n >= 1, "likelihood over an empty jet collection");
    assert!(hypothesis.n_b <= n, "hypothesis asks for more b positions than jets");

    let n_b = hypothesis.n_b;
    let c_end = (n_b + hypothesis.n_c).min(n);

    let mut total = 0.0;
    let mut best_p = f64::NEG_INFINITY;
    let mut best_perm: Vec<usize> = Vec::new();
    let mut n_perms: usize = 0;

    for perm in (0..n).permutations(n) {
        let mut p = 1.0;
        for i in 0..n_b {
            p *= probs[perm[i]].b;
        }
        for i in n_b..c_end {
            p *= probs[perm[i]].c;
        }
        for i in c_end..n {
            p *= probs[perm[i]].light;
        }

        total += p;
        if p > best_p {
            best_p = p;
            best_perm = perm;
        }
        n_perms += 1;
    }

    assert!(n_perms > 0);
    (total / n_perms as f64, best_perm)
}

/// Relative weight of one likelihood against an alternative, with the
/// all-zero case defined as zero rather than NaN.
#[inline]
pub fn likelihood_ratio(l_main: f64, l_alt: f64) -> f64 {
    let total = l_main + l_alt;
    if total <= 0.0 {
        return 0.0;
    }
    l_main / total
}
