//! Hadronic W reconstruction from the untagged jet pool.
//!
//! Ranks all untagged-jet pairs by their distance to the W mass and keeps
//! the jets of the two best pairs as light-quark candidates.

use ordered_float::OrderedFloat;

use crate::event::model::Jet;

/// Result of the W-pairing step. Candidate indices refer to the jet slice
/// passed in and are deduplicated in insertion order.
#[derive(Clone, Debug)]
pub struct WTagResult {
    /// Invariant mass of the best pair, absent without at least two
    /// untagged jets.
    pub w_mass: Option<f64>,
    /// Light-quark candidate jets.
    pub candidates: Vec<usize>,
}

/// Pairs untagged jets into W candidates.
///
/// With fewer than two untagged jets no pairing is possible and the
/// untagged jets themselves become the candidate pool.
pub fn pair_untagged_jets(jets: &[Jet], untagged: &[usize], w_mass_reference: f64) -> WTagResult {
    if untagged.len() < 2 {
        return WTagResult {
            w_mass: None,
            candidates: untagged.to_vec(),
        };
    }

    let mut pairs: Vec<(usize, usize, f64)> = Vec::new();
    for (a, &i) in untagged.iter().enumerate() {
        for &j in untagged.iter().skip(a + 1) {
            let mass = (jets[i].p4 + jets[j].p4).mass;
            pairs.push((i, j, mass));
        }
    }
    pairs.sort_by_key(|&(_, _, mass)| OrderedFloat((mass - w_mass_reference).abs()));

    let w_mass = pairs.first().map(|&(_, _, mass)| mass);

    let mut candidates: Vec<usize> = Vec::new();
    for &(i, j, _) in pairs.iter().take(2) {
        if !candidates.contains(&i) {
            candidates.push(i);
        }
        if !candidates.contains(&j) {
            candidates.push(j);
        }
    }

    WTagResult { w_mass, candidates }
}
