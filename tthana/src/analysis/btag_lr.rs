//! Flavour-hypothesis likelihood scan over the leading jets.
//!
//! Evaluates four-b against two-b hypothesis families on all shipped
//! probability tables and derives the authoritative b-tag partition from
//! the best four-b permutation of the refreshed tables. The legacy and
//! binned families use a pure two-b alternative, the refreshed family a
//! two-b plus one-charm alternative.

use hepcore::btag::likelihood::{btag_likelihood, likelihood_ratio, FlavourHypothesis};
use hepcore::btag::pdf::{FlavourProbs, TableFamily};
use ordered_float::OrderedFloat;

use crate::analysis::config::{AnalysisConfig, UntaggedSelectionPolicy};
use crate::error::Result;
use crate::event::model::Jet;

/// Likelihood ratios and the tag partition of one event.
///
/// All jet indices refer to the slice handed to
/// [`evaluate_btag_likelihood`].
#[derive(Clone, Debug)]
pub struct BtagLikelihoodResults {
    /// Four-b against two-b on the legacy tables.
    pub lr_legacy: f64,
    /// Four-b against two-b on the pt/eta binned tables.
    pub lr_binned: f64,
    /// (4b) against (2b, 1c) on the refreshed tables, the ratio the
    /// category decision cuts on.
    pub lr_refreshed: f64,
    /// (4b) against (2b, 2c) on the refreshed tables.
    pub lr_4b_vs_2b2c: f64,
    /// (4b, 1c) against (2b, 1c) on the refreshed tables.
    pub lr_4b1c_vs_2b1c: f64,
    /// Jets entering the permutation scan, discriminant-descending.
    pub considered: Vec<usize>,
    /// Best four-b permutation of the refreshed tables, as jet indices.
    pub best_perm: Vec<usize>,
    /// The authoritative b-tagged jets.
    pub btagged: Vec<usize>,
    /// The untagged remainder feeding the W-pairing step.
    pub untagged: Vec<usize>,
}

impl BtagLikelihoodResults {
    /// The ratio the category decision cuts on.
    #[inline]
    pub fn selection_ratio(&self) -> f64 {
        self.lr_refreshed
    }
}

/// Runs the likelihood scan and writes the b-tag flags.
///
/// The leading `max_jets_for_likelihood` jets by discriminant are scanned;
/// under the likelihood-ratio policy the best four-b permutation fixes four
/// tagged jets and leaves the rest of the scanned jets untagged, under the
/// discriminant policy the working point decides for every jet. Tagged
/// jets get `btag_flag = 1.0`, all others `0.0`.
///
/// Table lookups only fail on configuration problems, those abort the run.
/// Calling this with fewer jets than b positions in the hypotheses is a
/// caller bug and panics.
pub fn evaluate_btag_likelihood(jets: &mut [Jet], config: &AnalysisConfig) -> Result<BtagLikelihoodResults> {
    let mut considered: Vec<usize> = (0..jets.len()).collect();
    considered.sort_by_key(|&i| std::cmp::Reverse(OrderedFloat(jets[i].btag_disc)));
    considered.truncate(config.max_jets_for_likelihood);

    let probs_for = |family: TableFamily| -> Result<Vec<FlavourProbs>> {
        considered
            .iter()
            .map(|&i| {
                let jet = &jets[i];
                Ok(config
                    .btag_pdfs
                    .flavour_probs(family, jet.p4.pt, jet.p4.eta, jet.btag_disc)?)
            })
            .collect()
    };

    let probs_legacy = probs_for(TableFamily::Legacy)?;
    let probs_binned = probs_for(TableFamily::PtEtaBinned)?;
    let probs_refreshed = probs_for(TableFamily::Refreshed)?;

    let hyp_4b = FlavourHypothesis::new(4, 0);
    let hyp_2b = FlavourHypothesis::new(2, 0);

    let (l_4b_legacy, _) = btag_likelihood(&probs_legacy, hyp_4b);
    let (l_2b_legacy, _) = btag_likelihood(&probs_legacy, hyp_2b);
    let (l_4b_binned, _) = btag_likelihood(&probs_binned, hyp_4b);
    let (l_2b_binned, _) = btag_likelihood(&probs_binned, hyp_2b);

    let (l_4b, perm_4b) = btag_likelihood(&probs_refreshed, hyp_4b);
    let (l_4b_1c, _) = btag_likelihood(&probs_refreshed, FlavourHypothesis::new(4, 1));
    let (l_2b_2c, _) = btag_likelihood(&probs_refreshed, FlavourHypothesis::new(2, 2));
    let (l_2b_1c, _) = btag_likelihood(&probs_refreshed, FlavourHypothesis::new(2, 1));

    let best_perm: Vec<usize> = perm_4b.iter().map(|&k| considered[k]).collect();

    let (btagged, untagged) = match config.untagged_policy {
        UntaggedSelectionPolicy::ByLikelihoodRatio => {
            let btagged: Vec<usize> = best_perm[..4.min(best_perm.len())].to_vec();
            let untagged: Vec<usize> = best_perm[4.min(best_perm.len())..].to_vec();
            (btagged, untagged)
        }
        UntaggedSelectionPolicy::ByDiscriminant => {
            let btagged: Vec<usize> = (0..jets.len()).filter(|&i| jets[i].btag_disc > config.btag_wp).collect();
            let untagged: Vec<usize> = (0..jets.len()).filter(|&i| jets[i].btag_disc <= config.btag_wp).collect();
            (btagged, untagged)
        }
    };

    for jet in jets.iter_mut() {
        jet.btag_flag = 0.0;
    }
    for &i in &btagged {
        jets[i].btag_flag = 1.0;
    }

    Ok(BtagLikelihoodResults {
        lr_legacy: likelihood_ratio(l_4b_legacy, l_2b_legacy),
        lr_binned: likelihood_ratio(l_4b_binned, l_2b_binned),
        lr_refreshed: likelihood_ratio(l_4b, l_2b_1c),
        lr_4b_vs_2b2c: likelihood_ratio(l_4b, l_2b_2c),
        lr_4b1c_vs_2b1c: likelihood_ratio(l_4b_1c, l_2b_1c),
        considered,
        best_perm,
        btagged,
        untagged,
    })
}
