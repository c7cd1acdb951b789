//! Lepton and jet selection.
//!
//! Turns the raw event content into the analysis-level collections: lepton
//! mode flags, pt-ordered good jets with transfer functions attached, the
//! working-point tag partition and the jet-corrected missing energy.

use crate::analysis::config::{AnalysisConfig, LeptonCuts};
use crate::event::model::{Jet, JetTransfer, Lepton, Met};

/// Outcome of the lepton step.
#[derive(Clone, Debug)]
pub struct LeptonSelection {
    /// The leptons the event is interpreted with, pt-descending.
    pub good_leptons: Vec<Lepton>,
    pub is_sl: bool,
    pub is_dl: bool,
}

/// Selects leptons and decides the lepton mode.
///
/// Single-lepton means exactly one tight lepton and no further loose
/// lepton, di-lepton means exactly two loose leptons. Anything else leaves
/// both flags off and the good-lepton list empty.
pub fn select_leptons(leptons: &[Lepton], cuts: &LeptonCuts) -> LeptonSelection {
    let loose: Vec<Lepton> = leptons
        .iter()
        .filter(|l| l.p4.pt > cuts.loose_pt && l.p4.eta.abs() < cuts.max_eta && l.iso < cuts.loose_iso)
        .cloned()
        .collect();
    let tight: Vec<Lepton> = loose
        .iter()
        .filter(|l| l.p4.pt > cuts.tight_pt && l.iso < cuts.tight_iso)
        .cloned()
        .collect();

    let is_sl = tight.len() == 1 && loose.len() == 1;
    let is_dl = loose.len() == 2;

    let mut good_leptons = if is_sl {
        tight
    } else if is_dl {
        loose
    } else {
        Vec::new()
    };
    good_leptons.sort_by(|a, b| b.p4.pt.total_cmp(&a.p4.pt));

    LeptonSelection { good_leptons, is_sl, is_dl }
}

/// Outcome of the jet step.
#[derive(Clone, Debug)]
pub struct JetSelection {
    /// Selected jets, pt-descending, transfer functions attached.
    pub good_jets: Vec<Jet>,
    /// Jets above the working point on the discriminant.
    pub n_tagged_wp: usize,
    /// True b jets among the working-point tagged ones, when flavour
    /// information is available.
    pub n_true_b_tagged: Option<usize>,
    pub corrected_met: Met,
}

impl JetSelection {
    #[inline]
    pub fn num_jets(&self) -> usize {
        self.good_jets.len()
    }
}

/// Applies the jet acceptance cuts, orders by pt, attaches transfer
/// functions and corrects the missing energy for the reco-to-generator jet
/// momentum differences.
///
/// The correction only runs when every selected jet carries a generator
/// momentum, mixed events pass the raw missing energy through.
pub fn select_jets(jets: &[Jet], met: &Met, config: &AnalysisConfig) -> JetSelection {
    let mut good_jets: Vec<Jet> = jets
        .iter()
        .filter(|j| j.p4.pt > config.jet.min_pt && j.p4.eta.abs() < config.jet.max_eta)
        .cloned()
        .collect();
    good_jets.sort_by(|a, b| b.p4.pt.total_cmp(&a.p4.pt));

    for jet in good_jets.iter_mut() {
        jet.transfer = Some(JetTransfer::attach(&config.transfer, jet.p4.eta));
    }

    let n_tagged_wp = good_jets.iter().filter(|j| j.btag_disc > config.btag_wp).count();

    let n_true_b_tagged = if good_jets.iter().all(|j| j.mc_flavour.is_some()) {
        Some(
            good_jets
                .iter()
                .filter(|j| j.btag_disc > config.btag_wp && j.mc_flavour.map(|f| f.abs() == 5).unwrap_or(false))
                .count(),
        )
    } else {
        None
    };

    let corrected_met = if !good_jets.is_empty() && good_jets.iter().all(|j| j.gen_p4.is_some()) {
        let mut dpx = 0.0;
        let mut dpy = 0.0;
        for jet in &good_jets {
            let gen = jet.gen_p4.unwrap();
            dpx += jet.p4.px() - gen.px();
            dpy += jet.p4.py() - gen.py();
        }
        Met::new(met.px + dpx, met.py + dpy)
    } else {
        *met
    };

    JetSelection {
        good_jets,
        n_tagged_wp,
        n_true_b_tagged,
        corrected_met,
    }
}
