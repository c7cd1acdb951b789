//! The per-event interpretation driver.
//!
//! Runs one event through lepton/jet selection, truth preparation, the
//! likelihood scan, W pairing and categorisation; high-likelihood cat1
//! events continue into subjet reconciliation and the integrator gate,
//! everything else drops out as a skip. Per-event failures are
//! skip outcomes, not errors; only configuration problems abort a run. A
//! rayon batch driver fans events out across a thread pool, each event
//! still runs start to finish on one thread.

use std::fmt;
use std::fmt::{Display, Formatter};

use hepcore::matching::linker::{link_closest, link_three_closest, link_two_closest};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::analysis::btag_lr::{evaluate_btag_likelihood, BtagLikelihoodResults};
use crate::analysis::config::{AnalysisConfig, UntaggedSelectionPolicy};
use crate::analysis::subjet::{choose_top_candidate, reconcile_subjets, rederive_categories, Reconciliation};
use crate::analysis::truth::{
    dedup_w_quarks, match_jets_to_quarks, prepare_gen_quarks, QuarkMultiplicity, QuarkTruth, TruthMatchCounts,
};
use crate::analysis::wtag::pair_untagged_jets;
use crate::error::Result;
use crate::event::categories::{derive_event_category, BtagCategory, EventCategory};
use crate::event::model::{EventRecord, Jet, Met, Subjet};
use crate::event::selection::{select_jets, select_leptons};
use crate::mem::integrator::{assemble_request, integration_gate, IntegratorRequest};

/// Why an event dropped out of the interpretation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Neither the single-lepton nor the di-lepton selection fired.
    NoLeptonMode,
    /// Fewer than four jets survived the acceptance cuts.
    TooFewJets(usize),
    /// The generator quark collections had the wrong multiplicity.
    QuarkMultiplicity(QuarkMultiplicity),
    /// Reconciliation is only defined for high-likelihood cat1 events with
    /// enough jets in both pools; everything else stays untouched.
    OutsideBoostedSelection,
    /// No top candidate survived the candidate cuts.
    NoTopCandidate,
    /// The subjet match pattern was outside the strategy table.
    UnresolvedOverlap,
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoLeptonMode => write!(f, "no lepton mode"),
            SkipReason::TooFewJets(n) => write!(f, "too few jets ({})", n),
            SkipReason::QuarkMultiplicity(m) => write!(f, "quark multiplicity ({:?})", m),
            SkipReason::OutsideBoostedSelection => write!(f, "outside boosted selection"),
            SkipReason::NoTopCandidate => write!(f, "no top candidate"),
            SkipReason::UnresolvedOverlap => write!(f, "unresolved subjet overlap"),
        }
    }
}

/// Everything the interpretation derived for one surviving event.
#[derive(Clone, Debug)]
pub struct EventInterpretation {
    pub is_sl: bool,
    pub is_dl: bool,
    pub category: EventCategory,
    /// Final b-tag category, after reconciliation re-derived it.
    pub btag_category: BtagCategory,
    /// B-tag category from the likelihood-ratio cut alone, kept for
    /// bookkeeping next to the re-derived one.
    pub btag_category_lr: BtagCategory,
    pub likelihood: BtagLikelihoodResults,
    pub w_mass: Option<f64>,
    pub truth_counts: Option<TruthMatchCounts>,
    pub reconciliation: Reconciliation,
    /// Post-splice b-tagged jets.
    pub btagged_jets: Vec<Jet>,
    /// Post-splice light candidate jets.
    pub light_jets: Vec<Jet>,
    pub met: Met,
    /// Four b tags but an uncategorised event, kept for diagnostics.
    pub anomalous: bool,
    /// Present when the event passed the integrator gate.
    pub mem_request: Option<IntegratorRequest>,
    /// (jet-quark, subjet-quark, jet-subjet) successes on the b side.
    pub match_chain_b: Option<[bool; 3]>,
    /// Same chain on the light side.
    pub match_chain_l: Option<[bool; 3]>,
    /// Whether the full hadronic-top quark triplet found three distinct
    /// partners among the selected jets.
    pub top_triplet_recovered: Option<bool>,
}

/// Outcome of one event.
#[derive(Clone, Debug)]
pub enum EventOutcome {
    Proceed(Box<EventInterpretation>),
    Skipped(SkipReason),
}

impl EventOutcome {
    #[inline]
    pub fn proceeded(&self) -> bool {
        matches!(self, EventOutcome::Proceed(_))
    }
}

/// Interprets a single event.
///
/// Returns `Ok(Skipped(..))` for per-event conditions and `Err(..)` only
/// for configuration problems such as a missing probability table.
pub fn interpret(event: &EventRecord, config: &AnalysisConfig) -> Result<EventOutcome> {
    let leptons = select_leptons(&event.leptons, &config.lepton);
    if !leptons.is_sl && !leptons.is_dl {
        return Ok(EventOutcome::Skipped(SkipReason::NoLeptonMode));
    }

    let mut selection = select_jets(&event.jets, &event.met, config);
    if selection.num_jets() < 4 {
        return Ok(EventOutcome::Skipped(SkipReason::TooFewJets(selection.num_jets())));
    }

    let has_truth =
        !(event.gen_w_quarks.is_empty() && event.gen_b_from_top.is_empty() && event.gen_b_from_higgs.is_empty());
    let truth: Option<QuarkTruth> = if has_truth {
        let mut w_quarks = event.gen_w_quarks.clone();
        dedup_w_quarks(&mut w_quarks);
        match prepare_gen_quarks(&w_quarks, &event.gen_b_from_top, config.top_mass_reference) {
            Ok(truth) => Some(truth),
            Err(multiplicity) => {
                return Ok(EventOutcome::Skipped(SkipReason::QuarkMultiplicity(multiplicity)));
            }
        }
    } else {
        None
    };

    let likelihood = evaluate_btag_likelihood(&mut selection.good_jets, config)?;

    let truth_counts = truth.as_ref().map(|t| {
        match_jets_to_quarks(
            &selection.good_jets,
            &t.w_quarks,
            &[t.hadronic_b.clone(), t.leptonic_b.clone()],
            &event.gen_b_from_higgs,
            config.delta_r_cut,
        )
    });
    let top_triplet_recovered = truth.as_ref().map(|t| {
        let triplet = [t.hadronic_b.clone(), t.w_quarks[0].clone(), t.w_quarks[1].clone()];
        link_three_closest(&selection.good_jets, &triplet, config.delta_r_cut).is_ok()
    });

    let wtag = pair_untagged_jets(&selection.good_jets, &likelihood.untagged, config.w_mass_reference);
    let category = derive_event_category(
        leptons.is_sl,
        leptons.is_dl,
        selection.num_jets(),
        wtag.w_mass.unwrap_or(0.0),
    );

    let btag_category_lr = match config.untagged_policy {
        UntaggedSelectionPolicy::ByLikelihoodRatio => match config.lr_cuts.for_category(category) {
            Some(cut) if likelihood.selection_ratio() >= cut => BtagCategory::High,
            Some(_) => BtagCategory::Low,
            None => BtagCategory::NoCat,
        },
        UntaggedSelectionPolicy::ByDiscriminant => {
            if selection.n_tagged_wp >= 4 {
                BtagCategory::High
            } else {
                BtagCategory::Low
            }
        }
    };

    let mut btagged_jets: Vec<Jet> = likelihood.btagged.iter().map(|&i| selection.good_jets[i].clone()).collect();
    let mut light_jets: Vec<Jet> = wtag.candidates.iter().map(|&i| selection.good_jets[i].clone()).collect();

    // reconciliation only applies to high-likelihood cat1 events with a W
    // candidate pair and at least one b-tagged jet
    let suitable = category == EventCategory::Cat1
        && btag_category_lr == BtagCategory::High
        && light_jets.len() >= 2
        && !btagged_jets.is_empty();
    if !suitable {
        return Ok(EventOutcome::Skipped(SkipReason::OutsideBoostedSelection));
    }

    let top = match choose_top_candidate(&event.top_candidates, leptons.good_leptons.first(), &config.top_cuts) {
        Some(top) => top,
        None => return Ok(EventOutcome::Skipped(SkipReason::NoTopCandidate)),
    };
    let reconciliation = match reconcile_subjets(&top, &mut btagged_jets, &mut light_jets, config) {
        Some(reconciliation) => reconciliation,
        None => return Ok(EventOutcome::Skipped(SkipReason::UnresolvedOverlap)),
    };

    let (category, btag_category, anomalous) = rederive_categories(&mut btagged_jets, &light_jets, category);

    let chains = truth.as_ref().map(|t| {
        let b_quark = std::slice::from_ref(&t.hadronic_b);
        let jet_b = link_closest(&btagged_jets, b_quark, config.delta_r_cut).is_some();

        // the b-linked subjet leaves the pool before the light rounds run
        let subjets = reconciliation.subjets.to_vec();
        let subjet_b = link_closest(&subjets, b_quark, config.delta_r_cut);
        let light_subjets: Vec<Subjet> = subjets
            .iter()
            .enumerate()
            .filter(|&(i, _)| subjet_b.map_or(true, |link| i != link.index_a))
            .map(|(_, s)| s.clone())
            .collect();

        let jet_l = link_two_closest(&light_jets, &t.w_quarks, config.delta_r_cut).is_some();
        let subjet_l = link_two_closest(&light_subjets, &t.w_quarks, config.delta_r_cut).is_some();

        (
            [jet_b, subjet_b.is_some(), reconciliation.decision.b_matches > 0],
            [jet_l, subjet_l, reconciliation.decision.l_matches > 0],
        )
    });
    let match_chain_b = chains.map(|(b, _)| b);
    let match_chain_l = chains.map(|(_, l)| l);

    let mem_request = if integration_gate(btag_category, truth_counts.as_ref(), event.gen_b_from_higgs.len(), config) {
        Some(assemble_request(
            &btagged_jets,
            &light_jets,
            &leptons.good_leptons,
            selection.corrected_met,
            category,
        ))
    } else {
        None
    };

    Ok(EventOutcome::Proceed(Box::new(EventInterpretation {
        is_sl: leptons.is_sl,
        is_dl: leptons.is_dl,
        category,
        btag_category,
        btag_category_lr,
        likelihood,
        w_mass: wtag.w_mass,
        truth_counts,
        reconciliation,
        btagged_jets,
        light_jets,
        met: selection.corrected_met,
        anomalous,
        mem_request,
        match_chain_b,
        match_chain_l,
        top_triplet_recovered,
    })))
}

/// Success/fail counter tree over the three-step matching chain
/// jet-to-quark, subjet-to-quark, jet-to-subjet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchTree {
    pub total: usize,
    level1: [usize; 2],
    level2: [usize; 4],
    level3: [usize; 8],
}

impl MatchTree {
    pub fn new() -> Self {
        MatchTree::default()
    }

    pub fn fill(&mut self, jet_quark: bool, subjet_quark: bool, jet_subjet: bool) {
        let (a, b, c) = (jet_quark as usize, subjet_quark as usize, jet_subjet as usize);
        self.total += 1;
        self.level1[a] += 1;
        self.level2[a * 2 + b] += 1;
        self.level3[a * 4 + b * 2 + c] += 1;
    }

    /// Count at a node, addressed by the success flags of the levels above.
    pub fn count(&self, flags: &[bool]) -> usize {
        match *flags {
            [] => self.total,
            [a] => self.level1[a as usize],
            [a, b] => self.level2[a as usize * 2 + b as usize],
            [a, b, c] => self.level3[a as usize * 4 + b as usize * 2 + c as usize],
            _ => 0,
        }
    }

    /// Events where the whole chain succeeded.
    #[inline]
    pub fn fully_matched(&self) -> usize {
        self.level3[7]
    }

    pub fn merge(&mut self, other: &MatchTree) {
        self.total += other.total;
        for i in 0..2 {
            self.level1[i] += other.level1[i];
        }
        for i in 0..4 {
            self.level2[i] += other.level2[i];
        }
        for i in 0..8 {
            self.level3[i] += other.level3[i];
        }
    }
}

impl Display for MatchTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "  total = {}, fully matched = {}", self.total, self.fully_matched())?;
        writeln!(
            f,
            "  |{:13}|{:>8}|{:13}|{:>8}|{:13}|{:>8}|",
            "jet-quark", "", "subjet-quark", "", "jet-subjet", ""
        )?;
        for a in [true, false] {
            for b in [true, false] {
                for c in [true, false] {
                    let label = |flag: bool| if flag { "success" } else { "failed" };
                    writeln!(
                        f,
                        "  |{:13}|{:>8}|{:13}|{:>8}|{:13}|{:>8}|",
                        label(a),
                        self.count(&[a]),
                        label(b),
                        self.count(&[a, b]),
                        label(c),
                        self.count(&[a, b, c]),
                    )?;
                }
            }
        }
        Ok(())
    }
}

/// Per-run counters, rendered at end of run.
#[derive(Clone, Debug, Default)]
pub struct RunStatistics {
    pub n_processed: usize,
    pub n_passed: usize,
    pub n_no_lepton_mode: usize,
    pub n_too_few_jets: usize,
    pub n_quark_multiplicity: usize,
    pub n_outside_boosted: usize,
    pub n_no_top_candidate: usize,
    pub n_unresolved_overlap: usize,
    pub n_anomalous: usize,
    pub n_passed_to_mem: usize,
    pub n_triplet_recovered: usize,
    pub tree_b: MatchTree,
    pub tree_l: MatchTree,
}

impl RunStatistics {
    pub fn new() -> Self {
        RunStatistics::default()
    }

    pub fn record(&mut self, outcome: &EventOutcome) {
        self.n_processed += 1;
        match outcome {
            EventOutcome::Proceed(interpretation) => {
                self.n_passed += 1;
                if interpretation.anomalous {
                    self.n_anomalous += 1;
                }
                if interpretation.mem_request.is_some() {
                    self.n_passed_to_mem += 1;
                }
                if interpretation.top_triplet_recovered == Some(true) {
                    self.n_triplet_recovered += 1;
                }
                if let Some([a, b, c]) = interpretation.match_chain_b {
                    self.tree_b.fill(a, b, c);
                }
                if let Some([a, b, c]) = interpretation.match_chain_l {
                    self.tree_l.fill(a, b, c);
                }
            }
            EventOutcome::Skipped(reason) => match reason {
                SkipReason::NoLeptonMode => self.n_no_lepton_mode += 1,
                SkipReason::TooFewJets(_) => self.n_too_few_jets += 1,
                SkipReason::QuarkMultiplicity(_) => self.n_quark_multiplicity += 1,
                SkipReason::OutsideBoostedSelection => self.n_outside_boosted += 1,
                SkipReason::NoTopCandidate => self.n_no_top_candidate += 1,
                SkipReason::UnresolvedOverlap => self.n_unresolved_overlap += 1,
            },
        }
    }

    pub fn merge(&mut self, other: &RunStatistics) {
        self.n_processed += other.n_processed;
        self.n_passed += other.n_passed;
        self.n_no_lepton_mode += other.n_no_lepton_mode;
        self.n_too_few_jets += other.n_too_few_jets;
        self.n_quark_multiplicity += other.n_quark_multiplicity;
        self.n_outside_boosted += other.n_outside_boosted;
        self.n_no_top_candidate += other.n_no_top_candidate;
        self.n_unresolved_overlap += other.n_unresolved_overlap;
        self.n_anomalous += other.n_anomalous;
        self.n_passed_to_mem += other.n_passed_to_mem;
        self.n_triplet_recovered += other.n_triplet_recovered;
        self.tree_b.merge(&other.tree_b);
        self.tree_l.merge(&other.tree_l);
    }
}

impl Display for RunStatistics {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "run statistics")?;
        writeln!(f, "  processed            = {}", self.n_processed)?;
        writeln!(f, "  passed               = {}", self.n_passed)?;
        writeln!(f, "  no lepton mode       = {}", self.n_no_lepton_mode)?;
        writeln!(f, "  too few jets         = {}", self.n_too_few_jets)?;
        writeln!(f, "  quark multiplicity   = {}", self.n_quark_multiplicity)?;
        writeln!(f, "  outside boosted      = {}", self.n_outside_boosted)?;
        writeln!(f, "  no top candidate     = {}", self.n_no_top_candidate)?;
        writeln!(f, "  unresolved overlap   = {}", self.n_unresolved_overlap)?;
        writeln!(f, "  anomalous categories = {}", self.n_anomalous)?;
        writeln!(f, "  passed to MEM        = {}", self.n_passed_to_mem)?;
        writeln!(f, "  top triplet matched  = {}", self.n_triplet_recovered)?;
        writeln!(f, "match tree b")?;
        write!(f, "{}", self.tree_b)?;
        writeln!(f, "match tree l")?;
        write!(f, "{}", self.tree_l)
    }
}

/// Interprets a batch of events on a thread pool.
///
/// # Arguments
///
/// * `events` - The events to interpret.
/// * `config` - Shared read-only configuration.
/// * `num_threads` - Number of worker threads.
///
/// # Returns
///
/// Per-event outcomes in input order together with the accumulated run
/// statistics. The first configuration error aborts the batch.
pub fn interpret_batch(
    events: &[EventRecord],
    config: &AnalysisConfig,
    num_threads: usize,
) -> Result<(Vec<EventOutcome>, RunStatistics)> {
    let pool = ThreadPoolBuilder::new().num_threads(num_threads).build().unwrap();

    let outcomes: Vec<EventOutcome> =
        pool.install(|| events.par_iter().map(|event| interpret(event, config)).collect::<Result<Vec<_>>>())?;

    let mut statistics = RunStatistics::new();
    for outcome in &outcomes {
        statistics.record(outcome);
    }
    Ok((outcomes, statistics))
}
