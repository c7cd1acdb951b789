//! Interface to the external matrix-element integrator.
//!
//! The integrator itself is an opaque numerical service; the only contract
//! is a list of tagged four-momenta with role flags and a hypothesis
//! selector going in and a probability-like scalar with an error code
//! coming out. This module assembles the request from the reconciled event
//! content, gates which events are worth integrating and applies the
//! bad-probability check to the result.

use hepcore::kinematics::four_momentum::FourMomentum;
use hepcore::kinematics::transfer::TransferFunction;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::analysis::config::AnalysisConfig;
use crate::analysis::truth::TruthMatchCounts;
use crate::event::categories::{BtagCategory, EventCategory};
use crate::event::model::{Jet, Lepton, Met};

/// Signal and background hypotheses the integrator evaluates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemHypothesis {
    TtH,
    TtBb,
}

/// Lepton-count final state of the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalState {
    SingleLepton,
    DiLepton,
}

/// Role flag of one four-momentum in the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectRole {
    BQuark,
    LightQuark,
    Lepton,
}

/// One entry of the object list handed to the integrator.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct IntegratorObject {
    pub p4: FourMomentum,
    pub role: ObjectRole,
    pub btag_flag: f64,
    /// Energy transfer function of the role hypothesis, subjet widths for
    /// spliced subjets. Leptons carry none.
    pub transfer: Option<TransferFunction>,
}

/// The assembled per-event request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IntegratorRequest {
    pub objects: Vec<IntegratorObject>,
    pub met: Met,
    pub final_state: FinalState,
    /// Integrate over a missed W quark when the light pool came up short in
    /// a category that allows it.
    pub integrate_missed_w: bool,
}

/// Raw integrator answer for one hypothesis.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct IntegrationOutput {
    pub probability: f64,
    pub error_code: i32,
}

/// The opaque integration service.
pub trait MatrixElementIntegrator {
    fn integrate(&self, request: &IntegratorRequest, hypothesis: MemHypothesis) -> IntegrationOutput;
}

/// Test double returning fixed probabilities with a clean error code.
#[derive(Clone, Copy, Debug)]
pub struct ConstantIntegrator {
    pub p_tth: f64,
    pub p_ttbb: f64,
}

impl MatrixElementIntegrator for ConstantIntegrator {
    fn integrate(&self, _request: &IntegratorRequest, hypothesis: MemHypothesis) -> IntegrationOutput {
        let probability = match hypothesis {
            MemHypothesis::TtH => self.p_tth,
            MemHypothesis::TtBb => self.p_ttbb,
        };
        IntegrationOutput { probability, error_code: 0 }
    }
}

/// Both hypothesis probabilities of one integration.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MemResult {
    pub p_tth: f64,
    pub p_ttbb: f64,
}

impl MemResult {
    /// Weight of the signal hypothesis against the background one, with the
    /// background scaled down by `alt_weight`. All-zero inputs give zero.
    #[inline]
    pub fn relative_weight(&self, alt_weight: f64) -> f64 {
        let total = self.p_tth + alt_weight * self.p_ttbb;
        if total <= 0.0 {
            return 0.0;
        }
        self.p_tth / total
    }

    /// An integration whose relative weight collapses is numerically
    /// untrustworthy and gets discarded downstream.
    #[inline]
    pub fn is_bad(&self, alt_weight: f64, threshold: f64) -> bool {
        self.relative_weight(alt_weight) < threshold
    }
}

/// Runs both hypotheses on one request.
///
/// A non-zero error code from either hypothesis voids the whole result; a
/// result failing the bad-probability check is logged and dropped as well.
pub fn evaluate<I: MatrixElementIntegrator + ?Sized>(
    integrator: &I,
    request: &IntegratorRequest,
    config: &AnalysisConfig,
) -> Option<MemResult> {
    let tth = integrator.integrate(request, MemHypothesis::TtH);
    let ttbb = integrator.integrate(request, MemHypothesis::TtBb);

    if tth.error_code != 0 || ttbb.error_code != 0 {
        warn!(
            "integrator returned error codes ({}, {}), discarding result",
            tth.error_code, ttbb.error_code
        );
        return None;
    }

    let result = MemResult {
        p_tth: tth.probability,
        p_ttbb: ttbb.probability,
    };
    if result.is_bad(config.bad_prob_alt_weight, config.bad_prob_threshold) {
        warn!(
            "bad integration probability ({:e} vs {:e}), discarding result",
            result.p_tth, result.p_ttbb
        );
        return None;
    }
    Some(result)
}

/// Decides whether an event is handed to the integrator.
///
/// The b-tag category must be high. When truth matching is required, the
/// tag-consistent match counts have to reach the configured thresholds; the
/// Higgs-side requirement is lenient when the event carries fewer Higgs b
/// quarks than asked for.
pub fn integration_gate(
    btag_category: BtagCategory,
    counts: Option<&TruthMatchCounts>,
    n_gen_higgs_b: usize,
    config: &AnalysisConfig,
) -> bool {
    if btag_category != BtagCategory::High {
        return false;
    }
    if !config.require_quark_match {
        return true;
    }

    let counts = match counts {
        Some(counts) => counts,
        None => return false,
    };
    let required = &config.required_matches;
    let required_hb = required.b_from_higgs.min(n_gen_higgs_b);

    counts.n_match_wq_btag >= required.w_quarks
        && counts.n_match_tb_btag >= required.b_from_top
        && counts.n_match_hb_btag >= required_hb
}

/// Assembles the object list from the reconciled collections.
///
/// B-tagged jets enter with their b transfer function, light candidates
/// with the light one; spliced subjets switch to the subjet widths. Missed-W
/// integration is only requested in the single-lepton categories that keep
/// a hadronic W, when the light pool holds fewer than two candidates.
pub fn assemble_request(
    btagged: &[Jet],
    light: &[Jet],
    leptons: &[Lepton],
    met: Met,
    category: EventCategory,
) -> IntegratorRequest {
    let mut objects: Vec<IntegratorObject> = Vec::with_capacity(btagged.len() + light.len() + leptons.len());

    for jet in btagged {
        objects.push(IntegratorObject {
            p4: jet.p4,
            role: ObjectRole::BQuark,
            btag_flag: jet.btag_flag,
            transfer: jet.transfer.map(|t| if jet.from_subjet.is_some() { t.b_subjet } else { t.b }),
        });
    }
    for jet in light {
        objects.push(IntegratorObject {
            p4: jet.p4,
            role: ObjectRole::LightQuark,
            btag_flag: jet.btag_flag,
            transfer: jet.transfer.map(|t| if jet.from_subjet.is_some() { t.light_subjet } else { t.light }),
        });
    }
    for lepton in leptons {
        objects.push(IntegratorObject {
            p4: lepton.p4,
            role: ObjectRole::Lepton,
            btag_flag: 0.0,
            transfer: None,
        });
    }

    let final_state = if leptons.len() >= 2 {
        FinalState::DiLepton
    } else {
        FinalState::SingleLepton
    };
    let allows_missed_w = matches!(category, EventCategory::Cat2 | EventCategory::Cat3);

    IntegratorRequest {
        objects,
        met,
        final_state,
        integrate_missed_w: allows_missed_w && light.len() < 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::model::{JetTransfer, SubjetRole};
    use hepcore::kinematics::transfer::TransferFunctionSet;

    fn jet(pt: f64, disc: f64, tagged: bool) -> Jet {
        let mut jet = Jet::new(FourMomentum::new(pt, 0.4, 1.0, 8.0), disc);
        jet.btag_flag = if tagged { 1.0 } else { 0.0 };
        jet.transfer = Some(JetTransfer::attach(&TransferFunctionSet::default(), 0.4));
        jet
    }

    fn lepton() -> Lepton {
        Lepton::new(FourMomentum::new(45.0, 0.2, -1.0, 0.0), 13, -1.0, 0.05)
    }

    fn counts(wq: usize, tb: usize, hb: usize) -> TruthMatchCounts {
        TruthMatchCounts {
            n_match_wq: wq,
            n_match_wq_btag: wq,
            n_match_tb: tb,
            n_match_tb_btag: tb,
            n_match_hb: hb,
            n_match_hb_btag: hb,
        }
    }

    #[test]
    fn test_gate_needs_high_btag_category() {
        let config = AnalysisConfig::default();
        assert!(integration_gate(BtagCategory::High, None, 2, &config));
        assert!(!integration_gate(BtagCategory::Low, None, 2, &config));
        assert!(!integration_gate(BtagCategory::NoCat, None, 2, &config));
    }

    #[test]
    fn test_gate_checks_required_matches() {
        let mut config = AnalysisConfig::default();
        config.require_quark_match = true;

        assert!(integration_gate(BtagCategory::High, Some(&counts(2, 2, 2)), 2, &config));
        assert!(!integration_gate(BtagCategory::High, Some(&counts(1, 2, 2)), 2, &config));
        assert!(!integration_gate(BtagCategory::High, Some(&counts(2, 1, 2)), 2, &config));
        assert!(!integration_gate(BtagCategory::High, Some(&counts(2, 2, 1)), 2, &config));
        // without truth information the requirement cannot be checked
        assert!(!integration_gate(BtagCategory::High, None, 2, &config));
    }

    #[test]
    fn test_gate_higgs_leniency() {
        let mut config = AnalysisConfig::default();
        config.require_quark_match = true;
        // only one Higgs b quark exists, one match suffices
        assert!(integration_gate(BtagCategory::High, Some(&counts(2, 2, 1)), 1, &config));
        assert!(!integration_gate(BtagCategory::High, Some(&counts(2, 2, 0)), 1, &config));
    }

    #[test]
    fn test_request_roles_and_transfers() {
        let mut spliced = jet(80.0, 0.9, true);
        spliced.from_subjet = Some(SubjetRole::NonW);
        let btagged = vec![jet(100.0, 0.95, true), spliced];
        let light = vec![jet(50.0, 0.1, false)];
        let leptons = vec![lepton()];

        let request = assemble_request(&btagged, &light, &leptons, Met::new(30.0, 0.0), EventCategory::Cat1);
        assert_eq!(request.objects.len(), 4);
        assert_eq!(request.final_state, FinalState::SingleLepton);
        assert!(!request.integrate_missed_w);

        assert_eq!(request.objects[0].role, ObjectRole::BQuark);
        assert_eq!(request.objects[2].role, ObjectRole::LightQuark);
        assert_eq!(request.objects[3].role, ObjectRole::Lepton);
        assert!(request.objects[3].transfer.is_none());

        // the spliced subjet carries the wider subjet response
        let full = request.objects[0].transfer.unwrap();
        let subjet = request.objects[1].transfer.unwrap();
        assert!(subjet.params.width(100.0) > full.params.width(100.0));
    }

    #[test]
    fn test_missed_w_only_in_allowing_categories() {
        let btagged = vec![jet(100.0, 0.95, true)];
        let light = vec![jet(50.0, 0.1, false)];
        let leptons = vec![lepton()];

        let cat2 = assemble_request(&btagged, &light, &leptons, Met::default(), EventCategory::Cat2);
        assert!(cat2.integrate_missed_w);
        let cat1 = assemble_request(&btagged, &light, &leptons, Met::default(), EventCategory::Cat1);
        assert!(!cat1.integrate_missed_w);

        let two_light = vec![jet(50.0, 0.1, false), jet(40.0, 0.2, false)];
        let full = assemble_request(&btagged, &two_light, &leptons, Met::default(), EventCategory::Cat2);
        assert!(!full.integrate_missed_w);
    }

    #[test]
    fn test_evaluate_discards_error_codes() {
        struct FailingIntegrator;
        impl MatrixElementIntegrator for FailingIntegrator {
            fn integrate(&self, _: &IntegratorRequest, _: MemHypothesis) -> IntegrationOutput {
                IntegrationOutput { probability: 0.5, error_code: 3 }
            }
        }

        let config = AnalysisConfig::default();
        let request = assemble_request(&[], &[], &[lepton()], Met::default(), EventCategory::Cat1);
        assert!(evaluate(&FailingIntegrator, &request, &config).is_none());
    }

    #[test]
    fn test_evaluate_applies_bad_probability_check() {
        let config = AnalysisConfig::default();
        let request = assemble_request(&[], &[], &[lepton()], Met::default(), EventCategory::Cat1);

        let good = ConstantIntegrator { p_tth: 1e-3, p_ttbb: 1e-3 };
        let result = evaluate(&good, &request, &config).unwrap();
        assert!(result.relative_weight(config.bad_prob_alt_weight) > 0.9);

        let bad = ConstantIntegrator { p_tth: 1e-12, p_ttbb: 1.0 };
        assert!(evaluate(&bad, &request, &config).is_none());
    }

    #[test]
    fn test_relative_weight_guards_zero() {
        let zero = MemResult { p_tth: 0.0, p_ttbb: 0.0 };
        assert!(zero.relative_weight(0.02).abs() < 1e-15);
        let pure = MemResult { p_tth: 0.4, p_ttbb: 0.0 };
        assert!((pure.relative_weight(0.02) - 1.0).abs() < 1e-15);
    }
}
