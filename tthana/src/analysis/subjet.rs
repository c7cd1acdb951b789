//! Boosted-top subjet reconciliation.
//!
//! When a boosted top candidate overlaps with independently reconstructed
//! jets, its three subjets and the jet collections describe the same
//! energy twice. This module matches the subjets against the b-tagged and
//! light candidate jets, decides which subjet takes the b role, splices
//! matched subjets into the jet collections in place of their partners and
//! re-derives the event categories afterwards.

use hepcore::kinematics::four_momentum::Kinematic;
use hepcore::matching::annotation::{MatchTable, PoolTag};
use hepcore::matching::linker::match_all;
use log::warn;
use ordered_float::OrderedFloat;

use crate::analysis::config::{candidate_passes, AnalysisConfig, CutCriterion};
use crate::event::categories::{BtagCategory, EventCategory};
use crate::event::model::{Jet, Lepton, Subjet, TopCandidate};

/// Role assigned to a subjet by the reconciliation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubjetTag {
    B,
    Light,
}

/// The reconciliation verdict for one event, immutable once formed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StrategyDecision {
    /// Subjets matched to b-tagged jets, after double-match resolution.
    pub b_matches: usize,
    /// Subjets matched to light candidate jets, after resolution.
    pub l_matches: usize,
    /// How many matches contradicted the assigned roles.
    pub mismatch_count: usize,
    pub strategy_id: u8,
    /// Encodes the match pattern as `10 * b_matches + l_matches`.
    pub event_type_number: u8,
}

/// Result of a successful reconciliation. The subjets carry their assigned
/// b-tag flags; matched ones were additionally spliced into the jet
/// collections.
#[derive(Clone, Debug)]
pub struct Reconciliation {
    pub decision: StrategyDecision,
    pub subjets: [Subjet; 3],
}

/// Applies the candidate cuts, orders survivors by descending cone
/// distance to the lepton and returns the first.
///
/// The hadronic top recoils against the lepton side, so the candidate
/// farthest from the lepton is the preferred one. Candidates keep their
/// lepton distance for downstream bookkeeping.
pub fn choose_top_candidate(
    candidates: &[TopCandidate],
    lepton: Option<&Lepton>,
    criteria: &[CutCriterion],
) -> Option<TopCandidate> {
    let mut passing: Vec<TopCandidate> = candidates
        .iter()
        .filter(|c| candidate_passes(c, criteria))
        .cloned()
        .collect();

    if let Some(lepton) = lepton {
        for candidate in passing.iter_mut() {
            candidate.del_r_lepton = Some(candidate.delta_r_to(lepton));
        }
        passing.sort_by_key(|c| std::cmp::Reverse(OrderedFloat(c.del_r_lepton.unwrap_or(0.0))));
    }

    passing.into_iter().next()
}

/// Matches the subjets of `top` against the jet collections and resolves
/// the overlap.
///
/// Match pattern handling, keyed by (b-jet matches, light-jet matches):
///
/// | pattern | assignment | mismatches | strategy |
/// |---|---|---|---|
/// | (0,0) | trust the subjet roles, non-W subjet is the b | 0 | 1 |
/// | (0,3) | trust the subjet roles, fully mismatched | 1 | 1 |
/// | (0,1) | matched non-W subjet: trust the match, higher-pt W subjet is the b; otherwise trust the roles | 0 | 2 or 1 |
/// | (0,2) | the unmatched subjet is the b | 0 | 3 |
/// | (1,0..2) | the b-matched subjet is the b | 0 | 4 |
/// | (2..3,0..1) | b-matched subjet with the highest partner discriminant is the b | b-1 | 5 |
///
/// Every other pattern is unresolved: a warning is logged and `None` comes
/// back, leaving the collections untouched. On success, every matched
/// subjet replaces its partner jet: the partner leaves its collection and
/// the subjet, carrying the partner's discriminant and transfer functions,
/// is appended to the collection of its assigned tag.
pub fn reconcile_subjets(
    top: &TopCandidate,
    btagged: &mut Vec<Jet>,
    light: &mut Vec<Jet>,
    config: &AnalysisConfig,
) -> Option<Reconciliation> {
    let subjets = &top.subjets;
    let mut table = MatchTable::new();

    match_all(subjets, PoolTag::Subjet, btagged, PoolTag::BJet, config.delta_r_cut, &mut table);
    match_all(subjets, PoolTag::Subjet, light, PoolTag::LightJet, config.delta_r_cut, &mut table);
    table.resolve_double_matches(PoolTag::Subjet, PoolTag::BJet, PoolTag::LightJet);

    let b_matched = table.matched_indices(PoolTag::Subjet, PoolTag::BJet);
    let l_matched = table.matched_indices(PoolTag::Subjet, PoolTag::LightJet);
    let n_b = b_matched.len();
    let n_l = l_matched.len();

    let role_tags = |tags: &mut [SubjetTag; 3]| {
        for (i, subjet) in subjets.iter().enumerate() {
            tags[i] = if subjet.role.is_non_w() { SubjetTag::B } else { SubjetTag::Light };
        }
    };

    let mut tags = [SubjetTag::Light; 3];
    let (mismatch_count, strategy_id) = match (n_b, n_l) {
        (0, 0) => {
            role_tags(&mut tags);
            (0, 1)
        }
        (0, 3) => {
            role_tags(&mut tags);
            (1, 1)
        }
        (0, 1) => {
            let matched = l_matched[0];
            if subjets[matched].role.is_non_w() {
                // the match overrules the role, the harder of the two W
                // subjets takes the b
                let others: Vec<usize> = (0..3).filter(|&i| i != matched).collect();
                let b_idx = if subjets[others[0]].p4.pt >= subjets[others[1]].p4.pt {
                    others[0]
                } else {
                    others[1]
                };
                tags[b_idx] = SubjetTag::B;
                (0, 2)
            } else {
                role_tags(&mut tags);
                (0, 1)
            }
        }
        (0, 2) => {
            let unmatched = (0..3).find(|i| !l_matched.contains(i)).unwrap();
            tags[unmatched] = SubjetTag::B;
            (0, 3)
        }
        (1, 0..=2) => {
            tags[b_matched[0]] = SubjetTag::B;
            (0, 4)
        }
        (2..=3, 0..=1) => {
            let mut best = b_matched[0];
            let mut best_disc = f64::NEG_INFINITY;
            for &i in &b_matched {
                let partner = table.get(PoolTag::Subjet, i, PoolTag::BJet).unwrap().partner;
                let disc = btagged[partner].btag_disc;
                if disc > best_disc {
                    best_disc = disc;
                    best = i;
                }
            }
            tags[best] = SubjetTag::B;
            (n_b - 1, 5)
        }
        _ => {
            warn!(
                "unresolved subjet match pattern ({} against b-tagged, {} against light), leaving event untouched",
                n_b, n_l
            );
            return None;
        }
    };

    splice_matched_subjets(subjets, &tags, &table, btagged, light);

    let mut tagged_subjets = subjets.clone();
    for (i, subjet) in tagged_subjets.iter_mut().enumerate() {
        subjet.btag_flag = Some(if tags[i] == SubjetTag::B { 1.0 } else { 0.0 });
    }

    Some(Reconciliation {
        decision: StrategyDecision {
            b_matches: n_b,
            l_matches: n_l,
            mismatch_count,
            strategy_id,
            event_type_number: (10 * n_b + n_l) as u8,
        },
        subjets: tagged_subjets,
    })
}

/// Replaces every matched partner jet by its subjet.
fn splice_matched_subjets(
    subjets: &[Subjet; 3],
    tags: &[SubjetTag; 3],
    table: &MatchTable,
    btagged: &mut Vec<Jet>,
    light: &mut Vec<Jet>,
) {
    let mut remove_b: Vec<usize> = Vec::new();
    let mut remove_l: Vec<usize> = Vec::new();
    let mut append_b: Vec<Jet> = Vec::new();
    let mut append_l: Vec<Jet> = Vec::new();

    for (i, subjet) in subjets.iter().enumerate() {
        let absorbed = if let Some(record) = table.get(PoolTag::Subjet, i, PoolTag::BJet) {
            remove_b.push(record.partner);
            btagged[record.partner].clone()
        } else if let Some(record) = table.get(PoolTag::Subjet, i, PoolTag::LightJet) {
            remove_l.push(record.partner);
            light[record.partner].clone()
        } else {
            continue;
        };

        let spliced = subjet_as_jet(subjet, &absorbed, tags[i]);
        if tags[i] == SubjetTag::B {
            append_b.push(spliced);
        } else {
            append_l.push(spliced);
        }
    }

    remove_b.sort_unstable();
    for &idx in remove_b.iter().rev() {
        btagged.remove(idx);
    }
    remove_l.sort_unstable();
    for &idx in remove_l.iter().rev() {
        light.remove(idx);
    }

    btagged.extend(append_b);
    light.extend(append_l);
}

/// The jet record a subjet turns into when it absorbs a matched jet:
/// subjet kinematics, partner discriminant and transfer functions.
fn subjet_as_jet(subjet: &Subjet, absorbed: &Jet, tag: SubjetTag) -> Jet {
    Jet {
        p4: subjet.p4,
        btag_disc: absorbed.btag_disc,
        btag_flag: if tag == SubjetTag::B { 1.0 } else { 0.0 },
        mc_flavour: absorbed.mc_flavour,
        gen_p4: None,
        transfer: absorbed.transfer,
        from_subjet: Some(subjet.role),
    }
}

/// Re-derives the categories after splicing.
///
/// More than four b-tagged jets keep the spliced subjet plus the first
/// three pre-existing entries; fewer than four drop the b-tag category,
/// exactly four force it high. An empty light pool clears the event
/// category. A four-tag event that still ends uncategorised is anomalous,
/// it is logged and reported but not repaired.
pub fn rederive_categories(
    btagged: &mut Vec<Jet>,
    light: &[Jet],
    category: EventCategory,
) -> (EventCategory, BtagCategory, bool) {
    if btagged.len() > 4 {
        let spliced: Vec<Jet> = btagged.iter().filter(|j| j.from_subjet.is_some()).cloned().collect();
        let pre_existing: Vec<Jet> = btagged
            .iter()
            .filter(|j| j.from_subjet.is_none())
            .take(3)
            .cloned()
            .collect();
        btagged.clear();
        btagged.extend(pre_existing);
        btagged.extend(spliced);
    }

    let btag_category = if btagged.len() < 4 { BtagCategory::NoCat } else { BtagCategory::High };
    let category = if light.is_empty() { EventCategory::NoCat } else { category };

    let anomalous = btagged.len() == 4 && (category == EventCategory::NoCat || btag_category == BtagCategory::NoCat);
    if anomalous {
        warn!(
            "four b-tagged jets but categories ended up {} / {}",
            category, btag_category
        );
    }

    (category, btag_category, anomalous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::model::SubjetRole;
    use hepcore::kinematics::four_momentum::FourMomentum;

    fn jet_at(pt: f64, eta: f64, phi: f64, disc: f64) -> Jet {
        Jet::new(FourMomentum::new(pt, eta, phi, 8.0), disc)
    }

    fn subjet_at(pt: f64, eta: f64, phi: f64, role: SubjetRole) -> Subjet {
        Subjet::new(FourMomentum::new(pt, eta, phi, 5.0), role)
    }

    fn top_with(subjets: [Subjet; 3]) -> TopCandidate {
        TopCandidate::new(FourMomentum::new(260.0, 0.5, 0.0, 170.0), 0.1, 0.9, 1.0, subjets)
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig::default()
    }

    #[test]
    fn test_single_b_match_is_strategy_four() {
        let top = top_with([
            subjet_at(90.0, 0.0, 0.0, SubjetRole::W1),
            subjet_at(70.0, 3.0, 1.0, SubjetRole::W2),
            subjet_at(80.0, -3.0, -1.0, SubjetRole::NonW),
        ]);
        let mut btagged = vec![jet_at(95.0, 0.05, 0.0, 0.92), jet_at(60.0, 1.5, 2.5, 0.88)];
        let mut light = vec![jet_at(45.0, 1.5, -2.5, 0.1)];

        let rec = reconcile_subjets(&top, &mut btagged, &mut light, &config()).unwrap();
        assert_eq!(rec.decision.strategy_id, 4);
        assert_eq!(rec.decision.mismatch_count, 0);
        assert_eq!((rec.decision.b_matches, rec.decision.l_matches), (1, 0));
        assert_eq!(rec.decision.event_type_number, 10);

        // the matched W1 subjet took the b role, the roles lost
        assert!((rec.subjets[0].btag_flag.unwrap() - 1.0).abs() < 1e-12);
        assert!(rec.subjets[1].btag_flag.unwrap().abs() < 1e-12);
        assert!(rec.subjets[2].btag_flag.unwrap().abs() < 1e-12);

        // the partner jet was replaced by the subjet
        assert_eq!(btagged.len(), 2);
        assert!(btagged.iter().all(|j| (j.p4.pt - 95.0).abs() > 1e-9));
        let spliced = btagged.last().unwrap();
        assert_eq!(spliced.from_subjet, Some(SubjetRole::W1));
        assert!((spliced.p4.pt - 90.0).abs() < 1e-9);
        assert!((spliced.btag_disc - 0.92).abs() < 1e-12);
        assert!((spliced.btag_flag - 1.0).abs() < 1e-12);
        assert_eq!(light.len(), 1);
    }

    #[test]
    fn test_no_match_trusts_subjet_roles() {
        let top = top_with([
            subjet_at(90.0, 0.0, 0.0, SubjetRole::W1),
            subjet_at(70.0, 1.0, 1.0, SubjetRole::W2),
            subjet_at(80.0, -1.0, -1.0, SubjetRole::NonW),
        ]);
        let mut btagged = vec![jet_at(95.0, 4.0, 2.0, 0.92)];
        let mut light = vec![jet_at(45.0, -4.0, 2.0, 0.1)];

        let rec = reconcile_subjets(&top, &mut btagged, &mut light, &config()).unwrap();
        assert_eq!(rec.decision.strategy_id, 1);
        assert_eq!(rec.decision.event_type_number, 0);
        assert!((rec.subjets[2].btag_flag.unwrap() - 1.0).abs() < 1e-12);
        // nothing was spliced
        assert_eq!(btagged.len(), 1);
        assert!(btagged[0].from_subjet.is_none());
        assert_eq!(light.len(), 1);
    }

    #[test]
    fn test_non_w_light_match_promotes_harder_w_subjet() {
        let top = top_with([
            subjet_at(90.0, 2.0, 2.0, SubjetRole::W1),
            subjet_at(70.0, -2.0, -2.0, SubjetRole::W2),
            subjet_at(80.0, 0.0, 0.0, SubjetRole::NonW),
        ]);
        let mut btagged = vec![jet_at(95.0, 4.0, 0.0, 0.92)];
        let mut light = vec![jet_at(78.0, 0.05, 0.0, 0.15), jet_at(45.0, -4.0, 0.0, 0.1)];

        let rec = reconcile_subjets(&top, &mut btagged, &mut light, &config()).unwrap();
        assert_eq!(rec.decision.strategy_id, 2);
        assert_eq!((rec.decision.b_matches, rec.decision.l_matches), (0, 1));
        // the matched non-W subjet is light, W1 out-pts W2 and takes the b
        assert!((rec.subjets[0].btag_flag.unwrap() - 1.0).abs() < 1e-12);
        assert!(rec.subjets[2].btag_flag.unwrap().abs() < 1e-12);

        // the light partner was replaced by the non-W subjet
        assert_eq!(light.len(), 2);
        let spliced = light.last().unwrap();
        assert_eq!(spliced.from_subjet, Some(SubjetRole::NonW));
        // the unmatched b-subjet stays out of the jet collections
        assert_eq!(btagged.len(), 1);
        assert!(btagged[0].from_subjet.is_none());
    }

    #[test]
    fn test_w_light_match_keeps_subjet_roles() {
        let top = top_with([
            subjet_at(90.0, 0.0, 0.0, SubjetRole::W1),
            subjet_at(70.0, -2.0, -2.0, SubjetRole::W2),
            subjet_at(80.0, 2.0, 2.0, SubjetRole::NonW),
        ]);
        let mut btagged = vec![jet_at(95.0, 4.0, 0.0, 0.92)];
        let mut light = vec![jet_at(88.0, 0.05, 0.0, 0.15), jet_at(45.0, -4.0, 0.0, 0.1)];

        let rec = reconcile_subjets(&top, &mut btagged, &mut light, &config()).unwrap();
        assert_eq!(rec.decision.strategy_id, 1);
        // consistent with the roles: non-W keeps the b
        assert!((rec.subjets[2].btag_flag.unwrap() - 1.0).abs() < 1e-12);
        assert!(rec.subjets[0].btag_flag.unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_two_light_matches_leave_unmatched_as_b() {
        let top = top_with([
            subjet_at(90.0, 0.0, 0.0, SubjetRole::W1),
            subjet_at(70.0, 1.0, 1.0, SubjetRole::W2),
            subjet_at(80.0, -2.0, -2.0, SubjetRole::NonW),
        ]);
        let mut btagged = vec![jet_at(95.0, 4.0, 0.0, 0.92)];
        let mut light = vec![jet_at(88.0, 0.04, 0.0, 0.15), jet_at(66.0, 1.04, 1.0, 0.12)];

        let rec = reconcile_subjets(&top, &mut btagged, &mut light, &config()).unwrap();
        assert_eq!(rec.decision.strategy_id, 3);
        assert_eq!(rec.decision.event_type_number, 2);
        assert!((rec.subjets[2].btag_flag.unwrap() - 1.0).abs() < 1e-12);

        // both light partners were replaced in place
        assert_eq!(light.len(), 2);
        assert!(light.iter().all(|j| j.from_subjet.is_some()));
        assert_eq!(btagged.len(), 1);
    }

    #[test]
    fn test_double_b_match_picks_highest_partner_discriminant() {
        let top = top_with([
            subjet_at(90.0, 0.0, 0.0, SubjetRole::W1),
            subjet_at(70.0, 3.0, 1.0, SubjetRole::W2),
            subjet_at(80.0, 1.0, 1.0, SubjetRole::NonW),
        ]);
        let mut btagged = vec![jet_at(95.0, 0.05, 0.0, 0.90), jet_at(84.0, 1.05, 1.0, 0.99)];
        let mut light = vec![jet_at(45.0, -4.0, 0.0, 0.1)];

        let rec = reconcile_subjets(&top, &mut btagged, &mut light, &config()).unwrap();
        assert_eq!(rec.decision.strategy_id, 5);
        assert_eq!(rec.decision.mismatch_count, 1);
        assert_eq!(rec.decision.event_type_number, 20);

        // the subjet whose partner carries 0.99 wins the b
        assert!((rec.subjets[2].btag_flag.unwrap() - 1.0).abs() < 1e-12);
        assert!(rec.subjets[0].btag_flag.unwrap().abs() < 1e-12);

        // both partners left the b pool, only the b subjet came back
        assert_eq!(btagged.len(), 1);
        assert_eq!(btagged[0].from_subjet, Some(SubjetRole::NonW));
        // the light-assigned b-matched subjet moved its partner's weight
        // into the light pool
        assert_eq!(light.len(), 2);
        assert_eq!(light.last().unwrap().from_subjet, Some(SubjetRole::W1));
    }

    #[test]
    fn test_double_match_resolution_prefers_closer_pool() {
        let top = top_with([
            subjet_at(90.0, 0.0, 0.0, SubjetRole::W1),
            subjet_at(70.0, 3.0, 1.0, SubjetRole::W2),
            subjet_at(80.0, -3.0, -1.0, SubjetRole::NonW),
        ]);
        // the same subjet sees a b jet at 0.05 and a light jet at 0.15
        let mut btagged = vec![jet_at(95.0, 0.05, 0.0, 0.92)];
        let mut light = vec![jet_at(88.0, 0.15, 0.0, 0.15)];

        let rec = reconcile_subjets(&top, &mut btagged, &mut light, &config()).unwrap();
        assert_eq!((rec.decision.b_matches, rec.decision.l_matches), (1, 0));
        assert_eq!(rec.decision.strategy_id, 4);
        // the light jet was not displaced
        assert_eq!(light.len(), 1);
        assert!(light[0].from_subjet.is_none());
    }

    #[test]
    fn test_rederive_trims_overfull_b_pool() {
        let mut spliced = jet_at(80.0, 0.0, 0.0, 0.9);
        spliced.from_subjet = Some(SubjetRole::NonW);
        let mut btagged = vec![
            jet_at(100.0, 0.1, 0.0, 0.95),
            jet_at(90.0, 0.2, 0.0, 0.94),
            jet_at(85.0, 0.3, 0.0, 0.93),
            jet_at(82.0, 0.4, 0.0, 0.92),
            spliced,
        ];
        let light = vec![jet_at(45.0, 1.0, 1.0, 0.1)];

        let (category, btag_category, anomalous) =
            rederive_categories(&mut btagged, &light, EventCategory::Cat1);
        assert_eq!(btagged.len(), 4);
        assert_eq!(btagged[3].from_subjet, Some(SubjetRole::NonW));
        // the fourth pre-existing jet was dropped
        assert!(btagged.iter().all(|j| (j.p4.pt - 82.0).abs() > 1e-9));
        assert_eq!(btag_category, BtagCategory::High);
        assert_eq!(category, EventCategory::Cat1);
        assert!(!anomalous);
    }

    #[test]
    fn test_rederive_flags_thin_pools() {
        let mut btagged = vec![jet_at(100.0, 0.1, 0.0, 0.95), jet_at(90.0, 0.2, 0.0, 0.94)];
        let light = vec![jet_at(45.0, 1.0, 1.0, 0.1)];
        let (category, btag_category, anomalous) =
            rederive_categories(&mut btagged, &light, EventCategory::Cat1);
        assert_eq!(btag_category, BtagCategory::NoCat);
        assert_eq!(category, EventCategory::Cat1);
        assert!(!anomalous);
    }

    #[test]
    fn test_rederive_empty_light_pool_is_anomalous_at_four_tags() {
        let mut btagged = vec![
            jet_at(100.0, 0.1, 0.0, 0.95),
            jet_at(90.0, 0.2, 0.0, 0.94),
            jet_at(85.0, 0.3, 0.0, 0.93),
            jet_at(82.0, 0.4, 0.0, 0.92),
        ];
        let light: Vec<Jet> = Vec::new();
        let (category, btag_category, anomalous) =
            rederive_categories(&mut btagged, &light, EventCategory::Cat1);
        assert_eq!(category, EventCategory::NoCat);
        assert_eq!(btag_category, BtagCategory::High);
        assert!(anomalous);
    }

    #[test]
    fn test_choose_top_candidate_prefers_far_side() {
        let near = top_with([
            subjet_at(90.0, 0.1, 0.1, SubjetRole::W1),
            subjet_at(70.0, 0.2, 0.2, SubjetRole::W2),
            subjet_at(80.0, 0.3, 0.3, SubjetRole::NonW),
        ]);
        let mut far = near.clone();
        far.p4 = FourMomentum::new(260.0, -0.5, 3.0, 170.0);

        let lepton = Lepton::new(FourMomentum::new(40.0, 0.5, 0.0, 0.0), 13, -1.0, 0.05);
        let config = AnalysisConfig::default();

        let chosen = choose_top_candidate(&[near.clone(), far.clone()], Some(&lepton), &config.top_cuts).unwrap();
        assert!((chosen.p4.eta - far.p4.eta).abs() < 1e-12);
        assert!(chosen.del_r_lepton.unwrap() > 1.0);
    }

    #[test]
    fn test_choose_top_candidate_applies_cuts() {
        let mut soft = top_with([
            subjet_at(90.0, 0.1, 0.1, SubjetRole::W1),
            subjet_at(70.0, 0.2, 0.2, SubjetRole::W2),
            subjet_at(80.0, 0.3, 0.3, SubjetRole::NonW),
        ]);
        soft.p4 = FourMomentum::new(150.0, 0.5, 0.0, 170.0);

        let config = AnalysisConfig::default();
        assert!(choose_top_candidate(&[soft], None, &config.top_cuts).is_none());
    }
}
