//! Generator-truth preparation and reco-to-truth matching.
//!
//! Cleans the generator quark collections, decides which top-side b quark
//! belongs to the hadronic top and counts how many selected jets find a
//! truth partner.

use hepcore::kinematics::four_momentum::{FourMomentum, Kinematic};

use crate::event::model::{GenParticle, Jet};

/// Why the generator quark collections could not be prepared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuarkMultiplicity {
    TooFewWQuarks,
    TooFewBQuarks,
    TooManyWQuarks,
    TooManyBQuarks,
}

/// The prepared truth content: the hadronic-top b leads, both b quarks
/// carry their distance to the reference top mass.
#[derive(Clone, Debug)]
pub struct QuarkTruth {
    pub hadronic_b: GenParticle,
    pub leptonic_b: GenParticle,
    pub w_quarks: [GenParticle; 2],
}

/// Drops a duplicated trailing W/Z quark block.
///
/// Some samples store the same quark pair twice in a row; when the last two
/// transverse momenta repeat the first two exactly, the trailing pair is
/// removed.
pub fn dedup_w_quarks(quarks: &mut Vec<GenParticle>) {
    if quarks.len() < 4 {
        return;
    }
    let n = quarks.len();
    let duplicated = quarks[n - 1].p4.pt == quarks[1].p4.pt && quarks[n - 2].p4.pt == quarks[0].p4.pt;
    if duplicated {
        quarks.truncate(n - 2);
    }
}

/// Prepares the truth quarks for matching.
///
/// Requires exactly two W quarks and two top-side b quarks; the b quark
/// whose combined mass with the W pair lands closer to the reference top
/// mass is the hadronic one.
pub fn prepare_gen_quarks(
    w_quarks: &[GenParticle],
    b_from_top: &[GenParticle],
    top_mass_reference: f64,
) -> Result<QuarkTruth, QuarkMultiplicity> {
    if w_quarks.len() < 2 {
        return Err(QuarkMultiplicity::TooFewWQuarks);
    }
    if b_from_top.len() < 2 {
        return Err(QuarkMultiplicity::TooFewBQuarks);
    }
    if w_quarks.len() > 2 {
        return Err(QuarkMultiplicity::TooManyWQuarks);
    }
    if b_from_top.len() > 2 {
        return Err(QuarkMultiplicity::TooManyBQuarks);
    }

    let w_sum: FourMomentum = w_quarks[0].p4 + w_quarks[1].p4;
    let delmass = |b: &GenParticle| ((b.p4 + w_sum).mass - top_mass_reference).abs();

    let delmass_0 = delmass(&b_from_top[0]);
    let delmass_1 = delmass(&b_from_top[1]);

    let (hadronic_idx, leptonic_idx) = if delmass_0 <= delmass_1 { (0, 1) } else { (1, 0) };

    let mut hadronic_b = b_from_top[hadronic_idx].clone();
    let mut leptonic_b = b_from_top[leptonic_idx].clone();
    hadronic_b.delmass_top = Some(if hadronic_idx == 0 { delmass_0 } else { delmass_1 });
    leptonic_b.delmass_top = Some(if hadronic_idx == 0 { delmass_1 } else { delmass_0 });

    Ok(QuarkTruth {
        hadronic_b,
        leptonic_b,
        w_quarks: [w_quarks[0].clone(), w_quarks[1].clone()],
    })
}

/// Which truth collection a jet was matched to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QuarkSource {
    W,
    TopB,
    HiggsB,
}

/// Per-event truth match counts, with and without the tag-consistency
/// requirement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TruthMatchCounts {
    pub n_match_wq: usize,
    pub n_match_wq_btag: usize,
    pub n_match_tb: usize,
    pub n_match_tb_btag: usize,
    pub n_match_hb: usize,
    pub n_match_hb_btag: usize,
}

/// Matches every jet to its closest truth quark.
///
/// A jet counts for the collection of its overall-closest quark when the
/// distance is below the cut; the tag-consistent counters additionally ask
/// the jet's b-tag flag to agree with the quark flavour.
pub fn match_jets_to_quarks(
    jets: &[Jet],
    w_quarks: &[GenParticle],
    b_from_top: &[GenParticle],
    b_from_higgs: &[GenParticle],
    max_delta_r: f64,
) -> TruthMatchCounts {
    let mut counts = TruthMatchCounts::default();

    for jet in jets {
        let mut best: Option<(QuarkSource, f64)> = None;
        let sources = [
            (QuarkSource::W, w_quarks),
            (QuarkSource::TopB, b_from_top),
            (QuarkSource::HiggsB, b_from_higgs),
        ];
        for (source, quarks) in sources {
            for quark in quarks {
                let dr = jet.delta_r_to(quark);
                if best.map(|(_, d)| dr < d).unwrap_or(true) {
                    best = Some((source, dr));
                }
            }
        }

        let (source, dr) = match best {
            Some(hit) => hit,
            None => continue,
        };
        if dr >= max_delta_r {
            continue;
        }

        let tagged = jet.btag_flag >= 0.5;
        match source {
            QuarkSource::W => {
                counts.n_match_wq += 1;
                if !tagged {
                    counts.n_match_wq_btag += 1;
                }
            }
            QuarkSource::TopB => {
                counts.n_match_tb += 1;
                if tagged {
                    counts.n_match_tb_btag += 1;
                }
            }
            QuarkSource::HiggsB => {
                counts.n_match_hb += 1;
                if tagged {
                    counts.n_match_hb_btag += 1;
                }
            }
        }
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quark(pt: f64, eta: f64, phi: f64, pdg_id: i32) -> GenParticle {
        GenParticle::new(FourMomentum::new(pt, eta, phi, 0.0), pdg_id)
    }

    fn jet_at(eta: f64, phi: f64, btag_flag: f64) -> Jet {
        let mut jet = Jet::new(FourMomentum::new(60.0, eta, phi, 8.0), 0.5);
        jet.btag_flag = btag_flag;
        jet
    }

    #[test]
    fn test_dedup_removes_trailing_copy() {
        let mut quarks = vec![
            quark(50.0, 0.0, 0.0, 1),
            quark(40.0, 0.5, 1.0, -2),
            quark(50.0, 0.0, 0.0, 1),
            quark(40.0, 0.5, 1.0, -2),
        ];
        dedup_w_quarks(&mut quarks);
        assert_eq!(quarks.len(), 2);
    }

    #[test]
    fn test_dedup_keeps_distinct_quarks() {
        let mut quarks = vec![
            quark(50.0, 0.0, 0.0, 1),
            quark(40.0, 0.5, 1.0, -2),
            quark(30.0, -0.5, 2.0, 3),
            quark(20.0, 1.5, -1.0, -4),
        ];
        dedup_w_quarks(&mut quarks);
        assert_eq!(quarks.len(), 4);

        let mut short = vec![quark(50.0, 0.0, 0.0, 1), quark(40.0, 0.5, 1.0, -2), quark(50.0, 0.0, 0.0, 1)];
        dedup_w_quarks(&mut short);
        assert_eq!(short.len(), 3);
    }

    #[test]
    fn test_hadronic_b_by_combined_mass() {
        let w_quarks = vec![quark(55.0, 0.4, 0.8, 1), quark(45.0, -0.3, 1.6, -2)];
        let b_near = quark(60.0, 0.1, 1.2, 5);
        let b_far = quark(60.0, -2.0, -2.0, -5);

        let w_sum = w_quarks[0].p4 + w_quarks[1].p4;
        let reference = (b_near.p4 + w_sum).mass;

        let truth = prepare_gen_quarks(&w_quarks, &[b_far.clone(), b_near.clone()], reference).unwrap();
        assert_eq!(truth.hadronic_b.pdg_id, 5);
        assert!(truth.hadronic_b.delmass_top.unwrap().abs() < 1e-9);
        assert_eq!(truth.leptonic_b.pdg_id, -5);
        assert!(truth.leptonic_b.delmass_top.unwrap() > 0.0);
    }

    #[test]
    fn test_multiplicity_gates() {
        let q = |n: usize| -> Vec<GenParticle> { (0..n).map(|i| quark(50.0 + i as f64, 0.0, 0.0, 1)).collect() };

        assert!(matches!(
            prepare_gen_quarks(&q(1), &q(2), 172.0),
            Err(QuarkMultiplicity::TooFewWQuarks)
        ));
        assert!(matches!(
            prepare_gen_quarks(&q(2), &q(1), 172.0),
            Err(QuarkMultiplicity::TooFewBQuarks)
        ));
        assert!(matches!(
            prepare_gen_quarks(&q(3), &q(2), 172.0),
            Err(QuarkMultiplicity::TooManyWQuarks)
        ));
        assert!(matches!(
            prepare_gen_quarks(&q(2), &q(3), 172.0),
            Err(QuarkMultiplicity::TooManyBQuarks)
        ));
    }

    #[test]
    fn test_match_counts_with_tag_consistency() {
        let w_quarks = vec![quark(40.0, 0.0, 0.0, 1), quark(35.0, 1.0, 1.0, -2)];
        let b_top = vec![quark(60.0, -1.0, -1.0, 5)];
        let b_higgs = vec![quark(70.0, 2.0, 2.0, 5), quark(65.0, -2.0, 2.0, -5)];

        let jets = vec![
            jet_at(0.02, 0.0, 0.0),  // W quark, untagged: consistent
            jet_at(1.02, 1.0, 1.0),  // W quark, tagged: inconsistent
            jet_at(-1.02, -1.0, 1.0), // top b, tagged
            jet_at(2.02, 2.0, 0.0),  // higgs b, untagged: inconsistent
            jet_at(0.0, 3.0, 0.0),   // matches nothing
        ];

        let counts = match_jets_to_quarks(&jets, &w_quarks, &b_top, &b_higgs, 0.3);
        assert_eq!(counts.n_match_wq, 2);
        assert_eq!(counts.n_match_wq_btag, 1);
        assert_eq!(counts.n_match_tb, 1);
        assert_eq!(counts.n_match_tb_btag, 1);
        assert_eq!(counts.n_match_hb, 1);
        assert_eq!(counts.n_match_hb_btag, 0);
    }
}
